use chronofhir_core::{Resource, SummaryMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StatusCategory;
use crate::outcome::OperationOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Searchset,
    History,
    Batch,
    BatchResponse,
    Transaction,
    TransactionResponse,
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    Match,
    Include,
    Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    /// Number of `match` entries before paging; outcome entries never count.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub link: Vec<BundleLink>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entry: Vec<BundleEntry>,
    /// Base address the entries' `fullUrl`s were built from.
    #[serde(skip)]
    pub resource_base: Option<String>,
    /// Summary mode the entries were rendered under.
    #[serde(skip)]
    pub summary: Option<SummaryMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub full_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resource: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub search: Option<BundleEntrySearch>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request: Option<BundleEntryRequest>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response: Option<BundleEntryResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntrySearch {
    pub mode: SearchEntryMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryRequest {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub if_none_exist: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outcome: Option<Value>,
}

/// How a history entry came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMethod {
    Create,
    Update,
    Delete,
}

impl HistoryMethod {
    /// Tombstones are deletes, the first version of a chain is the create,
    /// everything else is an update.
    pub fn of(resource: &Resource) -> Self {
        if resource.deleted {
            Self::Delete
        } else if resource.version_id.get() == 1 {
            Self::Create
        } else {
            Self::Update
        }
    }

    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Update => "PUT",
            Self::Delete => "DELETE",
        }
    }

    pub fn status(&self) -> StatusCategory {
        match self {
            Self::Create => StatusCategory::Created,
            Self::Update => StatusCategory::Ok,
            Self::Delete => StatusCategory::NoContent,
        }
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{base}/{path}")
    }
}

impl Bundle {
    fn new(bundle_type: BundleType, total: Option<u64>, entry: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            id: None,
            bundle_type,
            total,
            link: Vec::new(),
            entry,
            resource_base: None,
            summary: None,
        }
    }

    /// Search results. `outcome`, if any, is appended after the match
    /// entries and does not count towards `total`.
    pub fn searchset(total: u64, matches: Vec<BundleEntry>, outcome: Option<OperationOutcome>) -> Self {
        let mut entry = matches;
        if let Some(outcome) = outcome {
            entry.push(BundleEntry::search_outcome(&outcome));
        }
        Self::new(BundleType::Searchset, Some(total), entry)
    }

    pub fn history(total: u64, entries: Vec<BundleEntry>) -> Self {
        Self::new(BundleType::History, Some(total), entries)
    }

    pub fn batch_response(entries: Vec<BundleEntry>) -> Self {
        Self::new(BundleType::BatchResponse, None, entries)
    }

    pub fn with_self_link(mut self, url: impl Into<String>) -> Self {
        self.link.push(BundleLink {
            relation: "self".to_string(),
            url: url.into(),
        });
        self
    }

    /// Stamps the base address and summary mode the bundle was built under.
    pub fn annotated(mut self, resource_base: impl Into<String>, summary: SummaryMode) -> Self {
        self.resource_base = Some(resource_base.into());
        self.summary = Some(summary);
        self
    }

    /// Entries in `match` mode.
    pub fn matches(&self) -> impl Iterator<Item = &BundleEntry> {
        self.entry.iter().filter(|e| {
            e.search
                .as_ref()
                .is_some_and(|s| s.mode == SearchEntryMode::Match)
        })
    }

    /// Entries in `outcome` mode.
    pub fn outcomes(&self) -> impl Iterator<Item = &BundleEntry> {
        self.entry.iter().filter(|e| {
            e.search
                .as_ref()
                .is_some_and(|s| s.mode == SearchEntryMode::Outcome)
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl BundleEntry {
    pub fn search_match(base: &str, resource: &Resource) -> Self {
        Self {
            full_url: Some(join_url(base, &resource.reference())),
            resource: Some(resource.to_json()),
            search: Some(BundleEntrySearch {
                mode: SearchEntryMode::Match,
            }),
            ..Default::default()
        }
    }

    pub fn search_outcome(outcome: &OperationOutcome) -> Self {
        Self {
            resource: Some(outcome.to_value()),
            search: Some(BundleEntrySearch {
                mode: SearchEntryMode::Outcome,
            }),
            ..Default::default()
        }
    }

    /// History entry for one stored version. Deletes carry no resource.
    pub fn history(base: &str, resource: &Resource) -> Self {
        let method = HistoryMethod::of(resource);
        let request_url = match method {
            HistoryMethod::Create => resource.resource_type.clone(),
            HistoryMethod::Update | HistoryMethod::Delete => resource.reference(),
        };
        Self {
            full_url: Some(join_url(base, &resource.reference())),
            resource: (method != HistoryMethod::Delete).then(|| resource.to_json()),
            search: None,
            request: Some(BundleEntryRequest {
                method: method.http_method().to_string(),
                url: request_url,
                if_none_exist: None,
            }),
            response: Some(BundleEntryResponse {
                status: method.status().to_string(),
                etag: Some(resource.version_id.etag()),
                last_modified: Some(resource.last_updated.to_string()),
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronofhir_core::{VersionId, now_utc};
    use serde_json::json;

    fn resource(version: u64, deleted: bool) -> Resource {
        Resource {
            resource_type: "Patient".into(),
            id: "p1".into(),
            version_id: VersionId::new(version).unwrap(),
            last_updated: now_utc(),
            deleted,
            content: if deleted { Value::Null } else { json!({"active": true}) },
        }
    }

    #[test]
    fn searchset_outcome_is_last_and_not_counted() {
        let matches = vec![BundleEntry::search_match("http://example.org/fhir", &resource(1, false))];
        let outcome = OperationOutcome::unsupported_params_warning(&[("name".into(), "x".into())]);
        let b = Bundle::searchset(7, matches, Some(outcome));

        assert_eq!(b.total, Some(7));
        assert_eq!(b.entry.len(), 2);
        assert_eq!(b.matches().count(), 1);
        assert_eq!(b.outcomes().count(), 1);
        let j = b.to_value();
        assert_eq!(j["type"], "searchset");
        assert_eq!(j["entry"][0]["fullUrl"], "http://example.org/fhir/Patient/p1");
        assert_eq!(j["entry"][0]["search"]["mode"], "match");
        assert_eq!(j["entry"][1]["search"]["mode"], "outcome");
        assert_eq!(j["entry"][1]["resource"]["resourceType"], "OperationOutcome");
    }

    #[test]
    fn history_entries_describe_the_write() {
        let create = BundleEntry::history("http://x", &resource(1, false));
        let update = BundleEntry::history("http://x", &resource(2, false));
        let delete = BundleEntry::history("http://x", &resource(3, true));

        let create_req = create.request.as_ref().unwrap();
        assert_eq!(create_req.method, "POST");
        assert_eq!(create_req.url, "Patient");
        assert_eq!(create.response.as_ref().unwrap().status, "201 Created");

        assert_eq!(update.request.as_ref().unwrap().method, "PUT");
        assert_eq!(update.response.as_ref().unwrap().etag.as_deref(), Some("W/\"2\""));

        assert_eq!(delete.request.as_ref().unwrap().method, "DELETE");
        assert_eq!(delete.request.as_ref().unwrap().url, "Patient/p1");
        assert!(delete.resource.is_none());
        assert_eq!(delete.response.as_ref().unwrap().status, "204 No Content");
    }

    #[test]
    fn annotations_are_not_serialized() {
        let b = Bundle::history(0, vec![]).annotated("http://x", SummaryMode::Data);
        assert_eq!(b.summary, Some(SummaryMode::Data));
        let j = b.to_value();
        assert!(j.get("resource_base").is_none());
        assert!(j.get("summary").is_none());
        assert_eq!(j["type"], "history");
    }

    #[test]
    fn batch_bundle_deserializes() {
        let j = json!({
            "resourceType": "Bundle",
            "type": "batch",
            "entry": [
                {"request": {"method": "GET", "url": "Patient/1"}},
                {"resource": {"resourceType": "Patient"},
                 "request": {"method": "POST", "url": "Patient", "ifNoneExist": "_id=1"}}
            ]
        });
        let b: Bundle = serde_json::from_value(j).unwrap();
        assert_eq!(b.bundle_type, BundleType::Batch);
        assert_eq!(b.entry.len(), 2);
        assert_eq!(b.entry[1].request.as_ref().unwrap().if_none_exist.as_deref(), Some("_id=1"));
        assert!(b.resource_base.is_none());
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://x/fhir/", "/Patient/1"), "http://x/fhir/Patient/1");
        assert_eq!(join_url("", "Patient/1"), "Patient/1");
    }
}
