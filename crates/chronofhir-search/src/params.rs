use chronofhir_core::SummaryMode;

use crate::error::SearchError;

/// Parameters that shape the result without filtering.
const RESULT_PARAMS: &[&str] = &["_count", "_summary", "_format", "_sort"];

/// A parsed search request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParameters {
    /// One entry per `_id` occurrence; each is an OR list, occurrences AND.
    pub ids: Vec<Vec<String>>,
    pub count: Option<usize>,
    pub summary: Option<SummaryMode>,
    /// Everything not understood, in request order.
    pub unsupported: Vec<(String, String)>,
}

impl SearchParameters {
    pub fn parse(pairs: &[(String, String)]) -> Result<Self, SearchError> {
        let mut params = Self::default();
        for (name, value) in pairs {
            match name.as_str() {
                "_id" => params.ids.push(
                    value
                        .split(',')
                        .map(sanitize_id)
                        .filter(|id| !id.is_empty())
                        .collect(),
                ),
                "_count" => {
                    let count = value.trim().parse::<usize>().map_err(|_| {
                        SearchError::invalid_parameter("_count", format!("'{value}' is not a count"))
                    })?;
                    params.count = Some(count);
                }
                "_summary" => {
                    let mode = value
                        .parse::<SummaryMode>()
                        .map_err(|e| SearchError::invalid_parameter("_summary", e.to_string()))?;
                    params.summary = Some(mode);
                }
                other if RESULT_PARAMS.contains(&other) => {}
                _ => params.unsupported.push((name.clone(), value.clone())),
            }
        }
        Ok(params)
    }

    pub fn has_filters(&self) -> bool {
        !self.ids.is_empty()
    }

    /// Ids that satisfy every `_id` occurrence, in first-occurrence order.
    pub fn candidate_ids(&self) -> Vec<String> {
        let Some((first, rest)) = self.ids.split_first() else {
            return Vec::new();
        };
        let mut out: Vec<String> = Vec::new();
        for id in first {
            if rest.iter().all(|set| set.contains(id)) && !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }
}

/// Strips path separators so an `_id` value can never address anything
/// outside its resource type.
pub fn sanitize_id(raw: &str) -> String {
    raw.trim().chars().filter(|c| !matches!(c, '/' | '\\')).collect()
}

/// Splits a URL query string (with or without the leading `?`) into
/// decoded pairs, keeping order and repeats.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
