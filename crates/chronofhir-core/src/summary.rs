//! `_summary` handling.
//!
//! Subsetting is applied to the rendered JSON of a resource. Modes that
//! remove content also mark the resource with the `SUBSETTED` tag so
//! clients can tell the representation is incomplete.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::CoreError;

pub const SUBSETTED_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationValue";
pub const SUBSETTED_CODE: &str = "SUBSETTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Full content.
    #[default]
    False,
    /// Drop narrative and contained resources.
    True,
    /// Left to the presentation layer.
    Text,
    /// Drop narrative only.
    Data,
    /// Bundle totals only.
    Count,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::False => "false",
            Self::True => "true",
            Self::Text => "text",
            Self::Data => "data",
            Self::Count => "count",
        }
    }

    /// Whether this mode removes content from individual resources.
    pub fn is_subsetting(&self) -> bool {
        matches!(self, Self::True | Self::Data)
    }

    /// Whether bundles built under this mode carry no match entries.
    pub fn omits_entries(&self) -> bool {
        matches!(self, Self::Count)
    }

    pub fn apply(&self, resource: &mut Value) {
        let Some(obj) = resource.as_object_mut() else {
            return;
        };
        match self {
            Self::True => {
                obj.remove("text");
                obj.remove("contained");
            }
            Self::Data => {
                obj.remove("text");
            }
            Self::False | Self::Text | Self::Count => return,
        }
        add_subsetted_tag(resource);
    }
}

impl fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(Self::False),
            "true" => Ok(Self::True),
            "text" => Ok(Self::Text),
            "data" => Ok(Self::Data),
            "count" => Ok(Self::Count),
            _ => Err(CoreError::InvalidSummaryMode(s.to_string())),
        }
    }
}

fn add_subsetted_tag(resource: &mut Value) {
    let Some(obj) = resource.as_object_mut() else {
        return;
    };
    let meta = obj.entry("meta").or_insert_with(|| json!({}));
    if !meta.is_object() {
        *meta = json!({});
    }
    let Some(meta) = meta.as_object_mut() else {
        return;
    };
    let tags = meta.entry("tag").or_insert_with(|| json!([]));
    if !tags.is_array() {
        *tags = json!([]);
    }
    if let Some(tags) = tags.as_array_mut() {
        let already = tags.iter().any(|t| {
            t.get("system").and_then(Value::as_str) == Some(SUBSETTED_SYSTEM)
                && t.get("code").and_then(Value::as_str) == Some(SUBSETTED_CODE)
        });
        if !already {
            tags.push(json!({
                "system": SUBSETTED_SYSTEM,
                "code": SUBSETTED_CODE,
                "display": "Resource encoded in summary mode"
            }));
        }
    }
}

/// Returns `true` when the resource carries the `SUBSETTED` tag.
pub fn is_subsetted(resource: &Value) -> bool {
    resource
        .pointer("/meta/tag")
        .and_then(Value::as_array)
        .is_some_and(|tags| {
            tags.iter()
                .any(|t| t.get("code").and_then(Value::as_str) == Some(SUBSETTED_CODE))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "p1",
            "text": {"status": "generated", "div": "<div>Jane</div>"},
            "contained": [{"resourceType": "Organization", "id": "o1"}],
            "name": [{"family": "Doe"}]
        })
    }

    #[test]
    fn true_strips_text_and_contained() {
        let mut r = sample();
        SummaryMode::True.apply(&mut r);
        assert!(r.get("text").is_none());
        assert!(r.get("contained").is_none());
        assert_eq!(r["name"][0]["family"], "Doe");
        assert!(is_subsetted(&r));
    }

    #[test]
    fn data_strips_text_only() {
        let mut r = sample();
        SummaryMode::Data.apply(&mut r);
        assert!(r.get("text").is_none());
        assert!(r.get("contained").is_some());
        assert!(is_subsetted(&r));
    }

    #[test]
    fn text_false_and_count_leave_content_alone() {
        for mode in [SummaryMode::False, SummaryMode::Text, SummaryMode::Count] {
            let mut r = sample();
            mode.apply(&mut r);
            assert_eq!(r, sample(), "mode {mode} must not filter");
        }
    }

    #[test]
    fn tag_is_not_duplicated() {
        let mut r = sample();
        SummaryMode::True.apply(&mut r);
        SummaryMode::Data.apply(&mut r);
        assert_eq!(r["meta"]["tag"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_is_case_insensitive_and_strict() {
        assert_eq!("TRUE".parse::<SummaryMode>().unwrap(), SummaryMode::True);
        assert_eq!("count".parse::<SummaryMode>().unwrap(), SummaryMode::Count);
        assert!("everything".parse::<SummaryMode>().is_err());
        assert_eq!(SummaryMode::default(), SummaryMode::False);
    }
}
