use serde::{Deserialize, Serialize};
use serde_json::Value;

/// FHIR issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// FHIR issue type code (the subset this server emits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    NotFound,
    Deleted,
    Conflict,
    NotSupported,
    Exception,
    Informational,
}

/// Minimal FHIR OperationOutcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    pub fn single(severity: IssueSeverity, code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity,
                code,
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    /// An informational outcome, used when the client prefers an outcome
    /// over the resource and for operations that only report.
    pub fn information(message: impl Into<String>) -> Self {
        Self::single(IssueSeverity::Information, IssueType::Informational, message)
    }

    /// One warning listing every search parameter that was ignored, as
    /// `k=v&k2=v2`.
    pub fn unsupported_params_warning(params: &[(String, String)]) -> Self {
        let listed = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Self::single(
            IssueSeverity::Warning,
            IssueType::NotSupported,
            format!("Unsupported search parameters used: {listed}"),
        )
    }

    /// Check if this outcome has any issues.
    pub fn has_issues(&self) -> bool {
        !self.issue.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
