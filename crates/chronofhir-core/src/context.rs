//! Per-request context.
//!
//! A [`RequestContext`] is built once by the transport layer and then
//! passed by reference through dispatch. Nothing mutates it after
//! construction; batch processing derives fresh contexts per entry.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::summary::SummaryMode;

/// Response shaping requested by the client for create and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferReturn {
    /// Return the written resource.
    #[default]
    Representation,
    /// Body suppressed by the transport; metadata still returned.
    Minimal,
    /// Replace the result with an informational OperationOutcome.
    OperationOutcome,
}

impl PreferReturn {
    /// Parses a `Prefer` header value such as `return=minimal`.
    ///
    /// Unknown or missing `return` preferences fall back to the default.
    pub fn from_header(value: &str) -> Self {
        value
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("return="))
            .find_map(|v| v.trim_matches('"').parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for PreferReturn {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "representation" => Ok(Self::Representation),
            "minimal" => Ok(Self::Minimal),
            "OperationOutcome" => Ok(Self::OperationOutcome),
            other => Err(CoreError::configuration(format!(
                "unknown Prefer return value '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PreferReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Representation => write!(f, "representation"),
            Self::Minimal => write!(f, "minimal"),
            Self::OperationOutcome => write!(f, "OperationOutcome"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    principal: Option<String>,
    correlation_id: String,
    base_uri: String,
    conditional: Vec<(String, String)>,
    summary: SummaryMode,
    page_size: Option<usize>,
    prefer: PreferReturn,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// The already-authenticated caller, if the transport supplied one.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Externally visible base address, without a trailing slash.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Filter parameters for conditional create, update and delete.
    pub fn conditional(&self) -> &[(String, String)] {
        &self.conditional
    }

    pub fn summary(&self) -> SummaryMode {
        self.summary
    }

    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    pub fn prefer(&self) -> PreferReturn {
        self.prefer
    }

    /// A context for one entry of a batch: same caller and base, own
    /// conditional parameters and correlation suffix.
    pub fn for_batch_entry(&self, index: usize, conditional: Vec<(String, String)>) -> Self {
        Self {
            principal: self.principal.clone(),
            correlation_id: format!("{}#{index}", self.correlation_id),
            base_uri: self.base_uri.clone(),
            conditional,
            summary: self.summary,
            page_size: self.page_size,
            prefer: self.prefer,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContextBuilder::default().build()
    }
}

#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    principal: Option<String>,
    correlation_id: Option<String>,
    base_uri: Option<String>,
    conditional: Vec<(String, String)>,
    summary: SummaryMode,
    page_size: Option<usize>,
    prefer: PreferReturn,
}

impl RequestContextBuilder {
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn base_uri(mut self, base: impl Into<String>) -> Self {
        self.base_uri = Some(base.into());
        self
    }

    pub fn conditional(mut self, params: Vec<(String, String)>) -> Self {
        self.conditional = params;
        self
    }

    pub fn conditional_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditional.push((name.into(), value.into()));
        self
    }

    pub fn summary(mut self, summary: SummaryMode) -> Self {
        self.summary = summary;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn prefer(mut self, prefer: PreferReturn) -> Self {
        self.prefer = prefer;
        self
    }

    pub fn build(self) -> RequestContext {
        let correlation_id = self
            .correlation_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let base_uri = self
            .base_uri
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        RequestContext {
            principal: self.principal,
            correlation_id,
            base_uri,
            conditional: self.conditional,
            summary: self.summary,
            page_size: self.page_size,
            prefer: self.prefer,
        }
    }
}
