//! Protocol-level types shared by the search engine and the server:
//! diagnostic outcomes, the error taxonomy with its status categories,
//! bundles and the capability statement.

mod bundle;
mod capability;
mod error;
mod outcome;

pub use bundle::{
    Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, BundleEntrySearch, BundleLink,
    BundleType, HistoryMethod, SearchEntryMode, join_url,
};
pub use capability::{
    CapabilityStatement, CapabilityStatementBuilder, CapabilityStatementRest,
    CapabilityStatementRestOperation, CapabilityStatementRestResource, ResourceInteraction,
    SearchParam,
};
pub use error::{ApiError, ApiResult, ErrorKind, StatusCategory};
pub use outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
