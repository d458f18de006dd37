pub mod context;
pub mod datetime;
pub mod error;
pub mod id;
pub mod resource;
pub mod summary;

pub use context::{PreferReturn, RequestContext, RequestContextBuilder};
pub use datetime::{FhirDateTime, now_not_before, now_utc};
pub use error::{CoreError, ErrorCategory, Result};
pub use id::{IdError, MAX_ID_LENGTH, generate_id, validate_id, validate_resource_type};
pub use resource::{Resource, VersionId, content_id, content_resource_type, strip_server_meta};
pub use summary::SummaryMode;
