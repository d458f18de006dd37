//! Named operations (`$code`) on the system, types and instances.

mod builtin;
mod handler;
mod registry;

pub use builtin::{InstanceCountOperation, VersionsOperation};
pub use handler::{
    DynOperationHandler, OperationContext, OperationError, OperationHandler,
    SystemOperationContext,
};
pub use registry::OperationRegistry;
