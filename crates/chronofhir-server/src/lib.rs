//! ChronoFHIR server core.
//!
//! Resource repositories, the history log, named operations, the system
//! facade and the protocol dispatcher, plus configuration and tracing
//! setup for the `chronofhir` binary. Wire transport is left to the
//! embedding application: it decodes requests into
//! [`ProtocolRequest`]s and maps [`ProtocolResponse`]s back.

mod batch;
pub mod config;
pub mod dispatcher;
pub mod history;
pub mod observability;
pub mod operations;
pub mod repository;
pub mod server;
pub mod system;

pub use dispatcher::{Dispatcher, Interaction, ProtocolBody, ProtocolRequest, ProtocolResponse};
pub use history::{HistoryLog, HistoryPage, HistoryRange, HistoryScope};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use operations::{
    OperationContext, OperationError, OperationHandler, OperationRegistry, SystemOperationContext,
};
pub use repository::{
    BundleOptions, DeleteOutcome, ResourceRepository, StoreBackedRepository, WriteOptions,
    WriteOutcome,
};
pub use server::{ChronoServer, ServerBuilder};
pub use system::{DynRepository, SystemFacade, SystemFacadeBuilder};
