//! In-memory version store for ChronoFHIR.
//!
//! Chains are kept in a `DashMap` keyed by `Type/id`. A write holds the
//! shard lock for its key while it checks the expected version and appends,
//! which gives per-chain compare-and-swap without a global lock.
//!
//! # Example
//!
//! ```ignore
//! use chronofhir_db_memory::InMemoryVersionStore;
//! use chronofhir_storage::{ExpectedVersion, NewVersion, VersionStore};
//!
//! let store = InMemoryVersionStore::new();
//! let entry = store
//!     .write_next(
//!         NewVersion::content("Patient", "p1", serde_json::json!({"active": true})),
//!         ExpectedVersion::NoChain,
//!     )
//!     .await?;
//! assert_eq!(entry.version_id().get(), 1);
//! ```

mod storage;

pub use storage::InMemoryVersionStore;
