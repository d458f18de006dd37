//! Directory-backed version store for ChronoFHIR.
//!
//! Every version is one JSON file named `{type}.{id}.{version}.json` under
//! a root directory. Files are written once through a temporary name and
//! renamed into place, so readers only ever see complete versions.
//!
//! Directory listings are not a safe basis for compare-and-swap, so the
//! store keeps an in-memory pointer to each chain's current version,
//! rebuilt from the directory on [`DirectoryVersionStore::open`], and
//! serializes writers of one chain with a per-key async mutex.

mod naming;
mod store;

pub use naming::VersionFileName;
pub use store::DirectoryVersionStore;
