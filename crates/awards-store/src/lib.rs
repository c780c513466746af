//! awards-store
//!
//! LanceDB persistence for the canonical facts table, the per-dimension
//! rollups, the search projection and a small key/value meta table.

pub mod artifacts;
pub mod convert;
pub mod schema;
pub mod table;

pub use artifacts::{ArtifactStore, META_TABLE};
