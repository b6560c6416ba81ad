//! Catalog and selection error types.

use thiserror::Error;

use flotilla_state::ResourceVector;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from catalog construction and instance-type selection.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate instance type in allow-list: {0}")]
    DuplicateName(String),

    #[error("no allow-listed instance type for arch {arch} covers cpus={} mem={}", demand.cpus, demand.mem)]
    Stall {
        arch: String,
        demand: ResourceVector,
    },
}
