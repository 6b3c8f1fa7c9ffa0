use std::time::Duration;

use thiserror::Error;

/// Failures coming out of the store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool: {0}")]
    Pool(String),
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
}

/// Whole-call failures of the reservation/exemption core. Per-item conditions
/// (invalid codes, missing catalog entries, duplicate reservation rows) are
/// never represented here; they travel alongside successes instead.
#[derive(Debug, Error)]
pub enum Error {
    /// No storage row with `available = true` exists right now. Not a fault.
    #[error("no available storage")]
    NoStorageAvailable,
    /// The store returned a storage row without an id.
    #[error("storage id is missing")]
    NilStorageId,
    /// The store produced no result set at all for a product lookup.
    #[error("product lookup returned no result set")]
    NilProducts,
    /// None of the requested codes resolved to a catalog record.
    #[error("no requested product could be resolved")]
    EmptyProducts,
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}
