use thiserror::Error;

/// Errors returned by ring construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The node table cannot produce a usable ring
    /// (no nodes, all weights zero, or a repeated identifier).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lookup was made against a ring that has no virtual points.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A digest name other than `md5` or `murmur`.
    #[error("unknown digest kind: {0:?} (expected \"md5\" or \"murmur\")")]
    UnknownDigest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
