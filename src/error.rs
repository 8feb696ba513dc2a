use thiserror::Error;

/// Errors surfaced by the clustering engine.
///
/// Reaching the iteration limit is not an error; see [`crate::Phase`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KMeansError {
    /// Mismatching dimensionality, vector / matrix lengths or pinned-mask length.
    #[error("shape error: {0}")]
    Shape(String),
    /// A requested count does not fit the available data.
    #[error("range error: {0}")]
    Range(String),
    /// A non-pinned cluster lost all of its members while recentering
    /// (only raised with [`crate::EmptyClusterPolicy::Fail`]).
    #[error("cluster {cluster} has no members left")]
    DegenerateCluster { cluster: usize },
}

pub type Result<T> = std::result::Result<T, KMeansError>;
