#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no index for namespace")]
    NamespaceNotFound,

    #[error("search limit must be positive")]
    InvalidLimit,

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("ann index error: {0}")]
    Ann(&'static str),
}
