use thiserror::Error;

/// Rejections raised before any tensor work is attempted.
///
/// Failures inside a forward pass are burn shape panics and are not covered here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StblnError {
    #[error("invalid network config: {0}")]
    InvalidConfig(String),

    /// The input batch does not match the configured `[N, C, T, V, M]` layout.
    #[error("input shape mismatch: expected {expected}, got {actual:?}")]
    InputShape { expected: String, actual: [usize; 5] },
}

pub type StblnResult<T> = Result<T, StblnError>;
