mod decode_error;

pub use decode_error::ReError;

/// Result alias used across every crate in the pipeline workspace.
pub type CResult<T> = Result<T, ReError>;
