//! Result type aliases for the mosaic workspace.

use crate::MosaicError;

/// A specialized `Result` type for application-level operations.
pub type MosaicResult<T> = Result<T, MosaicError>;
