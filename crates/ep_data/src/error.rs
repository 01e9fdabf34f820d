//! Data errors.

use ep_core::{CoreError, Type};
use thiserror::Error;

/// Data result type
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised by column and dataset operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Two sides of an operation have a different number of rows
    #[error("row count mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Rows on the left
        left: usize,
        /// Rows on the right
        right: usize,
    },

    /// Two datasets have a different number of columns
    #[error("width mismatch: {left} vs {right}")]
    WidthMismatch {
        /// Columns on the left
        left: usize,
        /// Columns on the right
        right: usize,
    },

    /// A value or column does not have the expected type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type
        expected: Type,
        /// Actual type
        actual: Type,
    },

    /// A slice range falls outside the column
    #[error("slice [{start}..{end}] out of range for {len} rows")]
    SliceOutOfRange {
        /// Range start
        start: usize,
        /// Range end
        end: usize,
        /// Rows available
        len: usize,
    },

    /// A JSON value has no column representation
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

impl From<DataError> for CoreError {
    fn from(err: DataError) -> Self {
        CoreError::Data {
            message: err.to_string(),
        }
    }
}
