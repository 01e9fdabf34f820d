//! ep Data
//!
//! Immutable, typed, columnar batches. A [`Dataset`] is one batch of rows
//! flowing between runners; every operation returns a new value and never
//! mutates in place, so batches can be shared across tasks by reference.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod dataset;
pub mod error;
pub mod value;

pub use column::Column;
pub use dataset::Dataset;
pub use error::{DataError, DataResult};
pub use value::Value;
