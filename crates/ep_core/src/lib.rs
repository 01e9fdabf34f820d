//! ep Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Everything the runtime, the data layer and the distribution boundary
//! need to agree on lives here: errors, schema types, comparison results
//! and scopes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compare;
pub mod error;
pub mod id;
pub mod scope;
pub mod types;

// Re-exports
pub use compare::{Compare, compare_values};
pub use error::{CoreError, CoreResult, first_error};
pub use id::RunId;
pub use scope::{ScopeSet, SizeEstimate};
pub use types::{Type, Wildcard};
