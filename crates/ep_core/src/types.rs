//! Schema types.
//!
//! A runner declares its output schema as an ordered list of [`Type`].
//! [`Type::Wildcard`] stands for "whatever the input was" and is resolved
//! by the enclosing pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A column type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Null-only column
    Null,
    /// Boolean column
    Bool,
    /// 64-bit signed integer column
    Integer,
    /// UTF-8 string column
    Str,
    /// Placeholder, inferred from the previous stage's output
    Wildcard(Wildcard),
}

impl Type {
    /// A plain wildcard: the entire input schema
    #[must_use]
    pub const fn wildcard() -> Self {
        Self::Wildcard(Wildcard::all())
    }

    /// Whether this type is still a placeholder
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard(_))
    }

    /// Human readable type name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Str => "string",
            Self::Wildcard(_) => "*",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard(w) => write!(f, "{}", w),
            other => f.write_str(other.name()),
        }
    }
}

/// Wildcard placeholder
///
/// With no modifiers it expands to the whole input schema. `cut_from_tail`
/// drops that many trailing types before expansion; `idx` narrows the
/// expansion to a single input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Wildcard {
    /// Number of trailing input types to drop
    pub cut_from_tail: usize,
    /// Pick a single input type by position
    pub idx: Option<usize>,
}

impl Wildcard {
    /// Wildcard for the entire input
    #[must_use]
    pub const fn all() -> Self {
        Self {
            cut_from_tail: 0,
            idx: None,
        }
    }

    /// Wildcard for a single input column
    #[must_use]
    pub const fn column(idx: usize) -> Self {
        Self {
            cut_from_tail: 0,
            idx: Some(idx),
        }
    }

    /// Drop `n` trailing types from the input
    #[must_use]
    pub const fn cut_tail(mut self, n: usize) -> Self {
        self.cut_from_tail = n;
        self
    }

    /// Resolve this wildcard against the previous stage's output types.
    ///
    /// Trailing types are cut first, then the index (if any) is applied to
    /// what remains. An index past the end resolves to nothing.
    #[must_use]
    pub fn resolve(&self, prev: &[Type]) -> Vec<Type> {
        let keep = prev.len().saturating_sub(self.cut_from_tail);
        let prev = &prev[..keep];
        match self.idx {
            Some(idx) => prev.get(idx).cloned().into_iter().collect(),
            None => prev.to_vec(),
        }
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*")?;
        if let Some(idx) = self.idx {
            write!(f, "[{}]", idx)?;
        }
        if self.cut_from_tail > 0 {
            write!(f, "-{}", self.cut_from_tail)?;
        }
        Ok(())
    }
}

impl From<Wildcard> for Type {
    fn from(w: Wildcard) -> Self {
        Self::Wildcard(w)
    }
}
