//! Scopes and size estimates used by pushdown.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of named scopes a runner depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet {
    scopes: BTreeSet<String>,
}

impl ScopeSet {
    /// Create a new empty scope set
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: BTreeSet::new(),
        }
    }

    /// Add a scope
    pub fn add(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Add every scope of another set
    pub fn add_all(&mut self, other: &ScopeSet) {
        self.scopes.extend(other.scopes.iter().cloned());
    }

    /// Check if a scope is present
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Whether every scope of `other` is present here
    #[must_use]
    pub fn contains_all(&self, other: &ScopeSet) -> bool {
        other.scopes.is_subset(&self.scopes)
    }

    /// Number of scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Iterate over scopes in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            scopes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", scopes.join(","))
    }
}

/// Estimated number of rows a runner will output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeEstimate {
    /// Not estimable
    #[default]
    Unknown,
    /// Approximate row count
    Rows(usize),
}

impl SizeEstimate {
    /// Whether an estimate is available
    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Rows(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_set_add() {
        let mut scopes = ScopeSet::new();
        assert!(scopes.is_empty());

        scopes.add("orders");
        scopes.add("orders");
        assert_eq!(scopes.len(), 1);
        assert!(scopes.contains("orders"));
        assert!(!scopes.contains("users"));
    }

    #[test]
    fn test_scope_set_add_all() {
        let mut left: ScopeSet = ["a", "b"].into_iter().collect();
        let right: ScopeSet = ["b", "c"].into_iter().collect();
        left.add_all(&right);

        assert_eq!(left.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(left.contains_all(&right));
        assert!(!right.contains_all(&left));
    }

    #[test]
    fn test_scope_set_display() {
        let scopes: ScopeSet = ["y", "x"].into_iter().collect();
        assert_eq!(scopes.to_string(), "{x,y}");
    }

    #[test]
    fn test_size_estimate() {
        assert_eq!(SizeEstimate::default(), SizeEstimate::Unknown);
        assert!(!SizeEstimate::Unknown.is_known());
        assert!(SizeEstimate::Rows(0).is_known());
    }
}
