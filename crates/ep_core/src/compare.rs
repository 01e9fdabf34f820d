//! Comparison results.
//!
//! Every row-level comparison in the system reduces to exactly one
//! [`Compare`] value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Outcome of comparing two row values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compare {
    /// Both values are present and equal, e.g. `1 == 1`
    Equal,
    /// Both values are absent, e.g. `null == null`
    BothNulls,
    /// Exactly one of the values is absent, e.g. `1 == null`
    Null,
    /// The left value is greater, e.g. `2 > 1`
    Greater,
    /// The left value is smaller, e.g. `1 < 2`
    Less,
}

impl Compare {
    /// Whether the comparison found two equal, present values
    #[must_use]
    pub const fn is_equal(self) -> bool {
        matches!(self, Self::Equal)
    }

    /// Whether at least one side was absent
    #[must_use]
    pub const fn involves_null(self) -> bool {
        matches!(self, Self::Null | Self::BothNulls)
    }
}

impl From<Ordering> for Compare {
    fn from(ord: Ordering) -> Self {
        match ord {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

/// Compare two possibly-absent values.
#[must_use]
pub fn compare_values<T: Ord + ?Sized>(left: Option<&T>, right: Option<&T>) -> Compare {
    match (left, right) {
        (None, None) => Compare::BothNulls,
        (None, Some(_)) | (Some(_), None) => Compare::Null,
        (Some(l), Some(r)) => l.cmp(r).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(Some(&1), Some(&1)), Compare::Equal);
        assert_eq!(compare_values(Some(&2), Some(&1)), Compare::Greater);
        assert_eq!(compare_values(Some(&1), Some(&2)), Compare::Less);
        assert_eq!(compare_values::<i64>(None, None), Compare::BothNulls);
        assert_eq!(compare_values(Some(&1), None), Compare::Null);
        assert_eq!(compare_values(None, Some(&1)), Compare::Null);
    }

    #[test]
    fn test_compare_str() {
        assert_eq!(compare_values(Some("a"), Some("b")), Compare::Less);
        assert_eq!(compare_values(Some("b"), Some("b")), Compare::Equal);
    }

    #[test]
    fn test_helpers() {
        assert!(Compare::Equal.is_equal());
        assert!(!Compare::BothNulls.is_equal());
        assert!(Compare::Null.involves_null());
        assert!(!Compare::Less.involves_null());
    }

    proptest! {
        #[test]
        fn prop_compare_exhaustive(left: Option<i64>, right: Option<i64>) {
            let result = compare_values(left.as_ref(), right.as_ref());
            let expected = match (left, right) {
                (None, None) => Compare::BothNulls,
                (None, _) | (_, None) => Compare::Null,
                (Some(l), Some(r)) if l == r => Compare::Equal,
                (Some(l), Some(r)) if l > r => Compare::Greater,
                _ => Compare::Less,
            };
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn prop_compare_antisymmetric(left: Option<String>, right: Option<String>) {
            let forward = compare_values(left.as_deref(), right.as_deref());
            let backward = compare_values(right.as_deref(), left.as_deref());
            let mirrored = match forward {
                Compare::Greater => Compare::Less,
                Compare::Less => Compare::Greater,
                other => other,
            };
            prop_assert_eq!(backward, mirrored);
        }
    }
}
