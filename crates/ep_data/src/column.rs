//! Typed column backed by shared, immutable storage.
//!
//! A column is a `[start, end)` view over an `Arc`'d vector, so slicing and
//! cloning never copy values. Absent values are stored as `None`.

use crate::error::{DataError, DataResult};
use crate::value::{Value, compare_opt};
use ep_core::{Compare, Type};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A typed column of optional values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "ColumnRepr", try_from = "ColumnRepr")]
pub struct Column {
    ty: Type,
    values: Arc<[Option<Value>]>,
    start: usize,
    end: usize,
}

impl Column {
    /// Create a column, checking every present value against `ty`.
    ///
    /// # Errors
    ///
    /// Returns error if a value does not match the column type, or if the
    /// column type is a wildcard
    pub fn new(ty: Type, values: Vec<Option<Value>>) -> DataResult<Self> {
        if ty.is_wildcard() {
            return Err(DataError::Unsupported(format!("column of type {}", ty)));
        }
        for value in values.iter().flatten() {
            let actual = value.ty();
            if actual != ty {
                return Err(DataError::TypeMismatch {
                    expected: ty,
                    actual,
                });
            }
        }
        Ok(Self::from_checked(ty, values.into()))
    }

    fn from_checked(ty: Type, values: Arc<[Option<Value>]>) -> Self {
        let end = values.len();
        Self {
            ty,
            values,
            start: 0,
            end,
        }
    }

    /// Create a column, taking its type from the first present value.
    /// An all-null column has type [`Type::Null`].
    ///
    /// # Errors
    ///
    /// Returns error if values of different types are mixed
    pub fn infer(values: Vec<Option<Value>>) -> DataResult<Self> {
        let ty = values
            .iter()
            .flatten()
            .next()
            .map_or(Type::Null, Value::ty);
        Self::new(ty, values)
    }

    /// Integer column without nulls
    #[must_use]
    pub fn ints(values: impl IntoIterator<Item = i64>) -> Self {
        let values = values.into_iter().map(|v| Some(Value::Int(v))).collect();
        Self::from_checked(Type::Integer, values)
    }

    /// String column without nulls
    #[must_use]
    pub fn strs<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let values = values
            .into_iter()
            .map(|v| Some(Value::Str(v.into())))
            .collect();
        Self::from_checked(Type::Str, values)
    }

    /// Boolean column without nulls
    #[must_use]
    pub fn bools(values: impl IntoIterator<Item = bool>) -> Self {
        let values = values.into_iter().map(|v| Some(Value::Bool(v))).collect();
        Self::from_checked(Type::Bool, values)
    }

    /// Column type
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible values
    #[must_use]
    pub fn values(&self) -> &[Option<Value>] {
        &self.values[self.start..self.end]
    }

    /// Value at a row, `None` when absent or out of range
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values().get(row).and_then(Option::as_ref)
    }

    /// Sub-range view `[start, end)` sharing the same storage.
    ///
    /// # Errors
    ///
    /// Returns error if the range is inverted or exceeds the column
    pub fn slice(&self, start: usize, end: usize) -> DataResult<Self> {
        if start > end || end > self.len() {
            return Err(DataError::SliceOutOfRange {
                start,
                end,
                len: self.len(),
            });
        }
        Ok(Self {
            ty: self.ty.clone(),
            values: Arc::clone(&self.values),
            start: self.start + start,
            end: self.start + end,
        })
    }

    /// Repeat the visible rows `n` times. For a single-row column this
    /// yields `n` copies of that row.
    #[must_use]
    pub fn duplicate(&self, n: usize) -> Self {
        let rows = self.values();
        let mut values = Vec::with_capacity(rows.len() * n);
        for _ in 0..n {
            values.extend_from_slice(rows);
        }
        Self::from_checked(self.ty.clone(), values.into())
    }

    /// Append the rows of another column of the same type.
    ///
    /// A [`Type::Null`] column is compatible with every type.
    ///
    /// # Errors
    ///
    /// Returns error if the types are incompatible
    pub fn append(&self, other: &Column) -> DataResult<Self> {
        let ty = match (&self.ty, &other.ty) {
            (l, r) if l == r => l.clone(),
            (Type::Null, r) => r.clone(),
            (l, Type::Null) => l.clone(),
            (l, r) => {
                return Err(DataError::TypeMismatch {
                    expected: l.clone(),
                    actual: r.clone(),
                });
            }
        };
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(self.values());
        values.extend_from_slice(other.values());
        Ok(Self::from_checked(ty, values.into()))
    }

    /// Compare row by row against another column of the same length.
    ///
    /// # Errors
    ///
    /// Returns error on a length mismatch or when present values differ
    /// in type
    pub fn compare(&self, other: &Column) -> DataResult<Vec<Compare>> {
        if self.len() != other.len() {
            return Err(DataError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        self.values()
            .iter()
            .zip(other.values())
            .map(|(l, r)| compare_opt(l.as_ref(), r.as_ref()))
            .collect()
    }

    /// Display string of a single row
    #[must_use]
    pub fn row_string(&self, row: usize) -> String {
        match self.get(row) {
            Some(value) => value.to_string(),
            None => "NULL".to_string(),
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.values() == other.values()
    }
}

impl Eq for Column {}

#[derive(Serialize, Deserialize)]
struct ColumnRepr {
    ty: Type,
    values: Vec<Option<Value>>,
}

impl From<Column> for ColumnRepr {
    fn from(col: Column) -> Self {
        Self {
            values: col.values().to_vec(),
            ty: col.ty,
        }
    }
}

impl TryFrom<ColumnRepr> for Column {
    type Error = DataError;

    fn try_from(repr: ColumnRepr) -> DataResult<Self> {
        Column::new(repr.ty, repr.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_types() {
        let col = Column::new(Type::Integer, vec![Some(Value::Int(1)), None]).unwrap();
        assert_eq!(col.len(), 2);
        assert_eq!(col.get(1), None);

        let err = Column::new(Type::Integer, vec![Some(Value::from("a"))]).unwrap_err();
        assert!(matches!(err, DataError::TypeMismatch { .. }));

        assert!(Column::new(Type::wildcard(), vec![]).is_err());
    }

    #[test]
    fn test_infer() {
        let col = Column::infer(vec![None, Some(Value::from("x"))]).unwrap();
        assert_eq!(col.ty(), &Type::Str);

        let col = Column::infer(vec![None, None]).unwrap();
        assert_eq!(col.ty(), &Type::Null);

        assert!(Column::infer(vec![Some(Value::Int(1)), Some(Value::from("x"))]).is_err());
    }

    #[test]
    fn test_slice_is_a_view() {
        let col = Column::ints([1, 2, 3, 4]);
        let sliced = col.slice(1, 3).unwrap();
        assert_eq!(sliced, Column::ints([2, 3]));
        assert!(Arc::ptr_eq(&col.values, &sliced.values));

        let nested = sliced.slice(1, 2).unwrap();
        assert_eq!(nested, Column::ints([3]));

        assert!(col.slice(3, 2).is_err());
        assert!(col.slice(0, 5).is_err());
        assert!(col.slice(4, 4).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate() {
        let col = Column::strs(["a"]);
        assert_eq!(col.duplicate(3), Column::strs(["a", "a", "a"]));
        assert!(col.duplicate(0).is_empty());

        let col = Column::ints([1, 2]);
        assert_eq!(col.duplicate(2), Column::ints([1, 2, 1, 2]));
    }

    #[test]
    fn test_append() {
        let col = Column::ints([1]).append(&Column::ints([2])).unwrap();
        assert_eq!(col, Column::ints([1, 2]));

        let nulls = Column::infer(vec![None]).unwrap();
        let col = nulls.append(&Column::ints([5])).unwrap();
        assert_eq!(col.ty(), &Type::Integer);
        assert_eq!(col.len(), 2);

        assert!(Column::ints([1]).append(&Column::strs(["a"])).is_err());
    }

    #[test]
    fn test_compare() {
        let left = Column::new(Type::Integer, vec![Some(Value::Int(1)), None, Some(Value::Int(3)), None])
            .unwrap();
        let right = Column::new(Type::Integer, vec![Some(Value::Int(1)), None, Some(Value::Int(2)), Some(Value::Int(0))])
            .unwrap();
        assert_eq!(
            left.compare(&right).unwrap(),
            vec![Compare::Equal, Compare::BothNulls, Compare::Greater, Compare::Null]
        );

        assert!(left.compare(&Column::ints([1])).is_err());
    }

    #[test]
    fn test_row_string() {
        let col = Column::infer(vec![Some(Value::from("a")), None]).unwrap();
        assert_eq!(col.row_string(0), "a");
        assert_eq!(col.row_string(1), "NULL");
    }

    #[test]
    fn test_serde_keeps_only_visible_rows() {
        let col = Column::ints([1, 2, 3]).slice(1, 2).unwrap();
        let json = serde_json::to_string(&col).unwrap();
        let back: Column = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Column::ints([2]));
    }

    #[test]
    fn test_serde_rejects_bad_types() {
        let json = r#"{"ty":"Integer","values":[{"Str":"a"}]}"#;
        assert!(serde_json::from_str::<Column>(json).is_err());
    }
}
