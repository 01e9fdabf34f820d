//! Rectangular batches of columns.

use crate::column::Column;
use crate::error::{DataError, DataResult};
use crate::value::Value;
use ep_core::{Compare, Type};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One batch of rows across zero or more columns.
///
/// Every column has the same number of rows. Cloning a dataset is cheap:
/// columns share their storage, so handing the same batch to several
/// consumers never copies values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Column>", try_from = "Vec<Column>")]
pub struct Dataset {
    columns: Arc<[Column]>,
}

impl Dataset {
    /// Create a dataset, checking that all columns have the same length.
    ///
    /// # Errors
    ///
    /// Returns error if columns differ in length
    pub fn new(columns: Vec<Column>) -> DataResult<Self> {
        if let Some(first) = columns.first() {
            for col in &columns[1..] {
                if col.len() != first.len() {
                    return Err(DataError::LengthMismatch {
                        left: first.len(),
                        right: col.len(),
                    });
                }
            }
        }
        Ok(Self {
            columns: columns.into(),
        })
    }

    /// Dataset with no columns and no rows
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single-column dataset
    #[must_use]
    pub fn from_column(column: Column) -> Self {
        Self {
            columns: vec![column].into(),
        }
    }

    /// Build from rows, inferring each column's type.
    ///
    /// # Errors
    ///
    /// Returns error if rows differ in width or a column mixes types
    pub fn from_rows(rows: Vec<Vec<Option<Value>>>) -> DataResult<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let mut cols: Vec<Vec<Option<Value>>> = vec![Vec::with_capacity(rows.len()); width];
        for row in rows {
            if row.len() != width {
                return Err(DataError::WidthMismatch {
                    left: width,
                    right: row.len(),
                });
            }
            for (col, value) in cols.iter_mut().zip(row) {
                col.push(value);
            }
        }
        let columns = cols
            .into_iter()
            .map(Column::infer)
            .collect::<DataResult<Vec<_>>>()?;
        Self::new(columns)
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Check if there are no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Column at position `idx`
    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// All columns
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column types, in order
    #[must_use]
    pub fn types(&self) -> Vec<Type> {
        self.columns.iter().map(|c| c.ty().clone()).collect()
    }

    /// Repeat the rows `n` times. A single-row dataset becomes `n` copies
    /// of its row.
    #[must_use]
    pub fn duplicate(&self, n: usize) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.duplicate(n)).collect(),
        }
    }

    /// Sub-range view `[start, end)` of every column.
    ///
    /// # Errors
    ///
    /// Returns error if the range is invalid
    pub fn slice(&self, start: usize, end: usize) -> DataResult<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(start, end))
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            columns: columns.into(),
        })
    }

    /// Join horizontally: the columns of `other` follow the columns of
    /// `self`. A dataset without columns is the identity.
    ///
    /// # Errors
    ///
    /// Returns error if both sides have columns and their row counts differ
    pub fn expand(&self, other: &Dataset) -> DataResult<Self> {
        if self.width() == 0 {
            return Ok(other.clone());
        }
        if other.width() == 0 {
            return Ok(self.clone());
        }
        if self.len() != other.len() {
            return Err(DataError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        let columns: Vec<Column> = self.columns.iter().chain(other.columns.iter()).cloned().collect();
        Ok(Self {
            columns: columns.into(),
        })
    }

    /// Join vertically: the rows of `other` follow the rows of `self`.
    /// A dataset without columns is the identity.
    ///
    /// # Errors
    ///
    /// Returns error if the widths or column types differ
    pub fn append(&self, other: &Dataset) -> DataResult<Self> {
        if self.width() == 0 {
            return Ok(other.clone());
        }
        if other.width() == 0 {
            return Ok(self.clone());
        }
        if self.width() != other.width() {
            return Err(DataError::WidthMismatch {
                left: self.width(),
                right: other.width(),
            });
        }
        let columns = self
            .columns
            .iter()
            .zip(other.columns.iter())
            .map(|(l, r)| l.append(r))
            .collect::<DataResult<Vec<_>>>()?;
        Ok(Self {
            columns: columns.into(),
        })
    }

    /// Compare row by row against another dataset of the same shape.
    ///
    /// Columns are compared left to right; a row's outcome is the first
    /// column outcome that is neither `Equal` nor `BothNulls`. A row whose
    /// columns are all `BothNulls` is `BothNulls`, otherwise `Equal`.
    ///
    /// # Errors
    ///
    /// Returns error on a shape mismatch or mixed value types
    pub fn compare(&self, other: &Dataset) -> DataResult<Vec<Compare>> {
        if self.width() != other.width() {
            return Err(DataError::WidthMismatch {
                left: self.width(),
                right: other.width(),
            });
        }
        if self.len() != other.len() {
            return Err(DataError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }

        let per_column = self
            .columns
            .iter()
            .zip(other.columns.iter())
            .map(|(l, r)| l.compare(r))
            .collect::<DataResult<Vec<_>>>()?;

        let rows = (0..self.len())
            .map(|row| {
                let mut all_nulls = true;
                for col in &per_column {
                    match col[row] {
                        Compare::BothNulls => {}
                        Compare::Equal => all_nulls = false,
                        decided => return decided,
                    }
                }
                if all_nulls {
                    Compare::BothNulls
                } else {
                    Compare::Equal
                }
            })
            .collect();
        Ok(rows)
    }

    /// Render every row as `(v1,v2,...)`
    #[must_use]
    pub fn strings(&self) -> Vec<String> {
        (0..self.len())
            .map(|row| {
                let values: Vec<String> = self.columns.iter().map(|c| c.row_string(row)).collect();
                format!("({})", values.join(","))
            })
            .collect()
    }
}

impl From<Column> for Dataset {
    fn from(column: Column) -> Self {
        Self::from_column(column)
    }
}

impl From<Dataset> for Vec<Column> {
    fn from(data: Dataset) -> Self {
        data.columns.to_vec()
    }
}

impl TryFrom<Vec<Column>> for Dataset {
    type Error = DataError;

    fn try_from(columns: Vec<Column>) -> DataResult<Self> {
        Self::new(columns)
    }
}
