//! Constant runner: broadcasts one stored row.

use crate::context::{Context, DataReceiver, DataSender, recv, send};
use crate::registry::RunnerSpec;
use crate::runner::{Runner, ScopesRunner};
use async_trait::async_trait;
use ep_core::{CoreError, CoreResult, ScopeSet, Type};
use ep_data::Dataset;
use std::any::Any;
use tracing::trace;

/// Emits, for every input batch of `n` rows, `n` copies of a stored row
#[derive(Debug, Clone)]
pub struct Const {
    data: Dataset,
}

impl Const {
    /// Registry tag
    pub const KIND: &'static str = "const";

    /// Create from a single-row dataset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRunner`] unless `data` has exactly one row
    pub fn new(data: Dataset) -> CoreResult<Self> {
        if data.len() != 1 {
            return Err(CoreError::invalid_runner(format!(
                "const runner requires single-row data, got {} rows",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    /// The stored row
    #[must_use]
    pub fn data(&self) -> &Dataset {
        &self.data
    }
}

#[async_trait]
impl Runner for Const {
    async fn run(&self, ctx: &Context, mut inp: DataReceiver, out: DataSender) -> CoreResult<()> {
        while let Some(data) = recv(ctx, &mut inp).await {
            trace!(rows = data.len(), "const batch");
            send(ctx, &out, self.data.duplicate(data.len())).await?;
        }
        Ok(())
    }

    fn returns(&self) -> Vec<Type> {
        self.data.types()
    }

    fn equals(&self, other: &dyn Runner) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        self.data
            .compare(&other.data)
            .is_ok_and(|rows| rows.first().is_some_and(|c| c.is_equal()))
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> CoreResult<RunnerSpec> {
        RunnerSpec::new(Self::KIND, &self.data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_scopes(&self) -> Option<&dyn ScopesRunner> {
        Some(self)
    }
}

impl ScopesRunner for Const {
    fn scopes(&self) -> ScopeSet {
        ScopeSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness;
    use ep_data::{Column, Value};
    use proptest::prelude::*;

    fn const_a() -> Const {
        Const::new(Dataset::from(Column::strs(["a"]))).unwrap()
    }

    #[tokio::test]
    async fn test_const_six_rows() {
        let input = Dataset::from(Column::ints([1, 2, 3, 4, 5, 6]));
        let (data, result) = harness::run(&const_a(), vec![input]).await;
        assert_eq!(result, Ok(()));
        assert_eq!(data.strings(), vec!["(a)"; 6]);
    }

    #[tokio::test]
    async fn test_const_multiple_batches() {
        let batches = vec![
            Dataset::from(Column::ints([1, 2, 3, 4, 5, 6])),
            Dataset::from(Column::ints([7, 8])),
        ];
        let (data, result) = harness::run(&const_a(), batches).await;
        assert_eq!(result, Ok(()));
        assert_eq!(data.len(), 8);
        assert_eq!(data.strings(), vec!["(a)"; 8]);
    }

    #[test]
    fn test_const_rejects_multi_row_data() {
        let err = Const::new(Dataset::from(Column::strs(["a", "b"]))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRunner { .. }));

        assert!(Const::new(Dataset::empty()).is_err());
    }

    #[test]
    fn test_const_returns_stored_type() {
        assert_eq!(const_a().returns(), vec![Type::Str]);
    }

    #[test]
    fn test_const_equals() {
        assert!(const_a().equals(&const_a()));

        let b = Const::new(Dataset::from(Column::strs(["b"]))).unwrap();
        assert!(!const_a().equals(&b));

        // comparison error counts as not equal
        let int = Const::new(Dataset::from(Column::ints([1]))).unwrap();
        assert!(!const_a().equals(&int));

        let null = Const::new(Dataset::from(Column::infer(vec![None]).unwrap())).unwrap();
        assert!(!null.equals(&null));

        assert!(!const_a().equals(&crate::PassThrough));
    }

    #[test]
    fn test_const_scopes_empty() {
        let c = const_a();
        assert!(c.as_scopes().unwrap().scopes().is_empty());
    }

    proptest! {
        #[test]
        fn prop_const_broadcasts_row(stored: i64, rows in 0usize..40) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let runner = Const::new(Dataset::from(Column::ints([stored]))).unwrap();
            let input = Dataset::from(Column::infer(vec![Some(Value::Int(0)); rows]).unwrap());
            let (data, result) = rt.block_on(harness::run(&runner, vec![input]));
            prop_assert_eq!(result, Ok(()));
            prop_assert_eq!(data.len(), rows);
            let expected = format!("({})", stored);
            prop_assert!(data.strings().iter().all(|s| *s == expected));
        }
    }
}
