//! Plan and input loading.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use ep_data::{DataResult, Dataset, Value};
use ep_runtime::{Runner, RunnerRegistry, RunnerSpec};
use std::path::Path;
use std::sync::Arc;

/// Read a plan file (a JSON runner spec) and rebuild the graph
pub fn load_plan(registry: &RunnerRegistry, path: &Path) -> Result<Arc<dyn Runner>> {
    let bytes = std::fs::read(path).wrap_err_with(|| format!("reading plan {}", path.display()))?;
    let spec = RunnerSpec::from_bytes(&bytes)
        .wrap_err_with(|| format!("parsing plan {}", path.display()))?;
    Ok(registry.decode(&spec)?)
}

/// Read an input file: an array of batches, each an array of rows, each an
/// array of JSON scalars (`null` is an absent value)
pub fn load_batches(path: &Path) -> Result<Vec<Dataset>> {
    let json =
        std::fs::read_to_string(path).wrap_err_with(|| format!("reading input {}", path.display()))?;
    parse_batches(&json).wrap_err_with(|| format!("parsing input {}", path.display()))
}

/// Parse batches from JSON text
pub fn parse_batches(json: &str) -> Result<Vec<Dataset>> {
    let raw: Vec<Vec<Vec<serde_json::Value>>> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(idx, rows)| {
            let rows = rows
                .iter()
                .map(|row| row.iter().map(Value::from_json).collect())
                .collect::<DataResult<Vec<Vec<_>>>>()?;
            Dataset::from_rows(rows).wrap_err_with(|| format!("batch {}", idx))
        })
        .collect()
}
