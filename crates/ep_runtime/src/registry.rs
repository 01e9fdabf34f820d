//! Runner registry and structural encoding.
//!
//! Every runner encodes to a [`RunnerSpec`]: a kind tag plus JSON
//! arguments, where composites nest the specs of their children. A
//! [`RunnerRegistry`] maps kind tags back to decoders, so a graph built in
//! one process can be rebuilt identically in another.

use crate::constant::Const;
use crate::map_inp_to_out::MapInpToOut;
use crate::passthrough::PassThrough;
use crate::pipeline::Pipeline;
use crate::project::Project;
use crate::runner::Runner;
use ep_core::{CoreError, CoreResult};
use ep_data::Dataset;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Structural encoding of a runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSpec {
    /// Registry tag
    pub kind: String,
    /// Kind-specific arguments
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl RunnerSpec {
    /// Spec with arguments
    ///
    /// # Errors
    ///
    /// Returns error if `args` cannot be represented as JSON
    pub fn new<T: Serialize + ?Sized>(kind: &str, args: &T) -> CoreResult<Self> {
        Ok(Self {
            kind: kind.to_string(),
            args: serde_json::to_value(args)?,
        })
    }

    /// Spec for a runner without arguments
    #[must_use]
    pub fn unit(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            args: serde_json::Value::Null,
        }
    }

    /// Decode the arguments
    ///
    /// # Errors
    ///
    /// Returns error if the arguments do not match `T`
    pub fn args<T: DeserializeOwned>(&self) -> CoreResult<T> {
        serde_json::from_value(self.args.clone()).map_err(|err| CoreError::Encoding {
            reason: format!("{}: {}", self.kind, err),
        })
    }

    /// Serialize to JSON bytes
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid spec
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Rebuilds a runner from its spec. Composite decoders call back into the
/// registry for their children.
pub type Decoder = fn(&RunnerRegistry, &RunnerSpec) -> CoreResult<Arc<dyn Runner>>;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Kind already registered
    #[error("runner kind already registered: {kind}")]
    AlreadyRegistered {
        /// Registry tag
        kind: String,
    },
}

/// Registry from kind tag to decoder
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    decoders: IndexMap<String, Decoder>,
}

impl RunnerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: IndexMap::new(),
        }
    }

    /// Registry with the built-in runners
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, Decoder); 5] = [
            (PassThrough::KIND, decode_passthrough),
            (Const::KIND, decode_const),
            (MapInpToOut::KIND, decode_map_inp_to_out),
            (Pipeline::KIND, decode_pipeline),
            (Project::KIND, decode_project),
        ];
        for (kind, decoder) in builtins {
            registry.decoders.insert(kind.to_string(), decoder);
        }
        registry
    }

    /// Register a decoder under `kind`
    ///
    /// # Errors
    ///
    /// Returns error if `kind` is already registered
    pub fn register(&mut self, kind: &str, decoder: Decoder) -> Result<(), RegistryError> {
        if self.decoders.contains_key(kind) {
            return Err(RegistryError::AlreadyRegistered {
                kind: kind.to_string(),
            });
        }
        self.decoders.insert(kind.to_string(), decoder);
        Ok(())
    }

    /// Check if a kind is registered
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Registered kinds, in registration order
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.decoders.keys().map(String::as_str).collect()
    }

    /// Rebuild a runner from its spec
    ///
    /// # Errors
    ///
    /// Returns error if the kind is unknown or its arguments are invalid
    pub fn decode(&self, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
        let decoder = self
            .decoders
            .get(&spec.kind)
            .ok_or_else(|| CoreError::UnknownRunner {
                kind: spec.kind.clone(),
            })?;
        decoder(self, spec)
    }

    /// Rebuild a list of runners, as nested in composite specs
    ///
    /// # Errors
    ///
    /// Returns the first decoding error
    pub fn decode_all(&self, specs: &[RunnerSpec]) -> CoreResult<Vec<Arc<dyn Runner>>> {
        specs.iter().map(|spec| self.decode(spec)).collect()
    }

    /// Rebuild a runner from JSON bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid spec or decoding fails
    pub fn decode_bytes(&self, bytes: &[u8]) -> CoreResult<Arc<dyn Runner>> {
        self.decode(&RunnerSpec::from_bytes(bytes)?)
    }
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Encode a runner to JSON bytes
///
/// # Errors
///
/// Returns error if the runner or its arguments cannot be encoded
pub fn encode_bytes(runner: &dyn Runner) -> CoreResult<Vec<u8>> {
    runner.encode()?.to_bytes()
}

fn decode_passthrough(_: &RunnerRegistry, _: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    Ok(Arc::new(PassThrough))
}

fn decode_const(_: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    let data: Dataset = spec.args()?;
    Ok(Arc::new(Const::new(data)?))
}

fn decode_map_inp_to_out(
    registry: &RunnerRegistry,
    spec: &RunnerSpec,
) -> CoreResult<Arc<dyn Runner>> {
    let inner: RunnerSpec = spec.args()?;
    Ok(Arc::new(MapInpToOut::new(registry.decode(&inner)?)))
}

fn decode_pipeline(registry: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    let stages: Vec<RunnerSpec> = spec.args()?;
    Pipeline::new(registry.decode_all(&stages)?)
}

fn decode_project(registry: &RunnerRegistry, spec: &RunnerSpec) -> CoreResult<Arc<dyn Runner>> {
    let branches: Vec<RunnerSpec> = spec.args()?;
    Project::new(registry.decode_all(&branches)?)
}
