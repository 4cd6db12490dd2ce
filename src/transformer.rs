//! Hooks for encoding values that aren't native to JSON.
//!
//! A transformer only touches procedure inputs and result data, never the envelope around them.

use std::{fmt, sync::Arc};

use serde_json::Value;

/// A reversible value transform applied on both ends of the wire.
pub trait DataTransformer: Send + Sync {
    fn serialize(&self, value: Value) -> Value;

    fn deserialize(&self, value: Value) -> Value;
}

/// Leaves values untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl DataTransformer for IdentityTransformer {
    fn serialize(&self, value: Value) -> Value {
        value
    }

    fn deserialize(&self, value: Value) -> Value {
        value
    }
}

/// Separate transformers for inputs (client to server) and outputs (server to client).
#[derive(Clone)]
pub struct CombinedTransformer {
    input: Arc<dyn DataTransformer>,
    output: Arc<dyn DataTransformer>,
}

impl fmt::Debug for CombinedTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedTransformer").finish_non_exhaustive()
    }
}

impl Default for CombinedTransformer {
    fn default() -> Self {
        Self::new(IdentityTransformer)
    }
}

impl CombinedTransformer {
    /// Use the same transformer for both directions.
    pub fn new(transformer: impl DataTransformer + 'static) -> Self {
        let transformer: Arc<dyn DataTransformer> = Arc::new(transformer);
        Self {
            input: transformer.clone(),
            output: transformer,
        }
    }

    pub fn split(
        input: impl DataTransformer + 'static,
        output: impl DataTransformer + 'static,
    ) -> Self {
        Self {
            input: Arc::new(input),
            output: Arc::new(output),
        }
    }

    pub fn input(&self) -> &dyn DataTransformer {
        &*self.input
    }

    pub fn output(&self) -> &dyn DataTransformer {
        &*self.output
    }
}
