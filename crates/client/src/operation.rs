use linkrpc::ProcedureKind;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// A single call travelling through the link chain.
///
/// Links never mutate an operation another link may still hold, they pass a modified copy
/// downstream instead (see [`Operation::with_input`] and [`Operation::with_signal`]).
#[derive(Debug, Clone)]
pub struct Operation {
    /// Unique per client, increasing.
    pub id: u64,
    pub kind: ProcedureKind,
    pub path: String,
    pub input: Value,
    /// Free-form data links can use to talk to each other.
    pub context: Map<String, Value>,
    pub signal: Option<CancellationToken>,
}

impl Operation {
    pub fn new(id: u64, kind: ProcedureKind, path: impl Into<String>, input: Value) -> Self {
        Self {
            id,
            kind,
            path: path.into(),
            input,
            context: Map::new(),
            signal: None,
        }
    }

    pub fn with_input(&self, input: Value) -> Self {
        Self {
            input,
            ..self.clone()
        }
    }

    pub fn with_signal(&self, signal: CancellationToken) -> Self {
        Self {
            signal: Some(signal),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.is_cancelled())
    }

    /// Identifies calls that are interchangeable for caching and deduplication.
    pub(crate) fn fingerprint(&self) -> String {
        serde_json::json!({ "path": self.path, "input": self.input }).to_string()
    }
}
