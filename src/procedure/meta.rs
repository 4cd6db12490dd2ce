use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ProcedureKind;

/// Information about the procedure being executed, available to middleware through
/// [`Next::meta`](crate::middleware::Next::meta).
#[derive(Debug, Clone)]
pub struct ProcedureMeta {
    pub(crate) path: Arc<str>,
    pub(crate) kind: ProcedureKind,
    pub(crate) data: Arc<Map<String, Value>>,
}

impl ProcedureMeta {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    /// Arbitrary metadata attached with [`ProcedureBuilder::meta`](super::ProcedureBuilder::meta).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}
