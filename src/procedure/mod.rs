//! Procedure definitions and the builder that produces them.

mod builder;
mod meta;
mod procedure;
mod validator;

pub use builder::ProcedureBuilder;
pub use meta::ProcedureMeta;
pub(crate) use procedure::Resolve;
pub use procedure::{Procedure, ProcedureOutput};
pub use validator::{ValidationError, ValidationIssue, Validator};
