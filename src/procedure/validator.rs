use std::{fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// A single problem found while validating a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted location of the problem inside the value. Empty for the root.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::issue("", message)
    }

    pub fn issue(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    pub fn with_issue(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.issues.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return f.write_str("validation failed");
        }

        for (i, issue) in self.issues.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            if issue.path.is_empty() {
                f.write_str(&issue.message)?;
            } else {
                write!(f, "{}: {}", issue.path, issue.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Parses and normalises a raw value, failing with the list of problems found.
///
/// Applied to procedure inputs before any middleware runs and to resolver results before they
/// leave the procedure.
#[derive(Clone)]
pub struct Validator(Arc<dyn Fn(Value) -> Result<Value, ValidationError> + Send + Sync>);

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").finish()
    }
}

impl Validator {
    pub fn new(f: impl Fn(Value) -> Result<Value, ValidationError> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Accepts anything that deserializes into `T` and returns it re-serialized, so defaults are
    /// filled and unknown fields dropped the way `T`'s serde impls define.
    pub fn of<T: DeserializeOwned + Serialize>() -> Self {
        Self::new(|raw| {
            let typed: T = serde_json::from_value(raw)?;
            Ok(serde_json::to_value(typed)?)
        })
    }

    pub fn validate(&self, raw: Value) -> Result<Value, ValidationError> {
        (self.0)(raw)
    }
}

#[cfg(test)]
mod test {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Greeting {
        name: String,
        #[serde(default)]
        excited: bool,
    }

    #[test]
    fn typed_validator_normalises() {
        let v = Validator::of::<Greeting>();
        assert_eq!(
            v.validate(json!({ "name": "a", "extra": 1 })).unwrap(),
            json!({ "name": "a", "excited": false })
        );
        assert!(v.validate(json!({ "name": 5 })).is_err());
    }

    #[test]
    fn issues_render_with_paths() {
        let err = ValidationError::issue("user.name", "Required").with_issue("age", "Expected number");
        assert_eq!(err.to_string(), "user.name: Required, age: Expected number");
    }
}
