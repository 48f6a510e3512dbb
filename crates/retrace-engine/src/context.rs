//! Execution context threaded through a replay run: caller parameters,
//! variables accumulated from extract outputs, and the executed-scenario
//! trail.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    /// Caller-supplied parameter values.
    pub parameters: BTreeMap<String, Value>,
    /// Outputs produced so far, available to subsequent scenarios.
    pub variables: BTreeMap<String, Value>,
    /// Scenarios that actually ran, in order. Skipped dependencies are
    /// excluded.
    pub executed: Vec<String>,
}

impl ExecutionContext {
    pub fn new(parameters: BTreeMap<String, Value>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            parameters,
            variables: BTreeMap::new(),
            executed: Vec::new(),
        }
    }

    pub fn set_output(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.parameters.contains_key(name)
    }
}

/// Render a JSON value the way it should appear inside substituted text:
/// strings verbatim, scalars via display, structures as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
