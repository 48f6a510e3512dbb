//! Scenario execution tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

use retrace_core::error::{Result, RetraceError};
use retrace_engine::ScenarioExecutor;

use crate::tool::{Tool, ToolOutput};

fn default_execute_dependencies() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ExecuteInput {
    name: String,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
    #[serde(default = "default_execute_dependencies")]
    execute_dependencies: bool,
}

pub struct ExecuteScenarioTool {
    executor: Arc<ScenarioExecutor>,
}

impl ExecuteScenarioTool {
    pub fn new(executor: Arc<ScenarioExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for ExecuteScenarioTool {
    fn name(&self) -> &str {
        "execute-scenario"
    }

    fn description(&self) -> &str {
        "Replay a stored scenario against the current page, resolving and executing its dependency chain, substituting parameters and secrets, and retrying failed actions with fallback selectors."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Scenario name" },
                "parameters": {
                    "type": "object",
                    "description": "Parameter values substituted into {{name}} placeholders",
                    "additionalProperties": true
                },
                "execute_dependencies": {
                    "type": "boolean",
                    "description": "Run the dependency chain before the scenario (default true)"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: ExecuteInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };

        match self
            .executor
            .execute(&input.name, input.parameters, input.execute_dependencies)
            .await
        {
            Ok(report) => {
                let message = report
                    .failure
                    .as_ref()
                    .map(|failure| failure.to_string());
                let result = serde_json::to_value(&report)?;
                Ok(match message {
                    // The structured diagnostic rides along verbatim.
                    Some(message) => ToolOutput::error_with_result(message, result),
                    None => ToolOutput::success(result),
                })
            }
            // Referential and validation errors abort before any page action.
            Err(error @ (RetraceError::ScenarioNotFound(_)
            | RetraceError::DependencyNotFound { .. }
            | RetraceError::DependencyCycle { .. }
            | RetraceError::MissingParameter { .. }
            | RetraceError::Validation(_))) => Ok(ToolOutput::error(error.to_string())),
            Err(error) => Err(error),
        }
    }
}
