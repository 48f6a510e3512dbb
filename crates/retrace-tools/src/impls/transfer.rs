//! Scenario import/export tools.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use retrace_core::error::Result;
use retrace_storage::ScenarioStore;

use crate::tool::{Tool, ToolOutput};

#[derive(Debug, Deserialize)]
struct ExportInput {
    name: String,
    #[serde(default)]
    include_secrets: bool,
}

pub struct ExportScenarioTool {
    store: Arc<ScenarioStore>,
}

impl ExportScenarioTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ExportScenarioTool {
    fn name(&self) -> &str {
        "export-scenario"
    }

    fn description(&self) -> &str {
        "Serialise a scenario (and optionally its secrets) to a portable textual form."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Scenario name" },
                "include_secrets": { "type": "boolean", "description": "Embed stored secret values in the export" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: ExportInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };
        match self.store.export(&input.name, input.include_secrets) {
            Ok(text) => Ok(ToolOutput::success(json!({ "text": text }))),
            Err(error) => Ok(ToolOutput::error(error.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportInput {
    text: String,
    #[serde(default)]
    overwrite: bool,
}

pub struct ImportScenarioTool {
    store: Arc<ScenarioStore>,
}

impl ImportScenarioTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ImportScenarioTool {
    fn name(&self) -> &str {
        "import-scenario"
    }

    fn description(&self) -> &str {
        "Parse a serialised scenario and store it. Refuses to replace an existing scenario unless overwrite is set."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Serialised scenario document" },
                "overwrite": { "type": "boolean", "description": "Replace an existing scenario with the same name" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: ImportInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };
        match self.store.import(&input.text, input.overwrite) {
            Ok(scenario) => Ok(ToolOutput::success(json!({ "name": scenario.name }))),
            Err(error) => Ok(ToolOutput::error(error.to_string())),
        }
    }
}
