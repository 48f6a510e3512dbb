//! Scenario library tools: list, search, inspect, delete.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use retrace_core::error::Result;
use retrace_storage::{ScenarioStore, SearchQuery};

use crate::tool::{Tool, ToolOutput};

pub struct ListScenariosTool {
    store: Arc<ScenarioStore>,
}

impl ListScenariosTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListScenariosTool {
    fn name(&self) -> &str {
        "list-scenarios"
    }

    fn description(&self) -> &str {
        "List every stored scenario's summary metadata (name, description, tags, dependencies, parameters, outputs)."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput> {
        let entries = self.store.list()?;
        Ok(ToolOutput::success(serde_json::to_value(entries)?))
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    depends_on: Option<String>,
}

pub struct SearchScenariosTool {
    store: Arc<ScenarioStore>,
}

impl SearchScenariosTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchScenariosTool {
    fn name(&self) -> &str {
        "search-scenarios"
    }

    fn description(&self) -> &str {
        "Search stored scenarios by name/description substring, tags, or dependency target. Criteria are unioned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Case-insensitive substring of name or description" },
                "tags": { "type": "array", "items": { "type": "string" }, "description": "Match scenarios sharing any of these tags" },
                "depends_on": { "type": "string", "description": "Match scenarios depending on this scenario" }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: SearchInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };
        let entries = self.store.search(&SearchQuery {
            text: input.text,
            tags: input.tags,
            depends_on: input.depends_on,
        })?;
        Ok(ToolOutput::success(serde_json::to_value(entries)?))
    }
}

#[derive(Debug, Deserialize)]
struct GetScenarioInput {
    name: String,
    #[serde(default)]
    include_secrets: bool,
}

pub struct GetScenarioInfoTool {
    store: Arc<ScenarioStore>,
}

impl GetScenarioInfoTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetScenarioInfoTool {
    fn name(&self) -> &str {
        "get-scenario-info"
    }

    fn description(&self) -> &str {
        "Return a scenario document, optionally together with its stored secret values."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Scenario name" },
                "include_secrets": { "type": "boolean", "description": "Also return stored secret values" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: GetScenarioInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };

        match self.store.load_with_secrets(&input.name) {
            Ok((scenario, secrets)) => {
                let mut result = json!({ "scenario": scenario });
                if input.include_secrets
                    && let Some(secrets) = secrets
                {
                    result["secrets"] = serde_json::to_value(secrets)?;
                }
                Ok(ToolOutput::success(result))
            }
            Err(error) => Ok(ToolOutput::error(error.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteScenarioInput {
    name: String,
}

pub struct DeleteScenarioTool {
    store: Arc<ScenarioStore>,
}

impl DeleteScenarioTool {
    pub fn new(store: Arc<ScenarioStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteScenarioTool {
    fn name(&self) -> &str {
        "delete-scenario"
    }

    fn description(&self) -> &str {
        "Delete a scenario, its secrets, and its index entry. Idempotent."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Scenario name" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let input: DeleteScenarioInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(error) => return Ok(ToolOutput::error(format!("Invalid input: {}", error))),
        };
        let removed = self.store.delete(&input.name)?;
        Ok(ToolOutput::success(json!({ "removed": removed })))
    }
}
