//! Tool trait and types for the request/response surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use retrace_core::error::Result;

/// JSON Schema for tool parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful tool output.
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    /// Create an error tool output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// An error output that still carries a structured result payload
    /// (failed executions embed their diagnostic verbatim).
    pub fn error_with_result(message: impl Into<String>, result: Value) -> Self {
        Self {
            success: false,
            result,
            error: Some(message.into()),
        }
    }
}

/// Core trait for scenario tools: one named operation per call, JSON-shaped
/// arguments and results.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name used in dispatch.
    fn name(&self) -> &str;

    /// Human-readable description for the calling agent.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given input.
    async fn execute(&self, input: Value) -> Result<ToolOutput>;

    /// Build the complete schema.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
