//! Recorder enablement tool.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use retrace_core::driver::{DomInspector, HostBridge};
use retrace_core::error::Result;
use retrace_recorder::{RecorderHost, RecorderStore};
use retrace_storage::ScenarioStore;

use crate::tool::{Tool, ToolOutput};

/// Injects the recorder widget into the controlled page and starts the
/// bridge-event loop in the background. Idempotent at the page level: the
/// capture script short-circuits when a live instance already exists.
pub struct EnableRecorderTool {
    bridge: Arc<dyn HostBridge>,
    dom: Arc<dyn DomInspector>,
    store: Arc<ScenarioStore>,
    recordings_dir: std::path::PathBuf,
}

impl EnableRecorderTool {
    pub fn new(
        bridge: Arc<dyn HostBridge>,
        dom: Arc<dyn DomInspector>,
        store: Arc<ScenarioStore>,
        recordings_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            bridge,
            dom,
            store,
            recordings_dir: recordings_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for EnableRecorderTool {
    fn name(&self) -> &str {
        "enable-recorder"
    }

    fn description(&self) -> &str {
        "Inject the floating recording widget into the current page. Interactions are captured until Stop-and-Save, which stores the optimised scenario."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value) -> Result<ToolOutput> {
        let snapshots = RecorderStore::open(&self.recordings_dir)?;
        let mut host = RecorderHost::new(
            self.bridge.clone(),
            self.dom.clone(),
            self.store.clone(),
            snapshots,
        );
        host.enable().await?;

        tokio::spawn(async move {
            info!("recorder event loop started");
            if let Err(error) = host.run().await {
                warn!("recorder event loop ended with error: {}", error);
            }
        });

        Ok(ToolOutput::success(json!({
            "message": "Recorder enabled. Use the floating widget to record, then Stop & Save with a scenario name."
        })))
    }
}
