//! Request/response tool surface for retrace: one named operation per call
//! with JSON-shaped arguments and results.

mod impls;
mod registry;
mod tool;

use std::path::PathBuf;
use std::sync::Arc;

use retrace_browser::BrowserHost;
use retrace_core::driver::{DomInspector, HostBridge};
use retrace_core::error::{Result, RetraceError};
use retrace_core::paths;
use retrace_engine::{ExecutorConfig, ScenarioExecutor};
use retrace_storage::ScenarioStore;

pub use impls::{
    DeleteScenarioTool, EnableRecorderTool, ExecuteScenarioTool, ExportScenarioTool,
    GetScenarioInfoTool, ImportScenarioTool, ListScenariosTool, SearchScenariosTool,
};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolOutput, ToolSchema};

/// Assemble the full scenario tool vocabulary.
pub fn build_registry(
    store: Arc<ScenarioStore>,
    executor: Arc<ScenarioExecutor>,
    bridge: Arc<dyn HostBridge>,
    dom: Arc<dyn DomInspector>,
    recordings_dir: PathBuf,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(EnableRecorderTool::new(
        bridge,
        dom,
        store.clone(),
        recordings_dir,
    ));
    registry.register(ExecuteScenarioTool::new(executor));
    registry.register(ListScenariosTool::new(store.clone()));
    registry.register(SearchScenariosTool::new(store.clone()));
    registry.register(GetScenarioInfoTool::new(store.clone()));
    registry.register(DeleteScenarioTool::new(store.clone()));
    registry.register(ImportScenarioTool::new(store.clone()));
    registry.register(ExportScenarioTool::new(store));
    registry
}

/// Wire the registry over a launched Chromium host: CDP driver, inspector,
/// bridge, and smart finder, with the default storage layout.
pub fn build_registry_for_browser(
    host: &BrowserHost,
    store: Arc<ScenarioStore>,
    config: ExecutorConfig,
) -> Result<ToolRegistry> {
    let recordings_dir =
        paths::recordings_dir().map_err(|error| RetraceError::validation(error.to_string()))?;
    let executor = Arc::new(
        ScenarioExecutor::new(store.clone(), Arc::new(host.driver()))
            .with_finder(Arc::new(host.finder()))
            .with_config(config),
    );
    Ok(build_registry(
        store,
        executor,
        Arc::new(host.bridge()),
        Arc::new(host.driver()),
        recordings_dir,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use retrace_core::model::{Action, Scenario, SelectorSpec};
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn open_store(temp: &tempfile::TempDir) -> Arc<ScenarioStore> {
        Arc::new(
            ScenarioStore::open(temp.path().join("scenarios"), temp.path().join("secrets"))
                .unwrap(),
        )
    }

    fn scenario(name: &str) -> Scenario {
        let mut scenario = Scenario::new(name, Utc::now());
        scenario.metadata.description = "Demo flow".to_string();
        scenario.chain = vec![Action::click(SelectorSpec::bare("#go"), 1)];
        scenario
    }

    #[tokio::test]
    async fn list_and_search_return_index_summaries() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store.save(scenario("login_flow"), None).unwrap();
        store.save(scenario("checkout_flow"), None).unwrap();

        let list = ListScenariosTool::new(store.clone());
        let output = list.execute(json!({})).await.unwrap();
        assert!(output.success);
        assert_eq!(output.result.as_array().unwrap().len(), 2);

        let search = SearchScenariosTool::new(store);
        let output = search
            .execute(json!({ "text": "checkout" }))
            .await
            .unwrap();
        assert!(output.success);
        let entries = output.result.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "checkout_flow");
    }

    #[tokio::test]
    async fn get_scenario_info_controls_secret_exposure() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        let secrets =
            BTreeMap::from([("password".to_string(), "secret123".to_string())]);
        store.save(scenario("login_flow"), Some(&secrets)).unwrap();

        let tool = GetScenarioInfoTool::new(store);

        let without = tool
            .execute(json!({ "name": "login_flow" }))
            .await
            .unwrap();
        assert!(without.success);
        assert!(without.result.get("secrets").is_none());

        let with = tool
            .execute(json!({ "name": "login_flow", "include_secrets": true }))
            .await
            .unwrap();
        assert_eq!(with.result["secrets"]["password"], "secret123");
    }

    #[tokio::test]
    async fn get_scenario_info_reports_not_found() {
        let temp = tempdir().unwrap();
        let tool = GetScenarioInfoTool::new(open_store(&temp));
        let output = tool.execute(json!({ "name": "ghost" })).await.unwrap();
        assert!(!output.success);
        assert!(output.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn delete_scenario_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store.save(scenario("gone"), None).unwrap();

        let tool = DeleteScenarioTool::new(store);
        let first = tool.execute(json!({ "name": "gone" })).await.unwrap();
        assert_eq!(first.result["removed"], true);

        let second = tool.execute(json!({ "name": "gone" })).await.unwrap();
        assert!(second.success);
        assert_eq!(second.result["removed"], false);
    }

    #[tokio::test]
    async fn export_import_round_trip_through_the_tools() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store.save(scenario("portable"), None).unwrap();

        let export = ExportScenarioTool::new(store.clone());
        let exported = export
            .execute(json!({ "name": "portable" }))
            .await
            .unwrap();
        let text = exported.result["text"].as_str().unwrap().to_string();

        let import = ImportScenarioTool::new(store.clone());
        let refused = import.execute(json!({ "text": text })).await.unwrap();
        assert!(!refused.success);
        assert!(refused.error.unwrap().contains("already exists"));

        let replaced = import
            .execute(json!({ "text": text, "overwrite": true }))
            .await
            .unwrap();
        assert!(replaced.success);
        assert_eq!(replaced.result["name"], "portable");
    }

    #[tokio::test]
    async fn malformed_tool_input_is_an_error_output_not_a_panic() {
        let temp = tempdir().unwrap();
        let tool = GetScenarioInfoTool::new(open_store(&temp));
        let output = tool.execute(json!({ "nope": 1 })).await.unwrap();
        assert!(!output.success);
        assert!(output.error.unwrap().contains("Invalid input"));
    }
}
