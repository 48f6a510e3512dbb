//! Per-action replay with retry, fallback promotion, smart-finder recovery,
//! and structured failure diagnostics.
//!
//! A run processes one action at a time in program order; ordering across
//! dependencies is the topological chain from resolution. Concurrent runs
//! are not defended against; callers serialise them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use retrace_core::driver::{ElementFinder, PageDriver};
use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{
    Action, ActionPayload, AttemptRecord, DragEndpoint, PlaybackFailure, Scenario, SelectMode,
    WaitMode, WaitUntil,
};

use retrace_storage::ScenarioStore;

use crate::condition;
use crate::context::{ExecutionContext, value_to_string};
use crate::graph::DependencyResolver;
use crate::settle::{SettlementConfig, settle_after_click};
use crate::substitute::substitute_action;

const FINDER_MAX_CANDIDATES: usize = 5;
const DEFAULT_WAIT_SELECTOR_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Attempts per action, fallback promotions included.
    pub max_retries: u32,
    /// Pause between attempts, except after a fallback promotion.
    pub retry_pause_ms: u64,
    pub settlement: SettlementConfig,
    /// When set, failure screenshots land here.
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_pause_ms: 1_000,
            settlement: SettlementConfig::default(),
            artifacts_dir: None,
        }
    }
}

/// Outcome of an execute-scenario request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExecutionReport {
    pub success: bool,
    /// Scenarios that ran, in order; skipped dependencies are excluded.
    pub executed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub outputs: BTreeMap<String, Value>,
    /// Attempt-by-attempt history across the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PlaybackFailure>,
    pub duration_ms: u64,
}

pub struct ScenarioExecutor {
    store: Arc<ScenarioStore>,
    driver: Arc<dyn PageDriver>,
    finder: Option<Arc<dyn ElementFinder>>,
    config: ExecutorConfig,
}

impl ScenarioExecutor {
    pub fn new(store: Arc<ScenarioStore>, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            store,
            driver,
            finder: None,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_finder(mut self, finder: Arc<dyn ElementFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a scenario and, unless suppressed, its dependency chain.
    /// Referential and validation errors abort before any page action runs;
    /// playback failures are reported in the returned result.
    pub async fn execute(
        &self,
        name: &str,
        parameters: BTreeMap<String, Value>,
        execute_dependencies: bool,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();
        let resolver = DependencyResolver::new(&self.store);
        let planned = resolver.resolve(name, execute_dependencies)?;
        let warnings = resolver.validate_parameters(&planned, &parameters)?;

        let mut context = ExecutionContext::new(parameters);
        let mut report = ExecutionReport {
            success: true,
            warnings,
            ..Default::default()
        };

        for plan in planned {
            let scenario_name = plan.scenario.name.clone();

            if let Some(guard) = &plan.guard
                && !condition::should_run(guard, self.driver.as_ref(), &context).await
            {
                info!(scenario = %scenario_name, "dependency skipped by condition");
                report.skipped.push(scenario_name);
                continue;
            }

            match self
                .run_scenario(&plan.scenario, &mut context, &mut report)
                .await
            {
                Ok(()) => context.executed.push(scenario_name),
                Err(RetraceError::Playback(failure)) => {
                    report.errors.push(failure.to_string());
                    if plan.optional {
                        warn!(scenario = %scenario_name, "optional dependency failed, continuing");
                        continue;
                    }
                    report.success = false;
                    report.failure = Some(*failure);
                    break;
                }
                Err(other) => return Err(other),
            }
        }

        report.executed = context.executed.clone();
        report.outputs = context.variables.clone();
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn run_scenario(
        &self,
        scenario: &Scenario,
        context: &mut ExecutionContext,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        debug!(scenario = %scenario.name, actions = scenario.chain.len(), "running scenario");
        let values = self.scenario_values(scenario, context)?;

        for action in &scenario.chain {
            let substituted = substitute_action(action, &values);
            self.run_action_with_retry(&scenario.name, substituted, context, report)
                .await?;
        }
        Ok(())
    }

    /// Parameter values visible to one scenario's actions: declared
    /// defaults, caller parameters, accumulated outputs, dependency-bound
    /// outputs, and this scenario's secrets, in increasing precedence.
    fn scenario_values(
        &self,
        scenario: &Scenario,
        context: &ExecutionContext,
    ) -> Result<BTreeMap<String, String>> {
        let mut values: BTreeMap<String, String> = BTreeMap::new();

        for (name, spec) in &scenario.metadata.parameters {
            if let Some(default) = &spec.default {
                values.insert(name.clone(), value_to_string(default));
            }
        }
        for (name, value) in &context.parameters {
            values.insert(name.clone(), value_to_string(value));
        }
        for (name, value) in &context.variables {
            values.insert(name.clone(), value_to_string(value));
        }
        for dependency in &scenario.metadata.dependencies {
            for (param, binding) in &dependency.parameters {
                let source = context
                    .variables
                    .get(&binding.output)
                    .or_else(|| context.parameters.get(&binding.output));
                if let Some(value) = source {
                    values.insert(
                        param.clone(),
                        apply_transform(&value_to_string(value), binding.transform.as_deref()),
                    );
                }
            }
        }
        if let Some(secrets) = self.store.secrets().get(&scenario.name)? {
            values.extend(secrets);
        }
        Ok(values)
    }

    async fn run_action_with_retry(
        &self,
        scenario: &str,
        mut action: Action,
        context: &mut ExecutionContext,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let max = self.config.max_retries.max(1);

        for attempt in 1..=max {
            let selector_now = action
                .recovery_selector()
                .map(|spec| spec.primary.clone())
                .unwrap_or_default();

            match self.dispatch(&action, context).await {
                Ok(()) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        selector: selector_now,
                        outcome: "ok".to_string(),
                    });
                    report.attempts.append(&mut attempts);
                    return Ok(());
                }
                Err(error) => {
                    let message = error.to_string();
                    debug!(
                        scenario = %scenario,
                        kind = action.kind(),
                        attempt,
                        "action attempt failed: {}",
                        message
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        selector: selector_now,
                        outcome: message,
                    });

                    if attempt == max {
                        let failure = self.build_failure(scenario, &action, attempts).await;
                        report.attempts.extend(failure.attempts.iter().cloned());
                        return Err(RetraceError::Playback(Box::new(failure)));
                    }

                    // A remaining fallback is promoted and retried
                    // immediately; this still consumes the attempt budget.
                    let promoted = action
                        .recovery_selector_mut()
                        .map(|spec| spec.promote_fallback())
                        .unwrap_or(false);
                    if promoted {
                        continue;
                    }

                    // No fallbacks left: consult the smart finder with the
                    // recorded element text, when available.
                    let description = action
                        .recovery_selector()
                        .and_then(|spec| spec.element_info.text.clone());
                    if let (Some(finder), Some(description)) = (&self.finder, description)
                        && let Ok(candidates) =
                            finder.find(&description, FINDER_MAX_CANDIDATES).await
                        && !candidates.is_empty()
                        && let Some(spec) = action.recovery_selector_mut()
                    {
                        debug!(
                            "smart finder replaced selector with {}",
                            candidates[0].selector
                        );
                        spec.primary = candidates[0].selector.clone();
                        spec.fallbacks = candidates[1..]
                            .iter()
                            .map(|candidate| candidate.selector.clone())
                            .collect();
                    }

                    if self.config.retry_pause_ms > 0 {
                        sleep(Duration::from_millis(self.config.retry_pause_ms)).await;
                    }
                }
            }
        }
        unreachable!("retry loop returns on success or final failure")
    }

    async fn dispatch(&self, action: &Action, context: &mut ExecutionContext) -> Result<()> {
        let driver = self.driver.as_ref();
        match &action.payload {
            ActionPayload::Click { requires_wait, .. } => {
                driver.click(required_selector(action)?).await?;
                if *requires_wait {
                    settle_after_click(driver, &self.config.settlement).await;
                }
                Ok(())
            }
            ActionPayload::Type {
                text, clear_first, ..
            } => {
                let selector = required_selector(action)?;
                let state = driver
                    .element_state(selector)
                    .await?
                    .ok_or_else(|| RetraceError::driver(format!("Element not found: {}", selector)))?;
                if !state.editable {
                    return Err(RetraceError::driver(format!(
                        "Element is not editable: <{}>",
                        state.tag
                    )));
                }
                if *clear_first {
                    driver.clear_field(selector).await?;
                }
                driver.type_text(selector, text, None).await
            }
            ActionPayload::Select(mode) => match mode {
                SelectMode::Native { value, .. } => {
                    let selector = required_selector(action)?;
                    let state = driver.element_state(selector).await?.ok_or_else(|| {
                        RetraceError::driver(format!("Element not found: {}", selector))
                    })?;
                    if !state.is_select {
                        return Err(RetraceError::driver(format!(
                            "Element is not a native select: <{}>",
                            state.tag
                        )));
                    }
                    driver.select_option(selector, value).await
                }
                SelectMode::Custom { steps } => {
                    for step in steps {
                        match &step.payload {
                            ActionPayload::Click { .. } => {
                                driver.click(required_selector(step)?).await?;
                            }
                            ActionPayload::Wait(WaitMode::Duration { ms }) => {
                                driver.wait_millis(*ms).await?;
                            }
                            ActionPayload::Wait(WaitMode::Selector {
                                selector,
                                timeout_ms,
                            }) => {
                                driver.wait_for_selector(selector, *timeout_ms).await?;
                            }
                            other => {
                                return Err(RetraceError::validation(format!(
                                    "Unsupported custom-select step: {:?}",
                                    other
                                )));
                            }
                        }
                    }
                    Ok(())
                }
            },
            ActionPayload::Scroll { x, y } => {
                driver.scroll_to(required_selector(action)?, *x, *y).await
            }
            ActionPayload::Hover {} => driver.hover(required_selector(action)?).await,
            ActionPayload::Keypress { key, modifiers } => {
                driver.press_key(key.as_str(), modifiers).await
            }
            ActionPayload::Wait(WaitMode::Duration { ms }) => driver.wait_millis(*ms).await,
            ActionPayload::Wait(WaitMode::Selector {
                selector,
                timeout_ms,
            }) => {
                driver
                    .wait_for_selector(selector, (*timeout_ms).max(1))
                    .await
            }
            ActionPayload::Upload { file_path } => {
                driver
                    .upload_file(required_selector(action)?, file_path)
                    .await
            }
            ActionPayload::Drag { source, target } => {
                let (source_x, source_y) = self.endpoint_position(source).await?;
                let (target_x, target_y) = self.endpoint_position(target).await?;
                driver.pointer_move(source_x, source_y).await?;
                driver.pointer_down(source_x, source_y).await?;
                driver.pointer_move(target_x, target_y).await?;
                driver.pointer_up(target_x, target_y).await
            }
            ActionPayload::Navigate { url, wait_until } => {
                driver
                    .navigate(url, wait_until.unwrap_or(WaitUntil::Load))
                    .await
            }
            ActionPayload::Extract {
                attribute,
                multiple,
                output,
            } => {
                let selector = required_selector(action)?;
                driver
                    .wait_for_selector(selector, DEFAULT_WAIT_SELECTOR_TIMEOUT_MS)
                    .await?;
                let value = driver
                    .extract(selector, attribute.as_deref(), *multiple)
                    .await?;
                context.set_output(output.clone(), value);
                Ok(())
            }
        }
    }

    async fn endpoint_position(&self, endpoint: &DragEndpoint) -> Result<(f64, f64)> {
        match endpoint {
            DragEndpoint::Point { x, y } => Ok((*x, *y)),
            DragEndpoint::Selector { selector } => {
                self.driver.element_center(&selector.primary).await
            }
        }
    }

    /// Capture the structured page context and build the diagnostic that is
    /// this engine's contract with calling agents.
    async fn build_failure(
        &self,
        scenario: &str,
        action: &Action,
        attempts: Vec<AttemptRecord>,
    ) -> PlaybackFailure {
        let selector = action
            .recovery_selector()
            .map(|spec| spec.primary.clone());

        let mut page = self.driver.page_context().await.unwrap_or_default();
        if let Some(selector) = &selector {
            page.element = self.driver.element_state(selector).await.ok().flatten();
        }

        let mut suggestions = Vec::new();
        match &page.element {
            None => {
                suggestions.push("element might be dynamically added".to_string());
                suggestions.push(
                    "wait for the element's container to render before this action".to_string(),
                );
            }
            Some(element) => {
                if !element.is_visible() {
                    suggestions.push("wait for element to become visible".to_string());
                }
                if element.disabled {
                    suggestions.push("wait for the element to become enabled".to_string());
                }
            }
        }
        if page.has_modal_overlay {
            suggestions.push("overlay may be intercepting pointer events".to_string());
        }

        let screenshot = self.capture_failure_screenshot(scenario).await;

        PlaybackFailure {
            scenario: scenario.to_string(),
            action_kind: action.kind().to_string(),
            selector,
            attempts,
            page: Some(page),
            suggestions,
            screenshot,
        }
    }

    async fn capture_failure_screenshot(&self, scenario: &str) -> Option<String> {
        let dir = self.config.artifacts_dir.as_ref()?;
        let bytes = match self.driver.screenshot().await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(error) => {
                debug!("failure screenshot capture failed: {}", error);
                return None;
            }
        };
        let path = dir.join(format!("{}-{}.png", scenario, Uuid::new_v4()));
        match std::fs::write(&path, bytes) {
            Ok(()) => Some(path.display().to_string()),
            Err(error) => {
                debug!("failure screenshot write failed: {}", error);
                None
            }
        }
    }
}

fn required_selector(action: &Action) -> Result<&str> {
    action
        .primary_selector()
        .ok_or_else(|| RetraceError::validation(format!("{} action has no selector", action.kind())))
}

fn apply_transform(value: &str, transform: Option<&str>) -> String {
    match transform {
        None => value.to_string(),
        Some("trim") => value.trim().to_string(),
        Some("lowercase") => value.to_lowercase(),
        Some("uppercase") => value.to_uppercase(),
        Some(other) => {
            warn!(transform = %other, "unknown output transform, passing value through");
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockDriver, MockFinder, params};
    use chrono::Utc;
    use retrace_core::model::{
        DependencyRef, ElementInfo, ElementStateSnapshot, Guard, GuardCheck, OutputBinding,
        ParameterSpec, SelectorSpec,
    };
    use serde_json::json;
    use tempfile::tempdir;

    fn open_store(temp: &tempfile::TempDir) -> Arc<ScenarioStore> {
        Arc::new(
            ScenarioStore::open(temp.path().join("scenarios"), temp.path().join("secrets"))
                .unwrap(),
        )
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            retry_pause_ms: 0,
            ..Default::default()
        }
    }

    fn login_scenario() -> Scenario {
        let mut scenario = Scenario::new("login_flow", Utc::now());
        scenario
            .metadata
            .parameters
            .insert("email".to_string(), ParameterSpec::required_secret());
        scenario
            .metadata
            .parameters
            .insert("password".to_string(), ParameterSpec::required_secret());
        scenario.chain = vec![
            Action::type_text(SelectorSpec::bare("#email"), "{{email}}", 1),
            Action::type_text(SelectorSpec::bare("#password"), "{{password}}", 2),
            Action::click(SelectorSpec::bare("#submit"), 3),
        ];
        scenario
    }

    fn secrets(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn login_replay_emits_type_type_click() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store.save(login_scenario(), None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute(
                "login_flow",
                params(&[("email", "user@example.com"), ("password", "secret123")]),
                true,
            )
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.executed, vec!["login_flow"]);
        assert_eq!(
            driver.action_calls(),
            vec![
                "type:#email:user@example.com",
                "type:#password:secret123",
                "click:#submit",
            ]
        );
    }

    #[tokio::test]
    async fn stored_secrets_substitute_without_caller_parameters() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store
            .save(
                login_scenario(),
                Some(&secrets(&[
                    ("email", "user@example.com"),
                    ("password", "secret123"),
                ])),
            )
            .unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("login_flow", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(report.success);
        assert!(driver
            .action_calls()
            .contains(&"type:#password:secret123".to_string()));
    }

    #[tokio::test]
    async fn missing_required_parameter_aborts_before_any_page_action() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);
        store.save(login_scenario(), None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let error = executor
            .execute("login_flow", BTreeMap::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(error, RetraceError::MissingParameter { .. }));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn fallback_selector_recovers_with_two_attempts_in_the_history() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("button_flow", Utc::now());
        scenario.chain = vec![Action::click(
            SelectorSpec {
                primary: "#renamed-id".to_string(),
                fallbacks: vec!["button.save".to_string()],
                element_info: ElementInfo::default(),
            },
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_failing_selector("#renamed-id", usize::MAX));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("button_flow", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].selector, "#renamed-id");
        assert_ne!(report.attempts[0].outcome, "ok");
        assert_eq!(report.attempts[1].selector, "button.save");
        assert_eq!(report.attempts[1].outcome, "ok");
    }

    #[tokio::test]
    async fn smart_finder_rewrites_selector_when_fallbacks_are_exhausted() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("finder_flow", Utc::now());
        scenario.chain = vec![Action::click(
            SelectorSpec {
                primary: "#gone".to_string(),
                fallbacks: Vec::new(),
                element_info: ElementInfo {
                    text: Some("Submit order".to_string()),
                    ..Default::default()
                },
            },
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_failing_selector("#gone", usize::MAX));
        let finder = Arc::new(MockFinder::with_candidates(&["#found", "button.order"]));
        let executor = ScenarioExecutor::new(store, driver.clone())
            .with_finder(finder.clone())
            .with_config(fast_config());

        let report = executor
            .execute("finder_flow", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(finder.queries.lock().unwrap().as_slice(), ["Submit order"]);
        assert!(driver.action_calls().contains(&"click:#found".to_string()));
    }

    #[tokio::test]
    async fn authenticated_cookie_skips_the_login_dependency() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut login = Scenario::new("login_flow", Utc::now());
        login.chain = vec![Action::click(SelectorSpec::bare("#login"), 1)];
        store.save(login, None).unwrap();

        let mut checkout = Scenario::new("checkout_flow", Utc::now());
        let mut edge = DependencyRef::named("login_flow");
        edge.condition = Some(Guard {
            check: GuardCheck::IsAuthenticated,
            skip_if: true,
        });
        checkout.metadata.dependencies.push(edge);
        checkout.chain = vec![Action::click(SelectorSpec::bare("#buy"), 1)];
        store.save(checkout, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_cookie("session_id", "abc"));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("checkout_flow", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.executed, vec!["checkout_flow"]);
        assert_eq!(report.skipped, vec!["login_flow"]);
        assert_eq!(driver.action_calls(), vec!["click:#buy"]);
    }

    #[tokio::test]
    async fn unauthenticated_page_runs_the_login_dependency_first() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut login = Scenario::new("login_flow", Utc::now());
        login.chain = vec![Action::click(SelectorSpec::bare("#login"), 1)];
        store.save(login, None).unwrap();

        let mut checkout = Scenario::new("checkout_flow", Utc::now());
        let mut edge = DependencyRef::named("login_flow");
        edge.condition = Some(Guard {
            check: GuardCheck::IsAuthenticated,
            skip_if: true,
        });
        checkout.metadata.dependencies.push(edge);
        checkout.chain = vec![Action::click(SelectorSpec::bare("#buy"), 1)];
        store.save(checkout, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("checkout_flow", BTreeMap::new(), true)
            .await
            .unwrap();

        assert_eq!(report.executed, vec!["login_flow", "checkout_flow"]);
        assert_eq!(driver.action_calls(), vec!["click:#login", "click:#buy"]);
    }

    #[tokio::test]
    async fn dependency_cycle_is_a_referential_error_at_execute_time() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut a = Scenario::new("a", Utc::now());
        a.metadata.dependencies.push(DependencyRef::named("b"));
        a.chain = vec![Action::click(SelectorSpec::bare("#a"), 1)];
        store.save(a, None).unwrap();

        let mut b = Scenario::new("b", Utc::now());
        b.metadata.dependencies.push(DependencyRef::named("a"));
        b.chain = vec![Action::click(SelectorSpec::bare("#b"), 1)];
        // The save itself succeeds; only execution rejects the cycle.
        store.save(b, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        for root in ["a", "b"] {
            let error = executor.execute(root, BTreeMap::new(), true).await.unwrap_err();
            match error {
                RetraceError::DependencyCycle { path } => {
                    assert!(path.contains(&"a".to_string()));
                    assert!(path.contains(&"b".to_string()));
                }
                other => panic!("expected cycle, got {:?}", other),
            }
        }
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn extract_output_feeds_subsequent_scenarios() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut producer = Scenario::new("order_page", Utc::now());
        producer.metadata.outputs.push("order_id".to_string());
        producer.chain = vec![Action::new(
            ActionPayload::Extract {
                attribute: None,
                multiple: false,
                output: "order_id".to_string(),
            },
            Some(SelectorSpec::bare(".order-number")),
            1,
        )];
        store.save(producer, None).unwrap();

        let mut consumer = Scenario::new("confirm", Utc::now());
        let mut edge = DependencyRef::named("order_page");
        edge.parameters.insert(
            "order".to_string(),
            OutputBinding {
                output: "order_id".to_string(),
                transform: Some("trim".to_string()),
            },
        );
        consumer.metadata.dependencies.push(edge);
        consumer.chain = vec![Action::type_text(
            SelectorSpec::bare("#confirm-order"),
            "{{order}}",
            1,
        )];
        store.save(consumer, None).unwrap();

        let driver = Arc::new(
            MockDriver::new().with_extract_result(".order-number", json!("  A-1207  ")),
        );
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("confirm", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.outputs["order_id"], json!("  A-1207  "));
        assert!(driver
            .action_calls()
            .contains(&"type:#confirm-order:A-1207".to_string()));
    }

    #[tokio::test]
    async fn unresolved_placeholders_pass_through_to_the_driver() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("partial", Utc::now());
        scenario.chain = vec![Action::type_text(
            SelectorSpec::bare("#field"),
            "{{never_supplied}}",
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        executor.execute("partial", BTreeMap::new(), true).await.unwrap();
        assert!(driver
            .action_calls()
            .contains(&"type:#field:{{never_supplied}}".to_string()));
    }

    #[tokio::test]
    async fn exhausted_retries_produce_a_structured_diagnostic() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("broken", Utc::now());
        scenario.chain = vec![Action::click(SelectorSpec::bare("#gone"), 1)];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_missing_element("#gone"));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("broken", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(!report.success);
        assert!(report.executed.is_empty());
        assert!(!report.errors.is_empty());

        let failure = report.failure.expect("diagnostic expected");
        assert_eq!(failure.scenario, "broken");
        assert_eq!(failure.action_kind, "click");
        assert_eq!(failure.selector.as_deref(), Some("#gone"));
        assert_eq!(failure.attempts.len(), 3);
        let page = failure.page.as_ref().unwrap();
        assert_eq!(page.url, "https://example.com/");
        assert!(page.element.is_none());
        assert!(failure
            .suggestions
            .iter()
            .any(|s| s.contains("dynamically added")));
    }

    #[tokio::test]
    async fn playback_failure_stops_subsequent_scenarios() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut base = Scenario::new("base", Utc::now());
        base.chain = vec![Action::click(SelectorSpec::bare("#broken"), 1)];
        store.save(base, None).unwrap();

        let mut top = Scenario::new("top", Utc::now());
        top.metadata.dependencies.push(DependencyRef::named("base"));
        top.chain = vec![Action::click(SelectorSpec::bare("#after"), 1)];
        store.save(top, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_missing_element("#broken"));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor.execute("top", BTreeMap::new(), true).await.unwrap();

        assert!(!report.success);
        assert!(report.executed.is_empty());
        assert!(!driver.action_calls().contains(&"click:#after".to_string()));
    }

    #[tokio::test]
    async fn optional_dependency_failure_does_not_stop_the_chain() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut warmup = Scenario::new("warmup", Utc::now());
        warmup.chain = vec![Action::click(SelectorSpec::bare("#flaky"), 1)];
        store.save(warmup, None).unwrap();

        let mut main = Scenario::new("main", Utc::now());
        let mut edge = DependencyRef::named("warmup");
        edge.optional = true;
        main.metadata.dependencies.push(edge);
        main.chain = vec![Action::click(SelectorSpec::bare("#go"), 1)];
        store.save(main, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_missing_element("#flaky"));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor.execute("main", BTreeMap::new(), true).await.unwrap();

        assert!(report.success);
        assert_eq!(report.executed, vec!["main"]);
        assert!(!report.errors.is_empty());
        assert!(driver.action_calls().contains(&"click:#go".to_string()));
    }

    #[tokio::test]
    async fn requires_wait_click_runs_settlement() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("settling", Utc::now());
        scenario.chain = vec![Action::new(
            ActionPayload::Click {
                text: None,
                href: Some("/next".to_string()),
                requires_wait: true,
            },
            Some(SelectorSpec::bare("a.next")),
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        executor.execute("settling", BTreeMap::new(), true).await.unwrap();

        let calls = driver.calls();
        assert!(calls.contains(&"wait_millis:2000".to_string()));
        assert!(calls.iter().any(|c| c.starts_with("wait_animations_idle")));
        assert!(calls.iter().any(|c| c.starts_with("wait_network_idle")));
        assert!(calls.iter().any(|c| c.starts_with("wait_dom_quiet")));
    }

    #[tokio::test]
    async fn type_preflight_rejects_non_editable_targets() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("readonly", Utc::now());
        scenario.chain = vec![Action::type_text(SelectorSpec::bare("#label"), "text", 1)];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new().with_element_state(
            "#label",
            ElementStateSnapshot {
                tag: "span".to_string(),
                width: 50.0,
                height: 20.0,
                display: "block".to_string(),
                visibility: "visible".to_string(),
                opacity: 1.0,
                editable: false,
                ..Default::default()
            },
        ));
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("readonly", BTreeMap::new(), true)
            .await
            .unwrap();

        assert!(!report.success);
        let failure = report.failure.unwrap();
        assert!(failure.attempts[0].outcome.contains("not editable"));
        // The driver's type call never happened.
        assert!(driver.action_calls().is_empty());
    }

    #[tokio::test]
    async fn native_select_preflight_requires_a_select_element() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("pick", Utc::now());
        scenario.chain = vec![Action::new(
            ActionPayload::Select(SelectMode::Native {
                value: "US".to_string(),
                label: None,
            }),
            Some(SelectorSpec::bare("#country")),
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor.execute("pick", BTreeMap::new(), true).await.unwrap();
        assert!(!report.success);
        assert!(report.failure.unwrap().attempts[0]
            .outcome
            .contains("not a native select"));
    }

    #[tokio::test]
    async fn custom_select_steps_drive_click_wait_click() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let container = SelectorSpec::bare(".select-container");
        let option = SelectorSpec::bare(".option");
        let mut scenario = Scenario::new("dropdown", Utc::now());
        scenario.chain = vec![Action::new(
            ActionPayload::Select(SelectMode::Custom {
                steps: vec![
                    Action::click(container.clone(), 1),
                    Action::wait_ms(300, 2),
                    Action::click(option, 3),
                ],
            }),
            Some(container),
            3,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        executor.execute("dropdown", BTreeMap::new(), true).await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                "click:.select-container",
                "wait_millis:300",
                "click:.option",
            ]
        );
    }

    #[tokio::test]
    async fn drag_drives_the_pointer_sequence() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut scenario = Scenario::new("dragging", Utc::now());
        scenario.chain = vec![Action::new(
            ActionPayload::Drag {
                source: DragEndpoint::Selector {
                    selector: SelectorSpec::bare(".card"),
                },
                target: DragEndpoint::Point { x: 300.0, y: 120.0 },
            },
            None,
            1,
        )];
        store.save(scenario, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        executor.execute("dragging", BTreeMap::new(), true).await.unwrap();

        let calls = driver.calls();
        assert_eq!(
            calls,
            vec![
                "element_center:.card",
                "pointer_move:50:60",
                "pointer_down:50:60",
                "pointer_move:300:120",
                "pointer_up:300:120",
            ]
        );
    }

    #[tokio::test]
    async fn suppressed_dependencies_leave_placeholders_unresolved() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp);

        let mut producer = Scenario::new("producer", Utc::now());
        producer.metadata.outputs.push("session".to_string());
        producer.chain = vec![Action::new(
            ActionPayload::Extract {
                attribute: None,
                multiple: false,
                output: "session".to_string(),
            },
            Some(SelectorSpec::bare("#session")),
            1,
        )];
        store.save(producer, None).unwrap();

        let mut consumer = Scenario::new("consumer", Utc::now());
        consumer
            .metadata
            .dependencies
            .push(DependencyRef::named("producer"));
        consumer.chain = vec![Action::type_text(
            SelectorSpec::bare("#token"),
            "{{session}}",
            1,
        )];
        store.save(consumer, None).unwrap();

        let driver = Arc::new(MockDriver::new());
        let executor =
            ScenarioExecutor::new(store, driver.clone()).with_config(fast_config());

        let report = executor
            .execute("consumer", BTreeMap::new(), false)
            .await
            .unwrap();

        assert_eq!(report.executed, vec!["consumer"]);
        // The dependency never ran, so its output stays a placeholder.
        assert!(driver
            .action_calls()
            .contains(&"type:#token:{{session}}".to_string()));
    }
}
