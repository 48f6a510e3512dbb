//! In-memory `PageDriver` and `ElementFinder` doubles for engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use retrace_core::driver::{CookieInfo, ElementFinder, FinderCandidate, PageDriver};
use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{ElementStateSnapshot, InputModifier, PageContext, WaitUntil};

fn default_state() -> ElementStateSnapshot {
    ElementStateSnapshot {
        tag: "input".to_string(),
        width: 120.0,
        height: 24.0,
        display: "block".to_string(),
        visibility: "visible".to_string(),
        opacity: 1.0,
        pointer_events: "auto".to_string(),
        disabled: false,
        readonly: false,
        editable: true,
        is_select: false,
        bounding_box: None,
    }
}

/// Scripted driver double: records every call and fails where configured.
pub struct MockDriver {
    calls: Mutex<Vec<String>>,
    /// selector -> remaining failures (usize::MAX = always).
    failing: Mutex<HashMap<String, usize>>,
    missing: Mutex<Vec<String>>,
    states: Mutex<HashMap<String, ElementStateSnapshot>>,
    extract_results: Mutex<HashMap<String, Value>>,
    cookies: Vec<CookieInfo>,
    storage: Vec<String>,
    url: String,
    title: String,
    settled: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashMap::new()),
            missing: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            extract_results: Mutex::new(HashMap::new()),
            cookies: Vec::new(),
            storage: Vec::new(),
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            settled: true,
        }
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(CookieInfo {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_storage_key(mut self, key: &str) -> Self {
        self.storage.push(key.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_unsettled_page(mut self) -> Self {
        self.settled = false;
        self
    }

    /// The selector fails `times` interactions before recovering.
    pub fn with_failing_selector(self, selector: &str, times: usize) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(selector.to_string(), times);
        self
    }

    /// The selector never resolves to a node.
    pub fn with_missing_element(self, selector: &str) -> Self {
        self.missing.lock().unwrap().push(selector.to_string());
        self.with_failing_selector(selector, usize::MAX)
    }

    pub fn with_element_state(self, selector: &str, state: ElementStateSnapshot) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(selector.to_string(), state);
        self
    }

    pub fn with_extract_result(self, selector: &str, value: Value) -> Self {
        self.extract_results
            .lock()
            .unwrap()
            .insert(selector.to_string(), value);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Page-control invocations only (probes and waits filtered out).
    pub fn action_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !call.starts_with("element_state")
                    && !call.starts_with("page_context")
                    && !call.starts_with("wait_")
                    && !call.starts_with("cookies")
                    && !call.starts_with("storage_keys")
                    && !call.starts_with("evaluate")
                    && !call.starts_with("screenshot")
            })
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_selector(&self, selector: &str) -> Result<()> {
        let mut failing = self.failing.lock().unwrap();
        if let Some(remaining) = failing.get_mut(selector) {
            if *remaining == 0 {
                failing.remove(selector);
                return Ok(());
            }
            if *remaining != usize::MAX {
                *remaining -= 1;
            }
            return Err(RetraceError::driver(format!(
                "selector did not resolve: {}",
                selector
            )));
        }
        Ok(())
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str, _wait_until: WaitUntil) -> Result<()> {
        self.record(format!("navigate:{}", url));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click:{}", selector));
        self.check_selector(selector)
    }

    async fn type_text(&self, selector: &str, text: &str, _delay_ms: Option<u64>) -> Result<()> {
        self.record(format!("type:{}:{}", selector, text));
        self.check_selector(selector)
    }

    async fn clear_field(&self, selector: &str) -> Result<()> {
        self.record(format!("clear:{}", selector));
        self.check_selector(selector)
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("select:{}:{}", selector, value));
        self.check_selector(selector)
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.record(format!("hover:{}", selector));
        self.check_selector(selector)
    }

    async fn press_key(&self, key: &str, modifiers: &[InputModifier]) -> Result<()> {
        self.record(format!("press:{}:{}", key, modifiers.len()));
        Ok(())
    }

    async fn scroll_to(&self, selector: &str, x: f64, y: f64) -> Result<()> {
        self.record(format!("scroll:{}:{}:{}", selector, x, y));
        self.check_selector(selector)
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.record(format!("wait_for_selector:{}:{}", selector, timeout_ms));
        self.check_selector(selector)
    }

    async fn wait_millis(&self, ms: u64) -> Result<()> {
        self.record(format!("wait_millis:{}", ms));
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &str) -> Result<()> {
        self.record(format!("upload:{}:{}", selector, path));
        self.check_selector(selector)
    }

    async fn pointer_move(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("pointer_move:{}:{}", x, y));
        Ok(())
    }

    async fn pointer_down(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("pointer_down:{}:{}", x, y));
        Ok(())
    }

    async fn pointer_up(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("pointer_up:{}:{}", x, y));
        Ok(())
    }

    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        self.record(format!("element_center:{}", selector));
        Ok((50.0, 60.0))
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        self.record("evaluate".to_string());
        Ok(Value::Null)
    }

    async fn extract(
        &self,
        selector: &str,
        _attribute: Option<&str>,
        _multiple: bool,
    ) -> Result<Value> {
        self.record(format!("extract:{}", selector));
        Ok(self
            .extract_results
            .lock()
            .unwrap()
            .get(selector)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())))
    }

    async fn cookies(&self) -> Result<Vec<CookieInfo>> {
        self.record("cookies".to_string());
        Ok(self.cookies.clone())
    }

    async fn storage_keys(&self) -> Result<Vec<String>> {
        self.record("storage_keys".to_string());
        Ok(self.storage.clone())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    async fn element_state(&self, selector: &str) -> Result<Option<ElementStateSnapshot>> {
        self.record(format!("element_state:{}", selector));
        if self.missing.lock().unwrap().iter().any(|s| s == selector) {
            return Ok(None);
        }
        Ok(Some(
            self.states
                .lock()
                .unwrap()
                .get(selector)
                .cloned()
                .unwrap_or_else(default_state),
        ))
    }

    async fn page_context(&self) -> Result<PageContext> {
        self.record("page_context".to_string());
        Ok(PageContext {
            url: self.url.clone(),
            title: self.title.clone(),
            ready_state: "complete".to_string(),
            has_modal_overlay: false,
            active_element: None,
            element: None,
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.record("screenshot".to_string());
        Ok(Vec::new())
    }

    async fn wait_animations_idle(&self, cap_ms: u64) -> Result<bool> {
        self.record(format!("wait_animations_idle:{}", cap_ms));
        Ok(self.settled)
    }

    async fn wait_network_idle(&self, idle_ms: u64, cap_ms: u64) -> Result<bool> {
        self.record(format!("wait_network_idle:{}:{}", idle_ms, cap_ms));
        Ok(self.settled)
    }

    async fn wait_dom_quiet(&self, quiet_ms: u64, cap_ms: u64) -> Result<bool> {
        self.record(format!("wait_dom_quiet:{}:{}", quiet_ms, cap_ms));
        Ok(self.settled)
    }
}

/// Finder double returning a fixed candidate list.
pub struct MockFinder {
    pub candidates: Vec<FinderCandidate>,
    pub queries: Mutex<Vec<String>>,
}

impl MockFinder {
    pub fn with_candidates(selectors: &[&str]) -> Self {
        Self {
            candidates: selectors
                .iter()
                .enumerate()
                .map(|(index, selector)| FinderCandidate {
                    selector: selector.to_string(),
                    score: 1.0 - index as f64 * 0.1,
                    text: String::new(),
                })
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ElementFinder for MockFinder {
    async fn find(&self, description: &str, max_results: usize) -> Result<Vec<FinderCandidate>> {
        self.queries.lock().unwrap().push(description.to_string());
        Ok(self
            .candidates
            .iter()
            .take(max_results)
            .cloned()
            .collect())
    }
}

/// Convenience: caller parameter map from string pairs.
pub fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
