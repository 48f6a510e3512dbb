//! A single attached Chromium page: script evaluation, input dispatch,
//! navigation tracking, network accounting, and bridge event capture.

use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use retrace_core::driver::BridgeEvent;
use retrace_core::model::InputModifier;

use crate::cdp::{CdpConnection, CdpEvent};
use crate::keys::{key_spec, modifier_bits};

const EVENT_POLL_MS: u64 = 100;
const NAV_NETWORK_QUIET_MS: u64 = 500;
const NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// How far the current document has progressed. Ordered so a later phase
/// always satisfies a wait on an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LoadPhase {
    #[default]
    Loading,
    Interactive,
    Complete,
}

fn phase_of_ready_state(ready_state: &str) -> LoadPhase {
    match ready_state {
        "complete" => LoadPhase::Complete,
        "interactive" => LoadPhase::Interactive,
        _ => LoadPhase::Loading,
    }
}

/// Requests currently in flight, keyed by CDP request id. Events without a
/// request id carry nothing we can balance and are ignored.
#[derive(Debug, Default)]
pub struct NetworkTracker {
    inflight: HashSet<String>,
}

impl NetworkTracker {
    fn begin(&mut self, request_id: &str) {
        self.inflight.insert(request_id.to_string());
    }

    fn end(&mut self, request_id: &str) {
        self.inflight.remove(request_id);
    }

    pub fn idle(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Everything the page accumulates from the event stream: document phase,
/// network accounting, and events destined for the host bridge.
struct PageState {
    session_id: String,
    load_phase: LoadPhase,
    network: NetworkTracker,
    last_network_activity: Instant,
    bridge_events: VecDeque<BridgeEvent>,
}

impl PageState {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            load_phase: LoadPhase::Loading,
            network: NetworkTracker::default(),
            last_network_activity: Instant::now(),
            bridge_events: VecDeque::new(),
        }
    }

    /// A fresh document starts over on phase and network accounting.
    fn begin_navigation(&mut self) {
        self.load_phase = LoadPhase::Loading;
        self.network = NetworkTracker::default();
        self.last_network_activity = Instant::now();
    }

    /// Phases only move forward; a stale probe never regresses one.
    fn advance_phase(&mut self, phase: LoadPhase) {
        self.load_phase = self.load_phase.max(phase);
    }

    fn network_quiet_for(&self, idle: Duration) -> bool {
        self.network.idle() && self.last_network_activity.elapsed() >= idle
    }

    fn absorb(&mut self, event: &CdpEvent) {
        if !event.is_for_session(&self.session_id) {
            return;
        }

        match event.method.as_str() {
            "Page.lifecycleEvent" => match event.param_str("name") {
                Some("DOMContentLoaded") => self.advance_phase(LoadPhase::Interactive),
                Some("load") => {
                    self.advance_phase(LoadPhase::Complete);
                    self.bridge_events.push_back(BridgeEvent::Loaded);
                }
                _ => {}
            },
            "Network.requestWillBeSent" => {
                if let Some(request_id) = event.param_str("requestId") {
                    self.network.begin(request_id);
                    self.last_network_activity = Instant::now();
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(request_id) = event.param_str("requestId") {
                    self.network.end(request_id);
                    self.last_network_activity = Instant::now();
                }
            }
            "Runtime.bindingCalled" => {
                self.bridge_events.push_back(BridgeEvent::BindingCalled {
                    name: event.param_str("name").unwrap_or_default().to_string(),
                    payload: event.param_str("payload").unwrap_or_default().to_string(),
                });
            }
            "Page.frameNavigated" => {
                let Some(frame) = event.param("frame") else {
                    return;
                };
                let is_main = frame.get("parentId").and_then(Value::as_str).is_none();
                if is_main
                    && let Some(url) = frame.get("url").and_then(Value::as_str)
                {
                    self.bridge_events.push_back(BridgeEvent::MainFrameNavigated {
                        url: url.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
}

pub struct CdpPage {
    conn: CdpConnection,
    state: PageState,
}

impl CdpPage {
    pub async fn attach(ws_endpoint: &str) -> Result<Self> {
        let mut conn = CdpConnection::open(ws_endpoint).await?;

        let created = conn
            .call(None, "Target.createTarget", json!({"url": "about:blank"}))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target.createTarget returned no targetId"))?
            .to_string();

        let attached = conn
            .call(
                None,
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target.attachToTarget returned no sessionId"))?
            .to_string();

        conn.call(Some(&session_id), "Runtime.enable", json!({}))
            .await?;
        conn.call(Some(&session_id), "Page.enable", json!({}))
            .await?;
        conn.call(
            Some(&session_id),
            "Page.setLifecycleEventsEnabled",
            json!({"enabled": true}),
        )
        .await?;
        conn.call(Some(&session_id), "Network.enable", json!({}))
            .await?;
        conn.call(Some(&session_id), "DOM.enable", json!({}))
            .await?;

        Ok(Self {
            conn,
            state: PageState::new(session_id),
        })
    }

    fn session(&self) -> String {
        self.state.session_id.clone()
    }

    pub async fn close_browser(&mut self) -> Result<()> {
        let _ = self.conn.call(None, "Browser.close", json!({})).await;
        Ok(())
    }

    /// Drain browser events for up to `window`, folding each into the page
    /// state.
    pub async fn pump_events(&mut self, window: Duration) -> Result<()> {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            if let Some(event) = self.conn.next_event(remaining).await? {
                self.state.absorb(&event);
            }
        }
    }

    pub fn pop_bridge_event(&mut self) -> Option<BridgeEvent> {
        self.state.bridge_events.pop_front()
    }

    pub async fn evaluate_page_script(&mut self, expression: &str) -> Result<Value> {
        let result = self
            .conn
            .call(
                Some(&self.session()),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "replMode": false,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("JavaScript execution failed")
                .to_string();
            bail!("{}", message);
        }

        let remote = result.get("result").cloned().unwrap_or(Value::Null);
        if let Some(value) = remote.get("value") {
            return Ok(value.clone());
        }

        if remote.get("type").and_then(Value::as_str) == Some("undefined") {
            return Ok(Value::Null);
        }

        if let Some(description) = remote.get("description").and_then(Value::as_str) {
            return Ok(Value::String(description.to_string()));
        }

        Ok(Value::Null)
    }

    pub async fn add_binding(&mut self, name: &str) -> Result<()> {
        self.conn
            .call(Some(&self.session()), "Runtime.addBinding", json!({"name": name}))
            .await?;
        Ok(())
    }

    /// Register a script for every future document and evaluate it in the
    /// current one.
    pub async fn install_script(&mut self, script: &str) -> Result<()> {
        self.conn
            .call(
                Some(&self.session()),
                "Page.addScriptToEvaluateOnNewDocument",
                json!({"source": script}),
            )
            .await?;
        self.evaluate_page_script(script).await?;
        Ok(())
    }

    pub async fn navigate(&mut self, url: &str, wait_until: &str) -> Result<()> {
        self.state.begin_navigation();
        let result = self
            .conn
            .call(Some(&self.session()), "Page.navigate", json!({"url": url}))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            bail!("Navigation failed: {}", error_text);
        }

        let condition = wait_until.to_ascii_lowercase();
        if condition != "commit" {
            self.wait_for_document(&condition, Duration::from_secs(NAVIGATION_TIMEOUT_SECS))
                .await?;
        }

        Ok(())
    }

    async fn wait_for_document(&mut self, wait_until: &str, window: Duration) -> Result<()> {
        let started = Instant::now();

        loop {
            // Lifecycle events can land before we attach our listeners, so
            // the document's own readyState is merged in as a floor.
            let probed = match self.evaluate_page_script("document.readyState").await {
                Ok(value) => phase_of_ready_state(value.as_str().unwrap_or("loading")),
                Err(_) => LoadPhase::Loading,
            };
            self.state.advance_phase(probed);

            let done = match wait_until {
                "domcontentloaded" => self.state.load_phase >= LoadPhase::Interactive,
                "network_idle" | "networkidle" => {
                    self.state.load_phase == LoadPhase::Complete
                        && self
                            .state
                            .network_quiet_for(Duration::from_millis(NAV_NETWORK_QUIET_MS))
                }
                _ => self.state.load_phase == LoadPhase::Complete,
            };

            if done {
                return Ok(());
            }

            if started.elapsed() > window {
                bail!("Timed out waiting for page readiness ({})", wait_until);
            }

            self.pump_events(Duration::from_millis(EVENT_POLL_MS)).await?;
        }
    }

    pub async fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout_window = Duration::from_millis(timeout_ms.max(1));

        loop {
            let script = format!(
                "(function() {{\n  const selector = {};\n  const element = document.querySelector(selector);\n  const present = !!element;\n  let visible = false;\n  if (element) {{\n    const style = window.getComputedStyle(element);\n    const rect = element.getBoundingClientRect();\n    visible = style.visibility !== 'hidden' && style.display !== 'none' && rect.width > 0 && rect.height > 0;\n  }}\n  return {{ present, visible }};\n}})()",
                serde_json::to_string(selector)?
            );

            let result = self.evaluate_page_script(&script).await?;
            let present = result
                .get("present")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let visible = result
                .get("visible")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            if present && visible {
                return Ok(());
            }

            if start.elapsed() > timeout_window {
                bail!("Timed out waiting for selector '{}'", selector);
            }

            sleep(Duration::from_millis(EVENT_POLL_MS)).await;
        }
    }

    pub async fn focus_selector(&mut self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;
        let focus_script = format!(
            "(function() {{\n  const selector = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  element.focus?.();\n  return {{ ok: true }};\n}})()",
            serde_json::to_string(selector)?
        );
        let result = self.evaluate_page_script(&focus_script).await?;
        extract_script_result(result)?;
        Ok(())
    }

    pub async fn dispatch_key(&mut self, key: &str, modifiers: &[InputModifier]) -> Result<()> {
        self.dispatch_key_event("keyDown", key, modifiers, true)
            .await?;
        self.dispatch_key_event("keyUp", key, modifiers, false).await
    }

    async fn dispatch_key_event(
        &mut self,
        event_type: &str,
        key: &str,
        modifiers: &[InputModifier],
        include_text: bool,
    ) -> Result<()> {
        let spec = key_spec(key);
        let mut params = json!({
            "type": event_type,
            "key": spec.dom_key,
            "code": spec.dom_code,
            "windowsVirtualKeyCode": spec.windows_keycode,
            "nativeVirtualKeyCode": spec.windows_keycode,
            "modifiers": modifier_bits(modifiers),
        });
        if include_text && let Some(text) = spec.text {
            params["text"] = json!(text);
            params["unmodifiedText"] = params["text"].clone();
        }

        self.conn
            .call(Some(&self.session()), "Input.dispatchKeyEvent", params)
            .await?;
        Ok(())
    }

    pub async fn dispatch_mouse(
        &mut self,
        event_type: &str,
        x: f64,
        y: f64,
        click_count: u32,
    ) -> Result<()> {
        let mut params = json!({
            "type": event_type,
            "x": x,
            "y": y,
            "modifiers": 0,
        });
        if event_type == "mouseMoved" {
            params["button"] = json!("none");
            params["buttons"] = json!(0);
        } else {
            params["button"] = json!("left");
            params["buttons"] = json!(1);
            params["clickCount"] = json!(click_count.max(1));
        }

        self.conn
            .call(Some(&self.session()), "Input.dispatchMouseEvent", params)
            .await?;
        Ok(())
    }

    pub async fn element_center(&mut self, selector: &str) -> Result<(f64, f64)> {
        let script = format!(
            "(function() {{\n  const element = document.querySelector({});\n  if (!element) return {{ ok: false, error: 'Selector not found' }};\n  const rect = element.getBoundingClientRect();\n  return {{ ok: true, value: {{ x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }} }};\n}})()",
            serde_json::to_string(selector)?
        );
        let value = extract_script_result(self.evaluate_page_script(&script).await?)?;
        let x = value.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = value.get("y").and_then(Value::as_f64).unwrap_or(0.0);
        Ok((x, y))
    }

    pub async fn upload_file(&mut self, selector: &str, path: &str) -> Result<()> {
        let session = self.session();
        let document = self
            .conn
            .call(Some(&session), "DOM.getDocument", json!({"depth": 1}))
            .await?;
        let root_id = document
            .get("root")
            .and_then(|root| root.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("DOM.getDocument returned no root node"))?;

        let found = self
            .conn
            .call(
                Some(&session),
                "DOM.querySelector",
                json!({"nodeId": root_id, "selector": selector}),
            )
            .await?;
        let node_id = found.get("nodeId").and_then(Value::as_i64).unwrap_or(0);
        if node_id == 0 {
            bail!("Selector not found: {}", selector);
        }

        self.conn
            .call(
                Some(&session),
                "DOM.setFileInputFiles",
                json!({"files": [path], "nodeId": node_id}),
            )
            .await?;
        Ok(())
    }

    pub async fn cookies(&mut self) -> Result<Vec<(String, String)>> {
        let result = self
            .conn
            .call(Some(&self.session()), "Network.getCookies", json!({}))
            .await?;
        let cookies = result
            .get("cookies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(cookies
            .iter()
            .filter_map(|cookie| {
                let name = cookie.get("name")?.as_str()?.to_string();
                let value = cookie
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some((name, value))
            })
            .collect())
    }

    pub async fn screenshot(&mut self) -> Result<Vec<u8>> {
        use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

        let result = self
            .conn
            .call(
                Some(&self.session()),
                "Page.captureScreenshot",
                json!({"format": "png", "fromSurface": true}),
            )
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Page.captureScreenshot returned no image data"))?;
        BASE64_STANDARD
            .decode(data)
            .map_err(|error| anyhow!("Failed to decode screenshot data: {}", error))
    }

    /// True once no CSS animation or non-trivial transition is running.
    pub async fn wait_animations_idle(&mut self, cap_ms: u64) -> Result<bool> {
        let start = Instant::now();
        let cap = Duration::from_millis(cap_ms);
        loop {
            let running = self
                .evaluate_page_script(
                    "(function() {\n  if (!document.getAnimations) return 0;\n  return document.getAnimations().filter(a => a.playState === 'running' && (a.effect?.getTiming?.().duration ?? 0) > 50).length;\n})()",
                )
                .await?
                .as_u64()
                .unwrap_or(0);
            if running == 0 {
                return Ok(true);
            }
            if start.elapsed() >= cap {
                return Ok(false);
            }
            sleep(Duration::from_millis(EVENT_POLL_MS)).await;
        }
    }

    /// True once no request has been in flight for `idle_ms`.
    pub async fn wait_network_idle(&mut self, idle_ms: u64, cap_ms: u64) -> Result<bool> {
        let start = Instant::now();
        let cap = Duration::from_millis(cap_ms);
        loop {
            self.pump_events(Duration::from_millis(EVENT_POLL_MS)).await?;
            if self
                .state
                .network_quiet_for(Duration::from_millis(idle_ms))
            {
                return Ok(true);
            }
            if start.elapsed() >= cap {
                return Ok(false);
            }
        }
    }

    /// True once the DOM has gone `quiet_ms` without mutations. Installs a
    /// MutationObserver stamping the last mutation time on first use.
    pub async fn wait_dom_quiet(&mut self, quiet_ms: u64, cap_ms: u64) -> Result<bool> {
        self.evaluate_page_script(
            "(function() {\n  if (window.__retraceMutationTs !== undefined) return true;\n  window.__retraceMutationTs = Date.now();\n  const observer = new MutationObserver(() => { window.__retraceMutationTs = Date.now(); });\n  observer.observe(document.documentElement, { childList: true, subtree: true, attributes: true, characterData: true });\n  return true;\n})()",
        )
        .await?;

        let start = Instant::now();
        let cap = Duration::from_millis(cap_ms);
        loop {
            let since = self
                .evaluate_page_script("Date.now() - (window.__retraceMutationTs ?? 0)")
                .await?
                .as_u64()
                .unwrap_or(u64::MAX);
            if since >= quiet_ms {
                return Ok(true);
            }
            if start.elapsed() >= cap {
                return Ok(false);
            }
            sleep(Duration::from_millis(EVENT_POLL_MS)).await;
        }
    }
}

pub fn extract_script_result(value: Value) -> Result<Value> {
    if let Some(ok) = value.get("ok").and_then(Value::as_bool) {
        if ok {
            return Ok(value.get("value").cloned().unwrap_or(Value::Null));
        }

        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown page script error");
        bail!("{}", message);
    }

    Ok(value)
}

pub fn build_dynamic_eval_script(source: &str) -> Result<String> {
    let source = serde_json::to_string(source)?;
    Ok(format!(
        "(async () => {{\n  const __source = {};\n  try {{\n    const expressionResult = await (0, eval)('(' + __source + ')');\n    return {{ ok: true, value: expressionResult }};\n  }} catch (_ignored) {{}}\n  try {{\n    const statementResult = await (0, eval)(__source);\n    return {{ ok: true, value: statementResult }};\n  }} catch (error) {{\n    return {{ ok: false, error: error?.stack ?? String(error) }};\n  }}\n}})()",
        source
    ))
}
