//! `PageDriver` and `DomInspector` implementations over a CDP page.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

use retrace_core::driver::{CookieInfo, DomInspector, PageDriver};
use retrace_core::error::{Result, RetraceError};
use retrace_core::model::{ElementStateSnapshot, InputModifier, PageContext, WaitUntil};
use retrace_core::selector::CAPTURE_MARKER_ATTR;

use crate::page::{CdpPage, build_dynamic_eval_script, extract_script_result};

const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 10_000;

fn driver_err(error: anyhow::Error) -> RetraceError {
    RetraceError::driver(error.to_string())
}

#[derive(Clone)]
pub struct CdpDriver {
    page: Arc<Mutex<CdpPage>>,
}

impl CdpDriver {
    pub fn new(page: Arc<Mutex<CdpPage>>) -> Self {
        Self { page }
    }

    async fn run_script(&self, script: &str) -> Result<Value> {
        let mut page = self.page.lock().await;
        let value = page.evaluate_page_script(script).await.map_err(driver_err)?;
        extract_script_result(value).map_err(driver_err)
    }
}

fn wait_until_str(wait_until: WaitUntil) -> &'static str {
    match wait_until {
        WaitUntil::Load => "load",
        WaitUntil::DomContentLoaded => "domcontentloaded",
        WaitUntil::NetworkIdle => "network_idle",
        WaitUntil::Commit => "commit",
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<()> {
        let mut page = self.page.lock().await;
        page.navigate(url, wait_until_str(wait_until))
            .await
            .map_err(driver_err)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        {
            let mut page = self.page.lock().await;
            page.wait_for_selector(selector, DEFAULT_SELECTOR_TIMEOUT_MS)
                .await
                .map_err(driver_err)?;
        }
        let script = format!(
            "(function() {{\n  const selector = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  element.click();\n  return {{ ok: true }};\n}})()",
            serde_json::to_string(selector)?
        );
        self.run_script(&script).await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str, delay_ms: Option<u64>) -> Result<()> {
        {
            let mut page = self.page.lock().await;
            page.focus_selector(selector, DEFAULT_SELECTOR_TIMEOUT_MS)
                .await
                .map_err(driver_err)?;
        }

        match delay_ms {
            Some(delay) if delay > 0 => {
                for ch in text.chars() {
                    {
                        let mut page = self.page.lock().await;
                        page.dispatch_key(&ch.to_string(), &[])
                            .await
                            .map_err(driver_err)?;
                    }
                    sleep(Duration::from_millis(delay)).await;
                }
                Ok(())
            }
            _ => {
                let script = format!(
                    "(function() {{\n  const selector = {};\n  const value = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  if (element.isContentEditable) {{\n    element.textContent += value;\n  }} else {{\n    const existing = typeof element.value === 'string' ? element.value : '';\n    element.value = existing + value;\n  }}\n  element.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  element.dispatchEvent(new Event('change', {{ bubbles: true }}));\n  return {{ ok: true }};\n}})()",
                    serde_json::to_string(selector)?,
                    serde_json::to_string(text)?
                );
                self.run_script(&script).await?;
                Ok(())
            }
        }
    }

    async fn clear_field(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(function() {{\n  const selector = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  if (element.isContentEditable) {{\n    element.textContent = '';\n  }} else {{\n    element.value = '';\n  }}\n  element.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  return {{ ok: true }};\n}})()",
            serde_json::to_string(selector)?
        );
        self.run_script(&script).await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            "(function() {{\n  const selector = {};\n  const value = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  if (element.tagName !== 'SELECT') return {{ ok: false, error: 'Element is not a native select' }};\n  element.value = value;\n  if (element.value !== value) return {{ ok: false, error: `No option with value: ${{value}}` }};\n  element.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  element.dispatchEvent(new Event('change', {{ bubbles: true }}));\n  return {{ ok: true }};\n}})()",
            serde_json::to_string(selector)?,
            serde_json::to_string(value)?
        );
        self.run_script(&script).await?;
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        let mut page = self.page.lock().await;
        page.wait_for_selector(selector, DEFAULT_SELECTOR_TIMEOUT_MS)
            .await
            .map_err(driver_err)?;
        let (x, y) = page.element_center(selector).await.map_err(driver_err)?;
        page.dispatch_mouse("mouseMoved", x, y, 0)
            .await
            .map_err(driver_err)
    }

    async fn press_key(&self, key: &str, modifiers: &[InputModifier]) -> Result<()> {
        let mut page = self.page.lock().await;
        page.dispatch_key(key, modifiers).await.map_err(driver_err)
    }

    async fn scroll_to(&self, selector: &str, x: f64, y: f64) -> Result<()> {
        let script = format!(
            "(function() {{\n  const selector = {};\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  if (element === document.documentElement || element === document.body) {{\n    window.scrollTo({x}, {y});\n  }} else {{\n    element.scrollLeft = {x};\n    element.scrollTop = {y};\n  }}\n  return {{ ok: true }};\n}})()",
            serde_json::to_string(selector)?,
            x = x,
            y = y
        );
        self.run_script(&script).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let mut page = self.page.lock().await;
        page.wait_for_selector(selector, timeout_ms)
            .await
            .map_err(driver_err)
    }

    async fn wait_millis(&self, ms: u64) -> Result<()> {
        sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn upload_file(&self, selector: &str, path: &str) -> Result<()> {
        let mut page = self.page.lock().await;
        page.upload_file(selector, path).await.map_err(driver_err)
    }

    async fn pointer_move(&self, x: f64, y: f64) -> Result<()> {
        let mut page = self.page.lock().await;
        page.dispatch_mouse("mouseMoved", x, y, 0)
            .await
            .map_err(driver_err)
    }

    async fn pointer_down(&self, x: f64, y: f64) -> Result<()> {
        let mut page = self.page.lock().await;
        page.dispatch_mouse("mousePressed", x, y, 1)
            .await
            .map_err(driver_err)
    }

    async fn pointer_up(&self, x: f64, y: f64) -> Result<()> {
        let mut page = self.page.lock().await;
        page.dispatch_mouse("mouseReleased", x, y, 1)
            .await
            .map_err(driver_err)
    }

    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        let mut page = self.page.lock().await;
        page.element_center(selector).await.map_err(driver_err)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let script = build_dynamic_eval_script(expression).map_err(driver_err)?;
        self.run_script(&script).await
    }

    async fn extract(
        &self,
        selector: &str,
        attribute: Option<&str>,
        multiple: bool,
    ) -> Result<Value> {
        let script = format!(
            "(function() {{\n  const selector = {};\n  const attribute = {};\n  const read = (el) => attribute === null ? (el.textContent ?? '').trim() : (el.getAttribute(attribute) ?? '');\n  if ({}) {{\n    return {{ ok: true, value: Array.from(document.querySelectorAll(selector)).map(read) }};\n  }}\n  const element = document.querySelector(selector);\n  if (!element) return {{ ok: false, error: `Selector not found: ${{selector}}` }};\n  return {{ ok: true, value: read(element) }};\n}})()",
            serde_json::to_string(selector)?,
            serde_json::to_string(&attribute)?,
            if multiple { "true" } else { "false" }
        );
        self.run_script(&script).await
    }

    async fn cookies(&self) -> Result<Vec<CookieInfo>> {
        let mut page = self.page.lock().await;
        let cookies = page.cookies().await.map_err(driver_err)?;
        Ok(cookies
            .into_iter()
            .map(|(name, value)| CookieInfo { name, value })
            .collect())
    }

    async fn storage_keys(&self) -> Result<Vec<String>> {
        let value = self
            .run_script(
                "(function() {\n  try {\n    return { ok: true, value: Object.keys(localStorage).concat(Object.keys(sessionStorage)) };\n  } catch (error) {\n    return { ok: true, value: [] };\n  }\n})()",
            )
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        let mut page = self.page.lock().await;
        let value = page
            .evaluate_page_script("location.href")
            .await
            .map_err(driver_err)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> Result<String> {
        let mut page = self.page.lock().await;
        let value = page
            .evaluate_page_script("document.title")
            .await
            .map_err(driver_err)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_state(&self, selector: &str) -> Result<Option<ElementStateSnapshot>> {
        let script = format!(
            "(function() {{\n  const element = document.querySelector({});\n  if (!element) return {{ ok: true, value: null }};\n  const style = window.getComputedStyle(element);\n  const rect = element.getBoundingClientRect();\n  return {{ ok: true, value: {{\n    tag: element.tagName.toLowerCase(),\n    width: rect.width,\n    height: rect.height,\n    display: style.display,\n    visibility: style.visibility,\n    opacity: parseFloat(style.opacity),\n    pointer_events: style.pointerEvents,\n    disabled: !!element.disabled,\n    readonly: !!element.readOnly,\n    editable: element.tagName === 'INPUT' || element.tagName === 'TEXTAREA' || element.isContentEditable,\n    is_select: element.tagName === 'SELECT',\n    bounding_box: {{ x: rect.left, y: rect.top, width: rect.width, height: rect.height }}\n  }} }};\n}})()",
            serde_json::to_string(selector)?
        );
        let value = self.run_script(&script).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn page_context(&self) -> Result<PageContext> {
        let value = self
            .run_script(
                "(function() {\n  const overlay = Array.from(document.querySelectorAll('body *')).some(el => {\n    const style = window.getComputedStyle(el);\n    if (style.position !== 'fixed' && style.position !== 'absolute') return false;\n    if (parseInt(style.zIndex, 10) < 100) return false;\n    const rect = el.getBoundingClientRect();\n    return rect.width >= window.innerWidth * 0.5 && rect.height >= window.innerHeight * 0.5;\n  });\n  const active = document.activeElement;\n  return { ok: true, value: {\n    url: location.href,\n    title: document.title,\n    ready_state: document.readyState,\n    has_modal_overlay: overlay,\n    active_element: active && active !== document.body ? active.tagName.toLowerCase() + (active.id ? '#' + active.id : '') : null\n  } };\n})()",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let mut page = self.page.lock().await;
        page.screenshot().await.map_err(driver_err)
    }

    async fn wait_animations_idle(&self, cap_ms: u64) -> Result<bool> {
        let mut page = self.page.lock().await;
        page.wait_animations_idle(cap_ms).await.map_err(driver_err)
    }

    async fn wait_network_idle(&self, idle_ms: u64, cap_ms: u64) -> Result<bool> {
        let mut page = self.page.lock().await;
        page.wait_network_idle(idle_ms, cap_ms)
            .await
            .map_err(driver_err)
    }

    async fn wait_dom_quiet(&self, quiet_ms: u64, cap_ms: u64) -> Result<bool> {
        let mut page = self.page.lock().await;
        page.wait_dom_quiet(quiet_ms, cap_ms)
            .await
            .map_err(driver_err)
    }
}

#[async_trait]
impl DomInspector for CdpDriver {
    async fn match_count(&self, selector: &str) -> Result<usize> {
        let script = format!(
            "(function() {{\n  try {{\n    return {{ ok: true, value: document.querySelectorAll({}).length }};\n  }} catch (error) {{\n    return {{ ok: true, value: 0 }};\n  }}\n}})()",
            serde_json::to_string(selector)?
        );
        let value = self.run_script(&script).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn marker_matches(&self, selector: &str, marker: &str) -> Result<bool> {
        let script = format!(
            "(function() {{\n  try {{\n    const element = document.querySelector({});\n    return {{ ok: true, value: !!element && element.getAttribute({}) === {} }};\n  }} catch (error) {{\n    return {{ ok: true, value: false }};\n  }}\n}})()",
            serde_json::to_string(selector)?,
            serde_json::to_string(CAPTURE_MARKER_ATTR)?,
            serde_json::to_string(marker)?
        );
        let value = self.run_script(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}
