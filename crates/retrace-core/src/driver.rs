//! Boundary traits between the scenario core and the browser host.
//!
//! The executor, recorder, and selector synthesiser only ever talk to these
//! seams; `retrace-browser` implements them over CDP and tests implement
//! them in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::{ElementStateSnapshot, InputModifier, PageContext, WaitUntil};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieInfo {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Page-control driver: every method may suspend.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    /// Types into the target without clearing it first.
    async fn type_text(&self, selector: &str, text: &str, delay_ms: Option<u64>) -> Result<()>;
    async fn clear_field(&self, selector: &str) -> Result<()>;
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;
    async fn hover(&self, selector: &str) -> Result<()>;
    async fn press_key(&self, key: &str, modifiers: &[InputModifier]) -> Result<()>;
    async fn scroll_to(&self, selector: &str, x: f64, y: f64) -> Result<()>;
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;
    async fn wait_millis(&self, ms: u64) -> Result<()>;
    async fn upload_file(&self, selector: &str, path: &str) -> Result<()>;
    async fn pointer_move(&self, x: f64, y: f64) -> Result<()>;
    async fn pointer_down(&self, x: f64, y: f64) -> Result<()>;
    async fn pointer_up(&self, x: f64, y: f64) -> Result<()>;
    /// Center of the selector's bounding box, for pointer-driven drags.
    async fn element_center(&self, selector: &str) -> Result<(f64, f64)>;
    async fn evaluate(&self, expression: &str) -> Result<Value>;
    /// Reads text content or an attribute from one or all matches.
    async fn extract(
        &self,
        selector: &str,
        attribute: Option<&str>,
        multiple: bool,
    ) -> Result<Value>;
    async fn cookies(&self) -> Result<Vec<CookieInfo>>;
    /// Keys present in the page's persistent storage (local + session).
    async fn storage_keys(&self) -> Result<Vec<String>>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;
    /// Element state for pre-flight checks and failure diagnostics.
    /// Returns None when the selector resolves to no node.
    async fn element_state(&self, selector: &str) -> Result<Option<ElementStateSnapshot>>;
    /// Page-level context for failure diagnostics.
    async fn page_context(&self) -> Result<PageContext>;
    /// Screenshot as a PNG, for failure artifacts. Drivers without capture
    /// support may return an empty vector.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    // Settlement primitives. Each is independently time-bounded and reports
    // whether the condition was met within its cap; exceeding the cap is a
    // soft event, never an action failure.
    async fn wait_animations_idle(&self, cap_ms: u64) -> Result<bool>;
    async fn wait_network_idle(&self, idle_ms: u64, cap_ms: u64) -> Result<bool>;
    async fn wait_dom_quiet(&self, quiet_ms: u64, cap_ms: u64) -> Result<bool>;
}

/// Live-document queries used by selector synthesis at recording time.
#[async_trait]
pub trait DomInspector: Send + Sync {
    /// Number of nodes the selector resolves to.
    async fn match_count(&self, selector: &str) -> Result<usize>;
    /// Whether the selector's first match carries the capture marker.
    async fn marker_matches(&self, selector: &str, marker: &str) -> Result<bool>;
}

/// Event delivered from the page to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A host callback exposed to the page was invoked.
    BindingCalled { name: String, payload: String },
    /// The main frame navigated to a new document.
    MainFrameNavigated { url: String },
    /// The current document finished loading.
    Loaded,
}

/// In-page host bridge: script injection, named host callbacks, and
/// navigation lifecycle events. The in-page script and the host never share
/// memory; this is the only channel between them.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Evaluate the script in the current document and register it to run in
    /// every future document of this page.
    async fn inject(&self, script: &str) -> Result<()>;
    /// Expose a named host callback to the page's global scope.
    async fn expose_binding(&self, name: &str) -> Result<()>;
    /// Evaluate an expression in the current page (widget state pushes).
    async fn eval_in_page(&self, expression: &str) -> Result<Value>;
    /// Next bridge event, or None when the page is gone.
    async fn next_event(&self) -> Result<Option<BridgeEvent>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinderCandidate {
    pub selector: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub text: String,
}

/// Smart element finder consulted by executor recovery when a recorded
/// selector fails and descriptive text is available.
#[async_trait]
pub trait ElementFinder: Send + Sync {
    async fn find(&self, description: &str, max_results: usize) -> Result<Vec<FinderCandidate>>;
}
