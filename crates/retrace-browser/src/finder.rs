//! Text-match element finder: ranks interactive elements by how well their
//! visible text or labels match a description. Used only by the executor's
//! recovery path.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use retrace_core::driver::{ElementFinder, FinderCandidate};
use retrace_core::error::{Result, RetraceError};

use crate::page::{CdpPage, extract_script_result};

#[derive(Clone)]
pub struct TextMatchFinder {
    page: Arc<Mutex<CdpPage>>,
}

impl TextMatchFinder {
    pub fn new(page: Arc<Mutex<CdpPage>>) -> Self {
        Self { page }
    }
}

fn finder_script(description: &str, max_results: usize) -> Result<String> {
    Ok(format!(
        "(function() {{\n  const needle = {}.toLowerCase().trim();\n  const max = {};\n  const interactive = document.querySelectorAll('a, button, input, select, textarea, [role], [onclick], [tabindex]');\n  const scored = [];\n  const selectorFor = (el) => {{\n    if (el.id) return '#' + el.id;\n    const testid = el.getAttribute('data-testid');\n    if (testid) return `[data-testid=\"${{testid}}\"]`;\n    const name = el.getAttribute('name');\n    if (name) return `${{el.tagName.toLowerCase()}}[name=\"${{name}}\"]`;\n    const cls = Array.from(el.classList).find(c => c.length >= 2);\n    if (cls) return el.tagName.toLowerCase() + '.' + cls;\n    const siblings = Array.from(el.parentElement?.children ?? []).filter(s => s.tagName === el.tagName);\n    const index = siblings.indexOf(el) + 1;\n    return `${{el.tagName.toLowerCase()}}:nth-of-type(${{index}})`;\n  }};\n  for (const el of interactive) {{\n    const rect = el.getBoundingClientRect();\n    if (rect.width === 0 || rect.height === 0) continue;\n    const text = (el.textContent ?? '').trim().toLowerCase();\n    const label = [el.getAttribute('aria-label'), el.getAttribute('placeholder'), el.getAttribute('title'), el.value].filter(Boolean).join(' ').toLowerCase();\n    let score = 0;\n    if (text === needle) score = 1.0;\n    else if (text.includes(needle)) score = 0.7;\n    else if (label.includes(needle)) score = 0.6;\n    if (score === 0) continue;\n    scored.push({{ selector: selectorFor(el), score, text: (el.textContent ?? '').trim().slice(0, 60) }});\n  }}\n  scored.sort((a, b) => b.score - a.score);\n  return {{ ok: true, value: scored.slice(0, max) }};\n}})()",
        serde_json::to_string(description)?,
        max_results
    ))
}

#[async_trait]
impl ElementFinder for TextMatchFinder {
    async fn find(&self, description: &str, max_results: usize) -> Result<Vec<FinderCandidate>> {
        let script = finder_script(description, max_results)?;
        let mut page = self.page.lock().await;
        let value = page
            .evaluate_page_script(&script)
            .await
            .map_err(|error| RetraceError::driver(error.to_string()))?;
        let value: Value = extract_script_result(value)
            .map_err(|error| RetraceError::driver(error.to_string()))?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}
