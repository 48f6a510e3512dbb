//! Structured playback diagnostics: the contract with calling agents that
//! consume failure information to plan recovery.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Visibility and interactability snapshot of a resolved element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ElementStateSnapshot {
    #[serde(default)]
    pub tag: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub opacity: f64,
    #[serde(default)]
    pub pointer_events: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub is_select: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl ElementStateSnapshot {
    /// Whether the element would receive a pointer interaction.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.display != "none"
            && self.visibility != "hidden"
            && self.opacity > 0.0
    }

    /// Human-readable reason the element cannot be interacted with, if any.
    pub fn impediment(&self) -> Option<String> {
        if !self.is_visible() {
            return Some(format!(
                "element exists but is not visible ({}x{}, display: {}, visibility: {}, opacity: {})",
                self.width, self.height, self.display, self.visibility, self.opacity
            ));
        }
        if self.disabled {
            return Some("element is disabled".to_string());
        }
        if self.readonly {
            return Some("element is read-only".to_string());
        }
        if self.pointer_events == "none" {
            return Some("element has pointer-events: none".to_string());
        }
        None
    }
}

/// Page-level state captured when an action finally fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PageContext {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ready_state: String,
    #[serde(default)]
    pub has_modal_overlay: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_element: Option<String>,
    /// State of the failing selector's match, when it resolved at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementStateSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub selector: String,
    pub outcome: String,
}

/// Full diagnostic for an action that failed after retry exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackFailure {
    pub scenario: String,
    pub action_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageContext>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

impl fmt::Display for PlaybackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Action '{}' in scenario '{}' failed after {} attempt(s)",
            self.action_kind,
            self.scenario,
            self.attempts.len()
        )?;
        if let Some(selector) = &self.selector {
            write!(f, " (selector: {})", selector)?;
        }
        for record in &self.attempts {
            write!(
                f,
                "\n  attempt {} [{}]: {}",
                record.attempt, record.selector, record.outcome
            )?;
        }
        if let Some(page) = &self.page {
            write!(f, "\n  page: {} ({})", page.url, page.title)?;
            match &page.element {
                None => write!(f, "\n  element was not found in the document")?,
                Some(element) => {
                    if let Some(impediment) = element.impediment() {
                        write!(f, "\n  {}", impediment)?;
                    }
                }
            }
        }
        for suggestion in &self.suggestions {
            write!(f, "\n  suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_element_reports_impediment() {
        let snapshot = ElementStateSnapshot {
            tag: "button".to_string(),
            width: 0.0,
            height: 0.0,
            display: "none".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            ..Default::default()
        };
        assert!(!snapshot.is_visible());
        assert!(snapshot.impediment().unwrap().contains("not visible"));
    }

    #[test]
    fn disabled_element_reports_impediment() {
        let snapshot = ElementStateSnapshot {
            width: 10.0,
            height: 10.0,
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            disabled: true,
            ..Default::default()
        };
        assert_eq!(snapshot.impediment().unwrap(), "element is disabled");
    }

    #[test]
    fn failure_message_aggregates_attempts_and_suggestions() {
        let failure = PlaybackFailure {
            scenario: "login_flow".to_string(),
            action_kind: "click".to_string(),
            selector: Some("#submit".to_string()),
            attempts: vec![
                AttemptRecord {
                    attempt: 1,
                    selector: "#submit".to_string(),
                    outcome: "selector did not resolve".to_string(),
                },
                AttemptRecord {
                    attempt: 2,
                    selector: "button.save".to_string(),
                    outcome: "selector did not resolve".to_string(),
                },
            ],
            page: Some(PageContext {
                url: "https://example.com/login".to_string(),
                title: "Login".to_string(),
                ready_state: "complete".to_string(),
                has_modal_overlay: false,
                active_element: None,
                element: None,
            }),
            suggestions: vec!["element might be dynamically added".to_string()],
            screenshot: None,
        };

        let message = failure.to_string();
        assert!(message.contains("failed after 2 attempt(s)"));
        assert!(message.contains("attempt 2 [button.save]"));
        assert!(message.contains("element was not found"));
        assert!(message.contains("suggestion: element might be dynamically added"));
    }
}
