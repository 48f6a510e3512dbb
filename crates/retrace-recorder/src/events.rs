//! Events forwarded from the in-page capture script over the host binding.

use serde::{Deserialize, Serialize};

use retrace_core::classifier::{FieldInfo, FormInfo};
use retrace_core::model::ElementInfo;

/// One message from the capture layer. The script resolves the actual
/// clickable target, stamps it with a one-shot marker, and serialises an
/// element snapshot before forwarding; the host never touches the DOM
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapturedEvent {
    /// Start button pressed in the widget.
    Start { url: String, timestamp: i64 },
    Pause { timestamp: i64 },
    Resume { timestamp: i64 },
    /// Stop-and-save pressed with a scenario name.
    Save {
        name: String,
        url: String,
        timestamp: i64,
    },
    Cancel { timestamp: i64 },
    /// Widget moved or collapsed; retained for snapshot restore only.
    Widget {
        x: f64,
        y: f64,
        collapsed: bool,
        timestamp: i64,
    },
    Click {
        element: ElementInfo,
        marker: String,
        element_id: u64,
        #[serde(default)]
        ancestor_ids: Vec<u64>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        href: Option<String>,
        timestamp: i64,
    },
    /// Flushed by the script's 500 ms per-node debounce.
    Input {
        element: ElementInfo,
        marker: String,
        field: FieldInfo,
        #[serde(default)]
        form: Option<FormInfo>,
        value: String,
        timestamp: i64,
    },
    SelectChange {
        element: ElementInfo,
        marker: String,
        value: String,
        #[serde(default)]
        label: Option<String>,
        timestamp: i64,
    },
    FileSelect {
        element: ElementInfo,
        marker: String,
        #[serde(default)]
        filename: Option<String>,
        timestamp: i64,
    },
    /// Flushed by the script's 1000 ms per-target debounce; final position.
    Scroll {
        element: ElementInfo,
        marker: String,
        x: f64,
        y: f64,
        timestamp: i64,
    },
    /// Only emitted for elements with a matching `:hover` CSS rule.
    Hover {
        element: ElementInfo,
        marker: String,
        element_id: u64,
        timestamp: i64,
    },
    Keydown {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
        timestamp: i64,
    },
    DragStart {
        element: ElementInfo,
        marker: String,
        x: f64,
        y: f64,
        timestamp: i64,
    },
    DragEnd {
        #[serde(default)]
        element: Option<ElementInfo>,
        #[serde(default)]
        marker: Option<String>,
        x: f64,
        y: f64,
        timestamp: i64,
    },
}

impl CapturedEvent {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_event_parses_from_script_payload() {
        let payload = json!({
            "kind": "click",
            "element": {
                "tag": "button",
                "id": "submit-btn",
                "classes": ["btn"],
                "nth_of_type": 1,
                "nth_child": 3
            },
            "marker": "m7",
            "element_id": 12,
            "ancestor_ids": [11, 4, 1],
            "text": "Sign in",
            "timestamp": 1700000000000i64
        })
        .to_string();

        let event = CapturedEvent::parse(&payload).unwrap();
        match event {
            CapturedEvent::Click {
                element,
                marker,
                element_id,
                ancestor_ids,
                text,
                ..
            } => {
                assert_eq!(element.tag, "button");
                assert_eq!(marker, "m7");
                assert_eq!(element_id, 12);
                assert_eq!(ancestor_ids, vec![11, 4, 1]);
                assert_eq!(text.as_deref(), Some("Sign in"));
            }
            other => panic!("expected click, got {:?}", other),
        }
    }

    #[test]
    fn input_event_carries_field_and_form_descriptors() {
        let payload = json!({
            "kind": "input",
            "element": {"tag": "input", "id": "pw", "nth_of_type": 1, "nth_child": 2},
            "marker": "m8",
            "field": {"type": "password", "name": "password"},
            "form": {"id": "login-form", "has_password_input": true},
            "value": "secret123",
            "timestamp": 1
        })
        .to_string();

        let event = CapturedEvent::parse(&payload).unwrap();
        match event {
            CapturedEvent::Input { field, form, value, .. } => {
                assert_eq!(field.input_type.as_deref(), Some("password"));
                assert!(form.unwrap().has_password_input);
                assert_eq!(value, "secret123");
            }
            other => panic!("expected input, got {:?}", other),
        }
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(CapturedEvent::parse("{}").is_err());
        assert!(CapturedEvent::parse("not json").is_err());
    }
}
