//! Selector records: plain data computed once from a live DOM, replayed
//! against a possibly-different DOM. No back-reference to any node.

use serde::{Deserialize, Serialize};

/// Snapshot of a node's stable descriptors, captured at recording time.
/// Feeds both selector synthesis and the executor's recovery path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ElementInfo {
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_testid: Option<String>,
    /// 1-based index among same-tag siblings under the parent.
    #[serde(default)]
    pub nth_of_type: u32,
    /// 1-based index among all siblings under the parent.
    #[serde(default)]
    pub nth_child: u32,
    /// Short text excerpt of the node, used by smart-finder recovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentInfo>,
}

/// Abbreviated descriptor of the captured node's parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParentInfo {
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

/// A synthesised identifier for one DOM node: a verified-unique primary
/// selector plus ordered fallbacks for replay-time recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SelectorSpec {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub element_info: ElementInfo,
}

impl SelectorSpec {
    /// A selector spec with no recorded descriptors, for hand-authored
    /// scenario documents.
    pub fn bare(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallbacks: Vec::new(),
            element_info: ElementInfo::default(),
        }
    }

    /// Promote the most-preferred fallback to primary, consuming it.
    /// Returns false when no fallbacks remain.
    pub fn promote_fallback(&mut self) -> bool {
        if self.fallbacks.is_empty() {
            return false;
        }
        self.primary = self.fallbacks.remove(0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_consumes_fallbacks_in_order() {
        let mut spec = SelectorSpec {
            primary: "#old".to_string(),
            fallbacks: vec!["button.save".to_string(), "button:nth-of-type(2)".to_string()],
            element_info: ElementInfo::default(),
        };

        assert!(spec.promote_fallback());
        assert_eq!(spec.primary, "button.save");
        assert_eq!(spec.fallbacks.len(), 1);

        assert!(spec.promote_fallback());
        assert_eq!(spec.primary, "button:nth-of-type(2)");
        assert!(!spec.promote_fallback());
    }

    #[test]
    fn bare_spec_round_trips_without_optional_fields() {
        let spec = SelectorSpec::bare("#login");
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("fallbacks").is_none());
        let back: SelectorSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }
}
