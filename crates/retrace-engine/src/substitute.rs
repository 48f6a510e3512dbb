//! Parameter substitution over actions.
//!
//! Substitution deep-copies the action and replaces `{{name}}` in every
//! string field; unresolved placeholders pass through unchanged as a
//! deliberate signal rather than a silent blank.

use std::collections::BTreeMap;

use serde_json::Value;

use retrace_core::model::Action;
use retrace_core::template;

pub fn substitute_action(action: &Action, values: &BTreeMap<String, String>) -> Action {
    let Ok(mut tree) = serde_json::to_value(action) else {
        return action.clone();
    };
    substitute_value(&mut tree, values);
    serde_json::from_value(tree).unwrap_or_else(|_| action.clone())
}

fn substitute_value(value: &mut Value, values: &BTreeMap<String, String>) {
    match value {
        Value::String(text) => {
            if text.contains("{{") {
                *text = template::substitute(text, values);
            }
        }
        Value::Array(items) => {
            for item in items {
                substitute_value(item, values);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item, values);
            }
        }
        _ => {}
    }
}
