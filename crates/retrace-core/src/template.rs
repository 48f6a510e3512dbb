//! `{{name}}` placeholder scanning and substitution.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap())
}

/// Collect every placeholder name appearing in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// True when `text` consists of exactly one placeholder and nothing else.
pub fn is_single_placeholder(text: &str) -> bool {
    placeholder_re()
        .find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

/// Substitute placeholders in a single pass so replacement values containing
/// `{{...}}` are never themselves substituted. Unknown placeholders are kept
/// unchanged as a deliberate signal.
pub fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut last_end = 0;

    for cap in placeholder_re().captures_iter(template) {
        let whole = cap.get(0).unwrap();
        rendered.push_str(&template[last_end..whole.start()]);
        match values.get(&cap[1]) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }
    rendered.push_str(&template[last_end..]);
    rendered
}
