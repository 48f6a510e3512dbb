//! Selector synthesis: from a captured element snapshot, produce a verified
//! primary selector plus ordered fallbacks.
//!
//! IDs and test-id attributes survive unrelated page changes best; class and
//! attribute selectors degrade more gracefully than positional ones under
//! minor markup edits, so positional selectors come last.

use tracing::debug;

use crate::driver::DomInspector;
use crate::error::Result;
use crate::model::{ElementInfo, SelectorSpec};

/// One-shot attribute the capture layer stamps on the event target so
/// verification can confirm candidate identity.
pub const CAPTURE_MARKER_ATTR: &str = "data-retrace-marker";

/// Class names that flip with UI state and make unstable selectors.
const STATE_CLASSES: &[&str] = &["active", "visible", "hidden", "open", "closed"];

const MAX_COMBINED_CLASSES: usize = 3;

/// A class is stable when it is at least two characters, contains no run of
/// four or more digits (hashed/generated names), and is not a state class.
fn is_stable_class(class: &str) -> bool {
    if class.len() < 2 || STATE_CLASSES.contains(&class) {
        return false;
    }
    let mut digit_run = 0usize;
    for ch in class.chars() {
        if ch.is_ascii_digit() {
            digit_run += 1;
            if digit_run >= 4 {
                return false;
            }
        } else {
            digit_run = 0;
        }
    }
    true
}

fn quote_attr(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parent_prefix(info: &ElementInfo) -> Option<String> {
    let parent = info.parent.as_ref()?;
    if let Some(id) = parent.id.as_deref()
        && !id.is_empty()
        && !id.starts_with(|c: char| c.is_ascii_digit())
    {
        return Some(format!("#{}", id));
    }
    if let Some(class) = parent.classes.iter().find(|c| is_stable_class(c)) {
        return Some(format!("{}.{}", parent.tag, class));
    }
    if parent.tag.is_empty() {
        None
    } else {
        Some(parent.tag.clone())
    }
}

/// Candidate selectors for the captured node, in fixed priority order.
pub fn candidates(info: &ElementInfo) -> Vec<String> {
    let tag = info.tag.as_str();
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    if let Some(id) = info.id.as_deref()
        && !id.is_empty()
        && !id.starts_with(|c: char| c.is_ascii_digit())
    {
        push(format!("#{}", id));
    }
    if let Some(testid) = info.data_testid.as_deref() {
        push(format!("[data-testid=\"{}\"]", quote_attr(testid)));
    }
    if let Some(test) = info.data_test.as_deref() {
        push(format!("[data-test=\"{}\"]", quote_attr(test)));
    }

    let stable: Vec<&str> = info
        .classes
        .iter()
        .map(String::as_str)
        .filter(|class| is_stable_class(class))
        .collect();
    for class in &stable {
        push(format!("{}.{}", tag, class));
    }
    if stable.len() >= 2 {
        let combined = stable
            .iter()
            .take(MAX_COMBINED_CLASSES)
            .fold(tag.to_string(), |acc, class| format!("{}.{}", acc, class));
        push(combined);
    }

    if let Some(name) = info.name.as_deref()
        && !name.is_empty()
    {
        push(format!("{}[name=\"{}\"]", tag, quote_attr(name)));
    }

    let mut attr_conjunction = String::new();
    for (attr, value) in [
        ("role", info.role.as_deref()),
        ("aria-label", info.aria_label.as_deref()),
        ("placeholder", info.placeholder.as_deref()),
    ] {
        if let Some(value) = value
            && !value.is_empty()
        {
            attr_conjunction.push_str(&format!("[{}=\"{}\"]", attr, quote_attr(value)));
        }
    }
    if !attr_conjunction.is_empty() {
        push(format!("{}{}", tag, attr_conjunction));
    }

    if let Some(prefix) = parent_prefix(info) {
        if info.nth_of_type > 0 {
            push(format!(
                "{} > {}:nth-of-type({})",
                prefix, tag, info.nth_of_type
            ));
        }
        if info.nth_child > 0 {
            push(format!("{} > {}:nth-child({})", prefix, tag, info.nth_child));
        }
    }

    if info.nth_of_type > 0 {
        push(format!("{}:nth-of-type({})", tag, info.nth_of_type));
    }

    out
}

/// Synthesise a selector record for a captured node.
///
/// Each candidate is verified against the live document: it must resolve to
/// exactly one node and that node must carry the capture marker. The first
/// verified candidate becomes the primary; the remaining verified candidates
/// become ordered fallbacks.
pub async fn synthesize(
    info: &ElementInfo,
    marker: &str,
    dom: &dyn DomInspector,
) -> Result<SelectorSpec> {
    let candidates = candidates(info);
    let mut verified: Vec<String> = Vec::new();

    for candidate in &candidates {
        if dom.match_count(candidate).await? != 1 {
            continue;
        }
        if dom.marker_matches(candidate, marker).await? {
            verified.push(candidate.clone());
        }
    }

    let (primary, fallbacks) = match verified.split_first() {
        Some((first, rest)) => (first.clone(), rest.to_vec()),
        None => {
            // Positional last resort; nothing verified unique on this page.
            let last = candidates
                .last()
                .cloned()
                .unwrap_or_else(|| info.tag.clone());
            debug!(selector = %last, "no candidate verified unique, using positional selector");
            (last, Vec::new())
        }
    };

    Ok(SelectorSpec {
        primary,
        fallbacks,
        element_info: info.clone(),
    })
}
