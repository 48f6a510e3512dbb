//! Deterministic rewrite of the raw recorded stream into the canonical
//! replayable chain. Passes run in a fixed order; the result is stable under
//! re-optimisation.

use crate::model::{Action, ActionPayload, SelectMode, SelectorSpec, WaitMode};

/// DOM id of the in-page recorder widget. Actions targeting it never belong
/// in a chain.
pub const WIDGET_ID: &str = "retrace-recorder-widget";

/// Longest idle gap between the two clicks of a custom-select pattern.
const CUSTOM_SELECT_MAX_WAIT_MS: u64 = 1_000;
/// Wait inserted between open and pick when no wait was recorded.
const CUSTOM_SELECT_DEFAULT_WAIT_MS: u64 = 300;
/// Clicks on the same selector within this window are duplicates.
const DUPLICATE_CLICK_WINDOW_MS: i64 = 500;

const CONTAINER_HINTS: &[&str] = &["select", "dropdown", "picker", "choice", "menu"];
const OPTION_HINTS: &[&str] = &["option", "item", "choice", "menu-item"];

pub fn optimize(raw: Vec<Action>) -> Vec<Action> {
    let chain = strip_widget_actions(raw);
    let chain = coalesce_types(chain);
    let chain = detect_custom_selects(chain);
    let chain = dedupe_clicks(chain);
    let chain = merge_waits(chain);
    let chain = drop_redundant_scrolls(chain);
    drop_redundant_hovers(chain)
}

fn references_widget(spec: &SelectorSpec) -> bool {
    spec.primary.contains(WIDGET_ID)
        || spec.element_info.id.as_deref() == Some(WIDGET_ID)
        || spec
            .element_info
            .classes
            .iter()
            .any(|class| class.starts_with("retrace-recorder"))
}

fn strip_widget_actions(actions: Vec<Action>) -> Vec<Action> {
    actions
        .into_iter()
        .filter(|action| !action.selector.as_ref().is_some_and(references_widget))
        .collect()
}

/// Typing was debounced per keystroke, producing progressive values; the last
/// action of a run is the latest truth.
fn coalesce_types(actions: Vec<Action>) -> Vec<Action> {
    let mut out: Vec<Action> = Vec::with_capacity(actions.len());
    for action in actions {
        if let (ActionPayload::Type { .. }, Some(previous)) = (&action.payload, out.last())
            && matches!(previous.payload, ActionPayload::Type { .. })
            && previous.primary_selector() == action.primary_selector()
        {
            out.pop();
        }
        out.push(action);
    }
    out
}

fn selector_hints_match(spec: &SelectorSpec, hints: &[&str]) -> bool {
    let mut haystack = spec.primary.to_lowercase();
    if let Some(id) = &spec.element_info.id {
        haystack.push(' ');
        haystack.push_str(&id.to_lowercase());
    }
    if let Some(role) = &spec.element_info.role {
        haystack.push(' ');
        haystack.push_str(&role.to_lowercase());
    }
    for class in &spec.element_info.classes {
        haystack.push(' ');
        haystack.push_str(&class.to_lowercase());
    }
    hints.iter().any(|hint| haystack.contains(hint))
}

fn container_click(action: &Action) -> Option<&SelectorSpec> {
    match (&action.payload, &action.selector) {
        (ActionPayload::Click { .. }, Some(spec)) if selector_hints_match(spec, CONTAINER_HINTS) => {
            Some(spec)
        }
        _ => None,
    }
}

fn option_click(action: &Action) -> Option<&SelectorSpec> {
    match (&action.payload, &action.selector) {
        (ActionPayload::Click { .. }, Some(spec)) if selector_hints_match(spec, OPTION_HINTS) => {
            Some(spec)
        }
        _ => None,
    }
}

fn short_wait_ms(action: &Action) -> Option<u64> {
    match &action.payload {
        ActionPayload::Wait(WaitMode::Duration { ms }) if *ms <= CUSTOM_SELECT_MAX_WAIT_MS => {
            Some(*ms)
        }
        _ => None,
    }
}

/// A click on a container-ish element, an optional short wait, then a click
/// on an option-ish element collapses into one custom-mode select.
fn detect_custom_selects(actions: Vec<Action>) -> Vec<Action> {
    let mut out: Vec<Action> = Vec::with_capacity(actions.len());
    let mut index = 0;

    while index < actions.len() {
        let Some(container) = container_click(&actions[index]) else {
            out.push(actions[index].clone());
            index += 1;
            continue;
        };

        let (wait_ms, option_index) = match actions.get(index + 1) {
            Some(next) => match short_wait_ms(next) {
                Some(ms) => (Some(ms), index + 2),
                None => (None, index + 1),
            },
            None => (None, index + 1),
        };

        let Some(option) = actions.get(option_index).and_then(option_click) else {
            out.push(actions[index].clone());
            index += 1;
            continue;
        };

        let container = container.clone();
        let option = option.clone();
        let open = &actions[index];
        let pick = &actions[option_index];
        let steps = vec![
            Action::click(container.clone(), open.timestamp),
            Action::wait_ms(
                wait_ms.unwrap_or(CUSTOM_SELECT_DEFAULT_WAIT_MS),
                open.timestamp,
            ),
            Action::click(option, pick.timestamp),
        ];
        out.push(Action::new(
            ActionPayload::Select(SelectMode::Custom { steps }),
            Some(container),
            open.timestamp,
        ));
        index = option_index + 1;
    }

    out
}

fn dedupe_clicks(actions: Vec<Action>) -> Vec<Action> {
    let mut out: Vec<Action> = Vec::with_capacity(actions.len());
    for action in actions {
        if let (ActionPayload::Click { .. }, Some(previous)) = (&action.payload, out.last())
            && matches!(previous.payload, ActionPayload::Click { .. })
            && previous.primary_selector() == action.primary_selector()
            && action.timestamp - previous.timestamp <= DUPLICATE_CLICK_WINDOW_MS
        {
            out.pop();
        }
        out.push(action);
    }
    out
}

fn merge_waits(actions: Vec<Action>) -> Vec<Action> {
    let mut out: Vec<Action> = Vec::with_capacity(actions.len());
    for action in actions {
        if let (
            ActionPayload::Wait(WaitMode::Duration { ms }),
            Some(Action {
                payload: ActionPayload::Wait(WaitMode::Duration { ms: previous_ms }),
                ..
            }),
        ) = (&action.payload, out.last_mut())
        {
            *previous_ms += ms;
            continue;
        }
        out.push(action);
    }
    out
}

/// Only the final position of a scroll run matters; an earlier scroll whose
/// next non-wait action is another scroll carries no information.
fn drop_redundant_scrolls(actions: Vec<Action>) -> Vec<Action> {
    let mut keep = vec![true; actions.len()];
    for (index, action) in actions.iter().enumerate() {
        if !matches!(action.payload, ActionPayload::Scroll { .. }) {
            continue;
        }
        let next_non_wait = actions
            .iter()
            .skip(index + 1)
            .find(|candidate| !matches!(candidate.payload, ActionPayload::Wait(_)));
        if next_non_wait.is_some_and(|next| matches!(next.payload, ActionPayload::Scroll { .. })) {
            keep[index] = false;
        }
    }
    actions
        .into_iter()
        .zip(keep)
        .filter_map(|(action, keep)| keep.then_some(action))
        .collect()
}

fn drop_redundant_hovers(actions: Vec<Action>) -> Vec<Action> {
    let mut keep = vec![true; actions.len()];
    for (index, action) in actions.iter().enumerate() {
        if !matches!(action.payload, ActionPayload::Hover {}) {
            continue;
        }

        if let Some(next) = actions
            .iter()
            .skip(index + 1)
            .find(|candidate| !matches!(candidate.payload, ActionPayload::Wait(_)))
            && matches!(next.payload, ActionPayload::Click { .. })
            && next.primary_selector() == action.primary_selector()
        {
            keep[index] = false;
            continue;
        }

        if let Some(previous) = index.checked_sub(1).map(|i| &actions[i])
            && matches!(previous.payload, ActionPayload::Hover {})
            && previous.primary_selector() == action.primary_selector()
        {
            keep[index] = false;
        }
    }
    actions
        .into_iter()
        .zip(keep)
        .filter_map(|(action, keep)| keep.then_some(action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementInfo;

    fn spec(primary: &str) -> SelectorSpec {
        SelectorSpec::bare(primary)
    }

    #[test]
    fn widget_actions_are_stripped() {
        let widget_spec = SelectorSpec {
            primary: format!("#{}", WIDGET_ID),
            fallbacks: Vec::new(),
            element_info: ElementInfo {
                id: Some(WIDGET_ID.to_string()),
                ..Default::default()
            },
        };
        let chain = optimize(vec![
            Action::click(widget_spec, 1),
            Action::click(spec("#real"), 2),
        ]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].primary_selector(), Some("#real"));
    }

    #[test]
    fn progressive_typing_coalesces_to_final_value() {
        let raw: Vec<Action> = ["H", "He", "Hel", "Hell", "Hello"]
            .iter()
            .enumerate()
            .map(|(i, text)| Action::type_text(spec("#greeting"), *text, i as i64))
            .collect();

        let chain = optimize(raw);
        assert_eq!(chain.len(), 1);
        match &chain[0].payload {
            ActionPayload::Type { text, .. } => assert_eq!(text, "Hello"),
            other => panic!("expected type, got {:?}", other),
        }
    }

    #[test]
    fn typing_on_different_selectors_is_preserved() {
        let chain = optimize(vec![
            Action::type_text(spec("#email"), "a@b.c", 1),
            Action::type_text(spec("#password"), "pw", 2),
        ]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn click_wait_click_becomes_custom_select() {
        let raw = vec![
            Action::click(spec(".select-container"), 100),
            Action::wait_ms(300, 150),
            Action::click(spec(".option[data-value='US']"), 400),
        ];

        let chain = optimize(raw);
        assert_eq!(chain.len(), 1);
        match &chain[0].payload {
            ActionPayload::Select(SelectMode::Custom { steps }) => {
                assert_eq!(steps.len(), 3);
                assert_eq!(steps[0].primary_selector(), Some(".select-container"));
                assert_eq!(
                    steps[1].payload,
                    ActionPayload::Wait(WaitMode::Duration { ms: 300 })
                );
                assert_eq!(
                    steps[2].primary_selector(),
                    Some(".option[data-value='US']")
                );
            }
            other => panic!("expected custom select, got {:?}", other),
        }
        assert_eq!(chain[0].primary_selector(), Some(".select-container"));
    }

    #[test]
    fn custom_select_without_wait_inserts_default_settle() {
        let chain = optimize(vec![
            Action::click(spec(".dropdown"), 100),
            Action::click(spec(".menu-item"), 200),
        ]);
        assert_eq!(chain.len(), 1);
        match &chain[0].payload {
            ActionPayload::Select(SelectMode::Custom { steps }) => {
                assert_eq!(
                    steps[1].payload,
                    ActionPayload::Wait(WaitMode::Duration { ms: 300 })
                );
            }
            other => panic!("expected custom select, got {:?}", other),
        }
    }

    #[test]
    fn non_matching_click_pair_stays_two_clicks() {
        let raw = vec![
            Action::click(spec(".select-container"), 100),
            Action::click(spec("#totally-plain"), 200),
        ];
        let chain = optimize(raw);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn long_wait_breaks_the_custom_select_pattern() {
        let raw = vec![
            Action::click(spec(".select-container"), 0),
            Action::wait_ms(5_000, 1),
            Action::click(spec(".option"), 5_100),
        ];
        let chain = optimize(raw);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn duplicate_clicks_within_window_keep_the_later() {
        let first = Action::click(spec("#save"), 100);
        let second = Action::click(spec("#save"), 400);
        let chain = optimize(vec![first, second.clone()]);
        assert_eq!(chain, vec![second]);

        let far_apart = optimize(vec![
            Action::click(spec("#save"), 100),
            Action::click(spec("#save"), 1_000),
        ]);
        assert_eq!(far_apart.len(), 2);
    }

    #[test]
    fn sequential_waits_merge_by_summing() {
        let chain = optimize(vec![
            Action::wait_ms(200, 1),
            Action::wait_ms(300, 2),
            Action::wait_ms(100, 3),
        ]);
        assert_eq!(chain.len(), 1);
        assert_eq!(
            chain[0].payload,
            ActionPayload::Wait(WaitMode::Duration { ms: 600 })
        );
    }

    #[test]
    fn earlier_scroll_is_dropped_even_across_waits() {
        let scroll = |y: f64, ts: i64| {
            Action::new(
                ActionPayload::Scroll { x: 0.0, y },
                Some(spec("html")),
                ts,
            )
        };
        let chain = optimize(vec![
            scroll(100.0, 1),
            Action::wait_ms(2_000, 2),
            scroll(900.0, 3),
        ]);
        // The waits merge later; the first scroll goes away.
        let scrolls: Vec<&Action> = chain
            .iter()
            .filter(|a| matches!(a.payload, ActionPayload::Scroll { .. }))
            .collect();
        assert_eq!(scrolls.len(), 1);
        match scrolls[0].payload {
            ActionPayload::Scroll { y, .. } => assert_eq!(y, 900.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn hover_before_click_on_same_selector_is_dropped() {
        let chain = optimize(vec![
            Action::hover(spec("#cta"), 1),
            Action::click(spec("#cta"), 2),
        ]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].kind(), "click");
    }

    #[test]
    fn repeated_identical_hovers_collapse() {
        let chain = optimize(vec![
            Action::hover(spec(".nav"), 1),
            Action::hover(spec(".nav"), 2),
        ]);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn hover_before_click_on_other_selector_survives() {
        let chain = optimize(vec![
            Action::hover(spec(".nav"), 1),
            Action::click(spec("#elsewhere"), 2),
        ]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn optimize_is_idempotent() {
        let raw = vec![
            Action::type_text(spec("#q"), "h", 1),
            Action::type_text(spec("#q"), "hi", 2),
            Action::click(spec(".select-container"), 3),
            Action::wait_ms(200, 4),
            Action::click(spec(".option"), 5),
            Action::hover(spec("#cta"), 6),
            Action::click(spec("#cta"), 7),
            Action::wait_ms(100, 8),
            Action::wait_ms(100, 9),
        ];

        let once = optimize(raw);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}
