//! Guard evaluation for conditional dependencies.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use retrace_core::driver::PageDriver;
use retrace_core::error::Result;
use retrace_core::model::{Guard, GuardCheck};

use crate::context::ExecutionContext;

/// Cookie and storage-key fragments that indicate an authenticated session.
const AUTH_MARKERS: &[&str] = &["auth", "session", "token"];

const LOGOUT_PROBE: &str = "Array.from(document.querySelectorAll('a, button, [role=\"button\"]')).some(el => /log\\s*out|sign\\s*out/i.test(el.textContent ?? ''))";

/// Whether the guarded dependency should run. `skip_if` inverts the check:
/// a truthy check means skip when set, run otherwise. A failed evaluation
/// counts as a falsy check.
pub async fn should_run(
    guard: &Guard,
    driver: &dyn PageDriver,
    context: &ExecutionContext,
) -> bool {
    let check = evaluate_check(&guard.check, driver, context)
        .await
        .unwrap_or_else(|error| {
            debug!("guard evaluation failed, treating as false: {}", error);
            false
        });
    check != guard.skip_if
}

async fn evaluate_check(
    check: &GuardCheck,
    driver: &dyn PageDriver,
    context: &ExecutionContext,
) -> Result<bool> {
    match check {
        GuardCheck::IsAuthenticated => {
            let keys = driver.storage_keys().await.unwrap_or_default();
            if keys
                .iter()
                .any(|key| contains_marker(&key.to_lowercase()))
            {
                return Ok(true);
            }

            let cookies = driver.cookies().await.unwrap_or_default();
            if cookies
                .iter()
                .any(|cookie| contains_marker(&cookie.name.to_lowercase()))
            {
                return Ok(true);
            }

            let logout = driver.evaluate(LOGOUT_PROBE).await.unwrap_or(Value::Bool(false));
            Ok(logout.as_bool().unwrap_or(false))
        }
        GuardCheck::HasData { key } => Ok(context.has_variable(key)),
        GuardCheck::VariableExists { name } => Ok(context.has_variable(name)),
        GuardCheck::UrlMatches { pattern } => {
            let url = driver.current_url().await?;
            if url.contains(pattern.as_str()) {
                return Ok(true);
            }
            Ok(Regex::new(pattern)
                .map(|re| re.is_match(&url))
                .unwrap_or(false))
        }
        GuardCheck::ElementExists { selector } => {
            Ok(driver.element_state(selector).await?.is_some())
        }
        GuardCheck::Custom { expr } => {
            // Restricted context: the expression sees url, title, and
            // variables and nothing else; any failure yields false.
            let script = format!(
                "(function(url, title, variables) {{ try {{ return !!({expr}); }} catch (error) {{ return false; }} }})({url}, {title}, {variables})",
                expr = expr,
                url = serde_json::to_string(&driver.current_url().await?)?,
                title = serde_json::to_string(&driver.title().await?)?,
                variables = serde_json::to_string(&context.variables)?,
            );
            match driver.evaluate(&script).await {
                Ok(value) => Ok(value.as_bool().unwrap_or(false)),
                Err(error) => {
                    debug!("custom guard expression failed: {}", error);
                    Ok(false)
                }
            }
        }
    }
}

fn contains_marker(haystack: &str) -> bool {
    AUTH_MARKERS.iter().any(|marker| haystack.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDriver;
    use retrace_core::model::GuardCheck;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn guard(check: GuardCheck, skip_if: bool) -> Guard {
        Guard { check, skip_if }
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(BTreeMap::new())
    }

    #[tokio::test]
    async fn authenticated_session_cookie_triggers_skip() {
        let driver = MockDriver::new().with_cookie("session_id", "abc123");
        let skip_guard = guard(GuardCheck::IsAuthenticated, true);

        assert!(!should_run(&skip_guard, &driver, &context()).await);

        let run_guard = guard(GuardCheck::IsAuthenticated, false);
        assert!(should_run(&run_guard, &driver, &context()).await);
    }

    #[tokio::test]
    async fn unauthenticated_page_runs_the_guarded_dependency() {
        let driver = MockDriver::new();
        let skip_guard = guard(GuardCheck::IsAuthenticated, true);
        assert!(should_run(&skip_guard, &driver, &context()).await);
    }

    #[tokio::test]
    async fn auth_named_storage_key_counts_as_authenticated() {
        let driver = MockDriver::new().with_storage_key("auth_state");
        assert!(!should_run(&guard(GuardCheck::IsAuthenticated, true), &driver, &context()).await);
    }

    #[tokio::test]
    async fn url_matches_accepts_literal_and_regex() {
        let driver = MockDriver::new().with_url("https://example.com/checkout/step-2");

        let literal = guard(
            GuardCheck::UrlMatches {
                pattern: "checkout".to_string(),
            },
            false,
        );
        assert!(should_run(&literal, &driver, &context()).await);

        let regex = guard(
            GuardCheck::UrlMatches {
                pattern: r"step-\d+$".to_string(),
            },
            false,
        );
        assert!(should_run(&regex, &driver, &context()).await);

        let miss = guard(
            GuardCheck::UrlMatches {
                pattern: "billing".to_string(),
            },
            false,
        );
        assert!(!should_run(&miss, &driver, &context()).await);
    }

    #[tokio::test]
    async fn variable_checks_consult_the_context() {
        let driver = MockDriver::new();
        let mut context = context();
        context.set_output("order_id", json!("A-1"));

        assert!(
            should_run(
                &guard(
                    GuardCheck::HasData {
                        key: "order_id".to_string()
                    },
                    false
                ),
                &driver,
                &context
            )
            .await
        );
        assert!(
            !should_run(
                &guard(
                    GuardCheck::VariableExists {
                        name: "missing".to_string()
                    },
                    false
                ),
                &driver,
                &context
            )
            .await
        );
    }

    #[tokio::test]
    async fn element_exists_checks_the_page() {
        let driver = MockDriver::new();
        let present = guard(
            GuardCheck::ElementExists {
                selector: "#present".to_string(),
            },
            false,
        );
        assert!(should_run(&present, &driver, &context()).await);

        let absent_driver = MockDriver::new().with_missing_element("#gone");
        let absent = guard(
            GuardCheck::ElementExists {
                selector: "#gone".to_string(),
            },
            false,
        );
        assert!(!should_run(&absent, &absent_driver, &context()).await);
    }

    #[tokio::test]
    async fn custom_expression_failure_yields_false() {
        // The mock evaluates unknown scripts to null, which is not true.
        let driver = MockDriver::new();
        let custom = guard(
            GuardCheck::Custom {
                expr: "url.includes('nowhere')".to_string(),
            },
            false,
        );
        assert!(!should_run(&custom, &driver, &context()).await);
    }
}
