//! Post-click settlement: a floor wait followed by three independent,
//! time-bounded quiescence checks composed in sequence. Exceeding any cap is
//! a soft event; settlement never fails the action.

use serde::{Deserialize, Serialize};
use tracing::debug;

use retrace_core::driver::PageDriver;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementConfig {
    /// Minimum blocking time after the click.
    pub floor_ms: u64,
    pub animation_cap_ms: u64,
    pub network_idle_ms: u64,
    pub network_cap_ms: u64,
    pub dom_quiet_ms: u64,
    pub dom_cap_ms: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            floor_ms: 2_000,
            animation_cap_ms: 3_000,
            network_idle_ms: 500,
            network_cap_ms: 5_000,
            dom_quiet_ms: 300,
            dom_cap_ms: 3_000,
        }
    }
}

/// Block for at least the floor, then wait for animations, network idle, and
/// DOM quiescence in turn. Each sub-wait caps itself and degrades gracefully.
pub async fn settle_after_click(driver: &dyn PageDriver, config: &SettlementConfig) {
    if let Err(error) = driver.wait_millis(config.floor_ms).await {
        debug!("settlement floor wait failed: {}", error);
        return;
    }

    match driver.wait_animations_idle(config.animation_cap_ms).await {
        Ok(false) => debug!("animations still running after settlement cap"),
        Err(error) => debug!("animation settlement probe failed: {}", error),
        Ok(true) => {}
    }

    match driver
        .wait_network_idle(config.network_idle_ms, config.network_cap_ms)
        .await
    {
        Ok(false) => debug!("network still active after settlement cap"),
        Err(error) => debug!("network settlement probe failed: {}", error),
        Ok(true) => {}
    }

    match driver
        .wait_dom_quiet(config.dom_quiet_ms, config.dom_cap_ms)
        .await
    {
        Ok(false) => debug!("DOM still mutating after settlement cap"),
        Err(error) => debug!("DOM settlement probe failed: {}", error),
        Ok(true) => {}
    }
}
