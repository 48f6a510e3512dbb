//! `HostBridge` over CDP: script injection into every new document, named
//! host bindings, and main-frame lifecycle events.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use retrace_core::driver::{BridgeEvent, HostBridge};
use retrace_core::error::{Result, RetraceError};

use crate::page::{CdpPage, extract_script_result};

const EVENT_PUMP_WINDOW_MS: u64 = 100;

#[derive(Clone)]
pub struct CdpBridge {
    page: Arc<Mutex<CdpPage>>,
}

impl CdpBridge {
    pub fn new(page: Arc<Mutex<CdpPage>>) -> Self {
        Self { page }
    }
}

#[async_trait]
impl HostBridge for CdpBridge {
    async fn inject(&self, script: &str) -> Result<()> {
        let mut page = self.page.lock().await;
        page.install_script(script)
            .await
            .map_err(|error| RetraceError::driver(error.to_string()))
    }

    async fn expose_binding(&self, name: &str) -> Result<()> {
        let mut page = self.page.lock().await;
        page.add_binding(name)
            .await
            .map_err(|error| RetraceError::driver(error.to_string()))
    }

    async fn eval_in_page(&self, expression: &str) -> Result<Value> {
        let mut page = self.page.lock().await;
        let value = page
            .evaluate_page_script(expression)
            .await
            .map_err(|error| RetraceError::driver(error.to_string()))?;
        extract_script_result(value).map_err(|error| RetraceError::driver(error.to_string()))
    }

    async fn next_event(&self) -> Result<Option<BridgeEvent>> {
        loop {
            let mut page = self.page.lock().await;
            if let Some(event) = page.pop_bridge_event() {
                return Ok(Some(event));
            }
            // The lock is released between pump windows so driver calls can
            // interleave with event consumption.
            match page
                .pump_events(Duration::from_millis(EVENT_PUMP_WINDOW_MS))
                .await
            {
                Ok(()) => {}
                Err(error) => {
                    debug!("bridge event pump ended: {}", error);
                    return Ok(None);
                }
            }
            if let Some(event) = page.pop_bridge_event() {
                return Ok(Some(event));
            }
            drop(page);
            tokio::task::yield_now().await;
        }
    }
}
