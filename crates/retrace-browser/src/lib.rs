//! Chromium host for retrace: process lifecycle, a native CDP client (no
//! Playwright runtime dependency), and the page-control, DOM-inspection,
//! host-bridge, and element-finder boundaries the core defines.

mod bridge;
mod cdp;
mod driver;
mod finder;
mod keys;
mod page;
mod process;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub use bridge::CdpBridge;
pub use cdp::{CdpConnection, CdpEvent};
pub use driver::CdpDriver;
pub use finder::TextMatchFinder;
pub use page::CdpPage;
pub use process::{ChromiumProcess, resolve_chromium_binary};

const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 120;

/// A launched Chromium with one attached page. Hands out cloneable driver,
/// inspector, bridge, and finder handles that share the page connection.
pub struct BrowserHost {
    process: ChromiumProcess,
    page: Arc<Mutex<CdpPage>>,
    profile_dir: PathBuf,
}

impl BrowserHost {
    pub async fn launch(headless: bool, profile_dir: impl Into<PathBuf>) -> Result<Self> {
        let profile_dir = profile_dir.into();
        std::fs::create_dir_all(&profile_dir)?;
        let process =
            ChromiumProcess::launch(headless, &profile_dir, DEFAULT_LAUNCH_TIMEOUT_SECS).await?;
        let page = CdpPage::attach(&process.ws_endpoint).await?;
        Ok(Self {
            process,
            page: Arc::new(Mutex::new(page)),
            profile_dir,
        })
    }

    pub fn driver(&self) -> CdpDriver {
        CdpDriver::new(self.page.clone())
    }

    pub fn bridge(&self) -> CdpBridge {
        CdpBridge::new(self.page.clone())
    }

    pub fn finder(&self) -> TextMatchFinder {
        TextMatchFinder::new(self.page.clone())
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub async fn shutdown(mut self) -> Result<()> {
        {
            let mut page = self.page.lock().await;
            if let Err(error) = page.close_browser().await {
                warn!("CDP browser close failed: {}", error);
            }
        }
        self.process.shutdown().await
    }
}
