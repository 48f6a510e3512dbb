//! Chromium process lifecycle: binary resolution, launch with a remote
//! debugging port, and bounded shutdown.

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

const LAUNCH_POLL_INTERVAL_MS: u64 = 100;
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

pub struct ChromiumProcess {
    child: Child,
    pub ws_endpoint: String,
}

impl ChromiumProcess {
    pub async fn launch(headless: bool, profile_dir: &Path, timeout_secs: u64) -> Result<Self> {
        let chromium = resolve_chromium_binary()
            .ok_or_else(|| anyhow!("Chromium executable not found. Set RETRACE_CHROMIUM_PATH"))?;
        let debug_port = allocate_free_port()?;

        let mut args = vec![
            format!("--remote-debugging-port={}", debug_port),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-popup-blocking".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "about:blank".to_string(),
        ];

        if headless {
            args.push("--headless=new".to_string());
            args.push("--hide-scrollbars".to_string());
        }

        if cfg!(target_os = "linux") {
            args.push("--no-sandbox".to_string());
        }

        let mut command = Command::new(&chromium);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|error| {
            anyhow!(
                "Failed to launch chromium executable '{}': {}",
                chromium,
                error
            )
        })?;

        let ws_endpoint = wait_for_debugger_ws_url(debug_port, timeout_secs, &mut child).await?;

        Ok(Self { child, ws_endpoint })
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        let wait_result = timeout(
            Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
            self.child.wait(),
        )
        .await;

        match wait_result {
            Ok(_) => Ok(()),
            Err(_) => {
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}

async fn wait_for_debugger_ws_url(
    port: u16,
    timeout_secs: u64,
    child: &mut Child,
) -> Result<String> {
    let endpoint = format!("http://127.0.0.1:{}/json/version", port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let started = Instant::now();
    let timeout_window = Duration::from_secs(timeout_secs.max(1));

    loop {
        if let Some(status) = child.try_wait()? {
            bail!(
                "Chromium exited before the CDP endpoint became available: {}",
                status
            );
        }

        if let Ok(response) = client.get(&endpoint).send().await
            && response.status().is_success()
        {
            let body: Value = response.json().await?;
            if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(Value::as_str) {
                return Ok(ws_url.to_string());
            }
        }

        if started.elapsed() > timeout_window {
            bail!("Timed out waiting for CDP endpoint at {}", endpoint);
        }

        sleep(Duration::from_millis(LAUNCH_POLL_INTERVAL_MS)).await;
    }
}

pub fn resolve_chromium_binary() -> Option<String> {
    let env_candidates = ["RETRACE_CHROMIUM_PATH", "CHROMIUM_PATH", "CHROME_PATH"];
    for key in env_candidates {
        if let Ok(value) = std::env::var(key)
            && !value.trim().is_empty()
        {
            let path = PathBuf::from(value.trim());
            if path.exists() {
                return Some(path.display().to_string());
            }
        }
    }

    if cfg!(target_os = "macos") {
        let app_paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in app_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
    }

    if cfg!(target_os = "windows") {
        let windows_paths = [
            r"C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            r"C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
            r"C:\\Program Files\\Chromium\\Application\\chrome.exe",
        ];
        for path in windows_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
    }

    let command_candidates = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "msedge",
    ];

    for name in command_candidates {
        if is_executable_in_path(name) {
            return Some(name.to_string());
        }
    }

    None
}

fn is_executable_in_path(name: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };

    for path in std::env::split_paths(&path_var) {
        let candidate = path.join(name);
        if candidate.exists() {
            return true;
        }
        if cfg!(target_os = "windows") {
            let exe_candidate = path.join(format!("{}.exe", name));
            if exe_candidate.exists() {
                return true;
            }
        }
    }

    false
}

pub fn allocate_free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_allocation_returns_nonzero_port() {
        let port = allocate_free_port().unwrap();
        assert!(port > 0);
    }
}
