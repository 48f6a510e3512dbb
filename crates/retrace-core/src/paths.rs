use anyhow::Result;
use std::path::PathBuf;

const RETRACE_DIR: &str = ".retrace";
const SCENARIOS_DIR: &str = "scenarios";
const SECRETS_DIR: &str = "secrets";
const RECORDINGS_DIR: &str = "recordings";
const ARTIFACTS_DIR: &str = "artifacts";

/// Environment variable to override the retrace data directory.
const RETRACE_DIR_ENV: &str = "RETRACE_DIR";

/// Resolve the retrace data directory.
/// Priority: RETRACE_DIR env var > ~/.retrace/
pub fn resolve_retrace_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(RETRACE_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(RETRACE_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// Ensure the retrace data directory exists and return its path.
pub fn ensure_retrace_dir() -> Result<PathBuf> {
    let dir = resolve_retrace_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Scenario documents directory: ~/.retrace/scenarios/
pub fn scenarios_dir() -> Result<PathBuf> {
    Ok(resolve_retrace_dir()?.join(SCENARIOS_DIR))
}

/// Secret values directory: ~/.retrace/secrets/
pub fn secrets_dir() -> Result<PathBuf> {
    Ok(resolve_retrace_dir()?.join(SECRETS_DIR))
}

/// In-progress recording snapshots: ~/.retrace/recordings/
pub fn recordings_dir() -> Result<PathBuf> {
    let dir = resolve_retrace_dir()?.join(RECORDINGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Replay artifacts (failure screenshots): ~/.retrace/artifacts/
pub fn artifacts_dir() -> Result<PathBuf> {
    let dir = resolve_retrace_dir()?.join(ARTIFACTS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn test_default_retrace_dir() {
        let _lock = env_lock();
        unsafe { std::env::remove_var(RETRACE_DIR_ENV) };
        let dir = resolve_retrace_dir().unwrap();
        assert!(dir.ends_with(RETRACE_DIR));
    }

    #[test]
    fn test_env_override() {
        let _lock = env_lock();
        unsafe { std::env::set_var(RETRACE_DIR_ENV, "/tmp/test-retrace") };
        let dir = resolve_retrace_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/test-retrace"));
        unsafe { std::env::remove_var(RETRACE_DIR_ENV) };
    }

    #[test]
    fn test_scenarios_dir_nests_under_root() {
        let _lock = env_lock();
        unsafe { std::env::set_var(RETRACE_DIR_ENV, "/tmp/test-retrace") };
        let dir = scenarios_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/test-retrace/scenarios"));
        unsafe { std::env::remove_var(RETRACE_DIR_ENV) };
    }
}
