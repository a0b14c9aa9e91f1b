//! Centralized path resolution for kickstand
//!
//! # Environment Variables
//!
//! - `KICKSTAND_CONFIG_DIR` - Override config directory
//! - `KICKSTAND_STATE_DIR` - Override state directory (audit logs live here)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `KICKSTAND_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/kickstand` (if set)
//! 3. `~/.config/kickstand`
//!
//! For state_dir():
//! 1. `KICKSTAND_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/kickstand` (if set)
//! 3. `~/.local/state/kickstand`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "KICKSTAND_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "KICKSTAND_STATE_DIR";

const APP_DIR: &str = "kickstand";

/// Get the kickstand config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the kickstand state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Default config file location
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default directory for persisted run reports
pub fn audit_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("runs"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input untouched.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/config/path"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/config/path/config.toml")
            );
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_CONFIG_DIR, "~/provisioning/kickstand-tilde-test", || {
            assert_eq!(
                config_dir().unwrap(),
                home.join("provisioning").join("kickstand-tilde-test")
            );
        });
    }

    #[test]
    fn test_xdg_state_home() {
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-test", || {
                assert_eq!(
                    state_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-state-test/kickstand")
                );
                assert_eq!(
                    audit_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-state-test/kickstand/runs")
                );
            });
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        without_env_var(ENV_STATE_DIR, || {
            without_env_var("XDG_STATE_HOME", || {
                let home = dirs::home_dir().unwrap();
                assert_eq!(
                    state_dir().unwrap(),
                    home.join(".local").join("state").join("kickstand")
                );
            });
        });
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("KICKSTAND_TEST_VAR", "test_value", || {
            assert_eq!(
                expand("/srv/$KICKSTAND_TEST_VAR/root"),
                PathBuf::from("/srv/test_value/root")
            );
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        assert_eq!(
            expand("/path/$NONEXISTENT_VAR_12345/file"),
            PathBuf::from("/path/$NONEXISTENT_VAR_12345/file")
        );
    }
}
