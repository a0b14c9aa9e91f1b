//! kickstand configuration file (`config.toml`)
//!
//! Every key is optional. Command line flags win over the file, the file wins
//! over the defaults below.

use crate::paths;
use anyhow::{Context, Result, bail};
use provisioner::{DEFAULT_TARGET_ROOT, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the installed system is mounted
    pub target_root: String,

    /// Parallelism for the base tier
    pub jobs: usize,

    pub retry: RetryConfig,

    pub commands: Commands,

    /// Directory for persisted run reports; defaults to `<state_dir>/runs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_root: DEFAULT_TARGET_ROOT.to_string(),
            jobs: 1,
            retry: RetryConfig::default(),
            commands: Commands::default(),
            audit_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay_secs: policy.delay.as_secs(),
        }
    }
}

/// Executables the system subsystems shell out to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub package_manager: String,
    pub parted: String,
    pub wipefs: String,
    /// Prefix for filesystem builders, `mkfs` gives `mkfs.xfs`
    pub mkfs: String,
    pub mount: String,
    pub umount: String,
    pub systemctl: String,
    pub firewall: String,
    pub grub_install: String,
    pub grub_mkconfig: String,
    pub authconfig: String,
    pub chroot: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            package_manager: "dnf".to_string(),
            parted: "parted".to_string(),
            wipefs: "wipefs".to_string(),
            mkfs: "mkfs".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            systemctl: "systemctl".to_string(),
            firewall: "firewall-offline-cmd".to_string(),
            grub_install: "grub2-install".to_string(),
            grub_mkconfig: "grub2-mkconfig".to_string(),
            authconfig: "authconfig".to_string(),
            chroot: "chroot".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default = paths::config_file()?;
                if !default.exists() {
                    log::debug!("No config at {}, using defaults", default.display());
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file: {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", config_path.display()))?;
        config.validate()?;
        log::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.target_root.trim().is_empty() {
            bail!("target_root must not be empty");
        }
        Ok(())
    }

    pub fn target_root(&self) -> PathBuf {
        paths::expand(&self.target_root)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.delay_secs),
        )
    }

    pub fn audit_dir(&self) -> Result<PathBuf> {
        match &self.audit_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::audit_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_root(), PathBuf::from("/mnt/sysimage"));
        assert_eq!(config.jobs, 1);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.commands.package_manager, "dnf");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
target_root = "/srv/image"

[retry]
delay_secs = 1

[commands]
package_manager = "yum"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.target_root(), PathBuf::from("/srv/image"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry_policy().delay, Duration::from_secs(1));
        assert_eq!(config.commands.package_manager, "yum");
        assert_eq!(config.commands.parted, "parted");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());

        fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());

        fs::write(&path, "jobs = \"many\"\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config {
            jobs: 4,
            audit_dir: Some("/var/log/kickstand".to_string()),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.audit_dir().unwrap(),
            PathBuf::from("/var/log/kickstand")
        );
    }
}
