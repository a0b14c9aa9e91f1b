//! Locale, keyboard, SELinux, time zone and remote logging files

use super::patch::{patch_file, quoted};
use super::{in_target, read_optional, write_file};
use anyhow::Context;
use provisioner::{CapabilityError, CapabilityResult, SelinuxMode, Setting, SystemSettings};
use std::fs;
use std::path::{Path, PathBuf};

const ZONEINFO: &str = "/usr/share/zoneinfo";
const SYSLOG_FORWARD: &str = "/etc/rsyslog.d/90-kickstand-forward.conf";
const DEFAULT_SYSLOG_PORT: u16 = 514;

pub struct SettingFiles {
    root: PathBuf,
}

impl SettingFiles {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn patch(&self, path: &str, pairs: &[(&str, String)]) -> CapabilityResult {
        patch_file(&in_target(&self.root, path), pairs)?;
        Ok(())
    }

    fn selinux(&self, mode: SelinuxMode) -> CapabilityResult {
        self.patch("/etc/selinux/config", &[("SELINUX", mode.as_str().to_string())])?;
        if mode != SelinuxMode::Disabled {
            // Files created during provisioning carry no labels yet
            let marker = in_target(&self.root, "/.autorelabel");
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&marker)
                .with_context(|| format!("Failed to create {}", marker.display()))?;
        }
        Ok(())
    }

    fn timezone(&self, zone: &str, utc: bool, ntp_servers: &[String]) -> CapabilityResult {
        let zoneinfo = in_target(&self.root, ZONEINFO);
        if zoneinfo.is_dir() && !zoneinfo.join(zone).exists() {
            return Err(CapabilityError::failed(format!("unknown time zone '{zone}'")));
        }

        let localtime = in_target(&self.root, "/etc/localtime");
        if let Some(parent) = localtime.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if localtime.symlink_metadata().is_ok() {
            fs::remove_file(&localtime)
                .with_context(|| format!("Failed to replace {}", localtime.display()))?;
        }
        symlink(&format!("..{ZONEINFO}/{zone}"), &localtime)?;

        let clock = if utc { "UTC" } else { "LOCAL" };
        write_file(
            &in_target(&self.root, "/etc/adjtime"),
            &format!("0.0 0 0.0\n0\n{clock}\n"),
        )?;

        if !ntp_servers.is_empty() {
            self.add_ntp_servers(ntp_servers)?;
        }
        Ok(())
    }

    fn add_ntp_servers(&self, servers: &[String]) -> CapabilityResult {
        let path = in_target(&self.root, "/etc/chrony.conf");
        let mut text = read_optional(&path)?;
        for server in servers {
            let line = format!("server {server} iburst");
            if !text.lines().any(|l| l.trim() == line) {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&line);
                text.push('\n');
            }
        }
        write_file(&path, &text)?;
        Ok(())
    }

    fn logging(&self, host: Option<&str>, port: Option<u16>) -> CapabilityResult {
        let Some(host) = host else {
            log::debug!("logging: no --host, nothing to forward");
            return Ok(());
        };
        let port = port.unwrap_or(DEFAULT_SYSLOG_PORT);
        write_file(
            &in_target(&self.root, SYSLOG_FORWARD),
            &format!("*.* @@{host}:{port}\n"),
        )?;
        Ok(())
    }
}

impl SystemSettings for SettingFiles {
    fn apply(&self, setting: &Setting) -> CapabilityResult {
        match setting {
            Setting::Keyboard(layout) => self.patch("/etc/vconsole.conf", &[("KEYMAP", quoted(layout))]),
            Setting::Language { lang, support } => {
                if !support.is_empty() {
                    log::debug!("Extra locales requested: {}", support.join(", "));
                }
                self.patch("/etc/locale.conf", &[("LANG", quoted(lang))])
            }
            Setting::Selinux(mode) => self.selinux(*mode),
            Setting::Timezone {
                zone,
                utc,
                ntp_servers,
            } => self.timezone(zone, *utc, ntp_servers),
            Setting::Logging { host, port, .. } => self.logging(host.as_deref(), *port),
        }
    }
}

#[cfg(unix)]
fn symlink(target: &str, link: &Path) -> CapabilityResult {
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("Failed to link {} -> {target}", link.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(_target: &str, _link: &Path) -> CapabilityResult {
    Err(CapabilityError::failed("time zone links need a unix host"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(root: &Path, path: &str) -> String {
        fs::read_to_string(in_target(root, path)).unwrap()
    }

    #[test]
    fn test_language_and_keyboard() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingFiles::new(dir.path());
        settings
            .apply(&Setting::Language {
                lang: "en_US.UTF-8".to_string(),
                support: Vec::new(),
            })
            .unwrap();
        settings.apply(&Setting::Keyboard("us".to_string())).unwrap();
        assert_eq!(read(dir.path(), "/etc/locale.conf"), "LANG=\"en_US.UTF-8\"\n");
        assert_eq!(read(dir.path(), "/etc/vconsole.conf"), "KEYMAP=\"us\"\n");
    }

    #[test]
    fn test_selinux_enforcing_requests_relabel() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("etc/selinux/config");
        fs::create_dir_all(config.parent().unwrap()).unwrap();
        fs::write(&config, "SELINUX=disabled\nSELINUXTYPE=targeted\n").unwrap();

        SettingFiles::new(dir.path())
            .apply(&Setting::Selinux(SelinuxMode::Enforcing))
            .unwrap();
        assert_eq!(
            fs::read_to_string(&config).unwrap(),
            "SELINUX=enforcing\nSELINUXTYPE=targeted\n"
        );
        assert!(dir.path().join(".autorelabel").exists());
    }

    #[test]
    fn test_selinux_disabled_skips_relabel() {
        let dir = tempfile::tempdir().unwrap();
        SettingFiles::new(dir.path())
            .apply(&Setting::Selinux(SelinuxMode::Disabled))
            .unwrap();
        assert!(!dir.path().join(".autorelabel").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_timezone_links_and_ntp() {
        let dir = tempfile::tempdir().unwrap();
        let zone = dir.path().join("usr/share/zoneinfo/Europe/Lisbon");
        fs::create_dir_all(zone.parent().unwrap()).unwrap();
        fs::write(&zone, "TZif").unwrap();

        let settings = SettingFiles::new(dir.path());
        let setting = Setting::Timezone {
            zone: "Europe/Lisbon".to_string(),
            utc: true,
            ntp_servers: vec!["0.pool.ntp.org".to_string()],
        };
        settings.apply(&setting).unwrap();
        settings.apply(&setting).unwrap();

        let link = fs::read_link(dir.path().join("etc/localtime")).unwrap();
        assert_eq!(link, PathBuf::from("../usr/share/zoneinfo/Europe/Lisbon"));
        assert_eq!(read(dir.path(), "/etc/adjtime"), "0.0 0 0.0\n0\nUTC\n");
        assert_eq!(
            read(dir.path(), "/etc/chrony.conf"),
            "server 0.pool.ntp.org iburst\n"
        );
    }

    #[test]
    fn test_unreadable_chrony_conf_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("etc/chrony.conf");
        fs::create_dir_all(conf.parent().unwrap()).unwrap();
        let mut original = b"pool 2.rhel.pool.ntp.org iburst\n# caf\xe9\ndriftfile /var/lib/chrony/drift\n".to_vec();
        original.extend_from_slice(b"makestep 1.0 3\n");
        fs::write(&conf, &original).unwrap();

        let err = SettingFiles::new(dir.path())
            .add_ntp_servers(&["10.0.0.1".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("chrony.conf"));
        assert_eq!(fs::read(&conf).unwrap(), original);
    }

    #[test]
    fn test_ntp_servers_keep_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("etc/chrony.conf");
        fs::create_dir_all(conf.parent().unwrap()).unwrap();
        fs::write(&conf, "driftfile /var/lib/chrony/drift").unwrap();

        SettingFiles::new(dir.path())
            .add_ntp_servers(&["10.0.0.1".to_string()])
            .unwrap();
        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "driftfile /var/lib/chrony/drift\nserver 10.0.0.1 iburst\n"
        );
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("usr/share/zoneinfo")).unwrap();
        let err = SettingFiles::new(dir.path())
            .apply(&Setting::Timezone {
                zone: "Mars/Olympus".to_string(),
                utc: false,
                ntp_servers: Vec::new(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_logging_forward() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingFiles::new(dir.path());
        settings
            .apply(&Setting::Logging {
                host: Some("loghost".to_string()),
                port: None,
                level: None,
            })
            .unwrap();
        assert_eq!(read(dir.path(), SYSLOG_FORWARD), "*.* @@loghost:514\n");
    }
}
