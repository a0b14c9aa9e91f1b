//! Command and file backed subsystems
//!
//! Everything here acts on the system mounted at the target root. Tools that
//! must see the installed system's configuration (grub, useradd, the
//! firewall) run inside it through `chroot`.

pub mod auth;
pub mod bootloader;
pub mod disk;
pub mod firewall;
pub mod mounts;
pub mod network;
pub mod packages;
pub mod patch;
pub mod repo;
pub mod services;
pub mod settings;
pub mod shell;

use crate::config::Config;
use anyhow::{Context, Result};
use provisioner::Subsystems;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Repositories kept in the installed system
pub const REPO_DIR: &str = "/etc/yum.repos.d";

/// Repositories used only while installing
pub const INSTALL_REPO_DIR: &str = "/var/lib/kickstand/repos.d";

/// Wire every capability to its system implementation
pub fn subsystems(config: &Config, target_root: &Path) -> Subsystems {
    let commands = &config.commands;
    Subsystems {
        disk: Box::new(disk::Parted::new(commands, target_root)),
        packages: Box::new(packages::Dnf::new(&commands.package_manager, target_root)),
        network: Box::new(network::Ifcfg::new(target_root)),
        bootloader: Box::new(bootloader::Grub::new(commands, target_root)),
        services: Box::new(services::Systemctl::new(&commands.systemctl, target_root)),
        firewall: Box::new(firewall::FirewallCmd::new(commands, target_root)),
        repos: Box::new(repo::RepoFiles::new(target_root)),
        auth: Box::new(auth::Accounts::new(commands, target_root)),
        settings: Box::new(settings::SettingFiles::new(target_root)),
        shell: Box::new(shell::ChrootShell::new(&commands.chroot)),
    }
}

/// Host path of an absolute path inside the target
pub fn in_target(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// `sda` and `/dev/sda` both name the same device
pub fn device_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/dev/{name}")
    }
}

/// Contents of a file, or empty when it does not exist yet
///
/// Any other read failure is an error, so callers never rewrite a file
/// they could not read.
pub fn read_optional(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write a file, creating parent directories
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_target() {
        let root = Path::new("/mnt/sysimage");
        assert_eq!(
            in_target(root, "/etc/hostname"),
            PathBuf::from("/mnt/sysimage/etc/hostname")
        );
        assert_eq!(
            in_target(root, "etc/hostname"),
            PathBuf::from("/mnt/sysimage/etc/hostname")
        );
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path("sda"), "/dev/sda");
        assert_eq!(device_path("/dev/disk/by-id/x"), "/dev/disk/by-id/x");
    }

    #[test]
    fn test_read_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        assert_eq!(read_optional(&path).unwrap(), "");

        fs::write(&path, "/dev/sda1 / xfs defaults 0 1\n").unwrap();
        assert_eq!(read_optional(&path).unwrap(), "/dev/sda1 / xfs defaults 0 1\n");

        fs::write(&path, b"\xff\xfe").unwrap();
        let err = read_optional(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/sysconfig/network");
        write_file(&path, "NETWORKING=yes\n").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "NETWORKING=yes\n");
    }
}
