//! GRUB 2 defaults, installation and config generation
//!
//! Hosts booted through UEFI get an EFI install into `/boot/efi`; others get
//! a BIOS install onto the boot disk.

use super::{device_path, in_target};
use super::patch::{patch_file, quoted};
use crate::config::Commands;
use crate::runner;
use provisioner::{BootLocation, BootloaderSpec, BootloaderWriter, CapabilityResult};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

const GRUB_DEFAULTS: &str = "/etc/default/grub";
const GRUB_CONFIG: &str = "/boot/grub2/grub.cfg";
const EFI_FIRMWARE: &str = "/sys/firmware/efi";
const EFI_DIR: &str = "/boot/efi";

pub struct Grub {
    chroot: String,
    grub_install: String,
    grub_mkconfig: String,
    root: PathBuf,
    efi: bool,
}

impl Grub {
    pub fn new(commands: &Commands, root: &Path) -> Self {
        Self {
            chroot: commands.chroot.clone(),
            grub_install: commands.grub_install.clone(),
            grub_mkconfig: commands.grub_mkconfig.clone(),
            root: root.to_path_buf(),
            efi: Path::new(EFI_FIRMWARE).exists(),
        }
    }

    fn in_chroot(&self, program: &str, args: &[&str]) -> CapabilityResult<String> {
        let mut full = vec![self.root.display().to_string(), program.to_string()];
        full.extend(args.iter().map(ToString::to_string));
        runner::run_capture(&self.chroot, &full)
    }

    /// Device backing the target root, and the disk holding it
    fn root_devices(&self) -> CapabilityResult<(String, String)> {
        let root = self.root.display().to_string();
        let partition = runner::run_capture("findmnt", &["-no".into(), "SOURCE".into(), root])?;
        let disk = runner::run_capture(
            "lsblk",
            &["-no".into(), "PKNAME".into(), partition.clone()],
        )?;
        Ok((partition, format!("/dev/{}", disk.trim())))
    }
}

impl BootloaderWriter for Grub {
    fn write(&self, spec: &BootloaderSpec) -> CapabilityResult {
        let defaults = in_target(&self.root, GRUB_DEFAULTS);
        if patch_file(&defaults, &default_settings(spec))? {
            log::info!("Updated {}", defaults.display());
        }

        if spec.location == BootLocation::None {
            log::info!("bootloader --location=none: skipping grub install");
        } else if self.efi {
            let efi_dir = in_target(&self.root, EFI_DIR);
            fs::create_dir_all(&efi_dir)
                .with_context(|| format!("Failed to create {}", efi_dir.display()))?;
            self.in_chroot(&self.grub_install, &efi_install_args())?;
        } else {
            let device = match spec.location {
                BootLocation::Partition => self.root_devices()?.0,
                _ => match &spec.boot_drive {
                    Some(drive) => device_path(drive),
                    None => self.root_devices()?.1,
                },
            };
            let mut args = vec!["--recheck"];
            if spec.location == BootLocation::Partition {
                args.push("--force");
            }
            args.push(device.as_str());
            self.in_chroot(&self.grub_install, &args)?;
        }

        self.in_chroot(&self.grub_mkconfig, &["-o", GRUB_CONFIG])?;
        Ok(())
    }
}

/// `grub2-install` arguments for an EFI system partition at `/boot/efi`
fn efi_install_args() -> [&'static str; 4] {
    ["--target=x86_64-efi", "--efi-directory", EFI_DIR, "--recheck"]
}

/// Assignments for `/etc/default/grub`
///
/// The kernel command line is only replaced when `--append` was given.
fn default_settings(spec: &BootloaderSpec) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("GRUB_TIMEOUT", spec.timeout.unwrap_or(0).to_string()),
        ("GRUB_TERMINAL_OUTPUT", quoted("console")),
        ("GRUB_DISABLE_OS_PROBER", "true".to_string()),
    ];
    if !spec.append.is_empty() {
        pairs.push(("GRUB_CMDLINE_LINUX", quoted(&spec.append.join(" "))));
    }
    pairs
}
