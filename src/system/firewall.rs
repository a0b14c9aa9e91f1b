//! Firewall rules through `firewall-offline-cmd` inside the target

use crate::config::Commands;
use crate::runner;
use provisioner::{CapabilityResult, FirewallConfig, FirewallSpec};
use std::path::{Path, PathBuf};

pub struct FirewallCmd {
    chroot: String,
    program: String,
    root: PathBuf,
}

impl FirewallCmd {
    pub fn new(commands: &Commands, root: &Path) -> Self {
        Self {
            chroot: commands.chroot.clone(),
            program: commands.firewall.clone(),
            root: root.to_path_buf(),
        }
    }
}

impl FirewallConfig for FirewallCmd {
    fn apply(&self, spec: &FirewallSpec) -> CapabilityResult {
        let mut args = vec![self.root.display().to_string(), self.program.clone()];
        args.extend(firewall_args(spec));
        runner::run_capture(&self.chroot, &args)?;
        Ok(())
    }
}

/// lokkit-compatible switches
fn firewall_args(spec: &FirewallSpec) -> Vec<String> {
    if !spec.enabled {
        return vec!["--disabled".to_string()];
    }
    let mut args = vec!["--enabled".to_string()];
    args.extend(spec.services.iter().map(|s| format!("--service={s}")));
    args.extend(spec.removed_services.iter().map(|s| format!("--remove-service={s}")));
    args.extend(spec.ports.iter().map(|p| format!("--port={p}")));
    args.extend(spec.trusted.iter().map(|t| format!("--trust={t}")));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_args() {
        let spec = FirewallSpec {
            enabled: true,
            services: vec!["ssh".to_string(), "https".to_string()],
            removed_services: vec!["cockpit".to_string()],
            ports: vec!["8080:tcp".to_string()],
            trusted: vec!["eth1".to_string()],
        };
        assert_eq!(
            firewall_args(&spec),
            [
                "--enabled",
                "--service=ssh",
                "--service=https",
                "--remove-service=cockpit",
                "--port=8080:tcp",
                "--trust=eth1",
            ]
        );
    }

    #[test]
    fn test_disabled_ignores_rules() {
        let spec = FirewallSpec {
            enabled: false,
            services: vec!["ssh".to_string()],
            removed_services: Vec::new(),
            ports: Vec::new(),
            trusted: Vec::new(),
        };
        assert_eq!(firewall_args(&spec), ["--disabled"]);
    }
}
