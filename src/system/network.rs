//! Network configuration as RHEL `ifcfg-<device>` files

use super::{in_target, write_file};
use provisioner::{CapabilityResult, NetworkConfig, NetworkMode, NetworkSettings};
use std::path::{Path, PathBuf};

const SCRIPTS_DIR: &str = "/etc/sysconfig/network-scripts";

pub struct Ifcfg {
    root: PathBuf,
}

impl Ifcfg {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl NetworkConfig for Ifcfg {
    fn apply(&self, device: &str, settings: &NetworkSettings) -> CapabilityResult {
        let path = in_target(&self.root, &format!("{SCRIPTS_DIR}/ifcfg-{device}"));
        write_file(&path, &ifcfg(device, settings))?;
        Ok(())
    }

    fn set_hostname(&self, hostname: &str) -> CapabilityResult {
        write_file(&in_target(&self.root, "/etc/hostname"), &format!("{hostname}\n"))?;
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Contents of an interface file
///
/// A device given as a MAC address is matched by `HWADDR`, anything else by
/// `DEVICE`.
fn ifcfg(device: &str, settings: &NetworkSettings) -> String {
    let mut lines = vec![
        "TYPE=\"Ethernet\"".to_string(),
        "NM_CONTROLLED=\"no\"".to_string(),
    ];
    if device.matches(':').count() == 5 {
        lines.push(format!("HWADDR=\"{}\"", device.to_uppercase()));
    } else {
        lines.push(format!("DEVICE=\"{device}\""));
    }
    lines.push(format!("ONBOOT=\"{}\"", yes_no(settings.onboot)));

    match &settings.mode {
        NetworkMode::Dhcp => {
            lines.push("BOOTPROTO=\"dhcp\"".to_string());
            lines.push("PEERDNS=\"yes\"".to_string());
            lines.push("PERSISTENT_DHCLIENT=\"1\"".to_string());
            if let Some(hostname) = &settings.hostname {
                lines.push(format!("DHCP_HOSTNAME=\"{hostname}\""));
            }
        }
        NetworkMode::Static {
            ip,
            netmask,
            gateway,
        } => {
            lines.push("BOOTPROTO=\"none\"".to_string());
            lines.push(format!("IPADDR=\"{ip}\""));
            lines.push(format!("NETMASK=\"{netmask}\""));
            if let Some(gateway) = gateway {
                lines.push(format!("GATEWAY=\"{gateway}\""));
            }
        }
        NetworkMode::Manual => lines.push("BOOTPROTO=\"none\"".to_string()),
    }

    for (i, server) in settings.nameservers.iter().enumerate() {
        lines.push(format!("DNS{}=\"{server}\"", i + 1));
    }
    if let Some(mtu) = settings.mtu {
        lines.push(format!("MTU=\"{mtu}\""));
    }
    lines.push(format!("IPV6INIT=\"{}\"", yes_no(settings.ipv6)));
    lines.push(format!("DEFROUTE=\"{}\"", yes_no(settings.default_route)));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
