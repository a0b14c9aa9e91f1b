//! Capability invokers - turn planned steps into subsystem calls
//!
//! Each invoker reads a directive's options into a typed request and hands
//! it to one subsystem. Invokers never retry; a transient subsystem failure
//! comes back as [`InvokeError::Recoverable`] and the executor decides.

use crate::capability::{
    AuthRequest, BootLocation, BootloaderSpec, CapabilityError, ClearScope, ClearSpec,
    FirewallSpec, NetworkMode, NetworkSettings, PartitionSpec, RepoSpec, SelinuxMode, Setting,
    Subsystems,
};
use crate::error::InvokeError;
use crate::planner::Step;
use crate::registry::Capability;
use kickstart::{Directive, PackageList};
use std::str::FromStr;

/// Network device used when `network` names none
pub const DEFAULT_DEVICE: &str = "eth0";

type InvokeResult = Result<String, InvokeError>;

impl From<CapabilityError> for InvokeError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::Transient(reason) => InvokeError::recoverable(reason),
            CapabilityError::Failed(e) => InvokeError::fatal(format!("{e:#}")),
        }
    }
}

/// Executes one family of steps
pub trait Invoker: Send + Sync {
    fn capability(&self) -> Capability;

    /// Perform the step, returning a short account of what was done
    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult;
}

/// Invoker for a capability
///
/// The post-install script is not an invoker; it goes through
/// [`ScriptRunner`](crate::script::ScriptRunner).
pub fn invoker_for(capability: Capability) -> Option<&'static dyn Invoker> {
    match capability {
        Capability::Firewall => Some(&FirewallInvoker),
        Capability::Repo => Some(&RepoInvoker),
        Capability::Auth => Some(&AuthInvoker),
        Capability::Network => Some(&NetworkInvoker),
        Capability::Bootloader => Some(&BootloaderInvoker),
        Capability::DiskPartition => Some(&DiskInvoker),
        Capability::ServiceSet => Some(&ServiceInvoker),
        Capability::PackageInstall => Some(&PackageInvoker),
        Capability::SystemSetting => Some(&SettingInvoker),
        Capability::Installer => Some(&InstallerInvoker),
        Capability::Shell => None,
    }
}

fn directive(step: &Step, capability: Capability) -> Result<&Directive, InvokeError> {
    match step {
        Step::Directive(d) => Ok(d),
        other => Err(InvokeError::fatal(format!(
            "{} cannot be handled by the {capability} invoker",
            other.id()
        ))),
    }
}

/// Parse a numeric option, treating a malformed value as fatal
fn number<T: FromStr>(directive: &Directive, key: &str) -> Result<Option<T>, InvokeError> {
    directive
        .option(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                InvokeError::fatal(format!(
                    "line {}: malformed --{key} '{raw}' for '{}'",
                    directive.line, directive.name
                ))
            })
        })
        .transpose()
}

fn boolean(directive: &Directive, key: &str, default: bool) -> Result<bool, InvokeError> {
    match directive.option(key).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("yes" | "on" | "true" | "1") => Ok(true),
        Some("no" | "off" | "false" | "0") => Ok(false),
        Some(other) => Err(InvokeError::fatal(format!(
            "line {}: --{key} expects yes or no, got '{other}'",
            directive.line
        ))),
    }
}

// ============================================================================
// Invokers
// ============================================================================

pub struct FirewallInvoker;

impl Invoker for FirewallInvoker {
    fn capability(&self) -> Capability {
        Capability::Firewall
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let mut services = d.list("service");
        if d.has("ssh") && !services.iter().any(|s| s == "ssh") {
            services.push("ssh".to_string());
        }
        let spec = FirewallSpec {
            enabled: !(d.has("disabled") || d.has("disable")),
            services,
            removed_services: d.list("remove-service"),
            ports: d.list("port"),
            trusted: d.list("trust"),
        };
        subsystems.firewall.apply(&spec)?;
        Ok(if spec.enabled {
            "firewall enabled".to_string()
        } else {
            "firewall disabled".to_string()
        })
    }
}

pub struct RepoInvoker;

impl Invoker for RepoInvoker {
    fn capability(&self) -> Capability {
        Capability::Repo
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let spec = if d.name == "url" {
            RepoSpec {
                name: "install-source".to_string(),
                baseurl: d.option("url").map(String::from),
                mirrorlist: d.option("mirrorlist").map(String::from),
                cost: None,
                include: Vec::new(),
                exclude: Vec::new(),
                proxy: d.option("proxy").map(String::from),
                verify_ssl: !d.has("noverifyssl"),
                persist: false,
            }
        } else {
            RepoSpec {
                // Schema guarantees --name
                name: d.option("name").unwrap_or_default().to_string(),
                baseurl: d.option("baseurl").map(String::from),
                mirrorlist: d.option("mirrorlist").map(String::from),
                cost: number(d, "cost")?,
                include: d.list("includepkgs"),
                exclude: d.list("excludepkgs"),
                proxy: d.option("proxy").map(String::from),
                verify_ssl: !d.has("noverifyssl"),
                persist: d.has("install"),
            }
        };
        if spec.baseurl.is_none() && spec.mirrorlist.is_none() {
            return Err(InvokeError::fatal(format!(
                "line {}: '{}' needs a base URL or mirror list",
                d.line, d.name
            )));
        }
        subsystems.repos.add(&spec)?;
        Ok(format!("repository '{}' configured", spec.name))
    }
}

pub struct AuthInvoker;

impl Invoker for AuthInvoker {
    fn capability(&self) -> Capability {
        Capability::Auth
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let (request, summary) = match d.name.as_str() {
            "rootpw" => {
                let password = d.positional.first().cloned();
                if password.is_none() && !d.has("lock") {
                    return Err(InvokeError::fatal(format!(
                        "line {}: rootpw needs a password unless --lock is given",
                        d.line
                    )));
                }
                let request = AuthRequest::RootPassword {
                    password,
                    crypted: d.has("iscrypted"),
                    lock: d.has("lock"),
                };
                (request, "root password set".to_string())
            }
            "user" => {
                let name = d.option("name").unwrap_or_default().to_string();
                let summary = format!("user '{name}' configured");
                let request = AuthRequest::User {
                    name,
                    password: d.option("password").map(String::from),
                    crypted: d.has("iscrypted"),
                    lock: d.has("lock"),
                    groups: d.list("groups"),
                    homedir: d.option("homedir").map(String::from),
                    shell: d.option("shell").map(String::from),
                    uid: number(d, "uid")?,
                    gecos: d.option("gecos").map(String::from),
                };
                (request, summary)
            }
            _ => (
                AuthRequest::Policy {
                    options: d.arguments.clone(),
                },
                "authentication policy applied".to_string(),
            ),
        };
        subsystems.auth.apply(&request)?;
        Ok(summary)
    }
}

pub struct NetworkInvoker;

impl Invoker for NetworkInvoker {
    fn capability(&self) -> Capability {
        Capability::Network
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let device = d.option("device").unwrap_or(DEFAULT_DEVICE);

        let mode = match d.option("bootproto").unwrap_or("dhcp") {
            "dhcp" | "bootp" => NetworkMode::Dhcp,
            "static" => match (d.option("ip"), d.option("netmask")) {
                (Some(ip), Some(netmask)) => NetworkMode::Static {
                    ip: ip.to_string(),
                    netmask: netmask.to_string(),
                    gateway: d.option("gateway").map(String::from),
                },
                _ => {
                    return Err(InvokeError::fatal(format!(
                        "line {}: static network needs --ip and --netmask",
                        d.line
                    )));
                }
            },
            "none" => NetworkMode::Manual,
            other => {
                return Err(InvokeError::fatal(format!(
                    "line {}: unknown --bootproto '{other}'",
                    d.line
                )));
            }
        };

        let settings = NetworkSettings {
            mode,
            onboot: boolean(d, "onboot", true)?,
            hostname: d.option("hostname").map(String::from),
            nameservers: d.list("nameserver"),
            mtu: number(d, "mtu")?,
            ipv6: !d.has("noipv6") && boolean(d, "ipv6", true)?,
            default_route: !d.has("nodefroute"),
        };

        subsystems.network.apply(device, &settings)?;
        if let Some(hostname) = &settings.hostname {
            subsystems.network.set_hostname(hostname)?;
        }
        Ok(format!("{device} configured"))
    }
}

pub struct BootloaderInvoker;

impl Invoker for BootloaderInvoker {
    fn capability(&self) -> Capability {
        Capability::Bootloader
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let location = match d.option("location").unwrap_or("mbr") {
            "mbr" => BootLocation::Mbr,
            "partition" => BootLocation::Partition,
            "none" => BootLocation::None,
            other => {
                return Err(InvokeError::fatal(format!(
                    "line {}: unknown --location '{other}'",
                    d.line
                )));
            }
        };
        let spec = BootloaderSpec {
            location,
            append: d
                .option("append")
                .map(|a| a.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            timeout: number(d, "timeout")?,
            boot_drive: d
                .option("boot-drive")
                .map(String::from)
                .or_else(|| d.list("driveorder").into_iter().next()),
        };
        subsystems.bootloader.write(&spec)?;
        Ok("bootloader written".to_string())
    }
}

pub struct DiskInvoker;

impl DiskInvoker {
    fn partition_spec(d: &Directive) -> Result<PartitionSpec, InvokeError> {
        let malformed_size = |raw: &str| {
            InvokeError::fatal(format!(
                "line {}: malformed partition size '{raw}'",
                d.line
            ))
        };
        let size_mib = match d.option("size") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) | Err(_) => return Err(malformed_size(raw)),
                Ok(n) => Some(n),
            },
            None => None,
        };
        if size_mib.is_none() && !d.has("grow") && !d.has("noformat") {
            return Err(InvokeError::fatal(format!(
                "line {}: partition needs --size or --grow",
                d.line
            )));
        }
        let max_size_mib = match d.option("maxsize") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| malformed_size(raw))?),
            None => None,
        };

        Ok(PartitionSpec {
            // Schema guarantees exactly one positional
            mount_point: d.positional.first().cloned().unwrap_or_default(),
            size_mib,
            max_size_mib,
            grow: d.has("grow"),
            fstype: d.option("fstype").map(String::from),
            disk: d.option("ondisk").or_else(|| d.option("ondrive")).map(String::from),
            label: d.option("label").map(String::from),
            fs_options: d.option("fsoptions").map(String::from),
            primary: d.has("asprimary"),
            format: !d.has("noformat"),
        })
    }
}

impl Invoker for DiskInvoker {
    fn capability(&self) -> Capability {
        Capability::DiskPartition
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        match d.name.as_str() {
            "zerombr" => {
                subsystems.disk.zero_mbr()?;
                Ok("invalid partition tables cleared".to_string())
            }
            "clearpart" => {
                let scope = if d.has("all") {
                    ClearScope::All
                } else if d.has("linux") {
                    ClearScope::Linux
                } else {
                    ClearScope::None
                };
                let spec = ClearSpec {
                    scope,
                    drives: d.list("drives"),
                    init_label: d.has("initlabel"),
                    disk_label: d.option("disklabel").map(String::from),
                };
                subsystems.disk.clear(&spec)?;
                Ok(format!("partitions cleared ({scope:?})").to_lowercase())
            }
            _ => {
                let spec = Self::partition_spec(d)?;
                subsystems.disk.partition(&spec)?;
                Ok(format!("partition {} created", spec.mount_point))
            }
        }
    }
}

pub struct ServiceInvoker;

impl Invoker for ServiceInvoker {
    fn capability(&self) -> Capability {
        Capability::ServiceSet
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let enabled = d.list("enabled");
        let disabled = d.list("disabled");
        if !enabled.is_empty() {
            subsystems.services.set_enabled(&enabled)?;
        }
        if !disabled.is_empty() {
            subsystems.services.set_disabled(&disabled)?;
        }
        Ok(format!(
            "{} enabled, {} disabled",
            enabled.len(),
            disabled.len()
        ))
    }
}

pub struct PackageInvoker;

impl PackageInvoker {
    fn install(list: &PackageList, subsystems: &Subsystems) -> InvokeResult {
        let exclude: Vec<String> = list.exclude.iter().cloned().collect();
        let install: Vec<String> = list.install.iter().cloned().collect();
        if !exclude.is_empty() {
            subsystems.packages.exclude(&exclude)?;
        }
        if install.is_empty() {
            return Ok("nothing to install".to_string());
        }
        Ok(subsystems.packages.install(&install)?)
    }
}

impl Invoker for PackageInvoker {
    fn capability(&self) -> Capability {
        Capability::PackageInstall
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        match step {
            Step::Packages(list) => Self::install(list, subsystems),
            other => Err(InvokeError::fatal(format!(
                "{} is not a package block",
                other.id()
            ))),
        }
    }
}

pub struct SettingInvoker;

impl SettingInvoker {
    fn setting(d: &Directive) -> Result<Setting, InvokeError> {
        let missing = |what: &str| {
            InvokeError::fatal(format!("line {}: '{}' needs {what}", d.line, d.name))
        };
        let setting = match d.name.as_str() {
            "keyboard" => Setting::Keyboard(
                d.positional
                    .first()
                    .map(String::as_str)
                    .or_else(|| d.option("vckeymap"))
                    .ok_or_else(|| missing("a layout"))?
                    .to_string(),
            ),
            "lang" => Setting::Language {
                lang: d.positional.first().cloned().ok_or_else(|| missing("a language"))?,
                support: d.list("addsupport"),
            },
            "selinux" => Setting::Selinux(if d.has("disabled") {
                SelinuxMode::Disabled
            } else if d.has("permissive") {
                SelinuxMode::Permissive
            } else {
                SelinuxMode::Enforcing
            }),
            "timezone" => Setting::Timezone {
                zone: d.positional.first().cloned().ok_or_else(|| missing("a zone"))?,
                utc: d.has("utc") || d.has("isUtc"),
                ntp_servers: if d.has("nontp") {
                    Vec::new()
                } else {
                    d.list("ntpservers")
                },
            },
            "logging" => Setting::Logging {
                host: d.option("host").map(String::from),
                port: number(d, "port")?,
                level: d.option("level").map(String::from),
            },
            other => {
                return Err(InvokeError::fatal(format!(
                    "line {}: '{other}' is not a system setting",
                    d.line
                )));
            }
        };
        Ok(setting)
    }
}

impl Invoker for SettingInvoker {
    fn capability(&self) -> Capability {
        Capability::SystemSetting
    }

    fn invoke(&self, step: &Step, subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        let setting = Self::setting(d)?;
        subsystems.settings.apply(&setting)?;
        Ok(format!("{} applied", d.name))
    }
}

/// Directives interpreted by the installer itself; nothing to do here
pub struct InstallerInvoker;

impl Invoker for InstallerInvoker {
    fn capability(&self) -> Capability {
        Capability::Installer
    }

    fn invoke(&self, step: &Step, _subsystems: &Subsystems) -> InvokeResult {
        let d = directive(step, self.capability())?;
        log::debug!("'{}' is handled by the installer", d.name);
        Ok("handled by installer".to_string())
    }
}
