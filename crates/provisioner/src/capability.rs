//! Capability traits for external subsystems
//!
//! The engine never partitions disks, installs packages or runs shells
//! itself. It hands typed requests to these traits, which lets the crate
//! run against real system tools or against in-memory fakes.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Failure reported by a subsystem
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Condition that may clear on its own (mirror unreachable, lock held)
    #[error("{0}")]
    Transient(String),

    /// Anything else
    #[error("{0:#}")]
    Failed(#[from] anyhow::Error),
}

impl CapabilityError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(anyhow::anyhow!(message.into()))
    }
}

pub type CapabilityResult<T = ()> = std::result::Result<T, CapabilityError>;

// ============================================================================
// Requests
// ============================================================================

/// Which existing partitions `clearpart` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Linux,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearSpec {
    pub scope: ClearScope,
    /// Restrict to these drives; empty means every drive
    pub drives: Vec<String>,
    pub init_label: bool,
    pub disk_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub mount_point: String,
    pub size_mib: Option<u64>,
    pub max_size_mib: Option<u64>,
    pub grow: bool,
    pub fstype: Option<String>,
    pub disk: Option<String>,
    pub label: Option<String>,
    pub fs_options: Option<String>,
    pub primary: bool,
    pub format: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    Dhcp,
    Static {
        ip: String,
        netmask: String,
        gateway: Option<String>,
    },
    /// Link configured, no address
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub mode: NetworkMode,
    pub onboot: bool,
    pub hostname: Option<String>,
    pub nameservers: Vec<String>,
    pub mtu: Option<u32>,
    pub ipv6: bool,
    pub default_route: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLocation {
    Mbr,
    Partition,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderSpec {
    pub location: BootLocation,
    /// Extra kernel command line parameters
    pub append: Vec<String>,
    pub timeout: Option<u32>,
    pub boot_drive: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallSpec {
    pub enabled: bool,
    pub services: Vec<String>,
    pub removed_services: Vec<String>,
    pub ports: Vec<String>,
    pub trusted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub name: String,
    pub baseurl: Option<String>,
    pub mirrorlist: Option<String>,
    pub cost: Option<u32>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub proxy: Option<String>,
    pub verify_ssl: bool,
    /// Persist the repository into the installed system
    pub persist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    RootPassword {
        password: Option<String>,
        crypted: bool,
        lock: bool,
    },
    User {
        name: String,
        password: Option<String>,
        crypted: bool,
        lock: bool,
        groups: Vec<String>,
        homedir: Option<String>,
        shell: Option<String>,
        uid: Option<u32>,
        gecos: Option<String>,
    },
    /// authconfig-style policy switches
    Policy { options: BTreeMap<String, Option<String>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelinuxMode {
    Enforcing,
    Permissive,
    Disabled,
}

impl SelinuxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelinuxMode::Enforcing => "enforcing",
            SelinuxMode::Permissive => "permissive",
            SelinuxMode::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    Keyboard(String),
    Language {
        lang: String,
        support: Vec<String>,
    },
    Selinux(SelinuxMode),
    Timezone {
        zone: String,
        utc: bool,
        ntp_servers: Vec<String>,
    },
    Logging {
        host: Option<String>,
        port: Option<u16>,
        level: Option<String>,
    },
}

/// One run of the post-install script
#[derive(Debug, Clone, Copy)]
pub struct ScriptInvocation<'a> {
    pub interpreter: &'a str,
    /// Script file as seen from the host
    pub host_path: &'a Path,
    /// Root to chroot into, or `None` to run in place
    pub chroot: Option<&'a Path>,
    /// Script file as seen from inside the chroot
    pub chroot_path: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: String,
}

// ============================================================================
// Traits
// ============================================================================

pub trait DiskTool: Send + Sync {
    /// Destroy invalid partition tables without prompting
    fn zero_mbr(&self) -> CapabilityResult;

    fn clear(&self, spec: &ClearSpec) -> CapabilityResult;

    fn partition(&self, spec: &PartitionSpec) -> CapabilityResult;
}

pub trait PackageManager: Send + Sync {
    fn install(&self, names: &[String]) -> CapabilityResult<String>;

    /// Keep these packages out of any later install
    fn exclude(&self, names: &[String]) -> CapabilityResult;
}

pub trait NetworkConfig: Send + Sync {
    fn apply(&self, device: &str, settings: &NetworkSettings) -> CapabilityResult;

    fn set_hostname(&self, hostname: &str) -> CapabilityResult;
}

pub trait BootloaderWriter: Send + Sync {
    fn write(&self, spec: &BootloaderSpec) -> CapabilityResult;
}

pub trait ServiceManager: Send + Sync {
    fn set_enabled(&self, names: &[String]) -> CapabilityResult;

    fn set_disabled(&self, names: &[String]) -> CapabilityResult;
}

pub trait FirewallConfig: Send + Sync {
    fn apply(&self, spec: &FirewallSpec) -> CapabilityResult;
}

pub trait RepoConfig: Send + Sync {
    fn add(&self, spec: &RepoSpec) -> CapabilityResult;
}

pub trait AuthConfig: Send + Sync {
    fn apply(&self, request: &AuthRequest) -> CapabilityResult;
}

pub trait SystemSettings: Send + Sync {
    fn apply(&self, setting: &Setting) -> CapabilityResult;
}

pub trait ShellExecutor: Send + Sync {
    fn run(&self, invocation: &ScriptInvocation<'_>) -> CapabilityResult<ShellOutput>;
}

/// Every subsystem the engine may call
pub struct Subsystems {
    pub disk: Box<dyn DiskTool>,
    pub packages: Box<dyn PackageManager>,
    pub network: Box<dyn NetworkConfig>,
    pub bootloader: Box<dyn BootloaderWriter>,
    pub services: Box<dyn ServiceManager>,
    pub firewall: Box<dyn FirewallConfig>,
    pub repos: Box<dyn RepoConfig>,
    pub auth: Box<dyn AuthConfig>,
    pub settings: Box<dyn SystemSettings>,
    pub shell: Box<dyn ShellExecutor>,
}
