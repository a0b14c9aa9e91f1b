//! In-memory subsystems for tests

use crate::capability::{
    AuthConfig, AuthRequest, BootloaderSpec, BootloaderWriter, CapabilityError, CapabilityResult,
    ClearSpec, DiskTool, FirewallConfig, FirewallSpec, NetworkConfig, NetworkMode,
    NetworkSettings, PackageManager, PartitionSpec, RepoConfig, RepoSpec, ScriptInvocation,
    ServiceManager, Setting, ShellExecutor, ShellOutput, Subsystems, SystemSettings,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Every subsystem at once, recording calls as `subsystem.call args`
#[derive(Clone, Default)]
pub struct Fake {
    calls: Arc<Mutex<Vec<String>>>,
    scripts: Arc<Mutex<Vec<String>>>,
    transient: Arc<AtomicU32>,
    failing: Option<&'static str>,
    exit_code: i32,
}

impl Fake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every call to one subsystem permanently
    pub fn failing(mut self, subsystem: &'static str) -> Self {
        self.failing = Some(subsystem);
        self
    }

    /// Exit status the shell reports
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn subsystems(&self) -> Subsystems {
        Subsystems {
            disk: Box::new(self.clone()),
            packages: Box::new(self.clone()),
            network: Box::new(self.clone()),
            bootloader: Box::new(self.clone()),
            services: Box::new(self.clone()),
            firewall: Box::new(self.clone()),
            repos: Box::new(self.clone()),
            auth: Box::new(self.clone()),
            settings: Box::new(self.clone()),
            shell: Box::new(self.clone()),
        }
    }

    fn record(&self, subsystem: &'static str, call: impl Into<String>) -> CapabilityResult {
        if self
            .transient
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CapabilityError::transient("mirror unreachable"));
        }
        if self.failing == Some(subsystem) {
            return Err(CapabilityError::failed(format!("{subsystem} backend failed")));
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("{subsystem}.{}", call.into()));
        Ok(())
    }
}

fn or_dash<T: ToString>(value: Option<&T>) -> String {
    value.map_or_else(|| "-".to_string(), ToString::to_string)
}

impl DiskTool for Fake {
    fn zero_mbr(&self) -> CapabilityResult {
        self.record("disk", "zerombr")
    }

    fn clear(&self, spec: &ClearSpec) -> CapabilityResult {
        self.record("disk", format!("clear {:?}", spec.scope).to_lowercase())
    }

    fn partition(&self, spec: &PartitionSpec) -> CapabilityResult {
        self.record(
            "disk",
            format!(
                "partition {} {} {} {}",
                spec.mount_point,
                or_dash(spec.size_mib.as_ref()),
                or_dash(spec.fstype.as_ref()),
                or_dash(spec.disk.as_ref())
            ),
        )
    }
}

impl PackageManager for Fake {
    fn install(&self, names: &[String]) -> CapabilityResult<String> {
        self.record("packages", format!("install {}", names.join(",")))?;
        Ok(format!("installed {} package(s)", names.len()))
    }

    fn exclude(&self, names: &[String]) -> CapabilityResult {
        self.record("packages", format!("exclude {}", names.join(",")))
    }
}

impl NetworkConfig for Fake {
    fn apply(&self, device: &str, settings: &NetworkSettings) -> CapabilityResult {
        let mode = match settings.mode {
            NetworkMode::Dhcp => "Dhcp",
            NetworkMode::Static { .. } => "Static",
            NetworkMode::Manual => "Manual",
        };
        self.record("network", format!("apply {device} {mode}"))
    }

    fn set_hostname(&self, hostname: &str) -> CapabilityResult {
        self.record("network", format!("hostname {hostname}"))
    }
}

impl BootloaderWriter for Fake {
    fn write(&self, spec: &BootloaderSpec) -> CapabilityResult {
        self.record("bootloader", format!("write {}", spec.append.join(" ")).trim_end())
    }
}

impl ServiceManager for Fake {
    fn set_enabled(&self, names: &[String]) -> CapabilityResult {
        self.record("services", format!("enable {}", names.join(",")))
    }

    fn set_disabled(&self, names: &[String]) -> CapabilityResult {
        self.record("services", format!("disable {}", names.join(",")))
    }
}

impl FirewallConfig for Fake {
    fn apply(&self, spec: &FirewallSpec) -> CapabilityResult {
        let state = if spec.enabled { "enabled" } else { "disabled" };
        self.record("firewall", format!("apply {state}"))
    }
}

impl RepoConfig for Fake {
    fn add(&self, spec: &RepoSpec) -> CapabilityResult {
        self.record("repos", format!("add {}", spec.name))
    }
}

impl AuthConfig for Fake {
    fn apply(&self, request: &AuthRequest) -> CapabilityResult {
        let call = match request {
            AuthRequest::RootPassword { .. } => "rootpw".to_string(),
            AuthRequest::User { name, .. } => format!("user {name}"),
            AuthRequest::Policy { .. } => "policy".to_string(),
        };
        self.record("auth", call)
    }
}

impl SystemSettings for Fake {
    fn apply(&self, setting: &Setting) -> CapabilityResult {
        let call = match setting {
            Setting::Keyboard(layout) => format!("keyboard {layout}"),
            Setting::Language { lang, .. } => format!("lang {lang}"),
            Setting::Selinux(mode) => format!("selinux {}", mode.as_str()),
            Setting::Timezone { zone, .. } => format!("timezone {zone}"),
            Setting::Logging { .. } => "logging".to_string(),
        };
        self.record("settings", call)
    }
}

impl ShellExecutor for Fake {
    fn run(&self, invocation: &ScriptInvocation<'_>) -> CapabilityResult<ShellOutput> {
        let text = std::fs::read_to_string(invocation.host_path)
            .map_err(|e| CapabilityError::failed(format!("script not staged: {e}")))?;
        self.scripts.lock().unwrap().push(text);
        self.record("shell", format!("run {}", invocation.interpreter))?;
        Ok(ShellOutput {
            exit_code: self.exit_code,
            output: format!("exit {}\n", self.exit_code),
        })
    }
}
