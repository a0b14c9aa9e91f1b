//! Service enablement with `systemctl --root`

use crate::runner;
use provisioner::{CapabilityResult, ServiceManager};
use std::path::{Path, PathBuf};

pub struct Systemctl {
    program: String,
    root: PathBuf,
}

impl Systemctl {
    pub fn new(program: &str, root: &Path) -> Self {
        Self {
            program: program.to_string(),
            root: root.to_path_buf(),
        }
    }

    fn args(&self, verb: &str, names: &[String]) -> Vec<String> {
        let mut args = vec![format!("--root={}", self.root.display()), verb.to_string()];
        args.extend(names.iter().cloned());
        args
    }
}

impl ServiceManager for Systemctl {
    fn set_enabled(&self, names: &[String]) -> CapabilityResult {
        runner::run_capture(&self.program, &self.args("enable", names))?;
        Ok(())
    }

    fn set_disabled(&self, names: &[String]) -> CapabilityResult {
        runner::run_capture(&self.program, &self.args("disable", names))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let systemctl = Systemctl::new("systemctl", Path::new("/mnt/sysimage"));
        let args = systemctl.args("enable", &["sshd".to_string(), "chronyd".to_string()]);
        assert_eq!(args, ["--root=/mnt/sysimage", "enable", "sshd", "chronyd"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_surfaces() {
        let systemctl = Systemctl::new("false", Path::new("/"));
        assert!(systemctl.set_disabled(&["kdump".to_string()]).is_err());
        assert!(Systemctl::new("true", Path::new("/")).set_enabled(&["sshd".to_string()]).is_ok());
    }
}
