//! Package installation into the target with dnf `--installroot`

use super::{INSTALL_REPO_DIR, REPO_DIR, in_target};
use crate::runner;
use provisioner::{CapabilityError, CapabilityResult, PackageManager};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Dnf {
    program: String,
    root: PathBuf,
    excludes: Mutex<Vec<String>>,
}

impl Dnf {
    pub fn new(program: &str, root: &Path) -> Self {
        Self {
            program: program.to_string(),
            root: root.to_path_buf(),
            excludes: Mutex::new(Vec::new()),
        }
    }

    fn install_args(&self, names: &[String], excludes: &[String]) -> Vec<String> {
        let repo_dirs = [REPO_DIR, INSTALL_REPO_DIR]
            .iter()
            .map(|dir| in_target(&self.root, dir).display().to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut args = vec![
            format!("--installroot={}", self.root.display()),
            format!("--setopt=reposdir={repo_dirs}"),
            "--assumeyes".to_string(),
        ];
        args.extend(excludes.iter().map(|name| format!("--exclude={name}")));
        args.push("install".to_string());
        args.extend(names.iter().cloned());
        args
    }
}

impl PackageManager for Dnf {
    fn install(&self, names: &[String]) -> CapabilityResult<String> {
        let excludes = self
            .excludes
            .lock()
            .map_err(|_| CapabilityError::failed("package state lock poisoned"))?
            .clone();
        let output = runner::run_capture(&self.program, &self.install_args(names, &excludes))?;
        let summary = output
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("Complete!");
        Ok(format!("{} package(s) requested: {summary}", names.len()))
    }

    fn exclude(&self, names: &[String]) -> CapabilityResult {
        let mut excludes = self
            .excludes
            .lock()
            .map_err(|_| CapabilityError::failed("package state lock poisoned"))?;
        for name in names {
            if !excludes.contains(name) {
                excludes.push(name.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_install_args() {
        let dnf = Dnf::new("dnf", Path::new("/mnt/sysimage"));
        let args = dnf.install_args(&names(&["@core", "cloud-init"]), &names(&["NetworkManager"]));
        assert_eq!(
            args,
            [
                "--installroot=/mnt/sysimage",
                "--setopt=reposdir=/mnt/sysimage/etc/yum.repos.d,/mnt/sysimage/var/lib/kickstand/repos.d",
                "--assumeyes",
                "--exclude=NetworkManager",
                "install",
                "@core",
                "cloud-init",
            ]
        );
    }

    #[test]
    fn test_excludes_accumulate_without_duplicates() {
        let dnf = Dnf::new("dnf", Path::new("/"));
        dnf.exclude(&names(&["a", "b"])).unwrap();
        dnf.exclude(&names(&["b", "c"])).unwrap();
        assert_eq!(dnf.excludes.lock().unwrap().as_slice(), ["a", "b", "c"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_install_reports_last_line() {
        // echo prints its arguments back as the only line
        let dnf = Dnf::new("echo", Path::new("/srv/image"));
        let summary = dnf.install(&names(&["vim"])).unwrap();
        assert!(summary.starts_with("1 package(s) requested: --installroot=/srv/image "));
        assert!(summary.ends_with(" install vim"));
    }
}
