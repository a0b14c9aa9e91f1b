//! Root password, local users and auth policy inside the target
//!
//! Passwords travel on stdin to `chpasswd`, never on a command line.

use crate::config::Commands;
use crate::runner;
use provisioner::{AuthConfig, AuthRequest, CapabilityResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct Accounts {
    chroot: String,
    authconfig: String,
    root: PathBuf,
}

impl Accounts {
    pub fn new(commands: &Commands, root: &Path) -> Self {
        Self {
            chroot: commands.chroot.clone(),
            authconfig: commands.authconfig.clone(),
            root: root.to_path_buf(),
        }
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.chroot);
        cmd.arg(&self.root).arg(program).args(args);
        cmd
    }

    fn run(&self, program: &str, args: &[String]) -> CapabilityResult<String> {
        runner::capture(&mut self.command(program, args))
    }

    fn set_password(&self, user: &str, password: &str, crypted: bool) -> CapabilityResult {
        let args = if crypted {
            vec!["--encrypted".to_string()]
        } else {
            Vec::new()
        };
        runner::capture_with_input(
            &mut self.command("chpasswd", &args),
            &format!("{user}:{password}\n"),
        )?;
        Ok(())
    }

    fn user_exists(&self, name: &str) -> bool {
        self.run("getent", &["passwd".to_string(), name.to_string()])
            .is_ok()
    }
}

impl AuthConfig for Accounts {
    fn apply(&self, request: &AuthRequest) -> CapabilityResult {
        match request {
            AuthRequest::RootPassword {
                password,
                crypted,
                lock,
            } => {
                if let Some(password) = password {
                    self.set_password("root", password, *crypted)?;
                }
                if *lock {
                    self.run("usermod", &["--lock".to_string(), "root".to_string()])?;
                }
            }
            AuthRequest::User {
                name,
                password,
                crypted,
                lock,
                ..
            } => {
                let program = if self.user_exists(name) {
                    "usermod"
                } else {
                    "useradd"
                };
                self.run(program, &user_args(program, request))?;
                if let Some(password) = password {
                    self.set_password(name, password, *crypted)?;
                }
                if *lock {
                    self.run("usermod", &["--lock".to_string(), name.clone()])?;
                }
            }
            AuthRequest::Policy { options } => {
                self.run(&self.authconfig, &policy_args(options))?;
            }
        }
        Ok(())
    }
}

/// useradd/usermod arguments; both accept the same switches
fn user_args(program: &str, request: &AuthRequest) -> Vec<String> {
    let AuthRequest::User {
        name,
        groups,
        homedir,
        shell,
        uid,
        gecos,
        ..
    } = request
    else {
        return Vec::new();
    };

    let mut args = Vec::new();
    if program == "useradd" {
        args.push("--create-home".to_string());
    }
    if !groups.is_empty() {
        args.push("--groups".to_string());
        args.push(groups.join(","));
    }
    if let Some(home) = homedir {
        args.push("-d".to_string());
        args.push(home.clone());
    }
    if let Some(shell) = shell {
        args.push("--shell".to_string());
        args.push(shell.clone());
    }
    if let Some(uid) = uid {
        args.push("--uid".to_string());
        args.push(uid.to_string());
    }
    if let Some(gecos) = gecos {
        args.push("--comment".to_string());
        args.push(gecos.clone());
    }
    args.push(name.clone());
    args
}

/// Options pass through as given, e.g. `--enableshadow --passalgo=sha512`
fn policy_args(options: &BTreeMap<String, Option<String>>) -> Vec<String> {
    let mut args: Vec<String> = options
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("--{key}={value}"),
            None => format!("--{key}"),
        })
        .collect();
    args.push("--update".to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthRequest {
        AuthRequest::User {
            name: "admin".to_string(),
            password: None,
            crypted: false,
            lock: false,
            groups: vec!["wheel".to_string(), "adm".to_string()],
            homedir: None,
            shell: Some("/bin/bash".to_string()),
            uid: Some(1001),
            gecos: Some("Site Admin".to_string()),
        }
    }

    #[test]
    fn test_useradd_args() {
        assert_eq!(
            user_args("useradd", &user()),
            [
                "--create-home",
                "--groups",
                "wheel,adm",
                "--shell",
                "/bin/bash",
                "--uid",
                "1001",
                "--comment",
                "Site Admin",
                "admin",
            ]
        );
        assert_eq!(user_args("usermod", &user())[0], "--groups");
    }

    #[test]
    fn test_policy_args() {
        let mut options = BTreeMap::new();
        options.insert("enableshadow".to_string(), None);
        options.insert("passalgo".to_string(), Some("sha512".to_string()));
        assert_eq!(
            policy_args(&options),
            ["--enableshadow", "--passalgo=sha512", "--update"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_chroot_fails_request() {
        let commands = Commands {
            chroot: "false".to_string(),
            ..Commands::default()
        };
        let accounts = Accounts::new(&commands, Path::new("/mnt/sysimage"));
        let request = AuthRequest::RootPassword {
            password: Some("secret".to_string()),
            crypted: false,
            lock: false,
        };
        let err = accounts.apply(&request).unwrap_err();
        // The password never reaches the error text
        assert!(!err.to_string().contains("secret"));
        assert!(err.to_string().contains("chpasswd"));
    }
}
