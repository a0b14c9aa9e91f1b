//! Post-install script execution, chrooted into the target when asked

use crate::runner;
use provisioner::{CapabilityResult, ScriptInvocation, ShellExecutor, ShellOutput};
use std::process::Command;

pub struct ChrootShell {
    chroot: String,
}

impl ChrootShell {
    pub fn new(chroot: &str) -> Self {
        Self {
            chroot: chroot.to_string(),
        }
    }

    fn command(&self, invocation: &ScriptInvocation<'_>) -> Command {
        match invocation.chroot {
            Some(root) => {
                let mut cmd = Command::new(&self.chroot);
                cmd.arg(root)
                    .arg(invocation.interpreter)
                    .arg(invocation.chroot_path);
                cmd
            }
            None => {
                let mut cmd = Command::new(invocation.interpreter);
                cmd.arg(invocation.host_path);
                cmd
            }
        }
    }
}

impl ShellExecutor for ChrootShell {
    fn run(&self, invocation: &ScriptInvocation<'_>) -> CapabilityResult<ShellOutput> {
        runner::run_combined(&mut self.command(invocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    #[test]
    fn test_chroot_command_uses_inner_path() {
        let shell = ChrootShell::new("chroot");
        let cmd = shell.command(&ScriptInvocation {
            interpreter: "/bin/sh",
            host_path: Path::new("/mnt/sysimage/tmp/ks-script-1.sh"),
            chroot: Some(Path::new("/mnt/sysimage")),
            chroot_path: Path::new("/tmp/ks-script-1.sh"),
        });
        assert_eq!(cmd.get_program(), "chroot");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["/mnt/sysimage", "/bin/sh", "/tmp/ks-script-1.sh"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_nochroot_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("post.sh");
        fs::write(&script, "echo configured\necho warning >&2\nexit 7\n").unwrap();

        let output = ChrootShell::new("chroot")
            .run(&ScriptInvocation {
                interpreter: "/bin/sh",
                host_path: &script,
                chroot: None,
                chroot_path: &script,
            })
            .unwrap();
        assert_eq!(output.exit_code, 7);
        assert_eq!(output.output, "configured\nwarning\n");
    }
}
