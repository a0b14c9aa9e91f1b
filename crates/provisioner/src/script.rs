//! Script runner - executes `%post` as one scoped transaction
//!
//! The body is written to a temporary file, run through the
//! [`ShellExecutor`], and the file is removed on every exit path. The script
//! text is never inspected.

use crate::capability::{CapabilityResult, ScriptInvocation, ShellExecutor, ShellOutput};
use anyhow::Context;
use kickstart::PostScript;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ScriptRunner {
    target_root: PathBuf,
}

impl ScriptRunner {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
        }
    }

    /// Run the script and capture its combined output and exit status
    ///
    /// A nonzero exit is returned as `Ok`; only failures to stage or start
    /// the script are errors.
    pub fn run(&self, script: &PostScript, shell: &dyn ShellExecutor) -> CapabilityResult<ShellOutput> {
        let chroot = (!script.nochroot).then_some(self.target_root.as_path());
        let dir = match chroot {
            Some(root) => root.join("tmp"),
            None => std::env::temp_dir(),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut file = tempfile::Builder::new()
            .prefix("ks-script-")
            .suffix(".sh")
            .tempfile_in(&dir)
            .with_context(|| format!("Failed to create script file in {}", dir.display()))?;
        file.write_all(script.text().as_bytes())
            .and_then(|()| file.flush())
            .context("Failed to write script file")?;

        // Closes the descriptor; the file itself is removed when `path` drops
        let path = file.into_temp_path();
        let chroot_path = match chroot {
            Some(root) => Path::new("/").join(
                path.strip_prefix(root)
                    .context("Script file escaped the target root")?,
            ),
            None => path.to_path_buf(),
        };

        log::debug!(
            "Running {} via {} (chroot: {})",
            chroot_path.display(),
            script.interpreter(),
            chroot.map_or_else(|| "none".to_string(), |r| r.display().to_string())
        );
        let output = shell.run(&ScriptInvocation {
            interpreter: script.interpreter(),
            host_path: &path,
            chroot,
            chroot_path: &chroot_path,
        })?;

        if let Some(log_path) = &script.log {
            let host_log = match chroot {
                Some(root) => root.join(log_path.trim_start_matches('/')),
                None => PathBuf::from(log_path),
            };
            if let Err(e) = append_log(&host_log, &output.output) {
                log::warn!("Could not write script log {}: {e:#}", host_log.display());
            }
        }

        path.close().context("Failed to remove script file")?;
        Ok(output)
    }
}

fn append_log(path: &Path, output: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(output.as_bytes())?;
    Ok(())
}
