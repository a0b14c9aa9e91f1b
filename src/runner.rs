//! External command helpers for the system subsystems

use anyhow::Context;
use provisioner::{CapabilityError, CapabilityResult, ShellOutput};
use std::io::{ErrorKind, Write};
use std::process::{Command, Output, Stdio};

/// stderr fragments that mean "try again later" rather than "broken"
const TRANSIENT_MARKERS: &[&str] = &[
    "Cannot download",
    "Could not resolve host",
    "Curl error",
    "Temporary failure",
    "timed out",
    "Connection refused",
    "waiting for process with pid",
    "Resource temporarily unavailable",
    "device or resource busy",
];

/// Run a command and capture its stdout
///
/// Nonzero exits become [`CapabilityError`]s, transient when stderr looks
/// like a network hiccup or a held lock.
pub fn run_capture(program: &str, args: &[String]) -> CapabilityResult<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    capture(&mut cmd)
}

/// Same as [`run_capture`] for a prepared [`Command`]
pub fn capture(cmd: &mut Command) -> CapabilityResult<String> {
    let display = describe(cmd);
    log::debug!("Running: {display}");
    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute: {display}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(classify(&display, &output))
    }
}

/// Same as [`capture`], feeding `input` on stdin
///
/// Used for secrets, which must not show up in the process list.
pub fn capture_with_input(cmd: &mut Command, input: &str) -> CapabilityResult<String> {
    let display = describe(cmd);
    log::debug!("Running: {display} (with stdin)");
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to execute: {display}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(input.as_bytes()) {
            // The command exited without reading; its status tells the story
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
            other => other.with_context(|| format!("Failed to write to {display}"))?,
        }
    }
    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {display}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(classify(&display, &output))
    }
}

/// Run a command to completion, reporting any exit status as `Ok`
///
/// Output is stdout followed by stderr. Only a failure to start is an
/// error.
pub fn run_combined(cmd: &mut Command) -> CapabilityResult<ShellOutput> {
    let display = describe(cmd);
    log::debug!("Running: {display}");
    let output = cmd
        .output()
        .with_context(|| format!("Failed to execute: {display}"))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(ShellOutput {
        // Killed by a signal
        exit_code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}

fn classify(display: &str, output: &Output) -> CapabilityError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.trim();
    let message = format!("{display} failed ({}): {detail}", output.status);
    if is_transient(detail) {
        CapabilityError::transient(message)
    } else {
        CapabilityError::failed(message)
    }
}

pub fn is_transient(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
