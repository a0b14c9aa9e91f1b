//! Idempotent `KEY=value` edits of shell-style config files
//!
//! Assignments are replaced in place and appended when missing. Comments and
//! unrelated lines are left alone, so applying the same patch twice changes
//! nothing.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Wrap a value in double quotes
pub fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Apply assignments to config text
pub fn set_keys(content: &str, pairs: &[(&str, String)]) -> Result<String> {
    let mut text = content.to_string();
    for (key, value) in pairs {
        let line = format!("{key}={value}");
        let pattern = Regex::new(&format!(r"(?m)^[ \t]*{}[ \t]*=.*$", regex::escape(key)))
            .with_context(|| format!("Invalid config key '{key}'"))?;
        if pattern.is_match(&text) {
            text = pattern.replace_all(&text, regex::NoExpand(&line)).into_owned();
        } else {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&line);
            text.push('\n');
        }
    }
    Ok(text)
}

/// Patch a file in place; a missing file starts empty
///
/// Returns whether the file changed.
pub fn patch_file(path: &Path, pairs: &[(&str, String)]) -> Result<bool> {
    let current = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };
    let patched = set_keys(&current, pairs)?;
    if patched == current {
        log::debug!("{} already up to date", path.display());
        return Ok(false);
    }
    super::write_file(path, &patched)?;
    Ok(true)
}
