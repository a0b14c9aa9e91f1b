//! Package repositories as `.repo` files in the target

use super::{INSTALL_REPO_DIR, REPO_DIR, in_target, write_file};
use provisioner::{CapabilityResult, RepoConfig, RepoSpec};
use std::path::{Path, PathBuf};

pub struct RepoFiles {
    root: PathBuf,
}

impl RepoFiles {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Persisted repositories go where the installed system will find them
    fn path(&self, spec: &RepoSpec) -> PathBuf {
        let dir = if spec.persist { REPO_DIR } else { INSTALL_REPO_DIR };
        in_target(&self.root, &format!("{dir}/{}.repo", file_name(&spec.name)))
    }
}

impl RepoConfig for RepoFiles {
    fn add(&self, spec: &RepoSpec) -> CapabilityResult {
        write_file(&self.path(spec), &repo_file(spec))?;
        Ok(())
    }
}

/// Repository names may contain spaces; file names may not
fn file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect()
}

fn repo_file(spec: &RepoSpec) -> String {
    let mut lines = vec![
        format!("[{}]", file_name(&spec.name)),
        format!("name={}", spec.name),
    ];
    if let Some(url) = &spec.baseurl {
        lines.push(format!("baseurl={url}"));
    }
    if let Some(url) = &spec.mirrorlist {
        lines.push(format!("mirrorlist={url}"));
    }
    lines.push("enabled=1".to_string());
    if let Some(cost) = spec.cost {
        lines.push(format!("cost={cost}"));
    }
    if !spec.include.is_empty() {
        lines.push(format!("includepkgs={}", spec.include.join(" ")));
    }
    if !spec.exclude.is_empty() {
        lines.push(format!("excludepkgs={}", spec.exclude.join(" ")));
    }
    if let Some(proxy) = &spec.proxy {
        lines.push(format!("proxy={proxy}"));
    }
    lines.push(format!("sslverify={}", u8::from(spec.verify_ssl)));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}
