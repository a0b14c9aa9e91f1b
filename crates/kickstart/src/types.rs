//! Core types for kickstart provisioning documents.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A directive keyword known to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyword {
    /// Canonical directive name
    pub name: &'static str,
    /// Alternative spellings accepted in documents
    pub aliases: &'static [&'static str],
    /// Whether the directive may appear at most once
    pub exclusive: bool,
}

/// Every directive keyword the parser accepts.
pub const KEYWORDS: &[Keyword] = &[
    Keyword { name: "auth", aliases: &["authconfig"], exclusive: false },
    Keyword { name: "bootloader", aliases: &[], exclusive: true },
    Keyword { name: "clearpart", aliases: &[], exclusive: true },
    Keyword { name: "cmdline", aliases: &[], exclusive: false },
    Keyword { name: "eula", aliases: &[], exclusive: false },
    Keyword { name: "firewall", aliases: &[], exclusive: false },
    Keyword { name: "firstboot", aliases: &[], exclusive: false },
    Keyword { name: "install", aliases: &[], exclusive: false },
    Keyword { name: "keyboard", aliases: &[], exclusive: true },
    Keyword { name: "lang", aliases: &[], exclusive: true },
    Keyword { name: "logging", aliases: &[], exclusive: false },
    Keyword { name: "network", aliases: &[], exclusive: false },
    Keyword { name: "part", aliases: &["partition"], exclusive: false },
    Keyword { name: "poweroff", aliases: &[], exclusive: false },
    Keyword { name: "reboot", aliases: &[], exclusive: false },
    Keyword { name: "repo", aliases: &[], exclusive: false },
    Keyword { name: "rootpw", aliases: &[], exclusive: true },
    Keyword { name: "selinux", aliases: &[], exclusive: true },
    Keyword { name: "services", aliases: &[], exclusive: false },
    Keyword { name: "skipx", aliases: &[], exclusive: false },
    Keyword { name: "text", aliases: &[], exclusive: false },
    Keyword { name: "timezone", aliases: &[], exclusive: true },
    Keyword { name: "url", aliases: &[], exclusive: false },
    Keyword { name: "user", aliases: &[], exclusive: false },
    Keyword { name: "zerombr", aliases: &[], exclusive: true },
];

/// Look up a keyword by canonical name or alias.
pub fn keyword(name: &str) -> Option<&'static Keyword> {
    let name = name.to_lowercase();
    KEYWORDS
        .iter()
        .find(|k| k.name == name || k.aliases.contains(&name.as_str()))
}

/// Shown in place of secrets in plans, progress output and audit logs.
pub const REDACTED: &str = "********";

/// Directives whose positional arguments are secrets.
const SECRET_POSITIONALS: &[&str] = &["rootpw"];

/// Options whose values are secrets, on any directive.
const SECRET_OPTIONS: &[&str] = &["password"];

/// A single declarative instruction, e.g. `part /boot --fstype=xfs --size=512`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    /// Canonical directive name
    pub name: String,
    /// `--key=value` options; flags map to `None`
    pub arguments: BTreeMap<String, Option<String>>,
    /// Bare words in the order they appeared
    pub positional: Vec<String>,
    /// Ordinal of this item within the document
    pub position: usize,
    /// Source line (1-indexed), 0 when built programmatically
    pub line: usize,
}

impl Directive {
    /// Create a directive with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: BTreeMap::new(),
            positional: Vec::new(),
            position: 0,
            line: 0,
        }
    }

    /// Add a `--key=value` option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), Some(value.into()));
        self
    }

    /// Add a `--flag` option.
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), None);
        self
    }

    /// Add a positional argument.
    pub fn with_positional(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set the ordinal position.
    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Get the value of an option, if present with a value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_deref())
    }

    /// Check whether an option is present (flag or valued).
    pub fn has(&self, key: &str) -> bool {
        self.arguments.contains_key(key)
    }

    /// Split a comma-separated option value into its items.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.option(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First positional argument, unless it is a secret.
    pub fn label(&self) -> Option<&str> {
        if SECRET_POSITIONALS.contains(&self.name.as_str()) {
            return None;
        }
        self.positional.first().map(String::as_str)
    }

    /// Stable identifier used in plans and audit logs.
    pub fn id(&self) -> String {
        match self.label() {
            Some(first) => format!("{}:{}#{}", self.name, first, self.position),
            None => format!("{}#{}", self.name, self.position),
        }
    }

    /// Copy with secret positionals and option values masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if SECRET_POSITIONALS.contains(&self.name.as_str()) {
            for word in &mut copy.positional {
                *word = REDACTED.to_string();
            }
        }
        for (key, value) in &mut copy.arguments {
            if SECRET_OPTIONS.contains(&key.as_str())
                && let Some(value) = value
            {
                *value = REDACTED.to_string();
            }
        }
        copy
    }
}

/// The `%packages` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageList {
    /// Packages and `@groups` to install
    pub install: BTreeSet<String>,
    /// Packages prefixed with `-`
    pub exclude: BTreeSet<String>,
    /// Header options such as `--nobase`
    pub options: BTreeMap<String, Option<String>>,
    /// Ordinal of this block within the document
    pub position: usize,
    /// Line of the `%packages` header
    pub line: usize,
}

impl PackageList {
    /// Create an empty package list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package to install.
    pub fn include(mut self, name: impl Into<String>) -> Self {
        self.install.insert(name.into());
        self
    }

    /// Add a package to exclude.
    pub fn without(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }

    /// Check that no name appears in both the install and exclude sets.
    pub fn validate(&self) -> Result<()> {
        match self.install.intersection(&self.exclude).next() {
            Some(name) => Err(Error::PackageConflict { name: name.clone() }),
            None => Ok(()),
        }
    }

    /// Whether there is nothing to install or exclude.
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.exclude.is_empty()
    }
}

/// The `%post` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostScript {
    /// Script lines, verbatim
    pub body: Vec<String>,
    /// `--interpreter=` override
    pub interpreter: Option<String>,
    /// `--nochroot`: run in the installer environment instead of the target
    pub nochroot: bool,
    /// `--log=` path receiving the captured output
    pub log: Option<String>,
    /// `--erroronfail`
    pub error_on_fail: bool,
    /// Ordinal of this block within the document
    pub position: usize,
    /// Line of the `%post` header
    pub line: usize,
}

/// Interpreter used when `%post` does not name one.
pub const DEFAULT_INTERPRETER: &str = "/bin/sh";

impl PostScript {
    /// Create a script from its lines.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            body: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// The interpreter that will run this script.
    pub fn interpreter(&self) -> &str {
        self.interpreter.as_deref().unwrap_or(DEFAULT_INTERPRETER)
    }

    /// The script body as a single newline-terminated string.
    pub fn text(&self) -> String {
        let mut text = self.body.join("\n");
        text.push('\n');
        text
    }
}

/// A parsed provisioning document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningDocument {
    /// Directives in document order
    pub directives: Vec<Directive>,
    /// The `%packages` block, if any
    pub packages: Option<PackageList>,
    /// The `%post` block, if any
    pub post_script: Option<PostScript>,
    /// Path the document was read from
    pub path: Option<PathBuf>,
}

impl ProvisioningDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free ordinal position.
    pub fn next_position(&self) -> usize {
        self.directives.len()
            + usize::from(self.packages.is_some())
            + usize::from(self.post_script.is_some())
    }

    /// Append a directive, assigning it the next ordinal.
    pub fn push(&mut self, mut directive: Directive) {
        directive.position = self.next_position();
        self.directives.push(directive);
    }

    /// Set the package block, assigning it the next ordinal.
    pub fn set_packages(&mut self, mut packages: PackageList) {
        packages.position = self.next_position();
        self.packages = Some(packages);
    }

    /// Set the post-script block, assigning it the next ordinal.
    pub fn set_post_script(&mut self, mut script: PostScript) {
        script.position = self.next_position();
        self.post_script = Some(script);
    }

    /// All directives with the given canonical name.
    pub fn directives_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> {
        self.directives.iter().filter(move |d| d.name == name)
    }

    /// First directive with the given canonical name.
    pub fn find(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    /// Package selection including `repo --includepkgs/--excludepkgs` lists.
    pub fn effective_packages(&self) -> PackageList {
        let mut list = self.packages.clone().unwrap_or_default();
        for repo in self.directives_named("repo") {
            list.install.extend(repo.list("includepkgs"));
            list.exclude.extend(repo.list("excludepkgs"));
        }
        list
    }

    /// Check document-level invariants that span several items.
    pub fn validate(&self) -> Result<()> {
        self.effective_packages().validate()
    }
}
