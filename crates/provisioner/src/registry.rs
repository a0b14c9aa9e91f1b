//! Directive registry - maps directive names to capability handlers
//!
//! The registry is the engine's knowledge base: which subsystem handles a
//! directive, which dependency tier it belongs to, which options it accepts
//! and which directives must precede it. Documents carry no dependency
//! metadata of their own.

use crate::error::{Error, Result};
use kickstart::Directive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// External subsystem family a step is handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Firewall,
    Repo,
    Auth,
    Network,
    Bootloader,
    DiskPartition,
    ServiceSet,
    PackageInstall,
    /// keyboard, lang, selinux, logging, timezone
    SystemSetting,
    /// Directives consumed by the installer itself (text, reboot, ...)
    Installer,
    /// The `%post` script
    Shell,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Firewall => "firewall",
            Capability::Repo => "repo",
            Capability::Auth => "auth",
            Capability::Network => "network",
            Capability::Bootloader => "bootloader",
            Capability::DiskPartition => "disk",
            Capability::ServiceSet => "services",
            Capability::PackageInstall => "packages",
            Capability::SystemSetting => "setting",
            Capability::Installer => "installer",
            Capability::Shell => "shell",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency tier; every step in a tier runs after every step of the
/// tiers before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// No dependencies: security, auth, locale, time, installer mode
    Base,
    Network,
    /// Bootloader and disk layout
    Storage,
    Packages,
    Services,
    PostScript,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Base => "base",
            Tier::Network => "network",
            Tier::Storage => "storage",
            Tier::Packages => "packages",
            Tier::Services => "services",
            Tier::PostScript => "post",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `--flag`
    Flag,
    /// `--key=value`
    Value,
}

/// One accepted option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

const fn flag(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind: ArgKind::Flag,
        required: false,
    }
}

const fn value(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind: ArgKind::Value,
        required: false,
    }
}

const fn required(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind: ArgKind::Value,
        required: true,
    }
}

/// Options and positional arguments a directive accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSchema {
    pub options: &'static [ArgSpec],
    /// Minimum and maximum number of positional arguments
    pub positional: (usize, usize),
    /// At most one of these options may be given
    pub one_of: &'static [&'static str],
    /// Accept options not listed in `options` (installer-interpreted directives)
    pub allow_unknown: bool,
}

impl ArgumentSchema {
    pub const EMPTY: Self = Self {
        options: &[],
        positional: (0, 0),
        one_of: &[],
        allow_unknown: false,
    };

    /// Validate a directive against this schema
    pub fn validate(&self, directive: &Directive) -> Result<()> {
        let invalid = |key: &str, reason: String| Error::InvalidArgument {
            directive: directive.name.clone(),
            line: directive.line,
            key: key.to_string(),
            reason,
        };

        for (key, given) in &directive.arguments {
            match self.options.iter().find(|spec| spec.name == key.as_str()) {
                Some(spec) => match (spec.kind, given) {
                    (ArgKind::Flag, Some(_)) => {
                        return Err(invalid(key.as_str(), "does not take a value".to_string()));
                    }
                    (ArgKind::Value, None) => {
                        return Err(invalid(key.as_str(), "requires a value".to_string()));
                    }
                    _ => {}
                },
                None if self.allow_unknown => {}
                None => return Err(invalid(key.as_str(), "unknown option".to_string())),
            }
        }

        let missing: Vec<&str> = self
            .options
            .iter()
            .filter(|spec| spec.required && !directive.has(spec.name))
            .map(|spec| spec.name)
            .collect();
        if !missing.is_empty() {
            return Err(invalid(
                &missing.join(","),
                "required option is missing".to_string(),
            ));
        }

        let exclusive: Vec<&str> = self
            .one_of
            .iter()
            .copied()
            .filter(|name| directive.has(name))
            .collect();
        if exclusive.len() > 1 {
            return Err(invalid(
                &exclusive.join(","),
                "options are mutually exclusive".to_string(),
            ));
        }

        let (min, max) = self.positional;
        let count = directive.positional.len();
        if count < min || count > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min} to {max}")
            };
            return Err(invalid(
                "<positional>",
                format!("expected {expected} argument(s), found {count}"),
            ));
        }

        Ok(())
    }
}

/// How the engine handles one directive name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub name: &'static str,
    pub capability: Capability,
    pub tier: Tier,
    pub schema: ArgumentSchema,
    /// Directives that must appear earlier in the document
    pub requires: &'static [&'static str],
}

impl HandlerDescriptor {
    pub const fn new(name: &'static str, capability: Capability, tier: Tier) -> Self {
        Self {
            name,
            capability,
            tier,
            schema: ArgumentSchema::EMPTY,
            requires: &[],
        }
    }

    pub const fn schema(mut self, schema: ArgumentSchema) -> Self {
        self.schema = schema;
        self
    }

    pub const fn requires(mut self, requires: &'static [&'static str]) -> Self {
        self.requires = requires;
        self
    }
}

/// Mapping from directive name to handler descriptor
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: BTreeMap<&'static str, HandlerDescriptor>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in directive
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in BUILTIN {
            registry.register(*descriptor);
        }
        registry
    }

    /// Add or replace a handler
    pub fn register(&mut self, descriptor: HandlerDescriptor) {
        self.handlers.insert(descriptor.name, descriptor);
    }

    /// Look up a handler by directive name
    pub fn lookup(&self, name: &str) -> Result<&HandlerDescriptor> {
        self.handlers
            .get(name)
            .ok_or_else(|| Error::UnknownDirective {
                name: name.to_string(),
                line: 0,
            })
    }

    /// Look up the handler for a directive and validate its arguments
    pub fn validate(&self, directive: &Directive) -> Result<&HandlerDescriptor> {
        let descriptor =
            self.handlers
                .get(directive.name.as_str())
                .ok_or_else(|| Error::UnknownDirective {
                    name: directive.name.clone(),
                    line: directive.line,
                })?;
        descriptor.schema.validate(directive)?;
        Ok(descriptor)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Built-in handlers
// ============================================================================

const INSTALLER: ArgumentSchema = ArgumentSchema {
    options: &[],
    positional: (0, 8),
    one_of: &[],
    allow_unknown: true,
};

const BUILTIN: &[HandlerDescriptor] = &[
    // Base tier
    HandlerDescriptor::new("firewall", Capability::Firewall, Tier::Base).schema(ArgumentSchema {
        options: &[
            flag("enabled"),
            flag("disabled"),
            flag("enable"),
            flag("disable"),
            flag("ssh"),
            value("service"),
            value("port"),
            value("trust"),
            value("remove-service"),
        ],
        positional: (0, 0),
        one_of: &["enabled", "disabled", "enable", "disable"],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("auth", Capability::Auth, Tier::Base).schema(ArgumentSchema {
        options: &[flag("enableshadow"), flag("useshadow"), value("passalgo")],
        positional: (0, 0),
        one_of: &[],
        allow_unknown: true,
    }),
    HandlerDescriptor::new("rootpw", Capability::Auth, Tier::Base).schema(ArgumentSchema {
        options: &[flag("iscrypted"), flag("plaintext"), flag("lock")],
        positional: (0, 1),
        one_of: &["iscrypted", "plaintext"],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("user", Capability::Auth, Tier::Base).schema(ArgumentSchema {
        options: &[
            required("name"),
            value("password"),
            flag("iscrypted"),
            flag("plaintext"),
            flag("lock"),
            value("groups"),
            value("homedir"),
            value("shell"),
            value("uid"),
            value("gecos"),
        ],
        positional: (0, 0),
        one_of: &["iscrypted", "plaintext"],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("keyboard", Capability::SystemSetting, Tier::Base).schema(
        ArgumentSchema {
            options: &[value("vckeymap"), value("xlayouts")],
            positional: (0, 1),
            one_of: &[],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("lang", Capability::SystemSetting, Tier::Base).schema(ArgumentSchema {
        options: &[value("addsupport")],
        positional: (1, 1),
        one_of: &[],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("selinux", Capability::SystemSetting, Tier::Base).schema(
        ArgumentSchema {
            options: &[flag("enforcing"), flag("permissive"), flag("disabled")],
            positional: (0, 0),
            one_of: &["enforcing", "permissive", "disabled"],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("logging", Capability::SystemSetting, Tier::Base).schema(
        ArgumentSchema {
            options: &[value("host"), value("port"), value("level")],
            positional: (0, 0),
            one_of: &[],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("timezone", Capability::SystemSetting, Tier::Base).schema(
        ArgumentSchema {
            options: &[flag("utc"), flag("isUtc"), flag("nontp"), value("ntpservers")],
            positional: (0, 1),
            one_of: &[],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("text", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("cmdline", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("skipx", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("install", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("reboot", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("poweroff", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("firstboot", Capability::Installer, Tier::Base).schema(INSTALLER),
    HandlerDescriptor::new("eula", Capability::Installer, Tier::Base).schema(INSTALLER),
    // Network tier
    HandlerDescriptor::new("network", Capability::Network, Tier::Network).schema(ArgumentSchema {
        options: &[
            value("bootproto"),
            value("device"),
            value("onboot"),
            value("ip"),
            value("netmask"),
            value("gateway"),
            value("nameserver"),
            value("hostname"),
            value("mtu"),
            value("ipv6"),
            flag("noipv6"),
            flag("activate"),
            flag("nodefroute"),
        ],
        positional: (0, 0),
        one_of: &[],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("url", Capability::Repo, Tier::Network).schema(ArgumentSchema {
        options: &[value("url"), value("mirrorlist"), value("proxy"), flag("noverifyssl")],
        positional: (0, 0),
        one_of: &["url", "mirrorlist"],
        allow_unknown: false,
    }),
    HandlerDescriptor::new("repo", Capability::Repo, Tier::Network).schema(ArgumentSchema {
        options: &[
            required("name"),
            value("baseurl"),
            value("mirrorlist"),
            value("cost"),
            value("includepkgs"),
            value("excludepkgs"),
            value("proxy"),
            flag("noverifyssl"),
            flag("install"),
        ],
        positional: (0, 0),
        one_of: &["baseurl", "mirrorlist"],
        allow_unknown: false,
    }),
    // Storage tier
    HandlerDescriptor::new("bootloader", Capability::Bootloader, Tier::Storage).schema(
        ArgumentSchema {
            options: &[
                value("location"),
                value("append"),
                value("timeout"),
                value("boot-drive"),
                value("driveorder"),
                value("password"),
                flag("iscrypted"),
                flag("leavebootorder"),
            ],
            positional: (0, 0),
            one_of: &[],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("zerombr", Capability::DiskPartition, Tier::Storage),
    HandlerDescriptor::new("clearpart", Capability::DiskPartition, Tier::Storage).schema(
        ArgumentSchema {
            options: &[
                flag("all"),
                flag("linux"),
                flag("none"),
                flag("initlabel"),
                value("drives"),
                value("disklabel"),
            ],
            positional: (0, 0),
            one_of: &["all", "linux", "none"],
            allow_unknown: false,
        },
    ),
    HandlerDescriptor::new("part", Capability::DiskPartition, Tier::Storage)
        .schema(ArgumentSchema {
            options: &[
                value("size"),
                value("maxsize"),
                value("fstype"),
                value("ondisk"),
                value("ondrive"),
                value("label"),
                value("fsoptions"),
                flag("grow"),
                flag("asprimary"),
                flag("noformat"),
            ],
            positional: (1, 1),
            one_of: &["ondisk", "ondrive"],
            allow_unknown: false,
        })
        .requires(&["clearpart"]),
    // Services tier
    HandlerDescriptor::new("services", Capability::ServiceSet, Tier::Services).schema(
        ArgumentSchema {
            options: &[value("enabled"), value("disabled")],
            positional: (0, 0),
            one_of: &[],
            allow_unknown: false,
        },
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_parser_vocabulary() {
        let registry = Registry::builtin();
        for keyword in kickstart::KEYWORDS {
            assert!(
                registry.lookup(keyword.name).is_ok(),
                "no handler for {}",
                keyword.name
            );
        }
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = Registry::builtin();
        let err = registry.lookup("autopart").unwrap_err();
        assert!(matches!(err, Error::UnknownDirective { ref name, .. } if name == "autopart"));
    }

    #[test]
    fn test_validate_reports_directive_line() {
        let registry = Registry::new();
        let mut directive = Directive::new("selinux");
        directive.line = 12;
        let err = registry.validate(&directive).unwrap_err();
        assert!(matches!(err, Error::UnknownDirective { line: 12, .. }));
    }

    #[test]
    fn test_missing_required_option() {
        let registry = Registry::builtin();
        let repo = Directive::new("repo").with_option("baseurl", "http://mirror/os");
        let err = registry.validate(&repo).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { ref key, .. } if key == "name"));
    }

    #[test]
    fn test_flag_with_value_is_malformed() {
        let registry = Registry::builtin();
        let d = Directive::new("selinux").with_option("enforcing", "yes");
        let err = registry.validate(&d).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument { ref key, ref reason, .. }
                if key == "enforcing" && reason.contains("does not take a value")
        ));
    }

    #[test]
    fn test_value_without_value_is_malformed() {
        let registry = Registry::builtin();
        let d = Directive::new("part").with_positional("/").with_flag("size");
        let err = registry.validate(&d).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { ref key, .. } if key == "size"));
    }

    #[test]
    fn test_unknown_option() {
        let registry = Registry::builtin();
        let d = Directive::new("network").with_option("bogus", "1");
        let err = registry.validate(&d).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument { ref reason, .. } if reason == "unknown option"
        ));
    }

    #[test]
    fn test_installer_directives_accept_anything() {
        let registry = Registry::builtin();
        let d = Directive::new("reboot").with_flag("eject").with_flag("kexec");
        assert_eq!(
            registry.validate(&d).unwrap().capability,
            Capability::Installer
        );
    }

    #[test]
    fn test_mutually_exclusive_options() {
        let registry = Registry::builtin();
        let d = Directive::new("selinux")
            .with_flag("enforcing")
            .with_flag("disabled");
        let err = registry.validate(&d).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument { ref reason, .. } if reason.contains("mutually exclusive")
        ));
    }

    #[test]
    fn test_positional_count() {
        let registry = Registry::builtin();
        let err = registry.validate(&Directive::new("lang")).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument { ref key, .. } if key == "<positional>"
        ));
        assert!(
            registry
                .validate(&Directive::new("lang").with_positional("en_US.UTF-8"))
                .is_ok()
        );
    }

    #[test]
    fn test_part_requires_clearpart() {
        let registry = Registry::builtin();
        let part = registry.lookup("part").unwrap();
        assert_eq!(part.requires, &["clearpart"]);
        assert_eq!(part.tier, Tier::Storage);
    }

    #[test]
    fn test_tier_order() {
        assert!(Tier::Base < Tier::Network);
        assert!(Tier::Network < Tier::Storage);
        assert!(Tier::Storage < Tier::Packages);
        assert!(Tier::Packages < Tier::Services);
        assert!(Tier::Services < Tier::PostScript);
    }
}
