//! Execution planner - validates a document and orders it into tiers

use crate::error::{Error, Result};
use crate::registry::{Capability, Registry, Tier};
use kickstart::{Directive, PackageList, PostScript, ProvisioningDocument};
use serde::Serialize;

/// One unit of work
///
/// Serialized directives have their secrets masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Directive(#[serde(serialize_with = "serialize_redacted")] Directive),
    Packages(PackageList),
    PostScript(PostScript),
}

impl Step {
    /// Identifier used in progress output and the audit log
    pub fn id(&self) -> String {
        match self {
            Step::Directive(d) => d.id(),
            Step::Packages(p) => format!("packages#{}", p.position),
            Step::PostScript(s) => format!("post#{}", s.position),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Step::Directive(d) => match d.label() {
                Some(first) => format!("{} {}", d.name, first),
                None => d.name.clone(),
            },
            Step::Packages(p) => format!(
                "{} package(s), {} excluded",
                p.install.len(),
                p.exclude.len()
            ),
            Step::PostScript(s) => format!("%post ({} line(s), {})", s.body.len(), s.interpreter()),
        }
    }

    /// Source line of the directive or block header
    pub fn line(&self) -> usize {
        match self {
            Step::Directive(d) => d.line,
            Step::Packages(p) => p.line,
            Step::PostScript(s) => s.line,
        }
    }
}

fn serialize_redacted<S>(directive: &Directive, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    directive.redacted().serialize(serializer)
}

/// A step with the placement the registry assigned it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: Step,
    pub capability: Capability,
    pub tier: Tier,
    /// Ordinal in the source document
    pub position: usize,
}

/// Steps in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a document and order its steps
    ///
    /// Every check runs here, so a document that fails any of them never
    /// reaches an invoker:
    /// - document invariants (package conflicts)
    /// - registry lookup and argument schema of every directive
    /// - required predecessors
    ///
    /// Steps are sorted by tier, then by document position.
    pub fn build(document: &ProvisioningDocument, registry: &Registry) -> Result<Self> {
        document.validate()?;

        let mut steps = Vec::with_capacity(document.directives.len() + 2);
        for directive in &document.directives {
            let descriptor = registry.validate(directive)?;
            check_requires(document, directive, descriptor.tier, descriptor.requires, registry)?;
            steps.push(PlannedStep {
                step: Step::Directive(directive.clone()),
                capability: descriptor.capability,
                tier: descriptor.tier,
                position: directive.position,
            });
        }

        if let Some(packages) = &document.packages {
            steps.push(PlannedStep {
                step: Step::Packages(packages.clone()),
                capability: Capability::PackageInstall,
                tier: Tier::Packages,
                position: packages.position,
            });
        }

        if let Some(script) = &document.post_script {
            steps.push(PlannedStep {
                step: Step::PostScript(script.clone()),
                capability: Capability::Shell,
                tier: Tier::PostScript,
                position: script.position,
            });
        }

        // Stable: ties keep document order
        steps.sort_by_key(|s| (s.tier, s.position));

        log::debug!("Planned {} step(s)", steps.len());
        Ok(Self { steps })
    }

    /// Consecutive runs of steps sharing a tier
    pub fn tiers(&self) -> impl Iterator<Item = (Tier, &[PlannedStep])> {
        self.steps
            .chunk_by(|a, b| a.tier == b.tier)
            .map(|chunk| (chunk[0].tier, chunk))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step ids in execution order
    pub fn ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.step.id()).collect()
    }
}

fn check_requires(
    document: &ProvisioningDocument,
    directive: &Directive,
    tier: Tier,
    requires: &[&str],
    registry: &Registry,
) -> Result<()> {
    let unsatisfiable = |reason: String| Error::CyclicOrUnsatisfiableDependency {
        directive: directive.name.clone(),
        line: directive.line,
        reason,
    };

    for &required in requires {
        // A predecessor scheduled in a later tier can never run first
        if let Ok(predecessor) = registry.lookup(required)
            && predecessor.tier > tier
        {
            return Err(unsatisfiable(format!(
                "requires '{required}', which runs in the later {} tier",
                predecessor.tier
            )));
        }

        match document.find(required) {
            None => {
                return Err(unsatisfiable(format!("requires a preceding '{required}'")));
            }
            Some(found) if found.position > directive.position => {
                return Err(unsatisfiable(format!(
                    "requires a preceding '{required}' (found after it on line {})",
                    found.line
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
