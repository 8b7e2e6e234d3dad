//! Human-readable resolution failure reports.

use std::fmt;

use resgraph::Requirement;

/// A failed resolve, augmented by diagnosis: one requirement chain per
/// unresolved mandatory requirement (from the requirement the solver
/// flagged down to the deepest unsatisfiable one), plus the unresolved
/// optional requirements reported separately.
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    root: String,
    chains: Vec<Vec<Requirement>>,
    optional: Vec<Requirement>,
    timed_out: bool,
}

impl ResolutionFailure {
    pub fn new(
        root: impl Into<String>,
        chains: Vec<Vec<Requirement>>,
        optional: Vec<Requirement>,
        timed_out: bool,
    ) -> Self {
        ResolutionFailure {
            root: root.into(),
            chains,
            optional,
            timed_out,
        }
    }

    /// The requirement chains, deepest cause last in each.
    pub fn chains(&self) -> &[Vec<Requirement>] {
        &self.chains
    }

    /// The requirements the solver reported as unresolved (the head of
    /// each chain).
    pub fn unresolved(&self) -> Vec<Requirement> {
        self.chains
            .iter()
            .filter_map(|chain| chain.first().cloned())
            .collect()
    }

    pub fn optional(&self) -> &[Requirement] {
        &self.optional
    }

    /// True when diagnosis hit its deadline and the chains are the
    /// solver's requirements unaugmented.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Renders the report; the optional section can be suppressed.
    pub fn render(&self, include_optionals: bool) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(format!("Unable to resolve {}:", self.root));
        lines.push("Capabilities satisfying the following requirements could not be found:".to_string());
        for chain in &self.chains {
            lines.push(format!("    [{}]", self.owner_label(chain.first())));
            for (depth, requirement) in chain.iter().enumerate() {
                lines.push(format!("{}\u{21d2} {requirement}", " ".repeat(6 + depth * 4)));
            }
        }
        if include_optionals && !self.optional.is_empty() {
            lines.push("The following requirements are optional:".to_string());
            for requirement in &self.optional {
                lines.push(format!(
                    "    [{}]",
                    self.owner_label(Some(requirement))
                ));
                lines.push(format!("      \u{21d2} {requirement}"));
            }
        }
        lines.join("\n")
    }

    fn owner_label(&self, requirement: Option<&Requirement>) -> String {
        requirement
            .and_then(|req| req.resource())
            .and_then(|resource| resource.identity())
            .map(|id| id.name.clone())
            .unwrap_or_else(|| self.root.clone())
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl std::error::Error for ResolutionFailure {}
