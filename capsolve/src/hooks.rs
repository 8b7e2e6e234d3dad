//! Mutation points the context exposes between repository ranking and
//! caching.

use std::collections::HashSet;

use resgraph::{Capability, Requirement};

/// Vetoes candidates after ranking. Runs once per distinct requirement,
/// before the candidate list is cached; removal and reordering in place
/// are both allowed.
pub trait ResolverHook: Send + Sync {
    fn filter_matches(&self, requirement: &Requirement, candidates: &mut Vec<Capability>);
}

/// Observes and adjusts repository-stage candidates. `in_scope` is the
/// read-only first-stage set (system, self and mandatory capabilities)
/// already chosen for the requirement.
pub trait ResolutionCallback: Send + Sync {
    fn process_candidates(
        &self,
        requirement: &Requirement,
        in_scope: &HashSet<Capability>,
        candidates: &mut Vec<Capability>,
    );
}
