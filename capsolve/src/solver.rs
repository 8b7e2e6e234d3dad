//! External solver boundary.
//!
//! The constraint solver is a collaborator, not part of this crate: it is
//! handed a [`ResolveContext`] and must return a wiring or the set of
//! requirements it could not satisfy. The engine never looks inside it.

use std::fmt;

use indexmap::IndexMap;
use resgraph::{Requirement, Resource, Wire};

use crate::context::ResolveContext;

/// Requirer resource to its outgoing wires, as produced by a solver.
/// Insertion-ordered so downstream root discovery and reporting are
/// deterministic.
pub type Wiring = IndexMap<Resource, Vec<Wire>>;

/// Raised by a solver when the constraint problem has no solution.
#[derive(Debug, Clone)]
pub struct SolveError {
    unresolved: Vec<Requirement>,
}

impl SolveError {
    pub fn new(unresolved: Vec<Requirement>) -> Self {
        SolveError { unresolved }
    }

    pub fn unresolved(&self) -> &[Requirement] {
        &self.unresolved
    }

    pub fn into_unresolved(self) -> Vec<Requirement> {
        self.unresolved
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to satisfy {} requirement(s)",
            self.unresolved.len()
        )?;
        for req in &self.unresolved {
            write!(f, "\n  {req}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SolveError {}

/// The black-box constraint solver. Implementations may call back into the
/// context from worker threads, so the context surface is `Send + Sync`.
pub trait Solver: Send + Sync {
    fn resolve(&self, context: &dyn ResolveContext) -> Result<Wiring, SolveError>;
}
