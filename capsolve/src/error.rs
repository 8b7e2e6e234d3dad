//! Engine-level errors.

use resgraph::BuildError;
use thiserror::Error;

use crate::report::ResolutionFailure;

/// Everything [`resolve_required`](crate::process::resolve_required) can
/// fail with.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The solver found no solution; carries the diagnosed failure report.
    #[error(transparent)]
    Failed(#[from] ResolutionFailure),

    /// The run ingredients could not be frozen into a context.
    #[error("invalid resolve configuration: {0}")]
    Build(#[from] BuildError),
}

impl ResolveError {
    /// The failure report, when the error is a solver failure.
    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            ResolveError::Failed(failure) => Some(failure),
            ResolveError::Build(_) => None,
        }
    }
}
