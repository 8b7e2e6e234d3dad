// Capsolve Library
// Resolution engine - context, orchestration, ordering and diagnosis

pub mod context;
pub mod diagnose;
pub mod error;
pub mod hooks;
pub mod order;
pub mod process;
pub mod rank;
pub mod report;
pub mod resolution;
pub mod solver;

// Re-export the engine surface
pub use crate::context::{ContextBuilder, HostedCapability, ResolveContext, RunContext};
pub use crate::diagnose::{
    diagnose, missing_chain, DeadlineExceeded, Diagnosis, DEFAULT_DIAGNOSIS_TIMEOUT,
};
pub use crate::error::ResolveError;
pub use crate::hooks::{ResolutionCallback, ResolverHook};
pub use crate::order::{RunOrder, StartLevels};
pub use crate::process::{resolve_required, RunSpec};
pub use crate::rank::{compare_candidates, RankView};
pub use crate::report::ResolutionFailure;
pub use crate::resolution::Resolution;
pub use crate::solver::{SolveError, Solver, Wiring};
