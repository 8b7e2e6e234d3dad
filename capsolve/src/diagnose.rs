//! Root-cause diagnosis for failed resolves.
//!
//! The solver only names the requirements it gave up on; this module digs
//! for the deepest unsatisfiable requirement underneath each one. A
//! requirement is probed for providers, each provider's own mandatory
//! requirements are checked shallowly, and survivors are expanded through
//! an explicit frame stack (no recursion, so pathological graphs cannot
//! blow the call stack). The search runs against a fresh context so the
//! failing run's cache and logs stay untouched.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use resgraph::{Requirement, Resource};
use thiserror::Error;

use crate::context::ResolveContext;

/// Wall-clock budget for diagnosing one top-level requirement.
pub const DEFAULT_DIAGNOSIS_TIMEOUT: Duration = Duration::from_secs(1);

/// The deadline passed mid-search; the caller reports the original
/// failure unaugmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("diagnosis deadline exceeded")]
pub struct DeadlineExceeded;

/// Outcome of diagnosing a set of unresolved requirements: one chain per
/// requirement, from the requirement the solver flagged down to the
/// deepest unsatisfiable one.
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub chains: Vec<Vec<Requirement>>,
    pub timed_out: bool,
}

/// Diagnoses every unresolved requirement. When any search exceeds its
/// deadline the whole result falls back to the bare requirements.
pub fn diagnose(
    context: &dyn ResolveContext,
    unresolved: &[Requirement],
    timeout: Duration,
) -> Diagnosis {
    let mut chains = Vec::with_capacity(unresolved.len());
    for requirement in unresolved {
        match missing_chain(context, requirement, timeout) {
            Ok(Some(chain)) => chains.push(chain),
            Ok(None) => {
                log::debug!("[diagnose] no deeper cause found for {requirement}");
                chains.push(vec![requirement.clone()]);
            }
            Err(DeadlineExceeded) => {
                log::warn!("[diagnose] deadline exceeded, reporting requirements unaugmented");
                return Diagnosis {
                    chains: unresolved.iter().map(|r| vec![r.clone()]).collect(),
                    timed_out: true,
                };
            }
        }
    }
    Diagnosis {
        chains,
        timed_out: false,
    }
}

/// One in-flight requirement whose surviving providers are being expanded.
/// `survivors` holds each surviving resource's mandatory, effective
/// sub-requirements; `first_failure` the first failing path seen so far.
struct Frame {
    requirement: Requirement,
    survivors: Vec<Vec<Requirement>>,
    survivor_at: usize,
    sub_at: usize,
    first_failure: Option<Vec<Requirement>>,
}

enum Probe {
    /// The requirement's verdict is already known: `None` for satisfiable,
    /// `Some(chain)` for a failing path starting at it.
    Done(Option<Vec<Requirement>>),
    Expand(Frame),
}

/// Finds the chain of requirements from `requirement` down to the deepest
/// unsatisfiable one, or `None` when some provider subtree checks out
/// clean. `Err` means the deadline passed before an answer was found.
pub fn missing_chain(
    context: &dyn ResolveContext,
    requirement: &Requirement,
    timeout: Duration,
) -> Result<Option<Vec<Requirement>>, DeadlineExceeded> {
    let deadline = Instant::now() + timeout;
    let mut visited: HashSet<Resource> = HashSet::new();

    let root = match probe(context, requirement, &mut visited, deadline)? {
        Probe::Done(result) => return Ok(result),
        Probe::Expand(frame) => frame,
    };

    let mut frames = vec![root];
    // Verdict handed up from a finished sub-requirement: None for a clean
    // subtree, Some(chain) for a failing path.
    let mut verdict: Option<Option<Vec<Requirement>>> = None;

    loop {
        let Some(frame) = frames.last_mut() else {
            return Ok(verdict.flatten());
        };

        if let Some(result) = verdict.take() {
            match result {
                None => frame.sub_at += 1,
                Some(chain) => {
                    if frame.first_failure.is_none() {
                        frame.first_failure = Some(chain);
                    }
                    frame.survivor_at += 1;
                    frame.sub_at = 0;
                }
            }
        }

        if frame.survivor_at >= frame.survivors.len() {
            // Every survivor contributed a failure somewhere below.
            let mut chain = vec![frame.requirement.clone()];
            if let Some(rest) = frame.first_failure.take() {
                chain.extend(rest);
            }
            verdict = Some(Some(chain));
            frames.pop();
            continue;
        }

        if frame.sub_at >= frame.survivors[frame.survivor_at].len() {
            // This survivor's whole subtree checked out: the requirement
            // is satisfiable and the branch is clean.
            verdict = Some(None);
            frames.pop();
            continue;
        }

        let sub = frame.survivors[frame.survivor_at][frame.sub_at].clone();
        match probe(context, &sub, &mut visited, deadline)? {
            Probe::Done(result) => verdict = Some(result),
            Probe::Expand(child) => frames.push(child),
        }
    }
}

/// Probes one requirement: no providers means the requirement itself is
/// the cause; otherwise each unvisited provider is checked shallowly and
/// the survivors become a frame for the deep pass.
fn probe(
    context: &dyn ResolveContext,
    requirement: &Requirement,
    visited: &mut HashSet<Resource>,
    deadline: Instant,
) -> Result<Probe, DeadlineExceeded> {
    if Instant::now() >= deadline {
        return Err(DeadlineExceeded);
    }

    let providers = context.find_providers(requirement);
    if providers.is_empty() {
        return Ok(Probe::Done(Some(vec![requirement.clone()])));
    }

    let mut survivors: Vec<Vec<Requirement>> = Vec::new();
    let mut remembered: Option<Requirement> = None;
    for capability in providers {
        let resource = capability.resource().clone();
        if !visited.insert(resource.clone()) {
            continue;
        }
        let subs: Vec<Requirement> = resource
            .requirements(None)
            .into_iter()
            .filter(|sub| !sub.is_optional() && context.is_effective(sub))
            .collect();

        let mut missing = None;
        for sub in &subs {
            if Instant::now() >= deadline {
                return Err(DeadlineExceeded);
            }
            if context.find_providers(sub).is_empty() {
                missing = Some(sub.clone());
                break;
            }
        }
        match missing {
            Some(sub) => {
                if remembered.is_none() {
                    remembered = Some(sub);
                }
            }
            None => survivors.push(subs),
        }
    }

    if survivors.is_empty() {
        // All providers either failed shallowly or were already visited;
        // a shallow failure extends the chain, pure revisits are clean.
        let chain = remembered.map(|sub| vec![requirement.clone(), sub]);
        return Ok(Probe::Done(chain));
    }
    Ok(Probe::Expand(Frame {
        requirement: requirement.clone(),
        survivors,
        survivor_at: 0,
        sub_at: 0,
        first_failure: None,
    }))
}
