//! The resolution context: the surface the external solver talks to.
//!
//! One context serves exactly one resolve invocation. Configuration
//! happens on [`ContextBuilder`] before `build()`; the built context is
//! immutable apart from its internal caches and logs, all of which are
//! safe to hit from the solver's worker threads.

mod builder;
mod cache;
mod run;

pub use builder::ContextBuilder;
pub use run::RunContext;

use resgraph::{ns, Capability, Requirement, Resource};

use crate::solver::Wiring;

/// A capability declared by one resource but offered through a host, as
/// synthesized by the solver when it attaches fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedCapability {
    host: Resource,
    declared: Capability,
}

impl HostedCapability {
    pub fn new(host: Resource, declared: Capability) -> Self {
        HostedCapability { host, declared }
    }

    pub fn host(&self) -> &Resource {
        &self.host
    }

    pub fn declared(&self) -> &Capability {
        &self.declared
    }

    /// The capability as offered by the host.
    pub fn attached(&self) -> Capability {
        self.declared.rebind(&self.host)
    }
}

/// Candidate lookup surface consumed by the solver. Implementations must
/// hand out candidate lists best-first and stay consistent for the whole
/// solve (lookups are cached, never invalidated mid-resolution).
pub trait ResolveContext: Send + Sync {
    /// Ordered candidate capabilities for one requirement.
    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability>;

    /// Whether the requirement is live in the configured effective scopes.
    fn is_effective(&self, requirement: &Requirement) -> bool;

    /// Resources the solver must include: the input-requirements resource
    /// plus any explicitly declared roots.
    fn mandatory_resources(&self) -> Vec<Resource>;

    /// Inserts a hosted capability into an already-ranked candidate list,
    /// preserving repository-priority order. Returns the insertion index.
    fn insert_hosted_capability(
        &self,
        candidates: &mut Vec<Capability>,
        hosted: &HostedCapability,
    ) -> usize;

    /// Pre-existing wirings visible to ranking. Empty for a fresh resolve.
    fn wirings(&self) -> &Wiring;
}

/// Admission policy for repository-sourced candidates. A resource is not
/// permitted when it is itself a platform implementation (exports the
/// platform API package), lacks exactly one well-formed identity
/// capability, or is an execution-environment placeholder.
pub(crate) fn is_permitted(resource: &Resource) -> bool {
    for cap in resource.capabilities(Some(ns::PACKAGE)) {
        if cap.attributes().get_str(ns::PACKAGE) == Some(ns::PLATFORM_API_PACKAGE) {
            return false;
        }
    }

    let identities = resource.capabilities(Some(ns::IDENTITY));
    if identities.is_empty() {
        log::error!("[context] resource is missing an identity capability");
        return false;
    }
    if identities.len() > 1 {
        log::error!("[context] resource has more than one identity capability");
        return false;
    }
    let Some(name) = identities[0].attributes().get_str(ns::IDENTITY) else {
        log::error!("[context] resource identity capability is missing its name");
        return false;
    };

    !name.starts_with(ns::ENV_PREFIX)
}
