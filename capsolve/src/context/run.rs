//! The frozen resolution context handed to the solver.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use resgraph::{
    Capability, CapabilityIndex, Repository, Requirement, Resource, ResourceIdentity, Wire,
};

use crate::context::cache::{CacheKey, CandidateCache, PriorityMap};
use crate::context::{is_permitted, HostedCapability, ResolveContext};
use crate::hooks::{ResolutionCallback, ResolverHook};
use crate::rank::{compare_candidates, RankView};
use crate::solver::Wiring;

/// Everything the builder froze. Candidate state (cache, priorities,
/// failure log, optional discoveries) is created fresh here.
pub(crate) struct Frozen {
    pub(crate) system: Resource,
    pub(crate) input: Resource,
    pub(crate) repositories: Vec<Arc<dyn Repository>>,
    pub(crate) mandatory: Vec<Resource>,
    pub(crate) optional_roots: Vec<Resource>,
    pub(crate) blacklist: HashSet<Resource>,
    pub(crate) blacklist_identities: HashSet<ResourceIdentity>,
    pub(crate) effective_scopes: HashMap<String, HashSet<String>>,
    pub(crate) hooks: Vec<Arc<dyn ResolverHook>>,
    pub(crate) callbacks: Vec<Arc<dyn ResolutionCallback>>,
    pub(crate) preferences: Vec<String>,
    pub(crate) wirings: Wiring,
    pub(crate) optional_discovery: bool,
}

/// One resolve invocation's context. Immutable configuration, concurrent
/// internal state: the solver may call back from worker threads.
pub struct RunContext {
    system: Resource,
    input: Resource,
    system_index: CapabilityIndex,
    repositories: Vec<Arc<dyn Repository>>,
    mandatory: Vec<Resource>,
    optional_roots: Vec<Resource>,
    blacklist: HashSet<Resource>,
    blacklist_identities: HashSet<ResourceIdentity>,
    effective_scopes: HashMap<String, HashSet<String>>,
    hooks: Vec<Arc<dyn ResolverHook>>,
    callbacks: Vec<Arc<dyn ResolutionCallback>>,
    preferences: Vec<String>,
    wirings: Wiring,
    optional_discovery: bool,
    cache: CandidateCache,
    priorities: PriorityMap,
    failed: Mutex<Vec<Requirement>>,
    discovered: Mutex<IndexMap<Resource, Vec<Wire>>>,
}

impl RunContext {
    pub(crate) fn new(frozen: Frozen) -> Self {
        let mut system_index = CapabilityIndex::new();
        system_index.add_resource(&frozen.system);
        RunContext {
            system: frozen.system,
            input: frozen.input,
            system_index,
            repositories: frozen.repositories,
            mandatory: frozen.mandatory,
            optional_roots: frozen.optional_roots,
            blacklist: frozen.blacklist,
            blacklist_identities: frozen.blacklist_identities,
            effective_scopes: frozen.effective_scopes,
            hooks: frozen.hooks,
            callbacks: frozen.callbacks,
            preferences: frozen.preferences,
            wirings: frozen.wirings,
            optional_discovery: frozen.optional_discovery,
            cache: CandidateCache::new(),
            priorities: PriorityMap::new(),
            failed: Mutex::new(Vec::new()),
            discovered: Mutex::new(IndexMap::new()),
        }
    }

    pub fn system_resource(&self) -> &Resource {
        &self.system
    }

    pub fn input_resource(&self) -> &Resource {
        &self.input
    }

    /// Requirements for which no candidate was found, in lookup order.
    pub fn failed_requirements(&self) -> Vec<Requirement> {
        self.failed.lock().unwrap().clone()
    }

    /// Optional candidates recorded by the discovery side channel, keyed
    /// by candidate resource with the wires that would satisfy them.
    pub fn discovered_optional(&self) -> IndexMap<Resource, Vec<Wire>> {
        self.discovered.lock().unwrap().clone()
    }

    fn is_blacklisted(&self, resource: &Resource) -> bool {
        self.blacklist.contains(resource)
            || resource
                .identity()
                .map_or(false, |id| self.blacklist_identities.contains(id))
    }

    fn is_optional_root(&self, resource: &Resource) -> bool {
        self.optional_roots
            .iter()
            .any(|root| root == resource || root.same_identity(resource))
    }

    fn is_preferred(&self, resource: &Resource) -> bool {
        resource
            .identity()
            .map_or(false, |id| self.preferences.iter().any(|p| *p == id.name))
    }

    fn compute_providers(&self, requirement: &Requirement) -> Vec<Capability> {
        // First stage: the system resource always gets the first chance,
        // then the requirement's own resource, then every mandatory
        // resource. Hooks and preferences never reorder this stage.
        let mut first_stage: Vec<Capability> = Vec::new();
        self.system_index.append_matching(requirement, &mut first_stage);
        if let Some(owner) = requirement.resource() {
            append_self_matching(owner, requirement, &mut first_stage);
        }
        for resource in &self.mandatory {
            append_self_matching(resource, requirement, &mut first_stage);
        }

        let view = RankView::new(&self.system, &self.wirings, &self.mandatory);
        let mut result = first_stage.clone();
        result.sort_by(|a, b| compare_candidates(&view, a, b));

        let from_optional_root = requirement
            .resource()
            .map_or(false, |owner| self.is_optional_root(owner));
        if !requirement.is_optional() || from_optional_root {
            let wired: HashSet<Capability> = first_stage.into_iter().collect();
            let mut repo_stage = self.providers_from_repositories(requirement, &wired, &view);
            repo_stage.retain(|cap| !result.contains(cap));
            result.extend(repo_stage);
        } else if self.optional_discovery && result.is_empty() && self.is_effective(requirement)
        {
            // Optional requirements outside the root set never expand the
            // solver's search space, but phase 2 still probes the
            // repositories so satisfiable optionals can be reported.
            let probed =
                self.providers_from_repositories(requirement, &HashSet::new(), &view);
            self.record_discovered(requirement, probed);
        }
        result
    }

    /// Repository stage: query in registration order, admit by blacklist,
    /// permission and effectiveness, rank, then run the mutation points.
    fn providers_from_repositories(
        &self,
        requirement: &Requirement,
        wired: &HashSet<Capability>,
        view: &RankView<'_>,
    ) -> Vec<Capability> {
        let mut batch: Vec<Capability> = Vec::new();
        let single = std::slice::from_ref(requirement);
        for (order, repository) in self.repositories.iter().enumerate() {
            let found = repository
                .find_providers(single)
                .remove(requirement)
                .unwrap_or_default();
            for capability in found {
                let resource = capability.resource();
                if self.is_blacklisted(resource) {
                    log::debug!("[context] skipping blacklisted {resource}");
                    continue;
                }
                if !is_permitted(resource) || !capability.effective_in(requirement) {
                    continue;
                }
                if !batch.contains(&capability) {
                    self.priorities.record(resource, order);
                    batch.push(capability);
                }
            }
        }
        batch.sort_by(|a, b| compare_candidates(view, a, b));
        self.post_process(requirement, wired, &mut batch);
        batch
    }

    /// Hooks, then preferences, then callbacks. Callbacks are skipped when
    /// a preference fired.
    fn post_process(
        &self,
        requirement: &Requirement,
        wired: &HashSet<Capability>,
        candidates: &mut Vec<Capability>,
    ) {
        if candidates.is_empty() {
            return;
        }

        for hook in &self.hooks {
            hook.filter_matches(requirement, candidates);
        }

        let mut preference_fired = false;
        if !self.preferences.is_empty() {
            let mut preferred = Vec::new();
            let mut rest = Vec::new();
            for capability in candidates.drain(..) {
                if self.is_preferred(capability.resource()) {
                    preferred.push(capability);
                } else {
                    rest.push(capability);
                }
            }
            preference_fired = !preferred.is_empty();
            candidates.extend(preferred);
            candidates.extend(rest);
        }

        if !preference_fired {
            for callback in &self.callbacks {
                callback.process_candidates(requirement, wired, candidates);
            }
        }
    }

    fn record_discovered(&self, requirement: &Requirement, candidates: Vec<Capability>) {
        if candidates.is_empty() {
            return;
        }
        let mut discovered = self.discovered.lock().unwrap();
        for capability in candidates {
            let resource = capability.resource().clone();
            let wire = match Wire::new(requirement.clone(), capability) {
                Ok(wire) => wire,
                Err(err) => {
                    log::debug!("[context] not recording optional discovery: {err}");
                    continue;
                }
            };
            let wires = discovered.entry(resource).or_default();
            if !wires.contains(&wire) {
                wires.push(wire);
            }
        }
    }
}

impl ResolveContext for RunContext {
    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability> {
        let key = CacheKey::of(requirement);
        let result = match self.cache.lookup(&key) {
            Some(cached) => cached,
            None => {
                let computed = self.compute_providers(requirement);
                self.cache.store_first(key, computed)
            }
        };
        log::debug!("[context] {} candidate(s) for {requirement}", result.len());
        if result.is_empty() {
            self.failed.lock().unwrap().push(requirement.clone());
        }
        result
    }

    fn is_effective(&self, requirement: &Requirement) -> bool {
        let scope = requirement.effective_scope();
        if scope == resgraph::ns::EFFECTIVE_RESOLVE {
            return true;
        }
        match self.effective_scopes.get(scope) {
            Some(excluded) => !excluded.contains(requirement.namespace()),
            None => false,
        }
    }

    fn mandatory_resources(&self) -> Vec<Resource> {
        self.mandatory.clone()
    }

    fn insert_hosted_capability(
        &self,
        candidates: &mut Vec<Capability>,
        hosted: &HostedCapability,
    ) -> usize {
        // Hosted capabilities with no recorded priority are treated as
        // most preferred; unprioritized list entries as least preferred.
        let priority = self.priorities.get(hosted.host()).unwrap_or(0);
        for index in 0..candidates.len() {
            let other = self
                .priorities
                .get(candidates[index].resource())
                .unwrap_or(usize::MAX);
            if other > priority {
                candidates.insert(index, hosted.attached());
                return index;
            }
        }
        candidates.push(hosted.attached());
        candidates.len() - 1
    }

    fn wirings(&self) -> &Wiring {
        &self.wirings
    }
}

fn append_self_matching(resource: &Resource, requirement: &Requirement, out: &mut Vec<Capability>) {
    for capability in resource.capabilities(Some(requirement.namespace())) {
        if requirement.matches(&capability)
            && capability.effective_in(requirement)
            && !out.contains(&capability)
        {
            out.push(capability);
        }
    }
}
