//! Concurrent candidate cache and repository-priority map.
//!
//! Both structures may be hit from the solver's worker threads, so they
//! are `DashMap`-backed and never expose references into their entries.

use dashmap::DashMap;

use resgraph::{Attrs, Capability, Directives, Requirement, Resource, ResourceIdentity};

/// Structural signature of a requirement. Two syntactically distinct
/// requirement objects with the same signature share one cache entry, so
/// the owner is keyed by semantic identity rather than instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    namespace: String,
    directives: Directives,
    attributes: Attrs,
    owner: Option<ResourceIdentity>,
}

impl CacheKey {
    pub(crate) fn of(requirement: &Requirement) -> CacheKey {
        CacheKey {
            namespace: requirement.namespace().to_string(),
            directives: requirement.directives().clone(),
            attributes: requirement.attributes().clone(),
            owner: requirement
                .resource()
                .and_then(|r| r.identity().cloned()),
        }
    }
}

/// Memoized candidate lists. Entries are immutable once stored; lookups
/// hand out fresh clones so callers can mutate their copy freely.
#[derive(Debug, Default)]
pub(crate) struct CandidateCache {
    entries: DashMap<CacheKey, Vec<Capability>>,
}

impl CandidateCache {
    pub(crate) fn new() -> Self {
        CandidateCache::default()
    }

    pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Vec<Capability>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Stores `candidates` unless another thread won the race, and returns
    /// a copy of whichever list the cache now holds.
    pub(crate) fn store_first(&self, key: CacheKey, candidates: Vec<Capability>) -> Vec<Capability> {
        self.entries.entry(key).or_insert(candidates).clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Repository registration index per candidate resource. First writer
/// wins: a resource offered by several repositories keeps the index of
/// the first one that offered it.
#[derive(Debug, Default)]
pub(crate) struct PriorityMap {
    entries: DashMap<Resource, usize>,
}

impl PriorityMap {
    pub(crate) fn new() -> Self {
        PriorityMap::default()
    }

    pub(crate) fn record(&self, resource: &Resource, priority: usize) {
        self.entries.entry(resource.clone()).or_insert(priority);
    }

    pub(crate) fn get(&self, resource: &Resource) -> Option<usize> {
        self.entries.get(resource).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use resgraph::{RequirementBuilder, ResourceBuilder, Version};

    #[test]
    fn structurally_identical_requirements_share_a_key() {
        let a = RequirementBuilder::package("org.example.api", None).build_detached();
        let b = RequirementBuilder::package("org.example.api", None).build_detached();
        assert_eq!(CacheKey::of(&a), CacheKey::of(&b));
    }

    #[test]
    fn directives_distinguish_keys() {
        let a = RequirementBuilder::package("org.example.api", None).build_detached();
        let b = RequirementBuilder::package("org.example.api", None)
            .optional()
            .build_detached();
        assert_ne!(CacheKey::of(&a), CacheKey::of(&b));
    }

    #[test]
    fn owners_with_equal_identity_share_a_key() {
        let r1 = ResourceBuilder::new()
            .identity("app", Version::new(1, 0, 0))
            .import_package("p", None)
            .build()
            .unwrap();
        let r2 = ResourceBuilder::new()
            .identity("app", Version::new(1, 0, 0))
            .import_package("p", None)
            .build()
            .unwrap();
        let key1 = CacheKey::of(&r1.requirements(None)[0]);
        let key2 = CacheKey::of(&r2.requirements(None)[0]);
        assert_eq!(key1, key2);
    }

    #[test]
    fn lookup_returns_independent_copies() {
        let provider = ResourceBuilder::new()
            .identity("lib", Version::new(1, 0, 0))
            .export_package("p", Version::new(1, 0, 0), "lib", Version::new(1, 0, 0))
            .build()
            .unwrap();
        let cache = CandidateCache::new();
        let req = RequirementBuilder::package("p", None).build_detached();
        let key = CacheKey::of(&req);
        cache.store_first(key.clone(), provider.capabilities(Some("package")));

        let mut first = cache.lookup(&key).unwrap();
        first.clear();
        let second = cache.lookup(&key).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn first_stored_list_wins() {
        let provider = ResourceBuilder::new()
            .identity("lib", Version::new(1, 0, 0))
            .export_package("p", Version::new(1, 0, 0), "lib", Version::new(1, 0, 0))
            .build()
            .unwrap();
        let cache = CandidateCache::new();
        let req = RequirementBuilder::package("p", None).build_detached();
        let key = CacheKey::of(&req);

        cache.store_first(key.clone(), provider.capabilities(Some("package")));
        let raced = cache.store_first(key.clone(), Vec::new());
        assert_eq!(raced.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn priority_keeps_first_writer() {
        let r = ResourceBuilder::new()
            .identity("lib", Version::new(1, 0, 0))
            .build()
            .unwrap();
        let priorities = PriorityMap::new();
        priorities.record(&r, 2);
        priorities.record(&r, 0);
        assert_eq!(priorities.get(&r), Some(2));
    }
}
