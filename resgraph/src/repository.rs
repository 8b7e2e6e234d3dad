//! Capability providers queried during the repository stage of candidate
//! search.

use std::collections::HashMap;

use crate::index::CapabilityIndex;
use crate::resource::{Capability, Requirement, Resource};

/// A source of candidate capabilities. Implementations answer batched
/// requirement lookups; admission policy and ranking happen in the caller.
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;

    /// Returns, for each requirement, the capabilities whose filter it
    /// satisfies. Requirements with no match may be absent from the map.
    fn find_providers(
        &self,
        requirements: &[Requirement],
    ) -> HashMap<Requirement, Vec<Capability>>;
}

/// In-memory repository over a fixed set of resources.
#[derive(Debug, Clone)]
pub struct ResourcesRepository {
    name: String,
    resources: Vec<Resource>,
    index: CapabilityIndex,
}

impl ResourcesRepository {
    pub fn new(name: impl Into<String>) -> Self {
        ResourcesRepository {
            name: name.into(),
            resources: Vec::new(),
            index: CapabilityIndex::new(),
        }
    }

    pub fn with_resources(
        name: impl Into<String>,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Self {
        let mut repo = ResourcesRepository::new(name);
        for resource in resources {
            repo.add(resource);
        }
        repo
    }

    pub fn add(&mut self, resource: Resource) {
        self.index.add_resource(&resource);
        self.resources.push(resource);
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Repository for ResourcesRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_providers(
        &self,
        requirements: &[Requirement],
    ) -> HashMap<Requirement, Vec<Capability>> {
        let mut result = HashMap::with_capacity(requirements.len());
        for req in requirements {
            let found = self.index.find_matching(req);
            log::debug!(
                "[repository:{}] {} candidate(s) for {}",
                self.name,
                found.len(),
                req
            );
            result.insert(req.clone(), found);
        }
        result
    }
}
