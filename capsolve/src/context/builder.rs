//! Build-then-freeze configuration for [`RunContext`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use resgraph::{
    ns, BuildError, CapabilityBuilder, Repository, RequirementBuilder, Resource,
    ResourceBuilder, ResourceIdentity, Version,
};

use crate::context::run::{Frozen, RunContext};
use crate::hooks::{ResolutionCallback, ResolverHook};
use crate::solver::Wiring;

/// Accumulates everything one resolve invocation needs, then freezes it
/// into an immutable [`RunContext`]. Cloneable so the orchestrator can
/// derive the phase-2 and diagnosis contexts from the same ingredients.
#[derive(Clone, Default)]
pub struct ContextBuilder {
    root_requirements: Vec<RequirementBuilder>,
    input_resource: Option<Resource>,
    system_resource: Option<Resource>,
    system_capabilities: Vec<CapabilityBuilder>,
    repositories: Vec<Arc<dyn Repository>>,
    mandatory: Vec<Resource>,
    optional_roots: Vec<Resource>,
    blacklist_resources: Vec<Resource>,
    blacklist_requirements: Vec<RequirementBuilder>,
    effective_scopes: HashMap<String, HashSet<String>>,
    hooks: Vec<Arc<dyn ResolverHook>>,
    callbacks: Vec<Arc<dyn ResolutionCallback>>,
    preferences: Vec<String>,
    wirings: Wiring,
    optional_discovery: bool,
}

impl ContextBuilder {
    pub fn new() -> Self {
        ContextBuilder::default()
    }

    /// Adds a root requirement; these become the requirements of the
    /// synthetic input resource.
    pub fn with_root_requirement(mut self, requirement: RequirementBuilder) -> Self {
        self.root_requirements.push(requirement);
        self
    }

    /// Reuses an already-built input resource instead of composing one
    /// from root requirements (phase 2 shares phase 1's instance).
    pub fn with_input_resource(mut self, resource: Resource) -> Self {
        self.input_resource = Some(resource);
        self
    }

    /// Reuses an already-built system resource.
    pub fn with_system_resource(mut self, resource: Resource) -> Self {
        self.system_resource = Some(resource);
        self
    }

    /// Adds a capability to the synthesized system resource (platform
    /// packages, execution-environment facts and the like).
    pub fn with_system_capability(mut self, capability: CapabilityBuilder) -> Self {
        self.system_capabilities.push(capability);
        self
    }

    /// Registers a repository; registration order is query order and
    /// defines candidate priority.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Declares an additional mandatory resource (the input resource is
    /// always mandatory).
    pub fn with_mandatory_resource(mut self, resource: Resource) -> Self {
        self.mandatory.push(resource);
        self
    }

    /// Marks a resource as an optional root: its optional requirements
    /// get the full repository search instead of in-scope-only matching.
    pub fn with_optional_root(mut self, resource: Resource) -> Self {
        self.optional_roots.push(resource);
        self
    }

    pub fn with_optional_roots(mut self, roots: impl IntoIterator<Item = Resource>) -> Self {
        self.optional_roots.extend(roots);
        self
    }

    /// Excludes a specific resource from candidacy.
    pub fn with_blacklisted_resource(mut self, resource: Resource) -> Self {
        self.blacklist_resources.push(resource);
        self
    }

    /// Excludes every resource matching this requirement; matches are
    /// computed against the repositories once, during `build()`.
    pub fn with_blacklist_requirement(mut self, requirement: RequirementBuilder) -> Self {
        self.blacklist_requirements.push(requirement);
        self
    }

    /// Also treats requirements with this `effective` directive value as
    /// effective.
    pub fn with_effective_scope(mut self, scope: impl Into<String>) -> Self {
        self.effective_scopes.insert(scope.into(), HashSet::new());
        self
    }

    /// Like [`with_effective_scope`](Self::with_effective_scope), but the
    /// scope does not apply to the given namespaces.
    pub fn with_effective_scope_excluding(
        mut self,
        scope: impl Into<String>,
        excluded_namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.effective_scopes.insert(
            scope.into(),
            excluded_namespaces.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_resolver_hook(mut self, hook: Arc<dyn ResolverHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResolutionCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Prefers candidates whose identity name matches; preferred
    /// candidates move to the front of the repository stage.
    pub fn with_preference(mut self, identity_name: impl Into<String>) -> Self {
        self.preferences.push(identity_name.into());
        self
    }

    pub fn with_preferences(
        mut self,
        identity_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.preferences
            .extend(identity_names.into_iter().map(Into::into));
        self
    }

    /// Seeds pre-existing wirings; resources present there outrank fresh
    /// candidates.
    pub fn with_wirings(mut self, wirings: Wiring) -> Self {
        self.wirings = wirings;
        self
    }

    /// Enables the phase-2 side channel: optional requirements outside
    /// the root set that find nothing in scope are probed against the
    /// repositories and recorded, without becoming solver-visible.
    pub fn with_optional_discovery(mut self, enabled: bool) -> Self {
        self.optional_discovery = enabled;
        self
    }

    /// Derives the ingredients for a later phase of the same run: identical
    /// configuration, but reusing already-built input and system instances
    /// instead of composing fresh ones.
    pub(crate) fn rebased_on(mut self, input: Resource, system: Resource) -> Self {
        self.root_requirements.clear();
        self.system_capabilities.clear();
        self.input_resource = Some(input);
        self.system_resource = Some(system);
        self
    }

    pub fn build(self) -> Result<RunContext, BuildError> {
        let input = match self.input_resource {
            Some(resource) => resource,
            None => {
                let mut builder = ResourceBuilder::new().capability(
                    CapabilityBuilder::new(ns::IDENTITY)
                        .attribute(ns::IDENTITY, ns::IDENTITY_INITIAL),
                );
                for requirement in self.root_requirements {
                    builder = builder.requirement(requirement);
                }
                builder.build()?
            }
        };

        let system = match self.system_resource {
            Some(resource) => {
                if !self.system_capabilities.is_empty() {
                    log::warn!(
                        "[context] system resource override set; ignoring {} extra system capabilities",
                        self.system_capabilities.len()
                    );
                }
                resource
            }
            None => {
                let mut builder = ResourceBuilder::new().identity_typed(
                    ns::IDENTITY_SYSTEM,
                    Version::lowest(),
                    ns::TYPE_ENVIRONMENT,
                );
                for capability in self.system_capabilities {
                    builder = builder.capability(capability);
                }
                builder.build()?
            }
        };

        let mut blacklist: HashSet<Resource> = self.blacklist_resources.into_iter().collect();
        if !self.blacklist_requirements.is_empty() {
            let reject: Vec<resgraph::Requirement> = self
                .blacklist_requirements
                .into_iter()
                .map(RequirementBuilder::build_detached)
                .collect();
            for repository in &self.repositories {
                for capabilities in repository.find_providers(&reject).values() {
                    for capability in capabilities {
                        blacklist.insert(capability.resource().clone());
                    }
                }
            }
        }
        let blacklist_identities: HashSet<ResourceIdentity> = blacklist
            .iter()
            .filter_map(|resource| resource.identity().cloned())
            .collect();

        let mut mandatory = Vec::with_capacity(1 + self.mandatory.len());
        mandatory.push(input.clone());
        for resource in self.mandatory {
            if !mandatory.contains(&resource) {
                mandatory.push(resource);
            }
        }

        log::debug!(
            "[context] frozen: {} repositories, {} mandatory, {} blacklisted, optional discovery {}",
            self.repositories.len(),
            mandatory.len(),
            blacklist.len(),
            self.optional_discovery
        );

        Ok(RunContext::new(Frozen {
            system,
            input,
            repositories: self.repositories,
            mandatory,
            optional_roots: self.optional_roots,
            blacklist,
            blacklist_identities,
            effective_scopes: self.effective_scopes,
            hooks: self.hooks,
            callbacks: self.callbacks,
            preferences: self.preferences,
            wirings: self.wirings,
            optional_discovery: self.optional_discovery,
        }))
    }
}
