//! Resources, capabilities, requirements and wires.
//!
//! A [`Resource`] is a shared immutable handle; cloning it clones an `Arc`.
//! Map and set membership use *instance* identity (two loads of the same
//! artifact from different repositories are distinct instances), while
//! ranking and deduplication go through the precomputed *semantic*
//! identity, the (name, version) pair from the resource's `identity`
//! capability.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::{Filter, FilterError};
use crate::ns;
use crate::value::{Attrs, Directives};
use crate::version::Version;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cannot wire a detached requirement ({0})")]
    DetachedRequirement(String),
}

/// Semantic identity: the (name, version) pair two distinct instances of
/// the same artifact share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub name: String,
    pub version: Version,
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Shared payload of one capability or requirement.
#[derive(Debug)]
pub(crate) struct CapReqData {
    pub(crate) namespace: String,
    pub(crate) attributes: Attrs,
    pub(crate) directives: Directives,
    /// Parsed `filter` directive, computed on first use.
    parsed_filter: OnceCell<Option<Result<Filter, FilterError>>>,
}

impl CapReqData {
    pub(crate) fn new(namespace: String, attributes: Attrs, directives: Directives) -> Self {
        CapReqData {
            namespace,
            attributes,
            directives,
            parsed_filter: OnceCell::new(),
        }
    }

    fn filter(&self) -> Option<&Result<Filter, FilterError>> {
        self.parsed_filter
            .get_or_init(|| {
                self.directives.get(ns::DIRECTIVE_FILTER).map(|text| {
                    let parsed = Filter::parse(text);
                    if let Err(err) = &parsed {
                        log::warn!("[model] unparseable filter '{text}': {err}");
                    }
                    parsed
                })
            })
            .as_ref()
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace
            && self.attributes == other.attributes
            && self.directives == other.directives
    }

    fn content_hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.attributes.hash(state);
        self.directives.hash(state);
    }
}

struct ResourceInner {
    capabilities: Vec<Arc<CapReqData>>,
    requirements: Vec<Arc<CapReqData>>,
    identity: Option<ResourceIdentity>,
}

/// An immutable bundle of capabilities and requirements.
#[derive(Clone)]
pub struct Resource(Arc<ResourceInner>);

impl Resource {
    pub(crate) fn from_parts(
        capabilities: Vec<Arc<CapReqData>>,
        requirements: Vec<Arc<CapReqData>>,
        identity: Option<ResourceIdentity>,
    ) -> Self {
        Resource(Arc::new(ResourceInner {
            capabilities,
            requirements,
            identity,
        }))
    }

    /// Semantic identity, when the resource carries an identity capability.
    pub fn identity(&self) -> Option<&ResourceIdentity> {
        self.0.identity.as_ref()
    }

    /// True when both resources carry the same (name, version) identity.
    pub fn same_identity(&self, other: &Resource) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Capabilities, optionally restricted to one namespace.
    pub fn capabilities(&self, namespace: Option<&str>) -> Vec<Capability> {
        self.0
            .capabilities
            .iter()
            .filter(|data| namespace.map_or(true, |ns| data.namespace == ns))
            .map(|data| Capability {
                owner: self.clone(),
                data: Arc::clone(data),
            })
            .collect()
    }

    /// Requirements, optionally restricted to one namespace.
    pub fn requirements(&self, namespace: Option<&str>) -> Vec<Requirement> {
        self.0
            .requirements
            .iter()
            .filter(|data| namespace.map_or(true, |ns| data.namespace == ns))
            .map(|data| Requirement {
                owner: Some(self.clone()),
                data: Arc::clone(data),
            })
            .collect()
    }

    pub fn capability_count(&self) -> usize {
        self.0.capabilities.len()
    }

    pub fn requirement_count(&self) -> usize {
        self.0.requirements.len()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resource({} caps={} reqs={})",
            self,
            self.0.capabilities.len(),
            self.0.requirements.len()
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity() {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "<anonymous>"),
        }
    }
}

/// A capability handle: what one resource offers under one namespace.
#[derive(Clone)]
pub struct Capability {
    owner: Resource,
    data: Arc<CapReqData>,
}

impl Capability {
    pub fn namespace(&self) -> &str {
        &self.data.namespace
    }

    pub fn attributes(&self) -> &Attrs {
        &self.data.attributes
    }

    pub fn directives(&self) -> &Directives {
        &self.data.directives
    }

    pub fn resource(&self) -> &Resource {
        &self.owner
    }

    /// The `version` attribute, when present and well formed.
    pub fn version_attr(&self) -> Option<Version> {
        self.data.attributes.get_version(ns::ATTR_VERSION)
    }

    /// Rebinds the capability to a host resource (fragment attachment):
    /// same declared payload, different providing resource.
    pub fn rebind(&self, host: &Resource) -> Capability {
        Capability {
            owner: host.clone(),
            data: Arc::clone(&self.data),
        }
    }

    /// Capability-side effectiveness: live when the capability declares no
    /// `effective` directive, declares `resolve`, or declares the same
    /// scope as the requirement.
    pub fn effective_in(&self, requirement: &Requirement) -> bool {
        match self.data.directives.get(ns::DIRECTIVE_EFFECTIVE) {
            None => true,
            Some(scope) => {
                scope == ns::EFFECTIVE_RESOLVE || scope == requirement.effective_scope()
            }
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && (Arc::ptr_eq(&self.data, &other.data) || self.data.content_eq(&other.data))
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.data.content_hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({self})")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.data.namespace, self.data.attributes)
    }
}

/// A requirement handle. Synthetic requirements built outside any resource
/// have no owner.
#[derive(Clone)]
pub struct Requirement {
    owner: Option<Resource>,
    data: Arc<CapReqData>,
}

impl Requirement {
    pub(crate) fn from_data(owner: Option<Resource>, data: Arc<CapReqData>) -> Self {
        Requirement { owner, data }
    }

    pub fn namespace(&self) -> &str {
        &self.data.namespace
    }

    pub fn attributes(&self) -> &Attrs {
        &self.data.attributes
    }

    pub fn directives(&self) -> &Directives {
        &self.data.directives
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.owner.as_ref()
    }

    pub fn filter_str(&self) -> Option<&str> {
        self.data.directives.get(ns::DIRECTIVE_FILTER).map(|s| s.as_str())
    }

    pub fn is_optional(&self) -> bool {
        self.data
            .directives
            .get(ns::DIRECTIVE_RESOLUTION)
            .map_or(false, |v| v == ns::RESOLUTION_OPTIONAL)
    }

    /// The `effective` directive, defaulting to `resolve`.
    pub fn effective_scope(&self) -> &str {
        self.data
            .directives
            .get(ns::DIRECTIVE_EFFECTIVE)
            .map_or(ns::EFFECTIVE_RESOLVE, |s| s.as_str())
    }

    /// Namespace plus filter match. A requirement with no filter matches
    /// every capability of its namespace; a malformed filter matches
    /// nothing.
    pub fn matches(&self, capability: &Capability) -> bool {
        if self.data.namespace != capability.namespace() {
            return false;
        }
        match self.data.filter() {
            None => true,
            Some(Ok(filter)) => filter.matches(capability.attributes()),
            Some(Err(_)) => false,
        }
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && (Arc::ptr_eq(&self.data, &other.data) || self.data.content_eq(&other.data))
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.data.content_hash(state);
    }
}

impl fmt::Debug for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Requirement({self})")
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.filter_str() {
            Some(filter) => write!(f, "{}: {}", self.data.namespace, filter),
            None => write!(f, "{}", self.data.namespace),
        }
    }
}

/// A realized match: `requirer`'s `requirement` satisfied by `provider`'s
/// `capability`. Endpoints are stored explicitly because hosted
/// capabilities can make the provider differ from the capability's
/// declaring resource.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Wire {
    requirement: Requirement,
    capability: Capability,
    requirer: Resource,
    provider: Resource,
}

impl Wire {
    pub fn new(requirement: Requirement, capability: Capability) -> Result<Wire, GraphError> {
        let requirer = requirement
            .resource()
            .cloned()
            .ok_or_else(|| GraphError::DetachedRequirement(requirement.to_string()))?;
        let provider = capability.resource().clone();
        Ok(Wire {
            requirement,
            capability,
            requirer,
            provider,
        })
    }

    pub fn between(
        requirement: Requirement,
        capability: Capability,
        requirer: Resource,
        provider: Resource,
    ) -> Wire {
        Wire {
            requirement,
            capability,
            requirer,
            provider,
        }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn requirer(&self) -> &Resource {
        &self.requirer
    }

    pub fn provider(&self) -> &Resource {
        &self.provider
    }

    pub fn is_self_wire(&self) -> bool {
        self.requirer == self.provider
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wire({} -[{}]-> {})",
            self.requirer,
            self.requirement.namespace(),
            self.provider
        )
    }
}
