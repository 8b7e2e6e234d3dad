//! Fluent builders for resources, capabilities and requirements.

use std::sync::Arc;

use thiserror::Error;

use crate::filter::Filter;
use crate::ns;
use crate::resource::{CapReqData, Requirement, Resource, ResourceIdentity};
use crate::value::{AttrValue, Attrs, Directives};
use crate::version::{Version, VersionError, VersionRange};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("multiple identity capabilities: '{0}' and '{1}'")]
    MultipleIdentities(String, String),

    #[error("identity capability missing its name attribute")]
    MissingIdentityName,

    #[error("identity version: {0}")]
    Version(#[from] VersionError),

    #[error("identity version attribute has a non-version type: {0}")]
    MalformedIdentityVersion(String),
}

#[derive(Debug, Clone)]
pub struct CapabilityBuilder {
    namespace: String,
    attributes: Attrs,
    directives: Directives,
}

impl CapabilityBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        CapabilityBuilder {
            namespace: namespace.into(),
            attributes: Attrs::new(),
            directives: Directives::new(),
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }

    fn into_data(self) -> Arc<CapReqData> {
        Arc::new(CapReqData::new(
            self.namespace,
            self.attributes,
            self.directives,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    namespace: String,
    attributes: Attrs,
    directives: Directives,
}

impl RequirementBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        RequirementBuilder {
            namespace: namespace.into(),
            attributes: Attrs::new(),
            directives: Directives::new(),
        }
    }

    /// Requirement on an `identity` capability, composed from a name and an
    /// optional version range.
    pub fn identity(name: &str, range: Option<&VersionRange>) -> Self {
        RequirementBuilder::new(ns::IDENTITY)
            .filter(named_range_filter(ns::IDENTITY, name, ns::ATTR_VERSION, range))
    }

    /// Requirement on a `module` capability.
    pub fn module(name: &str, range: Option<&VersionRange>) -> Self {
        RequirementBuilder::new(ns::MODULE).filter(named_range_filter(
            ns::MODULE,
            name,
            ns::ATTR_MODULE_VERSION,
            range,
        ))
    }

    /// Requirement on a `package` capability.
    pub fn package(name: &str, range: Option<&VersionRange>) -> Self {
        RequirementBuilder::new(ns::PACKAGE)
            .filter(named_range_filter(ns::PACKAGE, name, ns::ATTR_VERSION, range))
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }

    pub fn filter(self, filter: Filter) -> Self {
        self.directive(ns::DIRECTIVE_FILTER, filter.to_string())
    }

    pub fn filter_str(self, filter: impl Into<String>) -> Self {
        self.directive(ns::DIRECTIVE_FILTER, filter.into())
    }

    pub fn optional(self) -> Self {
        self.directive(ns::DIRECTIVE_RESOLUTION, ns::RESOLUTION_OPTIONAL)
    }

    pub fn effective(self, scope: impl Into<String>) -> Self {
        self.directive(ns::DIRECTIVE_EFFECTIVE, scope.into())
    }

    /// Builds a synthetic requirement owned by no resource.
    pub fn build_detached(self) -> Requirement {
        Requirement::from_data(
            None,
            Arc::new(CapReqData::new(
                self.namespace,
                self.attributes,
                self.directives,
            )),
        )
    }

    fn into_data(self) -> Arc<CapReqData> {
        Arc::new(CapReqData::new(
            self.namespace,
            self.attributes,
            self.directives,
        ))
    }
}

/// `(&(key=name)(version-range terms))`, or just the name term when no
/// range is given.
fn named_range_filter(
    key: &str,
    name: &str,
    version_attr: &str,
    range: Option<&VersionRange>,
) -> Filter {
    let name_term = Filter::Eq(key.to_string(), name.to_string());
    let Some(range) = range else {
        return name_term;
    };
    let mut terms = vec![name_term, Filter::GtEq(version_attr.to_string(), range.low.to_string())];
    if !range.include_low {
        terms.push(Filter::Not(Box::new(Filter::LtEq(
            version_attr.to_string(),
            range.low.to_string(),
        ))));
    }
    if let Some(high) = &range.high {
        if range.include_high {
            terms.push(Filter::LtEq(version_attr.to_string(), high.to_string()));
        } else {
            terms.push(Filter::Not(Box::new(Filter::GtEq(
                version_attr.to_string(),
                high.to_string(),
            ))));
        }
    }
    Filter::And(terms)
}

#[derive(Debug, Clone, Default)]
pub struct ResourceBuilder {
    capabilities: Vec<CapabilityBuilder>,
    requirements: Vec<RequirementBuilder>,
}

impl ResourceBuilder {
    pub fn new() -> Self {
        ResourceBuilder::default()
    }

    /// Adds the identity capability with type `module`.
    pub fn identity(self, name: &str, version: Version) -> Self {
        self.identity_typed(name, version, ns::TYPE_MODULE)
    }

    pub fn identity_typed(self, name: &str, version: Version, ty: &str) -> Self {
        self.capability(
            CapabilityBuilder::new(ns::IDENTITY)
                .attribute(ns::IDENTITY, name)
                .attribute(ns::ATTR_VERSION, version)
                .attribute(ns::ATTR_TYPE, ty),
        )
    }

    pub fn capability(mut self, builder: CapabilityBuilder) -> Self {
        self.capabilities.push(builder);
        self
    }

    pub fn requirement(mut self, builder: RequirementBuilder) -> Self {
        self.requirements.push(builder);
        self
    }

    /// Declares a `module` capability, usually alongside the identity.
    pub fn provide_module(self, name: &str, version: Version) -> Self {
        self.capability(
            CapabilityBuilder::new(ns::MODULE)
                .attribute(ns::MODULE, name)
                .attribute(ns::ATTR_MODULE_VERSION, version),
        )
    }

    /// Declares an exported `package` capability.
    pub fn export_package(
        self,
        name: &str,
        version: Version,
        module: &str,
        module_version: Version,
    ) -> Self {
        self.capability(
            CapabilityBuilder::new(ns::PACKAGE)
                .attribute(ns::PACKAGE, name)
                .attribute(ns::ATTR_VERSION, version)
                .attribute(ns::ATTR_MODULE, module)
                .attribute(ns::ATTR_MODULE_VERSION, module_version),
        )
    }

    pub fn import_package(self, name: &str, range: Option<&VersionRange>) -> Self {
        self.requirement(RequirementBuilder::package(name, range))
    }

    pub fn require_module(self, name: &str, range: Option<&VersionRange>) -> Self {
        self.requirement(RequirementBuilder::module(name, range))
    }

    pub fn build(self) -> Result<Resource, BuildError> {
        let capabilities: Vec<Arc<CapReqData>> = self
            .capabilities
            .into_iter()
            .map(CapabilityBuilder::into_data)
            .collect();
        let requirements: Vec<Arc<CapReqData>> = self
            .requirements
            .into_iter()
            .map(RequirementBuilder::into_data)
            .collect();
        let identity = extract_identity(&capabilities)?;
        Ok(Resource::from_parts(capabilities, requirements, identity))
    }
}

fn extract_identity(
    capabilities: &[Arc<CapReqData>],
) -> Result<Option<ResourceIdentity>, BuildError> {
    let mut found: Option<&Arc<CapReqData>> = None;
    for data in capabilities {
        if data.namespace != ns::IDENTITY {
            continue;
        }
        if let Some(existing) = found {
            return Err(BuildError::MultipleIdentities(
                existing
                    .attributes
                    .get_str(ns::IDENTITY)
                    .unwrap_or("?")
                    .to_string(),
                data.attributes.get_str(ns::IDENTITY).unwrap_or("?").to_string(),
            ));
        }
        found = Some(data);
    }
    let Some(data) = found else {
        return Ok(None);
    };
    let name = data
        .attributes
        .get_str(ns::IDENTITY)
        .ok_or(BuildError::MissingIdentityName)?
        .to_string();
    let version = match data.attributes.get(ns::ATTR_VERSION) {
        None => Version::lowest(),
        Some(AttrValue::Ver(v)) => v.clone(),
        Some(AttrValue::Str(s)) => Version::parse(s)?,
        Some(other) => {
            return Err(BuildError::MalformedIdentityVersion(other.to_string()));
        }
    };
    Ok(Some(ResourceIdentity { name, version }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derived_module_requirement_composes_filter() {
        let range = VersionRange::parse("[1.0,2.0)").unwrap();
        let req = RequirementBuilder::module("com.example.core", Some(&range)).build_detached();
        assert_eq!(req.namespace(), ns::MODULE);
        assert_eq!(
            req.filter_str(),
            Some(
                "(&(module=com.example.core)(module-version>=1.0.0)(!(module-version>=2.0.0)))"
            )
        );
    }

    #[test]
    fn identity_requirement_without_range() {
        let req = RequirementBuilder::identity("com.example.app", None).build_detached();
        assert_eq!(req.filter_str(), Some("(identity=com.example.app)"));
    }

    #[test]
    fn exclusive_low_bound_materializes_negated_term() {
        let range = VersionRange::parse("(1.0,2.0]").unwrap();
        let req = RequirementBuilder::package("p", Some(&range)).build_detached();
        assert_eq!(
            req.filter_str(),
            Some("(&(package=p)(version>=1.0.0)(!(version<=1.0.0))(version<=2.0.0))")
        );
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let result = ResourceBuilder::new()
            .identity("a", Version::new(1, 0, 0))
            .identity("b", Version::new(2, 0, 0))
            .build();
        assert!(matches!(result, Err(BuildError::MultipleIdentities(_, _))));
    }

    #[test]
    fn anonymous_resources_are_allowed() {
        let r = ResourceBuilder::new()
            .capability(CapabilityBuilder::new(ns::CONTENT).attribute("path", "blob"))
            .build()
            .unwrap();
        assert!(r.identity().is_none());
    }

    #[test]
    fn string_identity_version_is_parsed() {
        let r = ResourceBuilder::new()
            .capability(
                CapabilityBuilder::new(ns::IDENTITY)
                    .attribute(ns::IDENTITY, "lib")
                    .attribute(ns::ATTR_VERSION, "2.5"),
            )
            .build()
            .unwrap();
        assert_eq!(r.identity().unwrap().version, Version::new(2, 5, 0));
    }

    #[test]
    fn optional_and_effective_directives() {
        let req = RequirementBuilder::package("p", None)
            .optional()
            .effective("active")
            .build_detached();
        assert!(req.is_optional());
        assert_eq!(req.effective_scope(), "active");
    }
}
