//! Namespace-keyed capability index.
//!
//! Search scopes (system resource, input resource, wired resources) and
//! in-memory repositories both answer requirement lookups through this
//! structure.

use std::collections::HashMap;

use crate::resource::{Capability, Requirement, Resource};

#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    by_namespace: HashMap<String, Vec<Capability>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        CapabilityIndex::default()
    }

    /// Indexes every capability of `resource`.
    pub fn add_resource(&mut self, resource: &Resource) {
        for cap in resource.capabilities(None) {
            self.add_capability(cap);
        }
    }

    pub fn add_capability(&mut self, cap: Capability) {
        self.by_namespace
            .entry(cap.namespace().to_string())
            .or_default()
            .push(cap);
    }

    /// Appends capabilities matching `req`'s filter whose effectiveness is
    /// compatible with the requirement. Capabilities already present in
    /// `out` are not appended again.
    pub fn append_matching(&self, req: &Requirement, out: &mut Vec<Capability>) {
        let Some(caps) = self.by_namespace.get(req.namespace()) else {
            return;
        };
        for cap in caps {
            if req.matches(cap) && cap.effective_in(req) && !out.contains(cap) {
                out.push(cap.clone());
            }
        }
    }

    /// Filter-only lookup. Effectiveness and admission policy are the
    /// caller's concern.
    pub fn find_matching(&self, req: &Requirement) -> Vec<Capability> {
        let mut found = Vec::new();
        if let Some(caps) = self.by_namespace.get(req.namespace()) {
            for cap in caps {
                if req.matches(cap) {
                    found.push(cap.clone());
                }
            }
        }
        found
    }

    pub fn capability_count(&self) -> usize {
        self.by_namespace.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_namespace.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{RequirementBuilder, ResourceBuilder};
    use crate::version::{Version, VersionRange};
    use pretty_assertions::assert_eq;

    fn exporter(pkg: &str, version: &str) -> Resource {
        let v: Version = version.parse().unwrap();
        ResourceBuilder::new()
            .identity(&format!("provider.of.{pkg}"), v.clone())
            .export_package(pkg, v.clone(), &format!("provider.of.{pkg}"), v)
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_respects_namespace_and_filter() {
        let mut index = CapabilityIndex::new();
        index.add_resource(&exporter("org.example.api", "1.2.0"));
        index.add_resource(&exporter("org.example.impl", "1.0.0"));

        let req = RequirementBuilder::package(
            "org.example.api",
            Some(&VersionRange::parse("[1.0,2.0)").unwrap()),
        )
        .build_detached();
        let found = index.find_matching(&req);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attributes().get_str("package"), Some("org.example.api"));
    }

    #[test]
    fn append_skips_duplicates() {
        let mut index = CapabilityIndex::new();
        let r = exporter("org.example.api", "1.0.0");
        index.add_resource(&r);

        let req = RequirementBuilder::package("org.example.api", None).build_detached();
        let mut out = index.find_matching(&req);
        index.append_matching(&req, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn version_outside_range_is_filtered() {
        let mut index = CapabilityIndex::new();
        index.add_resource(&exporter("org.example.api", "3.0.0"));

        let req = RequirementBuilder::package(
            "org.example.api",
            Some(&VersionRange::parse("[1.0,2.0)").unwrap()),
        )
        .build_detached();
        assert!(index.find_matching(&req).is_empty());
    }
}
