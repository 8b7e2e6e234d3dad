//! Candidate ranking.
//!
//! A pure, total, multi-tier tie-break over capabilities competing for one
//! requirement. The comparator reads only an explicit snapshot of context
//! state, so ranking stays deterministic and side-effect free.

use std::cmp::Ordering;

use resgraph::{ns, Capability, Resource, Version};

use crate::solver::Wiring;

/// Read-only context state the ranking consults.
pub struct RankView<'a> {
    system: &'a Resource,
    wirings: &'a Wiring,
    mandatory: &'a [Resource],
}

impl<'a> RankView<'a> {
    pub fn new(system: &'a Resource, wirings: &'a Wiring, mandatory: &'a [Resource]) -> Self {
        RankView {
            system,
            wirings,
            mandatory,
        }
    }

    // System/mandatory checks accept semantically identical instances so
    // that the same artifact sourced from two repositories ranks alike.
    fn is_system(&self, resource: &Resource) -> bool {
        resource == self.system || resource.same_identity(self.system)
    }

    fn is_wired(&self, resource: &Resource) -> bool {
        self.wirings.contains_key(resource)
    }

    fn is_mandatory(&self, resource: &Resource) -> bool {
        self.mandatory
            .iter()
            .any(|m| resource == m || resource.same_identity(m))
    }
}

/// Ranks two candidates; `Ordering::Less` means `a` is preferred. Rules
/// are evaluated top to bottom, first decisive rule wins:
///
/// 1. the system resource's capabilities;
/// 2. resources already present in the wiring;
/// 3. input/mandatory resources;
/// 4. within one namespace, higher `version` attribute;
/// 5. for module capabilities, higher `module-version`;
/// 6. package capabilities exported by the same module: higher
///    `module-version`; other namespaces with equal identity name: higher
///    identity version;
/// 7. fewer requirements on the owning resource;
/// 8. more capabilities on the owning resource.
pub fn compare_candidates(view: &RankView<'_>, a: &Capability, b: &Capability) -> Ordering {
    let res_a = a.resource();
    let res_b = b.resource();

    let ord = by_flag(view.is_system(res_a), view.is_system(res_b));
    if ord != Ordering::Equal {
        return ord;
    }

    let ord = by_flag(view.is_wired(res_a), view.is_wired(res_b));
    if ord != Ordering::Equal {
        return ord;
    }

    let ord = by_flag(view.is_mandatory(res_a), view.is_mandatory(res_b));
    if ord != Ordering::Equal {
        return ord;
    }

    if a.namespace() == b.namespace() {
        let ord = version_of(b, ns::ATTR_VERSION).cmp(&version_of(a, ns::ATTR_VERSION));
        if ord != Ordering::Equal {
            return ord;
        }
    }

    if a.namespace() == ns::MODULE && b.namespace() == ns::MODULE {
        let ord = version_of(b, ns::ATTR_MODULE_VERSION)
            .cmp(&version_of(a, ns::ATTR_MODULE_VERSION));
        if ord != Ordering::Equal {
            return ord;
        }
    }

    if a.namespace() == ns::PACKAGE && b.namespace() == ns::PACKAGE {
        let module_a = a.attributes().get_str(ns::ATTR_MODULE);
        let module_b = b.attributes().get_str(ns::ATTR_MODULE);
        if let (Some(module_a), Some(module_b)) = (module_a, module_b) {
            if module_a == module_b {
                let ord = version_of(b, ns::ATTR_MODULE_VERSION)
                    .cmp(&version_of(a, ns::ATTR_MODULE_VERSION));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    } else if a.namespace() == b.namespace() {
        if let (Some(id_a), Some(id_b)) = (res_a.identity(), res_b.identity()) {
            if id_a.name == id_b.name {
                let ord = id_b.version.cmp(&id_a.version);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }

    let ord = res_a.requirement_count().cmp(&res_b.requirement_count());
    if ord != Ordering::Equal {
        return ord;
    }

    res_b.capability_count().cmp(&res_a.capability_count())
}

fn by_flag(a: bool, b: bool) -> Ordering {
    match (a, b) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn version_of(cap: &Capability, attr: &str) -> Version {
    cap.attributes()
        .get_version(attr)
        .unwrap_or_else(Version::lowest)
}
