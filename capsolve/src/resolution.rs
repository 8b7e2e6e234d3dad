//! The resolve result: required and optional wiring, ordering, and the
//! debugging exports.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use indexmap::IndexMap;
use resgraph::{Resource, Wire};
use serde_json::json;

use crate::order::{self, RunOrder, StartLevels};

/// A successful resolve. `required` maps every resolved resource to its
/// incoming wires (provider-keyed, synthetic roots already hidden);
/// `optional` holds the deduplicated optional candidates the run
/// discovered. Both are insertion-ordered.
#[derive(Clone, Debug)]
pub struct Resolution {
    required: IndexMap<Resource, Vec<Wire>>,
    optional: IndexMap<Resource, Vec<Wire>>,
    run_order: RunOrder,
    start_levels: StartLevels,
}

impl Resolution {
    pub(crate) fn new(
        required: IndexMap<Resource, Vec<Wire>>,
        optional: IndexMap<Resource, Vec<Wire>>,
        run_order: RunOrder,
        start_levels: StartLevels,
    ) -> Self {
        Resolution {
            required,
            optional,
            run_order,
            start_levels,
        }
    }

    pub fn required(&self) -> &IndexMap<Resource, Vec<Wire>> {
        &self.required
    }

    pub fn optional(&self) -> &IndexMap<Resource, Vec<Wire>> {
        &self.optional
    }

    pub fn required_resources(&self) -> Vec<Resource> {
        self.required.keys().cloned().collect()
    }

    pub fn optional_resources(&self) -> Vec<Resource> {
        self.optional.keys().cloned().collect()
    }

    pub fn run_order(&self) -> RunOrder {
        self.run_order
    }

    pub fn start_levels(&self) -> StartLevels {
        self.start_levels
    }

    /// The required resources flattened by the run's configured policy.
    pub fn ordered(&self) -> Vec<Resource> {
        self.ordered_by(self.run_order)
    }

    pub fn ordered_by(&self, run_order: RunOrder) -> Vec<Resource> {
        order::ordered_resources(&self.required, run_order)
    }

    /// Ordered output paired with start levels; the level is `None` when
    /// start levels are disabled.
    pub fn ordered_with_start_levels(&self) -> Vec<(Resource, Option<i32>)> {
        self.start_levels.assign(self.ordered())
    }

    /// Requirer → providers adjacency of the required wiring.
    pub fn dependency_graph(&self) -> IndexMap<Resource, Vec<Resource>> {
        order::dependency_graph(&self.required)
    }

    /// Graphviz rendering of the required wiring, one labeled edge per
    /// distinct (requirer, provider, namespace) triple. Node labels carry
    /// the dependency-order position.
    pub fn dot(&self, name: &str) -> String {
        let ordered = self.ordered_by(RunOrder::LeastDependenciesFirst);
        let mut ids: HashMap<Resource, usize> = HashMap::new();
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{name}\" {{");
        for (position, resource) in ordered.iter().enumerate() {
            ids.insert(resource.clone(), position);
            let label = resource
                .identity()
                .map(|id| id.name.clone())
                .unwrap_or_else(|| "anonymous".to_string());
            let _ = writeln!(out, "  n{position} [label=\"{label}[{position}]\"];");
        }
        let mut seen: HashSet<(usize, usize, String)> = HashSet::new();
        for wires in self.required.values() {
            for wire in wires {
                // Wires touching hidden nodes (the synthetic roots) have
                // no vertex and are skipped.
                let (Some(&from), Some(&to)) =
                    (ids.get(wire.requirer()), ids.get(wire.provider()))
                else {
                    continue;
                };
                let namespace = wire.requirement().namespace().to_string();
                if seen.insert((from, to, namespace.clone())) {
                    let _ = writeln!(out, "  n{from} -> n{to} [label=\"{namespace}\"];");
                }
            }
        }
        out.push_str("}\n");
        out
    }

    /// Snapshot of identities and wires for logging and captures.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "required": section_json(&self.required),
            "optional": section_json(&self.optional),
        })
    }
}

fn section_json(map: &IndexMap<Resource, Vec<Wire>>) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = map
        .iter()
        .map(|(resource, wires)| {
            let wires: Vec<serde_json::Value> = wires
                .iter()
                .map(|wire| {
                    json!({
                        "namespace": wire.requirement().namespace(),
                        "requirer": identity_json(wire.requirer()),
                        "provider": identity_json(wire.provider()),
                    })
                })
                .collect();
            json!({
                "resource": identity_json(resource),
                "wires": wires,
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}

fn identity_json(resource: &Resource) -> serde_json::Value {
    match resource.identity() {
        Some(id) => json!({ "name": id.name, "version": id.version.to_string() }),
        None => serde_json::Value::Null,
    }
}
