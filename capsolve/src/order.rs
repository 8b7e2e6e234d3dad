//! Dependency ordering over a resolved wiring.
//!
//! The wiring is a directed graph (requirer points at provider); ordering
//! collapses its strongly connected components with Tarjan's algorithm and
//! flattens them so providers come before the resources that need them.
//! Cycles are tolerated: a cycle becomes one component whose internal
//! order is the canonical identity sort.

use std::cmp::Ordering;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use resgraph::{ns, Resource};

use crate::solver::Wiring;

/// Policy for flattening a resolved wiring into a start order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOrder {
    /// Providers before their requirers (dependency order).
    #[default]
    LeastDependenciesFirst,
    /// Requirers before their providers.
    LeastDependenciesLast,
    /// Canonical identity order, ignoring wires.
    SortByNameVersion,
    /// A fresh shuffle on every call.
    Random,
}

/// Start-level assignment for the ordered output. Disabled unless `begin`
/// is positive; a negative `step` is treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLevels {
    pub begin: i32,
    pub step: i32,
}

impl Default for StartLevels {
    fn default() -> Self {
        StartLevels { begin: -1, step: -1 }
    }
}

impl StartLevels {
    pub fn new(begin: i32, step: i32) -> Self {
        StartLevels { begin, step }
    }

    pub fn is_enabled(&self) -> bool {
        self.begin > 0
    }

    /// Pairs each resource with its start level: `begin + i * step` for the
    /// i-th entry, or `None` for every entry when disabled.
    pub fn assign(&self, ordered: Vec<Resource>) -> Vec<(Resource, Option<i32>)> {
        if !self.is_enabled() {
            return ordered.into_iter().map(|r| (r, None)).collect();
        }
        let step = self.step.max(0);
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, resource)| (resource, Some(self.begin + step * i as i32)))
            .collect()
    }
}

/// Flattens a wiring according to the given policy. Synthetic input and
/// system nodes never appear in the output.
pub fn ordered_resources(wiring: &Wiring, order: RunOrder) -> Vec<Resource> {
    match order {
        RunOrder::LeastDependenciesFirst => sort_by_dependencies(wiring),
        RunOrder::LeastDependenciesLast => {
            let mut list = sort_by_dependencies(wiring);
            list.reverse();
            list
        }
        RunOrder::SortByNameVersion => {
            let mut list: Vec<Resource> = wiring
                .keys()
                .filter(|resource| !is_synthetic(resource))
                .cloned()
                .collect();
            list.sort_by(compare_by_identity);
            list
        }
        RunOrder::Random => {
            let mut list: Vec<Resource> = wiring
                .keys()
                .filter(|resource| !is_synthetic(resource))
                .cloned()
                .collect();
            list.shuffle(&mut rand::thread_rng());
            list
        }
    }
}

/// Providers-before-requirers order, deterministic for a fixed wiring.
pub fn sort_by_dependencies(wiring: &Wiring) -> Vec<Resource> {
    let graph = dependency_graph(wiring);
    strongly_connected(&graph)
        .into_iter()
        .flat_map(|mut component| {
            component.sort_by(compare_by_identity);
            component
        })
        .filter(|resource| !is_synthetic(resource))
        .collect()
}

/// Adjacency derived from a wiring: every wiring key is a vertex, plus one
/// requirer → provider edge per wire. Vertices and adjacency lists are in
/// canonical identity order so downstream traversal is deterministic.
pub fn dependency_graph(wiring: &Wiring) -> IndexMap<Resource, Vec<Resource>> {
    let mut graph: IndexMap<Resource, Vec<Resource>> = IndexMap::new();
    for resource in wiring.keys() {
        graph.entry(resource.clone()).or_default();
    }
    for wire in wiring.values().flatten() {
        graph.entry(wire.provider().clone()).or_default();
        let providers = graph.entry(wire.requirer().clone()).or_default();
        providers.push(wire.provider().clone());
    }
    graph.sort_by(|a, _, b, _| compare_by_identity(a, b));
    for providers in graph.values_mut() {
        providers.sort_by(compare_by_identity);
        providers.dedup();
    }
    graph
}

fn compare_by_identity(a: &Resource, b: &Resource) -> Ordering {
    match (a.identity(), b.identity()) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn is_synthetic(resource: &Resource) -> bool {
    resource.identity().map_or(false, |id| {
        id.name == ns::IDENTITY_INITIAL || id.name == ns::IDENTITY_SYSTEM
    })
}

/// Iterative Tarjan SCC. Components come out in reverse topological order
/// of the condensation: a component is emitted only after every component
/// it points at, so flattening yields providers first.
fn strongly_connected(graph: &IndexMap<Resource, Vec<Resource>>) -> Vec<Vec<Resource>> {
    let n = graph.len();
    let adjacency: Vec<Vec<usize>> = graph
        .values()
        .map(|providers| {
            providers
                .iter()
                .filter_map(|provider| graph.get_index_of(provider))
                .collect()
        })
        .collect();

    struct Frame {
        v: usize,
        edge: usize,
    }

    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut next = 0usize;

    for start in 0..n {
        if index[start].is_some() {
            continue;
        }
        // Explicit DFS frames keep deep graphs off the call stack.
        let mut frames = vec![Frame { v: start, edge: 0 }];
        while let Some(frame) = frames.last_mut() {
            let v = frame.v;
            if frame.edge == 0 {
                index[v] = Some(next);
                lowlink[v] = next;
                next += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if frame.edge < adjacency[v].len() {
                let w = adjacency[v][frame.edge];
                frame.edge += 1;
                match index[w] {
                    None => frames.push(Frame { v: w, edge: 0 }),
                    Some(seen) if on_stack[w] => lowlink[v] = lowlink[v].min(seen),
                    Some(_) => {}
                }
            } else {
                if index[v] == Some(lowlink[v]) {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
                let low = lowlink[v];
                frames.pop();
                if let Some(parent) = frames.last() {
                    lowlink[parent.v] = lowlink[parent.v].min(low);
                }
            }
        }
    }

    components
        .into_iter()
        .map(|component| {
            component
                .into_iter()
                .filter_map(|i| graph.get_index(i).map(|(resource, _)| resource.clone()))
                .collect()
        })
        .collect()
}
