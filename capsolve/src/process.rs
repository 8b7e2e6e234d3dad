//! Two-phase resolve orchestration.
//!
//! Phase 1 resolves with only the synthetic input resource mandatory, to
//! learn which resources the root requirements actually select. Phase 2
//! re-runs the solver with that root set mandatory and optional discovery
//! switched on, then post-processes the raw wiring into the
//! consumer-facing [`Resolution`]. Solver failures are diagnosed before
//! being returned so the report names the deepest missing requirement,
//! not just the one the solver gave up on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use resgraph::{
    ns, CapabilityBuilder, Repository, Requirement, RequirementBuilder, Resource,
    ResourceIdentity, Wire,
};

use crate::context::ContextBuilder;
use crate::diagnose::{diagnose, DEFAULT_DIAGNOSIS_TIMEOUT};
use crate::error::ResolveError;
use crate::hooks::{ResolutionCallback, ResolverHook};
use crate::order::{RunOrder, StartLevels};
use crate::report::ResolutionFailure;
use crate::resolution::Resolution;
use crate::solver::{SolveError, Solver, Wiring};

/// Everything one resolve run needs: the context ingredients plus the run
/// order, start levels and the diagnosis budget.
#[derive(Clone)]
pub struct RunSpec {
    ingredients: ContextBuilder,
    run_order: RunOrder,
    start_levels: StartLevels,
    diagnosis_timeout: Duration,
}

impl Default for RunSpec {
    fn default() -> Self {
        RunSpec {
            ingredients: ContextBuilder::new(),
            run_order: RunOrder::default(),
            start_levels: StartLevels::default(),
            diagnosis_timeout: DEFAULT_DIAGNOSIS_TIMEOUT,
        }
    }
}

impl RunSpec {
    pub fn new() -> Self {
        RunSpec::default()
    }

    /// Adds a root requirement; these drive phase 1 and root discovery.
    pub fn with_root_requirement(mut self, requirement: RequirementBuilder) -> Self {
        self.ingredients = self.ingredients.with_root_requirement(requirement);
        self
    }

    /// Adds a capability to the synthesized system resource.
    pub fn with_system_capability(mut self, capability: CapabilityBuilder) -> Self {
        self.ingredients = self.ingredients.with_system_capability(capability);
        self
    }

    /// Registers a repository; registration order is candidate priority.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.ingredients = self.ingredients.with_repository(repository);
        self
    }

    pub fn with_blacklisted_resource(mut self, resource: Resource) -> Self {
        self.ingredients = self.ingredients.with_blacklisted_resource(resource);
        self
    }

    pub fn with_blacklist_requirement(mut self, requirement: RequirementBuilder) -> Self {
        self.ingredients = self.ingredients.with_blacklist_requirement(requirement);
        self
    }

    pub fn with_effective_scope(mut self, scope: impl Into<String>) -> Self {
        self.ingredients = self.ingredients.with_effective_scope(scope);
        self
    }

    pub fn with_effective_scope_excluding(
        mut self,
        scope: impl Into<String>,
        excluded_namespaces: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.ingredients = self
            .ingredients
            .with_effective_scope_excluding(scope, excluded_namespaces);
        self
    }

    pub fn with_resolver_hook(mut self, hook: Arc<dyn ResolverHook>) -> Self {
        self.ingredients = self.ingredients.with_resolver_hook(hook);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResolutionCallback>) -> Self {
        self.ingredients = self.ingredients.with_callback(callback);
        self
    }

    pub fn with_preference(mut self, identity_name: impl Into<String>) -> Self {
        self.ingredients = self.ingredients.with_preference(identity_name);
        self
    }

    pub fn with_preferences(
        mut self,
        identity_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.ingredients = self.ingredients.with_preferences(identity_names);
        self
    }

    /// Seeds pre-existing wirings; resources there outrank fresh
    /// candidates.
    pub fn with_wirings(mut self, wirings: Wiring) -> Self {
        self.ingredients = self.ingredients.with_wirings(wirings);
        self
    }

    pub fn with_run_order(mut self, run_order: RunOrder) -> Self {
        self.run_order = run_order;
        self
    }

    pub fn with_start_levels(mut self, start_levels: StartLevels) -> Self {
        self.start_levels = start_levels;
        self
    }

    /// Wall-clock budget for diagnosing each unresolved requirement after
    /// a solver failure.
    pub fn with_diagnosis_timeout(mut self, timeout: Duration) -> Self {
        self.diagnosis_timeout = timeout;
        self
    }

    pub fn run_order(&self) -> RunOrder {
        self.run_order
    }

    pub fn start_levels(&self) -> StartLevels {
        self.start_levels
    }

    pub fn diagnosis_timeout(&self) -> Duration {
        self.diagnosis_timeout
    }

    /// The accumulated context ingredients, for callers that drive the
    /// solver directly.
    pub fn context_builder(&self) -> ContextBuilder {
        self.ingredients.clone()
    }
}

/// Runs the full two-phase resolve and returns the post-processed result.
pub fn resolve_required(spec: &RunSpec, solver: &dyn Solver) -> Result<Resolution, ResolveError> {
    let phase1 = spec.ingredients.clone().build()?;
    let input = phase1.input_resource().clone();
    let system = phase1.system_resource().clone();
    let root_requirements = input.requirements(None);

    log::debug!(
        "[resolve] phase 1: {} root requirement(s)",
        root_requirements.len()
    );
    let initial = match solver.resolve(&phase1) {
        Ok(wiring) => wiring,
        Err(err) => {
            return Err(augmented_failure(
                spec,
                &input,
                &system,
                phase1.failed_requirements(),
                err,
            ))
        }
    };

    let roots = discover_roots(&root_requirements, &initial, &input, &system);
    log::debug!("[resolve] phase 2: {} discovered root(s)", roots.len());

    let mut ingredients = spec
        .ingredients
        .clone()
        .rebased_on(input.clone(), system.clone())
        .with_optional_discovery(true)
        .with_optional_roots(roots.iter().cloned());
    for root in &roots {
        ingredients = ingredients.with_mandatory_resource(root.clone());
    }
    let phase2 = ingredients.build()?;

    let mut wiring = match solver.resolve(&phase2) {
        Ok(wiring) => wiring,
        Err(err) => {
            return Err(augmented_failure(
                spec,
                &input,
                &system,
                phase2.failed_requirements(),
                err,
            ))
        }
    };

    // Some solvers drop the synthetic root from the phase-2 result; the
    // root wires from phase 1 are still part of it.
    if !wiring.contains_key(&input) {
        if let Some(wires) = initial.get(&input) {
            wiring.insert(input.clone(), wires.clone());
        }
    }

    let required = invert_wiring(&wiring, &input, &system);
    let optional = dedup_optional(phase2.discovered_optional(), &required);
    log::info!(
        "[resolve] {} required and {} optional resource(s)",
        required.len(),
        optional.len()
    );
    Ok(Resolution::new(
        required,
        optional,
        spec.run_order,
        spec.start_levels,
    ))
}

/// The resources phase 2 must treat as mandatory: every phase-1 resource
/// matched by a root requirement, closed transitively over
/// module-namespace wires.
fn discover_roots(
    root_requirements: &[Requirement],
    wiring: &Wiring,
    input: &Resource,
    system: &Resource,
) -> Vec<Resource> {
    let mut roots: Vec<Resource> = Vec::new();
    for requirement in root_requirements {
        for resource in wiring.keys() {
            if resource == input || resource == system || roots.contains(resource) {
                continue;
            }
            let matched = resource
                .capabilities(Some(requirement.namespace()))
                .iter()
                .any(|capability| requirement.matches(capability));
            if matched {
                roots.push(resource.clone());
            }
        }
    }

    let mut queue: Vec<Resource> = roots.clone();
    let mut seen: HashSet<Resource> = roots.iter().cloned().collect();
    while let Some(current) = queue.pop() {
        let Some(wires) = wiring.get(&current) else {
            continue;
        };
        for wire in wires {
            if wire.requirement().namespace() != ns::MODULE {
                continue;
            }
            let provider = wire.provider();
            if provider == input || provider == system {
                continue;
            }
            if seen.insert(provider.clone()) {
                roots.push(provider.clone());
                queue.push(provider.clone());
            }
        }
    }
    roots
}

/// Turns the solver's requirer → outgoing-wires map into the visible
/// provider → incoming-wires map: self-wires are dropped and the
/// synthetic input and system resources disappear from the key set.
fn invert_wiring(
    wiring: &Wiring,
    input: &Resource,
    system: &Resource,
) -> IndexMap<Resource, Vec<Wire>> {
    let mut required: IndexMap<Resource, Vec<Wire>> = IndexMap::new();
    for resource in wiring.keys() {
        if resource == input || resource == system {
            continue;
        }
        required.entry(resource.clone()).or_default();
    }
    for wire in wiring.values().flatten() {
        if wire.is_self_wire() {
            continue;
        }
        let provider = wire.provider();
        if provider == input || provider == system {
            continue;
        }
        let incoming = required.entry(provider.clone()).or_default();
        if !incoming.contains(wire) {
            incoming.push(wire.clone());
        }
    }
    required
}

/// Filters the discovery side channel down to genuinely new candidates:
/// anything already required (by instance or by semantic identity) is
/// dropped, kept wires must originate from a required resource and
/// satisfy a requirement the required wiring leaves open, and of several
/// same-identity survivors only the first stays.
fn dedup_optional(
    discovered: IndexMap<Resource, Vec<Wire>>,
    required: &IndexMap<Resource, Vec<Wire>>,
) -> IndexMap<Resource, Vec<Wire>> {
    let required_identities: HashSet<&ResourceIdentity> =
        required.keys().filter_map(Resource::identity).collect();
    let satisfied: HashSet<&Requirement> = required
        .values()
        .flatten()
        .map(Wire::requirement)
        .collect();

    let mut optional: IndexMap<Resource, Vec<Wire>> = IndexMap::new();
    let mut accepted: HashSet<ResourceIdentity> = HashSet::new();
    for (resource, wires) in discovered {
        if required.contains_key(&resource) {
            continue;
        }
        if let Some(id) = resource.identity() {
            if required_identities.contains(id) {
                continue;
            }
        }
        let keep: Vec<Wire> = wires
            .into_iter()
            .filter(|wire| {
                required.contains_key(wire.requirer()) && !satisfied.contains(wire.requirement())
            })
            .collect();
        if keep.is_empty() {
            continue;
        }
        if let Some(id) = resource.identity() {
            if !accepted.insert(id.clone()) {
                log::info!("[resolve] dropping duplicate optional candidate {resource}");
                continue;
            }
        }
        optional.insert(resource, keep);
    }
    optional
}

/// Diagnoses a solver failure on a fresh context and packages it as a
/// report. Unresolved optional requirements, plus any optional
/// requirements the failing run logged as candidate-less, land in the
/// report's optional section instead of the chains.
fn augmented_failure(
    spec: &RunSpec,
    input: &Resource,
    system: &Resource,
    failed_log: Vec<Requirement>,
    err: SolveError,
) -> ResolveError {
    let (optional, mandatory): (Vec<Requirement>, Vec<Requirement>) = err
        .into_unresolved()
        .into_iter()
        .partition(Requirement::is_optional);

    let mut optional = optional;
    for requirement in failed_log {
        if requirement.is_optional() && !optional.contains(&requirement) {
            optional.push(requirement);
        }
    }

    let root = input
        .identity()
        .map(|id| id.name.clone())
        .unwrap_or_else(|| ns::IDENTITY_INITIAL.to_string());

    match spec
        .ingredients
        .clone()
        .rebased_on(input.clone(), system.clone())
        .build()
    {
        Ok(context) => {
            let outcome = diagnose(&context, &mandatory, spec.diagnosis_timeout);
            ResolveError::Failed(ResolutionFailure::new(
                root,
                outcome.chains,
                optional,
                outcome.timed_out,
            ))
        }
        Err(build_err) => {
            log::warn!("[resolve] no diagnosis context: {build_err}");
            let chains = mandatory.into_iter().map(|r| vec![r]).collect();
            ResolveError::Failed(ResolutionFailure::new(root, chains, optional, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResolveContext;
    use pretty_assertions::assert_eq;
    use resgraph::{ResourceBuilder, ResourcesRepository, Version};

    fn module(name: &str, version: &str) -> Resource {
        let v = Version::parse(version).unwrap();
        ResourceBuilder::new()
            .identity(name, v.clone())
            .provide_module(name, v)
            .build()
            .unwrap()
    }

    fn module_wire(requirer: &Resource, provider: &Resource) -> Wire {
        let name = provider.identity().unwrap().name.clone();
        let requirement = RequirementBuilder::module(&name, None).build_detached();
        let capability = provider.capabilities(Some(ns::MODULE)).remove(0);
        Wire::between(requirement, capability, requirer.clone(), provider.clone())
    }

    fn identity_wire(requirer: &Resource, provider: &Resource) -> Wire {
        let name = provider.identity().unwrap().name.clone();
        let requirement = RequirementBuilder::identity(&name, None).build_detached();
        let capability = provider.capabilities(Some(ns::IDENTITY)).remove(0);
        Wire::between(requirement, capability, requirer.clone(), provider.clone())
    }

    fn synthetic(name: &str) -> Resource {
        ResourceBuilder::new()
            .capability(CapabilityBuilder::new(ns::IDENTITY).attribute(ns::IDENTITY, name))
            .build()
            .unwrap()
    }

    #[test]
    fn root_discovery_closes_over_module_wires() {
        let input = synthetic(ns::IDENTITY_INITIAL);
        let system = synthetic(ns::IDENTITY_SYSTEM);
        let app = module("app", "1.0.0");
        let dep = module("dep", "1.0.0");
        let transitive = module("transitive", "1.0.0");

        let mut wiring = Wiring::new();
        wiring.insert(input.clone(), vec![identity_wire(&input, &app)]);
        wiring.insert(app.clone(), vec![module_wire(&app, &dep)]);
        wiring.insert(dep.clone(), vec![module_wire(&dep, &transitive)]);
        wiring.insert(transitive.clone(), vec![]);

        let root_req = RequirementBuilder::identity("app", None).build_detached();
        let roots = discover_roots(&[root_req], &wiring, &input, &system);
        assert_eq!(roots, vec![app, dep, transitive]);
    }

    #[test]
    fn root_discovery_ignores_non_module_wires() {
        let input = synthetic(ns::IDENTITY_INITIAL);
        let system = synthetic(ns::IDENTITY_SYSTEM);
        let app = module("app", "1.0.0");
        let lib = ResourceBuilder::new()
            .identity("lib", Version::new(1, 0, 0))
            .export_package(
                "com.example.api",
                Version::new(1, 0, 0),
                "lib",
                Version::new(1, 0, 0),
            )
            .build()
            .unwrap();

        let package_req =
            RequirementBuilder::package("com.example.api", None).build_detached();
        let capability = lib.capabilities(Some(ns::PACKAGE)).remove(0);
        let package_wire =
            Wire::between(package_req, capability, app.clone(), lib.clone());

        let mut wiring = Wiring::new();
        wiring.insert(input.clone(), vec![identity_wire(&input, &app)]);
        wiring.insert(app.clone(), vec![package_wire]);
        wiring.insert(lib.clone(), vec![]);

        let root_req = RequirementBuilder::identity("app", None).build_detached();
        let roots = discover_roots(&[root_req], &wiring, &input, &system);
        assert_eq!(roots, vec![app]);
    }

    #[test]
    fn inversion_drops_self_wires_and_synthetic_keys() {
        let input = synthetic(ns::IDENTITY_INITIAL);
        let system = synthetic(ns::IDENTITY_SYSTEM);
        let app = module("app", "1.0.0");
        let dep = module("dep", "1.0.0");

        let mut wiring = Wiring::new();
        wiring.insert(input.clone(), vec![identity_wire(&input, &app)]);
        wiring.insert(
            app.clone(),
            vec![module_wire(&app, &app), module_wire(&app, &dep)],
        );
        wiring.insert(dep.clone(), vec![]);

        let required = invert_wiring(&wiring, &input, &system);
        assert!(!required.contains_key(&input));
        assert!(!required.contains_key(&system));
        // app keeps its incoming root wire, dep the wire from app, and the
        // self-wire is gone.
        assert_eq!(required[&app].len(), 1);
        assert_eq!(required[&app][0].requirer(), &input);
        assert_eq!(required[&dep].len(), 1);
        assert_eq!(required[&dep][0].requirer(), &app);
    }

    #[test]
    fn duplicate_incoming_wires_collapse() {
        let input = synthetic(ns::IDENTITY_INITIAL);
        let system = synthetic(ns::IDENTITY_SYSTEM);
        let app = module("app", "1.0.0");
        let dep = module("dep", "1.0.0");
        let wire = module_wire(&app, &dep);

        let mut wiring = Wiring::new();
        wiring.insert(app.clone(), vec![wire.clone(), wire.clone()]);
        wiring.insert(dep.clone(), vec![]);

        let required = invert_wiring(&wiring, &input, &system);
        assert_eq!(required[&dep].len(), 1);
    }

    #[test]
    fn optional_dedup_drops_required_identities() {
        let app = module("app", "1.0.0");
        let dep = module("dep", "1.0.0");
        // A second instance of dep with the same identity: required by
        // instance for one, by identity for the other.
        let dep_twin = module("dep", "1.0.0");
        let extra = module("extra", "1.0.0");

        let mut required = IndexMap::new();
        required.insert(app.clone(), Vec::<Wire>::new());
        required.insert(dep.clone(), vec![module_wire(&app, &dep)]);

        let mut discovered = IndexMap::new();
        discovered.insert(dep.clone(), vec![module_wire(&app, &dep)]);
        discovered.insert(dep_twin.clone(), vec![module_wire(&app, &dep_twin)]);
        discovered.insert(extra.clone(), vec![module_wire(&app, &extra)]);

        let optional = dedup_optional(discovered, &required);
        assert_eq!(optional.len(), 1);
        assert!(optional.contains_key(&extra));
    }

    #[test]
    fn optional_dedup_requires_a_required_requirer() {
        let app = module("app", "1.0.0");
        let outsider = module("outsider", "1.0.0");
        let extra = module("extra", "1.0.0");

        let mut required = IndexMap::new();
        required.insert(app.clone(), Vec::<Wire>::new());

        // extra is only wanted by a resource that did not make the cut.
        let mut discovered = IndexMap::new();
        discovered.insert(extra.clone(), vec![module_wire(&outsider, &extra)]);

        let optional = dedup_optional(discovered, &required);
        assert!(optional.is_empty());
    }

    #[test]
    fn optional_dedup_keeps_first_of_same_identity() {
        let app = module("app", "1.0.0");
        let first = module("candidate", "1.0.0");
        let second = module("candidate", "1.0.0");

        let mut required = IndexMap::new();
        required.insert(app.clone(), Vec::<Wire>::new());

        let mut discovered = IndexMap::new();
        discovered.insert(first.clone(), vec![module_wire(&app, &first)]);
        discovered.insert(second.clone(), vec![module_wire(&app, &second)]);

        let optional = dedup_optional(discovered, &required);
        assert_eq!(optional.len(), 1);
        assert!(optional.contains_key(&first));
        assert!(!optional.contains_key(&second));
    }

    /// Wires every effective requirement to its first candidate, then
    /// leaves the synthetic input out of the result once more than the
    /// input is mandatory, the way solvers that only report "real"
    /// resources behave in phase 2.
    struct RootDroppingSolver;

    impl Solver for RootDroppingSolver {
        fn resolve(&self, context: &dyn ResolveContext) -> Result<Wiring, SolveError> {
            let mandatory = context.mandatory_resources();
            let mut wiring = Wiring::new();
            let mut queue = mandatory.clone();
            let mut unresolved = Vec::new();
            let mut at = 0;
            while at < queue.len() {
                let resource = queue[at].clone();
                at += 1;
                let mut wires = Vec::new();
                for requirement in resource.requirements(None) {
                    if !context.is_effective(&requirement) {
                        continue;
                    }
                    let Some(best) = context.find_providers(&requirement).into_iter().next()
                    else {
                        if !requirement.is_optional() {
                            unresolved.push(requirement);
                        }
                        continue;
                    };
                    let provider = best.resource().clone();
                    wires.push(Wire::between(
                        requirement,
                        best,
                        resource.clone(),
                        provider.clone(),
                    ));
                    if !queue.contains(&provider) {
                        queue.push(provider);
                    }
                }
                wiring.insert(resource, wires);
            }
            if !unresolved.is_empty() {
                return Err(SolveError::new(unresolved));
            }
            if mandatory.len() > 1 {
                wiring.shift_remove(&mandatory[0]);
            }
            Ok(wiring)
        }
    }

    #[test]
    fn phase_one_root_wires_survive_a_solver_that_drops_the_input() {
        let x = module("x", "1.0.0");
        let spec = RunSpec::new()
            .with_root_requirement(RequirementBuilder::module("x", None))
            .with_repository(Arc::new(ResourcesRepository::with_resources(
                "main",
                [x.clone()],
            )));

        let resolution = resolve_required(&spec, &RootDroppingSolver).unwrap();
        let wires = &resolution.required()[&x];
        assert_eq!(wires.len(), 1);
        assert_eq!(
            wires[0].requirer().identity().unwrap().name,
            ns::IDENTITY_INITIAL
        );
    }

    #[test]
    fn optional_dedup_skips_already_satisfied_requirements() {
        let app = module("app", "1.0.0");
        let dep = module("dep", "1.0.0");
        let alternative = module("alternative", "1.0.0");

        let satisfied_wire = module_wire(&app, &dep);
        let mut required = IndexMap::new();
        required.insert(app.clone(), Vec::<Wire>::new());
        required.insert(dep.clone(), vec![satisfied_wire.clone()]);

        // The discovered wire answers the same requirement instance that
        // dep already satisfies.
        let alt_cap = alternative.capabilities(Some(ns::MODULE)).remove(0);
        let alt_wire = Wire::between(
            satisfied_wire.requirement().clone(),
            alt_cap,
            app.clone(),
            alternative.clone(),
        );
        let mut discovered = IndexMap::new();
        discovered.insert(alternative.clone(), vec![alt_wire]);

        let optional = dedup_optional(discovered, &required);
        assert!(optional.is_empty());
    }
}
