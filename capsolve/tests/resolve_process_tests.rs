use std::collections::HashSet;
use std::sync::Arc;

use capsolve::{
    missing_chain, resolve_required, ResolveContext, ResolveError, SolveError, Solver,
    StartLevels, Wiring, DEFAULT_DIAGNOSIS_TIMEOUT,
};
use pretty_assertions::assert_eq;
use resgraph::{
    ns, Requirement, RequirementBuilder, Resource, ResourceBuilder, ResourcesRepository, Version,
    VersionRange, Wire,
};

/// Reference solver: takes the best-ranked candidate for every effective
/// requirement and walks the mandatory closure breadth-first. No
/// backtracking; first-candidate-wins is enough to exercise the engine.
struct GreedySolver;

impl Solver for GreedySolver {
    fn resolve(&self, context: &dyn ResolveContext) -> Result<Wiring, SolveError> {
        let mut wiring = Wiring::new();
        let mut unresolved: Vec<Requirement> = Vec::new();
        let mut queue: Vec<Resource> = context.mandatory_resources();
        let mut enqueued: HashSet<Resource> = queue.iter().cloned().collect();

        let mut at = 0;
        while at < queue.len() {
            let resource = queue[at].clone();
            at += 1;
            let mut wires = Vec::new();
            for requirement in resource.requirements(None) {
                if !context.is_effective(&requirement) {
                    continue;
                }
                let Some(best) = context.find_providers(&requirement).into_iter().next() else {
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
                if enqueued.insert(provider.clone()) {
                    queue.push(provider);
                }
            }
            wiring.insert(resource, wires);
        }

        if unresolved.is_empty() {
            Ok(wiring)
        } else {
            Err(SolveError::new(unresolved))
        }
    }
}

fn sample_module(name: &str, version: &str) -> Resource {
    let v: Version = version.parse().unwrap();
    ResourceBuilder::new()
        .identity(name, v.clone())
        .provide_module(name, v)
        .build()
        .unwrap()
}

fn sample_exporter(name: &str, version: &str, pkg: &str, pkg_version: &str) -> Resource {
    let v: Version = version.parse().unwrap();
    ResourceBuilder::new()
        .identity(name, v.clone())
        .provide_module(name, v.clone())
        .export_package(pkg, pkg_version.parse().unwrap(), name, v)
        .build()
        .unwrap()
}

fn sample_repository(
    name: &str,
    resources: impl IntoIterator<Item = Resource>,
) -> Arc<ResourcesRepository> {
    Arc::new(ResourcesRepository::with_resources(name, resources))
}

fn identity_names(resources: &[Resource]) -> Vec<String> {
    resources
        .iter()
        .map(|r| r.identity().unwrap().name.clone())
        .collect()
}

#[test]
fn best_version_wins_across_repositories() {
    let app = ResourceBuilder::new()
        .identity("com.example.app", Version::new(1, 0, 0))
        .provide_module("com.example.app", Version::new(1, 0, 0))
        .import_package(
            "com.example.log.api",
            Some(&VersionRange::parse("1.0").unwrap()),
        )
        .build()
        .unwrap();
    let older = sample_exporter("com.example.log", "1.2.0", "com.example.log.api", "1.0.0");
    let newer = sample_exporter("com.example.log", "1.4.0", "com.example.log.api", "1.1.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::identity("com.example.app", None))
        .with_repository(sample_repository("first", [app.clone(), older]))
        .with_repository(sample_repository("second", [newer.clone()]));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    let required = resolution.required_resources();
    assert_eq!(
        identity_names(&required),
        vec!["com.example.app", "com.example.log"]
    );
    // The exporter with the higher package version wins, regardless of
    // which repository carried it.
    assert_eq!(required[1], newer);
}

#[test]
fn blacklisted_provider_is_skipped_for_the_next_candidate() {
    let app = ResourceBuilder::new()
        .identity("com.example.app", Version::new(1, 0, 0))
        .provide_module("com.example.app", Version::new(1, 0, 0))
        .import_package(
            "com.example.log.api",
            Some(&VersionRange::parse("1.0").unwrap()),
        )
        .build()
        .unwrap();
    let banned = sample_exporter("com.example.log", "1.4.0", "com.example.log.api", "1.1.0");
    let fallback = sample_exporter("com.example.log", "1.2.0", "com.example.log.api", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::identity("com.example.app", None))
        .with_repository(sample_repository("main", [app, banned, fallback.clone()]))
        .with_blacklist_requirement(RequirementBuilder::identity(
            "com.example.log",
            Some(&VersionRange::parse("[1.4.0,1.4.0]").unwrap()),
        ));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    let required = resolution.required_resources();
    assert_eq!(required[1], fallback);
}

#[test]
fn preferred_identity_is_chosen_over_a_better_ranked_candidate() {
    let app = ResourceBuilder::new()
        .identity("com.example.app", Version::new(1, 0, 0))
        .provide_module("com.example.app", Version::new(1, 0, 0))
        .import_package("com.example.log.api", None)
        .build()
        .unwrap();
    let big = sample_exporter("com.example.log", "1.4.0", "com.example.log.api", "1.1.0");
    let small = sample_exporter("com.example.minilog", "0.9.0", "com.example.log.api", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::identity("com.example.app", None))
        .with_repository(sample_repository("main", [app, big, small.clone()]))
        .with_preference("com.example.minilog");

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    assert_eq!(resolution.required_resources()[1], small);
}

#[test]
fn missing_transitive_dependency_fails_with_the_deep_requirement() {
    let app = ResourceBuilder::new()
        .identity("com.example.app", Version::new(1, 0, 0))
        .provide_module("com.example.app", Version::new(1, 0, 0))
        .import_package("com.example.api", None)
        .requirement(RequirementBuilder::package("com.example.extras", None).optional())
        .build()
        .unwrap();
    let lib = ResourceBuilder::new()
        .identity("com.example.lib", Version::new(2, 0, 0))
        .provide_module("com.example.lib", Version::new(2, 0, 0))
        .export_package(
            "com.example.api",
            Version::new(1, 0, 0),
            "com.example.lib",
            Version::new(2, 0, 0),
        )
        .require_module("com.example.ghost", None)
        .build()
        .unwrap();

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::identity("com.example.app", None))
        .with_repository(sample_repository("main", [app, lib]));

    let err = resolve_required(&spec, &GreedySolver).unwrap_err();
    let ResolveError::Failed(failure) = err else {
        panic!("expected a resolution failure");
    };

    let unresolved = failure.unresolved();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].filter_str(), Some("(module=com.example.ghost)"));

    let report = failure.to_string();
    assert!(report.starts_with("Unable to resolve <<INITIAL>>:"));
    assert!(report.contains("[com.example.lib]"));
    assert!(report.contains("\u{21d2} module: (module=com.example.ghost)"));
    // The unsatisfiable optional ends up in its own section, and the
    // section can be suppressed.
    assert!(report.contains("The following requirements are optional:"));
    assert!(report.contains("package: (package=com.example.extras)"));
    assert!(!failure
        .render(false)
        .contains("The following requirements are optional:"));
}

#[test]
fn diagnosis_digs_from_a_root_requirement_to_the_deepest_cause() {
    let app = ResourceBuilder::new()
        .identity("com.example.app", Version::new(1, 0, 0))
        .import_package("com.example.api", None)
        .build()
        .unwrap();
    let lib = ResourceBuilder::new()
        .identity("com.example.lib", Version::new(2, 0, 0))
        .export_package(
            "com.example.api",
            Version::new(1, 0, 0),
            "com.example.lib",
            Version::new(2, 0, 0),
        )
        .require_module("com.example.ghost", None)
        .build()
        .unwrap();

    let spec = capsolve::RunSpec::new()
        .with_repository(sample_repository("main", [app, lib]));
    let context = spec.context_builder().build().unwrap();

    let root = RequirementBuilder::identity("com.example.app", None).build_detached();
    let chain = missing_chain(&context, &root, DEFAULT_DIAGNOSIS_TIMEOUT)
        .unwrap()
        .unwrap();
    let namespaces: Vec<&str> = chain.iter().map(|r| r.namespace()).collect();
    assert_eq!(namespaces, vec![ns::IDENTITY, ns::PACKAGE, ns::MODULE]);
    assert_eq!(
        chain[2].filter_str(),
        Some("(module=com.example.ghost)")
    );
}

#[test]
fn unsatisfiable_optional_roots_do_not_fail_the_resolve() {
    let x = sample_module("com.example.x", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::module("com.example.x", None))
        .with_root_requirement(RequirementBuilder::module("com.example.y", None).optional())
        .with_repository(sample_repository("main", [x.clone()]));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    assert_eq!(resolution.required_resources(), vec![x]);
    assert!(resolution.optional().is_empty());
}

#[test]
fn satisfiable_optionals_outside_the_root_set_are_reported() {
    let x = ResourceBuilder::new()
        .identity("com.example.x", Version::new(1, 0, 0))
        .provide_module("com.example.x", Version::new(1, 0, 0))
        .import_package("com.example.api", None)
        .build()
        .unwrap();
    let lib = ResourceBuilder::new()
        .identity("com.example.lib", Version::new(1, 0, 0))
        .provide_module("com.example.lib", Version::new(1, 0, 0))
        .export_package(
            "com.example.api",
            Version::new(1, 0, 0),
            "com.example.lib",
            Version::new(1, 0, 0),
        )
        .requirement(RequirementBuilder::module("com.example.helper", None).optional())
        .build()
        .unwrap();
    let helper = sample_module("com.example.helper", "1.0.0");
    let helper_twin = sample_module("com.example.helper", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::module("com.example.x", None))
        .with_repository(sample_repository("main", [x.clone(), lib.clone(), helper]))
        .with_repository(sample_repository("mirror", [helper_twin]));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    assert_eq!(
        identity_names(&resolution.required_resources()),
        vec!["com.example.x", "com.example.lib"]
    );

    // The optional helper was discovered without entering the solver's
    // search space, and the mirror's twin collapsed into one entry.
    let optional = resolution.optional_resources();
    assert_eq!(identity_names(&optional), vec!["com.example.helper"]);
    let wires = &resolution.optional()[&optional[0]];
    assert_eq!(wires.len(), 1);
    assert_eq!(
        wires[0].requirer().identity().unwrap().name,
        "com.example.lib"
    );
}

#[test]
fn module_closure_becomes_mandatory_and_orders_providers_first() {
    let x = ResourceBuilder::new()
        .identity("com.example.x", Version::new(1, 0, 0))
        .provide_module("com.example.x", Version::new(1, 0, 0))
        .require_module("com.example.dep", None)
        .build()
        .unwrap();
    let dep = sample_module("com.example.dep", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::module("com.example.x", None))
        .with_repository(sample_repository("main", [x.clone(), dep.clone()]))
        .with_start_levels(StartLevels::new(10, 10));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    assert_eq!(
        identity_names(&resolution.required_resources()),
        vec!["com.example.x", "com.example.dep"]
    );

    let ordered = resolution.ordered();
    assert_eq!(
        identity_names(&ordered),
        vec!["com.example.dep", "com.example.x"]
    );

    let levels: Vec<Option<i32>> = resolution
        .ordered_with_start_levels()
        .into_iter()
        .map(|(_, level)| level)
        .collect();
    assert_eq!(levels, vec![Some(10), Some(20)]);
}

#[test]
fn two_phase_resolve_reuses_the_phase_one_root_wiring() {
    let x = sample_module("com.example.x", "1.0.0");

    let spec = capsolve::RunSpec::new()
        .with_root_requirement(RequirementBuilder::module("com.example.x", None))
        .with_repository(sample_repository("main", [x.clone()]));

    let resolution = resolve_required(&spec, &GreedySolver).unwrap();
    // x's only incoming wire is the synthetic root's requirement; it must
    // survive post-processing even though the root itself is hidden.
    let wires = &resolution.required()[&x];
    assert_eq!(wires.len(), 1);
    assert_eq!(
        wires[0].requirer().identity().unwrap().name,
        ns::IDENTITY_INITIAL
    );
    assert!(resolution
        .required_resources()
        .iter()
        .all(|r| r.identity().unwrap().name != ns::IDENTITY_INITIAL));
}
