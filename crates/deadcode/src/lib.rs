//! Dead-code reporter (§4.10): groups source-level functions absent from
//! an RTA reachability set by package, in a stable order, plus an optional
//! "why-live" shortest-path query.

use std::collections::{HashMap, HashSet, VecDeque};

use ssa_callgraph::{static_cg, CallEdge, CallGraph, EdgeKind};
use ssa_ir::input::Position;
use ssa_ir::{FunctionId, Program};

#[derive(Debug, Clone)]
pub struct DeadFunction {
    pub id: FunctionId,
    pub name: String,
    pub package: String,
    pub pos: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct PackageReport {
    pub package: String,
    pub functions: Vec<DeadFunction>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub packages: Vec<PackageReport>,
    /// Declarations skipped because their file is marked generated and the
    /// caller didn't override that (§4.10).
    pub skipped_generated: usize,
}

fn pos_key(pos: &Option<Position>) -> (String, usize) {
    match pos {
        Some(p) => (p.file.to_string_lossy().into_owned(), p.line),
        None => (String::new(), 0),
    }
}

/// Groups every declared function absent from `reachable.nodes` by
/// package, skipping synthetic functions (dead-code reporting is a
/// source-level concept) and, unless `include_generated`, functions
/// declared in a generated file.
pub fn report(program: &Program, reachable: &CallGraph, include_generated: bool) -> Report {
    let mut packages = Vec::new();
    let mut skipped_generated = 0usize;

    for path in program.package_paths() {
        let Some(pkg) = program.package(&path) else { continue };
        let mut dead = Vec::new();
        for fid in pkg.functions() {
            if reachable.nodes.contains(&fid) {
                continue;
            }
            let Some(f) = program.function(fid) else { continue };
            if !f.has_source || f.synthetic.is_some() {
                continue;
            }
            if f.generated && !include_generated {
                skipped_generated += 1;
                continue;
            }
            dead.push(DeadFunction { id: fid, name: f.name.clone(), package: path.clone(), pos: f.pos.clone() });
        }
        if dead.is_empty() {
            continue;
        }
        dead.sort_by(|a, b| pos_key(&a.pos).cmp(&pos_key(&b.pos)).then_with(|| a.name.cmp(&b.name)));
        packages.push(PackageReport { package: path, functions: dead });
    }
    packages.sort_by(|a, b| a.package.cmp(&b.package));

    Report { packages, skipped_generated }
}

/// Heuristic "is this a test package" signal: the data model carries no
/// richer marker than the package path itself (§4.10 "non-test packages").
fn looks_like_test_package(path: &str) -> bool {
    path.contains("_test")
}

fn package_of(program: &Program, id: FunctionId) -> Option<String> {
    let pkg_id = program.function(id)?.package?;
    program.package_paths().into_iter().find(|p| program.package(p).is_some_and(|pk| pk.id == pkg_id))
}

/// Orders roots by §4.10's why-live preference: non-test package first,
/// then `main` over `init`, then a stable fallback so ties are
/// deterministic.
fn ranked_roots(program: &Program) -> Vec<FunctionId> {
    let mut roots = static_cg::roots(program);
    roots.sort_by_key(|&id| {
        let f = program.function(id);
        let name = f.as_ref().map(|f| f.name.clone()).unwrap_or_default();
        let package = package_of(program, id).unwrap_or_default();
        let is_test_pkg = looks_like_test_package(&package);
        let is_init_not_main = name != "main";
        (is_test_pkg, is_init_not_main, package, name)
    });
    roots
}

fn edges_by_caller(graph: &CallGraph, static_only: bool) -> HashMap<FunctionId, Vec<CallEdge>> {
    let mut map: HashMap<FunctionId, Vec<CallEdge>> = HashMap::new();
    for e in &graph.edges {
        if static_only && e.kind != EdgeKind::Static {
            continue;
        }
        map.entry(e.caller).or_default().push(e.clone());
    }
    map
}

fn bfs(roots: &[FunctionId], by_caller: &HashMap<FunctionId, Vec<CallEdge>>, target: FunctionId) -> Option<Vec<CallEdge>> {
    let mut visited: HashSet<FunctionId> = HashSet::new();
    let mut parent: HashMap<FunctionId, CallEdge> = HashMap::new();
    let mut queue: VecDeque<FunctionId> = VecDeque::new();
    for &r in roots {
        if visited.insert(r) {
            queue.push_back(r);
        }
    }
    if roots.contains(&target) {
        return Some(Vec::new());
    }
    while let Some(cur) = queue.pop_front() {
        for e in by_caller.get(&cur).into_iter().flatten() {
            if visited.insert(e.callee) {
                parent.insert(e.callee, e.clone());
                if e.callee == target {
                    let mut path = Vec::new();
                    let mut node = target;
                    while let Some(step) = parent.get(&node) {
                        path.push(step.clone());
                        node = step.caller;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(e.callee);
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct WhyLive {
    pub path: Vec<CallEdge>,
    pub used_dynamic_edge: bool,
}

/// Finds a shortest path from some root to `target` (§4.10 "why-live"):
/// prefers a path that avoids dynamic edges entirely, falling back to one
/// that uses them only if no static-only path exists. `None` means
/// `target` is reachable only via reflection (or isn't reachable at all).
pub fn why_live(program: &Program, graph: &CallGraph, target: FunctionId) -> Option<WhyLive> {
    let roots = ranked_roots(program);

    let static_edges = edges_by_caller(graph, true);
    if let Some(path) = bfs(&roots, &static_edges, target) {
        return Some(WhyLive { path, used_dynamic_edge: false });
    }

    let all_edges = edges_by_caller(graph, false);
    bfs(&roots, &all_edges, target).map(|path| {
        let used_dynamic_edge = path.iter().any(|e| e.kind == EdgeKind::Dynamic);
        WhyLive { path, used_dynamic_edge }
    })
}

#[cfg(test)]
mod tests {
    use ssa_ir::input::{CheckedPackage, Position};
    use ssa_ir::{BuildMode, Function, InstrId, Member, Package, SignatureType};

    use super::*;

    fn checked_package(path: &str) -> CheckedPackage {
        CheckedPackage { path: path.into(), files: vec![], decls: vec![], imports: vec![] }
    }

    fn free_fn_sig() -> ssa_ir::Type {
        ssa_ir::Type::new(ssa_ir::TypeData::Signature(SignatureType {
            params: vec![],
            variadic: false,
            results: vec![],
            type_params: vec![],
            receiver: None,
        }))
    }

    fn register(program: &Program, pkg: &mut Package, name: &str, pos: Option<Position>, generated: bool, synthetic: bool) -> FunctionId {
        register_with_sig(program, pkg, name, pos, generated, synthetic, free_fn_sig())
    }

    /// A signature with a generic receiver: excluded from
    /// `static_cg::roots` by itself, so the function is only reachable
    /// through whatever edges a test wires up manually.
    fn non_root_sig() -> ssa_ir::Type {
        let tparam = ssa_ir::TypeParamType {
            name: "T".into(),
            index: 0,
            constraint: Box::new(ssa_ir::Type::new(ssa_ir::TypeData::Interface(ssa_ir::InterfaceType {
                methods: vec![],
                type_set: None,
            }))),
        };
        let recv = ssa_ir::Type::new(ssa_ir::TypeData::Named(ssa_ir::NamedType {
            package: "app".into(),
            name: "Box".into(),
            underlying: Box::new(ssa_ir::Type::new(ssa_ir::TypeData::Struct(ssa_ir::StructType { fields: vec![] }))),
            methods: vec![],
            origin: None,
            type_params: vec![tparam],
            type_args: vec![],
        }));
        ssa_ir::Type::new(ssa_ir::TypeData::Signature(SignatureType {
            params: vec![],
            variadic: false,
            results: vec![],
            type_params: vec![],
            receiver: Some(Box::new(recv)),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn register_with_sig(
        program: &Program,
        pkg: &mut Package,
        name: &str,
        pos: Option<Position>,
        generated: bool,
        synthetic: bool,
        sig: ssa_ir::Type,
    ) -> FunctionId {
        let id = program.alloc_function_id();
        let mut f = Function::new_stub(id, name.into(), sig, None);
        f.pos = pos;
        f.generated = generated;
        if synthetic {
            f.synthetic = Some(ssa_ir::SyntheticKind::Wrapper);
        }
        program.insert_function(f);
        pkg.insert_member(name.into(), Member::Function(id));
        id
    }

    #[test]
    fn report_groups_dead_functions_and_skips_generated_unless_overridden() {
        let program = Program::new(BuildMode::new());
        let pkg_id = program.alloc_package_id();
        let mut pkg = Package::new(pkg_id, "app".into(), true, checked_package("app"));

        let live = register(&program, &mut pkg, "main", Some(Position::new("app.go", 1, 1)), false, false);
        register(&program, &mut pkg, "unused", Some(Position::new("app.go", 10, 1)), false, false);
        register(&program, &mut pkg, "genUnused", Some(Position::new("app_gen.go", 1, 1)), true, false);
        register(&program, &mut pkg, "thunk#1", None, false, true);
        program.insert_package(pkg);

        let mut graph = CallGraph::new();
        graph.add_node(live);

        let report_default = report(&program, &graph, false);
        assert_eq!(report_default.packages.len(), 1);
        let names: Vec<_> = report_default.packages[0].functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["unused"]);
        assert_eq!(report_default.skipped_generated, 1);

        let report_with_generated = report(&program, &graph, true);
        let names: Vec<_> = report_with_generated.packages[0].functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["unused", "genUnused"]);
        assert_eq!(report_with_generated.skipped_generated, 0);
    }

    #[test]
    fn why_live_prefers_a_static_only_path_over_a_shorter_dynamic_one() {
        let program = Program::new(BuildMode::new());
        let pkg_id = program.alloc_package_id();
        let mut pkg = Package::new(pkg_id, "app".into(), true, checked_package("app"));
        let root = register(&program, &mut pkg, "main", Some(Position::new("app.go", 1, 1)), false, false);
        let mid = register_with_sig(&program, &mut pkg, "helper", Some(Position::new("app.go", 5, 1)), false, false, non_root_sig());
        let target_static = register_with_sig(&program, &mut pkg, "deepHelper", Some(Position::new("app.go", 9, 1)), false, false, non_root_sig());
        let target_dynamic = register_with_sig(&program, &mut pkg, "onlyViaInterface", Some(Position::new("app.go", 13, 1)), false, false, non_root_sig());
        program.insert_package(pkg);

        let mut graph = CallGraph::new();
        graph.add_edge(root, mid, InstrId(0), EdgeKind::Static);
        graph.add_edge(mid, target_static, InstrId(0), EdgeKind::Static);
        graph.add_edge(root, target_dynamic, InstrId(1), EdgeKind::Dynamic);

        let via_static = why_live(&program, &graph, target_static).expect("reachable");
        assert!(!via_static.used_dynamic_edge);
        assert_eq!(via_static.path.len(), 2);

        let via_dynamic = why_live(&program, &graph, target_dynamic).expect("reachable");
        assert!(via_dynamic.used_dynamic_edge);
        assert_eq!(via_dynamic.path.len(), 1);

        let unreachable = Program::new(BuildMode::new()).alloc_function_id();
        assert!(why_live(&program, &graph, unreachable).is_none());
    }
}
