//! Variable Type Analysis (§4.9): a value-flow graph over program values,
//! condensed into strongly connected components, propagated in topological
//! order, then queried once per `invoke` site.
//!
//! Simplified relative to a full field-sensitive points-to analysis: fields
//! and indexed elements are treated as aliases of their base location
//! rather than as distinct abstract locations (field-insensitive), and a
//! value's type-set identity is keyed by its [`Type::display_name`] rather
//! than full structural/canonical identity. Both are named simplifications,
//! not correctness bugs: they can only over-approximate a node's type set,
//! never under-approximate it, so downstream `invoke` resolution never
//! drops a real implementer.

use std::collections::{HashMap, HashSet, VecDeque};

use ssa_ir::{Callee, FunctionId, InstrId, InstrKind, Program, Type, TypeData, Value};

use crate::cha::resolve_method;
use crate::graph::{value_type, CallGraph, EdgeKind};
use crate::static_cg::roots;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Node {
    Value(FunctionId, InstrId),
    Param(FunctionId, u32),
    FreeVar(FunctionId, u32),
}

fn node_of(owner: FunctionId, v: &Value) -> Option<Node> {
    match v {
        Value::Instr(id) => Some(Node::Value(owner, *id)),
        Value::Param(i) => Some(Node::Param(owner, *i)),
        Value::FreeVar(i) => Some(Node::FreeVar(owner, *i)),
        Value::Const(_) | Value::Global(_) => None,
    }
}

fn declared_type(program: &Program, node: Node) -> Option<Type> {
    let fid = match node {
        Node::Value(fid, _) | Node::Param(fid, _) | Node::FreeVar(fid, _) => fid,
    };
    let f = program.function(fid)?;
    match node {
        Node::Value(_, iid) => f.instr(iid).ty.clone(),
        Node::Param(_, i) => f.params.get(i as usize).map(|p| p.ty.clone()),
        Node::FreeVar(_, i) => f.free_vars.get(i as usize).map(|v| v.ty.clone()),
    }
}

/// A node's accumulated type set, deduplicated by display name (a
/// pragmatic stand-in for the canonicalizer's structural identity, see
/// module docs).
type TypeSet = HashMap<String, Type>;

fn insert_type(set: &mut TypeSet, ty: Type) -> bool {
    let key = ty.display_name();
    if set.contains_key(&key) {
        false
    } else {
        set.insert(key, ty);
        true
    }
}

struct FlowGraph {
    nodes: HashSet<Node>,
    edges: HashMap<Node, Vec<Node>>,
}

fn build_flow_graph(program: &Program) -> FlowGraph {
    let mut nodes = HashSet::new();
    let mut edges: HashMap<Node, Vec<Node>> = HashMap::new();
    let mut add_edge = |edges: &mut HashMap<Node, Vec<Node>>, from: Node, to: Node| {
        edges.entry(from).or_default().push(to);
    };

    // Every function result slot's source nodes, so a call site can connect
    // its own sink (the call instr, or an `Extract` of it) to whatever the
    // callee actually returns.
    let mut returns: HashMap<(FunctionId, usize), Vec<Node>> = HashMap::new();

    for fid in program.all_function_ids() {
        let Some(f) = program.function(fid) else { continue };
        for i in 0..f.params.len() {
            nodes.insert(Node::Param(fid, i as u32));
        }
        for i in 0..f.free_vars.len() {
            nodes.insert(Node::FreeVar(fid, i as u32));
        }
        for (idx, instr) in f.instrs.iter().enumerate() {
            let this = Node::Value(fid, InstrId(idx as u32));
            nodes.insert(this);
            match &instr.kind {
                InstrKind::MakeClosure { fn_, bindings } => {
                    for (i, b) in bindings.iter().enumerate() {
                        if let Some(src) = node_of(fid, b) {
                            add_edge(&mut edges, src, Node::FreeVar(*fn_, i as u32));
                        }
                    }
                }
                InstrKind::Store { addr, value } => {
                    if let (Some(dst), Some(src)) = (node_of(fid, addr), node_of(fid, value)) {
                        add_edge(&mut edges, src, dst);
                    }
                }
                InstrKind::Return { results } => {
                    for (j, r) in results.iter().enumerate() {
                        if let Some(src) = node_of(fid, r) {
                            returns.entry((fid, j)).or_default().push(src);
                        }
                    }
                }
                InstrKind::Call(_) | InstrKind::Go(_) | InstrKind::Defer(_) => {
                    // Param/return flow handled in the second pass below,
                    // once every function's node set exists.
                }
                InstrKind::Jump { .. }
                | InstrKind::If { .. }
                | InstrKind::Unreachable
                | InstrKind::RunDefers
                | InstrKind::Nop
                | InstrKind::Send { .. }
                | InstrKind::Panic { .. }
                | InstrKind::DebugRef { .. } => {}
                _ => {
                    for operand in instr.kind.operands() {
                        if let Some(src) = node_of(fid, operand) {
                            add_edge(&mut edges, src, this);
                        }
                    }
                }
            }
        }
    }

    // Second pass: argument-to-parameter and result-to-call-site edges for
    // every statically resolved call (§4.9 "param-passing ... call flows").
    // `invoke`-mode sites are resolved by the final per-site query in
    // [`resolve`] instead, since they need the propagated type sets this
    // pass is building.
    for fid in program.all_function_ids() {
        let Some(f) = program.function(fid) else { continue };
        for (idx, instr) in f.instrs.iter().enumerate() {
            let cc = match &instr.kind {
                InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
                _ => continue,
            };
            let Callee::Static { target: Some(callee), .. } = &cc.callee else { continue };
            for (i, arg) in cc.args.iter().enumerate() {
                if let Some(src) = node_of(fid, arg) {
                    add_edge(&mut edges, src, Node::Param(*callee, i as u32));
                }
            }
            let result_count = program.function(*callee).map(|g| match g.signature.data() {
                TypeData::Signature(sig) => sig.results.len(),
                _ => 0,
            });
            let Some(count) = result_count else { continue };
            let call_node = Node::Value(fid, InstrId(idx as u32));
            if count <= 1 {
                for src in returns.get(&(*callee, 0)).into_iter().flatten() {
                    add_edge(&mut edges, *src, call_node);
                }
            } else {
                for (eidx, einstr) in f.instrs.iter().enumerate() {
                    if let InstrKind::Extract { tuple, index } = &einstr.kind {
                        if matches!(tuple, Value::Instr(id) if *id == InstrId(idx as u32)) {
                            for src in returns.get(&(*callee, *index)).into_iter().flatten() {
                                add_edge(&mut edges, *src, Node::Value(fid, InstrId(eidx as u32)));
                            }
                        }
                    }
                }
            }
        }
    }

    FlowGraph { nodes, edges }
}

/// Iterative (explicit-stack) Tarjan SCC over the flow graph, avoiding
/// recursion depth proportional to program size.
fn tarjan_scc(graph: &FlowGraph) -> HashMap<Node, usize> {
    let mut index_counter = 0usize;
    let mut indices: HashMap<Node, usize> = HashMap::new();
    let mut lowlink: HashMap<Node, usize> = HashMap::new();
    let mut on_stack: HashSet<Node> = HashSet::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut scc_of: HashMap<Node, usize> = HashMap::new();
    let mut next_scc = 0usize;
    let no_edges: Vec<Node> = Vec::new();

    for &start in &graph.nodes {
        if indices.contains_key(&start) {
            continue;
        }
        // (node, next child index to visit)
        let mut work: Vec<(Node, usize)> = vec![(start, 0)];
        indices.insert(start, index_counter);
        lowlink.insert(start, index_counter);
        index_counter += 1;
        stack.push(start);
        on_stack.insert(start);

        while let Some(frame) = work.last().copied() {
            let (v, child_idx) = frame;
            let succs = graph.edges.get(&v).unwrap_or(&no_edges);
            if child_idx < succs.len() {
                let w = succs[child_idx];
                work.last_mut().expect("just peeked").1 += 1;
                if !indices.contains_key(&w) {
                    indices.insert(w, index_counter);
                    lowlink.insert(w, index_counter);
                    index_counter += 1;
                    stack.push(w);
                    on_stack.insert(w);
                    work.push((w, 0));
                } else if on_stack.contains(&w) {
                    let w_index = indices[&w];
                    let v_low = lowlink[&v];
                    lowlink.insert(v, v_low.min(w_index));
                }
            } else {
                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    let v_low = lowlink[&v];
                    let p_low = lowlink[&parent];
                    lowlink.insert(parent, p_low.min(v_low));
                }
                if lowlink[&v] == indices[&v] {
                    loop {
                        let w = stack.pop().expect("component root always on stack");
                        on_stack.remove(&w);
                        scc_of.insert(w, next_scc);
                        if w == v {
                            break;
                        }
                    }
                    next_scc += 1;
                }
            }
        }
    }

    scc_of
}

/// Propagates seeded type sets through the SCC condensation in topological
/// order (sources before sinks), so a node's final type set always
/// includes everything flowing in transitively.
fn propagate(graph: &FlowGraph, scc_of: &HashMap<Node, usize>, mut seed: HashMap<Node, TypeSet>) -> HashMap<Node, TypeSet> {
    let scc_count = scc_of.values().copied().max().map_or(0, |m| m + 1);
    let mut members: Vec<Vec<Node>> = vec![Vec::new(); scc_count];
    for (&n, &s) in scc_of {
        members[s].push(n);
    }

    let mut condensed_edges: Vec<HashSet<usize>> = vec![HashSet::new(); scc_count];
    let mut indegree = vec![0usize; scc_count];
    for (&from, tos) in &graph.edges {
        let a = scc_of[&from];
        for to in tos {
            let b = scc_of[to];
            if a != b && condensed_edges[a].insert(b) {
                indegree[b] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..scc_count).filter(|&s| indegree[s] == 0).collect();
    let mut order = Vec::with_capacity(scc_count);
    while let Some(s) = queue.pop_front() {
        order.push(s);
        for &next in &condensed_edges[s] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    for scc in order {
        let mut combined = TypeSet::new();
        for n in &members[scc] {
            if let Some(s) = seed.remove(n) {
                for (k, v) in s {
                    combined.entry(k).or_insert(v);
                }
            }
        }
        for n in &members[scc] {
            seed.insert(*n, combined.clone());
        }
        for &next in &condensed_edges[scc] {
            let mut target = std::mem::take(seed.entry(members[next][0]).or_default());
            for (k, v) in combined.clone() {
                target.entry(k).or_insert(v);
            }
            for n in &members[next] {
                seed.insert(*n, target.clone());
            }
        }
    }

    seed
}

/// Seeds every node whose declared type is concrete (non-interface): these
/// are the only origin points a type set can grow from (§4.9).
fn seed_types(program: &Program, graph: &FlowGraph) -> HashMap<Node, TypeSet> {
    let mut seed = HashMap::new();
    for &n in &graph.nodes {
        let mut set = TypeSet::new();
        if let Some(ty) = declared_type(program, n) {
            if !ty.is_interface() {
                insert_type(&mut set, ty);
            }
        }
        seed.insert(n, set);
    }
    seed
}

/// Builds the whole-program VTA call graph: resolves every `invoke` site
/// against the receiver node's propagated type set, then closes the
/// resulting static+dynamic edge set to what's reachable from [`roots`].
pub fn build(program: &Program) -> CallGraph {
    let flow = build_flow_graph(program);
    let scc_of = tarjan_scc(&flow);
    let seed = seed_types(program, &flow);
    let types = propagate(&flow, &scc_of, seed);

    let mut graph = CallGraph::new();
    for fid in program.all_function_ids() {
        let Some(f) = program.function(fid) else { continue };
        for (idx, instr) in f.instrs.iter().enumerate() {
            let cc = match &instr.kind {
                InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
                _ => continue,
            };
            let site = InstrId(idx as u32);
            match &cc.callee {
                Callee::Static { target: Some(callee), .. } => {
                    graph.add_edge(fid, *callee, site, EdgeKind::Static);
                }
                Callee::Static { target: None, .. } => {}
                Callee::Invoke { receiver, method } => {
                    let Some(recv_node) = node_of(fid, receiver) else { continue };
                    let Some(set) = types.get(&recv_node) else { continue };
                    let Some(recv_ty) = value_type(program, &f, receiver) else { continue };
                    let underlying = recv_ty.underlying();
                    let TypeData::Interface(iface) = underlying.data() else { continue };
                    for candidate in set.values() {
                        if !iface.implemented_by(candidate) {
                            continue;
                        }
                        if let Some(callee) = resolve_method(program, candidate, method) {
                            graph.add_edge(fid, callee, site, EdgeKind::Dynamic);
                        }
                    }
                }
            }
        }
    }

    close_to_reachable(program, &graph)
}

/// Restricts `graph` to the subset reachable from [`roots`] (§4.6-style
/// reachability, layered on top of VTA's whole-program edge resolution).
fn close_to_reachable(program: &Program, graph: &CallGraph) -> CallGraph {
    let mut reachable: HashSet<FunctionId> = HashSet::new();
    let mut queue: VecDeque<FunctionId> = roots(program).into_iter().collect();
    for id in &queue {
        reachable.insert(*id);
    }
    let mut by_caller: HashMap<FunctionId, Vec<&crate::graph::CallEdge>> = HashMap::new();
    for e in &graph.edges {
        by_caller.entry(e.caller).or_default().push(e);
    }

    let mut out = CallGraph::new();
    for id in &reachable {
        out.add_node(*id);
    }
    while let Some(caller) = queue.pop_front() {
        for e in by_caller.get(&caller).into_iter().flatten() {
            out.add_edge(e.caller, e.callee, e.site, e.kind);
            if reachable.insert(e.callee) {
                queue.push_back(e.callee);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use ssa_ir::input::CheckedPackage;
    use ssa_ir::{
        BuildMode, CallCommon, Function, InterfaceType, Member, Method, NamedType, Package,
        SignatureType, StructType,
    };

    use super::*;

    fn checked_package(path: &str) -> CheckedPackage {
        CheckedPackage { path: path.into(), files: vec![], decls: vec![], imports: vec![] }
    }

    fn empty_sig(results: Vec<Type>) -> SignatureType {
        SignatureType { params: vec![], variadic: false, results, type_params: vec![], receiver: None }
    }

    fn speak_method() -> Method {
        Method { pkg: String::new(), name: "Speak".into(), signature: empty_sig(vec![]), pointer_receiver: false, index_path: vec![] }
    }

    fn named(name: &str) -> Type {
        Type::new(TypeData::Named(NamedType {
            package: "models".into(),
            name: name.into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods: vec![speak_method()],
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }))
    }

    /// `main` stores a `Dog`-typed value into a local, loads it back out, and
    /// invokes `Speak` through it — the flow a field-insensitive VTA must
    /// trace from the `Alloc`/`Store` pair through the `Load` to the call
    /// site, without `Cat` ever entering the propagated type set.
    #[test]
    fn invoke_site_resolves_only_against_the_propagated_type_set() {
        let program = Program::new(BuildMode::new());

        let dog_speak = program.alloc_function_id();
        let speak_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        program.insert_function(Function::new_stub(dog_speak, "Dog.Speak".into(), speak_sig.clone(), None));
        let cat_speak = program.alloc_function_id();
        program.insert_function(Function::new_stub(cat_speak, "Cat.Speak".into(), speak_sig, None));

        let models_id = program.alloc_package_id();
        let mut models = Package::new(models_id, "models".into(), true, checked_package("models"));
        models.insert_member("Dog".into(), Member::Type { ty: named("Dog"), methods: vec![speak_method()] });
        models.insert_member("Dog.Speak".into(), Member::Function(dog_speak));
        models.insert_member("Cat".into(), Member::Type { ty: named("Cat"), methods: vec![speak_method()] });
        models.insert_member("Cat.Speak".into(), Member::Function(cat_speak));
        program.insert_package(models);

        let iface = Type::new(TypeData::Interface(InterfaceType { methods: vec![speak_method()], type_set: None }));
        let main_id = program.alloc_function_id();
        let main_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        let mut main = Function::new_stub(main_id, "main".into(), main_sig, None);
        let entry = main.new_block(None);
        let slot = main.emit(entry, InstrKind::Alloc { heap: false, comment: "v".into() }, Some(iface.clone()));
        let dog_value = main.emit(entry, InstrKind::Alloc { heap: true, comment: "dogval".into() }, Some(named("Dog")));
        main.emit(entry, InstrKind::Store { addr: Value::Instr(slot), value: Value::Instr(dog_value) }, None);
        let loaded = main.emit(entry, InstrKind::Load { addr: Value::Instr(slot) }, Some(iface));
        main.emit(
            entry,
            InstrKind::Call(CallCommon {
                callee: Callee::Invoke { receiver: Value::Instr(loaded), method: "Speak".into() },
                args: vec![],
                ellipsis: false,
            }),
            None,
        );
        main.emit(entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(main);

        let app_id = program.alloc_package_id();
        let mut app = Package::new(app_id, "app".into(), true, checked_package("app"));
        app.insert_member("main".into(), Member::Function(main_id));
        program.insert_package(app);

        let graph = build(&program);
        let callees: Vec<_> = graph.callees(main_id).collect();
        let dynamic: Vec<_> = callees.iter().filter(|e| e.kind == EdgeKind::Dynamic).collect();
        assert_eq!(dynamic.len(), 1, "only the concrete type that actually flowed into the variable resolves");
        assert_eq!(dynamic[0].callee, dog_speak);
    }

    #[test]
    fn result_unreachable_from_roots_is_pruned_by_the_final_closure() {
        let program = Program::new(BuildMode::new());
        let orphan_id = program.alloc_function_id();
        let orphan_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        let mut orphan = Function::new_stub(orphan_id, "Widget.orphan".into(), orphan_sig, None);
        let entry = orphan.new_block(None);
        orphan.emit(entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(orphan);

        // No package registers `orphan`, and no root calls it, so it must
        // not survive `close_to_reachable`.
        let graph = build(&program);
        assert!(!graph.nodes.contains(&orphan_id));
    }
}
