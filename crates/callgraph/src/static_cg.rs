//! Static call graph (§4.6): closes the reachable set under static calls
//! only, starting from every package-level function and every method of a
//! non-interface, non-generic named type.

use std::collections::VecDeque;

use ssa_ir::{Callee, FunctionId, InstrKind, NamedType, Program, SignatureType, Type, TypeData};

use crate::graph::{CallGraph, EdgeKind};

fn concrete_named(ty: &Type) -> Option<&NamedType> {
    match ty.data() {
        TypeData::Named(n) => Some(n),
        TypeData::Pointer(inner) => concrete_named(inner),
        _ => None,
    }
}

/// True for a package-level function (no receiver) or a method of a
/// concrete, non-generic named type (§4.6 "roots").
fn is_root(sig: &SignatureType) -> bool {
    match &sig.receiver {
        None => true,
        Some(recv) => concrete_named(recv).is_some_and(|n| n.type_params.is_empty()),
    }
}

/// Every package-level function and every method of a concrete, non-generic
/// named type (§4.6 "roots") — reused by RTA, VTA's reachability closure,
/// and the dead-code reporter's root set.
pub fn roots(program: &Program) -> Vec<FunctionId> {
    let mut out = Vec::new();
    for path in program.package_paths() {
        let Some(pkg) = program.package(&path) else { continue };
        for fid in pkg.functions() {
            let Some(f) = program.function(fid) else { continue };
            let TypeData::Signature(sig) = f.signature.data() else { continue };
            if is_root(sig) {
                out.push(fid);
            }
        }
    }
    out
}

/// Builds the static call graph for the whole program: a worklist DFS from
/// [`roots`] following only [`Callee::Static`] edges with a known target
/// (§4.6 "one edge per call site").
pub fn build(program: &Program) -> CallGraph {
    let mut graph = CallGraph::new();
    let mut queue: VecDeque<FunctionId> = roots(program).into_iter().collect();
    let mut seen: std::collections::HashSet<FunctionId> = queue.iter().copied().collect();
    for id in &queue {
        graph.add_node(*id);
    }

    while let Some(caller) = queue.pop_front() {
        let Some(f) = program.function(caller) else { continue };
        for (idx, instr) in f.instrs.iter().enumerate() {
            let cc = match &instr.kind {
                InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
                _ => continue,
            };
            let Callee::Static { target: Some(callee), .. } = &cc.callee else { continue };
            let site = ssa_ir::InstrId(idx as u32);
            graph.add_edge(caller, *callee, site, EdgeKind::Static);
            if seen.insert(*callee) {
                queue.push_back(*callee);
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use ssa_ir::input::CheckedPackage;
    use ssa_ir::{
        BuildMode, CallCommon, Function, InterfaceType, Member, Package, StructType, TypeParamType,
        Value,
    };

    use super::*;

    fn checked_package(path: &str) -> CheckedPackage {
        CheckedPackage { path: path.into(), files: vec![], decls: vec![], imports: vec![] }
    }

    fn empty_sig(receiver: Option<Box<Type>>) -> SignatureType {
        SignatureType { params: vec![], variadic: false, results: vec![], type_params: vec![], receiver }
    }

    fn named_type(name: &str, type_params: Vec<TypeParamType>) -> Type {
        Type::new(TypeData::Named(NamedType {
            package: "app".into(),
            name: name.into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods: vec![],
            origin: None,
            type_params,
            type_args: vec![],
        }))
    }

    #[test]
    fn method_of_generic_receiver_is_excluded_but_reachable_via_a_call() {
        let program = Program::new(BuildMode::new());

        let tparam = TypeParamType {
            name: "T".into(),
            index: 0,
            constraint: Box::new(Type::new(TypeData::Interface(InterfaceType { methods: vec![], type_set: None }))),
        };
        let box_ty = named_type("Box", vec![tparam]);

        let b_id = program.alloc_function_id();
        let b_sig = Type::new(TypeData::Signature(empty_sig(Some(Box::new(box_ty)))));
        let mut b = Function::new_stub(b_id, "Box.Get".into(), b_sig, None);
        let b_entry = b.new_block(None);
        b.emit(b_entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(b);

        let a_id = program.alloc_function_id();
        let a_sig = Type::new(TypeData::Signature(empty_sig(None)));
        let mut a = Function::new_stub(a_id, "a".into(), a_sig, None);
        let a_entry = a.new_block(None);
        a.emit(
            a_entry,
            InstrKind::Call(CallCommon {
                callee: Callee::Static { value: Value::Param(0), target: Some(b_id) },
                args: vec![],
                ellipsis: false,
            }),
            None,
        );
        a.emit(a_entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(a);

        let pkg_id = program.alloc_package_id();
        let mut pkg = Package::new(pkg_id, "app".into(), true, checked_package("app"));
        pkg.insert_member("a".into(), Member::Function(a_id));
        pkg.insert_member("Box.Get".into(), Member::Function(b_id));
        program.insert_package(pkg);

        let root_ids = roots(&program);
        assert!(root_ids.contains(&a_id), "a package-level function is always a root");
        assert!(!root_ids.contains(&b_id), "a method on a generic receiver is not a root by itself");

        let graph = build(&program);
        assert!(graph.nodes.contains(&b_id), "still reachable transitively via a's static call");
        let edges: Vec<_> = graph.callees(a_id).collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].callee, b_id);
        assert_eq!(edges[0].kind, EdgeKind::Static);
    }

    #[test]
    fn method_of_concrete_receiver_is_a_root_even_if_uncalled() {
        let program = Program::new(BuildMode::new());
        let widget_ty = named_type("Widget", vec![]);
        let fmt_id = program.alloc_function_id();
        let fmt_sig = Type::new(TypeData::Signature(empty_sig(Some(Box::new(widget_ty)))));
        let mut fmt = Function::new_stub(fmt_id, "Widget.Format".into(), fmt_sig, None);
        let entry = fmt.new_block(None);
        fmt.emit(entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(fmt);

        let pkg_id = program.alloc_package_id();
        let mut pkg = Package::new(pkg_id, "app".into(), true, checked_package("app"));
        pkg.insert_member("Widget.Format".into(), Member::Function(fmt_id));
        program.insert_package(pkg);

        assert!(roots(&program).contains(&fmt_id));
    }
}
