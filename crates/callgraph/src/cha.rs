//! Class-hierarchy analysis (§4.7): every `invoke`-mode call site fans out
//! to every concrete type implementing the interface, with no attempt to
//! narrow by what's actually reachable or what types are actually
//! constructed (that refinement is RTA's/VTA's job).

use ssa_ir::{Callee, FunctionId, InstrId, InstrKind, Member, Program, Type, TypeData};

use crate::graph::{value_type, CallGraph, EdgeKind};

/// Every named, non-interface type declared by any package in the program —
/// the candidate set an `invoke`-mode site's receiver is checked against.
fn concrete_types(program: &Program) -> Vec<Type> {
    let mut out = Vec::new();
    for path in program.package_paths() {
        let Some(pkg) = program.package(&path) else { continue };
        for (_, member) in pkg.members() {
            if let Member::Type { ty, .. } = member {
                if !ty.is_interface() {
                    out.push(ty.clone());
                }
            }
        }
    }
    out
}

/// Resolves `(type, method)` to the declaring `FunctionId` by looking the
/// method up in the type's own declaring package (§4.7: dispatch is
/// resolved per (package, name), and a method always lives in the package
/// that declares its receiver type).
pub(crate) fn resolve_method(program: &Program, candidate: &Type, method: &str) -> Option<FunctionId> {
    let TypeData::Named(n) = candidate.data() else { return None };
    let pkg = program.package(&n.package)?;
    pkg.method(&n.name, method)
}

/// Builds the CHA call graph for the whole program: nodes are every
/// function with a body; edges are every static call plus, for every
/// `invoke`-mode site, one edge per implementer of the receiver's
/// interface type (§4.7).
pub fn build(program: &Program) -> CallGraph {
    let mut graph = CallGraph::new();
    let concrete = concrete_types(program);

    for id in program.all_function_ids() {
        let Some(f) = program.function(id) else { continue };
        if f.blocks.is_empty() {
            continue;
        }
        graph.add_node(id);

        for (idx, instr) in f.instrs.iter().enumerate() {
            let cc = match &instr.kind {
                InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
                _ => continue,
            };
            let site = InstrId(idx as u32);
            match &cc.callee {
                Callee::Static { target: Some(callee), .. } => {
                    graph.add_edge(id, *callee, site, EdgeKind::Static);
                }
                Callee::Static { target: None, .. } => {}
                Callee::Invoke { receiver, method } => {
                    let Some(recv_ty) = value_type(program, &f, receiver) else { continue };
                    let underlying = recv_ty.underlying();
                    let TypeData::Interface(iface) = underlying.data() else { continue };
                    for candidate in &concrete {
                        if !iface.implemented_by(candidate) {
                            continue;
                        }
                        if let Some(callee) = resolve_method(program, candidate, method) {
                            graph.add_edge(id, callee, site, EdgeKind::Dynamic);
                        }
                    }
                }
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use ssa_ir::input::CheckedPackage;
    use ssa_ir::{
        BasicKind, BuildMode, CallCommon, Function, InterfaceType, Method, NamedType, Package,
        Param, SignatureType, StructType, Value,
    };

    use super::*;

    fn empty_sig(results: Vec<Type>) -> SignatureType {
        SignatureType { params: vec![], variadic: false, results, type_params: vec![], receiver: None }
    }

    fn speak_method(results: Vec<Type>) -> Method {
        Method {
            pkg: String::new(),
            name: "Speak".into(),
            signature: empty_sig(results),
            pointer_receiver: false,
            index_path: vec![],
        }
    }

    fn named(name: &str, methods: Vec<Method>) -> Type {
        Type::new(TypeData::Named(NamedType {
            package: "models".into(),
            name: name.into(),
            underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
            methods,
            origin: None,
            type_params: vec![],
            type_args: vec![],
        }))
    }

    fn checked_package(path: &str) -> CheckedPackage {
        CheckedPackage { path: path.into(), files: vec![], decls: vec![], imports: vec![] }
    }

    /// A package `models` declaring `Dog` and `Cat`, each with a `Speak`
    /// method function, plus an `app` package whose `main` invokes `Speak`
    /// on an interface-typed parameter. Returns `(program, main_id, iface)`.
    fn invoke_fixture(cat_signature_matches: bool) -> (Program, FunctionId, Type) {
        let program = Program::new(BuildMode::new());

        let dog_speak = program.alloc_function_id();
        let dog_speak_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        program.insert_function(Function::new_stub(dog_speak, "Dog.Speak".into(), dog_speak_sig, None));

        let cat_speak = program.alloc_function_id();
        let cat_results = if cat_signature_matches { vec![] } else { vec![Type::new(TypeData::Basic(BasicKind::Int))] };
        let cat_speak_sig = Type::new(TypeData::Signature(empty_sig(cat_results.clone())));
        program.insert_function(Function::new_stub(cat_speak, "Cat.Speak".into(), cat_speak_sig, None));

        let models_id = program.alloc_package_id();
        let mut models = Package::new(models_id, "models".into(), true, checked_package("models"));
        let dog_ty = named("Dog", vec![speak_method(vec![])]);
        let cat_ty = named("Cat", vec![speak_method(cat_results)]);
        models.insert_member("Dog".into(), Member::Type { ty: dog_ty, methods: vec![speak_method(vec![])] });
        models.insert_member("Dog.Speak".into(), Member::Function(dog_speak));
        models.insert_member("Cat".into(), Member::Type { ty: cat_ty, methods: vec![] });
        models.insert_member("Cat.Speak".into(), Member::Function(cat_speak));
        program.insert_package(models);

        let iface = Type::new(TypeData::Interface(InterfaceType { methods: vec![speak_method(vec![])], type_set: None }));

        let main_id = program.alloc_function_id();
        let main_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        let mut main = Function::new_stub(main_id, "main".into(), main_sig, None);
        main.params.push(Param { name: "animal".into(), ty: iface.clone() });
        let entry = main.new_block(None);
        main.emit(
            entry,
            InstrKind::Call(CallCommon {
                callee: Callee::Invoke { receiver: Value::Param(0), method: "Speak".into() },
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

        (program, main_id, iface)
    }

    #[test]
    fn invoke_site_fans_out_to_every_matching_implementer() {
        let (program, main_id, _iface) = invoke_fixture(true);
        let graph = build(&program);
        let callees: Vec<_> = graph.callees(main_id).collect();
        assert_eq!(callees.len(), 2, "both Dog.Speak and Cat.Speak implement the interface");
        assert!(callees.iter().all(|e| e.kind == EdgeKind::Dynamic));
    }

    #[test]
    fn invoke_site_skips_implementer_with_mismatched_signature() {
        let (program, main_id, _iface) = invoke_fixture(false);
        let graph = build(&program);
        let callees: Vec<_> = graph.callees(main_id).collect();
        assert_eq!(callees.len(), 1, "Cat.Speak's differing result type must not satisfy the interface");
    }

    #[test]
    fn static_call_produces_one_static_edge() {
        let program = Program::new(BuildMode::new());
        let callee_id = program.alloc_function_id();
        let callee_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        let mut callee = Function::new_stub(callee_id, "helper".into(), callee_sig, None);
        let callee_entry = callee.new_block(None);
        callee.emit(callee_entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(callee);

        let caller_sig = Type::new(TypeData::Signature(empty_sig(vec![])));
        let caller_id = program.alloc_function_id();
        let mut caller = Function::new_stub(caller_id, "main".into(), caller_sig, None);
        let entry = caller.new_block(None);
        caller.emit(
            entry,
            InstrKind::Call(CallCommon {
                callee: Callee::Static { value: Value::Param(0), target: Some(callee_id) },
                args: vec![],
                ellipsis: false,
            }),
            None,
        );
        caller.emit(entry, InstrKind::Return { results: vec![] }, None);
        program.insert_function(caller);

        let graph = build(&program);
        let callees: Vec<_> = graph.callees(caller_id).collect();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].callee, callee_id);
        assert_eq!(callees[0].kind, EdgeKind::Static);
    }
}
