//! Rapid Type Analysis (§4.8): a work-list fixed point over reachable
//! functions and the set of types ever observed at an `interface-make`,
//! closed under reflection reachability. Narrower than CHA because an
//! `invoke`-mode site only fans out to implementers of a type the program
//! is actually known to construct.

use std::collections::{HashSet, VecDeque};

use ssa_ir::{Callee, FunctionId, InstrId, InstrKind, Program, Type, TypeData};

use crate::cha::resolve_method;
use crate::graph::{value_type, CallGraph, EdgeKind};

/// `main`/`init` of each main package (§4.8 "typically init and main of
/// each main package") — narrower than [`crate::static_cg::roots`], whose
/// whole-program root set exists to give CHA/the static graph a
/// conservative over-approximation rather than an actual runtime entry
/// point set. A package is "main" by the same convention the source
/// language itself uses: its path is literally `main`. Every other
/// package's `init` becomes reachable transitively, through the call the
/// main package's own synthesized initializer makes to it (§4.3 "Package
/// initializers"), so it doesn't need to be seeded here directly.
fn roots(program: &Program) -> Vec<FunctionId> {
    let mut out = Vec::new();
    let Some(pkg) = program.package("main") else { return out };
    for fid in pkg.functions() {
        let Some(f) = program.function(fid) else { continue };
        if f.name == "main" || f.name == "init" || f.name.starts_with("init#") {
            out.push(fid);
        }
    }
    out
}

/// The types directly reachable from `ty` by field/element access —
/// reflection can walk into a struct's fields or a container's elements
/// without an explicit `interface-make` at each step.
fn reflect_children(ty: &Type) -> Vec<Type> {
    match ty.data() {
        TypeData::Pointer(e) => vec![(**e).clone()],
        TypeData::Array(a) => vec![(*a.elem).clone()],
        TypeData::Slice(e) => vec![(**e).clone()],
        TypeData::Map(m) => vec![(*m.key).clone(), (*m.value).clone()],
        TypeData::Chan(c) => vec![(*c.elem).clone()],
        TypeData::Struct(s) => s.fields.iter().map(|f| f.ty.clone()).collect(),
        TypeData::Named(n) => vec![(*n.underlying).clone()],
        _ => Vec::new(),
    }
}

/// Closes `program`'s runtime-type set under [`reflect_children`], feeding
/// newly discovered types back through [`Program::record_runtime_type`] so
/// the canonical dedup it already performs is reused rather than
/// reimplemented here.
fn close_runtime_types(program: &Program) -> Vec<Type> {
    let mut queue: VecDeque<Type> = program.runtime_types().into_iter().collect();
    while let Some(ty) = queue.pop_front() {
        for child in reflect_children(&ty) {
            if program.record_runtime_type(child.clone()) {
                queue.push_back(child);
            }
        }
    }
    program.runtime_types()
}

/// Builds the RTA call graph: reachable functions start from [`roots`] and
/// grow only by following edges actually exercised from an already-reachable
/// function, narrowing `invoke`-mode fan-out to implementers of a type the
/// program is known to construct. Generic instantiation wrappers and
/// origins become reachable the ordinary way, the first time a reachable
/// caller's static edge reaches them — no special-casing needed since
/// instantiation is lowered as a thin forwarding shim (§4.3).
pub fn build(program: &Program) -> CallGraph {
    let mut graph = CallGraph::new();
    let runtime_types = close_runtime_types(program);

    let mut reachable: HashSet<FunctionId> = HashSet::new();
    let mut queue: VecDeque<FunctionId> = VecDeque::new();
    for id in roots(program) {
        if reachable.insert(id) {
            graph.add_node(id);
            queue.push_back(id);
        }
    }

    while let Some(caller) = queue.pop_front() {
        let Some(f) = program.function(caller) else { continue };
        for (idx, instr) in f.instrs.iter().enumerate() {
            let cc = match &instr.kind {
                InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => cc,
                _ => continue,
            };
            let site = InstrId(idx as u32);
            let mut newly_reachable = Vec::new();
            match &cc.callee {
                Callee::Static { target: Some(callee), .. } => {
                    graph.add_edge(caller, *callee, site, EdgeKind::Static);
                    newly_reachable.push(*callee);
                }
                Callee::Static { target: None, .. } => {}
                Callee::Invoke { receiver, method } => {
                    let Some(recv_ty) = value_type(program, &f, receiver) else { continue };
                    let underlying = recv_ty.underlying();
                    let TypeData::Interface(iface) = underlying.data() else { continue };
                    for candidate in &runtime_types {
                        if !iface.implemented_by(candidate) {
                            continue;
                        }
                        if let Some(callee) = resolve_method(program, candidate, method) {
                            graph.add_edge(caller, callee, site, EdgeKind::Dynamic);
                            newly_reachable.push(callee);
                        }
                    }
                }
            }
            for callee in newly_reachable {
                if reachable.insert(callee) {
                    graph.add_node(callee);
                    queue.push_back(callee);
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
        BuildMode, CallCommon, Function, InterfaceType, Member, Method, NamedType, Package, Param,
        SignatureType, StructType, Value,
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

    /// A `models` package declaring `Dog` and `Cat`, an `iface` interface
    /// requiring `Speak`, and a `main` package whose `main` invokes `Speak`
    /// on an interface-typed parameter. Only `Dog` is recorded as an
    /// observed runtime type.
    fn fixture() -> (Program, FunctionId) {
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
        main.params.push(Param { name: "animal".into(), ty: iface });
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

        let main_pkg_id = program.alloc_package_id();
        let mut main_pkg = Package::new(main_pkg_id, "main".into(), false, checked_package("main"));
        main_pkg.insert_member("main".into(), Member::Function(main_id));
        program.insert_package(main_pkg);

        program.record_runtime_type(named("Dog"));

        (program, main_id)
    }

    #[test]
    fn roots_are_main_and_init_of_the_main_package() {
        let (program, main_id) = fixture();
        let ids = roots(&program);
        assert_eq!(ids, vec![main_id]);
    }

    #[test]
    fn invoke_site_narrows_to_observed_runtime_types_only() {
        let (program, main_id) = fixture();
        let graph = build(&program);
        let callees: Vec<_> = graph.callees(main_id).collect();
        assert_eq!(callees.len(), 1, "Cat was never recorded as a runtime type, so it must not get an edge");
        assert_eq!(callees[0].kind, EdgeKind::Dynamic);
    }
}
