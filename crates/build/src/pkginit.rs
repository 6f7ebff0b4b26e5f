//! Package initializer synthesis (§4.3 "Package initializers"): fills in
//! the body of the synthetic `init` stub `ssa-ir`'s Create phase allocates
//! for every package. In dependency order: a guard check that short-
//! circuits a package whose initializer already ran, each direct import's
//! `init`, this package's own package-level `var` initializer expressions
//! (in an order that respects one initializer referencing another), and
//! finally this package's declared `init#N` functions in declaration
//! order. The guard and var-initializer steps are both skipped when
//! [`ssa_ir::BuildMode::bare_inits`] is set.

use std::collections::HashSet;

use ssa_ir::input::{CheckedPackage, Decl, Expr, ObjectRef, VarDecl};
use ssa_ir::{
    BasicKind, CallCommon, Callee, Const, ConstKind, Function, GlobalId, InstrKind, Member,
    Program, Type, TypeData, Value,
};

use crate::builder::{self, Builder};

fn bool_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Bool))
}

fn bool_const(v: bool) -> Value {
    Value::Const(Const { kind: ConstKind::Bool(v), ty: bool_ty() })
}

fn init_member(program: &Program, path: &str, name: &str) -> Option<ssa_ir::FunctionId> {
    program.package(path).and_then(|pkg| match pkg.member(name) {
        Some(Member::Function(fid)) => Some(*fid),
        _ => None,
    })
}

fn emit_call_to(b: &mut Builder, target: ssa_ir::FunctionId) {
    let closure = b.emit_in_current(InstrKind::MakeClosure { fn_: target, bindings: vec![] }, None);
    let cc = CallCommon {
        callee: Callee::Static { value: Value::Instr(closure), target: Some(target) },
        args: vec![],
        ellipsis: false,
    };
    b.emit_in_current(InstrKind::Call(cc), None);
}

/// Every `VarDecl` in `pkg`'s own declarations that has an initializer
/// expression, paired with the `GlobalId` Create allocated for it.
fn var_inits(program: &Program, pkg: &CheckedPackage) -> Vec<(GlobalId, &VarDecl)> {
    let Some(ppkg) = program.package(&pkg.path) else { return Vec::new() };
    pkg.decls
        .iter()
        .filter_map(|d| match d {
            Decl::Var(v) if v.init.is_some() => match ppkg.member(&v.name) {
                Some(Member::Global(gid)) => Some((*gid, v)),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Names, among `names`, that `expr` directly references via a same-
/// package identifier — the dependency edges a topological ordering of
/// initializers must respect (§4.3: "in dependency order").
fn referenced_names(pkg_path: &str, expr: &Expr, names: &HashSet<String>, out: &mut HashSet<String>) {
    match expr {
        Expr::Lit(..) => {}
        Expr::Ident(ObjectRef::Package { path, name }, _) => {
            if path == pkg_path && names.contains(name) {
                out.insert(name.clone());
            }
        }
        Expr::Ident(ObjectRef::Local(_), _) => {}
        Expr::Binary { x, y, .. } => {
            referenced_names(pkg_path, x, names, out);
            referenced_names(pkg_path, y, names, out);
        }
        Expr::Unary { x, .. } => referenced_names(pkg_path, x, names, out),
        Expr::Call { func, args, .. } => {
            referenced_names(pkg_path, func, names, out);
            for a in args {
                referenced_names(pkg_path, a, names, out);
            }
        }
        Expr::IntrinsicCall { args, .. } => {
            for a in args {
                referenced_names(pkg_path, a, names, out);
            }
        }
        Expr::Selector { base, .. } => referenced_names(pkg_path, base, names, out),
        Expr::Index { base, index, .. } => {
            referenced_names(pkg_path, base, names, out);
            referenced_names(pkg_path, index, names, out);
        }
        Expr::Slice { base, low, high, max, .. } => {
            referenced_names(pkg_path, base, names, out);
            for v in [low, high, max].into_iter().flatten() {
                referenced_names(pkg_path, v, names, out);
            }
        }
        Expr::CompositeLit { elements, .. } => {
            for (k, v) in elements {
                if let Some(k) = k {
                    referenced_names(pkg_path, k, names, out);
                }
                referenced_names(pkg_path, v, names, out);
            }
        }
        // A function literal's body only runs when called, never during
        // this initializer's own evaluation, so it contributes no ordering
        // dependency (matches the source language's own init-cycle rules).
        Expr::FuncLit { .. } => {}
        Expr::TypeAssert { x, .. } => referenced_names(pkg_path, x, names, out),
        Expr::Convert { x, .. } => referenced_names(pkg_path, x, names, out),
        Expr::Instantiate { base, .. } => referenced_names(pkg_path, base, names, out),
    }
}

/// Orders `inits` so that an initializer referencing another package-level
/// var in the same batch comes after it, falling back to declaration order
/// for anything with no dependency (or a cycle, which the type checker
/// would already have rejected as ill-formed input).
fn topo_order<'a>(pkg_path: &str, inits: Vec<(GlobalId, &'a VarDecl)>) -> Vec<(GlobalId, &'a VarDecl)> {
    let names: HashSet<String> = inits.iter().map(|(_, v)| v.name.clone()).collect();
    let by_name: std::collections::HashMap<&str, (GlobalId, &VarDecl)> =
        inits.iter().map(|(g, v)| (v.name.as_str(), (*g, *v))).collect();

    let mut order: Vec<(GlobalId, &VarDecl)> = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    let mut visiting: HashSet<String> = HashSet::new();

    fn visit<'a>(
        name: &str,
        pkg_path: &str,
        names: &HashSet<String>,
        by_name: &std::collections::HashMap<&str, (GlobalId, &'a VarDecl)>,
        done: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        order: &mut Vec<(GlobalId, &'a VarDecl)>,
    ) {
        if done.contains(name) || visiting.contains(name) {
            return;
        }
        let Some(&(gid, v)) = by_name.get(name) else { return };
        visiting.insert(name.to_string());
        if let Some(init) = &v.init {
            let mut deps = HashSet::new();
            referenced_names(pkg_path, init, names, &mut deps);
            for dep in deps {
                if dep != name {
                    visit(&dep, pkg_path, names, by_name, done, visiting, order);
                }
            }
        }
        visiting.remove(name);
        if done.insert(name.to_string()) {
            order.push((gid, v));
        }
    }

    for (_, v) in &inits {
        visit(&v.name, pkg_path, &names, &by_name, &mut done, &mut visiting, &mut order);
    }
    order
}

fn emit_var_inits(b: &mut Builder, pkg_path: &str, pkg: &CheckedPackage, program: &Program) {
    let inits = var_inits(program, pkg);
    for (gid, decl) in topo_order(pkg_path, inits) {
        let value = b.lower_expr(decl.init.as_ref().expect("filtered to Some above"));
        b.emit_in_current(InstrKind::Store { addr: Value::Global(gid), value }, None);
    }
}

fn emit_declared_inits(program: &Program, b: &mut Builder, pkg_path: &str) {
    let mut n = 1u32;
    while let Some(target) = init_member(program, pkg_path, &format!("init#{n}")) {
        emit_call_to(b, target);
        n += 1;
    }
}

/// Builds `stub`'s body per the protocol above.
pub fn build(program: &Program, mut stub: Function, pkg: &CheckedPackage, imports: &[String]) -> Function {
    stub.new_block(Some("entry".to_string()));
    let mut b = Builder::new(program, stub);

    if program.mode.bare_inits {
        for path in imports {
            if let Some(target) = init_member(program, path, "init") {
                emit_call_to(&mut b, target);
            }
        }
        emit_var_inits(&mut b, &pkg.path, pkg, program);
        emit_declared_inits(program, &mut b, &pkg.path);
    } else {
        // `build` runs exactly once per package (§4.3), so there is no
        // pre-existing `init$guard` to find; allocate one fresh.
        let guard = program.package(&pkg.path).map(|p| p.id).map(|pid| {
            let gid = program.alloc_global_id();
            program.insert_global(ssa_ir::Global {
                id: gid,
                name: "init$guard".to_string(),
                package: pid,
                ty: Type::new(TypeData::Pointer(Box::new(bool_ty()))),
            });
            if let Some(mut p) = program.package_mut(&pkg.path) {
                p.insert_member("init$guard".to_string(), Member::Global(gid));
            }
            gid
        });

        match guard {
            Some(gid) => {
                let already = b.emit_in_current(InstrKind::Load { addr: Value::Global(gid) }, Some(bool_ty()));
                let run_b = b.fresh_block("init.run");
                let done_b = b.fresh_block("init.done");
                let entry = b.current_block();
                b.emit_in_current(InstrKind::If { cond: Value::Instr(already), then_: done_b, else_: run_b }, None);
                b.add_edge(entry, run_b);
                b.add_edge(entry, done_b);

                b.set_block(run_b);
                let true_val = bool_const(true);
                b.emit_in_current(InstrKind::Store { addr: Value::Global(gid), value: true_val }, None);
                for path in imports {
                    if let Some(target) = init_member(program, path, "init") {
                        emit_call_to(&mut b, target);
                    }
                }
                emit_var_inits(&mut b, &pkg.path, pkg, program);
                emit_declared_inits(program, &mut b, &pkg.path);
                b.jump(done_b);

                b.set_block(done_b);
            }
            None => {
                for path in imports {
                    if let Some(target) = init_member(program, path, "init") {
                        emit_call_to(&mut b, target);
                    }
                }
                emit_var_inits(&mut b, &pkg.path, pkg, program);
                emit_declared_inits(program, &mut b, &pkg.path);
            }
        }
    }

    b.emit_in_current(InstrKind::Return { results: vec![] }, None);
    builder::finalize(b).func
}
