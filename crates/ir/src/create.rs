//! The Create phase (§4.2): walks a package's declarations and allocates
//! its members, without building any function body.

use crate::function::{Function, SyntheticKind};
use crate::input::{CheckedFile, CheckedPackage, Decl, Position};
use crate::package::{Global, Member, NamedConst, Package};
use crate::program::Program;
use crate::types::{SignatureType, Type, TypeData};
use crate::value::{FunctionId, PackageId};

/// Result of the Create phase: the new package's id and the functions now
/// queued for `Build` (declared functions/methods plus the synthetic
/// `init`; anonymous functions and generic instances are discovered and
/// queued during `Build` itself, §4.3).
pub struct CreateResult {
    pub package: PackageId,
    pub queued: Vec<FunctionId>,
}

/// `Create package(type-checked package, syntax, type info, importable?)`
/// (§4.1). Panics if any file has type errors — here, that precondition is
/// represented by the caller handing us an already-type-checked
/// `CheckedPackage`; there is nothing left to validate at this layer
/// (§7 "ill-typed input is out-of-contract").
/// The declaring named type's bare name, looking through one level of
/// pointer receiver (`func (r *T) M()` and `func (r T) M()` alike).
fn receiver_type_name(ty: &Type) -> String {
    match ty.data() {
        TypeData::Named(n) => n.name.clone(),
        TypeData::Pointer(inner) => receiver_type_name(inner),
        _ => String::new(),
    }
}

/// Whether `pos`'s file was marked generated by the front end (§4.10).
fn generated_for(files: &[CheckedFile], pos: &Position) -> bool {
    let name = pos.file.to_string_lossy();
    files.iter().find(|f| f.name == name).is_some_and(|f| f.generated)
}

pub fn create_package(program: &Program, source: CheckedPackage, importable: bool) -> CreateResult {
    let pkg_id = program.alloc_package_id();
    let path = source.path.clone();
    let imports = source.imports.clone();
    let mut pkg = Package::new(pkg_id, path.clone(), importable, source);
    let mut queued = Vec::new();
    let mut declared_init_count: u32 = 0;

    let files = pkg.source().expect("just constructed with source").files.clone();
    let decls = pkg.source().expect("just constructed with source").decls.clone();
    for decl in decls {
        match decl {
            Decl::Func(f) => {
                let is_decl_init = f.name == "init" && f.recv.is_none();
                let member_name = if is_decl_init {
                    declared_init_count += 1;
                    format!("init#{declared_init_count}")
                } else if let Some(recv) = &f.recv {
                    // Methods are keyed by `Type.Method` rather than their
                    // bare name: Go has no package-level `pkg.Method`
                    // reference, and two types in the same package may
                    // declare same-named methods (§4.7 dispatch resolution
                    // needs a way back from a concrete type to its methods).
                    format!("{}.{}", receiver_type_name(&recv.ty), f.name)
                } else {
                    f.name.clone()
                };
                let signature = Type::new(TypeData::Signature(f.sig.clone()));
                let id = program.alloc_function_id();
                let mut func = Function::new_stub(id, f.name.clone(), signature, Some(pkg_id));
                if is_decl_init {
                    func.synthetic = Some(SyntheticKind::DeclaredInit(declared_init_count));
                }
                func.has_source = f.body.is_some();
                func.generated = generated_for(&files, &f.pos);
                func.pos = Some(f.pos.clone());
                program.insert_function(func);
                pkg.insert_member(member_name, Member::Function(id));
                queued.push(id);
            }
            Decl::Var(v) => {
                let ptr_ty = Type::new(TypeData::Pointer(Box::new(v.ty.clone())));
                let id = program.alloc_global_id();
                program.insert_global(Global { id, name: v.name.clone(), package: pkg_id, ty: ptr_ty });
                pkg.insert_member(v.name.clone(), Member::Global(id));
            }
            Decl::Const(c) => {
                let id = program.alloc_const_id();
                program.insert_const(NamedConst { id, name: c.name.clone(), ty: c.ty.clone() });
                pkg.insert_member(c.name.clone(), Member::NamedConst(id));
            }
            Decl::Type(t) => {
                pkg.insert_member(t.name.clone(), Member::Type { ty: t.ty.clone(), methods: t.ty.method_set() });
            }
        }
    }

    // Synthetic package initializer (§4.3 "Package initializers"). Its body
    // is produced by `ssa-build`'s builder; here we only allocate the stub
    // with the right signature and queue it.
    let init_sig = Type::new(TypeData::Signature(SignatureType {
        params: vec![],
        variadic: false,
        results: vec![],
        type_params: vec![],
        receiver: None,
    }));
    let init_id = program.alloc_function_id();
    let mut init_fn = Function::new_stub(init_id, "init".to_string(), init_sig, Some(pkg_id));
    init_fn.synthetic = Some(SyntheticKind::PackageInit);
    init_fn.has_source = false;
    program.insert_function(init_fn);
    pkg.insert_member("init".to_string(), Member::Function(init_id));
    queued.push(init_id);
    pkg.init = Some(init_id);
    let _ = imports; // consumed by ssa-build when synthesizing the init body

    program.insert_package(pkg);

    CreateResult { package: pkg_id, queued }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{FuncDecl, GoVersion, ParamDecl, Position};

    fn empty_sig() -> SignatureType {
        SignatureType { params: vec![], variadic: false, results: vec![], type_params: vec![], receiver: None }
    }

    fn func_decl(name: &str, body: Option<Vec<crate::input::Stmt>>) -> Decl {
        Decl::Func(FuncDecl {
            name: name.to_string(),
            recv: None,
            type_params: vec![],
            sig: empty_sig(),
            params: vec![],
            body,
            pos: Position::new("p.go", 1, 1),
            go_version: GoVersion("1.22".into()),
        })
    }

    #[test]
    fn every_declared_identifier_becomes_a_member() {
        let program = Program::new(crate::program::BuildMode::new());
        let source = CheckedPackage {
            path: "p".into(),
            files: vec![],
            decls: vec![func_decl("F", Some(vec![])), func_decl("init", Some(vec![]))],
            imports: vec![],
        };
        let result = create_package(&program, source, true);
        let pkg = program.package("p").unwrap();
        assert!(matches!(pkg.member("F"), Some(Member::Function(_))));
        assert!(matches!(pkg.member("init#1"), Some(Member::Function(_))));
        assert!(matches!(pkg.member("init"), Some(Member::Function(_))));
        // F, init#1, synthetic init = 3 queued (the declared init#1 plus F
        // plus the synthetic init method).
        assert_eq!(result.queued.len(), 3);
        let _ = ParamDecl { name: "x".into(), ty: Type::new(TypeData::Basic(crate::types::BasicKind::Int)) };
    }

    #[test]
    fn multiple_package_initializers_are_renumbered_in_source_order() {
        let program = Program::new(crate::program::BuildMode::new());
        let source = CheckedPackage {
            path: "p".into(),
            files: vec![],
            decls: vec![func_decl("init", Some(vec![])), func_decl("init", Some(vec![]))],
            imports: vec![],
        };
        create_package(&program, source, true);
        let pkg = program.package("p").unwrap();
        assert!(pkg.member("init#1").is_some());
        assert!(pkg.member("init#2").is_some());
    }
}
