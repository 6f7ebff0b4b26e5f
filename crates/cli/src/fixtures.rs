//! Named in-memory demonstration programs, built directly against
//! `ssa_ir::input`'s typed-AST types rather than parsed from source — the
//! same style the core crates' own tests use to construct a `CheckedPackage`
//! literal in Rust.
//!
//! `greet_and_main()` wires up a small two-package program: `greet` declares
//! an interface and two implementers, `main` calls through the interface and
//! also declares a function nothing ever calls, so `ssa-tool deadcode` has
//! something to report.

use ssa_ir::input::{
    CheckedFile, CheckedPackage, Decl, Expr, FuncDecl, GoVersion, Lit, ObjectRef, ParamDecl,
    Position, Selection, SelectionKind, Stmt, TypeDecl,
};
use ssa_ir::{
    BasicKind, InterfaceType, Method, NamedType, SignatureType, StructType, Type, TypeData,
};

fn pos(line: usize) -> Position {
    Position::new("demo.go", line, 1)
}

fn go_version() -> GoVersion {
    GoVersion("1.22".to_string())
}

fn string_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::String))
}

fn int_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Int))
}

fn sig(params: Vec<Type>, results: Vec<Type>, receiver: Option<Type>) -> SignatureType {
    SignatureType { params, variadic: false, results, type_params: vec![], receiver: receiver.map(Box::new) }
}

fn greeter_method_sig() -> SignatureType {
    sig(vec![], vec![string_ty()], None)
}

/// `func (r <named>) Greet() string` — one concrete implementation of the
/// `Greeter` interface, named by `type_name` and returning `greeting`.
fn greet_impl(type_name: &str, greeting: &str) -> (Type, Decl, Decl) {
    let recv_ty = Type::new(TypeData::Named(NamedType {
        package: "greet".to_string(),
        name: type_name.to_string(),
        underlying: Box::new(Type::new(TypeData::Struct(StructType { fields: vec![] }))),
        methods: vec![Method {
            pkg: "greet".to_string(),
            name: "Greet".to_string(),
            signature: greeter_method_sig(),
            pointer_receiver: false,
            index_path: vec![],
        }],
        origin: None,
        type_params: vec![],
        type_args: vec![],
    }));

    let type_decl = Decl::Type(TypeDecl { name: type_name.to_string(), ty: recv_ty.clone() });
    let method_decl = Decl::Func(FuncDecl {
        name: "Greet".to_string(),
        recv: Some(ParamDecl { name: "r".to_string(), ty: recv_ty.clone() }),
        type_params: vec![],
        sig: sig(vec![], vec![string_ty()], Some(recv_ty.clone())),
        params: vec![],
        body: Some(vec![Stmt::Return(vec![Expr::Lit(Lit::String(greeting.to_string()), string_ty())])]),
        pos: pos(1),
        go_version: go_version(),
    });
    (recv_ty, type_decl, method_decl)
}

/// `func New<Name>() Greeter { return Greeter(<Name>{}) }`.
fn greet_constructor(fn_name: &str, concrete: &Type, greeter_ty: &Type) -> Decl {
    let composite = Expr::CompositeLit { ty: concrete.clone(), elements: vec![] };
    let boxed = Expr::Convert { kind: ssa_ir::input::ConvKind::Interface, x: Box::new(composite), ty: greeter_ty.clone() };
    Decl::Func(FuncDecl {
        name: fn_name.to_string(),
        recv: None,
        type_params: vec![],
        sig: sig(vec![], vec![greeter_ty.clone()], None),
        params: vec![],
        body: Some(vec![Stmt::Return(vec![boxed])]),
        pos: pos(1),
        go_version: go_version(),
    })
}

fn greet_package() -> (CheckedPackage, Type) {
    let greeter_ty = Type::new(TypeData::Named(NamedType {
        package: "greet".to_string(),
        name: "Greeter".to_string(),
        underlying: Box::new(Type::new(TypeData::Interface(InterfaceType {
            methods: vec![Method {
                pkg: "greet".to_string(),
                name: "Greet".to_string(),
                signature: greeter_method_sig(),
                pointer_receiver: false,
                index_path: vec![],
            }],
            type_set: None,
        }))),
        methods: vec![],
        origin: None,
        type_params: vec![],
        type_args: vec![],
    }));

    let (english_ty, english_decl, english_greet) = greet_impl("English", "hello, world");
    let (spanish_ty, spanish_decl, spanish_greet) = greet_impl("Spanish", "hola, mundo");

    let decls = vec![
        Decl::Type(TypeDecl { name: "Greeter".to_string(), ty: greeter_ty.clone() }),
        english_decl,
        english_greet,
        spanish_decl,
        spanish_greet,
        greet_constructor("NewEnglish", &english_ty, &greeter_ty),
        greet_constructor("NewSpanish", &spanish_ty, &greeter_ty),
    ];

    let pkg = CheckedPackage {
        path: "greet".to_string(),
        files: vec![CheckedFile { name: "demo.go".to_string(), go_version: go_version(), generated: false }],
        decls,
        imports: vec![],
    };
    (pkg, greeter_ty)
}

fn call(path: &str, name: &str, sig_ty: Type, args: Vec<Expr>, ret: Type) -> Expr {
    Expr::Call {
        func: Box::new(Expr::Ident(ObjectRef::Package { path: path.to_string(), name: name.to_string() }, sig_ty)),
        args,
        ellipsis: false,
        type_args: vec![],
        ty: ret,
    }
}

fn main_package(greeter_ty: &Type) -> CheckedPackage {
    let greet_with_sig = sig(vec![greeter_ty.clone()], vec![string_ty()], None);
    let new_sig = sig(vec![], vec![greeter_ty.clone()], None);

    let greet_selector = Expr::Selector {
        base: Box::new(Expr::Ident(ObjectRef::Local("g".to_string()), greeter_ty.clone())),
        selection: Selection {
            kind: SelectionKind::MethodValue,
            name: "Greet".to_string(),
            index_path: vec![],
            indirect: false,
            method: Some(Method {
                pkg: "greet".to_string(),
                name: "Greet".to_string(),
                signature: greeter_method_sig(),
                pointer_receiver: false,
                index_path: vec![],
            }),
            ty: Type::new(TypeData::Signature(greeter_method_sig())),
        },
    };
    let greet_with = Decl::Func(FuncDecl {
        name: "greetWith".to_string(),
        recv: None,
        type_params: vec![],
        sig: greet_with_sig.clone(),
        params: vec![ParamDecl { name: "g".to_string(), ty: greeter_ty.clone() }],
        body: Some(vec![Stmt::Return(vec![Expr::Call {
            func: Box::new(greet_selector),
            args: vec![],
            ellipsis: false,
            type_args: vec![],
            ty: string_ty(),
        }])]),
        pos: pos(1),
        go_version: go_version(),
    });

    let greet_with_ty = Type::new(TypeData::Signature(greet_with_sig));
    let new_english_ty = Type::new(TypeData::Signature(new_sig.clone()));
    let new_spanish_ty = Type::new(TypeData::Signature(new_sig));

    let main_fn = Decl::Func(FuncDecl {
        name: "main".to_string(),
        recv: None,
        type_params: vec![],
        sig: sig(vec![], vec![], None),
        params: vec![],
        body: Some(vec![
            Stmt::ExprStmt(call(
                "main",
                "greetWith",
                greet_with_ty.clone(),
                vec![call("greet", "NewEnglish", new_english_ty, vec![], greeter_ty.clone())],
                string_ty(),
            )),
            Stmt::ExprStmt(call(
                "main",
                "greetWith",
                greet_with_ty,
                vec![call("greet", "NewSpanish", new_spanish_ty, vec![], greeter_ty.clone())],
                string_ty(),
            )),
        ]),
        pos: pos(2),
        go_version: go_version(),
    });

    // Never called from anywhere: shows up in `ssa-tool deadcode`.
    let unused = Decl::Func(FuncDecl {
        name: "unusedHelper".to_string(),
        recv: None,
        type_params: vec![],
        sig: sig(vec![], vec![int_ty()], None),
        params: vec![],
        body: Some(vec![Stmt::Return(vec![Expr::Lit(Lit::Int(42), int_ty())])]),
        pos: pos(3),
        go_version: go_version(),
    });

    CheckedPackage {
        path: "main".to_string(),
        files: vec![CheckedFile { name: "demo.go".to_string(), go_version: go_version(), generated: false }],
        decls: vec![greet_with, main_fn, unused],
        imports: vec!["greet".to_string()],
    }
}

/// Two packages: `greet` (an interface plus two implementers) imported by
/// `main` (which dispatches through the interface and also declares a
/// function nothing calls). Returned in an order safe to `create_package`
/// and `build_package` in directly.
pub fn greet_and_main() -> Vec<CheckedPackage> {
    let (greet, greeter_ty) = greet_package();
    let main = main_package(&greeter_ty);
    vec![greet, main]
}

/// Named fixture lookup for the CLI's `--fixture` flag.
pub fn by_name(name: &str) -> Option<Vec<CheckedPackage>> {
    match name {
        "greet" => Some(greet_and_main()),
        _ => None,
    }
}

pub const FIXTURE_NAMES: &[&str] = &["greet"];
