//! The read-only type-checked input the core consumes (§1, §6.1).
//!
//! The parser and type-checker are explicitly out of scope: this module is
//! the *interface* a front end is assumed to hand the core — a minimal
//! typed syntax tree plus the per-selector, per-identifier type information
//! a real type checker (`go/types`-shaped) would already have resolved.
//! Nothing here performs type checking; every `Type` attached to an `Expr`
//! is assumed correct by construction (§7 "ill-typed input is out of
//! contract").
//!
//! Test and CLI fixtures build these trees by hand, the same way the
//! teacher's own `call_graph.rs` tests construct a `Program` literal in
//! Rust rather than lexing a `.seq` file.

use std::path::PathBuf;

use crate::types::{Method, SignatureType, Type, TypeParamType};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub file: PathBuf,
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(file: &str, line: usize, col: usize) -> Self {
        Position { file: PathBuf::from(file), line, col }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}

/// The source-language release a file was written against (e.g. "1.22").
/// Builder behavior for `for`-range variable lifetime and range-over-func
/// depends on this (§4.3, §6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct GoVersion(pub String);

impl GoVersion {
    pub fn at_least_1_22(&self) -> bool {
        self.0.as_str() >= "1.22"
    }
}

#[derive(Debug, Clone)]
pub struct CheckedFile {
    pub name: String,
    pub go_version: GoVersion,
    pub generated: bool,
}

/// How a selector expression resolves (§6.1): method value, method
/// expression, or plain field access, plus the implicit-embedded-field
/// index path and whether the receiver is reached through a pointer.
#[derive(Debug, Clone)]
pub enum SelectionKind {
    MethodValue,
    MethodExpr,
    FieldVal,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub kind: SelectionKind,
    pub name: String,
    pub index_path: Vec<usize>,
    pub indirect: bool,
    pub method: Option<Method>,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum Lit {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    LAnd,
    LOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Xor,
    Addr,
    Deref,
    Recv,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ConvKind {
    ChangeType,
    Numeric,
    Interface,
    SliceToArrayPointer,
    SliceToArray,
    StringToBytes,
    StringToRunes,
    BytesToString,
    RunesToString,
    MultiConvert,
}

/// A reference to an object the type checker has already resolved: a
/// local variable/parameter/free-variable by name, or a package-level
/// function/global/const by qualified name. The builder maps these to
/// `ir::value::Value` operands.
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Local(String),
    Package { path: String, name: String },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Lit(Lit, Type),
    Ident(ObjectRef, Type),
    Binary { op: BinOp, x: Box<Expr>, y: Box<Expr>, ty: Type },
    Unary { op: UnOp, x: Box<Expr>, ty: Type },
    Call { func: Box<Expr>, args: Vec<Expr>, ellipsis: bool, type_args: Vec<Type>, ty: Type },
    /// A call to a language intrinsic (`new`, `make`, `len`, `cap`,
    /// `panic`, `unsafe.Add`, `unsafe.Slice`) rather than a resolvable
    /// function value (§4.3 "Calls").
    IntrinsicCall { name: String, args: Vec<Expr>, ty: Type },
    Selector { base: Box<Expr>, selection: Selection },
    Index { base: Box<Expr>, index: Box<Expr>, ty: Type },
    Slice { base: Box<Expr>, low: Option<Box<Expr>>, high: Option<Box<Expr>>, max: Option<Box<Expr>>, ty: Type },
    CompositeLit { ty: Type, elements: Vec<(Option<Expr>, Expr)> },
    FuncLit { decl: Box<FuncDecl> },
    TypeAssert { x: Box<Expr>, assert_ty: Type, comma_ok: bool },
    Convert { kind: ConvKind, x: Box<Expr>, ty: Type },
    /// An explicit instantiation `f[T1, T2]` or one inferred at a call
    /// site; carries the canonical type-argument list (§4.3 "Generic
    /// instantiation").
    Instantiate { base: Box<Expr>, type_args: Vec<Type>, ty: Type },
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::Lit(_, t)
            | Expr::Ident(_, t)
            | Expr::Binary { ty: t, .. }
            | Expr::Unary { ty: t, .. }
            | Expr::Call { ty: t, .. }
            | Expr::IntrinsicCall { ty: t, .. }
            | Expr::Index { ty: t, .. }
            | Expr::Slice { ty: t, .. }
            | Expr::CompositeLit { ty: t, .. }
            | Expr::Convert { ty: t, .. }
            | Expr::Instantiate { ty: t, .. } => t.clone(),
            Expr::Selector { selection, .. } => selection.ty.clone(),
            Expr::TypeAssert { assert_ty, .. } => assert_ty.clone(),
            Expr::FuncLit { decl } => Type::new(crate::types::TypeData::Signature(decl.sig.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeShape {
    Indexed,
    Channel,
    MapOrString,
    IntegerCountdown,
    FuncValue,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign { lhs: Vec<Expr>, rhs: Vec<Expr>, define: bool },
    ExprStmt(Expr),
    Block(Vec<Stmt>),
    If { cond: Expr, then_: Box<Stmt>, else_: Option<Box<Stmt>> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, post: Option<Box<Stmt>>, body: Box<Stmt>, fresh_loopvars: bool },
    Range { shape: RangeShape, key: Option<String>, value: Option<String>, x: Expr, body: Box<Stmt>, define: bool },
    Switch { tag: Option<Expr>, cases: Vec<(Vec<Expr>, Vec<Stmt>)>, has_default: bool },
    TypeSwitch { x: Expr, bind: Option<String>, cases: Vec<(Vec<Type>, Vec<Stmt>)>, has_default: bool },
    Select { cases: Vec<SelectClause> },
    Return(Vec<Expr>),
    Go(Expr),
    Defer(Expr),
    Send { chan: Expr, value: Expr },
    Labeled { label: String, stmt: Box<Stmt> },
    Goto(String),
    Break(Option<String>),
    Continue(Option<String>),
}

#[derive(Debug, Clone)]
pub struct SelectClause {
    pub chan: Expr,
    pub send_value: Option<Expr>,
    pub recv_bind: Option<String>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub recv: Option<ParamDecl>,
    pub type_params: Vec<TypeParamType>,
    pub sig: SignatureType,
    pub params: Vec<ParamDecl>,
    pub body: Option<Vec<Stmt>>,
    pub pos: Position,
    pub go_version: GoVersion,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub pos: Position,
    pub go_version: GoVersion,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Type,
    pub value: Lit,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Func(FuncDecl),
    Var(VarDecl),
    Const(ConstDecl),
    Type(TypeDecl),
}

/// A fully type-checked package ready for `Create`/`Build` (§6.1).
#[derive(Debug, Clone)]
pub struct CheckedPackage {
    pub path: String,
    pub files: Vec<CheckedFile>,
    pub decls: Vec<Decl>,
    /// Direct imports, in source order, used by package-initializer
    /// synthesis (§4.3 "Package initializers").
    pub imports: Vec<String>,
}
