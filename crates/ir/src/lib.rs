//! Core SSA data model: the Type View, the Program & Package registry, the
//! Create phase, and the debug dump format (§3, §4.1, §4.2, §6.3).
//!
//! The Builder, Lifter, Sanity pass, and call-graph algorithms that consume
//! this data model live in `ssa-build` and `ssa-callgraph`; this crate only
//! owns the entities those phases operate over.

pub mod block;
pub mod canon;
pub mod create;
pub mod dump;
pub mod function;
pub mod input;
pub mod instr;
pub mod package;
pub mod program;
pub mod types;
pub mod value;

pub use create::{create_package, CreateResult};
pub use function::{Function, FunctionState, FreeVar, Param, SyntheticKind};
pub use instr::{BinOp, Callee, CallCommon, CmpOp, Instr, InstrKind, Intrinsic, RangeKind, SelectCase, SliceBound, UnOp};
pub use package::{Global, Member, NamedConst, Package};
pub use program::{BuildMode, Program};
pub use types::{
    ArrayType, BasicKind, ChanDir, ChanType, Field, InterfaceType, MapType, Method, NamedType,
    SignatureType, StructType, Substitution, Type, TypeData, TypeParamType, UnionType,
};
pub use value::{BlockId, Const, ConstId, ConstKind, FunctionId, GlobalId, InstrId, PackageId, Value};
