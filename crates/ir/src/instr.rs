//! The SSA instruction sum type (§3 "Instruction") and the call-site payload
//! shared by call/defer/go/invoke (§3 "Call common").
//!
//! Modelled as a single tagged enum rather than a dispatch hierarchy (§9
//! "Sum types"): visitors match on `InstrKind` directly.

use crate::types::Type;
use crate::value::{BlockId, ConstId, FunctionId, GlobalId, InstrId, Value};

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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Xor,
    /// Pointer dereference (`*p`); distinct from `Recv` which is modelled
    /// as its own unary-shaped instruction per §3.
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A call site's callee: either a statically known function value, or a
/// dynamically dispatched interface method (§3 "Call common").
#[derive(Debug, Clone)]
pub enum Callee {
    /// A static call: the callee function value (itself possibly the result
    /// of a `MakeClosure`, in which case this is the closure value, not the
    /// origin `FunctionId` directly) plus, when the callee is known without
    /// going through a value, the `FunctionId` for call-graph purposes.
    Static { value: Value, target: Option<FunctionId> },
    /// An interface method invocation: the receiver (an interface value)
    /// and the abstract method being invoked.
    Invoke { receiver: Value, method: String },
}

#[derive(Debug, Clone)]
pub struct CallCommon {
    pub callee: Callee,
    pub args: Vec<Value>,
    /// True when the trailing argument is passed through unchanged as the
    /// variadic tail (`f(xs...)`), as opposed to a freshly built backing
    /// array (§4.3 "Variadic calls").
    pub ellipsis: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceBound {
    Low,
    High,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    New,
    Make,
    Len,
    Cap,
    Panic,
    UnsafeAdd,
    UnsafeSlice,
}

#[derive(Debug, Clone)]
pub struct SelectCase {
    pub chan: Value,
    pub send_value: Option<Value>,
    pub ok_ty: Option<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Integer,
    MapOrString,
    Channel,
}

/// The operation-specific payload of an [`Instr`]. Mirrors §3's enumeration
/// of instruction variants; every value-producing variant's result type
/// lives on the owning `Instr::ty`, not here.
#[derive(Debug, Clone)]
pub enum InstrKind {
    BinOp { op: BinOp, x: Value, y: Value },
    UnOp { op: UnOp, x: Value },
    Compare { op: CmpOp, x: Value, y: Value },
    Load { addr: Value },
    Store { addr: Value, value: Value },
    /// Allocates a local. `heap = false` is a candidate for lifting into a
    /// register; `heap = true` means escape analysis already forced a heap
    /// allocation (§4.3, §4.4).
    Alloc { heap: bool, comment: String },
    FieldAddr { base: Value, index: usize },
    Field { base: Value, index: usize },
    Index { base: Value, index: Value },
    IndexAddr { base: Value, index: Value },
    Lookup { map: Value, key: Value, comma_ok: bool },
    Slice { base: Value, low: Option<Value>, high: Option<Value>, max: Option<Value> },
    MakeSlice { len: Value, cap: Value },
    MakeMap { reserve: Option<Value> },
    MakeChan { size: Value },
    /// Creates a closure over `fn_` binding `bindings` as its free
    /// variables, in declaration order.
    MakeClosure { fn_: FunctionId, bindings: Vec<Value> },
    TypeAssert { x: Value, assert_ty: Type, comma_ok: bool },
    /// Change-of-type conversion: no representation change (§4.3
    /// "Conversions").
    ChangeType { x: Value },
    /// Interface injection: produces a (type descriptor, value) pair
    /// (GLOSSARY "Interface-make").
    MakeInterface { x: Value },
    /// Widening/narrowing numeric conversion, or string<->byte/rune-slice.
    Convert { x: Value },
    SliceToArrayPointer { x: Value },
    SliceToArray { x: Value },
    /// A conversion under a type parameter whose instantiations require
    /// different concrete conversion kinds (§4.3 "Conversions").
    MultiConvert { x: Value, kinds: Vec<Type> },
    Call(CallCommon),
    Go(CallCommon),
    Defer(CallCommon),
    /// Marks the point a function's deferred calls run; generated for every
    /// function with at least one `Defer` (§4.3 "Defer / Go").
    RunDefers,
    /// A no-op placeholder left where an instruction used to sit (register
    /// promotion eliding an `Alloc`/`Load`/`Store`, dead-phi elimination),
    /// kept so every other instruction's `InstrId` stays stable.
    Nop,
    Panic { x: Value },
    Return { results: Vec<Value> },
    Jump { target: BlockId },
    If { cond: Value, then_: BlockId, else_: BlockId },
    /// A block reached only by `panic`, never falls through; the sanity
    /// pass schedules it for pruning if nothing jumps to it (§4.5, §7).
    Unreachable,
    Select { cases: Vec<SelectCase>, blocking: bool },
    Send { chan: Value, value: Value },
    /// Channel receive; modelled as a unary-shaped instruction per §3.
    Recv { chan: Value, comma_ok: bool },
    /// Creates the iterator state for one of the three primitive range
    /// shapes (§4.3 "Range statements"): integer count-down, map/string, or
    /// channel. Indexed ranges (array/pointer-to-array/slice) and
    /// range-over-func do not use this instruction.
    RangeIter { x: Value, kind: RangeKind },
    /// Advances a range iterator created by `RangeIter`; yields a tuple of
    /// `(ok, key, value)` extracted via `Extract`.
    Next { iter: Value },
    Phi { edges: Vec<Value> },
    Extract { tuple: Value, index: usize },
    /// An intrinsic not already covered by a dedicated variant above
    /// (`len`, `cap`, `unsafe.Add`, `unsafe.Slice`); `new`, `make`, and
    /// `panic` lower to `Alloc`/`MakeSlice`/`MakeMap`/`MakeChan`/`Panic`
    /// directly instead, since those already carry the right shape
    /// (§4.3 "Calls").
    Intrinsic { kind: Intrinsic, args: Vec<Value> },
    /// Associates this instruction's defining expression with a source
    /// position, present only under `global-debug` (§4.1).
    DebugRef { value: Value, is_addr: bool },
    Const(ConstId),
}

impl InstrKind {
    /// True for instructions that are control-flow terminators; exactly one
    /// must end every basic block (§3 BasicBlock invariant).
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstrKind::Jump { .. }
                | InstrKind::If { .. }
                | InstrKind::Return { .. }
                | InstrKind::Panic { .. }
                | InstrKind::Unreachable
        )
    }

    /// True for instructions that yield a value consumable by other
    /// instructions; `ty` is meaningful only when this is true.
    pub fn yields_value(&self) -> bool {
        !matches!(
            self,
            InstrKind::Jump { .. }
                | InstrKind::Return { .. }
                | InstrKind::Panic { .. }
                | InstrKind::Store { .. }
                | InstrKind::If { .. }
                | InstrKind::Send { .. }
                | InstrKind::RunDefers
                | InstrKind::Nop
                | InstrKind::Unreachable
                | InstrKind::DebugRef { .. }
        )
    }

    /// All operands referencing other SSA values, in a stable order. Used
    /// both to validate §3 invariant 3 (every operand belongs to this
    /// function) and to rebuild referrer lists after the lifter runs.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstrKind::BinOp { x, y, .. } | InstrKind::Compare { x, y, .. } => vec![x, y],
            InstrKind::UnOp { x, .. } => vec![x],
            InstrKind::Load { addr } => vec![addr],
            InstrKind::Store { addr, value } => vec![addr, value],
            InstrKind::Alloc { .. } => vec![],
            InstrKind::FieldAddr { base, .. } | InstrKind::Field { base, .. } => vec![base],
            InstrKind::Index { base, index } | InstrKind::IndexAddr { base, index } => {
                vec![base, index]
            }
            InstrKind::Lookup { map, key, .. } => vec![map, key],
            InstrKind::Slice { base, low, high, max } => {
                let mut v = vec![base];
                v.extend(low.iter());
                v.extend(high.iter());
                v.extend(max.iter());
                v
            }
            InstrKind::MakeSlice { len, cap } => vec![len, cap],
            InstrKind::MakeMap { reserve } => reserve.iter().collect(),
            InstrKind::MakeChan { size } => vec![size],
            InstrKind::MakeClosure { bindings, .. } => bindings.iter().collect(),
            InstrKind::TypeAssert { x, .. }
            | InstrKind::ChangeType { x }
            | InstrKind::MakeInterface { x }
            | InstrKind::Convert { x }
            | InstrKind::SliceToArrayPointer { x }
            | InstrKind::SliceToArray { x }
            | InstrKind::MultiConvert { x, .. } => vec![x],
            InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => {
                let mut v = Vec::new();
                match &cc.callee {
                    Callee::Static { value, .. } => v.push(value),
                    Callee::Invoke { receiver, .. } => v.push(receiver),
                }
                v.extend(cc.args.iter());
                v
            }
            InstrKind::RunDefers | InstrKind::Nop => vec![],
            InstrKind::Panic { x } => vec![x],
            InstrKind::Return { results } => results.iter().collect(),
            InstrKind::Jump { .. } | InstrKind::Unreachable => vec![],
            InstrKind::If { cond, .. } => vec![cond],
            InstrKind::Select { cases, .. } => {
                let mut v = Vec::new();
                for c in cases {
                    v.push(&c.chan);
                    v.extend(c.send_value.iter());
                }
                v
            }
            InstrKind::Send { chan, value } => vec![chan, value],
            InstrKind::Recv { chan, .. } => vec![chan],
            InstrKind::RangeIter { x, .. } => vec![x],
            InstrKind::Next { iter } => vec![iter],
            InstrKind::Phi { edges } => edges.iter().collect(),
            InstrKind::Extract { tuple, .. } => vec![tuple],
            InstrKind::Intrinsic { args, .. } => args.iter().collect(),
            InstrKind::DebugRef { value, .. } => vec![value],
            InstrKind::Const(_) => vec![],
        }
    }
}

/// One SSA instruction: its operation, enclosing block, result type (if
/// any), and a debug comment. `referrers` is rebuilt by
/// `Function::recompute_referrers` after every structural change (builder
/// completion, lifting) rather than being kept live incrementally.
#[derive(Debug, Clone)]
pub struct Instr {
    pub kind: InstrKind,
    pub block: BlockId,
    pub ty: Option<Type>,
    pub comment: Option<String>,
    pub referrers: Vec<InstrId>,
}

impl Instr {
    pub fn new(kind: InstrKind, block: BlockId, ty: Option<Type>) -> Self {
        Instr { kind, block, ty, comment: None, referrers: Vec::new() }
    }
}

/// Resolve a package-level global's name for debug dumps, kept here rather
/// than in `package.rs` to avoid a dependency cycle between the two
/// modules (both need `GlobalId`).
pub fn global_placeholder_name(id: GlobalId) -> String {
    format!("global#{}", id.0)
}
