//! The call-graph data model shared by every construction algorithm
//! (§4.6-§4.9): a directed multigraph, one edge per call site.

use std::collections::HashSet;

use ssa_ir::{Function, FunctionId, InstrId, Program, Type, Value};

/// Whether an edge was resolved without consulting the runtime-type or
/// points-to information (`Static`), or required enumerating candidate
/// implementers of an interface method (`Dynamic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallEdge {
    pub caller: FunctionId,
    pub callee: FunctionId,
    /// The call/go/defer instruction this edge was derived from. One call
    /// site may still contribute several edges (one per implementer at an
    /// `invoke`-mode site under CHA/RTA/VTA), so this is not unique within
    /// the edge list (§4.6 "one edge per call site", not one edge per
    /// caller/callee pair).
    pub site: InstrId,
    pub kind: EdgeKind,
}

/// A directed multigraph over `FunctionId`s (§4.6). `nodes` is every
/// function known to be reachable (or, for CHA, every function considered
/// at all); `edges` is the full, possibly-redundant edge list.
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    pub nodes: HashSet<FunctionId>,
    pub edges: Vec<CallEdge>,
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph::default()
    }

    pub fn add_node(&mut self, id: FunctionId) {
        self.nodes.insert(id);
    }

    pub fn add_edge(&mut self, caller: FunctionId, callee: FunctionId, site: InstrId, kind: EdgeKind) {
        self.nodes.insert(caller);
        self.nodes.insert(callee);
        self.edges.push(CallEdge { caller, callee, site, kind });
    }

    pub fn callees(&self, f: FunctionId) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter().filter(move |e| e.caller == f)
    }

    pub fn callers(&self, f: FunctionId) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter().filter(move |e| e.callee == f)
    }
}

/// Recovers the static type of an SSA value without a dedicated per-value
/// type map (§3: only `Instr` carries a `ty` field; every other operand
/// kind's type is reachable through the owning `Function`/`Program`).
/// Returns `None` for a `Const`/`Instr` whose type was never recorded (the
/// builder always sets one for value-producing instructions, so this is
/// only `None` for instructions like `RunDefers` that never appear as an
/// operand).
pub fn value_type(program: &Program, f: &Function, v: &Value) -> Option<Type> {
    match v {
        Value::Const(c) => Some(c.ty.clone()),
        Value::Instr(id) => f.instr(*id).ty.clone(),
        Value::Param(i) => f.params.get(*i as usize).map(|p| p.ty.clone()),
        Value::FreeVar(i) => f.free_vars.get(*i as usize).map(|fv| fv.ty.clone()),
        Value::Global(gid) => program.global(*gid).map(|g| g.ty.clone()),
    }
}
