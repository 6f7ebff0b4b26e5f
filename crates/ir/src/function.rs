//! `Function`: a single lowered function body (§3 "Function").

use std::sync::Arc;

use crate::block::BasicBlock;
use crate::input::Position;
use crate::instr::{Instr, InstrKind};
use crate::types::Type;
use crate::value::{BlockId, FunctionId, InstrId, PackageId, Value};

#[derive(Debug, Clone)]
pub struct FreeVar {
    pub name: String,
    pub ty: Type,
    /// The captured value in the (strictly dominating) enclosing frame: a
    /// free variable of that frame, or an allocated local there.
    pub outer: Value,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// The lifecycle stage of a `Function` (§3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Stub,
    Building,
    Built,
}

/// A synthetic function's provenance (§6.4 "Synthetic-name convention").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticKind {
    Bound,
    Thunk,
    Wrapper,
    PackageInit,
    DeclaredInit(u32),
    Instance,
    RangeOverFuncYield,
    Anonymous,
}

impl SyntheticKind {
    pub fn tag(&self) -> &'static str {
        match self {
            SyntheticKind::Bound => "bound method",
            SyntheticKind::Thunk => "thunk",
            SyntheticKind::Wrapper => "wrapper",
            SyntheticKind::PackageInit => "package initializer",
            SyntheticKind::DeclaredInit(_) => "declared init",
            SyntheticKind::Instance => "generic instance",
            SyntheticKind::RangeOverFuncYield => "range-over-func yield",
            SyntheticKind::Anonymous => "anonymous function",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub signature: Type,
    pub package: Option<PackageId>,
    pub parent: Option<FunctionId>,
    pub free_vars: Vec<FreeVar>,
    pub params: Vec<Param>,
    pub blocks: Vec<BasicBlock>,
    pub instrs: Vec<Instr>,
    pub recover_block: Option<BlockId>,
    pub synthetic: Option<SyntheticKind>,
    /// For instantiations: the origin generic function.
    pub origin: Option<FunctionId>,
    /// For instantiations: the canonical type-argument list (shared
    /// representative from `TypeCanonizer::canon_list`).
    pub type_args: Option<Arc<Vec<Type>>>,
    pub state: FunctionState,
    pub has_source: bool,
    /// The declaration's source position, when one exists (absent for
    /// synthetic functions). Retained past `Package::finish_build` clearing
    /// the transient syntax tree, since the dead-code reporter (§4.10)
    /// needs it to group and order unreachable functions.
    pub pos: Option<Position>,
    /// True if the declaring file is marked generated (§4.10 "skip
    /// functions declared in files marked generated unless overridden").
    pub generated: bool,
}

impl Function {
    pub fn new_stub(id: FunctionId, name: String, signature: Type, package: Option<PackageId>) -> Self {
        Function {
            id,
            name,
            signature,
            package,
            parent: None,
            free_vars: Vec::new(),
            params: Vec::new(),
            blocks: Vec::new(),
            instrs: Vec::new(),
            recover_block: None,
            synthetic: None,
            origin: None,
            type_args: None,
            state: FunctionState::Stub,
            has_source: true,
            pos: None,
            generated: false,
        }
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn new_block(&mut self, comment: impl Into<Option<String>>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let mut b = BasicBlock::new(id);
        b.comment = comment.into();
        self.blocks.push(b);
        id
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0 as usize].succs.push(to);
        self.blocks[to.0 as usize].preds.push(from);
    }

    /// Append an instruction to `block`, returning its id. Callers are
    /// responsible for ensuring at most one terminator ends up at the end
    /// of a block (the builder enforces this by construction).
    pub fn emit(&mut self, block: BlockId, kind: InstrKind, ty: Option<Type>) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(Instr::new(kind, block, ty));
        self.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// True iff every block but the entry has at least one predecessor and
    /// every block's instructions terminate exactly at the end (§3, §8
    /// property 1 and 5 checked structurally; full validation lives in
    /// `ssa-build`'s sanity pass, which has access to build-time context).
    pub fn last_instr_of(&self, block: BlockId) -> Option<InstrId> {
        self.blocks[block.0 as usize].instrs.last().copied()
    }

    /// Recompute every instruction's `referrers` list from scratch by
    /// scanning operands (§9 "Graph cycles": uses are a separate
    /// append-only list, not owned references, recomputed after lifting).
    pub fn recompute_referrers(&mut self) {
        for instr in &mut self.instrs {
            instr.referrers.clear();
        }
        let mut edges: Vec<(InstrId, InstrId)> = Vec::new();
        for (idx, instr) in self.instrs.iter().enumerate() {
            let user = InstrId(idx as u32);
            for operand in instr.kind.operands() {
                if let Value::Instr(def) = operand {
                    edges.push((*def, user));
                }
            }
        }
        for (def, user) in edges {
            self.instrs[def.0 as usize].referrers.push(user);
        }
    }

    pub fn qualified_name(&self, package_path: Option<&str>) -> String {
        match package_path {
            Some(p) if self.package.is_some() => format!("{p}.{}", self.name),
            _ => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasicKind, TypeData};

    fn bool_ty() -> Type {
        Type::new(TypeData::Basic(BasicKind::Bool))
    }

    #[test]
    fn referrers_are_symmetric_with_operands() {
        let sig = Type::new(TypeData::Signature(crate::types::SignatureType {
            params: vec![],
            variadic: false,
            results: vec![],
            type_params: vec![],
            receiver: None,
        }));
        let mut f = Function::new_stub(FunctionId(0), "f".into(), sig, None);
        let entry = f.new_block(None);
        let c = f.emit(entry, InstrKind::Const(crate::value::ConstId(0)), Some(bool_ty()));
        let not_c = f.emit(entry, InstrKind::UnOp { op: crate::instr::UnOp::Not, x: Value::Instr(c) }, Some(bool_ty()));
        f.recompute_referrers();
        assert_eq!(f.instr(c).referrers, vec![not_c]);
        assert!(f.instr(not_c).referrers.is_empty());
    }
}
