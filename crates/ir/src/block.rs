//! Basic blocks (§3 "Basic block").

use crate::value::{BlockId, InstrId};

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: BlockId,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    pub instrs: Vec<InstrId>,
    pub comment: Option<String>,
}

impl BasicBlock {
    pub fn new(index: BlockId) -> Self {
        BasicBlock { index, preds: Vec::new(), succs: Vec::new(), instrs: Vec::new(), comment: None }
    }
}
