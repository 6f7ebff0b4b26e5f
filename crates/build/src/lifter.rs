//! The Lifter (§4.4 "Register promotion"): rewrites `alloc`+load/store
//! locals whose address never escapes into SSA registers connected by phi
//! nodes, the same transform `mem2reg` performs in an LLVM-style pipeline.
//!
//! Skipped entirely when [`ssa_ir::BuildMode::naive_form`] is set, leaving
//! every local as an explicit stack slot (§4.1).

use std::collections::{HashMap, HashSet};

use ssa_ir::{BasicKind, BlockId, Callee, Const, ConstKind, Function, InstrId, InstrKind, Type, TypeData, Value};

/// Runs register promotion in place. Safe to call on an already-lifted
/// function (a no-op, since no `Alloc` will qualify a second time).
pub fn lift(func: &mut Function) {
    let preds = block_preds(func);
    let order = reverse_postorder(func);
    let idom = compute_idom(func, &order, &preds);
    let df = dominance_frontiers(&idom, &preds);

    for alloc in promotable_allocs(func) {
        promote(func, alloc, &idom, &df);
    }

    func.recompute_referrers();
    remove_dead_phis(func);
    func.recompute_referrers();
}

fn block_preds(func: &Function) -> Vec<Vec<BlockId>> {
    func.blocks.iter().map(|b| b.preds.clone()).collect()
}

/// Reverse postorder over reachable blocks from the entry, the traversal
/// order the dominator fixed-point needs to converge in one or two passes.
fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = vec![false; func.blocks.len()];
    let mut post = Vec::new();
    let mut stack = vec![(func.entry_block(), false)];
    while let Some((b, processed)) = stack.pop() {
        if processed {
            post.push(b);
            continue;
        }
        if visited[b.0 as usize] {
            continue;
        }
        visited[b.0 as usize] = true;
        stack.push((b, true));
        for succ in func.block(b).succs.iter().rev() {
            if !visited[succ.0 as usize] {
                stack.push((*succ, false));
            }
        }
    }
    post.reverse();
    post
}

/// Cooper/Harvey/Kennedy iterative dominator algorithm: simple to state
/// correctly without a full Lengauer-Tarjan implementation, and fast enough
/// for the per-function CFGs this builder produces.
fn compute_idom(func: &Function, order: &[BlockId], preds: &[Vec<BlockId>]) -> HashMap<BlockId, BlockId> {
    let rpo_index: HashMap<BlockId, usize> = order.iter().enumerate().map(|(i, b)| (*b, i)).collect();
    let entry = func.entry_block();
    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in order {
            if b == entry {
                continue;
            }
            let mut new_idom: Option<BlockId> = None;
            for &p in &preds[b.0 as usize] {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, &rpo_index),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }
    idom
}

fn intersect(a: BlockId, b: BlockId, idom: &HashMap<BlockId, BlockId>, rpo_index: &HashMap<BlockId, usize>) -> BlockId {
    let mut a = a;
    let mut b = b;
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Standard Cytron et al. dominance-frontier computation: for every join
/// point (a block with 2+ preds), walk each predecessor's idom chain up to
/// (but not including) the join's own idom.
fn dominance_frontiers(idom: &HashMap<BlockId, BlockId>, preds: &[Vec<BlockId>]) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut df: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for (idx, p) in preds.iter().enumerate() {
        let b = BlockId(idx as u32);
        if p.len() < 2 || !idom.contains_key(&b) {
            continue;
        }
        let dom_b = idom[&b];
        for &pred in p {
            if !idom.contains_key(&pred) {
                continue;
            }
            let mut runner = pred;
            while runner != dom_b {
                df.entry(runner).or_default().insert(b);
                if runner == idom[&runner] {
                    break;
                }
                runner = idom[&runner];
            }
        }
    }
    df
}

/// An `Alloc` qualifies for promotion iff every use of its address is a
/// `Load` or the `addr` operand of a `Store` (§4.4: "address never
/// escapes"). Any other appearance — passed to a call, fed through
/// `FieldAddr`/`IndexAddr`, stored as a `Store`'s *value* operand, etc. —
/// disqualifies it, since the lifter then can't be sure it sees every
/// write.
fn promotable_allocs(func: &Function) -> Vec<InstrId> {
    let mut candidates: Vec<InstrId> = Vec::new();
    for (idx, instr) in func.instrs.iter().enumerate() {
        if let InstrKind::Alloc { heap: false, .. } = &instr.kind {
            candidates.push(InstrId(idx as u32));
        }
    }

    let mut escapes: HashSet<InstrId> = HashSet::new();
    for instr in &func.instrs {
        match &instr.kind {
            InstrKind::Load { addr: Value::Instr(_) } => {}
            InstrKind::Store { value, .. } => {
                if let Value::Instr(id) = value {
                    escapes.insert(*id);
                }
            }
            other => {
                for operand in other.operands() {
                    if let Value::Instr(id) = operand {
                        escapes.insert(*id);
                    }
                }
            }
        }
    }

    candidates.into_iter().filter(|id| !escapes.contains(id)).collect()
}

fn promote(func: &mut Function, alloc: InstrId, idom: &HashMap<BlockId, BlockId>, df: &HashMap<BlockId, HashSet<BlockId>>) {
    let def_blocks: HashSet<BlockId> = func
        .instrs
        .iter()
        .filter_map(|instr| match &instr.kind {
            InstrKind::Store { addr: Value::Instr(a), .. } if *a == alloc => Some(instr.block),
            _ => None,
        })
        .collect();

    let mut phi_blocks: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = def_blocks.into_iter().collect();
    while let Some(b) = worklist.pop() {
        if let Some(frontier) = df.get(&b) {
            for &f in frontier {
                if phi_blocks.insert(f) {
                    worklist.push(f);
                }
            }
        }
    }

    let ty = func.instr(alloc).ty.clone();
    let zero = zero_value(&ty);
    let mut phi_instr: HashMap<BlockId, InstrId> = HashMap::new();
    for &b in &phi_blocks {
        // Sized and pre-filled so `rename` can assign each predecessor's
        // contribution by index, keeping `edges[i]` aligned with
        // `BasicBlock::preds[i]` the way every other phi in this builder
        // expects (§4.3).
        let edges = vec![zero.clone(); func.block(b).preds.len()];
        let id = func.emit(b, InstrKind::Phi { edges }, ty.clone());
        move_to_front(func, b, id);
        phi_instr.insert(b, id);
    }

    let entry = func.entry_block();
    rename(func, entry, idom, alloc, &phi_blocks, &phi_instr, zero);

    strip_alloc_and_stores(func, alloc);
}

fn zero_value(ty: &Option<Type>) -> Value {
    let ty = ty.clone().unwrap_or_else(|| Type::new(TypeData::Basic(BasicKind::Invalid)));
    Value::Const(Const { kind: ConstKind::Zero, ty })
}

fn move_to_front(func: &mut Function, block: BlockId, id: InstrId) {
    let b = func.block_mut(block);
    if let Some(pos) = b.instrs.iter().position(|i| *i == id) {
        b.instrs.remove(pos);
        b.instrs.insert(0, id);
    }
}

/// Dominator-tree-order rename pass (Cytron et al.): `incoming` is the
/// reaching definition handed down from the immediate dominator; each
/// block updates its own local copy as it processes loads/stores/phis,
/// then hands the updated value to dominator-tree children and to
/// successors' phis — never back to its own dominator-tree siblings.
fn rename(
    func: &mut Function,
    block: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    alloc: InstrId,
    phi_blocks: &HashSet<BlockId>,
    phi_instr: &HashMap<BlockId, InstrId>,
    incoming: Value,
) {
    let mut current = if phi_blocks.contains(&block) {
        Value::Instr(phi_instr[&block])
    } else {
        incoming
    };

    let instr_ids: Vec<InstrId> = func.block(block).instrs.clone();
    for id in instr_ids {
        match &func.instr(id).kind {
            InstrKind::Load { addr: Value::Instr(a) } if *a == alloc => {
                replace_all_uses(func, id, current.clone());
            }
            InstrKind::Store { addr: Value::Instr(a), value } if *a == alloc => {
                current = value.clone();
            }
            _ => {}
        }
    }

    for succ in func.block(block).succs.clone() {
        if phi_blocks.contains(&succ) {
            let phi_id = phi_instr[&succ];
            let pos = func.block(succ).preds.iter().position(|p| *p == block);
            if let (Some(pos), InstrKind::Phi { edges }) = (pos, &mut func.instr_mut(phi_id).kind) {
                edges[pos] = current.clone();
            }
        }
    }

    let children: Vec<BlockId> = (0..func.blocks.len() as u32)
        .map(BlockId)
        .filter(|b| *b != block && idom.get(b) == Some(&block))
        .collect();
    for child in children {
        rename(func, child, idom, alloc, phi_blocks, phi_instr, current.clone());
    }
}

fn replace_all_uses(func: &mut Function, old: InstrId, new: Value) {
    for instr in func.instrs.iter_mut() {
        replace_operand(&mut instr.kind, old, &new);
    }
}

fn replace_operand(kind: &mut InstrKind, old: InstrId, new: &Value) {
    fn swap(v: &mut Value, old: InstrId, new: &Value) {
        if matches!(v, Value::Instr(id) if *id == old) {
            *v = new.clone();
        }
    }
    match kind {
        InstrKind::BinOp { x, y, .. } | InstrKind::Compare { x, y, .. } => {
            swap(x, old, new);
            swap(y, old, new);
        }
        InstrKind::UnOp { x, .. } => swap(x, old, new),
        InstrKind::Load { addr } => swap(addr, old, new),
        InstrKind::Store { addr, value } => {
            swap(addr, old, new);
            swap(value, old, new);
        }
        InstrKind::Alloc { .. } => {}
        InstrKind::FieldAddr { base, .. } | InstrKind::Field { base, .. } => swap(base, old, new),
        InstrKind::Index { base, index } | InstrKind::IndexAddr { base, index } => {
            swap(base, old, new);
            swap(index, old, new);
        }
        InstrKind::Lookup { map, key, .. } => {
            swap(map, old, new);
            swap(key, old, new);
        }
        InstrKind::Slice { base, low, high, max } => {
            swap(base, old, new);
            for v in [low, high, max].into_iter().flatten() {
                swap(v, old, new);
            }
        }
        InstrKind::MakeSlice { len, cap } => {
            swap(len, old, new);
            swap(cap, old, new);
        }
        InstrKind::MakeMap { reserve } => {
            if let Some(v) = reserve {
                swap(v, old, new);
            }
        }
        InstrKind::MakeChan { size } => swap(size, old, new),
        InstrKind::MakeClosure { bindings, .. } => {
            for v in bindings {
                swap(v, old, new);
            }
        }
        InstrKind::TypeAssert { x, .. }
        | InstrKind::ChangeType { x }
        | InstrKind::MakeInterface { x }
        | InstrKind::Convert { x }
        | InstrKind::SliceToArrayPointer { x }
        | InstrKind::SliceToArray { x }
        | InstrKind::MultiConvert { x, .. } => swap(x, old, new),
        InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => {
            match &mut cc.callee {
                Callee::Static { value, .. } => swap(value, old, new),
                Callee::Invoke { receiver, .. } => swap(receiver, old, new),
            }
            for a in &mut cc.args {
                swap(a, old, new);
            }
        }
        InstrKind::Panic { x } => swap(x, old, new),
        InstrKind::Return { results } => {
            for v in results {
                swap(v, old, new);
            }
        }
        InstrKind::If { cond, .. } => swap(cond, old, new),
        InstrKind::Select { cases, .. } => {
            for c in cases {
                swap(&mut c.chan, old, new);
                if let Some(v) = &mut c.send_value {
                    swap(v, old, new);
                }
            }
        }
        InstrKind::Send { chan, value } => {
            swap(chan, old, new);
            swap(value, old, new);
        }
        InstrKind::Recv { chan, .. } => swap(chan, old, new),
        InstrKind::RangeIter { x, .. } => swap(x, old, new),
        InstrKind::Next { iter } => swap(iter, old, new),
        InstrKind::Phi { edges } => {
            for v in edges {
                swap(v, old, new);
            }
        }
        InstrKind::Extract { tuple, .. } => swap(tuple, old, new),
        InstrKind::Intrinsic { args, .. } => {
            for v in args {
                swap(v, old, new);
            }
        }
        InstrKind::DebugRef { value, .. } => swap(value, old, new),
        InstrKind::Jump { .. }
        | InstrKind::Unreachable
        | InstrKind::RunDefers
        | InstrKind::Nop
        | InstrKind::Const(_) => {}
    }
}

/// Turns the original `Alloc` and its `Store`/`Load`s into no-ops rather
/// than removing them outright, so every other instruction's `InstrId`
/// (used as a map key throughout this pass and by the sanity pass
/// afterward) stays stable.
fn strip_alloc_and_stores(func: &mut Function, alloc: InstrId) {
    for instr in func.instrs.iter_mut() {
        let is_store = matches!(&instr.kind, InstrKind::Store { addr: Value::Instr(a), .. } if *a == alloc);
        let is_load = matches!(&instr.kind, InstrKind::Load { addr: Value::Instr(a) } if *a == alloc);
        if is_store || is_load {
            instr.kind = InstrKind::Nop;
            instr.ty = None;
            instr.comment = Some("elided by register promotion".to_string());
        }
    }
    let alloc_instr = func.instr_mut(alloc);
    alloc_instr.kind = InstrKind::Nop;
    alloc_instr.ty = None;
    alloc_instr.comment = Some("elided by register promotion".to_string());
}

/// Removes phis left with a single distinct non-self operand, replacing
/// their uses with that operand (§4.4 "dead-phi elimination").
fn remove_dead_phis(func: &mut Function) {
    loop {
        let mut replaced = false;
        let phi_ids: Vec<InstrId> = func
            .instrs
            .iter()
            .enumerate()
            .filter(|(_, i)| matches!(i.kind, InstrKind::Phi { .. }))
            .map(|(i, _)| InstrId(i as u32))
            .collect();
        for id in phi_ids {
            let unique: Option<Value> = if let InstrKind::Phi { edges } = &func.instr(id).kind {
                let mut distinct: Vec<&Value> = Vec::new();
                for e in edges {
                    if !matches!(e, Value::Instr(i) if *i == id) && !distinct.iter().any(|d| value_eq(d, e)) {
                        distinct.push(e);
                    }
                }
                if distinct.len() == 1 {
                    Some(distinct[0].clone())
                } else {
                    None
                }
            } else {
                None
            };
            if let Some(v) = unique {
                replace_all_uses(func, id, v);
                let instr = func.instr_mut(id);
                instr.kind = InstrKind::Nop;
                instr.ty = None;
                instr.comment = Some("dead phi".to_string());
                replaced = true;
            }
        }
        if !replaced {
            break;
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Instr(x), Value::Instr(y)) => x == y,
        (Value::Param(x), Value::Param(y)) => x == y,
        (Value::FreeVar(x), Value::FreeVar(y)) => x == y,
        (Value::Global(x), Value::Global(y)) => x == y,
        _ => false,
    }
}
