//! `select` statements (§4.3 "Select").
//!
//! A single `Select` instruction evaluates every channel operand and (unless
//! a `default:` clause makes it non-blocking) blocks until one is ready; its
//! result is a tuple of `(selected index, then one (value, ok) pair per
//! receive case in source order)`. The builder dispatches on the index with
//! an if/else chain, the same shape `lower_switch` uses for an ordinary
//! `switch`.

use ssa_ir::input::SelectClause;
use ssa_ir::{BasicKind, CmpOp, Const, ConstKind, InstrKind, SelectCase, Type, TypeData, Value};

use crate::builder::Builder;

fn int_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Int))
}

fn bool_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Bool))
}

pub fn lower_select(b: &mut Builder, clauses: &[SelectClause]) {
    let default_body = clauses.iter().find(|c| c.is_default).map(|c| &c.body);
    let active: Vec<&SelectClause> = clauses.iter().filter(|c| !c.is_default).collect();

    let mut cases = Vec::with_capacity(active.len());
    let mut result_tys = vec![int_ty()];
    let mut offsets = Vec::with_capacity(active.len());
    for clause in &active {
        let chan = b.lower_expr(&clause.chan);
        if let Some(send) = &clause.send_value {
            let sv = b.lower_expr(send);
            cases.push(SelectCase { chan, send_value: Some(sv), ok_ty: None });
            offsets.push(None);
        } else {
            let elem_ty = clause.chan.ty();
            cases.push(SelectCase { chan, send_value: None, ok_ty: Some(bool_ty()) });
            offsets.push(Some(result_tys.len()));
            result_tys.push(elem_ty);
            result_tys.push(bool_ty());
        }
    }

    let sel_id = b.emit_in_current(
        InstrKind::Select { cases, blocking: default_body.is_none() },
        Some(Type::new(TypeData::Tuple(result_tys))),
    );
    let sel = Value::Instr(sel_id);
    let index_id = b.emit_in_current(InstrKind::Extract { tuple: sel.clone(), index: 0 }, Some(int_ty()));
    let index = Value::Instr(index_id);

    let done_b = b.fresh_block("select.done");

    if let Some(body) = default_body {
        // Default fires when no case is ready; the builder gives it index
        // `-1` so it dispatches through the same if/else chain as the
        // numbered cases.
        let default_b = b.fresh_block("select.default");
        let entry = b.current_block();
        let neg_one = Value::Const(Const { kind: ConstKind::Int(-1), ty: int_ty() });
        let cmp_id = b.emit_in_current(InstrKind::Compare { op: CmpOp::Eq, x: index.clone(), y: neg_one }, Some(bool_ty()));
        let next_after_default = b.fresh_block("select.cases");
        b.emit_in_current(InstrKind::If { cond: Value::Instr(cmp_id), then_: default_b, else_: next_after_default }, None);
        b.add_edge(entry, default_b);
        b.add_edge(entry, next_after_default);

        b.set_block(default_b);
        b.enter_scope();
        for s in body {
            b.lower_stmt(s);
        }
        b.exit_scope();
        b.jump(done_b);

        b.set_block(next_after_default);
    }

    for (i, clause) in active.iter().enumerate() {
        let case_b = b.fresh_block("select.case");
        let next_b = b.fresh_block("select.next");
        let entry = b.current_block();
        let idx_const = Value::Const(Const { kind: ConstKind::Int(i as i64), ty: int_ty() });
        let cmp_id = b.emit_in_current(InstrKind::Compare { op: CmpOp::Eq, x: index.clone(), y: idx_const }, Some(bool_ty()));
        b.emit_in_current(InstrKind::If { cond: Value::Instr(cmp_id), then_: case_b, else_: next_b }, None);
        b.add_edge(entry, case_b);
        b.add_edge(entry, next_b);

        b.set_block(case_b);
        b.enter_scope();
        if let (Some(name), Some(offset)) = (&clause.recv_bind, offsets[i]) {
            let elem_ty = clause.chan.ty();
            let val_id = b.emit_in_current(InstrKind::Extract { tuple: sel.clone(), index: offset }, Some(elem_ty.clone()));
            let addr = b.alloc(name, &elem_ty, Some(Value::Instr(val_id)));
            b.bind(name, addr);
        }
        for s in &clause.body {
            b.lower_stmt(s);
        }
        b.exit_scope();
        b.jump(done_b);

        b.set_block(next_b);
    }

    b.jump(done_b);
    b.set_block(done_b);
}
