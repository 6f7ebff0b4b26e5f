//! Range statements (§4.3 "Range statements"): the five shapes the type
//! checker distinguishes ahead of time so the builder never has to inspect
//! `x`'s type itself.

use ssa_ir::input::{Expr, RangeShape, Stmt};
use ssa_ir::{BasicKind, Const, ConstKind, InstrKind, RangeKind, Type, TypeData, Value};

use crate::builder::Builder;

#[allow(clippy::too_many_arguments)]
pub fn lower_range(
    b: &mut Builder,
    shape: RangeShape,
    key: Option<&str>,
    value: Option<&str>,
    x: &Expr,
    body: &Stmt,
    define: bool,
) {
    match shape {
        RangeShape::Indexed => lower_indexed(b, key, value, x, body, define),
        RangeShape::IntegerCountdown => lower_countdown(b, key, x, body, define),
        RangeShape::MapOrString => lower_iter(b, RangeKind::MapOrString, key, value, x, body, define),
        RangeShape::Channel => lower_iter(b, RangeKind::Channel, key, value, x, body, define),
        RangeShape::FuncValue => crate::synth::lower_range_over_func(b, key, value, x, body),
    }
}

fn int_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Int))
}

fn int_const(n: i64) -> Value {
    Value::Const(Const { kind: ConstKind::Int(n), ty: int_ty() })
}

/// `for i, v := range arr` over an array/pointer-to-array/slice: a plain
/// counted loop indexing `x` each iteration (§4.3).
fn lower_indexed(b: &mut Builder, key: Option<&str>, value: Option<&str>, x: &Expr, body: &Stmt, define: bool) {
    let xv = b.lower_expr(x);
    let len_id = b.emit_in_current(InstrKind::Intrinsic { kind: ssa_ir::Intrinsic::Len, args: vec![xv.clone()] }, Some(int_ty()));
    let len = Value::Instr(len_id);

    b.enter_scope();
    let i_addr = b.alloc("range.i", &int_ty(), Some(int_const(0)));

    let cond_b = b.fresh_block("range.cond");
    let body_b = b.fresh_block("range.body");
    let post_b = b.fresh_block("range.post");
    let done_b = b.fresh_block("range.done");
    b.jump(cond_b);

    b.set_block(cond_b);
    let i_id = b.emit_in_current(InstrKind::Load { addr: i_addr.clone() }, Some(int_ty()));
    let i_val = Value::Instr(i_id);
    let cmp_id = b.emit_in_current(
        InstrKind::Compare { op: ssa_ir::CmpOp::Lt, x: i_val.clone(), y: len },
        Some(Type::new(TypeData::Basic(BasicKind::Bool))),
    );
    b.emit_in_current(InstrKind::If { cond: Value::Instr(cmp_id), then_: body_b, else_: done_b }, None);
    b.add_edge(cond_b, body_b);
    b.add_edge(cond_b, done_b);

    b.enter_loop(None, post_b, done_b);
    b.set_block(body_b);
    b.enter_scope();
    if define {
        if let Some(k) = key {
            let addr = b.alloc(k, &int_ty(), Some(i_val.clone()));
            b.bind(k, addr);
        }
        if let Some(v) = value {
            let elem_id = b.emit_in_current(InstrKind::Index { base: xv.clone(), index: i_val.clone() }, None);
            let addr = b.alloc(v, &x.ty(), Some(Value::Instr(elem_id)));
            b.bind(v, addr);
        }
    }
    b.lower_stmt(body);
    b.exit_scope();
    b.jump(post_b);
    b.exit_loop();

    b.set_block(post_b);
    let i_id2 = b.emit_in_current(InstrKind::Load { addr: i_addr.clone() }, Some(int_ty()));
    let inc_id = b.emit_in_current(
        InstrKind::BinOp { op: ssa_ir::BinOp::Add, x: Value::Instr(i_id2), y: int_const(1) },
        Some(int_ty()),
    );
    b.emit_in_current(InstrKind::Store { addr: i_addr, value: Value::Instr(inc_id) }, None);
    b.jump(cond_b);

    b.set_block(done_b);
    b.exit_scope();
}

/// `for i := range n` over an integer (Go 1.22+): counts `0..n`.
fn lower_countdown(b: &mut Builder, key: Option<&str>, x: &Expr, body: &Stmt, define: bool) {
    let n = b.lower_expr(x);
    b.enter_scope();
    let i_addr = b.alloc("range.i", &int_ty(), Some(int_const(0)));

    let cond_b = b.fresh_block("range.cond");
    let body_b = b.fresh_block("range.body");
    let post_b = b.fresh_block("range.post");
    let done_b = b.fresh_block("range.done");
    b.jump(cond_b);

    b.set_block(cond_b);
    let i_id = b.emit_in_current(InstrKind::Load { addr: i_addr.clone() }, Some(int_ty()));
    let cmp_id = b.emit_in_current(
        InstrKind::Compare { op: ssa_ir::CmpOp::Lt, x: Value::Instr(i_id), y: n },
        Some(Type::new(TypeData::Basic(BasicKind::Bool))),
    );
    b.emit_in_current(InstrKind::If { cond: Value::Instr(cmp_id), then_: body_b, else_: done_b }, None);
    b.add_edge(cond_b, body_b);
    b.add_edge(cond_b, done_b);

    b.enter_loop(None, post_b, done_b);
    b.set_block(body_b);
    b.enter_scope();
    if define {
        if let Some(k) = key {
            let i_id2 = b.emit_in_current(InstrKind::Load { addr: i_addr.clone() }, Some(int_ty()));
            let addr = b.alloc(k, &int_ty(), Some(Value::Instr(i_id2)));
            b.bind(k, addr);
        }
    }
    b.lower_stmt(body);
    b.exit_scope();
    b.jump(post_b);
    b.exit_loop();

    b.set_block(post_b);
    let i_id3 = b.emit_in_current(InstrKind::Load { addr: i_addr.clone() }, Some(int_ty()));
    let inc_id = b.emit_in_current(
        InstrKind::BinOp { op: ssa_ir::BinOp::Add, x: Value::Instr(i_id3), y: int_const(1) },
        Some(int_ty()),
    );
    b.emit_in_current(InstrKind::Store { addr: i_addr, value: Value::Instr(inc_id) }, None);
    b.jump(cond_b);

    b.set_block(done_b);
    b.exit_scope();
}

/// Map, string, and channel ranges share the `RangeIter`/`Next` protocol
/// (§3 "RangeIter"/"Next"): a single opaque iterator value advanced each
/// iteration, tested for exhaustion via the `ok` component of the extracted
/// tuple.
#[allow(clippy::too_many_arguments)]
fn lower_iter(
    b: &mut Builder,
    kind: RangeKind,
    key: Option<&str>,
    value: Option<&str>,
    x: &Expr,
    body: &Stmt,
    define: bool,
) {
    let xv = b.lower_expr(x);
    let xty = x.ty();
    let iter_id = b.emit_in_current(InstrKind::RangeIter { x: xv, kind }, None);
    let iter = Value::Instr(iter_id);

    let cond_b = b.fresh_block("range.cond");
    let body_b = b.fresh_block("range.body");
    let post_b = b.fresh_block("range.post");
    let done_b = b.fresh_block("range.done");
    b.jump(cond_b);

    b.set_block(cond_b);
    let next_id = b.emit_in_current(InstrKind::Next { iter: iter.clone() }, None);
    let next = Value::Instr(next_id);
    let ok_id = b.emit_in_current(
        InstrKind::Extract { tuple: next.clone(), index: 0 },
        Some(Type::new(TypeData::Basic(BasicKind::Bool))),
    );
    b.emit_in_current(InstrKind::If { cond: Value::Instr(ok_id), then_: body_b, else_: done_b }, None);
    b.add_edge(cond_b, body_b);
    b.add_edge(cond_b, done_b);

    b.enter_loop(None, post_b, done_b);
    b.set_block(body_b);
    b.enter_scope();
    if define {
        if let Some(k) = key {
            let key_ty = match kind {
                RangeKind::Channel => xty.clone(),
                _ => int_ty(),
            };
            let key_id = b.emit_in_current(InstrKind::Extract { tuple: next.clone(), index: 1 }, Some(key_ty.clone()));
            let addr = b.alloc(k, &key_ty, Some(Value::Instr(key_id)));
            b.bind(k, addr);
        }
        if let Some(v) = value {
            if !matches!(kind, RangeKind::Channel) {
                let val_id = b.emit_in_current(InstrKind::Extract { tuple: next.clone(), index: 2 }, None);
                let addr = b.alloc(v, &xty, Some(Value::Instr(val_id)));
                b.bind(v, addr);
            }
        }
    }
    b.lower_stmt(body);
    b.exit_scope();
    b.jump(post_b);
    b.exit_loop();

    b.set_block(post_b);
    b.jump(cond_b);

    b.set_block(done_b);
}
