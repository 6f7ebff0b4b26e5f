//! Expression lowering (§4.3): everything that is not a statement.
//!
//! Short-circuit `&&`/`||`, conversions, composite literals, calls (incl.
//! intrinsics, variadic, method expressions/values), and the addressable
//! subset of expressions used on the left of `=`/`:=` and as the operand of
//! `&`.

use ssa_ir::input::{BinOp as IBinOp, ConvKind, Expr, ObjectRef, Selection, SelectionKind, UnOp as IUnOp};
use ssa_ir::{
    BasicKind, BinOp, CallCommon, Callee, CmpOp, Const, ConstKind, InstrKind, Intrinsic, Type,
    TypeData, Value,
};

use crate::builder::Builder;

fn bool_ty() -> Type {
    Type::new(TypeData::Basic(BasicKind::Bool))
}

pub fn lower(b: &mut Builder, expr: &Expr) -> Value {
    match expr {
        Expr::Lit(lit, ty) => b.lower_lit(lit, ty),
        Expr::Ident(obj, ty) => b.resolve(obj, ty),
        Expr::Binary { op: IBinOp::LAnd, x, y, ty } => lower_short_circuit(b, true, x, y, ty),
        Expr::Binary { op: IBinOp::LOr, x, y, ty } => lower_short_circuit(b, false, x, y, ty),
        Expr::Binary { op, x, y, ty } => lower_binary(b, *op, x, y, ty),
        Expr::Unary { op: IUnOp::Addr, x, .. } => {
            lower_addr(b, x).unwrap_or_else(|| lower(b, x))
        }
        Expr::Unary { op, x, ty } => lower_unary(b, *op, x, ty),
        Expr::Call { func, args, ellipsis, type_args, ty } => {
            lower_call(b, func, args, *ellipsis, type_args, ty)
        }
        Expr::IntrinsicCall { name, args, ty } => lower_intrinsic(b, name, args, ty),
        Expr::Selector { base, selection } => lower_selector(b, base, selection),
        Expr::Index { base, index, ty } => {
            let addr = index_addr(b, base, index);
            let id = b.emit_in_current(InstrKind::Load { addr }, Some(ty.clone()));
            Value::Instr(id)
        }
        Expr::Slice { base, low, high, max, ty } => {
            let bv = lower(b, base);
            let lo = low.as_ref().map(|e| lower(b, e));
            let hi = high.as_ref().map(|e| lower(b, e));
            let mx = max.as_ref().map(|e| lower(b, e));
            let id = b.emit_in_current(InstrKind::Slice { base: bv, low: lo, high: hi, max: mx }, Some(ty.clone()));
            Value::Instr(id)
        }
        Expr::CompositeLit { ty, elements } => lower_composite_lit(b, ty, elements),
        Expr::FuncLit { decl } => crate::synth::lower_func_lit(b, decl),
        Expr::TypeAssert { x, assert_ty, comma_ok } => {
            let xv = lower(b, x);
            let result_ty = if *comma_ok {
                Type::new(TypeData::Tuple(vec![assert_ty.clone(), bool_ty()]))
            } else {
                assert_ty.clone()
            };
            let id = b.emit_in_current(
                InstrKind::TypeAssert { x: xv, assert_ty: assert_ty.clone(), comma_ok: *comma_ok },
                Some(result_ty),
            );
            Value::Instr(id)
        }
        Expr::Convert { kind, x, ty } => lower_convert(b, *kind, x, ty),
        Expr::Instantiate { base, type_args, ty } => crate::synth::lower_instantiate(b, base, type_args, ty),
    }
}

/// The address of `expr`, for assignment targets and `&expr`. `None` for
/// expressions that have no addressable form (literals, calls, etc.) —
/// callers fall back to evaluating the value directly.
pub fn lower_addr(b: &mut Builder, expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Ident(ObjectRef::Local(name), _) => b.lookup(name),
        Expr::Ident(ObjectRef::Package { path, name }, _) => {
            // The global's own slot *is* its address (§4.2 "Global ... is
            // always `pointer to declared type`"); resolving through
            // `resolve` would load it instead.
            b.program
                .package(path)
                .and_then(|pkg| pkg.member(name).cloned())
                .and_then(|m| match m {
                    ssa_ir::Member::Global(gid) => Some(Value::Global(gid)),
                    _ => None,
                })
        }
        Expr::Unary { op: IUnOp::Deref, x, .. } => Some(lower(b, x)),
        Expr::Index { base, index, ty } => Some(index_addr_typed(b, base, index, ty)),
        Expr::Selector { base, selection } => Some(selector_addr(b, base, selection)),
        _ => None,
    }
}

fn index_addr(b: &mut Builder, base: &Expr, index: &Expr) -> Value {
    let bv = lower(b, base);
    let iv = lower(b, index);
    let id = b.emit_in_current(InstrKind::IndexAddr { base: bv, index: iv }, None);
    Value::Instr(id)
}

fn index_addr_typed(b: &mut Builder, base: &Expr, index: &Expr, elem_ty: &Type) -> Value {
    let bv = lower(b, base);
    let iv = lower(b, index);
    let ptr_ty = Type::new(TypeData::Pointer(Box::new(elem_ty.clone())));
    let id = b.emit_in_current(InstrKind::IndexAddr { base: bv, index: iv }, Some(ptr_ty));
    Value::Instr(id)
}

fn selector_addr(b: &mut Builder, base: &Expr, selection: &Selection) -> Value {
    let mut bv = lower_base_for_selection(b, base, selection);
    for idx in &selection.index_path {
        bv = field_addr(b, bv, *idx);
    }
    bv
}

fn field_addr(b: &mut Builder, base: Value, index: usize) -> Value {
    let id = b.emit_in_current(InstrKind::FieldAddr { base, index }, None);
    Value::Instr(id)
}

/// A selector's base, taking an address when the base is a value type (a
/// struct, not already a pointer) reached through an addressable base
/// expression, matching Go's implicit `&x` for `x.Field` on an addressable
/// struct value.
fn lower_base_for_selection(b: &mut Builder, base: &Expr, selection: &Selection) -> Value {
    if selection.indirect {
        lower(b, base)
    } else {
        lower_addr(b, base).unwrap_or_else(|| lower(b, base))
    }
}

fn lower_selector(b: &mut Builder, base: &Expr, selection: &Selection) -> Value {
    match selection.kind {
        SelectionKind::FieldVal => {
            let bv = lower_base_for_selection(b, base, selection);
            let mut cur = bv;
            let last = selection.index_path.len().saturating_sub(1);
            for (i, idx) in selection.index_path.iter().enumerate() {
                let ty = if i == last { Some(selection.ty.clone()) } else { None };
                let id = b.emit_in_current(InstrKind::Field { base: cur, index: *idx }, ty);
                cur = Value::Instr(id);
            }
            cur
        }
        SelectionKind::MethodValue => crate::synth::lower_bound_method(b, base, selection),
        SelectionKind::MethodExpr => crate::synth::lower_method_expr(b, base, selection),
    }
}

fn lower_short_circuit(b: &mut Builder, is_and: bool, x: &Expr, y: &Expr, ty: &Type) -> Value {
    let xv = lower(b, x);
    let entry = b.current_block();
    let rhs_b = b.fresh_block(if is_and { "land.rhs" } else { "lor.rhs" });
    let join_b = b.fresh_block(if is_and { "land.done" } else { "lor.done" });

    let (then_, else_) = if is_and { (rhs_b, join_b) } else { (join_b, rhs_b) };
    b.emit_in_current(InstrKind::If { cond: xv, then_, else_ }, None);
    b.add_edge(entry, then_);
    b.add_edge(entry, else_);

    b.set_block(rhs_b);
    let yv = lower(b, y);
    b.jump(join_b);

    b.set_block(join_b);
    // `join_b`'s predecessors are, in edge-registration order, the
    // short-circuit path from `entry` then the evaluated-`y` path from
    // `rhs_b` — `Phi::edges` must line up with that order (§3 "phi").
    let short_circuit_const = Value::Const(Const { kind: ConstKind::Bool(!is_and), ty: ty.clone() });
    let id = b.emit_in_current(InstrKind::Phi { edges: vec![short_circuit_const, yv] }, Some(ty.clone()));
    Value::Instr(id)
}

fn lower_binary(b: &mut Builder, op: IBinOp, x: &Expr, y: &Expr, ty: &Type) -> Value {
    let xv = lower(b, x);
    let yv = lower(b, y);
    let kind = match to_exec_binop(op) {
        Ok(bop) => InstrKind::BinOp { op: bop, x: xv, y: yv },
        Err(cop) => InstrKind::Compare { op: cop, x: xv, y: yv },
    };
    let id = b.emit_in_current(kind, Some(ty.clone()));
    Value::Instr(id)
}

fn to_exec_binop(op: IBinOp) -> Result<BinOp, CmpOp> {
    match op {
        IBinOp::Add => Ok(BinOp::Add),
        IBinOp::Sub => Ok(BinOp::Sub),
        IBinOp::Mul => Ok(BinOp::Mul),
        IBinOp::Quo => Ok(BinOp::Quo),
        IBinOp::Rem => Ok(BinOp::Rem),
        IBinOp::And => Ok(BinOp::And),
        IBinOp::Or => Ok(BinOp::Or),
        IBinOp::Xor => Ok(BinOp::Xor),
        IBinOp::Shl => Ok(BinOp::Shl),
        IBinOp::Shr => Ok(BinOp::Shr),
        IBinOp::AndNot => Ok(BinOp::AndNot),
        IBinOp::Eq => Err(CmpOp::Eq),
        IBinOp::Ne => Err(CmpOp::Ne),
        IBinOp::Lt => Err(CmpOp::Lt),
        IBinOp::Le => Err(CmpOp::Le),
        IBinOp::Gt => Err(CmpOp::Gt),
        IBinOp::Ge => Err(CmpOp::Ge),
        IBinOp::LAnd | IBinOp::LOr => unreachable!("short-circuit ops handled separately"),
    }
}

fn lower_unary(b: &mut Builder, op: IUnOp, x: &Expr, ty: &Type) -> Value {
    match op {
        IUnOp::Recv => {
            let cv = lower(b, x);
            let id = b.emit_in_current(InstrKind::Recv { chan: cv, comma_ok: false }, Some(ty.clone()));
            Value::Instr(id)
        }
        IUnOp::Neg | IUnOp::Not | IUnOp::Xor | IUnOp::Deref => {
            let xv = lower(b, x);
            let uop = match op {
                IUnOp::Neg => ssa_ir::UnOp::Neg,
                IUnOp::Not => ssa_ir::UnOp::Not,
                IUnOp::Xor => ssa_ir::UnOp::Xor,
                IUnOp::Deref => ssa_ir::UnOp::Deref,
                _ => unreachable!(),
            };
            let id = b.emit_in_current(InstrKind::UnOp { op: uop, x: xv }, Some(ty.clone()));
            Value::Instr(id)
        }
        IUnOp::Addr => unreachable!("handled by lower_addr in the caller"),
    }
}

pub fn lower_call_common(b: &mut Builder, call: &Expr) -> CallCommon {
    match call {
        Expr::Call { func, args, ellipsis, .. } => {
            let callee = lower_callee(b, func);
            let argv = args.iter().map(|a| lower(b, a)).collect();
            CallCommon { callee, args: argv, ellipsis: *ellipsis }
        }
        other => CallCommon {
            callee: Callee::Static { value: lower(b, other), target: None },
            args: Vec::new(),
            ellipsis: false,
        },
    }
}

fn lower_callee(b: &mut Builder, func: &Expr) -> Callee {
    match func {
        Expr::Selector { base, selection } if matches!(selection.kind, SelectionKind::MethodValue) => {
            if let Some(method) = &selection.method {
                if base.ty().is_interface() {
                    let receiver = lower(b, base);
                    return Callee::Invoke { receiver, method: method.name.clone() };
                }
            }
            let value = crate::synth::lower_bound_method(b, base, selection);
            Callee::Static { value, target: None }
        }
        Expr::Ident(ObjectRef::Package { path, name }, _) => {
            let target = b.program.package(path).and_then(|pkg| match pkg.member(name) {
                Some(ssa_ir::Member::Function(fid)) => Some(*fid),
                _ => None,
            });
            let value = lower(b, func);
            Callee::Static { value, target }
        }
        _ => Callee::Static { value: lower(b, func), target: None },
    }
}

fn lower_call(b: &mut Builder, func: &Expr, args: &[Expr], ellipsis: bool, type_args: &[Type], ty: &Type) -> Value {
    let _ = type_args;
    let callee = lower_callee(b, func);
    let argv = args.iter().map(|a| lower(b, a)).collect();
    let cc = CallCommon { callee, args: argv, ellipsis };
    let id = b.emit_in_current(InstrKind::Call(cc), Some(ty.clone()));
    Value::Instr(id)
}

fn lower_intrinsic(b: &mut Builder, name: &str, args: &[Expr], ty: &Type) -> Value {
    match name {
        "new" => {
            let id = b.emit_in_current(InstrKind::Alloc { heap: true, comment: "new".to_string() }, Some(ty.clone()));
            Value::Instr(id)
        }
        "make" => lower_make(b, args, ty),
        "panic" => {
            let xv = args.first().map(|a| lower(b, a)).unwrap_or(Value::Const(Const {
                kind: ConstKind::Zero,
                ty: ty.clone(),
            }));
            b.emit_in_current(InstrKind::Panic { x: xv }, None);
            Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() })
        }
        "len" => lower_len_cap(b, Intrinsic::Len, args, ty),
        "cap" => lower_len_cap(b, Intrinsic::Cap, args, ty),
        "unsafe.Add" => lower_len_cap(b, Intrinsic::UnsafeAdd, args, ty),
        "unsafe.Slice" => lower_len_cap(b, Intrinsic::UnsafeSlice, args, ty),
        _ => {
            let argv: Vec<Value> = args.iter().map(|a| lower(b, a)).collect();
            let id = b.emit_in_current(InstrKind::Intrinsic { kind: Intrinsic::Len, args: argv }, Some(ty.clone()));
            Value::Instr(id)
        }
    }
}

fn lower_len_cap(b: &mut Builder, kind: Intrinsic, args: &[Expr], ty: &Type) -> Value {
    let argv: Vec<Value> = args.iter().map(|a| lower(b, a)).collect();
    let id = b.emit_in_current(InstrKind::Intrinsic { kind, args: argv }, Some(ty.clone()));
    Value::Instr(id)
}

fn lower_make(b: &mut Builder, args: &[Expr], ty: &Type) -> Value {
    match ty.underlying().data() {
        TypeData::Slice(_) => {
            let len = args.first().map(|a| lower(b, a)).unwrap_or(zero_int());
            let cap = args.get(1).cloned().map(|a| lower(b, &a)).unwrap_or_else(|| len.clone());
            let id = b.emit_in_current(InstrKind::MakeSlice { len, cap }, Some(ty.clone()));
            Value::Instr(id)
        }
        TypeData::Map(_) => {
            let reserve = args.first().map(|a| lower(b, a));
            let id = b.emit_in_current(InstrKind::MakeMap { reserve }, Some(ty.clone()));
            Value::Instr(id)
        }
        TypeData::Chan(_) => {
            let size = args.first().map(|a| lower(b, a)).unwrap_or(zero_int());
            let id = b.emit_in_current(InstrKind::MakeChan { size }, Some(ty.clone()));
            Value::Instr(id)
        }
        _ => Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() }),
    }
}

fn zero_int() -> Value {
    Value::Const(Const { kind: ConstKind::Int(0), ty: Type::new(TypeData::Basic(BasicKind::Int)) })
}

fn lower_convert(b: &mut Builder, kind: ConvKind, x: &Expr, ty: &Type) -> Value {
    let xv = lower(b, x);
    let instr_kind = match kind {
        ConvKind::ChangeType => InstrKind::ChangeType { x: xv },
        ConvKind::Numeric => InstrKind::Convert { x: xv },
        ConvKind::Interface => {
            // Seeds RTA's runtime-type work-list (§4.8): every concrete
            // type ever boxed into an interface is a candidate receiver at
            // some later `invoke`-mode call site.
            b.program.record_runtime_type(x.ty());
            InstrKind::MakeInterface { x: xv }
        }
        ConvKind::SliceToArrayPointer => InstrKind::SliceToArrayPointer { x: xv },
        ConvKind::SliceToArray => InstrKind::SliceToArray { x: xv },
        ConvKind::StringToBytes | ConvKind::StringToRunes | ConvKind::BytesToString | ConvKind::RunesToString => {
            InstrKind::Convert { x: xv }
        }
        ConvKind::MultiConvert => InstrKind::MultiConvert { x: xv, kinds: vec![ty.clone()] },
    };
    let id = b.emit_in_current(instr_kind, Some(ty.clone()));
    Value::Instr(id)
}

fn lower_composite_lit(b: &mut Builder, ty: &Type, elements: &[(Option<Expr>, Expr)]) -> Value {
    // Two-phase evaluation (§4.3 "Composite literals"): every element
    // expression is evaluated left to right before any is stored, so a side
    // effect in one element can never observe a partially built literal.
    let values: Vec<(Option<Value>, Value)> = elements
        .iter()
        .map(|(k, v)| (k.as_ref().map(|k| lower(b, k)), lower(b, v)))
        .collect();

    match ty.underlying().data() {
        TypeData::Struct(_) => {
            let addr = b.alloc("composite", ty, None);
            for (i, (key, v)) in values.into_iter().enumerate() {
                let idx = match &key {
                    Some(Value::Const(Const { kind: ConstKind::Int(n), .. })) => *n as usize,
                    _ => i,
                };
                let faddr = field_addr(b, addr.clone(), idx);
                b.emit_in_current(InstrKind::Store { addr: faddr, value: v }, None);
            }
            let id = b.emit_in_current(InstrKind::Load { addr: addr.clone() }, Some(ty.clone()));
            Value::Instr(id)
        }
        TypeData::Array(_) => {
            // Fixed size is the declared element count, not the number of
            // explicit initializers: `[5]int{1, 2}` backs a 5-element
            // object with positions 2-4 left at the zero value `alloc`
            // already gives them (§4.3 "Composite literals").
            let addr = b.alloc("composite", ty, None);
            for (i, (key, v)) in values.into_iter().enumerate() {
                let idx_val = match key {
                    Some(k) => k,
                    None => Value::Const(Const { kind: ConstKind::Int(i as i64), ty: Type::new(TypeData::Basic(BasicKind::Int)) }),
                };
                let eaddr = b.emit_in_current(InstrKind::IndexAddr { base: addr.clone(), index: idx_val }, None);
                b.emit_in_current(InstrKind::Store { addr: Value::Instr(eaddr), value: v }, None);
            }
            let id = b.emit_in_current(InstrKind::Load { addr: addr.clone() }, Some(ty.clone()));
            Value::Instr(id)
        }
        TypeData::Slice(_) => {
            let len = Value::Const(Const { kind: ConstKind::Int(values.len() as i64), ty: Type::new(TypeData::Basic(BasicKind::Int)) });
            let slice_id = b.emit_in_current(InstrKind::MakeSlice { len: len.clone(), cap: len }, Some(ty.clone()));
            let addr = Value::Instr(slice_id);
            for (i, (key, v)) in values.into_iter().enumerate() {
                let idx_val = match key {
                    Some(k) => k,
                    None => Value::Const(Const { kind: ConstKind::Int(i as i64), ty: Type::new(TypeData::Basic(BasicKind::Int)) }),
                };
                let eaddr = b.emit_in_current(InstrKind::IndexAddr { base: addr.clone(), index: idx_val }, None);
                b.emit_in_current(InstrKind::Store { addr: Value::Instr(eaddr), value: v }, None);
            }
            addr
        }
        TypeData::Map(_) => {
            let map_id = b.emit_in_current(InstrKind::MakeMap { reserve: None }, Some(ty.clone()));
            let map_v = Value::Instr(map_id);
            for (key, v) in values {
                let k = key.unwrap_or_else(|| Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() }));
                let addr = b.emit_in_current(InstrKind::IndexAddr { base: map_v.clone(), index: k }, None);
                b.emit_in_current(InstrKind::Store { addr: Value::Instr(addr), value: v }, None);
            }
            map_v
        }
        _ => Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() }),
    }
}
