//! Human-readable function dump, §6.3. Stable enough for snapshot-style
//! tests: every line is generated from data, never interleaved with timing-
//! or address-dependent values.

use std::fmt::Write as _;

use crate::function::Function;
use crate::instr::{Callee, InstrKind};
use crate::program::Program;
use crate::value::{ConstId, FunctionId, GlobalId, InstrId, Value};

fn value_name(f: &Function, v: &Value) -> String {
    match v {
        Value::Const(c) => format!("{:?}", c.kind),
        Value::Global(GlobalId(g)) => format!("global#{g}"),
        Value::FreeVar(i) => f
            .free_vars
            .get(*i as usize)
            .map(|fv| fv.name.clone())
            .unwrap_or_else(|| format!("freevar#{i}")),
        Value::Param(i) => f
            .params
            .get(*i as usize)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("param#{i}")),
        Value::Instr(InstrId(id)) => format!("t{id}"),
    }
}

fn instr_op_text(f: &Function, kind: &InstrKind) -> String {
    match kind {
        InstrKind::BinOp { op, x, y } => format!("{:?} {} {}", op, value_name(f, x), value_name(f, y)),
        InstrKind::UnOp { op, x } => format!("{:?} {}", op, value_name(f, x)),
        InstrKind::Compare { op, x, y } => format!("{:?} {} {}", op, value_name(f, x), value_name(f, y)),
        InstrKind::Load { addr } => format!("*{}", value_name(f, addr)),
        InstrKind::Store { addr, value } => format!("*{} = {}", value_name(f, addr), value_name(f, value)),
        InstrKind::Alloc { heap, comment } => {
            format!("local {comment} (heap={heap})")
        }
        InstrKind::FieldAddr { base, index } => format!("&{}.#{index}", value_name(f, base)),
        InstrKind::Field { base, index } => format!("{}.#{index}", value_name(f, base)),
        InstrKind::Index { base, index } => format!("{}[{}]", value_name(f, base), value_name(f, index)),
        InstrKind::IndexAddr { base, index } => format!("&{}[{}]", value_name(f, base), value_name(f, index)),
        InstrKind::Lookup { map, key, comma_ok } => {
            format!("{}[{}],ok={comma_ok}", value_name(f, map), value_name(f, key))
        }
        InstrKind::Slice { base, low, high, max } => format!(
            "slice {}[{}:{}:{}]",
            value_name(f, base),
            low.as_ref().map(|v| value_name(f, v)).unwrap_or_default(),
            high.as_ref().map(|v| value_name(f, v)).unwrap_or_default(),
            max.as_ref().map(|v| value_name(f, v)).unwrap_or_default(),
        ),
        InstrKind::MakeSlice { len, cap } => format!("make slice len={} cap={}", value_name(f, len), value_name(f, cap)),
        InstrKind::MakeMap { .. } => "make map".to_string(),
        InstrKind::MakeChan { size } => format!("make chan size={}", value_name(f, size)),
        InstrKind::MakeClosure { fn_, bindings } => format!(
            "make closure {} [{}]",
            fn_.0,
            bindings.iter().map(|b| value_name(f, b)).collect::<Vec<_>>().join(", ")
        ),
        InstrKind::TypeAssert { x, comma_ok, .. } => format!("typeassert,ok={comma_ok} {}", value_name(f, x)),
        InstrKind::ChangeType { x } => format!("changetype {}", value_name(f, x)),
        InstrKind::MakeInterface { x } => format!("make interface {}", value_name(f, x)),
        InstrKind::Convert { x } => format!("convert {}", value_name(f, x)),
        InstrKind::SliceToArrayPointer { x } => format!("slicetoarrayptr {}", value_name(f, x)),
        InstrKind::SliceToArray { x } => format!("slicetoarray {}", value_name(f, x)),
        InstrKind::MultiConvert { x, .. } => format!("multiconvert {}", value_name(f, x)),
        InstrKind::Call(cc) | InstrKind::Go(cc) | InstrKind::Defer(cc) => {
            let prefix = match kind {
                InstrKind::Go(_) => "go ",
                InstrKind::Defer(_) => "defer ",
                _ => "",
            };
            let callee = match &cc.callee {
                Callee::Static { value, .. } => value_name(f, value),
                Callee::Invoke { receiver, method } => format!("invoke {}.{method}", value_name(f, receiver)),
            };
            format!(
                "{prefix}{callee}({})",
                cc.args.iter().map(|a| value_name(f, a)).collect::<Vec<_>>().join(", ")
            )
        }
        InstrKind::RunDefers => "rundefers".to_string(),
        InstrKind::Nop => "nop".to_string(),
        InstrKind::Panic { x } => format!("panic {}", value_name(f, x)),
        InstrKind::Return { results } => {
            format!("return {}", results.iter().map(|r| value_name(f, r)).collect::<Vec<_>>().join(", "))
        }
        InstrKind::Jump { target } => format!("jump {}", target.0),
        InstrKind::If { cond, then_, else_ } => format!("if {} goto {} else {}", value_name(f, cond), then_.0, else_.0),
        InstrKind::Unreachable => "unreachable".to_string(),
        InstrKind::Select { cases, blocking } => format!("select (blocking={blocking}) {} cases", cases.len()),
        InstrKind::Send { chan, value } => format!("send {} <- {}", value_name(f, chan), value_name(f, value)),
        InstrKind::Recv { chan, comma_ok } => format!("<-{},ok={comma_ok}", value_name(f, chan)),
        InstrKind::RangeIter { x, kind } => format!("rangeiter {:?} {}", kind, value_name(f, x)),
        InstrKind::Next { iter } => format!("next {}", value_name(f, iter)),
        InstrKind::Phi { edges } => {
            format!("phi [{}]", edges.iter().map(|e| value_name(f, e)).collect::<Vec<_>>().join(", "))
        }
        InstrKind::Extract { tuple, index } => format!("extract {}#{index}", value_name(f, tuple)),
        InstrKind::DebugRef { value, is_addr } => format!("debugref {} (addr={is_addr})", value_name(f, value)),
        InstrKind::Const(ConstId(id)) => format!("const#{id}"),
    }
}

/// Renders one function in the §6.3 layout.
pub fn dump_function(program: &Program, f: &Function) -> String {
    let mut out = String::new();
    let package_path = f.package.and_then(|pid| {
        program.package_paths().into_iter().find(|p| {
            program.package(p).map(|pkg| pkg.id == pid).unwrap_or(false)
        })
    });
    writeln!(out, "# Name: {}", f.qualified_name(package_path.as_deref())).unwrap();
    if let Some(p) = &package_path {
        writeln!(out, "# Package: {p}").unwrap();
    }
    if let Some(s) = &f.synthetic {
        writeln!(out, "# Synthetic: {}", s.tag()).unwrap();
    }
    if let Some(parent) = f.parent {
        if let Some(pf) = program.function(parent) {
            writeln!(out, "# Parent: {}", pf.name).unwrap();
        }
    }
    if let Some(rb) = f.recover_block {
        writeln!(out, "# Recover: {}", rb.0).unwrap();
    }
    if !f.free_vars.is_empty() {
        writeln!(out, "# Free variables:").unwrap();
        for (i, fv) in f.free_vars.iter().enumerate() {
            writeln!(out, "# {i:3}:  {} {}", fv.name, fv.ty.display_name()).unwrap();
        }
    }
    let locals: Vec<(InstrId, &str)> = f
        .instrs
        .iter()
        .enumerate()
        .filter_map(|(i, instr)| match &instr.kind {
            InstrKind::Alloc { comment, .. } => Some((InstrId(i as u32), comment.as_str())),
            _ => None,
        })
        .collect();
    if !locals.is_empty() {
        writeln!(out, "# Locals:").unwrap();
        for (i, (id, name)) in locals.iter().enumerate() {
            let ty = f.instr(*id).ty.as_ref().map(|t| t.display_name()).unwrap_or_default();
            writeln!(out, "# {i:3}:  {name} {ty}").unwrap();
        }
    }
    writeln!(out, "{}:", f.signature.display_name()).unwrap();
    for block in &f.blocks {
        writeln!(
            out,
            "{}:{} P:{} S:{}",
            block.index.0,
            block.comment.as_ref().map(|c| format!(" {c}")).unwrap_or_default(),
            block.preds.len(),
            block.succs.len(),
        )
        .unwrap();
        for instr_id in &block.instrs {
            let instr = f.instr(*instr_id);
            let rhs = instr_op_text(f, &instr.kind);
            if instr.kind.yields_value() {
                let ty = instr.ty.as_ref().map(|t| t.display_name()).unwrap_or_default();
                writeln!(out, "    {} = {rhs}: {ty}", value_name(f, &Value::Instr(*instr_id))).unwrap();
            } else {
                writeln!(out, "    {rhs}").unwrap();
            }
        }
    }
    out
}

pub fn dump_function_by_id(program: &Program, id: FunctionId) -> Option<String> {
    program.function(id).map(|f| dump_function(program, &f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::instr::{BinOp, InstrKind};
    use crate::program::BuildMode;
    use crate::types::{BasicKind, SignatureType, Type, TypeData};
    use crate::value::Value;

    #[test]
    fn dump_contains_signature_and_blocks() {
        let program = Program::new(BuildMode::new());
        let sig = Type::new(TypeData::Signature(SignatureType {
            params: vec![],
            variadic: false,
            results: vec![],
            type_params: vec![],
            receiver: None,
        }));
        let id = program.alloc_function_id();
        let mut f = Function::new_stub(id, "main.f".into(), sig, None);
        let entry = f.new_block(None);
        let int_ty = Type::new(TypeData::Basic(BasicKind::Int));
        let one = f.emit(
            entry,
            InstrKind::Const(crate::value::ConstId(0)),
            Some(int_ty.clone()),
        );
        f.emit(
            entry,
            InstrKind::BinOp { op: BinOp::Add, x: Value::Instr(one), y: Value::Instr(one) },
            Some(int_ty),
        );
        f.emit(entry, InstrKind::Return { results: vec![] }, None);
        let text = dump_function(&program, &f);
        assert!(text.contains("# Name: main.f"));
        assert!(text.contains("0:"));
        assert!(text.contains("return"));
    }
}
