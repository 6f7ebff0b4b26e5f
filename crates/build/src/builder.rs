//! The Builder (§4.3): lowers one function's syntax tree into a CFG of SSA
//! instructions over `alloc`+load/store locals. Register promotion is the
//! Lifter's job (`crate::lifter`), run afterward unless `naive_form` is set.

use std::collections::HashMap;

use ssa_ir::input::{Expr, FuncDecl, Lit, ObjectRef, Stmt};
use ssa_ir::{
    BasicKind, BinOp, BlockId, CallCommon, CmpOp, Const, ConstKind, Function, FunctionId, InstrId,
    InstrKind, Program, Type, TypeData, Value,
};

use crate::error::{BuildError, Diagnostic};

/// One pending `goto`/forward-`label` target plus whether the label has
/// actually been declared yet (§4.3 "Labels/goto").
struct LabelSlot {
    block: BlockId,
    declared: bool,
}

struct LoopCtx {
    label: Option<String>,
    continue_block: BlockId,
    break_block: BlockId,
}

/// States the range-over-func jump variable carries (§4.3 "Range-over-func
/// jump protocol"): written by the yield closure through a captured
/// free-variable address right before it returns, read by the driver call
/// site once the call to the iterator function completes.
pub(crate) const RANGE_JUMP_READY: i64 = 0;
pub(crate) const RANGE_JUMP_BUSY: i64 = 1;
pub(crate) const RANGE_JUMP_EXIT_BREAK: i64 = 2;
pub(crate) const RANGE_JUMP_EXIT_RETURN: i64 = 3;

/// Where a `return` inside a range-over-func body must route instead of
/// returning from the yield closure itself: the jump cell plus one stash
/// cell per enclosing-function result, all captured as free-variable
/// addresses.
#[derive(Clone)]
pub(crate) struct RangeReturn {
    pub jump: Value,
    pub stash: Vec<Value>,
}

/// Lexical scope stack for `:=`/`var` locals, each mapped to the address
/// (`Value::Instr` of an `Alloc`) the builder reads/writes through until the
/// Lifter promotes it to a register.
pub struct Builder<'p> {
    pub program: &'p Program,
    func: Function,
    scopes: Vec<HashMap<String, Value>>,
    labels: HashMap<String, LabelSlot>,
    loops: Vec<LoopCtx>,
    current: BlockId,
    diagnostics: Vec<Diagnostic>,
    /// Whether this function has at least one `defer`; gates whether
    /// `Return`/`Panic` must emit `RunDefers` first (§4.3 "Defer / Go").
    has_defer: bool,
    /// Queued work discovered mid-build: anonymous functions, thunks,
    /// bound methods, wrappers, generic instances (§4.3, §5 "Nested
    /// functions and generic instantiations discovered during a build are
    /// enqueued and processed in the same thread").
    pub queued: Vec<FunctionId>,
    /// Set by `lower_labeled` just before lowering a labelled `for`/`range`,
    /// so the loop it's about to push onto `loops` picks up the label —
    /// consumed by `enter_loop`. Never survives past the statement it was
    /// set for.
    pending_label: Option<String>,
    /// Set while lowering a range-over-func yield closure's body: redirects
    /// `return` to stash its values and signal the jump cell instead of
    /// returning from the closure (§4.3 "Range-over-func jump protocol").
    range_return: Option<RangeReturn>,
}

pub struct BuiltFunction {
    pub func: Function,
    pub diagnostics: Vec<Diagnostic>,
    pub queued: Vec<FunctionId>,
}

impl<'p> Builder<'p> {
    pub fn new(program: &'p Program, func: Function) -> Self {
        let entry = BlockId(0);
        Builder {
            program,
            func,
            scopes: vec![HashMap::new()],
            labels: HashMap::new(),
            loops: Vec::new(),
            current: entry,
            diagnostics: Vec::new(),
            has_defer: false,
            queued: Vec::new(),
            pending_label: None,
            range_return: None,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind_local(&mut self, name: &str, addr: Value) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), addr);
    }

    fn lookup_local(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    fn emit(&mut self, kind: InstrKind, ty: Option<Type>) -> InstrId {
        self.func.emit(self.current, kind, ty)
    }

    fn new_block(&mut self, comment: &str) -> BlockId {
        self.func.new_block(Some(comment.to_string()))
    }

    fn set_current(&mut self, b: BlockId) {
        self.current = b;
    }

    fn jump_to(&mut self, target: BlockId) {
        if self.func.last_instr_of(self.current).is_none() {
            self.emit(InstrKind::Jump { target }, None);
            self.func.add_edge(self.current, target);
        }
    }

    fn terminated(&self) -> bool {
        self.func
            .last_instr_of(self.current)
            .map(|id| self.func.instr(id).kind.is_terminator())
            .unwrap_or(false)
    }

    /// Allocate a fresh local cell and, if an initial value is given, store
    /// it immediately.
    fn alloc_local(&mut self, name: &str, ty: &Type, init: Option<Value>) -> Value {
        let ptr_ty = Type::new(TypeData::Pointer(Box::new(ty.clone())));
        let id = self.emit(
            InstrKind::Alloc { heap: false, comment: name.to_string() },
            Some(ptr_ty),
        );
        let addr = Value::Instr(id);
        if let Some(v) = init {
            self.emit(InstrKind::Store { addr: addr.clone(), value: v }, None);
        }
        if self.program.mode.global_debug {
            self.emit(InstrKind::DebugRef { value: addr.clone(), is_addr: true }, None);
        }
        addr
    }

    fn resolve_object(&mut self, obj: &ObjectRef, ty: &Type) -> Value {
        match obj {
            ObjectRef::Local(name) => {
                if let Some(addr) = self.lookup_local(name) {
                    let id = self.emit(InstrKind::Load { addr }, Some(ty.clone()));
                    Value::Instr(id)
                } else if let Some((idx, _)) =
                    self.func.params.iter().enumerate().find(|(_, p)| &p.name == name)
                {
                    Value::Param(idx as u32)
                } else if let Some((idx, _)) =
                    self.func.free_vars.iter().enumerate().find(|(_, fv)| &fv.name == name)
                {
                    Value::FreeVar(idx as u32)
                } else {
                    // Out-of-contract (§7): the type checker guarantees every
                    // identifier resolves. Treat as a zero value rather than
                    // panicking, so a single malformed fixture doesn't take
                    // down an otherwise-valid build.
                    self.diagnostics.push(Diagnostic::warning(format!("unresolved local {name}")));
                    Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() })
                }
            }
            ObjectRef::Package { path, name } => {
                let member = self.program.package(path).and_then(|pkg| pkg.member(name).cloned());
                match member {
                    Some(ssa_ir::Member::Global(gid)) => {
                        let id = self.emit(InstrKind::Load { addr: Value::Global(gid) }, Some(ty.clone()));
                        Value::Instr(id)
                    }
                    // A bare reference to a package-level function as a value
                    // (not in call position) materializes a closure with no
                    // captures, the same representation `MakeClosure` gives
                    // an ordinary closure literal.
                    Some(ssa_ir::Member::Function(fid)) => {
                        let id = self.emit(
                            InstrKind::MakeClosure { fn_: fid, bindings: vec![] },
                            Some(ty.clone()),
                        );
                        Value::Instr(id)
                    }
                    _ => {
                        self.diagnostics.push(Diagnostic::warning(format!(
                            "unresolved package member {path}.{name}"
                        )));
                        Value::Const(Const { kind: ConstKind::Zero, ty: ty.clone() })
                    }
                }
            }
        }
    }

    pub fn lower_lit(&mut self, lit: &Lit, ty: &Type) -> Value {
        let kind = match lit {
            Lit::Bool(b) => ConstKind::Bool(*b),
            Lit::Int(i) => ConstKind::Int(*i),
            Lit::Float(f) => ConstKind::Float(*f),
            Lit::String(s) => ConstKind::String(s.clone()),
            Lit::Nil => ConstKind::Zero,
        };
        Value::Const(Const { kind, ty: ty.clone() })
    }

    pub fn lower_expr(&mut self, expr: &Expr) -> Value {
        crate::lower_expr::lower(self, expr)
    }

    pub fn lower_stmt(&mut self, stmt: &Stmt) {
        if self.terminated() {
            // Dead code after a terminator; §4.3 requires short-circuit and
            // other unreachable paths be eliminated. We simply stop lowering
            // further statements in this block list rather than emit
            // instructions nothing can reach.
            return;
        }
        match stmt {
            Stmt::Assign { lhs, rhs, define } => self.lower_assign(lhs, rhs, *define),
            Stmt::ExprStmt(e) => {
                self.lower_expr(e);
            }
            Stmt::Block(stmts) => {
                self.push_scope();
                for s in stmts {
                    self.lower_stmt(s);
                }
                self.pop_scope();
            }
            Stmt::If { cond, then_, else_ } => self.lower_if(cond, then_, else_.as_deref()),
            Stmt::For { init, cond, post, body, fresh_loopvars } => {
                self.lower_for(init.as_deref(), cond.as_ref(), post.as_deref(), body, *fresh_loopvars)
            }
            Stmt::Range { shape, key, value, x, body, define } => {
                crate::range::lower_range(self, *shape, key.as_deref(), value.as_deref(), x, body, *define)
            }
            Stmt::Switch { tag, cases, has_default } => self.lower_switch(tag.as_ref(), cases, *has_default),
            Stmt::TypeSwitch { x, bind, cases, has_default } => {
                self.lower_type_switch(x, bind.as_deref(), cases, *has_default)
            }
            Stmt::Select { cases } => crate::select::lower_select(self, cases),
            Stmt::Return(exprs) => {
                let vals: Vec<Value> = exprs.iter().map(|e| self.lower_expr(e)).collect();
                self.emit_run_defers_if_needed();
                if let Some(rr) = self.range_return.clone() {
                    for (addr, v) in rr.stash.iter().cloned().zip(vals) {
                        self.emit(InstrKind::Store { addr, value: v }, None);
                    }
                    let exit_return = Value::Const(Const {
                        kind: ConstKind::Int(RANGE_JUMP_EXIT_RETURN),
                        ty: Type::new(TypeData::Basic(BasicKind::Int)),
                    });
                    self.emit(InstrKind::Store { addr: rr.jump, value: exit_return }, None);
                    let false_val =
                        Value::Const(Const { kind: ConstKind::Bool(false), ty: Type::new(TypeData::Basic(BasicKind::Bool)) });
                    self.emit(InstrKind::Return { results: vec![false_val] }, None);
                } else {
                    self.emit(InstrKind::Return { results: vals }, None);
                }
            }
            Stmt::Go(call) => {
                let cc = self.lower_call_common(call);
                self.emit(InstrKind::Go(cc), None);
            }
            Stmt::Defer(call) => {
                self.has_defer = true;
                let cc = self.lower_call_common(call);
                self.emit(InstrKind::Defer(cc), None);
            }
            Stmt::Send { chan, value } => {
                let c = self.lower_expr(chan);
                let v = self.lower_expr(value);
                self.emit(InstrKind::Send { chan: c, value: v }, None);
            }
            Stmt::Labeled { label, stmt } => self.lower_labeled(label, stmt),
            Stmt::Goto(label) => self.lower_goto(label),
            Stmt::Break(label) => self.lower_break(label.as_deref()),
            Stmt::Continue(label) => self.lower_continue(label.as_deref()),
        }
    }

    fn emit_run_defers_if_needed(&mut self) {
        if self.has_defer {
            self.emit(InstrKind::RunDefers, None);
        }
    }

    fn lower_assign(&mut self, lhs: &[Expr], rhs: &[Expr], define: bool) {
        let values: Vec<Value> = rhs.iter().map(|e| self.lower_expr(e)).collect();
        for (l, v) in lhs.iter().zip(values) {
            match l {
                Expr::Ident(ObjectRef::Local(name), ty) if define => {
                    let addr = self.alloc_local(name, ty, Some(v));
                    self.bind_local(name, addr);
                }
                Expr::Ident(ObjectRef::Local(name), _ty) => {
                    if let Some(addr) = self.lookup_local(name) {
                        self.emit(InstrKind::Store { addr, value: v }, None);
                    }
                }
                _ => {
                    if let Some(addr) = crate::lower_expr::lower_addr(self, l) {
                        self.emit(InstrKind::Store { addr, value: v }, None);
                    }
                }
            }
        }
    }

    fn lower_if(&mut self, cond: &Expr, then_: &Stmt, else_: Option<&Stmt>) {
        let cond_v = self.lower_expr(cond);
        let then_b = self.new_block("if.then");
        let else_b = self.new_block("if.else");
        let join_b = self.new_block("if.done");
        self.emit(InstrKind::If { cond: cond_v, then_: then_b, else_: else_b }, None);
        self.func.add_edge(self.current, then_b);
        self.func.add_edge(self.current, else_b);

        self.set_current(then_b);
        self.lower_stmt(then_);
        self.jump_to(join_b);

        self.set_current(else_b);
        if let Some(e) = else_ {
            self.lower_stmt(e);
        }
        self.jump_to(join_b);

        self.set_current(join_b);
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Stmt>,
        body: &Stmt,
        fresh_loopvars: bool,
    ) {
        self.push_scope();
        if let Some(i) = init {
            self.lower_stmt(i);
        }
        let loop_vars: Vec<(String, Value)> = if fresh_loopvars {
            self.scopes.last().map(|s| s.iter().map(|(n, v)| (n.clone(), v.clone())).collect()).unwrap_or_default()
        } else {
            Vec::new()
        };
        let cond_b = self.new_block("for.cond");
        let body_b = self.new_block("for.body");
        let post_b = self.new_block("for.post");
        let done_b = self.new_block("for.done");
        self.jump_to(cond_b);

        self.set_current(cond_b);
        if let Some(c) = cond {
            let v = self.lower_expr(c);
            self.emit(InstrKind::If { cond: v, then_: body_b, else_: done_b }, None);
            self.func.add_edge(self.current, body_b);
            self.func.add_edge(self.current, done_b);
        } else {
            self.jump_to(body_b);
        }

        self.enter_loop(None, post_b, done_b);
        self.set_current(body_b);
        // Go >= 1.22 `for x := ...; ...; x++` semantics: each iteration gets
        // its own cell, so a closure formed inside the body captures that
        // iteration's value rather than the shared carrier `post` mutates
        // (§4.3). Each dynamic trip through `body_b`'s `Alloc` is itself a
        // fresh cell, so we shadow the carrier binding with a freshly
        // allocated, freshly copied one for the body only, then restore the
        // carrier binding before `post` runs so its increment still lands
        // on the one cell that threads across iterations.
        if fresh_loopvars && !loop_vars.is_empty() {
            self.push_scope();
            for (name, carrier) in &loop_vars {
                let elem_ty = match carrier {
                    Value::Instr(id) => match self.func.instr(*id).ty.clone() {
                        Some(t) => match t.data() {
                            TypeData::Pointer(elem) => (**elem).clone(),
                            _ => continue,
                        },
                        None => continue,
                    },
                    _ => continue,
                };
                let loaded = self.emit(InstrKind::Load { addr: carrier.clone() }, Some(elem_ty.clone()));
                let fresh = self.alloc_local(name, &elem_ty, Some(Value::Instr(loaded)));
                self.bind_local(name, fresh);
            }
        }
        self.lower_stmt(body);
        if fresh_loopvars && !loop_vars.is_empty() {
            self.pop_scope();
        }
        self.jump_to(post_b);
        self.loops.pop();

        self.set_current(post_b);
        if let Some(p) = post {
            self.lower_stmt(p);
        }
        self.jump_to(cond_b);

        self.set_current(done_b);
        self.pop_scope();
    }

    fn lower_switch(&mut self, tag: Option<&Expr>, cases: &[(Vec<Expr>, Vec<Stmt>)], has_default: bool) {
        let tag_v = tag.as_ref().map(|t| self.lower_expr(t));
        let done_b = self.new_block("switch.done");
        let mut default_body: Option<&Vec<Stmt>> = None;

        for (exprs, body) in cases {
            if exprs.is_empty() {
                default_body = Some(body);
                continue;
            }
            let case_b = self.new_block("switch.case");
            let next_b = self.new_block("switch.next");
            let mut cond_v = Value::Const(Const {
                kind: ConstKind::Bool(false),
                ty: Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool)),
            });
            for (i, e) in exprs.iter().enumerate() {
                let ev = self.lower_expr(e);
                let eq = match &tag_v {
                    Some(t) => {
                        let id = self.emit(
                            InstrKind::Compare { op: CmpOp::Eq, x: t.clone(), y: ev },
                            Some(Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool))),
                        );
                        Value::Instr(id)
                    }
                    None => ev,
                };
                cond_v = if i == 0 {
                    eq
                } else {
                    let id = self.emit(
                        InstrKind::BinOp { op: BinOp::Or, x: cond_v, y: eq },
                        Some(Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool))),
                    );
                    Value::Instr(id)
                };
            }
            self.emit(InstrKind::If { cond: cond_v, then_: case_b, else_: next_b }, None);
            self.func.add_edge(self.current, case_b);
            self.func.add_edge(self.current, next_b);

            self.set_current(case_b);
            self.push_scope();
            for s in body {
                self.lower_stmt(s);
            }
            self.pop_scope();
            self.jump_to(done_b);

            self.set_current(next_b);
        }

        if let Some(body) = default_body {
            self.push_scope();
            for s in body {
                self.lower_stmt(s);
            }
            self.pop_scope();
        }
        self.jump_to(done_b);
        self.set_current(done_b);
    }

    fn lower_type_switch(
        &mut self,
        x: &Expr,
        bind: Option<&str>,
        cases: &[(Vec<Type>, Vec<Stmt>)],
        _has_default: bool,
    ) {
        let xv = self.lower_expr(x);
        let done_b = self.new_block("typeswitch.done");
        for (tys, body) in cases {
            let case_b = self.new_block("typeswitch.case");
            let next_b = self.new_block("typeswitch.next");
            let mut any = Value::Const(Const {
                kind: ConstKind::Bool(tys.is_empty()),
                ty: Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool)),
            });
            for (i, t) in tys.iter().enumerate() {
                let assert_id = self.emit(
                    InstrKind::TypeAssert { x: xv.clone(), assert_ty: t.clone(), comma_ok: true },
                    Some(Type::new(TypeData::Tuple(vec![
                        t.clone(),
                        Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool)),
                    ]))),
                );
                let ok_id = self.emit(
                    InstrKind::Extract { tuple: Value::Instr(assert_id), index: 1 },
                    Some(Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool))),
                );
                any = if i == 0 {
                    Value::Instr(ok_id)
                } else {
                    let id = self.emit(
                        InstrKind::BinOp { op: BinOp::Or, x: any, y: Value::Instr(ok_id) },
                        Some(Type::new(TypeData::Basic(ssa_ir::BasicKind::Bool))),
                    );
                    Value::Instr(id)
                };
            }
            self.emit(InstrKind::If { cond: any, then_: case_b, else_: next_b }, None);
            self.func.add_edge(self.current, case_b);
            self.func.add_edge(self.current, next_b);

            self.set_current(case_b);
            self.push_scope();
            if let (Some(name), Some(t)) = (bind, tys.first()) {
                let assert_id = self.emit(
                    InstrKind::TypeAssert { x: xv.clone(), assert_ty: t.clone(), comma_ok: false },
                    Some(t.clone()),
                );
                let addr = self.alloc_local(name, t, Some(Value::Instr(assert_id)));
                self.bind_local(name, addr);
            }
            for s in body {
                self.lower_stmt(s);
            }
            self.pop_scope();
            self.jump_to(done_b);

            self.set_current(next_b);
        }
        self.jump_to(done_b);
        self.set_current(done_b);
    }

    fn lower_labeled(&mut self, label: &str, stmt: &Stmt) {
        let block = match self.labels.get(label) {
            Some(slot) => slot.block,
            None => {
                let b = self.new_block(&format!("label.{label}"));
                self.labels.insert(label.to_string(), LabelSlot { block: b, declared: false });
                b
            }
        };
        self.jump_to(block);
        self.set_current(block);
        self.labels.get_mut(label).unwrap().declared = true;
        if matches!(stmt, Stmt::For { .. } | Stmt::Range { .. }) {
            self.pending_label = Some(label.to_string());
        }
        self.lower_stmt(stmt);
        self.pending_label = None;
    }

    fn lower_goto(&mut self, label: &str) {
        let block = match self.labels.get(label) {
            Some(slot) => slot.block,
            None => {
                let b = self.new_block(&format!("label.{label}"));
                self.labels.insert(label.to_string(), LabelSlot { block: b, declared: false });
                b
            }
        };
        self.jump_to(block);
    }

    fn lower_break(&mut self, label: Option<&str>) {
        let target = match label {
            Some(l) => self.loops.iter().rev().find(|c| c.label.as_deref() == Some(l)).map(|c| c.break_block),
            None => self.loops.last().map(|c| c.break_block),
        };
        if let Some(t) = target {
            self.jump_to(t);
        }
    }

    fn lower_continue(&mut self, label: Option<&str>) {
        let target = match label {
            Some(l) => self.loops.iter().rev().find(|c| c.label.as_deref() == Some(l)).map(|c| c.continue_block),
            None => self.loops.last().map(|c| c.continue_block),
        };
        if let Some(t) = target {
            self.jump_to(t);
        }
    }

    pub fn lower_call_common(&mut self, call: &Expr) -> CallCommon {
        crate::lower_expr::lower_call_common(self, call)
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn set_block(&mut self, b: BlockId) {
        self.current = b;
    }

    pub fn fresh_block(&mut self, comment: &str) -> BlockId {
        self.new_block(comment)
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.func.add_edge(from, to);
    }

    pub fn emit_in_current(&mut self, kind: InstrKind, ty: Option<Type>) -> InstrId {
        self.emit(kind, ty)
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn jump(&mut self, target: BlockId) {
        self.jump_to(target);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated()
    }

    pub fn queue(&mut self, id: FunctionId) {
        self.queued.push(id);
    }

    pub fn resolve(&mut self, obj: &ObjectRef, ty: &Type) -> Value {
        self.resolve_object(obj, ty)
    }

    pub fn alloc(&mut self, name: &str, ty: &Type, init: Option<Value>) -> Value {
        self.alloc_local(name, ty, init)
    }

    pub fn bind(&mut self, name: &str, addr: Value) {
        self.bind_local(name, addr)
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.lookup_local(name)
    }

    pub fn enter_scope(&mut self) {
        self.push_scope();
    }

    /// Consumes the pending label set by `lower_labeled` for the statement
    /// about to be lowered, if any — used by range-over-func lowering,
    /// which builds its loop context on a separate `Builder` than the one
    /// `lower_labeled` set the label on.
    pub fn take_pending_label(&mut self) -> Option<String> {
        self.pending_label.take()
    }

    pub(crate) fn set_range_return(&mut self, r: Option<RangeReturn>) {
        self.range_return = r;
    }

    pub fn exit_scope(&mut self) {
        self.pop_scope();
    }

    pub fn enter_loop(&mut self, label: Option<String>, continue_block: BlockId, break_block: BlockId) {
        let label = label.or_else(|| self.pending_label.take());
        self.loops.push(LoopCtx { label, continue_block, break_block });
    }

    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }
}

impl Builder<'_> {
    pub fn has_defer(&self) -> bool {
        self.has_defer
    }

    pub fn merge_diagnostics(&mut self, diags: Vec<Diagnostic>) {
        self.diagnostics.extend(diags);
    }
}

/// Entry point: lowers `decl`'s body into `func` (already a stub with the
/// right signature/package), returning the finished function plus
/// diagnostics and newly queued work.
pub fn build_function(
    program: &Program,
    mut func: Function,
    decl: &FuncDecl,
) -> Result<BuiltFunction, BuildError> {
    func.params = decl
        .params
        .iter()
        .map(|p| ssa_ir::Param { name: p.name.clone(), ty: p.ty.clone() })
        .collect();
    func.new_block(Some("entry".to_string()));

    let mut builder = Builder::new(program, func);
    if let Some(body) = &decl.body {
        for s in body {
            builder.lower_stmt(s);
        }
    }
    Ok(finalize(builder))
}

/// Builds a function body with no source `FuncDecl` behind it — a bound
/// method thunk, a method-expression wrapper, a generic-instantiation
/// forwarding shim, or a range-over-func yield closure (§6.4). `params`
/// becomes the function's parameter list; `lower` emits the body against
/// the fresh `Builder`.
pub fn build_synthetic(program: &Program, mut func: Function, params: Vec<ssa_ir::Param>, lower: impl FnOnce(&mut Builder)) -> BuiltFunction {
    func.params = params;
    func.new_block(Some("entry".to_string()));
    let mut builder = Builder::new(program, func);
    lower(&mut builder);
    finalize(builder)
}

/// Shared tail: closes out dangling labels/unreachable blocks, rebuilds
/// the referrer index, and packages up diagnostics/queued work (§4.3, §7).
pub(crate) fn finalize(mut builder: Builder) -> BuiltFunction {
    if !builder.terminated() {
        builder.emit_run_defers_if_needed();
        builder.emit(InstrKind::Return { results: vec![] }, None);
    }

    // Resolve forward gotos/labels that were referenced but whose block
    // never actually got filled in (dead label) by making them jump to an
    // `Unreachable` terminator (§7 recoverable warning: "unreachable
    // blocks ... later pruned").
    let mut diagnostics = std::mem::take(&mut builder.diagnostics);
    for (name, slot) in builder.labels.iter() {
        if !slot.declared {
            diagnostics.push(Diagnostic::warning(format!("goto to undeclared label {name}")));
        }
    }
    for block in builder.func.blocks.iter().map(|b| b.index).collect::<Vec<_>>() {
        if builder.func.last_instr_of(block).is_none() {
            builder.set_current(block);
            builder.emit(InstrKind::Unreachable, None);
        }
    }

    builder.func.recompute_referrers();
    BuiltFunction { func: builder.func, diagnostics, queued: builder.queued }
}

#[cfg(test)]
mod tests {
    use ssa_ir::input::{BinOp as IBinOp, RangeShape};
    use ssa_ir::program::BuildMode;
    use ssa_ir::SignatureType;

    use super::*;

    fn int_ty() -> Type {
        Type::new(TypeData::Basic(BasicKind::Int))
    }

    fn bool_ty() -> Type {
        Type::new(TypeData::Basic(BasicKind::Bool))
    }

    fn empty_sig(results: Vec<Type>) -> SignatureType {
        SignatureType { params: vec![], variadic: false, results, type_params: vec![], receiver: None }
    }

    fn ident(name: &str, ty: Type) -> Expr {
        Expr::Ident(ObjectRef::Local(name.to_string()), ty)
    }

    fn pos() -> ssa_ir::input::Position {
        ssa_ir::input::Position::new("t.go", 1, 1)
    }

    fn decl(name: &str, sig: SignatureType, params: Vec<ssa_ir::input::ParamDecl>, body: Vec<Stmt>) -> FuncDecl {
        FuncDecl {
            name: name.to_string(),
            recv: None,
            type_params: vec![],
            sig,
            params,
            body: Some(body),
            pos: pos(),
            go_version: ssa_ir::input::GoVersion("1.22".to_string()),
        }
    }

    fn build(program: &Program, f: &FuncDecl) -> Function {
        let signature = Type::new(TypeData::Signature(f.sig.clone()));
        let id = program.alloc_function_id();
        let stub = Function::new_stub(id, f.name.clone(), signature, None);
        build_function(program, stub, f).expect("build succeeds").func
    }

    fn for_loop(fresh_loopvars: bool) -> Stmt {
        let init = Stmt::Assign {
            lhs: vec![ident("i", int_ty())],
            rhs: vec![Expr::Lit(Lit::Int(0), int_ty())],
            define: true,
        };
        let cond = Expr::Binary {
            op: IBinOp::Lt,
            x: Box::new(ident("i", int_ty())),
            y: Box::new(Expr::Lit(Lit::Int(3), int_ty())),
            ty: bool_ty(),
        };
        let post = Stmt::Assign {
            lhs: vec![ident("i", int_ty())],
            rhs: vec![Expr::Binary {
                op: IBinOp::Add,
                x: Box::new(ident("i", int_ty())),
                y: Box::new(Expr::Lit(Lit::Int(1), int_ty())),
                ty: int_ty(),
            }],
            define: false,
        };
        Stmt::For {
            init: Some(Box::new(init)),
            cond: Some(cond),
            post: Some(Box::new(post)),
            body: Box::new(Stmt::Block(vec![])),
            fresh_loopvars,
        }
    }

    fn alloc_count_named(func: &Function, name: &str) -> usize {
        func.instrs
            .iter()
            .filter(|i| matches!(&i.kind, InstrKind::Alloc { comment, .. } if comment == name))
            .count()
    }

    #[test]
    fn fresh_loopvars_allocates_a_per_iteration_cell() {
        let program = Program::new(BuildMode::new());
        let f = decl("withFresh", empty_sig(vec![]), vec![], vec![for_loop(true)]);
        let func = build(&program, &f);
        // The carrier cell allocated by `init`, plus one fresh cell
        // allocated at the top of the loop body for that iteration.
        assert_eq!(alloc_count_named(&func, "i"), 2);
    }

    #[test]
    fn non_fresh_loopvars_reuses_a_single_cell() {
        let program = Program::new(BuildMode::new());
        let f = decl("withoutFresh", empty_sig(vec![]), vec![], vec![for_loop(false)]);
        let func = build(&program, &f);
        assert_eq!(alloc_count_named(&func, "i"), 1);
    }

    fn range_over_func_decl(results: Vec<Type>, body: Stmt) -> FuncDecl {
        let yield_ty = Type::new(TypeData::Signature(SignatureType {
            params: vec![int_ty(), int_ty()],
            variadic: false,
            results: vec![bool_ty()],
            type_params: vec![],
            receiver: None,
        }));
        let outer_ty = Type::new(TypeData::Signature(SignatureType {
            params: vec![yield_ty],
            variadic: false,
            results: vec![],
            type_params: vec![],
            receiver: None,
        }));
        let range_stmt = Stmt::Range {
            shape: RangeShape::FuncValue,
            key: Some("k".to_string()),
            value: Some("v".to_string()),
            x: ident("it", outer_ty.clone()),
            body: Box::new(body),
            define: true,
        };
        decl(
            "withRange",
            empty_sig(results),
            vec![ssa_ir::input::ParamDecl { name: "it".to_string(), ty: outer_ty }],
            vec![range_stmt],
        )
    }

    #[test]
    fn range_over_func_break_sets_exit_break_state() {
        let program = Program::new(BuildMode::new());
        let f = range_over_func_decl(vec![], Stmt::Break(None));
        let func = build(&program, &f);
        let stores_exit_break = func.instrs.iter().any(|i| {
            matches!(
                &i.kind,
                InstrKind::Store { value: Value::Const(Const { kind: ConstKind::Int(n), .. }), .. }
                    if *n == RANGE_JUMP_EXIT_BREAK
            )
        });
        assert!(stores_exit_break, "break inside a range-over-func body must store RANGE_JUMP_EXIT_BREAK");
        let compares_exit_return = func.instrs.iter().any(|i| {
            matches!(
                &i.kind,
                InstrKind::Compare { op: CmpOp::Eq, y: Value::Const(Const { kind: ConstKind::Int(n), .. }), .. }
                    if *n == RANGE_JUMP_EXIT_RETURN
            )
        });
        assert!(compares_exit_return, "the driver call site must check the jump cell for RANGE_JUMP_EXIT_RETURN");
    }

    #[test]
    fn range_over_func_return_stashes_results_and_sets_exit_return_state() {
        let program = Program::new(BuildMode::new());
        let f = range_over_func_decl(vec![int_ty()], Stmt::Return(vec![Expr::Lit(Lit::Int(7), int_ty())]));
        let func = build(&program, &f);
        let stores_exit_return = func.instrs.iter().any(|i| {
            matches!(
                &i.kind,
                InstrKind::Store { value: Value::Const(Const { kind: ConstKind::Int(n), .. }), .. }
                    if *n == RANGE_JUMP_EXIT_RETURN
            )
        });
        assert!(stores_exit_return, "return inside a range-over-func body must store RANGE_JUMP_EXIT_RETURN");
        let stashes_seven = func.instrs.iter().any(|i| {
            matches!(
                &i.kind,
                InstrKind::Store { value: Value::Const(Const { kind: ConstKind::Int(7), .. }), .. }
            )
        });
        assert!(stashes_seven, "the returned value must be stashed into a captured result cell");
    }

    fn int_slice_ty() -> Type {
        Type::new(TypeData::Slice(Box::new(int_ty())))
    }

    /// A nested `for _, inner := range outer { for _, v := range inner { sum = sum + v } }`,
    /// the loop body accumulating into a local declared outside both loops.
    fn nested_range_over_slice_decl() -> FuncDecl {
        let outer_ty = Type::new(TypeData::Slice(Box::new(int_slice_ty())));
        let inner_range = Stmt::Range {
            shape: RangeShape::Indexed,
            key: None,
            value: Some("v".to_string()),
            x: ident("inner", int_slice_ty()),
            body: Box::new(Stmt::Block(vec![Stmt::Assign {
                lhs: vec![ident("sum", int_ty())],
                rhs: vec![Expr::Binary {
                    op: IBinOp::Add,
                    x: Box::new(ident("sum", int_ty())),
                    y: Box::new(ident("v", int_ty())),
                    ty: int_ty(),
                }],
                define: false,
            }])),
            define: true,
        };
        let outer_range = Stmt::Range {
            shape: RangeShape::Indexed,
            key: None,
            value: Some("inner".to_string()),
            x: ident("outer", outer_ty.clone()),
            body: Box::new(Stmt::Block(vec![inner_range])),
            define: true,
        };
        let sum_init = Stmt::Assign { lhs: vec![ident("sum", int_ty())], rhs: vec![Expr::Lit(Lit::Int(0), int_ty())], define: true };
        decl(
            "sumAll",
            empty_sig(vec![int_ty()]),
            vec![ssa_ir::input::ParamDecl { name: "outer".to_string(), ty: outer_ty }],
            vec![sum_init, outer_range, Stmt::Return(vec![ident("sum", int_ty())])],
        )
    }

    fn phi_count(func: &Function) -> usize {
        func.instrs.iter().filter(|i| matches!(&i.kind, InstrKind::Phi { .. })).count()
    }

    #[test]
    fn nested_range_over_slice_lifts_sum_into_a_phi_joined_loop_header() {
        let program = Program::new(BuildMode::new());
        let f = nested_range_over_slice_decl();
        let func = build(&program, &f);
        assert!(phi_count(&func) >= 1, "sum's loop-carried value must join at each loop header after lifting");
        assert_eq!(alloc_count_named(&func, "sum"), 0, "a lifted local leaves no surviving Alloc cell");
    }

    #[test]
    fn naive_form_keeps_sum_as_an_alloc_cell_with_no_phi() {
        let program = Program::new(BuildMode::new().with_naive_form(true));
        let f = nested_range_over_slice_decl();
        let func = build(&program, &f);
        assert_eq!(phi_count(&func), 0, "naive_form skips the lifter entirely");
        assert_eq!(alloc_count_named(&func, "sum"), 1);
    }
}
