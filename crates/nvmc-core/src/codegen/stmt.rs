//! Statement lowering and the per-function entry point, C5's other half
//! (§4.4, §4.5).
//!
//! `compile_function` sets up one function's scope/label/slot state and
//! walks its body; `compile_stmt` dispatches each statement kind. Loops
//! and `switch` push a `ControlContext` (`mod.rs`) consulted by
//! `break`/`continue`/`fallthrough`/`return`.

use crate::ast::{self, Block, CompoundOp, LValue, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::model::{CodeRange, TypeTag, VarKind};
use crate::opcode::Opcode;

use super::{Codegen, ControlContext};

/// Whether a function body's last statement is one that itself already
/// unwinds defers and emits `RET` — so `compile_function`'s own fall-off
/// epilogue would be unreachable and must be skipped. Deliberately
/// conservative: only a trailing `return` (through any nesting of plain
/// `{ }` blocks) is recognized; an `if`/`switch` whose every arm returns
/// falls through to the safe default of still emitting the epilogue.
fn block_ends_in_return(body: &[Stmt]) -> bool {
    match body.last() {
        Some(Stmt::Return { .. }) => true,
        Some(Stmt::Block(inner)) => block_ends_in_return(inner),
        _ => false,
    }
}

impl Codegen {
    /// Compiles one function/method/lambda body end to end: argument
    /// declaration, `INITSLOT` placeholder, the body itself, an implicit
    /// defer-unwind-and-`RET` for a path that falls off the end (only
    /// emitted when the body doesn't already end in an explicit `return`,
    /// which has already unwound and emitted its own `RET`), and the
    /// function's own defer catch/finally bodies appended last (§4.4,
    /// §4.7).
    pub(crate) fn compile_function(&mut self, id: crate::intern::FunctionId, decl: &ast::FuncDecl) -> CompileResult<()> {
        self.current_function = Some(id);
        self.scope = crate::scope::VarScope::new();
        self.defer_frames = Vec::new();
        self.void_call_positions = super::voidcalls::collect_void_call_positions(&decl.body);

        let declaring_file = self.registry.get(id).declaring_file.clone();
        self.current_document = self.document_index(&declaring_file);

        let entry_label = self.registry.get(id).entry_label;
        self.bind_label(entry_label);
        let start = self.emitter_mut().len();

        let mut parameters = Vec::new();
        if let Some(receiver) = &decl.receiver {
            let slot = self.scope.declare_argument(&mut self.interner, &receiver.name, TypeTag::Struct)?;
            let interned = self.interner.intern(&receiver.name);
            debug_assert_eq!(slot, 0, "the receiver is always argument zero");
            parameters.push((interned, TypeTag::Struct));
        }
        for param in &decl.params {
            self.scope.declare_argument(&mut self.interner, &param.name, param.type_tag)?;
            let interned = self.interner.intern(&param.name);
            parameters.push((interned, param.type_tag));
        }

        let initslot_offset = self.emitter_mut().len();
        self.emitter_mut().emit_word_operand(Opcode::INITSLOT, 0);

        // Named results are ordinary locals, live for the whole body so an
        // explicit assignment earlier in the function is visible to a later
        // naked `return` (§4.5). `INITSLOT` zero-initializes every local
        // slot, which this crate already treats as a type's zero value (see
        // `push_default_return_values`), so no explicit store is needed here.
        let mut named_results = Vec::with_capacity(decl.named_results.len());
        for (name, type_tag) in decl.named_results.iter().zip(decl.results.iter()) {
            self.declare_named_local(name, *type_tag)?;
            named_results.push(name.clone());
        }
        self.current_named_results = named_results;

        for stmt in &decl.body {
            self.compile_stmt(stmt)?;
        }

        // Implicit fall-off-the-end exit, for a `void` function (or one
        // whose last statement isn't itself a terminating `return`) whose
        // body has no explicit return on every path. Skipped when the body
        // already ends in `return`: that statement already ran
        // `unwind_defers_for_return` and emitted its own `RET`, so emitting
        // this unconditionally would double every open defer's `ENDTRY_L`.
        if !block_ends_in_return(&decl.body) {
            crate::defer::unwind_defers_for_return(self)?;
            self.emitter_mut().emit(Opcode::RET);
        }

        let frames = self.defer_frames_snapshot();
        crate::defer::emit_defer_bodies(self, &frames)?;

        let end = self.emitter_mut().len();
        self.initslot_sites
            .push(crate::resolve::InitSlotSite { instr_offset: initslot_offset, locals: self.scope.local_count(), args: self.scope.arg_count() });

        let local_names = self.scope.declared_locals().to_vec();
        let arg_count = self.scope.arg_count();
        let local_count = self.scope.local_count();
        let scope = self.registry.get_mut(id);
        scope.opcode_range = (start, end);
        scope.arg_count = arg_count;
        scope.local_count = local_count;
        scope.parameters = parameters;
        scope.local_names = local_names;

        self.current_function = None;
        self.current_named_results = Vec::new();
        Ok(())
    }

    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::ExprStmt(e) => self.compile_expr_as_void_stmt(e),
            Stmt::Define { name, type_tag, value, pos } => self.compile_define(name, *type_tag, value, *pos),
            Stmt::Assign { targets, value, pos } => self.compile_assign(targets, value, *pos),
            Stmt::CompoundAssign { target, op, value, pos } => self.compile_compound_assign(target, op, value, *pos),
            Stmt::Return { values, pos } => self.compile_return(values, *pos),
            Stmt::If { cond, then_body, else_body, pos } => self.compile_if(cond, then_body, else_body, *pos),
            Stmt::For { init, cond, post, body, pos } => self.compile_for(init, cond, post, body, *pos),
            Stmt::ForRange { key, value, collection, body, pos } => self.compile_for_range(key, value, collection, body, *pos),
            Stmt::Switch { tag, cases, pos } => self.compile_switch(tag, cases, *pos),
            Stmt::Break => {
                let target = self.break_target()?;
                self.emitter_mut().emit_jump(Opcode::JMP_L, target);
                Ok(())
            }
            Stmt::Continue => {
                let target = self.continue_target()?;
                self.emitter_mut().emit_jump(Opcode::JMP_L, target);
                Ok(())
            }
            Stmt::Fallthrough => {
                let target = self.fallthrough_target()?;
                self.emitter_mut().emit_jump(Opcode::JMP_L, target);
                Ok(())
            }
            Stmt::Defer { call, pos } => crate::defer::begin_defer(self, call.clone(), *pos),
            Stmt::Block(body) => {
                self.scope.enter_block();
                for s in body {
                    self.compile_stmt(s)?;
                }
                self.scope.leave_block();
                Ok(())
            }
        }
    }

    /// `Stmt::ExprStmt` is always a `Call` used purely for effect — this is
    /// the one place the void-call pre-pass result actually matters: it
    /// asserts the invariant rather than discovering it anew.
    fn compile_expr_as_void_stmt(&mut self, expr: &ast::Expr) -> CompileResult<()> {
        debug_assert!(self.void_call_positions.contains(&expr.pos) || !matches!(expr.kind.as_ref(), ast::ExprKind::Call { .. }));
        if let ast::ExprKind::Call { .. } = expr.kind.as_ref() {
            self.compile_call_expr(expr, true)
        } else {
            self.compile_expr(expr)?;
            self.emitter_mut().emit(Opcode::DROP);
            Ok(())
        }
    }

    fn declare_named_local(&mut self, name: &str, type_tag: TypeTag) -> CompileResult<u8> {
        self.scope.declare_local(&mut self.interner, name, type_tag)
    }

    fn compile_define(&mut self, name: &str, type_tag: TypeTag, value: &ast::Expr, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        self.compile_expr(value)?;
        if name == "_" {
            self.emitter_mut().emit(Opcode::DROP);
            return Ok(());
        }
        let slot = self.declare_named_local(name, type_tag)?;
        self.emit_store_local(slot);
        Ok(())
    }

    fn compile_assign(&mut self, targets: &[LValue], value: &ast::Expr, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        self.compile_expr(value)?;
        if targets.len() == 1 {
            self.store_value_to_target(&targets[0])
        } else {
            for target in targets.iter().rev() {
                self.store_value_to_target(target)?;
            }
            Ok(())
        }
    }

    fn compile_compound_assign(&mut self, target: &LValue, op: &CompoundOp, value: &ast::Expr, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        self.load_target(target)?;
        self.compile_expr(value)?;
        let opcode = match op {
            CompoundOp::Add => Opcode::ADD,
            CompoundOp::Sub => Opcode::SUB,
            CompoundOp::Mul => Opcode::MUL,
            CompoundOp::Div => Opcode::DIV,
            CompoundOp::Mod => Opcode::MOD,
        };
        self.emitter_mut().emit(opcode);
        self.store_value_to_target(target)
    }

    /// Stores the value currently on top of the stack into `target`.
    fn store_value_to_target(&mut self, target: &LValue) -> CompileResult<()> {
        match target {
            LValue::Ident(name) => self.store_to_named_slot(name),
            LValue::Blank => {
                self.emitter_mut().emit(Opcode::DROP);
                Ok(())
            }
            // `SETITEM` pops (container, index, value) in that push order;
            // the value is already on the stack, so it is parked in a
            // temp local while the container/index are evaluated, then
            // reloaded on top (§4.5).
            LValue::Selector { base, field_index, .. } => {
                let tmp = self.declare_anonymous_local(TypeTag::Any)?;
                self.emit_store_local(tmp);
                self.compile_expr(base)?;
                self.emitter_mut().push_int(i64::from(*field_index));
                self.emit_load_local(tmp);
                self.emitter_mut().emit(Opcode::SETITEM);
                Ok(())
            }
            LValue::Index { base, index } => {
                let tmp = self.declare_anonymous_local(TypeTag::Any)?;
                self.emit_store_local(tmp);
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.emit_load_local(tmp);
                self.emitter_mut().emit(Opcode::SETITEM);
                Ok(())
            }
        }
    }

    fn store_to_named_slot(&mut self, name: &str) -> CompileResult<()> {
        if name == "_" {
            self.emitter_mut().emit(Opcode::DROP);
            return Ok(());
        }
        let id = self.interner.intern(name);
        if let Some(info) = self.scope.lookup(id) {
            let (kind, slot) = (info.kind, info.slot);
            match kind {
                VarKind::Argument => self.emit_store_arg(slot),
                VarKind::Local => self.emit_store_local(slot),
                VarKind::Static => unreachable!("globals are not held in VarScope"),
            }
            return Ok(());
        }
        let slot = self.global_slot(name)?;
        self.emit_store_static(slot);
        Ok(())
    }

    /// Loads the current value of an lvalue (`CompoundAssign`'s read side).
    fn load_target(&mut self, target: &LValue) -> CompileResult<()> {
        match target {
            LValue::Ident(name) => {
                if name == "_" {
                    return Err(CompileError::structural("`_ += ...` has no left-hand value to read", None));
                }
                self.compile_ident_value(name)
            }
            LValue::Blank => Err(CompileError::structural("`_ += ...` has no left-hand value to read", None)),
            LValue::Selector { base, field_index, .. } => {
                self.compile_expr(base)?;
                self.emitter_mut().push_int(i64::from(*field_index));
                self.emitter_mut().emit(Opcode::PICKITEM);
                Ok(())
            }
            LValue::Index { base, index } => {
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.emitter_mut().emit(Opcode::PICKITEM);
                Ok(())
            }
        }
    }

    fn compile_ident_value(&mut self, name: &str) -> CompileResult<()> {
        let id = self.interner.intern(name);
        if let Some(info) = self.scope.lookup(id) {
            if let Some(alias) = info.inline_alias.clone() {
                return self.compile_expr(&alias.source_expr);
            }
            let (kind, slot) = (info.kind, info.slot);
            match kind {
                VarKind::Argument => self.emit_load_arg(slot),
                VarKind::Local => self.emit_load_local(slot),
                VarKind::Static => unreachable!("globals are not held in VarScope"),
            }
            return Ok(());
        }
        let slot = self.global_slot(name)?;
        self.emit_load_static(slot);
        Ok(())
    }

    /// `return` (§4.5, §4.7 step 2): drop any live range-loop sentinels,
    /// unwind open defers, push return values (or named results, for a
    /// naked `return` inside a function with named results), `RET`.
    fn compile_return(&mut self, values: &[ast::Expr], pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        let drop_count = self.pending_sentinel_drop_count();
        if drop_count > 3 {
            self.emitter_mut().push_int(drop_count as i64);
            self.emitter_mut().emit(Opcode::PACK);
            self.emitter_mut().emit(Opcode::DROP);
        } else {
            for _ in 0..drop_count {
                self.emitter_mut().emit(Opcode::DROP);
            }
        }

        crate::defer::unwind_defers_for_return(self)?;

        if values.is_empty() {
            // A naked `return` in a function with named results reloads
            // each one from its local slot, in declaration order (§4.5).
            let named_results = self.current_named_results.clone();
            for name in &named_results {
                self.compile_ident(name, pos)?;
            }
        } else {
            for v in values {
                self.compile_expr(v)?;
            }
        }
        self.emitter_mut().emit(Opcode::RET);
        Ok(())
    }

    fn compile_if(&mut self, cond: &ast::Expr, then_body: &Block, else_body: &Block, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        let else_label = self.new_label()?;
        self.compile_cond_jump(cond, else_label, false)?;
        self.scope.enter_block();
        for s in then_body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();
        if else_body.is_empty() {
            self.bind_label(else_label);
        } else {
            let end_label = self.new_label()?;
            self.emitter_mut().emit_jump(Opcode::JMP_L, end_label);
            self.bind_label(else_label);
            self.scope.enter_block();
            for s in else_body {
                self.compile_stmt(s)?;
            }
            self.scope.leave_block();
            self.bind_label(end_label);
        }
        Ok(())
    }

    fn compile_for(&mut self, init: &Option<Box<Stmt>>, cond: &Option<ast::Expr>, post: &Option<Box<Stmt>>, body: &Block, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        self.scope.enter_block();
        if let Some(s) = init {
            self.compile_stmt(s)?;
        }
        let start = self.new_label()?;
        let post_label = self.new_label()?;
        let end_label = self.new_label()?;
        self.push_control(ControlContext::Loop { continue_target: post_label, break_target: end_label, sentinel_count: 0 });

        self.bind_label(start);
        if let Some(c) = cond {
            self.compile_cond_jump(c, end_label, false)?;
        }
        for s in body {
            self.compile_stmt(s)?;
        }
        self.bind_label(post_label);
        if let Some(s) = post {
            self.compile_stmt(s)?;
        }
        self.emitter_mut().emit_jump(Opcode::JMP_L, start);
        self.bind_label(end_label);

        self.pop_control();
        self.scope.leave_block();
        Ok(())
    }

    /// `for k, v := range coll { ... }` (§4.5): the loop keeps 3 (array:
    /// `[arr,size,index]`) or 4 (map: `[map,keys,size,index]`) bookkeeping
    /// items live on the stack across every iteration, consulted by
    /// `ControlContext::Loop::sentinel_count` for `return`'s drop count.
    /// The per-iteration test duplicates the top two bookkeeping items
    /// (`size`, `index`) via `PICK` and compares them directly, rather
    /// than reloading from locals, since they never leave the stack.
    fn compile_for_range(&mut self, key: &Option<String>, value: &Option<String>, collection: &ast::Expr, body: &Block, pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        let is_map = matches!(collection.type_tag, TypeTag::Map);
        let sentinel_count = if is_map { 4 } else { 3 };

        self.compile_expr(collection)?;
        if is_map {
            self.emitter_mut().emit(Opcode::DUP);
            self.emitter_mut().emit(Opcode::KEYS);
            // stack: [map, keys]
            self.emitter_mut().push_int(1); // depth of `map` from top
            self.emitter_mut().emit(Opcode::PICK);
            self.emitter_mut().emit(Opcode::SIZE); // map.Count == keys.length
            // stack: [map, keys, size]
        } else {
            self.emitter_mut().emit(Opcode::DUP);
            self.emitter_mut().emit(Opcode::SIZE);
            // stack: [arr, size]
        }
        self.emitter_mut().push_int(0);
        // stack: [..., size, index]

        let start = self.new_label()?;
        let post_label = self.new_label()?;
        let end_label = self.new_label()?;
        self.push_control(ControlContext::Loop { continue_target: post_label, break_target: end_label, sentinel_count });
        self.bind_label(start);

        // Test: duplicate index (depth 0) then size (depth 2, now that the
        // index copy sits on top of it), leaving [..., index_dup, size_dup]
        // so the fused compare reads as `index >= size` (lhs pushed first,
        // rhs pushed last) — jump to `end_label` once exhausted.
        self.emitter_mut().push_int(0);
        self.emitter_mut().emit(Opcode::PICK);
        self.emitter_mut().push_int(2);
        self.emitter_mut().emit(Opcode::PICK);
        self.emitter_mut().emit_jump(Opcode::JMPGE_L, end_label);

        self.scope.enter_block();
        if is_map {
            // Base layout: [map, keys, size, index]. Materialize the key
            // first (needed for both `key` and `value` extraction).
            self.emitter_mut().push_int(2);
            self.emitter_mut().emit(Opcode::PICK); // dup keys
            self.emitter_mut().push_int(1);
            self.emitter_mut().emit(Opcode::PICK); // dup index
            self.emitter_mut().emit(Opcode::PICKITEM); // keys[index]
            let key_slot = self.declare_anonymous_local(TypeTag::Any)?;
            self.emit_store_local(key_slot);
            if let Some(name) = key {
                if name != "_" {
                    let named = self.declare_named_local(name, TypeTag::Any)?;
                    self.emit_load_local(key_slot);
                    self.emit_store_local(named);
                }
            }
            if let Some(name) = value {
                self.emitter_mut().push_int(3);
                self.emitter_mut().emit(Opcode::PICK); // dup map
                self.emit_load_local(key_slot);
                self.emitter_mut().emit(Opcode::PICKITEM); // map[key]
                if name != "_" {
                    let slot = self.declare_named_local(name, TypeTag::Any)?;
                    self.emit_store_local(slot);
                } else {
                    self.emitter_mut().emit(Opcode::DROP);
                }
            }
        } else {
            // Base layout: [arr, size, index].
            if let Some(name) = key {
                if name != "_" {
                    self.emitter_mut().push_int(0);
                    self.emitter_mut().emit(Opcode::PICK); // dup index
                    let slot = self.declare_named_local(name, TypeTag::Integer)?;
                    self.emit_store_local(slot);
                }
            }
            if let Some(name) = value {
                self.emitter_mut().push_int(2);
                self.emitter_mut().emit(Opcode::PICK); // dup arr
                self.emitter_mut().push_int(1);
                self.emitter_mut().emit(Opcode::PICK); // dup index
                self.emitter_mut().emit(Opcode::PICKITEM);
                if name != "_" {
                    let slot = self.declare_named_local(name, TypeTag::Any)?;
                    self.emit_store_local(slot);
                } else {
                    self.emitter_mut().emit(Opcode::DROP);
                }
            }
        }

        for s in body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();

        self.bind_label(post_label);
        self.emitter_mut().emit(Opcode::INC); // increments the top-of-stack index in place
        self.emitter_mut().emit_jump(Opcode::JMP_L, start);

        self.bind_label(end_label);
        for _ in 0..sentinel_count {
            self.emitter_mut().emit(Opcode::DROP);
        }
        self.pop_control();
        Ok(())
    }

    /// `switch` (§4.5): without a tag, each case's values are tested as
    /// booleans directly; with one, the tag is compared against each case
    /// value. `default` (an empty `values` list) is tested last regardless
    /// of its source position, matching Go's own switch semantics.
    fn compile_switch(&mut self, tag: &Option<ast::Expr>, cases: &[ast::SwitchCase], pos: crate::model::CodePosition) -> CompileResult<()> {
        self.record_sequence_point(CodeRange::point(pos));
        let tag_slot = match tag {
            Some(t) => {
                self.compile_expr(t)?;
                let slot = self.declare_anonymous_local(t.type_tag)?;
                self.emit_store_local(slot);
                Some((slot, t.type_tag))
            }
            None => None,
        };

        let mut case_body_labels = Vec::with_capacity(cases.len());
        for _ in cases {
            case_body_labels.push(self.new_label()?);
        }
        let end_label = self.new_label()?;
        let default_idx = cases.iter().position(|c| c.values.is_empty());

        self.push_control(ControlContext::Switch { break_target: end_label, case_body_labels: case_body_labels.clone(), current_case: 0 });

        for (idx, case) in cases.iter().enumerate() {
            for value in &case.values {
                match tag_slot {
                    Some((slot, type_tag)) => {
                        self.emit_load_local(slot);
                        self.compile_expr(value)?;
                        let is_reference_like = matches!(type_tag, TypeTag::Array | TypeTag::Map | TypeTag::Struct | TypeTag::Any);
                        self.emitter_mut().emit(if is_reference_like { Opcode::EQUAL } else { Opcode::NUMEQUAL });
                    }
                    None => self.compile_expr(value)?,
                }
                self.emitter_mut().emit_jump(Opcode::JMPIF_L, case_body_labels[idx]);
            }
        }
        match default_idx {
            Some(idx) => self.emitter_mut().emit_jump(Opcode::JMP_L, case_body_labels[idx]),
            None => self.emitter_mut().emit_jump(Opcode::JMP_L, end_label),
        }

        for (idx, case) in cases.iter().enumerate() {
            if let Some(ControlContext::Switch { current_case, .. }) = self.control_stack.last_mut() {
                *current_case = idx;
            }
            self.bind_label(case_body_labels[idx]);
            self.scope.enter_block();
            for s in &case.body {
                self.compile_stmt(s)?;
            }
            self.scope.leave_block();
            self.emitter_mut().emit_jump(Opcode::JMP_L, end_label);
        }

        self.bind_label(end_label);
        self.pop_control();
        Ok(())
    }
}
