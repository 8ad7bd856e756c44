//! Code generator driver (C5) — the visitor that walks the typed AST and
//! drives every other component.
//!
//! Split `mod.rs`/`stmt.rs`/`expr.rs`/`call.rs` the way `monty::Compiler`
//! keeps `compile_stmt`/`compile_expr` together conceptually but organizes
//! by node-kind match arms: one `Codegen` struct threaded through via
//! `&mut self`, its methods spread across files by concern rather than
//! split into several cooperating structs.

mod call;
mod expr;
mod stmt;
pub mod voidcalls;

use ahash::AHashMap;

use crate::artifact::{Artifact, ManifestFragment};
use crate::ast::{self, ExprKind, Program};
use crate::debug::{EventDebugInfo, InvokedContract, ModuleDebugInfo};
use crate::emitter::Emitter;
use crate::error::{CompileError, CompileResult};
use crate::intern::{FunctionId, Interner};
use crate::model::{CallToken, DebugSequencePoint, DeferInfo, FunctionScope, LabelId, TypeTag};
use crate::options::CodegenOptions;
use crate::registry::{self, FunctionRegistry, PendingLambdas};
use crate::resolve::{self, InitSlotSite};
use crate::scope::VarScope;
use crate::usage::{self, DiscoveredFunction};

/// One enclosing loop or `switch`, consulted by `break`/`continue`/
/// `fallthrough` (§4.5). `break` always targets the innermost frame
/// (loop or switch); `continue` skips `Switch` frames to find the
/// nearest enclosing loop, since a `switch` has no continue semantics of
/// its own.
///
/// `Loop.sentinel_count` is how many stack items the loop's own range
/// prelude leaves live across an iteration (0 for a plain C-style `for`,
/// 3 for `for range` over an array `[arr,size,index]`, 4 for `for range`
/// over a map `[map,keys,size,index]`) — consulted by `Return` to compute
/// the aggregate drop count named in §4.5.
#[derive(Debug, Clone)]
pub(crate) enum ControlContext {
    Loop {
        continue_target: LabelId,
        break_target: LabelId,
        sentinel_count: u8,
    },
    Switch {
        break_target: LabelId,
        /// One body label per `case` (including a trailing `default`, if
        /// any), in source order — `fallthrough` jumps to
        /// `case_body_labels[current_case + 1]`.
        case_body_labels: Vec<LabelId>,
        current_case: usize,
    },
}

impl ControlContext {
    pub(crate) fn break_target(&self) -> LabelId {
        match self {
            Self::Loop { break_target, .. } | Self::Switch { break_target, .. } => *break_target,
        }
    }

    pub(crate) fn sentinel_count(&self) -> u8 {
        match self {
            Self::Loop { sentinel_count, .. } => *sentinel_count,
            Self::Switch { .. } => 0,
        }
    }
}

/// A direct call eligible for inlining (§4.3, §4.5): a non-variadic,
/// receiverless free function whose entire body is `return <expr>`. Built
/// once during discovery, consulted at every call site to that name.
#[derive(Debug, Clone)]
struct InlineCandidate {
    params: Vec<String>,
    body: ast::Expr,
}

/// Whether `expr` is safe to substitute into a caller without evaluating it
/// at its original position (§4.3's "pure (no side effects)" requirement
/// for `bind_inline_alias`). Conservatively `false` for anything that can
/// have an effect or capture mutable state: a direct/lambda call, or a
/// lambda literal.
fn expr_is_pure(expr: &ast::Expr) -> bool {
    match expr.kind.as_ref() {
        ExprKind::Call { .. } | ExprKind::Lambda { .. } => false,
        ExprKind::Literal(_) | ExprKind::Nil | ExprKind::Ident(_) => true,
        ExprKind::Binary { lhs, rhs, .. } => expr_is_pure(lhs) && expr_is_pure(rhs),
        ExprKind::Unary { operand, .. } => expr_is_pure(operand),
        ExprKind::Selector { base, .. } => expr_is_pure(base),
        ExprKind::Index { base, index } => expr_is_pure(base) && expr_is_pure(index),
        ExprKind::StructLiteral { fields, .. } => fields.iter().all(|f| match f {
            ast::CompositeField::Positional(e) | ast::CompositeField::Keyed(_, e) => expr_is_pure(e),
        }),
        ExprKind::MapLiteral { entries } => entries.iter().all(|(k, v)| expr_is_pure(k) && expr_is_pure(v)),
        ExprKind::ByteSliceLiteral(elems) | ExprKind::SliceLiteral(elems) => elems.iter().all(expr_is_pure),
        ExprKind::TypeConversion { operand, .. } => expr_is_pure(operand),
    }
}

/// The top-level code generation driver (§3's `Codegen`, implicit in
/// spec.md as "the struct C5's methods hang off of"). One instance per
/// compilation.
pub struct Codegen {
    interner: Interner,
    emitter: Emitter,
    options: CodegenOptions,
    error: Option<CompileError>,

    registry: FunctionRegistry,
    pending_lambdas: PendingLambdas,
    current_function: Option<FunctionId>,
    scope: VarScope,
    defer_frames: Vec<DeferInfo>,
    deferred_call_depth: u32,
    in_global_initializer: bool,

    static_slots: AHashMap<String, u16>,
    next_static_slot: u32,
    pending_exception_slot: Option<u16>,

    call_token_index: AHashMap<CallToken, u16>,
    call_tokens: Vec<CallToken>,

    initslot_sites: Vec<InitSlotSite>,
    sequence_points: Vec<DebugSequencePoint>,
    documents: Vec<String>,
    current_document: u32,

    control_stack: Vec<ControlContext>,

    events: Vec<EventDebugInfo>,
    invoked_contracts: Vec<InvokedContract>,

    /// Source positions of `ExprStmt`s wrapping a `Call`, recomputed per
    /// function by `voidcalls::collect_void_call_positions` before its body
    /// is walked (§4.5's void-call pre-pass).
    void_call_positions: ahash::AHashSet<crate::model::CodePosition>,

    /// Named result variables of the function currently being compiled, in
    /// declaration order; a naked `return` reloads them in this order
    /// rather than taking explicit values (§4.5's "emit named returns").
    current_named_results: Vec<String>,

    /// Direct-call inlining candidates, by qualified name, built once
    /// during discovery and consulted by every call site (§4.3, §4.5).
    inlinable: AHashMap<String, InlineCandidate>,
}

impl Codegen {
    fn new(options: CodegenOptions) -> Self {
        Self {
            interner: Interner::new(),
            emitter: Emitter::new(),
            options,
            error: None,
            registry: FunctionRegistry::new(),
            pending_lambdas: PendingLambdas::default(),
            current_function: None,
            scope: VarScope::new(),
            defer_frames: Vec::new(),
            deferred_call_depth: 0,
            in_global_initializer: false,
            static_slots: AHashMap::new(),
            next_static_slot: 0,
            pending_exception_slot: None,
            call_token_index: AHashMap::new(),
            call_tokens: Vec::new(),
            initslot_sites: Vec::new(),
            sequence_points: Vec::new(),
            documents: Vec::new(),
            current_document: 0,
            control_stack: Vec::new(),
            events: Vec::new(),
            invoked_contracts: Vec::new(),
            void_call_positions: ahash::AHashSet::new(),
            current_named_results: Vec::new(),
            inlinable: AHashMap::new(),
        }
    }

    /// Records the first error only (§7 first-failure-wins); subsequent
    /// calls are no-ops so the earliest failure is the one surfaced.
    fn fail(&mut self, err: CompileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn ok(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn emitter_mut(&mut self) -> &mut Emitter {
        &mut self.emitter
    }

    pub(crate) fn new_label(&mut self) -> CompileResult<LabelId> {
        self.emitter.new_label()
    }

    pub(crate) fn bind_label(&mut self, label: LabelId) {
        self.emitter.bind_label(label);
    }

    pub(crate) fn in_global_initializer(&self) -> bool {
        self.in_global_initializer
    }

    pub(crate) fn inside_deferred_call(&self) -> bool {
        self.deferred_call_depth > 0
    }

    pub(crate) fn push_defer_frame(&mut self, frame: DeferInfo) {
        self.defer_frames.push(frame);
    }

    pub(crate) fn defer_frames_snapshot(&self) -> Vec<DeferInfo> {
        self.defer_frames.clone()
    }

    /// Allocates a fresh, unnamed local slot (used for defer flag slots,
    /// range-loop index/length temporaries).
    pub(crate) fn declare_anonymous_local(&mut self, type_tag: TypeTag) -> CompileResult<u8> {
        self.scope.declare_local(&mut self.interner, "_", type_tag)
    }

    pub(crate) fn emit_load_local(&mut self, slot: u8) {
        use crate::opcode::Opcode;
        match slot {
            0 => self.emitter.emit(Opcode::LDLOC0),
            _ => self.emitter.emit_byte_operand(Opcode::LDLOC, slot),
        }
    }

    pub(crate) fn emit_store_local(&mut self, slot: u8) {
        use crate::opcode::Opcode;
        match slot {
            0 => self.emitter.emit(Opcode::STLOC0),
            _ => self.emitter.emit_byte_operand(Opcode::STLOC, slot),
        }
    }

    pub(crate) fn emit_store_bool_local(&mut self, slot: u8, value: bool) -> CompileResult<()> {
        self.emitter.push_bool(value);
        self.emit_store_local(slot);
        Ok(())
    }

    pub(crate) fn emit_load_arg(&mut self, slot: u8) {
        use crate::opcode::Opcode;
        match slot {
            0 => self.emitter.emit(Opcode::LDARG0),
            _ => self.emitter.emit_byte_operand(Opcode::LDARG, slot),
        }
    }

    pub(crate) fn emit_store_arg(&mut self, slot: u8) {
        use crate::opcode::Opcode;
        match slot {
            0 => self.emitter.emit(Opcode::STARG0),
            _ => self.emitter.emit_byte_operand(Opcode::STARG, slot),
        }
    }

    pub(crate) fn emit_load_static(&mut self, slot: u16) {
        use crate::opcode::Opcode;
        match u8::try_from(slot) {
            Ok(0) => self.emitter.emit(Opcode::LDSFLD0),
            Ok(b) => self.emitter.emit_byte_operand(Opcode::LDSFLD, b),
            Err(_) => unreachable!("static slot count is capped at 255, see declare_global"),
        }
    }

    pub(crate) fn emit_store_static(&mut self, slot: u16) {
        use crate::opcode::Opcode;
        match u8::try_from(slot) {
            Ok(0) => self.emitter.emit(Opcode::STSFLD0),
            Ok(b) => self.emitter.emit_byte_operand(Opcode::STSFLD, b),
            Err(_) => unreachable!("static slot count is capped at 255, see declare_global"),
        }
    }

    pub(crate) fn emit_push_null(&mut self) {
        self.emitter.push_null();
    }

    /// Allocates (or returns the already-allocated) module-static slot
    /// backing `recover()`'s pending-exception value (§4.7 step 2–3). One
    /// per module: defers never nest across concurrently-executing calls
    /// in this single-threaded VM, so one slot suffices.
    pub(crate) fn pending_exception_slot(&mut self) -> CompileResult<u16> {
        if let Some(slot) = self.pending_exception_slot {
            return Ok(slot);
        }
        let slot = self.alloc_static_slot("$pending_exception")?;
        self.pending_exception_slot = Some(slot);
        Ok(slot)
    }

    fn alloc_static_slot(&mut self, key: &str) -> CompileResult<u16> {
        if let Some(&slot) = self.static_slots.get(key) {
            return Ok(slot);
        }
        if self.next_static_slot > u32::from(u8::MAX) {
            return Err(CompileError::capacity("more than 255 static (global) slots in one module"));
        }
        let slot = self.next_static_slot as u16;
        self.next_static_slot += 1;
        self.static_slots.insert(key.to_owned(), slot);
        Ok(slot)
    }

    /// Looks up (or lazily allocates) the static slot for a reachable
    /// global, by its qualified `<package>.<name>` key.
    fn global_slot(&mut self, qualified_name: &str) -> CompileResult<u16> {
        self.alloc_static_slot(qualified_name)
    }

    /// Evaluates a deferred call's arguments and invokes it (§4.7 step 2).
    /// Runs with `deferred_call_depth` incremented so `recover()` inside it
    /// is accepted.
    pub(crate) fn compile_deferred_call(&mut self, call: &ast::Expr) -> CompileResult<()> {
        self.deferred_call_depth += 1;
        let result = self.compile_expr_as_void(call);
        self.deferred_call_depth -= 1;
        result
    }

    /// Pushes one `PUSHNULL`/zero-valued default per declared return type,
    /// for the implicit return synthesized after an outermost defer
    /// absorbs an unrecovered panic (§4.7 step 2).
    pub(crate) fn push_default_return_values(&mut self) -> CompileResult<()> {
        let Some(id) = self.current_function else {
            return Err(CompileError::structural("push_default_return_values outside a function body", None));
        };
        let count = self.registry.get(id).return_types.len();
        for _ in 0..count {
            self.emitter.push_null();
        }
        Ok(())
    }

    /// Compiles an expression purely for its side effects, discarding any
    /// pushed value (§4.5's void-call handling, reused for deferred calls).
    fn compile_expr_as_void(&mut self, expr: &ast::Expr) -> CompileResult<()> {
        if let ExprKind::Call { .. } = expr.kind.as_ref() {
            return self.compile_call_expr(expr, true);
        }
        self.compile_expr(expr)?;
        self.emitter.emit(crate::opcode::Opcode::DROP);
        Ok(())
    }

    /// Records one breakpoint-addressable source position (§4.10), at the
    /// current write offset.
    fn record_sequence_point(&mut self, range: crate::model::CodeRange) {
        if !self.options.emit_debug_info {
            return;
        }
        self.sequence_points.push(DebugSequencePoint {
            opcode_offset: self.emitter.len(),
            document: self.current_document,
            start_line: range.start.line,
            start_column: range.start.column,
            end_line: range.end.line,
            end_column: range.end.column,
        });
    }

    /// Returns the document index for a source file name, registering it
    /// on first use (§4.10: `documents: Vec<String>` consumed by index from
    /// `DebugSequencePoint.document`).
    pub(crate) fn document_index(&mut self, file: &str) -> u32 {
        if let Some(idx) = self.documents.iter().position(|d| d == file) {
            return idx as u32;
        }
        self.documents.push(file.to_owned());
        (self.documents.len() - 1) as u32
    }

    pub(crate) fn push_control(&mut self, ctx: ControlContext) {
        self.control_stack.push(ctx);
    }

    pub(crate) fn pop_control(&mut self) {
        self.control_stack.pop();
    }

    /// Sum of `sentinel_count` across every `Loop` frame currently open,
    /// consulted by `return` to compute how many range-loop bookkeeping
    /// items need dropping before the return values are pushed (§4.5).
    pub(crate) fn pending_sentinel_drop_count(&self) -> u32 {
        self.control_stack.iter().map(|c| u32::from(c.sentinel_count())).sum()
    }

    /// `break`'s target: the innermost enclosing loop or switch (§4.5).
    pub(crate) fn break_target(&self) -> CompileResult<LabelId> {
        self.control_stack
            .last()
            .map(ControlContext::break_target)
            .ok_or_else(|| CompileError::structural("break outside a loop or switch", None))
    }

    /// `continue`'s target: skips `Switch` frames to find the nearest
    /// enclosing loop (§4.5 — a `switch` has no continue semantics).
    pub(crate) fn continue_target(&self) -> CompileResult<LabelId> {
        self.control_stack
            .iter()
            .rev()
            .find_map(|c| match c {
                ControlContext::Loop { continue_target, .. } => Some(*continue_target),
                ControlContext::Switch { .. } => None,
            })
            .ok_or_else(|| CompileError::structural("continue outside a loop", None))
    }

    /// `fallthrough`'s target: the next case body in the innermost
    /// enclosing `switch` (§4.5); a Structural error outside a switch or
    /// in its last case.
    pub(crate) fn fallthrough_target(&self) -> CompileResult<LabelId> {
        match self.control_stack.last() {
            Some(ControlContext::Switch { case_body_labels, current_case, .. }) => case_body_labels
                .get(current_case + 1)
                .copied()
                .ok_or_else(|| CompileError::structural("fallthrough in the last case of a switch", None)),
            _ => Err(CompileError::structural("fallthrough outside a switch", None)),
        }
    }

    /// Advances the innermost `switch` frame to its next case, consulted
    /// between compiling one case body and the next.
    pub(crate) fn advance_switch_case(&mut self) {
        if let Some(ControlContext::Switch { current_case, .. }) = self.control_stack.last_mut() {
            *current_case += 1;
        }
    }

    /// Resolves a dedicated call token for a cross-contract/method call,
    /// deduplicating identical tokens (§4.1, §6).
    pub(crate) fn intern_call_token(&mut self, token: CallToken) -> CompileResult<u16> {
        if let Some(&idx) = self.call_token_index.get(&token) {
            return Ok(idx);
        }
        if self.call_tokens.len() >= usize::from(u16::MAX) {
            return Err(CompileError::capacity("more than 65,535 distinct call tokens in one module"));
        }
        let idx = self.call_tokens.len() as u16;
        self.call_tokens.push(token.clone());
        self.call_token_index.insert(token, idx);
        Ok(idx)
    }

    /// Records one cross-contract invocation site for the manifest's
    /// invoked-contracts list (§6), deduplicating by hash and accumulating
    /// the distinct method names called on it.
    pub(crate) fn record_invoked_contract(&mut self, target_hash: [u8; 20], method: &str) {
        let hash = hex_encode(&target_hash);
        if let Some(entry) = self.invoked_contracts.iter_mut().find(|c| c.hash == hash) {
            if !entry.methods.iter().any(|m| m == method) {
                entry.methods.push(method.to_owned());
            }
        } else {
            self.invoked_contracts.push(InvokedContract { hash, methods: vec![method.to_owned()] });
        }
    }

    /// `recover()` (§4.6, §4.7 step 3) — a thin forward to C7's lowering,
    /// exposed as a method so C5/C6 call sites don't need to know this is
    /// implemented in a sibling module.
    pub(crate) fn compile_recover(&mut self, is_void: bool) -> CompileResult<()> {
        crate::defer::compile_recover(self, is_void)
    }

    /// Looks up an inlining candidate by qualified name, only when every
    /// call-site argument is itself pure (§4.3) — an impure argument still
    /// needs to be evaluated for its side effect even if its value is
    /// otherwise substitutable, which this crate does not attempt.
    pub(crate) fn inline_candidate(&self, qualified_name: &str, args: &[ast::Expr], spread: bool) -> Option<InlineCandidate> {
        if spread {
            return None;
        }
        let candidate = self.inlinable.get(qualified_name)?;
        if candidate.params.len() != args.len() || !args.iter().all(expr_is_pure) {
            return None;
        }
        Some(candidate.clone())
    }

    /// Substitutes each parameter with its (pure) call-site argument as an
    /// inline alias and compiles the callee's single return expression
    /// directly in place of a `CALLL` (§4.3, §4.5 — S4's "no `CALLL` to the
    /// inlined function is present").
    pub(crate) fn compile_inlined_call(&mut self, candidate: &InlineCandidate, args: &[ast::Expr], is_void: bool) -> CompileResult<()> {
        self.scope.enter_block();
        for (param, arg) in candidate.params.iter().zip(args) {
            self.scope.bind_inline_alias(
                &mut self.interner,
                param,
                crate::model::InlineAlias { source_expr: arg.clone(), captured_scope_depth: 0, captured_import_alias: None },
            );
        }
        let result = self.compile_expr(&candidate.body);
        self.scope.leave_block();
        result?;
        if is_void {
            self.emitter.emit(crate::opcode::Opcode::DROP);
        }
        Ok(())
    }
}

/// Lowercase-hex encoding of a 20-byte contract hash, for the manifest's
/// human-readable invoked-contracts list (§6).
fn hex_encode(bytes: &[u8; 20]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(40);
    for b in bytes {
        write!(s, "{b:02x}").unwrap();
    }
    s
}

/// Compiles a whole program end to end: discovery, usage analysis,
/// per-function codegen, resolve, and debug-info assembly (spec.md §2's
/// data-flow, restated in `SPEC_FULL.md` §1).
pub fn compile_program(program: &Program, options: CodegenOptions) -> CompileResult<Artifact> {
    let mut cg = Codegen::new(options);
    cg.events = program
        .events
        .iter()
        .map(|e| EventDebugInfo { name: e.name.clone(), parameters: e.parameters.iter().map(|(n, t)| (n.clone(), *t)).collect() })
        .collect();

    let mut packages: Vec<&ast::Package> = program.packages.iter().collect();
    if options.deterministic_package_order {
        packages.sort_by(|a, b| a.path.cmp(&b.path));
    }
    let packages = topo_sort_packages(packages);

    // --- Discovery: assign every declared function/method a qualified
    // name, a reserved FunctionId, and an entry label, without compiling
    // bodies yet (usage analysis, below, needs the full name set first).
    struct Discovered<'a> {
        qualified_name: String,
        package_path: String,
        declaring_file: String,
        decl: &'a ast::FuncDecl,
    }
    let mut discovered: Vec<Discovered> = Vec::new();
    for package in &packages {
        for file in &package.files {
            for func in &file.functions {
                let receiver_type = func.receiver.as_ref().map(|r| r.type_name.as_str());
                let name = if func.is_deploy {
                    registry::qualified_name(&package.path, None, registry::DEPLOY_NAME)
                } else if func.is_init {
                    registry::qualified_name(&package.path, None, "init")
                } else {
                    registry::qualified_name(&package.path, receiver_type, &func.name)
                };
                discovered.push(Discovered {
                    qualified_name: name,
                    package_path: package.path.clone(),
                    declaring_file: file.name.clone(),
                    decl: func,
                });
            }
        }
    }

    // --- Inlining candidates: receiverless, non-variadic functions whose
    // entire body is a single `return <expr>` (§4.3, §4.5). Built from
    // every discovered function, not just reachable ones — a call site is
    // still walked during usage analysis below regardless of whether it
    // ends up inlined. ---
    for d in &discovered {
        if d.decl.receiver.is_some() || d.decl.variadic {
            continue;
        }
        if let [ast::Stmt::Return { values, .. }] = d.decl.body.as_slice() {
            if let [expr] = values.as_slice() {
                if expr_is_pure(expr) {
                    cg.inlinable.insert(
                        d.qualified_name.clone(),
                        InlineCandidate { params: d.decl.params.iter().map(|p| p.name.clone()).collect(), body: expr.clone() },
                    );
                }
            }
        }
    }

    let usage_input: Vec<DiscoveredFunction<'_>> = discovered
        .iter()
        .map(|d| DiscoveredFunction { qualified_name: d.qualified_name.clone(), decl: d.decl })
        .collect();
    let usage_result = usage::analyze(&usage_input);
    log::trace!("usage analysis: {} of {} functions reachable", usage_result.reachable_functions.len(), discovered.len());

    // --- Register reachable functions (discovery order == compile order;
    // lambdas are appended to the registry as they're discovered inside a
    // body, per `registry`'s own doc comment). ---
    let mut to_compile: Vec<(FunctionId, &ast::FuncDecl)> = Vec::new();
    for d in &discovered {
        if !usage_result.reachable_functions.contains(&d.qualified_name) {
            log::trace!("pruning unreachable function {}", d.qualified_name);
            continue;
        }
        let id = cg.registry.next_id();
        let entry_label = cg.new_label()?;
        cg.registry.register(FunctionScope {
            id,
            qualified_name: d.qualified_name.clone(),
            package_path: d.package_path.clone(),
            declaring_file: d.declaring_file.clone(),
            entry_label,
            opcode_range: (0, 0),
            arg_count: 0,
            local_count: 0,
            parameters: Vec::new(),
            local_names: Vec::new(),
            return_types: d.decl.results.clone(),
            defer_stack: Vec::new(),
            is_lambda: false,
            is_variadic: d.decl.variadic,
            declared_param_count: d.decl.params.len() as u8 + u8::from(d.decl.receiver.is_some()),
        });
        to_compile.push((id, d.decl));
    }

    // --- Global (package-level `var`) declarations reachable from any
    // compiled function, emitted leaves-first by the topo-sorted package
    // order above (§5). ---
    let mut global_inits: Vec<(String, &ast::VarDecl)> = Vec::new();
    for package in &packages {
        for file in &package.files {
            for var in &file.vars {
                let key = format!("{}.{}", package.path, var.name);
                if usage_result.reachable_globals.contains(&var.name) || usage_result.reachable_globals.contains(&key) {
                    // Keyed on the bare name, matching `global_slot`'s use-site
                    // lookups in `stmt.rs` (identifiers are already resolved by
                    // the front end, with no cross-package qualification to
                    // disambiguate here) — using `key` instead would allocate a
                    // second, disconnected static slot for the same global.
                    global_inits.push((var.name.clone(), var));
                }
            }
        }
    }

    // --- Compile `_initialize`: concatenated global initializers then
    // every package's `init` functions in order (§4.4). ---
    if !global_inits.is_empty() || to_compile.iter().any(|(id, _)| cg.registry.get(*id).qualified_name.ends_with(".init")) {
        compile_initialize(&mut cg, &global_inits, &to_compile)?;
    }

    for (id, decl) in &to_compile {
        if cg.registry.get(*id).qualified_name.ends_with(".init") {
            continue; // folded into `_initialize` above.
        }
        cg.compile_function(*id, decl)?;
        loop {
            let pending = cg.pending_lambdas.drain();
            if pending.is_empty() {
                break;
            }
            for lambda in pending {
                let lambda_id = cg.registry.next_id();
                let entry_label = lambda.entry_label;
                cg.registry.register(FunctionScope {
                    id: lambda_id,
                    qualified_name: lambda.name,
                    package_path: lambda.package_path,
                    declaring_file: lambda.declaring_file,
                    entry_label,
                    opcode_range: (0, 0),
                    arg_count: 0,
                    local_count: 0,
                    parameters: Vec::new(),
                    local_names: Vec::new(),
                    return_types: lambda.decl.results.clone(),
                    defer_stack: Vec::new(),
                    is_lambda: true,
                    is_variadic: lambda.decl.variadic,
                    declared_param_count: lambda.decl.params.len() as u8,
                });
                // A lambda directly deferred (`defer func(){...}()`) is
                // compiled here, well after `compile_deferred_call`'s own
                // increment/decrement of `deferred_call_depth` already
                // unwound — re-arm it for this lambda's own body so
                // `recover()` inside it is accepted (§4.7 step 3).
                if lambda.is_deferred_body {
                    cg.deferred_call_depth += 1;
                }
                let result = cg.compile_function(lambda_id, &lambda.decl);
                if lambda.is_deferred_body {
                    cg.deferred_call_depth -= 1;
                }
                result?;
            }
        }
    }

    if let Some(err) = cg.error {
        return Err(err);
    }

    let mut method_ranges: Vec<(u32, u32)> = cg.registry.iter().map(|f| f.opcode_range).collect();
    let mut sequence_points = std::mem::take(&mut cg.sequence_points);
    let initslot_sites = std::mem::take(&mut cg.initslot_sites);
    let resolved = resolve::resolve(cg.emitter, &initslot_sites, &mut method_ranges, &mut sequence_points, options.peephole_compression)?;

    let method_infos: Vec<crate::model::MethodDebugInfo> = cg
        .registry
        .iter()
        .enumerate()
        .map(|(idx, f)| {
            let range = method_ranges[idx];
            crate::model::MethodDebugInfo {
                id: idx as u32,
                namespace: f.package_path.clone(),
                name: f.qualified_name.clone(),
                range,
                parameters: f.parameters.iter().map(|(id, t)| (cg.interner.get_str(*id).to_owned(), *t)).collect(),
                variables: f.local_names.iter().map(|(id, t)| (cg.interner.get_str(*id).to_owned(), *t)).collect(),
                return_type: f.debug_return_type(),
                sequence_points: sequence_points.iter().filter(|sp| sp.opcode_offset >= range.0 && sp.opcode_offset < range.1).copied().collect(),
            }
        })
        .collect();

    let entry_point = cg
        .registry
        .iter()
        .find(|f| f.qualified_name.ends_with(&format!(".{}", registry::ENTRY_NAME)))
        .map(|f| f.qualified_name.clone())
        .unwrap_or_default();

    let debug_info = options.emit_debug_info.then(|| {
        ModuleDebugInfo::build(entry_point, cg.documents.clone(), &method_infos, cg.events.clone(), cg.invoked_contracts.clone())
    });

    Ok(Artifact {
        bytecode: resolved.bytecode,
        call_tokens: cg.call_tokens,
        debug_info,
        manifest: ManifestFragment { events: cg.events, invoked_contracts: cg.invoked_contracts },
    })
}

/// Builds the deterministic package-dependency order named in §5
/// ("global initializers emitted leaves-first"): packages with no
/// in-pack imports first, falling back to lexicographic order for ties or
/// cycles (imports of a package not present in `program` are ignored —
/// this crate does not load external packages).
fn topo_sort_packages<'a>(packages: Vec<&'a ast::Package>) -> Vec<&'a ast::Package> {
    let paths: std::collections::HashSet<&str> = packages.iter().map(|p| p.path.as_str()).collect();
    let mut deps: AHashMap<&str, Vec<&str>> = AHashMap::new();
    for p in &packages {
        let mut d = Vec::new();
        for file in &p.files {
            for import in &file.imports {
                if paths.contains(import.package_path.as_str()) {
                    d.push(import.package_path.as_str());
                }
            }
        }
        deps.insert(p.path.as_str(), d);
    }

    let mut ordered = Vec::with_capacity(packages.len());
    let mut visited: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut in_progress: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let by_path: AHashMap<&str, &ast::Package> = packages.iter().map(|p| (p.path.as_str(), *p)).collect();

    fn visit<'a>(
        path: &'a str,
        by_path: &AHashMap<&'a str, &'a ast::Package>,
        deps: &AHashMap<&'a str, Vec<&'a str>>,
        visited: &mut std::collections::HashSet<&'a str>,
        in_progress: &mut std::collections::HashSet<&'a str>,
        ordered: &mut Vec<&'a ast::Package>,
    ) {
        if visited.contains(path) || in_progress.contains(path) {
            return; // cycle: leave the cycle member to be emitted by its caller.
        }
        in_progress.insert(path);
        if let Some(d) = deps.get(path) {
            for &dep in d {
                visit(dep, by_path, deps, visited, in_progress, ordered);
            }
        }
        in_progress.remove(path);
        visited.insert(path);
        if let Some(&p) = by_path.get(path) {
            ordered.push(p);
        }
    }

    for p in &packages {
        visit(p.path.as_str(), &by_path, &deps, &mut visited, &mut in_progress, &mut ordered);
    }
    ordered
}

/// Synthesizes and compiles the module's `_initialize` method: reachable
/// global-variable initializers in leaves-first package order, then every
/// package's `init` function bodies concatenated in the same order (§4.4,
/// §5).
fn compile_initialize(cg: &mut Codegen, global_inits: &[(String, &ast::VarDecl)], to_compile: &[(FunctionId, &ast::FuncDecl)]) -> CompileResult<()> {
    let id = cg.registry.next_id();
    let entry_label = cg.new_label()?;
    let package_path = to_compile.first().map(|(id, _)| cg.registry.get(*id).package_path.clone()).unwrap_or_default();
    cg.registry.register(FunctionScope {
        id,
        qualified_name: registry::qualified_name(&package_path, None, registry::INITIALIZE_NAME),
        package_path,
        declaring_file: String::new(),
        entry_label,
        opcode_range: (0, 0),
        arg_count: 0,
        local_count: 0,
        parameters: Vec::new(),
        local_names: Vec::new(),
        return_types: Vec::new(),
        defer_stack: Vec::new(),
        is_lambda: false,
        is_variadic: false,
        declared_param_count: 0,
    });

    cg.current_function = Some(id);
    cg.current_document = cg.document_index(registry::INITIALIZE_NAME);
    cg.scope = VarScope::new();
    cg.in_global_initializer = true;
    cg.bind_label(entry_label);
    let start = cg.emitter.len();
    let initslot_offset = cg.emitter.len();
    cg.emitter.emit_word_operand(crate::opcode::Opcode::INITSLOT, 0);

    for (key, var) in global_inits {
        let Some(init) = &var.init else { continue };
        cg.compile_expr(init)?;
        let slot = cg.global_slot(key)?;
        cg.emit_store_static(slot);
    }
    for (fid, decl) in to_compile {
        if cg.registry.get(*fid).qualified_name.ends_with(".init") {
            for stmt in &decl.body {
                cg.compile_stmt(stmt)?;
            }
        }
    }
    cg.emitter.emit(crate::opcode::Opcode::RET);

    cg.initslot_sites.push(InitSlotSite { instr_offset: initslot_offset, locals: cg.scope.local_count(), args: 0 });
    let scope = cg.registry.get_mut(id);
    scope.opcode_range = (start, cg.emitter.len());
    scope.local_count = cg.scope.local_count();
    cg.in_global_initializer = false;
    cg.current_function = None;
    Ok(())
}
