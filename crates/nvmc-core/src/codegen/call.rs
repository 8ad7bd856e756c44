//! Call-site lowering, the third leg of C5 (§4.5).
//!
//! Split out from `expr.rs` because a call site has to choose among five
//! dispatch shapes (direct function, cross-package/qualified builtin,
//! bare builtin, lambda-pointer, and — via `compile_expr_as_void` in
//! `mod.rs` — the void-statement variant of all of the above), each with
//! its own argument-evaluation and reversal bookkeeping.

use crate::ast::{Callee, Expr, ExprKind};
use crate::builtins::{Builtin, BuiltinLowering};
use crate::error::{CompileError, CompileResult};
use crate::model::TypeTag;
use crate::opcode::Opcode;

use super::Codegen;

impl Codegen {
    /// Compiles a `Call` expression. `is_void` means the call is used
    /// purely for effect (an `ExprStmt`, or a deferred call): its result,
    /// if any, is dropped rather than left on the stack.
    pub(crate) fn compile_call_expr(&mut self, expr: &Expr, is_void: bool) -> CompileResult<()> {
        let ExprKind::Call { callee, args, spread } = expr.kind.as_ref() else {
            return Err(CompileError::structural("compile_call_expr called on a non-Call expression", Some(expr.pos)));
        };

        match callee {
            Callee::Builtin(name) => self.compile_builtin_call(name, args, is_void, *spread, expr.pos),
            Callee::Qualified { package_alias, name } => {
                let key = format!("{package_alias}.{name}");
                self.compile_builtin_call(&key, args, is_void, *spread, expr.pos)
            }
            Callee::Function(qualified_name) => self.compile_direct_call(qualified_name, args, is_void, *spread, expr.pos),
            Callee::Value(pointer_expr) => self.compile_lambda_call(pointer_expr, args, is_void),
            Callee::Contract { target_hash, method, has_return, call_flags } => {
                self.compile_contract_call(*target_hash, method, *has_return, *call_flags, args, is_void, *spread)
            }
        }
    }

    /// A cross-contract call (§3's `CallToken`, §4.5, §6): arguments are
    /// evaluated and reversed exactly like a direct call, then a
    /// deduplicated `CallToken` is interned and referenced by 16-bit index
    /// from `CALLT` — a single byte-cheap opcode rather than pushing the
    /// target hash/method name at every call site.
    fn compile_contract_call(
        &mut self,
        target_hash: [u8; 20],
        method: &str,
        has_return: bool,
        call_flags: u8,
        args: &[Expr],
        is_void: bool,
        spread: bool,
    ) -> CompileResult<()> {
        let pushed = self.compile_call_args(args, None, spread)?;
        self.reverse_args(pushed);
        let token = crate::model::CallToken {
            target_hash,
            method_name: method.to_owned(),
            param_count: pushed as u16,
            has_return,
            call_flags,
        };
        let index = self.intern_call_token(token)?;
        self.record_invoked_contract(target_hash, method);
        self.emitter_mut().emit_call_token(index);
        if is_void && has_return {
            self.emitter_mut().emit(Opcode::DROP);
        }
        Ok(())
    }

    fn compile_builtin_call(&mut self, key: &str, args: &[Expr], is_void: bool, spread: bool, pos: crate::model::CodePosition) -> CompileResult<()> {
        use std::str::FromStr;
        let builtin = Builtin::from_str(key).map_err(|_| CompileError::resolution(format!("unknown syscall or builtin: {key}"), Some(pos)))?;
        match builtin.lowering() {
            BuiltinLowering::Syscall(interop_id) => {
                self.compile_call_args(args, None, spread)?;
                self.emitter_mut().emit_syscall(interop_id);
                if is_void {
                    self.emitter_mut().emit(Opcode::DROP);
                }
                Ok(())
            }
            BuiltinLowering::Inline(f) => f(self, args, is_void, spread),
            BuiltinLowering::ConstSubstitution(f) => {
                let consts: Vec<_> = args
                    .iter()
                    .map(|a| a.const_value.clone().ok_or_else(|| CompileError::resolution(format!("{key} requires constant arguments"), Some(pos))))
                    .collect::<CompileResult<_>>()?;
                let value = f(&consts)?;
                if !is_void {
                    self.emitter_mut().push_const(&value);
                }
                Ok(())
            }
        }
    }

    /// A direct call to a resolved function or method (§4.4, §4.5): argument
    /// evaluation (with variadic-tail packing when the callee declares one
    /// and the call site doesn't spread), struct-by-value cloning, stack
    /// reversal, then `CALL_L` to the callee's entry label.
    fn compile_direct_call(&mut self, qualified_name: &str, args: &[Expr], is_void: bool, spread: bool, pos: crate::model::CodePosition) -> CompileResult<()> {
        if let Some(candidate) = self.inline_candidate(qualified_name, args, spread) {
            return self.compile_inlined_call(&candidate, args, is_void);
        }
        let Some(id) = self.registry.resolve(qualified_name) else {
            return Err(CompileError::resolution(format!("unknown function: {qualified_name}"), Some(pos)));
        };
        let target = self.registry.get(id);
        let entry_label = target.entry_label;
        let is_variadic = target.is_variadic;
        let declared_param_count = target.declared_param_count as usize;
        let return_count = target.return_types.len();

        let pushed = self.compile_call_args(args, is_variadic.then_some(declared_param_count), spread)?;
        self.reverse_args(pushed);
        self.emitter_mut().emit_jump(Opcode::CALL_L, entry_label);

        if is_void {
            for _ in 0..return_count {
                self.emitter_mut().emit(Opcode::DROP);
            }
        }
        Ok(())
    }

    /// A lambda invocation (§4.4, §4.5): evaluate the pointer expression,
    /// evaluate and reverse arguments, `CALLA`.
    fn compile_lambda_call(&mut self, pointer_expr: &Expr, args: &[Expr], is_void: bool) -> CompileResult<()> {
        self.compile_expr(pointer_expr)?;
        let pushed = self.compile_call_args(args, None, false)?;
        self.reverse_args(pushed);
        self.emitter_mut().emit(Opcode::CALLA);
        // Lambda return arity isn't tracked on the function pointer's own
        // value; a void lambda call simply leaves nothing extra to drop
        // when it declares no results, matching the common case.
        let _ = is_void;
        Ok(())
    }

    /// Evaluates `args` left to right, cloning struct-typed arguments by
    /// value and packing a variadic tail into an array when `variadic_at`
    /// names the fixed parameter count and the call site doesn't spread.
    /// Returns the number of values actually pushed (for `reverse_args`).
    fn compile_call_args(&mut self, args: &[Expr], variadic_at: Option<usize>, spread: bool) -> CompileResult<usize> {
        let pack_from = match variadic_at {
            // `fixed` is the declared arity *including* the variadic
            // parameter itself, so a call supplying only the non-variadic
            // arguments has `args.len() == fixed - 1` and must still pack
            // an empty tail array rather than fall through to no packing.
            Some(fixed) if !spread && args.len() + 1 >= fixed => Some(fixed.saturating_sub(1)),
            _ => None,
        };

        let head_len = pack_from.unwrap_or(args.len());
        for arg in &args[..head_len] {
            self.compile_expr(arg)?;
            if matches!(arg.type_tag, TypeTag::Struct) {
                self.clone_struct_arg();
            }
        }

        if let Some(from) = pack_from {
            let tail = &args[from..];
            for arg in tail.iter().rev() {
                self.compile_expr(arg)?;
            }
            self.emitter_mut().push_int(tail.len() as i64);
            self.emitter_mut().emit(Opcode::PACK);
            Ok(head_len + 1)
        } else {
            Ok(args.len())
        }
    }
}
