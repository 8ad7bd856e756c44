//! Expression lowering, the other half of C5 (§4.5).
//!
//! One entry point, `Codegen::compile_expr`, dispatched by `ExprKind`.
//! Every arm leaves exactly one value on the evaluation stack; composite
//! literals and `Call` are the only arms that may emit more than a
//! handful of instructions.

use crate::ast::{BinOp, CompositeField, Expr, ExprKind, UnOp};
use crate::error::{CompileError, CompileResult};
use crate::model::{LabelId, TypeTag};
use crate::opcode::{Opcode, StackItemType};

use super::Codegen;

impl Codegen {
    /// Compiles `expr`, leaving its value on top of the stack.
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        // A front-end-resolved compile-time constant short-circuits the
        // whole subtree, regardless of its `ExprKind` (§3: "identifiers
        // and any other node may carry a constant value").
        if let Some(value) = &expr.const_value {
            self.emitter.push_const(value);
            return Ok(());
        }

        match expr.kind.as_ref() {
            ExprKind::Literal(value) => {
                self.emitter.push_const(value);
                Ok(())
            }
            ExprKind::Nil => {
                self.emitter.push_null();
                Ok(())
            }
            ExprKind::Ident(name) => self.compile_ident(name, expr.pos),
            ExprKind::StructLiteral { type_name: _, fields, by_ref } => self.compile_struct_literal(fields, *by_ref),
            ExprKind::MapLiteral { entries } => self.compile_map_literal(entries),
            ExprKind::ByteSliceLiteral(elems) => self.compile_byte_slice_literal(elems),
            ExprKind::SliceLiteral(elems) => self.compile_slice_literal(elems),
            ExprKind::Binary { op, lhs, rhs } => self.compile_binary(op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.compile_unary(op, operand),
            ExprKind::Selector { base, field: _, field_index } => {
                self.compile_expr(base)?;
                self.emitter.push_int(i64::from(*field_index));
                self.emitter.emit(Opcode::PICKITEM);
                Ok(())
            }
            ExprKind::Index { base, index } => {
                self.compile_expr(base)?;
                self.compile_expr(index)?;
                self.emitter.emit(Opcode::PICKITEM);
                Ok(())
            }
            ExprKind::Call { .. } => self.compile_call_expr(expr, false),
            ExprKind::Lambda { params, results, body, label_id } => self.compile_lambda(params, results, body, *label_id),
            ExprKind::TypeConversion { target, operand } => self.compile_type_conversion(*target, operand),
        }
    }

    /// An identifier reference (§4.5, §4.3's inline-alias bullet).
    ///
    /// Resolution order: an inlined parameter re-walks its captured
    /// expression; otherwise a local/argument loads its slot; otherwise the
    /// name is a front-end-resolved package-qualified global.
    pub(crate) fn compile_ident(&mut self, name: &str, pos: crate::model::CodePosition) -> CompileResult<()> {
        let id = self.interner.intern(name);
        if let Some(info) = self.scope.lookup(id) {
            if let Some(alias) = info.inline_alias.clone() {
                return self.compile_expr(&alias.source_expr);
            }
            match info.kind {
                crate::model::VarKind::Argument => self.emit_load_arg(info.slot),
                crate::model::VarKind::Local => self.emit_load_local(info.slot),
                crate::model::VarKind::Static => unreachable!("globals are not held in VarScope"),
            }
            return Ok(());
        }
        if name == "_" {
            return Err(CompileError::structural("`_` cannot be read", Some(pos)));
        }
        let slot = self.global_slot(name)?;
        self.emit_load_static(slot);
        Ok(())
    }

    /// `Type{a, b}` / `&Type{a, b}` (§4.5): push fields in declared order,
    /// push the field count, then `PACKSTRUCT` (by value) or `PACK` (by
    /// reference, for `&Type{...}`).
    fn compile_struct_literal(&mut self, fields: &[CompositeField], by_ref: bool) -> CompileResult<()> {
        for field in fields {
            match field {
                CompositeField::Positional(e) => self.compile_expr(e)?,
                // The front end is assumed to have already reordered keyed
                // fields to declaration order; this crate trusts that order.
                CompositeField::Keyed(_, e) => self.compile_expr(e)?,
            }
        }
        self.emitter.push_int(fields.len() as i64);
        self.emitter.emit(if by_ref { Opcode::PACK } else { Opcode::PACKSTRUCT });
        Ok(())
    }

    /// `map[K]V{k1: v1, ...}` (§4.5): push `(value, key)` pairs, push the
    /// entry count, then `PACKMAP`.
    fn compile_map_literal(&mut self, entries: &[(Expr, Expr)]) -> CompileResult<()> {
        for (key, value) in entries {
            self.compile_expr(value)?;
            self.compile_expr(key)?;
        }
        self.emitter.push_int(entries.len() as i64);
        self.emitter.emit(Opcode::PACKMAP);
        Ok(())
    }

    /// `[]byte{...}` (§4.5): a `ByteArray` constant (with non-constant
    /// elements zero-filled), converted to a mutable `Buffer`, then patched
    /// element-by-element for the non-constant slots via `SETITEM`.
    fn compile_byte_slice_literal(&mut self, elems: &[Expr]) -> CompileResult<()> {
        let mut bytes = Vec::with_capacity(elems.len());
        for e in elems {
            let byte = match &e.const_value {
                Some(crate::ast::ConstValue::Int(i)) => *i as u8,
                _ => 0,
            };
            bytes.push(byte);
        }
        self.emitter.push_bytes(&bytes);
        self.emitter.emit_byte_operand(Opcode::CONVERT, StackItemType::Buffer.to_byte());

        for (i, e) in elems.iter().enumerate() {
            if e.const_value.is_some() {
                continue;
            }
            self.emitter.emit(Opcode::DUP);
            self.emitter.push_int(i as i64);
            self.compile_expr(e)?;
            self.emitter.emit(Opcode::SETITEM);
        }
        Ok(())
    }

    /// `[]T{...}` (§4.5): push elements in reverse, push the count, `PACK`.
    fn compile_slice_literal(&mut self, elems: &[Expr]) -> CompileResult<()> {
        for e in elems.iter().rev() {
            self.compile_expr(e)?;
        }
        self.emitter.push_int(elems.len() as i64);
        self.emitter.emit(Opcode::PACK);
        Ok(())
    }

    /// Plain (non-condition-context) binary operator lowering (§4.5):
    /// arithmetic/bitwise opcodes chosen by operator, string/byte-slice
    /// `+` lowered to `CAT`, equality against a literal `nil` lowered to
    /// `ISNULL` (optionally negated), and `&&`/`||` compiled with their own
    /// short-circuit branching since they may appear outside a condition
    /// (e.g. `x := a && b`).
    fn compile_binary(&mut self, op: &BinOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        if matches!(lhs.kind.as_ref(), ExprKind::Nil) || matches!(rhs.kind.as_ref(), ExprKind::Nil) {
            let (value, negate) = match op {
                BinOp::Eq => (if matches!(lhs.kind.as_ref(), ExprKind::Nil) { rhs } else { lhs }, false),
                BinOp::Ne => (if matches!(lhs.kind.as_ref(), ExprKind::Nil) { rhs } else { lhs }, true),
                _ => return Err(CompileError::semantic("nil is only comparable with == or !=", Some(lhs.pos))),
            };
            self.compile_expr(value)?;
            self.emitter.emit(Opcode::ISNULL);
            if negate {
                self.emitter.emit(Opcode::NOT);
            }
            return Ok(());
        }

        match op {
            BinOp::LogicalAnd | BinOp::LogicalOr => return self.compile_short_circuit(op, lhs, rhs),
            _ => {}
        }

        self.compile_expr(lhs)?;
        self.compile_expr(rhs)?;
        let is_string_like = matches!(lhs.type_tag, TypeTag::String | TypeTag::ByteArray);
        let is_reference_like = matches!(lhs.type_tag, TypeTag::Array | TypeTag::Map | TypeTag::Struct | TypeTag::Any);
        let opcode = match op {
            BinOp::Add if is_string_like => Opcode::CAT,
            BinOp::Add => Opcode::ADD,
            BinOp::Sub => Opcode::SUB,
            BinOp::Mul => Opcode::MUL,
            BinOp::Div => Opcode::DIV,
            BinOp::Mod => Opcode::MOD,
            BinOp::And => Opcode::AND,
            BinOp::Or => Opcode::OR,
            BinOp::Xor => Opcode::XOR,
            BinOp::Shl => Opcode::SHL,
            BinOp::Shr => Opcode::SHR,
            BinOp::Eq if is_reference_like => Opcode::EQUAL,
            BinOp::Eq => Opcode::NUMEQUAL,
            BinOp::Ne if is_reference_like => Opcode::NOTEQUAL,
            BinOp::Ne => Opcode::NUMNOTEQUAL,
            BinOp::Lt => Opcode::LT,
            BinOp::Le => Opcode::LE,
            BinOp::Gt => Opcode::GT,
            BinOp::Ge => Opcode::GE,
            BinOp::LogicalAnd | BinOp::LogicalOr => unreachable!("handled above"),
        };
        self.emitter.emit(opcode);
        Ok(())
    }

    /// `&&`/`||` as a value-producing expression (as opposed to the fused
    /// jump form `compile_cond_jump` uses in a condition context):
    /// `lhs; DUP; JMPIF[NOT]_L short_circuit; DROP; rhs; JMP_L end;
    /// short_circuit:; end:`.
    fn compile_short_circuit(&mut self, op: &BinOp, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
        let short_circuit = self.new_label()?;
        let end = self.new_label()?;
        self.compile_expr(lhs)?;
        self.emitter.emit(Opcode::DUP);
        let branch = if matches!(op, BinOp::LogicalAnd) { Opcode::JMPIFNOT_L } else { Opcode::JMPIF_L };
        self.emitter.emit_jump(branch, short_circuit);
        self.emitter.emit(Opcode::DROP);
        self.compile_expr(rhs)?;
        self.emitter.emit_jump(Opcode::JMP_L, end);
        self.bind_label(short_circuit);
        self.bind_label(end);
        Ok(())
    }

    fn compile_unary(&mut self, op: &UnOp, operand: &Expr) -> CompileResult<()> {
        match op {
            UnOp::Neg => {
                self.compile_expr(operand)?;
                self.emitter.emit(Opcode::NEGATE);
                Ok(())
            }
            UnOp::Not => {
                self.compile_expr(operand)?;
                self.emitter.emit(Opcode::NOT);
                Ok(())
            }
            UnOp::Invert => {
                self.compile_expr(operand)?;
                self.emitter.emit(Opcode::INVERT);
                Ok(())
            }
            UnOp::AddrOf => {
                if let ExprKind::StructLiteral { fields, .. } = operand.kind.as_ref() {
                    self.compile_struct_literal(fields, true)
                } else {
                    Err(CompileError::structural(
                        "& is only supported directly in front of a struct literal",
                        Some(operand.pos),
                    ))
                }
            }
        }
    }

    /// A lambda expression (§4.4, §4.5): queues its body for compilation
    /// after the enclosing function, then pushes a function pointer via
    /// `PUSHA` so it can be stored, passed, or immediately invoked.
    fn compile_lambda(&mut self, params: &[crate::ast::Param], results: &[TypeTag], body: &crate::ast::Block, _label_id: u16) -> CompileResult<()> {
        let entry_label = self.new_label()?;
        let name = crate::registry::lambda_name(entry_label.0);
        let (package_path, declaring_file) = self
            .current_function
            .map(|id| {
                let scope = self.registry.get(id);
                (scope.package_path.clone(), scope.declaring_file.clone())
            })
            .unwrap_or_default();

        let decl = crate::ast::FuncDecl {
            name: name.clone(),
            receiver: None,
            params: params.to_vec(),
            variadic: false,
            results: results.to_vec(),
            named_results: Vec::new(),
            body: body.clone(),
            is_init: false,
            is_deploy: false,
            is_exported: false,
        };
        self.pending_lambdas.push(name, package_path, declaring_file, entry_label, decl, self.inside_deferred_call());
        self.emitter.emit_push_address(entry_label);
        Ok(())
    }

    /// `T(x)` (§4.5): `CONVERT` between string/byte-slice and the
    /// interop fixed-size hash types; any other pairing is a no-op, the
    /// front end's type system having already guaranteed soundness.
    fn compile_type_conversion(&mut self, target: TypeTag, operand: &Expr) -> CompileResult<()> {
        self.compile_expr(operand)?;
        if let Some(stack_type) = Self::convertible_stack_type(target) {
            self.emitter.emit_byte_operand(Opcode::CONVERT, stack_type.to_byte());
        }
        Ok(())
    }

    fn convertible_stack_type(target: TypeTag) -> Option<StackItemType> {
        match target {
            TypeTag::String | TypeTag::ByteArray | TypeTag::Hash160 | TypeTag::Hash256 | TypeTag::PublicKey | TypeTag::Signature => {
                Some(StackItemType::ByteArray)
            }
            _ => None,
        }
    }

    /// Compiles `cond` for its effect on control flow only, jumping to
    /// `target` when the condition evaluates to `jump_when`. Recognizes a
    /// top-level comparison and fuses it directly into a compare-and-jump
    /// opcode rather than materializing a boolean first (§4.5's "boolean
    /// context" bullet); anything else falls back to `compile_expr` plus
    /// `JMPIF[NOT]_L`.
    pub(crate) fn compile_cond_jump(&mut self, cond: &Expr, target: LabelId, jump_when: bool) -> CompileResult<()> {
        if let ExprKind::Binary { op, lhs, rhs } = cond.kind.as_ref() {
            if let Some(fused) = Self::fused_compare_jump(op, jump_when) {
                if !matches!(lhs.kind.as_ref(), ExprKind::Nil) && !matches!(rhs.kind.as_ref(), ExprKind::Nil) {
                    self.compile_expr(lhs)?;
                    self.compile_expr(rhs)?;
                    self.emitter.emit_jump(fused, target);
                    return Ok(());
                }
            }
        }
        self.compile_expr(cond)?;
        let op = if jump_when { Opcode::JMPIF_L } else { Opcode::JMPIFNOT_L };
        self.emitter.emit_jump(op, target);
        Ok(())
    }

    fn fused_compare_jump(op: &BinOp, jump_when: bool) -> Option<Opcode> {
        use BinOp::*;
        Some(match (op, jump_when) {
            (Eq, true) => Opcode::JMPEQ_L,
            (Eq, false) => Opcode::JMPNE_L,
            (Ne, true) => Opcode::JMPNE_L,
            (Ne, false) => Opcode::JMPEQ_L,
            (Lt, true) => Opcode::JMPLT_L,
            (Lt, false) => Opcode::JMPGE_L,
            (Le, true) => Opcode::JMPLE_L,
            (Le, false) => Opcode::JMPGT_L,
            (Gt, true) => Opcode::JMPGT_L,
            (Gt, false) => Opcode::JMPLE_L,
            (Ge, true) => Opcode::JMPGE_L,
            (Ge, false) => Opcode::JMPLT_L,
            _ => return None,
        })
    }

    /// Clones a struct argument by value: `UNPACK` its fields onto the
    /// stack then `PACKSTRUCT` them back into a fresh instance, so
    /// mutating the callee's copy never aliases the caller's (§4.5's
    /// call-argument bullet).
    pub(crate) fn clone_struct_arg(&mut self) {
        self.emitter.emit(Opcode::UNPACK);
        self.emitter.emit(Opcode::PACKSTRUCT);
    }

    /// Reorders the top `count` freshly-pushed call arguments into call
    /// order (§4.5: "reversed for stack order via `REVERSEN`/`REVERSE3`/
    /// `REVERSE4`/`SWAP`").
    pub(crate) fn reverse_args(&mut self, count: usize) {
        match count {
            0 | 1 => {}
            2 => self.emitter.emit(Opcode::SWAP),
            3 => self.emitter.emit(Opcode::REVERSE3),
            4 => self.emitter.emit(Opcode::REVERSE4),
            n => {
                self.emitter.push_int(n as i64);
                self.emitter.emit(Opcode::REVERSEN);
            }
        }
    }
}
