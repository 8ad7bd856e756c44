//! Low-level bytecode writer (C2), generalizing `monty`'s
//! `bytecode::builder::CodeBuilder`.
//!
//! The key difference from the teacher, required by §4.2 and load-bearing
//! for C9: `monty`'s builder emits a single-pass *relative* jump offset
//! (patched once the target is known, but always directly as the final
//! byte pattern). This emitter instead always emits jumps/calls/TRY/PUSHA
//! in **long form** as fixed-width placeholders whose payload is a *label
//! id*, never a byte delta — the label table and the rewrite from
//! label-id to delta (and the later long→short compression) are a
//! dedicated second pass (`resolve`, C9). This mirrors cranelift-codegen's
//! `binemit::relaxation` split between an offset-computation pass and a
//! fixup pass.

use crate::ast::ConstValue;
use crate::error::{CompileError, CompileResult};
use crate::model::LabelId;
use crate::opcode::{Opcode, OperandLayout};

/// A still-unresolved jump/call/PUSHA: one label-id placeholder.
#[derive(Debug, Clone, Copy)]
pub struct JumpFixup {
    pub instr_offset: u32,
    pub op: Opcode,
    pub label: LabelId,
}

/// A still-unresolved `TRY_L`: two label-id placeholders (catch, finally).
#[derive(Debug, Clone, Copy)]
pub struct TryFixup {
    pub instr_offset: u32,
    pub catch: LabelId,
    pub finally: LabelId,
}

/// Append-only bytecode buffer plus the symbolic-label bookkeeping needed
/// to resolve it in a later pass.
#[derive(Debug, Default)]
pub struct Emitter {
    buf: Vec<u8>,
    next_label: u32,
    /// Absolute offset each bound label resolved to. Populated by
    /// `bind_label`, consumed by `resolve` (C9).
    pub(crate) label_offsets: Vec<Option<u32>>,
    pub(crate) jump_fixups: Vec<JumpFixup>,
    pub(crate) try_fixups: Vec<TryFixup>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Allocates a fresh label id. Not yet bound to any offset.
    pub fn new_label(&mut self) -> CompileResult<LabelId> {
        if self.next_label >= u32::from(u16::MAX) {
            return Err(CompileError::capacity("more than 65,535 labels in one module"));
        }
        let id = LabelId(self.next_label as u16);
        self.next_label += 1;
        self.label_offsets.push(None);
        Ok(id)
    }

    /// Binds a label to the current write position (§3: "the label table
    /// maps id→absolute byte offset").
    pub fn bind_label(&mut self, label: LabelId) {
        let idx = label.0 as usize;
        debug_assert!(self.label_offsets[idx].is_none(), "label bound twice");
        self.label_offsets[idx] = Some(self.buf.len() as u32);
    }

    pub fn emit(&mut self, op: Opcode) {
        debug_assert_eq!(op.operand_layout(), OperandLayout::Zero);
        self.buf.push(op.to_byte());
    }

    pub fn emit_byte_operand(&mut self, op: Opcode, operand: u8) {
        self.buf.push(op.to_byte());
        self.buf.push(operand);
    }

    pub fn emit_word_operand(&mut self, op: Opcode, operand: u16) {
        self.buf.push(op.to_byte());
        self.buf.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_dword_operand(&mut self, op: Opcode, operand: u32) {
        self.buf.push(op.to_byte());
        self.buf.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_raw_operand(&mut self, op: Opcode, operand: &[u8]) {
        self.buf.push(op.to_byte());
        self.buf.extend_from_slice(operand);
    }

    /// Emits a long-form jump with a label-id placeholder payload. `op`
    /// must be the long-form variant (`JMP_L`, `CALL_L`, `ENDTRY_L`, ...).
    pub fn emit_jump(&mut self, op: Opcode, label: LabelId) {
        let instr_offset = self.buf.len() as u32;
        self.buf.push(op.to_byte());
        self.buf.extend_from_slice(&u32::from(label.0).to_le_bytes());
        self.jump_fixups.push(JumpFixup { instr_offset, op, label });
    }

    /// Emits `PUSHA` (a long-jump-shaped push-address-of-label).
    pub fn emit_push_address(&mut self, label: LabelId) {
        self.emit_jump(Opcode::PUSHA, label);
    }

    /// Emits `TRY_L catch, finally` with two label-id placeholders.
    pub fn emit_try(&mut self, catch: LabelId, finally: LabelId) {
        let instr_offset = self.buf.len() as u32;
        self.buf.push(Opcode::TRY_L.to_byte());
        self.buf.extend_from_slice(&u32::from(catch.0).to_le_bytes());
        self.buf.extend_from_slice(&u32::from(finally.0).to_le_bytes());
        self.try_fixups.push(TryFixup { instr_offset, catch, finally });
    }

    pub fn emit_call_token(&mut self, index: u16) {
        self.emit_word_operand(Opcode::CALLT, index);
    }

    pub fn emit_syscall(&mut self, interop_id: u32) {
        self.emit_dword_operand(Opcode::SYSCALL, interop_id);
    }

    /// Pushes an integer constant, choosing the shortest encoding (§4.1:
    /// dedicated opcodes for [-1,16], otherwise length-prefixed two's
    /// complement little-endian bytes).
    pub fn push_int(&mut self, value: i64) {
        use Opcode::*;
        match value {
            -1 => self.emit(PUSHM1),
            0 => self.emit(PUSH0),
            1..=16 => self.emit(match value {
                1 => PUSH1,
                2 => PUSH2,
                3 => PUSH3,
                4 => PUSH4,
                5 => PUSH5,
                6 => PUSH6,
                7 => PUSH7,
                8 => PUSH8,
                9 => PUSH9,
                10 => PUSH10,
                11 => PUSH11,
                12 => PUSH12,
                13 => PUSH13,
                14 => PUSH14,
                15 => PUSH15,
                16 => PUSH16,
                _ => unreachable!(),
            }),
            _ => {
                if let Ok(v) = i8::try_from(value) {
                    self.emit_byte_operand(PUSHINT8, v as u8);
                } else if let Ok(v) = i16::try_from(value) {
                    self.emit_word_operand(PUSHINT16, v as u16);
                } else if let Ok(v) = i32::try_from(value) {
                    self.emit_dword_operand(PUSHINT32, v as u32);
                } else {
                    self.buf.push(PUSHINT64.to_byte());
                    self.buf.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
    }

    pub fn push_bool(&mut self, value: bool) {
        self.emit(if value { Opcode::PUSH1 } else { Opcode::PUSH0 });
    }

    pub fn push_null(&mut self) {
        self.emit(Opcode::PUSHNULL);
    }

    /// Pushes a byte string, choosing `PUSHDATA1/2/4` by length (§4.1).
    pub fn push_bytes(&mut self, data: &[u8]) {
        let len = data.len();
        if len <= u8::MAX as usize {
            self.buf.push(Opcode::PUSHDATA1.to_byte());
            self.buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.push(Opcode::PUSHDATA2.to_byte());
            self.buf.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.buf.push(Opcode::PUSHDATA4.to_byte());
            self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.buf.extend_from_slice(data);
    }

    pub fn push_string(&mut self, s: &str) {
        self.push_bytes(s.as_bytes());
    }

    pub fn push_const(&mut self, value: &ConstValue) {
        match value {
            ConstValue::Int(i) => self.push_int(*i),
            ConstValue::Bool(b) => self.push_bool(*b),
            ConstValue::String(s) => self.push_string(s),
            ConstValue::Bytes(b) => self.push_bytes(b),
            ConstValue::Null => self.push_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_use_dedicated_opcodes() {
        let mut e = Emitter::new();
        e.push_int(-1);
        e.push_int(0);
        e.push_int(16);
        assert_eq!(e.bytes(), &[Opcode::PUSHM1.to_byte(), Opcode::PUSH0.to_byte(), Opcode::PUSH16.to_byte()]);
    }

    #[test]
    fn large_int_uses_length_prefixed_encoding() {
        let mut e = Emitter::new();
        e.push_int(1000);
        assert_eq!(e.bytes()[0], Opcode::PUSHINT16.to_byte());
    }

    #[test]
    fn jump_emits_long_form_label_placeholder() {
        let mut e = Emitter::new();
        let label = e.new_label().unwrap();
        e.emit_jump(Opcode::JMP_L, label);
        assert_eq!(e.bytes().len(), 5);
        assert_eq!(e.bytes()[0], Opcode::JMP_L.to_byte());
        assert_eq!(u32::from_le_bytes(e.bytes()[1..5].try_into().unwrap()), u32::from(label.0));
    }

    #[test]
    fn label_allocation_exhaustion_is_a_capacity_error() {
        let mut e = Emitter::new();
        e.next_label = u32::from(u16::MAX);
        assert!(e.new_label().is_err());
    }
}
