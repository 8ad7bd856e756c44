//! Label/offset resolver & peephole compressor (C9).
//!
//! Implements §4.9's four numbered steps exactly. Grounded on
//! cranelift-codegen's `binemit::relaxation::relax_branches` for the
//! "separate offsets-table pass, then walk-and-fix pass, converge" idiom
//! (direction inverted here: this crate shrinks long→short where
//! cranelift grows short→long, but the shape — compute once, rewrite,
//! re-derive because the rewrite changed lengths — is the same).
//!
//! Jump deltas are relative to the *opcode byte* of the jumping
//! instruction itself (matching the reference VM's actual jump
//! semantics, cross-checked against the opcode table in
//! `examples/other_examples/..._neo-decompiler__src-common-types.rs.rs`),
//! not to the end of the instruction.

use crate::emitter::{Emitter, JumpFixup, TryFixup};
use crate::error::{CompileError, CompileResult};
use crate::model::{DebugSequencePoint, LabelId};
use crate::opcode::{self, Opcode};

/// An `INITSLOT`/`INITSSLOT` site whose byte-width depends on the
/// function's final slot counts, patched in once those counts are known
/// (§4.9: "`INITSLOT locals,args` is rewritten").
#[derive(Debug, Clone, Copy)]
pub struct InitSlotSite {
    pub instr_offset: u32,
    pub locals: u8,
    pub args: u8,
}

/// A contiguous byte range to be stripped from the final buffer.
#[derive(Debug, Clone, Copy)]
struct NopRange {
    start: u32,
    len: u32,
}

pub struct Resolved {
    pub bytecode: Vec<u8>,
}

/// Runs all four passes and returns the final bytecode. `method_ranges`
/// and `sequence_points` are adjusted in place so callers (the top-level
/// driver) don't need a second traversal.
pub fn resolve(
    mut emitter: Emitter,
    initslot_sites: &[InitSlotSite],
    method_ranges: &mut [(u32, u32)],
    sequence_points: &mut [DebugSequencePoint],
    peephole_compression: bool,
) -> CompileResult<Resolved> {
    let labels = std::mem::take(&mut emitter.label_offsets);
    let jump_fixups = std::mem::take(&mut emitter.jump_fixups);
    let try_fixups = std::mem::take(&mut emitter.try_fixups);
    let mut buf = emitter.into_bytes();

    let label_target = |label: LabelId| -> CompileResult<u32> {
        labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| CompileError::structural(format!("unresolved label {}", label.0), None))
    };

    // --- Step 1: resolve every placeholder to a signed 32-bit delta ---
    for fixup in &jump_fixups {
        write_i32_delta(&mut buf, fixup.instr_offset + 1, label_target(fixup.label)?, fixup.instr_offset)?;
    }
    for fixup in &try_fixups {
        write_i32_delta(&mut buf, fixup.instr_offset + 1, label_target(fixup.catch)?, fixup.instr_offset)?;
        write_i32_delta(&mut buf, fixup.instr_offset + 5, label_target(fixup.finally)?, fixup.instr_offset)?;
    }

    let mut nop_ranges: Vec<NopRange> = Vec::new();

    // --- Step 2: compress in-range long jumps to short form ---
    // `PUSHA` and `TRY_L` are never compressed (§4.2, §4.9).
    let mut compressible: Vec<(u32, Opcode, i32)> = Vec::new();
    if peephole_compression {
        for fixup in &jump_fixups {
            let Some(short_op) = opcode::short_form(fixup.op) else {
                continue;
            };
            let delta = read_i32(&buf, fixup.instr_offset + 1);
            if let Ok(delta8) = i8::try_from(delta) {
                compressible.push((fixup.instr_offset, short_op, i32::from(delta8)));
            }
        }
    }
    for &(offset, short_op, delta) in &compressible {
        let idx = offset as usize;
        buf[idx] = short_op.to_byte();
        buf[idx + 1] = delta as i8 as u8;
        buf[idx + 2] = Opcode::NOP.to_byte();
        buf[idx + 3] = Opcode::NOP.to_byte();
        buf[idx + 4] = Opcode::NOP.to_byte();
        nop_ranges.push(NopRange { start: offset + 2, len: 3 });
    }
    let compressed_offsets: std::collections::HashSet<u32> = compressible.iter().map(|(o, _, _)| *o).collect();

    // `INITSLOT`/`INITSSLOT` zero/zero rewrite.
    for site in initslot_sites {
        if site.locals == 0 && site.args == 0 {
            nop_ranges.push(NopRange { start: site.instr_offset, len: 3 });
        } else {
            buf[site.instr_offset as usize + 1] = site.locals;
            buf[site.instr_offset as usize + 2] = site.args;
        }
    }

    nop_ranges.sort_by_key(|r| r.start);
    let removed_before = |offset: u32| -> u32 {
        nop_ranges.iter().filter(|r| r.start + r.len <= offset).map(|r| r.len).sum()
    };

    // --- Step 3: re-resolve remaining jumps accounting for to-be-removed NOPs ---
    for fixup in &jump_fixups {
        if fixup.op == Opcode::PUSHA {
            let target = label_target(fixup.label)?;
            let adj_target = target - removed_before(target);
            let adj_instr = fixup.instr_offset - removed_before(fixup.instr_offset);
            write_i32(&mut buf, fixup.instr_offset + 1, adj_target as i32 - adj_instr as i32);
            continue;
        }
        let target = label_target(fixup.label)?;
        let adj_target = target as i64 - i64::from(removed_before(target));
        let adj_instr = fixup.instr_offset as i64 - i64::from(removed_before(fixup.instr_offset));
        let new_delta = adj_target - adj_instr;
        if compressed_offsets.contains(&fixup.instr_offset) {
            let delta8 = i8::try_from(new_delta)
                .map_err(|_| CompileError::capacity("short jump delta out of range after NOP removal"))?;
            buf[fixup.instr_offset as usize + 1] = delta8 as u8;
        } else {
            let delta32 =
                i32::try_from(new_delta).map_err(|_| CompileError::capacity("long jump delta exceeds i32 range"))?;
            write_i32(&mut buf, fixup.instr_offset + 1, delta32);
        }
    }
    for fixup in &try_fixups {
        let catch = label_target(fixup.catch)?;
        let finally = label_target(fixup.finally)?;
        let adj_instr = fixup.instr_offset as i64 - i64::from(removed_before(fixup.instr_offset));
        let adj_catch = catch as i64 - i64::from(removed_before(catch));
        let adj_finally = finally as i64 - i64::from(removed_before(finally));
        let catch_delta = i32::try_from(adj_catch - adj_instr)
            .map_err(|_| CompileError::capacity("TRY catch delta exceeds i32 range"))?;
        let finally_delta = i32::try_from(adj_finally - adj_instr)
            .map_err(|_| CompileError::capacity("TRY finally delta exceeds i32 range"))?;
        write_i32(&mut buf, fixup.instr_offset + 1, catch_delta);
        write_i32(&mut buf, fixup.instr_offset + 5, finally_delta);
    }

    // --- Step 4: strip NOP ranges, shift method ranges & sequence points ---
    let mut final_buf = Vec::with_capacity(buf.len());
    let mut cursor = 0u32;
    let mut sorted_ranges = nop_ranges.clone();
    sorted_ranges.sort_by_key(|r| r.start);
    for range in &sorted_ranges {
        final_buf.extend_from_slice(&buf[cursor as usize..range.start as usize]);
        cursor = range.start + range.len;
    }
    final_buf.extend_from_slice(&buf[cursor as usize..]);

    for range in method_ranges.iter_mut() {
        range.0 -= removed_before(range.0);
        range.1 -= removed_before(range.1);
    }
    for sp in sequence_points.iter_mut() {
        sp.opcode_offset -= removed_before(sp.opcode_offset);
    }

    Ok(Resolved { bytecode: final_buf })
}

fn read_i32(buf: &[u8], at: u32) -> i32 {
    i32::from_le_bytes(buf[at as usize..at as usize + 4].try_into().unwrap())
}

fn write_i32(buf: &mut [u8], at: u32, value: i32) {
    buf[at as usize..at as usize + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_i32_delta(buf: &mut [u8], operand_at: u32, target: u32, instr_offset: u32) -> CompileResult<()> {
    let delta = i64::from(target) - i64::from(instr_offset);
    let delta32 = i32::try_from(delta).map_err(|_| CompileError::capacity("jump delta exceeds i32 range"))?;
    write_i32(buf, operand_at, delta32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forward_jump_compresses_and_strips_nops() {
        let mut e = Emitter::new();
        let end = e.new_label().unwrap();
        e.emit_jump(Opcode::JMP_L, end);
        e.emit(Opcode::NOP);
        e.emit(Opcode::NOP);
        e.bind_label(end);
        e.emit(Opcode::RET);

        let mut ranges = [(0u32, 8u32)];
        let mut sps = [];
        let resolved = resolve(e, &[], &mut ranges, &mut sps, true).unwrap();
        // JMP (2 bytes) + NOP + NOP + RET = 4 bytes after stripping the
        // compressed jump's 3 filler NOPs.
        assert_eq!(resolved.bytecode.len(), 4);
        assert_eq!(resolved.bytecode[0], Opcode::JMP.to_byte());
        assert_eq!(*resolved.bytecode.last().unwrap(), Opcode::RET.to_byte());
        assert_eq!(ranges[0], (0, 5));
    }

    #[test]
    fn long_jump_stays_long_when_out_of_short_range() {
        let mut e = Emitter::new();
        let end = e.new_label().unwrap();
        e.emit_jump(Opcode::JMP_L, end);
        for _ in 0..200 {
            e.emit(Opcode::NOP);
        }
        e.bind_label(end);
        e.emit(Opcode::RET);

        let mut ranges = [];
        let mut sps = [];
        let resolved = resolve(e, &[], &mut ranges, &mut sps, true).unwrap();
        assert_eq!(resolved.bytecode[0], Opcode::JMP_L.to_byte());
    }

    #[test]
    fn zero_zero_initslot_is_fully_removed() {
        let mut e = Emitter::new();
        let site_offset = e.len();
        e.emit_word_operand(Opcode::INITSLOT, 0);
        e.emit(Opcode::RET);
        let sites = [InitSlotSite { instr_offset: site_offset, locals: 0, args: 0 }];
        let mut ranges = [];
        let mut sps = [];
        let resolved = resolve(e, &sites, &mut ranges, &mut sps, true).unwrap();
        assert_eq!(resolved.bytecode, vec![Opcode::RET.to_byte()]);
    }

    #[test]
    fn pusha_is_never_compressed() {
        let mut e = Emitter::new();
        let label = e.new_label().unwrap();
        e.emit_push_address(label);
        e.bind_label(label);
        e.emit(Opcode::RET);
        let mut ranges = [];
        let mut sps = [];
        let resolved = resolve(e, &[], &mut ranges, &mut sps, true).unwrap();
        assert_eq!(resolved.bytecode[0], Opcode::PUSHA.to_byte());
        assert_eq!(resolved.bytecode.len(), 6);
    }
}
