//! Nested lexical scopes and slot allocation (C3).
//!
//! `VarScope` is, like `monty`'s `Namespaces`, "a small stack of name-keyed
//! maps, looked up top-down" — but unlike `Namespaces::reuse_ids`, which
//! reuses namespace slots across calls (a runtime concern this crate does
//! not have), slot assignment here is purely static and a local's index,
//! once assigned, never changes and is never reused within the function
//! (§3 invariant).

use ahash::AHashMap;

use crate::error::{CompileError, CompileResult};
use crate::intern::StringId;
use crate::model::{InlineAlias, TypeTag, VarKind, VariableInfo};

/// One nested block's name→variable bindings.
#[derive(Debug, Default)]
struct Block {
    names: AHashMap<StringId, VariableInfo>,
}

/// Per-function scope stack: nested block scopes, a flat argument map, and
/// a monotonically increasing local-slot counter (§3's `VarScope`).
#[derive(Debug)]
pub struct VarScope {
    blocks: Vec<Block>,
    arguments: AHashMap<StringId, VariableInfo>,
    next_local_slot: u16,
    next_arg_slot: u16,
    blank_counter: u32,
    /// Every named local declared in this function, in declaration
    /// (slot) order — consulted by C10 for the per-method variable list.
    declared_locals: Vec<(StringId, TypeTag)>,
}

impl VarScope {
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::default()],
            arguments: AHashMap::new(),
            next_local_slot: 0,
            next_arg_slot: 0,
            blank_counter: 0,
            declared_locals: Vec::new(),
        }
    }

    pub fn enter_block(&mut self) {
        self.blocks.push(Block::default());
    }

    pub fn leave_block(&mut self) {
        self.blocks.pop();
        debug_assert!(!self.blocks.is_empty(), "leave_block without matching enter_block");
    }

    /// Declares a function argument, returning its slot. Declaring the
    /// same argument name twice is a fatal internal error (§4.3) — this is
    /// an invariant the front end is assumed to have already upheld, so it
    /// is a `debug_assert!`, not a recoverable `CompileError`.
    pub fn declare_argument(&mut self, interner: &mut crate::intern::Interner, name: &str, type_tag: TypeTag) -> CompileResult<u8> {
        let slot = self.next_arg_slot;
        // Slot indices are a single byte wide (0..=255), but spec.md caps a
        // function at 255 *arguments* total, reserving slot 255 unused — so
        // the 256th declaration (slot == 255) is already over budget, not
        // just the 257th.
        if slot >= u16::from(u8::MAX) {
            return Err(CompileError::capacity("more than 255 arguments in one function"));
        }
        let synthetic;
        let key_name = if name == "_" {
            self.blank_counter += 1;
            synthetic = format!("_#{}", self.blank_counter);
            synthetic.as_str()
        } else {
            name
        };
        let id = interner.intern(key_name);
        debug_assert!(!self.arguments.contains_key(&id), "duplicate argument declaration: {name}");
        self.next_arg_slot += 1;
        self.arguments
            .insert(id, VariableInfo::slot_variable(VarKind::Argument, slot as u8, type_tag));
        Ok(slot as u8)
    }

    /// Declares a local in the innermost block, returning its slot. `_`
    /// is valid and compiles to a `DROP` at the store site (§4.3); it
    /// still consumes a slot here because the caller (C5) needs *some*
    /// slot index to thread through, even though nothing is ever loaded
    /// back from it.
    pub fn declare_local(&mut self, interner: &mut crate::intern::Interner, name: &str, type_tag: TypeTag) -> CompileResult<u8> {
        let slot = self.next_local_slot;
        // See the matching comment in `declare_argument`: 255 locals total,
        // slot 255 never allocated.
        if slot >= u16::from(u8::MAX) {
            return Err(CompileError::capacity("more than 255 locals in one function"));
        }
        self.next_local_slot += 1;
        if name != "_" {
            let id = interner.intern(name);
            self.blocks
                .last_mut()
                .expect("at least one block scope")
                .names
                .insert(id, VariableInfo::slot_variable(VarKind::Local, slot as u8, type_tag));
            self.declared_locals.push((id, type_tag));
        }
        Ok(slot as u8)
    }

    /// Every named local declared so far, in declaration order (§4.10's
    /// per-method variable list).
    pub fn declared_locals(&self) -> &[(StringId, TypeTag)] {
        &self.declared_locals
    }

    /// Binds an inlined parameter as a lazily re-walked alias rather than
    /// a slot (§4.3).
    pub fn bind_inline_alias(&mut self, interner: &mut crate::intern::Interner, name: &str, alias: InlineAlias) {
        let id = interner.intern(name);
        self.blocks.last_mut().expect("at least one block scope").names.insert(
            id,
            VariableInfo {
                kind: VarKind::Local,
                slot: 0,
                type_tag: alias.source_expr.type_tag,
                inline_alias: Some(alias),
            },
        );
    }

    /// Looks up a name, walking local block scopes top-down, then
    /// arguments (§3: "Lookup walks the stack top-down, then
    /// arguments"). Globals are resolved separately by the caller via the
    /// function registry's static-variable table, since they are not
    /// per-function state.
    pub fn lookup(&self, id: StringId) -> Option<&VariableInfo> {
        for block in self.blocks.iter().rev() {
            if let Some(info) = block.names.get(&id) {
                return Some(info);
            }
        }
        self.arguments.get(&id)
    }

    pub fn local_count(&self) -> u8 {
        self.next_local_slot as u8
    }

    pub fn arg_count(&self) -> u8 {
        self.next_arg_slot as u8
    }
}

impl Default for VarScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn slots_are_dense_and_stable() {
        let mut interner = Interner::new();
        let mut scope = VarScope::new();
        let a = scope.declare_local(&mut interner, "a", TypeTag::Integer).unwrap();
        let b = scope.declare_local(&mut interner, "b", TypeTag::Integer).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        scope.enter_block();
        let c = scope.declare_local(&mut interner, "c", TypeTag::Integer).unwrap();
        assert_eq!(c, 2, "slots are never reused across nested blocks");
        scope.leave_block();
        assert_eq!(scope.local_count(), 3);
    }

    #[test]
    fn nested_block_shadows_outer() {
        let mut interner = Interner::new();
        let mut scope = VarScope::new();
        let x_id = interner.intern("x");
        scope.declare_local(&mut interner, "x", TypeTag::Integer).unwrap();
        scope.enter_block();
        scope.declare_local(&mut interner, "x", TypeTag::Boolean).unwrap();
        assert_eq!(scope.lookup(x_id).unwrap().type_tag, TypeTag::Boolean);
        scope.leave_block();
        assert_eq!(scope.lookup(x_id).unwrap().type_tag, TypeTag::Integer);
    }

    #[test]
    fn blank_arguments_get_dense_synthetic_slots() {
        let mut interner = Interner::new();
        let mut scope = VarScope::new();
        let a = scope.declare_argument(&mut interner, "_", TypeTag::Integer).unwrap();
        let b = scope.declare_argument(&mut interner, "y", TypeTag::Integer).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn lookup_falls_back_from_locals_to_arguments() {
        let mut interner = Interner::new();
        let mut scope = VarScope::new();
        scope.declare_argument(&mut interner, "x", TypeTag::Integer).unwrap();
        let id = interner.intern("x");
        assert!(matches!(scope.lookup(id).unwrap().kind, VarKind::Argument));
    }
}
