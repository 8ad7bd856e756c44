//! Shared data model (§3): source positions, type tags, and the per-function
//! scope/label/debug records threaded through every later component.
//!
//! These types are deliberately plain data: the types that own behavior
//! (`Codegen`, `VarScope`, `FunctionRegistry`, ...) live in their own
//! modules and borrow or own collections of these records.

use std::fmt;

use crate::intern::{FunctionId, StringId};

/// A single point in source text, 1-indexed like every compiler front end
/// in the corpus (`monty::parse::CodeRange` is 1-indexed for the same
/// reason: it is shown directly to users).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodePosition {
    pub document: u32,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for CodePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open source range, used for debug sequence points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    pub start: CodePosition,
    pub end: CodePosition,
}

/// The source-type tag carried for debug/ABI purposes (§4.10).
///
/// This is a coarser view than the front end's full type system: only the
/// shapes the VM's debug format and `CONVERT` opcode care about survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TypeTag {
    Integer,
    Boolean,
    String,
    ByteArray,
    Array,
    Map,
    Struct,
    Hash160,
    Hash256,
    PublicKey,
    Signature,
    InteropInterface,
    Any,
    Void,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::ByteArray => "ByteArray",
            Self::Array => "Array",
            Self::Map => "Map",
            Self::Struct => "Struct",
            Self::Hash160 => "Hash160",
            Self::Hash256 => "Hash256",
            Self::PublicKey => "PublicKey",
            Self::Signature => "Signature",
            Self::InteropInterface => "InteropInterface",
            Self::Any => "Any",
            Self::Void => "Void",
        };
        f.write_str(s)
    }
}

/// Which of the three slot banks a variable lives in (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum VarKind {
    Argument,
    Local,
    Static,
}

/// A 16-bit symbolic label id. The label table (owned by `Emitter`) maps
/// this to an absolute byte offset once emission of a function body
/// completes; `resolve` (C9) consumes that mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LabelId(pub u16);

/// A named label role, used for loop/switch control-flow bookkeeping where
/// a construct has several addressable points (start of body, start of
/// post-condition, end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NamedLabelKind {
    Start,
    Post,
    End,
}

/// One inlined-parameter alias binding (§4.3's `bind_inline_alias`).
///
/// When an inlined function's parameter is a pure (side-effect-free)
/// expression at the call site, rather than storing it to a slot we record
/// the source expression plus the scope/import context it was captured
/// under; every use of the parameter name re-walks that captured
/// expression in its captured context instead of loading a slot.
#[derive(Debug, Clone)]
pub struct InlineAlias {
    pub source_expr: crate::ast::Expr,
    pub captured_scope_depth: usize,
    pub captured_import_alias: Option<StringId>,
}

/// Everything the scope allocator (C3) knows about one declared name.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub kind: VarKind,
    pub slot: u8,
    pub type_tag: TypeTag,
    pub inline_alias: Option<InlineAlias>,
}

impl VariableInfo {
    pub fn slot_variable(kind: VarKind, slot: u8, type_tag: TypeTag) -> Self {
        Self {
            kind,
            slot,
            type_tag,
            inline_alias: None,
        }
    }
}

/// Per-`defer` bookkeeping threaded through C7's lowering (§3, §4.7).
#[derive(Debug, Clone)]
pub struct DeferInfo {
    pub catch_label: LabelId,
    pub finally_label: LabelId,
    pub call: crate::ast::Expr,
    pub reached_flag_slot: u8,
    pub inside_finally_flag_slot: u8,
}

/// One function, method, lambda, `init`, or `_deploy` (§3).
///
/// Methods prepend the receiver as argument zero (§4.4, §4.5, §9); lambdas
/// are synthesized with auto-generated names `lambda@<label-id>`.
#[derive(Debug, Clone)]
pub struct FunctionScope {
    pub id: FunctionId,
    pub qualified_name: String,
    pub package_path: String,
    pub declaring_file: String,
    pub entry_label: LabelId,
    pub opcode_range: (u32, u32),
    pub arg_count: u8,
    pub local_count: u8,
    pub parameters: Vec<(StringId, TypeTag)>,
    pub local_names: Vec<(StringId, TypeTag)>,
    pub return_types: Vec<TypeTag>,
    pub defer_stack: Vec<DeferInfo>,
    pub is_lambda: bool,
    /// Whether the final declared parameter is variadic (`...T`). Known at
    /// discovery time from the AST, before the body is compiled, so a
    /// forward call site can still decide whether to pack its trailing
    /// arguments (§4.5's variadic-tail-packing bullet).
    pub is_variadic: bool,
    /// Number of declared parameters (including a prepended receiver),
    /// known at discovery time — distinct from `parameters`, which is only
    /// filled in once this function's own body has been compiled.
    pub declared_param_count: u8,
}

impl FunctionScope {
    /// The single type tag recorded in debug info (§4.10 models one
    /// return-type tag per method); multi-value returns collapse to the
    /// first declared result, matching how the source language's own ABI
    /// surface reports a primary return type.
    pub fn debug_return_type(&self) -> TypeTag {
        self.return_types.first().copied().unwrap_or(TypeTag::Void)
    }
}

/// A recorded breakpoint-addressable source position (§3, §4.10).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct DebugSequencePoint {
    pub opcode_offset: u32,
    pub document: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// One method's entry in the debug/ABI output (§3, §4.10).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MethodDebugInfo {
    pub id: u32,
    pub namespace: String,
    pub name: String,
    pub range: (u32, u32),
    pub parameters: Vec<(String, TypeTag)>,
    pub variables: Vec<(String, TypeTag)>,
    pub return_type: TypeTag,
    pub sequence_points: Vec<DebugSequencePoint>,
}

/// A deduplicated cross-contract call descriptor, referenced from a
/// `CALLT` opcode by 16-bit index (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CallToken {
    pub target_hash: [u8; 20],
    pub method_name: String,
    pub param_count: u16,
    pub has_return: bool,
    pub call_flags: u8,
}
