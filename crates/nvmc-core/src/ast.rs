//! Typed-AST input surface (SPEC_FULL §2).
//!
//! Stands in for the front end's output: a fully parsed, type-checked,
//! constant-evaluated program. Nothing here performs name resolution, type
//! inference, or constant folding — every `Expr` already carries its
//! resolved type and, if it is compile-time constant, its value. This
//! mirrors `monty`'s own `Node<F>`/`Expr` convention of being the *output*
//! of a prior "prepare" pass external to that crate's own scope.
//!
//! Plain data, `serde`-round-trippable, so CLI/test fixtures can be
//! expressed as JSON (SPEC_FULL §2).

use crate::model::{CodePosition, CodeRange, TypeTag};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub packages: Vec<Package>,
    /// Declared NEP event signatures (name + parameter type tags), emitted
    /// verbatim into the manifest's event list (§4.10, §6) regardless of
    /// whether any `runtime.Notify` call site in the usage closure actually
    /// fires them — the front end, not this crate, owns event declaration.
    #[serde(default)]
    pub events: Vec<EventDecl>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventDecl {
    pub name: String,
    pub parameters: Vec<(String, TypeTag)>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Package {
    /// Fully-qualified package path, e.g. `main` or `example.com/foo/bar`.
    pub path: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub imports: Vec<ImportAlias>,
    pub consts: Vec<ConstDecl>,
    pub vars: Vec<VarDecl>,
    pub types: Vec<TypeDecl>,
    pub functions: Vec<FuncDecl>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ImportAlias {
    pub alias: String,
    pub package_path: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<(String, TypeTag)>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub value: ConstValue,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub type_tag: TypeTag,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub type_tag: TypeTag,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Receiver {
    pub name: String,
    pub type_name: String,
    /// `true` for `(r *Type)`, stripped from the qualified method name per §4.4.
    pub is_pointer: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub params: Vec<Param>,
    /// Whether the final parameter is variadic (`...T`).
    pub variadic: bool,
    pub results: Vec<TypeTag>,
    /// Named result variables, parallel to `results`; empty if results are
    /// unnamed (the common case — named results only matter for §4.5's
    /// "emit named returns" bullet).
    pub named_results: Vec<String>,
    pub body: Block,
    pub is_init: bool,
    pub is_deploy: bool,
    pub is_exported: bool,
}

pub type Block = Vec<Stmt>;

/// Compile-time constant values, as produced by the front end's constant
/// evaluator (§3: "compile-time constants carry a value").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Null,
}

/// One expression node: a resolved type, an optional constant value, a
/// source position (for sequence points and error messages), and the
/// expression shape itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub type_tag: TypeTag,
    pub const_value: Option<ConstValue>,
    pub pos: CodePosition,
}

impl Expr {
    pub fn new(kind: ExprKind, type_tag: TypeTag, pos: CodePosition) -> Self {
        Self {
            kind: Box::new(kind),
            type_tag,
            const_value: None,
            pos,
        }
    }

    pub fn with_const(mut self, value: ConstValue) -> Self {
        self.const_value = Some(value);
        self
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Invert,
    AddrOf,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CompositeField {
    Positional(Expr),
    Keyed(String, Expr),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ExprKind {
    Literal(ConstValue),
    Nil,
    Ident(String),
    StructLiteral {
        type_name: String,
        fields: Vec<CompositeField>,
        /// `&Type{...}` takes the address, producing a reference (Array).
        by_ref: bool,
    },
    MapLiteral {
        entries: Vec<(Expr, Expr)>,
    },
    ByteSliceLiteral(Vec<Expr>),
    SliceLiteral(Vec<Expr>),
    Binary {
        op: BinOp,
        lhs: Expr,
        rhs: Expr,
    },
    Unary {
        op: UnOp,
        operand: Expr,
    },
    Selector {
        base: Expr,
        field: String,
        field_index: u8,
    },
    Index {
        base: Expr,
        index: Expr,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
        /// Spread the final argument (`args...`) rather than packing it.
        spread: bool,
    },
    Lambda {
        params: Vec<Param>,
        results: Vec<TypeTag>,
        body: Block,
        label_id: u16,
    },
    TypeConversion {
        target: TypeTag,
        operand: Expr,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Callee {
    /// A resolved free function or method by fully-qualified name.
    Function(String),
    /// A package-qualified builtin/syscall reference, e.g. `runtime.Log`.
    Qualified { package_alias: String, name: String },
    /// A bare builtin name, e.g. `len`, `append`, `panic`, `recover`.
    Builtin(String),
    /// A value expression holding a function pointer (lambda invocation).
    Value(Expr),
    /// A cross-contract call, lowered to a single `CALLT` referencing a
    /// deduplicated call token (§3's `CallToken`, §4.5, §6).
    Contract {
        target_hash: [u8; 20],
        method: String,
        has_return: bool,
        call_flags: u8,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum LValue {
    Ident(String),
    Blank,
    Selector { base: Expr, field: String, field_index: u8 },
    Index { base: Expr, index: Expr },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    ExprStmt(Expr),
    Define { name: String, type_tag: TypeTag, value: Expr, pos: CodePosition },
    Assign { targets: Vec<LValue>, value: Expr, pos: CodePosition },
    CompoundAssign { target: LValue, op: CompoundOp, value: Expr, pos: CodePosition },
    Return { values: Vec<Expr>, pos: CodePosition },
    If { cond: Expr, then_body: Block, else_body: Block, pos: CodePosition },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, post: Option<Box<Stmt>>, body: Block, pos: CodePosition },
    ForRange {
        key: Option<String>,
        value: Option<String>,
        collection: Expr,
        body: Block,
        pos: CodePosition,
    },
    Switch { tag: Option<Expr>, cases: Vec<SwitchCase>, pos: CodePosition },
    Break,
    Continue,
    Fallthrough,
    Defer { call: Expr, pos: CodePosition },
    Block(Block),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SwitchCase {
    /// Empty = `default`.
    pub values: Vec<Expr>,
    pub body: Block,
}

impl CodeRange {
    pub fn point(pos: CodePosition) -> Self {
        Self { start: pos, end: pos }
    }
}
