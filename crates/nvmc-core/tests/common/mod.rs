//! Small AST fixture builders shared by the scenario/capacity integration
//! tests. Stands in for what a real front end would hand this crate:
//! every node below is built already typed (and, where relevant,
//! constant-evaluated), exactly the shape `ast`'s own doc comment
//! describes as this crate's input contract.

#![allow(dead_code)]

use nvmc_core::ast::*;
use nvmc_core::model::{CodePosition, TypeTag};

pub fn pos(line: u32) -> CodePosition {
    CodePosition { document: 0, line, column: 1 }
}

pub fn int_lit(n: i64, line: u32) -> Expr {
    Expr::new(ExprKind::Literal(ConstValue::Int(n)), TypeTag::Integer, pos(line)).with_const(ConstValue::Int(n))
}

pub fn str_lit(s: &str, line: u32) -> Expr {
    Expr::new(ExprKind::Literal(ConstValue::String(s.to_owned())), TypeTag::String, pos(line)).with_const(ConstValue::String(s.to_owned()))
}

pub fn bool_lit(b: bool, line: u32) -> Expr {
    Expr::new(ExprKind::Literal(ConstValue::Bool(b)), TypeTag::Boolean, pos(line)).with_const(ConstValue::Bool(b))
}

pub fn ident(name: &str, type_tag: TypeTag, line: u32) -> Expr {
    Expr::new(ExprKind::Ident(name.to_owned()), type_tag, pos(line))
}

pub fn binary(op: BinOp, lhs: Expr, rhs: Expr, type_tag: TypeTag, line: u32) -> Expr {
    Expr::new(ExprKind::Binary { op, lhs, rhs }, type_tag, pos(line))
}

pub fn call_direct(qualified_name: &str, args: Vec<Expr>, type_tag: TypeTag, line: u32) -> Expr {
    Expr::new(
        ExprKind::Call { callee: Callee::Function(qualified_name.to_owned()), args, spread: false },
        type_tag,
        pos(line),
    )
}

pub fn call_builtin(name: &str, args: Vec<Expr>, spread: bool, type_tag: TypeTag, line: u32) -> Expr {
    Expr::new(
        ExprKind::Call { callee: Callee::Builtin(name.to_owned()), args, spread },
        type_tag,
        pos(line),
    )
}

pub fn byte_slice_literal(bytes: &[u8], line: u32) -> Expr {
    let elems = bytes.iter().map(|&b| int_lit(i64::from(b), line)).collect();
    Expr::new(ExprKind::ByteSliceLiteral(elems), TypeTag::ByteArray, pos(line))
}

pub fn define(name: &str, type_tag: TypeTag, value: Expr, line: u32) -> Stmt {
    Stmt::Define { name: name.to_owned(), type_tag, value, pos: pos(line) }
}

pub fn ret(values: Vec<Expr>, line: u32) -> Stmt {
    Stmt::Return { values, pos: pos(line) }
}

pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::ExprStmt(e)
}

pub fn nil_lit(line: u32) -> Expr {
    Expr::new(ExprKind::Nil, TypeTag::Any, pos(line))
}

pub fn assign(name: &str, value: Expr, line: u32) -> Stmt {
    Stmt::Assign { targets: vec![LValue::Ident(name.to_owned())], value, pos: pos(line) }
}

pub fn if_stmt(cond: Expr, then_body: Block, else_body: Block, line: u32) -> Stmt {
    Stmt::If { cond, then_body, else_body, pos: pos(line) }
}

/// An immediately-invoked niladic lambda expression (`func() { ... }()`),
/// the shape a `defer <call>` statement's call expression takes when the
/// source defers a closure literal rather than a named function.
pub fn lambda_iife(body: Block, line: u32) -> Expr {
    let lambda = Expr::new(
        ExprKind::Lambda { params: Vec::new(), results: Vec::new(), body, label_id: 0 },
        TypeTag::Any,
        pos(line),
    );
    Expr::new(
        ExprKind::Call { callee: Callee::Value(lambda), args: Vec::new(), spread: false },
        TypeTag::Void,
        pos(line),
    )
}

pub fn defer_stmt(call: Expr, line: u32) -> Stmt {
    Stmt::Defer { call, pos: pos(line) }
}

/// Wraps top-level functions and a single package-level `var` declaration
/// into a `Program` (§3/§4.4's global-slot machinery).
pub fn program_with_global(functions: Vec<FuncDecl>, var_name: &str, var_type: TypeTag) -> Program {
    let mut prog = program(functions);
    prog.packages[0].files[0].vars.push(VarDecl { name: var_name.to_owned(), type_tag: var_type, init: None });
    prog
}

/// A free function (no receiver, not variadic, not init/deploy) with a
/// single declared `int`-ish return type, unless overridden.
pub struct FnSpec {
    pub name: String,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub results: Vec<TypeTag>,
    pub body: Block,
    pub is_init: bool,
    pub is_deploy: bool,
    pub is_exported: bool,
}

impl FnSpec {
    pub fn new(name: &str, body: Block) -> Self {
        Self {
            name: name.to_owned(),
            params: Vec::new(),
            variadic: false,
            results: Vec::new(),
            body,
            is_init: false,
            is_deploy: false,
            is_exported: true,
        }
    }

    pub fn returning(mut self, t: TypeTag) -> Self {
        self.results = vec![t];
        self
    }

    pub fn params(mut self, params: Vec<(&str, TypeTag)>) -> Self {
        self.params = params.into_iter().map(|(n, t)| Param { name: n.to_owned(), type_tag: t }).collect();
        self
    }

    pub fn build(self) -> FuncDecl {
        FuncDecl {
            name: self.name,
            receiver: None,
            params: self.params,
            variadic: self.variadic,
            results: self.results,
            named_results: Vec::new(),
            body: self.body,
            is_init: self.is_init,
            is_deploy: self.is_deploy,
            is_exported: self.is_exported,
        }
    }
}

/// Wraps a list of top-level functions (all declared in `main`, one file)
/// into a full `Program`.
pub fn program(functions: Vec<FuncDecl>) -> Program {
    Program {
        packages: vec![Package {
            path: "main".to_owned(),
            files: vec![SourceFile {
                name: "main.go".to_owned(),
                imports: Vec::new(),
                consts: Vec::new(),
                vars: Vec::new(),
                types: Vec::new(),
                functions,
            }],
        }],
        events: Vec::new(),
    }
}

/// A cross-contract call site (§3's `CallToken`, §4.5).
pub fn call_contract(target_hash: [u8; 20], method: &str, has_return: bool, args: Vec<Expr>, type_tag: TypeTag, line: u32) -> Expr {
    Expr::new(
        ExprKind::Call {
            callee: Callee::Contract { target_hash, method: method.to_owned(), has_return, call_flags: 1 },
            args,
            spread: false,
        },
        type_tag,
        pos(line),
    )
}

/// Like `program`, but with declared NEP event signatures (§4.10, §6).
pub fn program_with_events(functions: Vec<FuncDecl>, events: Vec<EventDecl>) -> Program {
    let mut prog = program(functions);
    prog.events = events;
    prog
}

/// Walks a resolved bytecode buffer instruction-by-instruction (the same
/// linear-scan shape `resolve` itself uses internally) and counts how many
/// times `op` appears as an instruction's own opcode byte.
pub fn count_opcode(bytecode: &[u8], op: nvmc_core::opcode::Opcode) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < bytecode.len() {
        let byte = bytecode[i];
        if byte == op.to_byte() {
            count += 1;
        }
        let op_here = nvmc_core::opcode::Opcode::from_byte(byte).expect("valid opcode byte");
        let rest = &bytecode[i + 1..];
        let len = match nvmc_core::opcode::fixed_operand_len(op_here.operand_layout()) {
            Some(n) => n,
            None => match op_here {
                nvmc_core::opcode::Opcode::PUSHDATA1 => 1 + rest[0] as usize,
                nvmc_core::opcode::Opcode::PUSHDATA2 => 2 + u16::from_le_bytes([rest[0], rest[1]]) as usize,
                nvmc_core::opcode::Opcode::PUSHDATA4 => {
                    4 + u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize
                }
                _ => unreachable!("only PUSHDATA* opcodes have a variable-length operand"),
            },
        };
        i += 1 + len;
    }
    count
}
