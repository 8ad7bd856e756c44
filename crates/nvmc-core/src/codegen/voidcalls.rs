//! Void-call pre-pass.
//!
//! A small standalone pass run once per function body, before codegen
//! proper, marking which `Call` expressions are used purely as
//! statements — their results must be dropped (or never pushed) rather
//! than left on the stack. Mirrors the general shape of `monty`'s own
//! "prepare" phase running ahead of `Compiler`: an annotation pass kept
//! separate from the visitor that consumes it.
//!
//! Since `ast::Expr` nodes don't carry a stable identity, membership is
//! keyed by source position — two distinct call expressions never share a
//! position, because every expression records where it appears in text.

use ahash::AHashSet;

use crate::ast::{Block, ExprKind, Stmt};
use crate::model::CodePosition;

pub fn collect_void_call_positions(body: &Block) -> AHashSet<CodePosition> {
    let mut set = AHashSet::new();
    walk_block(body, &mut set);
    set
}

fn walk_block(body: &Block, set: &mut AHashSet<CodePosition>) {
    for stmt in body {
        match stmt {
            Stmt::ExprStmt(e) => {
                if matches!(e.kind.as_ref(), ExprKind::Call { .. }) {
                    set.insert(e.pos);
                }
            }
            Stmt::If { then_body, else_body, .. } => {
                walk_block(then_body, set);
                walk_block(else_body, set);
            }
            Stmt::For { body, .. } | Stmt::ForRange { body, .. } => walk_block(body, set),
            Stmt::Switch { cases, .. } => cases.iter().for_each(|c| walk_block(&c.body, set)),
            Stmt::Block(inner) => walk_block(inner, set),
            _ => {}
        }
    }
}
