//! Usage (reachability) analysis (C8).
//!
//! New functionality: `monty` has no tree-shaking (a REPL/interpreter has
//! no reason to prune code). The fixpoint-worklist shape here — push
//! roots, pop until empty, mark-visited — follows the same general idiom
//! `monty`'s own `Namespaces::iter_heap_ids` GC-root enumeration uses for
//! its (different) mark-reachable problem.

use ahash::{AHashMap, AHashSet};

use crate::ast::{Callee, Expr, ExprKind, FuncDecl, Stmt, UnOp};
use crate::registry::{DEPLOY_NAME, ENTRY_NAME};

/// One discovered (not yet necessarily reachable) function, keyed by its
/// already-qualified name (§4.4's naming scheme).
pub struct DiscoveredFunction<'a> {
    pub qualified_name: String,
    pub decl: &'a FuncDecl,
}

#[derive(Debug, Default)]
pub struct UsageResult {
    pub reachable_functions: AHashSet<String>,
    pub reachable_globals: AHashSet<String>,
}

/// Computes the usage closure from the roots named in §4.8: the entry
/// function, exported methods (when the contract has no explicit
/// `Main`), `init`/`_initialize`, `_deploy`, and any function referenced
/// via `&fn`.
pub fn analyze(functions: &[DiscoveredFunction<'_>]) -> UsageResult {
    let mut calls_of: AHashMap<&str, Vec<String>> = AHashMap::new();
    let mut globals_of: AHashMap<&str, Vec<String>> = AHashMap::new();
    for f in functions {
        let mut calls = Vec::new();
        let mut globals = Vec::new();
        collect_calls_and_globals(&f.decl.body, &mut calls, &mut globals);
        calls_of.insert(f.qualified_name.as_str(), calls);
        globals_of.insert(f.qualified_name.as_str(), globals);
    }

    let has_main = functions.iter().any(|f| f.qualified_name.ends_with(&format!(".{ENTRY_NAME}")));
    let mut worklist: Vec<String> = Vec::new();
    for f in functions {
        let is_root = f.qualified_name.ends_with(&format!(".{ENTRY_NAME}"))
            || f.qualified_name.ends_with(&format!(".{DEPLOY_NAME}"))
            || f.qualified_name.ends_with(".init")
            || f.qualified_name.ends_with("._initialize")
            || (!has_main && is_exported_toplevel(&f.qualified_name));
        if is_root {
            worklist.push(f.qualified_name.clone());
        }
    }

    let mut result = UsageResult::default();
    while let Some(name) = worklist.pop() {
        if !result.reachable_functions.insert(name.clone()) {
            continue;
        }
        if let Some(calls) = calls_of.get(name.as_str()) {
            for callee in calls {
                if !result.reachable_functions.contains(callee) {
                    worklist.push(callee.clone());
                }
            }
        }
        if let Some(globals) = globals_of.get(name.as_str()) {
            result.reachable_globals.extend(globals.iter().cloned());
        }
    }
    result
}

/// Returns `true` for an exported (capitalized) top-level name — used
/// only when no `Main` function exists, per §4.8.
fn is_exported_toplevel(qualified_name: &str) -> bool {
    qualified_name
        .rsplit('.')
        .next()
        .map(|last| last.chars().next().is_some_and(char::is_uppercase))
        .unwrap_or(false)
}

/// Walks a function body collecting every call target (by resolved
/// qualified name — the front end has already resolved `Callee::Function`
/// to one) and every bare identifier reference (a superset of package-level
/// variable references; codegen is the one that knows which identifiers
/// are actually globals once scopes are walked, so this pass
/// over-approximates and that is fine for reachability).
pub fn collect_calls_and_globals(body: &[Stmt], calls: &mut Vec<String>, globals: &mut Vec<String>) {
    for stmt in body {
        walk_stmt(stmt, calls, globals);
    }
}

fn walk_stmt(stmt: &Stmt, calls: &mut Vec<String>, globals: &mut Vec<String>) {
    match stmt {
        Stmt::ExprStmt(e) | Stmt::Defer { call: e, .. } => walk_expr(e, calls, globals),
        Stmt::Define { value, .. } => walk_expr(value, calls, globals),
        Stmt::Assign { targets, value, .. } => {
            walk_expr(value, calls, globals);
            for t in targets {
                if let crate::ast::LValue::Selector { base, .. } | crate::ast::LValue::Index { base, .. } = t {
                    walk_expr(base, calls, globals);
                }
            }
        }
        Stmt::CompoundAssign { value, .. } => walk_expr(value, calls, globals),
        Stmt::Return { values, .. } => values.iter().for_each(|v| walk_expr(v, calls, globals)),
        Stmt::If { cond, then_body, else_body, .. } => {
            walk_expr(cond, calls, globals);
            collect_calls_and_globals(then_body, calls, globals);
            collect_calls_and_globals(else_body, calls, globals);
        }
        Stmt::For { init, cond, post, body, .. } => {
            if let Some(s) = init {
                walk_stmt(s, calls, globals);
            }
            if let Some(c) = cond {
                walk_expr(c, calls, globals);
            }
            if let Some(s) = post {
                walk_stmt(s, calls, globals);
            }
            collect_calls_and_globals(body, calls, globals);
        }
        Stmt::ForRange { collection, body, .. } => {
            walk_expr(collection, calls, globals);
            collect_calls_and_globals(body, calls, globals);
        }
        Stmt::Switch { tag, cases, .. } => {
            if let Some(t) = tag {
                walk_expr(t, calls, globals);
            }
            for case in cases {
                case.values.iter().for_each(|v| walk_expr(v, calls, globals));
                collect_calls_and_globals(&case.body, calls, globals);
            }
        }
        Stmt::Block(body) => collect_calls_and_globals(body, calls, globals),
        Stmt::Break | Stmt::Continue | Stmt::Fallthrough => {}
    }
}

fn walk_expr(expr: &Expr, calls: &mut Vec<String>, globals: &mut Vec<String>) {
    match expr.kind.as_ref() {
        ExprKind::Ident(name) => globals.push(name.clone()),
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, calls, globals);
            walk_expr(rhs, calls, globals);
        }
        ExprKind::Unary { op, operand } => {
            // `&fn` is a usage root per §4.8: a bare identifier under `&`
            // that isn't a struct literal is treated as a function-value
            // reference for reachability purposes (codegen separately
            // rejects it as a value unless it resolves to a callable).
            if matches!(op, UnOp::AddrOf) {
                if let ExprKind::Ident(name) = operand.kind.as_ref() {
                    calls.push(name.clone());
                    return;
                }
            }
            walk_expr(operand, calls, globals);
        }
        ExprKind::Selector { base, .. } => walk_expr(base, calls, globals),
        ExprKind::Index { base, index } => {
            walk_expr(base, calls, globals);
            walk_expr(index, calls, globals);
        }
        ExprKind::StructLiteral { fields, .. } => {
            for f in fields {
                match f {
                    crate::ast::CompositeField::Positional(e) | crate::ast::CompositeField::Keyed(_, e) => {
                        walk_expr(e, calls, globals)
                    }
                }
            }
        }
        ExprKind::MapLiteral { entries } => {
            for (k, v) in entries {
                walk_expr(k, calls, globals);
                walk_expr(v, calls, globals);
            }
        }
        ExprKind::ByteSliceLiteral(elems) | ExprKind::SliceLiteral(elems) => {
            elems.iter().for_each(|e| walk_expr(e, calls, globals));
        }
        ExprKind::Call { callee, args, .. } => {
            match callee {
                Callee::Function(name) => calls.push(name.clone()),
                Callee::Qualified { .. } | Callee::Builtin(_) | Callee::Contract { .. } => {}
                Callee::Value(e) => walk_expr(e, calls, globals),
            }
            args.iter().for_each(|a| walk_expr(a, calls, globals));
        }
        ExprKind::Lambda { body, .. } => collect_calls_and_globals(body, calls, globals),
        ExprKind::TypeConversion { operand, .. } => walk_expr(operand, calls, globals),
        ExprKind::Literal(_) | ExprKind::Nil => {}
    }
}
