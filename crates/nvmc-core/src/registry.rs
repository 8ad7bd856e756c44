//! Function registry (C4): fully-qualified-name → `FunctionScope`.
//!
//! Names follow §4.4 exactly: `<package-path>.<Type>.<Method>` for methods
//! (the leading `*` of a pointer receiver is stripped), `<package-path>.<Func>`
//! for free functions. `init` collectors are concatenated into a generated
//! `_initialize` method by the caller (C5's top-level driver); `_deploy`
//! becomes the deploy method directly. Lambdas are registered as the
//! generator encounters them, named `lambda@<label-id>`, and compiled
//! after the enclosing function — the same "nested definitions are
//! visited as they are reached" rule `monty::Compiler::compile_stmt`
//! follows for nested `def`s.

use ahash::AHashMap;

use crate::ast::FuncDecl;
use crate::intern::FunctionId;
use crate::model::{FunctionScope, LabelId};

pub const INITIALIZE_NAME: &str = "_initialize";
pub const DEPLOY_NAME: &str = "_deploy";
pub const ENTRY_NAME: &str = "Main";

/// Builds the qualified name for a free function or method, per §4.4.
pub fn qualified_name(package_path: &str, receiver_type: Option<&str>, func_name: &str) -> String {
    match receiver_type {
        Some(ty) => format!("{package_path}.{ty}.{func_name}"),
        None => format!("{package_path}.{func_name}"),
    }
}

pub fn lambda_name(label_id: u16) -> String {
    format!("lambda@{label_id}")
}

/// Work queued by C5 while compiling the enclosing function; lambdas are
/// pushed here on encounter and drained after the current function body
/// finishes, so their own bodies are compiled after their enclosing
/// function's bytecode (§4.4).
/// One queued lambda: its synthesized name, the package/file context it was
/// captured in (a lambda has no receiver/package of its own), its
/// already-allocated entry label (so the `PUSHA` emitted at the lambda
/// expression's use site resolves to the same label its body eventually
/// binds), and its body.
pub struct QueuedLambda {
    pub name: String,
    pub package_path: String,
    pub declaring_file: String,
    pub entry_label: LabelId,
    pub decl: FuncDecl,
    /// Whether this lambda was the direct callee of a `defer <call>`
    /// statement (i.e. captured while `Codegen::inside_deferred_call()` was
    /// true). Its body is compiled after the enclosing function, at which
    /// point the call-depth counter that gates `recover()` has already
    /// unwound back to zero; this flag lets the drain loop re-arm it for
    /// exactly this lambda's own compilation (§4.7 step 3).
    pub is_deferred_body: bool,
}

#[derive(Debug, Default)]
pub struct PendingLambdas {
    queue: Vec<(String, String, String, LabelId, FuncDecl, bool)>,
}

impl PendingLambdas {
    pub fn push(&mut self, name: String, package_path: String, declaring_file: String, entry_label: LabelId, decl: FuncDecl, is_deferred_body: bool) {
        self.queue.push((name, package_path, declaring_file, entry_label, decl, is_deferred_body));
    }

    pub fn drain(&mut self) -> Vec<QueuedLambda> {
        std::mem::take(&mut self.queue)
            .into_iter()
            .map(|(name, package_path, declaring_file, entry_label, decl, is_deferred_body)| QueuedLambda {
                name,
                package_path,
                declaring_file,
                entry_label,
                decl,
                is_deferred_body,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    by_name: AHashMap<String, FunctionId>,
    scopes: Vec<FunctionScope>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, not-yet-compiled function scope and returns its
    /// id. The caller fills in `opcode_range`/`local_count`/etc. once
    /// compilation of the body completes.
    pub fn register(&mut self, scope: FunctionScope) -> FunctionId {
        let id = scope.id;
        self.by_name.insert(scope.qualified_name.clone(), id);
        self.scopes.push(scope);
        id
    }

    pub fn next_id(&self) -> FunctionId {
        FunctionId::new(self.scopes.len())
    }

    pub fn resolve(&self, qualified_name: &str) -> Option<FunctionId> {
        self.by_name.get(qualified_name).copied()
    }

    pub fn get(&self, id: FunctionId) -> &FunctionScope {
        &self.scopes[id.index()]
    }

    pub fn get_mut(&mut self, id: FunctionId) -> &mut FunctionScope {
        &mut self.scopes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionScope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
