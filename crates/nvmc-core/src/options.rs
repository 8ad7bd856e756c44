//! Compile-time configuration (SPEC_FULL §3: "Configuration").
//!
//! No config *files*: this crate is a library plus a thin CLI, not a
//! long-running service, so options are plain struct fields set by the CLI
//! from flags rather than loaded from a config layer.

/// Toggles for the passes that are safe to disable, primarily so tests can
/// demonstrate that disabling them changes observable output (and is
/// therefore load-bearing, not vestigial).
#[derive(Debug, Clone, Copy)]
pub struct CodegenOptions {
    /// Run C9's peephole long-to-short jump compression. Disabling this
    /// still produces correct, executable bytecode — every jump remains in
    /// long form — just larger.
    pub peephole_compression: bool,
    /// Emit `debug::ModuleDebugInfo` at all. Disabling this skips C10
    /// entirely; the bytecode and call-token table are unaffected.
    pub emit_debug_info: bool,
    /// Sort package iteration lexicographically by path (§5's determinism
    /// guarantee). Exists so a test can disable it and show that output
    /// then depends on input package order — i.e. that the sort is load
    /// bearing, not redundant with some other stable order.
    pub deterministic_package_order: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            peephole_compression: true,
            emit_debug_info: true,
            deterministic_package_order: true,
        }
    }
}
