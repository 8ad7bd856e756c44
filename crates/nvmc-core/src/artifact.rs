//! Produced artifacts (§6): the bytecode blob, call-token table,
//! debug-info, and manifest fragment a successful compilation hands back.

use crate::debug::{EventDebugInfo, InvokedContract, ModuleDebugInfo};
use crate::model::CallToken;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestFragment {
    pub events: Vec<EventDebugInfo>,
    pub invoked_contracts: Vec<InvokedContract>,
}

/// Everything one compilation produces, laid out exactly as executable
/// by the VM and serializable for the CLI to write to disk (§6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Artifact {
    pub bytecode: Vec<u8>,
    pub call_tokens: Vec<CallToken>,
    pub debug_info: Option<ModuleDebugInfo>,
    pub manifest: ManifestFragment,
}
