//! Debug/ABI emitter (C10).
//!
//! Following `monty::bytecode::code::{LocationEntry, ExceptionEntry,
//! Code}`'s derive convention and compact-string range encoding
//! (`"start-end"`) directly.

use crate::model::{DebugSequencePoint, MethodDebugInfo, TypeTag};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EventDebugInfo {
    pub name: String,
    pub parameters: Vec<(String, TypeTag)>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InvokedContract {
    pub hash: String,
    pub methods: Vec<String>,
}

/// One debug-serializable method entry. Stored separately from
/// `MethodDebugInfo` so the compact string encodings (`"start-end"`,
/// `"name,Type"`) are an explicit serialization concern, not baked into
/// the in-memory model other passes compute over.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MethodEntry {
    pub id: u32,
    pub namespace: String,
    pub name: String,
    /// `"start-end"`.
    pub range: String,
    /// `"name,Type"` pairs.
    pub parameters: Vec<String>,
    pub variables: Vec<String>,
    pub return_type: String,
    pub sequence_points: Vec<String>,
}

impl From<&MethodDebugInfo> for MethodEntry {
    fn from(m: &MethodDebugInfo) -> Self {
        Self {
            id: m.id,
            namespace: m.namespace.clone(),
            name: m.name.clone(),
            range: format!("{}-{}", m.range.0, m.range.1),
            parameters: m.parameters.iter().map(|(n, t)| format!("{n},{t}")).collect(),
            variables: m.variables.iter().map(|(n, t)| format!("{n},{t}")).collect(),
            return_type: m.return_type.to_string(),
            sequence_points: m.sequence_points.iter().map(encode_sequence_point).collect(),
        }
    }
}

fn encode_sequence_point(sp: &DebugSequencePoint) -> String {
    format!(
        "{}[{}]{}:{}-{}:{}",
        sp.opcode_offset, sp.document, sp.start_line, sp.start_column, sp.end_line, sp.end_column
    )
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModuleDebugInfo {
    pub entry_point: String,
    pub documents: Vec<String>,
    pub methods: Vec<MethodEntry>,
    pub events: Vec<EventDebugInfo>,
    pub supported_standards: Vec<String>,
    pub invoked_contracts: Vec<InvokedContract>,
}

impl ModuleDebugInfo {
    pub fn build(
        entry_point: String,
        documents: Vec<String>,
        methods: &[MethodDebugInfo],
        events: Vec<EventDebugInfo>,
        invoked_contracts: Vec<InvokedContract>,
    ) -> Self {
        Self {
            entry_point,
            documents,
            methods: methods.iter().map(MethodEntry::from).collect(),
            events,
            supported_standards: Vec::new(),
            invoked_contracts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_encodes_as_compact_string() {
        let m = MethodDebugInfo {
            id: 0,
            namespace: "main".into(),
            name: "Main".into(),
            range: (0, 42),
            parameters: vec![("x".into(), TypeTag::Integer)],
            variables: vec![],
            return_type: TypeTag::Integer,
            sequence_points: vec![],
        };
        let entry = MethodEntry::from(&m);
        assert_eq!(entry.range, "0-42");
        assert_eq!(entry.parameters, vec!["x,Integer".to_string()]);
    }
}
