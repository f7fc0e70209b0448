//! The operation catalog clients discover operations from.

use serde::Serialize;
use serde_json::Value;

use courier_core::{ApprovalMode, RiskLevel};
use courier_registry::MethodRegistry;

/// One catalog entry: everything a client needs to call an operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationInfo {
    /// Operation name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Risk classification.
    pub risk: RiskLevel,
    /// Approval required before execution.
    pub approval: ApprovalMode,
    /// JSON-Schema object for the arguments.
    pub input_schema: Value,
}

/// The full catalog, in registry order.
#[must_use]
pub fn catalog(registry: &MethodRegistry) -> Vec<OperationInfo> {
    registry
        .iter()
        .map(|descriptor| OperationInfo {
            name: descriptor.name,
            description: descriptor.description,
            risk: descriptor.risk,
            approval: descriptor.approval,
            input_schema: descriptor.input_schema(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_registry() {
        let registry = MethodRegistry::builtin();
        let entries = catalog(&registry);
        assert_eq!(entries.len(), registry.len());
        assert!(entries.iter().any(|e| e.name == "send_message"));
        assert!(entries.iter().any(|e| e.name == "session_status"));
    }

    #[test]
    fn test_entries_serialize_with_schema() {
        let registry = MethodRegistry::builtin();
        let entries = catalog(&registry);
        let send = entries.iter().find(|e| e.name == "send_message").unwrap();

        let json = serde_json::to_value(send).unwrap();
        assert_eq!(json["risk"], "write");
        assert_eq!(json["input_schema"]["properties"]["chat_id"]["type"], "integer");
        assert_eq!(json["input_schema"]["additionalProperties"], false);
    }
}
