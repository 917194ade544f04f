use serde::{Deserialize, Serialize};

/// Per-agent manifest, read from `agents/<agent_id>/manifest.json`.
/// External read-only configuration; the governance core never writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    /// Declared intent allowlist. Empty means the agent declared nothing;
    /// whether that grants everything is a gateway configuration decision.
    #[serde(default)]
    pub primary_intents: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub knowledge_sources: Vec<String>,
    /// Actions the runner may execute, in manifest order.
    #[serde(default, alias = "allowedActions")]
    pub actions: Vec<ManifestAction>,
}

/// Manifest actions appear either as bare strings or objects with an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestAction {
    Id(String),
    Detailed {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl ManifestAction {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(s) => Some(s),
            Self::Detailed { id, name } => id.as_deref().or(name.as_deref()),
        }
    }
}

impl AgentManifest {
    /// First runnable action, used when a dispatch names no action.
    pub fn first_action(&self) -> Option<&str> {
        self.actions.iter().find_map(|a| a.id())
    }
}

/// Agent summary exposed to callers (catalogue entries and info lookups).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    #[serde(default)]
    pub primary_intents: Vec<String>,
    #[serde(default)]
    pub knowledge_sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_with_string_actions() {
        let manifest: AgentManifest = serde_json::from_str(
            r#"{
                "name": "DBA Agent",
                "primary_intents": ["db-table-create", "db-drift-check"],
                "actions": ["drift-check", {"id": "table-create"}]
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.primary_intents.len(), 2);
        assert_eq!(manifest.first_action(), Some("drift-check"));
        assert_eq!(manifest.actions[1].id(), Some("table-create"));
    }

    #[test]
    fn empty_manifest_defaults() {
        let manifest: AgentManifest = serde_json::from_str("{}").unwrap();
        assert!(manifest.primary_intents.is_empty());
        assert!(manifest.first_action().is_none());
    }
}
