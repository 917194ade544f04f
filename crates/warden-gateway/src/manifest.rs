//! Agent manifests and intent resolution.
//!
//! Manifests live at `agents/<agent_id>/manifest.json` and are re-read on
//! every call; the catalogue is external configuration and may change under
//! a running gateway.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use warden_types::manifest::{AgentInfo, AgentManifest, AgentStatus};
use warden_types::request::RequestContext;

static EXPLICIT_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:intent\s*:|/intent\s+)([A-Za-z0-9_.:-]+)\s*$")
        .expect("valid explicit intent regex")
});

pub struct ManifestStore {
    agents_path: PathBuf,
}

impl ManifestStore {
    pub fn new(agents_path: impl Into<PathBuf>) -> Self {
        Self {
            agents_path: agents_path.into(),
        }
    }

    fn manifest_path(&self, agent_id: &str) -> PathBuf {
        self.agents_path.join(agent_id).join("manifest.json")
    }

    /// Load one agent's manifest; `None` when the agent does not exist or
    /// its manifest is unreadable.
    pub fn load(&self, agent_id: &str) -> Option<AgentManifest> {
        let path = self.manifest_path(agent_id);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!(agent_id, %err, "skipping unparseable manifest");
                None
            }
        }
    }

    /// Declared intent allowlist; empty when the agent declares none.
    pub fn intent_allowlist(&self, agent_id: &str) -> Vec<String> {
        self.load(agent_id)
            .map(|m| m.primary_intents)
            .unwrap_or_default()
    }

    /// Scan `agents/*/manifest.json` for the catalogue, skipping dot
    /// directories and agents whose manifest cannot be read.
    pub fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let mut agents = Vec::new();
        let entries = std::fs::read_dir(&self.agents_path)
            .with_context(|| format!("failed to read agents dir {}", self.agents_path.display()))?;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let agent_id = entry.file_name().to_string_lossy().to_string();
            if agent_id.starts_with('.') {
                continue;
            }
            match self.load(&agent_id) {
                Some(manifest) => agents.push(summarize(&agent_id, &manifest)),
                None => warn!(agent_id, "skipping agent without readable manifest"),
            }
        }

        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    pub fn agent_info(&self, agent_id: &str) -> Option<AgentInfo> {
        let manifest = self.load(agent_id)?;
        let mut info = summarize(agent_id, &manifest);
        info.greeting = Some(manifest.greeting.unwrap_or_else(|| {
            format!("Hi! I'm {}. How can I help you?", info.name)
        }));
        Some(info)
    }

    /// Resolve the intent of a message, in order:
    /// 1. explicit `intent: <id>` / `/intent <id>` directive in the message;
    /// 2. intent carried in the request context;
    /// 3. first-match-wins keyword heuristic over the agent's declared
    ///    intents (non-deterministic under manifest reordering; kept as-is).
    pub fn resolve_intent(
        &self,
        agent_id: &str,
        message: &str,
        context: &RequestContext,
    ) -> Option<String> {
        if let Some(explicit) = extract_explicit_intent(message) {
            return Some(explicit);
        }
        if let Some(intent) = context.intent.as_deref().or(context.intent_id.as_deref()) {
            if !intent.is_empty() {
                return Some(intent.to_string());
            }
        }

        let manifest = self.load(agent_id)?;
        let text = message.to_lowercase();
        for intent in &manifest.primary_intents {
            if intent_keywords(intent).any(|kw| text.contains(kw)) {
                return Some(intent.clone());
            }
        }
        None
    }

    /// Quick-start suggestions offered when no intent resolves.
    pub fn default_intent_suggestions(&self, agent_id: &str) -> Vec<(String, String)> {
        self.intent_allowlist(agent_id)
            .into_iter()
            .take(2)
            .map(|intent| (format!("Run {intent}"), intent))
            .collect()
    }
}

fn summarize(agent_id: &str, manifest: &AgentManifest) -> AgentInfo {
    AgentInfo {
        id: agent_id.to_string(),
        name: manifest.name.clone().unwrap_or_else(|| agent_id.to_string()),
        status: AgentStatus::Online,
        capabilities: manifest.domains.clone(),
        description: manifest.description.clone().unwrap_or_default(),
        greeting: manifest.greeting.clone(),
        primary_intents: manifest.primary_intents.clone(),
        knowledge_sources: manifest.knowledge_sources.clone(),
    }
}

fn extract_explicit_intent(message: &str) -> Option<String> {
    EXPLICIT_INTENT_RE
        .captures(message)
        .map(|caps| caps[1].to_string())
}

/// Keyword vocabulary of an intent id: its segments, short connective
/// words dropped so `db-table-create` does not fire on every "db".
fn intent_keywords(intent: &str) -> impl Iterator<Item = &str> {
    intent
        .split(['-', '_', '.', ':'])
        .filter(|segment| segment.len() >= 4)
}
