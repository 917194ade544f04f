use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub chat: ChatConfig,
    pub approval: ApprovalConfig,
    pub planner: PlannerConfig,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub enforce_allowlist: bool,
    /// An agent manifest with no declared intents historically meant
    /// "unrestricted". That stays opt-in behind this flag.
    pub allow_all_when_unspecified: bool,
    pub redact_enabled: bool,
    pub max_message_len: usize,
    pub max_metadata_len: usize,
    pub require_approval_on_apply: bool,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enforce_allowlist: true,
            allow_all_when_unspecified: false,
            redact_enabled: true,
            max_message_len: 4000,
            max_metadata_len: 4000,
            require_approval_on_apply: true,
            rate_limit_window_ms: 60_000,
            rate_limit_max: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Structural check applied before any network validation.
    pub ticket_pattern: String,
    /// External approval authority; empty disables the round-trip.
    pub validate_url: String,
    pub validate_method: String,
    pub validate_header: String,
    pub validate_token: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            ticket_pattern: r"^CAB-\d{4}-\d{4}$".to_string(),
            validate_url: String::new(),
            validate_method: "GET".to_string(),
            validate_header: String::new(),
            validate_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Planner executable and leading arguments, e.g. ["node", "agents/core/orchestrator.js"].
    pub command: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string(), "agents/core/orchestrator.js".to_string()],
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// "simulated" completes runs without spawning; "process" spawns the
    /// per-agent runner script.
    pub backend: String,
    pub agents_path: String,
    pub max_runs: usize,
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: "simulated".to_string(),
            agents_path: "agents".to_string(),
            max_runs: 200,
            max_output_bytes: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_governance_posture() {
        let cfg = WardenConfig::default();
        assert!(cfg.chat.enforce_allowlist);
        assert!(!cfg.chat.allow_all_when_unspecified);
        assert!(cfg.chat.require_approval_on_apply);
        assert_eq!(cfg.chat.max_message_len, 4000);
        assert_eq!(cfg.approval.validate_method, "GET");
        assert_eq!(cfg.runner.max_runs, 200);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: WardenConfig = toml::from_str("[chat]\nrate_limit_max = 5\n").unwrap();
        assert_eq!(cfg.chat.rate_limit_max, 5);
        assert_eq!(cfg.chat.rate_limit_window_ms, 60_000);
        assert_eq!(cfg.runner.backend, "simulated");
    }
}
