//! Out-of-process planner invocation.
//!
//! The planner is an external executable that receives an intent and
//! context-derived flags and prints one JSON document. A hard wall-clock
//! timeout bounds the wait; a timed-out wait does not chase the process
//! beyond a kill attempt.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use warden_types::config::PlannerConfig;
use warden_types::request::RequestContext;

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("planner command is not configured")]
    NotConfigured,

    #[error("planner timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn planner: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("planner exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("planner produced malformed output: {0}")]
    Parse(#[source] serde_json::Error),
}

pub struct PlannerAdapter {
    command: Vec<String>,
    timeout: Duration,
}

impl PlannerAdapter {
    pub fn new(cfg: &PlannerConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }

    /// Produce a plan for `intent`. Timeout and parse failures are distinct
    /// so callers can report "slow" separately from "broken".
    pub async fn plan(&self, intent: &str, context: &RequestContext) -> Result<Value, PlannerError> {
        let (program, base_args) = self
            .command
            .split_first()
            .ok_or(PlannerError::NotConfigured)?;

        let mut cmd = Command::new(program);
        cmd.args(base_args);
        cmd.arg("--intent").arg(intent);
        if let Some(branch) = &context.branch {
            cmd.arg("--branch").arg(branch);
        }
        if !context.changed_paths.is_empty() {
            cmd.arg("--changedPaths").arg(context.changed_paths.join(","));
        }
        if !context.columns.is_empty() {
            cmd.arg("--columns").arg(context.columns.join(","));
        }
        if !context.tags.is_empty() {
            cmd.arg("--tags").arg(context.tags.join(","));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(intent, "invoking planner");

        let child = cmd.spawn().map_err(PlannerError::Spawn)?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PlannerError::Timeout(self.timeout))?
            .map_err(PlannerError::Spawn)?;

        if !output.status.success() {
            return Err(PlannerError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: Value =
            serde_json::from_slice(&output.stdout).map_err(PlannerError::Parse)?;

        // Planners may wrap the plan in a top-level envelope.
        Ok(match parsed.get("plan") {
            Some(plan) if !plan.is_null() => plan.clone(),
            _ => parsed,
        })
    }
}

/// Human-readable summary of a plan document for the chat reply.
pub fn format_plan_summary(plan: &Value) -> String {
    let intent = plan
        .get("intent")
        .and_then(|v| v.as_str())
        .unwrap_or("(unknown)");
    let recipe = plan.get("recipeId").and_then(|v| v.as_str());

    let mut lines = Vec::new();
    match recipe {
        Some(recipe) => lines.push(format!("Plan generated for intent: {intent} (recipe: {recipe})")),
        None => lines.push(format!("Plan generated for intent: {intent}")),
    }

    if let Some(suggestion) = plan.get("suggestion") {
        if let Some(action) = suggestion.get("action").and_then(|v| v.as_str()) {
            match suggestion.get("reason").and_then(|v| v.as_str()) {
                Some(reason) => lines.push(format!("Suggested action: {action} ({reason})")),
                None => lines.push(format!("Suggested action: {action}")),
            }
        }
    }

    let checklist: Vec<&str> = plan
        .get("checklistSuggestions")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .take(3)
                .filter_map(|c| {
                    c.get("name")
                        .and_then(|v| v.as_str())
                        .or_else(|| c.get("id").and_then(|v| v.as_str()))
                })
                .collect()
        })
        .unwrap_or_default();
    if !checklist.is_empty() {
        lines.push(format!("Recommended checklists: {}", checklist.join(", ")));
    }

    lines.push(format!("Example command: warden dispatch --intent {intent}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter(command: Vec<&str>, timeout_ms: u64) -> PlannerAdapter {
        PlannerAdapter::new(&PlannerConfig {
            command: command.into_iter().map(String::from).collect(),
            timeout_ms,
        })
    }

    #[tokio::test]
    async fn parses_planner_json() {
        let a = adapter(
            vec!["sh", "-c", r#"echo '{"plan":{"intent":"db-drift-check"}}' #"#],
            5_000,
        );
        let plan = a.plan("db-drift-check", &RequestContext::default()).await.unwrap();
        assert_eq!(plan["intent"], "db-drift-check");
    }

    #[tokio::test]
    async fn unwrapped_document_is_returned_as_is() {
        let a = adapter(vec!["sh", "-c", r#"echo '{"intent":"x"}' #"#], 5_000);
        let plan = a.plan("x", &RequestContext::default()).await.unwrap();
        assert_eq!(plan["intent"], "x");
    }

    #[tokio::test]
    async fn malformed_output_is_a_parse_error() {
        let a = adapter(vec!["sh", "-c", "echo not-json #"], 5_000);
        let err = a.plan("x", &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, PlannerError::Parse(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_is_distinct() {
        let a = adapter(vec!["sh", "-c", "echo oops >&2; exit 3 #"], 5_000);
        let err = a.plan("x", &RequestContext::default()).await.unwrap_err();
        match err {
            PlannerError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_planner_times_out() {
        let a = adapter(vec!["sh", "-c", "sleep 5 #"], 50);
        let err = a.plan("x", &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, PlannerError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let a = adapter(vec!["definitely-not-a-real-binary-xyz"], 5_000);
        let err = a.plan("x", &RequestContext::default()).await.unwrap_err();
        assert!(matches!(err, PlannerError::Spawn(_)));
    }

    #[test]
    fn summary_includes_recipe_and_checklists() {
        let plan = json!({
            "intent": "predeploy-checklist",
            "recipeId": "recipe-7",
            "suggestion": { "action": "review", "reason": "2 files changed" },
            "checklistSuggestions": [
                { "name": "Security review" },
                { "id": "chk-db" },
                { "name": "Docs" },
                { "name": "ignored, only top three" }
            ]
        });
        let summary = format_plan_summary(&plan);
        assert!(summary.contains("predeploy-checklist (recipe: recipe-7)"));
        assert!(summary.contains("Suggested action: review (2 files changed)"));
        assert!(summary.contains("Security review, chk-db, Docs"));
        assert!(!summary.contains("only top three"));
    }

    #[test]
    fn summary_handles_empty_plan() {
        let summary = format_plan_summary(&json!({}));
        assert!(summary.contains("(unknown)"));
    }
}
