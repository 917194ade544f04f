use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied execution context for a chat message.
/// Only these fields survive sanitisation; anything else is dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestContext {
    pub execution_mode: Option<ExecutionMode>,
    pub approved: Option<bool>,
    pub approval_id: Option<String>,
    pub intent: Option<String>,
    pub intent_id: Option<String>,
    pub branch: Option<String>,
    pub tags: Vec<String>,
    pub changed_paths: Vec<String>,
    pub columns: Vec<String>,
}

impl RequestContext {
    /// Effective mode; anything that is not explicitly apply is plan.
    pub fn mode(&self) -> ExecutionMode {
        self.execution_mode.unwrap_or(ExecutionMode::Plan)
    }

    pub fn has_approval_flag(&self) -> bool {
        self.approved == Some(true)
    }

    pub fn approval_ticket(&self) -> Option<&str> {
        self.approval_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Plan,
    Apply,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// A quick action offered alongside an agent reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub label: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Suggestion {
    pub fn new(label: &str, action: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            label: label.to_string(),
            action: action.to_string(),
            params,
        }
    }

    pub fn set_intent(label: &str, intent: &str) -> Self {
        Self::new(label, "set_intent", Some(serde_json::json!({ "intent": intent })))
    }
}

/// Response returned by the gateway for one chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_plan() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.mode(), ExecutionMode::Plan);
        assert!(!ctx.has_approval_flag());
    }

    #[test]
    fn blank_ticket_is_absent() {
        let ctx = RequestContext {
            approval_id: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(ctx.approval_ticket().is_none());

        let ctx = RequestContext {
            approval_id: Some(" CAB-2025-0042 ".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.approval_ticket(), Some("CAB-2025-0042"));
    }

    #[test]
    fn context_deserializes_camel_case() {
        let ctx: RequestContext = serde_json::from_str(
            r#"{"executionMode":"apply","approved":true,"approvalId":"CAB-2025-0001","changedPaths":["db/a.sql"]}"#,
        )
        .unwrap();
        assert_eq!(ctx.mode(), ExecutionMode::Apply);
        assert!(ctx.has_approval_flag());
        assert_eq!(ctx.changed_paths, vec!["db/a.sql"]);
    }
}
