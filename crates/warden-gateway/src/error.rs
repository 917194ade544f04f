use std::time::Duration;

use warden_types::request::ExecutionMode;

use crate::planner::PlannerError;
use crate::security::Severity;

/// Failure modes of the chat gateway.
///
/// Policy outcomes (`IntentNotAllowed`, `ApprovalRequired`, `ApprovalInvalid`,
/// `OutputBlocked`, `InputRejected`, `RateLimited`) are expected and carry the
/// structure the caller needs to self-correct. Infrastructure failures
/// (`Planner`, `Internal`) are server faults.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("authentication required")]
    NotAuthenticated,

    #[error("agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    #[error("intent '{intent}' not allowed for agent {agent_id}")]
    IntentNotAllowed {
        agent_id: String,
        intent: String,
        allowed_intents: Vec<String>,
    },

    #[error("approval required before {execution_mode} execution")]
    ApprovalRequired { execution_mode: ExecutionMode },

    #[error("approval ticket '{approval_id}' invalid")]
    ApprovalInvalid { approval_id: String },

    #[error("agent output blocked by policy")]
    OutputBlocked { violations: Vec<String> },

    #[error("input rejected due to security concerns ({severity})")]
    InputRejected {
        violations: Vec<String>,
        severity: Severity,
    },

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("conversation not found")]
    ConversationNotFound,

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    /// Machine-readable code, mirrored into API payloads by callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "auth_required",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::IntentNotAllowed { .. } => "intent_not_allowed",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::ApprovalInvalid { .. } => "approval_invalid",
            Self::OutputBlocked { .. } => "output_blocked",
            Self::InputRejected { .. } => "security_violation",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::ConversationNotFound => "conversation_not_found",
            Self::Planner(_) => "planner_failed",
            Self::Internal(_) => "internal_server_error",
        }
    }

    /// True for caller-correctable policy outcomes; these are never logged
    /// as server faults.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Self::IntentNotAllowed { .. }
                | Self::ApprovalRequired { .. }
                | Self::ApprovalInvalid { .. }
                | Self::OutputBlocked { .. }
                | Self::InputRejected { .. }
                | Self::RateLimited { .. }
        )
    }
}
