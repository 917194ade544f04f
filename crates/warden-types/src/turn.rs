use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One message in a tenant-scoped agent conversation.
/// Immutable once written; ordering within a conversation is by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub tenant_id: String,
    pub actor_id: String,
    pub agent_id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(
        tenant_id: &str,
        actor_id: &str,
        agent_id: &str,
        conversation_id: &str,
        role: Role,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            agent_id: agent_id.to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn user(
        tenant_id: &str,
        actor_id: &str,
        agent_id: &str,
        conversation_id: &str,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(tenant_id, actor_id, agent_id, conversation_id, Role::User, content, metadata)
    }

    pub fn agent(
        tenant_id: &str,
        actor_id: &str,
        agent_id: &str,
        conversation_id: &str,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(tenant_id, actor_id, agent_id, conversation_id, Role::Agent, content, metadata)
    }

    pub fn system(
        tenant_id: &str,
        actor_id: &str,
        agent_id: &str,
        conversation_id: &str,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            tenant_id,
            actor_id,
            agent_id,
            conversation_id,
            Role::System,
            content,
            serde_json::Value::Null,
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "system" => Ok(Self::System),
            _ => Err(anyhow::anyhow!("unknown role: {}", s)),
        }
    }
}

/// Summary row for a conversation list (most recent turn wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_event_time: DateTime<Utc>,
    pub last_message: Option<String>,
}
