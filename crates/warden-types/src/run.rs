use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One dispatched agent execution, tracked to a terminal status.
/// Created in `Pending`; takes exactly one terminal transition to
/// `Success` or `Failed` and is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub agent_id: String,
    pub action: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub triggered_by: TriggeredBy,
}

impl RunRecord {
    pub fn pending(agent_id: &str, action: &str, triggered_by: TriggeredBy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            output: String::new(),
            exit_code: None,
            triggered_by,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Success | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("unknown run status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Manual,
    Cron,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Cron => write!(f, "cron"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            let s = status.to_string();
            let parsed: RunStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn pending_run_is_not_terminal() {
        let run = RunRecord::pending("agent_dba", "db-drift-check", TriggeredBy::Manual);
        assert_eq!(run.status, RunStatus::Pending);
        assert!(!run.is_terminal());
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn serializes_screaming_status() {
        let run = RunRecord::pending("agent_dba", "db-drift-check", TriggeredBy::Cron);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["triggeredBy"], "cron");
    }
}
