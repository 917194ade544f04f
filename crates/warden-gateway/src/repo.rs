//! Tenant-scoped conversation persistence.
//!
//! Every query is keyed by the full `(tenant, actor, agent)` tuple; there is
//! no code path that reads across tenants. Deletion is logical: a marker row
//! hides the conversation from reads while the turns stay on disk.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use warden_types::turn::{ConversationSummary, ConversationTurn};

/// Identifies one conversation owner. All repo calls are scoped by it.
#[derive(Debug, Clone)]
pub struct ConversationScope {
    pub tenant_id: String,
    pub actor_id: String,
    pub agent_id: String,
}

impl ConversationScope {
    pub fn new(tenant_id: &str, actor_id: &str, agent_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            agent_id: agent_id.to_string(),
        }
    }
}

/// One page of a conversation read. `deleted` reports the soft-delete
/// marker; callers treat deleted the same as absent.
#[derive(Debug)]
pub struct ConversationPage {
    pub deleted: bool,
    pub turns: Vec<ConversationTurn>,
}

#[async_trait]
pub trait ConversationRepo: Send + Sync {
    async fn log_message(&self, turn: &ConversationTurn) -> Result<()>;

    async fn list_conversations(
        &self,
        scope: &ConversationScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationSummary>, i64)>;

    async fn get_conversation(
        &self,
        scope: &ConversationScope,
        conversation_id: &str,
    ) -> Result<ConversationPage>;

    /// Soft delete; returns false when the conversation has no turns.
    async fn delete_conversation(
        &self,
        scope: &ConversationScope,
        conversation_id: &str,
    ) -> Result<bool>;
}

pub struct SqliteConversationRepo {
    conn: Mutex<Connection>,
}

impl SqliteConversationRepo {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init_tables()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.init_tables()?;
        Ok(repo)
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_turns (
                id              TEXT PRIMARY KEY,
                tenant_id       TEXT NOT NULL,
                actor_id        TEXT NOT NULL,
                agent_id        TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                metadata_json   TEXT NOT NULL DEFAULT 'null',
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_turns_scope
                ON chat_turns(tenant_id, actor_id, agent_id, conversation_id, created_at);

            CREATE TABLE IF NOT EXISTS deleted_conversations (
                tenant_id       TEXT NOT NULL,
                actor_id        TEXT NOT NULL,
                agent_id        TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                deleted_at      TEXT NOT NULL,
                PRIMARY KEY (tenant_id, actor_id, agent_id, conversation_id)
            );",
        )?;
        Ok(())
    }

    fn is_deleted(
        conn: &Connection,
        scope: &ConversationScope,
        conversation_id: &str,
    ) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deleted_conversations
             WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3 AND conversation_id = ?4",
            params![scope.tenant_id, scope.actor_id, scope.agent_id, conversation_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[async_trait]
impl ConversationRepo for SqliteConversationRepo {
    async fn log_message(&self, turn: &ConversationTurn) -> Result<()> {
        if turn.tenant_id.trim().is_empty() {
            anyhow::bail!("refusing to persist a turn without a tenant id");
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chat_turns
                (id, tenant_id, actor_id, agent_id, conversation_id, role, content, metadata_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                turn.id.to_string(),
                turn.tenant_id,
                turn.actor_id,
                turn.agent_id,
                turn.conversation_id,
                turn.role.to_string(),
                turn.content,
                serde_json::to_string(&turn.metadata)?,
                turn.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn list_conversations(
        &self,
        scope: &ConversationScope,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ConversationSummary>, i64)> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT conversation_id) FROM chat_turns
             WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3
               AND conversation_id NOT IN (
                   SELECT conversation_id FROM deleted_conversations
                   WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3)",
            params![scope.tenant_id, scope.actor_id, scope.agent_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT conversation_id, MAX(created_at) AS last_event, content
             FROM chat_turns
             WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3
               AND conversation_id NOT IN (
                   SELECT conversation_id FROM deleted_conversations
                   WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3)
             GROUP BY conversation_id
             ORDER BY last_event DESC
             LIMIT ?4 OFFSET ?5",
        )?;
        let rows = stmt.query_map(
            params![scope.tenant_id, scope.actor_id, scope.agent_id, limit, offset],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;

        let mut conversations = Vec::new();
        for row in rows {
            let (conversation_id, last_event, last_message) = row?;
            conversations.push(ConversationSummary {
                conversation_id,
                last_event_time: chrono::DateTime::parse_from_rfc3339(&last_event)?
                    .with_timezone(&Utc),
                last_message,
            });
        }
        Ok((conversations, total))
    }

    async fn get_conversation(
        &self,
        scope: &ConversationScope,
        conversation_id: &str,
    ) -> Result<ConversationPage> {
        let conn = self.conn.lock().unwrap();
        if Self::is_deleted(&conn, scope, conversation_id)? {
            return Ok(ConversationPage {
                deleted: true,
                turns: Vec::new(),
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, role, content, metadata_json, created_at
             FROM chat_turns
             WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3 AND conversation_id = ?4
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(
            params![scope.tenant_id, scope.actor_id, scope.agent_id, conversation_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )?;

        let mut turns = Vec::new();
        for row in rows {
            let (id, role, content, metadata_json, created_at) = row?;
            turns.push(ConversationTurn {
                id: id.parse().context("invalid turn id")?,
                tenant_id: scope.tenant_id.clone(),
                actor_id: scope.actor_id.clone(),
                agent_id: scope.agent_id.clone(),
                conversation_id: conversation_id.to_string(),
                role: role.parse().context("invalid role")?,
                content,
                metadata: serde_json::from_str(&metadata_json)?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?
                    .with_timezone(&Utc),
            });
        }
        Ok(ConversationPage {
            deleted: false,
            turns,
        })
    }

    async fn delete_conversation(
        &self,
        scope: &ConversationScope,
        conversation_id: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_turns
             WHERE tenant_id = ?1 AND actor_id = ?2 AND agent_id = ?3 AND conversation_id = ?4",
            params![scope.tenant_id, scope.actor_id, scope.agent_id, conversation_id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT OR IGNORE INTO deleted_conversations
                (tenant_id, actor_id, agent_id, conversation_id, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                scope.tenant_id,
                scope.actor_id,
                scope.agent_id,
                conversation_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_types::turn::Role;

    fn repo() -> SqliteConversationRepo {
        SqliteConversationRepo::open_in_memory().unwrap()
    }

    fn scope(tenant: &str) -> ConversationScope {
        ConversationScope::new(tenant, "alice", "agent_dba")
    }

    async fn log(repo: &SqliteConversationRepo, tenant: &str, conv: &str, content: &str) {
        let turn = ConversationTurn::user(tenant, "alice", "agent_dba", conv, content, json!(null));
        repo.log_message(&turn).await.unwrap();
    }

    #[tokio::test]
    async fn roundtrips_turns_in_order() {
        let repo = repo();
        log(&repo, "t1", "conv-1", "first").await;
        log(&repo, "t1", "conv-1", "second").await;

        let page = repo.get_conversation(&scope("t1"), "conv-1").await.unwrap();
        assert!(!page.deleted);
        assert_eq!(page.turns.len(), 2);
        assert_eq!(page.turns[0].content, "first");
        assert_eq!(page.turns[0].role, Role::User);
        assert_eq!(page.turns[1].content, "second");
    }

    #[tokio::test]
    async fn rejects_empty_tenant() {
        let repo = repo();
        let turn = ConversationTurn::user("", "alice", "agent_dba", "conv-1", "x", json!(null));
        assert!(repo.log_message(&turn).await.is_err());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let repo = repo();
        log(&repo, "t1", "conv-1", "tenant one data").await;

        let page = repo.get_conversation(&scope("t2"), "conv-1").await.unwrap();
        assert!(page.turns.is_empty());

        let (convs, total) = repo.list_conversations(&scope("t2"), 10, 0).await.unwrap();
        assert!(convs.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn soft_delete_hides_but_keeps_rows() {
        let repo = repo();
        log(&repo, "t1", "conv-1", "hello").await;

        assert!(repo.delete_conversation(&scope("t1"), "conv-1").await.unwrap());

        let page = repo.get_conversation(&scope("t1"), "conv-1").await.unwrap();
        assert!(page.deleted);
        assert!(page.turns.is_empty());

        // The physical rows are still there.
        let conn = repo.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_turns", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn delete_missing_conversation_reports_not_found() {
        let repo = repo();
        assert!(!repo.delete_conversation(&scope("t1"), "conv-404").await.unwrap());
    }

    #[tokio::test]
    async fn listing_pages_most_recent_first() {
        let repo = repo();
        log(&repo, "t1", "conv-1", "old").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        log(&repo, "t1", "conv-2", "new").await;

        let (convs, total) = repo.list_conversations(&scope("t1"), 1, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].conversation_id, "conv-2");
        assert_eq!(convs[0].last_message.as_deref(), Some("new"));

        let (convs, _) = repo.list_conversations(&scope("t1"), 1, 1).await.unwrap();
        assert_eq!(convs[0].conversation_id, "conv-1");
    }

    #[tokio::test]
    async fn deleted_conversations_leave_the_listing() {
        let repo = repo();
        log(&repo, "t1", "conv-1", "a").await;
        log(&repo, "t1", "conv-2", "b").await;
        repo.delete_conversation(&scope("t1"), "conv-1").await.unwrap();

        let (convs, total) = repo.list_conversations(&scope("t1"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(convs[0].conversation_id, "conv-2");
    }
}
