pub mod approval;
pub mod config;
pub mod error;
pub mod isolation;
pub mod manifest;
pub mod planner;
pub mod ratelimit;
pub mod repo;
pub mod runs;
pub mod sanitize;
pub mod security;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use warden_types::config::WardenConfig;
use warden_types::manifest::{AgentInfo, AgentManifest};
use warden_types::request::{ChatResponse, RequestContext, Suggestion};
use warden_types::run::{RunRecord, TriggeredBy};
use warden_types::turn::{ConversationSummary, ConversationTurn};

use approval::ApprovalGate;
use error::ChatError;
use isolation::TenantGuard;
use manifest::ManifestStore;
use planner::{format_plan_summary, PlannerAdapter};
use ratelimit::RateLimiter;
use repo::{ConversationRepo, ConversationScope};
use runs::{RunManager, RunStore};
use sanitize::Sanitizer;

/// Authenticated caller. Requests without one are rejected before any
/// other processing.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub actor_id: String,
}

impl Identity {
    pub fn new(tenant_id: &str, actor_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListing {
    pub conversations: Vec<ConversationSummary>,
    pub total: i64,
    pub has_more: bool,
}

/// Composition root. Every inbound agent interaction passes through here:
/// admission control, sanitisation, the intent allowlist, approval gating,
/// planning, and tenant-scoped persistence.
pub struct Gateway {
    config: WardenConfig,
    repo: Arc<dyn ConversationRepo>,
    manifests: ManifestStore,
    sanitizer: Sanitizer,
    rate_limiter: RateLimiter,
    approvals: ApprovalGate,
    planner: PlannerAdapter,
    runs: RunManager,
    tenant_guard: TenantGuard,
}

impl Gateway {
    pub fn new(
        config: WardenConfig,
        repo: Arc<dyn ConversationRepo>,
        run_store: Arc<dyn RunStore>,
    ) -> Result<Self> {
        let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
        Ok(Self {
            manifests: ManifestStore::new(&config.runner.agents_path),
            sanitizer: Sanitizer::new(&config.chat),
            rate_limiter: RateLimiter::new(
                Duration::from_millis(config.chat.rate_limit_window_ms),
                config.chat.rate_limit_max,
            ),
            approvals: ApprovalGate::new(&config.approval),
            planner: PlannerAdapter::new(&config.planner),
            runs: RunManager::from_config(&config.runner, run_store),
            tenant_guard: TenantGuard::new(base_dir),
            config,
            repo,
        })
    }

    /// Path checks for file operations done on a tenant's behalf.
    pub fn tenant_guard(&self) -> &TenantGuard {
        &self.tenant_guard
    }

    // Chat

    pub async fn send_message(
        &self,
        identity: Option<&Identity>,
        agent_id: &str,
        message: &str,
        conversation_id: Option<&str>,
        context: &RequestContext,
    ) -> Result<ChatResponse, ChatError> {
        let identity = require_identity(identity)?;

        if let Err(retry_after) = self
            .rate_limiter
            .check(&identity.tenant_id, &identity.actor_id)
        {
            return Err(ChatError::RateLimited { retry_after });
        }

        let input_check = security::validate_agent_input(message);
        if input_check.blocks_input() {
            warn!(
                agent_id,
                severity = %input_check.severity,
                violations = ?input_check.violations,
                "inbound message rejected"
            );
            return Err(ChatError::InputRejected {
                violations: input_check.violations,
                severity: input_check.severity,
            });
        }
        if !input_check.is_valid {
            warn!(
                agent_id,
                severity = %input_check.severity,
                violations = ?input_check.violations,
                "inbound message admitted with warnings"
            );
        }

        let manifest = self
            .manifests
            .load(agent_id)
            .ok_or_else(|| ChatError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })?;

        let conv_id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(new_conversation_id);
        let clean_message = self.sanitizer.sanitize_text(message);
        let clean_context = self.sanitizer.sanitize_context(context);

        let reply = self
            .invoke_agent(agent_id, &manifest, &clean_message, &clean_context)
            .await?;

        let scope = ConversationScope::new(&identity.tenant_id, &identity.actor_id, agent_id);
        self.persist_exchange(&scope, &conv_id, &clean_message, &clean_context, &reply)
            .await?;

        let outbound = json!({
            "message": reply.message,
            "metadata": reply.metadata,
            "suggestions": reply.suggestions,
        });
        let output_check = security::validate_agent_output(&outbound);
        if !output_check.is_valid {
            warn!(
                agent_id,
                tenant_id = %identity.tenant_id,
                violations = ?output_check.violations,
                "agent output blocked by policy"
            );
            return Err(ChatError::OutputBlocked {
                violations: output_check.violations,
            });
        }

        Ok(ChatResponse {
            conversation_id: conv_id,
            message: self.sanitizer.sanitize_text(&reply.message),
            suggestions: reply.suggestions,
            timestamp: Utc::now(),
            metadata: reply.metadata,
        })
    }

    async fn invoke_agent(
        &self,
        agent_id: &str,
        manifest: &AgentManifest,
        message: &str,
        context: &RequestContext,
    ) -> Result<AgentReply, ChatError> {
        let Some(intent) = self.manifests.resolve_intent(agent_id, message, context) else {
            return Ok(self.clarification_reply(agent_id));
        };

        if self.config.chat.enforce_allowlist {
            let allowed = &manifest.primary_intents;
            let permitted = if allowed.is_empty() {
                self.config.chat.allow_all_when_unspecified
            } else {
                allowed.contains(&intent)
            };
            if !permitted {
                return Err(ChatError::IntentNotAllowed {
                    agent_id: agent_id.to_string(),
                    intent,
                    allowed_intents: allowed.clone(),
                });
            }
        }

        let mode = context.mode();
        if self.approvals.requires_approval(mode) && self.config.chat.require_approval_on_apply {
            let ticket = match context.approval_ticket() {
                Some(ticket) if context.has_approval_flag() => ticket,
                _ => {
                    return Err(ChatError::ApprovalRequired {
                        execution_mode: mode,
                    })
                }
            };
            if !self.approvals.validate(ticket).await {
                return Err(ChatError::ApprovalInvalid {
                    approval_id: ticket.to_string(),
                });
            }
        }

        let plan = self.planner.plan(&intent, context).await.map_err(|err| {
            error!(agent_id, intent, %err, "planner invocation failed");
            ChatError::Planner(err)
        })?;

        let mut suggestions = Vec::new();
        if plan.get("suggestion").is_some() {
            suggestions.push(Suggestion::new(
                "Open plan (JSON)",
                "show_plan",
                Some(json!({ "intent": intent })),
            ));
        }
        suggestions.push(Suggestion::new(
            "Execute via runner",
            "run_action",
            Some(json!({ "intent": intent })),
        ));

        info!(agent_id, intent, mode = %mode, "plan produced");

        Ok(AgentReply {
            message: format_plan_summary(&plan),
            suggestions,
            metadata: json!({
                "confidence": 0.85,
                "intent": intent,
                "agentId": agent_id,
                "plan": plan,
                "executionMode": mode.to_string(),
            }),
        })
    }

    fn clarification_reply(&self, agent_id: &str) -> AgentReply {
        let suggestions = self
            .manifests
            .default_intent_suggestions(agent_id)
            .into_iter()
            .map(|(label, intent)| Suggestion::set_intent(&label, &intent))
            .collect();
        AgentReply {
            message: "To continue, name an intent (e.g. `intent: predeploy-checklist`) \
                      or use the agent's quick actions."
                .to_string(),
            suggestions,
            metadata: json!({ "confidence": 0.4, "agentId": agent_id }),
        }
    }

    async fn persist_exchange(
        &self,
        scope: &ConversationScope,
        conv_id: &str,
        user_message: &str,
        context: &RequestContext,
        reply: &AgentReply,
    ) -> Result<(), ChatError> {
        let user_turn = ConversationTurn::user(
            &scope.tenant_id,
            &scope.actor_id,
            &scope.agent_id,
            conv_id,
            user_message,
            json!({ "context": context }),
        );
        self.repo.log_message(&user_turn).await?;

        let agent_turn = ConversationTurn::agent(
            &scope.tenant_id,
            &scope.actor_id,
            &scope.agent_id,
            conv_id,
            self.sanitizer.sanitize_text(&reply.message),
            self.sanitizer.sanitize_response_metadata(&reply.metadata),
        );
        self.repo.log_message(&agent_turn).await?;
        Ok(())
    }

    // Conversations

    pub async fn get_conversations(
        &self,
        identity: Option<&Identity>,
        agent_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<ConversationListing, ChatError> {
        let identity = require_identity(identity)?;
        let scope = ConversationScope::new(&identity.tenant_id, &identity.actor_id, agent_id);
        let (conversations, total) = self.repo.list_conversations(&scope, limit, offset).await?;
        Ok(ConversationListing {
            conversations,
            total,
            has_more: offset + limit < total,
        })
    }

    /// Not-found covers both conversations that never existed and ones that
    /// were soft-deleted; callers cannot tell the difference.
    pub async fn get_conversation(
        &self,
        identity: Option<&Identity>,
        agent_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>, ChatError> {
        let identity = require_identity(identity)?;
        let scope = ConversationScope::new(&identity.tenant_id, &identity.actor_id, agent_id);
        let page = self.repo.get_conversation(&scope, conversation_id).await?;
        if page.deleted || page.turns.is_empty() {
            return Err(ChatError::ConversationNotFound);
        }
        Ok(page.turns)
    }

    pub async fn delete_conversation(
        &self,
        identity: Option<&Identity>,
        agent_id: &str,
        conversation_id: &str,
    ) -> Result<(), ChatError> {
        let identity = require_identity(identity)?;
        let scope = ConversationScope::new(&identity.tenant_id, &identity.actor_id, agent_id);
        if !self.repo.delete_conversation(&scope, conversation_id).await? {
            return Err(ChatError::ConversationNotFound);
        }
        info!(agent_id, conversation_id, "conversation soft-deleted");
        Ok(())
    }

    // Agents and runs

    pub fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        self.manifests.list_agents()
    }

    pub fn get_agent_info(&self, agent_id: &str) -> Result<AgentInfo, ChatError> {
        self.manifests
            .agent_info(agent_id)
            .ok_or_else(|| ChatError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })
    }

    /// Dispatch an agent run. With no action given, the manifest's first
    /// declared action is used.
    pub fn dispatch_run(
        &self,
        agent_id: &str,
        action: Option<&str>,
        triggered_by: TriggeredBy,
    ) -> Result<RunRecord, ChatError> {
        let manifest = self
            .manifests
            .load(agent_id)
            .ok_or_else(|| ChatError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })?;
        let action = match action {
            Some(action) => action.to_string(),
            None => manifest
                .first_action()
                .map(str::to_string)
                .ok_or_else(|| {
                    ChatError::Internal(anyhow::anyhow!(
                        "agent {agent_id} declares no runnable actions"
                    ))
                })?,
        };
        Ok(self.runs.dispatch(agent_id, &action, triggered_by)?)
    }

    pub fn list_runs(&self, agent_id: Option<&str>, limit: usize) -> Result<Vec<RunRecord>, ChatError> {
        Ok(self.runs.list_runs(agent_id, limit)?)
    }
}

struct AgentReply {
    message: String,
    suggestions: Vec<Suggestion>,
    metadata: serde_json::Value,
}

fn require_identity(identity: Option<&Identity>) -> Result<&Identity, ChatError> {
    match identity {
        Some(id) if !id.tenant_id.trim().is_empty() && !id.actor_id.trim().is_empty() => Ok(id),
        _ => Err(ChatError::NotAuthenticated),
    }
}

fn new_conversation_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("conv-{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
}
