use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use warden_gateway::repo::SqliteConversationRepo;
use warden_gateway::runs::JsonFileRunStore;
use warden_gateway::{Gateway, Identity};
use warden_types::request::{ExecutionMode, RequestContext};
use warden_types::run::TriggeredBy;

#[derive(Parser)]
#[command(name = "warden", version, about = "Warden — governed agent execution gateway")]
struct Cli {
    /// Tenant the command acts on behalf of
    #[arg(long, global = true, default_value = "default")]
    tenant: String,

    /// Actor identity within the tenant
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List agents in the catalogue
    Agents,
    /// Show one agent's capabilities and greeting
    Info {
        agent_id: String,
    },
    /// Send a chat message through the gateway
    Chat {
        agent_id: String,
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Request apply-mode execution (requires an approval ticket)
        #[arg(long)]
        apply: bool,
        /// Change-approval ticket id, e.g. CAB-2025-0042
        #[arg(long)]
        approval: Option<String>,
    },
    /// Dispatch an agent run
    Dispatch {
        agent_id: String,
        /// Action to run; defaults to the agent's first declared action
        #[arg(long)]
        action: Option<String>,
    },
    /// Show recent runs, most recent first
    Runs {
        /// Only runs for this agent
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List or show conversations
    Conversations {
        agent_id: String,
        /// Show the turns of one conversation instead of the listing
        #[arg(long)]
        show: Option<String>,
        /// Soft-delete one conversation
        #[arg(long)]
        delete: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let identity = Identity::new(&cli.tenant, &cli.actor);

    let config = warden_gateway::config::load_config()?;
    let repo = Arc::new(SqliteConversationRepo::open(&warden_gateway::config::db_path())?);
    let runs = Arc::new(JsonFileRunStore::new(
        warden_gateway::config::runs_path(),
        config.runner.max_runs,
    ));
    let gateway = Gateway::new(config, repo, runs)?;

    match cli.command {
        Commands::Agents => {
            for agent in gateway.list_agents()? {
                println!("{:<24} {}", agent.id, agent.description);
            }
            Ok(())
        }
        Commands::Info { agent_id } => {
            let info = gateway.get_agent_info(&agent_id)?;
            println!("{} ({})", info.name, info.id);
            if let Some(greeting) = &info.greeting {
                println!("{greeting}");
            }
            if !info.primary_intents.is_empty() {
                println!("Intents: {}", info.primary_intents.join(", "));
            }
            if !info.capabilities.is_empty() {
                println!("Domains: {}", info.capabilities.join(", "));
            }
            Ok(())
        }
        Commands::Chat {
            agent_id,
            message,
            conversation,
            apply,
            approval,
        } => {
            let context = RequestContext {
                execution_mode: apply.then_some(ExecutionMode::Apply),
                approved: approval.is_some().then_some(true),
                approval_id: approval,
                ..Default::default()
            };
            let response = gateway
                .send_message(
                    Some(&identity),
                    &agent_id,
                    &message,
                    conversation.as_deref(),
                    &context,
                )
                .await?;
            println!("[{}]", response.conversation_id);
            println!("{}", response.message);
            for suggestion in &response.suggestions {
                println!("  -> {} ({})", suggestion.label, suggestion.action);
            }
            Ok(())
        }
        Commands::Dispatch { agent_id, action } => {
            let run = gateway.dispatch_run(&agent_id, action.as_deref(), TriggeredBy::Manual)?;
            println!(
                "Run {} dispatched: {} / {} [{}]",
                run.run_id, run.agent_id, run.action, run.status
            );
            Ok(())
        }
        Commands::Runs { agent, limit } => {
            for run in gateway.list_runs(agent.as_deref(), limit)? {
                println!(
                    "{}  {:<10} {:<20} {:<24} exit={}",
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.status.to_string(),
                    run.agent_id,
                    run.action,
                    run.exit_code.map_or("-".to_string(), |c| c.to_string()),
                );
            }
            Ok(())
        }
        Commands::Conversations {
            agent_id,
            show,
            delete,
        } => {
            if let Some(conversation_id) = delete {
                gateway
                    .delete_conversation(Some(&identity), &agent_id, &conversation_id)
                    .await?;
                println!("Deleted {conversation_id}");
                return Ok(());
            }
            if let Some(conversation_id) = show {
                let turns = gateway
                    .get_conversation(Some(&identity), &agent_id, &conversation_id)
                    .await?;
                for turn in turns {
                    println!(
                        "{} [{}] {}",
                        turn.created_at.format("%H:%M:%S"),
                        turn.role,
                        turn.content
                    );
                }
                return Ok(());
            }
            let listing = gateway
                .get_conversations(Some(&identity), &agent_id, 20, 0)
                .await?;
            for conv in &listing.conversations {
                println!(
                    "{}  {}  {}",
                    conv.last_event_time.format("%Y-%m-%d %H:%M:%S"),
                    conv.conversation_id,
                    conv.last_message.as_deref().unwrap_or(""),
                );
            }
            println!("{} of {} conversations", listing.conversations.len(), listing.total);
            Ok(())
        }
    }
}
