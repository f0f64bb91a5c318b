use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use convexa_agent::agent::prompts::{GREETING, HANDOFF_NOTICE};
use convexa_agent::agent::{AgentDeps, SessionManager};
use convexa_agent::api::{ApiState, api_routes};
use convexa_agent::config::{AgentConfig, ServerConfig};
use convexa_agent::error::Error;
use convexa_agent::llm::{LlmConfig, create_provider};
use convexa_agent::store::{CrmStore, HistoryStore, LibSqlBackend};
use convexa_agent::tools::builtin::crm_registry;

/// Session id used by the terminal REPL.
const CLI_SESSION: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let agent_config = AgentConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    let llm_config = LlmConfig::from_env().context("export GEMINI_API_KEY=... to run")?;

    let llm = create_provider(&llm_config)?;

    eprintln!("💬 Convexa agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", llm.model_name(), llm.name());
    eprintln!("   Chat API: http://0.0.0.0:{}/api/sessions/{{id}}/messages", server_config.http_port);
    eprintln!("   CRM API: http://0.0.0.0:{}/api/leads", server_config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&server_config.db_path))
            .await
            .with_context(|| format!("failed to open database at {}", server_config.db_path))?,
    );
    let crm: Arc<dyn CrmStore> = backend.clone();
    let history: Arc<dyn HistoryStore> = backend;
    eprintln!("   Database: {}", server_config.db_path);

    // ── Tools ────────────────────────────────────────────────────────────
    let tools = Arc::new(crm_registry(Arc::clone(&crm))?);
    eprintln!("   Tools: {} registered", tools.len());

    // ── Agent ───────────────────────────────────────────────────────────
    let agent_name = agent_config.name.clone();
    let sessions = Arc::new(SessionManager::new(
        agent_config,
        AgentDeps {
            llm,
            tools,
            history,
        },
    ));
    let pruning_handle = sessions.spawn_pruner();

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        sessions: Arc::clone(&sessions),
        crm,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", server_config.http_port))?;
    tokio::spawn(async move {
        tracing::info!("HTTP API listening");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server stopped: {}", e);
        }
    });

    tracing::info!("Agent {} ready and listening", agent_name);
    run_repl(&sessions).await;
    tracing::info!("Shutting down...");
    pruning_handle.abort();
    Ok(())
}

/// Read lines from stdin and feed them to the `cli` session.
async fn run_repl(sessions: &SessionManager) {
    eprintln!("   Type a message and press Enter. /reset to start over, /quit to exit.\n");
    println!("{GREETING}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handed_over = false;
    loop {
        eprint!("> ");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                match sessions.reset_session(CLI_SESSION).await {
                    Ok(()) => {
                        handed_over = false;
                        println!("\n{GREETING}\n");
                    }
                    Err(e) => eprintln!("   Reset failed: {e}"),
                }
            }
            text => match sessions.submit_with_state(CLI_SESSION, text).await {
                Ok((turn, state)) => {
                    println!("\n{}\n", turn.text.unwrap_or_default());
                    if state.human_handoff && !handed_over {
                        println!("{HANDOFF_NOTICE}\n");
                    }
                    handed_over = state.human_handoff;
                }
                Err(Error::Session(e)) => eprintln!("   {e}"),
                Err(e) => tracing::error!("Error handling message: {}", e),
            },
        }
    }
}
