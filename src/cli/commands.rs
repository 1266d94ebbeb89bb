//! Handlers behind the CLI subcommands.

use std::io::Write;
use std::sync::Arc;

use crate::client::{ConsumerState, HttpTransport, StreamConsumer};
use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::orchestrator::ChatStreamUseCase;
use crate::provider::{create_backend, BackendKind, ModelBackend, ModelSpec};
use crate::server::{serve, AppState};
use crate::session::InMemorySessionRegistry;
use crate::store::MemoryStore;
use crate::tools::{FnTool, ToolParameters, ToolSet};
use crate::types::{Agent, AgentVisibility, Conversation};

use super::{ChatArgs, ServeArgs};

pub const DEMO_USER: &str = "demo";
pub const DEMO_CONVERSATION: &str = "demo";
const DEMO_AGENT: &str = "assistant";

/// `parley serve`
pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    let mut config = ParleyConfig::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.set_model(model);
    }
    if let Some(bind) = args.bind {
        config.set_bind(bind);
    }

    let store = Arc::new(MemoryStore::new());
    seed_demo(&store).await;

    let backend = resolve_backend(&config)?;
    tracing::info!(backend = backend.name(), model = backend.model_id(), "model backend ready");

    let chat = ChatStreamUseCase::new(
        store.clone(),
        store,
        backend,
        Arc::new(InMemorySessionRegistry::new()),
    )
    .with_catalog(demo_catalog())
    .with_settings(config.stream_settings());

    let listener = tokio::net::TcpListener::bind(config.bind()).await?;
    serve(listener, AppState::new(chat)).await
}

/// `parley chat`
pub async fn handle_chat(args: ChatArgs) -> Result<()> {
    let settings = ParleyConfig::global().stream_settings();
    let transport = Arc::new(HttpTransport::new(args.url, args.user));
    let consumer = StreamConsumer::builder(transport)
        .settings(&settings)
        .on_delta(|text| {
            print!("{text}");
            let _ = std::io::stdout().flush();
        })
        .on_complete(|_| println!())
        .on_error(|e| eprintln!("\nError: {e}"))
        .build();

    let mut handle = consumer.send_message(args.conversation, args.message);
    tokio::select! {
        joined = &mut handle => {
            joined.map_err(|e| ParleyError::InvalidState(e.to_string()))?;
        }
        _ = tokio::signal::ctrl_c() => {
            let acknowledged = consumer.interrupt().await;
            eprintln!("\n[interrupted{}]", if acknowledged { "" } else { ", server not notified" });
            return Ok(());
        }
    }

    if consumer.state() == ConsumerState::Error {
        return Err(ParleyError::Stream("stream ended with an error".into()));
    }
    Ok(())
}

/// Configured backend, or the echo backend when credentials are missing.
fn resolve_backend(config: &ParleyConfig) -> Result<Arc<dyn ModelBackend>> {
    let spec: ModelSpec = config.model().parse()?;
    match create_backend(&spec, config) {
        Err(ParleyError::Authentication(reason)) => {
            tracing::warn!(model = %spec, %reason, "no credentials; using echo backend");
            let echo = ModelSpec {
                kind: BackendKind::Echo,
                model: spec.model,
            };
            create_backend(&echo, config)
        }
        other => other,
    }
}

async fn seed_demo(store: &MemoryStore) {
    store
        .insert_agent(Agent {
            id: DEMO_AGENT.into(),
            owner_id: DEMO_USER.into(),
            name: "Parley".into(),
            instructions: "Answer briefly. Use tools when they help.".into(),
            tone: Some("friendly".into()),
            visibility: AgentVisibility::Public,
            enable_threads: true,
            tools: vec!["current_time".into()],
        })
        .await;
    store
        .insert_conversation(Conversation {
            id: DEMO_CONVERSATION.into(),
            user_id: DEMO_USER.into(),
            agent_id: DEMO_AGENT.into(),
            title: Some("Demo".into()),
        })
        .await;
}

fn demo_catalog() -> ToolSet {
    ToolSet::new().with(Arc::new(FnTool::new(
        "current_time",
        "Current UTC date and time in RFC 3339 format.",
        ToolParameters::empty(),
        |_args| async { Ok(chrono::Utc::now().to_rfc3339()) },
    )))
}
