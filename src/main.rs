#![forbid(unsafe_code)]

//! `agent-relay` — relay one chat request to the agent CLI.
//!
//! Bootstraps configuration and the durable session store, then runs the
//! standard control flow: load the conversation record, decide whether the
//! previous subprocess session can be resumed, capture the reset generation,
//! lock the working directory, stream the call, and persist the outcome
//! through the generation-guarded path.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_relay::engine::{Engine, StreamCallbacks, StreamRequest};
use agent_relay::store::{did_resume_fail, ConversationKey, SessionStore, SqliteRepository};
use agent_relay::{AppError, GlobalConfig, Result};

#[derive(Debug, Parser)]
#[command(name = "agent-relay", about = "Relay chat requests to the agent CLI", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Override the default workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Conversation chat id.
    #[arg(long, default_value_t = 0)]
    chat_id: i64,

    /// Optional sub-topic id within the chat.
    #[arg(long)]
    topic_id: Option<i64>,

    /// Use the plain one-shot text call instead of the streaming protocol.
    #[arg(long)]
    one_shot: bool,

    /// Reset the conversation's session line before (or instead of) running.
    #[arg(long)]
    reset: bool,

    /// Prompt text; words are joined with spaces.
    prompt: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(ws) = args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.default_workspace_root = canonical;
    }

    let key = match args.topic_id {
        Some(topic) => ConversationKey::topic(args.chat_id, topic),
        None => ConversationKey::chat(args.chat_id),
    };

    let repo = SqliteRepository::connect(&config.db_path()).await?;
    let store = Arc::new(SessionStore::new(Arc::new(repo)));
    let engine = Engine::new(config.engine.clone());

    if args.reset {
        let generation = store.reset(key).await?;
        info!(%key, generation, "conversation reset");
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        if args.reset {
            return Ok(());
        }
        return Err(AppError::Config("no prompt given".into()));
    }

    if args.one_shot {
        let text = engine
            .one_shot(&prompt, None, config.default_workspace_root())
            .await?;
        println!("{text}");
        return Ok(());
    }

    // Capture continuity state before dispatch; the generation freezes here.
    let record = store.load_or_create(key).await?;
    let generation = record.reset_generation;
    let prev_id = record.session_id.clone();
    let reliable = store
        .is_resume_reliable(key, config.session.resume_ttl())
        .await?;
    let working_dir = store
        .lock_active_working_directory(key, config.default_workspace_root())
        .await?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling call");
            cancel_on_signal.cancel();
        }
    });

    let callbacks = StreamCallbacks {
        on_progress: Some(Box::new(|snippet: &str| {
            info!(progress = snippet, "agent progress");
        })),
        // Persist the assigned id as soon as it is known, under the captured
        // generation, so a crash mid-call does not lose it.
        on_session_id: Some(Box::new({
            let store = Arc::clone(&store);
            move |session_id: &str| {
                let store = Arc::clone(&store);
                let session_id = session_id.to_owned();
                tokio::spawn(async move {
                    if let Err(err) = store
                        .update_session_id_guarded(key, &session_id, generation)
                        .await
                    {
                        warn!(error = %err, "failed to persist session id");
                    }
                });
            }
        })),
        on_soft_ceiling: Some(Box::new(|message: &str| {
            warn!(message, "soft ceiling reached");
        })),
        ..StreamCallbacks::default()
    };

    let tried_resume = reliable && prev_id.is_some();
    let outcome = engine
        .stream(
            StreamRequest {
                prompt,
                resume: if tried_resume { prev_id.clone() } else { None },
                model: None,
                working_dir,
                cancel,
            },
            callbacks,
        )
        .await?;

    if did_resume_fail(tried_resume, prev_id.as_deref(), outcome.session_id.as_deref()) {
        warn!(
            previous = prev_id.as_deref().unwrap_or_default(),
            current = outcome.session_id.as_deref().unwrap_or_default(),
            "subprocess silently started a fresh session instead of resuming"
        );
    }

    store
        .record_completed_call(key, generation, outcome.session_id.as_deref())
        .await?;

    println!("{}", outcome.text);
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
