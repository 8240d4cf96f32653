//! docbridge: command-line front end for the DocBridge connection core.
//!
//! Every invocation restores the persisted session first, so `connect` once
//! and later commands reuse the cached token.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docbridge_client::{
    BridgeConfig, BridgeEvent, CoreServices, DocumentSession, Freshness, HttpProvider, Listing,
    NoticeLevel,
};
use docbridge_shared::{BridgeError, DocumentRef};
use tracing::{info, warn};

/// Grace period for the event printer before the process exits.
const EVENT_DRAIN: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "docbridge")]
#[command(about = "Connect to a document provider and manage conversation context")]
struct Cli {
    /// Provider base URL (overrides DOCBRIDGE_PROVIDER_URL)
    #[arg(long, global = true)]
    provider_url: Option<String>,

    /// Connection target name
    #[arg(long, global = true, default_value = "docbridge")]
    target: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a session with the provider and remember the credentials
    Connect {
        #[arg(long, env = "DOCBRIDGE_CLIENT_ID")]
        client_id: String,
        #[arg(long, env = "DOCBRIDGE_API_KEY", hide_env_values = true)]
        api_key: String,
    },
    /// Reconnect with the saved credentials
    Reconnect,
    /// Tear down the session and forget the cached token
    Reset,
    /// Print the connection status as JSON
    Status,
    /// List a folder
    List {
        #[arg(long)]
        folder: Option<String>,
        /// Bypass the listing cache
        #[arg(long)]
        refresh: bool,
    },
    /// Print a document's content
    Fetch { document_id: String },
    /// Manage the documents attached to a conversation
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Keep the session reconciled and print events until interrupted
    Watch,
}

#[derive(Subcommand)]
enum ContextAction {
    /// Attach a document, looking up its name in `--folder`
    Add {
        conversation_id: String,
        document_id: String,
        #[arg(long)]
        folder: Option<String>,
    },
    Remove {
        conversation_id: String,
        document_id: String,
    },
    Show { conversation_id: String },
    Clear { conversation_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docbridge=info,docbridge_client=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = BridgeConfig::from_env();
    if let Some(url) = cli.provider_url {
        config.provider_url = url.trim_end_matches('/').to_string();
    }
    let provider = Arc::new(HttpProvider::new(config.provider_url.clone()));
    let services = CoreServices::from_config(config).context("failed to open persistent storage")?;
    let session = DocumentSession::new(cli.target, provider, services);

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    if let Some(Err(e)) = session.restore().await {
        warn!("Automatic reconnect failed: {}", e.user_message());
    }

    let result = run(&session, cli.command).await;
    session.stop_sync();
    tokio::time::sleep(EVENT_DRAIN).await;
    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

async fn run(session: &DocumentSession, command: Command) -> Result<(), BridgeError> {
    match command {
        Command::Connect { client_id, api_key } => {
            session.connect(&client_id, &api_key).await?;
            info!("Connected");
        }
        Command::Reconnect => {
            session.reconnect().await?;
            info!("Reconnected");
        }
        Command::Reset => {
            session.reset().await;
            info!("Session reset");
        }
        Command::Status => print_json(&session.status()),
        Command::List { folder, refresh } => {
            let listing = if refresh {
                session.force_refresh(folder.as_deref()).await?
            } else {
                session.list(folder.as_deref()).await?
            };
            print_listing(&listing);
        }
        Command::Fetch { document_id } => {
            println!("{}", session.fetch(&document_id).await?);
        }
        Command::Context { action } => run_context(session, action).await?,
        Command::Watch => {
            if !session.is_syncing() {
                return Err(BridgeError::NotConnected);
            }
            info!("Watching session; press Ctrl-C to stop");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    Ok(())
}

async fn run_context(session: &DocumentSession, action: ContextAction) -> Result<(), BridgeError> {
    match action {
        ContextAction::Add {
            conversation_id,
            document_id,
            folder,
        } => {
            let listing = session.list(folder.as_deref()).await?;
            let document = listing
                .documents
                .into_iter()
                .find(|d| d.id == document_id)
                .unwrap_or_else(|| DocumentRef::new(document_id.clone(), document_id, "text/plain"));
            let update = session.add_document_to_context(&conversation_id, document).await?;
            if !update.changed {
                info!("Document already attached");
            }
            print_documents(&update.documents);
        }
        ContextAction::Remove {
            conversation_id,
            document_id,
        } => {
            if !session.remove_document_from_context(&conversation_id, &document_id)? {
                info!("Document was not attached");
            }
            print_documents(&session.get_documents_in_context(&conversation_id));
        }
        ContextAction::Show { conversation_id } => {
            print_documents(&session.get_documents_in_context(&conversation_id));
        }
        ContextAction::Clear { conversation_id } => {
            session.clear_context(&conversation_id)?;
        }
    }
    Ok(())
}

fn log_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::ConnectionStatusChanged {
            target,
            previous,
            current,
        } => info!("[{}] {} -> {}", target, previous.as_str(), current.as_str()),
        BridgeEvent::ConnectionFailed { target, kind, message } => {
            warn!("[{}] {} failure: {}", target, kind.as_str(), message)
        }
        BridgeEvent::DocumentContextUpdated {
            conversation_id,
            documents,
        } => info!("Context '{}' now has {} document(s)", conversation_id, documents.len()),
        BridgeEvent::Notice { level, message } => match level {
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Warning | NoticeLevel::Error => warn!("{}", message),
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to render JSON: {}", e),
    }
}

fn print_listing(listing: &Listing) {
    let source = match listing.freshness {
        Freshness::Network => "network",
        Freshness::Cached => "cache",
        Freshness::RateLimited => "rate-limited, last known",
    };
    println!("{} ({}):", listing.folder_id, source);
    print_documents(&listing.documents);
}

fn print_documents(documents: &[DocumentRef]) {
    if documents.is_empty() {
        println!("  (none)");
    }
    for doc in documents {
        println!("  {:<38} {:<24} {}", doc.id, doc.mime_type, doc.name);
    }
}
