//! campus-chat CLI: demo the sync engine against the in-memory backend, or
//! inspect a SQLite chat database. Config from env and optional CLI args.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use chat_core::{init_tracing, ChatStore, NewMessage, Profile, GENERAL_ROOM_ID};
use chat_inmemory::InMemoryBackend;
use chat_sqlite::SqliteBackend;
use chat_sync::{ChatSession, SessionConfig};

#[derive(Parser)]
#[command(name = "campus-chat")]
#[command(about = "Chat sync engine demo: demo, history", long_about = None)]
#[command(version)]
struct Cli {
    /// Log file path (tracing tees to stdout and this file).
    #[arg(long, default_value = "campus-chat.log")]
    log_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted two-user conversation against the in-memory backend.
    Demo,
    /// Print a room's history from a SQLite chat database.
    History {
        /// Database URL or file path (defaults to CHAT_DB or chat.db).
        #[arg(short, long)]
        database: Option<String>,
        /// Room id; defaults to the general room.
        #[arg(short, long)]
        room: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_file)?;

    match cli.command {
        Commands::Demo => run_demo().await,
        Commands::History { database, room } => {
            let database = database
                .or_else(|| std::env::var("CHAT_DB").ok())
                .unwrap_or_else(|| "chat.db".to_string());
            print_history(&database, room.unwrap_or(GENERAL_ROOM_ID)).await
        }
    }
}

async fn run_demo() -> Result<()> {
    info!("Starting scripted demo against the in-memory backend");
    let backend = InMemoryBackend::new();

    let alice = Profile {
        id: Uuid::new_v4(),
        full_name: "Alice".to_string(),
        avatar_url: None,
    };
    let bob = Profile {
        id: Uuid::new_v4(),
        full_name: "Bob".to_string(),
        avatar_url: None,
    };
    backend.add_profile(alice.clone()).await;
    backend.add_profile(bob.clone()).await;
    backend.sign_in(alice.id).await;

    let session = ChatSession::connect(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        SessionConfig::default(),
    )
    .await?;

    session.select_room(Some(GENERAL_ROOM_ID)).await?;
    session.set_draft("hello from the demo").await;
    session.send_draft(None).await?;

    // Bob answers from "another client": a direct store write whose feed
    // event reaches the session's room subscription.
    backend
        .insert_message(&NewMessage {
            room_id: GENERAL_ROOM_ID,
            user_id: bob.id,
            content: "hi Alice!".to_string(),
            image_url: None,
        })
        .await?;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let dm = session.create_dm_room(bob.id).await?;
    println!("rooms:");
    for summary in session.rooms().await {
        let preview = summary
            .last_message
            .map(|m| format!("{}: {}", m.sender, m.content))
            .unwrap_or_else(|| "(no messages)".to_string());
        println!("  {:<16} {}", summary.display_name, preview);
    }

    println!("general room timeline:");
    for message in session.messages().await {
        let sender = message
            .sender
            .map(|p| p.full_name)
            .unwrap_or_else(|| "Unknown".to_string());
        println!("  [{}] {}: {}", message.created_at, sender, message.content);
    }
    println!("direct-message room with Bob: {}", dm);

    session.close();
    Ok(())
}

async fn print_history(database: &str, room_id: Uuid) -> Result<()> {
    info!(database, %room_id, "Opening chat database");
    let backend = SqliteBackend::new(database).await?;
    let history = backend.messages_in_room(room_id).await?;
    if history.is_empty() {
        println!("no messages in room {}", room_id);
        return Ok(());
    }
    for message in history {
        let sender = message
            .sender
            .map(|p| p.full_name)
            .unwrap_or_else(|| "Unknown".to_string());
        println!("[{}] {}: {}", message.created_at, sender, message.content);
    }
    Ok(())
}
