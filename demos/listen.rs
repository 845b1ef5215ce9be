//! Listen to the messaging backend and print pushed events.
//!
//! Demonstrates:
//! - Loading options from `MESSAGING_*` environment variables
//! - Registering listeners before connecting
//! - Joining a session room once connected
//! - Parsing typed server events
//!
//! Usage:
//!   MESSAGING_API_URL=http://localhost:3001 MESSAGING_TOKEN=... \
//!     cargo run --example listen -- <session-id> [--debug]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use realtime_link::{
    ConnectionManager, ConnectionOptions, Error, Event, Result, ServerEvent, names,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const ENV_TOKEN: &str = "MESSAGING_TOKEN";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    init_logging(args.iter().any(|a| a == "--debug"));

    if let Err(e) = run(&args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "realtime_link=debug"
    } else {
        "realtime_link=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(args: &[String]) -> Result<()> {
    println!("=== Realtime listener ===\n");

    let token = std::env::var(ENV_TOKEN)
        .map_err(|_| Error::config(format!("{ENV_TOKEN} is not set")))?;
    let session = args.iter().find(|a| !a.starts_with("--")).cloned();

    let manager = ConnectionManager::new(ConnectionOptions::from_env()?)?;
    println!("Endpoint: {}", manager.endpoint());

    for name in [names::NEW_MESSAGE, names::CHAT_UPDATED] {
        manager.on(name, move |payload: &Value| {
            match Event::new(name, payload.clone()).parse() {
                ServerEvent::NewMessage {
                    session_id,
                    chat_id,
                    message,
                } => println!("[{session_id}] {chat_id}: {message}"),
                ServerEvent::ChatUpdated { session_id } => {
                    println!("[{session_id}] chat list changed");
                }
                ServerEvent::Other(event) => println!("{}: {}", event.name, event.payload),
            }
        });
    }

    manager.connect(&token);

    // Joins are dropped while disconnected, so wait for the handshake.
    while !manager.is_connected() {
        if manager.reconnect_attempts() >= manager.options().max_reconnect_attempts {
            return Err(Error::connection("reconnection attempts exhausted"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if let Some(ref session) = session {
        manager.join_session(session.as_str());
        println!("Joined session {session}");
    }

    println!("Listening, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    manager.disconnect();
    println!("\n=== Done ===");
    Ok(())
}
