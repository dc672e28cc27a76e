//! CLI for Platibus
//!
//! Subcommands:
//! - `server`: run a bus node from configuration
//! - `send`: post a one-shot message to a peer bus (useful for smoke tests)

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use platibus::{load_config, Bus, Message, MessageHandler, Principal};
use platibus_queue::ListenerError;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "platibus")]
enum Command {
    /// Run the bus node
    Server,
    /// Send a one-shot message to a peer bus
    Send {
        /// Base URI of the peer bus (default: http://127.0.0.1:52180)
        #[arg(long, default_value = "http://127.0.0.1:52180")]
        url: String,
        /// Logical message name
        #[arg(long, default_value = "platibus:Ping")]
        name: String,
        /// Message body
        #[arg(long, default_value = "hello from platibus")]
        body: String,
    },
}

#[tokio::main]
async fn main() {
    platibus_utils::logging::init("info");

    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                error!("Server failed: {}", e);
            }
        }
        Command::Send { url, name, body } => {
            if let Err(e) = run_send(&url, &name, &body).await {
                error!("Send failed: {}", e);
            }
        }
    }
}

/// Default handler: logs every inbound message and acknowledges it.
struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), ListenerError> {
        info!(
            message_id = message.headers().message_id().unwrap_or_default(),
            message_name = message.headers().message_name().unwrap_or_default(),
            principal = principal.map(|p| p.name.as_str()).unwrap_or("-"),
            bytes = message.content().len(),
            "message received"
        );
        Ok(())
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let bus = Bus::init(config).await?;
    bus.register_handler("", Arc::new(LoggingHandler));
    info!("Bus listening on http://{addr}");

    tokio::select! {
        served = bus.serve(&addr) => {
            if let Err(e) = served {
                error!("HTTP host exited unexpectedly: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    bus.shutdown().await;
    Ok(())
}

async fn run_send(url: &str, name: &str, body: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Speak the wire protocol directly rather than standing up a full bus
    let id = uuid::Uuid::new_v4().to_string();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/message/{}", url.trim_end_matches('/'), id))
        .header("MessageId", id.as_str())
        .header("MessageName", name)
        .header("Content-Type", "text/plain")
        .body(body.to_string())
        .send()
        .await?;

    println!("{} -> {}", id, response.status());
    Ok(())
}
