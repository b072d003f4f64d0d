//! wshub server binary.
//!
//! # Usage
//!
//! ```bash
//! # Broadcast hub on the default 0.0.0.0:8081
//! wshub
//!
//! # Session routing on a chosen address
//! wshub 127.0.0.1 40000 --policy session
//!
//! # Chat room with leave notices
//! WSHUB_PORT=9000 wshub --policy chat
//! ```

use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wshub::config::{DEFAULT_HOST, DEFAULT_PORT};
use wshub::{Broadcast, ChatRoom, Config, Policy, Server, SessionRouter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyKind {
    /// Greet newcomers, broadcast every message
    Broadcast,
    /// Identify by `session`, route by `to`
    Session,
    /// chat_user/chat_message chat box with join and leave notices
    Chat,
}

/// WebSocket message hub
#[derive(Parser, Debug)]
#[command(name = "wshub")]
#[command(about = "Single-threaded WebSocket message hub")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(env = "WSHUB_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(env = "WSHUB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Routing policy
    #[arg(long, value_enum, default_value = "broadcast")]
    policy: PolicyKind,

    /// Longest wait for socket activity per loop iteration, in milliseconds
    #[arg(long, default_value_t = 10)]
    poll_timeout_ms: u64,

    /// Run the disconnect hook when a client goes away (always on for chat)
    #[arg(long)]
    notify_disconnect: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::new()
        .with_host(args.host.clone())
        .with_port(args.port)
        .with_poll_timeout(Duration::from_millis(args.poll_timeout_ms))
        .with_notify_disconnect(args.notify_disconnect || matches!(args.policy, PolicyKind::Chat));

    match args.policy {
        PolicyKind::Broadcast => serve(config, Broadcast).await,
        PolicyKind::Session => serve(config, SessionRouter).await,
        PolicyKind::Chat => serve(config, ChatRoom).await,
    }
}

async fn serve<P: Policy>(config: Config, policy: P) -> anyhow::Result<()> {
    let mut server = Server::bind(config, policy)
        .await
        .context("failed to bind listener")?;
    let addr = server.local_addr()?;

    let status = serde_json::json!({
        "status": "listening",
        "host": server.config().host,
        "port": addr.port(),
    });
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{status}")?;
    stdout.flush()?;
    drop(stdout);

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
