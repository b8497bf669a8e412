//! Entry point for `chat-mock`.
//!
//! Parses CLI arguments and starts the mock endpoint.  All actual protocol
//! work is delegated to library modules; `main.rs` owns only process setup
//! (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use chat_mock::config::ServerConfig;
use chat_mock::server::Server;

/// Mock UDP chat-protocol endpoint with deterministic fault injection.
///
/// Embed a scenario keyword (e.g. "timeoutauth", "duplicatejoin",
/// "malformed") in a username, channel id, or message text to trigger the
/// corresponding protocol deviation.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Well-known address to bind (session initiation only).
    #[arg(short, long, default_value = "127.0.0.1:4567")]
    bind: SocketAddr,

    /// Seconds of inactivity before a session is dropped.
    #[arg(long, default_value_t = 60)]
    session_timeout: u64,

    /// Seconds the delayed-reply scenario postpones the auth reply.
    #[arg(long, default_value_t = 6)]
    reply_delay: u64,

    /// Display name used on server-originated frames.
    #[arg(long, default_value = "Server")]
    name: String,
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = ServerConfig::new()
        .with_bind_address(cli.bind)
        .with_server_name(&cli.name)
        .with_session_timeout(Duration::from_secs(cli.session_timeout))
        .with_reply_delay(Duration::from_secs(cli.reply_delay));

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            log::error!("failed to bind {}: {e}", cli.bind);
            std::process::exit(1);
        }
    };
    log::info!("mock endpoint listening on {}", server.local_addr());

    let handle = server.spawn();
    if tokio::signal::ctrl_c().await.is_err() {
        log::error!("failed to listen for shutdown signal");
    }
    log::info!("shutdown signal received");
    handle.shutdown().await;
}
