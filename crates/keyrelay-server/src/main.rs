//! Keyrelay server binary.
//!
//! # Usage
//!
//! ```bash
//! keyrelay-server --bind 0.0.0.0:4040 --key relay_key.pem
//! ```
//!
//! The key file holds the relay's long-lived RSA private key (PEM, PKCS#1
//! or PKCS#8). It is loaded once at startup and never regenerated at
//! runtime; parties learn the matching public key out-of-band.

use clap::Parser;
use keyrelay_server::{RelayConfig, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keyrelay handshake relay server
#[derive(Parser, Debug)]
#[command(name = "keyrelay-server")]
#[command(about = "Relay server for authenticated public-key exchange")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4040")]
    bind: String,

    /// Path to the relay's RSA private key (PEM format)
    #[arg(short, long)]
    key: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("keyrelay server starting");

    let config = ServerConfig {
        bind_address: args.bind,
        key_path: args.key,
        relay: RelayConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
