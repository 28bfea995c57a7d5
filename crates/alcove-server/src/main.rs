//! Alcove server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory development server
//! alcove-server --bind 127.0.0.1:8080
//!
//! # Durable storage and a fixed signing secret (production)
//! ALCOVE_JWT_SECRET=<64 hex chars> alcove-server \
//!     --bind 0.0.0.0:8080 --data-dir /var/lib/alcove --strict-revocation
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use alcove_server::{RuntimeConfig, Server};

/// Environment variable holding the hex-encoded signing secret.
const JWT_SECRET_ENV: &str = "ALCOVE_JWT_SECRET";

/// Alcove identity and messaging server
#[derive(Parser, Debug)]
#[command(name = "alcove-server")]
#[command(about = "Pseudonymous identity and E2E messaging server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Directory for durable storage (in-memory when omitted)
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Access-token lifetime in seconds
    #[arg(long, default_value = "900")]
    access_ttl_secs: u64,

    /// Refresh-token lifetime in seconds
    #[arg(long, default_value = "2592000")]
    refresh_ttl_secs: u64,

    /// Challenge validity window in seconds
    #[arg(long, default_value = "300")]
    challenge_ttl_secs: u64,

    /// Check family revocation and suspension on every authenticated
    /// request
    #[arg(long)]
    strict_revocation: bool,

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

    tracing::info!("Alcove server starting");
    tracing::info!("Binding to {}", args.bind);

    let jwt_secret = match std::env::var(JWT_SECRET_ENV) {
        Ok(hex_secret) => Some(hex::decode(hex_secret.trim()).map_err(|_| {
            format!("{JWT_SECRET_ENV} must be hex-encoded bytes")
        })?),
        Err(_) => {
            tracing::warn!("{JWT_SECRET_ENV} not set - using an ephemeral signing secret");
            tracing::warn!("This is NOT suitable for production use!");
            None
        },
    };

    let config = RuntimeConfig {
        bind_address: args.bind,
        data_dir: args.data_dir,
        access_ttl_secs: args.access_ttl_secs,
        refresh_ttl_secs: args.refresh_ttl_secs,
        challenge_ttl_secs: args.challenge_ttl_secs,
        strict_revocation: args.strict_revocation,
        jwt_secret,
        ..Default::default()
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
