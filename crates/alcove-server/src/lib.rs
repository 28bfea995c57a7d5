//! Alcove production server.
//!
//! Production server implementation using axum for the JSON HTTP API,
//! Tokio for the async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! This crate provides production "glue" that wraps [`alcove_core`]'s
//! store-and-service logic with real I/O. Handlers are thin: decode JSON,
//! call one core service, encode the result. The core owns every
//! invariant (challenge single-use, rotation atomicity, family
//! revocation); this crate owns transport, configuration, logging, and
//! the boundary error collapse.
//!
//! # Components
//!
//! - [`Server`]: binds a listener and serves the router
//! - [`AppState`]: core services wired over a storage backend
//! - [`RedbStorage`]: durable backend (redb); in-memory is the default
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod extract;
mod handlers;
mod routes;
mod state;
pub mod storage;
mod system_env;

use axum::Router;
use tokio::net::TcpListener;

use alcove_core::{Environment, MemoryStore};

pub use config::RuntimeConfig;
pub use error::{ApiError, ApiResult, ServerError};
pub use extract::AuthIdentity;
pub use routes::router;
pub use state::AppState;
pub use storage::{DurableStore, RedbStorage};
pub use system_env::SystemEnv;

/// Production Alcove server.
///
/// Wraps the router with a bound listener and background maintenance.
pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// Chooses the storage backend from the configuration: redb under
    /// `data_dir` when set, in-memory otherwise. Resolves the signing
    /// secret (generating an ephemeral one with a warning when absent)
    /// and spawns the expired-record sweeper.
    pub async fn bind(config: RuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let secret = resolve_secret(&config, &env);

        let router = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| ServerError::Config(format!("data dir: {e}")))?;
                let store = RedbStorage::open(dir.join("alcove.redb"))?;
                let state = AppState::new(&config, env, store, &secret);
                state.spawn_maintenance(config.sweep_interval_secs);
                routes::router(state)
            },
            None => {
                tracing::info!("no data dir configured - state will not survive restarts");
                let state = AppState::new(&config, env, MemoryStore::new(), &secret);
                state.spawn_maintenance(config.sweep_interval_secs);
                routes::router(state)
            },
        };

        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { listener, router })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server until shutdown or a fatal transport error.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))
    }
}

/// Resolve the access-token signing secret.
///
/// Falls back to an ephemeral random secret so a development server works
/// out of the box; issued tokens then die with the process.
fn resolve_secret(config: &RuntimeConfig, env: &SystemEnv) -> Vec<u8> {
    match &config.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!("no signing secret provided - generating an ephemeral one");
            tracing::warn!("issued access tokens will NOT survive a restart");
            let mut secret = vec![0u8; 32];
            env.random_bytes(&mut secret);
            secret
        },
    }
}
