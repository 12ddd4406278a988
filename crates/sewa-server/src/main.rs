//! # sewa-server
//!
//! Booking and conversation service for the sewa services marketplace.
//!
//! This binary provides:
//! - **Booking lifecycle**: creation against a listing package, owner-driven
//!   status transitions, scoped queries and payment marking
//! - **Conversations** scoped to a booking, with per-reader unread counts
//! - **Real-time chat** over WebSocket, one channel per booking
//! - **Payment callbacks** for an eSewa-style redirect gateway
//! - **SMS notifications**, best effort, to both parties of a booking

mod api;
mod auth;
mod bookings;
mod config;
mod conversations;
mod directory;
mod error;
mod gateway;
mod hub;
mod notify;
mod payments;
mod seed;
mod store;
#[cfg(test)]
mod testkit;

use std::sync::Arc;

use sewa_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::TokenDirectory;
use crate::config::ServerConfig;
use crate::notify::{LogNotifier, Notifier, SparrowSmsNotifier};
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sewa_server=debug")),
        )
        .init();

    info!("Starting sewa server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        addr = %config.http_addr,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        ws_idle_timeout_secs = config.ws_idle_timeout.as_secs(),
        sms_enabled = config.sms_api_key.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the database and apply the seed
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Database opened");
    }

    let tokens = match &config.seed_path {
        Some(path) => seed::apply(&db, &seed::load(path)?)?,
        None => TokenDirectory::new(),
    };
    if tokens.is_empty() {
        warn!("No API tokens configured, every request will be unauthenticated");
    }

    // -----------------------------------------------------------------------
    // 4. Wire services
    // -----------------------------------------------------------------------
    let notifier: Arc<dyn Notifier> = match &config.sms_api_key {
        Some(key) => Arc::new(SparrowSmsNotifier::new(
            config.sms_api_url.clone(),
            key.clone(),
            config.sms_sender.clone(),
        )?),
        None => {
            info!("SMS_API_KEY not set, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let store = Store::new(db, config.request_timeout);
    let http_addr = config.http_addr;
    let app_state = AppState::new(store, Arc::new(tokens), notifier, config);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
