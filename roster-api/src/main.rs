//! Roster API Server Entry Point
//!
//! Bootstraps logging and configuration, opens the entity store and starts
//! the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use roster_api::{create_api_router, init_tracing, ApiConfig, ApiError, ApiResult, TelemetryConfig};
use roster_storage::{DbConfig, EntityStore, InMemoryEntityStore, PostgresEntityStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let store = open_store().await?;
    let api_config = ApiConfig::from_env();

    let app: Router = create_api_router(store, &api_config)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Roster API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// `ROSTER_STORE=memory` selects the in-memory store; anything else opens
/// PostgreSQL from `ROSTER_DB_*` and makes sure the schema exists.
async fn open_store() -> ApiResult<Arc<dyn EntityStore>> {
    let kind = std::env::var("ROSTER_STORE").unwrap_or_else(|_| "postgres".to_string());
    if kind.eq_ignore_ascii_case("memory") {
        tracing::warn!("Using the in-memory store; data is lost on shutdown");
        return Ok(Arc::new(InMemoryEntityStore::new()));
    }

    let db_config = DbConfig::from_env();
    let store = PostgresEntityStore::from_config(&db_config).map_err(|e| {
        ApiError::internal_error(format!("Failed to create connection pool: {}", e))
    })?;
    store
        .ensure_schema()
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to prepare schema: {}", e)))?;
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        pool_size = store.pool_size(),
        "Connected to PostgreSQL"
    );
    Ok(Arc::new(store))
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("ROSTER_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("ROSTER_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
