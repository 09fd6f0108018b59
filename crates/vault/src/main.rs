//! `pii-vault`: service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (masked JSON logs, optional OTLP).
//! 3. Build the [`KeyRing`] from the configured keys; abort if invalid.
//! 4. Open the JSON-lines audit store.
//! 5. Spawn the audit retention task.
//! 6. Build the Axum router and start the HTTP server.
//!
//! [`KeyRing`]: vault::crypto::KeyRing

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use vault::audit::{self, AuditRecorder, AuditStore, JsonlAuditStore};
use vault::config::Config;
use vault::server::{self, state::AppState};
use vault::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "pii-vault starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key ring
    // -----------------------------------------------------------------------
    let ring = Arc::new(cfg.key_ring().context("invalid encryption key configuration")?);
    info!(
        active_key = %ring.active().fingerprint(),
        retired_keys = ring.retired().len(),
        "key ring loaded"
    );

    // -----------------------------------------------------------------------
    // 4. Audit store
    // -----------------------------------------------------------------------
    let store: Arc<dyn AuditStore> = Arc::new(
        JsonlAuditStore::open(&cfg.audit_log_path)
            .with_context(|| format!("failed to open audit log {}", cfg.audit_log_path))?,
    );
    if cfg.audit_fail_open {
        tracing::warn!("AUDIT_FAIL_OPEN is set; responses are served even if auditing fails");
    }

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _retention = audit::retention_task(
        Arc::clone(&store),
        cfg.audit_retention_days,
        cfg.audit_retention_interval(),
    );

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(
        ring,
        AuditRecorder::new(store),
        &cfg.default_phone_country_code,
        cfg.audit_fail_open,
    );
    let router = server::router::build(state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
