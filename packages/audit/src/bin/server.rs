//! ALUSKORT Audit Server
//!
//! Runs the single-writer consumer, the verification schedules, and the
//! evidence API on port 8040.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aluskort_audit::api::{router, ApiState, AUDIT_API_PORT};
use aluskort_audit::storage::{
    PgAuditStore, DDL_APPEND_ONLY_TRIGGER, DDL_AUDIT_INDEXES, DDL_AUDIT_RECORDS, DDL_CHAIN_STATE,
    DDL_VERIFICATION_LOG,
};
use aluskort_audit::{AuditConsumer, AuditStore, ChainVerifier, EvidenceStore};
use aluskort_persistence::{DbClient, InMemoryBus, MemoryObjectStore, PlatformConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PlatformConfig::from_env().context("loading platform configuration")?;

    let db = DbClient::connect(&config.store_dsn, 16, Duration::from_secs(30))
        .await
        .context("connecting to audit store")?;
    for ddl in [
        DDL_AUDIT_RECORDS,
        DDL_AUDIT_INDEXES,
        DDL_APPEND_ONLY_TRIGGER,
        DDL_CHAIN_STATE,
        DDL_VERIFICATION_LOG,
    ] {
        db.execute(ddl).await.context("applying schema obligations")?;
    }
    let store = Arc::new(PgAuditStore::new(db));

    // The bus binding is deployment-specific; the in-process bus serves
    // single-node deployments, with the broker bridge feeding it.
    let bus = Arc::new(InMemoryBus::new());
    let objects = Arc::new(MemoryObjectStore::new(config.object_store_bucket.clone()));
    let evidence = Arc::new(EvidenceStore::new(objects.clone()));

    let consumer = Arc::new(
        AuditConsumer::new(bus.clone(), store.clone()).with_evidence_store(evidence.clone()),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let consumer_task = {
        let consumer = consumer.clone();
        tokio::spawn(async move { consumer.run(shutdown_rx).await })
    };

    // Verification schedules: continuous 5m, full daily, lag hourly.
    let verifier = Arc::new(
        ChainVerifier::new(store.clone())
            .with_bus(bus.clone())
            .with_object_store(objects.clone()),
    );
    let verification_task = {
        let verifier = verifier.clone();
        let store = store.clone();
        tokio::spawn(async move {
            let mut continuous = tokio::time::interval(Duration::from_secs(300));
            let mut lag = tokio::time::interval(Duration::from_secs(3600));
            let mut full = tokio::time::interval(Duration::from_secs(86_400));
            loop {
                tokio::select! {
                    _ = continuous.tick() => {
                        if let Ok(tenants) = store.tenants().await {
                            for tenant in tenants {
                                let _ = verifier.verify_recent(&tenant).await;
                            }
                        }
                    }
                    _ = lag.tick() => {
                        if let Ok(tenants) = store.tenants().await {
                            for tenant in tenants {
                                let _ = verifier.check_lag(&tenant).await;
                            }
                        }
                    }
                    _ = full.tick() => {
                        if let Ok(tenants) = store.tenants().await {
                            for tenant in tenants {
                                let _ = verifier.verify_full(&tenant).await;
                            }
                        }
                    }
                }
            }
        })
    };

    let app = router(ApiState { store })
        .layer(TraceLayer::new_for_http());
    let addr = format!("0.0.0.0:{AUDIT_API_PORT}");
    tracing::info!(addr = %addr, "audit server listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding audit API port")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving audit API")?;

    // Drain the consumer before exit.
    let _ = shutdown_tx.send(true);
    let _ = consumer_task.await;
    verification_task.abort();
    Ok(())
}
