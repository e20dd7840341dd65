//! HTTP surface of the tracker.
//!
//! - `GET /api/recover-stats`: dashboard stats
//! - `GET /api/invoices/{invoice_id}`: one invoice with its resolved status
//! - `POST /api/events`: inbound payment-lifecycle events
//! - `GET /health`: liveness

use crate::application::ingestor::{IngestOutcome, RecoveryIngestor};
use crate::application::query::{InvoiceView, QueryService};
use crate::domain::event::RecoveryEvent;
use crate::domain::record::InvoiceId;
use crate::domain::stats::Stats;
use crate::error::{RecoveryError, StorageError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<RecoveryIngestor>,
    pub query: QueryService,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recover-stats", get(recover_stats))
        .route("/api/invoices/{invoice_id}", get(invoice))
        .route("/api/events", post(ingest_event))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response wrapper mapping the crate's error taxonomy onto status codes.
#[derive(Debug)]
pub struct ApiError(RecoveryError);

impl From<RecoveryError> for ApiError {
    fn from(error: RecoveryError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RecoveryError::UnknownInvoice(_) => StatusCode::NOT_FOUND,
            RecoveryError::InvalidEvent(_) | RecoveryError::InvariantViolation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RecoveryError::Storage(StorageError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            RecoveryError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            RecoveryError::Csv(_) | RecoveryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn recover_stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.query.get_stats().await?))
}

async fn invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceView>, ApiError> {
    let invoice_id = InvoiceId::new(invoice_id)?;
    match state.query.get_invoice(&invoice_id).await? {
        Some(view) => Ok(Json(view)),
        None => Err(RecoveryError::UnknownInvoice(invoice_id).into()),
    }
}

async fn ingest_event(
    State(state): State<AppState>,
    payload: Result<Json<RecoveryEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let Json(event) =
        payload.map_err(|rejection| RecoveryError::InvalidEvent(rejection.body_text()))?;
    let outcome = state.ingestor.ingest(event).await?;
    let status = if outcome.changed_state() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::links::TokenLinkGenerator;
    use crate::config::LinkPolicy;
    use crate::infrastructure::in_memory::InMemoryRecordStore;
    use std::time::Duration;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: RecoveryError| ApiError::from(e).status();
        assert_eq!(
            status(RecoveryError::UnknownInvoice(InvoiceId::new("x").unwrap())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(RecoveryError::InvalidEvent("bad".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(
                StorageError::Timeout {
                    operation: "snapshot",
                    timeout: Duration::from_secs(1)
                }
                .into()
            ),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(StorageError::Backend("down".to_string()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_handlers_share_state() {
        let store: crate::domain::ports::RecordStoreRef = Arc::new(InMemoryRecordStore::new());
        let state = AppState {
            ingestor: Arc::new(RecoveryIngestor::new(
                Arc::clone(&store),
                Arc::new(TokenLinkGenerator::new("https://pay.test").unwrap()),
                LinkPolicy::Once,
                Duration::from_secs(1),
            )),
            query: QueryService::new(store, Duration::from_secs(1)),
        };

        let event: RecoveryEvent = serde_json::from_value(json!({
            "type": "payment_failed",
            "invoiceId": "inv-1",
            "customerEmail": "a@x.com"
        }))
        .unwrap();
        let (status, Json(outcome)) = ingest_event(State(state.clone()), Ok(Json(event)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(outcome, IngestOutcome::Opened);

        let Json(stats) = recover_stats(State(state)).await.unwrap();
        assert_eq!(stats.failed_payments.len(), 1);
    }
}
