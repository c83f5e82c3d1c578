use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::accuracy::AccuracyStats;
use super::candidates::CandidateSource;
use super::combiner::PathWeights;
use super::domain::{CandidateId, DecisionId, DecisionType, TenantId, Transaction};
use super::ledger::LedgerError;
use super::secondary::SecondaryInference;
use super::service::{Correction, ReconciliationService, ServiceError};

/// Router builder exposing decision, correction and accuracy endpoints.
pub fn reconciliation_router<C, S>(service: Arc<ReconciliationService<C, S>>) -> Router
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    Router::new()
        .route("/api/v1/tenants/:tenant/match", post(match_handler::<C, S>))
        .route(
            "/api/v1/tenants/:tenant/categorize",
            post(categorize_handler::<C, S>),
        )
        .route(
            "/api/v1/tenants/:tenant/corrections",
            post(correction_handler::<C, S>),
        )
        .route(
            "/api/v1/tenants/:tenant/accuracy/:decision_type",
            get(accuracy_handler::<C, S>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CorrectionBody {
    decision_id: DecisionId,
    #[serde(default)]
    corrected_outcome: Option<CandidateId>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccuracyView {
    #[serde(flatten)]
    stats: AccuracyStats,
    weights: PathWeights,
}

pub(crate) async fn match_handler<C, S>(
    State(service): State<Arc<ReconciliationService<C, S>>>,
    Path(tenant): Path<String>,
    axum::Json(transaction): axum::Json<Transaction>,
) -> Response
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    decide(&service, TenantId(tenant), DecisionType::InvoiceMatch, transaction).await
}

pub(crate) async fn categorize_handler<C, S>(
    State(service): State<Arc<ReconciliationService<C, S>>>,
    Path(tenant): Path<String>,
    axum::Json(transaction): axum::Json<Transaction>,
) -> Response
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    decide(&service, TenantId(tenant), DecisionType::Categorization, transaction).await
}

async fn decide<C, S>(
    service: &ReconciliationService<C, S>,
    tenant_id: TenantId,
    decision_type: DecisionType,
    transaction: Transaction,
) -> Response
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    match service.decide(&tenant_id, decision_type, &transaction).await {
        Ok(decision) => (StatusCode::OK, axum::Json(decision)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn correction_handler<C, S>(
    State(service): State<Arc<ReconciliationService<C, S>>>,
    Path(tenant): Path<String>,
    axum::Json(body): axum::Json<CorrectionBody>,
) -> Response
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    let correction = Correction {
        tenant_id: TenantId(tenant),
        decision_id: body.decision_id,
        corrected_outcome: body.corrected_outcome,
    };
    match service.correct(correction) {
        Ok(receipt) => (StatusCode::ACCEPTED, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn accuracy_handler<C, S>(
    State(service): State<Arc<ReconciliationService<C, S>>>,
    Path((tenant, decision_type)): Path<(String, String)>,
) -> Response
where
    C: CandidateSource + 'static,
    S: SecondaryInference + 'static,
{
    let Some(decision_type) = DecisionType::parse(&decision_type) else {
        let payload = json!({
            "error": format!("unknown decision type {decision_type:?}"),
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    let tenant_id = TenantId(tenant);
    match service.accuracy(&tenant_id, decision_type) {
        Ok(stats) => {
            let view = AccuracyView {
                stats,
                weights: service.weights(&tenant_id, decision_type),
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: ServiceError) -> Response {
    let status = match &error {
        error if error.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Ledger(LedgerError::NotFound) => StatusCode::NOT_FOUND,
        ServiceError::Ledger(LedgerError::Conflict | LedgerError::CorrectionConflict) => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
