use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use super::condition::AttributeMap;
use super::repository::{EntityId, InventoryRepository, PolicyId, PolicyRepository};
use super::service::{GovernanceError, GovernanceService};

/// Router builder exposing the classification and policy lifecycle
/// endpoints.
pub fn governance_router<I, P>(service: Arc<GovernanceService<I, P>>) -> Router
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/classifications",
            post(classify_handler::<I, P>),
        )
        .route(
            "/api/v1/inventory/:entity_id",
            get(inventory_handler::<I, P>),
        )
        .route(
            "/api/v1/inventory/:entity_id/validations",
            post(record_validation_handler::<I, P>),
        )
        .route("/api/v1/policies", post(submit_policy_handler::<I, P>))
        .route("/api/v1/policies/:policy_id", get(policy_handler::<I, P>))
        .route(
            "/api/v1/policies/:policy_id/analyze",
            post(analyze_handler::<I, P>),
        )
        .route(
            "/api/v1/policies/:policy_id/approve",
            post(approve_handler::<I, P>),
        )
        .route(
            "/api/v1/policies/:policy_id/preview",
            get(preview_handler::<I, P>),
        )
        .route(
            "/api/v1/policies/:policy_id/apply",
            post(apply_handler::<I, P>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassificationRequest {
    pub(crate) entity_id: String,
    pub(crate) name: String,
    pub(crate) attributes: AttributeMap,
    #[serde(default)]
    pub(crate) effective_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PolicySubmission {
    pub(crate) document: String,
    #[serde(default)]
    pub(crate) submitted_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidationRecord {
    pub(crate) validated_on: NaiveDate,
}

fn error_response(error: GovernanceError) -> Response {
    let payload = json!({ "error": error.to_string() });
    (error.status_code(), axum::Json(payload)).into_response()
}

pub(crate) async fn classify_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    axum::Json(request): axum::Json<ClassificationRequest>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    let effective_date = request
        .effective_date
        .unwrap_or_else(|| Local::now().date_naive());

    match service.classify_entity(
        EntityId(request.entity_id),
        request.name,
        &request.attributes,
        effective_date,
    ) {
        Ok(decision) => (StatusCode::CREATED, axum::Json(decision)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn inventory_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(entity_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.get_record(&EntityId(entity_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn record_validation_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(entity_id): Path<String>,
    axum::Json(request): axum::Json<ValidationRecord>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.record_validation(&EntityId(entity_id), request.validated_on) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_policy_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    axum::Json(request): axum::Json<PolicySubmission>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    let submitted_on = request
        .submitted_on
        .unwrap_or_else(|| Local::now().date_naive());

    match service.submit_policy(request.document, submitted_on) {
        Ok(policy) => (StatusCode::CREATED, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn policy_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.get_policy(&PolicyId(policy_id)) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn analyze_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.analyze_policy(&PolicyId(policy_id)) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.approve_policy(&PolicyId(policy_id)) {
        Ok(policy) => (StatusCode::OK, axum::Json(policy)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn preview_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.preview_policy(&PolicyId(policy_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn apply_handler<I, P>(
    State(service): State<Arc<GovernanceService<I, P>>>,
    Path(policy_id): Path<String>,
) -> Response
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    match service.apply_policy(&PolicyId(policy_id)) {
        Ok(report) => {
            let status = if report.success {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, axum::Json(report)).into_response()
        }
        Err(error) => error_response(error),
    }
}
