//! Operator-facing delivery ledger handlers.
//!
//! The triage surface: list deliveries filterable by status (notably
//! `failed`), per-destination history, and full request/response snapshots
//! for a single row.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiResult, WebhookError};
use crate::models::{Delivery, DeliveryStatus, Subscription};
use crate::router::AppState;

/// Query parameters for delivery listings.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListDeliveriesQuery {
    /// Filter by status: `pending`, `sending`, `ok`, or `failed`.
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Delivery summary row.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub status: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<i16>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Full delivery detail including the captured HTTP exchange.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryDetailResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subscription_id: Uuid,
    pub status: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<i16>,
    #[schema(value_type = Option<Object>)]
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub latency_ms: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Paginated delivery list.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryListResponse {
    pub items: Vec<DeliveryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn validate_status_filter(status: Option<&str>) -> Result<Option<&str>, WebhookError> {
    match status {
        Some(s) => {
            DeliveryStatus::parse(s)
                .ok_or_else(|| WebhookError::Validation(format!("Unknown status: {s}")))?;
            Ok(Some(s))
        }
        None => Ok(None),
    }
}

/// List deliveries across all destinations, filterable by status.
#[utoipa::path(
    get,
    path = "/deliveries",
    tag = "Deliveries",
    params(ListDeliveriesQuery),
    responses(
        (status = 200, description = "Paginated delivery list", body = DeliveryListResponse),
        (status = 400, description = "Unknown status filter"),
    )
)]
pub async fn list_deliveries_handler(
    State(state): State<AppState>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<DeliveryListResponse>> {
    let status = validate_status_filter(query.status.as_deref())?;
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let items = Delivery::list(state.pool(), status, limit, offset).await?;
    let total = Delivery::count(state.pool(), status).await?;

    Ok(Json(DeliveryListResponse {
        items: items.into_iter().map(delivery_to_response).collect(),
        total,
        limit,
        offset,
    }))
}

/// Delivery history for one destination.
#[utoipa::path(
    get,
    path = "/subscriptions/{id}/deliveries",
    tag = "Deliveries",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ListDeliveriesQuery,
    ),
    responses(
        (status = 200, description = "Paginated delivery list", body = DeliveryListResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn list_subscription_deliveries_handler(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<DeliveryListResponse>> {
    Subscription::find_by_id(state.pool(), subscription_id)
        .await?
        .ok_or(WebhookError::SubscriptionNotFound)?;

    let status = validate_status_filter(query.status.as_deref())?;
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let items =
        Delivery::list_by_subscription(state.pool(), subscription_id, status, limit, offset)
            .await?;
    let total = Delivery::count_by_subscription(state.pool(), subscription_id, status).await?;

    Ok(Json(DeliveryListResponse {
        items: items.into_iter().map(delivery_to_response).collect(),
        total,
        limit,
        offset,
    }))
}

/// Full detail for one delivery, including the captured HTTP exchange.
#[utoipa::path(
    get,
    path = "/deliveries/{id}",
    tag = "Deliveries",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Delivery detail", body = DeliveryDetailResponse),
        (status = 404, description = "Delivery not found"),
    )
)]
pub async fn get_delivery_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeliveryDetailResponse>> {
    let delivery = Delivery::find_by_id(state.pool(), id)
        .await?
        .ok_or(WebhookError::DeliveryNotFound)?;

    Ok(Json(delivery_to_detail_response(delivery)))
}

fn delivery_to_response(d: Delivery) -> DeliveryResponse {
    DeliveryResponse {
        id: d.id,
        event_id: d.event_id,
        subscription_id: d.subscription_id,
        status: d.status,
        attempt_count: d.attempt_count,
        last_attempt_at: d.last_attempt_at,
        next_attempt_at: d.next_attempt_at,
        response_status: d.response_status,
        error_message: d.error_message,
        created_at: d.created_at,
        completed_at: d.completed_at,
    }
}

fn delivery_to_detail_response(d: Delivery) -> DeliveryDetailResponse {
    DeliveryDetailResponse {
        id: d.id,
        event_id: d.event_id,
        subscription_id: d.subscription_id,
        status: d.status,
        attempt_count: d.attempt_count,
        last_attempt_at: d.last_attempt_at,
        next_attempt_at: d.next_attempt_at,
        response_status: d.response_status,
        response_headers: d.response_headers,
        response_body: d.response_body,
        latency_ms: d.latency_ms,
        error_message: d.error_message,
        created_at: d.created_at,
        updated_at: d.updated_at,
        completed_at: d.completed_at,
    }
}
