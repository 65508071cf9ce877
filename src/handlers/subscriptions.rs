//! Subscription registry handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::Subscription;
use crate::router::AppState;
use crate::services::subscription_service::{CreateSubscriptionInput, UpdateSubscriptionInput};

/// Request body for registering a destination.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    pub destination_name: String,
    /// HTTPS endpoint URL.
    pub url: String,
    /// Shared signing secret; stored encrypted, never returned.
    pub secret: String,
}

/// Request body for updating a destination. Omitted fields are unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub destination_name: Option<String>,
    pub url: Option<String>,
    /// Rotates the signing secret. In-flight deliveries sign with whichever
    /// secret is current at send time.
    pub secret: Option<String>,
    pub active: Option<bool>,
}

/// Query parameters for listing subscriptions.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSubscriptionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub active: Option<bool>,
}

fn default_limit() -> i64 {
    50
}

/// A registered destination. The signing secret is never included.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub destination_name: String,
    pub url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Paginated subscription list.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionListResponse {
    pub items: Vec<SubscriptionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Register a new destination.
#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "Subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionResponse),
        (status = 400, description = "Invalid URL or request"),
    )
)]
pub async fn create_subscription_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionResponse>)> {
    let sub = state
        .subscription_service
        .create(CreateSubscriptionInput {
            destination_name: request.destination_name,
            url: request.url,
            secret: request.secret,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(subscription_to_response(sub))))
}

/// List destinations.
#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "Subscriptions",
    params(ListSubscriptionsQuery),
    responses(
        (status = 200, description = "Paginated subscription list", body = SubscriptionListResponse),
    )
)]
pub async fn list_subscriptions_handler(
    State(state): State<AppState>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> ApiResult<Json<SubscriptionListResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let (items, total) = state
        .subscription_service
        .list(limit, offset, query.active)
        .await?;

    Ok(Json(SubscriptionListResponse {
        items: items.into_iter().map(subscription_to_response).collect(),
        total,
        limit,
        offset,
    }))
}

/// Fetch a single destination.
#[utoipa::path(
    get,
    path = "/subscriptions/{id}",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn get_subscription_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let sub = state.subscription_service.get(id).await?;
    Ok(Json(subscription_to_response(sub)))
}

/// Update a destination.
#[utoipa::path(
    patch,
    path = "/subscriptions/{id}",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Updated subscription", body = SubscriptionResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn update_subscription_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let sub = state
        .subscription_service
        .update(
            id,
            UpdateSubscriptionInput {
                destination_name: request.destination_name,
                url: request.url,
                secret: request.secret,
                active: request.active,
            },
        )
        .await?;

    Ok(Json(subscription_to_response(sub)))
}

/// Deactivate a destination. Already-created deliveries are unaffected.
#[utoipa::path(
    post,
    path = "/subscriptions/{id}/deactivate",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Deactivated subscription", body = SubscriptionResponse),
        (status = 404, description = "Subscription not found"),
    )
)]
pub async fn deactivate_subscription_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let sub = state.subscription_service.deactivate(id).await?;
    Ok(Json(subscription_to_response(sub)))
}

/// Delete a destination. Rejected while deliveries reference it.
#[utoipa::path(
    delete,
    path = "/subscriptions/{id}",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 404, description = "Subscription not found"),
        (status = 409, description = "Deliveries still reference this subscription"),
    )
)]
pub async fn delete_subscription_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.subscription_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn subscription_to_response(sub: Subscription) -> SubscriptionResponse {
    SubscriptionResponse {
        id: sub.id,
        destination_name: sub.destination_name,
        url: sub.url,
        active: sub.active,
        created_at: sub.created_at,
        updated_at: sub.updated_at,
    }
}
