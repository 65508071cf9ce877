//! Producer-facing event append handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{Event, NewEvent};
use crate::router::AppState;

/// Request body for appending an event.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendEventRequest {
    /// Dotted event name, e.g. `donation.created`.
    pub event_name: String,
    /// Application user that triggered the event.
    pub user_id: i64,
    /// Emitting component, e.g. `enrollment-api`.
    pub source: String,
    /// Opaque event payload, delivered as-is.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// A stored event.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub id: Uuid,
    pub event_name: String,
    pub user_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append an event and fan it out to all active subscriptions.
///
/// Fire-and-forget for the producer: delivery happens asynchronously and
/// delivery failures never surface here.
#[utoipa::path(
    post,
    path = "/events",
    tag = "Events",
    request_body = AppendEventRequest,
    responses(
        (status = 202, description = "Event accepted and fanned out", body = EventResponse),
        (status = 400, description = "Invalid request"),
    )
)]
pub async fn append_event_handler(
    State(state): State<AppState>,
    Json(request): Json<AppendEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    let event = state
        .event_service
        .append(NewEvent {
            event_name: request.event_name,
            user_id: request.user_id,
            occurred_at: Utc::now(),
            source: request.source,
            payload: request.payload,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(event_to_response(event))))
}

/// Fetch a stored event.
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "Events",
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event", body = EventResponse),
        (status = 404, description = "Event not found"),
    )
)]
pub async fn get_event_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EventResponse>> {
    let event = state.event_service.get(id).await?;
    Ok(Json(event_to_response(event)))
}

fn event_to_response(event: Event) -> EventResponse {
    EventResponse {
        id: event.id,
        event_name: event.event_name,
        user_id: event.user_id,
        occurred_at: event.occurred_at,
        source: event.source,
        payload: event.payload,
        created_at: event.created_at,
    }
}
