//! HTTP endpoints next to the WebSocket hub.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

use crate::hub::{Broadcast, DeliveryReceipt, Event, HubError, PresenceSnapshot};
use crate::proto::ClientMessage;
use crate::state::AppState;

/// Header carrying the internal API secret.
pub const HUB_TOKEN_HEADER: &str = "x-hub-token";

type ApiError = (StatusCode, Json<serde_json::Value>);

/// GET /api/presence — Current connection counts by role.
pub async fn get_presence(State(state): State<AppState>) -> Json<PresenceSnapshot> {
    Json(state.hub.presence())
}

/// POST /api/events — Submit an event from the order service.
/// Body: any non-`authenticate` client frame, e.g.
/// `{"event": "updateOrderStatus", "data": {"orderId": "o1", "status": "READY"}}`
pub async fn submit_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<ClientMessage>,
) -> Result<Json<DeliveryReceipt>, ApiError> {
    if let Some(expected) = &state.internal_token {
        let provided = headers
            .get(HUB_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!("Rejected internal event submission with bad token");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid hub token"})),
            ));
        }
    }

    let source = &state.service_identity;
    let result = match message {
        ClientMessage::Authenticate(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "authenticate is only valid on a WebSocket connection"})),
            ));
        }
        ClientMessage::SendTestMessage(request) => state.hub.submit_as(
            source,
            Event::BroadcastMessage(Broadcast {
                message: request.message,
                target_role: request.target_role,
            }),
        ),
        ClientMessage::SendOrderNotification(order) => {
            state.hub.submit_as(source, Event::OrderCreated(order))
        }
        ClientMessage::UpdateOrderStatus(request) => state.hub.update_order_status(source, request),
    };

    result.map(Json).map_err(|err: HubError| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": err.to_string()})),
        )
    })
}
