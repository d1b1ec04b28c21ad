//! Wire protocol.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.
//! The same types are used by the server and by [`crate::client`].

use serde::{Deserialize, Serialize};

use crate::hub::event::OrderDetails;
use crate::hub::identity::{Identity, Role};
use crate::hub::presence::PresenceSnapshot;

/// Client → hub frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Authenticate(Identity),
    SendTestMessage(TestMessageRequest),
    SendOrderNotification(OrderDetails),
    UpdateOrderStatus(StatusUpdateRequest),
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate(_) => "authenticate",
            ClientMessage::SendTestMessage(_) => "sendTestMessage",
            ClientMessage::SendOrderNotification(_) => "sendOrderNotification",
            ClientMessage::UpdateOrderStatus(_) => "updateOrderStatus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMessageRequest {
    /// Missing body decodes as empty and is rejected on the `messageSent` echo.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_role: Option<Role>,
}

/// Status update as submitted. Party ids are optional; missing ones are
/// resolved from the order directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rider_id: Option<String>,
}

/// Hub → client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Authenticated(AuthenticatedPayload),
    UserCountUpdate(PresenceSnapshot),
    TestMessage(TestMessagePayload),
    /// OrderCreated as seen by the restaurant.
    NewOrder(OrderNotice),
    /// OrderCreated as seen by riders.
    OrderAvailable(OrderNotice),
    /// OrderCreated as seen by admins.
    OrderCreated(OrderNotice),
    OrderStatusUpdate(StatusUpdatePayload),
    MessageSent(Confirmation),
    OrderNotificationSent(Confirmation),
    RiderNotificationSent(Confirmation),
    StatusUpdateSent(Confirmation),
    Error(ErrorPayload),
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Authenticated(_) => "authenticated",
            ServerMessage::UserCountUpdate(_) => "userCountUpdate",
            ServerMessage::TestMessage(_) => "testMessage",
            ServerMessage::NewOrder(_) => "newOrder",
            ServerMessage::OrderAvailable(_) => "orderAvailable",
            ServerMessage::OrderCreated(_) => "orderCreated",
            ServerMessage::OrderStatusUpdate(_) => "orderStatusUpdate",
            ServerMessage::MessageSent(_) => "messageSent",
            ServerMessage::OrderNotificationSent(_) => "orderNotificationSent",
            ServerMessage::RiderNotificationSent(_) => "riderNotificationSent",
            ServerMessage::StatusUpdateSent(_) => "statusUpdateSent",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    pub connected_users: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMessagePayload {
    pub id: String,
    pub message: String,
    pub sender: String,
    pub sender_role: Role,
    pub timestamp: String,
}

/// Order payload shared by `newOrder`, `orderAvailable` and `orderCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotice {
    #[serde(flatten)]
    pub order: OrderDetails,
    pub timestamp: String,
    pub sent_by: String,
    pub sent_by_role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatePayload {
    pub order_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_by: String,
    pub updated_by_role: Role,
    pub timestamp: String,
}

/// Echo telling a submitter whether its own submission was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Confirmation {
    pub fn from_result<T, E: std::fmt::Display>(result: &Result<T, E>, order_id: Option<String>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                order_id,
                error: None,
            },
            Err(err) => Self {
                success: false,
                order_id,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
