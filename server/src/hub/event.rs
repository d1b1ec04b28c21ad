//! Order-lifecycle events submitted for fan-out.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::{Identity, Role};

/// Fixed order status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivering,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Case-sensitive: `"pending"` is not a recognized status.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::Delivering => "DELIVERING",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// No further status changes are expected after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

/// Order record as handed over by the ordering application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    pub restaurant_id: String,
    #[serde(default)]
    pub restaurant_name: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub delivery_address: String,
    #[serde(default = "default_order_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

fn default_order_status() -> String {
    OrderStatus::Pending.as_str().to_string()
}

impl OrderDetails {
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        restaurant_id: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            customer_name: String::new(),
            restaurant_id: restaurant_id.into(),
            restaurant_name: String::new(),
            items: Vec::new(),
            total_amount: 0.0,
            delivery_address: String::new(),
            status: default_order_status(),
            created_at: None,
        }
    }
}

/// Status transition of an existing order, with its parties resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub rider_id: Option<String>,
    /// Raw status as submitted; checked against [`OrderStatus`] on submit.
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub message: String,
    pub target_role: Option<Role>,
}

/// Immutable fact submitted for fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    OrderCreated(OrderDetails),
    OrderStatusChanged(StatusChange),
    BroadcastMessage(Broadcast),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order_created",
            Event::OrderStatusChanged(_) => "order_status_changed",
            Event::BroadcastMessage(_) => "broadcast_message",
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            Event::OrderCreated(order) => Some(&order.order_id),
            Event::OrderStatusChanged(change) => Some(&change.order_id),
            Event::BroadcastMessage(_) => None,
        }
    }
}

/// Server-observed provenance attached to every dispatched event.
/// Client-supplied sender fields are never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub id: Uuid,
    pub sender: String,
    pub sender_role: Role,
    pub timestamp: String,
}

impl Stamp {
    pub fn now(source: &Identity) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: source.name.clone(),
            sender_role: source.role,
            timestamp: timestamp_now(),
        }
    }
}

/// RFC 3339 UTC timestamp with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
