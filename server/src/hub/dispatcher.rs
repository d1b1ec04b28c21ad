//! Event validation, stamping and fan-out.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ValidationError;
use super::event::{Event, OrderStatus, Stamp};
use super::identity::{Identity, Role};
use super::presence::PresenceSnapshot;
use super::registry::{ConnectionRegistry, Recipient};
use super::room::{RoomId, RoomTarget, RoomRouter};
use crate::proto::{OrderNotice, ServerMessage, StatusUpdatePayload, TestMessagePayload};

/// Number of distinct connections that accepted an event. Zero is valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub delivered: usize,
}

pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
    router: RoomRouter,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, router: RoomRouter) -> Self {
        Self { registry, router }
    }

    pub fn router(&self) -> &RoomRouter {
        &self.router
    }

    /// Validate, stamp and deliver an event on behalf of `source`.
    ///
    /// Invalid events are rejected before any delivery happens. Send failures
    /// on individual connections are logged and skipped; they never fail the
    /// submission.
    pub fn submit(&self, event: &Event, source: &Identity) -> Result<DeliveryReceipt, ValidationError> {
        let status = validate(event)?;
        let stamp = Stamp::now(source);
        let target = self.router.target_rooms_for(event);
        let recipients = self.registry.recipients(&target);

        let mut frames: Vec<(&'static str, String)> = Vec::new();
        let receipt = deliver(&recipients, |recipient| {
            let message = shape(event, status, &stamp, recipient.room.as_ref());
            let name = message.name();
            if let Some((_, frame)) = frames.iter().find(|(cached, _)| *cached == name) {
                return Some(frame.clone());
            }
            match message.to_frame() {
                Ok(frame) => {
                    frames.push((name, frame.clone()));
                    Some(frame)
                }
                Err(err) => {
                    tracing::error!(event = name, error = %err, "Failed to serialize event");
                    None
                }
            }
        });

        tracing::info!(
            kind = event.kind(),
            order_id = event.order_id().unwrap_or("-"),
            sender = %source.id,
            targets = recipients.len(),
            delivered = receipt.delivered,
            "Event dispatched"
        );
        Ok(receipt)
    }

    /// Deliver a ready-made message to every connection of one user.
    pub fn notify_user(&self, user_id: &str, message: &ServerMessage) -> DeliveryReceipt {
        let target = RoomTarget::Rooms([RoomId::User(user_id.to_string())].into());
        self.broadcast(&target, message)
    }

    /// Deliver a ready-made message, identical for every recipient.
    pub fn broadcast(&self, target: &RoomTarget, message: &ServerMessage) -> DeliveryReceipt {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(event = message.name(), error = %err, "Failed to serialize message");
                return DeliveryReceipt::default();
            }
        };
        let recipients = self.registry.recipients(target);
        deliver(&recipients, |_| Some(frame.clone()))
    }

    pub fn broadcast_presence(&self, snapshot: PresenceSnapshot) -> DeliveryReceipt {
        self.broadcast(&RoomTarget::Everyone, &ServerMessage::UserCountUpdate(snapshot))
    }
}

/// Check an event before dispatch. Returns the parsed status for status changes.
pub fn validate(event: &Event) -> Result<Option<OrderStatus>, ValidationError> {
    match event {
        Event::OrderCreated(order) => {
            require("orderId", &order.order_id)?;
            require("customerId", &order.customer_id)?;
            require("restaurantId", &order.restaurant_id)?;
            Ok(None)
        }
        Event::OrderStatusChanged(change) => {
            let status = OrderStatus::parse(&change.status)
                .ok_or_else(|| ValidationError::InvalidStatus(change.status.clone()))?;
            require("orderId", &change.order_id)?;
            require("customerId", &change.customer_id)?;
            require("restaurantId", &change.restaurant_id)?;
            Ok(Some(status))
        }
        Event::BroadcastMessage(broadcast) => {
            if broadcast.message.trim().is_empty() {
                return Err(ValidationError::EmptyMessage);
            }
            Ok(None)
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Build the frame one audience sees for an event.
fn shape(event: &Event, status: Option<OrderStatus>, stamp: &Stamp, room: Option<&RoomId>) -> ServerMessage {
    match event {
        Event::OrderCreated(order) => {
            let notice = OrderNotice {
                order: order.clone(),
                timestamp: stamp.timestamp.clone(),
                sent_by: stamp.sender.clone(),
                sent_by_role: stamp.sender_role,
            };
            match room {
                Some(RoomId::Restaurant(_)) => ServerMessage::NewOrder(notice),
                Some(RoomId::Role(Role::Rider)) => ServerMessage::OrderAvailable(notice),
                _ => ServerMessage::OrderCreated(notice),
            }
        }
        Event::OrderStatusChanged(change) => ServerMessage::OrderStatusUpdate(StatusUpdatePayload {
            order_id: change.order_id.clone(),
            status: status
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| change.status.clone()),
            message: change.message.clone(),
            updated_by: stamp.sender.clone(),
            updated_by_role: stamp.sender_role,
            timestamp: stamp.timestamp.clone(),
        }),
        Event::BroadcastMessage(broadcast) => ServerMessage::TestMessage(TestMessagePayload {
            id: stamp.id.to_string(),
            message: broadcast.message.clone(),
            sender: stamp.sender.clone(),
            sender_role: stamp.sender_role,
            timestamp: stamp.timestamp.clone(),
        }),
    }
}

/// Push one frame per recipient, isolating per-connection failures.
fn deliver(recipients: &[Recipient], mut frame_for: impl FnMut(&Recipient) -> Option<String>) -> DeliveryReceipt {
    let mut delivered = 0;
    for recipient in recipients {
        let Some(frame) = frame_for(recipient) else {
            continue;
        };
        match recipient.transport.send(frame) {
            Ok(()) => delivered += 1,
            Err(err) => {
                tracing::warn!(
                    connection = %recipient.handle,
                    room = ?recipient.room.as_ref().map(ToString::to_string),
                    error = %err,
                    "Delivery to connection failed"
                );
            }
        }
    }
    DeliveryReceipt { delivered }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::event::{Broadcast, OrderDetails, StatusChange};

    fn change(status: &str) -> Event {
        Event::OrderStatusChanged(StatusChange {
            order_id: "o1".into(),
            customer_id: "cust1".into(),
            restaurant_id: "r1".into(),
            rider_id: None,
            status: status.into(),
            message: None,
        })
    }

    #[test]
    fn test_validate_status() {
        assert_eq!(validate(&change("READY")), Ok(Some(OrderStatus::Ready)));
        assert_eq!(
            validate(&change("BOGUS")),
            Err(ValidationError::InvalidStatus("BOGUS".into()))
        );
    }

    #[test]
    fn test_validate_broadcast_body() {
        let blank = Event::BroadcastMessage(Broadcast {
            message: "   ".into(),
            target_role: None,
        });
        assert_eq!(validate(&blank), Err(ValidationError::EmptyMessage));
    }

    #[test]
    fn test_validate_order_ids() {
        let order = Event::OrderCreated(OrderDetails::new("o1", "", "r1"));
        assert_eq!(validate(&order), Err(ValidationError::MissingField("customerId")));
    }

    #[test]
    fn test_shape_per_audience() {
        let event = Event::OrderCreated(OrderDetails::new("o1", "cust1", "r1"));
        let stamp = Stamp::now(&Identity::new("cust1", "Alice", Role::Customer));

        let restaurant = shape(&event, None, &stamp, Some(&RoomId::Restaurant("r1".into())));
        let rider = shape(&event, None, &stamp, Some(&RoomId::Role(Role::Rider)));
        let admin = shape(&event, None, &stamp, Some(&RoomId::Role(Role::Admin)));

        assert_eq!(restaurant.name(), "newOrder");
        assert_eq!(rider.name(), "orderAvailable");
        assert_eq!(admin.name(), "orderCreated");
    }
}
