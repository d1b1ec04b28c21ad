//! Room derivation.
//!
//! Rooms are never stored on their own. A connection's rooms follow from its
//! identity, and an event's target rooms follow from its payload; membership
//! is resolved against the registry indices at delivery time.

use std::collections::BTreeSet;
use std::fmt;

use super::event::Event;
use super::identity::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
    Role(Role),
    User(String),
    Restaurant(String),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Role(role) => write!(f, "role:{}", role),
            RoomId::User(id) => write!(f, "user:{}", id),
            RoomId::Restaurant(id) => write!(f, "restaurant:{}", id),
        }
    }
}

/// Where an event goes: a set of rooms, or every authenticated connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomTarget {
    Rooms(BTreeSet<RoomId>),
    Everyone,
}

impl RoomTarget {
    pub fn rooms(&self) -> Option<&BTreeSet<RoomId>> {
        match self {
            RoomTarget::Rooms(rooms) => Some(rooms),
            RoomTarget::Everyone => None,
        }
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        match self {
            RoomTarget::Rooms(rooms) => rooms.contains(room),
            RoomTarget::Everyone => true,
        }
    }
}

/// Rooms a connection with this identity belongs to.
pub fn rooms_for_identity(identity: &Identity) -> BTreeSet<RoomId> {
    let mut rooms = BTreeSet::new();
    rooms.insert(RoomId::Role(identity.role));
    rooms.insert(RoomId::User(identity.id.clone()));
    if let Some(restaurant_id) = identity.owned_restaurant() {
        rooms.insert(RoomId::Restaurant(restaurant_id.to_string()));
    }
    rooms
}

/// Maps identities and events to rooms. Holds policy only, no connection state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomRouter {
    /// Whether `OrderCreated` also reaches the ordering customer's own room.
    notify_customer_on_create: bool,
}

impl RoomRouter {
    pub fn new(notify_customer_on_create: bool) -> Self {
        Self {
            notify_customer_on_create,
        }
    }

    pub fn notifies_customer_on_create(&self) -> bool {
        self.notify_customer_on_create
    }

    pub fn rooms_for_identity(&self, identity: &Identity) -> BTreeSet<RoomId> {
        rooms_for_identity(identity)
    }

    pub fn target_rooms_for(&self, event: &Event) -> RoomTarget {
        match event {
            Event::OrderCreated(order) => {
                let mut rooms = BTreeSet::new();
                rooms.insert(RoomId::Restaurant(order.restaurant_id.clone()));
                rooms.insert(RoomId::Role(Role::Rider));
                rooms.insert(RoomId::Role(Role::Admin));
                if self.notify_customer_on_create {
                    rooms.insert(RoomId::User(order.customer_id.clone()));
                }
                RoomTarget::Rooms(rooms)
            }
            Event::OrderStatusChanged(change) => {
                let mut rooms = BTreeSet::new();
                rooms.insert(RoomId::User(change.customer_id.clone()));
                rooms.insert(RoomId::Restaurant(change.restaurant_id.clone()));
                if let Some(rider_id) = change.rider_id.as_ref().filter(|id| !id.is_empty()) {
                    rooms.insert(RoomId::User(rider_id.clone()));
                }
                RoomTarget::Rooms(rooms)
            }
            Event::BroadcastMessage(broadcast) => match broadcast.target_role {
                Some(role) => RoomTarget::Rooms(BTreeSet::from([RoomId::Role(role)])),
                None => RoomTarget::Everyone,
            },
        }
    }
}
