//! Real-time order notification hub.
//!
//! - `registry`: live connections indexed by user, role and restaurant
//! - `room`: identity → rooms, event → target rooms
//! - `dispatcher`: validation, stamping and fan-out
//! - `lifecycle`: per-connection state machine and the [`Hub`] entry point

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod identity;
pub mod lifecycle;
pub mod orders;
pub mod presence;
pub mod registry;
pub mod room;
pub mod transport;

pub use dispatcher::{DeliveryReceipt, EventDispatcher};
pub use error::{HubError, RegistryError, ValidationError};
pub use event::{Broadcast, Event, OrderDetails, OrderItem, OrderStatus, StatusChange};
pub use identity::{Identity, Role};
pub use lifecycle::{AuthOutcome, ConnectionState, Hub, HubSettings};
pub use orders::{InMemoryOrderDirectory, OrderDirectory, OrderParties};
pub use presence::PresenceSnapshot;
pub use registry::{ConnHandle, ConnectionInfo, ConnectionRegistry};
pub use room::{RoomId, RoomRouter, RoomTarget};
pub use transport::{SendError, Transport};
