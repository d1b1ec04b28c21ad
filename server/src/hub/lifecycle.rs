//! Connection lifecycle: `Connecting -> Authenticated -> Disconnected`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::dispatcher::{DeliveryReceipt, EventDispatcher};
use super::error::{HubError, ValidationError};
use super::event::{Event, OrderStatus, StatusChange};
use super::identity::Identity;
use super::orders::{InMemoryOrderDirectory, OrderDirectory, OrderParties, DEFAULT_ORDER_CAPACITY};
use super::presence::PresenceSnapshot;
use super::registry::{ConnHandle, ConnectionRegistry};
use super::room::{RoomId, RoomRouter};
use super::transport::Transport;
use crate::proto::StatusUpdateRequest;

/// Default grace period for a connection to authenticate.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    /// Terminal. Also reported for handles the hub has never seen.
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub auth_timeout: Duration,
    pub notify_customer_on_create: bool,
    /// Live orders kept by the default in-memory order directory.
    pub order_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            notify_customer_on_create: false,
            order_capacity: DEFAULT_ORDER_CAPACITY,
        }
    }
}

/// Result of a successful `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub identity: Identity,
    pub rooms: BTreeSet<RoomId>,
    pub connected_users: usize,
}

/// The notification hub: owns the registry, drives per-connection state and
/// routes submissions through the dispatcher.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    dispatcher: EventDispatcher,
    orders: Arc<dyn OrderDirectory>,
    auth_timeout: Duration,
}

impl Hub {
    pub fn new(settings: HubSettings) -> Self {
        let orders = InMemoryOrderDirectory::with_capacity(settings.order_capacity);
        Self::with_order_directory(settings, Arc::new(orders))
    }

    pub fn with_order_directory(settings: HubSettings, orders: Arc<dyn OrderDirectory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = RoomRouter::new(settings.notify_customer_on_create);
        Self {
            dispatcher: EventDispatcher::new(registry.clone(), router),
            registry,
            orders,
            auth_timeout: settings.auth_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn orders(&self) -> &Arc<dyn OrderDirectory> {
        &self.orders
    }

    pub fn auth_timeout(&self) -> Duration {
        self.auth_timeout
    }

    /// Transport connected: track it as `Connecting`.
    pub fn connect(&self, transport: Arc<dyn Transport>) -> ConnHandle {
        let handle = ConnHandle::new();
        self.registry.register(handle, transport);
        tracing::info!(connection = %handle, "Connection opened");
        handle
    }

    pub fn state(&self, handle: ConnHandle) -> ConnectionState {
        match self.registry.get(handle) {
            Some(info) if info.is_authenticated() => ConnectionState::Authenticated,
            Some(_) => ConnectionState::Connecting,
            None => ConnectionState::Disconnected,
        }
    }

    pub fn presence(&self) -> PresenceSnapshot {
        self.registry.presence_snapshot()
    }

    /// `Connecting -> Authenticated`. Joins the identity's rooms and
    /// broadcasts the new presence counts to everyone.
    pub fn authenticate(&self, handle: ConnHandle, identity: Identity) -> Result<AuthOutcome, HubError> {
        let identity = identity.normalized()?;
        let rooms = self.registry.attach_identity(handle, identity.clone())?;
        let snapshot = self.registry.presence_snapshot();

        tracing::info!(
            connection = %handle,
            user_id = %identity.id,
            role = %identity.role,
            connected_users = snapshot.total,
            "Connection authenticated"
        );
        self.dispatcher.broadcast_presence(snapshot);

        Ok(AuthOutcome {
            identity,
            rooms,
            connected_users: snapshot.total,
        })
    }

    /// `* -> Disconnected`. Presence is only re-broadcast when the connection
    /// had been counted. Unknown handles are ignored.
    pub fn disconnect(&self, handle: ConnHandle) -> bool {
        let Some(info) = self.registry.unregister(handle) else {
            tracing::debug!(connection = %handle, "Disconnect for unregistered connection");
            return false;
        };

        match info.identity {
            Some(identity) => {
                let snapshot = self.registry.presence_snapshot();
                tracing::info!(
                    connection = %handle,
                    user_id = %identity.id,
                    connected_users = snapshot.total,
                    "Connection closed"
                );
                self.dispatcher.broadcast_presence(snapshot);
            }
            None => {
                tracing::info!(connection = %handle, "Unauthenticated connection closed");
            }
        }
        true
    }

    /// Identity to submit as, for an authenticated connection.
    pub fn submitter(&self, handle: ConnHandle) -> Result<Identity, HubError> {
        self.registry.identity(handle).ok_or(HubError::NotAuthenticated)
    }

    pub fn submit(&self, handle: ConnHandle, event: Event) -> Result<DeliveryReceipt, HubError> {
        let source = self.submitter(handle)?;
        self.submit_as(&source, event)
    }

    /// Submit on behalf of an identity that is not a live connection
    /// (the internal order service).
    pub fn submit_as(&self, source: &Identity, event: Event) -> Result<DeliveryReceipt, HubError> {
        let receipt = self.dispatcher.submit(&event, source)?;
        self.record_order(&event);
        Ok(receipt)
    }

    /// Route a status update that may only carry the order id.
    ///
    /// Party ids present on the request take precedence over the directory.
    pub fn update_order_status(
        &self,
        source: &Identity,
        request: StatusUpdateRequest,
    ) -> Result<DeliveryReceipt, HubError> {
        if OrderStatus::parse(&request.status).is_none() {
            return Err(ValidationError::InvalidStatus(request.status).into());
        }

        let known = self.orders.lookup(&request.order_id);
        let customer_id = request
            .customer_id
            .or_else(|| known.as_ref().map(|p| p.customer_id.clone()));
        let restaurant_id = request
            .restaurant_id
            .or_else(|| known.as_ref().map(|p| p.restaurant_id.clone()));
        let rider_id = request
            .rider_id
            .or_else(|| known.as_ref().and_then(|p| p.rider_id.clone()));

        let (Some(customer_id), Some(restaurant_id)) = (customer_id, restaurant_id) else {
            return Err(ValidationError::UnknownOrder(request.order_id).into());
        };

        let event = Event::OrderStatusChanged(StatusChange {
            order_id: request.order_id,
            customer_id,
            restaurant_id,
            rider_id,
            status: request.status,
            message: request.message,
        });
        self.submit_as(source, event)
    }

    /// Close and drop the connection if it is still unauthenticated once the
    /// grace period has elapsed.
    pub fn spawn_auth_watchdog(self: &Arc<Self>, handle: ConnHandle) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(hub.auth_timeout).await;
            if let Some((info, transport)) = hub.registry.unregister_if_unauthenticated(handle) {
                tracing::warn!(
                    connection = %handle,
                    connected_at = %info.connected_at,
                    timeout_secs = hub.auth_timeout.as_secs_f64(),
                    "Authentication timeout, closing connection"
                );
                transport.close();
            }
        })
    }

    /// Close every live connection.
    pub fn shutdown(&self) {
        tracing::info!(connections = self.registry.len(), "Closing all connections");
        self.registry.close_all();
    }

    fn record_order(&self, event: &Event) {
        match event {
            Event::OrderCreated(order) => self.orders.remember(OrderParties {
                order_id: order.order_id.clone(),
                customer_id: order.customer_id.clone(),
                restaurant_id: order.restaurant_id.clone(),
                rider_id: None,
            }),
            Event::OrderStatusChanged(change) => {
                let terminal = OrderStatus::parse(&change.status).is_some_and(|s| s.is_terminal());
                if terminal {
                    self.orders.forget(&change.order_id);
                } else if let Some(rider_id) = change.rider_id.as_deref().filter(|id| !id.is_empty()) {
                    self.orders.assign_rider(&change.order_id, rider_id);
                }
            }
            Event::BroadcastMessage(_) => {}
        }
    }
}
