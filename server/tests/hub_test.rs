//! Hub behaviour against in-memory transports: routing, fan-out, presence,
//! failure isolation and the auth watchdog.

use order_hub_server::hub::{
    Broadcast, ConnHandle, ConnectionState, Event, Hub, HubError, HubSettings, Identity,
    OrderDetails, OrderStatus, PresenceSnapshot, Role, SendError, StatusChange, Transport,
    ValidationError,
};
use order_hub_server::proto::StatusUpdateRequest;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every frame it is handed.
#[derive(Default)]
struct RecordingTransport {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    /// Decoded frames with the given event name.
    fn events(&self, name: &str) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter(|value| value["event"] == name)
            .collect()
    }

    /// Frames other than presence updates.
    fn business_frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter(|value| value["event"] != "userCountUpdate")
            .collect()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: String) -> Result<(), SendError> {
        self.frames.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Always reports a full buffer.
struct FailingTransport;

impl Transport for FailingTransport {
    fn send(&self, _frame: String) -> Result<(), SendError> {
        Err(SendError::BufferFull)
    }

    fn close(&self) {}
}

fn customer(id: &str) -> Identity {
    Identity::new(id, format!("Customer {}", id), Role::Customer)
}

fn restaurant_owner(id: &str, restaurant_id: &str) -> Identity {
    Identity::new(id, format!("Owner {}", id), Role::Restaurant).with_restaurant(restaurant_id)
}

fn rider(id: &str) -> Identity {
    Identity::new(id, format!("Rider {}", id), Role::Rider)
}

fn admin(id: &str) -> Identity {
    Identity::new(id, format!("Admin {}", id), Role::Admin)
}

fn connect_as(hub: &Hub, identity: Identity) -> (ConnHandle, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let handle = hub.connect(transport.clone());
    hub.authenticate(handle, identity).expect("authenticate");
    (handle, transport)
}

fn order(order_id: &str, customer_id: &str, restaurant_id: &str) -> OrderDetails {
    let mut order = OrderDetails::new(order_id, customer_id, restaurant_id);
    order.customer_name = "Jane".to_string();
    order.restaurant_name = "Pizza Place".to_string();
    order.total_amount = 24.5;
    order
}

#[test]
fn test_no_leak_after_disconnect() {
    let hub = Hub::new(HubSettings::default());
    let (handle, transport) = connect_as(&hub, restaurant_owner("owner1", "r1"));
    assert_eq!(hub.presence().total, 1);

    assert!(hub.disconnect(handle));
    assert_eq!(hub.state(handle), ConnectionState::Disconnected);
    assert!(hub.registry().connections_for_user("owner1").is_empty());
    assert!(hub.registry().connections_for_role(Role::Restaurant).is_empty());
    assert!(hub.registry().connections_for_restaurant("r1").is_empty());
    assert_eq!(hub.presence().total, 0);

    // Events for the departed owner reach nobody
    let frames_before = transport.business_frames().len();
    let receipt = hub
        .submit_as(&admin("a1"), Event::OrderCreated(order("o1", "cust1", "r1")))
        .unwrap();
    assert_eq!(receipt.delivered, 0);
    assert_eq!(transport.business_frames().len(), frames_before);
}

#[test]
fn test_unauthenticated_disconnect_leaves_presence_untouched() {
    let hub = Hub::new(HubSettings::default());
    let (_admin_handle, admin_transport) = connect_as(&hub, admin("a1"));
    let updates_before = admin_transport.events("userCountUpdate").len();

    let anonymous = hub.connect(Arc::new(RecordingTransport::default()));
    assert_eq!(hub.presence().total, 1);
    assert!(hub.disconnect(anonymous));
    assert_eq!(hub.presence().total, 1);
    assert_eq!(admin_transport.events("userCountUpdate").len(), updates_before);

    // Second disconnect of the same handle is a no-op
    assert!(!hub.disconnect(anonymous));
}

#[test]
fn test_notify_user_reaches_every_connection() {
    let hub = Hub::new(HubSettings::default());
    let (_, phone) = connect_as(&hub, customer("cust1"));
    let (_, laptop) = connect_as(&hub, customer("cust1"));
    let (_, other) = connect_as(&hub, customer("cust2"));

    let receipt = hub
        .submit_as(
            &restaurant_owner("owner1", "r1"),
            Event::OrderStatusChanged(StatusChange {
                order_id: "o1".to_string(),
                customer_id: "cust1".to_string(),
                restaurant_id: "r1".to_string(),
                rider_id: None,
                status: "CONFIRMED".to_string(),
                message: Some("Order confirmed".to_string()),
            }),
        )
        .unwrap();

    assert_eq!(receipt.delivered, 2);
    assert_eq!(phone.events("orderStatusUpdate").len(), 1);
    assert_eq!(laptop.events("orderStatusUpdate").len(), 1);
    assert!(other.events("orderStatusUpdate").is_empty());
}

#[test]
fn test_second_authenticate_is_rejected_and_rooms_unchanged() {
    let hub = Hub::new(HubSettings::default());
    let (handle, _) = connect_as(&hub, customer("cust1"));
    let rooms_before = hub.registry().rooms_of(handle).unwrap();

    let err = hub.authenticate(handle, admin("cust1")).unwrap_err();
    assert!(matches!(
        err,
        HubError::Registry(order_hub_server::hub::RegistryError::AlreadyAuthenticated)
    ));
    assert_eq!(hub.registry().rooms_of(handle).unwrap(), rooms_before);
    assert_eq!(hub.registry().identity(handle).unwrap().role, Role::Customer);
    assert!(hub.registry().connections_for_role(Role::Admin).is_empty());
}

#[test]
fn test_invalid_status_delivers_nothing() {
    let hub = Hub::new(HubSettings::default());
    let (_, customer_transport) = connect_as(&hub, customer("cust1"));
    let (_, owner_transport) = connect_as(&hub, restaurant_owner("owner1", "r1"));

    let err = hub
        .submit_as(
            &admin("a1"),
            Event::OrderStatusChanged(StatusChange {
                order_id: "o1".to_string(),
                customer_id: "cust1".to_string(),
                restaurant_id: "r1".to_string(),
                rider_id: None,
                status: "BOGUS".to_string(),
                message: None,
            }),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        HubError::Validation(ValidationError::InvalidStatus(ref s)) if s == "BOGUS"
    ));
    assert!(customer_transport.business_frames().is_empty());
    assert!(owner_transport.business_frames().is_empty());
}

#[test]
fn test_failed_recipient_does_not_block_others() {
    let hub = Hub::new(HubSettings::default());
    let (_, first) = connect_as(&hub, rider("rider1"));

    let failing = hub.connect(Arc::new(FailingTransport));
    hub.authenticate(failing, rider("rider2")).unwrap();

    let (_, third) = connect_as(&hub, rider("rider3"));

    let receipt = hub
        .submit_as(
            &admin("a1"),
            Event::BroadcastMessage(Broadcast {
                message: "Rain expected, drive safe".to_string(),
                target_role: Some(Role::Rider),
            }),
        )
        .unwrap();

    assert_eq!(receipt.delivered, 2);
    assert_eq!(first.events("testMessage").len(), 1);
    assert_eq!(third.events("testMessage").len(), 1);
    // The failing connection stays registered
    assert_eq!(hub.state(failing), ConnectionState::Authenticated);
}

#[test]
fn test_order_created_reaches_owner_riders_and_admins_only() {
    let hub = Hub::new(HubSettings::default());
    let (_, owner) = connect_as(&hub, restaurant_owner("owner1", "r1"));
    let (_, other_owner) = connect_as(&hub, restaurant_owner("owner2", "r2"));
    let (_, rider_transport) = connect_as(&hub, rider("rider1"));
    let (_, admin_transport) = connect_as(&hub, admin("a1"));
    let (customer_handle, customer_transport) = connect_as(&hub, customer("cust1"));

    let receipt = hub
        .submit(customer_handle, Event::OrderCreated(order("o1", "cust1", "r1")))
        .unwrap();
    assert_eq!(receipt.delivered, 3);

    let new_orders = owner.events("newOrder");
    assert_eq!(new_orders.len(), 1);
    assert_eq!(new_orders[0]["data"]["orderId"], "o1");
    assert_eq!(new_orders[0]["data"]["sentBy"], "Customer cust1");
    assert_eq!(new_orders[0]["data"]["sentByRole"], "CUSTOMER");
    assert_eq!(new_orders[0]["data"]["restaurantName"], "Pizza Place");

    assert_eq!(rider_transport.events("orderAvailable").len(), 1);
    assert_eq!(admin_transport.events("orderCreated").len(), 1);
    assert!(other_owner.business_frames().is_empty());
    assert!(customer_transport.business_frames().is_empty());
}

#[test]
fn test_order_created_reaches_customer_when_enabled() {
    let hub = Hub::new(HubSettings {
        notify_customer_on_create: true,
        ..HubSettings::default()
    });
    let (_, owner) = connect_as(&hub, restaurant_owner("owner1", "r1"));
    let (customer_handle, customer_transport) = connect_as(&hub, customer("cust1"));

    let receipt = hub
        .submit(customer_handle, Event::OrderCreated(order("o1", "cust1", "r1")))
        .unwrap();

    assert_eq!(receipt.delivered, 2);
    assert_eq!(owner.events("newOrder").len(), 1);
    assert_eq!(customer_transport.events("orderCreated").len(), 1);
}

#[test]
fn test_presence_counts() {
    let hub = Hub::new(HubSettings::default());
    let (_, watcher) = connect_as(&hub, admin("a1"));
    connect_as(&hub, customer("cust1"));
    connect_as(&hub, customer("cust2"));
    let (rider_handle, _) = connect_as(&hub, rider("rider1"));
    connect_as(&hub, restaurant_owner("owner1", "r1"));

    let snapshot = hub.presence();
    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.customers, 2);
    assert_eq!(snapshot.riders, 1);
    assert_eq!(snapshot.restaurants, 1);
    assert_eq!(snapshot.admins, 1);

    hub.disconnect(rider_handle);

    let updates = watcher.events("userCountUpdate");
    let last = updates.last().unwrap();
    assert_eq!(last["data"]["total"], 4);
    assert_eq!(last["data"]["riders"], 0);
    assert_eq!(last["data"]["customers"], 2);
}

#[test]
fn test_presence_customer_and_rider() {
    let hub = Hub::new(HubSettings::default());
    assert_eq!(hub.presence(), PresenceSnapshot::default());

    let (_, customer_transport) = connect_as(&hub, customer("cust1"));
    connect_as(&hub, rider("rider1"));

    let expected = PresenceSnapshot {
        total: 2,
        customers: 1,
        restaurants: 0,
        riders: 1,
        admins: 0,
    };
    assert_eq!(hub.presence(), expected);

    let updates = customer_transport.events("userCountUpdate");
    assert_eq!(
        updates.last().unwrap()["data"],
        serde_json::json!({"total": 2, "customers": 1, "restaurants": 0, "riders": 1, "admins": 0})
    );
}

#[test]
fn test_stamp_overrides_client_provenance() {
    let hub = Hub::new(HubSettings::default());
    let (_, customer_transport) = connect_as(&hub, customer("cust1"));
    let (owner_handle, _) = connect_as(&hub, restaurant_owner("owner1", "r1"));

    hub.update_order_status(
        &hub.submitter(owner_handle).unwrap(),
        StatusUpdateRequest {
            order_id: "o1".to_string(),
            status: OrderStatus::Preparing.as_str().to_string(),
            customer_id: Some("cust1".to_string()),
            restaurant_id: Some("r1".to_string()),
            ..StatusUpdateRequest::default()
        },
    )
    .unwrap();

    let updates = customer_transport.events("orderStatusUpdate");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["data"]["updatedBy"], "Owner owner1");
    assert_eq!(updates[0]["data"]["updatedByRole"], "RESTAURANT");
    assert!(updates[0]["data"]["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn test_status_update_routed_through_order_directory() {
    let hub = Hub::new(HubSettings::default());
    let (_, customer_transport) = connect_as(&hub, customer("cust1"));
    let (owner_handle, owner_transport) = connect_as(&hub, restaurant_owner("owner1", "r1"));
    let (_, rider_transport) = connect_as(&hub, rider("rider1"));
    let owner = hub.submitter(owner_handle).unwrap();

    hub.submit_as(&customer("cust1"), Event::OrderCreated(order("o1", "cust1", "r1")))
        .unwrap();
    assert!(hub.orders().lookup("o1").is_some());

    // Bare update: parties come from the directory
    let receipt = hub
        .update_order_status(
            &owner,
            StatusUpdateRequest {
                order_id: "o1".to_string(),
                status: "READY".to_string(),
                ..StatusUpdateRequest::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.delivered, 2);
    assert_eq!(customer_transport.events("orderStatusUpdate").len(), 1);
    assert_eq!(owner_transport.events("orderStatusUpdate").len(), 1);

    // Rider assignment is remembered for later updates
    let receipt = hub
        .update_order_status(
            &owner,
            StatusUpdateRequest {
                order_id: "o1".to_string(),
                status: "DELIVERING".to_string(),
                rider_id: Some("rider1".to_string()),
                ..StatusUpdateRequest::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.delivered, 3);
    assert_eq!(
        hub.orders().lookup("o1").unwrap().rider_id.as_deref(),
        Some("rider1")
    );

    let receipt = hub
        .update_order_status(
            &rider("rider1"),
            StatusUpdateRequest {
                order_id: "o1".to_string(),
                status: "DELIVERED".to_string(),
                ..StatusUpdateRequest::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.delivered, 3);
    assert_eq!(rider_transport.events("orderStatusUpdate").len(), 2);

    // Terminal status evicts the order
    assert!(hub.orders().lookup("o1").is_none());
    let err = hub
        .update_order_status(
            &owner,
            StatusUpdateRequest {
                order_id: "o1".to_string(),
                status: "READY".to_string(),
                ..StatusUpdateRequest::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        HubError::Validation(ValidationError::UnknownOrder(ref id)) if id == "o1"
    ));
}

#[test]
fn test_shutdown_closes_every_transport() {
    let hub = Hub::new(HubSettings::default());
    let (_, a) = connect_as(&hub, customer("cust1"));
    let b = Arc::new(RecordingTransport::default());
    hub.connect(b.clone());

    hub.shutdown();
    assert!(a.is_closed());
    assert!(b.is_closed());
}

#[tokio::test]
async fn test_watchdog_closes_unauthenticated_connection() {
    let hub = Arc::new(Hub::new(HubSettings {
        auth_timeout: Duration::from_millis(50),
        ..HubSettings::default()
    }));
    let transport = Arc::new(RecordingTransport::default());
    let handle = hub.connect(transport.clone());
    let watchdog = hub.spawn_auth_watchdog(handle);

    watchdog.await.unwrap();
    assert!(transport.is_closed());
    assert_eq!(hub.state(handle), ConnectionState::Disconnected);
    assert!(hub.registry().is_empty());
}

#[tokio::test]
async fn test_watchdog_spares_authenticated_connection() {
    let hub = Arc::new(Hub::new(HubSettings {
        auth_timeout: Duration::from_millis(50),
        ..HubSettings::default()
    }));
    let transport = Arc::new(RecordingTransport::default());
    let handle = hub.connect(transport.clone());
    let watchdog = hub.spawn_auth_watchdog(handle);
    hub.authenticate(handle, customer("cust1")).unwrap();

    watchdog.await.unwrap();
    assert!(!transport.is_closed());
    assert_eq!(hub.state(handle), ConnectionState::Authenticated);
}
