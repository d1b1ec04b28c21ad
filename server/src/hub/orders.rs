use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Parties of a live order, used to route status updates that only name the
/// order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParties {
    pub order_id: String,
    pub customer_id: String,
    pub restaurant_id: String,
    pub rider_id: Option<String>,
}

/// Lookup seam onto the order store owned by the ordering application.
pub trait OrderDirectory: Send + Sync {
    fn remember(&self, parties: OrderParties);

    fn lookup(&self, order_id: &str) -> Option<OrderParties>;

    fn assign_rider(&self, order_id: &str, rider_id: &str);

    fn forget(&self, order_id: &str);
}

/// Default number of live orders the in-memory directory keeps.
pub const DEFAULT_ORDER_CAPACITY: usize = 10_000;

/// Directory fed by the events flowing through the hub itself. Holds live
/// orders only; the hub forgets an order once it reaches a terminal status.
/// Orders the ordering application never finishes are evicted oldest first
/// once `capacity` is reached.
#[derive(Debug)]
pub struct InMemoryOrderDirectory {
    inner: RwLock<Entries>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Entries {
    orders: HashMap<String, OrderParties>,
    /// Order ids in arrival order.
    arrival: VecDeque<String>,
}

impl Default for InMemoryOrderDirectory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ORDER_CAPACITY)
    }
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderDirectory for InMemoryOrderDirectory {
    fn remember(&self, parties: OrderParties) {
        let mut inner = self.inner.write();
        let order_id = parties.order_id.clone();
        if inner.orders.insert(order_id.clone(), parties).is_some() {
            return;
        }
        inner.arrival.push_back(order_id);

        while inner.orders.len() > self.capacity {
            let Some(oldest) = inner.arrival.pop_front() else {
                break;
            };
            inner.orders.remove(&oldest);
            tracing::debug!(order_id = %oldest, "Order directory full, evicted oldest order");
        }
    }

    fn lookup(&self, order_id: &str) -> Option<OrderParties> {
        self.inner.read().orders.get(order_id).cloned()
    }

    fn assign_rider(&self, order_id: &str, rider_id: &str) {
        if let Some(parties) = self.inner.write().orders.get_mut(order_id) {
            parties.rider_id = Some(rider_id.to_string());
        }
    }

    fn forget(&self, order_id: &str) {
        let mut inner = self.inner.write();
        if inner.orders.remove(order_id).is_some() {
            inner.arrival.retain(|id| id != order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties(order_id: &str) -> OrderParties {
        OrderParties {
            order_id: order_id.to_string(),
            customer_id: "cust1".to_string(),
            restaurant_id: "r1".to_string(),
            rider_id: None,
        }
    }

    #[test]
    fn test_remember_and_lookup() {
        let directory = InMemoryOrderDirectory::new();
        directory.remember(parties("o1"));

        assert_eq!(directory.lookup("o1"), Some(parties("o1")));
        assert_eq!(directory.lookup("o2"), None);
    }

    #[test]
    fn test_assign_rider_only_for_known_orders() {
        let directory = InMemoryOrderDirectory::new();
        directory.remember(parties("o1"));

        directory.assign_rider("o1", "rider7");
        directory.assign_rider("o2", "rider7");

        assert_eq!(
            directory.lookup("o1").and_then(|p| p.rider_id),
            Some("rider7".to_string())
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_forget() {
        let directory = InMemoryOrderDirectory::new();
        directory.remember(parties("o1"));
        directory.forget("o1");
        directory.forget("o1");
        assert!(directory.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest_order() {
        let directory = InMemoryOrderDirectory::with_capacity(2);
        directory.remember(parties("o1"));
        directory.remember(parties("o2"));
        directory.forget("o2");
        directory.remember(parties("o3"));
        // Re-remembering a known order keeps its arrival slot
        directory.remember(parties("o1"));
        directory.remember(parties("o4"));

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.lookup("o1"), None);
        assert!(directory.lookup("o3").is_some());
        assert!(directory.lookup("o4").is_some());
    }
}
