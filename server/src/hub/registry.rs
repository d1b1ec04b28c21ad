//! Connection registry: the single source of truth for who is connected.
//!
//! All maps live behind one `RwLock` so that an identity is indexed by user,
//! role and restaurant atomically. Mutations (`register`, `attach_identity`,
//! `unregister`) take the write lock for the index update only; reads take the
//! read lock and clone out what they need. Transports are never called while
//! the lock is held.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use uuid::Uuid;

use super::error::RegistryError;
use super::identity::{Identity, Role};
use super::presence::PresenceSnapshot;
use super::room::{rooms_for_identity, RoomId, RoomTarget};
use super::transport::Transport;

/// Opaque handle of one transport session. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(Uuid);

impl ConnHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Live connection entry.
struct Connection {
    identity: Option<Identity>,
    rooms: BTreeSet<RoomId>,
    connected_at: DateTime<Utc>,
    transport: Arc<dyn Transport>,
}

impl Connection {
    fn info(&self, handle: ConnHandle) -> ConnectionInfo {
        ConnectionInfo {
            handle,
            identity: self.identity.clone(),
            rooms: self.rooms.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Point-in-time copy of a connection entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub handle: ConnHandle,
    pub identity: Option<Identity>,
    pub rooms: BTreeSet<RoomId>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// One delivery target resolved from a [`RoomTarget`].
#[derive(Clone)]
pub struct Recipient {
    pub handle: ConnHandle,
    /// Room through which the connection was reached; `None` for `Everyone`.
    pub room: Option<RoomId>,
    pub transport: Arc<dyn Transport>,
}

#[derive(Default)]
struct Indices {
    connections: HashMap<ConnHandle, Connection>,
    by_user: HashMap<String, HashSet<ConnHandle>>,
    by_role: HashMap<Role, HashSet<ConnHandle>>,
    by_restaurant: HashMap<String, HashSet<ConnHandle>>,
}

impl Indices {
    fn members(&self, room: &RoomId) -> Option<&HashSet<ConnHandle>> {
        match room {
            RoomId::Role(role) => self.by_role.get(role),
            RoomId::User(id) => self.by_user.get(id),
            RoomId::Restaurant(id) => self.by_restaurant.get(id),
        }
    }

    fn unindex(&mut self, handle: &ConnHandle, identity: &Identity) {
        remove_from_bucket(&mut self.by_user, identity.id.as_str(), handle);
        remove_from_bucket(&mut self.by_role, &identity.role, handle);
        if let Some(restaurant_id) = identity.owned_restaurant() {
            remove_from_bucket(&mut self.by_restaurant, restaurant_id, handle);
        }
    }
}

/// Remove a handle from an index bucket, pruning the bucket once empty.
fn remove_from_bucket<K, Q>(index: &mut HashMap<K, HashSet<ConnHandle>>, key: &Q, handle: &ConnHandle)
where
    K: Borrow<Q> + Eq + Hash,
    Q: Eq + Hash + ?Sized,
{
    if let Some(bucket) = index.get_mut(key) {
        bucket.remove(handle);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Indices>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly connected, unauthenticated connection.
    pub fn register(&self, handle: ConnHandle, transport: Arc<dyn Transport>) -> ConnectionInfo {
        let connection = Connection {
            identity: None,
            rooms: BTreeSet::new(),
            connected_at: Utc::now(),
            transport,
        };
        let info = connection.info(handle);
        self.inner.write().connections.insert(handle, connection);

        tracing::debug!(connection = %handle, "Connection registered");
        info
    }

    /// Attach an identity and index the connection under its rooms.
    ///
    /// The first successful call wins; any later call fails with
    /// [`RegistryError::AlreadyAuthenticated`] and leaves the entry untouched.
    pub fn attach_identity(
        &self,
        handle: ConnHandle,
        identity: Identity,
    ) -> Result<BTreeSet<RoomId>, RegistryError> {
        let rooms = rooms_for_identity(&identity);

        let mut inner = self.inner.write();
        let connection = inner
            .connections
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownConnection)?;
        if connection.identity.is_some() {
            return Err(RegistryError::AlreadyAuthenticated);
        }

        connection.rooms = rooms.clone();
        connection.identity = Some(identity.clone());

        inner
            .by_user
            .entry(identity.id.clone())
            .or_default()
            .insert(handle);
        inner.by_role.entry(identity.role).or_default().insert(handle);
        if let Some(restaurant_id) = identity.owned_restaurant() {
            inner
                .by_restaurant
                .entry(restaurant_id.to_string())
                .or_default()
                .insert(handle);
        }
        drop(inner);

        tracing::debug!(
            connection = %handle,
            user_id = %identity.id,
            role = %identity.role,
            rooms = rooms.len(),
            "Identity attached"
        );
        Ok(rooms)
    }

    /// Remove a connection from every index. Unknown handles are a no-op.
    pub fn unregister(&self, handle: ConnHandle) -> Option<ConnectionInfo> {
        let mut inner = self.inner.write();
        let connection = inner.connections.remove(&handle)?;
        if let Some(identity) = &connection.identity {
            inner.unindex(&handle, identity);
        }
        drop(inner);

        tracing::debug!(connection = %handle, "Connection unregistered");
        Some(connection.info(handle))
    }

    /// Unregister only if the connection never authenticated.
    ///
    /// Check and removal happen under one write lock, so a connection that
    /// authenticates concurrently is never dropped by this call.
    pub fn unregister_if_unauthenticated(
        &self,
        handle: ConnHandle,
    ) -> Option<(ConnectionInfo, Arc<dyn Transport>)> {
        let mut inner = self.inner.write();
        match inner.connections.get(&handle) {
            Some(connection) if connection.identity.is_none() => {}
            _ => return None,
        }
        let connection = inner.connections.remove(&handle)?;
        drop(inner);

        Some((connection.info(handle), connection.transport))
    }

    pub fn get(&self, handle: ConnHandle) -> Option<ConnectionInfo> {
        self.inner
            .read()
            .connections
            .get(&handle)
            .map(|connection| connection.info(handle))
    }

    pub fn identity(&self, handle: ConnHandle) -> Option<Identity> {
        self.inner
            .read()
            .connections
            .get(&handle)
            .and_then(|connection| connection.identity.clone())
    }

    pub fn rooms_of(&self, handle: ConnHandle) -> Option<BTreeSet<RoomId>> {
        self.inner
            .read()
            .connections
            .get(&handle)
            .map(|connection| connection.rooms.clone())
    }

    pub fn connections_for_user(&self, user_id: &str) -> HashSet<ConnHandle> {
        self.inner
            .read()
            .by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn connections_for_role(&self, role: Role) -> HashSet<ConnHandle> {
        self.inner
            .read()
            .by_role
            .get(&role)
            .cloned()
            .unwrap_or_default()
    }

    /// Every owner connection of a restaurant (several staff members or tabs).
    pub fn connections_for_restaurant(&self, restaurant_id: &str) -> HashSet<ConnHandle> {
        self.inner
            .read()
            .by_restaurant
            .get(restaurant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Current members of one room.
    pub fn members(&self, room: &RoomId) -> HashSet<ConnHandle> {
        self.inner
            .read()
            .members(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve a target into distinct recipients.
    ///
    /// A connection reachable through several rooms appears once, tagged with
    /// the first room (in `RoomId` order) that reached it.
    pub fn recipients(&self, target: &RoomTarget) -> Vec<Recipient> {
        let inner = self.inner.read();
        match target {
            RoomTarget::Everyone => inner
                .connections
                .iter()
                .filter(|(_, connection)| connection.identity.is_some())
                .map(|(handle, connection)| Recipient {
                    handle: *handle,
                    room: None,
                    transport: connection.transport.clone(),
                })
                .collect(),
            RoomTarget::Rooms(rooms) => {
                let mut seen = HashSet::new();
                let mut recipients = Vec::new();
                for room in rooms {
                    let Some(members) = inner.members(room) else {
                        continue;
                    };
                    for handle in members {
                        if !seen.insert(*handle) {
                            continue;
                        }
                        if let Some(connection) = inner.connections.get(handle) {
                            recipients.push(Recipient {
                                handle: *handle,
                                room: Some(room.clone()),
                                transport: connection.transport.clone(),
                            });
                        }
                    }
                }
                recipients
            }
        }
    }

    pub fn presence_snapshot(&self) -> PresenceSnapshot {
        let inner = self.inner.read();
        PresenceSnapshot::from_counts(|role| inner.by_role.get(&role).map_or(0, HashSet::len))
    }

    /// Number of live connections, authenticated or not.
    pub fn len(&self) -> usize {
        self.inner.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close one connection's transport. Does not unregister it; the
    /// connection's own task does that once the transport has shut down.
    pub fn close(&self, handle: ConnHandle) -> bool {
        let transport = self
            .inner
            .read()
            .connections
            .get(&handle)
            .map(|connection| connection.transport.clone());
        match transport {
            Some(transport) => {
                transport.close();
                true
            }
            None => false,
        }
    }

    /// Close every transport (server shutdown).
    pub fn close_all(&self) {
        let transports: Vec<_> = self
            .inner
            .read()
            .connections
            .values()
            .map(|connection| connection.transport.clone())
            .collect();
        for transport in transports {
            transport.close();
        }
    }

    #[cfg(test)]
    fn index_sizes(&self) -> (usize, usize, usize) {
        let inner = self.inner.read();
        (
            inner.by_user.len(),
            inner.by_role.len(),
            inner.by_restaurant.len(),
        )
    }
}
