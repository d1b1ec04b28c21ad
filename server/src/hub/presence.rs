use serde::{Deserialize, Serialize};

use super::identity::Role;

/// Aggregate count of authenticated connections, by role.
///
/// Sent as the `userCountUpdate` payload. Always recomputed from the
/// registry, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub total: usize,
    pub customers: usize,
    pub restaurants: usize,
    pub riders: usize,
    pub admins: usize,
}

impl PresenceSnapshot {
    pub fn from_counts(count: impl Fn(Role) -> usize) -> Self {
        let customers = count(Role::Customer);
        let restaurants = count(Role::Restaurant);
        let riders = count(Role::Rider);
        let admins = count(Role::Admin);
        Self {
            total: customers + restaurants + riders + admins,
            customers,
            restaurants,
            riders,
            admins,
        }
    }

    pub fn count_for(&self, role: Role) -> usize {
        match role {
            Role::Customer => self.customers,
            Role::Restaurant => self.restaurants,
            Role::Rider => self.riders,
            Role::Admin => self.admins,
        }
    }
}
