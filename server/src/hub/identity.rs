use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ValidationError;

/// Actor role carried by an identity assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Restaurant,
    Rider,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Customer, Role::Restaurant, Role::Rider, Role::Admin];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CUSTOMER" => Some(Self::Customer),
            "RESTAURANT" => Some(Self::Restaurant),
            "RIDER" => Some(Self::Rider),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Restaurant => "RESTAURANT",
            Self::Rider => "RIDER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Already-authenticated actor attached to a connection.
///
/// This is also the payload of the inbound `authenticate` frame and the
/// `user` field of the `authenticated` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    /// Owned restaurant. Only meaningful for [`Role::Restaurant`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            role,
            restaurant_id: None,
        }
    }

    pub fn with_restaurant(mut self, restaurant_id: impl Into<String>) -> Self {
        self.restaurant_id = Some(restaurant_id.into());
        self
    }

    /// Trim the assertion and drop fields that do not apply to its role.
    ///
    /// A restaurant id supplied with any role other than `RESTAURANT` is
    /// discarded, so it can never place a connection in a restaurant room.
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.id = self.id.trim().to_string();
        self.name = self.name.trim().to_string();
        if self.id.is_empty() {
            return Err(ValidationError::InvalidIdentity("id must not be empty"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::InvalidIdentity("name must not be empty"));
        }

        self.restaurant_id = match (self.role, self.restaurant_id.take()) {
            (Role::Restaurant, Some(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            _ => None,
        };
        Ok(self)
    }

    /// Restaurant this identity owns, if it is a restaurant owner.
    pub fn owned_restaurant(&self) -> Option<&str> {
        match self.role {
            Role::Restaurant => self.restaurant_id.as_deref().filter(|id| !id.is_empty()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
        assert_eq!(Role::parse("customer"), None);
    }

    #[test]
    fn test_normalized_drops_restaurant_for_other_roles() {
        let identity = Identity::new("u1", "Alice", Role::Rider)
            .with_restaurant("r1")
            .normalized()
            .unwrap();
        assert_eq!(identity.restaurant_id, None);
        assert_eq!(identity.owned_restaurant(), None);
    }

    #[test]
    fn test_normalized_keeps_owner_restaurant() {
        let identity = Identity::new(" own1 ", "Owner", Role::Restaurant)
            .with_restaurant(" r1 ")
            .normalized()
            .unwrap();
        assert_eq!(identity.id, "own1");
        assert_eq!(identity.owned_restaurant(), Some("r1"));
    }

    #[test]
    fn test_normalized_rejects_empty_id_and_name() {
        assert!(Identity::new("  ", "Name", Role::Customer).normalized().is_err());
        assert!(Identity::new("u1", "", Role::Customer).normalized().is_err());
    }

    #[test]
    fn test_deserialize_authenticate_payload() {
        let identity: Identity = serde_json::from_str(
            r#"{"id":"own1","name":"Owner","email":"o@example.com","role":"RESTAURANT","restaurantId":"r1"}"#,
        )
        .unwrap();
        assert_eq!(identity.role, Role::Restaurant);
        assert_eq!(identity.restaurant_id.as_deref(), Some("r1"));
        assert_eq!(identity.email.as_deref(), Some("o@example.com"));
    }
}
