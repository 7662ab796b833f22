//! # Actors and Roles
//!
//! The engine consumes identity as an opaque `Actor{id, role}`. Roles form
//! a closed set checked per transition row; there is no hierarchy and no
//! role implies another.
//!
//! `Buyer` and `Seller` on an `Actor` describe what the identity system
//! asserted about the caller. Whether the caller is *this* order's buyer or
//! seller is decided by comparing ids against the order record.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::ActorId;

/// The role an actor plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pays fiat off-platform and receives the escrowed tokens.
    Buyer,
    /// Merchant whose tokens are locked in escrow.
    Seller,
    /// Neutral arbitrator. May act on disputed orders only.
    Admin,
    /// Internal principal used by the deadline scheduler.
    System,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 4] = [Role::Buyer, Role::Seller, Role::Admin, Role::System];

    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    /// Whether this role is a trading counterparty.
    pub fn is_participant(&self) -> bool {
        matches!(self, Self::Buyer | Self::Seller)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated caller as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ActorId, role: Role) -> Self {
        Self { id, role }
    }

    /// The scheduler's principal.
    pub fn system() -> Self {
        Self {
            id: ActorId::SYSTEM,
            role: Role::System,
        }
    }

    pub fn buyer(id: ActorId) -> Self {
        Self::new(id, Role::Buyer)
    }

    pub fn seller(id: ActorId) -> Self {
        Self::new(id, Role::Seller)
    }

    pub fn admin(id: ActorId) -> Self {
        Self::new(id, Role::Admin)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.role, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_as_str_roundtrips_through_from_str() {
        for role in Role::ALL {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn unknown_role_rejected() {
        let err = "zone_admin".parse::<Role>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownRole(ref r) if r == "zone_admin"));
    }

    #[test]
    fn participant_roles() {
        assert!(Role::Buyer.is_participant());
        assert!(Role::Seller.is_participant());
        assert!(!Role::Admin.is_participant());
        assert!(!Role::System.is_participant());
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let r: Role = serde_json::from_str("\"seller\"").unwrap();
        assert_eq!(r, Role::Seller);
    }

    #[test]
    fn system_actor() {
        let a = Actor::system();
        assert_eq!(a.role, Role::System);
        assert_eq!(a.id, ActorId::SYSTEM);
    }

    #[test]
    fn actor_display_includes_role() {
        let a = Actor::buyer(ActorId::new());
        assert!(a.to_string().starts_with("buyer(actor:"));
    }
}
