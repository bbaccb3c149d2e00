//! Account roles.

use serde::{Deserialize, Serialize};

/// Role attached to a user profile by the commerce API.
///
/// Wire values are the API's uppercase names (`"CUSTOMER"`, `"STAFF"`,
/// `"ADMIN"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular shopper.
    #[default]
    Customer,
    /// Shop staff operating counter sales.
    Staff,
    /// Full administrative access.
    Admin,
}

impl Role {
    /// Whether this role may use the operations (counter-sales) surface.
    #[must_use]
    pub const fn is_operations(self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "CUSTOMER"),
            Self::Staff => write!(f, "STAFF"),
            Self::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Self::Customer),
            "STAFF" => Ok(Self::Staff),
            "ADMIN" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Staff).unwrap(), "\"STAFF\"");
        let role: Role = serde_json::from_str("\"CUSTOMER\"").unwrap();
        assert_eq!(role, Role::Customer);
    }

    #[test]
    fn test_is_operations() {
        assert!(!Role::Customer.is_operations());
        assert!(Role::Staff.is_operations());
        assert!(Role::Admin.is_operations());
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("MANAGER".parse::<Role>().is_err());
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
    }
}
