use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Roles carried in the `rol` claim. The wire form is SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    TenantAdmin,
    SuperAdmin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::TenantAdmin => "TENANT_ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Customers and tenant admins belong to exactly one tenant.
    pub const fn is_tenant_scoped(self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CUSTOMER" => Ok(Role::Customer),
            "TENANT_ADMIN" => Ok(Role::TenantAdmin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(AuthError::InvalidClaim("rol", other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_as_str() {
        for role in [Role::Customer, Role::TenantAdmin, Role::SuperAdmin] {
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json, serde_json::Value::String(role.as_str().to_string()));
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn lowercase_role_is_rejected() {
        assert!(matches!("customer".parse::<Role>(), Err(AuthError::InvalidClaim("rol", _))));
    }
}
