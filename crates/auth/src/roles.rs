use serde::{Deserialize, Serialize};

/// Closed role enumeration.
///
/// Authorization checks match on this exhaustively; adding a role is a
/// compile-visible change at every check site, not a string comparison drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    GarageAdmin,
    MechanicStaff,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::GarageAdmin => "garage_admin",
            Role::MechanicStaff => "mechanic_staff",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Whether every data access by this role is implicitly filtered to one garage.
    pub fn is_garage_scoped(&self) -> bool {
        match self {
            Role::GarageAdmin | Role::MechanicStaff => true,
            Role::SuperAdmin => false,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
