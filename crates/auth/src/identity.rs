use serde::{Deserialize, Serialize};

use garagekit_core::{DomainError, DomainResult, GarageId, UserId};

use crate::roles::Role;

/// A fully resolved caller identity for authorization decisions.
///
/// Construction is decoupled from credential transport: the identity layer
/// resolves a bearer credential into this shape, and every service operation
/// is parameterized by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Absent only for super admins.
    pub garage_id: Option<GarageId>,
    pub role: Role,
}

impl Identity {
    /// Resolve the garage every data access of this request is scoped to.
    ///
    /// - Garage-bound roles always operate on their own garage. Passing an
    ///   explicit different target is rejected without revealing whether the
    ///   target exists.
    /// - Super admins have no implicit garage; the target must be explicit,
    ///   absence is an error rather than a wildcard.
    pub fn garage_scope(&self, explicit: Option<GarageId>) -> DomainResult<GarageId> {
        if !self.role.is_garage_scoped() {
            return explicit.ok_or(DomainError::GarageIdRequired);
        }
        let own = self.garage_id.ok_or(DomainError::Unauthorized)?;
        match explicit {
            Some(target) if target != own => Err(DomainError::Unauthorized),
            _ => Ok(own),
        }
    }
}

/// Consumed contract: resolves a request's bearer credential to an identity.
///
/// Token issuance/validation lives outside the core; implementations here
/// only answer "who is this, and which garage do they belong to".
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> DomainResult<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role, garage_id: Option<GarageId>) -> Identity {
        Identity {
            user_id: UserId::new(),
            garage_id,
            role,
        }
    }

    #[test]
    fn garage_bound_roles_default_to_their_own_garage() {
        let garage = GarageId::new();
        for role in [Role::GarageAdmin, Role::MechanicStaff] {
            let id = identity(role, Some(garage));
            assert_eq!(id.garage_scope(None).unwrap(), garage);
            assert_eq!(id.garage_scope(Some(garage)).unwrap(), garage);
        }
    }

    #[test]
    fn garage_bound_roles_cannot_target_another_garage() {
        let id = identity(Role::MechanicStaff, Some(GarageId::new()));
        let err = id.garage_scope(Some(GarageId::new())).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
    }

    #[test]
    fn super_admin_must_pass_explicit_garage() {
        let id = identity(Role::SuperAdmin, None);
        assert_eq!(id.garage_scope(None).unwrap_err(), DomainError::GarageIdRequired);

        let target = GarageId::new();
        assert_eq!(id.garage_scope(Some(target)).unwrap(), target);
    }
}
