//! Users projection for identity management read models.
//!
//! Builds garage-isolated staff account read models from auth events; the
//! application layer resolves sign-ins against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_auth::{Role, UserAccountId, UserEvent, UserStatus};
use garagekit_core::GarageId;
use garagekit_events::EventEnvelope;

use crate::read_model::GarageStore;

/// User account read model for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReadModel {
    pub user_id: UserAccountId,
    pub garage_id: GarageId,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserReadModel {
    pub fn can_sign_in(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Projection that maintains the staff directory per garage.
pub struct UsersProjection<S> {
    store: S,
}

impl<S> UsersProjection<S>
where
    S: GarageStore<UserAccountId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<serde_json::Value>,
    ) -> Result<(), anyhow::Error> {
        if envelope.aggregate_type() != "auth.user" {
            return Ok(());
        }

        let event: UserEvent = serde_json::from_value(envelope.payload().clone())?;
        let garage_id = envelope.garage_id();

        match event {
            UserEvent::UserRegistered(e) => {
                anyhow::ensure!(
                    envelope.belongs_to(e.garage_id),
                    "event garage_id does not match envelope garage_id"
                );
                let model = UserReadModel {
                    user_id: e.user_id,
                    garage_id: e.garage_id,
                    email: e.email,
                    role: e.role,
                    status: UserStatus::Active,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                };
                self.store.upsert(garage_id, e.user_id, model);
            }
            UserEvent::UserSuspended(e) => {
                if let Some(mut model) = self.store.get(garage_id, &e.user_id) {
                    model.status = UserStatus::Suspended;
                    model.updated_at = e.occurred_at;
                    self.store.upsert(garage_id, e.user_id, model);
                }
            }
        }
        Ok(())
    }

    /// Get a single user by ID.
    pub fn get(&self, garage_id: GarageId, user_id: &UserAccountId) -> Option<UserReadModel> {
        self.store.get(garage_id, user_id)
    }

    /// List all staff accounts for a garage.
    pub fn list(&self, garage_id: GarageId) -> Vec<UserReadModel> {
        self.store.list(garage_id)
    }

    /// Get a user by email (linear scan).
    pub fn get_by_email(&self, garage_id: GarageId, email: &str) -> Option<UserReadModel> {
        let normalized = email.trim().to_lowercase();
        self.list(garage_id)
            .into_iter()
            .find(|u| u.email == normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use garagekit_auth::{UserRegistered, UserSuspended};
    use garagekit_core::AggregateId;
    use uuid::Uuid;

    use crate::read_model::InMemoryGarageStore;

    fn envelope(
        garage_id: GarageId,
        user_id: UserAccountId,
        seq: u64,
        event: &UserEvent,
    ) -> EventEnvelope<serde_json::Value> {
        EventEnvelope::new(
            Uuid::now_v7(),
            garage_id,
            user_id.0,
            "auth.user",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn registered(garage_id: GarageId, user_id: UserAccountId) -> UserEvent {
        UserEvent::UserRegistered(UserRegistered {
            garage_id,
            user_id,
            email: "mechanic@example.com".to_string(),
            password_hash: "argon2id$stub".to_string(),
            role: Role::MechanicStaff,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn email_lookup_is_garage_scoped() {
        let projection = UsersProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_a = GarageId::new();
        let garage_b = GarageId::new();
        let user_id = UserAccountId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(garage_a, user_id, 1, &registered(garage_a, user_id)))
            .unwrap();

        assert!(
            projection
                .get_by_email(garage_a, " Mechanic@Example.com ")
                .is_some()
        );
        assert!(projection.get_by_email(garage_b, "mechanic@example.com").is_none());
    }

    #[test]
    fn suspension_blocks_sign_in() {
        let projection = UsersProjection::new(Arc::new(InMemoryGarageStore::new()));
        let garage_id = GarageId::new();
        let user_id = UserAccountId::new(AggregateId::new());

        projection
            .apply_envelope(&envelope(garage_id, user_id, 1, &registered(garage_id, user_id)))
            .unwrap();
        assert!(projection.get(garage_id, &user_id).unwrap().can_sign_in());

        let suspended = UserEvent::UserSuspended(UserSuspended {
            garage_id,
            user_id,
            reason: Some("Left the garage".to_string()),
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(garage_id, user_id, 2, &suspended))
            .unwrap();

        assert!(!projection.get(garage_id, &user_id).unwrap().can_sign_in());
    }
}
