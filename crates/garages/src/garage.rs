use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{Aggregate, AggregateRoot, DomainError, GarageId};
use garagekit_events::Event;

/// Garage profile fields editable by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageProfile {
    pub name: String,
    pub owner_name: String,
    pub phone: String,
    pub email: String,
    /// URI of a raster logo image, embedded (downscaled) into invoices.
    pub logo: Option<String>,
}

/// Aggregate root: Garage, the tenant boundary itself.
///
/// Garages are never deleted; registration is gated by an activation code
/// checked at the service layer against injected policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Garage {
    id: GarageId,
    profile: GarageProfile,
    version: u64,
    created: bool,
}

impl Garage {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: GarageId) -> Self {
        Self {
            id,
            profile: GarageProfile {
                name: String::new(),
                owner_name: String::new(),
                phone: String::new(),
                email: String::new(),
                logo: None,
            },
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> GarageId {
        self.id
    }

    pub fn profile(&self) -> &GarageProfile {
        &self.profile
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Garage {
    type Id = GarageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterGarage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterGarage {
    pub garage_id: GarageId,
    pub profile: GarageProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateGarageProfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGarageProfile {
    pub garage_id: GarageId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the logo; `None` keeps the existing one.
    pub logo: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GarageCommand {
    RegisterGarage(RegisterGarage),
    UpdateGarageProfile(UpdateGarageProfile),
}

/// Event: GarageRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageRegistered {
    pub garage_id: GarageId,
    pub profile: GarageProfile,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GarageProfileUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageProfileUpdated {
    pub garage_id: GarageId,
    pub profile: GarageProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GarageEvent {
    GarageRegistered(GarageRegistered),
    GarageProfileUpdated(GarageProfileUpdated),
}

impl Event for GarageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GarageEvent::GarageRegistered(_) => "garages.garage.registered",
            GarageEvent::GarageProfileUpdated(_) => "garages.garage.profile_updated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GarageEvent::GarageRegistered(e) => e.occurred_at,
            GarageEvent::GarageProfileUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Garage {
    type Command = GarageCommand;
    type Event = GarageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GarageEvent::GarageRegistered(e) => {
                self.id = e.garage_id;
                self.profile = e.profile.clone();
                self.created = true;
            }
            GarageEvent::GarageProfileUpdated(e) => {
                self.profile = e.profile.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            GarageCommand::RegisterGarage(cmd) => self.handle_register(cmd),
            GarageCommand::UpdateGarageProfile(cmd) => self.handle_update(cmd),
        }
    }
}

impl Garage {
    fn ensure_garage_id(&self, garage_id: GarageId) -> Result<(), DomainError> {
        if self.id != garage_id {
            return Err(DomainError::invariant("garage_id mismatch"));
        }
        Ok(())
    }

    fn validate_profile(profile: &GarageProfile) -> Result<(), DomainError> {
        if profile.name.trim().is_empty() {
            return Err(DomainError::validation("garage name cannot be empty"));
        }
        if profile.owner_name.trim().is_empty() {
            return Err(DomainError::validation("owner name cannot be empty"));
        }
        if profile.phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }
        if !profile.email.contains('@') {
            return Err(DomainError::validation("email is not valid"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterGarage) -> Result<Vec<GarageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("garage already registered"));
        }
        Self::validate_profile(&cmd.profile)?;

        Ok(vec![GarageEvent::GarageRegistered(GarageRegistered {
            garage_id: cmd.garage_id,
            profile: cmd.profile.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateGarageProfile) -> Result<Vec<GarageEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage_id(cmd.garage_id)?;

        let profile = GarageProfile {
            name: cmd.name.clone().unwrap_or_else(|| self.profile.name.clone()),
            owner_name: cmd
                .owner_name
                .clone()
                .unwrap_or_else(|| self.profile.owner_name.clone()),
            phone: cmd.phone.clone().unwrap_or_else(|| self.profile.phone.clone()),
            email: cmd.email.clone().unwrap_or_else(|| self.profile.email.clone()),
            logo: match &cmd.logo {
                Some(new_logo) => new_logo.clone(),
                None => self.profile.logo.clone(),
            },
        };
        Self::validate_profile(&profile)?;

        Ok(vec![GarageEvent::GarageProfileUpdated(GarageProfileUpdated {
            garage_id: cmd.garage_id,
            profile,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_garage_id() -> GarageId {
        GarageId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_profile() -> GarageProfile {
        GarageProfile {
            name: "Speedy Motors".to_string(),
            owner_name: "R. Kumar".to_string(),
            phone: "+91 98765 43210".to_string(),
            email: "speedy@example.com".to_string(),
            logo: None,
        }
    }

    #[test]
    fn register_garage_emits_garage_registered_event() {
        let garage_id = test_garage_id();
        let garage = Garage::empty(garage_id);
        let cmd = RegisterGarage {
            garage_id,
            profile: test_profile(),
            occurred_at: test_time(),
        };

        let events = garage.handle(&GarageCommand::RegisterGarage(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            GarageEvent::GarageRegistered(e) => {
                assert_eq!(e.garage_id, garage_id);
                assert_eq!(e.profile.name, "Speedy Motors");
            }
            _ => panic!("Expected GarageRegistered event"),
        }
    }

    #[test]
    fn register_garage_rejects_duplicate_registration() {
        let garage_id = test_garage_id();
        let mut garage = Garage::empty(garage_id);
        let cmd = RegisterGarage {
            garage_id,
            profile: test_profile(),
            occurred_at: test_time(),
        };

        let events = garage
            .handle(&GarageCommand::RegisterGarage(cmd.clone()))
            .unwrap();
        garage.apply(&events[0]);

        let err = garage.handle(&GarageCommand::RegisterGarage(cmd)).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate registration"),
        }
    }

    #[test]
    fn update_profile_patches_only_provided_fields() {
        let garage_id = test_garage_id();
        let mut garage = Garage::empty(garage_id);
        let register = RegisterGarage {
            garage_id,
            profile: test_profile(),
            occurred_at: test_time(),
        };
        let events = garage.handle(&GarageCommand::RegisterGarage(register)).unwrap();
        garage.apply(&events[0]);

        let update = UpdateGarageProfile {
            garage_id,
            name: None,
            owner_name: Some("S. Kumar".to_string()),
            phone: None,
            email: None,
            logo: Some(Some("file:///logos/speedy.png".to_string())),
            occurred_at: test_time(),
        };
        let events = garage.handle(&GarageCommand::UpdateGarageProfile(update)).unwrap();
        garage.apply(&events[0]);

        assert_eq!(garage.profile().name, "Speedy Motors");
        assert_eq!(garage.profile().owner_name, "S. Kumar");
        assert_eq!(
            garage.profile().logo.as_deref(),
            Some("file:///logos/speedy.png")
        );
        assert_eq!(garage.version(), 2);
    }

    #[test]
    fn update_unknown_garage_is_not_found() {
        let garage_id = test_garage_id();
        let garage = Garage::empty(garage_id);
        let update = UpdateGarageProfile {
            garage_id,
            name: Some("New Name".to_string()),
            owner_name: None,
            phone: None,
            email: None,
            logo: None,
            occurred_at: test_time(),
        };

        let err = garage
            .handle(&GarageCommand::UpdateGarageProfile(update))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound error for unknown garage"),
        }
    }
}
