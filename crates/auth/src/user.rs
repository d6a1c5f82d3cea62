use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garagekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, GarageId};
use garagekit_events::Event;

use crate::roles::Role;

/// User account identifier (garage-scoped via `garage_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserAccountId(pub AggregateId);

impl UserAccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for UserAccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// User account status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

/// Aggregate root: User (a staff account bound to one garage).
///
/// Super-admin identities are not event-sourced here; they are provisioned
/// from [`crate::AuthPolicy`] configuration, so every stored user account
/// belongs to exactly one garage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserAccountId,
    garage_id: Option<GarageId>,
    email: String,
    password_hash: String,
    role: Role,
    status: UserStatus,
    version: u64,
    created: bool,
}

impl User {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: UserAccountId) -> Self {
        Self {
            id,
            garage_id: None,
            email: String::new(),
            password_hash: String::new(),
            role: Role::MechanicStaff,
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> UserAccountId {
        self.id
    }

    pub fn garage_id(&self) -> Option<GarageId> {
        self.garage_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    /// Suspended accounts cannot resolve to an identity.
    pub fn can_sign_in(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl AggregateRoot for User {
    type Id = UserAccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub garage_id: GarageId,
    pub user_id: UserAccountId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SuspendUser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendUser {
    pub garage_id: GarageId,
    pub user_id: UserAccountId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    RegisterUser(RegisterUser),
    SuspendUser(SuspendUser),
}

/// Event: UserRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub garage_id: GarageId,
    pub user_id: UserAccountId,
    /// Normalized (trimmed, lowercase) email.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UserSuspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSuspended {
    pub garage_id: GarageId,
    pub user_id: UserAccountId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    UserRegistered(UserRegistered),
    UserSuspended(UserSuspended),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered(_) => "auth.user.registered",
            UserEvent::UserSuspended(_) => "auth.user.suspended",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::UserRegistered(e) => e.occurred_at,
            UserEvent::UserSuspended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::UserRegistered(e) => {
                self.id = e.user_id;
                self.garage_id = Some(e.garage_id);
                self.email = e.email.clone();
                self.password_hash = e.password_hash.clone();
                self.role = e.role;
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::UserSuspended(_) => {
                self.status = UserStatus::Suspended;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::RegisterUser(cmd) => self.handle_register(cmd),
            UserCommand::SuspendUser(cmd) => self.handle_suspend(cmd),
        }
    }
}

impl User {
    fn ensure_garage(&self, garage_id: GarageId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.garage_id != Some(garage_id) {
            return Err(DomainError::invariant("garage mismatch"));
        }
        Ok(())
    }

    fn ensure_user_id(&self, user_id: UserAccountId) -> Result<(), DomainError> {
        if self.id != user_id {
            return Err(DomainError::invariant("user_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        let email = cmd.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("email is not valid"));
        }
        if cmd.password_hash.trim().is_empty() {
            return Err(DomainError::validation("password hash cannot be empty"));
        }

        match cmd.role {
            Role::GarageAdmin | Role::MechanicStaff => {}
            Role::SuperAdmin => {
                return Err(DomainError::validation(
                    "super admin accounts are provisioned from policy configuration",
                ));
            }
        }

        Ok(vec![UserEvent::UserRegistered(UserRegistered {
            garage_id: cmd.garage_id,
            user_id: cmd.user_id,
            email,
            password_hash: cmd.password_hash.clone(),
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_garage(cmd.garage_id)?;
        self.ensure_user_id(cmd.user_id)?;

        if self.status == UserStatus::Suspended {
            return Err(DomainError::conflict("user is already suspended"));
        }

        Ok(vec![UserEvent::UserSuspended(UserSuspended {
            garage_id: cmd.garage_id,
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
