//! Garage-scoped identity and authorization.

pub mod identity;
pub mod policy;
pub mod roles;
pub mod user;

pub use identity::{Identity, IdentityResolver};
pub use policy::AuthPolicy;
pub use roles::Role;
pub use user::{
    RegisterUser, SuspendUser, User, UserAccountId, UserCommand, UserEvent, UserRegistered,
    UserStatus, UserSuspended,
};
