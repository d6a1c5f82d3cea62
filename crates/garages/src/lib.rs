//! Garage (tenant) registration and profile.

pub mod garage;

pub use garage::{
    Garage, GarageCommand, GarageEvent, GarageProfile, GarageProfileUpdated, GarageRegistered,
    RegisterGarage, UpdateGarageProfile,
};
