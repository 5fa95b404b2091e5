use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{Driver, DriverId, DriverStatus};

/// Write model for a validated creation; the store assigns the id and both
/// timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDriver {
    pub license_number: String,
    pub name: String,
    pub email: String,
    pub user_id: Option<String>,
    pub status: DriverStatus,
}

/// Full-replace write model applied by [`DriverStore::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverChange {
    pub license_number: String,
    pub name: String,
    pub email: String,
    pub user_id: Option<String>,
    pub status: DriverStatus,
    pub assigned_vehicle: Option<String>,
}

/// Columns carrying a global uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    LicenseNumber,
    Email,
    UserId,
}

impl UniqueField {
    pub const fn name(self) -> &'static str {
        match self {
            UniqueField::LicenseNumber => "license_number",
            UniqueField::Email => "email",
            UniqueField::UserId => "user_id",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values a write wants to hold for the unique columns. Empty strings and
/// absent `user_id` values claim nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueClaims {
    pub license_number: String,
    pub email: String,
    pub user_id: Option<String>,
}

impl UniqueClaims {
    pub fn of_new(driver: &NewDriver) -> Self {
        Self {
            license_number: driver.license_number.clone(),
            email: driver.email.clone(),
            user_id: driver.user_id.clone(),
        }
    }

    pub fn of_change(change: &DriverChange) -> Self {
        Self {
            license_number: change.license_number.clone(),
            email: change.email.clone(),
            user_id: change.user_id.clone(),
        }
    }
}

/// Storage abstraction so the lifecycle and assignment services can be
/// exercised in isolation.
pub trait DriverStore: Send + Sync {
    fn insert(&self, driver: NewDriver) -> Result<Driver, StoreError>;
    fn fetch(&self, id: DriverId) -> Result<Option<Driver>, StoreError>;
    fn list(&self) -> Result<Vec<Driver>, StoreError>;
    fn update(&self, id: DriverId, change: DriverChange) -> Result<Driver, StoreError>;
    fn remove(&self, id: DriverId) -> Result<(), StoreError>;
    /// Unique columns already holding one of the claimed values, ignoring
    /// the record named by `exclude`.
    fn taken(
        &self,
        claims: &UniqueClaims,
        exclude: Option<DriverId>,
    ) -> Result<Vec<UniqueField>, StoreError>;
    /// Compare-and-set for assignment phase 1: links the vehicle and moves
    /// the driver to `on_duty` only while the stored status is still
    /// `available`. Two racing assignments can therefore not both pass the
    /// availability check.
    fn claim_available(&self, id: DriverId, vehicle_id: &str) -> Result<Driver, StoreError>;
    /// Clears the vehicle reference and returns the driver to `available`.
    fn release_vehicle(&self, id: DriverId) -> Result<Driver, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0} already taken")]
    Duplicate(UniqueField),
    #[error("driver is no longer available")]
    NotAvailable,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
