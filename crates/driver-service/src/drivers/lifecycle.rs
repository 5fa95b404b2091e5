use std::sync::Arc;

use tracing::{error, warn};

use super::accounts::{AccountGateway, AccountRegistration};
use super::domain::{Driver, DriverDraft, DriverId, DriverStatus, DriverUpdate};
use super::error::{DriverServiceError, UpstreamError, ValidationErrors};
use super::store::{DriverChange, DriverStore, NewDriver, UniqueClaims};
use super::vehicles::{VehicleGateway, VEHICLE_AVAILABLE};

/// Role granted to provisioned driver accounts.
const DRIVER_ROLE: &str = "driver";

const REQUIRED_MESSAGE: &str = "is required";
const TAKEN_MESSAGE: &str = "has already been taken";
const STATUS_MESSAGE: &str = "must be one of available, on_duty, unavailable";

/// Per-field handling shared by the endpoint rule tables.
#[derive(Debug, Clone, Copy)]
struct FieldRule {
    field: &'static str,
    required: bool,
    max_len: usize,
    unique: bool,
}

/// Typed description of one endpoint's accepted identity fields.
#[derive(Debug, Clone, Copy)]
struct FieldRules {
    license_number: FieldRule,
    name: FieldRule,
    email: FieldRule,
    user_id: FieldRule,
}

const CREATE_RULES: FieldRules = FieldRules {
    license_number: FieldRule { field: "license_number", required: true, max_len: 50, unique: true },
    name: FieldRule { field: "name", required: true, max_len: 255, unique: false },
    email: FieldRule { field: "email", required: true, max_len: 255, unique: true },
    user_id: FieldRule { field: "user_id", required: false, max_len: 255, unique: true },
};

// The PUT surface replaces the whole record, so it shares the create table.
const UPDATE_RULES: FieldRules = CREATE_RULES;

/// Owns driver create/read/update/delete semantics, including the side
/// effects of status transitions and optional account provisioning.
pub struct DriverRegistry<S, V, A> {
    store: Arc<S>,
    vehicles: Arc<V>,
    accounts: Option<Arc<A>>,
}

impl<S, V, A> DriverRegistry<S, V, A>
where
    S: DriverStore + 'static,
    V: VehicleGateway + 'static,
    A: AccountGateway + 'static,
{
    pub fn new(store: Arc<S>, vehicles: Arc<V>) -> Self {
        Self { store, vehicles, accounts: None }
    }

    /// Registry that additionally provisions an account for every newly
    /// created driver.
    pub fn with_provisioning(store: Arc<S>, vehicles: Arc<V>, accounts: Arc<A>) -> Self {
        Self { store, vehicles, accounts: Some(accounts) }
    }

    /// Validate and persist a new driver. When provisioning is configured,
    /// a failed account registration deletes the just-created record before
    /// the error is surfaced.
    pub async fn create(&self, draft: DriverDraft) -> Result<Driver, DriverServiceError> {
        let new_driver = self.validated_draft(&draft)?;
        let driver = self.store.insert(new_driver)?;

        if let Some(accounts) = &self.accounts {
            let registration = AccountRegistration {
                full_name: driver.name.clone(),
                email: driver.email.clone(),
                username: derive_username(&driver.name),
                role: DRIVER_ROLE.to_string(),
                password: driver.license_number.clone(),
                confirm_password: driver.license_number.clone(),
            };
            if let Err(cause) = accounts.register(registration).await {
                if let Err(rollback) = self.store.remove(driver.id) {
                    error!(
                        driver = %driver.id,
                        %rollback,
                        "could not delete driver after provisioning failure"
                    );
                    return Err(DriverServiceError::CompensationFailed {
                        driver: driver.id,
                        source: rollback,
                    });
                }
                return Err(DriverServiceError::Upstream(UpstreamError::Accounts(cause)));
            }
        }

        Ok(driver)
    }

    pub fn get(&self, id: DriverId) -> Result<Driver, DriverServiceError> {
        self.store
            .fetch(id)?
            .ok_or(DriverServiceError::DriverNotFound)
    }

    pub fn list(&self) -> Result<Vec<Driver>, DriverServiceError> {
        Ok(self.store.list()?)
    }

    /// Apply a full-replace update. Works on explicit before/after
    /// snapshots: the before image decides whether a vehicle has to be
    /// released upstream once the driver-side write has committed.
    pub async fn update(
        &self,
        id: DriverId,
        update: DriverUpdate,
    ) -> Result<Driver, DriverServiceError> {
        let before = self
            .store
            .fetch(id)?
            .ok_or(DriverServiceError::DriverNotFound)?;
        let change = self.validated_update(&before, &update)?;
        let after = self.store.update(id, change)?;

        if after.status == DriverStatus::Available {
            if let Some(vehicle_id) = before.assigned_vehicle.as_deref() {
                self.release_upstream(vehicle_id).await;
            }
        }

        Ok(after)
    }

    pub fn delete(&self, id: DriverId) -> Result<(), DriverServiceError> {
        let driver = self
            .store
            .fetch(id)?
            .ok_or(DriverServiceError::DriverNotFound)?;
        if let Some(vehicle_id) = driver.assigned_vehicle.as_deref() {
            // Known gap: no variant of this service releases the vehicle on
            // deletion, so it stays InUse upstream until touched manually.
            warn!(
                driver = %id,
                vehicle = vehicle_id,
                "deleting driver with an assigned vehicle"
            );
        }
        self.store.remove(id).map_err(DriverServiceError::from)
    }

    /// Best-effort notify; the driver-side update has already committed, so
    /// failures are logged rather than surfaced.
    async fn release_upstream(&self, vehicle_id: &str) {
        let vehicle = match self.vehicles.fetch(vehicle_id).await {
            Ok(Some(vehicle)) => vehicle,
            Ok(None) => {
                warn!(vehicle = vehicle_id, "vehicle to release no longer exists upstream");
                return;
            }
            Err(cause) => {
                warn!(vehicle = vehicle_id, %cause, "could not read vehicle while releasing it");
                return;
            }
        };
        if let Err(cause) = self
            .vehicles
            .update(vehicle_id, vehicle.update_with_status(VEHICLE_AVAILABLE))
            .await
        {
            warn!(vehicle = vehicle_id, %cause, "could not mark vehicle available");
        }
    }

    fn validated_draft(&self, draft: &DriverDraft) -> Result<NewDriver, DriverServiceError> {
        let mut errors = ValidationErrors::default();
        check_identity_fields(
            &mut errors,
            &CREATE_RULES,
            draft.license_number.as_deref(),
            draft.name.as_deref(),
            draft.email.as_deref(),
            draft.user_id.as_deref(),
        );

        let status = match draft.status.as_deref() {
            None => DriverStatus::Available,
            Some(raw) => match DriverStatus::parse(raw) {
                Some(DriverStatus::OnDuty) => {
                    errors.push("status", "cannot be on_duty without an assigned vehicle");
                    DriverStatus::Available
                }
                Some(parsed) => parsed,
                None => {
                    errors.push("status", STATUS_MESSAGE);
                    DriverStatus::Available
                }
            },
        };

        let claims = unique_claims(
            &CREATE_RULES,
            draft.license_number.clone(),
            draft.email.clone(),
            draft.user_id.clone().filter(|value| !value.is_empty()),
        );
        for field in self.store.taken(&claims, None)? {
            errors.push(field.name(), TAKEN_MESSAGE);
        }

        if !errors.is_empty() {
            return Err(DriverServiceError::Validation(errors));
        }

        Ok(NewDriver {
            license_number: draft.license_number.clone().unwrap_or_default(),
            name: draft.name.clone().unwrap_or_default(),
            email: draft.email.clone().unwrap_or_default(),
            user_id: draft.user_id.clone().filter(|value| !value.is_empty()),
            status,
        })
    }

    fn validated_update(
        &self,
        before: &Driver,
        update: &DriverUpdate,
    ) -> Result<DriverChange, DriverServiceError> {
        let mut errors = ValidationErrors::default();
        check_identity_fields(
            &mut errors,
            &UPDATE_RULES,
            update.license_number.as_deref(),
            update.name.as_deref(),
            update.email.as_deref(),
            update.user_id.as_deref(),
        );

        let status = match update.status.as_deref() {
            None => before.status,
            Some(raw) => DriverStatus::parse(raw).unwrap_or_else(|| {
                errors.push("status", STATUS_MESSAGE);
                before.status
            }),
        };

        let assigned_vehicle = match &update.assigned_vehicle {
            Some(explicit) => explicit.clone(),
            None => before.assigned_vehicle.clone(),
        };
        let assigned_vehicle = match status {
            DriverStatus::OnDuty => {
                if assigned_vehicle.is_none() {
                    errors.push("assigned_vehicle", "must be set while status is on_duty");
                }
                assigned_vehicle
            }
            // Any other status drops the reference, keeping the record's
            // status and vehicle fields in step.
            DriverStatus::Available | DriverStatus::Unavailable => None,
        };

        // The external account reference is set at creation; an absent field
        // keeps the existing value.
        let user_id = update
            .user_id
            .clone()
            .filter(|value| !value.is_empty())
            .or_else(|| before.user_id.clone());

        let claims = unique_claims(
            &UPDATE_RULES,
            update.license_number.clone(),
            update.email.clone(),
            user_id.clone(),
        );
        for field in self.store.taken(&claims, Some(before.id))? {
            errors.push(field.name(), TAKEN_MESSAGE);
        }

        if !errors.is_empty() {
            return Err(DriverServiceError::Validation(errors));
        }

        Ok(DriverChange {
            license_number: update.license_number.clone().unwrap_or_default(),
            name: update.name.clone().unwrap_or_default(),
            email: update.email.clone().unwrap_or_default(),
            user_id,
            status,
            assigned_vehicle,
        })
    }
}

/// Claims only the values whose rule actually carries a uniqueness scope.
fn unique_claims(
    rules: &FieldRules,
    license_number: Option<String>,
    email: Option<String>,
    user_id: Option<String>,
) -> UniqueClaims {
    UniqueClaims {
        license_number: license_number
            .filter(|_| rules.license_number.unique)
            .unwrap_or_default(),
        email: email.filter(|_| rules.email.unique).unwrap_or_default(),
        user_id: user_id.filter(|_| rules.user_id.unique),
    }
}

fn check_identity_fields(
    errors: &mut ValidationErrors,
    rules: &FieldRules,
    license_number: Option<&str>,
    name: Option<&str>,
    email: Option<&str>,
    user_id: Option<&str>,
) {
    check_field(errors, &rules.license_number, license_number);
    check_field(errors, &rules.name, name);
    check_field(errors, &rules.email, email);
    check_field(errors, &rules.user_id, user_id);

    if let Some(email) = email {
        if !email.is_empty() && !looks_like_email(email) {
            errors.push(rules.email.field, "must be a valid email address");
        }
    }
}

fn check_field(errors: &mut ValidationErrors, rule: &FieldRule, value: Option<&str>) {
    match value {
        None => {
            if rule.required {
                errors.push(rule.field, REQUIRED_MESSAGE);
            }
        }
        Some(value) if value.is_empty() => {
            if rule.required {
                errors.push(rule.field, REQUIRED_MESSAGE);
            }
        }
        Some(value) => {
            if value.len() > rule.max_len {
                errors.push(
                    rule.field,
                    format!("must not exceed {} characters", rule.max_len),
                );
            }
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        _ => false,
    }
}

/// Usernames are the driver's name lowercased, with runs of
/// non-alphanumerics collapsed to single dots.
fn derive_username(name: &str) -> String {
    let mut username = String::with_capacity(name.len());
    let mut gap = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if gap && !username.is_empty() {
                username.push('.');
            }
            gap = false;
            username.extend(ch.to_lowercase());
        } else {
            gap = true;
        }
    }
    username
}
