use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::drivers::accounts::{AccountGateway, AccountGatewayError, AccountRegistration};
use crate::drivers::assignment::AssignmentCoordinator;
use crate::drivers::domain::{Driver, DriverDraft, DriverId, DriverStatus};
use crate::drivers::lifecycle::DriverRegistry;
use crate::drivers::router::{driver_router, DriverApi};
use crate::drivers::store::{
    DriverChange, DriverStore, NewDriver, StoreError, UniqueClaims, UniqueField,
};
use crate::drivers::vehicles::{Vehicle, VehicleGateway, VehicleGatewayError, VehicleUpdate};

/// Mutex-backed store mirroring the API service's in-memory implementation,
/// with a switchable outage for the compensating release.
#[derive(Default)]
pub(super) struct MemoryStore {
    records: Mutex<BTreeMap<u64, Driver>>,
    sequence: AtomicU64,
    release_outage: AtomicBool,
}

impl MemoryStore {
    pub(super) fn fail_release(&self) {
        self.release_outage.store(true, Ordering::Relaxed);
    }

    pub(super) fn count(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }
}

fn duplicates(
    records: &BTreeMap<u64, Driver>,
    claims: &UniqueClaims,
    exclude: Option<DriverId>,
) -> Vec<UniqueField> {
    let mut fields = Vec::new();
    for driver in records.values() {
        if Some(driver.id) == exclude {
            continue;
        }
        if !claims.license_number.is_empty()
            && driver.license_number == claims.license_number
            && !fields.contains(&UniqueField::LicenseNumber)
        {
            fields.push(UniqueField::LicenseNumber);
        }
        if !claims.email.is_empty()
            && driver.email == claims.email
            && !fields.contains(&UniqueField::Email)
        {
            fields.push(UniqueField::Email);
        }
        if let (Some(claimed), Some(existing)) = (claims.user_id.as_deref(), driver.user_id.as_deref())
        {
            if claimed == existing && !fields.contains(&UniqueField::UserId) {
                fields.push(UniqueField::UserId);
            }
        }
    }
    fields
}

impl DriverStore for MemoryStore {
    fn insert(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if let Some(field) = duplicates(&records, &UniqueClaims::of_new(&driver), None)
            .into_iter()
            .next()
        {
            return Err(StoreError::Duplicate(field));
        }
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let record = Driver {
            id: DriverId(id),
            license_number: driver.license_number,
            name: driver.name,
            email: driver.email,
            user_id: driver.user_id,
            status: driver.status,
            assigned_vehicle: None,
            created_at: now,
            updated_at: now,
        };
        records.insert(id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: DriverId) -> Result<Option<Driver>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.get(&id.0).cloned())
    }

    fn list(&self) -> Result<Vec<Driver>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.values().cloned().collect())
    }

    fn update(&self, id: DriverId, change: DriverChange) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if let Some(field) = duplicates(&records, &UniqueClaims::of_change(&change), Some(id))
            .into_iter()
            .next()
        {
            return Err(StoreError::Duplicate(field));
        }
        let record = records.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        record.license_number = change.license_number;
        record.name = change.name;
        record.email = change.email;
        record.user_id = change.user_id;
        record.status = change.status;
        record.assigned_vehicle = change.assigned_vehicle;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn remove(&self, id: DriverId) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.remove(&id.0).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn taken(
        &self,
        claims: &UniqueClaims,
        exclude: Option<DriverId>,
    ) -> Result<Vec<UniqueField>, StoreError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(duplicates(&records, claims, exclude))
    }

    fn claim_available(&self, id: DriverId, vehicle_id: &str) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if record.status != DriverStatus::Available {
            return Err(StoreError::NotAvailable);
        }
        record.status = DriverStatus::OnDuty;
        record.assigned_vehicle = Some(vehicle_id.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn release_vehicle(&self, id: DriverId) -> Result<Driver, StoreError> {
        if self.release_outage.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("scripted store outage".to_string()));
        }
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        record.status = DriverStatus::Available;
        record.assigned_vehicle = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

/// Scripted Vehicle Service fake: canned fleet, recorded update calls, and
/// switchable failure modes.
#[derive(Default)]
pub(super) struct ScriptedVehicles {
    fleet: Mutex<Vec<Vehicle>>,
    updates: Mutex<Vec<(String, VehicleUpdate)>>,
    reject_update_calls: AtomicBool,
    drop_update_calls: AtomicBool,
    fail_listing_calls: AtomicBool,
}

impl ScriptedVehicles {
    pub(super) fn with_fleet(fleet: Vec<Vehicle>) -> Self {
        Self {
            fleet: Mutex::new(fleet),
            ..Self::default()
        }
    }

    /// Update calls answer without the success marker.
    pub(super) fn reject_updates(&self) {
        self.reject_update_calls.store(true, Ordering::Relaxed);
    }

    /// Update calls fail at the transport layer.
    pub(super) fn drop_updates(&self) {
        self.drop_update_calls.store(true, Ordering::Relaxed);
    }

    pub(super) fn fail_listing(&self) {
        self.fail_listing_calls.store(true, Ordering::Relaxed);
    }

    pub(super) fn recorded_updates(&self) -> Vec<(String, VehicleUpdate)> {
        self.updates.lock().expect("updates mutex poisoned").clone()
    }
}

#[async_trait]
impl VehicleGateway for ScriptedVehicles {
    async fn list(&self) -> Result<Vec<Vehicle>, VehicleGatewayError> {
        if self.fail_listing_calls.load(Ordering::Relaxed) {
            return Err(VehicleGatewayError::Transport(
                "scripted listing outage".to_string(),
            ));
        }
        Ok(self.fleet.lock().expect("fleet mutex poisoned").clone())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vehicle>, VehicleGatewayError> {
        let fleet = self.fleet.lock().expect("fleet mutex poisoned");
        Ok(fleet.iter().find(|vehicle| vehicle.id == id).cloned())
    }

    async fn update(&self, id: &str, update: VehicleUpdate) -> Result<(), VehicleGatewayError> {
        if self.drop_update_calls.load(Ordering::Relaxed) {
            return Err(VehicleGatewayError::Transport(
                "scripted transport outage".to_string(),
            ));
        }
        if self.reject_update_calls.load(Ordering::Relaxed) {
            return Err(VehicleGatewayError::Rejected);
        }
        let mut fleet = self.fleet.lock().expect("fleet mutex poisoned");
        if let Some(vehicle) = fleet.iter_mut().find(|vehicle| vehicle.id == id) {
            vehicle.status = update.status.clone();
        }
        self.updates
            .lock()
            .expect("updates mutex poisoned")
            .push((id.to_string(), update));
        Ok(())
    }
}

/// Recording auth fake with a switchable rejection.
#[derive(Default)]
pub(super) struct ScriptedAccounts {
    registrations: Mutex<Vec<AccountRegistration>>,
    reject_calls: AtomicBool,
}

impl ScriptedAccounts {
    pub(super) fn reject(&self) {
        self.reject_calls.store(true, Ordering::Relaxed);
    }

    pub(super) fn registrations(&self) -> Vec<AccountRegistration> {
        self.registrations
            .lock()
            .expect("registrations mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl AccountGateway for ScriptedAccounts {
    async fn register(
        &self,
        registration: AccountRegistration,
    ) -> Result<(), AccountGatewayError> {
        if self.reject_calls.load(Ordering::Relaxed) {
            return Err(AccountGatewayError::Rejected(500));
        }
        self.registrations
            .lock()
            .expect("registrations mutex poisoned")
            .push(registration);
        Ok(())
    }
}

pub(super) fn vehicle(id: &str, status: &str) -> Vehicle {
    Vehicle {
        id: id.to_string(),
        kind: "Sedan".to_string(),
        plate_number: format!("B {id}00 XY"),
        status: status.to_string(),
    }
}

pub(super) fn sample_fleet() -> Vec<Vehicle> {
    vec![
        vehicle("1", "InUse"),
        vehicle("2", "Available"),
        vehicle("3", "Available"),
    ]
}

pub(super) fn draft(license: &str, email: &str) -> DriverDraft {
    DriverDraft {
        license_number: Some(license.to_string()),
        name: Some("Joko Nawar".to_string()),
        email: Some(email.to_string()),
        user_id: None,
        status: None,
    }
}

pub(super) fn seed_driver(store: &MemoryStore, license: &str, email: &str) -> Driver {
    store
        .insert(NewDriver {
            license_number: license.to_string(),
            name: "Joko Nawar".to_string(),
            email: email.to_string(),
            user_id: None,
            status: DriverStatus::Available,
        })
        .expect("driver inserts")
}

pub(super) type TestRegistry = DriverRegistry<MemoryStore, ScriptedVehicles, ScriptedAccounts>;
pub(super) type TestCoordinator = AssignmentCoordinator<MemoryStore, ScriptedVehicles>;

pub(super) fn build_registry(
    fleet: Vec<Vehicle>,
) -> (TestRegistry, Arc<MemoryStore>, Arc<ScriptedVehicles>) {
    let store = Arc::new(MemoryStore::default());
    let vehicles = Arc::new(ScriptedVehicles::with_fleet(fleet));
    let registry = DriverRegistry::new(store.clone(), vehicles.clone());
    (registry, store, vehicles)
}

pub(super) fn build_provisioning_registry(
) -> (TestRegistry, Arc<MemoryStore>, Arc<ScriptedAccounts>) {
    let store = Arc::new(MemoryStore::default());
    let vehicles = Arc::new(ScriptedVehicles::default());
    let accounts = Arc::new(ScriptedAccounts::default());
    let registry = DriverRegistry::with_provisioning(store.clone(), vehicles, accounts.clone());
    (registry, store, accounts)
}

pub(super) fn build_coordinator(
    fleet: Vec<Vehicle>,
) -> (TestCoordinator, Arc<MemoryStore>, Arc<ScriptedVehicles>) {
    let store = Arc::new(MemoryStore::default());
    let vehicles = Arc::new(ScriptedVehicles::with_fleet(fleet));
    let coordinator = AssignmentCoordinator::new(store.clone(), vehicles.clone());
    (coordinator, store, vehicles)
}

pub(super) fn test_router(
    fleet: Vec<Vehicle>,
) -> (axum::Router, Arc<MemoryStore>, Arc<ScriptedVehicles>) {
    let store = Arc::new(MemoryStore::default());
    let vehicles = Arc::new(ScriptedVehicles::with_fleet(fleet));
    let api = DriverApi {
        registry: Arc::new(DriverRegistry::<_, _, ScriptedAccounts>::new(
            store.clone(),
            vehicles.clone(),
        )),
        assignments: Arc::new(AssignmentCoordinator::new(store.clone(), vehicles.clone())),
    };
    (driver_router(api), store, vehicles)
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is JSON")
}
