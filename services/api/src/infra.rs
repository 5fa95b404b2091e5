use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use driver_service::drivers::store::{
    DriverChange, DriverStore, NewDriver, StoreError, UniqueClaims, UniqueField,
};
use driver_service::drivers::{Driver, DriverId, DriverStatus};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mutex-guarded driver store. Ids are monotonic and never reused, and the
/// uniqueness and compare-and-set checks run inside the lock so racing
/// requests cannot interleave between read and write.
#[derive(Default)]
pub(crate) struct InMemoryDriverStore {
    records: Mutex<BTreeMap<u64, Driver>>,
    sequence: AtomicU64,
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

impl DriverStore for InMemoryDriverStore {
    fn insert(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("driver store mutex poisoned");
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
        let records = self.records.lock().expect("driver store mutex poisoned");
        Ok(records.get(&id.0).cloned())
    }

    fn list(&self) -> Result<Vec<Driver>, StoreError> {
        let records = self.records.lock().expect("driver store mutex poisoned");
        Ok(records.values().cloned().collect())
    }

    fn update(&self, id: DriverId, change: DriverChange) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("driver store mutex poisoned");
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
        let mut records = self.records.lock().expect("driver store mutex poisoned");
        records.remove(&id.0).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn taken(
        &self,
        claims: &UniqueClaims,
        exclude: Option<DriverId>,
    ) -> Result<Vec<UniqueField>, StoreError> {
        let records = self.records.lock().expect("driver store mutex poisoned");
        Ok(duplicates(&records, claims, exclude))
    }

    fn claim_available(&self, id: DriverId, vehicle_id: &str) -> Result<Driver, StoreError> {
        let mut records = self.records.lock().expect("driver store mutex poisoned");
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
        let mut records = self.records.lock().expect("driver store mutex poisoned");
        let record = records.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        record.status = DriverStatus::Available;
        record.assigned_vehicle = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
