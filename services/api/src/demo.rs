use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clap::Args;

use crate::infra::InMemoryDriverStore;
use driver_service::drivers::accounts::HttpAccountGateway;
use driver_service::drivers::vehicles::{
    Vehicle, VehicleGateway, VehicleGatewayError, VehicleUpdate,
};
use driver_service::drivers::{
    AssignmentCoordinator, AssignmentRequest, DriverDraft, DriverRegistry, DriverServiceError,
    DriverUpdate,
};
use driver_service::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the failure/rollback portion of the demo
    #[arg(long)]
    pub(crate) skip_failure: bool,
}

/// In-process stand-in for the Vehicle Service so the demo runs without any
/// network dependency.
#[derive(Default)]
struct DemoFleet {
    fleet: Mutex<Vec<Vehicle>>,
    updates: Mutex<Vec<(String, VehicleUpdate)>>,
    reject_update_calls: AtomicBool,
}

impl DemoFleet {
    fn seeded() -> Self {
        let fleet = vec![
            Vehicle {
                id: "1".to_string(),
                kind: "Sedan".to_string(),
                plate_number: "B 1001 JK".to_string(),
                status: "InUse".to_string(),
            },
            Vehicle {
                id: "2".to_string(),
                kind: "Van".to_string(),
                plate_number: "B 1002 JK".to_string(),
                status: "Available".to_string(),
            },
            Vehicle {
                id: "3".to_string(),
                kind: "Sedan".to_string(),
                plate_number: "B 1003 JK".to_string(),
                status: "Available".to_string(),
            },
        ];
        Self {
            fleet: Mutex::new(fleet),
            ..Self::default()
        }
    }

    fn set_rejecting(&self, rejecting: bool) {
        self.reject_update_calls.store(rejecting, Ordering::Relaxed);
    }

    fn audit_log(&self) -> Vec<(String, VehicleUpdate)> {
        self.updates.lock().expect("updates mutex poisoned").clone()
    }
}

#[async_trait]
impl VehicleGateway for DemoFleet {
    async fn list(&self) -> Result<Vec<Vehicle>, VehicleGatewayError> {
        Ok(self.fleet.lock().expect("fleet mutex poisoned").clone())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vehicle>, VehicleGatewayError> {
        let fleet = self.fleet.lock().expect("fleet mutex poisoned");
        Ok(fleet.iter().find(|vehicle| vehicle.id == id).cloned())
    }

    async fn update(&self, id: &str, update: VehicleUpdate) -> Result<(), VehicleGatewayError> {
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

fn draft(license: &str, name: &str, email: &str) -> DriverDraft {
    DriverDraft {
        license_number: Some(license.to_string()),
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        user_id: None,
        status: None,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryDriverStore::default());
    let fleet = Arc::new(DemoFleet::seeded());
    let registry = DriverRegistry::<_, _, HttpAccountGateway>::new(store.clone(), fleet.clone());
    let assignments = AssignmentCoordinator::new(store, fleet.clone());

    println!("== creating drivers ==");
    let joko = registry
        .create(draft("LIC123456", "Joko Nawar", "joko@yopmail.com"))
        .await?;
    let siti = registry
        .create(draft("LIC654321", "Siti Rahma", "siti@yopmail.com"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&joko.view())?);
    println!("{}", serde_json::to_string_pretty(&siti.view())?);

    println!("\n== auto-assigning {} ==", joko.name);
    let assigned = assignments
        .assign(AssignmentRequest {
            driver_id: Some(joko.id.0),
            vehicle_id: None,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&assigned.view())?);

    println!("\n== assigning an on-duty driver is rejected ==");
    match assignments
        .assign(AssignmentRequest {
            driver_id: Some(joko.id.0),
            vehicle_id: None,
        })
        .await
    {
        Err(DriverServiceError::Conflict(message)) => println!("rejected: {message}"),
        Err(other) => return Err(other.into()),
        Ok(_) => println!("unexpected: assignment succeeded twice"),
    }

    if !args.skip_failure {
        println!("\n== vehicle service outage rolls the driver back ==");
        fleet.set_rejecting(true);
        match assignments
            .assign(AssignmentRequest {
                driver_id: Some(siti.id.0),
                vehicle_id: None,
            })
            .await
        {
            Err(DriverServiceError::Upstream(cause)) => println!("failed upstream: {cause}"),
            Err(other) => return Err(other.into()),
            Ok(_) => println!("unexpected: assignment succeeded during the outage"),
        }
        fleet.set_rejecting(false);
        let restored = registry.get(siti.id)?;
        println!(
            "driver {} is {} again with no vehicle reference",
            restored.name,
            restored.status.label()
        );
    }

    println!("\n== releasing {} via a status update ==", joko.name);
    let update = DriverUpdate {
        license_number: Some(joko.license_number.clone()),
        name: Some(joko.name.clone()),
        email: Some(joko.email.clone()),
        user_id: None,
        status: Some("available".to_string()),
        assigned_vehicle: None,
    };
    let released = registry.update(joko.id, update).await?;
    println!("{}", serde_json::to_string_pretty(&released.view())?);

    println!("\n== vehicle update audit ==");
    for (vehicle_id, update) in fleet.audit_log() {
        println!("vehicle {vehicle_id}: {} ({})", update.status, update.plate_number);
    }

    Ok(())
}
