//! Outbound adapter for the externally-owned Vehicle Service.
//!
//! The HTTP implementation owns transport details only: URL construction,
//! the request timeout, and decoding of the `{"data": ...}` envelopes the
//! collaborator wraps its payloads in.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Wire status the collaborator uses for a free vehicle.
pub const VEHICLE_AVAILABLE: &str = "Available";
/// Wire status the collaborator uses while a driver holds the vehicle.
pub const VEHICLE_IN_USE: &str = "InUse";

/// Vehicle record as served by the Vehicle Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(deserialize_with = "deserialize_vehicle_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub plate_number: String,
    pub status: String,
}

impl Vehicle {
    /// Availability is compared case-insensitively; the collaborator is not
    /// consistent about capitalization.
    pub fn is_available(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("available")
    }

    /// Full-replace update body carrying this vehicle's type and plate as
    /// last read, with only the status swapped.
    pub fn update_with_status(&self, status: &str) -> VehicleUpdate {
        VehicleUpdate {
            kind: self.kind.clone(),
            plate_number: self.plate_number.clone(),
            status: status.to_string(),
        }
    }
}

/// Body of the collaborator's PUT. The contract is a full replace of the
/// mutable fields, not a partial patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub plate_number: String,
    pub status: String,
}

/// The Vehicle Service serves ids as strings or bare numbers depending on
/// its backing store; both are normalized to strings here.
fn deserialize_vehicle_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "vehicle id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Outbound capability to query vehicle availability and update a vehicle's
/// status.
#[async_trait]
pub trait VehicleGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<Vehicle>, VehicleGatewayError>;
    async fn fetch(&self, id: &str) -> Result<Option<Vehicle>, VehicleGatewayError>;
    async fn update(&self, id: &str, update: VehicleUpdate) -> Result<(), VehicleGatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VehicleGatewayError {
    #[error("vehicle service transport failure: {0}")]
    Transport(String),
    #[error("vehicle service payload could not be decoded: {0}")]
    Decode(String),
    #[error("vehicle service did not confirm the update")]
    Rejected,
}

/// Reqwest-backed gateway. The base URL and request timeout are injected at
/// construction so the assignment coordinator stays testable against fakes.
pub struct HttpVehicleGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVehicleGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: trim_base(base_url.into()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

fn transport(err: reqwest::Error) -> VehicleGatewayError {
    VehicleGatewayError::Transport(err.to_string())
}

fn decode(err: reqwest::Error) -> VehicleGatewayError {
    VehicleGatewayError::Decode(err.to_string())
}

#[async_trait]
impl VehicleGateway for HttpVehicleGateway {
    async fn list(&self) -> Result<Vec<Vehicle>, VehicleGatewayError> {
        let response = self
            .client
            .get(self.url("/vehicles"))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleGatewayError::Transport(format!(
                "vehicle listing returned {status}"
            )));
        }
        let envelope: Envelope<Vec<Vehicle>> = response.json().await.map_err(decode)?;
        Ok(envelope.data)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Vehicle>, VehicleGatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/vehicles/{id}")))
            .send()
            .await
            .map_err(transport)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(VehicleGatewayError::Transport(format!(
                "vehicle lookup returned {status}"
            )));
        }
        let envelope: Envelope<Vehicle> = response.json().await.map_err(decode)?;
        Ok(Some(envelope.data))
    }

    async fn update(&self, id: &str, update: VehicleUpdate) -> Result<(), VehicleGatewayError> {
        let response = self
            .client
            .put(self.url(&format!("/vehicles/{id}")))
            .json(&update)
            .send()
            .await
            .map_err(transport)?;
        // Success is signalled in the body, not the HTTP status.
        let body: Value = response
            .json()
            .await
            .map_err(|_| VehicleGatewayError::Rejected)?;
        if body.get("status").and_then(Value::as_str) == Some("success") {
            Ok(())
        } else {
            Err(VehicleGatewayError::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_envelope_accepts_numeric_and_string_ids() {
        let payload = r#"{"data": [
            {"id": 1, "type": "Sedan", "plate_number": "B 1234 XY", "status": "InUse"},
            {"id": "2", "type": "Van", "plate_number": "B 5678 ZZ", "status": "Available"}
        ]}"#;
        let envelope: Envelope<Vec<Vehicle>> =
            serde_json::from_str(payload).expect("listing parses");
        assert_eq!(envelope.data[0].id, "1");
        assert_eq!(envelope.data[1].id, "2");
        assert_eq!(envelope.data[1].kind, "Van");
    }

    #[test]
    fn availability_check_ignores_case_and_padding() {
        let mut vehicle = Vehicle {
            id: "2".to_string(),
            kind: "Sedan".to_string(),
            plate_number: "B 1234 XY".to_string(),
            status: " AVAILABLE ".to_string(),
        };
        assert!(vehicle.is_available());
        vehicle.status = "InUse".to_string();
        assert!(!vehicle.is_available());
    }

    #[test]
    fn update_body_preserves_type_and_plate() {
        let vehicle = Vehicle {
            id: "2".to_string(),
            kind: "Sedan".to_string(),
            plate_number: "B 1234 XY".to_string(),
            status: "Available".to_string(),
        };
        let update = vehicle.update_with_status(VEHICLE_IN_USE);
        assert_eq!(update.kind, "Sedan");
        assert_eq!(update.plate_number, "B 1234 XY");
        assert_eq!(update.status, "InUse");

        let wire = serde_json::to_value(&update).expect("update serializes");
        assert_eq!(wire["type"], "Sedan");
        assert_eq!(wire["plate_number"], "B 1234 XY");
        assert_eq!(wire["status"], "InUse");
    }

    #[test]
    fn base_url_trailing_slashes_are_dropped() {
        assert_eq!(trim_base("http://localhost:8000/api//".to_string()), "http://localhost:8000/api");
        assert_eq!(trim_base("http://localhost:8000".to_string()), "http://localhost:8000");
    }
}
