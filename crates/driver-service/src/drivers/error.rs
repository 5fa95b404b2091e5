use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::accounts::AccountGatewayError;
use super::domain::DriverId;
use super::store::StoreError;
use super::vehicles::VehicleGatewayError;

/// Per-field violation bag, rendered as `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    violations: BTreeMap<&'static str, Vec<String>>,
}

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.entry(field).or_default().push(message.into());
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.violations.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.violations
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Error raised by the driver lifecycle and assignment services.
#[derive(Debug, thiserror::Error)]
pub enum DriverServiceError {
    /// Input failed field validation; carries the per-field violations.
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("Driver not found")]
    DriverNotFound,
    #[error("Vehicle not found")]
    VehicleNotFound,
    /// A state precondition was not met (driver or vehicle unavailable).
    #[error("{0}")]
    Conflict(String),
    /// A collaborator failed; any local write made before the failure has
    /// already been compensated.
    #[error(transparent)]
    Upstream(UpstreamError),
    /// Rolling back the local write failed, leaving the driver row out of
    /// step with the Vehicle Service.
    #[error("driver {driver} left inconsistent after failed rollback: {source}")]
    CompensationFailed {
        driver: DriverId,
        #[source]
        source: StoreError,
    },
    /// Store failure unrelated to a specific record.
    #[error("driver store failure: {0}")]
    Store(StoreError),
}

/// Failures of the external services, kept apart so callers can tell which
/// collaborator misbehaved.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("vehicle service: {0}")]
    Vehicles(#[from] VehicleGatewayError),
    #[error("auth service: {0}")]
    Accounts(#[from] AccountGatewayError),
}

impl From<StoreError> for DriverServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::DriverNotFound,
            StoreError::Duplicate(field) => {
                Self::Validation(ValidationErrors::single(field.name(), "has already been taken"))
            }
            StoreError::NotAvailable => Self::Conflict("Driver is not available".to_string()),
            StoreError::Unavailable(message) => Self::Store(StoreError::Unavailable(message)),
        }
    }
}

impl From<VehicleGatewayError> for DriverServiceError {
    fn from(err: VehicleGatewayError) -> Self {
        Self::Upstream(UpstreamError::Vehicles(err))
    }
}

impl From<AccountGatewayError> for DriverServiceError {
    fn from(err: AccountGatewayError) -> Self {
        Self::Upstream(UpstreamError::Accounts(err))
    }
}

impl IntoResponse for DriverServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            DriverServiceError::Validation(violations) => {
                (StatusCode::BAD_REQUEST, json!({ "error": violations }))
            }
            DriverServiceError::DriverNotFound => {
                (StatusCode::NOT_FOUND, json!({ "error": "Driver not found" }))
            }
            DriverServiceError::VehicleNotFound => {
                (StatusCode::NOT_FOUND, json!({ "error": "Vehicle not found" }))
            }
            DriverServiceError::Conflict(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            DriverServiceError::Upstream(_) | DriverServiceError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
            DriverServiceError::CompensationFailed { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": self.to_string(),
                    "incident": "driver_state_inconsistent",
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
