use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Store-assigned driver identifier. Monotonic; never reused after deletion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DriverId(pub u64);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Duty status tracked for every driver. `OnDuty` always goes together with
/// a vehicle reference; the other two statuses never hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    OnDuty,
    Unavailable,
}

impl DriverStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DriverStatus::Available => "available",
            DriverStatus::OnDuty => "on_duty",
            DriverStatus::Unavailable => "unavailable",
        }
    }

    /// Accepts the wire spelling used by request payloads.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => Some(Self::Available),
            "on_duty" => Some(Self::OnDuty),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

/// Persistent driver record owned by the driver store. The
/// `assigned_vehicle` field is a weak reference into the Vehicle Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub license_number: String,
    pub name: String,
    pub email: String,
    pub user_id: Option<String>,
    pub status: DriverStatus,
    pub assigned_vehicle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Client-facing rendering of the record.
    pub fn view(&self) -> DriverView {
        DriverView {
            id: self.id,
            license_number: self.license_number.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            user_id: self.user_id.clone(),
            status: self.status.label(),
            assigned_vehicle: self.assigned_vehicle.clone(),
            created_at: render_timestamp(self.created_at),
            updated_at: render_timestamp(self.updated_at),
        }
    }
}

/// Serialized driver representation returned to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct DriverView {
    pub id: DriverId,
    pub license_number: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: &'static str,
    pub assigned_vehicle: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Timestamps are reported as UTC+7 wall-clock time, matching what the rest
/// of the platform renders.
const DISPLAY_OFFSET_HOURS: i32 = 7;

fn render_timestamp(instant: DateTime<Utc>) -> String {
    let offset =
        FixedOffset::east_opt(DISPLAY_OFFSET_HOURS * 3600).expect("display offset in range");
    instant
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Fields accepted by the create endpoint. Everything arrives optional so
/// validation can report all missing fields in one pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverDraft {
    pub license_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
}

/// Full-replace payload accepted by the update endpoint. `assigned_vehicle`
/// distinguishes an absent field from an explicit null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverUpdate {
    pub license_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_explicit_option")]
    pub assigned_vehicle: Option<Option<String>>,
}

fn deserialize_explicit_option<'de, D>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
