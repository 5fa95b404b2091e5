//! Driver record service for the fleet platform.
//!
//! The library hosts the driver domain model, the storage abstraction, the
//! outbound gateways to the Vehicle and Auth services, and the HTTP router.
//! The `services/api` binary composes these into a running service.

pub mod config;
pub mod drivers;
pub mod error;
pub mod telemetry;
