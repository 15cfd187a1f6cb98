use super::common::{
    CommandError, ConnectionError, OffboardRejected, TelemetryError,
};
use super::sim::SimVehicleLink;
use crate::flight_control::common::{PositionNedYaw, PositionVelocityNed};
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;

/// A live sequence of telemetry samples in emission order.
///
/// Conceptually infinite and not restartable: once pulled from, a stream
/// cannot be rewound. Pull a fresh one from the link instead.
pub type TelemetryStream =
    Pin<Box<dyn futures_core::Stream<Item = Result<PositionVelocityNed, TelemetryError>> + Send>>;

/// The command and telemetry surface of a connected vehicle.
///
/// Implemented by an SDK/telemetry backend. The supervisor only ever talks to
/// this trait, so any transport that can arm, fly setpoints and stream NED
/// samples can sit behind it.
#[async_trait]
pub trait VehicleLink: Send + Sync {
    async fn arm(&self) -> Result<(), CommandError>;

    async fn disarm(&self) -> Result<(), CommandError>;

    /// Requests offboard mode. Rejections carry a named result code and leave
    /// the vehicle in its previous mode.
    async fn start_offboard(&self) -> Result<(), OffboardRejected>;

    async fn stop_offboard(&self) -> Result<(), OffboardRejected>;

    async fn set_position_setpoint(&self, setpoint: PositionNedYaw) -> Result<(), CommandError>;

    async fn return_to_launch(&self) -> Result<(), CommandError>;

    /// Opens a fresh telemetry stream. Never blocks; the samples do.
    fn telemetry_stream(&self) -> TelemetryStream;
}

/// Opens a vehicle link for `address`.
///
/// `sim://` addresses yield the built-in simulated link. Anything else has no
/// in-tree transport and fails with [`ConnectionError::UnsupportedScheme`];
/// real vehicle transports implement [`VehicleLink`] out of tree.
pub async fn connect(address: &str) -> Result<Arc<dyn VehicleLink>, ConnectionError> {
    if address.starts_with("sim://") {
        Ok(Arc::new(SimVehicleLink::new()))
    } else {
        Err(ConnectionError::UnsupportedScheme(address.to_string()))
    }
}
