use super::common::PositionNedYaw;
use crate::vehicle_link::{
    CommandError, OffboardRejected, TelemetryStream, VehicleLink,
};
use std::sync::Arc;

/// Command front-end for the shared vehicle link.
///
/// Lives behind an `Arc<RwLock<FlightComputer>>`. Every command takes
/// `&mut self`, so issuing one requires the write half of the lock and
/// commands are serialized even while a convergence monitor runs alongside.
/// Telemetry streams only need the read half.
pub struct FlightComputer {
    link: Arc<dyn VehicleLink>,
    last_setpoint: Option<PositionNedYaw>,
}

impl FlightComputer {
    pub fn new(link: Arc<dyn VehicleLink>) -> Self {
        Self {
            link,
            last_setpoint: None,
        }
    }

    pub async fn arm(&mut self) -> Result<(), CommandError> { self.link.arm().await }

    pub async fn disarm(&mut self) -> Result<(), CommandError> { self.link.disarm().await }

    pub async fn start_offboard(&mut self) -> Result<(), OffboardRejected> {
        self.link.start_offboard().await
    }

    pub async fn stop_offboard(&mut self) -> Result<(), OffboardRejected> {
        self.link.stop_offboard().await
    }

    pub async fn set_position_setpoint(
        &mut self,
        setpoint: PositionNedYaw,
    ) -> Result<(), CommandError> {
        self.link.set_position_setpoint(setpoint).await?;
        self.last_setpoint = Some(setpoint);
        Ok(())
    }

    pub async fn return_to_launch(&mut self) -> Result<(), CommandError> {
        self.link.return_to_launch().await
    }

    /// The last setpoint that was acknowledged by the link.
    pub fn last_setpoint(&self) -> Option<PositionNedYaw> { self.last_setpoint }

    pub fn telemetry_stream(&self) -> TelemetryStream { self.link.telemetry_stream() }
}
