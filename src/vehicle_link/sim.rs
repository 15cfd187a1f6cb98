use super::common::{CommandError, OffboardRejected, OffboardResult};
use super::link::{TelemetryStream, VehicleLink};
use crate::flight_control::common::{PositionNed, PositionNedYaw, PositionVelocityNed, VelocityNed};
use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// First-order kinematic stand-in for a real vehicle.
///
/// Flies straight towards the last commanded setpoint at a bounded speed and
/// samples its state on a fixed interval. Rejection semantics follow the
/// autopilot: offboard start is denied before a setpoint has been streamed,
/// and offboard stop is denied without GPS hold available (stopping requires
/// a mode switch to HOLD).
pub struct SimVehicleLink {
    state: Arc<Mutex<SimState>>,
    sample_interval: Duration,
    max_speed_m_s: f64,
    gps_hold: bool,
}

#[derive(Debug)]
struct SimState {
    armed: bool,
    offboard: bool,
    setpoint: Option<PositionNedYaw>,
    position: PositionNed,
    velocity: VelocityNed,
}

impl SimVehicleLink {
    const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
    const DEFAULT_MAX_SPEED_M_S: f64 = 5.0;

    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                armed: false,
                offboard: false,
                setpoint: None,
                position: PositionNed::ORIGIN,
                velocity: VelocityNed::ZERO,
            })),
            sample_interval: Self::DEFAULT_SAMPLE_INTERVAL,
            max_speed_m_s: Self::DEFAULT_MAX_SPEED_M_S,
            gps_hold: true,
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_max_speed(mut self, max_speed_m_s: f64) -> Self {
        self.max_speed_m_s = max_speed_m_s;
        self
    }

    /// Simulates an environment without GPS hold, where offboard stop comes
    /// back with `CommandDenied`.
    pub fn without_gps_hold(mut self) -> Self {
        self.gps_hold = false;
        self
    }

    /// Advances the kinematics by `dt_s`. The vehicle only moves while armed
    /// and holding a setpoint.
    fn step(state: &mut SimState, max_speed_m_s: f64, dt_s: f64) {
        let Some(target) = state.setpoint.map(PositionNedYaw::strip_yaw) else {
            return;
        };
        if !state.armed {
            return;
        }
        let pos = state.position;
        let diff_n = target.north_m() - pos.north_m();
        let diff_e = target.east_m() - pos.east_m();
        let diff_d = target.down_m() - pos.down_m();
        let dist = (diff_n * diff_n + diff_e * diff_e + diff_d * diff_d).sqrt();
        let max_step = max_speed_m_s * dt_s;
        if dist <= max_step {
            state.position = target;
            state.velocity = VelocityNed::ZERO;
        } else {
            let scale = max_speed_m_s / dist;
            state.velocity =
                VelocityNed::new(diff_n * scale, diff_e * scale, diff_d * scale);
            state.position = PositionNed::new(
                pos.north_m() + diff_n * scale * dt_s,
                pos.east_m() + diff_e * scale * dt_s,
                pos.down_m() + diff_d * scale * dt_s,
            );
        }
    }
}

impl Default for SimVehicleLink {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl VehicleLink for SimVehicleLink {
    async fn arm(&self) -> Result<(), CommandError> {
        self.state.lock().await.armed = true;
        Ok(())
    }

    async fn disarm(&self) -> Result<(), CommandError> {
        let mut state = self.state.lock().await;
        state.armed = false;
        state.offboard = false;
        Ok(())
    }

    async fn start_offboard(&self) -> Result<(), OffboardRejected> {
        let mut state = self.state.lock().await;
        if !state.armed {
            return Err(OffboardRejected::new(OffboardResult::CommandDenied));
        }
        if state.setpoint.is_none() {
            return Err(OffboardRejected::new(OffboardResult::NoSetpointSet));
        }
        state.offboard = true;
        Ok(())
    }

    async fn stop_offboard(&self) -> Result<(), OffboardRejected> {
        if !self.gps_hold {
            return Err(OffboardRejected::new(OffboardResult::CommandDenied));
        }
        self.state.lock().await.offboard = false;
        Ok(())
    }

    async fn set_position_setpoint(&self, setpoint: PositionNedYaw) -> Result<(), CommandError> {
        self.state.lock().await.setpoint = Some(setpoint);
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), CommandError> {
        self.state.lock().await.setpoint = Some(PositionNed::ORIGIN.with_yaw(0.0));
        Ok(())
    }

    fn telemetry_stream(&self) -> TelemetryStream {
        let state = Arc::clone(&self.state);
        let interval = self.sample_interval;
        let max_speed = self.max_speed_m_s;
        Box::pin(stream::unfold(state, move |state| async move {
            tokio::time::sleep(interval).await;
            let sample = {
                let mut lock = state.lock().await;
                Self::step(&mut lock, max_speed, interval.as_secs_f64());
                PositionVelocityNed::new(lock.position, lock.velocity)
            };
            Some((Ok(sample), state))
        }))
    }
}
