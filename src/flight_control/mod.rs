pub(crate) mod common;
mod convergence;
mod flight_computer;
mod flight_phase;
mod supervisor;
mod telemetry_monitor;
#[cfg(test)]
mod tests;

pub use convergence::ConvergenceGoal;
pub use flight_computer::FlightComputer;
pub use flight_phase::FlightPhase;
pub use supervisor::{OffboardSupervisor, PhaseEvent, RunError, SupervisorConfig, WaitStyle};
pub use telemetry_monitor::{ConvergenceTask, MonitorError, TelemetryMonitor};
