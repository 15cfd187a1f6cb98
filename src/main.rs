#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod flight_control;
mod logger;
mod vehicle_link;

use crate::flight_control::common::PositionNed;
use crate::flight_control::{
    ConvergenceGoal, FlightComputer, OffboardSupervisor, PhaseEvent, SupervisorConfig,
};
use std::{env, process::ExitCode, sync::Arc};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

const GOAL_EPSILON_M: f64 = 0.1;
const CLIMB_GOAL_M: (f64, f64, f64) = (0.0, 0.0, -20.0);
const TRAVERSE_GOAL_M: (f64, f64, f64) = (50.0, 50.0, -50.0);

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> ExitCode {
    let addr_var = env::var("TALON_LINK_ADDR");
    let addr = addr_var.as_ref().map_or("sim://vehicle", |v| v.as_str());
    info!("Connecting to vehicle at {addr}.");
    let link = match vehicle_link::connect(addr).await {
        Ok(link) => link,
        Err(err) => {
            error!("Connection failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let f_cont = Arc::new(RwLock::new(FlightComputer::new(link)));
    let supervisor = OffboardSupervisor::new(Arc::clone(&f_cont), SupervisorConfig::default());
    let reporter = spawn_phase_reporter(supervisor.subscribe_phase_events());

    let goals = [goal_from(CLIMB_GOAL_M), goal_from(TRAVERSE_GOAL_M)];
    let res = supervisor.run(&goals).await;
    let terminal = supervisor.phase().await;
    // Dropping the supervisor closes the event hub, so the reporter drains
    // what is left and exits.
    drop(supervisor);
    reporter.await.ok();

    match res {
        Ok(()) => {
            info!("Run finished in phase {terminal}.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Run ended in phase {terminal}: {err}");
            ExitCode::FAILURE
        }
    }
}

fn goal_from((north_m, east_m, down_m): (f64, f64, f64)) -> ConvergenceGoal {
    ConvergenceGoal::new(PositionNed::new(north_m, east_m, down_m), GOAL_EPSILON_M)
}

/// The sole subscriber-side printer of phase progress.
fn spawn_phase_reporter(mut events: broadcast::Receiver<PhaseEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PhaseEvent::Entered(phase)) => info!("-- {phase}"),
                Ok(PhaseEvent::Passed(phase)) => log!("-- {phase} passed"),
                Ok(PhaseEvent::Warning(phase, reason)) => warn!("{phase}: {reason}"),
                Ok(PhaseEvent::Failed(phase, reason)) => error!("{phase} failed: {reason}"),
                Err(broadcast::error::RecvError::Lagged(_)) => (),
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
