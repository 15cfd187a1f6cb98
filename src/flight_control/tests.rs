use super::common::{PositionNed, PositionNedYaw, PositionVelocityNed, VelocityNed};
use super::convergence::ConvergenceGoal;
use super::flight_computer::FlightComputer;
use super::flight_phase::FlightPhase;
use super::supervisor::{OffboardSupervisor, PhaseEvent, RunError, SupervisorConfig, WaitStyle};
use super::telemetry_monitor::{MonitorError, TelemetryMonitor};
use crate::vehicle_link::{
    CommandError, CommandResult, OffboardRejected, OffboardResult, SimVehicleLink, TelemetryError,
    TelemetryStream, VehicleCommand, VehicleLink,
};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

type SampleScript = Vec<Result<PositionVelocityNed, TelemetryError>>;

fn goal() -> ConvergenceGoal {
    ConvergenceGoal::new(PositionNed::new(50.0, 50.0, -50.0), 0.1)
}

fn sample(north_m: f64, east_m: f64, down_m: f64) -> PositionVelocityNed {
    PositionVelocityNed::new(PositionNed::new(north_m, east_m, down_m), VelocityNed::ZERO)
}

fn far_sample() -> PositionVelocityNed { sample(0.0, 0.0, 0.0) }

/// Endless stream over `samples` that counts every pull.
fn counted_stream(samples: SampleScript, pulls: Arc<AtomicUsize>) -> TelemetryStream {
    Box::pin(
        stream::iter(samples)
            .inspect(move |_| {
                pulls.fetch_add(1, Ordering::SeqCst);
            })
            .chain(stream::pending()),
    )
}

// ---- convergence checks -------------------------------------------------

#[test]
fn test_converged_within_tolerance() {
    assert!(goal().is_met_by(PositionNed::new(50.05, 49.97, -49.99)));
}

#[test]
fn test_single_axis_off_is_not_converged() {
    assert!(!goal().is_met_by(PositionNed::new(49.0, 50.0, -50.0)));
}

#[test]
fn test_boundary_difference_is_not_converged() {
    // A per-axis difference of exactly epsilon must not count as arrived.
    let exact = ConvergenceGoal::new(PositionNed::new(50.0, 50.0, -50.0), 1.0);
    assert!(!exact.is_met_by(PositionNed::new(51.0, 50.0, -50.0)));
    assert!(exact.is_met_by(PositionNed::new(50.99, 50.0, -50.0)));
}

#[test]
fn test_convergence_is_monotone_in_epsilon() {
    let mut rng = rand::rng();
    let target = PositionNed::new(50.0, 50.0, -50.0);
    for _ in 0..100 {
        let observed = PositionNed::new(
            target.north_m() + rng.random_range(-0.2..0.2),
            target.east_m() + rng.random_range(-0.2..0.2),
            target.down_m() + rng.random_range(-0.2..0.2),
        );
        if ConvergenceGoal::new(target, 0.1).is_met_by(observed) {
            assert!(ConvergenceGoal::new(target, 0.2).is_met_by(observed));
            assert!(ConvergenceGoal::new(target, 10.0).is_met_by(observed));
        }
    }
}

#[test]
fn test_nan_observation_reports_not_converged() {
    assert!(!goal().is_met_by(PositionNed::new(f64::NAN, 50.0, -50.0)));
    assert!(!goal().is_met_by(PositionNed::new(f64::NAN, f64::NAN, f64::NAN)));
}

#[test]
#[should_panic]
fn test_zero_tolerance_is_rejected() {
    let _ = ConvergenceGoal::new(PositionNed::ORIGIN, 0.0);
}

// ---- telemetry monitor --------------------------------------------------

#[tokio::test]
async fn test_monitor_succeeds_on_the_converging_sample() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let script = vec![
        Ok(far_sample()),
        Ok(sample(10.0, 10.0, -10.0)),
        Ok(sample(49.0, 50.0, -50.0)),
        Ok(sample(50.05, 49.97, -49.99)),
    ];
    let backoff = Duration::from_millis(10);
    let start = Instant::now();
    let res = TelemetryMonitor::await_convergence(
        goal(),
        counted_stream(script, Arc::clone(&pulls)),
        backoff,
        CancellationToken::new(),
    )
    .await;
    assert_eq!(res, Ok(()));
    assert_eq!(pulls.load(Ordering::SeqCst), 4);
    // One backoff per non-converging sample, none after the converging one.
    assert!(start.elapsed() >= backoff * 3);
}

#[tokio::test]
async fn test_monitor_cancellation_performs_no_further_pulls() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let script = vec![Ok(far_sample()), Ok(far_sample())];
    let c_tok = CancellationToken::new();
    let handle = tokio::spawn(TelemetryMonitor::await_convergence(
        goal(),
        counted_stream(script, Arc::clone(&pulls)),
        Duration::from_millis(10),
        c_tok.clone(),
    ));
    while pulls.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Let the monitor pass the backoff and suspend on the pending third pull.
    tokio::time::sleep(Duration::from_millis(30)).await;
    c_tok.cancel();
    let res = handle.await.unwrap();
    assert_eq!(res, Err(MonitorError::Cancelled));
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_convergence_task_cancel_and_join() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let task = TelemetryMonitor::spawn(
        goal(),
        counted_stream(vec![Ok(far_sample())], pulls),
        Duration::from_millis(5),
    );
    task.cancel();
    assert_eq!(task.join().await, Err(MonitorError::Cancelled));
}

#[tokio::test]
async fn test_monitor_propagates_stream_failure() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let script = vec![
        Ok(far_sample()),
        Err(TelemetryError::LinkLost("heartbeat timed out".to_string())),
    ];
    let res = TelemetryMonitor::await_convergence(
        goal(),
        counted_stream(script, pulls),
        Duration::from_millis(5),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        res,
        Err(MonitorError::Telemetry(TelemetryError::LinkLost(_)))
    ));
}

#[tokio::test]
async fn test_monitor_reports_a_closed_stream() {
    let ended: TelemetryStream = Box::pin(stream::iter(vec![Ok(far_sample())]));
    let res = TelemetryMonitor::await_convergence(
        goal(),
        ended,
        Duration::from_millis(5),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(
        res,
        Err(MonitorError::Telemetry(TelemetryError::StreamClosed))
    );
}

// ---- supervisor ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkCall {
    Arm,
    Disarm,
    StartOffboard,
    StopOffboard,
    Setpoint,
    ReturnToLaunch,
}

/// Scripted link recording every command for later inspection.
struct ScriptedLink {
    calls: Mutex<Vec<LinkCall>>,
    streams: Mutex<VecDeque<SampleScript>>,
    reject_offboard_start: bool,
    reject_offboard_stop: bool,
    fail_disarm: bool,
    fail_setpoints: Mutex<usize>,
}

impl ScriptedLink {
    fn new(streams: Vec<SampleScript>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            streams: Mutex::new(VecDeque::from(streams)),
            reject_offboard_start: false,
            reject_offboard_stop: false,
            fail_disarm: false,
            fail_setpoints: Mutex::new(0),
        }
    }

    fn record(&self, call: LinkCall) { self.calls.lock().unwrap().push(call) }

    fn calls(&self) -> Vec<LinkCall> { self.calls.lock().unwrap().clone() }

    fn count(&self, call: LinkCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

#[async_trait]
impl VehicleLink for ScriptedLink {
    async fn arm(&self) -> Result<(), CommandError> {
        self.record(LinkCall::Arm);
        Ok(())
    }

    async fn disarm(&self) -> Result<(), CommandError> {
        self.record(LinkCall::Disarm);
        if self.fail_disarm {
            return Err(CommandError::new(VehicleCommand::Disarm, CommandResult::Denied));
        }
        Ok(())
    }

    async fn start_offboard(&self) -> Result<(), OffboardRejected> {
        self.record(LinkCall::StartOffboard);
        if self.reject_offboard_start {
            return Err(OffboardRejected::new(OffboardResult::CommandDenied));
        }
        Ok(())
    }

    async fn stop_offboard(&self) -> Result<(), OffboardRejected> {
        self.record(LinkCall::StopOffboard);
        if self.reject_offboard_stop {
            return Err(OffboardRejected::new(OffboardResult::CommandDenied));
        }
        Ok(())
    }

    async fn set_position_setpoint(&self, _: PositionNedYaw) -> Result<(), CommandError> {
        self.record(LinkCall::Setpoint);
        let mut left = self.fail_setpoints.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(CommandError::new(
                VehicleCommand::SetPositionSetpoint,
                CommandResult::Busy,
            ));
        }
        Ok(())
    }

    async fn return_to_launch(&self) -> Result<(), CommandError> {
        self.record(LinkCall::ReturnToLaunch);
        Ok(())
    }

    fn telemetry_stream(&self) -> TelemetryStream {
        let script = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(stream::iter(script).chain(stream::pending()))
    }
}

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        poll_backoff: Duration::from_millis(5),
        landing_settle: Duration::from_millis(10),
        nav_timeout: None,
        wait_style: WaitStyle::Inline,
        retry_setpoint_once: false,
    }
}

fn supervisor_over(link: Arc<ScriptedLink>, config: SupervisorConfig) -> OffboardSupervisor {
    let link_dyn: Arc<dyn VehicleLink> = link;
    let f_cont = Arc::new(RwLock::new(FlightComputer::new(link_dyn)));
    OffboardSupervisor::new(f_cont, config)
}

fn drain_events(events: &mut tokio::sync::broadcast::Receiver<PhaseEvent>) -> Vec<PhaseEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_run_flies_all_goals_to_done() {
    let climb = ConvergenceGoal::new(PositionNed::new(0.0, 0.0, -20.0), 0.1);
    let streams = vec![
        vec![Ok(sample(0.0, 0.0, -5.0)), Ok(sample(0.0, 0.0, -19.95))],
        vec![Ok(sample(50.02, 49.98, -50.01))],
    ];
    let link = Arc::new(ScriptedLink::new(streams));
    let supervisor = supervisor_over(Arc::clone(&link), test_config());
    let mut events = supervisor.subscribe_phase_events();

    let res = supervisor.run(&[climb, goal()]).await;
    assert!(res.is_ok());
    assert_eq!(supervisor.phase().await, FlightPhase::Done);
    assert_eq!(
        link.calls(),
        vec![
            LinkCall::Arm,
            LinkCall::Setpoint,
            LinkCall::StartOffboard,
            LinkCall::Setpoint,
            LinkCall::Setpoint,
            LinkCall::ReturnToLaunch,
            LinkCall::StopOffboard,
        ]
    );

    let entered: Vec<FlightPhase> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PhaseEvent::Entered(phase) => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        entered,
        vec![
            FlightPhase::Arming,
            FlightPhase::StartingOffboard,
            FlightPhase::Navigating,
            FlightPhase::Converged,
            FlightPhase::Navigating,
            FlightPhase::Converged,
            FlightPhase::Landing,
            FlightPhase::StoppingOffboard,
            FlightPhase::Done,
        ]
    );
}

#[tokio::test]
async fn test_start_rejection_disarms_exactly_once_then_fails() {
    let mut link = ScriptedLink::new(Vec::new());
    link.reject_offboard_start = true;
    link.fail_disarm = true;
    let link = Arc::new(link);
    let supervisor = supervisor_over(Arc::clone(&link), test_config());

    let res = supervisor.run(&[goal()]).await;
    assert!(matches!(res, Err(RunError::OffboardStart(_))));
    assert_eq!(supervisor.phase().await, FlightPhase::Failed);
    assert_eq!(link.count(LinkCall::Disarm), 1);
    assert_eq!(
        link.calls(),
        vec![
            LinkCall::Arm,
            LinkCall::Setpoint,
            LinkCall::StartOffboard,
            LinkCall::Disarm,
        ]
    );
}

#[tokio::test]
async fn test_stop_rejection_is_downgraded_to_a_warning() {
    let streams = vec![vec![Ok(sample(50.0, 50.0, -50.0))]];
    let mut link = ScriptedLink::new(streams);
    link.reject_offboard_stop = true;
    let link = Arc::new(link);
    let supervisor = supervisor_over(Arc::clone(&link), test_config());
    let mut events = supervisor.subscribe_phase_events();

    let res = supervisor.run(&[goal()]).await;
    assert!(res.is_ok());
    assert_eq!(supervisor.phase().await, FlightPhase::Done);
    let warned = drain_events(&mut events).into_iter().any(|event| {
        matches!(event, PhaseEvent::Warning(FlightPhase::StoppingOffboard, _))
    });
    assert!(warned);
}

#[tokio::test]
async fn test_stream_failure_fails_the_run() {
    let streams = vec![vec![
        Ok(far_sample()),
        Err(TelemetryError::LinkLost("no samples".to_string())),
    ]];
    let link = Arc::new(ScriptedLink::new(streams));
    let supervisor = supervisor_over(Arc::clone(&link), test_config());

    let res = supervisor.run(&[goal()]).await;
    assert!(matches!(res, Err(RunError::Convergence(_))));
    assert_eq!(supervisor.phase().await, FlightPhase::Failed);
    // No landing attempt after a failed navigation.
    assert_eq!(link.count(LinkCall::ReturnToLaunch), 0);
}

#[tokio::test]
async fn test_nav_timeout_cancels_the_monitor() {
    let streams = vec![vec![Ok(far_sample()), Ok(far_sample())]];
    let link = Arc::new(ScriptedLink::new(streams));
    let mut config = test_config();
    config.nav_timeout = Some(Duration::from_millis(40));
    let supervisor = supervisor_over(Arc::clone(&link), config);

    let res = supervisor.run(&[goal()]).await;
    assert!(matches!(res, Err(RunError::Timeout(_))));
    assert_eq!(supervisor.phase().await, FlightPhase::Failed);
}

#[tokio::test]
async fn test_background_wait_still_joins_the_monitor() {
    let streams = vec![vec![Ok(far_sample()), Ok(sample(50.0, 50.0, -50.0))]];
    let link = Arc::new(ScriptedLink::new(streams));
    let mut config = test_config();
    config.wait_style = WaitStyle::Background {
        work_ticks: 3,
        work_tick: Duration::from_millis(5),
    };
    let supervisor = supervisor_over(Arc::clone(&link), config);

    let res = supervisor.run(&[goal()]).await;
    assert!(res.is_ok());
    assert_eq!(supervisor.phase().await, FlightPhase::Done);
}

#[tokio::test]
async fn test_setpoint_retry_once_recovers_a_rejected_command() {
    let streams = vec![vec![Ok(sample(50.0, 50.0, -50.0))]];
    let link = ScriptedLink::new(streams);
    *link.fail_setpoints.lock().unwrap() = 1;
    let link = Arc::new(link);
    let mut config = test_config();
    config.retry_setpoint_once = true;
    let supervisor = supervisor_over(Arc::clone(&link), config);

    let res = supervisor.run(&[goal()]).await;
    assert!(res.is_ok());
    // The rejected initial setpoint was reissued once.
    assert_eq!(link.count(LinkCall::Setpoint), 3);
}

#[tokio::test]
async fn test_setpoint_failure_without_retry_fails_the_run() {
    let link = ScriptedLink::new(Vec::new());
    *link.fail_setpoints.lock().unwrap() = 1;
    let link = Arc::new(link);
    let supervisor = supervisor_over(Arc::clone(&link), test_config());

    let res = supervisor.run(&[goal()]).await;
    assert!(matches!(res, Err(RunError::Command(_))));
    assert_eq!(supervisor.phase().await, FlightPhase::Failed);
    assert_eq!(link.count(LinkCall::StartOffboard), 0);
}

#[tokio::test]
async fn test_full_run_against_the_sim_link() {
    let link: Arc<dyn VehicleLink> = Arc::new(
        SimVehicleLink::new()
            .with_sample_interval(Duration::from_millis(5))
            .with_max_speed(50.0),
    );
    let f_cont = Arc::new(RwLock::new(FlightComputer::new(link)));
    let config = SupervisorConfig {
        poll_backoff: Duration::from_millis(5),
        landing_settle: Duration::from_millis(20),
        ..SupervisorConfig::default()
    };
    let supervisor = OffboardSupervisor::new(f_cont, config);

    let goals = [ConvergenceGoal::new(PositionNed::new(2.0, 0.0, -2.0), 0.5)];
    let res = supervisor.run(&goals).await;
    assert!(res.is_ok());
    assert_eq!(supervisor.phase().await, FlightPhase::Done);
}
