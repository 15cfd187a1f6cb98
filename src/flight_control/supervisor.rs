use super::common::{PositionNed, PositionNedYaw};
use super::convergence::ConvergenceGoal;
use super::flight_computer::FlightComputer;
use super::flight_phase::FlightPhase;
use super::telemetry_monitor::{ConvergenceTask, MonitorError, TelemetryMonitor};
use crate::fatal;
use crate::vehicle_link::{CommandError, OffboardRejected, TelemetryError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Observable record of the supervisor's progress.
///
/// The supervisor itself never prints; subscribers turn these into console
/// output, log lines or UI updates.
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    Entered(FlightPhase),
    Passed(FlightPhase),
    Failed(FlightPhase, String),
    Warning(FlightPhase, String),
}

/// Why a navigation run ended in `Failed`.
#[derive(Debug)]
pub enum RunError {
    Command(CommandError),
    OffboardStart(OffboardRejected),
    Convergence(TelemetryError),
    Timeout(Duration),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Command(err) => write!(f, "{err}"),
            RunError::OffboardStart(rejection) => {
                write!(f, "starting offboard mode failed: {rejection}")
            }
            RunError::Convergence(err) => write!(f, "{err}"),
            RunError::Timeout(limit) => write!(f, "no convergence within {limit:?}"),
        }
    }
}

impl std::error::Error for RunError {}

/// How the supervisor waits on a running convergence check.
#[derive(Debug, Clone, Copy)]
pub enum WaitStyle {
    /// Join the convergence task right away.
    Inline,
    /// Leave the convergence task in the background while the supervisor
    /// performs `work_ticks` rounds of unrelated work, `work_tick` long each,
    /// then join it.
    Background { work_ticks: u32, work_tick: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Cooperative sleep between telemetry pulls.
    pub poll_backoff: Duration,
    /// How long the vehicle gets to descend after return-to-launch before the
    /// offboard stop is requested.
    pub landing_settle: Duration,
    /// `None` waits indefinitely for convergence. On expiry the monitor is
    /// cancelled and the run fails with [`RunError::Timeout`].
    pub nav_timeout: Option<Duration>,
    pub wait_style: WaitStyle,
    /// Retry a rejected position setpoint exactly once instead of failing the
    /// run on the first error.
    pub retry_setpoint_once: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_backoff: TelemetryMonitor::DEFAULT_POLL_BACKOFF,
            landing_settle: OffboardSupervisor::DEFAULT_LANDING_SETTLE,
            nav_timeout: None,
            wait_style: WaitStyle::Inline,
            retry_setpoint_once: false,
        }
    }
}

/// State machine for one offboard navigation run.
///
/// Walks the vehicle through arm, offboard start, one [`ConvergenceGoal`]
/// after another, return-to-launch and offboard stop. Convergence detection
/// is delegated to [`TelemetryMonitor`]; command issuance goes through the
/// write half of the shared [`FlightComputer`] lock, so no two commands are
/// ever in flight at once.
pub struct OffboardSupervisor {
    f_cont_lock: Arc<RwLock<FlightComputer>>,
    phase: RwLock<FlightPhase>,
    event_hub: broadcast::Sender<PhaseEvent>,
    config: SupervisorConfig,
}

impl OffboardSupervisor {
    const EVENT_HUB_CAPACITY: usize = 32;
    pub const DEFAULT_LANDING_SETTLE: Duration = Duration::from_secs(30);

    pub fn new(f_cont_lock: Arc<RwLock<FlightComputer>>, config: SupervisorConfig) -> Self {
        Self {
            f_cont_lock,
            phase: RwLock::new(FlightPhase::Idle),
            event_hub: broadcast::Sender::new(Self::EVENT_HUB_CAPACITY),
            config,
        }
    }

    pub fn subscribe_phase_events(&self) -> broadcast::Receiver<PhaseEvent> {
        self.event_hub.subscribe()
    }

    pub async fn phase(&self) -> FlightPhase { *self.phase.read().await }

    /// Flies the goal sequence. One run per instance.
    ///
    /// Returns `Ok(())` with terminal phase `Done`, or the first unrecoverable
    /// error with terminal phase `Failed`. A rejected offboard stop does not
    /// fail the run; it is surfaced as a [`PhaseEvent::Warning`].
    pub async fn run(&self, goals: &[ConvergenceGoal]) -> Result<(), RunError> {
        self.enter(FlightPhase::Arming).await;
        if let Err(err) = self.f_cont_lock.write().await.arm().await {
            return Err(self.fail(FlightPhase::Arming, RunError::Command(err)).await);
        }
        self.emit(PhaseEvent::Passed(FlightPhase::Arming));

        self.enter(FlightPhase::StartingOffboard).await;
        let initial = PositionNedYaw::from(PositionNed::ORIGIN);
        if let Err(err) = self.issue_setpoint(initial).await {
            return Err(self.fail(FlightPhase::StartingOffboard, RunError::Command(err)).await);
        }
        let start_res = self.f_cont_lock.write().await.start_offboard().await;
        if let Err(rejection) = start_res {
            // The rejection dominates; the disarm is best-effort.
            if let Err(err) = self.f_cont_lock.write().await.disarm().await {
                self.emit(PhaseEvent::Warning(
                    FlightPhase::StartingOffboard,
                    format!("best-effort disarm failed: {err}"),
                ));
            }
            return Err(self
                .fail(FlightPhase::StartingOffboard, RunError::OffboardStart(rejection))
                .await);
        }
        self.emit(PhaseEvent::Passed(FlightPhase::StartingOffboard));

        for goal in goals {
            self.navigate_to(*goal).await?;
        }

        self.enter(FlightPhase::Landing).await;
        if let Err(err) = self.f_cont_lock.write().await.return_to_launch().await {
            return Err(self.fail(FlightPhase::Landing, RunError::Command(err)).await);
        }
        tokio::time::sleep(self.config.landing_settle).await;
        self.emit(PhaseEvent::Passed(FlightPhase::Landing));

        self.enter(FlightPhase::StoppingOffboard).await;
        match self.f_cont_lock.write().await.stop_offboard().await {
            Ok(()) => self.emit(PhaseEvent::Passed(FlightPhase::StoppingOffboard)),
            // The vehicle is already landing outside offboard control, so a
            // stop rejection does not revert the phase.
            Err(rejection) => self.emit(PhaseEvent::Warning(
                FlightPhase::StoppingOffboard,
                rejection.to_string(),
            )),
        }
        self.enter(FlightPhase::Done).await;
        Ok(())
    }

    async fn navigate_to(&self, goal: ConvergenceGoal) -> Result<(), RunError> {
        self.enter(FlightPhase::Navigating).await;
        if let Err(err) = self.issue_setpoint(goal.target().into()).await {
            return Err(self.fail(FlightPhase::Navigating, RunError::Command(err)).await);
        }
        let samples = self.f_cont_lock.read().await.telemetry_stream();
        let task = TelemetryMonitor::spawn(goal, samples, self.config.poll_backoff);
        match self.wait_for(task).await {
            Ok(()) => {
                self.emit(PhaseEvent::Passed(FlightPhase::Navigating));
                self.enter(FlightPhase::Converged).await;
                self.emit(PhaseEvent::Passed(FlightPhase::Converged));
                Ok(())
            }
            Err(err) => Err(self.fail(FlightPhase::Navigating, err).await),
        }
    }

    async fn issue_setpoint(&self, setpoint: PositionNedYaw) -> Result<(), CommandError> {
        let mut f_cont = self.f_cont_lock.write().await;
        match f_cont.set_position_setpoint(setpoint).await {
            Err(_) if self.config.retry_setpoint_once => {
                f_cont.set_position_setpoint(setpoint).await
            }
            other => other,
        }
    }

    async fn wait_for(&self, task: ConvergenceTask) -> Result<(), RunError> {
        if let WaitStyle::Background { work_ticks, work_tick } = self.config.wait_style {
            // Unrelated foreground work while the monitor runs alongside.
            for _ in 0..work_ticks {
                if task.is_finished() {
                    break;
                }
                tokio::time::sleep(work_tick).await;
            }
        }
        let res = match self.config.nav_timeout {
            None => task.join().await,
            Some(limit) => {
                let c_tok = task.token();
                match tokio::time::timeout(limit, task.join()).await {
                    Ok(res) => res,
                    Err(_) => {
                        // The monitor observes this within one poll backoff
                        // and exits without side effects.
                        c_tok.cancel();
                        return Err(RunError::Timeout(limit));
                    }
                }
            }
        };
        match res {
            Ok(()) => Ok(()),
            Err(MonitorError::Telemetry(err)) => Err(RunError::Convergence(err)),
            Err(MonitorError::Cancelled) => {
                fatal!("Convergence monitor cancelled without a timeout configured!")
            }
        }
    }

    async fn enter(&self, phase: FlightPhase) {
        *self.phase.write().await = phase;
        self.emit(PhaseEvent::Entered(phase));
    }

    fn emit(&self, event: PhaseEvent) {
        // Nobody subscribed is fine; the event is simply dropped.
        let _ = self.event_hub.send(event);
    }

    async fn fail(&self, phase: FlightPhase, err: RunError) -> RunError {
        self.emit(PhaseEvent::Failed(phase, err.to_string()));
        self.enter(FlightPhase::Failed).await;
        err
    }
}
