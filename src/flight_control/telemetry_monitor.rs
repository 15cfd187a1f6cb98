use super::convergence::ConvergenceGoal;
use crate::vehicle_link::{TelemetryError, TelemetryStream};
use crate::{event, fatal};
use futures::StreamExt;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why a convergence check ended without the goal being reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The sample source failed. Propagates as a run failure.
    Telemetry(TelemetryError),
    /// The check was cancelled by its owner. Not a fault.
    Cancelled,
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MonitorError::Telemetry(err) => write!(f, "convergence check lost telemetry: {err}"),
            MonitorError::Cancelled => write!(f, "convergence check cancelled"),
        }
    }
}

impl std::error::Error for MonitorError {}

/// Drives a [`ConvergenceGoal`] against a live telemetry stream.
///
/// One canonical algorithm: pull a sample, check it, and either finish or
/// back off cooperatively before the next pull. The backoff sleep is the
/// guaranteed yield point per iteration, so other tasks on the executor get
/// to run while the vehicle is still in transit.
pub struct TelemetryMonitor;

impl TelemetryMonitor {
    pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_secs(1);

    /// Resolves once `samples` yields a position inside the goal tolerance.
    ///
    /// Sample-source failures propagate immediately; there is no internal
    /// retry. Cancellation is observed at both suspension points (the sample
    /// pull and the backoff sleep), so a cancel costs at most one
    /// `poll_backoff` of extra latency and never an extra pull.
    pub async fn await_convergence(
        goal: ConvergenceGoal,
        mut samples: TelemetryStream,
        poll_backoff: Duration,
        c_tok: CancellationToken,
    ) -> Result<(), MonitorError> {
        loop {
            let sample = tokio::select! {
                biased;
                () = c_tok.cancelled() => return Err(MonitorError::Cancelled),
                next = samples.next() => match next {
                    Some(Ok(sample)) => sample,
                    Some(Err(err)) => return Err(MonitorError::Telemetry(err)),
                    None => return Err(MonitorError::Telemetry(TelemetryError::StreamClosed)),
                },
            };
            if goal.is_met_by(sample.position()) {
                return Ok(());
            }
            event!("Not yet converged: at {}, goal {goal}.", sample.position());
            tokio::select! {
                biased;
                () = c_tok.cancelled() => return Err(MonitorError::Cancelled),
                () = tokio::time::sleep(poll_backoff) => (),
            }
        }
    }

    /// Launches the check as a cooperative task. Never blocks the caller.
    pub fn spawn(
        goal: ConvergenceGoal,
        samples: TelemetryStream,
        poll_backoff: Duration,
    ) -> ConvergenceTask {
        let c_tok = CancellationToken::new();
        let handle = tokio::spawn(Self::await_convergence(
            goal,
            samples,
            poll_backoff,
            c_tok.clone(),
        ));
        ConvergenceTask { handle, c_tok }
    }
}

/// Explicit handle to a spawned convergence check.
///
/// The owner can cancel it, poll whether it finished, and must join it before
/// relying on the result.
pub struct ConvergenceTask {
    handle: JoinHandle<Result<(), MonitorError>>,
    c_tok: CancellationToken,
}

impl ConvergenceTask {
    /// Requests cooperative cancellation. The monitor observes it at its next
    /// suspension point.
    pub fn cancel(&self) { self.c_tok.cancel() }

    /// A clone of the task's cancellation token, for owners that outlive the
    /// join future.
    pub fn token(&self) -> CancellationToken { self.c_tok.clone() }

    pub fn is_finished(&self) -> bool { self.handle.is_finished() }

    pub async fn join(self) -> Result<(), MonitorError> {
        self.handle.await.unwrap_or_else(|err| fatal!("Convergence monitor hung up: {err}!"))
    }
}
