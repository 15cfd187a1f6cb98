use std::fmt;
use strum_macros::Display;

/// Commands issued over the vehicle link.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    Arm,
    Disarm,
    SetPositionSetpoint,
    ReturnToLaunch,
}

/// Result codes a command can come back with.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Busy,
    Denied,
    Unsupported,
    NoSystem,
    Timeout,
}

/// A single command failed. The issuing phase decides whether that fails the
/// whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandError {
    command: VehicleCommand,
    result: CommandResult,
}

impl CommandError {
    pub fn new(command: VehicleCommand, result: CommandResult) -> Self {
        Self { command, result }
    }

    pub fn command(&self) -> VehicleCommand { self.command }
    pub fn result(&self) -> CommandResult { self.result }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} failed with result code {}", self.command, self.result)
    }
}

impl std::error::Error for CommandError {}

/// Result codes for rejected offboard mode requests.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum OffboardResult {
    CommandDenied,
    Busy,
    NoSetpointSet,
    Timeout,
}

/// An offboard start/stop request was rejected. Recoverable by contract: the
/// vehicle keeps flying under its previous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffboardRejected {
    result: OffboardResult,
}

impl OffboardRejected {
    pub fn new(result: OffboardResult) -> Self { Self { result } }

    pub fn result(&self) -> OffboardResult { self.result }
}

impl fmt::Display for OffboardRejected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "offboard request rejected with result code {}", self.result)
    }
}

impl std::error::Error for OffboardRejected {}

/// The telemetry sample source failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The stream ended. It is infinite by contract, so this is a link fault.
    StreamClosed,
    LinkLost(String),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TelemetryError::StreamClosed => write!(f, "telemetry stream closed unexpectedly"),
            TelemetryError::LinkLost(reason) => write!(f, "telemetry link lost: {reason}"),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// The vehicle could not be reached at all. Fatal before any command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    UnsupportedScheme(String),
    Unreachable(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionError::UnsupportedScheme(addr) => {
                write!(f, "no link implementation for address {addr}")
            }
            ConnectionError::Unreachable(addr) => write!(f, "vehicle unreachable at {addr}"),
        }
    }
}

impl std::error::Error for ConnectionError {}
