use std::fmt;

/// A position in the local North-East-Down frame, in meters.
///
/// Immutable value type. Down is positive towards the ground, so an altitude
/// of 50m above the takeoff point is `down_m = -50.0`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PositionNed {
    north_m: f64,
    east_m: f64,
    down_m: f64,
}

impl PositionNed {
    /// The local frame origin, i.e. the takeoff point.
    pub const ORIGIN: PositionNed = PositionNed { north_m: 0.0, east_m: 0.0, down_m: 0.0 };

    pub fn new(north_m: f64, east_m: f64, down_m: f64) -> Self {
        Self { north_m, east_m, down_m }
    }

    pub fn north_m(&self) -> f64 { self.north_m }
    pub fn east_m(&self) -> f64 { self.east_m }
    pub fn down_m(&self) -> f64 { self.down_m }

    /// Attaches a heading, yielding the setpoint representation.
    pub fn with_yaw(self, yaw_deg: f64) -> PositionNedYaw {
        PositionNedYaw {
            north_m: self.north_m,
            east_m: self.east_m,
            down_m: self.down_m,
            yaw_deg,
        }
    }
}

impl fmt::Display for PositionNed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:.2}N, {:.2}E, {:.2}D]", self.north_m, self.east_m, self.down_m)
    }
}

/// A [`PositionNed`] plus a heading in degrees, as consumed by the position
/// setpoint command.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PositionNedYaw {
    north_m: f64,
    east_m: f64,
    down_m: f64,
    yaw_deg: f64,
}

impl PositionNedYaw {
    pub fn new(north_m: f64, east_m: f64, down_m: f64, yaw_deg: f64) -> Self {
        Self { north_m, east_m, down_m, yaw_deg }
    }

    pub fn north_m(&self) -> f64 { self.north_m }
    pub fn east_m(&self) -> f64 { self.east_m }
    pub fn down_m(&self) -> f64 { self.down_m }
    pub fn yaw_deg(&self) -> f64 { self.yaw_deg }

    /// Drops the heading. The yaw is not recoverable afterwards.
    pub fn strip_yaw(self) -> PositionNed {
        PositionNed {
            north_m: self.north_m,
            east_m: self.east_m,
            down_m: self.down_m,
        }
    }
}

/// Lossy by convention: a plain position carries no heading, so the setpoint
/// representation always gets `yaw_deg = 0.0`.
impl From<PositionNed> for PositionNedYaw {
    fn from(pos: PositionNed) -> Self { pos.with_yaw(0.0) }
}

impl fmt::Display for PositionNedYaw {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{:.2}N, {:.2}E, {:.2}D, {:.1}°]",
            self.north_m, self.east_m, self.down_m, self.yaw_deg
        )
    }
}

/// A velocity in the local North-East-Down frame, in meters per second.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct VelocityNed {
    north_m_s: f64,
    east_m_s: f64,
    down_m_s: f64,
}

impl VelocityNed {
    pub const ZERO: VelocityNed = VelocityNed { north_m_s: 0.0, east_m_s: 0.0, down_m_s: 0.0 };

    pub fn new(north_m_s: f64, east_m_s: f64, down_m_s: f64) -> Self {
        Self { north_m_s, east_m_s, down_m_s }
    }

    pub fn north_m_s(&self) -> f64 { self.north_m_s }
    pub fn east_m_s(&self) -> f64 { self.east_m_s }
    pub fn down_m_s(&self) -> f64 { self.down_m_s }
}

/// One telemetry sample: position and velocity observed together.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PositionVelocityNed {
    position: PositionNed,
    velocity: VelocityNed,
}

impl PositionVelocityNed {
    pub fn new(position: PositionNed, velocity: VelocityNed) -> Self {
        Self { position, velocity }
    }

    pub fn position(&self) -> PositionNed { self.position }
    pub fn velocity(&self) -> VelocityNed { self.velocity }
}
