pub(crate) mod ned;

pub use ned::PositionNed;
pub use ned::PositionNedYaw;
pub use ned::PositionVelocityNed;
pub use ned::VelocityNed;
