mod common;
mod link;
mod sim;

pub use common::CommandError;
pub use common::CommandResult;
pub use common::ConnectionError;
pub use common::OffboardRejected;
pub use common::OffboardResult;
pub use common::TelemetryError;
pub use common::VehicleCommand;
pub use link::{TelemetryStream, VehicleLink, connect};
pub use sim::SimVehicleLink;
