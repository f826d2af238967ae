pub mod channel;
pub mod config;
pub mod control_loop;
pub mod decoder;
mod decoder_proptest;
pub mod driver;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod history;
pub mod pulse;

pub use channel::{ActuatorChannel, PollReport, Reading, StartError};
pub use config::{ChannelConfig, ConfigError, SystemConfig, ValidatedChannel};
pub use control_loop::{LoopConfig, LoopStats, PollLoop};
pub use decoder::{PositionCommand, PositionDecoder};
pub use driver::{Actuation, ChannelDriver, DriveError, DriveState, LinearActuatorDriver, OutputState};
pub use hal::{HalError, Level, PinId, PinIo, PinMode};
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::{SignalHandle, SignalSource, SimulatedBoard};
pub use history::{CommandHistory, Debounce, HistoryDebouncer};
pub use pulse::{MeasureError, PulseWidthMeasurer};
