use crate::config::ValidatedChannel;
use crate::decoder::PositionCommand;
use crate::hal::{HalError, Level, PinId, PinIo, PinMode};
use log::{debug, info, warn};
use thiserror::Error;

const RETRACT_LINES: [Level; 2] = [Level::High, Level::Low];
const EXTEND_LINES: [Level; 2] = [Level::Low, Level::High];
const STOP_LINES: [Level; 2] = [Level::Low, Level::Low];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriveError {
    #[error("failed to claim output pin {pin}: {source}")]
    Configure {
        pin: PinId,
        #[source]
        source: HalError,
    },
    #[error("failed to write output pin {pin}: {source}")]
    Write {
        pin: PinId,
        #[source]
        source: HalError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveState {
    /// Startup lines asserted, no command actuated yet.
    #[default]
    SafeDefault,
    /// Extend lines asserted at `since_us`; forced to stop once the travel limit elapses.
    Extending { since_us: u64 },
    Retracting,
    /// No motion commanded. A stable hold leaves whatever lines were asserted;
    /// an expired extend leaves both direction lines low.
    Holding,
}

/// Levels most recently confirmed on the driver lines. `None` until the first
/// successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputState {
    pub enable: Option<Level>,
    pub direction: [Option<Level>; 2],
}

/// What a driver call did to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuation {
    Unchanged,
    Extended,
    Retracted,
    /// Stable hold accepted; lines left as they were.
    HoldRecorded,
    /// Extend ran for the full travel limit and was stopped.
    ExtendLimitReached,
}

/// Output stage of a channel pipeline. Stepper sequencers would implement
/// this alongside the linear actuator driver.
pub trait ChannelDriver {
    type Command: Copy + Eq;

    /// Claims the output pins and asserts the safe default.
    fn start<IO: PinIo>(&mut self, io: &mut IO) -> Result<(), DriveError>;

    /// Last command whose line writes were all confirmed.
    fn last_actuated(&self) -> Option<Self::Command>;

    /// Acts on a command confirmed by the debouncer.
    fn apply<IO: PinIo>(
        &mut self,
        io: &mut IO,
        command: Self::Command,
        now_us: u64,
    ) -> Result<Actuation, DriveError>;

    /// Time-driven housekeeping. Called at the start of every poll, and at
    /// [`ChannelDriver::next_deadline_us`] when that falls between polls.
    fn tick<IO: PinIo>(&mut self, io: &mut IO, now_us: u64) -> Result<Actuation, DriveError>;

    /// When `tick` next has something to do, if ever.
    fn next_deadline_us(&self) -> Option<u64> {
        None
    }
}

/// Drives a linear actuator through an H-bridge with one enable line and two
/// direction lines.
///
/// There is no position feedback, so the travel ratio is enforced in time:
/// extend stays asserted for at most `ratio * full_stroke_time`, and a new
/// extend is only accepted after an intervening retract or hold.
#[derive(Debug, Clone)]
pub struct LinearActuatorDriver {
    enable_pin: PinId,
    direction_pins: [PinId; 2],
    extend_limit_us: u64,
    state: DriveState,
    outputs: OutputState,
    last_actuated: Option<PositionCommand>,
    extend_armed: bool,
}

impl LinearActuatorDriver {
    pub fn new(config: &ValidatedChannel) -> Self {
        Self {
            enable_pin: config.enable_pin.clone(),
            direction_pins: config.direction_pins.clone(),
            extend_limit_us: config.extend_limit_us(),
            state: DriveState::SafeDefault,
            outputs: OutputState::default(),
            last_actuated: None,
            extend_armed: true,
        }
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn outputs(&self) -> OutputState {
        self.outputs
    }

    pub fn extend_limit_us(&self) -> u64 {
        self.extend_limit_us
    }

    fn write_enable<IO: PinIo>(&mut self, io: &mut IO) -> Result<(), DriveError> {
        if self.outputs.enable == Some(Level::High) {
            return Ok(());
        }
        io.write(&self.enable_pin, Level::High)
            .map_err(|source| DriveError::Write {
                pin: self.enable_pin.clone(),
                source,
            })?;
        self.outputs.enable = Some(Level::High);
        Ok(())
    }

    /// Writes both direction lines, lowering lines before raising them so the
    /// bridge passes through stop rather than both-high.
    fn write_direction<IO: PinIo>(&mut self, io: &mut IO, levels: [Level; 2]) -> Result<(), DriveError> {
        self.write_enable(io)?;

        let mut order = [0usize, 1];
        if levels[0] == Level::High && levels[1] == Level::Low {
            order = [1, 0];
        }
        for idx in order {
            let pin = &self.direction_pins[idx];
            io.write(pin, levels[idx])
                .map_err(|source| DriveError::Write {
                    pin: pin.clone(),
                    source,
                })?;
            self.outputs.direction[idx] = Some(levels[idx]);
        }
        Ok(())
    }
}

impl ChannelDriver for LinearActuatorDriver {
    type Command = PositionCommand;

    fn start<IO: PinIo>(&mut self, io: &mut IO) -> Result<(), DriveError> {
        let pins = [
            &self.enable_pin,
            &self.direction_pins[0],
            &self.direction_pins[1],
        ];
        for pin in pins {
            io.configure(pin, PinMode::Output)
                .map_err(|source| DriveError::Configure {
                    pin: pin.clone(),
                    source,
                })?;
        }

        self.outputs = OutputState::default();
        self.write_direction(io, RETRACT_LINES)?;
        self.state = DriveState::SafeDefault;
        self.last_actuated = None;
        self.extend_armed = true;
        info!(
            "actuator on {} / {},{} in safe default",
            self.enable_pin, self.direction_pins[0], self.direction_pins[1]
        );
        Ok(())
    }

    fn last_actuated(&self) -> Option<PositionCommand> {
        self.last_actuated
    }

    fn apply<IO: PinIo>(
        &mut self,
        io: &mut IO,
        command: PositionCommand,
        now_us: u64,
    ) -> Result<Actuation, DriveError> {
        match command {
            PositionCommand::Extend => {
                if matches!(self.state, DriveState::Extending { .. }) {
                    // Already moving out; the original deadline stays.
                    self.last_actuated = Some(PositionCommand::Extend);
                    return Ok(Actuation::Unchanged);
                }
                if !self.extend_armed {
                    debug!("extend ignored until a retract or hold re-arms it");
                    return Ok(Actuation::Unchanged);
                }
                self.write_direction(io, EXTEND_LINES)?;
                self.state = DriveState::Extending { since_us: now_us };
                self.last_actuated = Some(PositionCommand::Extend);
                self.extend_armed = false;
                Ok(Actuation::Extended)
            }
            PositionCommand::Retract => {
                self.write_direction(io, RETRACT_LINES)?;
                self.state = DriveState::Retracting;
                self.last_actuated = Some(PositionCommand::Retract);
                self.extend_armed = true;
                Ok(Actuation::Retracted)
            }
            PositionCommand::Hold => {
                if !matches!(self.state, DriveState::Extending { .. }) {
                    self.state = DriveState::Holding;
                }
                self.last_actuated = Some(PositionCommand::Hold);
                self.extend_armed = true;
                Ok(Actuation::HoldRecorded)
            }
        }
    }

    fn tick<IO: PinIo>(&mut self, io: &mut IO, now_us: u64) -> Result<Actuation, DriveError> {
        let DriveState::Extending { since_us } = self.state else {
            return Ok(Actuation::Unchanged);
        };
        if now_us.saturating_sub(since_us) < self.extend_limit_us {
            return Ok(Actuation::Unchanged);
        }

        if let Err(err) = self.write_direction(io, STOP_LINES) {
            warn!("travel limit reached but stop write failed: {}", err);
            return Err(err);
        }
        self.state = DriveState::Holding;
        Ok(Actuation::ExtendLimitReached)
    }

    fn next_deadline_us(&self) -> Option<u64> {
        match self.state {
            DriveState::Extending { since_us } => Some(since_us.saturating_add(self.extend_limit_us)),
            _ => None,
        }
    }
}
