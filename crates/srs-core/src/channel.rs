use crate::config::ValidatedChannel;
use crate::decoder::{PositionCommand, PositionDecoder};
use crate::driver::{Actuation, ChannelDriver, DriveError, LinearActuatorDriver};
use crate::hal::{HalError, PinId, PinIo, PinMode};
use crate::history::{Debounce, HistoryDebouncer};
use crate::pulse::{MeasureError, PulseWidthMeasurer};
use log::{debug, info, warn};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("channel {channel}: failed to claim input pin {pin}: {source}")]
    Input {
        channel: String,
        pin: PinId,
        #[source]
        source: HalError,
    },
    #[error("channel {channel}: {source}")]
    Driver {
        channel: String,
        #[source]
        source: DriveError,
    },
}

/// What the measurer produced this poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Duty(f64),
    NoSignal,
    /// The access layer failed for a reason other than a missing edge.
    Fault,
}

/// Everything one pass through the pipeline observed and did.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub reading: Reading,
    pub command: PositionCommand,
    pub debounce: Debounce<PositionCommand>,
    pub actuation: Actuation,
    /// The driver stopped an extend that reached its travel limit.
    pub travel_limited: bool,
    /// A line write failed; it is retried on a later poll.
    pub fault: Option<DriveError>,
}

/// One RC input driving one actuator. Owns its own history, configuration and
/// driver state; nothing is shared with other channels.
#[derive(Debug)]
pub struct ActuatorChannel<D = LinearActuatorDriver>
where
    D: ChannelDriver<Command = PositionCommand>,
{
    config: ValidatedChannel,
    measurer: PulseWidthMeasurer,
    decoder: PositionDecoder,
    debouncer: HistoryDebouncer<PositionCommand>,
    driver: D,
    signal_lost: bool,
}

impl ActuatorChannel<LinearActuatorDriver> {
    pub fn linear(config: ValidatedChannel) -> Self {
        let driver = LinearActuatorDriver::new(&config);
        Self::with_driver(config, driver)
    }
}

impl<D> ActuatorChannel<D>
where
    D: ChannelDriver<Command = PositionCommand>,
{
    pub fn with_driver(config: ValidatedChannel, driver: D) -> Self {
        Self {
            measurer: PulseWidthMeasurer::new(&config),
            decoder: PositionDecoder::new(&config),
            debouncer: HistoryDebouncer::new(config.history_capacity),
            driver,
            config,
            signal_lost: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ValidatedChannel {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Claims the input pin and puts the driver into its safe default.
    pub fn start<IO: PinIo>(&mut self, io: &mut IO) -> Result<(), StartError> {
        io.configure(self.measurer.pin(), PinMode::Input)
            .map_err(|source| StartError::Input {
                channel: self.config.name.clone(),
                pin: self.measurer.pin().clone(),
                source,
            })?;
        self.driver.start(io).map_err(|source| StartError::Driver {
            channel: self.config.name.clone(),
            source,
        })?;
        info!(
            "channel {} started: input {}, {} Hz, duty {}..{}%, band {:.2}%, extend limit {:?}",
            self.config.name,
            self.config.input_pin,
            self.config.frequency_hz,
            self.config.duty_min_pct,
            self.config.duty_max_pct,
            self.decoder.band_pct(),
            self.config.extend_limit()
        );
        Ok(())
    }

    /// Runs measure, decode, debounce and drive once.
    ///
    /// Never fails: signal loss and access faults decode to `Hold`, and write
    /// failures are reported in the returned [`PollReport`] for retry.
    pub fn poll<IO: PinIo>(&mut self, io: &mut IO, now_us: u64) -> PollReport {
        let (travel_limited, mut fault) = self.tick(io, now_us);

        let reading = self.read_signal(io);
        let command = match reading {
            Reading::Duty(duty) => self.decoder.decode(duty),
            Reading::NoSignal | Reading::Fault => PositionCommand::Hold,
        };

        let debounce = self.debouncer.observe(command, self.driver.last_actuated());
        let mut actuation = Actuation::Unchanged;
        if let Debounce::Stable(stable) = debounce {
            match self.driver.apply(io, stable, now_us) {
                Ok(done) => {
                    info!("channel {}: stable {} -> {:?}", self.config.name, stable, done);
                    actuation = done;
                }
                Err(err) => {
                    warn!("channel {}: {} not applied, retrying next poll: {}", self.config.name, stable, err);
                    fault = Some(err);
                }
            }
        }

        PollReport {
            reading,
            command,
            debounce,
            actuation,
            travel_limited,
            fault,
        }
    }

    /// Next time the driver must be ticked, independent of polling.
    pub fn next_deadline_us(&self) -> Option<u64> {
        self.driver.next_deadline_us()
    }

    /// Runs the driver's time-driven checks without measuring. Returns whether
    /// an extend was stopped, and any write failure.
    pub fn tick<IO: PinIo>(&mut self, io: &mut IO, now_us: u64) -> (bool, Option<DriveError>) {
        match self.driver.tick(io, now_us) {
            Ok(Actuation::ExtendLimitReached) => {
                info!("channel {}: travel limit reached, extend stopped", self.config.name);
                (true, None)
            }
            Ok(_) => (false, None),
            Err(err) => {
                warn!("channel {}: {}", self.config.name, err);
                (false, Some(err))
            }
        }
    }

    fn read_signal<IO: PinIo>(&mut self, io: &mut IO) -> Reading {
        let reading = match self.measurer.measure(io) {
            Ok(duty) => {
                debug!("channel {}: duty {:.3}%", self.config.name, duty);
                Reading::Duty(duty)
            }
            Err(MeasureError::NoSignal { .. }) => Reading::NoSignal,
            Err(MeasureError::Hal(err)) => {
                warn!("channel {}: input read failed: {}", self.config.name, err);
                Reading::Fault
            }
        };

        let lost = !matches!(reading, Reading::Duty(_));
        if lost && !self.signal_lost {
            warn!("channel {}: signal lost on {}, holding", self.config.name, self.config.input_pin);
        } else if !lost && self.signal_lost {
            info!("channel {}: signal restored", self.config.name);
        }
        self.signal_lost = lost;
        reading
    }
}
