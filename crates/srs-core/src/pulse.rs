use crate::config::ValidatedChannel;
use crate::hal::{HalError, PinId, PinIo};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    /// A pulse edge never arrived: transmitter off, receiver unplugged, or line stuck.
    #[error("no signal on pin {pin}")]
    NoSignal { pin: PinId },
    #[error(transparent)]
    Hal(HalError),
}

impl From<HalError> for MeasureError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::Timeout { pin } => MeasureError::NoSignal { pin },
            other => MeasureError::Hal(other),
        }
    }
}

/// Averages the high-time of consecutive pulses on one input line into a duty
/// cycle percentage.
#[derive(Debug, Clone)]
pub struct PulseWidthMeasurer {
    pin: PinId,
    samples: usize,
    period: Duration,
}

impl PulseWidthMeasurer {
    pub fn new(config: &ValidatedChannel) -> Self {
        Self {
            pin: config.input_pin.clone(),
            samples: config.sample_count,
            period: config.period(),
        }
    }

    pub fn pin(&self) -> &PinId {
        &self.pin
    }

    /// Measures `samples` pulses and returns their mean duty cycle [%].
    ///
    /// Each edge wait is bounded by one nominal period, so a dead line costs
    /// at most two periods before `NoSignal` is reported.
    pub fn measure<IO: PinIo>(&self, io: &mut IO) -> Result<f64, MeasureError> {
        let period_s = self.period.as_secs_f64();
        let mut total = 0.0;
        for _ in 0..self.samples {
            let high = io.read_pulse_high(&self.pin, self.period)?;
            let duty = high.as_secs_f64() / period_s * 100.0;
            if !duty.is_finite() {
                return Err(MeasureError::NoSignal {
                    pin: self.pin.clone(),
                });
            }
            total += duty;
        }
        Ok(total / self.samples as f64)
    }
}
