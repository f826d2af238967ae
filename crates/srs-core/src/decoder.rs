use crate::config::ValidatedChannel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete actuator command decoded from one averaged RC reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionCommand {
    Retract,
    Hold,
    Extend,
}

impl fmt::Display for PositionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Retract => "retract",
            Self::Hold => "hold",
            Self::Extend => "extend",
        };
        f.write_str(name)
    }
}

/// Maps an averaged duty cycle onto a [`PositionCommand`].
///
/// The tolerance band is `(max - min) * tolerance / 100` and is applied on
/// both sides of each threshold. Anything outside the two windows, including
/// the dead zone between them and non-finite readings, decodes to `Hold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionDecoder {
    duty_max_pct: f64,
    duty_min_pct: f64,
    band_pct: f64,
}

impl PositionDecoder {
    pub fn new(config: &ValidatedChannel) -> Self {
        let band_pct = (config.duty_max_pct - config.duty_min_pct) * config.tolerance_pct / 100.0;
        Self {
            duty_max_pct: config.duty_max_pct,
            duty_min_pct: config.duty_min_pct,
            band_pct,
        }
    }

    pub fn band_pct(&self) -> f64 {
        self.band_pct
    }

    pub fn decode(&self, duty_pct: f64) -> PositionCommand {
        if within(duty_pct, self.duty_max_pct, self.band_pct) {
            PositionCommand::Extend
        } else if within(duty_pct, self.duty_min_pct, self.band_pct) {
            PositionCommand::Retract
        } else {
            PositionCommand::Hold
        }
    }
}

fn within(value: f64, center: f64, band: f64) -> bool {
    value >= center - band && value <= center + band
}
