use crate::hal::PinId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Deref;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channel {channel}: duty minimum {min}% must be below maximum {max}%")]
    InvertedThresholds { channel: String, min: f64, max: f64 },
    #[error("channel {channel}: duty thresholds must lie within 0..=100%, got {min}%..{max}%")]
    ThresholdOutOfRange { channel: String, min: f64, max: f64 },
    #[error("channel {channel}: signal frequency must give a representable period, got {frequency_hz} Hz")]
    InvalidFrequency { channel: String, frequency_hz: f64 },
    #[error("channel {channel}: tolerance must be within 0..50%, got {tolerance_pct}%")]
    InvalidTolerance { channel: String, tolerance_pct: f64 },
    #[error("channel {channel}: sample count must be at least 1")]
    ZeroSamples { channel: String },
    #[error("channel {channel}: history capacity must be at least 1")]
    ZeroHistory { channel: String },
    #[error("channel {channel}: stroke target {target} must be within 0..={max}")]
    InvalidStroke { channel: String, target: f64, max: f64 },
    #[error("channel {channel}: full stroke time {full_stroke_time_ms} ms is out of range")]
    InvalidStrokeTime {
        channel: String,
        full_stroke_time_ms: u64,
    },
    #[error("pin {pin} is assigned more than once")]
    DuplicatePin { pin: PinId },
    #[error("no channels configured")]
    NoChannels,
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Per-channel parameters for one RC-driven linear actuator.
///
/// Defaults describe the sample-return linear actuator on the BeagleBone P8
/// header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    pub input_pin: PinId,
    pub enable_pin: PinId,
    pub direction_pins: [PinId; 2],
    /// Expected RC signal frequency [Hz].
    pub frequency_hz: f64,
    /// Input signal maximum duty cycle [%].
    pub duty_max_pct: f64,
    /// Input signal minimum duty cycle [%].
    pub duty_min_pct: f64,
    /// Tolerance on pulse width deviations, as a share of the duty range [%].
    pub tolerance_pct: f64,
    /// Pulses averaged per poll.
    pub sample_count: usize,
    /// Decoded commands that must agree before the actuator moves.
    pub history_capacity: usize,
    /// Maximum mechanical stroke [inch].
    pub stroke_max: f64,
    /// Target stroke [inch].
    pub stroke_target: f64,
    /// Time for the actuator to traverse its full stroke [ms].
    pub full_stroke_time_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "linear_actuator".to_string(),
            input_pin: PinId::new("P8_10"),
            enable_pin: PinId::new("P8_13"),
            direction_pins: [PinId::new("P8_11"), PinId::new("P8_9")],
            frequency_hz: 70.0,
            duty_max_pct: 14.0,
            duty_min_pct: 7.0,
            tolerance_pct: 20.0,
            sample_count: 5,
            history_capacity: 5,
            stroke_max: 2.0,
            stroke_target: 1.5,
            full_stroke_time_ms: 4_000,
        }
    }
}

impl ChannelConfig {
    pub fn validate(self) -> Result<ValidatedChannel, ConfigError> {
        let channel = || self.name.clone();

        let period = Duration::try_from_secs_f64(1.0 / self.frequency_hz);
        if !self.frequency_hz.is_finite()
            || self.frequency_hz <= 0.0
            || !period.is_ok_and(|p| !p.is_zero())
        {
            return Err(ConfigError::InvalidFrequency {
                channel: channel(),
                frequency_hz: self.frequency_hz,
            });
        }
        let (min, max) = (self.duty_min_pct, self.duty_max_pct);
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) {
            return Err(ConfigError::ThresholdOutOfRange {
                channel: channel(),
                min,
                max,
            });
        }
        if min >= max {
            return Err(ConfigError::InvertedThresholds {
                channel: channel(),
                min,
                max,
            });
        }
        // At 50% or more the extend and retract windows would overlap.
        if !(0.0..50.0).contains(&self.tolerance_pct) {
            return Err(ConfigError::InvalidTolerance {
                channel: channel(),
                tolerance_pct: self.tolerance_pct,
            });
        }
        if self.sample_count == 0 {
            return Err(ConfigError::ZeroSamples { channel: channel() });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistory { channel: channel() });
        }
        if !(self.stroke_max.is_finite()
            && self.stroke_max > 0.0
            && self.stroke_target > 0.0
            && self.stroke_target <= self.stroke_max)
        {
            return Err(ConfigError::InvalidStroke {
                channel: channel(),
                target: self.stroke_target,
                max: self.stroke_max,
            });
        }
        // Drivers keep the extend deadline in whole microseconds.
        let stroke_us = Duration::from_millis(self.full_stroke_time_ms).as_micros();
        if self.full_stroke_time_ms == 0 || u64::try_from(stroke_us).is_err() {
            return Err(ConfigError::InvalidStrokeTime {
                channel: channel(),
                full_stroke_time_ms: self.full_stroke_time_ms,
            });
        }

        {
            let mut seen = BTreeSet::new();
            for pin in self.pins() {
                if !seen.insert(pin) {
                    return Err(ConfigError::DuplicatePin { pin: pin.clone() });
                }
            }
        }

        Ok(ValidatedChannel(self))
    }

    /// Every pin this channel claims, input first.
    pub fn pins(&self) -> impl Iterator<Item = &PinId> {
        [
            &self.input_pin,
            &self.enable_pin,
            &self.direction_pins[0],
            &self.direction_pins[1],
        ]
        .into_iter()
    }
}

/// A channel configuration that passed [`ChannelConfig::validate`].
/// Immutable for the life of the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedChannel(ChannelConfig);

impl ValidatedChannel {
    /// Nominal signal period, 1/F.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.0.frequency_hz)
    }

    /// Target stroke over maximum stroke.
    pub fn travel_ratio(&self) -> f64 {
        self.0.stroke_target / self.0.stroke_max
    }

    pub fn full_stroke_time(&self) -> Duration {
        Duration::from_millis(self.0.full_stroke_time_ms)
    }

    /// Longest time the extend direction may be asserted in one motion.
    pub fn extend_limit(&self) -> Duration {
        self.full_stroke_time().mul_f64(self.travel_ratio())
    }

    pub fn extend_limit_us(&self) -> u64 {
        // Validation bounds the full stroke time to u64 microseconds.
        u64::try_from(self.extend_limit().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Deref for ValidatedChannel {
    type Target = ChannelConfig;

    fn deref(&self) -> &ChannelConfig {
        &self.0
    }
}

/// Whole-process configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Minimum time between poll iterations [ms]. 0 polls back to back,
    /// paced only by pulse measurement.
    pub poll_interval_ms: u64,
    pub channels: Vec<ChannelConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 0,
            channels: vec![ChannelConfig::default()],
        }
    }
}

impl SystemConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validates every channel and checks that no pin is shared between channels.
    pub fn validate(self) -> Result<Vec<ValidatedChannel>, ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let mut claimed = BTreeSet::new();
        let mut validated = Vec::with_capacity(self.channels.len());
        for channel in self.channels {
            let channel = channel.validate()?;
            for pin in channel.pins() {
                if !claimed.insert(pin.clone()) {
                    return Err(ConfigError::DuplicatePin { pin: pin.clone() });
                }
            }
            validated.push(channel);
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let channel = ChannelConfig::default().validate().unwrap();
        assert_eq!(channel.travel_ratio(), 0.75);
        assert_eq!(channel.extend_limit(), Duration::from_millis(3_000));
        assert_eq!(channel.extend_limit_us(), 3_000_000);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = ChannelConfig {
            duty_min_pct: 14.0,
            duty_max_pct: 7.0,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedThresholds { .. })
        ));

        let cfg = ChannelConfig {
            duty_min_pct: 10.0,
            duty_max_pct: 10.0,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedThresholds { .. })
        ));
    }

    #[test]
    fn rejects_frequency_without_usable_period() {
        for frequency_hz in [0.0, -70.0, f64::NAN, f64::INFINITY, 1e-30, 1e30] {
            let cfg = ChannelConfig {
                frequency_hz,
                ..ChannelConfig::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(ConfigError::InvalidFrequency { .. })
            ));
        }
    }

    #[test]
    fn tiny_frequency_fails_validation_instead_of_panicking_later() {
        let raw = r#"{ "channels": [{ "frequency_hz": 1e-30 }] }"#;
        let system = SystemConfig::from_json(raw).unwrap();
        assert!(matches!(
            system.validate(),
            Err(ConfigError::InvalidFrequency { .. })
        ));
    }

    #[test]
    fn rejects_thresholds_outside_percent_range() {
        for (min, max) in [(-1.0, 14.0), (7.0, 100.5), (f64::NAN, 14.0)] {
            let cfg = ChannelConfig {
                duty_min_pct: min,
                duty_max_pct: max,
                ..ChannelConfig::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(ConfigError::ThresholdOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn rejects_zero_and_unrepresentable_stroke_time() {
        for full_stroke_time_ms in [0, u64::MAX] {
            let cfg = ChannelConfig {
                full_stroke_time_ms,
                ..ChannelConfig::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(ConfigError::InvalidStrokeTime { .. })
            ));
        }

        let longest = ChannelConfig {
            full_stroke_time_ms: u64::MAX / 1_000,
            ..ChannelConfig::default()
        }
        .validate()
        .unwrap();
        assert!(longest.extend_limit_us() < u64::MAX);
    }

    #[test]
    fn rejects_zero_capacity_history_and_zero_samples() {
        let cfg = ChannelConfig {
            history_capacity: 0,
            ..ChannelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroHistory { .. })));

        let cfg = ChannelConfig {
            sample_count: 0,
            ..ChannelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroSamples { .. })));
    }

    #[test]
    fn rejects_overlapping_tolerance_and_bad_stroke() {
        let cfg = ChannelConfig {
            tolerance_pct: 50.0,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTolerance { .. })
        ));

        let cfg = ChannelConfig {
            stroke_target: 2.5,
            ..ChannelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidStroke { .. })));
    }

    #[test]
    fn rejects_pin_reuse_within_and_across_channels() {
        let cfg = ChannelConfig {
            enable_pin: PinId::new("P8_10"),
            ..ChannelConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DuplicatePin { .. })));

        let system = SystemConfig {
            poll_interval_ms: 0,
            channels: vec![
                ChannelConfig::default(),
                ChannelConfig {
                    name: "second".to_string(),
                    input_pin: PinId::new("P8_20"),
                    ..ChannelConfig::default()
                },
            ],
        };
        assert!(matches!(
            system.validate(),
            Err(ConfigError::DuplicatePin { .. })
        ));
    }

    #[test]
    fn empty_system_is_rejected() {
        let system = SystemConfig {
            poll_interval_ms: 0,
            channels: Vec::new(),
        };
        assert!(matches!(system.validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let raw = r#"{
            "poll_interval_ms": 10,
            "channels": [{ "name": "la", "tolerance_pct": 10.0 }]
        }"#;
        let system = SystemConfig::from_json(raw).unwrap();
        assert_eq!(system.poll_interval(), Duration::from_millis(10));
        assert_eq!(system.channels[0].name, "la");
        assert_eq!(system.channels[0].tolerance_pct, 10.0);
        assert_eq!(system.channels[0].input_pin, PinId::new("P8_10"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SystemConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
