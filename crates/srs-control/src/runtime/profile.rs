use srs_core::{PinId, SignalHandle, ValidatedChannel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const STEP: Duration = Duration::from_millis(20);

/// One held stick position on one simulated input.
#[derive(Debug, Clone, PartialEq)]
pub struct StickSegment {
    pub label: &'static str,
    pub duty_pct: f64,
    pub hold: Duration,
}

#[derive(Debug, Clone)]
struct StickInput {
    pin: PinId,
    frequency_hz: f64,
    segments: Vec<StickSegment>,
}

/// Neutral, full up, neutral, full down. Segments last long enough for the
/// history window to confirm each position, and full up outlasts the extend
/// limit so the travel cutoff is exercised too.
pub fn demo_segments(channel: &ValidatedChannel) -> Vec<StickSegment> {
    let neutral = (channel.duty_max_pct + channel.duty_min_pct) / 2.0;
    let full_up = channel.extend_limit() + Duration::from_secs(1);
    vec![
        StickSegment {
            label: "neutral",
            duty_pct: neutral,
            hold: Duration::from_secs(2),
        },
        StickSegment {
            label: "full up",
            duty_pct: channel.duty_max_pct,
            hold: full_up,
        },
        StickSegment {
            label: "neutral",
            duty_pct: neutral,
            hold: Duration::from_secs(2),
        },
        StickSegment {
            label: "full down",
            duty_pct: channel.duty_min_pct,
            hold: Duration::from_secs(3),
        },
    ]
}

/// Sets every channel's input to its neutral duty.
pub fn hold_neutral(signals: &SignalHandle, channels: &[ValidatedChannel]) {
    for channel in channels {
        let neutral = (channel.duty_max_pct + channel.duty_min_pct) / 2.0;
        signals.set_duty(&channel.input_pin, channel.frequency_hz, neutral);
    }
}

/// Drives every channel's simulated input through [`demo_segments`] until
/// `stop` is set.
pub fn spawn_stick_profile(
    signals: SignalHandle,
    channels: &[ValidatedChannel],
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let inputs: Vec<StickInput> = channels
        .iter()
        .map(|channel| StickInput {
            pin: channel.input_pin.clone(),
            frequency_hz: channel.frequency_hz,
            segments: demo_segments(channel),
        })
        .collect();

    info!(inputs = inputs.len(), "Starting simulated stick profile");
    thread::Builder::new()
        .name("stick-profile".to_string())
        .spawn(move || run_profile(&signals, &inputs, &stop))
}

fn run_profile(signals: &SignalHandle, inputs: &[StickInput], stop: &AtomicBool) {
    // Each input walks its own segments; positions are re-evaluated every STEP.
    let mut cursors: Vec<(usize, Instant)> = vec![(0, Instant::now()); inputs.len()];
    for input in inputs {
        apply(signals, input, 0);
    }

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(STEP);
        for (input, (index, since)) in inputs.iter().zip(cursors.iter_mut()) {
            if input.segments.is_empty() || since.elapsed() < input.segments[*index].hold {
                continue;
            }
            *index = (*index + 1) % input.segments.len();
            *since = Instant::now();
            apply(signals, input, *index);
        }
    }
}

fn apply(signals: &SignalHandle, input: &StickInput, index: usize) {
    if let Some(segment) = input.segments.get(index) {
        debug!(
            pin = %input.pin,
            position = segment.label,
            duty_pct = segment.duty_pct,
            "Stick moved"
        );
        signals.set_duty(&input.pin, input.frequency_hz, segment.duty_pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srs_core::SystemConfig;

    fn default_channel() -> ValidatedChannel {
        SystemConfig::default().validate().unwrap().remove(0)
    }

    #[test]
    fn demo_visits_every_stick_position() {
        let channel = default_channel();
        let segments = demo_segments(&channel);
        let duties: Vec<f64> = segments.iter().map(|s| s.duty_pct).collect();
        assert_eq!(duties, vec![10.5, 14.0, 10.5, 7.0]);
    }

    #[test]
    fn full_up_outlasts_extend_limit() {
        let channel = default_channel();
        let segments = demo_segments(&channel);
        assert!(segments[1].hold > channel.extend_limit());
    }
}
