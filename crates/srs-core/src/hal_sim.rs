use crate::hal::{HalError, Level, PinId, PinIo, PinMode};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What a simulated input pin sees.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalSource {
    /// Square wave at `frequency_hz` that is high for `duty_pct` of each period.
    Steady { frequency_hz: f64, duty_pct: f64 },
    /// Pulse widths handed out in order. `None` entries, and an empty queue, time out.
    Scripted(VecDeque<Option<Duration>>),
    Disconnected,
}

impl SignalSource {
    fn next_pulse(&mut self) -> Option<Duration> {
        match self {
            Self::Steady {
                frequency_hz,
                duty_pct,
            } => {
                // A line stuck low or stuck high never produces both edges.
                if !(*duty_pct > 0.0 && *duty_pct < 100.0) || *frequency_hz <= 0.0 {
                    return None;
                }
                Duration::try_from_secs_f64(*duty_pct / 100.0 / *frequency_hz).ok()
            }
            Self::Scripted(queue) => queue.pop_front().flatten(),
            Self::Disconnected => None,
        }
    }

    fn period(&self) -> Option<Duration> {
        match self {
            Self::Steady { frequency_hz, .. } if *frequency_hz > 0.0 => {
                Duration::try_from_secs_f64(1.0 / *frequency_hz).ok()
            }
            _ => None,
        }
    }
}

/// Cloneable handle for moving a simulated input from another thread, the
/// way an RC transmitter moves the receiver output.
#[derive(Debug, Clone, Default)]
pub struct SignalHandle {
    inputs: Arc<Mutex<HashMap<PinId, SignalSource>>>,
}

impl SignalHandle {
    pub fn set(&self, pin: &PinId, source: SignalSource) {
        self.lock().insert(pin.clone(), source);
    }

    pub fn set_duty(&self, pin: &PinId, frequency_hz: f64, duty_pct: f64) {
        self.set(
            pin,
            SignalSource::Steady {
                frequency_hz,
                duty_pct,
            },
        );
    }

    pub fn disconnect(&self, pin: &PinId) {
        self.set(pin, SignalSource::Disconnected);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PinId, SignalSource>> {
        self.inputs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default)]
struct OutputLine {
    level: Option<Level>,
    writes: Vec<Level>,
    pending_failures: u32,
}

/// In-memory board used by tests and by the simulation runtime.
#[derive(Debug, Default)]
pub struct SimulatedBoard {
    modes: HashMap<PinId, PinMode>,
    signals: SignalHandle,
    outputs: HashMap<PinId, OutputLine>,
    unavailable: HashSet<PinId>,
    sequence: Vec<(PinId, Level)>,
    log_writes: bool,
    realtime: bool,
    pulses_read: u64,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes pulse reads sleep for the time real hardware would block:
    /// one signal period per pulse, or the full timeout when no edge comes.
    pub fn with_realtime_pulses(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Keeps every successful write for [`write_log`](Self::write_log) and
    /// [`write_sequence`](Self::write_sequence). Off by default since the
    /// logs grow with every write.
    pub fn with_write_log(mut self, enabled: bool) -> Self {
        self.log_writes = enabled;
        self
    }

    pub fn signals(&self) -> SignalHandle {
        self.signals.clone()
    }

    pub fn set_duty(&mut self, pin: &PinId, frequency_hz: f64, duty_pct: f64) {
        self.signals.set_duty(pin, frequency_hz, duty_pct);
    }

    pub fn disconnect(&mut self, pin: &PinId) {
        self.signals.disconnect(pin);
    }

    /// Queues explicit pulse widths; `None` makes that read time out.
    pub fn push_pulses<I>(&mut self, pin: &PinId, pulses: I)
    where
        I: IntoIterator<Item = Option<Duration>>,
    {
        let mut inputs = self.signals.lock();
        let source = inputs
            .entry(pin.clone())
            .or_insert_with(|| SignalSource::Scripted(VecDeque::new()));
        if !matches!(source, SignalSource::Scripted(_)) {
            *source = SignalSource::Scripted(VecDeque::new());
        }
        if let SignalSource::Scripted(queue) = source {
            queue.extend(pulses);
        }
    }

    /// The next `count` writes to `pin` fail with an I/O error.
    pub fn fail_next_writes(&mut self, pin: &PinId, count: u32) {
        self.outputs.entry(pin.clone()).or_default().pending_failures = count;
    }

    /// Simulates a pin held by another process; `configure` will refuse it.
    pub fn mark_unavailable(&mut self, pin: &PinId) {
        self.unavailable.insert(pin.clone());
    }

    pub fn mode(&self, pin: &PinId) -> Option<PinMode> {
        self.modes.get(pin).copied()
    }

    pub fn level(&self, pin: &PinId) -> Option<Level> {
        self.outputs.get(pin).and_then(|line| line.level)
    }

    /// Every level successfully written to `pin`, oldest first. Empty unless
    /// the write log is enabled.
    pub fn write_log(&self, pin: &PinId) -> &[Level] {
        self.outputs
            .get(pin)
            .map(|line| line.writes.as_slice())
            .unwrap_or(&[])
    }

    /// Every successful write across all pins, in the order it happened.
    pub fn write_sequence(&self) -> &[(PinId, Level)] {
        &self.sequence
    }

    pub fn pulses_read(&self) -> u64 {
        self.pulses_read
    }

    fn require_mode(&self, pin: &PinId, expected: PinMode) -> Result<(), HalError> {
        match self.modes.get(pin) {
            None => Err(HalError::NotConfigured { pin: pin.clone() }),
            Some(mode) if *mode != expected => Err(HalError::WrongMode { pin: pin.clone() }),
            Some(_) => Ok(()),
        }
    }
}

impl PinIo for SimulatedBoard {
    fn configure(&mut self, pin: &PinId, mode: PinMode) -> Result<(), HalError> {
        if self.unavailable.contains(pin) {
            return Err(HalError::Unavailable {
                pin: pin.clone(),
                reason: "claimed by another consumer".to_string(),
            });
        }
        self.modes.insert(pin.clone(), mode);
        if mode == PinMode::Output {
            self.outputs.entry(pin.clone()).or_default();
        }
        Ok(())
    }

    fn read_pulse_high(&mut self, pin: &PinId, edge_timeout: Duration) -> Result<Duration, HalError> {
        self.require_mode(pin, PinMode::Input)?;

        let (pulse, period) = {
            let mut inputs = self.signals.lock();
            match inputs.get_mut(pin) {
                Some(source) => (source.next_pulse(), source.period()),
                None => (None, None),
            }
        };

        match pulse {
            Some(high) => {
                if self.realtime {
                    std::thread::sleep(period.unwrap_or(high));
                }
                self.pulses_read += 1;
                Ok(high)
            }
            None => {
                if self.realtime {
                    std::thread::sleep(edge_timeout);
                }
                Err(HalError::Timeout { pin: pin.clone() })
            }
        }
    }

    fn write(&mut self, pin: &PinId, level: Level) -> Result<(), HalError> {
        self.require_mode(pin, PinMode::Output)?;
        let line = self.outputs.entry(pin.clone()).or_default();
        if line.pending_failures > 0 {
            line.pending_failures -= 1;
            return Err(HalError::Io {
                pin: pin.clone(),
                message: "simulated write failure".to_string(),
            });
        }
        line.level = Some(level);
        if self.log_writes {
            line.writes.push(level);
            self.sequence.push((pin.clone(), level));
        }
        Ok(())
    }
}
