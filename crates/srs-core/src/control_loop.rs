use crate::channel::{ActuatorChannel, PollReport, Reading, StartError};
use crate::config::ValidatedChannel;
use crate::driver::Actuation;
use crate::hal::PinIo;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Minimum time from one iteration start to the next. Zero runs
    /// iterations back to back.
    pub poll_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct LoopStats {
    pub polls_executed: u64,
    /// Iterations that started after their scheduled time.
    pub polls_late: u64,
    pub no_signal_polls: u64,
    pub input_faults: u64,
    pub stable_transitions: u64,
    pub write_failures: u64,
    pub extend_limits: u64,
    pub max_poll_us: u64,
}

impl LoopStats {
    fn record(&mut self, report: &PollReport) {
        match report.reading {
            Reading::NoSignal => self.no_signal_polls += 1,
            Reading::Fault => self.input_faults += 1,
            Reading::Duty(_) => {}
        }
        if report.actuation != Actuation::Unchanged {
            self.stable_transitions += 1;
        }
        if report.fault.is_some() {
            self.write_failures += 1;
        }
        if report.travel_limited {
            self.extend_limits += 1;
        }
    }
}

/// Owns the board and every channel, and polls the channels in order, one
/// complete pipeline at a time, until told to stop.
pub struct PollLoop<IO: PinIo> {
    io: IO,
    channels: Vec<ActuatorChannel>,
    config: LoopConfig,
    stats: LoopStats,
    /// Monotonic origin for the timestamps handed to drivers.
    origin: Instant,
}

impl<IO: PinIo> PollLoop<IO> {
    pub fn new(io: IO, channels: Vec<ValidatedChannel>, config: LoopConfig) -> Self {
        Self {
            io,
            channels: channels.into_iter().map(ActuatorChannel::linear).collect(),
            config,
            stats: LoopStats::default(),
            origin: Instant::now(),
        }
    }

    /// Claims every pin and asserts every channel's safe default. Any failure
    /// is fatal: the process must not run with a channel in an unknown state.
    pub fn start(&mut self) -> Result<(), StartError> {
        for channel in &mut self.channels {
            channel.start(&mut self.io)?;
        }
        info!("{} channel(s) in safe default", self.channels.len());
        Ok(())
    }

    /// Microseconds since the loop was created.
    pub fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// Polls every channel once, in configuration order.
    pub fn poll_once(&mut self, now_us: u64) -> Vec<PollReport> {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(self.channels.len());
        for channel in &mut self.channels {
            let report = channel.poll(&mut self.io, now_us);
            self.stats.record(&report);
            reports.push(report);
        }
        self.stats.polls_executed += 1;
        let poll_us = started.elapsed().as_micros() as u64;
        self.stats.max_poll_us = self.stats.max_poll_us.max(poll_us);
        reports
    }

    pub fn run(&mut self, stop: &AtomicBool) {
        let mut next_poll = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            if !self.config.poll_interval.is_zero() {
                let now = Instant::now();
                if now < next_poll {
                    self.wait_until(next_poll);
                } else if self.stats.polls_executed > 0 && now > next_poll {
                    self.stats.polls_late += 1;
                }
                next_poll = next_poll.max(now) + self.config.poll_interval;
            }

            let now_us = self.now_us();
            self.poll_once(now_us);
        }

        if self.stats.write_failures > 0 {
            warn!("{} output write failure(s) during run", self.stats.write_failures);
        }
    }

    /// Sleeps until `until`, waking early to tick channels whose driver
    /// deadline falls before it.
    fn wait_until(&mut self, until: Instant) {
        loop {
            let now = Instant::now();
            if now >= until {
                return;
            }
            let wake = self
                .next_deadline()
                .filter(|deadline| *deadline > now && *deadline < until)
                .unwrap_or(until);
            std::thread::sleep(wake - now);
            if wake < until {
                self.tick_channels(self.now_us());
            }
        }
    }

    /// Earliest pending driver deadline across all channels.
    fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .iter()
            .filter_map(|channel| channel.next_deadline_us())
            .min()
            .and_then(|us| self.origin.checked_add(Duration::from_micros(us)))
    }

    /// Runs every channel's time-driven checks without measuring inputs.
    pub fn tick_channels(&mut self, now_us: u64) {
        for channel in &mut self.channels {
            let (travel_limited, fault) = channel.tick(&mut self.io, now_us);
            if travel_limited {
                self.stats.extend_limits += 1;
            }
            if fault.is_some() {
                self.stats.write_failures += 1;
            }
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn channels(&self) -> &[ActuatorChannel] {
        &self.channels
    }

    pub fn io(&self) -> &IO {
        &self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, SystemConfig};
    use crate::hal::{Level, PinId};
    use crate::hal_sim::SimulatedBoard;
    use std::sync::Arc;

    fn two_channels() -> Vec<ValidatedChannel> {
        SystemConfig {
            poll_interval_ms: 0,
            channels: vec![
                ChannelConfig::default(),
                ChannelConfig {
                    name: "second".to_string(),
                    input_pin: PinId::new("P9_12"),
                    enable_pin: PinId::new("P9_13"),
                    direction_pins: [PinId::new("P9_14"), PinId::new("P9_15")],
                    ..ChannelConfig::default()
                },
            ],
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn channels_do_not_influence_each_other() {
        let mut board = SimulatedBoard::new();
        board.set_duty(&PinId::new("P8_10"), 70.0, 14.0);
        board.set_duty(&PinId::new("P9_12"), 70.0, 10.5);
        let mut poll = PollLoop::new(board, two_channels(), LoopConfig::default());
        poll.start().unwrap();

        for t in 0..5 {
            poll.poll_once(t);
        }

        let io = poll.io();
        assert_eq!(io.level(&PinId::new("P8_11")), Some(Level::Low));
        assert_eq!(io.level(&PinId::new("P8_9")), Some(Level::High));
        assert_eq!(io.level(&PinId::new("P9_14")), Some(Level::High));
        assert_eq!(io.level(&PinId::new("P9_15")), Some(Level::Low));
        assert_eq!(poll.stats().polls_executed, 5);
        // Extend on the first channel, hold recorded on the second.
        assert_eq!(poll.stats().stable_transitions, 2);
    }

    #[test]
    fn no_signal_is_counted_and_never_fatal() {
        let board = SimulatedBoard::new();
        let mut poll = PollLoop::new(board, two_channels(), LoopConfig::default());
        poll.start().unwrap();

        for t in 0..3 {
            let reports = poll.poll_once(t);
            assert!(reports.iter().all(|r| r.reading == Reading::NoSignal));
        }
        assert_eq!(poll.stats().no_signal_polls, 6);
    }

    #[test]
    fn start_fails_on_unclaimable_pin() {
        let mut board = SimulatedBoard::new();
        board.mark_unavailable(&PinId::new("P9_13"));
        let mut poll = PollLoop::new(board, two_channels(), LoopConfig::default());
        assert!(poll.start().is_err());
    }

    /// Board wrapper that timestamps every successful write.
    struct TimedBoard {
        board: SimulatedBoard,
        writes: Vec<(PinId, Level, Instant)>,
    }

    impl PinIo for TimedBoard {
        fn configure(&mut self, pin: &PinId, mode: crate::hal::PinMode) -> Result<(), crate::hal::HalError> {
            self.board.configure(pin, mode)
        }

        fn read_pulse_high(
            &mut self,
            pin: &PinId,
            edge_timeout: Duration,
        ) -> Result<Duration, crate::hal::HalError> {
            self.board.read_pulse_high(pin, edge_timeout)
        }

        fn write(&mut self, pin: &PinId, level: Level) -> Result<(), crate::hal::HalError> {
            self.board.write(pin, level)?;
            self.writes.push((pin.clone(), level, Instant::now()));
            Ok(())
        }
    }

    #[test]
    fn extend_limit_is_enforced_between_slow_polls() {
        let channels = SystemConfig {
            poll_interval_ms: 500,
            channels: vec![ChannelConfig {
                full_stroke_time_ms: 1_000,
                history_capacity: 1,
                ..ChannelConfig::default()
            }],
        };
        let config = LoopConfig {
            poll_interval: channels.poll_interval(),
        };
        let channels = channels.validate().unwrap();
        let limit = channels[0].extend_limit();
        assert_eq!(limit, Duration::from_millis(750));

        let mut board = SimulatedBoard::new();
        board.set_duty(&PinId::new("P8_10"), 70.0, 14.0);
        let io = TimedBoard {
            board,
            writes: Vec::new(),
        };
        let mut poll = PollLoop::new(io, channels, config);
        poll.start().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(1_100));
                stop.store(true, Ordering::Relaxed);
            })
        };
        poll.run(&stop);
        stopper.join().unwrap();

        let extend_pin = PinId::new("P8_9");
        let mut extend_writes = poll
            .io()
            .writes
            .iter()
            .filter(|(pin, _, _)| *pin == extend_pin);
        let raised = extend_writes
            .find(|(_, level, _)| *level == Level::High)
            .map(|(_, _, at)| *at)
            .unwrap();
        let lowered = extend_writes
            .find(|(_, level, _)| *level == Level::Low)
            .map(|(_, _, at)| *at)
            .unwrap();

        let asserted = lowered - raised;
        assert!(asserted < limit + Duration::from_millis(50), "extend held {asserted:?}");
        assert!(asserted > limit - Duration::from_millis(50), "extend held {asserted:?}");
        assert_eq!(poll.stats().extend_limits, 1);
    }

    #[test]
    fn run_stops_when_flag_is_set() {
        let mut board = SimulatedBoard::new();
        board.set_duty(&PinId::new("P8_10"), 70.0, 7.0);
        board.set_duty(&PinId::new("P9_12"), 70.0, 7.0);
        let config = LoopConfig {
            poll_interval: Duration::from_millis(1),
        };
        let mut poll = PollLoop::new(board, two_channels(), config);
        poll.start().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                stop.store(true, Ordering::Relaxed);
            })
        };
        poll.run(&stop);
        stopper.join().unwrap();

        assert!(poll.stats().polls_executed >= 5);
        assert_eq!(poll.stats().write_failures, 0);
    }
}
