//! Motion sentry: an accelerometer intrusion alarm.
//!
//! `Idle → Arming → Armed → Triggered`. Arming counts down one prompt per
//! second; once armed, any axis moving more than the threshold between two
//! consecutive samples triggers the alarm. `disarm()` is the only way out of
//! `Triggered`. `Faulted` is terminal; `disarm()` is ignored there.

use crate::clock::Clock;
use crate::controller::{Controller, TickOutcome};
use crate::presenter::{PresentationEvent, Presenter};
use crate::types::{Measurement, Signal};

const DEFAULT_MOTION_THRESHOLD: f32 = 2.5;
const DEFAULT_ARMING_SECS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentryConfig {
    /// Per-axis delta (m/s²) that counts as a breach.
    pub threshold: f32,
    /// Countdown before the sensors go live.
    pub arming_secs: u32,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MOTION_THRESHOLD,
            arming_secs: DEFAULT_ARMING_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentryState {
    Idle,
    Arming,
    Armed,
    Triggered,
    Faulted,
}

impl SentryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Armed => "armed",
            Self::Triggered => "triggered",
            Self::Faulted => "faulted",
        }
    }
}

/// Accelerometer sample. Missing axes read as zero.
fn reading(m: &Measurement) -> [f32; 3] {
    [
        m.get(Signal::AccelX).unwrap_or(0.0),
        m.get(Signal::AccelY).unwrap_or(0.0),
        m.get(Signal::AccelZ).unwrap_or(0.0),
    ]
}

pub struct MotionSentry<C: Clock, P: Presenter> {
    config: SentryConfig,
    clock: C,
    presenter: P,
    state: SentryState,
    entered_at_ms: u64,
    /// Seconds of countdown already announced.
    announced_secs: u32,
    latest: Option<[f32; 3]>,
    baseline: Option<[f32; 3]>,
}

impl<C: Clock, P: Presenter> MotionSentry<C, P> {
    pub fn new(config: SentryConfig, clock: C, presenter: P) -> Self {
        let now = clock.now_ms();
        Self {
            config,
            clock,
            presenter,
            state: SentryState::Idle,
            entered_at_ms: now,
            announced_secs: 0,
            latest: None,
            baseline: None,
        }
    }

    pub fn state(&self) -> SentryState {
        self.state
    }

    pub fn is_alarm_active(&self) -> bool {
        self.state == SentryState::Triggered
    }

    /// Last accelerometer reading seen in any state.
    pub fn telemetry(&self) -> Option<[f32; 3]> {
        self.latest
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Start the arming countdown. Only valid from `Idle`.
    pub fn arm(&mut self) -> TickOutcome {
        if self.state != SentryState::Idle {
            tracing::debug!(state = self.state.as_str(), "arm ignored");
            return TickOutcome::Inactive;
        }
        let now = self.clock.now_ms();
        self.enter(SentryState::Arming, now);
        TickOutcome::Advanced
    }

    /// Back to `Idle` from any state except `Faulted`. Clears the motion
    /// baseline and silences the alarm.
    pub fn disarm(&mut self) {
        if self.state == SentryState::Faulted {
            tracing::debug!("disarm ignored while faulted");
            return;
        }
        let now = self.clock.now_ms();
        self.enter(SentryState::Idle, now);
    }

    pub fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        let now = self.clock.now_ms();
        let sample = measurement.as_ref().map(reading);
        if let Some(s) = sample {
            self.latest = Some(s);
        }

        match self.state {
            SentryState::Idle | SentryState::Faulted => TickOutcome::Inactive,
            SentryState::Triggered => TickOutcome::Held,
            SentryState::Arming => self.count_down(now),
            SentryState::Armed => {
                let Some(current) = sample else {
                    return TickOutcome::NoEvidence;
                };
                let Some(previous) = self.baseline.replace(current) else {
                    return TickOutcome::Held;
                };
                let breached = current
                    .iter()
                    .zip(previous.iter())
                    .any(|(c, p)| (c - p).abs() > self.config.threshold);
                if breached {
                    tracing::warn!(?previous, ?current, threshold = self.config.threshold, "motion breach");
                    self.enter(SentryState::Triggered, now);
                    TickOutcome::Advanced
                } else {
                    TickOutcome::Held
                }
            }
        }
    }

    pub fn fail(&mut self, reason: &str) {
        let now = self.clock.now_ms();
        tracing::error!(reason, "motion sensor failure");
        self.enter(SentryState::Faulted, now);
        let event = PresentationEvent {
            state: SentryState::Faulted.as_str().into(),
            status: "ERROR".into(),
            instruction: format!("Permission denied or sensor unavailable: {reason}"),
            icon: "⚠️".into(),
            progress: 0,
        };
        self.presenter.present(&event);
    }

    fn count_down(&mut self, now: u64) -> TickOutcome {
        let elapsed_secs = (now.saturating_sub(self.entered_at_ms) / 1000) as u32;
        if elapsed_secs >= self.config.arming_secs {
            self.enter(SentryState::Armed, now);
            return TickOutcome::Advanced;
        }
        if elapsed_secs > self.announced_secs {
            self.announced_secs = elapsed_secs;
            self.announce_countdown(elapsed_secs);
            return TickOutcome::Progressed;
        }
        TickOutcome::Held
    }

    fn announce_countdown(&mut self, elapsed_secs: u32) {
        let remaining = self.config.arming_secs - elapsed_secs;
        let progress = if self.config.arming_secs == 0 {
            100
        } else {
            (elapsed_secs * 100 / self.config.arming_secs) as u8
        };
        let event = PresentationEvent {
            state: SentryState::Arming.as_str().into(),
            status: "ARMING...".into(),
            instruction: format!("ARMING IN {remaining}..."),
            icon: "⏳".into(),
            progress,
        };
        self.presenter.present(&event);
    }

    fn enter(&mut self, next: SentryState, now: u64) {
        let from = self.state;
        self.state = next;
        self.entered_at_ms = now;
        tracing::info!(from = from.as_str(), to = next.as_str(), at_ms = now, "sentry transition");

        match next {
            SentryState::Idle => {
                self.baseline = None;
                self.present("IDLE", "READY TO ARM", "🛡️", 0);
            }
            SentryState::Arming => {
                self.announced_secs = 0;
                if self.config.arming_secs == 0 {
                    self.present("ARMING...", "PLACE DEVICE DOWN", "⏳", 0);
                } else {
                    self.announce_countdown(0);
                }
            }
            SentryState::Armed => {
                // The last reading seen while arming is the resting position.
                self.baseline = self.latest;
                self.present("ARMED", "SENSORS ACTIVE", "🔒", 100);
            }
            SentryState::Triggered => self.present("ALARM!", "BREACH DETECTED", "🚨", 100),
            SentryState::Faulted => self.baseline = None,
        }
    }

    fn present(&mut self, status: &str, instruction: &str, icon: &str, progress: u8) {
        let event = PresentationEvent {
            state: self.state.as_str().into(),
            status: status.into(),
            instruction: instruction.into(),
            icon: icon.into(),
            progress,
        };
        self.presenter.present(&event);
    }
}

impl<C: Clock, P: Presenter> Controller for MotionSentry<C, P> {
    fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        MotionSentry::tick(self, measurement)
    }

    fn fail(&mut self, reason: &str) {
        MotionSentry::fail(self, reason)
    }

    fn state_label(&self) -> String {
        self.state.as_str().to_string()
    }

    fn is_settled(&self) -> bool {
        matches!(self.state, SentryState::Triggered | SentryState::Faulted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::presenter::RecordingPresenter;

    fn accel(x: f32, y: f32, z: f32) -> Option<Measurement> {
        Some(
            Measurement::new()
                .with(Signal::AccelX, x)
                .with(Signal::AccelY, y)
                .with(Signal::AccelZ, z),
        )
    }

    fn armed_sentry() -> (MotionSentry<ManualClock, RecordingPresenter>, ManualClock) {
        let clock = ManualClock::new();
        let mut sentry = MotionSentry::new(SentryConfig::default(), clock.clone(), RecordingPresenter::new());
        sentry.arm();
        clock.advance(3_000);
        sentry.tick(None);
        assert_eq!(sentry.state(), SentryState::Armed);
        (sentry, clock)
    }

    #[test]
    fn test_countdown_prompts_before_armed() {
        let clock = ManualClock::new();
        let mut sentry = MotionSentry::new(SentryConfig::default(), clock.clone(), RecordingPresenter::new());
        assert_eq!(sentry.arm(), TickOutcome::Advanced);

        let mut outcomes = Vec::new();
        for _ in 0..30 {
            clock.advance(100);
            outcomes.push(sentry.tick(accel(0.0, 0.0, 9.8)));
        }
        assert_eq!(sentry.state(), SentryState::Armed);

        let countdown: Vec<_> = sentry
            .presenter()
            .events
            .iter()
            .filter(|e| e.state == "arming")
            .map(|e| e.instruction.as_str())
            .collect();
        assert_eq!(countdown, ["ARMING IN 3...", "ARMING IN 2...", "ARMING IN 1..."]);
        assert_eq!(outcomes.iter().filter(|o| **o == TickOutcome::Progressed).count(), 2);
    }

    #[test]
    fn test_arm_only_from_idle() {
        let (mut sentry, _) = armed_sentry();
        assert_eq!(sentry.arm(), TickOutcome::Inactive);
        assert_eq!(sentry.state(), SentryState::Armed);
    }

    #[test]
    fn test_delta_above_threshold_triggers() {
        let (mut sentry, _) = armed_sentry();
        assert_eq!(sentry.tick(accel(0.0, 0.0, 9.8)), TickOutcome::Held);
        assert_eq!(sentry.tick(accel(3.0, 0.0, 9.8)), TickOutcome::Advanced);
        assert!(sentry.is_alarm_active());
        assert_eq!(sentry.presenter().last().unwrap().status, "ALARM!");
    }

    #[test]
    fn test_delta_below_threshold_holds() {
        let (mut sentry, _) = armed_sentry();
        sentry.tick(accel(0.0, 0.0, 9.8));
        assert_eq!(sentry.tick(accel(2.0, -2.0, 9.8 + 2.0)), TickOutcome::Held);
        // Deltas are relative to the previous sample, so slow drift never trips.
        assert_eq!(sentry.tick(accel(4.0, -4.0, 13.8)), TickOutcome::Held);
        assert_eq!(sentry.state(), SentryState::Armed);
    }

    #[test]
    fn test_baseline_taken_from_arming_reading() {
        let clock = ManualClock::new();
        let mut sentry = MotionSentry::new(SentryConfig::default(), clock.clone(), RecordingPresenter::new());
        sentry.arm();
        sentry.tick(accel(0.0, 0.0, 9.8));
        clock.advance(3_000);
        sentry.tick(None);
        assert_eq!(sentry.state(), SentryState::Armed);
        assert_eq!(sentry.tick(accel(0.0, 0.0, 5.0)), TickOutcome::Advanced);
    }

    #[test]
    fn test_missing_measurement_is_no_evidence() {
        let (mut sentry, _) = armed_sentry();
        assert_eq!(sentry.tick(None), TickOutcome::NoEvidence);
        assert_eq!(sentry.state(), SentryState::Armed);
    }

    #[test]
    fn test_missing_axes_read_as_zero() {
        let (mut sentry, _) = armed_sentry();
        sentry.tick(accel(0.0, 0.0, 9.8));
        let partial = Some(Measurement::new().with(Signal::AccelX, 0.0));
        assert_eq!(sentry.tick(partial), TickOutcome::Advanced);
    }

    #[test]
    fn test_disarm_clears_alarm_and_baseline() {
        let (mut sentry, clock) = armed_sentry();
        sentry.tick(accel(0.0, 0.0, 9.8));
        sentry.tick(accel(5.0, 0.0, 9.8));
        assert!(sentry.is_alarm_active());
        sentry.disarm();
        assert_eq!(sentry.state(), SentryState::Idle);
        assert_eq!(sentry.presenter().last().unwrap().instruction, "READY TO ARM");

        // Re-arming starts from the latest reading, not the stale baseline.
        sentry.arm();
        clock.advance(3_000);
        sentry.tick(accel(5.0, 0.0, 9.8));
        assert_eq!(sentry.state(), SentryState::Armed);
        assert_eq!(sentry.tick(accel(5.5, 0.0, 9.8)), TickOutcome::Held);
    }

    #[test]
    fn test_fail_faults_sentry() {
        let clock = ManualClock::new();
        let mut sentry = MotionSentry::new(SentryConfig::default(), clock, RecordingPresenter::new());
        sentry.fail("permission denied");
        assert_eq!(sentry.state(), SentryState::Faulted);
        assert_eq!(sentry.tick(accel(9.0, 9.0, 9.0)), TickOutcome::Inactive);
        assert!(sentry.presenter().last().unwrap().instruction.contains("permission denied"));
    }

    #[test]
    fn test_disarm_ignored_while_faulted() {
        let (mut sentry, _) = armed_sentry();
        sentry.fail("sensor lost");
        sentry.disarm();
        assert_eq!(sentry.state(), SentryState::Faulted);
        assert_eq!(sentry.arm(), TickOutcome::Inactive);
        assert!(sentry.presenter().last().unwrap().instruction.contains("sensor lost"));
    }

    #[test]
    fn test_telemetry_tracks_latest_reading() {
        let (mut sentry, _) = armed_sentry();
        assert_eq!(sentry.telemetry(), None);
        sentry.tick(accel(0.5, -0.5, 9.8));
        sentry.tick(None);
        assert_eq!(sentry.telemetry(), Some([0.5, -0.5, 9.8]));
    }
}
