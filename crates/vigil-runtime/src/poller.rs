//! Fixed-interval poller.
//!
//! One tokio interval drives one controller. Each tick asks the sensor thread
//! for a sample and waits for it before the next tick is taken, so at most one
//! request is ever in flight; interval ticks that elapse while waiting are
//! skipped, not queued.

use crate::engine::{RuntimeError, SensorHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vigil_core::{Controller, TickOutcome};

/// Final state of a poll loop.
#[derive(Debug)]
pub struct PollReport<T> {
    pub controller: T,
    /// Samples delivered to the controller.
    pub ticks: u64,
    /// Interval ticks dropped while a sample was outstanding.
    pub skipped: u64,
    /// True when the loop ended because of `stop()` rather than settling.
    pub stopped: bool,
}

/// Requests a running poll loop to stop from elsewhere (e.g. a signal handler).
#[derive(Clone)]
pub struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

/// Handle to a running poll loop. Dropping it (and every [`StopSignal`])
/// also stops the loop.
pub struct PollerHandle<T> {
    stop_tx: StopSignal,
    join: JoinHandle<PollReport<T>>,
}

impl<T> PollerHandle<T> {
    /// Cancel the timer and return the controller. No tick runs after this.
    pub async fn stop(self) -> Result<PollReport<T>, RuntimeError> {
        self.stop_tx.trigger();
        Ok(self.join.await?)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop_tx.clone()
    }

    /// Wait until the controller settles (verified, triggered, faulted, ...).
    pub async fn wait(self) -> Result<PollReport<T>, RuntimeError> {
        let PollerHandle { stop_tx, join } = self;
        let report = join.await?;
        drop(stop_tx);
        Ok(report)
    }
}

/// Drive `controller` from `sensor` every `period` until it settles or is stopped.
///
/// The controller must already be started (or armed); the poller only ticks.
pub fn spawn_poller<T>(mut controller: T, sensor: SensorHandle, period: Duration) -> PollerHandle<T>
where
    T: Controller + Send + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let period_ms = period.as_millis().max(1);

        let mut ticks = 0u64;
        let mut skipped = 0u64;
        let mut stopped = false;

        tracing::info!(period_ms = period_ms as u64, state = %controller.state_label(), "poller started");

        loop {
            if controller.is_settled() {
                break;
            }

            tokio::select! {
                _ = stop_rx.changed() => {
                    stopped = true;
                    break;
                }
                _ = interval.tick() => {}
            }

            let started = Instant::now();
            let rx = match sensor.request().await {
                Ok(rx) => rx,
                Err(e) => {
                    controller.fail(&e.to_string());
                    break;
                }
            };

            let reply = tokio::select! {
                _ = stop_rx.changed() => {
                    stopped = true;
                    break;
                }
                reply = rx => reply,
            };

            let missed = (started.elapsed().as_millis() / period_ms) as u64;
            if missed > 0 {
                skipped += missed;
                tracing::debug!(missed, "sample slower than poll interval; ticks skipped");
            }

            match reply {
                Ok(Ok(measurement)) => {
                    ticks += 1;
                    let outcome = controller.tick(measurement);
                    if !matches!(
                        outcome,
                        TickOutcome::Held | TickOutcome::NoEvidence | TickOutcome::Inactive
                    ) {
                        tracing::debug!(?outcome, state = %controller.state_label(), "tick");
                    }
                }
                Ok(Err(e)) if e.is_frame_error() => {
                    ticks += 1;
                    let outcome = controller.frame_failed(&e.to_string());
                    tracing::debug!(?outcome, error = %e, "frame rejected");
                }
                Ok(Err(e)) => {
                    controller.fail(&e.to_string());
                    break;
                }
                Err(_) => {
                    controller.fail("sensor thread exited");
                    break;
                }
            }
        }

        tracing::info!(ticks, skipped, stopped, state = %controller.state_label(), "poller finished");
        PollReport {
            controller,
            ticks,
            skipped,
            stopped,
        }
    });

    PollerHandle {
        stop_tx: StopSignal(Arc::new(stop_tx)),
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_sensor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::{
        profiles::load_profile, ChallengeController, Measurement, MotionSentry, RecordingPresenter,
        ScanConfig, ScanState, SentryConfig, SentryState, Signal, SkinScan, State, SystemClock,
    };
    use vigil_sense::{ReplaySensor, Sensor, SensorError};

    const PERIOD: Duration = Duration::from_millis(5);
    const DEADLINE: Duration = Duration::from_secs(5);

    fn liveness() -> ChallengeController<SystemClock, RecordingPresenter> {
        let mut ctl = ChallengeController::new(
            load_profile("bio-id").unwrap(),
            SystemClock::new(),
            RecordingPresenter::new(),
        )
        .unwrap();
        ctl.start();
        ctl
    }

    fn one(signal: Signal, v: f32) -> Option<Measurement> {
        Some(Measurement::new().with(signal, v))
    }

    #[tokio::test]
    async fn test_full_liveness_run_settles_verified() {
        let sensor = spawn_sensor(ReplaySensor::new([
            one(Signal::Neutral, 0.5),
            None,
            one(Signal::Happy, 0.6),
            one(Signal::EyeAspectRatio, 0.30),
            one(Signal::EyeAspectRatio, 0.10),
            one(Signal::EyeAspectRatio, 0.30),
        ]))
        .unwrap();

        let handle = spawn_poller(liveness(), sensor, PERIOD);
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();

        assert_eq!(report.controller.state(), State::Verified);
        assert_eq!(report.ticks, 6);
        assert!(!report.stopped);
    }

    struct Denied;

    impl Sensor for Denied {
        fn sample(&mut self) -> Result<Option<Measurement>, SensorError> {
            Err(SensorError::PermissionDenied("camera".into()))
        }
    }

    #[tokio::test]
    async fn test_sensor_failure_faults_session() {
        let sensor = spawn_sensor(Denied).unwrap();
        let handle = spawn_poller(liveness(), sensor, PERIOD);
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();

        assert_eq!(report.controller.state(), State::Faulted);
        assert_eq!(report.ticks, 0);
        let last = report.controller.presenter().last().unwrap();
        assert!(last.instruction.contains("permission denied"), "got {}", last.instruction);
    }

    /// Serves a fixed script of sample results.
    struct Scripted(std::collections::VecDeque<Result<Option<Measurement>, SensorError>>);

    impl Sensor for Scripted {
        fn sample(&mut self) -> Result<Option<Measurement>, SensorError> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    fn skin_frame() -> Result<Option<Measurement>, SensorError> {
        Ok(Some(
            Measurement::new()
                .with(Signal::Health, 90.0)
                .with(Signal::Acne, 5.0)
                .with(Signal::Texture, 5.0)
                .with(Signal::Circles, 5.0),
        ))
    }

    #[tokio::test]
    async fn test_frame_error_aborts_skin_scan() {
        let sensor = spawn_sensor(Scripted(
            [skin_frame(), Err(SensorError::Frame("landmark outside frame".into())), skin_frame()].into(),
        ))
        .unwrap();
        let mut scan = SkinScan::new(ScanConfig { frames: 3 }, SystemClock::new(), RecordingPresenter::new());
        scan.begin();

        let handle = spawn_poller(scan, sensor, PERIOD);
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();

        assert_eq!(report.controller.state(), ScanState::Ready);
        assert_eq!(report.ticks, 2);
        let last = report.controller.presenter().last().unwrap();
        assert!(last.instruction.starts_with("Analysis failed"), "got {}", last.instruction);
    }

    #[tokio::test]
    async fn test_frame_error_is_no_evidence_for_liveness() {
        let sensor = spawn_sensor(Scripted(
            [
                Err(SensorError::Frame("blurred".into())),
                Ok(one(Signal::Neutral, 0.5)),
                Ok(one(Signal::Happy, 0.6)),
                Ok(one(Signal::EyeAspectRatio, 0.10)),
                Ok(one(Signal::EyeAspectRatio, 0.30)),
            ]
            .into(),
        ))
        .unwrap();

        let handle = spawn_poller(liveness(), sensor, PERIOD);
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();
        assert_eq!(report.controller.state(), State::Verified);
        assert_eq!(report.ticks, 5);
    }

    #[tokio::test]
    async fn test_stop_halts_ticking() {
        let sensor = spawn_sensor(ReplaySensor::default()).unwrap();
        let handle = spawn_poller(liveness(), sensor, PERIOD);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = handle.stop().await.unwrap();

        assert!(report.stopped);
        assert!(report.ticks > 0);
        assert_eq!(report.controller.state(), State::Scanning);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_wait() {
        let sensor = spawn_sensor(ReplaySensor::default()).unwrap();
        let handle = spawn_poller(liveness(), sensor, PERIOD);
        let signal = handle.stop_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            signal.trigger();
        });
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();
        assert!(report.stopped);
    }

    struct Slow {
        calls: Arc<AtomicUsize>,
    }

    impl Sensor for Slow {
        fn sample(&mut self) -> Result<Option<Measurement>, SensorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_slow_sensor_skips_ticks_without_overlap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sensor = spawn_sensor(Slow { calls: calls.clone() }).unwrap();
        let handle = spawn_poller(liveness(), sensor, PERIOD);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let report = handle.stop().await.unwrap();

        assert!(report.skipped > 0);
        // One request may have been in flight when stop arrived.
        let calls = calls.load(Ordering::SeqCst) as u64;
        assert!(calls <= report.ticks + 1, "calls={calls} ticks={}", report.ticks);
        // Each 30 ms sample spans several 5 ms periods.
        assert!(report.skipped >= report.ticks);
    }

    #[tokio::test]
    async fn test_motion_sentry_triggers_and_settles() {
        let accel = |x: f32| {
            Some(
                Measurement::new()
                    .with(Signal::AccelX, x)
                    .with(Signal::AccelY, 0.0)
                    .with(Signal::AccelZ, 9.8),
            )
        };
        let sensor = spawn_sensor(ReplaySensor::new([accel(0.0), accel(0.1), accel(4.0)])).unwrap();

        let mut sentry = MotionSentry::new(
            SentryConfig {
                threshold: 2.5,
                arming_secs: 0,
            },
            SystemClock::new(),
            RecordingPresenter::new(),
        );
        sentry.arm();

        let handle = spawn_poller(sentry, sensor, PERIOD);
        let report = tokio::time::timeout(DEADLINE, handle.wait()).await.unwrap().unwrap();
        assert_eq!(report.controller.state(), SentryState::Triggered);
        assert_eq!(report.ticks, 3);
    }
}
