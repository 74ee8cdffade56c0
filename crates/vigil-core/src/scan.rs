//! Multi-frame skin scan.
//!
//! Accumulates per-frame skin metrics until enough frames have been seen,
//! then averages them into a [`SkinReport`] with a diagnostic.

use crate::clock::Clock;
use crate::controller::{Controller, TickOutcome};
use crate::presenter::{PresentationEvent, Presenter};
use crate::types::{Measurement, Signal};
use serde::Serialize;

const DEFAULT_SCAN_FRAMES: u32 = 10;
/// Metrics above this count as an issue for the diagnostic.
const ISSUE_THRESHOLD: u32 = 30;
const HIGH_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub frames: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            frames: DEFAULT_SCAN_FRAMES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    pub fn of(value: u32) -> Self {
        if value > HIGH_THRESHOLD {
            Self::High
        } else if value > ISSUE_THRESHOLD {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-issue severity bands. Health is a score, not an issue, and has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Severities {
    pub acne: Severity,
    pub texture: Severity,
    pub circles: Severity,
}

/// Care advice picked from the set of detected issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub diagnosis: &'static str,
    pub ingredients: &'static str,
    pub routine: &'static str,
}

/// Averaged result of a completed scan. All metrics in 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkinReport {
    pub health: u32,
    pub acne: u32,
    pub texture: u32,
    pub circles: u32,
}

impl SkinReport {
    pub fn severities(&self) -> Severities {
        Severities {
            acne: Severity::of(self.acne),
            texture: Severity::of(self.texture),
            circles: Severity::of(self.circles),
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        let acne = self.acne > ISSUE_THRESHOLD;
        let texture = self.texture > ISSUE_THRESHOLD;
        let circles = self.circles > ISSUE_THRESHOLD;

        match (acne, texture, circles) {
            (true, true, _) => Diagnostic {
                diagnosis: "Signs of congestion and uneven tone. Cell turnover may be slow, leading to both blemishes and roughness.",
                ingredients: "Salicylic Acid (BHA), Niacinamide, Retinol",
                routine: "Double cleanse at night. Use a BHA exfoliant 2-3 times a week to unclog pores.",
            },
            (true, false, _) => Diagnostic {
                diagnosis: "Active inflammation detected. Redness suggests sensitivity or breakout activity.",
                ingredients: "Centella Asiatica, Azelaic Acid, Zinc PCA",
                routine: "Simplify your routine. Avoid harsh scrubs. Use a spot treatment and a barrier-repairing moisturizer.",
            },
            (false, true, _) => Diagnostic {
                diagnosis: "Skin appears dehydrated or rough. The surface lacks smoothness, likely due to dead skin cell buildup.",
                ingredients: "Glycolic Acid (AHA), Lactic Acid, Vitamin C",
                routine: "Incorporate a chemical exfoliant (AHA) to reveal smoother skin. Ensure you are drinking enough water.",
            },
            (false, false, true) => Diagnostic {
                diagnosis: "Signs of fatigue and pigmentation. The under-eye area shows contrast, indicating tiredness or genetic shadowing.",
                ingredients: "Caffeine, Vitamin K, Peptides",
                routine: "Try a cold compress in the morning. Use an eye cream with caffeine to constrict blood vessels.",
            },
            (false, false, false) => Diagnostic {
                diagnosis: "Your skin barrier appears healthy and balanced.",
                ingredients: "Hyaluronic Acid, Ceramides, SPF 30+",
                routine: "Focus on hydration and sun protection to maintain your glow.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanState {
    Ready,
    Scanning,
    Complete(SkinReport),
    Faulted,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Scanning => "scanning",
            Self::Complete(_) => "complete",
            Self::Faulted => "faulted",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    health: f32,
    acne: f32,
    texture: f32,
    circles: f32,
    frames: u32,
}

impl Totals {
    fn average(&self) -> SkinReport {
        let n = self.frames.max(1) as f32;
        let avg = |sum: f32| (sum / n).round().clamp(0.0, 100.0) as u32;
        SkinReport {
            health: avg(self.health),
            acne: avg(self.acne),
            texture: avg(self.texture),
            circles: avg(self.circles),
        }
    }
}

pub struct SkinScan<C: Clock, P: Presenter> {
    config: ScanConfig,
    clock: C,
    presenter: P,
    state: ScanState,
    totals: Totals,
    started_at_ms: u64,
}

impl<C: Clock, P: Presenter> SkinScan<C, P> {
    pub fn new(config: ScanConfig, clock: C, presenter: P) -> Self {
        let now = clock.now_ms();
        Self {
            config: ScanConfig {
                frames: config.frames.max(1),
            },
            clock,
            presenter,
            state: ScanState::Ready,
            totals: Totals::default(),
            started_at_ms: now,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn report(&self) -> Option<SkinReport> {
        match self.state {
            ScanState::Complete(r) => Some(r),
            _ => None,
        }
    }

    pub fn frames_accepted(&self) -> u32 {
        self.totals.frames
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Start a scan from `Ready` or after a previous result.
    pub fn begin(&mut self) -> TickOutcome {
        if !matches!(self.state, ScanState::Ready | ScanState::Complete(_)) {
            return TickOutcome::Inactive;
        }
        self.totals = Totals::default();
        self.started_at_ms = self.clock.now_ms();
        self.set_state(ScanState::Scanning);
        self.present("SCANNING...", "Hold Still... Analyzing...", "🔬", 0);
        TickOutcome::Advanced
    }

    pub fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        if self.state != ScanState::Scanning {
            return TickOutcome::Inactive;
        }
        let Some(m) = measurement else {
            return TickOutcome::NoEvidence;
        };
        let (Some(health), Some(acne), Some(texture), Some(circles)) = (
            m.get(Signal::Health),
            m.get(Signal::Acne),
            m.get(Signal::Texture),
            m.get(Signal::Circles),
        ) else {
            return TickOutcome::NoEvidence;
        };

        self.totals.health += health;
        self.totals.acne += acne;
        self.totals.texture += texture;
        self.totals.circles += circles;
        self.totals.frames += 1;

        if self.totals.frames >= self.config.frames {
            let report = self.totals.average();
            tracing::info!(
                frames = self.totals.frames,
                elapsed_ms = self.clock.now_ms().saturating_sub(self.started_at_ms),
                ?report,
                "skin scan complete"
            );
            self.set_state(ScanState::Complete(report));
            self.present("COMPLETE", report.diagnostic().diagnosis, "✨", 100);
            TickOutcome::Advanced
        } else {
            let pct = (self.totals.frames as f32 * 100.0 / self.config.frames as f32).round() as u8;
            self.present(&format!("SCANNING {pct}%"), "Hold Still... Analyzing...", "🔬", pct);
            TickOutcome::Progressed
        }
    }

    /// Single-scan analysis failure: drop partial totals and go back to `Ready`.
    pub fn abort(&mut self, reason: &str) {
        tracing::warn!(reason, frames = self.totals.frames, "skin scan aborted");
        self.totals = Totals::default();
        self.set_state(ScanState::Ready);
        self.present("READY", &format!("Analysis failed: {reason}"), "⚠️", 0);
    }

    /// Camera or model failure; no recovery.
    pub fn fail(&mut self, reason: &str) {
        tracing::error!(reason, "skin scan collaborator failure");
        self.set_state(ScanState::Faulted);
        self.present("ERROR", &format!("Error: {reason}"), "⚠️", 0);
    }

    fn set_state(&mut self, next: ScanState) {
        tracing::info!(from = self.state.as_str(), to = next.as_str(), "scan transition");
        self.state = next;
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

impl<C: Clock, P: Presenter> Controller for SkinScan<C, P> {
    fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        SkinScan::tick(self, measurement)
    }

    fn fail(&mut self, reason: &str) {
        SkinScan::fail(self, reason)
    }

    fn frame_failed(&mut self, reason: &str) -> TickOutcome {
        if self.state != ScanState::Scanning {
            return TickOutcome::Inactive;
        }
        self.abort(reason);
        TickOutcome::Reset
    }

    fn state_label(&self) -> String {
        self.state.as_str().to_string()
    }

    /// Anything but an active scan; an aborted scan waits for `begin()`.
    fn is_settled(&self) -> bool {
        self.state != ScanState::Scanning
    }
}
