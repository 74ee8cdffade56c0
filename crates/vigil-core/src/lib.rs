//! vigil-core — polling state machines for liveness, motion and skin scans.
//!
//! Each controller consumes one optional [`Measurement`] per tick, evaluates
//! its rules against a [`Clock`], and reports transitions to a [`Presenter`].
//! Perception and rendering stay outside this crate.

pub mod clock;
pub mod controller;
pub mod error;
pub mod policy;
pub mod presenter;
pub mod profiles;
pub mod scan;
pub mod sentry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ChallengeController, Controller, Session, State, TickOutcome};
pub use error::{ChallengeError, PolicyError};
pub use policy::{Comparison, Rule, Step, ThresholdPolicy};
pub use presenter::{Cue, PresentationEvent, Presenter, RecordingPresenter, TracingPresenter};
pub use scan::{ScanConfig, ScanState, Severities, Severity, SkinReport, SkinScan};
pub use sentry::{MotionSentry, SentryConfig, SentryState};
pub use types::{Measurement, Signal};
