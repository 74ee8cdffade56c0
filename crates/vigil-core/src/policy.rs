//! Declarative threshold policy: one table describing every step of a
//! liveness run, its progression rule, timeout and presentation.

use crate::error::PolicyError;
use crate::presenter::{Cue, Prompt};
use crate::types::Signal;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CHALLENGE_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_RESET_DELAY_MS: u64 = 3_000;

/// Strict comparison against a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    pub fn holds(self, value: f32, limit: f32) -> bool {
        match self {
            Self::Above => value > limit,
            Self::Below => value < limit,
        }
    }
}

/// Progression rule attached to a step.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// `signal` compared against `limit`.
    Threshold {
        signal: Signal,
        comparison: Comparison,
        limit: f32,
    },
    /// Eye aspect ratio must drop below `closed`, then rise above `open`.
    Blink { closed: f32, open: f32 },
    /// Head yaw must pass ±`yaw` on alternating sides `turns` times.
    Turn { yaw: f32, turns: u32 },
}

impl Rule {
    fn validate(&self) -> Result<(), String> {
        match *self {
            Rule::Threshold { limit, .. } if !limit.is_finite() => {
                Err("threshold limit must be finite".into())
            }
            Rule::Blink { closed, open } => {
                if !closed.is_finite() || !open.is_finite() {
                    Err("blink thresholds must be finite".into())
                } else if closed >= open {
                    Err(format!("blink closed threshold {closed} must be below open threshold {open}"))
                } else {
                    Ok(())
                }
            }
            Rule::Turn { yaw, turns } => {
                if !(yaw > 0.0 && yaw < 1.0) {
                    Err(format!("turn yaw {yaw} must be in (0, 1)"))
                } else if turns == 0 {
                    Err("turn count must be at least 1".into())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// One row of the policy table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    pub name: String,
    pub rule: Rule,
    /// Overrides the policy-wide challenge timeout. Ignored for scanning,
    /// which only times out when set explicitly.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Delay between the rule holding and the advance.
    #[serde(default)]
    pub settle_ms: u64,
    pub cue: Cue,
    /// In-step prompt: blink closed, turn counted, or settle started.
    #[serde(default)]
    pub prompt: Option<Prompt>,
}

/// Fixed per-run configuration. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThresholdPolicy {
    pub name: String,
    #[serde(default = "default_challenge_timeout_ms")]
    pub challenge_timeout_ms: u64,
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,
    pub scanning: Step,
    pub challenges: Vec<Step>,
    pub verified: Cue,
    pub rejected: Cue,
    #[serde(default = "default_faulted_cue")]
    pub faulted: Cue,
}

fn default_challenge_timeout_ms() -> u64 {
    DEFAULT_CHALLENGE_TIMEOUT_MS
}

fn default_reset_delay_ms() -> u64 {
    DEFAULT_RESET_DELAY_MS
}

fn default_faulted_cue() -> Cue {
    Cue::new("SYSTEM ERROR", "Error", "⚠️", 0)
}

impl ThresholdPolicy {
    /// Parse and validate a TOML policy.
    pub fn from_toml(src: &str) -> Result<Self, PolicyError> {
        let policy: ThresholdPolicy = toml::from_str(src)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml(&src)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::Invalid {
            policy: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("policy name is empty".into()));
        }
        if self.challenges.is_empty() {
            return Err(invalid("at least one challenge is required".into()));
        }
        if self.challenge_timeout_ms == 0 {
            return Err(invalid("challenge_timeout_ms must be positive".into()));
        }

        for step in std::iter::once(&self.scanning).chain(&self.challenges) {
            step.rule
                .validate()
                .map_err(|r| invalid(format!("step '{}': {r}", step.name)))?;
            if step.timeout_ms == Some(0) {
                return Err(invalid(format!("step '{}': timeout_ms must be positive", step.name)));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.challenges {
            if !seen.insert(step.name.as_str()) {
                return Err(invalid(format!("duplicate challenge name '{}'", step.name)));
            }
        }
        Ok(())
    }

    /// Step for a challenge index.
    pub fn challenge(&self, index: usize) -> Option<&Step> {
        self.challenges.get(index)
    }

    /// Effective timeout for a challenge. Scanning uses its own optional value.
    pub fn challenge_timeout(&self, index: usize) -> Option<u64> {
        self.challenges
            .get(index)
            .map(|s| s.timeout_ms.unwrap_or(self.challenge_timeout_ms))
    }
}
