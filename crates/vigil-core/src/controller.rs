//! Challenge controller: drives a linear liveness sequence from polled
//! measurements.
//!
//! `Idle → Scanning → Challenge(0..n) → Verified`, with `Rejected` entered on
//! timeout and left again for `Scanning` after the policy's reset delay.
//! `Faulted` is terminal until the next `start()`.

use crate::clock::Clock;
use crate::error::{ChallengeError, PolicyError};
use crate::policy::{Rule, Step, ThresholdPolicy};
use crate::presenter::{PresentationEvent, Presenter};
use crate::types::{Measurement, Signal};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Controller is idle or in a terminal state.
    Inactive,
    /// No measurement, or it lacks the signal the current rule needs.
    NoEvidence,
    /// Evidence present but the rule is not satisfied (or waiting on a delay).
    Held,
    /// Sub-challenge progress without a state change.
    Progressed,
    /// Moved to the next state in the sequence.
    Advanced,
    /// Timed out.
    Rejected,
    /// Left the rejection state after the reset delay.
    Reset,
}

/// Shared shape of the polling state machines, so one poller can drive any of them.
pub trait Controller {
    fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome;
    /// Collaborator failure (device denied, model load failed).
    fn fail(&mut self, reason: &str);
    /// One unusable frame. Counts as no evidence unless the controller
    /// has its own recovery.
    fn frame_failed(&mut self, reason: &str) -> TickOutcome {
        tracing::debug!(reason, "frame discarded");
        self.tick(None)
    }
    fn state_label(&self) -> String;
    /// True once further ticks can no longer change anything.
    fn is_settled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Scanning,
    /// Index into the policy's challenge list.
    Challenge(usize),
    Verified,
    Rejected,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlinkPhase {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSide {
    Left,
    Right,
}

/// One run of the controller. Mutated only by the controller that owns it.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    state: State,
    entered_at_ms: u64,
    blink: BlinkPhase,
    turns: u32,
    last_turn: Option<TurnSide>,
    settle_from_ms: Option<u64>,
    last_error: Option<ChallengeError>,
}

impl Session {
    fn new(now_ms: u64) -> Self {
        Self {
            id: new_session_id(),
            state: State::Idle,
            entered_at_ms: now_ms,
            blink: BlinkPhase::Open,
            turns: 0,
            last_turn: None,
            settle_from_ms: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn entered_at_ms(&self) -> u64 {
        self.entered_at_ms
    }

    pub fn blink_phase(&self) -> BlinkPhase {
        self.blink
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn last_error(&self) -> Option<&ChallengeError> {
        self.last_error.as_ref()
    }

    fn reset_counters(&mut self) {
        self.blink = BlinkPhase::Open;
        self.turns = 0;
        self.last_turn = None;
        self.settle_from_ms = None;
    }
}

/// Short uppercase tag shown to the user.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

enum RuleProgress {
    NoEvidence,
    Unmet,
    Progressed,
    Satisfied,
}

fn evaluate_rule(rule: &Rule, measurement: &Measurement, session: &mut Session) -> RuleProgress {
    match *rule {
        Rule::Threshold {
            signal,
            comparison,
            limit,
        } => match measurement.get(signal) {
            None => RuleProgress::NoEvidence,
            Some(v) if comparison.holds(v, limit) => RuleProgress::Satisfied,
            Some(_) => RuleProgress::Unmet,
        },
        Rule::Blink { closed, open } => {
            let Some(ear) = measurement.get(Signal::EyeAspectRatio) else {
                return RuleProgress::NoEvidence;
            };
            match session.blink {
                BlinkPhase::Open if ear < closed => {
                    session.blink = BlinkPhase::Closed;
                    RuleProgress::Progressed
                }
                BlinkPhase::Closed if ear > open => RuleProgress::Satisfied,
                _ => RuleProgress::Unmet,
            }
        }
        Rule::Turn { yaw, turns } => {
            let Some(v) = measurement.get(Signal::HeadYaw) else {
                return RuleProgress::NoEvidence;
            };
            let side = if v >= yaw {
                TurnSide::Right
            } else if v <= -yaw {
                TurnSide::Left
            } else {
                return RuleProgress::Unmet;
            };
            if session.last_turn == Some(side) {
                return RuleProgress::Unmet;
            }
            session.last_turn = Some(side);
            session.turns += 1;
            if session.turns >= turns {
                RuleProgress::Satisfied
            } else {
                RuleProgress::Progressed
            }
        }
    }
}

/// Liveness controller over a [`ThresholdPolicy`].
pub struct ChallengeController<C: Clock, P: Presenter> {
    policy: ThresholdPolicy,
    clock: C,
    presenter: P,
    session: Session,
}

impl<C: Clock, P: Presenter> ChallengeController<C, P> {
    /// Validates the policy; the controller starts `Idle`.
    pub fn new(policy: ThresholdPolicy, clock: C, presenter: P) -> Result<Self, PolicyError> {
        policy.validate()?;
        let session = Session::new(clock.now_ms());
        Ok(Self {
            policy,
            clock,
            presenter,
            session,
        })
    }

    /// Begin a fresh session at the first step.
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        self.session = Session::new(now);
        tracing::info!(session = %self.session.id, policy = %self.policy.name, "session started");
        self.enter(State::Scanning, now);
    }

    /// Return to `Idle`. Ticks are ignored until the next `start()`.
    pub fn stop(&mut self) {
        let now = self.clock.now_ms();
        self.enter(State::Idle, now);
    }

    pub fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        let now = self.clock.now_ms();
        match self.session.state {
            State::Idle | State::Verified | State::Faulted => TickOutcome::Inactive,
            State::Rejected => {
                let waited = now.saturating_sub(self.session.entered_at_ms);
                if waited >= self.policy.reset_delay_ms {
                    self.enter(State::Scanning, now);
                    TickOutcome::Reset
                } else {
                    TickOutcome::Held
                }
            }
            State::Scanning | State::Challenge(_) => self.evaluate(now, measurement),
        }
    }

    pub fn fail(&mut self, reason: &str) {
        let now = self.clock.now_ms();
        tracing::error!(session = %self.session.id, reason, "collaborator failure");
        self.session.last_error = Some(ChallengeError::Collaborator(reason.to_string()));
        self.enter(State::Faulted, now);
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Label used in presentation events and logs, e.g. `challenge_blink`.
    pub fn label(&self, state: State) -> String {
        match state {
            State::Idle => "idle".into(),
            State::Scanning => "scanning".into(),
            State::Challenge(i) => match self.policy.challenge(i) {
                Some(step) => format!("challenge_{}", step.name),
                None => format!("challenge_{i}"),
            },
            State::Verified => "verified".into(),
            State::Rejected => "rejected".into(),
            State::Faulted => "faulted".into(),
        }
    }

    fn step_for(&self, state: State) -> Option<&Step> {
        match state {
            State::Scanning => Some(&self.policy.scanning),
            State::Challenge(i) => self.policy.challenge(i),
            _ => None,
        }
    }

    fn timeout_for(&self, state: State) -> Option<u64> {
        match state {
            State::Scanning => self.policy.scanning.timeout_ms,
            State::Challenge(i) => self.policy.challenge_timeout(i),
            _ => None,
        }
    }

    fn evaluate(&mut self, now: u64, measurement: Option<Measurement>) -> TickOutcome {
        let state = self.session.state;
        let waited = now.saturating_sub(self.session.entered_at_ms);

        if let Some(timeout) = self.timeout_for(state) {
            if waited >= timeout {
                return self.reject(now, waited);
            }
        }

        let Some(step) = self.step_for(state) else {
            return TickOutcome::Inactive;
        };
        let rule = step.rule;
        let settle_ms = step.settle_ms;

        if let Some(since) = self.session.settle_from_ms {
            return if now.saturating_sub(since) >= settle_ms {
                self.advance(now)
            } else {
                TickOutcome::Held
            };
        }

        let Some(measurement) = measurement else {
            tracing::trace!(state = %self.label(state), error = %ChallengeError::NoSubjectDetected);
            return TickOutcome::NoEvidence;
        };

        match evaluate_rule(&rule, &measurement, &mut self.session) {
            RuleProgress::NoEvidence => TickOutcome::NoEvidence,
            RuleProgress::Unmet => TickOutcome::Held,
            RuleProgress::Progressed => {
                tracing::debug!(
                    state = %self.label(state),
                    blink = ?self.session.blink,
                    turns = self.session.turns,
                    "challenge progress"
                );
                self.prompt(state);
                TickOutcome::Progressed
            }
            RuleProgress::Satisfied if settle_ms > 0 => {
                self.session.settle_from_ms = Some(now);
                self.prompt(state);
                TickOutcome::Progressed
            }
            RuleProgress::Satisfied => self.advance(now),
        }
    }

    fn advance(&mut self, now: u64) -> TickOutcome {
        let next = match self.session.state {
            State::Scanning => State::Challenge(0),
            State::Challenge(i) if i + 1 < self.policy.challenges.len() => State::Challenge(i + 1),
            State::Challenge(_) => State::Verified,
            _ => return TickOutcome::Inactive,
        };
        self.enter(next, now);
        TickOutcome::Advanced
    }

    fn reject(&mut self, now: u64, waited_ms: u64) -> TickOutcome {
        let step = self
            .step_for(self.session.state)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        tracing::warn!(session = %self.session.id, step = %step, waited_ms, "challenge timed out");
        self.session.last_error = Some(ChallengeError::ChallengeTimeout { step, waited_ms });
        self.enter(State::Rejected, now);
        TickOutcome::Rejected
    }

    fn enter(&mut self, next: State, now: u64) {
        let from = self.session.state;
        self.session.state = next;
        self.session.entered_at_ms = now;
        self.session.reset_counters();

        tracing::info!(
            session = %self.session.id,
            from = %self.label(from),
            to = %self.label(next),
            at_ms = now,
            "state transition"
        );

        if let Some(event) = self.event_for(next) {
            self.presenter.present(&event);
        }
    }

    fn event_for(&self, state: State) -> Option<PresentationEvent> {
        let label = self.label(state);
        match state {
            State::Idle => None,
            State::Scanning | State::Challenge(_) => self
                .step_for(state)
                .map(|step| PresentationEvent::from_cue(&label, &step.cue)),
            State::Verified => Some(PresentationEvent::from_cue(&label, &self.policy.verified)),
            State::Rejected => Some(PresentationEvent::from_cue(&label, &self.policy.rejected)),
            State::Faulted => {
                let mut event = PresentationEvent::from_cue(&label, &self.policy.faulted);
                if let Some(ChallengeError::Collaborator(reason)) = &self.session.last_error {
                    event.instruction = format!("{}: {reason}", event.instruction);
                }
                Some(event)
            }
        }
    }

    fn prompt(&mut self, state: State) {
        let label = self.label(state);
        let event = self.step_for(state).and_then(|step| {
            step.prompt
                .as_ref()
                .map(|p| PresentationEvent::prompted(&label, &step.cue, p))
        });
        if let Some(event) = event {
            self.presenter.present(&event);
        }
    }
}

impl<C: Clock, P: Presenter> Controller for ChallengeController<C, P> {
    fn tick(&mut self, measurement: Option<Measurement>) -> TickOutcome {
        ChallengeController::tick(self, measurement)
    }

    fn fail(&mut self, reason: &str) {
        ChallengeController::fail(self, reason)
    }

    fn state_label(&self) -> String {
        self.label(self.session.state)
    }

    fn is_settled(&self) -> bool {
        matches!(self.session.state, State::Verified | State::Faulted)
    }
}
