use serde::{Deserialize, Serialize};

/// Static presentation for a state, as configured in a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub status: String,
    pub instruction: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub progress: u8,
}

impl Cue {
    pub fn new(status: &str, instruction: &str, icon: &str, progress: u8) -> Self {
        Self {
            status: status.to_string(),
            instruction: instruction.to_string(),
            icon: icon.to_string(),
            progress,
        }
    }
}

/// Partial cue override emitted while staying in a state (e.g. "Hold...").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Discrete event handed to the presentation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationEvent {
    pub state: String,
    pub status: String,
    pub instruction: String,
    pub icon: String,
    pub progress: u8,
}

impl PresentationEvent {
    pub fn from_cue(state: &str, cue: &Cue) -> Self {
        Self {
            state: state.to_string(),
            status: cue.status.clone(),
            instruction: cue.instruction.clone(),
            icon: cue.icon.clone(),
            progress: cue.progress.min(100),
        }
    }

    /// Apply a prompt on top of the state's cue; unset fields keep the cue value.
    pub fn prompted(state: &str, cue: &Cue, prompt: &Prompt) -> Self {
        let mut event = Self::from_cue(state, cue);
        if let Some(status) = &prompt.status {
            event.status = status.clone();
        }
        if let Some(instruction) = &prompt.instruction {
            event.instruction = instruction.clone();
        }
        if let Some(icon) = &prompt.icon {
            event.icon = icon.clone();
        }
        event
    }
}

/// Presentation collaborator. Receives events; the controllers never read back.
pub trait Presenter {
    fn present(&mut self, event: &PresentationEvent);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, event: &PresentationEvent) {
        (**self).present(event)
    }
}

/// Logs every event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn present(&mut self, event: &PresentationEvent) {
        tracing::info!(
            state = %event.state,
            status = %event.status,
            instruction = %event.instruction,
            icon = %event.icon,
            progress = event.progress,
            "present"
        );
    }
}

/// Keeps every event in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingPresenter {
    pub events: Vec<PresentationEvent>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&PresentationEvent> {
        self.events.last()
    }

    pub fn states(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.state.as_str()).collect()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, event: &PresentationEvent) {
        self.events.push(event.clone());
    }
}
