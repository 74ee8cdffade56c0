use thiserror::Error;

/// Failure kinds a controller session can record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChallengeError {
    /// Measurement absent. Recovered locally; never changes state.
    #[error("no subject detected")]
    NoSubjectDetected,
    /// A step was held past its timeout. Surfaces as a rejection.
    #[error("challenge '{step}' timed out after {waited_ms} ms")]
    ChallengeTimeout { step: String, waited_ms: u64 },
    /// Perception or device failure. Terminal for the session.
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid policy TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid policy '{policy}': {reason}")]
    Invalid { policy: String, reason: String },
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
}
