//! Built-in policy profiles.
//!
//! Each profile is a complete [`ThresholdPolicy`] embedded at compile time
//! from `contrib/profiles/*.toml`. The two liveness variants are two
//! configurations of the same controller.

use crate::error::PolicyError;
use crate::policy::ThresholdPolicy;
use std::sync::OnceLock;

/// Neutral → smile → blink.
const PROFILE_BIO_ID: &str = include_str!("../../../contrib/profiles/bio-id.toml");
/// Neutral (settled) → blink → head turn.
const PROFILE_BIO_ID_TURN: &str = include_str!("../../../contrib/profiles/bio-id-turn.toml");

pub const DEFAULT_PROFILE: &str = "bio-id";

static PROFILE_DB: OnceLock<Vec<ThresholdPolicy>> = OnceLock::new();

fn profile_db() -> &'static Vec<ThresholdPolicy> {
    PROFILE_DB.get_or_init(|| {
        let mut db = Vec::new();
        for src in [PROFILE_BIO_ID, PROFILE_BIO_ID_TURN] {
            match ThresholdPolicy::from_toml(src) {
                Ok(p) => db.push(p),
                Err(e) => tracing::error!(error = %e, "bad embedded profile"),
            }
        }
        db
    })
}

/// Look up a built-in profile by name.
pub fn lookup_profile(name: &str) -> Option<&'static ThresholdPolicy> {
    profile_db().iter().find(|p| p.name == name)
}

/// Owned copy of a built-in profile, or `UnknownProfile`.
pub fn load_profile(name: &str) -> Result<ThresholdPolicy, PolicyError> {
    lookup_profile(name)
        .cloned()
        .ok_or_else(|| PolicyError::UnknownProfile(name.to_string()))
}

/// List all built-in profiles.
pub fn list_profiles() -> &'static [ThresholdPolicy] {
    profile_db()
}
