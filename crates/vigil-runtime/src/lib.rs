//! vigil-runtime — drives a controller from a live sensor.
//!
//! The sensor runs on its own OS thread ([`engine`]); a tokio task samples it
//! on a fixed period and feeds the controller ([`poller`]).

pub mod config;
pub mod engine;
pub mod poller;

pub use config::Config;
pub use engine::{spawn_sensor, RuntimeError, SensorHandle};
pub use poller::{spawn_poller, PollReport, PollerHandle, StopSignal};
