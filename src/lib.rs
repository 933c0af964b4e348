//! Readiness waiting for containers started by integration tests.
//!
//! The [`wait`] module holds the strategies and their polling engine,
//! [`docker`] adapts a running Docker container into a strategy target, and
//! [`config`] resolves timing defaults from the environment.

pub mod config;
pub mod docker;
pub mod error;
pub mod wait;

pub use config::WaitDefaults;
pub use docker::DockerTarget;
pub use error::ConfigError;
pub use wait::{
    AllStrategy, HttpStrategy, ListeningPortStrategy, StaticTarget, StrategyTarget, WaitContext,
    WaitError, WaitStrategy,
};
