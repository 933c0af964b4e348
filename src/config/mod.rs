//! Configuration resolved from the environment.

pub(crate) mod helpers;
mod wait;

pub use wait::WaitDefaults;
