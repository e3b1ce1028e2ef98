//! Footfall command line tooling.
//!
//! Exposes modules for integration testing

pub mod cli;
pub mod config;
pub mod journey;

pub use config::{AppConfig, LoadedConfig};
pub use journey::{Journey, JourneyError, Replayer, ReplaySummary};
