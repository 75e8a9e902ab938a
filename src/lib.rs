//! Runs Gradle builds and tests for a Kotlin module and turns the output into
//! IDE issues and a pass/fail verdict.

pub mod config;
pub mod error;
pub mod harness;
pub mod models;
pub mod report;
pub mod reporter;
pub mod resolve;
pub mod runner;
pub mod scanner;

pub use config::Config;
pub use error::{HarnessError, Result};
pub use harness::{Harness, Invocation, RunOutcome};
pub use reporter::{CollectingSink, ConsoleSink, IssueSink};
