pub mod gradle;
pub mod process;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::Result;

pub use gradle::GradleTool;
pub use process::OutputStream;

/// Environment handed to the build tool. Built explicitly from configuration,
/// never read from the ambient process environment by the runner itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerEnvironment {
    /// Device or emulator serial for instrumented runs.
    pub device: Option<String>,
    pub verbose: bool,
    /// Appended after all other arguments.
    pub extra_arguments: Vec<String>,
    /// Additional variables set on the child.
    pub overrides: BTreeMap<String, String>,
}

impl RunnerEnvironment {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.device.serial.clone(),
            verbose: config.gradle.verbose,
            extra_arguments: config.gradle.extra_arguments.clone(),
            overrides: config.gradle.environment.clone(),
        }
    }
}

/// Everything needed to start one build tool process.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub directory: PathBuf,
    pub command: String,
    pub arguments: Vec<String>,
    pub environment: RunnerEnvironment,
    /// Heap ceiling such as "4g"; translated into a tool flag, not an OS limit.
    pub memory_ceiling: Option<String>,
}

/// Trait for build tool adapters.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Start the tool and hand back its stdout as a line stream.
    ///
    /// Fails before any output is produced when the directory is missing or
    /// the executable cannot be started.
    async fn launch(&self, request: &LaunchRequest) -> Result<OutputStream>;

    /// Display name for this tool (e.g., "Gradle").
    fn name(&self) -> &str;
}

/// Construct the build tool adapter used by the harness.
pub fn detect() -> Arc<dyn BuildTool> {
    Arc::new(GradleTool::new())
}
