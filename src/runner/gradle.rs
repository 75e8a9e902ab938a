use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{HarnessError, Result};

use super::{BuildTool, LaunchRequest, OutputStream};

/// Variable adb and the Android Gradle plugin read to pick a device.
pub const DEVICE_VARIABLE: &str = "ANDROID_SERIAL";
/// Exposed to build scripts as the `verbose` project property.
pub const VERBOSE_VARIABLE: &str = "ORG_GRADLE_PROJECT_verbose";

/// Gradle adapter. Runs the configured command in the project directory and
/// streams its plain-console output.
#[derive(Debug, Default)]
pub struct GradleTool;

impl GradleTool {
    pub fn new() -> Self {
        Self
    }

    /// Full argument list for a request, in the order Gradle receives it.
    pub fn arguments(request: &LaunchRequest) -> Vec<String> {
        let mut args = request.arguments.clone();
        if request.environment.verbose {
            args.push("--info".into());
        }
        if let Some(ceiling) = request.memory_ceiling.as_deref() {
            args.push(memory_flag(ceiling));
        }
        args.extend(request.environment.extra_arguments.iter().cloned());
        args
    }

    /// Build the command for a request. The parent environment is inherited;
    /// only the device selector, verbosity toggle and explicit overrides are set.
    pub fn command(request: &LaunchRequest) -> Command {
        let mut cmd = Command::new(&request.command);
        cmd.args(Self::arguments(request))
            .current_dir(&request.directory);

        let env = &request.environment;
        if let Some(device) = env.device.as_deref() {
            cmd.env(DEVICE_VARIABLE, device);
        }
        if env.verbose {
            cmd.env(VERBOSE_VARIABLE, "true");
        }
        cmd.envs(&env.overrides);
        cmd
    }
}

/// Translate a heap ceiling such as `4g` into the Gradle JVM argument flag.
pub fn memory_flag(ceiling: &str) -> String {
    let ceiling = ceiling.trim();
    if ceiling.starts_with("-Xmx") {
        format!("-Dorg.gradle.jvmargs={}", ceiling)
    } else {
        format!("-Dorg.gradle.jvmargs=-Xmx{}", ceiling)
    }
}

#[async_trait]
impl BuildTool for GradleTool {
    async fn launch(&self, request: &LaunchRequest) -> Result<OutputStream> {
        if !request.directory.is_dir() {
            return Err(HarnessError::MissingDirectory(request.directory.clone()));
        }

        let cmd = Self::command(request);
        log::debug!("[cmd] {:?}", cmd.as_std());
        log::debug!("[cwd] {}", request.directory.display());

        OutputStream::spawn(cmd)
    }

    fn name(&self) -> &str {
        "Gradle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerEnvironment;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn request(dir: PathBuf, command: &str, arguments: &[&str]) -> LaunchRequest {
        LaunchRequest {
            directory: dir,
            command: command.into(),
            arguments: arguments.iter().map(|s| s.to_string()).collect(),
            environment: RunnerEnvironment::default(),
            memory_ceiling: None,
        }
    }

    #[test]
    fn memory_ceiling_becomes_jvm_flag() {
        assert_eq!(memory_flag("4g"), "-Dorg.gradle.jvmargs=-Xmx4g");
        assert_eq!(memory_flag("-Xmx512m"), "-Dorg.gradle.jvmargs=-Xmx512m");
    }

    #[test]
    fn arguments_are_ordered() {
        let mut req = request(PathBuf::from("."), "gradle", &["testDebug"]);
        req.memory_ceiling = Some("2g".into());
        req.environment.verbose = true;
        req.environment.extra_arguments = vec!["--offline".into()];
        assert_eq!(
            GradleTool::arguments(&req),
            vec![
                "testDebug".to_string(),
                "--info".to_string(),
                "-Dorg.gradle.jvmargs=-Xmx2g".to_string(),
                "--offline".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn missing_directory_is_rejected_before_spawn() {
        let req = request(PathBuf::from("/no/such/dir/anywhere"), "gradle", &[]);
        let err = GradleTool::new().launch(&req).await.err().unwrap();
        assert!(matches!(err, HarnessError::MissingDirectory(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn device_and_verbosity_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(
            dir.path().to_path_buf(),
            "sh",
            &["-c", "echo \"$ANDROID_SERIAL $ORG_GRADLE_PROJECT_verbose $GLENS_TEST_X\""],
        );
        req.environment.device = Some("emulator-5554".into());
        req.environment.verbose = true;
        req.environment
            .overrides
            .insert("GLENS_TEST_X".into(), "x".into());

        let mut stream = GradleTool::new().launch(&req).await.unwrap();
        let line = stream.next_line().await.unwrap();
        assert_eq!(line.text, "emulator-5554 true x");
        let result = stream.finish().await.unwrap();
        assert!(result.status.is_success());
    }
}
