use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "glens.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gradle: GradleConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
}

/// How the build tool is invoked.
#[derive(Debug, Clone, Deserialize)]
pub struct GradleConfig {
    /// Binary name or path, e.g. "gradle" or "./gradlew".
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed on every invocation, before any extra arguments.
    #[serde(default = "default_arguments")]
    pub arguments: Vec<String>,
    /// JVM heap ceiling for the build, e.g. "4g".
    pub memory: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    /// Appended after all other arguments.
    #[serde(default)]
    pub extra_arguments: Vec<String>,
    /// Extra variables set on the child process.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Default for GradleConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            arguments: default_arguments(),
            memory: None,
            verbose: false,
            extra_arguments: Vec::new(),
            environment: BTreeMap::new(),
        }
    }
}

/// Selects the device or emulator instrumented runs target.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportsConfig {
    /// Test result directory, relative to the module directory.
    #[serde(default = "default_report_root")]
    pub root: PathBuf,
    /// Echo captured stdout/stderr of failing suites.
    #[serde(default)]
    pub show_output: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            root: default_report_root(),
            show_output: false,
        }
    }
}

/// Controls how stack traces are mapped back to source files.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    /// Source roots, relative to the module directory, tried in order.
    #[serde(default = "default_source_roots")]
    pub source_roots: Vec<PathBuf>,
    /// Type name prefixes of frames that never point at authored code.
    #[serde(default = "default_framework_prefixes")]
    pub framework_prefixes: Vec<String>,
    /// Marks an inlined assertion helper whose caller frame must also be skipped.
    #[serde(default = "default_wrapper_marker")]
    pub wrapper_marker: String,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            source_roots: default_source_roots(),
            framework_prefixes: default_framework_prefixes(),
            wrapper_marker: default_wrapper_marker(),
        }
    }
}

fn default_command() -> String {
    "gradle".into()
}

fn default_arguments() -> Vec<String> {
    vec!["--console=plain".into()]
}

fn default_report_root() -> PathBuf {
    PathBuf::from("build/test-results")
}

fn default_source_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("src/test/kotlin"),
        PathBuf::from("src/main/kotlin"),
    ]
}

fn default_framework_prefixes() -> Vec<String> {
    [
        "org.junit.",
        "junit.",
        "kotlin.",
        "kotlinx.",
        "java.",
        "javax.",
        "jdk.",
        "sun.",
        "org.gradle.",
        "worker.org.gradle.",
        "androidx.test.",
        "org.robolectric.",
        "skip.unit.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_wrapper_marker() -> String {
    "$DefaultImpls".into()
}

impl Config {
    /// Load `glens.toml` from the project root, falling back to defaults if absent or invalid.
    pub fn load(project_dir: &Path) -> Self {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Layer environment overrides on top of the file settings.
    ///
    /// Variables are passed in explicitly so runs can be reproduced without
    /// touching the real process environment.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "ANDROID_SERIAL" if !value.is_empty() => {
                    self.device.serial = Some(value.to_string());
                }
                "GLENS_VERBOSE" => {
                    self.gradle.verbose = matches!(value, "1" | "true" | "yes" | "on");
                }
                "GLENS_EXTRA_ARGS" => {
                    let args = shell_words::split(value)
                        .with_context(|| format!("invalid GLENS_EXTRA_ARGS: {}", value))?;
                    self.gradle.extra_arguments.extend(args);
                }
                "GLENS_MEMORY" if !value.is_empty() => {
                    self.gradle.memory = Some(value.to_string());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.gradle.command, "gradle");
        assert_eq!(config.gradle.arguments, vec!["--console=plain".to_string()]);
        assert_eq!(config.reports.root, PathBuf::from("build/test-results"));
        assert_eq!(config.resolve.wrapper_marker, "$DefaultImpls");
        assert_eq!(config.resolve.source_roots.len(), 2);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [gradle]
            command = "./gradlew"
            memory = "4g"

            [device]
            serial = "emulator-5554"

            [resolve]
            source_roots = ["src/androidTest/kotlin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.gradle.command, "./gradlew");
        assert_eq!(config.gradle.memory.as_deref(), Some("4g"));
        assert_eq!(config.device.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(
            config.resolve.source_roots,
            vec![PathBuf::from("src/androidTest/kotlin")]
        );
        assert!(!config.resolve.framework_prefixes.is_empty());
    }

    #[test]
    fn env_overrides_are_explicit() {
        let mut config = Config::default();
        config
            .apply_env([
                ("ANDROID_SERIAL", "device-1"),
                ("GLENS_VERBOSE", "1"),
                ("GLENS_EXTRA_ARGS", "--offline -Pfoo='a b'"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.device.serial.as_deref(), Some("device-1"));
        assert!(config.gradle.verbose);
        assert_eq!(
            config.gradle.extra_arguments,
            vec!["--offline".to_string(), "-Pfoo=a b".to_string()]
        );
    }

    #[test]
    fn unbalanced_extra_args_are_rejected() {
        let mut config = Config::default();
        assert!(config.apply_env([("GLENS_EXTRA_ARGS", "'oops")]).is_err());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[gradle\ncommand = 3").unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.gradle.command, "gradle");
    }
}
