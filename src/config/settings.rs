use super::duration::{deserialize_opt_duration, parse_duration_string};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default settings file looked up in the workspace directory.
pub const SETTINGS_FILE_NAME: &str = "vehicle-runtime.yaml";

/// Default service catalog file looked up in the workspace directory.
pub const CATALOG_FILE_NAME: &str = "runtime.json";

const DEFAULT_LOG_CATEGORY: &str = "runtime_local";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_SETTLE_PERIOD: Duration = Duration::from_millis(200);

/// Which runtime launches and stops the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Each service is a container started with `<executable> run`.
    #[default]
    Docker,
    /// Each service image is executed directly as a local program.
    Native,
}

impl FromStr for RuntimeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeKind::Docker),
            "native" => Ok(RuntimeKind::Native),
            other => Err(Error::Config(format!(
                "Unknown runtime '{}'. Expected 'docker' or 'native'",
                other
            ))),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Docker => write!(f, "docker"),
            RuntimeKind::Native => write!(f, "native"),
        }
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub workspace_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Log category; every service log lives at `<logs_dir>/<category>/<service>.log`.
    pub log_category: String,
    pub catalog: PathBuf,
    pub runtime: RuntimeKind,
    pub runtime_executable: String,
    pub startup_timeout: Duration,
    /// Poll quantum of the readiness log tail.
    pub tail_interval: Duration,
    /// Poll interval of the foreground exit watch.
    pub watch_interval: Duration,
    /// SIGTERM to SIGKILL grace when terminating a local process.
    pub stop_grace_period: Duration,
    /// How long a freshly ready process is observed for an immediate crash.
    pub settle_period: Duration,
}

impl Settings {
    /// Defaults rooted at `workspace_dir`.
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        let workspace_dir = workspace_dir.into();
        Self {
            logs_dir: workspace_dir.join("logs"),
            catalog: workspace_dir.join(CATALOG_FILE_NAME),
            workspace_dir,
            log_category: DEFAULT_LOG_CATEGORY.to_string(),
            runtime: RuntimeKind::Docker,
            runtime_executable: "docker".to_string(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            tail_interval: DEFAULT_TAIL_INTERVAL,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            stop_grace_period: DEFAULT_STOP_GRACE_PERIOD,
            settle_period: DEFAULT_SETTLE_PERIOD,
        }
    }

    /// Workspace directory of an invocation: `explicit` (the `--workspace`
    /// flag), then `VRT_WORKSPACE_DIR` through `lookup`, then the current
    /// directory.
    pub fn resolve_workspace<F>(explicit: Option<PathBuf>, lookup: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = explicit {
            return Ok(dir);
        }
        match lookup("VRT_WORKSPACE_DIR").filter(|dir| !dir.trim().is_empty()) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Resolve settings: defaults, then the YAML file, then `VRT_*` variables,
    /// then CLI overrides.
    ///
    /// An explicitly passed `config_path` must exist; the implicit
    /// `vehicle-runtime.yaml` in the workspace is optional.
    pub fn load(
        workspace_dir: impl Into<PathBuf>,
        config_path: Option<&Path>,
        overrides: &SettingsOverrides,
    ) -> Result<Self> {
        let workspace_dir = workspace_dir.into();
        let mut settings = Self::for_workspace(&workspace_dir);

        let file = match config_path {
            Some(path) => Some(SettingsFile::load(path)?),
            None => {
                let implicit = workspace_dir.join(SETTINGS_FILE_NAME);
                if implicit.exists() {
                    Some(SettingsFile::load(&implicit)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            settings.apply_file(file);
        }

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.apply_overrides(overrides);

        tracing::debug!(?settings, "Resolved runtime settings");
        Ok(settings)
    }

    fn apply_file(&mut self, file: SettingsFile) {
        if let Some(dir) = file.logs_dir {
            self.logs_dir = self.resolve(dir);
        }
        if let Some(category) = file.log_category {
            self.log_category = category;
        }
        if let Some(catalog) = file.catalog {
            self.catalog = self.resolve(catalog);
        }
        if let Some(runtime) = file.runtime {
            self.runtime = runtime;
        }
        if let Some(executable) = file.runtime_executable {
            self.runtime_executable = executable;
        }
        let durations = [
            (file.startup_timeout, &mut self.startup_timeout),
            (file.tail_interval, &mut self.tail_interval),
            (file.watch_interval, &mut self.watch_interval),
            (file.stop_grace_period, &mut self.stop_grace_period),
            (file.settle_period, &mut self.settle_period),
        ];
        for (value, slot) in durations {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }

    /// Apply `VRT_*` environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("VRT_LOGS_DIR") {
            self.logs_dir = self.resolve(PathBuf::from(dir));
        }
        if let Some(catalog) = lookup("VRT_CATALOG") {
            self.catalog = self.resolve(PathBuf::from(catalog));
        }
        if let Some(runtime) = lookup("VRT_RUNTIME") {
            self.runtime = runtime.parse()?;
        }
        if let Some(executable) = lookup("VRT_RUNTIME_EXECUTABLE") {
            self.runtime_executable = executable;
        }
        if let Some(timeout) = lookup("VRT_STARTUP_TIMEOUT") {
            self.startup_timeout = parse_duration_string(&timeout).ok_or_else(|| {
                Error::Config(format!("Invalid VRT_STARTUP_TIMEOUT '{}'", timeout))
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(runtime) = overrides.runtime {
            self.runtime = runtime;
        }
        if let Some(timeout) = overrides.startup_timeout {
            self.startup_timeout = timeout;
        }
        if let Some(ref catalog) = overrides.catalog {
            self.catalog = self.resolve(catalog.clone());
        }
        if let Some(ref dir) = overrides.logs_dir {
            self.logs_dir = self.resolve(dir.clone());
        }
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.workspace_dir.join(path)
        }
    }
}

/// Values taken from command line flags; highest precedence.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub runtime: Option<RuntimeKind>,
    pub startup_timeout: Option<Duration>,
    pub catalog: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
}

/// On-disk shape of `vehicle-runtime.yaml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    logs_dir: Option<PathBuf>,
    log_category: Option<String>,
    catalog: Option<PathBuf>,
    runtime: Option<RuntimeKind>,
    runtime_executable: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    startup_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    tail_interval: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    watch_interval: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    stop_grace_period: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    settle_period: Option<Duration>,
}

impl SettingsFile {
    fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse settings YAML: {}", e)))
    }
}
