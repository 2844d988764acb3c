// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::options::{OptionContributor, OptionSet};
use crate::errors::Result;
use crate::types::{OutputTarget, deserialize_opt_duration};

pub const DEFAULT_OPTIONS_ENV_VAR: &str = "JAVA_OPTS";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_LIVENESS_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILE_NAME: &str = "server.log";

/// Everything the supervisor needs to know about one worker.
///
/// Built once through [`ConfigurationBuilder`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) directory: PathBuf,
    pub(crate) host: String,
    pub(crate) liveness_port: u16,
    pub(crate) command: Vec<String>,
    pub(crate) params: Vec<String>,
    pub(crate) environment: BTreeMap<String, String>,
    pub(crate) options_env_var: String,
    pub(crate) log_file_name: String,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) handshake_command: Option<String>,
    pub(crate) client_required: bool,
    pub(crate) stop_command: Option<Vec<String>>,
    pub(crate) output: OutputTarget,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn liveness_port(&self) -> u16 {
        self.liveness_port
    }

    /// Base command, without the extra runtime parameters.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Final argument vector: base command first, extra parameters appended.
    pub fn command_line(&self) -> Vec<String> {
        self.command
            .iter()
            .chain(self.params.iter())
            .cloned()
            .collect()
    }

    /// Variables overlaid on the inherited environment.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Environment variable used as the options channel (e.g. `JAVA_OPTS`).
    pub fn options_env_var(&self) -> &str {
        &self.options_env_var
    }

    pub fn log_file_name(&self) -> &str {
        &self.log_file_name
    }

    /// Directory holding the worker's own log files (`<directory>/log` unless
    /// configured otherwise).
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.directory.join("log"))
    }

    /// Trivial control-plane command used for the handshake phase.
    pub fn handshake_command(&self) -> Option<&str> {
        self.handshake_command.as_deref()
    }

    /// A worker supports a control plane when it declares a handshake command.
    pub fn is_client_supported(&self) -> bool {
        self.handshake_command.is_some()
    }

    pub fn client_required(&self) -> bool {
        self.client_required
    }

    pub fn stop_command(&self) -> Option<&[String]> {
        self.stop_command.as_deref()
    }

    pub fn output(&self) -> OutputTarget {
        self.output
    }
}

/// Builder for [`Configuration`].
///
/// Options are assembled in a fixed order (see [`crate::config::options`]):
/// inherited environment value, contributors, explicit tokens.
pub struct ConfigurationBuilder {
    directory: Option<PathBuf>,
    host: String,
    liveness_port: u16,
    command: Vec<String>,
    params: Vec<String>,
    environment: BTreeMap<String, String>,
    options_env_var: String,
    inherit_options_from_env: bool,
    contributors: Vec<Box<dyn OptionContributor>>,
    options: Vec<String>,
    log_file_name: String,
    log_dir: Option<PathBuf>,
    handshake_command: Option<String>,
    client_required: bool,
    stop_command: Option<Vec<String>>,
    output: OutputTarget,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            directory: None,
            host: DEFAULT_HOST.to_string(),
            liveness_port: DEFAULT_LIVENESS_PORT,
            command: Vec::new(),
            params: Vec::new(),
            environment: BTreeMap::new(),
            options_env_var: DEFAULT_OPTIONS_ENV_VAR.to_string(),
            inherit_options_from_env: true,
            contributors: Vec::new(),
            options: Vec::new(),
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            log_dir: None,
            handshake_command: None,
            client_required: true,
            stop_command: None,
            output: OutputTarget::default(),
        }
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn liveness_port(mut self, port: u16) -> Self {
        self.liveness_port = port;
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: BTreeMap<String, String>) -> Self {
        self.environment.extend(vars);
        self
    }

    pub fn options_env_var(mut self, name: impl Into<String>) -> Self {
        self.options_env_var = name.into();
        self
    }

    /// Seed the option set from the caller's value of the options variable.
    pub fn inherit_options_from_env(mut self, inherit: bool) -> Self {
        self.inherit_options_from_env = inherit;
        self
    }

    pub fn contributor(mut self, contributor: impl OptionContributor + 'static) -> Self {
        self.contributors.push(Box::new(contributor));
        self
    }

    pub fn option(mut self, token: impl Into<String>) -> Self {
        self.options.push(token.into());
        self
    }

    pub fn log_file_name(mut self, name: impl Into<String>) -> Self {
        self.log_file_name = name.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn handshake_command(mut self, command: impl Into<String>) -> Self {
        self.handshake_command = Some(command.into());
        self
    }

    pub fn client_required(mut self, required: bool) -> Self {
        self.client_required = required;
        self
    }

    pub fn stop_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_command = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn output(mut self, output: OutputTarget) -> Self {
        self.output = output;
        self
    }

    /// Resolve the option set in precedence order.
    pub fn resolve_options(&self) -> OptionSet {
        let mut options = if self.inherit_options_from_env {
            std::env::var(&self.options_env_var)
                .map(|v| OptionSet::parse(&v))
                .unwrap_or_default()
        } else {
            OptionSet::new()
        };

        for contributor in &self.contributors {
            contributor.contribute(&mut options);
        }
        for token in &self.options {
            options.push(token.clone());
        }
        options
    }

    pub fn build(self) -> Result<Configuration> {
        let options = self.resolve_options();

        let mut environment = self.environment;
        if !options.is_empty() {
            environment.insert(self.options_env_var.clone(), options.render());
        }

        let cfg = Configuration {
            directory: self.directory.unwrap_or_default(),
            host: self.host,
            liveness_port: self.liveness_port,
            command: self.command,
            params: self.params,
            environment,
            options_env_var: self.options_env_var,
            log_file_name: self.log_file_name,
            log_dir: self.log_dir,
            handshake_command: self.handshake_command,
            client_required: self.client_required,
            stop_command: self.stop_command,
            output: self.output,
        };

        crate::config::validate::validate_configuration(&cfg)?;
        Ok(cfg)
    }
}

/// Retry policy shared by the readiness probe and the handshake phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Timing knobs for one supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorPolicy {
    /// Liveness-port polling: 30 attempts, 5s apart.
    pub readiness: RetryPolicy,
    /// Control-plane handshake: 20 attempts, 5s apart.
    pub handshake: RetryPolicy,
    /// Timeout of one TCP connect attempt.
    pub connect_timeout: Duration,
    /// Deadline for all shutdown hooks together.
    pub stop_timeout: Duration,
    /// How long the destroy hook waits after the graceful terminate.
    pub destroy_timeout: Duration,
    /// Whether to look for marker-tagged leftovers after the worker is gone.
    pub reap_orphans: bool,
    /// How long tagged leftovers get to exit on their own.
    pub orphan_grace: Duration,
    /// Pause after a forced kill so the OS can release the listening port.
    pub kill_settle: Duration,
    /// How long stream readers may keep draining after the worker exits.
    pub drain_timeout: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            readiness: RetryPolicy::new(30, Duration::from_secs(5)),
            handshake: RetryPolicy::new(20, Duration::from_secs(5)),
            connect_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(60),
            destroy_timeout: Duration::from_secs(30),
            reap_orphans: true,
            orphan_grace: Duration::from_secs(10),
            kill_settle: Duration::from_secs(15),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// A validated worker file: configuration, policy and control-plane adapter
/// settings.
#[derive(Debug, Clone)]
pub struct WorkerFile {
    pub configuration: Configuration,
    pub policy: SupervisorPolicy,
    pub client: Option<ClientSection>,
}

/// Raw TOML model, before validation.
///
/// ```toml
/// [worker]
/// directory = "/opt/worker"
/// liveness_port = 9990
/// command = ["bin/standalone.sh"]
/// handshake_command = "version"
///
/// [worker.env]
/// LAUNCH_IN_BACKGROUND = "false"
///
/// [readiness]
/// attempts = 30
/// interval = "5s"
///
/// [shutdown]
/// timeout = "60s"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkerFile {
    pub worker: WorkerSection,

    #[serde(default)]
    pub readiness: RetrySection,

    #[serde(default)]
    pub handshake: RetrySection,

    #[serde(default)]
    pub shutdown: ShutdownSection,

    #[serde(default)]
    pub client: Option<ClientSection>,
}

/// `[worker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Relative paths are resolved against the worker file's directory.
    pub directory: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    pub liveness_port: u16,

    pub command: Vec<String>,

    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default = "default_options_env_var")]
    pub options_env_var: String,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default = "default_true")]
    pub inherit_options_from_env: bool,

    #[serde(default)]
    pub heap: Option<HeapSection>,

    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub handshake_command: Option<String>,

    #[serde(default = "default_true")]
    pub client_required: bool,

    #[serde(default)]
    pub stop_command: Option<Vec<String>>,

    #[serde(default)]
    pub output: OutputTarget,
}

/// `[worker.heap]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HeapSection {
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

/// `[readiness]` / `[handshake]` sections.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RetrySection {
    #[serde(default)]
    pub attempts: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub interval: Option<Duration>,
}

/// `[shutdown]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShutdownSection {
    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub destroy_timeout: Option<Duration>,

    #[serde(default)]
    pub reap_orphans: Option<bool>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub orphan_grace: Option<Duration>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub kill_settle: Option<Duration>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub drain_timeout: Option<Duration>,
}

/// `[client]` section: settings for the shell-backed control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Command template; `{}` is replaced by the control-plane command.
    pub command: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_options_env_var() -> String {
    DEFAULT_OPTIONS_ENV_VAR.to_string()
}

fn default_log_file_name() -> String {
    DEFAULT_LOG_FILE_NAME.to_string()
}

fn default_true() -> bool {
    true
}
