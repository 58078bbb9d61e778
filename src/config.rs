//! Configuration management for shell-tether.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::execution::CommandExecutor;
use crate::output::{OutputPresenter, Shortening};
use crate::session::{ShellConfig, DEFAULT_SHELL};
use crate::validation::{CommandValidator, ValidatorConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Shell process configuration.
    pub shell: ShellSection,
    /// Command validation configuration.
    pub validation: ValidatorConfig,
    /// Output presentation configuration.
    pub output: OutputSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Shell configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    /// Shell program.
    pub program: String,
    /// Arguments passed to the shell. When empty, bash gets
    /// `--noprofile --norc` and other shells get none.
    pub args: Vec<String>,
    /// Default command timeout; commands run unbounded when unset.
    pub timeout_secs: Option<u64>,
    /// Initial working directory for new sessions.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            program: DEFAULT_SHELL.to_string(),
            args: Vec::new(),
            timeout_secs: None,
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

/// Output configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Log directory; quiet-mode output goes under it.
    pub logdir: Option<PathBuf>,
    /// Quiet mode for requests that do not choose.
    pub quiet: bool,
    /// How displayed output is shortened.
    pub shorten: Shortening,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SHELL_TETHER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("SHELL_TETHER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("ignoring invalid SHELL_TETHER_PORT: {}", port),
            }
        }

        if let Some(mode) = lookup("SHELL_TETHER_VALIDATE") {
            match mode.parse() {
                Ok(mode) => self.validation.mode = mode,
                Err(_) => warn!("ignoring invalid SHELL_TETHER_VALIDATE: {}", mode),
            }
        }

        if let Some(dir) = lookup("SHELL_TETHER_LOGDIR") {
            if !dir.is_empty() {
                self.output.logdir = Some(PathBuf::from(dir));
            }
        }

        if let Some(shell) = lookup("SHELL_TETHER_SHELL") {
            if !shell.is_empty() {
                self.shell.program = shell;
            }
        }

        if let Some(level) = lookup("SHELL_TETHER_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(mode) = args.validate {
            self.validation.mode = mode;
        }
        if let Some(ref dir) = args.logdir {
            self.output.logdir = Some(dir.clone());
        }
        if let Some(ref shell) = args.shell {
            self.shell.program = shell.clone();
        }
        if let Some(secs) = args.timeout_secs {
            self.shell.timeout_secs = Some(secs);
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.apply_args(args);
        Ok(config)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;
        Ok(ServerConfig::new(host.to_string(), self.server.port))
    }

    /// Shell settings for new sessions and background jobs.
    pub fn shell_config(&self) -> ShellConfig {
        let program = if self.shell.program.is_empty() {
            DEFAULT_SHELL.to_string()
        } else {
            self.shell.program.clone()
        };
        let is_bash = Path::new(&program)
            .file_name()
            .is_some_and(|name| name == DEFAULT_SHELL);
        let args = if self.shell.args.is_empty() && is_bash {
            ShellConfig::default().args
        } else {
            self.shell.args.clone()
        };
        ShellConfig {
            program,
            args,
            working_dir: self.shell.working_dir.clone(),
            env: self.shell.env.clone(),
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.shell.timeout_secs.map(Duration::from_secs)
    }

    /// Build the validate/run/present pipeline described by this config.
    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(
            CommandValidator::new(&self.validation),
            OutputPresenter::new(self.output.logdir.clone())
                .with_shortening(self.output.shorten.clone()),
        )
        .with_default_timeout(self.default_timeout())
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
        }
    }
}

impl std::error::Error for ConfigError {}
