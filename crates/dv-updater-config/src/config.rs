use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{LazyLock, PoisonError, RwLock},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use dv_updater_utils::time::parse_duration;
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    env::apply_env_overrides,
    error::{ConfigError, Result},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/dv-updater/config.toml";
pub const CONFIG_PATH_ENV: &str = "UPDATER_CONFIG";

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var(CONFIG_PATH_ENV) {
        Ok(path_str) if !path_str.is_empty() => PathBuf::from(path_str),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    })
});

pub fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_config_path(path: impl Into<PathBuf>) {
    let mut current = CONFIG_PATH.write().unwrap_or_else(PoisonError::into_inner);
    *current = path.into();
}

/// dv-updater configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct Config {
    /// Application settings.
    pub app: AppConfig,

    /// HTTP API server.
    pub http: HttpConfig,

    /// Log output.
    pub log: LogConfig,

    /// Periodic repository refresh and self-update.
    pub auto_update: AutoUpdateConfig,

    /// Native package manager invocation.
    pub package_manager: PackageManagerConfig,
}

/// Application settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment profile name, reported in logs.
    /// Default: "dev"
    pub profile: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: "dev".to_string(),
        }
    }
}

/// HTTP API server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the HTTP API binds to.
    /// Default: "localhost"
    pub host: String,

    /// Port the HTTP API listens on.
    /// Default: 8081
    pub port: u16,

    /// Time allowed for reading a request, e.g. "10s".
    /// Default: "10s"
    pub read_timeout: String,

    /// Time allowed for writing a response, e.g. "10s".
    /// Default: "10s"
    pub write_timeout: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
            read_timeout: "10s".to_string(),
            write_timeout: "10s".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        parse_duration(&self.read_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn write_timeout(&self) -> Duration {
        parse_duration(&self.write_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Upper bound for handling one request.
    pub fn request_timeout(&self) -> Duration {
        self.read_timeout().saturating_add(self.write_timeout())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Compact human readable lines
    Pretty,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => f.write_str("json"),
            LogFormat::Pretty => f.write_str("pretty"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: "trace", "debug", "info", "warn" or "error".
    /// Default: "info"
    pub level: String,

    /// Output format: "json" or "pretty".
    /// Default: "json"
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Periodic repository refresh and self-update.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct AutoUpdateConfig {
    /// Check for and apply updates of dv-updater itself.
    /// Default: true
    pub enabled: bool,

    /// How often the self-update check runs.
    /// Default: "10s"
    pub check_interval: String,

    /// How often the package repository index is refreshed.
    /// Default: "1m"
    pub repository_interval: String,
}

impl Default for AutoUpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: "10s".to_string(),
            repository_interval: "1m".to_string(),
        }
    }
}

impl AutoUpdateConfig {
    pub fn check_interval(&self) -> Duration {
        parse_duration(&self.check_interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn repository_interval(&self) -> Duration {
        parse_duration(&self.repository_interval).unwrap_or(Duration::from_secs(60))
    }
}

/// Native package manager invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct PackageManagerConfig {
    /// Repository that provides the dv-* packages.
    /// Default: "dvnet"
    pub repository: String,

    /// apt source list holding only that repository, relative to /etc/apt.
    /// Default: "sources.list.d/dvnet.list"
    pub apt_source_list: String,

    /// Prefix package manager commands with sudo.
    /// Default: true
    pub use_sudo: bool,

    /// Upgrade attempts while the package database is locked.
    /// Default: 5
    pub lock_retry_attempts: u32,

    /// Pause between upgrade attempts while the database is locked.
    /// Default: "5s"
    pub lock_retry_delay: String,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            repository: "dvnet".to_string(),
            apt_source_list: "sources.list.d/dvnet.list".to_string(),
            use_sudo: true,
            lock_retry_attempts: 5,
            lock_retry_delay: "5s".to_string(),
        }
    }
}

impl PackageManagerConfig {
    pub fn lock_retry_delay(&self) -> Duration {
        parse_duration(&self.lock_retry_delay).unwrap_or(Duration::from_secs(5))
    }
}

fn require_duration(key: &str, value: &str, allow_zero: bool) -> Result<()> {
    match parse_duration(value) {
        Some(d) if allow_zero || !d.is_zero() => Ok(()),
        Some(_) => Err(ConfigError::invalid(key, value, "must be greater than zero")),
        None => {
            Err(ConfigError::InvalidDuration {
                key: key.to_string(),
                value: value.to_string(),
            })
        }
    }
}

impl Config {
    /// Loads the configuration from [`CONFIG_PATH`].
    pub fn new() -> Result<Self> {
        Self::load(config_path())
    }

    /// Loads `path`, applies `UPDATER_*` overrides and validates the result.
    /// A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        apply_env_overrides(&mut config)?;
        config.resolve()?;

        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        if self.http.host.trim().is_empty() {
            self.http.host = HttpConfig::default().host;
        }
        if self.http.port == 0 {
            return Err(ConfigError::invalid("http.port", "0", "must be non-zero"));
        }

        require_duration("http.read_timeout", &self.http.read_timeout, false)?;
        require_duration("http.write_timeout", &self.http.write_timeout, false)?;
        require_duration(
            "auto_update.check_interval",
            &self.auto_update.check_interval,
            false,
        )?;
        require_duration(
            "auto_update.repository_interval",
            &self.auto_update.repository_interval,
            false,
        )?;
        require_duration(
            "package_manager.lock_retry_delay",
            &self.package_manager.lock_retry_delay,
            true,
        )?;

        if self.package_manager.repository.trim().is_empty() {
            return Err(ConfigError::invalid(
                "package_manager.repository",
                "",
                "must not be empty",
            ));
        }
        if self.package_manager.apt_source_list.trim().is_empty() {
            self.package_manager.apt_source_list = PackageManagerConfig::default().apt_source_list;
        }
        if self.package_manager.lock_retry_attempts == 0 {
            return Err(ConfigError::invalid(
                "package_manager.lock_retry_attempts",
                "0",
                "must be at least 1",
            ));
        }

        if self.log.level.trim().is_empty() {
            self.log.level = LogConfig::default().level;
        }
        if self.app.profile.trim().is_empty() {
            self.app.profile = AppConfig::default().profile;
        }

        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(table) = doc.get_mut("app").and_then(|i| i.as_table_mut()) {
            annotate_toml_table::<AppConfig>(table, false)?;
        }
        if let Some(table) = doc.get_mut("http").and_then(|i| i.as_table_mut()) {
            annotate_toml_table::<HttpConfig>(table, false)?;
        }
        if let Some(table) = doc.get_mut("log").and_then(|i| i.as_table_mut()) {
            annotate_toml_table::<LogConfig>(table, false)?;
        }
        if let Some(table) = doc.get_mut("auto_update").and_then(|i| i.as_table_mut()) {
            annotate_toml_table::<AutoUpdateConfig>(table, false)?;
        }
        if let Some(table) = doc
            .get_mut("package_manager")
            .and_then(|i| i.as_table_mut())
        {
            annotate_toml_table::<PackageManagerConfig>(table, false)?;
        }

        Ok(doc)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Writes the documented default configuration to `path`.
pub fn generate_default_config<P: AsRef<Path>>(path: P, force: bool) -> Result<PathBuf> {
    let path = path.as_ref();

    if path.exists() && !force {
        return Err(ConfigError::ConfigAlreadyExists(path.to_path_buf()));
    }

    let annotated_doc = Config::default().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(path.to_path_buf())
}
