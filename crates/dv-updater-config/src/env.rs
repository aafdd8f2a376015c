//! `UPDATER_*` environment overrides, applied after the config file.
//!
//! Every field maps to `UPDATER_<SECTION>_<FIELD>` in upper case, for
//! example `http.port` is `UPDATER_HTTP_PORT`.

use std::str::FromStr;

use tracing::debug;

use crate::{
    config::{Config, LogFormat},
    error::{ConfigError, Result},
};

pub const ENV_PREFIX: &str = "UPDATER_";

fn lookup(key: &str) -> Option<String> {
    let name = format!("{ENV_PREFIX}{key}");
    let value = std::env::var(&name).ok()?;
    debug!("config override from {}", name);
    Some(value)
}

fn override_string(target: &mut String, key: &str) {
    if let Some(value) = lookup(key) {
        *target = value;
    }
}

fn override_parsed<T>(target: &mut T, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(format!("{ENV_PREFIX}{key}"), &value, err.to_string()))?;
    }
    Ok(())
}

fn override_bool(target: &mut bool, key: &str) -> Result<()> {
    if let Some(value) = lookup(key) {
        *target = parse_bool(&value).ok_or_else(|| {
            ConfigError::invalid(format!("{ENV_PREFIX}{key}"), &value, "expected true or false")
        })?;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    override_string(&mut config.app.profile, "APP_PROFILE");

    override_string(&mut config.http.host, "HTTP_HOST");
    override_parsed(&mut config.http.port, "HTTP_PORT")?;
    override_string(&mut config.http.read_timeout, "HTTP_READ_TIMEOUT");
    override_string(&mut config.http.write_timeout, "HTTP_WRITE_TIMEOUT");

    override_string(&mut config.log.level, "LOG_LEVEL");
    override_parsed::<LogFormat>(&mut config.log.format, "LOG_FORMAT")?;

    override_bool(&mut config.auto_update.enabled, "AUTO_UPDATE_ENABLED")?;
    override_string(
        &mut config.auto_update.check_interval,
        "AUTO_UPDATE_CHECK_INTERVAL",
    );
    override_string(
        &mut config.auto_update.repository_interval,
        "AUTO_UPDATE_REPOSITORY_INTERVAL",
    );

    let pm = &mut config.package_manager;
    override_string(&mut pm.repository, "PACKAGE_MANAGER_REPOSITORY");
    override_string(&mut pm.apt_source_list, "PACKAGE_MANAGER_APT_SOURCE_LIST");
    override_bool(&mut pm.use_sudo, "PACKAGE_MANAGER_USE_SUDO")?;
    override_parsed(&mut pm.lock_retry_attempts, "PACKAGE_MANAGER_LOCK_RETRY_ATTEMPTS")?;
    override_string(&mut pm.lock_retry_delay, "PACKAGE_MANAGER_LOCK_RETRY_DELAY");

    Ok(())
}
