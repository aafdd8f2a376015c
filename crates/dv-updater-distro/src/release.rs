use std::{
    collections::BTreeMap,
    path::Path,
    sync::LazyLock,
};

use dv_updater_utils::fs::read_optional;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^\s=]+)\s*=\s*(.*?)\s*$").expect("unable to compile release key/value regex")
});

static RED_HAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+(?:release|version)\s+(\S+)")
        .expect("unable to compile red hat release regex")
});

/// Key/value pairs parsed from one release file such as `/etc/os-release`.
///
/// Keys are case-sensitive. When a key repeats, the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseDetails(BTreeMap<String, String>);

impl ReleaseDetails {
    /// Parses `KEY=value` lines.
    ///
    /// Blank lines and `#` comments are ignored, lines without `=` are
    /// skipped. Values are trimmed and enclosing quotes removed.
    pub fn parse(content: &str) -> Self {
        let mut details = Self::default();
        for line in content.lines() {
            if let Some((key, value)) = split_key_value(line) {
                details.0.insert(key.to_string(), value.to_string());
            }
        }
        details
    }

    /// Best-effort read; a missing or unreadable file gives empty details.
    pub fn read<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match read_optional(path) {
            Some(content) => Self::parse(&content),
            None => {
                debug!("release file {} not available", path.display());
                Self::default()
            }
        }
    }

    /// Value for `key`, treating an empty value as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ReleaseDetails
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    if line.trim_start().starts_with('#') {
        return None;
    }

    let caps = KEY_VALUE_RE.captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = strip_quotes(caps.get(2)?.as_str());
    Some((key, value))
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim_matches('"');
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Parses Red Hat style release text, `<Name> release <version> (<codename>)`.
///
/// Returns the version token when `content` starts with `expected_prefix`.
/// A matching prefix without a recognisable version yields `Some(None)`.
pub fn parse_red_hat_release(content: &str, expected_prefix: &str) -> Option<Option<String>> {
    let content = content.trim();
    if !content.starts_with(expected_prefix) {
        return None;
    }

    let version = RED_HAT_RE
        .captures(content.lines().next().unwrap_or_default())
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string());
    Some(version)
}
