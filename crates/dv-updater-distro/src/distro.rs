use serde::{Deserialize, Serialize};

use crate::release::ReleaseDetails;

pub const UNKNOWN_NAME: &str = "Unknown";
pub const UNKNOWN: &str = "unknown";

/// Result of distribution discovery.
///
/// Built once at startup. The raw release details are kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxDistro {
    pub name: String,
    pub id: String,
    pub version: String,
    pub lsb_release: ReleaseDetails,
    pub os_release: ReleaseDetails,
}

impl LinuxDistro {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
        lsb_release: ReleaseDetails,
        os_release: ReleaseDetails,
    ) -> Self {
        let name = non_empty_or(name.into(), UNKNOWN_NAME);
        let id = non_empty_or(id.into().to_lowercase(), UNKNOWN);
        let version = non_empty_or(version.into(), UNKNOWN);

        Self {
            name,
            id,
            version,
            lsb_release,
            os_release,
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_string()
    }
}

fn first_token(value: &str) -> Option<&str> {
    value.split_whitespace().next()
}

/// Version reported by the release files, independent of any recognizer.
pub(crate) fn reported_version(lsb: &ReleaseDetails, os: &ReleaseDetails) -> Option<String> {
    os.get("VERSION_ID")
        .or_else(|| lsb.get("DISTRIB_RELEASE"))
        .or_else(|| os.get("VERSION").and_then(first_token))
        .map(str::to_string)
}

/// Classification used when no recognizer matches.
pub fn best_guess(lsb: ReleaseDetails, os: ReleaseDetails) -> LinuxDistro {
    let id = os
        .get("ID")
        .map(str::to_string)
        .or_else(|| lsb.get("DISTRIB_ID").map(str::to_lowercase))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let name = os
        .get("NAME")
        .or_else(|| os.get("PRETTY_NAME").and_then(first_token))
        .or_else(|| lsb.get("DISTRIB_ID"))
        .or_else(|| os.get("ID"))
        .unwrap_or(UNKNOWN_NAME)
        .to_string();

    let version = reported_version(&lsb, &os).unwrap_or_else(|| UNKNOWN.to_string());

    LinuxDistro::new(name, id, version, lsb, os)
}
