use std::path::PathBuf;

use dv_updater_utils::fs::{read_optional, rooted_path};

use crate::{
    distro::{reported_version, LinuxDistro},
    release::{parse_red_hat_release, ReleaseDetails},
};
use Evidence::{LsbId, OsReleaseId, Presence, RedHatRelease, VersionFile};

/// Everything a recognizer may consult: the two parsed release files and
/// best-effort access to other files below the same filesystem root.
#[derive(Debug, Clone)]
pub struct ReleaseSources {
    root: PathBuf,
    pub lsb_release: ReleaseDetails,
    pub os_release: ReleaseDetails,
}

impl ReleaseSources {
    pub fn new(root: impl Into<PathBuf>, lsb_release: ReleaseDetails, os_release: ReleaseDetails) -> Self {
        Self {
            root: root.into(),
            lsb_release,
            os_release,
        }
    }

    /// Reads a system file relative to the root; `None` when unavailable.
    pub fn read(&self, path: &str) -> Option<String> {
        read_optional(rooted_path(&self.root, path))
    }

    pub fn exists(&self, path: &str) -> bool {
        rooted_path(&self.root, path).exists()
    }
}

/// Decides whether the host is one particular distribution.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, sources: &ReleaseSources) -> Option<LinuxDistro>;
}

/// One piece of evidence that identifies a distribution.
#[derive(Debug, Clone, Copy)]
pub enum Evidence {
    /// os-release `ID` equals one of these, case-insensitively.
    OsReleaseId(&'static [&'static str]),
    /// lsb-release `DISTRIB_ID` equals one of these, case-insensitively.
    LsbId(&'static [&'static str]),
    /// Red Hat style release file starting with `prefix`.
    RedHatRelease {
        path: &'static str,
        prefix: &'static str,
    },
    /// File whose content is `prefix` followed by the version.
    VersionFile {
        path: &'static str,
        prefix: &'static str,
    },
    /// The file existing is enough.
    Presence(&'static str),
}

enum Match {
    No,
    Yes,
    WithVersion(String),
}

impl Evidence {
    fn test(&self, sources: &ReleaseSources) -> Match {
        match *self {
            Evidence::OsReleaseId(ids) => matches_any(sources.os_release.get("ID"), ids),
            Evidence::LsbId(ids) => matches_any(sources.lsb_release.get("DISTRIB_ID"), ids),
            Evidence::RedHatRelease { path, prefix } => {
                let Some(content) = sources.read(path) else {
                    return Match::No;
                };
                match parse_red_hat_release(&content, prefix) {
                    Some(Some(version)) => Match::WithVersion(version),
                    Some(None) => Match::Yes,
                    None => Match::No,
                }
            }
            Evidence::VersionFile { path, prefix } => {
                let Some(content) = sources.read(path) else {
                    return Match::No;
                };
                let Some(rest) = content.trim().strip_prefix(prefix) else {
                    return Match::No;
                };
                match rest.split_whitespace().next() {
                    Some(version) => Match::WithVersion(version.to_string()),
                    None => Match::Yes,
                }
            }
            Evidence::Presence(path) => {
                if sources.exists(path) {
                    Match::Yes
                } else {
                    Match::No
                }
            }
        }
    }
}

fn matches_any(value: Option<&str>, candidates: &[&str]) -> Match {
    match value {
        Some(value) if candidates.iter().any(|c| c.eq_ignore_ascii_case(value)) => Match::Yes,
        _ => Match::No,
    }
}

/// Table-driven recognizer: the distribution matches when any of its
/// evidence holds, checked in order.
#[derive(Debug, Clone, Copy)]
pub struct DistroRecognizer {
    pub name: &'static str,
    pub id: &'static str,
    pub evidence: &'static [Evidence],
}

impl Recognizer for DistroRecognizer {
    fn name(&self) -> &str {
        self.name
    }

    fn recognize(&self, sources: &ReleaseSources) -> Option<LinuxDistro> {
        let version = self.evidence.iter().find_map(|evidence| {
            match evidence.test(sources) {
                Match::No => None,
                Match::Yes => Some(None),
                Match::WithVersion(version) => Some(Some(version)),
            }
        })?;

        let version = version
            .or_else(|| reported_version(&sources.lsb_release, &sources.os_release))
            .unwrap_or_default();

        Some(LinuxDistro::new(
            self.name,
            self.id,
            version,
            sources.lsb_release.clone(),
            sources.os_release.clone(),
        ))
    }
}

/// Known distributions in precedence order.
pub static KNOWN_DISTROS: [DistroRecognizer; 29] = [
    DistroRecognizer {
        name: "CentOS",
        id: "centos",
        evidence: &[
            OsReleaseId(&["centos"]),
            RedHatRelease { path: "/etc/centos-release", prefix: "CentOS" },
        ],
    },
    DistroRecognizer {
        name: "Red Hat Enterprise Linux",
        id: "rhel",
        evidence: &[
            OsReleaseId(&["rhel"]),
            RedHatRelease { path: "/etc/redhat-release", prefix: "Red Hat Enterprise Linux" },
        ],
    },
    DistroRecognizer {
        name: "Ubuntu",
        id: "ubuntu",
        evidence: &[OsReleaseId(&["ubuntu"]), LsbId(&["Ubuntu"])],
    },
    DistroRecognizer {
        name: "Debian",
        id: "debian",
        evidence: &[OsReleaseId(&["debian"]), LsbId(&["Debian"])],
    },
    DistroRecognizer {
        name: "Amazon Linux",
        id: "amzn",
        evidence: &[
            OsReleaseId(&["amzn"]),
            RedHatRelease { path: "/etc/system-release", prefix: "Amazon Linux" },
        ],
    },
    DistroRecognizer {
        name: "Fedora",
        id: "fedora",
        evidence: &[
            OsReleaseId(&["fedora"]),
            RedHatRelease { path: "/etc/fedora-release", prefix: "Fedora" },
        ],
    },
    DistroRecognizer {
        name: "openSUSE",
        id: "opensuse",
        evidence: &[
            OsReleaseId(&["opensuse", "opensuse-leap", "opensuse-tumbleweed"]),
            LsbId(&["openSUSE"]),
        ],
    },
    DistroRecognizer {
        name: "SUSE Linux Enterprise Server",
        id: "sles",
        evidence: &[OsReleaseId(&["sles", "sles_sap"])],
    },
    DistroRecognizer {
        name: "Oracle Linux",
        id: "ol",
        evidence: &[
            OsReleaseId(&["ol"]),
            RedHatRelease { path: "/etc/oracle-release", prefix: "Oracle Linux" },
        ],
    },
    DistroRecognizer {
        name: "Photon OS",
        id: "photon",
        evidence: &[
            OsReleaseId(&["photon"]),
            VersionFile { path: "/etc/photon-release", prefix: "VMware Photon OS" },
        ],
    },
    DistroRecognizer {
        name: "Alpine Linux",
        id: "alpine",
        evidence: &[
            OsReleaseId(&["alpine"]),
            VersionFile { path: "/etc/alpine-release", prefix: "" },
        ],
    },
    DistroRecognizer {
        name: "Arch Linux",
        id: "arch",
        evidence: &[
            OsReleaseId(&["arch", "archarm"]),
            Presence("/etc/arch-release"),
        ],
    },
    DistroRecognizer {
        name: "Gentoo",
        id: "gentoo",
        evidence: &[
            OsReleaseId(&["gentoo"]),
            RedHatRelease { path: "/etc/gentoo-release", prefix: "Gentoo" },
        ],
    },
    DistroRecognizer {
        name: "Kali Linux",
        id: "kali",
        evidence: &[OsReleaseId(&["kali"]), LsbId(&["Kali"])],
    },
    DistroRecognizer {
        name: "Scientific Linux",
        id: "scientific",
        evidence: &[
            OsReleaseId(&["scientific"]),
            RedHatRelease { path: "/etc/redhat-release", prefix: "Scientific Linux" },
        ],
    },
    DistroRecognizer {
        name: "Slackware",
        id: "slackware",
        evidence: &[
            OsReleaseId(&["slackware"]),
            VersionFile { path: "/etc/slackware-version", prefix: "Slackware" },
        ],
    },
    DistroRecognizer {
        name: "Mageia",
        id: "mageia",
        evidence: &[
            OsReleaseId(&["mageia"]),
            RedHatRelease { path: "/etc/mageia-release", prefix: "Mageia" },
        ],
    },
    DistroRecognizer {
        name: "Clear Linux OS",
        id: "clear-linux-os",
        evidence: &[OsReleaseId(&["clear-linux-os"])],
    },
    DistroRecognizer {
        name: "Linux Mint",
        id: "linuxmint",
        evidence: &[OsReleaseId(&["linuxmint"]), LsbId(&["LinuxMint"])],
    },
    DistroRecognizer {
        name: "MX Linux",
        id: "mx",
        evidence: &[OsReleaseId(&["mx"]), LsbId(&["MX"])],
    },
    DistroRecognizer {
        name: "Novell Open Enterprise Server",
        id: "oes",
        evidence: &[
            OsReleaseId(&["oes"]),
            VersionFile { path: "/etc/novell-release", prefix: "Novell Open Enterprise Server" },
        ],
    },
    DistroRecognizer {
        name: "Puppy Linux",
        id: "puppy",
        evidence: &[OsReleaseId(&["puppy"]), LsbId(&["Puppy"])],
    },
    DistroRecognizer {
        name: "RancherOS",
        id: "rancheros",
        evidence: &[OsReleaseId(&["rancheros"])],
    },
    DistroRecognizer {
        name: "NixOS",
        id: "nixos",
        evidence: &[OsReleaseId(&["nixos"]), Presence("/etc/NIXOS")],
    },
    DistroRecognizer {
        name: "ALT Linux",
        id: "altlinux",
        evidence: &[
            OsReleaseId(&["altlinux"]),
            RedHatRelease { path: "/etc/altlinux-release", prefix: "ALT" },
        ],
    },
    DistroRecognizer {
        name: "CRUX",
        id: "crux",
        evidence: &[OsReleaseId(&["crux"]), LsbId(&["CRUX"])],
    },
    DistroRecognizer {
        name: "Source Mage",
        id: "sourcemage",
        evidence: &[
            OsReleaseId(&["sourcemage"]),
            Presence("/etc/sourcemage-release"),
        ],
    },
    DistroRecognizer {
        name: "Android",
        id: "android",
        evidence: &[Presence("/system/build.prop")],
    },
    DistroRecognizer {
        name: "Yellow Dog Linux",
        id: "yellowdog",
        evidence: &[
            RedHatRelease { path: "/etc/yellowdog-release", prefix: "Yellow Dog" },
        ],
    },
];

/// The ordered recognizer list used by default discovery.
pub fn default_recognizers() -> Vec<Box<dyn Recognizer>> {
    KNOWN_DISTROS
        .iter()
        .map(|r| Box::new(*r) as Box<dyn Recognizer>)
        .collect()
}
