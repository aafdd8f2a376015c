//! Linux distribution discovery.
//!
//! Reads `/etc/lsb-release` and `/etc/os-release` below a filesystem root,
//! runs an ordered list of [`Recognizer`]s over them and falls back to
//! [`best_guess`] when none match.

use std::path::PathBuf;

use dv_updater_utils::{fs::rooted_path, system};
use tracing::{debug, info};

pub mod distro;
pub mod error;
pub mod recognizer;
pub mod release;

pub use distro::{best_guess, LinuxDistro};
pub use error::{DistroError, DistroResult};
pub use recognizer::{default_recognizers, DistroRecognizer, Evidence, Recognizer, ReleaseSources};
pub use release::ReleaseDetails;

pub const LSB_RELEASE: &str = "/etc/lsb-release";
pub const OS_RELEASE: &str = "/etc/os-release";

pub struct Discovery {
    root: PathBuf,
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl Discovery {
    /// Discovery over the built-in recognizer list.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_recognizers(root, default_recognizers())
    }

    pub fn with_recognizers(root: impl Into<PathBuf>, recognizers: Vec<Box<dyn Recognizer>>) -> Self {
        Self {
            root: root.into(),
            recognizers,
        }
    }

    /// Identifies the host distribution. Fails on non-Linux hosts.
    pub fn discover(&self) -> DistroResult<LinuxDistro> {
        if !system::is_linux() {
            return Err(DistroError::UnsupportedOs(system::os_family().to_string()));
        }

        let distro = self.classify(&self.read_sources());
        info!(
            id = %distro.id,
            version = %distro.version,
            "detected distribution {}",
            distro.name
        );
        Ok(distro)
    }

    pub fn read_sources(&self) -> ReleaseSources {
        ReleaseSources::new(
            &self.root,
            ReleaseDetails::read(rooted_path(&self.root, LSB_RELEASE)),
            ReleaseDetails::read(rooted_path(&self.root, OS_RELEASE)),
        )
    }

    /// First recognizer to match wins; otherwise a best guess.
    pub fn classify(&self, sources: &ReleaseSources) -> LinuxDistro {
        for recognizer in &self.recognizers {
            if let Some(distro) = recognizer.recognize(sources) {
                debug!("matched recognizer {}", recognizer.name());
                return distro;
            }
        }

        debug!("no recognizer matched, guessing from release files");
        best_guess(sources.lsb_release.clone(), sources.os_release.clone())
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new("/")
    }
}
