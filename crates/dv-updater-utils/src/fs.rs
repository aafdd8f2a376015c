use std::{
    fs,
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::{Component, Path, PathBuf},
};

use tracing::debug;

use crate::error::{FileSystemError, FileSystemResult};

/// Resolves an absolute system path below an alternative filesystem root.
///
/// `rooted_path("/srv/image", "/etc/os-release")` yields
/// `/srv/image/etc/os-release`. With a root of `/` the path is unchanged.
pub fn rooted_path<P: AsRef<Path>>(root: &Path, path: P) -> PathBuf {
    let relative: PathBuf = path
        .as_ref()
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Reads a text file, treating any failure as absence.
///
/// Missing files and directories are silently `None`; other read errors are
/// logged at debug level before returning `None`.
pub fn read_optional<P: AsRef<Path>>(path: P) -> Option<String> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => None,
        Err(err) => {
            debug!("unable to read {}: {}", path.display(), err);
            None
        }
    }
}

/// Checks that `path` is an existing, regular file with an execute bit set.
pub fn ensure_executable_file<P: AsRef<Path>>(path: P) -> FileSystemResult<PathBuf> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|source| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "inspect",
            source,
        }
    })?;

    if !metadata.is_file() {
        return Err(FileSystemError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(FileSystemError::NotExecutable {
            path: path.to_path_buf(),
        });
    }

    Ok(path.to_path_buf())
}

/// Path of the binary running as this process.
pub fn current_executable() -> FileSystemResult<PathBuf> {
    std::env::current_exe().map_err(|source| {
        FileSystemError::File {
            path: PathBuf::from("/proc/self/exe"),
            action: "resolve",
            source,
        }
    })
}
