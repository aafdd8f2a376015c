use std::{error::Error, fmt, path::PathBuf};

#[derive(Debug)]
pub enum CommandError {
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn { command, source } => {
                write!(f, "Failed to execute `{command}`: {source}")
            }
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CommandError::Spawn { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub enum FileSystemError {
    File {
        path: PathBuf,
        action: &'static str,
        source: std::io::Error,
    },

    NotAFile {
        path: PathBuf,
    },

    NotExecutable {
        path: PathBuf,
    },
}

impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemError::File {
                path,
                action,
                source,
            } => {
                write!(f, "Failed to {action} file `{}`: {source}", path.display())
            }
            FileSystemError::NotAFile { path } => {
                write!(f, "`{}` is not a regular file", path.display())
            }
            FileSystemError::NotExecutable { path } => {
                write!(f, "`{}` is not executable", path.display())
            }
        }
    }
}

impl Error for FileSystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FileSystemError::File { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type CommandResult<T> = std::result::Result<T, CommandError>;
pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
