use error::UpdaterError;

pub mod error;
pub mod package_manager;
pub mod scheduler;
pub mod self_update;
pub mod services;

#[cfg(test)]
pub mod test_utils;

pub type UpdaterResult<T> = std::result::Result<T, UpdaterError>;
