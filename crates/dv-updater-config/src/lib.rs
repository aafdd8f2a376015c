pub mod annotations;
pub mod config;
pub mod env;
pub mod error;

#[cfg(test)]
pub mod test_utils;
