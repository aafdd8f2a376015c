use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DistroError {
    #[error("OS {0} is not supported")]
    #[diagnostic(
        code(dv_updater_distro::unsupported_os),
        help("dv-updater only runs on Linux hosts")
    )]
    UnsupportedOs(String),
}

pub type DistroResult<T> = std::result::Result<T, DistroError>;
