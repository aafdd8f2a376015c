/// Retrieves the platform string in the format `ARCH-Os`.
///
/// This function combines the architecture (e.g., `x86_64`) and the operating
/// system (e.g., `Linux`) into a single string to identify the platform.
pub fn platform() -> String {
    format!(
        "{}-{}{}",
        std::env::consts::ARCH,
        &std::env::consts::OS[..1].to_uppercase(),
        &std::env::consts::OS[1..]
    )
}

/// Name of the operating system family this binary was built for.
pub fn os_family() -> &'static str {
    std::env::consts::OS
}

pub fn is_linux() -> bool {
    os_family() == "linux"
}

/// Whether the current process runs with an effective uid of root.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
