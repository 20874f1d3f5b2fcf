//! Version information.

/// Get the version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Version line with the target the binary was built for.
#[must_use]
pub fn full_version() -> String {
    format!(
        "skyreduce {} ({}-{})",
        version(),
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_not_empty() {
        assert!(!version().is_empty());
        assert!(full_version().starts_with("skyreduce "));
    }
}
