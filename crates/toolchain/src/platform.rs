//! Platform detection for binary downloads.
//!
//! # Example
//!
//! ```
//! use toolchain::platform;
//!
//! let platform = platform::detect().expect("unsupported platform");
//! println!("Running on: {platform}");
//! ```

use crate::error::{Error, Result};
use crate::types::Platform;

/// Detect the current platform.
///
/// | OS    | Arch    | Platform       |
/// |-------|---------|----------------|
/// | Linux | x86_64  | linux/amd64    |
/// | Linux | aarch64 | linux/arm64    |
/// | macOS | x86_64  | darwin/amd64   |
/// | macOS | aarch64 | darwin/arm64   |
pub fn detect() -> Result<Platform> {
    from_consts(std::env::consts::OS, std::env::consts::ARCH)
}

/// Map Rust's `(OS, ARCH)` constants to release-artifact naming.
pub fn from_consts(os: &str, arch: &str) -> Result<Platform> {
    let release_os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        _ => {
            return Err(Error::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };
    let release_arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => {
            return Err(Error::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
    };
    Ok(Platform::new(release_os, release_arch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_consts() {
        assert_eq!(
            from_consts("linux", "x86_64").unwrap(),
            Platform::new("linux", "amd64")
        );
        assert_eq!(
            from_consts("linux", "aarch64").unwrap(),
            Platform::new("linux", "arm64")
        );
        assert_eq!(
            from_consts("macos", "aarch64").unwrap(),
            Platform::new("darwin", "arm64")
        );
    }

    #[test]
    fn test_unsupported() {
        assert!(from_consts("windows", "x86_64").is_err());
        assert!(from_consts("linux", "riscv64").is_err());
    }
}
