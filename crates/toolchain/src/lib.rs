//! # toolchain
//!
//! Install standalone release binaries with checksum verification.
//!
//! This crate provides functionality for:
//! - Resolving the `latest` alias via upstream release APIs
//! - Downloading the artifact for the detected OS/architecture
//! - Verifying it against the published SHA-256 manifest
//! - Extracting it (raw, tar.gz, zip) and installing it with mode 0755
//!
//! ## Example
//!
//! ```no_run
//! use toolchain::{Client, InstallOptions, Tool};
//!
//! let client = Client::new();
//! let version = client.resolve_version(Tool::Helm, "latest").unwrap();
//! let result = client
//!     .install(Tool::Helm, &version, &InstallOptions::new("/usr/local/bin"))
//!     .expect("installation failed");
//!
//! println!("Installed {} {} to {}", result.tool, result.version, result.path.display());
//! ```
//!
//! ## Supported Tools
//!
//! | Tool      | Latest from                 | Checksums               |
//! |-----------|-----------------------------|-------------------------|
//! | Terraform | checkpoint-api.hashicorp.com| `_SHA256SUMS` manifest  |
//! | Helm      | github.com/helm/helm        | `.sha256sum` sidecar    |
//! | SOPS      | github.com/getsops/sops     | `.checksums.txt`        |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod checksum;
pub mod error;
pub mod install;
pub mod platform;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{InstallOptions, InstallResult, Platform, Tool};

use backend::Backend;
pub use backend::{HttpBackend, MockBackend};
use std::fs;
use std::path::Path;

/// High-level client for release binary operations.
pub struct Client {
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a new Client with the default HTTP backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Box::new(HttpBackend::new()),
        }
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Resolve a requested version; `latest` asks the upstream release API.
    pub fn resolve_version(&self, tool: Tool, requested: &str) -> Result<String> {
        if requested == "latest" {
            let version = self.backend.latest_version(&tool.latest_source())?;
            log::info!("{tool}: latest is {version}");
            Ok(version)
        } else {
            Ok(types::normalize_version(requested))
        }
    }

    /// Download, verify and install an exact version of a tool.
    ///
    /// A checksum mismatch aborts before anything touches the install
    /// directory.
    pub fn install(
        &self,
        tool: Tool,
        version: &str,
        options: &InstallOptions,
    ) -> Result<InstallResult> {
        let platform = match &options.platform {
            Some(p) => p.clone(),
            None => platform::detect()?,
        };

        let artifact_url = platform.render(tool.artifact_template(), version);
        let checksum_url = platform.render(tool.checksum_template(), version);
        let file_name = artifact_url
            .rsplit('/')
            .next()
            .unwrap_or(&artifact_url)
            .to_string();

        let artifact = self.backend.fetch(&artifact_url).map_err(|e| match e {
            Error::HttpError {
                status: Some(404), ..
            } => Error::VersionNotFound {
                tool: tool.to_string(),
                version: version.to_string(),
            },
            other => other,
        })?;
        let manifest_bytes = self.backend.fetch(&checksum_url)?;
        let manifest = String::from_utf8_lossy(&manifest_bytes);
        checksum::verify(&artifact, &manifest, &file_name, &checksum_url)?;
        log::debug!("{tool}: {file_name} matches {checksum_url}");

        let binary = install::extract(&artifact, tool.archive(), &platform, version)?;
        let target = options.install_dir.join(tool.binary_name());
        let was_upgrade = target.exists();
        let path = install::write_executable(&options.install_dir, tool.binary_name(), &binary)?;

        Ok(InstallResult {
            tool,
            version: version.to_string(),
            path,
            sha256: checksum::sha256_hex(&binary),
            was_upgrade,
        })
    }

    /// Download an arbitrary URL through the configured backend.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.backend.fetch(url)
    }

    /// Delete an installed binary. Returns whether a file was removed.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// SHA-256 of a file on disk, `None` if it does not exist.
    pub fn file_digest(&self, path: &Path) -> Result<Option<String>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(checksum::sha256_hex(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
