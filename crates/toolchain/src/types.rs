//! Core types for release binary management.
//!
//! This module contains the tool definitions, their release layout
//! (where "latest" is resolved, how artifacts and checksums are named),
//! platform information, and installation results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Supported standalone tools.
///
/// # Example
///
/// ```
/// use toolchain::Tool;
///
/// let tool = Tool::Helm;
/// assert_eq!(tool.name(), "helm");
/// assert_eq!(tool.binary_name(), "helm");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// HashiCorp Terraform.
    Terraform,
    /// Helm, the Kubernetes package manager.
    Helm,
    /// SOPS secrets editor.
    Sops,
}

impl Tool {
    /// Get the tool name as a string.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Helm => "helm",
            Self::Sops => "sops",
        }
    }

    /// Get the binary name for this tool.
    #[must_use]
    pub fn binary_name(&self) -> &'static str {
        self.name()
    }

    /// Where the `latest` alias is resolved.
    #[must_use]
    pub fn latest_source(&self) -> LatestSource {
        match self {
            Self::Terraform => LatestSource::HashiCorp {
                product: "terraform",
            },
            Self::Helm => LatestSource::GitHub { repo: "helm/helm" },
            Self::Sops => LatestSource::GitHub {
                repo: "getsops/sops",
            },
        }
    }

    /// Artifact URL template. Placeholders: `{version}`, `{os}`, `{arch}`.
    #[must_use]
    pub fn artifact_template(&self) -> &'static str {
        match self {
            Self::Terraform => {
                "https://releases.hashicorp.com/terraform/{version}/terraform_{version}_{os}_{arch}.zip"
            }
            Self::Helm => "https://get.helm.sh/helm-v{version}-{os}-{arch}.tar.gz",
            Self::Sops => {
                "https://github.com/getsops/sops/releases/download/v{version}/sops-v{version}.{os}.{arch}"
            }
        }
    }

    /// Checksum manifest URL template.
    #[must_use]
    pub fn checksum_template(&self) -> &'static str {
        match self {
            Self::Terraform => {
                "https://releases.hashicorp.com/terraform/{version}/terraform_{version}_SHA256SUMS"
            }
            Self::Helm => "https://get.helm.sh/helm-v{version}-{os}-{arch}.tar.gz.sha256sum",
            Self::Sops => {
                "https://github.com/getsops/sops/releases/download/v{version}/sops-v{version}.checksums.txt"
            }
        }
    }

    /// How the binary is packaged inside the artifact.
    #[must_use]
    pub fn archive(&self) -> ArchiveKind {
        match self {
            Self::Terraform => ArchiveKind::Zip {
                member: "terraform",
            },
            Self::Helm => ArchiveKind::TarGz {
                member: "{os}-{arch}/helm",
            },
            Self::Sops => ArchiveKind::Raw,
        }
    }

    /// Arguments that make the binary print its version.
    #[must_use]
    pub fn version_args(&self) -> &'static [&'static str] {
        match self {
            Self::Terraform => &["version"],
            Self::Helm => &["version", "--short"],
            Self::Sops => &["--version"],
        }
    }

    /// Get all supported tools.
    #[must_use]
    pub fn all() -> &'static [Tool] {
        &[Tool::Terraform, Tool::Helm, Tool::Sops]
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Upstream API that answers "what is the latest release".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestSource {
    /// GitHub `releases/latest` for `owner/repo`.
    GitHub {
        /// Repository in "owner/repo" form.
        repo: &'static str,
    },
    /// HashiCorp checkpoint API.
    HashiCorp {
        /// Product name.
        product: &'static str,
    },
}

/// Packaging of the binary inside a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// The artifact is the binary itself.
    Raw,
    /// Gzipped tarball; `member` is a path template inside it.
    TarGz {
        /// Member path template.
        member: &'static str,
    },
    /// Zip archive; `member` is a path template inside it.
    Zip {
        /// Member path template.
        member: &'static str,
    },
}

/// Platform information for binary selection.
///
/// Uses the naming convention shared by Go-built release artifacts
/// (`linux`/`darwin`, `amd64`/`arm64`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (e.g., "linux").
    pub os: String,
    /// Architecture (e.g., "amd64").
    pub arch: String,
}

impl Platform {
    /// Create a new platform.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Fill `{version}`, `{os}` and `{arch}` placeholders.
    #[must_use]
    pub fn render(&self, template: &str, version: &str) -> String {
        template
            .replace("{version}", version)
            .replace("{os}", &self.os)
            .replace("{arch}", &self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Options for installing a tool.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Directory the binary is installed into.
    pub install_dir: PathBuf,
    /// Platform override (defaults to the detected host platform).
    pub platform: Option<Platform>,
}

impl InstallOptions {
    /// Create options installing into `install_dir`.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            platform: None,
        }
    }

    /// Override the target platform.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }
}

/// Result of a tool installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    /// The tool that was installed.
    pub tool: Tool,
    /// The installed version, without a leading `v`.
    pub version: String,
    /// Path to the installed binary.
    pub path: PathBuf,
    /// SHA-256 of the installed binary.
    pub sha256: String,
    /// Whether an existing binary was replaced.
    pub was_upgrade: bool,
}

/// Strip a leading `v` from a release tag.
#[must_use]
pub fn normalize_version(tag: &str) -> String {
    tag.trim().trim_start_matches('v').to_string()
}

/// Extract a version number from a tool's `--version` style output.
///
/// Handles `Terraform v1.9.5`, `v3.16.1+g5a5449d` and `sops 3.9.0 (latest)`.
#[must_use]
pub fn parse_version_output(output: &str) -> Option<String> {
    output.split_whitespace().find_map(|token| {
        let token = token.trim_start_matches('v');
        let token = token.split('+').next().unwrap_or(token);
        let looks_like_version = token.chars().next().is_some_and(|c| c.is_ascii_digit())
            && token.contains('.')
            && token.chars().all(|c| c.is_ascii_digit() || c == '.');
        looks_like_version.then(|| token.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names() {
        assert_eq!(Tool::Terraform.name(), "terraform");
        assert_eq!(Tool::Sops.to_string(), "sops");
        assert_eq!(Tool::all().len(), 3);
    }

    #[test]
    fn test_platform_render() {
        let platform = Platform::new("linux", "arm64");
        let url = platform.render(Tool::Helm.artifact_template(), "3.16.1");
        assert_eq!(url, "https://get.helm.sh/helm-v3.16.1-linux-arm64.tar.gz");

        let url = platform.render(Tool::Terraform.artifact_template(), "1.9.5");
        assert_eq!(
            url,
            "https://releases.hashicorp.com/terraform/1.9.5/terraform_1.9.5_linux_arm64.zip"
        );
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("v3.9.0"), "3.9.0");
        assert_eq!(normalize_version("1.9.5"), "1.9.5");
    }

    #[test]
    fn test_parse_version_output() {
        assert_eq!(
            parse_version_output("Terraform v1.9.5\non linux_amd64\n"),
            Some("1.9.5".to_string())
        );
        assert_eq!(
            parse_version_output("v3.16.1+g5a5449d"),
            Some("3.16.1".to_string())
        );
        assert_eq!(
            parse_version_output("sops 3.9.0 (latest)"),
            Some("3.9.0".to_string())
        );
        assert_eq!(parse_version_output("command not found"), None);
    }

    #[test]
    fn test_tool_serde() {
        let json = serde_json::to_string(&Tool::Terraform).unwrap();
        assert_eq!(json, "\"terraform\"");
    }
}
