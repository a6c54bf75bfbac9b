//! HTTP backend for the GitHub and HashiCorp release APIs.
//!
//! # Rate Limiting
//!
//! The GitHub API allows 60 unauthenticated requests per hour. Pass a token
//! with [`HttpBackend::with_github_token`] to raise the limit.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{LatestSource, normalize_version};
use serde::Deserialize;

/// Maximum download size (Terraform zips are the largest at ~30 MB).
const MAX_BODY_SIZE: u64 = 200 * 1024 * 1024;

const USER_AGENT: &str = "hostkit-toolchain";

/// Release backend over HTTPS.
pub struct HttpBackend {
    agent: ureq::Agent,
    github_api: String,
    checkpoint_api: String,
    github_token: Option<String>,
}

impl HttpBackend {
    /// Create a new backend with the public API endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            github_api: "https://api.github.com".to_string(),
            checkpoint_api: "https://checkpoint-api.hashicorp.com".to_string(),
            github_token: None,
        }
    }

    /// Authenticate GitHub API requests.
    #[must_use]
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Override API bases (for testing against a local server).
    #[must_use]
    pub fn with_api_bases(
        mut self,
        github_api: impl Into<String>,
        checkpoint_api: impl Into<String>,
    ) -> Self {
        self.github_api = github_api.into();
        self.checkpoint_api = checkpoint_api.into();
        self
    }

    fn latest_url(&self, source: &LatestSource) -> String {
        match source {
            LatestSource::GitHub { repo } => {
                format!("{}/repos/{repo}/releases/latest", self.github_api)
            }
            LatestSource::HashiCorp { product } => {
                format!("{}/v1/check/{product}", self.checkpoint_api)
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, github: bool) -> Result<T> {
        let mut request = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");
        if github && let Some(token) = &self.github_token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        Ok(request.call()?.body_mut().read_json()?)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HttpBackend {
    fn latest_version(&self, source: &LatestSource) -> Result<String> {
        let url = self.latest_url(source);
        log::debug!("resolving latest release via {url}");
        match source {
            LatestSource::GitHub { .. } => {
                let release: GitHubRelease = self.get_json(&url, true)?;
                Ok(normalize_version(&release.tag_name))
            }
            LatestSource::HashiCorp { .. } => {
                let check: CheckpointResponse = self.get_json(&url, false)?;
                Ok(normalize_version(&check.current_version))
            }
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("downloading {url}");
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/octet-stream")
            .call()?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| Error::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

#[derive(Debug, Deserialize)]
struct CheckpointResponse {
    current_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_url_github() {
        let backend = HttpBackend::new();
        let url = backend.latest_url(&LatestSource::GitHub { repo: "helm/helm" });
        assert_eq!(url, "https://api.github.com/repos/helm/helm/releases/latest");
    }

    #[test]
    fn test_latest_url_hashicorp() {
        let backend = HttpBackend::new().with_api_bases("http://gh.test", "http://hc.test");
        let url = backend.latest_url(&LatestSource::HashiCorp {
            product: "terraform",
        });
        assert_eq!(url, "http://hc.test/v1/check/terraform");
    }

    #[test]
    fn test_empty_token_ignored() {
        let backend = HttpBackend::new().with_github_token(Some(String::new()));
        assert!(backend.github_token.is_none());
    }

    #[test]
    fn test_checkpoint_response_parse() {
        let json = r#"{"product":"terraform","current_version":"1.9.5","alerts":[]}"#;
        let check: CheckpointResponse = serde_json::from_str(json).unwrap();
        assert_eq!(check.current_version, "1.9.5");
    }
}
