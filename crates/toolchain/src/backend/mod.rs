//! Backend traits and implementations for fetching release artifacts.
//!
//! The primary implementation is [`http::HttpBackend`], which talks to the
//! GitHub and HashiCorp release APIs.
//!
//! # Testing
//!
//! Use [`MockBackend`] for testing without network access:
//!
//! ```
//! use toolchain::backend::{Backend, MockBackend};
//! use toolchain::types::LatestSource;
//!
//! let mock = MockBackend::new();
//! mock.set_latest("helm/helm", "v3.16.1");
//! mock.add_file("https://example.invalid/helm.tar.gz", vec![1, 2, 3]);
//!
//! let latest = mock.latest_version(&LatestSource::GitHub { repo: "helm/helm" }).unwrap();
//! assert_eq!(latest, "3.16.1");
//! ```

pub mod http;

pub use http::HttpBackend;

use crate::error::{Error, Result};
use crate::types::{LatestSource, normalize_version};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Backend trait for release lookups and downloads.
pub trait Backend: Send + Sync {
    /// Resolve the latest published version (without a leading `v`).
    fn latest_version(&self, source: &LatestSource) -> Result<String>;

    /// Download a URL into memory.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Default)]
struct MockState {
    latest: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    requests: Vec<String>,
}

/// Mock backend for testing without network access.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Set the latest tag for a GitHub repo or HashiCorp product.
    pub fn set_latest(&self, source_id: impl Into<String>, tag: impl Into<String>) {
        self.lock().latest.insert(source_id.into(), tag.into());
    }

    /// Serve `data` for `url`.
    pub fn add_file(&self, url: impl Into<String>, data: Vec<u8>) {
        self.lock().files.insert(url.into(), data);
    }

    /// URLs fetched so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }
}

impl Backend for MockBackend {
    fn latest_version(&self, source: &LatestSource) -> Result<String> {
        let id = match source {
            LatestSource::GitHub { repo } => *repo,
            LatestSource::HashiCorp { product } => *product,
        };
        self.lock()
            .latest
            .get(id)
            .map(|tag| normalize_version(tag))
            .ok_or_else(|| Error::VersionNotFound {
                tool: id.to_string(),
                version: "latest".to_string(),
            })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.requests.push(url.to_string());
        state
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http(format!("HTTP 404 for {url}"), Some(404)))
    }
}
