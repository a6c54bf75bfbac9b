//! # aptkit
//!
//! A small Rust boundary over the Debian/Ubuntu native package manager.
//!
//! This crate provides:
//! - Index refresh, candidate checks, and presence queries
//! - Set-based install and remove transactions
//! - Orphan dependency cleanup (`autoremove`)
//! - Error categorization with retry for lock contention and mirror failures
//!
//! Output parsing is deliberately limited to presence/absence checks; the
//! exit status of apt-get is the only success signal.
//!
//! ## Example
//!
//! ```no_run
//! use aptkit::backend::{Backend, detect};
//!
//! let apt = detect();
//! let wanted = vec!["curl".to_string(), "jq".to_string()];
//!
//! apt.refresh_index().unwrap();
//! let filter = apt.filter_installable(&wanted).unwrap();
//! apt.install(&filter.installable).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod retry;
pub mod types;

pub use backend::{AptBackend, Backend, MockBackend};
pub use error::{Error, ErrorCategory, Result};
pub use types::{CandidateFilter, InstalledPackage, RetryConfig};
