//! Version pins
//!
//! A pin is a named string the strategies consult when choosing what to
//! install: a release version, a runtime version, or the Python target.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, Result};

pub const LATEST: &str = "latest";

static SEMVER_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?\d+(\.\d+){0,3}$").expect("SEMVER_LIKE is a valid pattern"));

static PYENV_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?t?$").expect("PYENV_NUMERIC is a valid pattern"));

static PYENV_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(pypy|pypy2|pypy3|miniforge3|miniconda3|anaconda3|mambaforge|graalpy|micropython|stackless|jython|ironpython)[\w.\-]*$")
        .expect("PYENV_NAMED is a valid pattern")
});

static PYTHON_MINOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^3\.\d{1,2}$").expect("PYTHON_MINOR is a valid pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pin {
    TerraformVersion,
    HelmVersion,
    SopsVersion,
    NodeVersion,
    PyenvVersion,
    PythonTarget,
}

impl Pin {
    pub const ALL: [Pin; 6] = [
        Pin::TerraformVersion,
        Pin::HelmVersion,
        Pin::SopsVersion,
        Pin::NodeVersion,
        Pin::PyenvVersion,
        Pin::PythonTarget,
    ];

    /// Persisted name, e.g. `TERRAFORM_VERSION`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TerraformVersion => "TERRAFORM_VERSION",
            Self::HelmVersion => "HELM_VERSION",
            Self::SopsVersion => "SOPS_VERSION",
            Self::NodeVersion => "NODE_VERSION",
            Self::PyenvVersion => "PYENV_VERSION",
            Self::PythonTarget => "PYTHON_TARGET",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            Self::PythonTarget => "system",
            _ => LATEST,
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::PyenvVersion => "latest, X.Y, X.Y.Z (optional t suffix) or a named build like pypy3.10-7.3.17",
            Self::PythonTarget => "system, pyenv, or 3.N for a deadsnakes build",
            _ => "latest or a version like 1.9.5 (leading v allowed)",
        }
    }

    /// Validate a value and return its canonical form.
    pub fn validate(&self, value: &str) -> Result<String> {
        let value = value.trim();
        let valid = match self {
            Self::PythonTarget => {
                value == "system" || value == "pyenv" || PYTHON_MINOR.is_match(value)
            }
            Self::PyenvVersion => {
                value == LATEST || PYENV_NUMERIC.is_match(value) || PYENV_NAMED.is_match(value)
            }
            _ => value == LATEST || SEMVER_LIKE.is_match(value),
        };
        if valid {
            Ok(value.to_string())
        } else {
            Err(Error::InvalidPin {
                pin: self.name().to_string(),
                value: value.to_string(),
                reason: format!("expected {}", self.help()),
            })
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|pin| pin.name() == upper)
            .ok_or_else(|| Error::UnknownPin(s.to_string()))
    }
}

/// The full set of pins; unset pins read as their default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionPins(BTreeMap<Pin, String>);

impl VersionPins {
    /// Every pin at its default value.
    pub fn defaults() -> Self {
        Self(
            Pin::ALL
                .into_iter()
                .map(|pin| (pin, pin.default_value().to_string()))
                .collect(),
        )
    }

    pub fn get(&self, pin: Pin) -> &str {
        self.0
            .get(&pin)
            .map_or_else(|| pin.default_value(), String::as_str)
    }

    /// Validate and store a value.
    pub fn set(&mut self, pin: Pin, value: &str) -> Result<()> {
        let value = pin.validate(value)?;
        self.0.insert(pin, value);
        Ok(())
    }

    /// Set a value, keeping the current one when it does not validate.
    ///
    /// Returns the warning text when the value was rejected.
    pub fn set_or_warn(&mut self, pin: Pin, value: &str) -> Option<String> {
        match self.set(pin, value) {
            Ok(()) => None,
            Err(e) => {
                let warning = format!("{e}; keeping {}", self.get(pin));
                log::warn!("{warning}");
                Some(warning)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pin, &str)> {
        Pin::ALL.into_iter().map(|pin| (pin, self.get(pin)))
    }
}
