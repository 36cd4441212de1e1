//! # Run Configuration
//!
//! Optional `kernnetz.toml` with defaults for `resolve`:
//!
//! ```toml
//! [resolution]
//! min_confidence = 0.9
//! dividing_longitude = 13.4
//! resolve_standalone_unified = true
//!
//! [populate]
//! failure_policy = "abort"
//! ```
//!
//! Command-line flags override file values.

use kernnetz_core::primitives::DEFAULT_MIN_CONFIDENCE;
use kernnetz_core::{FailurePolicy, KernnetzError, ResolverConfig};
use serde::Deserialize;
use std::path::Path;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "kernnetz.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionSection {
    pub min_confidence: f64,
    pub dividing_longitude: f64,
    pub resolve_standalone_unified: bool,
}

impl Default for ResolutionSection {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            dividing_longitude: resolver.dividing_longitude,
            resolve_standalone_unified: resolver.resolve_standalone_unified,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulateSection {
    pub failure_policy: FailurePolicy,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub resolution: ResolutionSection,
    pub populate: PopulateSection,
}

impl Config {
    /// Parse configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, KernnetzError> {
        let config: Self =
            toml::from_str(text).map_err(|e| KernnetzError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `kernnetz.toml` when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, KernnetzError> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            KernnetzError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), KernnetzError> {
        let min = self.resolution.min_confidence;
        if !(0.0..=1.0).contains(&min) {
            return Err(KernnetzError::ConfigError(format!(
                "resolution.min_confidence {min} outside [0, 1]"
            )));
        }
        let lon = self.resolution.dividing_longitude;
        if !(-180.0..=180.0).contains(&lon) {
            return Err(KernnetzError::ConfigError(format!(
                "resolution.dividing_longitude {lon} is not a longitude"
            )));
        }
        Ok(())
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            dividing_longitude: self.resolution.dividing_longitude,
            resolve_standalone_unified: self.resolution.resolve_standalone_unified,
        }
    }
}
