//! Run configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Error, Result};

/// Highest supported rounding precision (decimal digits).
pub const MAX_PRECISION: u32 = 5;

/// Which tag data takes part in the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Consider {
    /// Material tags: material, restriction selection and parameters.
    pub materials: bool,
    /// Phong and normal tags.
    pub normals: bool,
    /// UV tags.
    pub uvs: bool,
    /// Order in which considered tags appear on the object.
    pub tag_order: bool,
    /// Polygon, point and edge selection tags.
    pub selections: bool,
    /// Tags without dedicated handling.
    pub other_tags: bool,
}

impl Default for Consider {
    fn default() -> Self {
        Self {
            materials: true,
            normals: true,
            uvs: true,
            tag_order: true,
            selections: true,
            other_tags: true,
        }
    }
}

impl Consider {
    /// Geometry only, all tags ignored.
    pub fn nothing() -> Self {
        Self {
            materials: false,
            normals: false,
            uvs: false,
            tag_order: false,
            selections: false,
            other_tags: false,
        }
    }
}

/// Parameters of one instancing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decimal digits kept when comparing frame-local coordinates (0-5).
    pub precision: u32,
    /// Points sampled per object.
    pub samples: usize,
    /// Seed of the sampling generator.
    pub seed: u64,
    /// Suppress progress reporting.
    pub blind: bool,
    pub consider: Consider,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precision: 3,
            samples: 100,
            seed: 12345,
            blind: false,
            consider: Consider::default(),
        }
    }
}

impl Config {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.precision > MAX_PRECISION {
            return Err(Error::invalid(format!(
                "precision {} out of range 0-{}",
                self.precision, MAX_PRECISION
            )));
        }
        Ok(())
    }

    /// Parse and validate JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.precision, 3);
        assert_eq!(c.samples, 100);
        assert_eq!(c.seed, 12345);
        assert!(!c.blind);
        assert!(c.consider.materials && c.consider.uvs && c.consider.tag_order);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let c = Config::from_json(r#"{ "precision": 2, "consider": { "uvs": false } }"#).unwrap();
        assert_eq!(c.precision, 2);
        assert_eq!(c.samples, 100);
        assert!(!c.consider.uvs);
        assert!(c.consider.materials);
    }

    #[test]
    fn test_precision_out_of_range() {
        let err = Config::from_json(r#"{ "precision": 6 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(Config::from_json("{ nope"), Err(Error::Json(_))));
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            precision: 1,
            seed: 7,
            consider: Consider::nothing(),
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
