//! Error types for the instancer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for instancing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Object has no polygon to derive a local frame from
    #[error("Object {0} has no polygons")]
    NoGeometry(String),

    /// First polygon does not span a plane (coincident or collinear points)
    #[error("Object {0} has a degenerate first polygon")]
    DegenerateFrame(String),

    /// Polygon references a point that does not exist
    #[error("Object {name}: polygon index {index} out of bounds (points: {count})")]
    InvalidPolygon { name: String, index: u32, count: usize },

    /// Node id does not resolve to a live object
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Object exists but carries no mesh data
    #[error("Object {0} is not a polygon object")]
    NotAMesh(String),

    /// The host could not create an instance node
    #[error("Failed to create an instance object: {0}")]
    InstanceCreation(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors that only disqualify a single object from grouping.
    pub fn is_per_object(&self) -> bool {
        matches!(
            self,
            Self::NoGeometry(_)
                | Self::DegenerateFrame(_)
                | Self::InvalidPolygon { .. }
                | Self::NotAMesh(_)
        )
    }
}

/// Result type alias for instancing operations.
pub type Result<T> = std::result::Result<T, Error>;
