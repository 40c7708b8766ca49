//! # Instancer
//!
//! Finds polygon objects that are copies of each other up to translation,
//! rotation and uniform scale, and replaces all but one of each set with
//! instance nodes placed so the scene looks unchanged.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math helpers
//! - [`scene`] - Host scene traits, tags and the in-memory [`scene::Scene`]
//! - [`sampler`] - Local frames and canonical point samples
//! - [`fingerprint`] - Composite mesh fingerprints
//! - [`grouper`] - Bucketing by fingerprint
//! - [`substitute`] - Instance creation and undo
//! - [`instancer`] - Run orchestration and reporting
//! - [`config`] - Run parameters
//! - [`progress`] - Progress reporting
//!
//! ## Example
//!
//! ```ignore
//! use instancer::prelude::*;
//!
//! let mut scene = Scene::load("scene.json")?;
//! let objects = scene.mesh_objects();
//! let report = Instancer::new(Config::default())?.run(&mut scene, &objects, None)?;
//! println!("{}", report);
//! ```

pub mod util;
pub mod scene;
pub mod sampler;
pub mod fingerprint;
pub mod grouper;
pub mod substitute;
pub mod instancer;
pub mod config;
pub mod progress;

// Re-export commonly used types
pub use util::{Error, Result};
pub use config::{Config, Consider};
pub use instancer::{Instancer, Report};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::config::{Config, Consider};
    pub use crate::scene::{MeshView, NodeId, SceneHost, Scene, Mesh, Tag};
    pub use crate::fingerprint::{Fingerprint, FingerprintBuilder};
    pub use crate::grouper::{EquivalenceGrouper, Groups};
    pub use crate::substitute::InstanceSubstitutor;
    pub use crate::progress::{LogProgress, ProgressSink};
    pub use crate::instancer::{Instancer, Report};
}
