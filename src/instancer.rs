//! One instancing run: group, substitute, report.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::fingerprint::FingerprintBuilder;
use crate::grouper::{EquivalenceGrouper, Groups};
use crate::progress::{Progress, ProgressSink};
use crate::scene::{NodeId, SceneHost};
use crate::substitute::{InstanceRecord, InstanceSubstitutor};
use crate::util::Result;

/// Outcome of a run.
#[derive(Clone, Debug, Default)]
pub struct Report {
    /// Objects replaced by instances.
    pub substituted: usize,
    /// Distinct objects handed in.
    pub total: usize,
    /// Objects that could not be fingerprinted.
    pub unresolved: Vec<NodeId>,
    /// Distinct fingerprints among resolved objects.
    pub groups: usize,
    pub records: Vec<InstanceRecord>,
    pub elapsed: Duration,
}

impl Report {
    /// Objects left after replacement.
    pub fn remaining(&self) -> usize {
        self.total - self.substituted
    }

    /// Replacements per second, 0 for an instant run.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.substituted as f64 / secs } else { 0.0 }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Replaced {} objects with instances in {:.3} seconds ({:.1} objects / second). Remaining objects: {}",
            self.substituted,
            self.elapsed.as_secs_f64(),
            self.rate(),
            self.remaining()
        )
    }
}

/// Entry point for instancing a set of objects.
#[derive(Clone, Debug, Default)]
pub struct Instancer {
    config: Config,
}

impl Instancer {
    /// Validates `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn grouper(&self) -> EquivalenceGrouper {
        EquivalenceGrouper::new(FingerprintBuilder::new(&self.config))
    }

    /// Group `objects` without touching the scene.
    pub fn find_groups<S: SceneHost + ?Sized>(&self, scene: &S, objects: &[NodeId]) -> Result<Groups> {
        self.grouper().group(scene, objects, &mut Progress::none())
    }

    /// Replace duplicates among `objects` with instances.
    ///
    /// `sink` receives 0-100% progress unless the configuration is blind.
    pub fn run<S: SceneHost + ?Sized>(
        &self,
        scene: &mut S,
        objects: &[NodeId],
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<Report> {
        let start = Instant::now();
        let sink = if self.config.blind { None } else { sink };
        let mut progress = Progress::new(sink);

        let groups = self.grouper().group(&*scene, objects, &mut progress)?;
        debug!(
            "{} groups, {} duplicates, {} unresolved",
            groups.len(),
            groups.duplicate_count(),
            groups.unresolved().len()
        );
        let records = InstanceSubstitutor::new().run(scene, &groups, &mut progress)?;

        let report = Report {
            substituted: records.len(),
            total: groups.resolved_count() + groups.unresolved().len(),
            unresolved: groups.unresolved().to_vec(),
            groups: groups.len(),
            records,
            elapsed: start.elapsed(),
        };
        if report.substituted > 0 {
            info!("{}", report);
        }
        Ok(report)
    }
}
