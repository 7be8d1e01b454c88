//! Multi-cloud processing session.
//!
//! A [`Session`] owns one configuration and the outcome of every cloud
//! processed with it. Each cloud runs through its own pipeline, so a
//! failure on one input is recorded and never affects the others.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::params::PowerLineParameter;
use crate::types::{ExtractionResult, PipelineError, PointCloud};

/// Outcome of processing one named cloud.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Caller-supplied name (usually a file path).
    pub name: String,
    /// The extraction result or the error that stopped it.
    pub outcome: Result<ExtractionResult, PipelineError>,
}

/// Accumulates extraction results across several clouds.
#[derive(Debug, Default)]
pub struct Session {
    config: PipelineConfig,
    entries: Vec<SessionEntry>,
}

impl Session {
    /// Start an empty session.
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// The configuration every cloud is processed with.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline on `cloud` and record the outcome under `name`.
    ///
    /// Returns the recorded entry.
    pub fn process(&mut self, name: impl Into<String>, cloud: PointCloud) -> &SessionEntry {
        let name = name.into();
        let outcome = crate::extract(cloud, &self.config);
        if let Err(ref e) = outcome {
            log::warn!("{name}: {e}");
        }
        self.record(name, outcome)
    }

    /// Record an outcome produced elsewhere (e.g. a load failure).
    pub fn record(
        &mut self,
        name: impl Into<String>,
        outcome: Result<ExtractionResult, PipelineError>,
    ) -> &SessionEntry {
        let index = self.entries.len();
        self.entries.push(SessionEntry {
            name: name.into(),
            outcome,
        });
        &self.entries[index]
    }

    /// All entries in processing order.
    #[must_use]
    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// Successful results with their names.
    pub fn successes(&self) -> impl Iterator<Item = (&str, &ExtractionResult)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Ok(r) => Some((e.name.as_str(), r)),
            Err(_) => None,
        })
    }

    /// Failures with their names.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Ok(_) => None,
            Err(err) => Some((e.name.as_str(), err)),
        })
    }

    /// Every parameter record across all successful clouds, tagged with
    /// the cloud's name.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &PowerLineParameter)> {
        self.successes()
            .flat_map(|(name, r)| r.parameters.parameters.iter().map(move |p| (name, p)))
    }
}
