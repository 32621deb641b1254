// 🚰 Pipeline - one reconcile + merge run per view load
//
// The output is owned by the caller and discarded on reload; nothing is kept
// between runs.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::merge::merge;
use crate::model::{GeoEntity, MergedEntity, MetricRecord};
use crate::reconciliation::{Reconciler, ReconciliationReport};
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub merged: Vec<MergedEntity>,
    pub report: ReconciliationReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Reconcile `geo` against `records`, then merge
    pub fn run(
        &self,
        geo: Vec<GeoEntity>,
        records: &[MetricRecord],
    ) -> Result<PipelineOutput, PipelineError> {
        let reconciler = Reconciler::from_config(&self.config);
        let reconciliation = reconciler.reconcile(geo, records)?;

        let merged = merge(&reconciliation.entities, records, &self.config.tracked_metrics)?;
        info!(
            merged = merged.len(),
            policy = %self.config.policy,
            "pipeline run complete"
        );

        Ok(PipelineOutput {
            merged,
            report: reconciliation.report,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
