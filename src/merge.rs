// 🔗 Merger - project tabular metrics onto reconciled geometries

use crate::error::PipelineError;
use crate::identifier::{normalize_with_limit, Identifier, MAX_CODE};
use crate::model::{GeoEntity, MergedEntity, MetricRecord};
use std::collections::HashMap;
use tracing::warn;

/// Merge reconciled geometries with their tabular records
///
/// Every geometry must have a record; a missing one means reconciliation was
/// skipped or broken and aborts with `InvariantViolation`. Tracked metrics
/// whose cell was blank are coerced to 0.0 so every entity carries them.
pub fn merge(
    geo: &[GeoEntity],
    tabular: &[MetricRecord],
    tracked: &[String],
) -> Result<Vec<MergedEntity>, PipelineError> {
    let by_id: HashMap<Identifier, &MetricRecord> = tabular.iter().map(|r| (r.id, r)).collect();

    geo.iter()
        .map(|entity| {
            // Reconciled ids are already primary; only the width check matters here
            let id = normalize_with_limit(&entity.id, MAX_CODE).map_err(|_| {
                PipelineError::InvariantViolation {
                    missing_id: entity.id.to_string(),
                }
            })?;

            let record = by_id.get(&id).ok_or_else(|| PipelineError::InvariantViolation {
                missing_id: id.to_string(),
            })?;

            let mut metrics = record.metrics.clone();
            for field in tracked {
                metrics.entry(field.clone()).or_insert_with(|| {
                    warn!(%id, field = field.as_str(), "blank tracked metric coerced to 0");
                    0.0
                });
            }

            Ok(MergedEntity {
                id,
                geometry: entity.geometry.clone(),
                name: record.name.clone(),
                state: record.state.clone(),
                metrics,
            })
        })
        .collect()
}
