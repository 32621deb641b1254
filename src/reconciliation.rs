// ⚖️ Reconciliation Engine - align geometry ids with tabular ids
//
// Territories are dropped first (out of analytic scope), then exactly one
// repair policy runs:
//   drop_orphans   geometries without a tabular record are removed
//   patch_by_name  tabular ids missing from the geometry are patched onto the
//                  orphan geometry whose name contains the record's first word
//
// Without this step the merge cannot be total: every geometry handed to the
// merger must have a tabular record with the same normalized id.

use crate::config::{AmbiguityPolicy, PipelineConfig, RepairPolicy};
use crate::error::{IdentifierError, ReconciliationError};
use crate::identifier::{normalize_with_limit, Identifier, MAX_PRIMARY_CODE};
use crate::model::{GeoEntity, MetricRecord};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// One name-based recode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    pub from: Identifier,
    pub to: Identifier,
    pub token: String,
    pub geo_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub policy: RepairPolicy,
    pub input_count: usize,
    pub output_count: usize,

    /// Raw codes above the primary range
    pub territories_dropped: Vec<u32>,

    /// Raw ids that could not be normalized at all
    pub malformed_dropped: Vec<String>,

    /// Geometries removed for lack of metrics (drop_orphans)
    pub orphans_dropped: Vec<Identifier>,

    pub patches: Vec<Patch>,

    /// Tabular ids with no patch target, skipped on request (patch_by_name)
    pub unpatched: Vec<Identifier>,

    /// Geometries still without a tabular record after patching
    pub unmatched_geo: Vec<Identifier>,

    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    /// Geometry and tabular id sets line up exactly
    pub fn is_aligned(&self) -> bool {
        self.unmatched_geo.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation ({}): {} → {} geometries, {} territories, {} malformed, {} orphans dropped, {} patched, {} unpatched, {} unmatched",
            self.policy,
            self.input_count,
            self.output_count,
            self.territories_dropped.len(),
            self.malformed_dropped.len(),
            self.orphans_dropped.len(),
            self.patches.len(),
            self.unpatched.len(),
            self.unmatched_geo.len()
        )
    }
}

/// Repaired geometries plus what was done to them
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub entities: Vec<GeoEntity>,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    pub policy: RepairPolicy,

    /// Codes above this are territories (default: 59999)
    pub max_primary_code: u32,

    pub ambiguity: AmbiguityPolicy,

    /// Record patch targets that cannot be found instead of failing
    pub skip_unmatched_patches: bool,
}

impl Reconciler {
    pub fn new(policy: RepairPolicy) -> Self {
        Reconciler {
            policy,
            max_primary_code: MAX_PRIMARY_CODE,
            ambiguity: AmbiguityPolicy::FirstMatch,
            skip_unmatched_patches: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Reconciler {
            policy: config.policy,
            max_primary_code: config.max_primary_code,
            ambiguity: config.ambiguity,
            skip_unmatched_patches: config.skip_unmatched_patches,
        }
    }

    /// Align `geo` with `tabular`
    ///
    /// Surviving geometries keep their input order.
    pub fn reconcile(
        &self,
        geo: Vec<GeoEntity>,
        tabular: &[MetricRecord],
    ) -> Result<Reconciliation, ReconciliationError> {
        let input_count = geo.len();
        let mut report = ReconciliationReport {
            policy: self.policy,
            input_count,
            output_count: 0,
            territories_dropped: Vec::new(),
            malformed_dropped: Vec::new(),
            orphans_dropped: Vec::new(),
            patches: Vec::new(),
            unpatched: Vec::new(),
            unmatched_geo: Vec::new(),
            reconciled_at: chrono::Utc::now(),
        };

        // 1. Territories and unjoinable ids
        let mut kept: Vec<(Identifier, GeoEntity)> = Vec::with_capacity(geo.len());
        for entity in geo {
            match normalize_with_limit(&entity.id, self.max_primary_code) {
                Ok(id) => kept.push((id, entity)),
                Err(IdentifierError::Territory { code }) => {
                    debug!(code, "dropping territory geometry");
                    report.territories_dropped.push(code);
                }
                Err(err) => {
                    debug!(id = %entity.id, %err, "dropping geometry with malformed id");
                    report.malformed_dropped.push(entity.id.to_string());
                }
            }
        }

        // 2. Id sets on both sides
        let tabular_ids: HashSet<Identifier> = tabular.iter().map(|r| r.id).collect();

        // 3. Exactly one repair
        let entities = match self.policy {
            RepairPolicy::DropOrphans => self.drop_orphans(kept, &tabular_ids, &mut report),
            RepairPolicy::PatchByName => {
                self.patch_by_name(kept, tabular, &tabular_ids, &mut report)?
            }
        };

        report.output_count = entities.len();
        info!("{}", report.summary());

        Ok(Reconciliation { entities, report })
    }

    fn drop_orphans(
        &self,
        kept: Vec<(Identifier, GeoEntity)>,
        tabular_ids: &HashSet<Identifier>,
        report: &mut ReconciliationReport,
    ) -> Vec<GeoEntity> {
        kept.into_iter()
            .filter_map(|(id, entity)| {
                if tabular_ids.contains(&id) {
                    Some(entity)
                } else {
                    debug!(%id, "dropping geometry without metrics");
                    report.orphans_dropped.push(id);
                    None
                }
            })
            .collect()
    }

    fn patch_by_name(
        &self,
        mut kept: Vec<(Identifier, GeoEntity)>,
        tabular: &[MetricRecord],
        tabular_ids: &HashSet<Identifier>,
        report: &mut ReconciliationReport,
    ) -> Result<Vec<GeoEntity>, ReconciliationError> {
        let mut geo_ids: HashSet<Identifier> = kept.iter().map(|(id, _)| *id).collect();

        for record in tabular {
            if geo_ids.contains(&record.id) {
                continue;
            }

            let token = record.name_token();

            // Candidates: geometries whose id has no tabular record yet.
            // A patched geometry carries a tabular id, so it drops out here.
            let candidates: Vec<usize> = kept
                .iter()
                .enumerate()
                .filter(|(_, (id, entity))| {
                    !token.is_empty() && !tabular_ids.contains(id) && entity.name().contains(token)
                })
                .map(|(idx, _)| idx)
                .collect();

            let target = match candidates.as_slice() {
                [] => {
                    if self.skip_unmatched_patches {
                        debug!(id = %record.id, token, "no patch target, skipping");
                        report.unpatched.push(record.id);
                        continue;
                    }
                    return Err(ReconciliationError::NoNameMatch {
                        id: record.id,
                        token: token.to_string(),
                    });
                }
                [only] => *only,
                [first, ..] => match self.ambiguity {
                    AmbiguityPolicy::FirstMatch => *first,
                    AmbiguityPolicy::Reject => {
                        return Err(ReconciliationError::AmbiguousNameMatch {
                            id: record.id,
                            token: token.to_string(),
                            candidates: candidates
                                .iter()
                                .map(|idx| format!("{} ({})", kept[*idx].1.name(), kept[*idx].0))
                                .collect(),
                        });
                    }
                },
            };

            let (id, entity) = &mut kept[target];
            debug!(from = %id, to = %record.id, token, "patching geometry id by name");
            report.patches.push(Patch {
                from: *id,
                to: record.id,
                token: token.to_string(),
                geo_name: entity.name().to_string(),
            });

            entity.assign_id(record.id);
            *id = record.id;
            geo_ids.insert(record.id);
        }

        report.unmatched_geo = kept
            .iter()
            .filter(|(id, _)| !tabular_ids.contains(id))
            .map(|(id, _)| *id)
            .collect();

        Ok(kept.into_iter().map(|(_, entity)| entity).collect())
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(RepairPolicy::DropOrphans)
    }
}

// ============================================================================
// TESTS
// ============================================================================
