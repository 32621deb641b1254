// ⚙️ Pipeline configuration - policies as data
// Loaded from JSON the same way classification rules are; every field has a default.

use crate::identifier::MAX_PRIMARY_CODE;
use crate::model::TabularSchema;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Which repair to run when the two id sets disagree (never both in one pass)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Remove geometries that have no tabular record
    #[default]
    DropOrphans,

    /// Recode geometries to tabular ids by matching the first name token
    PatchByName,
}

impl fmt::Display for RepairPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairPolicy::DropOrphans => write!(f, "drop_orphans"),
            RepairPolicy::PatchByName => write!(f, "patch_by_name"),
        }
    }
}

/// What to do when several geometries contain the same name token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// First candidate in input order wins (known limitation: may pick a neighbour)
    #[default]
    FirstMatch,

    /// Fail with AmbiguousNameMatch
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub policy: RepairPolicy,

    /// Codes above this are territories and are dropped before the join
    pub max_primary_code: u32,

    pub ambiguity: AmbiguityPolicy,

    /// Record unmatched patch targets instead of failing the run
    pub skip_unmatched_patches: bool,

    /// Metrics every merged entity must carry
    pub tracked_metrics: Vec<String>,

    pub schema: TabularSchema,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            policy: RepairPolicy::DropOrphans,
            max_primary_code: MAX_PRIMARY_CODE,
            ambiguity: AmbiguityPolicy::FirstMatch,
            skip_unmatched_patches: false,
            tracked_metrics: vec!["availability".to_string(), "usage".to_string()],
            schema: TabularSchema::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse pipeline config JSON")
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }
}
