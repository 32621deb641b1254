// ⚠️ Error taxonomy for the reconciliation pipeline
//
// Identifier and metric errors are data errors; InvariantViolation is a
// defect in the join and always aborts the run.

use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw identifier could not be turned into a canonical county code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier '{raw}' is not a numeric code")]
    Malformed { raw: String },

    #[error("identifier '{raw}' does not fit in {width} digits")]
    TooWide { raw: String, width: usize },

    /// Above the primary-entity range (territories are out of analytic scope)
    #[error("code {code} is a territory code, not a primary entity")]
    Territory { code: u32 },
}

impl IdentifierError {
    pub fn is_territory(&self) -> bool {
        matches!(self, IdentifierError::Territory { .. })
    }
}

/// Name-based repair could not find a geometry for a tabular id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    #[error("no geometry name contains '{token}' (tabular id {id})")]
    NoNameMatch { id: Identifier, token: String },

    #[error("{} geometries contain '{token}' (tabular id {id}): {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousNameMatch {
        id: Identifier,
        token: String,
        candidates: Vec<String>,
    },
}

/// A metric cell held something other than a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("field '{field}': cannot parse '{raw_value}' as a number")]
pub struct MetricParseError {
    pub field: String,
    pub raw_value: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("reconciliation failed: {0}")]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    MetricParse(#[from] MetricParseError),

    /// Merge-time lookup failed after reconciliation.
    #[error("invariant violation: no tabular record for reconciled id {missing_id}")]
    InvariantViolation { missing_id: String },

    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
}
