// Broadband Reconciliation - Core Library
// Joins county geometries with broadband metrics and answers the map queries.
// Used by the CLI, the API server, and tests.

pub mod identifier;
pub mod error;
pub mod model;
pub mod config;
pub mod reconciliation;
pub mod merge;
pub mod aggregate;
pub mod classify;
pub mod ranking;
pub mod pipeline;
pub mod sources;

// Re-export commonly used types
pub use identifier::{
    normalize, normalize_with_limit, Identifier, RawId,
    IDENTIFIER_WIDTH, MAX_PRIMARY_CODE,
};
pub use error::{
    IdentifierError, MetricParseError, PipelineError, ReconciliationError,
};
pub use model::{
    GeoEntity, Geometry, GroupStats, MergedEntity, MetricRecord, Selection, TabularSchema,
};
pub use config::{AmbiguityPolicy, PipelineConfig, RepairPolicy};
pub use reconciliation::{
    Patch, Reconciler, Reconciliation, ReconciliationReport,
};
pub use merge::merge;
pub use aggregate::{aggregate, compare_with_reference, GroupDeviation, ALL_GROUP};
pub use classify::{classify, count_selected, Threshold};
pub use ranking::{select_ranked, select_ranked_by, RankOrder};
pub use pipeline::{Pipeline, PipelineOutput};
pub use sources::{
    load_features, load_group_averages, load_tabular,
    read_features, read_group_averages, read_tabular,
    GroupAverages, TabularLoad,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
