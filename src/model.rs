// 🗺️ Entity models - geometry side, tabular side, merged view
//
// GeoEntity comes from the decoded feature collection and keeps its raw id
// until reconciliation. MetricRecord is built once from a tabular row and is
// read-only afterwards. MergedEntity is what a map view renders.

use crate::error::{MetricParseError, PipelineError};
use crate::identifier::{normalize_with_limit, Identifier, RawId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boundary geometry, opaque to the pipeline
pub type Geometry = serde_json::Value;

/// Property holding the embedded identifier on a feature
pub const ID_PROPERTY: &str = "id";

/// Property holding the entity name on a feature
pub const NAME_PROPERTY: &str = "name";

// ============================================================================
// GEO ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEntity {
    pub id: RawId,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl GeoEntity {
    pub fn new(id: impl Into<RawId>, geometry: Geometry) -> Self {
        GeoEntity {
            id: id.into(),
            geometry,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Name used for name-token repair (empty when the feature has none)
    pub fn name(&self) -> &str {
        self.properties
            .get(NAME_PROPERTY)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Replace both the feature id and the embedded identifier property
    pub fn assign_id(&mut self, id: Identifier) {
        self.id = RawId::from(id);
        self.properties
            .insert(ID_PROPERTY.to_string(), id.to_string());
    }
}

// ============================================================================
// TABULAR SCHEMA
// ============================================================================

/// Which tabular columns are text, which are categorical, which metrics are core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularSchema {
    pub id_field: String,
    pub name_field: String,
    pub state_field: String,

    /// Categorical columns (area type, income class)
    pub tag_fields: Vec<String>,

    /// Metrics whose parse failure aborts the load
    pub core_metrics: Vec<String>,
}

impl Default for TabularSchema {
    fn default() -> Self {
        TabularSchema {
            id_field: "id".to_string(),
            name_field: "name".to_string(),
            state_field: "state".to_string(),
            tag_fields: vec!["area_type".to_string(), "income_class".to_string()],
            core_metrics: vec!["availability".to_string(), "usage".to_string()],
        }
    }
}

impl TabularSchema {
    fn is_text_field(&self, field: &str) -> bool {
        field == self.id_field
            || field == self.name_field
            || field == self.state_field
            || self.tag_fields.iter().any(|t| t == field)
    }
}

// ============================================================================
// METRIC RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: Identifier,
    pub name: String,
    pub state: String,

    /// Only non-empty, numeric cells
    pub metrics: BTreeMap<String, f64>,

    /// Categorical tags (area_type, income_class, ...)
    pub tags: BTreeMap<String, String>,

    /// Optional fields that failed to parse
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<MetricParseError>,
}

impl MetricRecord {
    /// Build a record from a text row
    ///
    /// Join key and core metric failures abort; optional metric failures
    /// are kept on the record in `issues`.
    pub fn from_row(
        row: &BTreeMap<String, String>,
        schema: &TabularSchema,
        max_primary_code: u32,
    ) -> Result<MetricRecord, PipelineError> {
        let raw_id = row.get(&schema.id_field).cloned().unwrap_or_default();
        let id = normalize_with_limit(raw_id, max_primary_code)?;

        let text = |field: &str| row.get(field).map(|v| v.trim().to_string()).unwrap_or_default();

        let mut metrics = BTreeMap::new();
        let mut tags = BTreeMap::new();
        let mut issues = Vec::new();

        for tag in &schema.tag_fields {
            let value = text(tag.as_str());
            if !value.is_empty() {
                tags.insert(tag.clone(), value);
            }
        }

        for (field, raw_value) in row {
            if schema.is_text_field(field) {
                continue;
            }

            match parse_metric(field, raw_value) {
                Ok(Some(value)) => {
                    metrics.insert(field.clone(), value);
                }
                Ok(None) => {}
                Err(err) if schema.core_metrics.contains(field) => return Err(err.into()),
                Err(err) => issues.push(err),
            }
        }

        Ok(MetricRecord {
            id,
            name: text(schema.name_field.as_str()),
            state: text(schema.state_field.as_str()),
            metrics,
            tags,
            issues,
        })
    }

    pub fn metric(&self, field: &str) -> Option<f64> {
        self.metrics.get(field).copied()
    }

    pub fn tag(&self, field: &str) -> Option<&str> {
        self.tags.get(field).map(String::as_str)
    }

    /// First whitespace-delimited word of the name
    pub fn name_token(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

/// Parse one metric cell; empty cells are absent, not zero
pub fn parse_metric(field: &str, raw_value: &str) -> Result<Option<f64>, MetricParseError> {
    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(MetricParseError {
            field: field.to_string(),
            raw_value: raw_value.to_string(),
        }),
    }
}

// ============================================================================
// MERGED ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedEntity {
    pub id: Identifier,
    pub geometry: Geometry,
    pub name: String,
    pub state: String,
    pub metrics: BTreeMap<String, f64>,
}

impl MergedEntity {
    pub fn metric(&self, field: &str) -> Option<f64> {
        self.metrics.get(field).copied()
    }
}

// ============================================================================
// GROUP STATS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group_key: String,
    pub count: usize,
    pub mean: BTreeMap<String, f64>,
    pub median: BTreeMap<String, f64>,
}

// ============================================================================
// SELECTION STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    #[serde(rename = "selected-county")]
    Selected,
    #[serde(rename = "unselected-county")]
    Unselected,
}

impl Selection {
    pub fn is_selected(&self) -> bool {
        matches!(self, Selection::Selected)
    }
}

// ============================================================================
// TESTS
// ============================================================================
