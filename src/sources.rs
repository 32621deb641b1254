// 📂 Source loaders - decoded feature collection + broadband CSV
//
// These sit outside the pipeline core: they turn files into GeoEntity and
// MetricRecord values and nothing else. TopoJSON arc decoding happens
// upstream; the geometry input here is plain GeoJSON.

use crate::error::{IdentifierError, PipelineError};
use crate::identifier::RawId;
use crate::model::{parse_metric, GeoEntity, Geometry, MetricRecord, TabularSchema, ID_PROPERTY};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    geometry: Geometry,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Feature {
    fn into_entity(self, index: usize) -> Result<GeoEntity> {
        let properties: BTreeMap<String, String> = self
            .properties
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect();

        // Some decoders only carry the code as a property
        let id = match self.id {
            Some(id) => id,
            None => properties
                .get(ID_PROPERTY)
                .map(|s| RawId::Text(s.clone()))
                .ok_or_else(|| anyhow!("feature #{} has no id", index))?,
        };

        Ok(GeoEntity {
            id,
            geometry: self.geometry,
            properties,
        })
    }
}

/// Parse a GeoJSON FeatureCollection
pub fn read_features<R: Read>(reader: R) -> Result<Vec<GeoEntity>> {
    let collection: FeatureCollection =
        serde_json::from_reader(reader).context("Failed to parse feature collection")?;

    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| feature.into_entity(index))
        .collect()
}

pub fn load_features(path: &Path) -> Result<Vec<GeoEntity>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open geometry file: {:?}", path))?;
    let entities = read_features(BufReader::new(file))?;
    debug!(count = entities.len(), "loaded geometries");
    Ok(entities)
}

// ============================================================================
// TABULAR
// ============================================================================

/// Parsed records plus the territory rows that were left out
#[derive(Debug, Clone, Default)]
pub struct TabularLoad {
    pub records: Vec<MetricRecord>,
    pub skipped_territories: Vec<u32>,
}

/// Parse broadband rows; territory rows are skipped, any other bad row aborts
pub fn read_tabular<R: Read>(
    reader: R,
    schema: &TabularSchema,
    max_primary_code: u32,
) -> Result<TabularLoad> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut load = TabularLoad::default();

    for (index, result) in rdr.deserialize::<BTreeMap<String, String>>().enumerate() {
        // +2: header line, 1-based
        let line = index + 2;
        let row = result.with_context(|| format!("Failed to read CSV row at line {}", line))?;

        match MetricRecord::from_row(&row, schema, max_primary_code) {
            Ok(record) => {
                for issue in &record.issues {
                    warn!(id = %record.id, %issue, "optional metric not parsed");
                }
                load.records.push(record);
            }
            Err(PipelineError::Identifier(IdentifierError::Territory { code })) => {
                warn!(code, line, "skipping territory row");
                load.skipped_territories.push(code);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Invalid broadband row at line {}", line));
            }
        }
    }

    Ok(load)
}

pub fn load_tabular(path: &Path, schema: &TabularSchema, max_primary_code: u32) -> Result<TabularLoad> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open broadband CSV: {:?}", path))?;
    let load = read_tabular(BufReader::new(file), schema, max_primary_code)?;
    debug!(count = load.records.len(), "loaded broadband records");
    Ok(load)
}

// ============================================================================
// GROUP AVERAGES
// ============================================================================

/// Published averages keyed by group, then by metric
pub type GroupAverages = BTreeMap<String, BTreeMap<String, f64>>;

pub const GROUP_KEY_COLUMN: &str = "group_key";

/// Parse a `group_key,availability,usage` table; blank cells are left out
pub fn read_group_averages<R: Read>(reader: R) -> Result<GroupAverages> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut averages = GroupAverages::new();

    for result in rdr.deserialize::<BTreeMap<String, String>>() {
        let row = result.context("Failed to read averages row")?;
        let key = row
            .get(GROUP_KEY_COLUMN)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("averages row without {}", GROUP_KEY_COLUMN))?;

        let mut values = BTreeMap::new();
        for (field, raw) in &row {
            if field == GROUP_KEY_COLUMN {
                continue;
            }
            if let Some(value) = parse_metric(field, raw)? {
                values.insert(field.clone(), value);
            }
        }

        averages.insert(key, values);
    }

    Ok(averages)
}

pub fn load_group_averages(path: &Path) -> Result<GroupAverages> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open averages CSV: {:?}", path))?;
    read_group_averages(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::MAX_PRIMARY_CODE;

    const FEATURES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "id": 1001, "geometry": { "type": "Polygon", "coordinates": [] },
              "properties": { "name": "Autauga", "aland": 1539602123 } },
            { "type": "Feature", "id": "06037", "geometry": null,
              "properties": { "name": "Los Angeles" } },
            { "type": "Feature", "geometry": null,
              "properties": { "id": "72001", "name": "Adjuntas", "note": null } }
        ]
    }"#;

    #[test]
    fn test_read_features() {
        let entities = read_features(FEATURES.as_bytes()).unwrap();

        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].id, RawId::Number(1001));
        assert_eq!(entities[0].name(), "Autauga");
        assert_eq!(entities[0].properties["aland"], "1539602123");
        assert_eq!(entities[1].id, RawId::Text("06037".to_string()));
        assert_eq!(entities[2].id, RawId::Text("72001".to_string()));
        assert!(!entities[2].properties.contains_key("note"));
    }

    #[test]
    fn test_feature_without_any_id_fails() {
        let json = r#"{ "features": [ { "geometry": null, "properties": { "name": "X" } } ] }"#;
        assert!(read_features(json.as_bytes()).is_err());
    }

    #[test]
    fn test_read_tabular_skips_territories() {
        let csv = "id,name,state,area_type,income_class,availability,usage,total\n\
                   1001,Autauga County,AL,rural,low,0.81,0.40,55000\n\
                   72001,Adjuntas Municipio,PR,rural,low,0.5,0.2,18000\n\
                   501,Suffolk County,NY,urban,high,0.99,0.77,\n";

        let load = read_tabular(csv.as_bytes(), &TabularSchema::default(), MAX_PRIMARY_CODE).unwrap();

        assert_eq!(load.records.len(), 2);
        assert_eq!(load.skipped_territories, vec![72001]);
        assert_eq!(load.records[1].id.to_string(), "00501");
        assert_eq!(load.records[1].metric("total"), None);
    }

    #[test]
    fn test_read_tabular_bad_core_metric_reports_line() {
        let csv = "id,name,state,availability,usage\n\
                   1001,Autauga County,AL,0.81,0.40\n\
                   1003,Baldwin County,AL,lots,0.40\n";

        let err = read_tabular(csv.as_bytes(), &TabularSchema::default(), MAX_PRIMARY_CODE).unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));
    }

    #[test]
    fn test_read_group_averages() {
        let csv = "group_key,availability,usage\nrural,0.61,0.35\nurban,0.92,\n";
        let averages = read_group_averages(csv.as_bytes()).unwrap();

        assert_eq!(averages["rural"]["usage"], 0.35);
        assert!(!averages["urban"].contains_key("usage"));
    }

    #[test]
    fn test_load_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let geo_path = dir.path().join("counties.geojson");
        std::fs::write(&geo_path, FEATURES).unwrap();

        let entities = load_features(&geo_path).unwrap();
        assert_eq!(entities.len(), 3);

        assert!(load_tabular(&dir.path().join("missing.csv"), &TabularSchema::default(), MAX_PRIMARY_CODE).is_err());
    }
}
