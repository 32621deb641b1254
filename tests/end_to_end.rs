use broadband_reconcile::{
    aggregate, classify, count_selected, load_features, load_tabular, normalize, select_ranked,
    GeoEntity, MetricRecord, Pipeline, PipelineConfig, RepairPolicy, Selection, TabularSchema,
    ALL_GROUP, MAX_PRIMARY_CODE,
};
use std::collections::{BTreeMap, BTreeSet};

fn record(id: u32, name: &str, availability: f64, usage: f64, area: &str) -> MetricRecord {
    MetricRecord {
        id: normalize(id).unwrap(),
        name: name.to_string(),
        state: "ND".to_string(),
        metrics: BTreeMap::from([
            ("availability".to_string(), availability),
            ("usage".to_string(), usage),
        ]),
        tags: BTreeMap::from([("area_type".to_string(), area.to_string())]),
        issues: Vec::new(),
    }
}

#[test]
fn test_drop_orphans_end_to_end() {
    let geo: Vec<GeoEntity> = [1u32, 2, 3, 57001, 60010]
        .into_iter()
        .map(|id| GeoEntity::new(id, serde_json::Value::Null))
        .collect();
    let tabular = vec![
        record(1, "One County", 0.9, 0.5, "urban"),
        record(2, "Two County", 0.4, 0.2, "rural"),
        record(3, "Three County", 0.7, 0.3, "rural"),
        record(57001, "Far County", 0.2, 0.1, "rural"),
    ];

    let output = Pipeline::default().run(geo, &tabular).unwrap();

    let merged_ids: BTreeSet<String> = output.merged.iter().map(|m| m.id.to_string()).collect();
    let expected: BTreeSet<String> = ["00001", "00002", "00003", "57001"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(merged_ids, expected);
    assert_eq!(output.report.territories_dropped, vec![60010]);

    for entity in &output.merged {
        assert!(entity.metric("availability").is_some());
        assert!(entity.metric("usage").is_some());
    }

    let selections = classify(&output.merged, "availability", 0.5).unwrap();
    assert_eq!(count_selected(&output.merged, &selections), 2);
    assert_eq!(selections[&normalize(2u32).unwrap()], Selection::Unselected);

    let stats = aggregate(&tabular, Some("area_type"));
    assert_eq!(stats[ALL_GROUP].count, 4);
    assert_eq!(stats["rural"].median["usage"], 0.2);

    let filters = BTreeMap::from([("area_type".to_string(), "rural".to_string())]);
    let ranked = select_ranked(&tabular, "availability", &filters, 2);
    let ranked_ids: Vec<u32> = ranked.iter().map(|r| r.id.code()).collect();
    assert_eq!(ranked_ids, vec![57001, 2]);
}

#[test]
fn test_pipeline_from_files() {
    let dir = tempfile::tempdir().unwrap();

    let geo_path = dir.path().join("counties.geojson");
    std::fs::write(
        &geo_path,
        r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "id": "01001", "geometry": null, "properties": { "name": "Autauga" } },
                { "type": "Feature", "id": 1003, "geometry": null, "properties": { "name": "Baldwin" } },
                { "type": "Feature", "id": 46113, "geometry": null, "properties": { "name": "Shannon" } },
                { "type": "Feature", "id": 72001, "geometry": null, "properties": { "name": "Adjuntas" } }
            ]
        }"#,
    )
    .unwrap();

    let csv_path = dir.path().join("broadband.csv");
    std::fs::write(
        &csv_path,
        "id,name,state,area_type,income_class,availability,usage,total,pct_white\n\
         1001,Autauga County,AL,rural,middle,0.81,0.41,55000,0.75\n\
         1003,Baldwin County,AL,urban,high,0.95,,212000,unknown\n\
         46102,Shannon County,SD,rural,low,0.30,0.12,14000,0.05\n\
         72001,Adjuntas Municipio,PR,rural,low,0.50,0.20,18000,\n",
    )
    .unwrap();

    let geo = load_features(&geo_path).unwrap();
    let load = load_tabular(&csv_path, &TabularSchema::default(), MAX_PRIMARY_CODE).unwrap();

    assert_eq!(load.records.len(), 3);
    assert_eq!(load.skipped_territories, vec![72001]);
    assert_eq!(load.records[1].issues.len(), 1);

    let config = PipelineConfig::default().with_policy(RepairPolicy::PatchByName);
    let output = Pipeline::new(config).run(geo, &load.records).unwrap();

    let ids: Vec<String> = output.merged.iter().map(|m| m.id.to_string()).collect();
    assert_eq!(ids, vec!["01001", "01003", "46102"]);
    assert_eq!(output.report.patches.len(), 1);
    assert!(output.report.is_aligned());

    // Blank tracked metric is present after merge
    assert_eq!(output.merged[1].metric("usage"), Some(0.0));
}
