// 📊 Aggregator - mean/median per metric, overall and per categorical group
//
// Absence is meaningful: a group with no values for a field has no entry for
// it, and an empty input has no groups at all. Nothing is cached; callers
// recompute whenever the grouping changes.

use crate::model::{GroupStats, MetricRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Group key covering every record
pub const ALL_GROUP: &str = "ALL";

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median with the even/odd rule; sorts `values` in place
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;

    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Per-metric statistics for `ALL` and, with `group_by`, each tag value
///
/// Records lacking the `group_by` tag still count towards `ALL`. A tag value
/// equal to `ALL` is keyed as `<field>=ALL` so it never merges into the
/// overall bucket.
pub fn aggregate(records: &[MetricRecord], group_by: Option<&str>) -> BTreeMap<String, GroupStats> {
    let mut stats = BTreeMap::new();
    if records.is_empty() {
        return stats;
    }

    let all: Vec<&MetricRecord> = records.iter().collect();
    stats.insert(ALL_GROUP.to_string(), group_stats(ALL_GROUP, &all));

    if let Some(field) = group_by {
        let mut groups: BTreeMap<String, Vec<&MetricRecord>> = BTreeMap::new();
        for record in records {
            if let Some(value) = record.tag(field) {
                groups.entry(group_key(field, value)).or_default().push(record);
            }
        }

        for (key, members) in groups {
            let group = group_stats(&key, &members);
            stats.insert(key, group);
        }
    }

    stats
}

fn group_key(field: &str, value: &str) -> String {
    if value == ALL_GROUP {
        format!("{}={}", field, value)
    } else {
        value.to_string()
    }
}

fn group_stats(group_key: &str, members: &[&MetricRecord]) -> GroupStats {
    let mut columns: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in members {
        for (field, value) in &record.metrics {
            columns.entry(field.as_str()).or_default().push(*value);
        }
    }

    let mut mean_by_field = BTreeMap::new();
    let mut median_by_field = BTreeMap::new();

    for (field, mut values) in columns {
        if let Some(m) = mean(&values) {
            mean_by_field.insert(field.to_string(), m);
        }
        if let Some(m) = median(&mut values) {
            median_by_field.insert(field.to_string(), m);
        }
    }

    GroupStats {
        group_key: group_key.to_string(),
        count: members.len(),
        mean: mean_by_field,
        median: median_by_field,
    }
}

// ============================================================================
// REFERENCE AVERAGES
// ============================================================================

/// Computed group mean vs. a published per-group average
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDeviation {
    pub group_key: String,
    pub field: String,
    pub computed: f64,
    pub reference: f64,
    pub delta: f64,
}

/// Compare computed means with a reference averages table
///
/// Pairs missing on either side are skipped.
pub fn compare_with_reference(
    stats: &BTreeMap<String, GroupStats>,
    reference: &BTreeMap<String, BTreeMap<String, f64>>,
) -> Vec<GroupDeviation> {
    let mut deviations = Vec::new();

    for (group_key, fields) in reference {
        let Some(group) = stats.get(group_key) else {
            continue;
        };

        for (field, expected) in fields {
            if let Some(computed) = group.mean.get(field) {
                deviations.push(GroupDeviation {
                    group_key: group_key.clone(),
                    field: field.clone(),
                    computed: *computed,
                    reference: *expected,
                    delta: computed - expected,
                });
            }
        }
    }

    deviations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::normalize;

    fn record(id: u32, area: Option<&str>, availability: Option<f64>) -> MetricRecord {
        let mut tags = BTreeMap::new();
        if let Some(area) = area {
            tags.insert("area_type".to_string(), area.to_string());
        }
        let mut metrics = BTreeMap::new();
        if let Some(v) = availability {
            metrics.insert("availability".to_string(), v);
        }
        MetricRecord {
            id: normalize(id).unwrap(),
            name: format!("County {id}"),
            state: "OH".to_string(),
            metrics,
            tags,
            issues: Vec::new(),
        }
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_single_element_group() {
        let stats = aggregate(&[record(1, Some("rural"), Some(0.7))], Some("area_type"));

        let rural = &stats["rural"];
        assert_eq!(rural.count, 1);
        assert_eq!(rural.mean["availability"], 0.7);
        assert_eq!(rural.median["availability"], 0.7);
    }

    #[test]
    fn test_groups_and_all() {
        let records = vec![
            record(1, Some("rural"), Some(0.2)),
            record(2, Some("rural"), Some(0.4)),
            record(3, Some("urban"), Some(0.9)),
            record(4, None, Some(0.5)),
        ];

        let stats = aggregate(&records, Some("area_type"));

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[ALL_GROUP].count, 4);
        assert!((stats[ALL_GROUP].mean["availability"] - 0.5).abs() < 1e-12);
        assert!((stats[ALL_GROUP].median["availability"] - 0.45).abs() < 1e-12);
        assert!((stats["rural"].mean["availability"] - 0.3).abs() < 1e-12);
        assert_eq!(stats["urban"].count, 1);
    }

    #[test]
    fn test_no_group_by_only_all() {
        let records = vec![record(1, Some("rural"), Some(0.2))];
        let stats = aggregate(&records, None);
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec![ALL_GROUP]);
    }

    #[test]
    fn test_group_named_all_stays_out_of_overall() {
        let records = vec![
            record(1, Some("ALL"), Some(0.0)),
            record(2, Some("rural"), Some(1.0)),
        ];

        let stats = aggregate(&records, Some("area_type"));

        assert_eq!(stats[ALL_GROUP].count, 2);
        assert_eq!(stats[ALL_GROUP].mean["availability"], 0.5);
        assert_eq!(stats[ALL_GROUP].median["availability"], 0.5);

        let tagged = &stats["area_type=ALL"];
        assert_eq!(tagged.group_key, "area_type=ALL");
        assert_eq!(tagged.count, 1);
        assert_eq!(tagged.mean["availability"], 0.0);
    }

    #[test]
    fn test_empty_input_has_no_groups() {
        assert!(aggregate(&[], Some("area_type")).is_empty());
    }

    #[test]
    fn test_field_without_values_is_absent() {
        let records = vec![record(1, Some("rural"), None)];
        let stats = aggregate(&records, Some("area_type"));

        assert_eq!(stats["rural"].count, 1);
        assert!(stats["rural"].mean.get("availability").is_none());
        assert!(stats["rural"].median.is_empty());
    }

    #[test]
    fn test_compare_with_reference() {
        let records = vec![
            record(1, Some("rural"), Some(0.2)),
            record(2, Some("rural"), Some(0.4)),
        ];
        let stats = aggregate(&records, Some("area_type"));

        let reference = BTreeMap::from([
            (
                "rural".to_string(),
                BTreeMap::from([
                    ("availability".to_string(), 0.25),
                    ("usage".to_string(), 0.1),
                ]),
            ),
            ("suburban".to_string(), BTreeMap::from([("availability".to_string(), 0.6)])),
        ]);

        let deviations = compare_with_reference(&stats, &reference);

        assert_eq!(deviations.len(), 1);
        assert_eq!(deviations[0].group_key, "rural");
        assert!((deviations[0].delta - 0.05).abs() < 1e-12);
    }
}
