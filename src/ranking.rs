// 🏆 Ranked Selector - filter buttons + sort + top-K table
//
// The sort must be stable: ties keep input order, otherwise the entities
// shown at the edge of a fixed-size table change between identical queries.

use crate::model::MetricRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    #[default]
    Ascending,
    Descending,
}

/// Lowest `limit` records by `metric` among those matching every filter
pub fn select_ranked<'a>(
    records: &'a [MetricRecord],
    metric: &str,
    filters: &BTreeMap<String, String>,
    limit: usize,
) -> Vec<&'a MetricRecord> {
    select_ranked_by(records, metric, filters, limit, RankOrder::Ascending)
}

/// Same as `select_ranked` with an explicit order
pub fn select_ranked_by<'a>(
    records: &'a [MetricRecord],
    metric: &str,
    filters: &BTreeMap<String, String>,
    limit: usize,
    order: RankOrder,
) -> Vec<&'a MetricRecord> {
    let mut matching: Vec<(f64, &MetricRecord)> = records
        .iter()
        .filter(|record| matches_filters(record, filters))
        .filter_map(|record| record.metric(metric).map(|value| (value, record)))
        .collect();

    // sort_by is stable
    match order {
        RankOrder::Ascending => matching.sort_by(|a, b| a.0.total_cmp(&b.0)),
        RankOrder::Descending => matching.sort_by(|a, b| b.0.total_cmp(&a.0)),
    }

    matching
        .into_iter()
        .take(limit)
        .map(|(_, record)| record)
        .collect()
}

fn matches_filters(record: &MetricRecord, filters: &BTreeMap<String, String>) -> bool {
    filters
        .iter()
        .all(|(field, wanted)| record.tag(field) == Some(wanted.as_str()))
}
