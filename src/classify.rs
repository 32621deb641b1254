// 🎚️ Classifier - threshold selection driven by the percentage slider
// Stateless: every slider move or metric switch recomputes the whole map.

use crate::error::PipelineError;
use crate::identifier::Identifier;
use crate::model::{MergedEntity, Selection};
use std::collections::BTreeMap;

/// Select entities whose `metric` is at least `threshold` (a fraction in [0, 1])
///
/// Entities without the metric are unselected. The result is keyed by id, so
/// entities sharing an id collapse into one entry; use [`count_selected`] for
/// the per-entity total.
pub fn classify(
    entities: &[MergedEntity],
    metric: &str,
    threshold: f64,
) -> Result<BTreeMap<Identifier, Selection>, PipelineError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(PipelineError::InvalidThreshold(threshold));
    }

    Ok(entities
        .iter()
        .map(|entity| {
            let selection = match entity.metric(metric) {
                Some(value) if value >= threshold => Selection::Selected,
                _ => Selection::Unselected,
            };
            (entity.id, selection)
        })
        .collect())
}

/// Number of selected entities (the summary counter next to the map)
///
/// Counts every merged entity whose id is selected, one per rendered shape.
pub fn count_selected(
    entities: &[MergedEntity],
    selections: &BTreeMap<Identifier, Selection>,
) -> usize {
    entities
        .iter()
        .filter(|entity| {
            selections
                .get(&entity.id)
                .is_some_and(|selection| selection.is_selected())
        })
        .count()
}

/// Slider position in whole percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Threshold {
    percent: u8,
}

impl Threshold {
    /// Rejects anything above 100
    pub fn from_percent(percent: u8) -> Result<Self, PipelineError> {
        if percent > 100 {
            return Err(PipelineError::InvalidThreshold(f64::from(percent) / 100.0));
        }
        Ok(Threshold { percent })
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn fraction(&self) -> f64 {
        f64::from(self.percent) / 100.0
    }

    /// "at least 40%", or "100%" at the top of the range
    pub fn label(&self) -> String {
        if self.percent < 100 {
            format!("at least {}%", self.percent)
        } else {
            format!("{}%", self.percent)
        }
    }
}
