//! Rejects readings whose temperature strays too far from the plant's
//! trailing average, as computed by storage.

use crate::config::MissingBaseline;
use crate::models::plants::PlantId;
use crate::services::transform::CleanReading;
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlierReport {
    pub kept: usize,
    pub out_of_band: usize,
    pub admitted_without_baseline: usize,
    pub held_without_baseline: usize,
}

#[derive(Debug, Copy, Clone)]
pub struct OutlierFilter {
    pub tolerance: f64,
    pub missing_baseline: MissingBaseline,
}

impl OutlierFilter {
    /// Inclusive `[lower, upper]` band around `average`.
    pub fn band(&self, average: f64) -> (f64, f64) {
        let a = average * (1.0 - self.tolerance);
        let b = average * (1.0 + self.tolerance);
        // a negative average flips the bounds
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn filter(
        &self,
        rows: Vec<CleanReading>,
        averages: &BTreeMap<PlantId, f64>,
    ) -> (Vec<CleanReading>, OutlierReport) {
        let mut report = OutlierReport::default();
        let kept: Vec<CleanReading> = rows
            .into_iter()
            .filter(|row| match averages.get(&row.plant_id) {
                Some(&avg) => {
                    let (lower, upper) = self.band(avg);
                    let inside = (lower..=upper).contains(&row.temperature);
                    if !inside {
                        debug!(
                            "Outliers: plant {} temperature {} outside [{:.3}, {:.3}]",
                            row.plant_id.0, row.temperature, lower, upper
                        );
                        report.out_of_band += 1;
                    }
                    inside
                }
                None => match self.missing_baseline {
                    MissingBaseline::Admit => {
                        report.admitted_without_baseline += 1;
                        true
                    }
                    MissingBaseline::Hold => {
                        report.held_without_baseline += 1;
                        false
                    }
                },
            })
            .collect();
        report.kept = kept.len();
        (kept, report)
    }
}
