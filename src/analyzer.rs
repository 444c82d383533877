//! Cycle-time analysis - classifies identifiers by transmission regularity.
//!
//! # Statistical Methodology
//!
//! ## Cycle Times
//! For the timestamps [t₀, t₁, ..., tₙ] of one identifier, in capture order:
//! Δᵢ = tᵢ - tᵢ₋₁ for i ∈ [1, n]
//!
//! ## Threshold
//! threshold = median(Δ) × (1 + p / 100), with p = 5 by default.
//!
//! ## Classification
//! - any Δᵢ > threshold: Flagged, carrying the number of exceedances
//! - otherwise: Clean
//!
//! Only identifiers below `0x800` that are not in the reference set are
//! classified. Identifiers seen once have no cycle time and no outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use tracing::{debug, info, warn};

use crate::capture::CaptureRecord;
use crate::identifier::{format_hex, mask_standard_id, DecodedId, EXTENDED_ID_LIMIT};
use crate::reference::GroupIdentifierSet;

/// Default tolerance above the median cycle time, in percent.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 5.0;

/// Exclusive upper bound of the 11-bit identifier range.
pub const STANDARD_ID_LIMIT: u32 = 0x800;

/// Outcome for one eligible identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationOutcome {
    /// At least one cycle time exceeded the threshold.
    Flagged(usize),
    /// Every cycle time stayed within the threshold.
    Clean,
}

impl ClassificationOutcome {
    pub fn from_exceedances(count: usize) -> Self {
        if count > 0 {
            Self::Flagged(count)
        } else {
            Self::Clean
        }
    }

    /// Report category letter.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Flagged(_) => "A",
            Self::Clean => "B",
        }
    }
}

impl fmt::Display for ClassificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flagged(count) => write!(f, "Flagged ({} exceedances)", count),
            Self::Clean => write!(f, "Clean"),
        }
    }
}

/// Configuration for the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Tolerance above the median cycle time, in percent.
    pub threshold_percent: f64,
    /// Raw identifiers at or above this value are not analyzed.
    pub max_standard_id: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            max_standard_id: STANDARD_ID_LIMIT,
        }
    }
}

/// Observation times and cycle times of one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleTimeSeries {
    pub raw_id: u32,
    pub timestamps: Vec<f64>,
    pub cycle_times: Vec<f64>,
}

impl CycleTimeSeries {
    pub fn new(raw_id: u32, timestamps: Vec<f64>) -> Self {
        let cycle_times = timestamps_to_deltas(&timestamps);
        Self {
            raw_id,
            timestamps,
            cycle_times,
        }
    }

    /// (time, cycle time) pairs: every timestamp but the last against the
    /// interval that follows it.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.cycle_times.iter().copied())
    }

    pub fn decoded(&self) -> DecodedId {
        DecodedId::decode(self.raw_id)
    }
}

/// Converts timestamps to consecutive differences.
pub fn timestamps_to_deltas(timestamps: &[f64]) -> Vec<f64> {
    if timestamps.len() < 2 {
        return Vec::new();
    }

    timestamps.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Median using the conventional definition (mean of the two middle values
/// for even lengths). `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let n = values.len();
    let mut data = Data::new(values.to_vec());
    if n % 2 == 1 {
        Some(data.order_statistic(n / 2 + 1))
    } else {
        let lower = data.order_statistic(n / 2);
        let upper = data.order_statistic(n / 2 + 1);
        Some((lower + upper) / 2.0)
    }
}

/// Statistical summary for one identifier's cycle times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStatistics {
    pub samples: usize,
    pub median: f64,
    pub threshold: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub exceedances: usize,
}

/// Calculates the threshold and exceedance count for a set of cycle times.
pub fn calculate_statistics(cycle_times: &[f64], threshold_percent: f64) -> Option<CycleStatistics> {
    let median = median(cycle_times)?;
    let threshold = median * (1.0 + threshold_percent / 100.0);
    let exceedances = cycle_times.iter().filter(|&&c| c > threshold).count();

    let data = Data::new(cycle_times.to_vec());

    Some(CycleStatistics {
        samples: cycle_times.len(),
        median,
        threshold,
        mean: data.mean().unwrap_or(median),
        min: data.min(),
        max: data.max(),
        exceedances,
    })
}

/// Classification results for one capture.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Outcome per identifier, keyed by masked standard identifier.
    pub outcomes: BTreeMap<u32, ClassificationOutcome>,
    /// Statistics per identifier, keyed like `outcomes`.
    pub statistics: BTreeMap<u32, CycleStatistics>,
    /// Every eligible identifier, including those seen only once.
    pub series: Vec<CycleTimeSeries>,
    /// Reference set used for exclusion.
    pub reference: GroupIdentifierSet,
    pub max_standard_id: u32,
    pub threshold_percent: f64,
    pub records_analyzed: usize,
    pub observed_ids: usize,
    pub excluded_out_of_range: usize,
    pub excluded_reference: usize,
}

impl AnalysisReport {
    /// Flagged identifiers with their exceedance counts, ascending.
    pub fn flagged(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.outcomes.iter().filter_map(|(&id, outcome)| match outcome {
            ClassificationOutcome::Flagged(count) => Some((id, *count)),
            ClassificationOutcome::Clean => None,
        })
    }

    /// Clean identifiers, ascending.
    pub fn clean(&self) -> impl Iterator<Item = u32> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == ClassificationOutcome::Clean)
            .map(|(&id, _)| id)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }

    pub fn clean_count(&self) -> usize {
        self.clean().count()
    }
}

/// Classifies the identifiers of a capture.
pub struct CycleClassifier {
    config: ClassifierConfig,
}

impl CycleClassifier {
    /// Bounds above the 29-bit range are clamped so that no two eligible
    /// identifiers share a masked key.
    pub fn new(config: ClassifierConfig) -> Self {
        let max_standard_id = config.max_standard_id.min(EXTENDED_ID_LIMIT);
        if max_standard_id != config.max_standard_id {
            warn!(
                requested = %format_hex(config.max_standard_id),
                applied = %format_hex(max_standard_id),
                "Identifier bound clamped to the 29-bit range"
            );
        }
        Self {
            config: ClassifierConfig {
                max_standard_id,
                ..config
            },
        }
    }

    pub fn classify(
        &self,
        records: &[CaptureRecord],
        reference: &GroupIdentifierSet,
    ) -> AnalysisReport {
        let observed: BTreeSet<u32> = records.iter().map(|r| r.raw_id).collect();

        let mut excluded_out_of_range = 0;
        let mut excluded_reference = 0;
        let mut eligible = BTreeSet::new();
        for &id in &observed {
            if id >= self.config.max_standard_id {
                excluded_out_of_range += 1;
            } else if reference.contains(mask_standard_id(id)) {
                excluded_reference += 1;
            } else {
                eligible.insert(id);
            }
        }

        // Timestamps per identifier, in capture order.
        let mut timestamps: BTreeMap<u32, Vec<f64>> =
            eligible.iter().map(|&id| (id, Vec::new())).collect();
        for record in records {
            if let Some(series) = timestamps.get_mut(&record.raw_id) {
                series.push(record.timestamp_ms);
            }
        }

        let mut outcomes = BTreeMap::new();
        let mut statistics = BTreeMap::new();
        let mut series = Vec::with_capacity(timestamps.len());

        for (id, times) in timestamps {
            let cycle = CycleTimeSeries::new(id, times);
            let key = mask_standard_id(id);

            match calculate_statistics(&cycle.cycle_times, self.config.threshold_percent) {
                Some(stats) => {
                    let outcome = ClassificationOutcome::from_exceedances(stats.exceedances);
                    debug!(
                        id = %format_hex(key),
                        occurrences = cycle.timestamps.len(),
                        median = stats.median,
                        threshold = stats.threshold,
                        outcome = %outcome,
                        "Classified identifier"
                    );
                    outcomes.insert(key, outcome);
                    statistics.insert(key, stats);
                }
                None => {
                    debug!(
                        id = %format_hex(key),
                        occurrences = cycle.timestamps.len(),
                        "Too few occurrences for a cycle time"
                    );
                }
            }
            series.push(cycle);
        }

        let report = AnalysisReport {
            outcomes,
            statistics,
            series,
            reference: reference.clone(),
            max_standard_id: self.config.max_standard_id,
            threshold_percent: self.config.threshold_percent,
            records_analyzed: records.len(),
            observed_ids: observed.len(),
            excluded_out_of_range,
            excluded_reference,
        };

        info!(
            observed = report.observed_ids,
            eligible = report.series.len(),
            flagged = report.flagged_count(),
            clean = report.clean_count(),
            out_of_range = excluded_out_of_range,
            reference = excluded_reference,
            "Classification complete"
        );

        report
    }
}

impl Default for CycleClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn records(id: u32, times: &[f64]) -> Vec<CaptureRecord> {
        times
            .iter()
            .map(|&t| CaptureRecord {
                timestamp_ms: t,
                raw_id: id,
            })
            .collect()
    }

    fn classify(records: &[CaptureRecord]) -> AnalysisReport {
        CycleClassifier::default().classify(records, &GroupIdentifierSet::default())
    }

    #[test]
    fn test_threshold_is_not_exceeded_by_equal_value() {
        // Cycle times [100, 105, 95], median 100, threshold 105
        let report = classify(&records(0x123, &[0.0, 100.0, 205.0, 300.0]));

        assert_eq!(report.outcomes.get(&0x123), Some(&ClassificationOutcome::Clean));
        let stats = report.statistics[&0x123];
        assert_eq!(stats.median, 100.0);
        assert_eq!(stats.threshold, 105.0);
        assert_eq!(stats.exceedances, 0);
    }

    #[test]
    fn test_single_exceedance_is_flagged() {
        // Cycle times [100, 160, 40], only 160 exceeds 105
        let report = classify(&records(0x123, &[0.0, 100.0, 260.0, 300.0]));
        assert_eq!(report.outcomes.get(&0x123), Some(&ClassificationOutcome::Flagged(1)));
        assert_eq!(report.flagged().collect::<Vec<_>>(), vec![(0x123, 1)]);
        assert_eq!(report.clean_count(), 0);
    }

    #[test]
    fn test_out_of_range_identifier_never_classified() {
        let report = classify(&records(0x900, &[0.0, 100.0, 400.0, 410.0]));
        assert!(report.outcomes.is_empty());
        assert!(report.series.is_empty());
        assert_eq!(report.excluded_out_of_range, 1);
    }

    #[test]
    fn test_reference_identifier_never_classified() {
        let reference: GroupIdentifierSet = [0x123].into_iter().collect();
        let mut capture = records(0x123, &[0.0, 100.0, 400.0]);
        capture.extend(records(0x124, &[0.0, 100.0, 200.0]));

        let report = CycleClassifier::default().classify(&capture, &reference);

        assert!(!report.outcomes.contains_key(&0x123));
        assert_eq!(report.outcomes.get(&0x124), Some(&ClassificationOutcome::Clean));
        assert_eq!(report.excluded_reference, 1);
        assert_eq!(report.reference.len(), 1);
    }

    #[test]
    fn test_single_occurrence_has_series_but_no_outcome() {
        let report = classify(&records(0x10, &[42.0]));
        assert!(report.outcomes.is_empty());
        assert_eq!(report.series.len(), 1);
        assert!(report.series[0].cycle_times.is_empty());
        assert_eq!(report.series[0].points().count(), 0);
    }

    #[test]
    fn test_interleaved_identifiers_keep_capture_order() {
        let capture = vec![
            CaptureRecord { timestamp_ms: 0.0, raw_id: 0x1 },
            CaptureRecord { timestamp_ms: 5.0, raw_id: 0x2 },
            CaptureRecord { timestamp_ms: 10.0, raw_id: 0x1 },
            CaptureRecord { timestamp_ms: 15.0, raw_id: 0x2 },
            CaptureRecord { timestamp_ms: 20.0, raw_id: 0x1 },
        ];
        let report = classify(&capture);

        let first = report.series.iter().find(|s| s.raw_id == 0x1).unwrap();
        assert_eq!(first.timestamps, vec![0.0, 10.0, 20.0]);
        assert_eq!(first.cycle_times, vec![10.0, 10.0]);
        assert_eq!(report.clean().collect::<Vec<_>>(), vec![0x1, 0x2]);
    }

    #[test]
    fn test_unsorted_timestamps_are_not_reordered() {
        let report = classify(&records(0x5, &[100.0, 0.0, 200.0]));
        assert_eq!(report.series[0].cycle_times, vec![-100.0, 200.0]);
        // median 50, threshold 52.5
        assert_eq!(report.outcomes[&0x5], ClassificationOutcome::Flagged(1));
    }

    #[test]
    fn test_categories_are_disjoint() {
        let mut capture = records(0x100, &[0.0, 10.0, 20.0, 30.0]);
        capture.extend(records(0x200, &[0.0, 10.0, 50.0, 60.0]));
        capture.extend(records(0x900, &[0.0, 10.0]));
        let report = classify(&capture);

        let flagged: BTreeSet<u32> = report.flagged().map(|(id, _)| id).collect();
        let clean: BTreeSet<u32> = report.clean().collect();
        assert!(flagged.is_disjoint(&clean));
        let all: BTreeSet<u32> = flagged.union(&clean).copied().collect();
        let expected: BTreeSet<u32> = [0x100, 0x200].into_iter().collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_bound_beyond_extended_range_is_clamped() {
        let config = ClassifierConfig {
            max_standard_id: u32::MAX,
            ..ClassifierConfig::default()
        };
        // 0x2000_0123 masks to 0x123 and would overwrite its outcome.
        let mut capture = records(0x123, &[0.0, 100.0, 260.0, 300.0]);
        capture.extend(records(0x2000_0123, &[0.0, 10.0, 20.0]));

        let report = CycleClassifier::new(config).classify(&capture, &GroupIdentifierSet::default());

        assert_eq!(report.max_standard_id, EXTENDED_ID_LIMIT);
        assert_eq!(report.outcomes.get(&0x123), Some(&ClassificationOutcome::Flagged(1)));
        assert_eq!(report.flagged_count(), 1);
        assert_eq!(report.clean_count(), 0);
        assert_eq!(report.excluded_out_of_range, 1);
        assert_eq!(report.series.len(), 1);
    }

    #[test]
    fn test_extended_identifier_below_bound_is_classified() {
        let config = ClassifierConfig {
            max_standard_id: EXTENDED_ID_LIMIT,
            ..ClassifierConfig::default()
        };
        let report = CycleClassifier::new(config)
            .classify(&records(0x18FE_F100, &[0.0, 10.0, 20.0]), &GroupIdentifierSet::default());

        assert_eq!(report.outcomes.get(&0x18FE_F100), Some(&ClassificationOutcome::Clean));
    }

    proptest! {
        #[test]
        fn prop_every_series_keeps_its_own_outcome(
            max_standard_id in any::<u32>(),
            ids in proptest::collection::vec(any::<u32>(), 1..40),
        ) {
            let config = ClassifierConfig {
                max_standard_id,
                ..ClassifierConfig::default()
            };
            // Two frames per identifier, so each eligible one gets an outcome.
            let capture: Vec<CaptureRecord> = ids
                .iter()
                .enumerate()
                .flat_map(|(i, &id)| records(id, &[i as f64, i as f64 + 10.0]))
                .collect();

            let report = CycleClassifier::new(config).classify(&capture, &GroupIdentifierSet::default());

            let keys: BTreeSet<u32> = report.series.iter().map(|s| mask_standard_id(s.raw_id)).collect();
            prop_assert_eq!(keys.len(), report.series.len());
            prop_assert_eq!(report.outcomes.len(), report.series.len());
            prop_assert_eq!(report.flagged_count() + report.clean_count(), report.series.len());
        }
    }

    #[test]
    fn test_custom_threshold_percent() {
        let config = ClassifierConfig {
            threshold_percent: 10.0,
            ..ClassifierConfig::default()
        };
        // Cycle times [100, 108, 100]: 108 exceeds 105 but not 110
        let capture = records(0x50, &[0.0, 100.0, 208.0, 308.0]);
        let reference = GroupIdentifierSet::default();

        let strict = CycleClassifier::default().classify(&capture, &reference);
        let lenient = CycleClassifier::new(config).classify(&capture, &reference);
        assert_eq!(strict.outcomes[&0x50], ClassificationOutcome::Flagged(1));
        assert_eq!(lenient.outcomes[&0x50], ClassificationOutcome::Clean);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[7.0]), Some(7.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_timestamps_to_deltas() {
        assert!(timestamps_to_deltas(&[]).is_empty());
        assert!(timestamps_to_deltas(&[1.0]).is_empty());
        assert_eq!(timestamps_to_deltas(&[0.0, 10.0, 25.0]), vec![10.0, 15.0]);
    }

    #[test]
    fn test_statistics_calculation() {
        let stats = calculate_statistics(&[100.0, 200.0, 300.0, 400.0, 500.0], 5.0).unwrap();
        assert!((stats.mean - 300.0).abs() < 0.01);
        assert!((stats.min - 100.0).abs() < 0.01);
        assert!((stats.max - 500.0).abs() < 0.01);
        assert_eq!(stats.median, 300.0);
        assert_eq!(stats.exceedances, 2);
        assert!(calculate_statistics(&[], 5.0).is_none());
    }

    #[test]
    fn test_outcome_category() {
        assert_eq!(ClassificationOutcome::from_exceedances(0), ClassificationOutcome::Clean);
        assert_eq!(ClassificationOutcome::from_exceedances(3).category(), "A");
        assert_eq!(ClassificationOutcome::Clean.category(), "B");
    }
}
