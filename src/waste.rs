//! Waste classification and distribution statistics over a set of cuts.

use crate::Cut;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Category thresholds in millimetres of remaining length.
const MINIMAL_BELOW: f64 = 50.0;
const SMALL_BELOW: f64 = 100.0;
const MEDIUM_BELOW: f64 = 200.0;
const LARGE_BELOW: f64 = 500.0;

/// Default cap, in percent of the bar, past which a cut's offcut is reported
/// as excessive.
pub const DEFAULT_MAX_WASTE_PERCENTAGE: f64 = 25.0;

/// Classification of the material left at the end of a bar.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum WasteCategory {
    /// Less than 50 mm remains.
    Minimal,

    /// 50 mm to just under 100 mm remains.
    Small,

    /// 100 mm to just under 200 mm remains.
    Medium,

    /// 200 mm to just under 500 mm remains.
    Large,

    /// 500 mm or more remains.
    Excessive,
}

/// Classifies a remaining length.
pub fn categorize(remaining_length: f64) -> WasteCategory {
    if remaining_length < MINIMAL_BELOW {
        WasteCategory::Minimal
    } else if remaining_length < SMALL_BELOW {
        WasteCategory::Small
    } else if remaining_length < MEDIUM_BELOW {
        WasteCategory::Medium
    } else if remaining_length < LARGE_BELOW {
        WasteCategory::Large
    } else {
        WasteCategory::Excessive
    }
}

/// An offcut is worth returning to stock once it reaches the configured
/// minimum scrap length.
pub fn is_reclaimable(remaining_length: f64, min_scrap_length: f64) -> bool {
    remaining_length >= min_scrap_length
}

/// Number of cuts per waste category.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WasteDistribution {
    /// Cuts with less than 50 mm remaining.
    pub minimal: usize,

    /// Cuts with 50 mm to just under 100 mm remaining.
    pub small: usize,

    /// Cuts with 100 mm to just under 200 mm remaining.
    pub medium: usize,

    /// Cuts with 200 mm to just under 500 mm remaining.
    pub large: usize,

    /// Cuts with 500 mm or more remaining.
    pub excessive: usize,
}

impl WasteDistribution {
    fn record(&mut self, category: WasteCategory) {
        match category {
            WasteCategory::Minimal => self.minimal += 1,
            WasteCategory::Small => self.small += 1,
            WasteCategory::Medium => self.medium += 1,
            WasteCategory::Large => self.large += 1,
            WasteCategory::Excessive => self.excessive += 1,
        }
    }

    /// Total number of cuts recorded.
    pub fn total(&self) -> usize {
        self.minimal + self.small + self.medium + self.large + self.excessive
    }
}

/// Aggregate waste statistics over a cut set.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WasteAnalysis {
    /// Sum of remaining lengths across all cuts, in millimetres.
    pub total_waste: f64,

    /// Mean remaining length per cut, in millimetres.
    pub average_waste: f64,

    /// Number of cuts whose offcut can be returned to stock.
    pub reclaimable_count: usize,

    /// Total reclaimable offcut length, in millimetres.
    pub reclaimable_waste: f64,

    /// Indices (into the cut list) of cuts wasting more than the configured
    /// percentage of their bar.
    pub excessive_cuts: Vec<usize>,
}

/// Counts cuts per waste category.
pub fn distribution(cuts: &[Cut]) -> WasteDistribution {
    let mut dist = WasteDistribution::default();
    for cut in cuts {
        dist.record(cut.waste_category);
    }
    dist
}

/// Computes aggregate waste statistics. `max_waste_percentage` is the
/// per-cut threshold past which a cut is flagged as excessive.
pub fn analyze(cuts: &[Cut], max_waste_percentage: f64) -> WasteAnalysis {
    let mut analysis = WasteAnalysis::default();
    for (index, cut) in cuts.iter().enumerate() {
        analysis.total_waste += cut.remaining_length;
        if cut.is_reclaimable {
            analysis.reclaimable_count += 1;
            analysis.reclaimable_waste += cut.remaining_length;
        }
        if cut.stock_length > 0.0
            && cut.remaining_length / cut.stock_length * 100.0 > max_waste_percentage
        {
            analysis.excessive_cuts.push(index);
        }
    }
    if !cuts.is_empty() {
        analysis.average_waste = analysis.total_waste / cuts.len() as f64;
    }
    analysis
}
