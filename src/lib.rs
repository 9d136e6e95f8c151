//! cut-optimizer-1d is an optimizer library that attempts to cut linear cut
//! pieces from stock lengths in a way that uses the fewest bars and gives the
//! least waste. It combines exact pattern search with greedy heuristics and
//! accounts for saw kerf, start/end safety margins, and a minimum
//! reclaimable-scrap threshold.

#![deny(missing_docs)]

pub mod geometry;
pub mod waste;

mod bfd;
mod bounds;
mod dfs;
mod ffd;
mod materialize;
mod pattern;
mod priority;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use materialize::{BarBuilder, MetaQueues};
use ordered_float::OrderedFloat;
use thiserror::Error as ThisError;
use tracing::{debug, debug_span, info, warn};

pub use waste::{WasteAnalysis, WasteCategory, WasteDistribution};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Tolerance for comparisons that should be exact up to float rounding.
pub(crate) const ACCOUNTING_EPSILON: f64 = 1e-9;

/// Cut-level accounting precision in millimetres. Drift beyond this is a
/// numeric-instability error.
pub(crate) const ACCOUNTING_PRECISION: f64 = 0.01;

/// A demand for `quantity` pieces of `length` millimetres.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Piece length in millimetres. Must be positive and finite.
    pub length: f64,

    /// Number of pieces of this length. Must be at least one.
    pub quantity: usize,

    /// Opaque profile tag passed through to the resulting segments.
    pub profile: Option<String>,

    /// Opaque work-order tag passed through to the resulting segments.
    pub work_order_id: Option<String>,
}

impl Item {
    /// Creates an untagged item.
    pub fn new(length: f64, quantity: usize) -> Self {
        Item {
            length,
            quantity,
            profile: None,
            work_order_id: None,
        }
    }
}

/// Physical cutting constraints applied to every bar.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    /// Material removed by the saw between two adjacent pieces.
    pub kerf_width: f64,

    /// Unusable length reserved at the start of every bar.
    pub start_safety: f64,

    /// Unusable length reserved at the end of every bar.
    pub end_safety: f64,

    /// Offcuts at least this long can be returned to stock; anything
    /// shorter is a fragment.
    pub min_scrap_length: f64,

    /// Cuts wasting more than this percentage of their bar are flagged in
    /// the waste analysis. Defaults to 25 %.
    pub max_waste_percentage: Option<f64>,

    /// Upper limit on the number of pieces cut from one bar, e.g. for saws
    /// with a magazine limit.
    pub max_cuts_per_stock: Option<usize>,
}

impl Constraints {
    /// Usable span of a bar once both safety margins are subtracted.
    pub fn usable_length(&self, stock_length: f64) -> f64 {
        stock_length - self.start_safety - self.end_safety
    }
}

/// A single placed piece on a bar.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// Piece length in millimetres.
    pub length: f64,

    /// Start position, measured from the bar origin.
    pub position: f64,

    /// Zero-based left-to-right index of this segment on its bar.
    pub sequence: usize,

    /// Profile tag of the item this piece was cut for.
    pub profile: Option<String>,

    /// Work-order tag of the item this piece was cut for.
    pub work_order_id: Option<String>,
}

impl Segment {
    /// End position of this segment: `position + length`.
    pub fn end_position(&self) -> f64 {
        self.position + self.length
    }
}

/// A used bar with its placed segments. The durable output record.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct Cut {
    /// Length of the bar this cut uses.
    pub stock_length: f64,

    /// Placed segments in left-to-right physical order.
    pub segments: Vec<Segment>,

    /// Number of segments, denormalized for consumers of serialized output.
    pub segment_count: usize,

    /// Consumed length: both safety margins, all pieces, and the kerf
    /// between them.
    pub used_length: f64,

    /// `stock_length - used_length`.
    pub remaining_length: f64,

    /// Total kerf loss on this bar.
    pub kerf_loss: f64,

    /// Classification of the remaining length.
    pub waste_category: WasteCategory,

    /// Whether the remaining length reaches the minimum scrap threshold.
    pub is_reclaimable: bool,

    /// Human-readable cutting plan, e.g. `"3 × 918 mm + 2 × 400 mm"`.
    pub plan_label: String,
}

/// Solver selection. `Auto` profiles the instance and picks a strategy; the
/// other variants force one.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Algorithm {
    /// First-fit decreasing greedy placement.
    FirstFitDecreasing,

    /// Best-fit decreasing with fragment penalty and adaptive pattern
    /// upgrade.
    BestFitDecreasing,

    /// Exact lexicographic pattern search: minimum bars, then minimum
    /// waste.
    PatternExact,

    /// Adaptive selection between the strategies above.
    Auto,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Auto
    }
}

/// Error while optimizing.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An item, stock length, or constraint is outside its documented
    /// domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No stock length can accommodate a demanded piece once the safety
    /// margins are subtracted.
    #[error("no stock length can hold a piece of {length} mm with the given margins")]
    Infeasible {
        /// The demanded length that fits nowhere.
        length: f64,
    },

    /// The final cut list does not cover the demand. This means a solver
    /// bug or an exhausted search budget that even greedy placement could
    /// not rescue.
    #[error("cutting plan is short {missing} piece(s) of {length} mm")]
    DemandShortage {
        /// The underproduced length.
        length: f64,
        /// How many pieces are missing.
        missing: usize,
    },

    /// An emitted cut violates an internal invariant. The request is
    /// aborted rather than returning suspect data.
    #[error("cutting plan violates an internal invariant: {0}")]
    InvariantViolation(String),

    /// Accounting drift beyond the supported precision.
    #[error("accounting drift of {drift} mm on a {stock_length} mm bar exceeds {limit} mm")]
    NumericInstability {
        /// Stock length of the offending bar.
        stock_length: f64,
        /// Observed drift in millimetres.
        drift: f64,
        /// The precision threshold that was exceeded.
        limit: f64,
    },
}

/// Result type of this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Conditions recovered internally by falling back to another strategy.
/// They never cross the public boundary.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Recoverable {
    /// Pattern enumeration produced nothing.
    NoPatterns,

    /// A search hit its wall-clock deadline.
    Timeout,

    /// No decomposition exists within one stock budget.
    NoSolutionInBudget,

    /// No decomposition exists within the whole budget range.
    NoSolutionInRange,

    /// The state space was exhausted without an acceptable decomposition.
    NoFeasibleDecomposition,
}

/// Tuning knobs. The defaults are sensible for workshop-sized instances.
#[derive(Clone, Debug)]
pub struct Config {
    /// Fragment-creating placements have their waste divided by this factor
    /// (0.8 inflates them by 25 %).
    pub fragment_penalty_factor: f64,

    /// How many upcoming pieces the best-fit tiebreaker looks at.
    pub look_ahead_depth: usize,

    /// Pattern cap per stock length for the exact solver.
    pub max_patterns_exact: usize,

    /// Pattern cap per stock length for the greedy upgrade path.
    pub max_patterns_greedy: usize,

    /// How many stock budgets above the lower bound the exact driver tries.
    pub search_range: usize,

    /// Wall-clock budget per stock count in the exact driver.
    pub timeout_per_stock_count: Duration,

    /// Expansion budget of the best-first search.
    pub priority_max_states: usize,

    /// Accepted overproduction per length, in pieces. Zero forces exact
    /// coverage.
    pub over_production_tolerance: usize,

    /// Scale that makes waste comparable to bar counts in the best-first
    /// scoring. Derived from the largest usable span when unset.
    pub waste_normalization: Option<f64>,

    /// Patterns below this utilization are not enumerated for the exact
    /// solver.
    pub min_pattern_utilization: f64,

    /// Whether the greedy upgrade path drops dominated patterns.
    pub dominance_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fragment_penalty_factor: 0.8,
            look_ahead_depth: 3,
            max_patterns_exact: 50,
            max_patterns_greedy: 50_000,
            search_range: 10,
            timeout_per_stock_count: Duration::from_secs(60),
            priority_max_states: 20_000,
            over_production_tolerance: 2,
            waste_normalization: None,
            min_pattern_utilization: 0.30,
            dominance_filter: true,
        }
    }
}

/// Cuts of one stock length grouped by their cutting plan.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct PatternSummary {
    /// The shared cutting plan, e.g. `"3 × 918 mm + 2 × 400 mm"`.
    pub plan_label: String,

    /// How many bars are cut to this plan.
    pub count: usize,
}

/// Aggregates over all cuts of one stock length.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct StockSummary {
    /// The stock length these aggregates describe.
    pub stock_length: f64,

    /// Number of bars of this stock length.
    pub count: usize,

    /// Distinct cutting plans and their multiplicities.
    pub patterns: Vec<PatternSummary>,

    /// Total offcut length across these bars.
    pub total_waste: f64,

    /// Mean offcut length per bar.
    pub average_waste: f64,

    /// Material efficiency of these bars, 0–100.
    pub efficiency: f64,
}

/// A valid solution to an optimization.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug)]
pub struct Solution {
    /// The cuts of this solution, in deterministic construction order.
    pub cuts: Vec<Cut>,

    /// The algorithm that actually produced the cuts.
    pub algorithm: Algorithm,

    /// Material efficiency over the whole plan, 0–100.
    pub efficiency: f64,

    /// Total offcut length in millimetres.
    pub total_waste: f64,

    /// Number of bars used.
    pub stock_count: usize,

    /// Number of placed segments.
    pub total_segments: usize,

    /// Total stock length consumed.
    pub total_length: f64,

    /// Total material lost to the saw blade.
    pub total_kerf_loss: f64,

    /// Total material reserved by the safety margins.
    pub total_safety_reserve: f64,

    /// Wall-clock duration of the optimization call.
    pub execution_time_ms: f64,

    /// Cut counts per waste category.
    pub waste_distribution: WasteDistribution,

    /// Detailed waste statistics.
    pub waste_analysis: WasteAnalysis,

    /// Per-stock-length aggregates, longest stock first.
    pub stock_summary: Vec<StockSummary>,

    /// Reserved for future use; always empty.
    pub recommendations: Vec<String>,
}

/// A preprocessed item: one demand entry carried through the greedy solvers
/// with its metadata.
#[derive(Clone, Debug)]
pub(crate) struct PieceEntry {
    pub(crate) length: f64,
    pub(crate) quantity: usize,
    pub(crate) profile: Option<String>,
    pub(crate) work_order_id: Option<String>,
}

impl PieceEntry {
    pub(crate) fn from_item(item: &Item) -> Self {
        PieceEntry {
            length: item.length,
            quantity: item.quantity,
            profile: item.profile.clone(),
            work_order_id: item.work_order_id.clone(),
        }
    }
}

/// Clones the items into entries sorted longest first. The sort is stable,
/// so equal lengths keep their input order and reruns are byte-identical.
pub(crate) fn prepare_entries(items: &[Item]) -> Vec<PieceEntry> {
    let mut entries: Vec<PieceEntry> = items.iter().map(PieceEntry::from_item).collect();
    entries.sort_by(|a, b| {
        b.length
            .partial_cmp(&a.length)
            .expect("item lengths are finite")
    });
    entries
}

/// The demand map: distinct lengths in descending order with their required
/// counts. Lengths keep the exact bit patterns of the input values.
pub(crate) struct Demand {
    lengths: Vec<f64>,
    counts: Vec<usize>,
    index: FnvHashMap<OrderedFloat<f64>, usize>,
}

impl Demand {
    pub(crate) fn from_entries(entries: &[PieceEntry]) -> Self {
        let mut totals: FnvHashMap<OrderedFloat<f64>, usize> = FnvHashMap::default();
        for entry in entries {
            *totals.entry(OrderedFloat(entry.length)).or_default() += entry.quantity;
        }

        let mut lengths: Vec<f64> = totals.keys().map(|key| key.0).collect();
        lengths.sort_by(|a, b| b.partial_cmp(a).expect("item lengths are finite"));

        let counts = lengths
            .iter()
            .map(|length| totals[&OrderedFloat(*length)])
            .collect();
        let index = lengths
            .iter()
            .enumerate()
            .map(|(position, &length)| (OrderedFloat(length), position))
            .collect();

        Demand {
            lengths,
            counts,
            index,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(f64, usize)]) -> Self {
        let items: Vec<Item> = pairs
            .iter()
            .map(|&(length, quantity)| Item::new(length, quantity))
            .collect();
        Self::from_entries(&prepare_entries(&items))
    }

    /// Distinct lengths, longest first. The canonical order every count
    /// vector in the crate is aligned with.
    pub(crate) fn lengths(&self) -> &[f64] {
        &self.lengths
    }

    pub(crate) fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of distinct lengths.
    pub(crate) fn len(&self) -> usize {
        self.lengths.len()
    }

    pub(crate) fn count_of(&self, length: f64) -> usize {
        self.index
            .get(&OrderedFloat(length))
            .map(|&position| self.counts[position])
            .unwrap_or_default()
    }

    pub(crate) fn total_pieces(&self) -> usize {
        self.counts.iter().sum()
    }

    pub(crate) fn total_length(&self) -> f64 {
        self.lengths
            .iter()
            .zip(&self.counts)
            .map(|(&length, &count)| length * count as f64)
            .sum()
    }
}

/// Size characteristics that decide between pattern search and greedy
/// placement.
pub(crate) struct ProblemProfile {
    pub(crate) unique_lengths: usize,
    pub(crate) total_demand: usize,
    pub(crate) estimated_patterns: f64,
}

impl ProblemProfile {
    const MAX_UNIQUE_LENGTHS: usize = 15;
    const MAX_TOTAL_DEMAND: usize = 1000;
    const MAX_ESTIMATED_PATTERNS: f64 = 50_000.0;

    pub(crate) fn of(demand: &Demand) -> Self {
        let unique_lengths = demand.len();
        let total_demand = demand.total_pieces();
        ProblemProfile {
            unique_lengths,
            total_demand,
            estimated_patterns: 2f64.powi(unique_lengths.min(1_000) as i32)
                * total_demand as f64,
        }
    }

    /// Small enough for pattern enumeration to stay tractable.
    pub(crate) fn is_pattern_friendly(&self) -> bool {
        self.unique_lengths <= Self::MAX_UNIQUE_LENGTHS
            && self.total_demand <= Self::MAX_TOTAL_DEMAND
            && self.estimated_patterns <= Self::MAX_ESTIMATED_PATTERNS
    }
}

/// Places as many pieces of this entry as fit into the bar in one operation;
/// any remainder goes back to the front of the queue.
pub(crate) fn place_group(
    bar: &mut BarBuilder,
    mut entry: PieceEntry,
    pending: &mut VecDeque<PieceEntry>,
) {
    let take = entry.quantity.min(bar.capacity_for(entry.length));
    debug_assert!(take >= 1, "place_group called on a bar without room");
    for _ in 0..take {
        bar.push_piece(
            entry.length,
            (entry.profile.clone(), entry.work_order_id.clone()),
        );
    }
    if take < entry.quantity {
        entry.quantity -= take;
        pending.push_front(entry);
    }
}

/// Consumes pending pieces, smallest first, while any still fit into the
/// bar's remaining space.
pub(crate) fn opportunistic_fill(bar: &mut BarBuilder, pending: &mut VecDeque<PieceEntry>) {
    loop {
        let mut best: Option<(usize, f64)> = None;
        for (position, entry) in pending.iter().enumerate() {
            if !bar.fits(entry.length) {
                continue;
            }
            match best {
                Some((_, length)) if length <= entry.length => {}
                _ => best = Some((position, entry.length)),
            }
        }
        let Some((position, _)) = best else {
            break;
        };

        let entry = pending[position].clone();
        let take = entry.quantity.min(bar.capacity_for(entry.length));
        for _ in 0..take {
            bar.push_piece(
                entry.length,
                (entry.profile.clone(), entry.work_order_id.clone()),
            );
        }
        if take == entry.quantity {
            let _ = pending.remove(position);
        } else {
            pending[position].quantity -= take;
        }
    }
}

/// Optimizer for cutting linear pieces from stock lengths.
#[derive(Clone, Debug, Default)]
pub struct Optimizer {
    items: Vec<Item>,
    stock_lengths: Vec<f64>,
    constraints: Constraints,
    config: Config,
    algorithm: Algorithm,
    request_id: Option<String>,
}

impl Optimizer {
    /// Create a new optimizer.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a demand item.
    pub fn add_item(&mut self, item: Item) -> &mut Self {
        self.items.push(item);
        self
    }

    /// Add demand items.
    pub fn add_items<I>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = Item>,
    {
        self.items.extend(items);
        self
    }

    /// Add an available stock length. Stock is assumed to be available in
    /// unlimited quantity; adding the same length twice has no effect.
    pub fn add_stock_length(&mut self, stock_length: f64) -> &mut Self {
        if !self.stock_lengths.contains(&stock_length) {
            self.stock_lengths.push(stock_length);
        }
        self
    }

    /// Add available stock lengths.
    pub fn add_stock_lengths<I>(&mut self, stock_lengths: I) -> &mut Self
    where
        I: IntoIterator<Item = f64>,
    {
        stock_lengths.into_iter().for_each(|stock_length| {
            self.add_stock_length(stock_length);
        });
        self
    }

    /// Set the physical cutting constraints.
    pub fn set_constraints(&mut self, constraints: Constraints) -> &mut Self {
        self.constraints = constraints;
        self
    }

    /// Set the tuning knobs.
    pub fn set_config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// Select the solving strategy. The default is [`Algorithm::Auto`].
    pub fn set_algorithm(&mut self, algorithm: Algorithm) -> &mut Self {
        self.algorithm = algorithm;
        self
    }

    /// Attach an opaque request id that is carried through the log output.
    pub fn set_request_id(&mut self, request_id: impl Into<String>) -> &mut Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Computes a cutting plan covering the full demand.
    ///
    /// The call is synchronous and CPU-bound; every internal cache lives and
    /// dies with it. Given equal input and configuration, two runs return
    /// identical cut lists.
    pub fn optimize(&self) -> Result<Solution> {
        let started = Instant::now();
        let span = debug_span!(
            "optimize",
            request_id = self.request_id.as_deref().unwrap_or("-")
        );
        let _guard = span.enter();

        self.validate()?;

        let mut stock_lengths = self.stock_lengths.clone();
        stock_lengths.sort_by(|a, b| a.partial_cmp(b).expect("stock lengths are finite"));

        let entries = prepare_entries(&self.items);
        let demand = Demand::from_entries(&entries);
        bounds::can_satisfy_demand(&demand, &stock_lengths, &self.constraints)
            .map_err(|length| Error::Infeasible { length })?;

        debug!(
            items = self.items.len(),
            distinct_lengths = demand.len(),
            total_pieces = demand.total_pieces(),
            stocks = stock_lengths.len(),
            algorithm = ?self.algorithm,
            "starting optimization"
        );

        let (cuts, algorithm) = self.run(&entries, &demand, &stock_lengths);

        materialize::validate_demand(&cuts, &demand, self.config.over_production_tolerance)?;
        materialize::check_cuts(&cuts, &stock_lengths, &self.constraints)?;

        let solution = self.assemble(cuts, algorithm, started);
        info!(
            algorithm = ?solution.algorithm,
            stock_count = solution.stock_count,
            efficiency = solution.efficiency,
            execution_time_ms = solution.execution_time_ms,
            "optimization complete"
        );
        Ok(solution)
    }

    /// Dispatches to the selected strategy. Recoverable search failures fall
    /// back down the chain; greedy placement is the feasibility floor.
    fn run(
        &self,
        entries: &[PieceEntry],
        demand: &Demand,
        stock_lengths: &[f64],
    ) -> (Vec<Cut>, Algorithm) {
        match self.algorithm {
            Algorithm::FirstFitDecreasing => (
                ffd::solve(entries, stock_lengths, &self.constraints),
                Algorithm::FirstFitDecreasing,
            ),
            Algorithm::BestFitDecreasing => (
                bfd::solve_adaptive(
                    entries,
                    demand,
                    stock_lengths,
                    &self.constraints,
                    &self.config,
                ),
                Algorithm::BestFitDecreasing,
            ),
            Algorithm::PatternExact => match self.exact_cuts(entries, demand, stock_lengths) {
                Some(cuts) => (cuts, Algorithm::PatternExact),
                None => (
                    bfd::solve(entries, stock_lengths, &self.constraints, &self.config),
                    Algorithm::BestFitDecreasing,
                ),
            },
            Algorithm::Auto => {
                if ProblemProfile::of(demand).is_pattern_friendly() {
                    if let Some(cuts) = self.exact_cuts(entries, demand, stock_lengths) {
                        return (cuts, Algorithm::PatternExact);
                    }
                }
                (
                    bfd::solve_adaptive(
                        entries,
                        demand,
                        stock_lengths,
                        &self.constraints,
                        &self.config,
                    ),
                    Algorithm::BestFitDecreasing,
                )
            }
        }
    }

    /// Runs the exact driver and materializes its pattern uses, or `None`
    /// on any recoverable failure.
    fn exact_cuts(
        &self,
        entries: &[PieceEntry],
        demand: &Demand,
        stock_lengths: &[f64],
    ) -> Option<Vec<Cut>> {
        match dfs::pattern_exact(demand, stock_lengths, &self.constraints, &self.config) {
            Ok(uses) => {
                let mut meta = MetaQueues::from_entries(entries);
                Some(materialize::materialize(
                    &uses,
                    demand,
                    &self.constraints,
                    &mut meta,
                ))
            }
            Err(reason) => {
                warn!(?reason, "exact pattern search failed, falling back to greedy");
                None
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(Error::InvalidInput("no items to optimize".to_string()));
        }
        if self.stock_lengths.is_empty() {
            return Err(Error::InvalidInput("empty stock set".to_string()));
        }

        for item in &self.items {
            if !item.length.is_finite() || item.length <= 0.0 {
                return Err(Error::InvalidInput(format!(
                    "item length {} mm is not a positive finite number",
                    item.length
                )));
            }
            if item.quantity == 0 {
                return Err(Error::InvalidInput(format!(
                    "item of {} mm has zero quantity",
                    item.length
                )));
            }
        }

        for &stock_length in &self.stock_lengths {
            if !stock_length.is_finite() || stock_length <= 0.0 {
                return Err(Error::InvalidInput(format!(
                    "stock length {stock_length} mm is not a positive finite number"
                )));
            }
        }

        let c = &self.constraints;
        for (name, value) in [
            ("kerf width", c.kerf_width),
            ("start safety", c.start_safety),
            ("end safety", c.end_safety),
            ("minimum scrap length", c.min_scrap_length),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "{name} {value} is not a non-negative finite number"
                )));
            }
        }
        if let Some(percentage) = c.max_waste_percentage {
            if !percentage.is_finite() || percentage < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "maximum waste percentage {percentage} is not a non-negative finite number"
                )));
            }
        }
        if c.max_cuts_per_stock == Some(0) {
            return Err(Error::InvalidInput(
                "maximum cuts per stock must be at least one".to_string(),
            ));
        }

        if !self
            .stock_lengths
            .iter()
            .any(|&stock| c.usable_length(stock) > 0.0)
        {
            return Err(Error::InvalidInput(
                "safety margins leave no usable length on any stock".to_string(),
            ));
        }

        // Two almost-equal lengths would collide once accounting rounds to
        // the supported precision.
        let mut lengths: Vec<f64> = self.items.iter().map(|item| item.length).collect();
        lengths.sort_by(|a, b| a.partial_cmp(b).expect("item lengths are finite"));
        lengths.dedup();
        for pair in lengths.windows(2) {
            if geometry::lengths_conflict(pair[0], pair[1]) {
                return Err(Error::InvalidInput(format!(
                    "item lengths {} mm and {} mm differ by less than {} mm",
                    pair[0], pair[1], ACCOUNTING_PRECISION
                )));
            }
        }

        Ok(())
    }

    fn assemble(&self, cuts: Vec<Cut>, algorithm: Algorithm, started: Instant) -> Solution {
        let total_length: f64 = cuts.iter().map(|cut| cut.stock_length).sum();
        let total_waste: f64 = cuts.iter().map(|cut| cut.remaining_length).sum();
        let total_kerf_loss: f64 = cuts.iter().map(|cut| cut.kerf_loss).sum();
        let total_safety_reserve =
            cuts.len() as f64 * (self.constraints.start_safety + self.constraints.end_safety);
        let total_segments = cuts.iter().map(|cut| cut.segment_count).sum();

        let efficiency = geometry::efficiency(
            total_length,
            total_waste + total_kerf_loss + total_safety_reserve,
        );
        let max_waste_percentage = self
            .constraints
            .max_waste_percentage
            .unwrap_or(waste::DEFAULT_MAX_WASTE_PERCENTAGE);

        Solution {
            algorithm,
            efficiency,
            total_waste,
            stock_count: cuts.len(),
            total_segments,
            total_length,
            total_kerf_loss,
            total_safety_reserve,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            waste_distribution: waste::distribution(&cuts),
            waste_analysis: waste::analyze(&cuts, max_waste_percentage),
            stock_summary: stock_summary(&cuts, &self.constraints),
            recommendations: Vec::new(),
            cuts,
        }
    }
}

/// Per-stock-length aggregates, longest stock first.
fn stock_summary(cuts: &[Cut], constraints: &Constraints) -> Vec<StockSummary> {
    let mut stocks: Vec<f64> = Vec::new();
    for cut in cuts {
        if !stocks.contains(&cut.stock_length) {
            stocks.push(cut.stock_length);
        }
    }
    stocks.sort_by(|a, b| b.partial_cmp(a).expect("stock lengths are finite"));

    stocks
        .into_iter()
        .map(|stock_length| {
            let group: Vec<&Cut> = cuts
                .iter()
                .filter(|cut| cut.stock_length == stock_length)
                .collect();

            let mut patterns: Vec<PatternSummary> = Vec::new();
            for cut in &group {
                match patterns
                    .iter_mut()
                    .find(|summary| summary.plan_label == cut.plan_label)
                {
                    Some(summary) => summary.count += 1,
                    None => patterns.push(PatternSummary {
                        plan_label: cut.plan_label.clone(),
                        count: 1,
                    }),
                }
            }

            let total_waste: f64 = group.iter().map(|cut| cut.remaining_length).sum();
            let kerf_loss: f64 = group.iter().map(|cut| cut.kerf_loss).sum();
            let safety =
                group.len() as f64 * (constraints.start_safety + constraints.end_safety);
            let total_stock = stock_length * group.len() as f64;

            StockSummary {
                stock_length,
                count: group.len(),
                patterns,
                total_waste,
                average_waste: total_waste / group.len() as f64,
                efficiency: geometry::efficiency(total_stock, total_waste + kerf_loss + safety),
            }
        })
        .collect()
}
