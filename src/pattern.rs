//! Cutting patterns and their enumeration.
//!
//! A pattern is an immutable multiset of piece lengths that fits into the
//! usable span of one stock length. Pattern-based solvers search over
//! pattern multiplicities instead of individual placements, which keeps the
//! state space independent of the demanded quantities.

use std::hash::Hasher;

use fnv::FnvHasher;
use smallvec::{smallvec, SmallVec};

use crate::{Constraints, Demand, ACCOUNTING_EPSILON};

/// Piece counts aligned with the canonical (descending) length order of the
/// demand map.
pub(crate) type CountVec = SmallVec<[u32; 8]>;

/// An immutable cutting pattern for a single stock length.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Pattern {
    /// Stock length this pattern is cut from.
    pub(crate) stock_length: f64,

    /// Piece counts, aligned with `Demand::lengths`.
    pub(crate) counts: CountVec,

    /// Material consumed inside the usable span: piece lengths plus the kerf
    /// between adjacent pieces. Safety margins are not part of a pattern.
    pub(crate) used: f64,

    /// Usable span left over by this pattern.
    pub(crate) waste: f64,

    /// `used / usable`, in `[0, 1]`.
    pub(crate) utilization: f64,

    /// Stable fingerprint of `(stock_length, counts)`.
    pub(crate) id: u64,
}

impl Pattern {
    pub(crate) fn new(
        stock_length: f64,
        counts: CountVec,
        demand: &Demand,
        constraints: &Constraints,
    ) -> Self {
        let pieces: u32 = counts.iter().sum();
        debug_assert!(pieces > 0, "patterns are never empty");

        let total_piece_length: f64 = counts
            .iter()
            .zip(demand.lengths())
            .map(|(&count, &length)| count as f64 * length)
            .sum();
        let used = total_piece_length + (pieces - 1) as f64 * constraints.kerf_width;
        let usable = constraints.usable_length(stock_length);
        let waste = usable - used;
        let utilization = if usable > 0.0 { used / usable } else { 0.0 };

        let id = fingerprint(stock_length, demand.lengths(), &counts);

        Pattern {
            stock_length,
            counts,
            used,
            waste,
            utilization,
            id,
        }
    }

    /// Total number of pieces cut by this pattern.
    pub(crate) fn piece_count(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Whether this pattern can be applied without overshooting the given
    /// remaining demand.
    pub(crate) fn fits_within(&self, remaining: &[u32]) -> bool {
        self.counts
            .iter()
            .zip(remaining)
            .all(|(&need, &have)| need <= have)
    }
}

/// Stable fingerprint over the exact bit patterns of the inputs. Lengths are
/// the original input values, so equal inputs always hash equally.
fn fingerprint(stock_length: f64, lengths: &[f64], counts: &[u32]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write_u64(stock_length.to_bits());
    for (length, &count) in lengths.iter().zip(counts) {
        if count > 0 {
            hasher.write_u64(length.to_bits());
            hasher.write_u32(count);
        }
    }
    hasher.finish()
}

/// Tuning for the pattern generator. The exact solver wants a small, highly
/// utilized pattern set; the greedy upgrade path wants raw diversity.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GeneratorOptions {
    /// Hard cap on emitted patterns per stock length.
    pub(crate) max_patterns: usize,

    /// Patterns below this utilization are not emitted.
    pub(crate) min_utilization: f64,

    /// Whether dominated patterns are dropped.
    pub(crate) dominance_filter: bool,
}

/// Enumerates every feasible pattern for every stock length, largest stock
/// first. Returns an empty list when nothing fits, which callers treat as a
/// recoverable condition.
pub(crate) fn generate(
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
    options: &GeneratorOptions,
) -> Vec<Pattern> {
    let mut stocks: Vec<f64> = stock_lengths.to_vec();
    stocks.sort_by(|a, b| b.partial_cmp(a).expect("stock lengths are finite"));

    let mut patterns = Vec::new();
    for stock in stocks {
        let mut for_stock = enumerate_for_stock(stock, demand, constraints, options);
        if options.dominance_filter {
            drop_dominated(&mut for_stock);
        }
        patterns.append(&mut for_stock);
    }
    patterns
}

/// Depth-first enumeration over the distinct demanded lengths for one stock
/// length.
fn enumerate_for_stock(
    stock_length: f64,
    demand: &Demand,
    constraints: &Constraints,
    options: &GeneratorOptions,
) -> Vec<Pattern> {
    let usable = constraints.usable_length(stock_length);
    if usable <= 0.0 {
        return Vec::new();
    }

    let max_pieces = constraints.max_cuts_per_stock.unwrap_or(u32::MAX as usize) as u32;
    let mut state = EnumState {
        stock_length,
        usable,
        max_pieces,
        demand,
        constraints,
        options,
        counts: smallvec![0; demand.len()],
        out: Vec::new(),
    };
    state.recurse(0, 0, 0.0);
    state.out
}

struct EnumState<'a> {
    stock_length: f64,
    usable: f64,
    max_pieces: u32,
    demand: &'a Demand,
    constraints: &'a Constraints,
    options: &'a GeneratorOptions,
    counts: CountVec,
    out: Vec<Pattern>,
}

impl EnumState<'_> {
    /// `used` is pattern-space material consumed so far; `pieces` the number
    /// of pieces already chosen at the levels above.
    fn recurse(&mut self, level: usize, pieces: u32, used: f64) {
        if self.out.len() >= self.options.max_patterns {
            return;
        }
        if level == self.demand.len() {
            if pieces > 0 {
                let pattern = Pattern::new(
                    self.stock_length,
                    self.counts.clone(),
                    self.demand,
                    self.constraints,
                );
                if pattern.utilization + ACCOUNTING_EPSILON >= self.options.min_utilization {
                    self.out.push(pattern);
                }
            }
            return;
        }

        let length = self.demand.lengths()[level];
        let kerf = self.constraints.kerf_width;
        let free = self.usable - used;

        // Count bound: remaining demand, remaining free space, segment cap.
        // The first piece on the bar costs no kerf, every later one does.
        let space_bound = if free <= 0.0 {
            0.0
        } else if pieces == 0 {
            ((free + kerf + ACCOUNTING_EPSILON) / (length + kerf)).floor()
        } else {
            ((free + ACCOUNTING_EPSILON) / (length + kerf)).floor()
        };
        let mut max_count = self.demand.counts()[level] as u32;
        max_count = max_count.min(space_bound.max(0.0) as u32);
        max_count = max_count.min(self.max_pieces - pieces);

        // Fullest assignments first so the cap keeps the good patterns.
        for count in (0..=max_count).rev() {
            let added = if count == 0 {
                0.0
            } else if pieces == 0 {
                count as f64 * length + (count - 1) as f64 * kerf
            } else {
                count as f64 * (length + kerf)
            };
            self.counts[level] = count;
            self.recurse(level + 1, pieces + count, used + added);
        }
        self.counts[level] = 0;
    }
}

/// Removes every pattern that is dominated by another pattern on the same
/// stock length: at least the same count of every length with strictly less
/// waste.
fn drop_dominated(patterns: &mut Vec<Pattern>) {
    let mut keep = vec![true; patterns.len()];
    for i in 0..patterns.len() {
        if !keep[i] {
            continue;
        }
        for j in 0..patterns.len() {
            if i == j || !keep[i] {
                continue;
            }
            let p = &patterns[i];
            let q = &patterns[j];
            let covers = q
                .counts
                .iter()
                .zip(&p.counts)
                .all(|(&qc, &pc)| qc >= pc);
            if covers && q.waste < p.waste - ACCOUNTING_EPSILON {
                keep[i] = false;
            }
        }
    }
    let mut it = keep.iter();
    patterns.retain(|_| *it.next().expect("keep mask matches pattern list"));
}
