//! Best-first search over the pattern state space.
//!
//! Used by the greedy solvers when pattern enumeration succeeds but an
//! (almost) exact decomposition of the demand is still wanted. States count
//! how many pieces of each length have been produced so far; the scoring
//! makes any state with unmet demand lose against any state without, and
//! weighs a millimetre of waste against whole bars.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use binary_heap_plus::BinaryHeap;
use compare::Compare;
use fnv::FnvHashMap;
use tracing::debug;

use crate::materialize::PatternUse;
use crate::pattern::{CountVec, Pattern};
use crate::{Config, Demand, Recoverable, ACCOUNTING_EPSILON};

const SHORTAGE_WEIGHT: f64 = 1000.0;
const WASTE_WEIGHT: f64 = 1000.0;

/// Produced counts above this cap all look alike in the visited table.
const VISIT_COUNT_CAP: u32 = 999;

/// Hard wall clock for one search.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall-clock checks are amortized over this many expansions.
const TIMEOUT_CHECK_INTERVAL: usize = 256;

struct Node {
    produced: CountVec,
    bars: u32,
    waste: f64,
    picks: Vec<u32>,
    priority: f64,
}

/// Pops the lowest-priority node first. `binary_heap_plus` pops the maximum
/// under the comparator, so the ordering is reversed, with deterministic
/// tie-breaks.
struct BestFirst;

impl Compare<Node> for BestFirst {
    fn compare(&self, a: &Node, b: &Node) -> Ordering {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.bars.cmp(&a.bars))
            .then_with(|| b.picks.cmp(&a.picks))
    }
}

fn priority_of(shortage: u32, waste: f64, bars: u32, best_density: u32, normalization: f64) -> f64 {
    // Admissible remaining-bar estimate: even the densest pattern needs this
    // many more bars to close the shortage.
    let heuristic = if shortage == 0 {
        0.0
    } else {
        (shortage as f64 / best_density as f64).ceil()
    };
    SHORTAGE_WEIGHT * shortage as f64
        + WASTE_WEIGHT * (waste / normalization)
        + bars as f64
        + heuristic
}

fn shortage_of(produced: &[u32], target: &[u32]) -> u32 {
    produced
        .iter()
        .zip(target)
        .map(|(&have, &want)| want.saturating_sub(have))
        .sum()
}

fn satisfied(produced: &[u32], target: &[u32], tolerance: u32) -> bool {
    produced
        .iter()
        .zip(target)
        .all(|(&have, &want)| want <= have && have <= want + tolerance)
}

fn visit_key(produced: &[u32]) -> CountVec {
    produced.iter().map(|&count| count.min(VISIT_COUNT_CAP)).collect()
}

/// Searches for a pattern multiset whose production matches the demand
/// within the configured over-production tolerance. With a tolerance of
/// zero only an exact decomposition is accepted; if none is reachable the
/// search reports failure rather than its best attempt.
pub(crate) fn solve(
    patterns: &[Pattern],
    demand: &Demand,
    config: &Config,
    waste_normalization: f64,
) -> Result<Vec<PatternUse>, Recoverable> {
    if patterns.is_empty() {
        return Err(Recoverable::NoPatterns);
    }
    debug_assert!(waste_normalization > 0.0);

    let target: CountVec = demand.counts().iter().map(|&count| count as u32).collect();
    let tolerance = config.over_production_tolerance as u32;
    let best_density = patterns
        .iter()
        .map(Pattern::piece_count)
        .max()
        .expect("pattern list is non-empty");

    let mut open = BinaryHeap::from_vec_cmp(Vec::new(), BestFirst);
    let mut visited: FnvHashMap<CountVec, (u32, f64)> = FnvHashMap::default();

    let root_shortage = shortage_of(&vec![0; target.len()], &target);
    open.push(Node {
        produced: demand.counts().iter().map(|_| 0).collect(),
        bars: 0,
        waste: 0.0,
        picks: Vec::new(),
        priority: priority_of(root_shortage, 0.0, 0, best_density, waste_normalization),
    });

    let deadline = Instant::now() + SEARCH_TIMEOUT;
    let mut expansions = 0usize;

    while let Some(node) = open.pop() {
        if satisfied(&node.produced, &target, tolerance) {
            debug!(
                bars = node.bars,
                waste = node.waste,
                expansions,
                "priority search found a decomposition"
            );
            let picks: Vec<usize> = node.picks.iter().map(|&p| p as usize).collect();
            return Ok(PatternUse::group(&picks, patterns));
        }

        expansions += 1;
        if expansions > config.priority_max_states {
            debug!(expansions, "priority search exhausted its state budget");
            return Err(Recoverable::NoFeasibleDecomposition);
        }
        if expansions % TIMEOUT_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            return Err(Recoverable::Timeout);
        }

        for (index, pattern) in patterns.iter().enumerate() {
            // States that already overshoot the tolerated production can
            // never terminate; do not generate them.
            let overshoots = node
                .produced
                .iter()
                .zip(&pattern.counts)
                .zip(&target)
                .any(|((&have, &add), &want)| have + add > want + tolerance);
            if overshoots {
                continue;
            }

            let produced: CountVec = node
                .produced
                .iter()
                .zip(&pattern.counts)
                .map(|(&have, &add)| have + add)
                .collect();
            let bars = node.bars + 1;
            let waste = node.waste + pattern.waste;

            // Keep a state only when it reaches its key with strictly fewer
            // bars, or equal bars and strictly less waste.
            let key = visit_key(&produced);
            match visited.get(&key) {
                Some(&(seen_bars, seen_waste))
                    if bars > seen_bars
                        || (bars == seen_bars && waste >= seen_waste - ACCOUNTING_EPSILON) =>
                {
                    continue;
                }
                _ => {
                    visited.insert(key, (bars, waste));
                }
            }

            let shortage = shortage_of(&produced, &target);
            let mut picks = node.picks.clone();
            picks.push(index as u32);
            open.push(Node {
                produced,
                bars,
                waste,
                picks,
                priority: priority_of(shortage, waste, bars, best_density, waste_normalization),
            });
        }
    }

    debug!(expansions, "priority search ran out of states");
    Err(Recoverable::NoFeasibleDecomposition)
}
