//! Best-fit decreasing with fragment awareness and an adaptive upgrade.
//!
//! Plain BFD scores every open bar for each piece and takes the tightest
//! fit, inflating placements that would strand an unusable sliver of
//! material. Small instances are upgraded to pattern-based search first;
//! greedy placement remains the floor that always produces a feasible plan.

use std::collections::VecDeque;

use tracing::debug;

use crate::materialize::{self, BarBuilder, MetaQueues};
use crate::pattern::{self, GeneratorOptions};
use crate::{
    geometry, opportunistic_fill, place_group, priority, Config, Constraints, Cut, Demand,
    PieceEntry, ProblemProfile, Recoverable, ACCOUNTING_EPSILON,
};

/// Two adjusted-waste scores closer than this are a tie and fall through to
/// the look-ahead score.
const TIE_EPSILON: f64 = 0.01;

/// Greedy best-fit placement. Always succeeds for validated input: a fresh
/// bar of the thriftiest stock length holds any single piece.
pub(crate) fn solve(
    entries: &[PieceEntry],
    stock_lengths: &[f64],
    constraints: &Constraints,
    config: &Config,
) -> Vec<Cut> {
    let mut pending: VecDeque<PieceEntry> = entries.to_vec().into();
    let mut bars: Vec<BarBuilder> = Vec::new();

    while let Some(entry) = pending.pop_front() {
        match best_bar(&bars, &entry, &pending, constraints, config) {
            Some(index) => {
                place_group(&mut bars[index], entry, &mut pending);
                opportunistic_fill(&mut bars[index], &mut pending);
            }
            None => {
                let stock = geometry::select_best_stock_length(
                    entry.length,
                    stock_lengths,
                    constraints.kerf_width,
                    constraints.start_safety,
                    constraints.end_safety,
                );
                let mut bar = BarBuilder::new(stock, constraints);
                if !bar.fits(entry.length) {
                    debug_assert!(false, "piece fits no stock length");
                    continue;
                }
                place_group(&mut bar, entry, &mut pending);
                opportunistic_fill(&mut bar, &mut pending);
                bars.push(bar);
            }
        }
    }

    bars.into_iter().map(BarBuilder::finalize).collect()
}

/// Index of the open bar with the lowest adjusted waste for this piece, ties
/// decided by the look-ahead score.
fn best_bar(
    bars: &[BarBuilder],
    entry: &PieceEntry,
    pending: &VecDeque<PieceEntry>,
    constraints: &Constraints,
    config: &Config,
) -> Option<usize> {
    let mut best: Option<(usize, f64, f64)> = None;

    for (index, bar) in bars.iter().enumerate() {
        let Some(waste) = bar.waste_after(entry.length) else {
            continue;
        };

        // A fragment is a sliver too short to ever reclaim; inflating its
        // score steers pieces elsewhere unless nothing else fits.
        let fragment = waste > ACCOUNTING_EPSILON
            && waste < constraints.min_scrap_length - ACCOUNTING_EPSILON;
        let adjusted = if fragment {
            waste / config.fragment_penalty_factor
        } else {
            waste
        };

        match best {
            None => {
                let future = future_score(waste, pending, constraints, config);
                best = Some((index, adjusted, future));
            }
            Some((_, best_adjusted, best_future)) => {
                if adjusted < best_adjusted - TIE_EPSILON {
                    let future = future_score(waste, pending, constraints, config);
                    best = Some((index, adjusted, future));
                } else if (adjusted - best_adjusted).abs() < TIE_EPSILON {
                    let future = future_score(waste, pending, constraints, config);
                    if future > best_future {
                        best = Some((index, adjusted, future));
                    }
                }
            }
        }
    }

    best.map(|(index, _, _)| index)
}

/// Fraction of the next few pending pieces that would still fit into `waste`
/// millimetres of free space.
fn future_score(
    waste: f64,
    pending: &VecDeque<PieceEntry>,
    constraints: &Constraints,
    config: &Config,
) -> f64 {
    let considered = pending.len().min(config.look_ahead_depth);
    if considered == 0 {
        return 0.0;
    }
    let fitting = pending
        .iter()
        .take(considered)
        .filter(|entry| entry.length + constraints.kerf_width <= waste + ACCOUNTING_EPSILON)
        .count();
    fitting as f64 / considered as f64
}

/// Adaptive entry point: small instances are upgraded to pattern-based
/// search, everything else (and every recoverable failure) is placed
/// greedily.
pub(crate) fn solve_adaptive(
    entries: &[PieceEntry],
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
    config: &Config,
) -> Vec<Cut> {
    let profile = ProblemProfile::of(demand);
    if profile.is_pattern_friendly() {
        match pattern_path(entries, demand, stock_lengths, constraints, config) {
            Ok(cuts) => return cuts,
            Err(reason) => {
                debug!(?reason, "pattern upgrade failed, placing greedily");
            }
        }
    } else {
        debug!(
            unique_lengths = profile.unique_lengths,
            total_demand = profile.total_demand,
            estimated_patterns = profile.estimated_patterns,
            "instance too large for pattern search"
        );
    }
    solve(entries, stock_lengths, constraints, config)
}

/// Pattern enumeration plus best-first search, materialized into cuts.
fn pattern_path(
    entries: &[PieceEntry],
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
    config: &Config,
) -> Result<Vec<Cut>, Recoverable> {
    let options = GeneratorOptions {
        max_patterns: config.max_patterns_greedy,
        min_utilization: 0.0,
        dominance_filter: config.dominance_filter,
    };
    let mut patterns = pattern::generate(demand, stock_lengths, constraints, &options);
    if patterns.is_empty() {
        return Err(Recoverable::NoPatterns);
    }
    patterns.sort_by(|a, b| {
        b.utilization
            .partial_cmp(&a.utilization)
            .expect("utilization is finite")
            .then_with(|| a.id.cmp(&b.id))
    });

    let normalization = config
        .waste_normalization
        .unwrap_or_else(|| derived_normalization(stock_lengths, constraints));
    let uses = priority::solve(&patterns, demand, config, normalization)?;

    let mut meta = MetaQueues::from_entries(entries);
    Ok(materialize::materialize(&uses, demand, constraints, &mut meta))
}

/// The waste weight has to be commensurate with real offcut sizes, so it is
/// scaled to the largest usable span instead of being a fixed constant.
fn derived_normalization(stock_lengths: &[f64], constraints: &Constraints) -> f64 {
    stock_lengths
        .iter()
        .map(|&stock| constraints.usable_length(stock))
        .fold(0.0, f64::max)
        .max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare_entries;
    use crate::Item;

    fn entries(pairs: &[(f64, usize)]) -> Vec<PieceEntry> {
        let items: Vec<Item> = pairs
            .iter()
            .map(|&(length, quantity)| Item::new(length, quantity))
            .collect();
        prepare_entries(&items)
    }

    fn scrap_constraints() -> Constraints {
        Constraints {
            min_scrap_length: 50.0,
            ..Constraints::default()
        }
    }

    #[test]
    fn feasibility_beats_the_fragment_penalty() {
        // 1950 leaves exactly the reclaimable threshold; adding the 40 turns
        // it into a 10 mm fragment, but one bar still beats two.
        let cuts = solve(
            &entries(&[(1950.0, 1), (40.0, 1)]),
            &[2000.0],
            &scrap_constraints(),
            &Config::default(),
        );
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].segment_count, 2);
        assert!((cuts[0].remaining_length - 10.0).abs() < 1e-9);
        assert!(!cuts[0].is_reclaimable);
    }

    #[test]
    fn penalty_prefers_reclaimable_over_fragment_placement() {
        let constraints = scrap_constraints();
        let config = Config::default();

        let mut bar_tight = BarBuilder::new(2000.0, &constraints);
        bar_tight.push_piece(1700.0, (None, None)); // 300 free
        let mut bar_loose = BarBuilder::new(2000.0, &constraints);
        bar_loose.push_piece(1695.0, (None, None)); // 305 free
        let bars = vec![bar_tight, bar_loose];

        let entry = PieceEntry {
            length: 255.0,
            quantity: 1,
            profile: None,
            work_order_id: None,
        };
        let pending = VecDeque::new();

        // The tight bar would strand a 45 mm fragment, scored 45 / 0.8 =
        // 56.25; the loose bar leaves a reclaimable 50 and wins.
        assert_eq!(
            best_bar(&bars, &entry, &pending, &constraints, &config),
            Some(1)
        );

        // Without a scrap threshold nothing is a fragment and the tighter
        // bar wins on raw waste.
        let no_scrap = Constraints::default();
        assert_eq!(
            best_bar(&bars, &entry, &pending, &no_scrap, &config),
            Some(0)
        );
    }

    #[test]
    fn zero_scrap_threshold_disables_the_penalty() {
        let constraints = Constraints::default();
        let cuts = solve(
            &entries(&[(1950.0, 1), (40.0, 1)]),
            &[2000.0],
            &constraints,
            &Config::default(),
        );
        assert_eq!(cuts.len(), 1);
        // Every offcut is reclaimable once the threshold is zero.
        assert!(cuts.iter().all(|cut| cut.is_reclaimable));
    }

    #[test]
    fn adaptive_upgrade_matches_the_exact_bar_count() {
        let entries = entries(&[(500.0, 2), (300.0, 2)]);
        let demand = Demand::from_entries(&entries);
        let cuts = solve_adaptive(
            &entries,
            &demand,
            &[2000.0],
            &Constraints::default(),
            &Config::default(),
        );
        assert_eq!(cuts.len(), 1);
        assert!((cuts[0].remaining_length - 400.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_instances_go_straight_to_greedy() {
        let pairs: Vec<(f64, usize)> = (0..25).map(|i| (300.0 + 37.0 * i as f64, 120)).collect();
        let entries = entries(&pairs);
        let demand = Demand::from_entries(&entries);
        assert!(!ProblemProfile::of(&demand).is_pattern_friendly());

        let cuts = solve_adaptive(
            &entries,
            &demand,
            &[6000.0],
            &Constraints::default(),
            &Config::default(),
        );
        let pieces: usize = cuts.iter().map(|cut| cut.segment_count).sum();
        assert_eq!(pieces, 25 * 120);
    }

    #[test]
    fn derived_normalization_tracks_the_largest_usable_span() {
        let constraints = Constraints {
            start_safety: 100.0,
            end_safety: 100.0,
            ..Constraints::default()
        };
        assert_eq!(
            derived_normalization(&[3400.0, 6000.0], &constraints),
            5800.0
        );
    }
}
