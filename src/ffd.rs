//! First-fit decreasing over multiple stock lengths.
//!
//! Pieces are sorted longest first and dropped into the first open bar with
//! room. When a new bar must be opened, the stock length is chosen to keep
//! the per-stock bar counts balanced, falling back to the waste-per-piece
//! criterion when the counts are level.

use std::collections::VecDeque;

use crate::materialize::BarBuilder;
use crate::{geometry, opportunistic_fill, place_group, Constraints, Cut, PieceEntry};

/// Places every piece and returns the finished cuts in bar-opening order.
pub(crate) fn solve(
    entries: &[PieceEntry],
    stock_lengths: &[f64],
    constraints: &Constraints,
) -> Vec<Cut> {
    let mut pending: VecDeque<PieceEntry> = entries.to_vec().into();
    let mut bars: Vec<BarBuilder> = Vec::new();

    while let Some(entry) = pending.pop_front() {
        match bars.iter().position(|bar| bar.fits(entry.length)) {
            Some(index) => {
                place_group(&mut bars[index], entry, &mut pending);
                opportunistic_fill(&mut bars[index], &mut pending);
            }
            None => {
                let stock = stock_for_new_bar(entry.length, stock_lengths, &bars, constraints);
                let mut bar = BarBuilder::new(stock, constraints);
                if !bar.fits(entry.length) {
                    // Entry validation guarantees every piece fits some
                    // stock; the demand check downstream reports anything
                    // that slips through.
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

/// Stock length for a fresh bar: when the per-stock bar counts are level the
/// waste-per-piece criterion decides, otherwise the least-occupied stock
/// that can hold the piece keeps the distribution balanced.
fn stock_for_new_bar(
    item_length: f64,
    stock_lengths: &[f64],
    bars: &[BarBuilder],
    constraints: &Constraints,
) -> f64 {
    let occupancy: Vec<usize> = stock_lengths
        .iter()
        .map(|&stock| {
            bars.iter()
                .filter(|bar| bar.stock_length() == stock)
                .count()
        })
        .collect();

    let balanced = occupancy.windows(2).all(|pair| pair[0] == pair[1]);
    if !balanced {
        let candidate = stock_lengths
            .iter()
            .zip(&occupancy)
            .filter(|(&stock, _)| {
                geometry::max_pieces_on_bar(
                    item_length,
                    stock,
                    constraints.kerf_width,
                    constraints.start_safety,
                    constraints.end_safety,
                ) > 0
            })
            .min_by_key(|(_, &count)| count)
            .map(|(&stock, _)| stock);
        if let Some(stock) = candidate {
            return stock;
        }
    }

    geometry::select_best_stock_length(
        item_length,
        stock_lengths,
        constraints.kerf_width,
        constraints.start_safety,
        constraints.end_safety,
    )
}
