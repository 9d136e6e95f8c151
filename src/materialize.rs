//! Turns solver output into fully positioned cuts and defends the result.
//!
//! Both the greedy solvers and the pattern-based solvers build bars through
//! [`BarBuilder`], so position assignment and accounting live in exactly one
//! place. Demand validation runs unconditionally on every final cut list; it
//! is the last line of defence before a plan leaves the engine.

use std::collections::VecDeque;

use fnv::FnvHashMap;
use ordered_float::OrderedFloat;
use tracing::warn;

use crate::pattern::Pattern;
use crate::{
    geometry, waste, Constraints, Cut, Demand, Error, PieceEntry, Result, Segment,
    ACCOUNTING_EPSILON, ACCOUNTING_PRECISION,
};

/// Pass-through metadata attached to a placed piece: `(profile,
/// work_order_id)`.
pub(crate) type SegmentMeta = (Option<String>, Option<String>);

/// A pattern applied `count` times in a solution.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PatternUse {
    pub(crate) pattern: Pattern,
    pub(crate) count: usize,
}

impl PatternUse {
    /// Compresses a per-bar pick sequence into runs, preserving the
    /// construction order of the bars.
    pub(crate) fn group(picks: &[usize], patterns: &[Pattern]) -> Vec<PatternUse> {
        let mut uses: Vec<PatternUse> = Vec::new();
        for &pick in picks {
            match uses.last_mut() {
                Some(last) if last.pattern.id == patterns[pick].id => last.count += 1,
                _ => uses.push(PatternUse {
                    pattern: patterns[pick].clone(),
                    count: 1,
                }),
            }
        }
        uses
    }
}

/// Per-length FIFO queues of piece metadata, in input order. Pattern-based
/// solvers collapse items into a demand map; these queues let the emitted
/// segments carry the original profile and work-order tags anyway.
pub(crate) struct MetaQueues {
    queues: FnvHashMap<OrderedFloat<f64>, VecDeque<SegmentMeta>>,
}

impl MetaQueues {
    pub(crate) fn from_entries(entries: &[PieceEntry]) -> Self {
        let mut queues: FnvHashMap<OrderedFloat<f64>, VecDeque<SegmentMeta>> =
            FnvHashMap::default();
        for entry in entries {
            let queue = queues.entry(OrderedFloat(entry.length)).or_default();
            for _ in 0..entry.quantity {
                queue.push_back((entry.profile.clone(), entry.work_order_id.clone()));
            }
        }
        MetaQueues { queues }
    }

    /// Next metadata for a piece of `length`. Overproduced pieces beyond the
    /// demanded quantity carry no tags.
    fn pop(&mut self, length: f64) -> SegmentMeta {
        self.queues
            .get_mut(&OrderedFloat(length))
            .and_then(VecDeque::pop_front)
            .unwrap_or((None, None))
    }
}

/// An in-progress bar. Mutable while pieces are being placed, snapshotted
/// into an immutable [`Cut`] at finalization.
pub(crate) struct BarBuilder {
    stock_length: f64,
    usable: f64,
    kerf_width: f64,
    start_safety: f64,
    end_safety: f64,
    min_scrap_length: f64,
    max_segments: usize,
    pieces: Vec<(f64, SegmentMeta)>,
    used: f64,
}

impl BarBuilder {
    pub(crate) fn new(stock_length: f64, constraints: &Constraints) -> Self {
        BarBuilder {
            stock_length,
            usable: constraints.usable_length(stock_length),
            kerf_width: constraints.kerf_width,
            start_safety: constraints.start_safety,
            end_safety: constraints.end_safety,
            min_scrap_length: constraints.min_scrap_length,
            max_segments: constraints.max_cuts_per_stock.unwrap_or(usize::MAX),
            pieces: Vec::new(),
            used: 0.0,
        }
    }

    pub(crate) fn stock_length(&self) -> f64 {
        self.stock_length
    }

    /// Usable space not yet consumed by pieces or kerf.
    pub(crate) fn remaining(&self) -> f64 {
        self.usable - self.used
    }

    pub(crate) fn fits(&self, length: f64) -> bool {
        self.pieces.len() < self.max_segments
            && geometry::can_fit(length, self.remaining(), self.pieces.len(), self.kerf_width)
    }

    /// Usable space that would remain after placing one piece of `length`,
    /// or `None` when it does not fit.
    pub(crate) fn waste_after(&self, length: f64) -> Option<f64> {
        if !self.fits(length) {
            return None;
        }
        let cost = length + geometry::kerf_needed(self.pieces.len(), self.kerf_width);
        Some((self.remaining() - cost).max(0.0))
    }

    /// How many pieces of `length` still fit on this bar.
    pub(crate) fn capacity_for(&self, length: f64) -> usize {
        if !self.fits(length) {
            return 0;
        }
        let first_cost = length + geometry::kerf_needed(self.pieces.len(), self.kerf_width);
        let after_first = self.remaining() - first_cost;
        let more = ((after_first + ACCOUNTING_EPSILON) / (length + self.kerf_width)).floor();
        let by_space = 1 + if more.is_sign_negative() { 0 } else { more as usize };
        by_space.min(self.max_segments - self.pieces.len())
    }

    pub(crate) fn push_piece(&mut self, length: f64, meta: SegmentMeta) {
        debug_assert!(self.fits(length), "piece pushed onto a full bar");
        self.used += length + geometry::kerf_needed(self.pieces.len(), self.kerf_width);
        self.pieces.push((length, meta));
    }

    /// Snapshots this bar into an immutable cut. Positions are assigned in a
    /// single left-to-right pass starting at the start safety margin.
    pub(crate) fn finalize(self) -> Cut {
        let piece_count = self.pieces.len();
        let mut segments = Vec::with_capacity(piece_count);
        let mut position = self.start_safety;
        let mut total_piece_length = 0.0;

        for (sequence, (length, (profile, work_order_id))) in self.pieces.into_iter().enumerate() {
            segments.push(Segment {
                length,
                position,
                sequence,
                profile,
                work_order_id,
            });
            total_piece_length += length;
            position += length;
            if sequence + 1 < piece_count {
                position += self.kerf_width;
            }
        }

        let used_length = geometry::used_length(
            piece_count,
            total_piece_length,
            self.kerf_width,
            self.start_safety,
            self.end_safety,
        );
        let remaining_length = self.stock_length - used_length;
        let kerf_loss = if piece_count > 0 {
            (piece_count - 1) as f64 * self.kerf_width
        } else {
            0.0
        };

        Cut {
            stock_length: self.stock_length,
            plan_label: plan_label(&segments),
            segment_count: segments.len(),
            used_length,
            remaining_length,
            kerf_loss,
            waste_category: waste::categorize(remaining_length),
            is_reclaimable: waste::is_reclaimable(remaining_length, self.min_scrap_length),
            segments,
        }
    }
}

/// Human-readable cutting plan, e.g. `"3 × 918 mm + 2 × 400 mm"`. Lengths
/// are grouped in placement order.
fn plan_label(segments: &[Segment]) -> String {
    let mut groups: Vec<(f64, usize)> = Vec::new();
    for segment in segments {
        match groups.iter_mut().find(|(length, _)| *length == segment.length) {
            Some((_, count)) => *count += 1,
            None => groups.push((segment.length, 1)),
        }
    }
    groups
        .iter()
        .map(|(length, count)| format!("{} × {} mm", count, format_length(*length)))
        .collect::<Vec<_>>()
        .join(" + ")
}

fn format_length(length: f64) -> String {
    if length == length.trunc() {
        format!("{}", length as i64)
    } else {
        format!("{}", length)
    }
}

/// Expands pattern uses into concrete cuts, one bar per use count.
pub(crate) fn materialize(
    uses: &[PatternUse],
    demand: &Demand,
    constraints: &Constraints,
    meta: &mut MetaQueues,
) -> Vec<Cut> {
    let mut cuts = Vec::new();
    for pattern_use in uses {
        for _ in 0..pattern_use.count {
            let mut bar = BarBuilder::new(pattern_use.pattern.stock_length, constraints);
            for (level, &count) in pattern_use.pattern.counts.iter().enumerate() {
                let length = demand.lengths()[level];
                for _ in 0..count {
                    bar.push_piece(length, meta.pop(length));
                }
            }
            cuts.push(bar.finalize());
        }
    }
    cuts
}

/// Compares the length-indexed count of all emitted segments against the
/// demand map. A shortage is fatal; overproduction beyond `tolerance` pieces
/// per length is logged and tolerated.
pub(crate) fn validate_demand(cuts: &[Cut], demand: &Demand, tolerance: usize) -> Result<()> {
    let mut produced: FnvHashMap<OrderedFloat<f64>, usize> = FnvHashMap::default();
    for cut in cuts {
        for segment in &cut.segments {
            *produced.entry(OrderedFloat(segment.length)).or_default() += 1;
        }
    }

    for (&length, &count) in demand.lengths().iter().zip(demand.counts()) {
        let got = produced
            .get(&OrderedFloat(length))
            .copied()
            .unwrap_or_default();
        if got < count {
            return Err(Error::DemandShortage {
                length,
                missing: count - got,
            });
        }
        if got > count + tolerance {
            warn!(
                length,
                demanded = count,
                produced = got,
                "overproduction beyond the configured tolerance"
            );
        }
    }

    for (&OrderedFloat(length), _) in &produced {
        if demand.count_of(length) == 0 {
            return Err(Error::InvariantViolation(format!(
                "segment length {length} mm was never demanded"
            )));
        }
    }

    Ok(())
}

/// Enforces the per-cut invariants on emitted output. Any failure here is a
/// programmer error; the engine aborts the request rather than return
/// suspect data.
pub(crate) fn check_cuts(
    cuts: &[Cut],
    stock_lengths: &[f64],
    constraints: &Constraints,
) -> Result<()> {
    for (index, cut) in cuts.iter().enumerate() {
        let fail = |message: String| {
            Err(Error::InvariantViolation(format!("cut {index}: {message}")))
        };

        if cut.segment_count != cut.segments.len() {
            return fail(format!(
                "segment count {} does not match {} segments",
                cut.segment_count,
                cut.segments.len()
            ));
        }
        if cut.segments.is_empty() {
            return fail("no segments".to_string());
        }
        if !stock_lengths.iter().any(|&stock| stock == cut.stock_length) {
            return fail(format!("unknown stock length {}", cut.stock_length));
        }
        if cut.remaining_length < -ACCOUNTING_EPSILON {
            return fail(format!("negative remainder {}", cut.remaining_length));
        }

        if !geometry::validate_accounting(
            cut.used_length,
            cut.remaining_length,
            cut.stock_length,
            ACCOUNTING_PRECISION,
        ) {
            return Err(Error::NumericInstability {
                stock_length: cut.stock_length,
                drift: (cut.used_length + cut.remaining_length - cut.stock_length).abs(),
                limit: ACCOUNTING_PRECISION,
            });
        }

        let total_piece_length: f64 = cut.segments.iter().map(|s| s.length).sum();
        let expected_used = geometry::used_length(
            cut.segments.len(),
            total_piece_length,
            constraints.kerf_width,
            constraints.start_safety,
            constraints.end_safety,
        );
        if (cut.used_length - expected_used).abs() >= ACCOUNTING_PRECISION {
            return fail(format!(
                "used length {} differs from recomputed {}",
                cut.used_length, expected_used
            ));
        }

        if cut.segments[0].position < constraints.start_safety - ACCOUNTING_EPSILON {
            return fail("first segment starts inside the start safety margin".to_string());
        }
        for window in cut.segments.windows(2) {
            let gap_start = window[0].end_position() + constraints.kerf_width;
            if window[1].position + ACCOUNTING_EPSILON < gap_start {
                return fail(format!(
                    "segments at {} and {} overlap the kerf",
                    window[0].position, window[1].position
                ));
            }
            if window[1].position <= window[0].position {
                return fail("segment positions are not strictly increasing".to_string());
            }
        }

        let reclaimable =
            waste::is_reclaimable(cut.remaining_length, constraints.min_scrap_length);
        if cut.is_reclaimable != reclaimable {
            return fail("reclaimability flag disagrees with the remainder".to_string());
        }
        if cut.waste_category != waste::categorize(cut.remaining_length) {
            return fail("waste category disagrees with the remainder".to_string());
        }
    }
    Ok(())
}
