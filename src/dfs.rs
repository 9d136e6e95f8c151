//! Exact pattern search: minimum bars first, then minimum waste.
//!
//! The solver runs a depth-first search over the remaining demand with a
//! fixed stock budget. The driver asks for the provable lower bound first
//! and widens the budget one bar at a time, so the first budget that yields
//! a solution is optimal in bar count. Waste optimality within a budget is
//! best-effort: every completed decomposition is recorded and the
//! lowest-waste one wins.

use std::time::Instant;

use fnv::FnvHashSet;
use tracing::debug;

use crate::bounds;
use crate::materialize::PatternUse;
use crate::pattern::{self, CountVec, GeneratorOptions, Pattern};
use crate::{Config, Constraints, Demand, Recoverable, ACCOUNTING_EPSILON};

/// Wall-clock checks are amortized over this many search nodes.
const TIMEOUT_CHECK_INTERVAL: u64 = 10_000;

struct Search<'a> {
    patterns: &'a [Pattern],
    /// Piece length (without kerf) cut by each pattern; drives the capacity
    /// prune.
    piece_totals: Vec<f64>,
    max_pattern_used: f64,
    deadline: Instant,
    iterations: u64,
    /// States fully explored without completing a budget-exact solution.
    dead: FnvHashSet<(CountVec, usize)>,
    /// Best completed decomposition so far: picks, bar count, waste.
    best: Option<(Vec<usize>, f64)>,
}

impl Search<'_> {
    /// Records a completed decomposition (demand fully zeroed).
    fn record(&mut self, picks: &[usize]) {
        let waste: f64 = picks.iter().map(|&pick| self.patterns[pick].waste).sum();
        let better = match &self.best {
            None => true,
            Some((best_picks, best_waste)) => {
                picks.len() < best_picks.len()
                    || (picks.len() == best_picks.len() && waste < best_waste - ACCOUNTING_EPSILON)
            }
        };
        if better {
            self.best = Some((picks.to_vec(), waste));
        }
    }

    /// Returns `Ok(true)` when a solution filling the budget exactly was
    /// found, which stops the search.
    fn dfs(
        &mut self,
        remaining: &mut CountVec,
        remaining_length: f64,
        stocks_left: usize,
        picks: &mut Vec<usize>,
    ) -> Result<bool, Recoverable> {
        self.iterations += 1;
        if self.iterations % TIMEOUT_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(Recoverable::Timeout);
        }

        if remaining.iter().all(|&count| count == 0) {
            self.record(picks);
            return Ok(stocks_left == 0);
        }
        if stocks_left == 0 {
            return Ok(false);
        }
        // No point descending if even perfectly packed bars cannot hold the
        // outstanding length.
        if remaining_length > stocks_left as f64 * self.max_pattern_used + ACCOUNTING_EPSILON {
            return Ok(false);
        }

        let key = (remaining.clone(), stocks_left);
        if self.dead.contains(&key) {
            return Ok(false);
        }

        for (index, pattern) in self.patterns.iter().enumerate() {
            if !pattern.fits_within(remaining) {
                continue;
            }

            for (have, &need) in remaining.iter_mut().zip(&pattern.counts) {
                *have -= need;
            }
            picks.push(index);

            let done = self.dfs(
                remaining,
                remaining_length - self.piece_totals[index],
                stocks_left - 1,
                picks,
            )?;

            picks.pop();
            for (have, &need) in remaining.iter_mut().zip(&pattern.counts) {
                *have += need;
            }

            if done {
                return Ok(true);
            }
        }

        self.dead.insert(key);
        Ok(false)
    }
}

/// Searches for a decomposition of `demand` into at most `stock_budget`
/// pattern applications. Patterns must be sorted best-filling first.
pub(crate) fn solve(
    patterns: &[Pattern],
    demand: &Demand,
    stock_budget: usize,
    deadline: Instant,
) -> Result<Vec<usize>, Recoverable> {
    if patterns.is_empty() {
        return Err(Recoverable::NoPatterns);
    }

    let piece_totals: Vec<f64> = patterns
        .iter()
        .map(|p| {
            p.counts
                .iter()
                .zip(demand.lengths())
                .map(|(&count, &length)| count as f64 * length)
                .sum()
        })
        .collect();
    let max_pattern_used = patterns.iter().map(|p| p.used).fold(0.0, f64::max);

    let mut search = Search {
        patterns,
        piece_totals,
        max_pattern_used,
        deadline,
        iterations: 0,
        dead: FnvHashSet::default(),
        best: None,
    };

    let mut remaining: CountVec = demand.counts().iter().map(|&c| c as u32).collect();
    let mut picks = Vec::with_capacity(stock_budget);
    let outcome = search.dfs(
        &mut remaining,
        demand.total_length(),
        stock_budget,
        &mut picks,
    );

    match (outcome, search.best) {
        (Ok(_), Some((best_picks, _))) => Ok(best_picks),
        (Ok(_), None) => Err(Recoverable::NoSolutionInBudget),
        // A timeout with a recorded decomposition still yields a plan.
        (Err(_), Some((best_picks, _))) => Ok(best_picks),
        (Err(recoverable), None) => Err(recoverable),
    }
}

/// Lexicographic driver: enumerate patterns, then try stock budgets from the
/// lower bound upward. The first budget that produces a decomposition gives
/// the minimum bar count.
pub(crate) fn pattern_exact(
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
    config: &Config,
) -> Result<Vec<PatternUse>, Recoverable> {
    let options = GeneratorOptions {
        max_patterns: config.max_patterns_exact,
        min_utilization: config.min_pattern_utilization,
        // An exact cover of the demand needs the sparse remainder patterns
        // that a fuller pattern would dominate, so the filter stays off here.
        dominance_filter: false,
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

    let lower = bounds::lower_bound(demand, stock_lengths, constraints).max(1);
    debug!(
        patterns = patterns.len(),
        lower_bound = lower,
        "starting exact pattern search"
    );

    for budget in lower..=lower + config.search_range {
        let deadline = Instant::now() + config.timeout_per_stock_count;
        match solve(&patterns, demand, budget, deadline) {
            Ok(picks) => {
                debug!(budget, bars = picks.len(), "exact search succeeded");
                return Ok(PatternUse::group(&picks, &patterns));
            }
            Err(Recoverable::Timeout) | Err(Recoverable::NoSolutionInBudget) => continue,
            Err(other) => return Err(other),
        }
    }

    Err(Recoverable::NoSolutionInRange)
}
