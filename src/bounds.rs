//! Lower bound on the bar count and demand feasibility checks.

use crate::{geometry, Constraints, Demand};

/// A provable minimum number of bars for the given demand: the total
/// demanded length divided by the largest usable span, rounded up. Any
/// solution must use at least this many bars, so searching can start here.
pub(crate) fn lower_bound(
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
) -> usize {
    let total_length = demand.total_length();
    if total_length <= 0.0 {
        return 0;
    }
    let max_usable = stock_lengths
        .iter()
        .map(|&stock| constraints.usable_length(stock))
        .fold(0.0, f64::max);
    if max_usable <= 0.0 {
        return 1;
    }
    (total_length / max_usable).ceil().max(1.0) as usize
}

/// Every demanded length must fit on at least one stock length once the
/// safety margins are subtracted. Returns the first length that fits
/// nowhere.
pub(crate) fn can_satisfy_demand(
    demand: &Demand,
    stock_lengths: &[f64],
    constraints: &Constraints,
) -> Result<(), f64> {
    for &length in demand.lengths() {
        let fits_somewhere = stock_lengths.iter().any(|&stock| {
            geometry::max_pieces_on_bar(
                length,
                stock,
                constraints.kerf_width,
                constraints.start_safety,
                constraints.end_safety,
            ) > 0
        });
        if !fits_somewhere {
            return Err(length);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_is_total_length_over_largest_usable_span() {
        let demand = Demand::from_pairs(&[(1000.0, 6)]);
        assert_eq!(lower_bound(&demand, &[3000.0], &Constraints::default()), 2);
        assert_eq!(lower_bound(&demand, &[6000.0], &Constraints::default()), 1);
    }

    #[test]
    fn bound_accounts_for_safety_margins() {
        let demand = Demand::from_pairs(&[(1000.0, 3)]);
        let constraints = Constraints {
            start_safety: 100.0,
            end_safety: 100.0,
            ..Constraints::default()
        };
        // usable = 2800 per bar, 3000 mm demanded.
        assert_eq!(lower_bound(&demand, &[3000.0], &constraints), 2);
    }

    #[test]
    fn empty_demand_needs_no_bars() {
        let demand = Demand::from_pairs(&[]);
        assert_eq!(lower_bound(&demand, &[3000.0], &Constraints::default()), 0);
    }

    #[test]
    fn oversized_piece_is_reported() {
        let demand = Demand::from_pairs(&[(1000.0, 1), (9000.0, 1)]);
        let result = can_satisfy_demand(&demand, &[6000.0], &Constraints::default());
        assert_eq!(result, Err(9000.0));
    }

    #[test]
    fn margins_can_make_a_piece_infeasible() {
        let demand = Demand::from_pairs(&[(2900.0, 1)]);
        let constraints = Constraints {
            start_safety: 100.0,
            end_safety: 100.0,
            ..Constraints::default()
        };
        assert_eq!(
            can_satisfy_demand(&demand, &[3000.0], &constraints),
            Err(2900.0)
        );
    }

    #[test]
    fn feasible_demand_passes() {
        let demand = Demand::from_pairs(&[(1000.0, 4), (500.0, 2)]);
        assert!(can_satisfy_demand(&demand, &[3000.0], &Constraints::default()).is_ok());
    }
}
