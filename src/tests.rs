use super::*;

fn items(pairs: &[(f64, usize)]) -> Vec<Item> {
    pairs
        .iter()
        .map(|&(length, quantity)| Item::new(length, quantity))
        .collect()
}

/// Cross-checks a solution against the demand it was computed for: demand
/// coverage, physical segment layout, per-bar accounting, and the metric
/// identities.
fn sanity_check_solution(
    solution: &Solution,
    items: &[Item],
    stock_lengths: &[f64],
    constraints: &Constraints,
) {
    // Every demanded length is covered; overproduction stays within the
    // default tolerance of two pieces per length.
    let mut demanded: Vec<(f64, usize)> = Vec::new();
    for item in items {
        match demanded.iter_mut().find(|(length, _)| *length == item.length) {
            Some((_, count)) => *count += item.quantity,
            None => demanded.push((item.length, item.quantity)),
        }
    }
    for &(length, count) in &demanded {
        let produced = solution
            .cuts
            .iter()
            .flat_map(|cut| &cut.segments)
            .filter(|segment| segment.length == length)
            .count();
        assert!(produced >= count, "short of {length} mm pieces");
        assert!(produced <= count + 2, "overproduced {length} mm pieces");
    }

    for cut in &solution.cuts {
        assert_eq!(cut.segment_count, cut.segments.len());
        assert!(stock_lengths.contains(&cut.stock_length));
        assert!(cut.remaining_length >= -1e-9);
        assert!(
            (cut.used_length + cut.remaining_length - cut.stock_length).abs() < 0.01,
            "bar accounting does not close"
        );

        // Segments sit behind the start margin, in order, a kerf apart.
        assert!(cut.segments[0].position >= constraints.start_safety - 1e-9);
        for window in cut.segments.windows(2) {
            assert!(
                window[1].position + 1e-9
                    >= window[0].end_position() + constraints.kerf_width
            );
        }
        for (index, segment) in cut.segments.iter().enumerate() {
            assert_eq!(segment.sequence, index);
            assert!(demanded.iter().any(|&(length, _)| length == segment.length));
        }
    }

    // The efficiency figure must agree with the segment-based expression.
    let total_pieces: f64 = solution
        .cuts
        .iter()
        .flat_map(|cut| &cut.segments)
        .map(|segment| segment.length)
        .sum();
    if solution.total_length > 0.0 {
        let from_segments = total_pieces / solution.total_length * 100.0;
        assert!((solution.efficiency - from_segments).abs() < 1e-6);
    }

    assert_eq!(solution.stock_count, solution.cuts.len());
    assert_eq!(solution.waste_distribution.total(), solution.cuts.len());
    assert!(solution.recommendations.is_empty());
}

#[test]
fn perfect_fit_single_length() {
    let demand = items(&[(1000.0, 6)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(3000.0)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[3000.0], &Constraints::default());
    assert_eq!(solution.stock_count, 2);
    assert_eq!(solution.algorithm, Algorithm::PatternExact);
    assert_eq!(solution.total_segments, 6);
    assert!((solution.efficiency - 100.0).abs() < 1e-9);
    assert_eq!(solution.total_waste, 0.0);
    for cut in &solution.cuts {
        assert_eq!(cut.segment_count, 3);
        assert_eq!(cut.remaining_length, 0.0);
        let positions: Vec<f64> = cut.segments.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0.0, 1000.0, 2000.0]);
    }
}

#[test]
fn small_mixed_demand_fits_one_bar() {
    let demand = items(&[(500.0, 2), (300.0, 2)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(2000.0)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[2000.0], &Constraints::default());
    assert_eq!(solution.stock_count, 1);
    let cut = &solution.cuts[0];
    assert_eq!(cut.segment_count, 4);
    assert!((cut.remaining_length - 400.0).abs() < 1e-9);
    assert_eq!(cut.plan_label, "2 × 500 mm + 2 × 300 mm");
}

#[test]
fn kerf_and_margins_pick_the_thrifty_stock() {
    let constraints = Constraints {
        kerf_width: 3.0,
        start_safety: 100.0,
        end_safety: 100.0,
        min_scrap_length: 50.0,
        ..Constraints::default()
    };
    let demand = items(&[(918.0, 6)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_lengths([3400.0, 6000.0])
        .set_constraints(constraints.clone())
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[3400.0, 6000.0], &constraints);
    assert_eq!(solution.stock_count, 1);
    let cut = &solution.cuts[0];
    assert_eq!(cut.stock_length, 6000.0);
    assert_eq!(cut.segment_count, 6);
    let positions: Vec<f64> = cut.segments.iter().map(|s| s.position).collect();
    assert_eq!(positions, vec![100.0, 1021.0, 1942.0, 2863.0, 3784.0, 4705.0]);
    assert!((cut.kerf_loss - 15.0).abs() < 1e-9);
    assert!((cut.remaining_length - 277.0).abs() < 1e-9);
}

#[test]
fn fragment_is_accepted_when_feasibility_demands_it() {
    let constraints = Constraints {
        min_scrap_length: 50.0,
        ..Constraints::default()
    };
    let demand = items(&[(1950.0, 1), (40.0, 1)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(2000.0)
        .set_constraints(constraints.clone())
        .set_algorithm(Algorithm::BestFitDecreasing)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[2000.0], &constraints);
    assert_eq!(solution.stock_count, 1);
    let cut = &solution.cuts[0];
    assert!((cut.remaining_length - 10.0).abs() < 1e-9);
    assert!(!cut.is_reclaimable);
    assert_eq!(cut.waste_category, WasteCategory::Minimal);
}

#[test]
fn oversized_instance_falls_back_to_greedy() {
    let pairs: Vec<(f64, usize)> = (0..25).map(|i| (300.0 + 37.0 * i as f64, 120)).collect();
    let demand = items(&pairs);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(6000.0)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[6000.0], &Constraints::default());
    assert_eq!(solution.algorithm, Algorithm::BestFitDecreasing);
    assert_eq!(solution.total_segments, 25 * 120);
}

#[test]
fn exact_demand_is_covered_without_overproduction() {
    let demand = items(&[(400.0, 5), (300.0, 3)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(2000.0)
        .set_config(Config {
            over_production_tolerance: 0,
            ..Config::default()
        })
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[2000.0], &Constraints::default());
    // Zero tolerance: the plan hits the demand multiset exactly, whichever
    // strategy ends up producing it.
    assert_eq!(solution.total_segments, 8);
    let produced_400 = solution
        .cuts
        .iter()
        .flat_map(|cut| &cut.segments)
        .filter(|segment| segment.length == 400.0)
        .count();
    assert_eq!(produced_400, 5);
}

#[test]
fn bounded_overproduction_is_tolerated() {
    // Dominance filtering leaves only the three-piece pattern; covering five
    // pieces then overshoots by one, which the default tolerance accepts.
    let demand = items(&[(1000.0, 5)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(3000.0)
        .set_algorithm(Algorithm::BestFitDecreasing)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[3000.0], &Constraints::default());
    assert_eq!(solution.stock_count, 2);
    assert_eq!(solution.total_segments, 6);
}

#[test]
fn empty_items_are_rejected() {
    let result = Optimizer::new().add_stock_length(3000.0).optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn empty_stock_set_is_rejected() {
    let result = Optimizer::new().add_item(Item::new(1000.0, 1)).optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn non_finite_length_is_rejected() {
    let result = Optimizer::new()
        .add_item(Item::new(f64::NAN, 1))
        .add_stock_length(3000.0)
        .optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn zero_quantity_is_rejected() {
    let result = Optimizer::new()
        .add_item(Item::new(1000.0, 0))
        .add_stock_length(3000.0)
        .optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn near_equal_lengths_are_rejected() {
    let result = Optimizer::new()
        .add_item(Item::new(500.0, 1))
        .add_item(Item::new(500.005, 1))
        .add_stock_length(3000.0)
        .optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn oversized_piece_is_infeasible() {
    let constraints = Constraints {
        start_safety: 100.0,
        end_safety: 100.0,
        ..Constraints::default()
    };
    let result = Optimizer::new()
        .add_item(Item::new(5900.0, 1))
        .add_stock_lengths([3400.0, 6000.0])
        .set_constraints(constraints)
        .optimize();
    assert!(matches!(result, Err(Error::Infeasible { length }) if length == 5900.0));
}

#[test]
fn margins_consuming_every_stock_are_rejected() {
    let constraints = Constraints {
        start_safety: 2000.0,
        end_safety: 2000.0,
        ..Constraints::default()
    };
    let result = Optimizer::new()
        .add_item(Item::new(100.0, 1))
        .add_stock_length(3000.0)
        .set_constraints(constraints)
        .optimize();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn reruns_are_identical() {
    let build = || {
        let mut optimizer = Optimizer::new();
        optimizer
            .add_items(items(&[(918.0, 4), (620.0, 6), (444.0, 3), (300.0, 5)]))
            .add_stock_lengths([3400.0, 6000.0])
            .set_constraints(Constraints {
                kerf_width: 3.0,
                start_safety: 10.0,
                end_safety: 10.0,
                min_scrap_length: 80.0,
                ..Constraints::default()
            });
        optimizer
    };

    let first = build().optimize().unwrap();
    let second = build().optimize().unwrap();
    assert_eq!(first.cuts, second.cuts);
    assert_eq!(first.algorithm, second.algorithm);
    assert_eq!(first.stock_summary, second.stock_summary);
}

#[test]
fn zero_kerf_never_packs_looser() {
    let demand = items(&[(700.0, 5), (500.0, 4), (300.0, 6)]);
    let solve = |kerf_width: f64| {
        Optimizer::new()
            .add_items(demand.clone())
            .add_stock_length(3000.0)
            .set_constraints(Constraints {
                kerf_width,
                ..Constraints::default()
            })
            .optimize()
            .unwrap()
    };

    let tight = solve(0.0);
    let kerfed = solve(5.0);
    assert!(tight.stock_count <= kerfed.stock_count);
    // Total non-piece material can only grow with the kerf.
    let material = |solution: &Solution| solution.total_waste + solution.total_kerf_loss;
    assert!(material(&tight) <= material(&kerfed) + 1e-9);
}

#[test]
fn auto_exact_never_uses_more_bars_than_greedy() {
    let demand = items(&[(918.0, 5), (700.0, 4), (444.0, 6)]);
    let auto = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(6000.0)
        .optimize()
        .unwrap();
    let greedy = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(6000.0)
        .set_algorithm(Algorithm::FirstFitDecreasing)
        .optimize()
        .unwrap();

    if auto.algorithm == Algorithm::PatternExact {
        assert!(auto.stock_count <= greedy.stock_count);
    }
}

#[test]
fn forced_algorithms_are_reported() {
    let demand = items(&[(1000.0, 6)]);
    for (selection, expected) in [
        (Algorithm::FirstFitDecreasing, Algorithm::FirstFitDecreasing),
        (Algorithm::BestFitDecreasing, Algorithm::BestFitDecreasing),
        (Algorithm::PatternExact, Algorithm::PatternExact),
    ] {
        let solution = Optimizer::new()
            .add_items(demand.clone())
            .add_stock_length(3000.0)
            .set_algorithm(selection)
            .optimize()
            .unwrap();
        assert_eq!(solution.algorithm, expected);
        assert_eq!(solution.stock_count, 2);
    }
}

#[test]
fn metadata_is_passed_through_to_segments() {
    let mut item = Item::new(918.0, 3);
    item.profile = Some("IPE200".to_string());
    item.work_order_id = Some("wo-17".to_string());

    let solution = Optimizer::new()
        .add_item(item)
        .add_stock_length(3000.0)
        .optimize()
        .unwrap();

    for cut in &solution.cuts {
        for segment in &cut.segments {
            assert_eq!(segment.profile.as_deref(), Some("IPE200"));
            assert_eq!(segment.work_order_id.as_deref(), Some("wo-17"));
        }
    }
}

#[test]
fn segment_cap_limits_pieces_per_bar() {
    let constraints = Constraints {
        max_cuts_per_stock: Some(2),
        ..Constraints::default()
    };
    let demand = items(&[(500.0, 6)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(3000.0)
        .set_constraints(constraints.clone())
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[3000.0], &constraints);
    assert!(solution.cuts.iter().all(|cut| cut.segment_count <= 2));
    assert_eq!(solution.stock_count, 3);
}

#[test]
fn stock_summary_groups_plans_per_stock_length() {
    let solution = Optimizer::new()
        .add_items(items(&[(1000.0, 6)]))
        .add_stock_length(3000.0)
        .optimize()
        .unwrap();

    assert_eq!(solution.stock_summary.len(), 1);
    let summary = &solution.stock_summary[0];
    assert_eq!(summary.stock_length, 3000.0);
    assert_eq!(summary.count, 2);
    assert_eq!(summary.patterns.len(), 1);
    assert_eq!(summary.patterns[0].plan_label, "3 × 1000 mm");
    assert_eq!(summary.patterns[0].count, 2);
    assert_eq!(summary.total_waste, 0.0);
    assert!((summary.efficiency - 100.0).abs() < 1e-9);
}

#[test]
fn waste_analysis_flags_excessive_cuts() {
    // One bar ends up mostly empty; the default 25 % threshold flags it.
    let demand = items(&[(1600.0, 1), (1200.0, 1)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(2000.0)
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[2000.0], &Constraints::default());
    assert_eq!(solution.stock_count, 2);
    assert!(!solution.waste_analysis.excessive_cuts.is_empty());
    assert!(solution.waste_analysis.average_waste > 0.0);
}

#[test]
fn reclaimable_offcuts_are_reported() {
    let constraints = Constraints {
        min_scrap_length: 100.0,
        ..Constraints::default()
    };
    let demand = items(&[(1700.0, 1)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_length(2000.0)
        .set_constraints(constraints.clone())
        .optimize()
        .unwrap();

    sanity_check_solution(&solution, &demand, &[2000.0], &constraints);
    let cut = &solution.cuts[0];
    assert!((cut.remaining_length - 300.0).abs() < 1e-9);
    assert!(cut.is_reclaimable);
    assert_eq!(cut.waste_category, WasteCategory::Large);
    assert_eq!(solution.waste_analysis.reclaimable_count, 1);
}

#[test]
fn multiple_stock_lengths_are_balanced_by_ffd() {
    let demand = items(&[(1400.0, 8), (900.0, 6)]);
    let solution = Optimizer::new()
        .add_items(demand.clone())
        .add_stock_lengths([3000.0, 4500.0])
        .set_algorithm(Algorithm::FirstFitDecreasing)
        .optimize()
        .unwrap();

    sanity_check_solution(
        &solution,
        &demand,
        &[3000.0, 4500.0],
        &Constraints::default(),
    );
    assert_eq!(solution.algorithm, Algorithm::FirstFitDecreasing);
}

#[test]
fn execution_time_is_reported() {
    let solution = Optimizer::new()
        .add_item(Item::new(1000.0, 3))
        .add_stock_length(3000.0)
        .optimize()
        .unwrap();
    assert!(solution.execution_time_ms >= 0.0);
}

#[cfg(feature = "serialize")]
#[test]
fn solutions_serialize_to_camel_case() {
    let solution = Optimizer::new()
        .add_item(Item::new(1000.0, 3))
        .add_stock_length(3000.0)
        .optimize()
        .unwrap();

    let json = serde_json::to_string(&solution).unwrap();
    assert!(json.contains("\"stockCount\":1"));
    assert!(json.contains("\"planLabel\""));
    assert!(json.contains("\"remainingLength\""));
}
