//! Property tests for the incremental tally
//!
//! These check the incremental aggregates against a from-scratch
//! recomputation and the bounded rounding of per-project funding.

use std::collections::BTreeMap;

use proptest::prelude::*;
use quadfund_tally::{calculate_optimal_alpha, isqrt, Alpha, QuadraticTally, U256};

fn votes_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((1u64..6, 1u64..10_000), 1..60)
}

fn alpha_strategy() -> impl Strategy<Value = (u64, u64)> {
    (1u64..1_000).prop_flat_map(|den| (0..=den, Just(den)))
}

proptest! {
    #[test]
    fn incremental_tally_matches_recomputation(
        votes in votes_strategy(),
        (num, den) in alpha_strategy(),
    ) {
        let alpha = Alpha::new(U256::from(num), U256::from(den)).unwrap();
        let mut tally = QuadraticTally::new(alpha);
        let mut expected: BTreeMap<u64, (U256, U256)> = BTreeMap::new();

        for (project, weight) in &votes {
            let weight = U256::from(*weight);
            let contribution = weight * weight;
            tally.process_vote_unchecked(*project, contribution, weight).unwrap();

            let entry = expected.entry(*project).or_insert((U256::zero(), U256::zero()));
            entry.0 += contribution;
            entry.1 += weight;
        }

        let mut quadratic_sum = U256::zero();
        let mut linear_sum = U256::zero();
        for (project, (contributions, roots)) in &expected {
            let result = tally.get_tally(*project).unwrap();
            prop_assert_eq!(result.sum_contributions, *contributions);
            prop_assert_eq!(result.sum_square_roots, *roots);
            quadratic_sum += *roots * *roots;
            linear_sum += *contributions;
        }

        prop_assert_eq!(tally.total_quadratic_sum(), quadratic_sum);
        prop_assert_eq!(tally.total_linear_sum(), linear_sum);
        prop_assert_eq!(tally.total_funding(), alpha.blend(quadratic_sum, linear_sum).unwrap());
    }

    #[test]
    fn per_project_funding_never_exceeds_total(
        votes in votes_strategy(),
        (num, den) in alpha_strategy(),
    ) {
        let alpha = Alpha::new(U256::from(num), U256::from(den)).unwrap();
        let mut tally = QuadraticTally::new(alpha);
        for (project, weight) in &votes {
            let weight = U256::from(*weight);
            tally.process_vote_unchecked(*project, weight * weight, weight).unwrap();
        }

        let projects: Vec<u64> = tally.projects().collect();
        let mut allocated = U256::zero();
        for project in &projects {
            allocated += tally.get_tally(*project).unwrap().funding().unwrap();
        }

        let total = tally.total_funding();
        prop_assert!(allocated <= total);
        let bound = U256::from(2 * (projects.len() as u64 - 1));
        prop_assert!(total - allocated <= bound);
    }

    #[test]
    fn validated_path_accepts_exact_square_roots(contribution in 1u64..u64::MAX) {
        let contribution = U256::from(contribution);
        let mut tally = QuadraticTally::default();
        let weight = isqrt(contribution);

        prop_assert!(tally.process_vote(7, contribution, weight).is_ok());
        prop_assert!(tally.process_vote(7, contribution, weight + 1).is_err());
    }

    #[test]
    fn optimal_alpha_spends_exactly_the_assets(
        linear in 1u64..1_000_000,
        extra in 2u64..1_000_000,
        split in 1u64..1_000,
    ) {
        let linear_sum = U256::from(linear);
        let quadratic_sum = U256::from(linear + extra);
        // assets strictly between the linear and quadratic sums
        let assets = linear_sum + U256::from(1 + (extra - 2) * split / 1_000);
        let matching_pool = assets / 2;
        let user_deposits = assets - matching_pool;

        let alpha =
            calculate_optimal_alpha(matching_pool, quadratic_sum, linear_sum, user_deposits)
                .unwrap();
        let num = alpha.numerator();
        let den = alpha.denominator();

        // α·Q + (1 − α)·L == assets, scaled by the denominator
        prop_assert_eq!(num * quadratic_sum + (den - num) * linear_sum, assets * den);
    }
}

#[test]
fn optimal_alpha_reproduces_documented_fraction() {
    let alpha = calculate_optimal_alpha(
        U256::from(500u64),
        U256::from(3600u64),
        U256::from(1400u64),
        U256::from(1000u64),
    )
    .unwrap();

    assert_eq!(alpha.numerator(), U256::from(100u64));
    assert_eq!(alpha.denominator(), U256::from(2200u64));
}

#[test_log::test]
fn set_alpha_to_optimal_spends_total_assets() {
    let mut tally = QuadraticTally::new(Alpha::one());
    tally.process_vote(1, U256::from(100u64), U256::from(10u64)).unwrap();
    tally.process_vote(1, U256::from(400u64), U256::from(20u64)).unwrap();
    tally.process_vote(1, U256::from(900u64), U256::from(30u64)).unwrap();

    let alpha = calculate_optimal_alpha(
        U256::from(500u64),
        tally.total_quadratic_sum(),
        tally.total_linear_sum(),
        U256::from(1000u64),
    )
    .unwrap();
    tally.set_alpha(alpha.numerator(), alpha.denominator()).unwrap();

    // 3600·100/2200 = 163 (floor), 1400·2100/2200 = 1336 (floor)
    assert_eq!(tally.total_funding(), U256::from(163u64 + 1336u64));
    assert!(tally.total_funding() <= U256::from(1500u64));
}
