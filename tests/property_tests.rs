use consensus_price_index::aggregator::consensus_price;
use proptest::prelude::*;

// Configure proptest to explicitly use a specific regression file
proptest! {
    #![proptest_config(ProptestConfig {
        // Explicitly set the regression file path
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::Direct(
            "tests/property_tests.proptest-regressions".into()
        ))),
        cases: 100, // Number of test cases to run
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_consensus_within_observed_range(
        prices in prop::collection::vec(1.0..100000.0f64, 1..10),
        threshold in 0.0..1.0f64,
    ) {
        let price = consensus_price(&prices, threshold).unwrap();

        let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        // Property 1: The consensus never leaves the range of observed prices
        prop_assert!(price >= min - 1e-6 && price <= max + 1e-6);
    }

    #[test]
    fn test_consensus_ignores_input_order(
        mut prices in prop::collection::vec(1.0..100000.0f64, 1..10),
    ) {
        let forward = consensus_price(&prices, 0.5).unwrap();
        prices.reverse();
        let backward = consensus_price(&prices, 0.5).unwrap();

        // Property 2: Provider order does not change the result
        prop_assert!((forward - backward).abs() <= forward.abs() * 1e-12);
    }

    #[test]
    fn test_consensus_of_agreeing_prices_is_their_mean(
        base in 100.0..100000.0f64,
        offsets in prop::collection::vec(-0.04..0.04f64, 2..10),
    ) {
        // All prices within 4% of `base` are within 10% of each other's median
        let prices: Vec<f64> = offsets.iter().map(|o| base * (1.0 + o)).collect();
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;

        let price = consensus_price(&prices, 1.0).unwrap();

        // Property 3: Nothing is discarded when every quote agrees
        prop_assert!((price - mean).abs() <= mean * 1e-9);
    }
}
