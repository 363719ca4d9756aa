use consensus_price_index::aggregator::{consensus_price, DEFAULT_CONSENSUS_THRESHOLD};

/// Tests that prices agreeing within 10% of the median are simply averaged.
///
/// This test verifies:
/// 1. No price is discarded when all are close to the median (101)
/// 2. The result is the arithmetic mean of all prices
///
/// Using a tolerance of 0.0001 because the mean of three integers
/// involves a single floating-point division.
#[test]
fn test_consensus_without_outliers() {
    let price = consensus_price(&[100.0, 101.0, 102.0], 0.5).unwrap();

    assert!(
        (price - 101.0).abs() < 0.0001,
        "Expected mean 101.0, but got {}",
        price
    );
}

/// Tests that a single price far from the median is ignored.
///
/// This test verifies:
/// 1. The median of [100, 100, 1000] is 100
/// 2. 1000 deviates by more than 10% and is discarded
/// 3. Two survivors out of three meet the 0.5 threshold, so their mean is used
#[test]
fn test_consensus_discards_outlier() {
    let price = consensus_price(&[100.0, 1000.0, 100.0], 0.5).unwrap();

    assert!(
        (price - 100.0).abs() < 0.0001,
        "Outlier leaked into consensus, got {}",
        price
    );
}

/// Tests the conservative fallback when quotes disagree completely.
///
/// With [10, 1000] the lower-middle median is 10 and 1000 is filtered out.
/// The result must be the median, never a mean dragged towards 1000.
#[test]
fn test_consensus_total_disagreement_returns_median() {
    let price = consensus_price(&[1000.0, 10.0], 0.5).unwrap();

    assert_eq!(price, 10.0);
}

/// Tests that when too many prices are discarded the median is returned
/// instead of the mean of the few survivors.
///
/// Median of [90, 100, 130, 150] is 100 (lower-middle). Only 90 and 100 lie
/// within 10%, i.e. 2 of 4, below the 0.75 threshold (3 required).
#[test]
fn test_consensus_falls_back_to_median_below_threshold() {
    let price = consensus_price(&[150.0, 90.0, 130.0, 100.0], 0.75).unwrap();
    assert_eq!(price, 100.0);

    // With a lower threshold the survivors are averaged instead.
    let price = consensus_price(&[150.0, 95.0, 130.0, 100.0], 0.5).unwrap();
    assert!((price - 97.5).abs() < 0.0001, "got {}", price);
}

/// Tests that a lone price is returned exactly as given.
#[test]
fn test_consensus_single_price() {
    assert_eq!(consensus_price(&[50000.0], DEFAULT_CONSENSUS_THRESHOLD), Some(50000.0));
}

/// Tests the behavior when provided with an empty list of prices.
///
/// An empty round has no consensus at all; the caller decides how to
/// report it.
#[test]
fn test_consensus_empty_prices() {
    assert_eq!(consensus_price(&[], DEFAULT_CONSENSUS_THRESHOLD), None);
}

/// Tests that a price exactly 10% away from the median still counts.
#[test]
fn test_consensus_boundary_deviation_is_kept() {
    let price = consensus_price(&[100.0, 100.0, 110.0], 1.0).unwrap();

    assert!(
        (price - 310.0 / 3.0).abs() < 0.0001,
        "Expected boundary price to be averaged, got {}",
        price
    );
}
