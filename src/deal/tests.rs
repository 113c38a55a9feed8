use super::*;

#[test]
fn test_boundary_band() {
    let result = evaluate_deal(20_000.0, 20_000.0, 1_000.0, 0.9);
    assert_eq!(result.lower, 18_600.0);
    assert_eq!(result.upper, 21_400.0);
    assert_eq!(result.label, DealLabel::FairPrice);
    assert_eq!(result.confidence_score, 90.0);
}

#[test]
fn test_band_edges_are_fair() {
    assert_eq!(evaluate_deal(18_600.0, 20_000.0, 1_000.0, 0.9).label, DealLabel::FairPrice);
    assert_eq!(evaluate_deal(21_400.0, 20_000.0, 1_000.0, 0.9).label, DealLabel::FairPrice);
    assert_eq!(evaluate_deal(18_599.0, 20_000.0, 1_000.0, 0.9).label, DealLabel::GreatDeal);
    assert_eq!(evaluate_deal(21_401.0, 20_000.0, 1_000.0, 0.9).label, DealLabel::Overpriced);
}

#[test]
fn test_mae_floor_wins_when_larger() {
    // 0.07 * 10000 = 700 < 0.8 * 5000 = 4000
    let result = evaluate_deal(10_000.0, 10_000.0, 5_000.0, 0.5);
    assert_eq!(result.lower, 6_000.0);
    assert_eq!(result.upper, 14_000.0);
}

#[test]
fn test_confidence_clamped_at_zero() {
    assert_eq!(evaluate_deal(1.0, 1.0, 0.0, -0.5).confidence_score, 0.0);
    assert_eq!(evaluate_deal(1.0, 1.0, 0.0, 1.0).confidence_score, 100.0);
    assert_eq!(evaluate_deal(1.0, 1.0, 0.0, 0.87654).confidence_score, 87.65);
}

#[test]
fn test_band_monotonic_in_mae_and_prediction() {
    let policy = DealPolicy::default();
    let maes = [0.0, 100.0, 1_000.0, 5_000.0, 50_000.0];
    for pair in maes.windows(2) {
        assert!(policy.band(20_000.0, pair[1]) >= policy.band(20_000.0, pair[0]));
    }
    let prices = [1_000.0, 10_000.0, 20_000.0, 80_000.0];
    for pair in prices.windows(2) {
        assert!(policy.band(pair[1], 1_000.0) >= policy.band(pair[0], 1_000.0));
    }
}

#[test]
fn test_zero_mae_uses_relative_band() {
    let result = evaluate_deal(0.0, 50_000.0, 0.0, 0.8);
    assert!((result.upper - result.lower - 7_000.0).abs() < 1e-6);
    assert_eq!(result.label, DealLabel::GreatDeal);
}

#[test]
fn test_policy_from_config() {
    let cfg = ValuationConfig {
        band_pct: 0.1,
        mae_factor: 1.0,
        ..Default::default()
    };
    let policy = DealPolicy::from(&cfg);
    let result = policy.evaluate(22_000.0, 20_000.0, 500.0, 0.9);
    assert!((result.upper - 22_000.0).abs() < 1e-6);
    assert_eq!(result.label, DealLabel::FairPrice);
}

#[test]
fn test_round2() {
    assert_eq!(round2(12.345_6), 12.35);
    assert_eq!(round2(-0.004), -0.0);
    assert_eq!(round2(100.0), 100.0);
}
