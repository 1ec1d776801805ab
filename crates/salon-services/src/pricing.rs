//! Pricing calculator
//!
//! `subtotal = Σ price`, `tax = (subtotal + fee) × tax% / 100`,
//! `total = subtotal + fee + tax`, each rounded to cents half away from zero.
//! The booking fee is part of the taxable base.

use rust_decimal::{Decimal, RoundingStrategy};
use salon_core::models::{BranchConfig, PriceSummary};

use crate::constants::MONEY_DECIMAL_PLACES;

/// Round an amount to cents
#[inline]
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Price a set of services under a branch policy
pub fn summarize(prices: &[Decimal], policy: &BranchConfig) -> PriceSummary {
    let subtotal = round_amount(prices.iter().copied().sum());
    let fee = round_amount(policy.booking_fee);
    let tax = round_amount((subtotal + fee) * policy.tax_percentage / Decimal::ONE_HUNDRED);

    PriceSummary {
        subtotal,
        fee,
        tax,
        total: subtotal + fee + tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use salon_core::config::BookingConfig;
    use uuid::Uuid;

    fn policy(fee: Decimal, tax: Decimal) -> BranchConfig {
        let mut config = BranchConfig::from_defaults(Uuid::new_v4(), &BookingConfig::default());
        config.booking_fee = fee;
        config.tax_percentage = tax;
        config
    }

    #[test]
    fn test_single_service_with_fee_and_tax() {
        let summary = summarize(&[dec!(500)], &policy(dec!(50), dec!(10)));
        assert_eq!(summary.subtotal, dec!(500));
        assert_eq!(summary.fee, dec!(50));
        assert_eq!(summary.tax, dec!(55));
        assert_eq!(summary.total, dec!(605));
    }

    #[test]
    fn test_multiple_services_no_policy() {
        let summary = summarize(&[dec!(120.50), dec!(79.50)], &policy(dec!(0), dec!(0)));
        assert_eq!(summary.subtotal, dec!(200));
        assert_eq!(summary.total, dec!(200));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 10.05 × 5% = 0.5025 → 0.50; 10.10 × 5% = 0.505 → 0.51
        assert_eq!(summarize(&[dec!(10.05)], &policy(dec!(0), dec!(5))).tax, dec!(0.50));
        assert_eq!(summarize(&[dec!(10.10)], &policy(dec!(0), dec!(5))).tax, dec!(0.51));
    }

    #[test]
    fn test_fee_is_taxed() {
        let with_fee = summarize(&[dec!(100)], &policy(dec!(20), dec!(10)));
        assert_eq!(with_fee.tax, dec!(12));
        assert_eq!(with_fee.total, dec!(132));
        assert_eq!(with_fee.total, with_fee.subtotal + with_fee.fee + with_fee.tax);
    }

    #[test]
    fn test_empty_prices() {
        let summary = summarize(&[], &policy(dec!(25), dec!(18)));
        assert_eq!(summary.subtotal, Decimal::ZERO);
        assert_eq!(summary.tax, dec!(4.50));
        assert_eq!(summary.total, dec!(29.50));
    }
}
