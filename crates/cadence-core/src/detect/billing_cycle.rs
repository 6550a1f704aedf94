//! Billing cycle classification from charge dates

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::config::BillingCycleConfig;
use crate::models::BillingCycle;

/// Classify a series of charge dates as monthly or yearly
///
/// With two or more dates the mean gap decides. A single charge is judged by
/// how long ago it happened, with a lower age bar for expensive charges.
pub fn classify(
    dates: &[NaiveDate],
    amount: Option<Decimal>,
    today: NaiveDate,
    config: &BillingCycleConfig,
) -> BillingCycle {
    match dates {
        [] => BillingCycle::Monthly,
        [single] => {
            let elapsed = (today - *single).num_days();
            if elapsed >= config.single_charge_yearly_days {
                BillingCycle::Yearly
            } else if elapsed >= config.single_charge_moderate_days
                && amount.is_some_and(|a| a >= config.big_ticket_amount)
            {
                BillingCycle::Yearly
            } else {
                BillingCycle::Monthly
            }
        }
        _ => {
            if mean_gap_days(dates) > config.yearly_mean_gap_days {
                BillingCycle::Yearly
            } else {
                BillingCycle::Monthly
            }
        }
    }
}

/// Arithmetic mean of consecutive gaps (in days) between sorted dates
pub fn mean_gap_days(dates: &[NaiveDate]) -> f64 {
    if dates.len() < 2 {
        return 0.0;
    }

    let mut sorted = dates.to_vec();
    sorted.sort();

    let gaps: Vec<i64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();

    gaps.iter().sum::<i64>() as f64 / gaps.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn classify_default(dates: &[NaiveDate], amount: Option<Decimal>, today: &str) -> BillingCycle {
        classify(dates, amount, d(today), &BillingCycleConfig::default())
    }

    #[test]
    fn test_empty_is_monthly() {
        assert_eq!(classify_default(&[], None, "2025-06-01"), BillingCycle::Monthly);
    }

    #[test]
    fn test_monthly_series() {
        let dates = [d("2025-01-15"), d("2025-02-15"), d("2025-03-15")];
        assert_eq!(classify_default(&dates, None, "2025-03-20"), BillingCycle::Monthly);
    }

    #[test]
    fn test_yearly_series() {
        let dates = [d("2023-01-15"), d("2024-01-15"), d("2025-01-15")];
        assert_eq!(classify_default(&dates, None, "2025-02-01"), BillingCycle::Yearly);
    }

    #[test]
    fn test_unsorted_input() {
        let dates = [d("2025-01-15"), d("2023-01-15"), d("2024-01-15")];
        assert_eq!(classify_default(&dates, None, "2025-02-01"), BillingCycle::Yearly);
    }

    #[test]
    fn test_gap_exactly_threshold_is_monthly() {
        // 300 days is not strictly greater than 300
        let first = d("2024-01-01");
        let second = first + chrono::Duration::days(300);
        assert_eq!(
            classify_default(&[first, second], None, "2025-06-01"),
            BillingCycle::Monthly
        );
    }

    #[test]
    fn test_single_old_charge_is_yearly() {
        assert_eq!(
            classify_default(&[d("2025-01-01")], None, "2025-04-01"),
            BillingCycle::Yearly
        );
    }

    #[test]
    fn test_single_moderate_charge_depends_on_amount() {
        let dates = [d("2025-01-01")];
        // 59 days ago
        assert_eq!(
            classify_default(&dates, Some(Decimal::from(40)), "2025-03-01"),
            BillingCycle::Yearly
        );
        assert_eq!(
            classify_default(&dates, Some(Decimal::new(3999, 2)), "2025-03-01"),
            BillingCycle::Monthly
        );
        assert_eq!(classify_default(&dates, None, "2025-03-01"), BillingCycle::Monthly);
    }

    #[test]
    fn test_single_recent_charge_is_monthly() {
        assert_eq!(
            classify_default(&[d("2025-02-20")], Some(Decimal::from(500)), "2025-03-01"),
            BillingCycle::Monthly
        );
    }

    #[test]
    fn test_mean_gap() {
        let dates = [d("2025-01-01"), d("2025-01-11"), d("2025-01-31")];
        assert_eq!(mean_gap_days(&dates), 15.0);
        assert_eq!(mean_gap_days(&dates[..1]), 0.0);
    }
}
