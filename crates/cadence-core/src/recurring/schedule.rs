//! Billing schedule arithmetic and per-occurrence bookkeeping

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;

use crate::config::IdentificationConfig;
use crate::models::{
    Account, BillingCycle, PatternStatus, ProjectedEntry, RecurringTransaction,
};

/// Last day of the month containing `date`
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Date in the month of `anchor` with `day`, clamped to the month's last day
pub fn clamp_to_day(anchor: NaiveDate, day: u32) -> NaiveDate {
    anchor
        .with_day(day)
        .unwrap_or_else(|| end_of_month(anchor))
}

/// The next charge after `from`
///
/// One month later, or one year later for yearly subscriptions. The expected
/// day is clamped to the target month's last day (31st in February → 28th/29th).
pub fn next_expected_date(
    from: NaiveDate,
    expected_day: u32,
    cycle: BillingCycle,
    is_subscription: bool,
) -> NaiveDate {
    let months = if is_subscription && cycle == BillingCycle::Yearly {
        12
    } else {
        1
    };
    let first = from.with_day(1).unwrap_or(from);
    let period = first
        .checked_add_months(Months::new(months))
        .unwrap_or(first);
    clamp_to_day(period, expected_day)
}

/// The first charge strictly after `today`
///
/// Yearly patterns with a known month land in that month; everything else
/// lands in the current month or the following period.
pub fn next_expected_date_from_today(
    expected_day: u32,
    cycle: BillingCycle,
    expected_month: Option<u32>,
    today: NaiveDate,
) -> NaiveDate {
    if let (BillingCycle::Yearly, Some(month)) = (cycle, expected_month) {
        let this_year = NaiveDate::from_ymd_opt(today.year(), month, 1)
            .map(|anchor| clamp_to_day(anchor, expected_day));
        if let Some(date) = this_year.filter(|d| *d > today) {
            return date;
        }
        if let Some(anchor) = NaiveDate::from_ymd_opt(today.year() + 1, month, 1) {
            return clamp_to_day(anchor, expected_day);
        }
    }

    let this_month = clamp_to_day(today, expected_day);
    if this_month > today {
        return this_month;
    }

    let months = if cycle == BillingCycle::Yearly { 12 } else { 1 };
    let first = today.with_day(1).unwrap_or(today);
    let period = first
        .checked_add_months(Months::new(months))
        .unwrap_or(first);
    clamp_to_day(period, expected_day)
}

/// A linked account receives entries from its provider, never from generation
pub fn can_auto_generate(account: Option<&Account>) -> bool {
    account.is_some_and(|a| !a.is_linked())
}

impl RecurringTransaction {
    /// Next charge after `from` under this pattern's schedule
    pub fn calculate_next_expected_date(&self, from: NaiveDate) -> NaiveDate {
        next_expected_date(
            from,
            self.expected_day_of_month,
            self.billing_cycle,
            self.is_subscription,
        )
    }

    /// Recompute `next_expected_date` after billing parameters change
    pub fn reschedule(&mut self, today: NaiveDate) {
        self.next_expected_date = next_expected_date_from_today(
            self.expected_day_of_month,
            self.billing_cycle,
            self.expected_month,
            today,
        );
    }

    /// Record a charge on `date`
    ///
    /// Variance is rolled before the count is incremented so the incremental
    /// mean sees the number of samples already folded in.
    pub fn record_occurrence(&mut self, date: NaiveDate, amount: Option<Decimal>) {
        self.last_occurrence_date = date;
        self.next_expected_date = self.calculate_next_expected_date(date);

        if self.manual {
            if let Some(amount) = amount {
                self.update_amount_variance(amount);
            }
        }

        self.occurrence_count += 1;
        self.status = PatternStatus::Active;
    }

    fn update_amount_variance(&mut self, amount: Decimal) {
        let Some(avg) = self.expected_amount_avg else {
            self.expected_amount_min = Some(amount);
            self.expected_amount_max = Some(amount);
            self.expected_amount_avg = Some(amount);
            return;
        };

        if let Some(min) = self.expected_amount_min {
            self.expected_amount_min = Some(min.min(amount));
        }
        if let Some(max) = self.expected_amount_max {
            self.expected_amount_max = Some(max.max(amount));
        }

        // occurrence_count includes the occurrence that created the pattern
        let samples = i64::from(self.occurrence_count).max(1);
        self.expected_amount_avg = Some(avg + (amount - avg) / Decimal::from(samples));
    }

    /// Advance past the pending charge without recording it
    pub fn skip_occurrence(&mut self) {
        self.next_expected_date = self.calculate_next_expected_date(self.next_expected_date);
    }

    pub fn has_amount_variance(&self) -> bool {
        self.expected_amount_min.is_some() && self.expected_amount_max.is_some()
    }

    /// No charge within the staleness window (longer for manual patterns)
    pub fn should_be_inactive(&self, today: NaiveDate, config: &IdentificationConfig) -> bool {
        let months = if self.manual {
            config.stale_months_manual
        } else {
            config.stale_months_automatic
        };
        match today.checked_sub_months(Months::new(months)) {
            Some(threshold) => self.last_occurrence_date < threshold,
            None => false,
        }
    }

    /// Cost normalized to one month
    pub fn monthly_cost(&self) -> Decimal {
        if self.is_subscription && self.billing_cycle == BillingCycle::Yearly {
            self.amount / Decimal::from(12)
        } else {
            self.amount
        }
    }

    /// Cost normalized to one year
    pub fn yearly_cost(&self) -> Decimal {
        if self.is_subscription && self.billing_cycle == BillingCycle::Monthly {
            self.amount * Decimal::from(12)
        } else {
            self.amount
        }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == PatternStatus::Active && self.next_expected_date < today
    }

    pub fn is_due_today(&self, today: NaiveDate) -> bool {
        self.status == PatternStatus::Active && self.next_expected_date == today
    }

    /// Due today or overdue
    pub fn is_actionable(&self, today: NaiveDate) -> bool {
        self.is_overdue(today) || self.is_due_today(today)
    }

    /// Amount for generated entries: the running average for manual patterns
    pub fn amount_for_transaction(&self) -> Decimal {
        match (self.manual, self.expected_amount_avg) {
            (true, Some(avg)) => avg,
            _ => self.amount,
        }
    }

    /// Upcoming charge for display, None when inactive or not in the future
    pub fn projected_entry(&self, today: NaiveDate) -> Option<ProjectedEntry> {
        if self.status != PatternStatus::Active || self.next_expected_date <= today {
            return None;
        }

        Some(ProjectedEntry {
            date: self.next_expected_date,
            amount: self.amount_for_transaction(),
            currency: self.currency.clone(),
            name: self.display_name().to_string(),
            amount_min: self.expected_amount_min,
            amount_max: self.expected_amount_max,
            amount_avg: self.expected_amount_avg,
            has_variance: self.has_amount_variance(),
        })
    }

    /// The billing period containing `date`: its month, or its year for yearly patterns
    pub fn period_bounds(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self.billing_cycle {
            BillingCycle::Yearly => (
                NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
                NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date),
            ),
            BillingCycle::Monthly => (date.with_day(1).unwrap_or(date), end_of_month(date)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountProvider;
    use crate::test_utils::recurring_fixture;
    use chrono::Utc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_end_of_month() {
        assert_eq!(end_of_month(d("2024-02-10")), d("2024-02-29"));
        assert_eq!(end_of_month(d("2025-02-10")), d("2025-02-28"));
        assert_eq!(end_of_month(d("2025-12-31")), d("2025-12-31"));
    }

    #[test]
    fn test_next_expected_date_clamps() {
        assert_eq!(
            next_expected_date(d("2025-01-31"), 31, BillingCycle::Monthly, true),
            d("2025-02-28")
        );
        assert_eq!(
            next_expected_date(d("2025-02-28"), 31, BillingCycle::Monthly, true),
            d("2025-03-31")
        );
    }

    #[test]
    fn test_next_expected_date_yearly_only_for_subscriptions() {
        assert_eq!(
            next_expected_date(d("2024-02-29"), 29, BillingCycle::Yearly, true),
            d("2025-02-28")
        );
        assert_eq!(
            next_expected_date(d("2025-03-10"), 10, BillingCycle::Yearly, false),
            d("2025-04-10")
        );
    }

    #[test]
    fn test_next_expected_date_from_today() {
        let today = d("2025-03-15");
        assert_eq!(
            next_expected_date_from_today(20, BillingCycle::Monthly, None, today),
            d("2025-03-20")
        );
        // Strictly after today
        assert_eq!(
            next_expected_date_from_today(15, BillingCycle::Monthly, None, today),
            d("2025-04-15")
        );
        assert_eq!(
            next_expected_date_from_today(10, BillingCycle::Yearly, None, today),
            d("2026-03-10")
        );
        assert_eq!(
            next_expected_date_from_today(1, BillingCycle::Yearly, Some(6), today),
            d("2025-06-01")
        );
        assert_eq!(
            next_expected_date_from_today(1, BillingCycle::Yearly, Some(2), today),
            d("2026-02-01")
        );
        assert_eq!(
            next_expected_date_from_today(31, BillingCycle::Monthly, None, d("2025-02-28")),
            d("2025-03-31")
        );
    }

    #[test]
    fn test_record_occurrence_streaming_mean() {
        let mut p = recurring_fixture("Gym", dec("30"), "USD");
        p.manual = true;
        p.occurrence_count = 1;
        p.expected_amount_min = None;
        p.expected_amount_max = None;
        p.expected_amount_avg = None;

        p.record_occurrence(d("2025-02-15"), Some(dec("30")));
        assert_eq!(p.expected_amount_avg, Some(dec("30")));
        assert_eq!(p.occurrence_count, 2);

        // n = occurrence_count - 1 = 1, avg = 30 + (36 - 30) / 2
        p.record_occurrence(d("2025-03-15"), Some(dec("36")));
        assert_eq!(p.expected_amount_avg, Some(dec("33")));
        assert_eq!(p.expected_amount_min, Some(dec("30")));
        assert_eq!(p.expected_amount_max, Some(dec("36")));
        assert_eq!(p.occurrence_count, 3);
        assert_eq!(p.last_occurrence_date, d("2025-03-15"));
        assert_eq!(p.next_expected_date, d("2025-04-15"));
    }

    #[test]
    fn test_record_occurrence_automatic_ignores_amount() {
        let mut p = recurring_fixture("Netflix", dec("15.49"), "USD");
        p.status = PatternStatus::Inactive;
        p.record_occurrence(d("2025-02-15"), Some(dec("99")));
        assert!(p.expected_amount_avg.is_none());
        assert_eq!(p.status, PatternStatus::Active);
        assert_eq!(p.occurrence_count, 4);
    }

    #[test]
    fn test_skip_occurrence() {
        let mut p = recurring_fixture("Netflix", dec("15.49"), "USD");
        p.skip_occurrence();
        assert_eq!(p.next_expected_date, d("2025-03-15"));
        assert_eq!(p.occurrence_count, 3);
        assert_eq!(p.last_occurrence_date, d("2025-01-15"));
    }

    #[test]
    fn test_should_be_inactive() {
        let config = IdentificationConfig::default();
        let mut p = recurring_fixture("Netflix", dec("15.49"), "USD");
        p.last_occurrence_date = d("2025-01-01");

        assert!(!p.should_be_inactive(d("2025-02-28"), &config));
        assert!(p.should_be_inactive(d("2025-03-02"), &config));

        p.manual = true;
        assert!(!p.should_be_inactive(d("2025-06-30"), &config));
        assert!(p.should_be_inactive(d("2025-07-02"), &config));
    }

    #[test]
    fn test_costs() {
        let mut p = recurring_fixture("Adobe", dec("120"), "USD");
        p.is_subscription = true;
        p.billing_cycle = BillingCycle::Yearly;
        assert_eq!(p.monthly_cost(), dec("10"));
        assert_eq!(p.yearly_cost(), dec("120"));

        p.billing_cycle = BillingCycle::Monthly;
        assert_eq!(p.monthly_cost(), dec("120"));
        assert_eq!(p.yearly_cost(), dec("1440"));

        // Non-subscriptions are not normalized
        p.is_subscription = false;
        assert_eq!(p.yearly_cost(), dec("120"));
    }

    #[test]
    fn test_due_states() {
        let mut p = recurring_fixture("Netflix", dec("15.49"), "USD");
        p.next_expected_date = d("2025-02-15");

        assert!(p.is_due_today(d("2025-02-15")));
        assert!(!p.is_overdue(d("2025-02-15")));
        assert!(p.is_overdue(d("2025-02-16")));
        assert!(p.is_actionable(d("2025-02-16")));
        assert!(!p.is_actionable(d("2025-02-14")));

        p.status = PatternStatus::Inactive;
        assert!(!p.is_actionable(d("2025-02-16")));
    }

    #[test]
    fn test_projected_entry() {
        let mut p = recurring_fixture("Utilities", dec("80"), "USD");
        p.manual = true;
        p.expected_amount_min = Some(dec("70"));
        p.expected_amount_max = Some(dec("90"));
        p.expected_amount_avg = Some(dec("82.50"));

        let projected = p.projected_entry(d("2025-02-01")).unwrap();
        assert_eq!(projected.amount, dec("82.50"));
        assert!(projected.has_variance);
        assert_eq!(projected.name, "Utilities");

        assert!(p.projected_entry(d("2025-02-15")).is_none());
    }

    #[test]
    fn test_period_bounds() {
        let mut p = recurring_fixture("Netflix", dec("15.49"), "USD");
        assert_eq!(
            p.period_bounds(d("2024-02-10")),
            (d("2024-02-01"), d("2024-02-29"))
        );
        p.billing_cycle = BillingCycle::Yearly;
        assert_eq!(
            p.period_bounds(d("2024-02-10")),
            (d("2024-01-01"), d("2024-12-31"))
        );
    }

    #[test]
    fn test_can_auto_generate() {
        let mut account = Account {
            id: 1,
            family_id: 1,
            name: "Cash".to_string(),
            currency: "USD".to_string(),
            provider: None,
            created_at: Utc::now(),
        };
        assert!(can_auto_generate(Some(&account)));
        account.provider = Some(AccountProvider::Plaid);
        assert!(!can_auto_generate(Some(&account)));
        assert!(!can_auto_generate(None));
    }
}
