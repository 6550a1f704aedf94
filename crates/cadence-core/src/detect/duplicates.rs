//! Suppress suggestions that repeat an already confirmed subscription

use crate::detect::service_matcher::normalize_name;
use crate::models::RecurringTransaction;

/// True when a confirmed subscription already covers the candidate
///
/// Names match when either contains the other after normalization. Currency
/// is ignored so the same service billed in two currencies is one subscription.
pub fn is_duplicate(candidate: &RecurringTransaction, confirmed: &[RecurringTransaction]) -> bool {
    let name = normalize_name(candidate.display_name());
    if name.is_empty() {
        return false;
    }

    confirmed.iter().any(|sub| {
        let other = normalize_name(sub.display_name());
        !other.is_empty() && (other.contains(&name) || name.contains(&other))
    })
}
