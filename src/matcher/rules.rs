//! Match rule definitions (C4).
//!
//! Grounded on `original_source/services/matching_engine/intelligent_payment_matcher.py`'s
//! `IntelligentPaymentMatcher._initialize_matching_rules`: same six rules, same
//! priorities, thresholds, tolerances, and date windows. `required_fields`
//! becomes a typed `BTreeSet<Signal>` instead of a list of string literals.

use std::collections::BTreeSet;

/// A scoring signal a rule may require (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Signal {
    Amount,
    Customer,
    Reference,
    Date,
    Partial,
    Overpayment,
}

/// A named predicate + scoring function over (payment, invoice), per spec §4.4.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub name: &'static str,
    pub priority: u8,
    pub confidence_threshold: f64,
    pub amount_tolerance_fraction: f64,
    pub date_window_days: i64,
    pub required_signals: BTreeSet<Signal>,
}

/// The fixed rule set, in priority order, matching the source system exactly.
pub fn default_rules() -> Vec<MatchRule> {
    vec![
        MatchRule {
            name: "exact_amount_and_reference",
            priority: 1,
            confidence_threshold: 0.95,
            amount_tolerance_fraction: 0.001,
            date_window_days: 7,
            required_signals: [Signal::Amount, Signal::Reference].into_iter().collect(),
        },
        MatchRule {
            name: "exact_amount_and_customer",
            priority: 2,
            confidence_threshold: 0.90,
            amount_tolerance_fraction: 0.01,
            date_window_days: 30,
            required_signals: [Signal::Amount, Signal::Customer].into_iter().collect(),
        },
        MatchRule {
            name: "amount_tolerance_strong_customer",
            priority: 3,
            confidence_threshold: 0.85,
            amount_tolerance_fraction: 0.05,
            date_window_days: 14,
            required_signals: [Signal::Customer].into_iter().collect(),
        },
        MatchRule {
            name: "reference_match_amount_tolerance",
            priority: 4,
            confidence_threshold: 0.82,
            amount_tolerance_fraction: 0.10,
            date_window_days: 45,
            required_signals: [Signal::Reference].into_iter().collect(),
        },
        MatchRule {
            name: "partial_payment_customer_match",
            priority: 5,
            confidence_threshold: 0.75,
            amount_tolerance_fraction: 0.0,
            date_window_days: 60,
            required_signals: [Signal::Customer, Signal::Partial].into_iter().collect(),
        },
        MatchRule {
            name: "overpayment_tolerance",
            priority: 6,
            confidence_threshold: 0.70,
            amount_tolerance_fraction: 0.20,
            date_window_days: 30,
            required_signals: [Signal::Customer, Signal::Overpayment].into_iter().collect(),
        },
    ]
}
