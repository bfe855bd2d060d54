//! Per-(payment, invoice, rule) scoring (C4).
//!
//! Grounded on `original_source/services/matching_engine/intelligent_payment_matcher.py`'s
//! `_evaluate_payment_invoice_match`, `_match_references`, and
//! `_calculate_date_proximity_score`: same factor formulas and weights, spec
//! §4.4. The customer factor delegates to [`crate::matcher::alias::AliasResolver`]
//! (C3) instead of re-deriving a match per invoice's embedded customer blob.

use std::collections::BTreeMap;

use crate::domain::{Customer, Invoice, Payment};
use crate::matcher::alias::AliasResolver;
use crate::matcher::rules::{MatchRule, Signal};

const WEIGHT_AMOUNT: f64 = 0.4;
const WEIGHT_CUSTOMER: f64 = 0.3;
const WEIGHT_REFERENCE: f64 = 0.2;
const WEIGHT_DATE: f64 = 0.05;
const WEIGHT_PARTIAL: f64 = 0.3;
const WEIGHT_OVERPAYMENT: f64 = 0.25;

/// The outcome of scoring one (payment, invoice) pair against one rule.
#[derive(Debug, Clone)]
pub struct EvaluatedMatch {
    pub confidence: f64,
    pub amount_to_apply: f64,
    pub remaining_payment: f64,
    pub remaining_invoice: f64,
    pub details: BTreeMap<String, String>,
}

/// Scores a single (payment, invoice) pair under `rule`. Returns `None` when no
/// required signal produced a usable factor (the rule fails outright), or when
/// the combined confidence falls below `rule.confidence_threshold`.
pub fn evaluate(
    payment: &Payment,
    invoice: &Invoice,
    rule: &MatchRule,
    resolver: &AliasResolver,
    matcher_config: &crate::config::MatcherConfig,
    payment_customer: Option<&Customer>,
) -> Option<EvaluatedMatch> {
    if payment.currency != invoice.currency {
        return None;
    }

    let mut factors: Vec<(f64, f64)> = Vec::new();
    let mut details = BTreeMap::new();

    // Amount, partial, and overpayment are alternative ways to satisfy the
    // same factor slot, each scored only when the rule actually requires it.
    // A rule that doesn't require a given signal neither gains nor loses a
    // factor from it — only `factors.is_empty()` below fails the rule.
    let amount_diff = (payment.amount - invoice.amount_due).abs();
    let tolerance = invoice.amount_due * rule.amount_tolerance_fraction;
    let mut amount_scored = false;

    if rule.required_signals.contains(&Signal::Amount) && amount_diff <= tolerance {
        let score = (1.0 - amount_diff / invoice.amount_due.max(0.01)).max(0.0);
        factors.push((score, WEIGHT_AMOUNT));
        details.insert("amount_difference".to_string(), amount_diff.to_string());
        amount_scored = true;
    }

    if !amount_scored
        && rule.required_signals.contains(&Signal::Partial)
        && payment.amount < invoice.amount_due
    {
        factors.push((0.8, WEIGHT_PARTIAL));
        details.insert("payment_type".to_string(), "partial".to_string());
        amount_scored = true;
    }

    if !amount_scored
        && rule.required_signals.contains(&Signal::Overpayment)
        && payment.amount > invoice.amount_due
    {
        let overpay_ratio = (payment.amount - invoice.amount_due) / invoice.amount_due;
        if overpay_ratio <= rule.amount_tolerance_fraction {
            let score = (1.0 - overpay_ratio).max(0.6);
            factors.push((score, WEIGHT_OVERPAYMENT));
            details.insert("payment_type".to_string(), "overpayment".to_string());
        }
    }

    if rule.required_signals.contains(&Signal::Customer) {
        let resolution = resolver.resolve(payment, matcher_config);
        let matches_invoice_customer = match (&resolution.customer_id, payment_customer) {
            (Some(resolved), Some(expected)) => *resolved == expected.id,
            _ => false,
        };
        if matches_invoice_customer && resolution.confidence > 0.7 {
            factors.push((resolution.confidence, WEIGHT_CUSTOMER));
            details.insert("customer_match_method".to_string(), resolution.method.as_str().to_string());
        }
    }

    if rule.required_signals.contains(&Signal::Reference) {
        let reference_score = score_reference(payment, invoice);
        if reference_score > 0.7 {
            factors.push((reference_score, WEIGHT_REFERENCE));
            details.insert("reference_match_score".to_string(), reference_score.to_string());
        }
    }

    let date_score = score_date(payment, invoice, rule.date_window_days);
    if date_score > 0.5 {
        factors.push((date_score, WEIGHT_DATE));
        details.insert("date_proximity_score".to_string(), date_score.to_string());
    }

    if factors.is_empty() {
        return None;
    }

    let total_weight: f64 = factors.iter().map(|(_, w)| w).sum();
    let total_confidence: f64 = factors.iter().map(|(s, w)| s * w).sum();
    let confidence = if total_weight > 0.0 {
        (total_confidence / total_weight).min(1.0)
    } else {
        0.0
    };

    if confidence < rule.confidence_threshold {
        return None;
    }

    let amount_to_apply = payment.amount.min(invoice.amount_due);
    let remaining_payment = (payment.amount - amount_to_apply).max(0.0);
    let remaining_invoice = (invoice.amount_due - amount_to_apply).max(0.0);

    Some(EvaluatedMatch {
        confidence,
        amount_to_apply,
        remaining_payment,
        remaining_invoice,
        details,
    })
}

/// Exact substring match scores 0.95; otherwise the best fuzzy partial ratio
/// against the invoice number or reference (spec §4.4).
fn score_reference(payment: &Payment, invoice: &Invoice) -> f64 {
    let payment_text = payment.reference_text();
    let invoice_number = invoice.invoice_number.to_uppercase();
    let invoice_reference = invoice.reference.to_uppercase();
    let invoice_text = format!("{invoice_number} {invoice_reference}");

    if !invoice_number.is_empty() && payment_text.contains(&invoice_number) {
        return 0.95;
    }
    if !payment.reference.is_empty() && invoice_text.contains(&payment.reference.to_uppercase()) {
        return 0.95;
    }

    let invoice_score = if invoice_number.is_empty() {
        0.0
    } else {
        strsim::normalized_levenshtein(&payment_text, &invoice_number)
    };
    let ref_score = if invoice_reference.is_empty() {
        0.0
    } else {
        strsim::normalized_levenshtein(&payment_text, &invoice_reference)
    };

    invoice_score.max(ref_score)
}

fn score_date(payment: &Payment, invoice: &Invoice, date_window_days: i64) -> f64 {
    let day_diff = (payment.value_date - invoice.issue_date).num_days().abs();
    if day_diff > date_window_days {
        return 0.0;
    }
    (1.0 - (day_diff as f64 / date_window_days as f64)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use crate::domain::{Counterparty, CustomerId, InvoiceId, InvoiceStatus, PaymentId};
    use chrono::{Duration, Utc};

    fn invoice() -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId("i1".to_string()),
            invoice_number: "INV-12345".to_string(),
            customer_ref: CustomerId("c1".to_string()),
            total_amount: 1500.0,
            amount_due: 1500.0,
            currency: "EUR".to_string(),
            issue_date: now,
            due_date: now + Duration::days(30),
            status: InvoiceStatus::Open,
            reference: String::new(),
        }
    }

    fn payment() -> Payment {
        Payment {
            id: PaymentId("p1".to_string()),
            amount: 1500.0,
            currency: "EUR".to_string(),
            value_date: Utc::now(),
            counterparty: Counterparty {
                name: Some("John Doe".to_string()),
                phone: None,
                account: None,
                channel: "swift".to_string(),
            },
            reference: "Payment for INV-12345".to_string(),
            memo: String::new(),
            raw_remittance: String::new(),
            client_id: "c1".to_string(),
        }
    }

    #[test]
    fn exact_amount_and_reference_scores_above_threshold() {
        let rules = crate::matcher::rules::default_rules();
        let rule = &rules[0];
        let resolver = AliasResolver::new();
        let config = MatcherConfig::default();

        let result = evaluate(&payment(), &invoice(), rule, &resolver, &config, None)
            .expect("should match on amount + reference");
        assert!(result.confidence >= 0.95);
        assert_eq!(result.amount_to_apply, 1500.0);
        assert_eq!(result.remaining_payment, 0.0);
        assert_eq!(result.remaining_invoice, 0.0);
    }

    #[test]
    fn currency_mismatch_fails_the_rule() {
        let rules = crate::matcher::rules::default_rules();
        let rule = &rules[0];
        let resolver = AliasResolver::new();
        let config = MatcherConfig::default();

        let mut mismatched_invoice = invoice();
        mismatched_invoice.currency = "USD".to_string();

        assert!(evaluate(&payment(), &mismatched_invoice, rule, &resolver, &config, None).is_none());
    }

    #[test]
    fn short_payment_matches_partial_rule() {
        let rules = crate::matcher::rules::default_rules();
        let rule = rules.iter().find(|r| r.name == "partial_payment_customer_match").unwrap();
        let mut resolver = AliasResolver::new();
        let config = MatcherConfig::default();

        let customer = Customer::new(CustomerId("c1".to_string()), "John Doe");
        resolver.register(customer.clone()).unwrap();

        let mut short_payment = payment();
        short_payment.amount = 800.0;
        let mut partial_invoice = invoice();
        partial_invoice.amount_due = 1000.0;

        let result = evaluate(
            &short_payment,
            &partial_invoice,
            rule,
            &resolver,
            &config,
            Some(&customer),
        )
        .expect("partial payment with matching customer should match");
        assert_eq!(result.amount_to_apply, 800.0);
        assert_eq!(result.remaining_invoice, 200.0);
    }
}
