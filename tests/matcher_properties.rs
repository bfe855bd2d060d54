//! Property-based coverage of the matcher's (C5) and alias resolver's (C3)
//! stated invariants (spec §4.3/§4.5): determinism under input reordering,
//! amount conservation, and the phone-exact resolution path always winning
//! when a phone number is present and registered.

use std::collections::BTreeMap;

use cashapp_engine::config::MatcherConfig;
use cashapp_engine::domain::{Counterparty, Customer, CustomerId, Invoice, InvoiceId, InvoiceStatus, Payment, PaymentId};
use cashapp_engine::matcher::{default_rules, match_payments, AliasResolver, ResolutionMethod};
use chrono::Utc;
use proptest::prelude::*;

fn make_payment(id: &str, amount: f64, reference: &str) -> Payment {
    Payment {
        id: PaymentId(id.to_string()),
        amount,
        currency: "KES".to_string(),
        value_date: Utc::now(),
        counterparty: Counterparty { name: Some("Jane Roe".to_string()), phone: None, account: None, channel: "swift".to_string() },
        reference: reference.to_string(),
        memo: String::new(),
        raw_remittance: String::new(),
        client_id: "c1".to_string(),
    }
}

fn make_invoice(id: &str, number: &str, amount_due: f64) -> Invoice {
    let now = Utc::now();
    Invoice {
        id: InvoiceId(id.to_string()),
        invoice_number: number.to_string(),
        customer_ref: CustomerId("c1".to_string()),
        total_amount: amount_due,
        amount_due,
        currency: "KES".to_string(),
        issue_date: now,
        due_date: now + chrono::Duration::days(30),
        status: InvoiceStatus::Open,
        reference: String::new(),
    }
}

/// Scenario S2 (overpayment split, spec §8): a single overpayment carrying
/// both invoice numbers in its memo must resolve to two `_split` matches —
/// one per invoice — whose applied amounts sum to what the invoices actually
/// owed, even though the payment amount matches neither invoice within any
/// rule's tolerance on its own.
#[test]
fn overpayment_against_two_invoices_splits_and_sums_to_what_was_owed() {
    let resolver = AliasResolver::new();
    let config = MatcherConfig::default();
    let customers: BTreeMap<CustomerId, Customer> = BTreeMap::new();
    let rules = default_rules();

    let mut payment = make_payment("p2", 2500.0, "");
    payment.memo = "INV-A INV-B".to_string();
    let invoice_a = make_invoice("invA", "INV-A", 1000.0);
    let invoice_b = make_invoice("invB", "INV-B", 1200.0);

    let (matches, summary) =
        match_payments(&[payment], &[invoice_a, invoice_b], &rules, &resolver, &config, &customers);

    let splits: Vec<_> = matches.iter().filter(|m| m.rule_name.ends_with("_split")).collect();
    assert_eq!(splits.len(), 2, "expected one split match per invoice, got {matches:?}");
    assert_eq!(summary.split_count, 2);

    let total_applied: f64 = splits.iter().map(|m| m.amount_to_apply).sum();
    assert!((total_applied - 2200.0).abs() < 0.01, "total applied was {total_applied}, expected 2200.0");
}

proptest! {
    /// Matching the same payments/invoices in reverse order always yields the
    /// same set of (payment, invoice) pairs — spec §4.5's determinism
    /// requirement, which the matcher achieves by sorting its working pools
    /// internally rather than relying on caller-supplied order.
    #[test]
    fn matching_is_order_independent(
        amounts in prop::collection::vec(100.0f64..5000.0, 1..6),
    ) {
        let resolver = AliasResolver::new();
        let config = MatcherConfig::default();
        let customers: BTreeMap<CustomerId, Customer> = BTreeMap::new();
        let rules = default_rules();

        let payments: Vec<Payment> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| make_payment(&format!("p{i}"), *amount, &format!("Payment for INV-{i}")))
            .collect();
        let invoices: Vec<Invoice> = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| make_invoice(&format!("inv{i}"), &format!("INV-{i}"), *amount))
            .collect();

        let (forward, _) = match_payments(&payments, &invoices, &rules, &resolver, &config, &customers);

        let mut reversed_payments = payments.clone();
        reversed_payments.reverse();
        let mut reversed_invoices = invoices.clone();
        reversed_invoices.reverse();
        let (reversed, _) = match_payments(&reversed_payments, &reversed_invoices, &rules, &resolver, &config, &customers);

        let mut forward_pairs: Vec<(String, String)> =
            forward.iter().map(|m| (m.payment_id().to_string(), m.invoice_id.to_string())).collect();
        let mut reversed_pairs: Vec<(String, String)> =
            reversed.iter().map(|m| (m.payment_id().to_string(), m.invoice_id.to_string())).collect();
        forward_pairs.sort();
        reversed_pairs.sort();

        prop_assert_eq!(forward_pairs, reversed_pairs);
    }

    /// For any single payment matched against a single invoice, the applied
    /// amount plus whatever remains on each side never exceeds what the
    /// payment actually carried or what the invoice actually owed — the
    /// matcher is never allowed to apply money that didn't exist (spec §4.5
    /// "amounts are conserved, never fabricated").
    #[test]
    fn amount_to_apply_never_exceeds_payment_or_invoice(
        payment_amount in 1.0f64..10_000.0,
        invoice_amount in 1.0f64..10_000.0,
    ) {
        let resolver = AliasResolver::new();
        let config = MatcherConfig::default();
        let customers: BTreeMap<CustomerId, Customer> = BTreeMap::new();
        let rules = default_rules();

        let payments = vec![make_payment("p1", payment_amount, "Payment for INV-X")];
        let invoices = vec![make_invoice("invX", "INV-X", invoice_amount)];

        let (matches, _) = match_payments(&payments, &invoices, &rules, &resolver, &config, &customers);

        for m in &matches {
            prop_assert!(m.amount_to_apply <= payment_amount + 0.01);
            prop_assert!(m.amount_to_apply <= invoice_amount + 0.01);
            prop_assert!(m.amount_to_apply >= 0.0);
        }
    }

    /// A phone number registered to a customer always resolves that customer
    /// at the phone-exact confidence (0.98), regardless of what free-text
    /// name accompanies it — phone match takes priority over every other
    /// signal (spec §4.3 resolution order).
    #[test]
    fn registered_phone_always_resolves_exact(
        national_digits in "[1-9][0-9]{8}",
        unrelated_name in "[A-Za-z ]{0,20}",
    ) {
        let mut resolver = AliasResolver::new();
        let mut customer = Customer::new(CustomerId("CUST-PHONE".to_string()), "Registered Customer");
        customer.phone_numbers.insert(format!("+254{national_digits}"));
        resolver.register(customer).unwrap();

        let config = MatcherConfig::default();
        let payment = Payment {
            id: PaymentId("p1".to_string()),
            amount: 100.0,
            currency: "KES".to_string(),
            value_date: Utc::now(),
            counterparty: Counterparty {
                name: if unrelated_name.is_empty() { None } else { Some(unrelated_name) },
                phone: Some(format!("0{national_digits}")),
                account: None,
                channel: "mpesa".to_string(),
            },
            reference: String::new(),
            memo: String::new(),
            raw_remittance: String::new(),
            client_id: "c1".to_string(),
        };

        let resolution = resolver.resolve(&payment, &config);
        prop_assert_eq!(resolution.method, ResolutionMethod::PhoneExact);
        prop_assert_eq!(resolution.customer_id, Some(CustomerId("CUST-PHONE".to_string())));
        prop_assert!((resolution.confidence - 0.98).abs() < 1e-9);
    }
}
