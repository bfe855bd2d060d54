use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{InvoiceId, PaymentId};

/// Opaque diagnostic bag attached to a [`Match`]. A map of scalars only — never
/// used for control flow (spec §9 design note).
pub type MatchDetails = BTreeMap<String, String>;

/// The result of matching one or more payments to an invoice (spec §3).
///
/// `payment_refs` holds a single id for an ordinary or split match, and more than
/// one for a consolidated match (several payments settling one invoice). The
/// source system encoded the consolidated case as a comma-joined string in the
/// `payment_id` field; this type models it as `Vec<PaymentId>` instead (spec §9
/// Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub payment_refs: Vec<PaymentId>,
    pub invoice_id: InvoiceId,
    pub rule_name: String,
    pub confidence: f64,
    pub amount_to_apply: f64,
    pub remaining_payment: f64,
    pub remaining_invoice: f64,
    pub details: MatchDetails,
}

impl Match {
    /// `true` when this match folds more than one payment onto a single invoice.
    pub fn is_consolidated(&self) -> bool {
        self.payment_refs.len() > 1
    }

    /// The single payment this match applies to. Panics if called on a
    /// consolidated match with more than one payment ref — callers that may see
    /// consolidated matches should use `payment_refs` directly.
    pub fn payment_id(&self) -> &PaymentId {
        self.payment_refs
            .first()
            .expect("Match always carries at least one payment ref")
    }
}
