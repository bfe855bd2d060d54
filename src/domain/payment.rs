use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque payment identifier, as issued by the upstream banking feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub String);

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The counterparty on the other side of a payment, as reported by the banking
/// channel. `name` is free text and may contain transaction artifacts (M-Pesa
/// style "FROM JOHN DOE 0712345678 MPESA" strings); see
/// [`crate::matcher::alias`] for normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub account: Option<String>,
    pub channel: String,
}

/// A raw incoming bank payment (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Non-negative amount in `currency`'s minor-unit-free decimal form.
    pub amount: f64,
    /// ISO 4217 currency code.
    pub currency: String,
    pub value_date: DateTime<Utc>,
    pub counterparty: Counterparty,
    pub reference: String,
    pub memo: String,
    pub raw_remittance: String,
    pub client_id: String,
}

impl Payment {
    /// Combined free-text surface used by reference matching (§4.4): reference
    /// plus memo, uppercased.
    pub fn reference_text(&self) -> String {
        format!("{} {}", self.reference, self.memo).to_uppercase()
    }
}
