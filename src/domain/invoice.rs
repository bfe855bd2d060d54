use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CustomerId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub String);

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Partial,
    Paid,
    Void,
}

/// An ERP invoice, as returned by the `ERP.fetch_invoices` collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Human-facing invoice number; may differ from `id`.
    pub invoice_number: String,
    pub customer_ref: CustomerId,
    pub total_amount: f64,
    pub amount_due: f64,
    pub currency: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: InvoiceStatus,
    /// Purchase-order or similar external reference.
    pub reference: String,
}
