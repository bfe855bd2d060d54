//! Collaborator interfaces (spec §6 "External Interfaces"): narrow async
//! traits for the systems this crate never implements itself (OCR, ERP,
//! notifications, manual review). Each trait is wrapped in a thin
//! [`crate::workflow::activity::Collaborator`] adapter so the workflow engine
//! can invoke it through the common retry/timeout/cancellation machinery.
//!
//! Grounded on the teacher's `connectors/core.rs` `Connector` (associated
//! `Input`/`Output` types, object-safe via no generics in the trait methods)
//! and `connectors/rest.rs` for the in-memory test-double shape.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Invoice, Match, Payment};
use crate::error::WorkflowError;
use crate::workflow::activity::{ActivityContext, Collaborator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedInvoiceIds {
    pub ids: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCashApplicationReceipt {
    pub updated_systems: Vec<String>,
    pub receipts: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyReceipt {
    pub sent: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualReviewReceipt {
    pub review_id: String,
    pub assigned_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAssessment {
    pub update_required: bool,
    pub recommended_limit: f64,
    pub risk_score: f64,
}

/// `OCR.extract_invoice_ids` (spec §6).
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn extract_invoice_ids(&self, payment_document_ref: &str) -> Result<ExtractedInvoiceIds, WorkflowError>;
}

/// `ERP.fetch_invoices` / `ERP.post_cash_application`, plus the credit-side
/// operations `CreditReviewWorkflow` needs — the ERP is the natural system of
/// record for both cash application and credit limits (spec §4.7 names both
/// operations without assigning a separate collaborator).
#[async_trait]
pub trait ErpClient: Send + Sync {
    async fn fetch_invoices(&self, ids: &[String], correlation_id: &str) -> Result<Vec<Invoice>, WorkflowError>;
    async fn post_cash_application(&self, applied: &Match, payment: &Payment) -> Result<PostCashApplicationReceipt, WorkflowError>;
    async fn assess_credit_risk(&self, customer_id: &str) -> Result<CreditAssessment, WorkflowError>;
    async fn update_credit_limits(&self, customer_id: &str, new_limit: f64) -> Result<(), WorkflowError>;
}

/// `Notify.send` (spec §6).
#[async_trait]
pub trait NotifyClient: Send + Sync {
    async fn send(&self, event_kind: &str, recipients: &[String], payload: Value) -> Result<NotifyReceipt, WorkflowError>;
}

/// `ManualReview.create` (spec §6).
#[async_trait]
pub trait ManualReviewClient: Send + Sync {
    async fn create(&self, payment_id: &str, reason: &str, details: Value) -> Result<ManualReviewReceipt, WorkflowError>;
}

macro_rules! collaborator_adapter {
    ($name:ident, $input:ty, $output:ty, $client:ident, $method:ident($($pat:ident),*), ($($call:expr),*)) => {
        pub struct $name(pub Arc<dyn $client>);

        #[async_trait]
        impl Collaborator for $name {
            type Input = $input;
            type Output = $output;

            async fn call(&self, input: Self::Input, _ctx: &ActivityContext) -> Result<Self::Output, WorkflowError> {
                let ($($pat,)*) = input;
                self.0.$method($($call),*).await
            }
        }
    };
}

collaborator_adapter!(ExtractInvoiceIdsCall, (String,), ExtractedInvoiceIds, OcrClient, extract_invoice_ids(payment_document_ref), (&payment_document_ref));
collaborator_adapter!(FetchInvoicesCall, (Vec<String>, String), Vec<Invoice>, ErpClient, fetch_invoices(ids, correlation_id), (&ids, &correlation_id));
collaborator_adapter!(PostCashApplicationCall, (Match, Payment), PostCashApplicationReceipt, ErpClient, post_cash_application(applied, payment), (&applied, &payment));
collaborator_adapter!(AssessCreditRiskCall, (String,), CreditAssessment, ErpClient, assess_credit_risk(customer_id), (&customer_id));
collaborator_adapter!(UpdateCreditLimitsCall, (String, f64), (), ErpClient, update_credit_limits(customer_id, new_limit), (&customer_id, new_limit));
collaborator_adapter!(SendNotificationCall, (String, Vec<String>, Value), NotifyReceipt, NotifyClient, send(event_kind, recipients, payload), (&event_kind, &recipients, payload));
collaborator_adapter!(CreateManualReviewCall, (String, String, Value), ManualReviewReceipt, ManualReviewClient, create(payment_id, reason, details), (&payment_id, &reason, details));

/// In-memory test doubles, fixture-backed rather than networked, for the
/// engine's own tests and for `tests/` integration scenarios.
pub mod doubles {
    use super::*;

    #[derive(Default)]
    pub struct InMemoryOcr {
        pub fixtures: DashMap<String, ExtractedInvoiceIds>,
    }

    #[async_trait]
    impl OcrClient for InMemoryOcr {
        async fn extract_invoice_ids(&self, payment_document_ref: &str) -> Result<ExtractedInvoiceIds, WorkflowError> {
            Ok(self
                .fixtures
                .get(payment_document_ref)
                .map(|entry| entry.clone())
                .unwrap_or(ExtractedInvoiceIds { ids: Vec::new(), warnings: Vec::new() }))
        }
    }

    #[derive(Default)]
    pub struct InMemoryErp {
        pub invoices: DashMap<String, Invoice>,
        pub posted: DashMap<String, PostCashApplicationReceipt>,
        pub credit_assessments: DashMap<String, CreditAssessment>,
        pub credit_limits: DashMap<String, f64>,
    }

    #[async_trait]
    impl ErpClient for InMemoryErp {
        async fn fetch_invoices(&self, ids: &[String], _correlation_id: &str) -> Result<Vec<Invoice>, WorkflowError> {
            Ok(ids.iter().filter_map(|id| self.invoices.get(id).map(|entry| entry.clone())).collect())
        }

        async fn post_cash_application(&self, applied: &Match, payment: &Payment) -> Result<PostCashApplicationReceipt, WorkflowError> {
            let receipt = PostCashApplicationReceipt {
                updated_systems: vec!["erp".to_string()],
                receipts: vec![("erp".to_string(), format!("{}-{}", applied.invoice_id, payment.id))],
            };
            self.posted.insert(payment.id.0.clone(), receipt.clone());
            Ok(receipt)
        }

        async fn assess_credit_risk(&self, customer_id: &str) -> Result<CreditAssessment, WorkflowError> {
            Ok(self.credit_assessments.get(customer_id).map(|entry| entry.clone()).unwrap_or(CreditAssessment {
                update_required: false,
                recommended_limit: 0.0,
                risk_score: 0.0,
            }))
        }

        async fn update_credit_limits(&self, customer_id: &str, new_limit: f64) -> Result<(), WorkflowError> {
            self.credit_limits.insert(customer_id.to_string(), new_limit);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct InMemoryNotify {
        pub sent_events: DashMap<String, usize>,
    }

    #[async_trait]
    impl NotifyClient for InMemoryNotify {
        async fn send(&self, event_kind: &str, recipients: &[String], _payload: Value) -> Result<NotifyReceipt, WorkflowError> {
            *self.sent_events.entry(event_kind.to_string()).or_insert(0) += 1;
            Ok(NotifyReceipt {
                sent: recipients.iter().map(|r| ("email".to_string(), r.clone())).collect(),
                failed: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    pub struct InMemoryManualReview {
        pub reviews: DashMap<String, ManualReviewReceipt>,
    }

    #[async_trait]
    impl ManualReviewClient for InMemoryManualReview {
        async fn create(&self, payment_id: &str, _reason: &str, _details: Value) -> Result<ManualReviewReceipt, WorkflowError> {
            let receipt = ManualReviewReceipt {
                review_id: format!("review-{payment_id}"),
                assigned_to: "collections-queue".to_string(),
            };
            self.reviews.insert(payment_id.to_string(), receipt.clone());
            Ok(receipt)
        }
    }
}
