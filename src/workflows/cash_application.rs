//! `CashApplicationWorkflow` (spec §4.7): extract invoice ids from a payment,
//! fetch the candidate invoices, match in-process, then post and notify or
//! route to manual review.
//!
//! Grounded on `original_source/services/orchestrator/workflows/cash_application.py`
//! for the step sequence and failure routing; the step-by-step retry budgets
//! are copied verbatim from spec §4.7.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::MatcherConfig;
use crate::domain::{Customer, CustomerId, Invoice, Match, Payment};
use crate::error::{WorkflowError, WorkflowResult};
use crate::matcher::{self, AliasResolver, MatchRule, MatchSummary};
use crate::workflow::activity::{ActivityContext, Collaborator};
use crate::workflow::engine::{RunContext, StepOutcome, WorkflowDefinition};
use crate::workflow::history::RunResult;
use crate::workflow::retry::RetryPolicy;
use crate::workflows::collaborators::{
    CreateManualReviewCall, ErpClient, ExtractInvoiceIdsCall, FetchInvoicesCall, ManualReviewClient, NotifyClient, OcrClient,
    PostCashApplicationCall, SendNotificationCall,
};

/// Runs the matcher (C5) as an in-process step so its invocation still goes
/// through the engine's `StepStarted`/`StepCompleted` pair — spec §4.7 step 3
/// calls this "a determinism boundary for replay", not an external hop.
struct InProcessMatch {
    resolver: Arc<AliasResolver>,
    rules: Vec<MatchRule>,
    matcher_config: MatcherConfig,
    customers_by_id: Arc<BTreeMap<CustomerId, Customer>>,
}

#[async_trait]
impl Collaborator for InProcessMatch {
    type Input = (Vec<Payment>, Vec<Invoice>);
    type Output = (Vec<Match>, MatchSummary);

    async fn call(&self, (payments, invoices): Self::Input, _ctx: &ActivityContext) -> Result<Self::Output, WorkflowError> {
        Ok(matcher::match_payments(
            &payments,
            &invoices,
            &self.rules,
            &self.resolver,
            &self.matcher_config,
            &self.customers_by_id,
        ))
    }
}

pub struct CashApplicationWorkflow {
    pub ocr: Arc<dyn OcrClient>,
    pub erp: Arc<dyn ErpClient>,
    pub notify: Arc<dyn NotifyClient>,
    pub manual_review: Arc<dyn ManualReviewClient>,
    pub resolver: Arc<AliasResolver>,
    pub rules: Vec<MatchRule>,
    pub matcher_config: MatcherConfig,
    pub customers_by_id: Arc<BTreeMap<CustomerId, Customer>>,
}

impl CashApplicationWorkflow {
    async fn route_manual_review(&self, ctx: &mut RunContext, payment: &Payment, reason: &str, detail: &str) {
        let call = CreateManualReviewCall(self.manual_review.clone());
        let details = serde_json::json!({"detail": detail});
        if let StepOutcome::RetriesExhausted(err) = ctx
            .run_step(
                "route_for_manual_review",
                &call,
                (payment.id.0.clone(), reason.to_string(), details),
                &RetryPolicy::in_process(),
                Duration::from_secs(120),
            )
            .await
        {
            warn!(payment_id = %payment.id, reason, error = %err, "manual review routing failed");
        }
    }
}

#[async_trait]
impl WorkflowDefinition for CashApplicationWorkflow {
    fn name(&self) -> &'static str {
        "cash_application"
    }

    fn identity(&self, payload: &Value) -> WorkflowResult<(String, DateTime<Utc>)> {
        let payment: Payment = serde_json::from_value(payload.clone()).map_err(|e| WorkflowError::InvalidInput(e.to_string()))?;
        Ok((payment.id.0, payment.value_date))
    }

    async fn run(&self, ctx: &mut RunContext, payload: Value) -> RunResult {
        let payment: Payment = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(err) => return RunResult::Failed { error: err.to_string() },
        };

        let extract = ExtractInvoiceIdsCall(self.ocr.clone());
        let extracted = match ctx
            .run_step(
                "extract_invoice_ids",
                &extract,
                (payment.id.0.clone(),),
                &RetryPolicy::read_path(),
                Duration::from_secs(300),
            )
            .await
        {
            StepOutcome::Completed(v) => v,
            StepOutcome::Cancelled => return RunResult::Cancelled,
            StepOutcome::RetriesExhausted(err) => {
                self.route_manual_review(ctx, &payment, "workflow_error", &err.to_string()).await;
                return RunResult::Failed { error: err.to_string() };
            }
        };

        if extracted.ids.is_empty() {
            self.route_manual_review(ctx, &payment, "no_invoice_ids", "OCR returned no invoice ids").await;
            return RunResult::ManualReview { reason: "no_invoice_ids".to_string() };
        }

        let fetch = FetchInvoicesCall(self.erp.clone());
        let invoices = match ctx
            .run_step(
                "fetch_invoice_details",
                &fetch,
                (extracted.ids.clone(), payment.id.0.clone()),
                &RetryPolicy::write_path(),
                Duration::from_secs(600),
            )
            .await
        {
            StepOutcome::Completed(v) => v,
            StepOutcome::Cancelled => return RunResult::Cancelled,
            StepOutcome::RetriesExhausted(err) => {
                self.route_manual_review(ctx, &payment, "workflow_error", &err.to_string()).await;
                return RunResult::Failed { error: err.to_string() };
            }
        };

        let matching = InProcessMatch {
            resolver: self.resolver.clone(),
            rules: self.rules.clone(),
            matcher_config: self.matcher_config.clone(),
            customers_by_id: self.customers_by_id.clone(),
        };
        let (matches, _summary) = match ctx
            .run_step(
                "match_payment_to_invoices",
                &matching,
                (vec![payment.clone()], invoices),
                &RetryPolicy::in_process(),
                Duration::from_secs(180),
            )
            .await
        {
            StepOutcome::Completed(v) => v,
            StepOutcome::Cancelled => return RunResult::Cancelled,
            StepOutcome::RetriesExhausted(err) => {
                self.route_manual_review(ctx, &payment, "workflow_error", &err.to_string()).await;
                return RunResult::Failed { error: err.to_string() };
            }
        };

        let Some(applied) = matches.into_iter().next() else {
            self.route_manual_review(ctx, &payment, "matching_failed", "no candidate invoice met threshold").await;
            return RunResult::ManualReview { reason: "matching_failed".to_string() };
        };

        let post = PostCashApplicationCall(self.erp.clone());
        if let StepOutcome::RetriesExhausted(err) = ctx
            .run_step(
                "update_erp_systems",
                &post,
                (applied.clone(), payment.clone()),
                &RetryPolicy::write_path(),
                Duration::from_secs(900),
            )
            .await
        {
            self.route_manual_review(ctx, &payment, "workflow_error", &err.to_string()).await;
            return RunResult::Failed { error: err.to_string() };
        }

        let notify = SendNotificationCall(self.notify.clone());
        let notify_payload = serde_json::json!({
            "invoice_id": applied.invoice_id.0,
            "payment_id": payment.id.0,
            "amount_applied": applied.amount_to_apply,
        });
        if let StepOutcome::RetriesExhausted(err) = ctx
            .run_step(
                "send_notifications",
                &notify,
                ("cash_applied".to_string(), vec![payment.client_id.clone()], notify_payload),
                &RetryPolicy::read_path(),
                Duration::from_secs(300),
            )
            .await
        {
            warn!(payment_id = %payment.id, error = %err, "notification failed after cash was applied");
        }

        RunResult::Completed
    }
}
