//! `CollectionsWorkflow` (spec §4.7): iterate overdue invoices, send one
//! collection notice per invoice, recording the per-invoice outcome, with
//! inter-iteration pacing so the notification channel is never hammered.
//!
//! Grounded on `original_source/services/orchestrator/workflows/collections.py`
//! for the per-item iterate-and-pace shape; pacing itself is new relative to
//! the teacher (which has no comparable batch workflow) and is implemented as
//! a plain `tokio::time::sleep` between iterations — a suspension point per
//! spec §5, not a rate-limited collaborator call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WorkflowError, WorkflowResult};
use crate::workflow::engine::{RunContext, StepOutcome, WorkflowDefinition};
use crate::workflow::history::RunResult;
use crate::workflow::retry::RetryPolicy;
use crate::workflows::collaborators::{NotifyClient, SendNotificationCall};

const INTER_ITERATION_PACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueInvoice {
    pub invoice_id: String,
    pub customer_email: String,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsBatch {
    pub batch_id: String,
    pub submitted_at: DateTime<Utc>,
    pub overdue_invoices: Vec<OverdueInvoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeOutcome {
    pub invoice_id: String,
    pub sent: bool,
}

pub struct CollectionsWorkflow {
    pub notify: Arc<dyn NotifyClient>,
}

#[async_trait]
impl WorkflowDefinition for CollectionsWorkflow {
    fn name(&self) -> &'static str {
        "collections"
    }

    fn identity(&self, payload: &Value) -> WorkflowResult<(String, DateTime<Utc>)> {
        let batch: CollectionsBatch = serde_json::from_value(payload.clone()).map_err(|e| WorkflowError::InvalidInput(e.to_string()))?;
        Ok((batch.batch_id, batch.submitted_at))
    }

    async fn run(&self, ctx: &mut RunContext, payload: Value) -> RunResult {
        let batch: CollectionsBatch = match serde_json::from_value(payload) {
            Ok(b) => b,
            Err(err) => return RunResult::Failed { error: err.to_string() },
        };

        let mut outcomes = Vec::with_capacity(batch.overdue_invoices.len());

        for (index, invoice) in batch.overdue_invoices.iter().enumerate() {
            if ctx.is_cancelled() {
                return RunResult::Cancelled;
            }

            let step_id = format!("send_collection_notice:{}", invoice.invoice_id);
            let notify = SendNotificationCall(self.notify.clone());
            let payload = serde_json::json!({
                "invoice_id": invoice.invoice_id,
                "days_overdue": invoice.days_overdue,
            });

            let sent = match ctx
                .run_step(
                    &step_id,
                    &notify,
                    ("collection_notice".to_string(), vec![invoice.customer_email.clone()], payload),
                    &RetryPolicy::read_path(),
                    Duration::from_secs(180),
                )
                .await
            {
                StepOutcome::Completed(_) => true,
                StepOutcome::Cancelled => return RunResult::Cancelled,
                StepOutcome::RetriesExhausted(_) => false,
            };

            outcomes.push(NoticeOutcome { invoice_id: invoice.invoice_id.clone(), sent });

            if index + 1 < batch.overdue_invoices.len() {
                tokio::time::sleep(INTER_ITERATION_PACING).await;
            }
        }

        RunResult::Completed
    }
}
