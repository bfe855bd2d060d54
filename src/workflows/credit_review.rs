//! `CreditReviewWorkflow` (spec §4.7): assess a customer's credit risk and,
//! if the assessment calls for it, update their credit limit.
//!
//! Grounded on `original_source/services/orchestrator/workflows/credit_review.py`
//! for the two-step conditional shape.

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
use crate::workflows::collaborators::{AssessCreditRiskCall, ErpClient, UpdateCreditLimitsCall};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReviewRequest {
    pub customer_id: String,
    pub requested_at: DateTime<Utc>,
}

pub struct CreditReviewWorkflow {
    pub erp: Arc<dyn ErpClient>,
}

#[async_trait]
impl WorkflowDefinition for CreditReviewWorkflow {
    fn name(&self) -> &'static str {
        "credit_review"
    }

    fn identity(&self, payload: &Value) -> WorkflowResult<(String, DateTime<Utc>)> {
        let request: CreditReviewRequest = serde_json::from_value(payload.clone()).map_err(|e| WorkflowError::InvalidInput(e.to_string()))?;
        Ok((request.customer_id, request.requested_at))
    }

    async fn run(&self, ctx: &mut RunContext, payload: Value) -> RunResult {
        let request: CreditReviewRequest = match serde_json::from_value(payload) {
            Ok(r) => r,
            Err(err) => return RunResult::Failed { error: err.to_string() },
        };

        let assess = AssessCreditRiskCall(self.erp.clone());
        let assessment = match ctx
            .run_step(
                "assess_credit_risk",
                &assess,
                (request.customer_id.clone(),),
                &RetryPolicy::read_path(),
                Duration::from_secs(300),
            )
            .await
        {
            StepOutcome::Completed(v) => v,
            StepOutcome::Cancelled => return RunResult::Cancelled,
            StepOutcome::RetriesExhausted(err) => return RunResult::Failed { error: err.to_string() },
        };

        if !assessment.update_required {
            return RunResult::Completed;
        }

        let update = UpdateCreditLimitsCall(self.erp.clone());
        match ctx
            .run_step(
                "update_credit_limits",
                &update,
                (request.customer_id.clone(), assessment.recommended_limit),
                &RetryPolicy::write_path(),
                Duration::from_secs(600),
            )
            .await
        {
            StepOutcome::Completed(_) => RunResult::Completed,
            StepOutcome::Cancelled => RunResult::Cancelled,
            StepOutcome::RetriesExhausted(err) => RunResult::Failed { error: err.to_string() },
        }
    }
}
