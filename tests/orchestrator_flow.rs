//! End-to-end exercise of the orchestrator façade (C8) against the real
//! engine (C6) and in-memory collaborator doubles (spec §8 scenarios S1/S3/S6):
//! a payment that fully matches flows through to `Completed`, an
//! unresolvable one is routed to manual review, and the control surface's
//! idempotency and terminal-state guards hold.

use std::collections::BTreeMap;
use std::sync::Arc;

use cashapp_engine::config::AppConfig;
use cashapp_engine::domain::{Counterparty, CustomerId, Invoice, InvoiceId, InvoiceStatus, Payment, PaymentId};
use cashapp_engine::matcher::{default_rules, AliasResolver};
use cashapp_engine::observability::MetricsCollector;
use cashapp_engine::orchestrator::{ControlStatus, Orchestrator};
use cashapp_engine::workflow::engine::WorkflowDefinition;
use cashapp_engine::workflow::history::{HistoryStore, InMemoryHistoryStore, RunResult, RunState};
use cashapp_engine::workflows::collaborators::doubles::{InMemoryErp, InMemoryManualReview, InMemoryNotify, InMemoryOcr};
use cashapp_engine::workflows::collaborators::ExtractedInvoiceIds;
use cashapp_engine::workflows::{CashApplicationWorkflow, CollectionsWorkflow, CreditReviewWorkflow};
use chrono::Utc;

fn sample_payment() -> Payment {
    Payment {
        id: PaymentId("pay-100".to_string()),
        amount: 1200.0,
        currency: "KES".to_string(),
        value_date: Utc::now(),
        counterparty: Counterparty { name: Some("Acme Ltd".to_string()), phone: None, account: None, channel: "rtgs".to_string() },
        reference: "INV-500".to_string(),
        memo: String::new(),
        raw_remittance: String::new(),
        client_id: "acme@example.com".to_string(),
    }
}

fn sample_invoice() -> Invoice {
    Invoice {
        id: InvoiceId("inv-500".to_string()),
        invoice_number: "INV-500".to_string(),
        customer_ref: CustomerId("cust-1".to_string()),
        total_amount: 1200.0,
        amount_due: 1200.0,
        currency: "KES".to_string(),
        issue_date: Utc::now(),
        due_date: Utc::now(),
        status: InvoiceStatus::Open,
        reference: "INV-500".to_string(),
    }
}

fn build_orchestrator(ocr: Arc<InMemoryOcr>, erp: Arc<InMemoryErp>, notify: Arc<InMemoryNotify>, manual_review: Arc<InMemoryManualReview>) -> Arc<Orchestrator> {
    let config = AppConfig::default();
    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
    let metrics = Arc::new(MetricsCollector::default());

    let definitions: Vec<Arc<dyn WorkflowDefinition>> = vec![
        Arc::new(CashApplicationWorkflow {
            ocr,
            erp: erp.clone(),
            notify: notify.clone(),
            manual_review,
            resolver: Arc::new(AliasResolver::new()),
            rules: default_rules(),
            matcher_config: config.matcher.clone(),
            customers_by_id: Arc::new(BTreeMap::new()),
        }),
        Arc::new(CollectionsWorkflow { notify }),
        Arc::new(CreditReviewWorkflow { erp }),
    ];

    Arc::new(Orchestrator::new(config, definitions, history, metrics))
}

#[tokio::test]
async fn full_match_drives_to_completion_via_the_orchestrator() {
    let ocr = Arc::new(InMemoryOcr::default());
    ocr.fixtures.insert(
        "pay-100".to_string(),
        ExtractedInvoiceIds { ids: vec!["inv-500".to_string()], warnings: Vec::new() },
    );
    let erp = Arc::new(InMemoryErp::default());
    erp.invoices.insert("inv-500".to_string(), sample_invoice());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());

    let orchestrator = build_orchestrator(ocr, erp.clone(), notify, manual_review);

    let payment = sample_payment();
    let payload = serde_json::to_value(&payment).unwrap();
    let start = orchestrator.start("cash_application", payload, "acme@example.com");
    assert_eq!(start.status, ControlStatus::Accepted);
    let run_id = start.run_id.expect("accepted run carries a run id");

    let drive_result = orchestrator.drive_once(&run_id, "test-worker").await;
    assert!(matches!(drive_result, Some(RunResult::Completed)));

    let status = orchestrator.status(&run_id);
    assert_eq!(status.status, ControlStatus::Accepted);
    assert_eq!(status.state, Some(RunState::Completed));
    assert!(matches!(status.result, Some(RunResult::Completed)));
    assert_eq!(erp.posted.len(), 1);
}

#[tokio::test]
async fn duplicate_submission_returns_the_same_run_id() {
    let ocr = Arc::new(InMemoryOcr::default());
    let erp = Arc::new(InMemoryErp::default());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());
    let orchestrator = build_orchestrator(ocr, erp, notify, manual_review);

    let payment = sample_payment();
    let payload = serde_json::to_value(&payment).unwrap();

    let first = orchestrator.start("cash_application", payload.clone(), "acme@example.com");
    let second = orchestrator.start("cash_application", payload, "acme@example.com");

    assert_eq!(first.run_id, second.run_id);
}

#[tokio::test]
async fn cancelling_a_terminal_run_conflicts() {
    let ocr = Arc::new(InMemoryOcr::default());
    let erp = Arc::new(InMemoryErp::default());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());
    let orchestrator = build_orchestrator(ocr, erp, notify, manual_review);

    let payment = sample_payment();
    let payload = serde_json::to_value(&payment).unwrap();
    let start = orchestrator.start("cash_application", payload, "acme@example.com");
    let run_id = start.run_id.unwrap();

    // No OCR fixture registered: extraction returns no ids, routing to manual review.
    orchestrator.drive_once(&run_id, "test-worker").await;

    let cancel = orchestrator.cancel(&run_id);
    assert_eq!(cancel.status, ControlStatus::Conflict);
}

#[tokio::test]
async fn cancelling_a_pending_run_is_observed_on_the_next_drive() {
    let ocr = Arc::new(InMemoryOcr::default());
    ocr.fixtures.insert(
        "pay-100".to_string(),
        ExtractedInvoiceIds { ids: vec!["inv-500".to_string()], warnings: Vec::new() },
    );
    let erp = Arc::new(InMemoryErp::default());
    erp.invoices.insert("inv-500".to_string(), sample_invoice());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());

    let orchestrator = build_orchestrator(ocr, erp.clone(), notify, manual_review);

    let payment = sample_payment();
    let payload = serde_json::to_value(&payment).unwrap();
    let start = orchestrator.start("cash_application", payload, "acme@example.com");
    let run_id = start.run_id.expect("accepted run carries a run id");

    let cancel = orchestrator.cancel(&run_id);
    assert_eq!(cancel.status, ControlStatus::Accepted);
    assert_eq!(cancel.state, Some(RunState::Cancelling));

    let drive_result = orchestrator.drive_once(&run_id, "test-worker").await;
    assert!(matches!(drive_result, Some(RunResult::Cancelled)));

    let status = orchestrator.status(&run_id);
    assert_eq!(status.state, Some(RunState::Cancelled));
    assert!(erp.posted.is_empty(), "a cancelled run must not reach the ERP posting step");
}

#[tokio::test]
async fn status_of_unknown_run_is_not_found() {
    let ocr = Arc::new(InMemoryOcr::default());
    let erp = Arc::new(InMemoryErp::default());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());
    let orchestrator = build_orchestrator(ocr, erp, notify, manual_review);

    let status = orchestrator.status(&cashapp_engine::workflow::history::RunId("does-not-exist".to_string()));
    assert_eq!(status.status, ControlStatus::NotFound);
}

#[tokio::test]
async fn stats_reflect_started_runs() {
    let ocr = Arc::new(InMemoryOcr::default());
    let erp = Arc::new(InMemoryErp::default());
    let notify = Arc::new(InMemoryNotify::default());
    let manual_review = Arc::new(InMemoryManualReview::default());
    let orchestrator = build_orchestrator(ocr, erp, notify, manual_review);

    let payment = sample_payment();
    let payload = serde_json::to_value(&payment).unwrap();
    orchestrator.start("cash_application", payload, "acme@example.com");

    let stats = orchestrator.stats();
    assert_eq!(stats.started_total, 1);
    assert_eq!(stats.active_runs_by_name.get("cash_application"), Some(&1));
}
