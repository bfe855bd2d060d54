//! The three concrete workflows (C7): cash application, collections, credit
//! review, plus the collaborator interfaces they depend on.

pub mod cash_application;
pub mod collaborators;
pub mod collections;
pub mod credit_review;

pub use cash_application::CashApplicationWorkflow;
pub use collections::{CollectionsBatch, CollectionsWorkflow, OverdueInvoice};
pub use credit_review::{CreditReviewRequest, CreditReviewWorkflow};
