//! Typed envelopes for the core business objects (spec §3).
//!
//! These replace the dynamic payload dictionaries of the source system with
//! explicit schemas; the only place an opaque bag survives is [`Match::details`],
//! which is diagnostic-only and never used for control flow.

mod customer;
mod invoice;
mod match_result;
mod payment;

pub use customer::{Customer, CustomerId};
pub use invoice::{Invoice, InvoiceId, InvoiceStatus};
pub use match_result::{Match, MatchDetails};
pub use payment::{Counterparty, Payment, PaymentId};
