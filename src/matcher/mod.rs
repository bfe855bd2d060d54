//! Customer alias resolution and payment-to-invoice matching (C3-C5).

pub mod alias;
pub mod engine;
pub mod evaluator;
pub mod normalize;
pub mod rules;

pub use alias::{AliasResolver, Resolution, ResolutionMethod};
pub use engine::{match_payments, MatchSummary};
pub use rules::{default_rules, MatchRule, Signal};
