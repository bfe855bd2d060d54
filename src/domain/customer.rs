use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A customer and its alias universe (spec §3).
///
/// `aliases` is whatever name variations were registered or auto-generated for
/// this customer (business-suffix equivalences, common name variants); resolution
/// against it is a total function in the sense that every alias in the
/// materialized universe maps back to exactly one customer id (enforced by
/// [`crate::matcher::alias::AliasResolver`] at registration time, which logs a
/// `DataQuality` warning rather than silently overwriting on collision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub canonical_name: String,
    pub aliases: BTreeSet<String>,
    /// E.164-normalized phone numbers.
    pub phone_numbers: BTreeSet<String>,
    pub account_numbers: BTreeSet<String>,
}

impl Customer {
    pub fn new(id: CustomerId, canonical_name: impl Into<String>) -> Self {
        Self {
            id,
            canonical_name: canonical_name.into(),
            aliases: BTreeSet::new(),
            phone_numbers: BTreeSet::new(),
            account_numbers: BTreeSet::new(),
        }
    }
}
