//! Customer alias resolution (C3).
//!
//! Grounded on `original_source/services/matching_engine/intelligent_payment_matcher.py`'s
//! `KenyaCustomerAliasManager`: the resolution order, confidence values, and
//! phone/name cleanup are the same; the implementation is reworked into a
//! `Normalizer`-based pipeline and indexed maps instead of per-call linear scans
//! plus ad hoc regexes.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::MatcherConfig;
use crate::domain::{Customer, CustomerId, Payment};
use crate::error::WorkflowError;
use crate::matcher::normalize::NameNormalizer;

/// Business-suffix equivalence classes applied symmetrically when a customer is
/// registered (spec §4.3): every member of a class becomes an alias of the
/// canonical name with the other members substituted in.
const SUFFIX_EQUIVALENCES: &[&[&str]] = &[
    &["LIMITED", "LTD"],
    &["COMPANY", "CO"],
    &["CORPORATION", "CORP"],
    &["ENTERPRISES", "ENT"],
    &["SERVICES", "SVC"],
    &["INTERNATIONAL", "INTL"],
];

/// How a counterparty was resolved to a customer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    PhoneExact,
    AccountExact,
    NameExact,
    AliasExact,
    AliasFuzzy,
    NameFuzzy,
    None,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::PhoneExact => "phone_exact",
            ResolutionMethod::AccountExact => "account_exact",
            ResolutionMethod::NameExact => "name_exact",
            ResolutionMethod::AliasExact => "alias_exact",
            ResolutionMethod::AliasFuzzy => "alias_fuzzy",
            ResolutionMethod::NameFuzzy => "name_fuzzy",
            ResolutionMethod::None => "none",
        }
    }
}

/// Outcome of [`AliasResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub customer_id: Option<CustomerId>,
    pub confidence: f64,
    pub method: ResolutionMethod,
}

impl Resolution {
    fn none() -> Self {
        Self {
            customer_id: None,
            confidence: 0.0,
            method: ResolutionMethod::None,
        }
    }
}

/// Holds the customer population and the phone/account -> customer indices used
/// for O(1) exact-match resolution.
pub struct AliasResolver {
    customers: BTreeMap<CustomerId, Customer>,
    phone_index: BTreeMap<String, CustomerId>,
    account_index: BTreeMap<String, CustomerId>,
    normalizer: NameNormalizer,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self {
            customers: BTreeMap::new(),
            phone_index: BTreeMap::new(),
            account_index: BTreeMap::new(),
            normalizer: NameNormalizer::default(),
        }
    }

    /// Register a customer, auto-generating business-suffix aliases and
    /// rebuilding the phone/account indices. A phone or account number that
    /// already maps to a different customer is a data-quality error: the
    /// earlier (lower, by deterministic `CustomerId` ordering) registration
    /// wins and the collision is surfaced rather than silently resolved.
    pub fn register(&mut self, mut customer: Customer) -> Result<(), WorkflowError> {
        let generated = generate_suffix_aliases(&customer.canonical_name);
        customer.aliases.extend(generated);

        for phone in &customer.phone_numbers {
            insert_first_wins(&mut self.phone_index, phone.clone(), customer.id.clone());
        }
        for account in &customer.account_numbers {
            insert_first_wins(&mut self.account_index, account.clone(), customer.id.clone());
        }

        self.customers.insert(customer.id.clone(), customer);
        Ok(())
    }

    /// Resolve a payment's counterparty to a customer id (spec §4.3).
    pub fn resolve(&self, payment: &Payment, config: &MatcherConfig) -> Resolution {
        let counterparty = &payment.counterparty;

        if let Some(phone) = &counterparty.phone {
            if let Some(normalized) = normalize_phone(phone, config) {
                if let Some(customer_id) = self.phone_index.get(&normalized) {
                    return Resolution {
                        customer_id: Some(customer_id.clone()),
                        confidence: 0.98,
                        method: ResolutionMethod::PhoneExact,
                    };
                }
            }
        }

        if let Some(account) = &counterparty.account {
            if let Some(customer_id) = self.account_index.get(account) {
                return Resolution {
                    customer_id: Some(customer_id.clone()),
                    confidence: 0.95,
                    method: ResolutionMethod::AccountExact,
                };
            }
        }

        let Some(raw_name) = &counterparty.name else {
            return Resolution::none();
        };
        let cleaned = self.normalizer.normalize(raw_name);
        if cleaned.is_empty() {
            return Resolution::none();
        }

        let mut best: Option<(f64, ResolutionMethod, CustomerId)> = None;

        for customer in self.customers.values() {
            if cleaned == customer.canonical_name.to_uppercase() {
                return Resolution {
                    customer_id: Some(customer.id.clone()),
                    confidence: 0.92,
                    method: ResolutionMethod::NameExact,
                };
            }
            if customer
                .aliases
                .iter()
                .any(|alias| cleaned == alias.to_uppercase())
            {
                return Resolution {
                    customer_id: Some(customer.id.clone()),
                    confidence: 0.90,
                    method: ResolutionMethod::AliasExact,
                };
            }

            if let Some(best_alias_ratio) = customer
                .aliases
                .iter()
                .map(|alias| strsim::normalized_levenshtein(&cleaned, &alias.to_uppercase()))
                .fold(None, |acc: Option<f64>, r| match acc {
                    Some(a) if a >= r => Some(a),
                    _ => Some(r),
                })
            {
                if best_alias_ratio >= config.fuzzy_threshold {
                    update_best(&mut best, best_alias_ratio, ResolutionMethod::AliasFuzzy, &customer.id);
                }
            }

            let name_ratio =
                strsim::normalized_levenshtein(&cleaned, &customer.canonical_name.to_uppercase());
            if name_ratio >= config.fuzzy_threshold {
                update_best(&mut best, name_ratio, ResolutionMethod::NameFuzzy, &customer.id);
            }
        }

        match best {
            Some((confidence, method, customer_id)) => Resolution {
                customer_id: Some(customer_id),
                confidence,
                method,
            },
            None => Resolution::none(),
        }
    }
}

impl Default for AliasResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_first_wins(index: &mut BTreeMap<String, CustomerId>, key: String, id: CustomerId) {
    match index.get(&key) {
        Some(existing) if *existing != id => {
            let winner = std::cmp::min(existing.clone(), id);
            tracing::warn!(
                key = %key,
                existing = %existing,
                incoming = %winner,
                "alias collision: phone/account number mapped to more than one customer"
            );
            index.insert(key, winner);
        }
        _ => {
            index.insert(key, id);
        }
    }
}

fn update_best(
    best: &mut Option<(f64, ResolutionMethod, CustomerId)>,
    ratio: f64,
    method: ResolutionMethod,
    id: &CustomerId,
) {
    let better = match best {
        Some((existing_ratio, _, _)) => ratio > *existing_ratio,
        None => true,
    };
    if better {
        *best = Some((ratio, method, id.clone()));
    }
}

/// Generates symmetric business-suffix aliases for a canonical name, e.g.
/// "JOHN DOE ENTERPRISES LTD" also registers "JOHN DOE ENTERPRISES LIMITED".
pub fn generate_suffix_aliases(canonical_name: &str) -> BTreeSet<String> {
    let upper = canonical_name.to_uppercase();
    let tokens: Vec<&str> = upper.split_whitespace().collect();
    let mut variations = BTreeSet::new();

    for (idx, token) in tokens.iter().enumerate() {
        for class in SUFFIX_EQUIVALENCES {
            if class.contains(token) {
                for replacement in *class {
                    if replacement == token {
                        continue;
                    }
                    let mut variant = tokens.clone();
                    variant[idx] = replacement;
                    variations.insert(variant.join(" "));
                }
            }
        }
    }

    variations
}

/// Normalizes a phone number to E.164 using the configured country convention
/// (spec §4.3). Returns `None` when the number doesn't match the configured
/// country's expected length, rather than guessing.
pub fn normalize_phone(raw: &str, config: &MatcherConfig) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();

    if let Some(national) = cleaned.strip_prefix('0') {
        if national.len() == config.phone_national_digits {
            return Some(format!("+{}{}", config.matcher_country_code_digits(), national));
        }
        return None;
    }
    if let Some(rest) = cleaned.strip_prefix(&config.matcher_country_code_digits()) {
        if rest.len() == config.phone_national_digits {
            return Some(format!("+{}", cleaned));
        }
    }
    if let Some(rest) = cleaned.strip_prefix('+') {
        if let Some(national) = rest.strip_prefix(&config.matcher_country_code_digits()) {
            if national.len() == config.phone_national_digits {
                return Some(cleaned);
            }
        }
        return None;
    }
    None
}

impl MatcherConfig {
    fn matcher_country_code_digits(&self) -> String {
        self.phone_country_code.clone()
    }
}
