//! Name and phone normalization phases (C3).
//!
//! The source system normalized names with a pile of unconditional `re.sub`
//! calls, two of which silently overwrote each other ("O"->"0" then "l"->"1"
//! applied to already-digit text). That bug is not reproduced here (spec §9
//! Open Questions); instead normalization is a short, ordered list of phases —
//! case-fold, then stopword-strip, then whitespace-collapse — registered as data
//! rather than hard-coded regex soup, per the design note on the `Normalizer`
//! interface. Business-suffix equivalences are handled separately, at alias
//! *generation* time (see [`crate::matcher::alias::generate_suffix_aliases`]),
//! not at query time.

use std::collections::BTreeSet;

/// Normalizes free-text counterparty names before comparison.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    stopwords: BTreeSet<String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::with_stopwords(DEFAULT_STOPWORDS.iter().map(|s| s.to_string()))
    }
}

/// Transaction-channel noise words that show up inside mobile-money remittance
/// text and should never participate in name comparison.
const DEFAULT_STOPWORDS: &[&str] = &["MPESA", "FROM", "TO", "PESALINK", "RTGS", "SWIFT", "REF"];

impl NameNormalizer {
    pub fn with_stopwords(stopwords: impl IntoIterator<Item = String>) -> Self {
        Self {
            stopwords: stopwords.into_iter().collect(),
        }
    }

    /// Case-fold, strip digit runs of length >= 4 (transaction/phone ids), strip
    /// stopwords, collapse whitespace.
    pub fn normalize(&self, raw: &str) -> String {
        let upper = raw.to_uppercase();
        let digits_stripped = strip_long_digit_runs(&upper, 4);
        digits_stripped
            .split_whitespace()
            .filter(|tok| !self.stopwords.contains(*tok))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Removes runs of ASCII digits at least `min_run` characters long, leaving
/// everything else (including shorter digit runs, e.g. house numbers) intact.
fn strip_long_digit_runs(s: &str, min_run: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i - start < min_run {
                out.extend(&chars[start..i]);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
