//! Feed query parameters and cache-key derivation.
//!
//! Two queries that describe the same effective filter must collide to the
//! same fingerprint so cached snapshots are reused: category order and
//! duplicates are ignored, keywords are trimmed and case-folded.

use serde::{Deserialize, Serialize};

/// Default page size requested from the upstream feed.
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Parameters for one feed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    /// Category tags (e.g. `cs.AI`). Must be non-empty for a network fetch.
    pub categories: Vec<String>,
    /// Free-text keyword filter. Empty string behaves as absent.
    pub keywords: String,
    /// Upstream page size. Not part of the fingerprint.
    pub max_results: u32,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            keywords: String::new(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl FeedQuery {
    pub fn new(categories: Vec<String>, keywords: impl Into<String>) -> Self {
        Self {
            categories,
            keywords: keywords.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Derive the snapshot cache key for this query.
    ///
    /// Pure and total: categories are sorted and de-duplicated, keywords are
    /// trimmed and lower-cased. `max_results` is deliberately excluded so a
    /// page-size change reuses the same snapshot.
    pub fn fingerprint(&self) -> String {
        let mut cats: Vec<String> = self
            .categories
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        cats.sort();
        cats.dedup();

        let keywords = self.keywords.trim().to_lowercase();
        format!("arxiv:{}:{}", cats.join(","), keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn query(cats: &[&str], kw: &str) -> FeedQuery {
        FeedQuery::new(cats.iter().map(|c| c.to_string()).collect(), kw)
    }

    #[test]
    fn fingerprint_is_order_insensitive() {
        let a = query(&["cs.AI", "cs.LG"], "Foo");
        let b = query(&["cs.LG", "cs.AI"], " foo ");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_dedupes_categories() {
        let a = query(&["cs.AI", "cs.AI", "cs.LG"], "");
        let b = query(&["cs.LG", "cs.AI"], "");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_folds_keyword_case_and_whitespace() {
        let a = query(&["cs.CL"], "  Attention Mechanisms ");
        let b = query(&["cs.CL"], "attention mechanisms");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn empty_keywords_match_absent() {
        let a = query(&["cs.AI"], "   ");
        let b = query(&["cs.AI"], "");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "arxiv:cs.ai:");
    }

    #[test]
    fn different_filters_do_not_collide() {
        assert_ne!(
            query(&["cs.AI"], "").fingerprint(),
            query(&["cs.LG"], "").fingerprint()
        );
        assert_ne!(
            query(&["cs.AI"], "llm").fingerprint(),
            query(&["cs.AI"], "gan").fingerprint()
        );
    }

    #[test]
    fn max_results_is_excluded() {
        let mut a = query(&["cs.AI"], "x");
        let b = a.clone();
        a.max_results = 200;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    proptest! {
        /// Any permutation of the category list yields the same fingerprint.
        #[test]
        fn fingerprint_invariant_under_permutation(
            mut cats in proptest::collection::vec("[a-zA-Z]{2}\\.[a-zA-Z]{2}", 1..6),
            kw in "[ a-zA-Z]{0,12}",
            seed in 0usize..1000,
        ) {
            let original = FeedQuery::new(cats.clone(), kw.clone());
            // Cheap deterministic shuffle
            let len = cats.len();
            cats.rotate_left(seed % len.max(1));
            if len > 1 && seed % 2 == 0 {
                cats.swap(0, len - 1);
            }
            let shuffled = FeedQuery::new(cats, kw);
            prop_assert_eq!(original.fingerprint(), shuffled.fingerprint());
        }
    }
}
