//! Progressive (degrading) search.
//!
//! A term that matches nothing is relaxed word by word, then character by
//! character, until some candidate matches. Candidates are produced lazily so
//! nothing past the first hit is ever evaluated.

use fnv::FnvHashSet;

use super::facet::FacetFilterEngine;
use super::filter_spec::FilterSpec;
use super::normalize::normalize_whitespace;
use crate::cancel::CancellationToken;
use crate::types::CatalogEntry;

/// Shortest candidate the character tier will try.
pub const MIN_CHAR_CANDIDATE_LEN: usize = 3;

/// Relaxed search terms for a query, most specific first.
///
/// The word tier yields the whitespace-normalized term and then drops its
/// last word until one word is left. The character tier starts again from
/// the full term and drops one trailing character at a time down to
/// [`MIN_CHAR_CANDIDATE_LEN`]. A candidate is never yielded twice.
///
/// A clone replays the remaining candidates; build a new iterator to start over.
#[derive(Debug, Clone)]
pub struct CandidateTerms {
    words: Vec<String>,
    next_word_count: usize,
    chars: Vec<char>,
    next_char_len: usize,
    seen: FnvHashSet<String>,
}

impl CandidateTerms {
    pub fn new(term: &str) -> Self {
        let words: Vec<String> = term.split_whitespace().map(str::to_string).collect();
        let chars: Vec<char> = words.join(" ").chars().collect();
        Self {
            next_word_count: words.len(),
            words,
            next_char_len: chars.len(),
            chars,
            seen: FnvHashSet::default(),
        }
    }
}

impl Iterator for CandidateTerms {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.next_word_count > 0 {
            let candidate = self.words[..self.next_word_count].join(" ");
            self.next_word_count -= 1;
            if self.seen.insert(candidate.clone()) {
                return Some(candidate);
            }
        }

        while self.next_char_len >= MIN_CHAR_CANDIDATE_LEN {
            let candidate: String = self.chars[..self.next_char_len].iter().collect();
            self.next_char_len -= 1;
            let candidate = candidate.trim_end();
            if candidate.chars().count() < MIN_CHAR_CANDIDATE_LEN {
                continue;
            }
            if self.seen.insert(candidate.to_string()) {
                return Some(candidate.to_string());
            }
        }

        None
    }
}

/// Result of a progressive search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome<T = CatalogEntry> {
    /// The term as the caller typed it (trimmed).
    pub original_term: String,
    /// The candidate that produced `results`; the original term when nothing matched.
    pub actual_term: String,
    pub results: Vec<T>,
    /// True when `actual_term` is a relaxation of the original term.
    pub relaxed: bool,
}

impl<T> SearchOutcome<T> {
    fn unmatched(term: &str) -> Self {
        Self {
            original_term: term.to_string(),
            actual_term: term.to_string(),
            results: Vec::new(),
            relaxed: false,
        }
    }
}

/// Runs the candidate cascade through the facet engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressiveSearchResolver {
    engine: FacetFilterEngine,
}

impl ProgressiveSearchResolver {
    pub fn new(engine: FacetFilterEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FacetFilterEngine {
        &self.engine
    }

    /// Returns the first candidate of `term` that matches anything, with every
    /// other facet of `spec` held fixed.
    ///
    /// A blank term applies `spec` without a search term.
    pub fn search(&self, entries: &[CatalogEntry], term: &str, spec: &FilterSpec) -> SearchOutcome {
        self.search_cancellable(entries, term, spec, &CancellationToken::noop())
            .unwrap_or_else(|| SearchOutcome::unmatched(term.trim()))
    }

    /// Like [`search`](Self::search), but returns `None` once `token` is superseded.
    pub fn search_cancellable(
        &self,
        entries: &[CatalogEntry],
        term: &str,
        spec: &FilterSpec,
        token: &CancellationToken,
    ) -> Option<SearchOutcome> {
        let original = term.trim();
        let mut spec = spec.clone();

        if original.is_empty() {
            spec.search_term = None;
            let results = self.engine.apply_cancellable(entries, &spec, token)?;
            return Some(SearchOutcome {
                results,
                ..SearchOutcome::unmatched(original)
            });
        }

        resolve_cascade(original, |candidate| {
            spec.search_term = Some(candidate.to_string());
            self.engine.apply_cancellable(entries, &spec, token)
        })
    }

    /// Runs the cascade over an arbitrary matcher.
    pub fn resolve_with<T, F>(term: &str, mut matcher: F) -> SearchOutcome<T>
    where
        F: FnMut(&str) -> Vec<T>,
    {
        let original = term.trim();
        resolve_cascade(original, |candidate| Some(matcher(candidate)))
            .unwrap_or_else(|| SearchOutcome::unmatched(original))
    }
}

/// `matcher` returning `None` aborts the cascade.
fn resolve_cascade<T, F>(original: &str, mut matcher: F) -> Option<SearchOutcome<T>>
where
    F: FnMut(&str) -> Option<Vec<T>>,
{
    let normalized = normalize_whitespace(original);
    for candidate in CandidateTerms::new(original) {
        let results = matcher(&candidate)?;
        if results.is_empty() {
            continue;
        }
        let relaxed = candidate != normalized;
        if relaxed {
            log::debug!("search for {original:?} relaxed to {candidate:?}");
        }
        return Some(SearchOutcome {
            original_term: original.to_string(),
            actual_term: candidate,
            results,
            relaxed,
        });
    }
    Some(SearchOutcome::unmatched(original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::SearchVersionTracker;
    use crate::query::facet::tests::storefront;

    fn only_laptop_bag() -> Vec<CatalogEntry> {
        vec![CatalogEntry {
            id: "bag".to_string(),
            name: "Laptop Bag".to_string(),
            sku: "LB-100".to_string(),
            count_in_stock: 1,
            ..CatalogEntry::default()
        }]
    }

    #[test]
    fn candidates_relax_words_then_characters() {
        let candidates: Vec<String> = CandidateTerms::new("gaming  laptop bag").collect();
        assert_eq!(
            &candidates[..4],
            &["gaming laptop bag", "gaming laptop", "gaming", "gaming laptop ba"]
        );
        assert_eq!(candidates.last().map(String::as_str), Some("gam"));
        assert_eq!(candidates.iter().filter(|c| c.as_str() == "gaming").count(), 1);
        assert!(candidates.iter().all(|c| c.chars().count() >= MIN_CHAR_CANDIDATE_LEN));
    }

    #[test]
    fn character_tier_skips_trailing_whitespace_duplicates() {
        let candidates: Vec<String> = CandidateTerms::new("red hat").collect();
        assert_eq!(candidates, vec!["red hat", "red", "red ha", "red h"]);
    }

    #[test]
    fn short_terms_only_yield_word_tier() {
        let candidates: Vec<String> = CandidateTerms::new("ab").collect();
        assert_eq!(candidates, vec!["ab"]);
        assert_eq!(CandidateTerms::new("   ").count(), 0);
    }

    #[test]
    fn unmatched_scenario_returns_original_term() {
        let resolver = ProgressiveSearchResolver::default();
        let outcome = resolver.search(&only_laptop_bag(), "gaming laptop bag", &FilterSpec::default());
        assert_eq!(outcome.original_term, "gaming laptop bag");
        assert_eq!(outcome.actual_term, "gaming laptop bag");
        assert!(outcome.results.is_empty());
        assert!(!outcome.relaxed);
    }

    #[test]
    fn first_matching_candidate_wins_and_stops_the_cascade() {
        let mut tried = Vec::new();
        let outcome = ProgressiveSearchResolver::resolve_with("laptop bag sleeve", |candidate| {
            tried.push(candidate.to_string());
            if "laptop bag".starts_with(candidate) {
                vec![candidate.len()]
            } else {
                Vec::new()
            }
        });
        assert_eq!(tried, vec!["laptop bag sleeve", "laptop bag"]);
        assert_eq!(outcome.actual_term, "laptop bag");
        assert_eq!(outcome.results, vec![10]);
        assert!(outcome.relaxed);
    }

    #[test]
    fn relaxation_keeps_other_facets_fixed() {
        let resolver = ProgressiveSearchResolver::default();
        let spec = FilterSpec::default().with_brand("b1");
        let outcome = resolver.search(&storefront(), "laptop lite edition", &spec);
        assert_eq!(outcome.actual_term, "laptop lite");
        assert!(outcome.relaxed);
        let ids: Vec<&str> = outcome.results.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["lite"]);
    }

    #[test]
    fn character_tier_finds_partial_words() {
        let resolver = ProgressiveSearchResolver::default();
        let outcome = resolver.search(&storefront(), "wirelessly", &FilterSpec::default());
        assert_eq!(outcome.actual_term, "wireless");
        assert!(outcome.relaxed);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn exact_hit_is_not_relaxed() {
        let resolver = ProgressiveSearchResolver::default();
        let outcome = resolver.search(&storefront(), "  Laptop   Bag ", &FilterSpec::default());
        assert_eq!(outcome.original_term, "Laptop   Bag");
        assert_eq!(outcome.actual_term, "Laptop Bag");
        assert!(!outcome.relaxed);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn blank_term_applies_remaining_facets() {
        let resolver = ProgressiveSearchResolver::default();
        let spec = FilterSpec::default()
            .with_top_category("c2")
            .with_search_term("ignored");
        let outcome = resolver.search(&storefront(), "  ", &spec);
        assert_eq!(outcome.actual_term, "");
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn superseded_search_returns_none() {
        let tracker = SearchVersionTracker::new();
        let token = tracker.next_token();
        tracker.next_version();
        let resolver = ProgressiveSearchResolver::default();
        assert!(resolver
            .search_cancellable(&storefront(), "laptop", &FilterSpec::default(), &token)
            .is_none());
    }
}
