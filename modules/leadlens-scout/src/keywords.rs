//! Search-term priority queue: fixed primary list, then keywords mined from
//! bios during the run, then a small fallback list. Exhaustion of all three
//! is the run's natural termination signal.
//!
//! The manager only decides the *next candidate*; whether a term may actually
//! be dispatched is the store's call (`try_claim_term`), so concurrent and
//! restarted runs never reuse a keyword.

use std::collections::HashSet;

use leadlens_common::{Platform, SearchTerm};

/// Seed keywords for the target market.
pub fn primary_terms() -> Vec<String> {
    [
        "NYC",
        "New York City",
        "New York",
        "NY",
        "Manhattan",
        "Brooklyn",
        "Queens",
        "Bronx",
        "Staten Island",
        "NYC Life",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Last-resort terms once primary and discovered keywords run dry.
pub fn fallback_terms(platform: Platform) -> Vec<String> {
    vec![
        "NYC creator".to_string(),
        "NYC influencer".to_string(),
        format!("NYC {platform}"),
        format!("New York {platform}"),
    ]
}

pub struct KeywordManager {
    platform: Platform,
    primary: Vec<String>,
    discovered: Vec<String>,
    fallback: Vec<String>,
    /// Every keyword ever seen, so `absorb` never re-queues one.
    known: HashSet<String>,
    /// Keywords already proposed to the driver. A term the store claim
    /// rejected stays here and is never proposed again.
    proposed: HashSet<String>,
}

impl KeywordManager {
    pub fn new(platform: Platform, extra_seeds: Vec<String>) -> Self {
        let mut primary = primary_terms();
        primary.extend(extra_seeds);
        let fallback = fallback_terms(platform);
        let known: HashSet<String> = primary.iter().chain(fallback.iter()).cloned().collect();
        Self {
            platform,
            primary,
            discovered: Vec::new(),
            fallback,
            known,
            proposed: HashSet::new(),
        }
    }

    /// Next candidate term in priority order, or `None` when all three lists
    /// are exhausted.
    pub fn next_term(&mut self) -> Option<SearchTerm> {
        let next = self
            .primary
            .iter()
            .chain(self.discovered.iter())
            .chain(self.fallback.iter())
            .find(|k| !self.proposed.contains(k.as_str()))
            .cloned()?;
        self.proposed.insert(next.clone());
        Some(SearchTerm::new(self.platform, next))
    }

    /// Merge keywords mined from bios into the discovered list, preserving
    /// discovery order and skipping anything already known.
    pub fn absorb<I: IntoIterator<Item = String>>(&mut self, keywords: I) {
        for keyword in keywords {
            if self.known.insert(keyword.clone()) {
                self.discovered.push(keyword);
            }
        }
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_terms_come_first_in_order() {
        let mut mgr = KeywordManager::new(Platform::Snapchat, vec![]);
        assert_eq!(mgr.next_term().unwrap().keyword, "NYC");
        assert_eq!(mgr.next_term().unwrap().keyword, "New York City");
    }

    #[test]
    fn discovered_terms_outrank_fallback() {
        let mut mgr = KeywordManager::new(Platform::Snapchat, vec![]);
        // Drain the primary list.
        for _ in 0..primary_terms().len() {
            mgr.next_term().unwrap();
        }
        mgr.absorb(vec!["Harlem".to_string()]);
        assert_eq!(mgr.next_term().unwrap().keyword, "Harlem");
        assert_eq!(mgr.next_term().unwrap().keyword, "NYC creator");
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut mgr = KeywordManager::new(Platform::TikTok, vec![]);
        let total = primary_terms().len() + fallback_terms(Platform::TikTok).len();
        for _ in 0..total {
            assert!(mgr.next_term().is_some());
        }
        assert!(mgr.next_term().is_none());
        // Stays exhausted.
        assert!(mgr.next_term().is_none());
    }

    #[test]
    fn absorb_skips_already_known_keywords() {
        let mut mgr = KeywordManager::new(Platform::Snapchat, vec![]);
        mgr.absorb(vec!["Brooklyn".to_string(), "Astoria".to_string()]);
        assert_eq!(mgr.discovered_count(), 1, "Brooklyn is a primary term");
        mgr.absorb(vec!["Astoria".to_string()]);
        assert_eq!(mgr.discovered_count(), 1);
    }

    #[test]
    fn extra_seeds_extend_the_primary_list() {
        let mut mgr = KeywordManager::new(Platform::Instagram, vec!["Williamsburg".to_string()]);
        let mut seen = Vec::new();
        while let Some(term) = mgr.next_term() {
            seen.push(term.keyword);
        }
        let fallback_start = seen.len() - fallback_terms(Platform::Instagram).len();
        assert!(seen[..fallback_start].contains(&"Williamsburg".to_string()));
    }
}
