//! Market Registry
//!
//! In-memory store of markets with derived indexes:
//! - URL (lower-cased) -> market keys
//! - provider id (lower-cased) -> market keys
//! - canonical pair key -> market key
//!
//! Indexes hold no state of their own; they are rebuilt from the markets and
//! cleared together. Every read is total: missing keys yield `None` or an
//! empty `Vec`, never an error.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, B256, U256};
use tracing::debug;

use crate::pair_key::canonical_pair_key;
use crate::types::{Market, MarketSearchParams, OutcomeTokenPair, PairStatus, RegistryStats};

/// Borrowed result of a pair lookup
#[derive(Clone, Copy, Debug)]
pub struct PairMatch<'a> {
    pub market: &'a Market,
    pub pair: &'a OutcomeTokenPair,
}

#[derive(Clone, Debug, Default)]
pub struct MarketRegistry {
    markets: HashMap<String, Market>,
    by_url: HashMap<String, HashSet<String>>,
    by_provider: HashMap<String, HashSet<String>>,
    by_pair_key: HashMap<B256, String>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an aggregation pass
    pub fn from_markets(markets: impl IntoIterator<Item = Market>) -> Self {
        let mut registry = Self::new();
        for market in markets {
            registry.add_market(market);
        }
        registry
    }

    /// Insert (or replace) a market and index it
    pub fn add_market(&mut self, market: Market) {
        let key = market.market_key.clone();

        if self.markets.contains_key(&key) {
            debug!("Replacing market {}", key);
            self.unindex(&key);
        }

        for url in market.provider_urls.values() {
            self.by_url.entry(url.to_lowercase()).or_default().insert(key.clone());
        }
        for provider in market.provider_questions.keys() {
            self.by_provider.entry(provider.to_lowercase()).or_default().insert(key.clone());
        }
        for pair in &market.pairs {
            self.by_pair_key.insert(pair.key, key.clone());
        }

        self.markets.insert(key, market);
    }

    /// Drop index entries pointing at `key`
    fn unindex(&mut self, key: &str) {
        for keys in self.by_url.values_mut() {
            keys.remove(key);
        }
        self.by_url.retain(|_, keys| !keys.is_empty());
        for keys in self.by_provider.values_mut() {
            keys.remove(key);
        }
        self.by_provider.retain(|_, keys| !keys.is_empty());
        self.by_pair_key.retain(|_, owner| owner != key);
    }

    /// All markets, no ordering guarantee
    pub fn get_all_markets(&self) -> Vec<&Market> {
        self.markets.values().collect()
    }

    pub fn get_market_by_key(&self, key: &str) -> Option<&Market> {
        self.markets.get(key)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Markets whose URL contains `pattern`, or whose URL is contained in `pattern`
    pub fn search_by_url(&self, pattern: &str) -> Vec<&Market> {
        self.keys_by_url(pattern)
            .iter()
            .filter_map(|key| self.markets.get(key))
            .collect()
    }

    fn keys_by_url(&self, pattern: &str) -> HashSet<String> {
        let pattern = pattern.to_lowercase();
        self.by_url
            .iter()
            .filter(|(url, _)| url.contains(&pattern) || pattern.contains(url.as_str()))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Conjunctive search: url, then provider, then status, then question
    pub fn search_markets(&self, params: &MarketSearchParams) -> Vec<&Market> {
        let mut candidates: HashSet<String> = self.markets.keys().cloned().collect();

        if let Some(url) = &params.url {
            let matching = self.keys_by_url(url);
            candidates.retain(|key| matching.contains(key));
        }

        if let Some(provider) = &params.provider {
            match self.by_provider.get(&provider.to_lowercase()) {
                Some(keys) => candidates.retain(|key| keys.contains(key)),
                None => candidates.clear(),
            }
        }

        let mut results: Vec<&Market> =
            candidates.iter().filter_map(|key| self.markets.get(key)).collect();

        if let Some(status) = params.status {
            results.retain(|market| market.overall_status == status);
        }

        if let Some(question) = &params.question {
            let needle = question.to_lowercase();
            results.retain(|market| market.question_contains(&needle));
        }

        results
    }

    /// Locate a pair by its legs, in either direction
    pub fn find_pair_by_tokens(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
    ) -> Option<PairMatch<'_>> {
        let key = canonical_pair_key(token_a, id_a, token_b, id_b);
        let market = self.by_pair_key.get(&key).and_then(|mk| self.markets.get(mk))?;
        let pair = market
            .pairs
            .iter()
            .find(|pair| pair.matches_legs(&token_a, &id_a, &token_b, &id_b))?;

        Some(PairMatch { market, pair })
    }

    /// Markets and status breakdown
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats { markets: self.markets.len(), ..Default::default() };
        for market in self.markets.values() {
            stats.pairs += market.pairs.len();
            match market.overall_status {
                PairStatus::Allowed => stats.allowed += 1,
                PairStatus::Paused => stats.paused += 1,
                PairStatus::Removed => stats.removed += 1,
            }
        }
        stats
    }

    /// Empty the store and all indexes. `&mut self` means no reader can
    /// observe a half-cleared registry.
    pub fn clear(&mut self) {
        self.markets.clear();
        self.by_url.clear();
        self.by_provider.clear();
        self.by_pair_key.clear();
    }
}
