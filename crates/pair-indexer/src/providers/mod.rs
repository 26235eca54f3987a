//! Market info providers and the batch resolver
//!
//! # Components
//! - `MarketProvider`: per-platform capability (`get_market_by_id`, `get_market_by_outcome_token`)
//! - `MarketInfoResolver`: batch contract consumed by the indexer
//! - `ProviderResolver`: routes each token leg to the provider owning its contract
//!
//! Providers are registered on an explicit `ProviderResolver` instance; there
//! is no process-wide provider table.

mod opinion;
mod polymarket;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::types::{MarketInfo, TokenRef};

pub use opinion::{OpinionClient, OpinionProvider};
pub use polymarket::{GammaClient, GammaMarket, PolymarketProvider};

/// Default in-flight request bound for `ProviderResolver`
const DEFAULT_CONCURRENCY: usize = 8;

/// One prediction-market platform
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Key used in per-provider market maps (e.g. "polymarket")
    fn provider_id(&self) -> &str;

    /// Outcome-token contract whose token ids this provider can resolve
    fn token_address(&self) -> Address;

    /// Market metadata by provider market id; `Ok(None)` if unknown
    async fn get_market_by_id(&self, market_id: &str) -> Result<Option<MarketInfo>>;

    /// Market metadata for the market an outcome token belongs to; `Ok(None)` if unknown
    async fn get_market_by_outcome_token(&self, token_id: &str) -> Result<Option<MarketInfo>>;
}

/// Batch market-info lookup.
///
/// Result keys are `token_lookup_key(address, id)`. A token that cannot be
/// resolved is absent from the map; only transport failures are errors.
#[async_trait]
pub trait MarketInfoResolver: Send + Sync {
    async fn resolve_batch(&self, tokens: &[TokenRef]) -> Result<HashMap<String, MarketInfo>>;
}

/// Resolver dispatching to registered providers by token contract address
pub struct ProviderResolver {
    providers: Vec<Arc<dyn MarketProvider>>,
    concurrency: usize,
}

impl ProviderResolver {
    pub fn new() -> Self {
        Self { providers: Vec::new(), concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Register a provider. If two providers share a token contract, the first registered wins.
    pub fn register(mut self, provider: Arc<dyn MarketProvider>) -> Self {
        info!(
            "Registered market provider {} for token contract {}",
            provider.provider_id(),
            provider.token_address()
        );
        self.providers.push(provider);
        self
    }

    fn provider_for(&self, token_address: &Address) -> Option<&Arc<dyn MarketProvider>> {
        self.providers.iter().find(|p| p.token_address() == *token_address)
    }
}

impl Default for ProviderResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketInfoResolver for ProviderResolver {
    async fn resolve_batch(&self, tokens: &[TokenRef]) -> Result<HashMap<String, MarketInfo>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut requests: Vec<(String, Arc<dyn MarketProvider>, String)> = Vec::new();

        for token in tokens {
            let lookup_key = token.lookup_key();
            if !seen.insert(lookup_key.clone()) {
                continue;
            }
            match self.provider_for(&token.token_address) {
                Some(provider) => {
                    requests.push((lookup_key, Arc::clone(provider), token.token_id.to_string()))
                }
                None => debug!("No provider for token contract {}, leaving {} unresolved", token.token_address, lookup_key),
            }
        }

        info!("Resolving {} unique tokens ({} requested)", requests.len(), tokens.len());

        let resolved: Vec<(String, Option<MarketInfo>)> = stream::iter(requests)
            .map(|(lookup_key, provider, token_id)| async move {
                let info = provider
                    .get_market_by_outcome_token(&token_id)
                    .await
                    .with_context(|| format!("{} lookup failed for token {}", provider.provider_id(), token_id))?;
                Ok::<_, anyhow::Error>((lookup_key, info))
            })
            .buffer_unordered(self.concurrency)
            .boxed()
            .try_collect()
            .await?;

        let mut results = HashMap::with_capacity(resolved.len());
        for (lookup_key, info) in resolved {
            match info {
                Some(info) => {
                    results.insert(lookup_key, info);
                }
                None => warn!("No market found for token {}", lookup_key),
            }
        }

        Ok(results)
    }
}

/// Pick the yes/no token ids from outcome labels: the "Yes" label if present,
/// otherwise the first token is yes
pub(crate) fn yes_no_ids(token_ids: &[String], outcomes: &[String]) -> Option<(String, String)> {
    let [first, second] = token_ids else {
        return None;
    };

    let yes_index = outcomes.iter().position(|o| o.eq_ignore_ascii_case("yes")).unwrap_or(0);
    if yes_index == 1 {
        Some((second.clone(), first.clone()))
    } else {
        Some((first.clone(), second.clone()))
    }
}
