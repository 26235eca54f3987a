//! Pair Indexer - top-level service
//!
//! # Refresh cycle
//! 1. Fetch added / paused / removed streams concurrently
//! 2. Fold paused / removed into latest timestamps per canonical key
//! 3. Resolve every unique token leg in one batch
//! 4. Aggregate into markets and index them in a fresh registry
//! 5. Swap the new snapshot in
//!
//! # Guarantees
//! - Readers only ever see a fully built registry
//! - Refreshes are serialized; a concurrent caller waits for the running one
//! - A failed refresh leaves the previous snapshot (or "not initialized") untouched
//! - Queries before the first successful refresh fail with `NotInitialized`

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::config::IndexerConfig;
use crate::error::IndexerError;
use crate::estimate::{EstimationService, RpcVaultReader};
use crate::providers::{
    GammaClient, MarketInfoResolver, OpinionClient, OpinionProvider, PolymarketProvider, ProviderResolver,
};
use crate::reconcile::latest_timestamps;
use crate::registry::MarketRegistry;
use crate::subgraph::{PairEventSource, SubgraphClient};
use crate::types::{
    FoundPair, Market, MarketSearchParams, MergeEstimate, MergeRequest, PairAddedEvent, PairEvents,
    RegistryStats, SplitEstimate, SplitRequest, TokenRef, VaultLiquidity,
};

/// Registry built by one completed refresh
struct Snapshot {
    registry: Arc<MarketRegistry>,
    refreshed_at: DateTime<Utc>,
}

pub struct PairIndexer {
    events: Arc<dyn PairEventSource>,
    resolver: Arc<dyn MarketInfoResolver>,
    estimator: Option<EstimationService>,
    event_fetch_limit: u32,

    snapshot: RwLock<Option<Arc<Snapshot>>>,
    refresh_lock: Mutex<()>,
}

impl PairIndexer {
    /// Create an indexer over explicit collaborators
    pub fn new(
        events: Arc<dyn PairEventSource>,
        resolver: Arc<dyn MarketInfoResolver>,
        estimator: Option<EstimationService>,
        event_fetch_limit: u32,
    ) -> Self {
        Self {
            events,
            resolver,
            estimator,
            event_fetch_limit: event_fetch_limit.max(1),
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Wire the HTTP collaborators described by `config`
    ///
    /// Opinion resolution is enabled only with an Opinion token contract;
    /// estimates only with a vault address.
    pub fn from_config(config: &IndexerConfig) -> Result<Self, IndexerError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let build_err = |e: anyhow::Error| IndexerError::Config(format!("{:#}", e));

        let events = SubgraphClient::with_url(&config.subgraph_url, timeout).map_err(build_err)?;

        let gamma = GammaClient::with_base_url(&config.gamma_api_base, timeout).map_err(build_err)?;
        let mut resolver = ProviderResolver::new()
            .with_concurrency(config.resolver_concurrency)
            .register(Arc::new(PolymarketProvider::with_client(gamma, config.polymarket_token_address)));

        match config.opinion_token_address {
            Some(token_address) => {
                let client =
                    OpinionClient::with_base_url(&config.opinion_api_base, config.opinion_api_key.clone(), timeout)
                        .map_err(build_err)?;
                resolver = resolver.register(Arc::new(OpinionProvider::new(client, token_address)));
            }
            None => warn!("Opinion token contract not configured, Opinion legs will stay unresolved"),
        }

        let estimator = match config.vault_address {
            Some(vault) => {
                let reader = RpcVaultReader::with_rpc_url(&config.rpc_url, vault, timeout).map_err(build_err)?;
                Some(EstimationService::new(Arc::new(reader)))
            }
            None => None,
        };

        Ok(Self::new(Arc::new(events), Arc::new(resolver), estimator, config.event_fetch_limit))
    }

    /// Run the first refresh
    pub async fn initialize(&self) -> Result<RegistryStats, IndexerError> {
        self.refresh().await
    }

    /// Rebuild the registry from upstream and swap it in
    pub async fn refresh(&self) -> Result<RegistryStats, IndexerError> {
        let _guard = self.refresh_lock.lock().await;
        let started = Instant::now();

        let events = self.fetch_events().await?;
        let paused = latest_timestamps(&events.paused);
        let removed = latest_timestamps(&events.removed);

        let tokens = unique_tokens(&events.added);
        let infos = self.resolver.resolve_batch(&tokens).await.map_err(IndexerError::MarketResolve)?;
        debug!("Resolved {}/{} token legs", infos.len(), tokens.len());

        let (markets, aggregation) = aggregate(&events.added, &paused, &removed, &infos);
        let registry = MarketRegistry::from_markets(markets);
        let stats = registry.stats();

        *self.snapshot.write() = Some(Arc::new(Snapshot { registry: Arc::new(registry), refreshed_at: Utc::now() }));

        info!(
            "Refresh complete in {:?}: {} markets, {} pairs ({} allowed / {} paused / {} removed markets), \
             {} added events ({} superseded by relisting), {} skipped (missing info {}, missing market id {})",
            started.elapsed(),
            stats.markets,
            stats.pairs,
            stats.allowed,
            stats.paused,
            stats.removed,
            aggregation.pairs_seen,
            aggregation.superseded,
            aggregation.skipped_missing_info + aggregation.skipped_missing_market_id,
            aggregation.skipped_missing_info,
            aggregation.skipped_missing_market_id,
        );

        Ok(stats)
    }

    async fn fetch_events(&self) -> Result<PairEvents, IndexerError> {
        let limit = self.event_fetch_limit;
        let (added, paused, removed) = tokio::try_join!(
            self.events.fetch_added(limit),
            self.events.fetch_paused(limit),
            self.events.fetch_removed(limit),
        )
        .map_err(IndexerError::EventFetch)?;

        debug!("Fetched events: {} added, {} paused, {} removed", added.len(), paused.len(), removed.len());
        Ok(PairEvents { added, paused, removed })
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Completion time of the snapshot currently served
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().as_ref().map(|s| s.refreshed_at)
    }

    /// Current registry snapshot; stays valid across later refreshes
    pub fn registry(&self) -> Result<Arc<MarketRegistry>, IndexerError> {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| Arc::clone(&s.registry))
            .ok_or(IndexerError::NotInitialized)
    }

    pub fn get_all_markets(&self) -> Result<Vec<Market>, IndexerError> {
        Ok(self.registry()?.get_all_markets().into_iter().cloned().collect())
    }

    pub fn get_market(&self, market_key: &str) -> Result<Option<Market>, IndexerError> {
        Ok(self.registry()?.get_market_by_key(market_key).cloned())
    }

    pub fn search_markets(&self, params: &MarketSearchParams) -> Result<Vec<Market>, IndexerError> {
        Ok(self.registry()?.search_markets(params).into_iter().cloned().collect())
    }

    pub fn find_markets_by_url(&self, pattern: &str) -> Result<Vec<Market>, IndexerError> {
        Ok(self.registry()?.search_by_url(pattern).into_iter().cloned().collect())
    }

    /// Pair and owning market for the given legs, in either direction
    pub fn find_pair(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
    ) -> Result<Option<FoundPair>, IndexerError> {
        let registry = self.registry()?;
        Ok(registry
            .find_pair_by_tokens(token_a, id_a, token_b, id_b)
            .map(|m| FoundPair { market: m.market.clone(), pair: m.pair.clone() }))
    }

    /// Markets ordered by their newest pair, newest first; ties by market key
    pub fn get_markets_by_recency(&self) -> Result<Vec<Market>, IndexerError> {
        let mut markets = self.get_all_markets()?;
        markets.sort_by(|a, b| {
            b.latest_pair_timestamp()
                .cmp(&a.latest_pair_timestamp())
                .then_with(|| a.market_key.cmp(&b.market_key))
        });
        Ok(markets)
    }

    pub fn stats(&self) -> Result<RegistryStats, IndexerError> {
        Ok(self.registry()?.stats())
    }

    fn estimator(&self) -> Result<&EstimationService, IndexerError> {
        self.estimator
            .as_ref()
            .ok_or_else(|| IndexerError::Config("vault address not configured (PAIR_INDEXER_VAULT_ADDRESS)".to_string()))
    }

    pub async fn estimate_merge(&self, request: &MergeRequest) -> Result<MergeEstimate, IndexerError> {
        self.estimator()?.estimate_merge(request).await.map_err(IndexerError::VaultRead)
    }

    pub async fn estimate_split(&self, request: &SplitRequest) -> Result<SplitEstimate, IndexerError> {
        self.estimator()?.estimate_split(request).await.map_err(IndexerError::VaultRead)
    }

    pub async fn get_vault_liquidity(&self) -> Result<VaultLiquidity, IndexerError> {
        self.estimator()?.vault_liquidity().await.map_err(IndexerError::VaultRead)
    }
}

/// Every token leg of `added`, deduplicated, in first-seen order
pub fn unique_tokens(added: &[PairAddedEvent]) -> Vec<TokenRef> {
    let mut seen = HashSet::new();
    added
        .iter()
        .flat_map(|event| {
            [
                TokenRef::new(event.outcome_token_a, event.outcome_id_a),
                TokenRef::new(event.outcome_token_b, event.outcome_id_b),
            ]
        })
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketInfo, PairStatus, PairStatusEvent};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeEvents {
        added: parking_lot::Mutex<Vec<PairAddedEvent>>,
        paused: parking_lot::Mutex<Vec<PairStatusEvent>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl PairEventSource for FakeEvents {
        async fn fetch_added(&self, _limit: u32) -> anyhow::Result<Vec<PairAddedEvent>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("subgraph unavailable");
            }
            Ok(self.added.lock().clone())
        }

        async fn fetch_paused(&self, _limit: u32) -> anyhow::Result<Vec<PairStatusEvent>> {
            Ok(self.paused.lock().clone())
        }

        async fn fetch_removed(&self, _limit: u32) -> anyhow::Result<Vec<PairStatusEvent>> {
            Ok(Vec::new())
        }
    }

    /// Resolves token id N on contract 1 to polymarket market N, on contract 2 to opinion market N
    #[derive(Default)]
    struct FakeResolver {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl MarketInfoResolver for FakeResolver {
        async fn resolve_batch(&self, tokens: &[TokenRef]) -> anyhow::Result<HashMap<String, MarketInfo>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(tokens
                .iter()
                .map(|t| {
                    let provider = if t.token_address == Address::with_last_byte(1) { "polymarket" } else { "opinion" };
                    let info = MarketInfo {
                        provider_id: provider.to_string(),
                        question: format!("{} question {}", provider, t.token_id),
                        thumbnail_url: None,
                        yes_token_id: t.token_id.to_string(),
                        no_token_id: "0".to_string(),
                        market_id: t.token_id.to_string(),
                        url: Some(format!("https://{}.example/m/{}", provider, t.token_id)),
                    };
                    (t.lookup_key(), info)
                })
                .collect())
        }
    }

    fn added(id_a: u64, id_b: u64, timestamp: u64) -> PairAddedEvent {
        PairAddedEvent {
            outcome_token_a: Address::with_last_byte(1),
            outcome_id_a: U256::from(id_a),
            outcome_token_b: Address::with_last_byte(2),
            outcome_id_b: U256::from(id_b),
            early_exit_amount_contract: Address::with_last_byte(3),
            decimals_a: 6,
            decimals_b: 18,
            timestamp,
        }
    }

    fn indexer(events: Arc<FakeEvents>) -> PairIndexer {
        PairIndexer::new(events, Arc::new(FakeResolver::default()), None, 100)
    }

    #[test]
    fn test_queries_before_initialize_fail_fast() {
        let indexer = indexer(Arc::new(FakeEvents::default()));
        assert!(!indexer.is_initialized());
        assert!(indexer.last_refreshed_at().is_none());
        assert!(matches!(indexer.get_all_markets(), Err(IndexerError::NotInitialized)));
        assert!(matches!(indexer.get_market("x"), Err(IndexerError::NotInitialized)));
        assert!(matches!(indexer.stats(), Err(IndexerError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_empty_upstream_initializes_to_empty_registry() {
        let indexer = indexer(Arc::new(FakeEvents::default()));
        let stats = indexer.initialize().await.unwrap();
        assert_eq!(stats, RegistryStats::default());
        assert!(indexer.is_initialized());
        assert!(indexer.get_all_markets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialize_stays_uninitialized() {
        let events = Arc::new(FakeEvents::default());
        events.fail.store(true, Ordering::SeqCst);
        let indexer = indexer(events);

        let err = indexer.initialize().await.unwrap_err();
        assert!(matches!(err, IndexerError::EventFetch(_)));
        assert!(err.is_upstream());
        assert!(!indexer.is_initialized());
        assert!(matches!(indexer.search_markets(&MarketSearchParams::default()), Err(IndexerError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let events = Arc::new(FakeEvents::default());
        events.added.lock().push(added(10, 20, 1000));
        let indexer = indexer(events.clone());
        indexer.initialize().await.unwrap();
        let refreshed_at = indexer.last_refreshed_at();

        events.fail.store(true, Ordering::SeqCst);
        assert!(indexer.refresh().await.is_err());

        assert_eq!(indexer.get_all_markets().unwrap().len(), 1);
        assert_eq!(indexer.last_refreshed_at(), refreshed_at);
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_wholesale() {
        let events = Arc::new(FakeEvents::default());
        events.added.lock().push(added(10, 20, 1000));
        let indexer = indexer(events.clone());
        indexer.initialize().await.unwrap();
        let before = indexer.registry().unwrap();

        events.paused.lock().push(PairStatusEvent {
            outcome_token_a: Address::with_last_byte(2),
            outcome_id_a: U256::from(20u64),
            outcome_token_b: Address::with_last_byte(1),
            outcome_id_b: U256::from(10u64),
            timestamp: 1500,
        });
        events.added.lock().push(added(11, 21, 1200));
        let stats = indexer.refresh().await.unwrap();

        assert_eq!(stats.markets, 2);
        assert_eq!(stats.paused, 1);
        // Snapshot handed out earlier is unaffected by the swap
        assert_eq!(before.len(), 1);
        assert_eq!(before.stats().allowed, 1);
    }

    #[tokio::test]
    async fn test_resolver_called_once_with_unique_tokens() {
        let events = Arc::new(FakeEvents::default());
        events.added.lock().extend([added(10, 20, 1000), added(10, 21, 1100), added(10, 20, 1200)]);
        let resolver = Arc::new(FakeResolver::default());
        let indexer = PairIndexer::new(events.clone(), resolver.clone(), None, 100);

        indexer.initialize().await.unwrap();
        assert_eq!(resolver.batches.load(Ordering::SeqCst), 1);
        assert_eq!(unique_tokens(&events.added.lock()).len(), 3);
    }

    #[tokio::test]
    async fn test_markets_by_recency() {
        let events = Arc::new(FakeEvents::default());
        events.added.lock().extend([added(10, 20, 1000), added(11, 21, 3000), added(12, 22, 2000)]);
        let indexer = indexer(events);
        indexer.initialize().await.unwrap();

        let order: Vec<u64> =
            indexer.get_markets_by_recency().unwrap().iter().map(|m| m.latest_pair_timestamp()).collect();
        assert_eq!(order, vec![3000, 2000, 1000]);
    }

    #[tokio::test]
    async fn test_estimates_require_vault() {
        let indexer = indexer(Arc::new(FakeEvents::default()));
        let err = indexer.get_vault_liquidity().await.unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn test_unique_tokens_keeps_first_seen_order() {
        let tokens = unique_tokens(&[added(10, 20, 1), added(20, 10, 2)]);
        let ids: Vec<U256> = tokens.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![U256::from(10u64), U256::from(20u64), U256::from(20u64), U256::from(10u64)]);
    }

    #[test]
    fn test_from_config_rejects_invalid_url() {
        let config = IndexerConfig { subgraph_url: "not a url".to_string(), ..Default::default() };
        assert!(matches!(PairIndexer::from_config(&config), Err(IndexerError::Config(_))));
    }

    #[test]
    fn test_from_config_defaults() {
        let indexer = PairIndexer::from_config(&IndexerConfig::default()).unwrap();
        assert!(!indexer.is_initialized());
        assert!(indexer.estimator.is_none());
    }

    #[tokio::test]
    async fn test_status_reflects_pause() {
        let events = Arc::new(FakeEvents::default());
        events.added.lock().push(added(10, 20, 1000));
        events.paused.lock().push(PairStatusEvent {
            outcome_token_a: Address::with_last_byte(1),
            outcome_id_a: U256::from(10u64),
            outcome_token_b: Address::with_last_byte(2),
            outcome_id_b: U256::from(20u64),
            timestamp: 1500,
        });
        let indexer = indexer(events);
        indexer.initialize().await.unwrap();

        let found = indexer
            .find_pair(Address::with_last_byte(2), U256::from(20u64), Address::with_last_byte(1), U256::from(10u64))
            .unwrap()
            .unwrap();
        assert_eq!(found.pair.status, PairStatus::Paused);
        assert_eq!(found.market.overall_status, PairStatus::Paused);
    }
}
