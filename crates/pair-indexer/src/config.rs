//! Indexer configuration
//!
//! Defaults point at public endpoints; every field can be overridden from
//! `PAIR_INDEXER_*` environment variables. The Opinion provider is only
//! enabled once its outcome-token contract is configured.

use std::str::FromStr;

use alloy_primitives::Address;
use url::Url;

use crate::error::IndexerError;
use crate::{DEFAULT_RPC_URL, GAMMA_API_BASE, OPINION_API_BASE, POLYMARKET_CTF_ADDRESS, SUBGRAPH_URL};

#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Pair-vault subgraph (GraphQL)
    pub subgraph_url: String,
    /// Max records fetched per event stream per refresh
    pub event_fetch_limit: u32,
    pub gamma_api_base: String,
    /// Outcome-token contract whose ids resolve through Gamma
    pub polymarket_token_address: Address,
    pub opinion_api_base: String,
    pub opinion_api_key: Option<String>,
    /// Outcome-token contract whose ids resolve through Opinion
    pub opinion_token_address: Option<Address>,
    /// JSON-RPC endpoint for vault view calls
    pub rpc_url: String,
    pub vault_address: Option<Address>,
    pub request_timeout_secs: u64,
    /// Max in-flight resolver requests during a refresh
    pub resolver_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            subgraph_url: SUBGRAPH_URL.to_string(),
            event_fetch_limit: 1000,
            gamma_api_base: GAMMA_API_BASE.to_string(),
            polymarket_token_address: POLYMARKET_CTF_ADDRESS,
            opinion_api_base: OPINION_API_BASE.to_string(),
            opinion_api_key: None,
            opinion_token_address: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            vault_address: None,
            request_timeout_secs: 30,
            resolver_concurrency: 8,
        }
    }
}

impl IndexerConfig {
    /// Defaults overridden by environment variables
    ///
    /// Recognised variables:
    /// - PAIR_INDEXER_SUBGRAPH_URL
    /// - PAIR_INDEXER_EVENT_LIMIT
    /// - PAIR_INDEXER_GAMMA_API_BASE
    /// - PAIR_INDEXER_POLYMARKET_TOKEN
    /// - PAIR_INDEXER_OPINION_API_BASE
    /// - PAIR_INDEXER_OPINION_API_KEY
    /// - PAIR_INDEXER_OPINION_TOKEN
    /// - PAIR_INDEXER_RPC_URL
    /// - PAIR_INDEXER_VAULT_ADDRESS
    /// - PAIR_INDEXER_HTTP_TIMEOUT_SECS
    /// - PAIR_INDEXER_RESOLVER_CONCURRENCY
    pub fn from_env() -> Result<Self, IndexerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PAIR_INDEXER_SUBGRAPH_URL") {
            config.subgraph_url = v;
        }
        if let Some(v) = var("PAIR_INDEXER_EVENT_LIMIT") {
            config.event_fetch_limit = parse_var("PAIR_INDEXER_EVENT_LIMIT", &v)?;
        }
        if let Some(v) = var("PAIR_INDEXER_GAMMA_API_BASE") {
            config.gamma_api_base = v;
        }
        if let Some(v) = var("PAIR_INDEXER_POLYMARKET_TOKEN") {
            config.polymarket_token_address = parse_var("PAIR_INDEXER_POLYMARKET_TOKEN", &v)?;
        }
        if let Some(v) = var("PAIR_INDEXER_OPINION_API_BASE") {
            config.opinion_api_base = v;
        }
        config.opinion_api_key = var("PAIR_INDEXER_OPINION_API_KEY");
        if let Some(v) = var("PAIR_INDEXER_OPINION_TOKEN") {
            config.opinion_token_address = Some(parse_var("PAIR_INDEXER_OPINION_TOKEN", &v)?);
        }
        if let Some(v) = var("PAIR_INDEXER_RPC_URL") {
            config.rpc_url = v;
        }
        if let Some(v) = var("PAIR_INDEXER_VAULT_ADDRESS") {
            config.vault_address = Some(parse_var("PAIR_INDEXER_VAULT_ADDRESS", &v)?);
        }
        if let Some(v) = var("PAIR_INDEXER_HTTP_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("PAIR_INDEXER_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("PAIR_INDEXER_RESOLVER_CONCURRENCY") {
            config.resolver_concurrency = parse_var("PAIR_INDEXER_RESOLVER_CONCURRENCY", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check URLs and limits
    pub fn validate(&self) -> Result<(), IndexerError> {
        for (name, value) in [
            ("subgraph_url", &self.subgraph_url),
            ("gamma_api_base", &self.gamma_api_base),
            ("opinion_api_base", &self.opinion_api_base),
            ("rpc_url", &self.rpc_url),
        ] {
            Url::parse(value)
                .map_err(|e| IndexerError::Config(format!("{} '{}' is not a valid URL: {}", name, value, e)))?;
        }

        if self.event_fetch_limit == 0 {
            return Err(IndexerError::Config("event_fetch_limit must be > 0".to_string()));
        }
        if self.resolver_concurrency == 0 {
            return Err(IndexerError::Config("resolver_concurrency must be > 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(IndexerError::Config("request_timeout_secs must be > 0".to_string()));
        }

        Ok(())
    }

    /// Vault address, required by the estimate read path
    pub fn require_vault_address(&self) -> Result<Address, IndexerError> {
        self.vault_address
            .ok_or_else(|| IndexerError::Config("vault address not configured (PAIR_INDEXER_VAULT_ADDRESS)".to_string()))
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, IndexerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| IndexerError::Config(format!("{}='{}': {}", name, value, e)))
}
