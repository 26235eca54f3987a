//! Outcome-Token Pair Indexer
//!
//! Indexes bilateral outcome-token pairs listed on the pair vault, groups them
//! into cross-provider markets and previews merge/split economics.
//!
//! # Pipeline
//! 1. `subgraph`: fetch added / paused / removed pair events
//! 2. `pair_key` + `reconcile`: canonical identity and latest-event-wins status
//! 3. `providers`: batch-resolve per-provider market metadata for every token leg
//! 4. `aggregate`: build `Market` entities keyed by their provider market ids
//! 5. `registry`: index markets by URL, provider and pair key
//!
//! `estimate` is an independent read path against the vault contract.
//! `indexer::PairIndexer` ties everything together.

use alloy_primitives::{address, Address};

pub mod aggregate;
pub mod config;
pub mod error;
pub mod estimate;
pub mod indexer;
pub mod pair_key;
pub mod providers;
pub mod reconcile;
pub mod registry;
pub mod subgraph;
pub mod types;

pub use config::IndexerConfig;
pub use error::IndexerError;
pub use indexer::PairIndexer;
pub use types::*;

/// Default pair-vault subgraph endpoint (GraphQL)
pub const SUBGRAPH_URL: &str =
    "https://api.studio.thegraph.com/query/outcome-pair-vault/pair-vault/version/latest";

/// Polymarket Gamma API base URL (market metadata)
/// Source: https://docs.polymarket.com/quickstart/reference/endpoints
pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

/// Opinion OpenAPI base URL (market metadata)
pub const OPINION_API_BASE: &str = "https://proxy.opinion.trade:8443/openapi";

/// Default JSON-RPC endpoint for vault view calls (Polygon)
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";

/// Polymarket Conditional Tokens (CTF) contract on Polygon
pub const POLYMARKET_CTF_ADDRESS: Address = address!("0x4D97DCd97eC945f40cF65F87097ACe5EA0476045");

/// Provider identifiers used as keys in per-provider market metadata
pub const PROVIDER_POLYMARKET: &str = "polymarket";
pub const PROVIDER_OPINION: &str = "opinion";
