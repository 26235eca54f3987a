//! Pair-vault event source
//!
//! # Components
//! - `PairEventSource`: the three event streams the indexer consumes
//! - `SubgraphClient`: GraphQL implementation against the vault subgraph
//!
//! Every call returns the full history (newest first) up to `limit`; nothing
//! is consumed as a delta.

mod client;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{PairAddedEvent, PairStatusEvent};

pub use client::SubgraphClient;

#[async_trait]
pub trait PairEventSource: Send + Sync {
    async fn fetch_added(&self, limit: u32) -> Result<Vec<PairAddedEvent>>;
    async fn fetch_paused(&self, limit: u32) -> Result<Vec<PairStatusEvent>>;
    async fn fetch_removed(&self, limit: u32) -> Result<Vec<PairStatusEvent>>;
}
