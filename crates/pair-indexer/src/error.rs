//! Errors surfaced by the indexer's public operations
//!
//! Collaborators (subgraph, providers, vault reader) report failures as
//! `anyhow::Error`; they are wrapped here by stage so callers can tell an
//! upstream outage from "not initialized yet". Not-found is never an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    /// A query ran before any successful `initialize()` / `refresh()`
    #[error("pair indexer not initialized: call initialize() first")]
    NotInitialized,

    #[error("failed to fetch pair events: {0:#}")]
    EventFetch(anyhow::Error),

    #[error("failed to resolve market info: {0:#}")]
    MarketResolve(anyhow::Error),

    #[error("vault read failed: {0:#}")]
    VaultRead(anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexerError {
    /// Whether the failure came from an upstream collaborator
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            IndexerError::EventFetch(_) | IndexerError::MarketResolve(_) | IndexerError::VaultRead(_)
        )
    }
}
