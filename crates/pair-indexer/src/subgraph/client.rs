//! Subgraph GraphQL client
//!
//! # Entities
//! - `pairAddeds` - PairAdded(outcomeTokenA, outcomeIdA, outcomeTokenB, outcomeIdB, earlyExitAmountContract, decimalsA, decimalsB)
//! - `pairPauseds` - PairPaused(outcomeTokenA, outcomeIdA, outcomeTokenB, outcomeIdB)
//! - `pairRemoveds` - PairRemoved(outcomeTokenA, outcomeIdA, outcomeTokenB, outcomeIdB)
//!
//! All integers come back as decimal strings.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::PairEventSource;
use crate::types::{PairAddedEvent, PairStatusEvent};
use crate::SUBGRAPH_URL;

const ADDED_QUERY: &str = r#"query PairAdded($first: Int!) {
  pairAddeds(first: $first, orderBy: timestamp, orderDirection: desc) {
    outcomeTokenA
    outcomeIdA
    outcomeTokenB
    outcomeIdB
    earlyExitAmountContract
    decimalsA
    decimalsB
    timestamp
  }
}"#;

const PAUSED_QUERY: &str = r#"query PairPaused($first: Int!) {
  pairPauseds(first: $first, orderBy: timestamp, orderDirection: desc) {
    outcomeTokenA
    outcomeIdA
    outcomeTokenB
    outcomeIdB
    timestamp
  }
}"#;

const REMOVED_QUERY: &str = r#"query PairRemoved($first: Int!) {
  pairRemoveds(first: $first, orderBy: timestamp, orderDirection: desc) {
    outcomeTokenA
    outcomeIdA
    outcomeTokenB
    outcomeIdB
    timestamp
  }
}"#;

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddedData {
    pair_addeds: Vec<PairAddedEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PausedData {
    pair_pauseds: Vec<PairStatusEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemovedData {
    pair_removeds: Vec<PairStatusEvent>,
}

/// Subgraph GraphQL client
#[derive(Clone)]
pub struct SubgraphClient {
    client: Client,
    url: String,
}

impl SubgraphClient {
    /// Create a client for the default subgraph endpoint
    pub fn new() -> Result<Self> {
        Self::with_url(SUBGRAPH_URL, Duration::from_secs(30))
    }

    /// Create a client for a custom endpoint
    pub fn with_url(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, url: url.to_string() })
    }

    /// POST a GraphQL query; a non-empty `errors` array is a failure
    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        debug!("POST {} ({})", self.url, query.lines().next().unwrap_or_default());

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("Subgraph request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, self.url, body);
        }

        let body: GraphQlResponse<T> =
            response.json().await.context("Failed to parse subgraph response")?;

        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            anyhow::bail!("Subgraph returned errors: {}", messages.join("; "));
        }

        body.data.context("Subgraph response has no data")
    }
}

#[async_trait]
impl PairEventSource for SubgraphClient {
    async fn fetch_added(&self, limit: u32) -> Result<Vec<PairAddedEvent>> {
        let data: AddedData = self
            .query(ADDED_QUERY, json!({ "first": limit }))
            .await
            .context("Failed to fetch PairAdded events")?;
        debug!("Fetched {} PairAdded events", data.pair_addeds.len());
        Ok(data.pair_addeds)
    }

    async fn fetch_paused(&self, limit: u32) -> Result<Vec<PairStatusEvent>> {
        let data: PausedData = self
            .query(PAUSED_QUERY, json!({ "first": limit }))
            .await
            .context("Failed to fetch PairPaused events")?;
        debug!("Fetched {} PairPaused events", data.pair_pauseds.len());
        Ok(data.pair_pauseds)
    }

    async fn fetch_removed(&self, limit: u32) -> Result<Vec<PairStatusEvent>> {
        let data: RemovedData = self
            .query(REMOVED_QUERY, json!({ "first": limit }))
            .await
            .context("Failed to fetch PairRemoved events")?;
        debug!("Fetched {} PairRemoved events", data.pair_removeds.len());
        Ok(data.pair_removeds)
    }
}
