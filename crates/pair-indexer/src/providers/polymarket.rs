//! Polymarket provider (Gamma API)
//!
//! Base URL: https://gamma-api.polymarket.com
//!
//! # Endpoints
//! - GET /markets/{id} - Get market by ID
//! - GET /markets?clob_token_ids={token_id} - Markets containing an outcome token
//!
//! # Source
//! - https://docs.polymarket.com/developers/gamma-markets-api/markets
//! - Gamma Structure: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure

use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{yes_no_ids, MarketProvider};
use crate::types::MarketInfo;
use crate::{GAMMA_API_BASE, POLYMARKET_CTF_ADDRESS, PROVIDER_POLYMARKET};

/// Public market page prefix
const POLYMARKET_MARKET_URL: &str = "https://polymarket.com/market";

/// Deserialize a stringified JSON array (e.g., "[\"a\", \"b\"]") into Vec<String>
/// Handles both String and missing/null fields
fn deserialize_stringified_array_or_default<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, SeqAccess, Visitor};

    struct StringifiedArrayVisitor;

    impl<'de> Visitor<'de> for StringifiedArrayVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a stringified JSON array, an array, or null")
        }

        fn visit_str<E: Error>(self, s: &str) -> Result<Self::Value, E> {
            if s.is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str(s)
                .map_err(|e| E::custom(format!("Invalid JSON array '{}': {}", s, e)))
        }

        fn visit_string<E: Error>(self, s: String) -> Result<Self::Value, E> {
            self.visit_str(&s)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                items.push(item);
            }
            Ok(items)
        }

        fn visit_none<E: Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(StringifiedArrayVisitor)
}

/// Gamma Market response from GET /markets or GET /markets/{id}
///
/// Note: The Gamma API returns some fields as stringified JSON arrays (e.g., "[\"a\", \"b\"]")
/// rather than actual JSON arrays. Custom deserializers handle this.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    /// Unique market identifier
    pub id: String,

    /// URL-friendly market name
    #[serde(default)]
    pub slug: String,

    /// Market question/title
    #[serde(default)]
    pub question: String,

    /// CLOB token IDs for each outcome (exactly 2 for binary markets)
    #[serde(default, deserialize_with = "deserialize_stringified_array_or_default")]
    pub clob_token_ids: Vec<String>,

    /// Outcome labels (e.g., ["Yes", "No"])
    #[serde(default, deserialize_with = "deserialize_stringified_array_or_default")]
    pub outcomes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub closed: bool,

    /// Extra fields for forward compatibility
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GammaMarket {
    /// Check if this is a valid binary market with 2 token IDs
    pub fn is_valid_binary(&self) -> bool {
        self.clob_token_ids.len() == 2
    }

    /// Convert to provider-neutral market info; `None` for non-binary markets
    pub fn to_market_info(&self) -> Option<MarketInfo> {
        let (yes_token_id, no_token_id) = yes_no_ids(&self.clob_token_ids, &self.outcomes)?;

        Some(MarketInfo {
            provider_id: PROVIDER_POLYMARKET.to_string(),
            question: self.question.clone(),
            thumbnail_url: self.image.clone().or_else(|| self.icon.clone()).filter(|s| !s.is_empty()),
            yes_token_id,
            no_token_id,
            market_id: self.id.clone(),
            url: (!self.slug.is_empty()).then(|| format!("{}/{}", POLYMARKET_MARKET_URL, self.slug)),
        })
    }
}

/// Gamma API REST client
#[derive(Clone)]
pub struct GammaClient {
    client: Client,
    base_url: String,
}

impl GammaClient {
    /// Create a new Gamma client with default base URL
    pub fn new() -> Result<Self> {
        Self::with_base_url(GAMMA_API_BASE, Duration::from_secs(30))
    }

    /// Create a new Gamma client with custom base URL
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// GET /markets/{id} - Get market by ID
    pub async fn get_market_by_id(&self, id: &str) -> Result<Option<GammaMarket>> {
        let url = format!("{}/markets/{}", self.base_url, id);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.context("HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let market: GammaMarket = response.json().await.context("Failed to parse GammaMarket")?;
        Ok(Some(market))
    }

    /// GET /markets?clob_token_ids={token_id} - Markets containing this outcome token
    /// Returns empty vec if no matches
    pub async fn get_markets_by_clob_token(&self, token_id: &str) -> Result<Vec<GammaMarket>> {
        let url = format!("{}/markets?clob_token_ids={}", self.base_url, token_id);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let markets: Vec<GammaMarket> =
            response.json().await.context("Failed to parse market list")?;
        Ok(markets)
    }
}

/// Polymarket as a `MarketProvider`
pub struct PolymarketProvider {
    gamma: GammaClient,
    token_address: Address,
}

impl PolymarketProvider {
    /// Provider over the public Gamma API and the Polygon CTF contract
    pub fn new() -> Result<Self> {
        Ok(Self { gamma: GammaClient::new()?, token_address: POLYMARKET_CTF_ADDRESS })
    }

    pub fn with_client(gamma: GammaClient, token_address: Address) -> Self {
        Self { gamma, token_address }
    }
}

#[async_trait]
impl MarketProvider for PolymarketProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_POLYMARKET
    }

    fn token_address(&self) -> Address {
        self.token_address
    }

    async fn get_market_by_id(&self, market_id: &str) -> Result<Option<MarketInfo>> {
        let market = self.gamma.get_market_by_id(market_id).await?;
        Ok(market.and_then(|m| m.to_market_info()))
    }

    async fn get_market_by_outcome_token(&self, token_id: &str) -> Result<Option<MarketInfo>> {
        let markets = self.gamma.get_markets_by_clob_token(token_id).await?;

        // The filter is exact on Gamma's side; double-check membership anyway
        let market = markets.into_iter().find(|m| m.clob_token_ids.iter().any(|id| id == token_id));

        match market {
            Some(m) if m.is_valid_binary() => Ok(m.to_market_info()),
            Some(m) => {
                warn!("Gamma market {} has {} tokens, expected 2", m.id, m.clob_token_ids.len());
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
