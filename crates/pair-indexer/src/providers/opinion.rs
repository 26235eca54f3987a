//! Opinion provider (Opinion OpenAPI)
//!
//! # Endpoints
//! - GET /market/{marketId} - Market detail
//! - GET /market/token/{tokenId} - Market owning an outcome token
//!
//! Requests carry the `apikey` header when a key is configured. Responses are
//! wrapped in `{ "code": 0, "msg": "...", "result": ... }`; a non-zero code is
//! an upstream failure, HTTP 404 means unknown.

use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MarketProvider;
use crate::types::MarketInfo;
use crate::{OPINION_API_BASE, PROVIDER_OPINION};

/// Public market page prefix
const OPINION_MARKET_URL: &str = "https://app.opinion.trade/detail?topicId=";

/// Accept ids sent either as JSON numbers or strings
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Visitor};

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer id")
        }

        fn visit_str<E: Error>(self, s: &str) -> Result<Self::Value, E> {
            Ok(s.to_string())
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_unit<E: Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    result: Option<T>,
}

/// Market as returned by the Opinion OpenAPI
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpinionMarket {
    #[serde(deserialize_with = "deserialize_id")]
    pub market_id: String,
    #[serde(default)]
    pub market_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub yes_token_id: String,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub no_token_id: String,
}

impl OpinionMarket {
    pub fn to_market_info(&self) -> MarketInfo {
        MarketInfo {
            provider_id: PROVIDER_OPINION.to_string(),
            question: self.market_title.clone(),
            thumbnail_url: self.thumbnail_url.clone().filter(|s| !s.is_empty()),
            yes_token_id: self.yes_token_id.clone(),
            no_token_id: self.no_token_id.clone(),
            market_id: self.market_id.clone(),
            url: (!self.market_id.is_empty()).then(|| format!("{}{}", OPINION_MARKET_URL, self.market_id)),
        }
    }
}

/// Opinion OpenAPI REST client
#[derive(Clone)]
pub struct OpinionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpinionClient {
    /// Create a client for the public endpoint
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_base_url(OPINION_API_BASE, api_key, Duration::from_secs(30))
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    /// GET returning the unwrapped `result`; `Ok(None)` on 404 or an empty result
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await.context("HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, url, body);
        }

        let envelope: Envelope<T> = response.json().await.context("Failed to parse Opinion response")?;
        if envelope.code != 0 {
            anyhow::bail!("Opinion API error {} for {}: {}", envelope.code, url, envelope.msg);
        }

        Ok(envelope.result)
    }

    /// GET /market/{marketId}
    pub async fn get_market(&self, market_id: &str) -> Result<Option<OpinionMarket>> {
        self.get(&format!("/market/{}", market_id)).await
    }

    /// GET /market/token/{tokenId}
    pub async fn get_market_by_token(&self, token_id: &str) -> Result<Option<OpinionMarket>> {
        self.get(&format!("/market/token/{}", token_id)).await
    }
}

/// Opinion as a `MarketProvider`
pub struct OpinionProvider {
    client: OpinionClient,
    token_address: Address,
}

impl OpinionProvider {
    pub fn new(client: OpinionClient, token_address: Address) -> Self {
        Self { client, token_address }
    }
}

#[async_trait]
impl MarketProvider for OpinionProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_OPINION
    }

    fn token_address(&self) -> Address {
        self.token_address
    }

    async fn get_market_by_id(&self, market_id: &str) -> Result<Option<MarketInfo>> {
        Ok(self.client.get_market(market_id).await?.map(|m| m.to_market_info()))
    }

    async fn get_market_by_outcome_token(&self, token_id: &str) -> Result<Option<MarketInfo>> {
        Ok(self.client.get_market_by_token(token_id).await?.map(|m| m.to_market_info()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpinionProvider {
        let client =
            OpinionClient::with_base_url(&server.uri(), Some("test-key".to_string()), Duration::from_secs(5))
                .unwrap();
        OpinionProvider::new(client, Address::with_last_byte(0x0b))
    }

    #[test]
    fn test_market_to_info() {
        let market: OpinionMarket = serde_json::from_value(json!({
            "marketId": 3019,
            "marketTitle": "Rain in Lisbon tomorrow?",
            "yesTokenId": "201",
            "noTokenId": "202"
        }))
        .unwrap();

        let info = market.to_market_info();
        assert_eq!(info.provider_id, "opinion");
        assert_eq!(info.market_id, "3019");
        assert_eq!(info.url.as_deref(), Some("https://app.opinion.trade/detail?topicId=3019"));
        assert!(info.thumbnail_url.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_token_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market/token/201"))
            .and(header("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "success",
                "result": {
                    "marketId": 3019,
                    "marketTitle": "Rain in Lisbon tomorrow?",
                    "thumbnailUrl": "https://img.example/rain.png",
                    "yesTokenId": "201",
                    "noTokenId": "202"
                }
            })))
            .mount(&server)
            .await;

        let info = provider_for(&server).get_market_by_outcome_token("201").await.unwrap().unwrap();
        assert_eq!(info.market_id, "3019");
        assert_eq!(info.yes_token_id, "201");
        assert_eq!(info.thumbnail_url.as_deref(), Some("https://img.example/rain.png"));
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(provider_for(&server).get_market_by_id("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_code_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 10403,
                "msg": "invalid apikey",
                "result": null
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).get_market_by_outcome_token("201").await.unwrap_err();
        assert!(format!("{:#}", err).contains("invalid apikey"));
    }
}
