//! Data types for the pair indexer
//!
//! # Design Principles
//! 1. Token ids and vault amounts are `U256` - never floating point (18-decimal tokens)
//! 2. Upstream records carry integers as decimal strings; they are parsed once, at the edge
//! 3. Addresses are `Address`, so comparisons are case-insensitive by construction
//! 4. Per-provider metadata lives in maps keyed by provider id; order carries no meaning
//!
//! # Sources
//! - Subgraph entities: PairAdded / PairPaused / PairRemoved
//! - Gamma Structure: https://docs.polymarket.com/developers/gamma-markets-api/gamma-structure

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{hex, Address, B256, U256};
use serde::{Deserialize, Serialize};

// ============================================================================
// Pair Status
// ============================================================================

/// Current listing status of a pair on the vault
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PairStatus {
    Allowed,
    Paused,
    Removed,
}

impl PairStatus {
    /// Precedence when folding pair statuses into a market status.
    /// Higher wins: allowed > paused > removed.
    pub fn precedence(self) -> u8 {
        match self {
            PairStatus::Allowed => 2,
            PairStatus::Paused => 1,
            PairStatus::Removed => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PairStatus::Allowed => "allowed",
            PairStatus::Paused => "paused",
            PairStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PairStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allowed" => Ok(PairStatus::Allowed),
            "paused" => Ok(PairStatus::Paused),
            "removed" => Ok(PairStatus::Removed),
            other => Err(format!("unknown pair status '{}'", other)),
        }
    }
}

// ============================================================================
// Decimal-string helpers
// ============================================================================

/// Deserialize a decimal-string (or JSON number) integer into `U256`
fn deserialize_decimal_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Visitor};

    struct DecimalU256Visitor;

    impl<'de> Visitor<'de> for DecimalU256Visitor {
        type Value = U256;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a decimal integer string or unsigned number")
        }

        fn visit_str<E: Error>(self, s: &str) -> Result<Self::Value, E> {
            U256::from_str_radix(s.trim(), 10)
                .map_err(|e| E::custom(format!("invalid decimal integer '{}': {}", s, e)))
        }

        fn visit_string<E: Error>(self, s: String) -> Result<Self::Value, E> {
            self.visit_str(&s)
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(U256::from(v))
        }
    }

    deserializer.deserialize_any(DecimalU256Visitor)
}

/// Deserialize a decimal-string (or JSON number) integer into `u64`
fn deserialize_decimal_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{Error, Visitor};

    struct DecimalU64Visitor;

    impl<'de> Visitor<'de> for DecimalU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a decimal integer string or unsigned number")
        }

        fn visit_str<E: Error>(self, s: &str) -> Result<Self::Value, E> {
            s.trim()
                .parse::<u64>()
                .map_err(|e| E::custom(format!("invalid decimal integer '{}': {}", s, e)))
        }

        fn visit_string<E: Error>(self, s: String) -> Result<Self::Value, E> {
            self.visit_str(&s)
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
    }

    deserializer.deserialize_any(DecimalU64Visitor)
}

/// Token decimals arrive as strings from the subgraph; anything above 255 is malformed
fn deserialize_decimals<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = deserialize_decimal_u64(deserializer)?;
    u8::try_from(value).map_err(|_| D::Error::custom(format!("token decimals out of range: {}", value)))
}

/// Resolver lookup key for one token leg: `"{0x-lowercase-address}-{decimal id}"`
pub fn token_lookup_key(token_address: &Address, token_id: &U256) -> String {
    format!("{}-{}", hex::encode_prefixed(token_address), token_id)
}

// ============================================================================
// Upstream Event Records (subgraph)
// ============================================================================

/// Pair listed on the vault (PairAdded event)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairAddedEvent {
    pub outcome_token_a: Address,
    #[serde(deserialize_with = "deserialize_decimal_u256")]
    pub outcome_id_a: U256,
    pub outcome_token_b: Address,
    #[serde(deserialize_with = "deserialize_decimal_u256")]
    pub outcome_id_b: U256,
    /// Contract computing the early-exit curve for this pair
    pub early_exit_amount_contract: Address,
    #[serde(deserialize_with = "deserialize_decimals")]
    pub decimals_a: u8,
    #[serde(deserialize_with = "deserialize_decimals")]
    pub decimals_b: u8,
    /// Unix seconds
    #[serde(deserialize_with = "deserialize_decimal_u64")]
    pub timestamp: u64,
}

/// Pair paused or removed (PairPaused / PairRemoved events share this shape)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairStatusEvent {
    pub outcome_token_a: Address,
    #[serde(deserialize_with = "deserialize_decimal_u256")]
    pub outcome_id_a: U256,
    pub outcome_token_b: Address,
    #[serde(deserialize_with = "deserialize_decimal_u256")]
    pub outcome_id_b: U256,
    /// Unix seconds
    #[serde(deserialize_with = "deserialize_decimal_u64")]
    pub timestamp: u64,
}

/// All three event streams as fetched in one refresh
#[derive(Clone, Debug, Default)]
pub struct PairEvents {
    pub added: Vec<PairAddedEvent>,
    pub paused: Vec<PairStatusEvent>,
    pub removed: Vec<PairStatusEvent>,
}

// ============================================================================
// Market Info (resolver output)
// ============================================================================

/// One token leg to resolve
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenRef {
    pub token_address: Address,
    pub token_id: U256,
}

impl TokenRef {
    pub fn new(token_address: Address, token_id: U256) -> Self {
        Self { token_address, token_id }
    }

    pub fn lookup_key(&self) -> String {
        token_lookup_key(&self.token_address, &self.token_id)
    }
}

/// Provider-specific market metadata for one outcome token
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    /// Provider identifier (e.g. "polymarket", "opinion")
    pub provider_id: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Decimal string, as the provider reports it
    pub yes_token_id: String,
    /// Decimal string, as the provider reports it
    pub no_token_id: String,
    /// Provider-side market id; empty means unusable for grouping
    pub market_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ============================================================================
// Indexed Entities
// ============================================================================

/// One bilateral pair between two outcome tokens, with its reconciled status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeTokenPair {
    /// Canonical, direction-independent pair key
    pub key: B256,
    /// Legs in the order the PairAdded event reported them
    pub outcome_token_a: Address,
    pub outcome_id_a: U256,
    pub outcome_token_b: Address,
    pub outcome_id_b: U256,
    pub outcome_id_a_is_yes_token_id: bool,
    pub outcome_id_b_is_yes_token_id: bool,
    pub early_exit_amount_contract: Address,
    pub decimals_a: u8,
    pub decimals_b: u8,
    pub status: PairStatus,
    /// Creation time (PairAdded timestamp, unix seconds)
    pub timestamp: u64,
}

impl OutcomeTokenPair {
    /// Whether this pair's legs equal (token_a, id_a, token_b, id_b) in either direction
    pub fn matches_legs(&self, token_a: &Address, id_a: &U256, token_b: &Address, id_b: &U256) -> bool {
        let forward = self.outcome_token_a == *token_a
            && self.outcome_id_a == *id_a
            && self.outcome_token_b == *token_b
            && self.outcome_id_b == *id_b;
        let reverse = self.outcome_token_a == *token_b
            && self.outcome_id_a == *id_b
            && self.outcome_token_b == *token_a
            && self.outcome_id_b == *id_a;
        forward || reverse
    }
}

/// Yes/No token ids reported by one provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTokenIds {
    pub yes_token_id: String,
    pub no_token_id: String,
}

/// A logical prediction-market question spanning one or more providers
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// `"{providerId}-{marketId}"` parts sorted by provider id, joined with `_`
    pub market_key: String,
    /// Display question: first non-empty provider question
    pub question: String,
    pub provider_questions: HashMap<String, String>,
    pub provider_images: HashMap<String, String>,
    pub provider_token_ids: HashMap<String, ProviderTokenIds>,
    pub provider_urls: HashMap<String, String>,
    pub pairs: Vec<OutcomeTokenPair>,
    pub overall_status: PairStatus,
}

impl Market {
    /// Most recent pair creation time; 0 for a market without pairs
    pub fn latest_pair_timestamp(&self) -> u64 {
        self.pairs.iter().map(|p| p.timestamp).max().unwrap_or(0)
    }

    /// Case-insensitive substring match against the display or any provider question.
    /// `needle` must already be lower-cased.
    pub fn question_contains(&self, needle: &str) -> bool {
        self.question.to_lowercase().contains(needle)
            || self.provider_questions.values().any(|q| q.to_lowercase().contains(needle))
    }
}

/// Owned result of a pair lookup
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FoundPair {
    pub market: Market,
    pub pair: OutcomeTokenPair,
}

/// Conjunctive search filters; `None` fields are pass-through
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PairStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// Registry summary counts
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub markets: usize,
    pub pairs: usize,
    /// Markets by overall status
    pub allowed: usize,
    pub paused: usize,
    pub removed: usize,
}

// ============================================================================
// Vault Estimates
// ============================================================================

/// Merge (early exit): deliver both legs, receive base asset
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub token_a: Address,
    pub token_id_a: U256,
    pub token_b: Address,
    pub token_id_b: U256,
    /// Outcome-token amount per leg, smallest unit
    pub amount: U256,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MergeEstimate {
    pub estimated_receive_amount: U256,
    pub vault_has_liquidity: bool,
    pub available_vault_liquidity: U256,
    pub total_assets: U256,
    pub total_reserved: U256,
}

/// Split: deposit base asset, receive both legs
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub token_a: Address,
    pub token_id_a: U256,
    pub token_b: Address,
    pub token_id_b: U256,
    /// Base-asset amount, smallest unit
    pub base_amount: U256,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SplitEstimate {
    pub estimated_tokens_received: U256,
    pub vault_has_tokens: bool,
    pub vault_balance_token_a: U256,
    pub vault_balance_token_b: U256,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultLiquidity {
    pub total_assets: U256,
    pub total_reserved: U256,
    /// `total_assets - total_reserved`
    pub available: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_added_event_with_decimal_strings() {
        let json = r#"{
            "outcomeTokenA": "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045",
            "outcomeIdA": "52114319501245915516055106046884209969926127482827954674443846427813813222426",
            "outcomeTokenB": "0xad1a38cec043e70e83a3ec30443db285ed10d774",
            "outcomeIdB": "3019",
            "earlyExitAmountContract": "0x0000000000000000000000000000000000000001",
            "decimalsA": "6",
            "decimalsB": "18",
            "timestamp": "1735689600"
        }"#;

        let event: PairAddedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.decimals_a, 6);
        assert_eq!(event.decimals_b, 18);
        assert_eq!(event.timestamp, 1_735_689_600);
        assert_eq!(event.outcome_id_b, U256::from(3019u64));
        assert_eq!(
            event.outcome_id_a.to_string(),
            "52114319501245915516055106046884209969926127482827954674443846427813813222426"
        );
    }

    #[test]
    fn test_parse_status_event_rejects_malformed_number() {
        let json = r#"{
            "outcomeTokenA": "0x0000000000000000000000000000000000000aaa",
            "outcomeIdA": "10x",
            "outcomeTokenB": "0x0000000000000000000000000000000000000bbb",
            "outcomeIdB": "20",
            "timestamp": "1500"
        }"#;

        assert!(serde_json::from_str::<PairStatusEvent>(json).is_err());
    }

    #[test]
    fn test_decimals_out_of_range() {
        let json = r#"{
            "outcomeTokenA": "0x0000000000000000000000000000000000000aaa",
            "outcomeIdA": "1",
            "outcomeTokenB": "0x0000000000000000000000000000000000000bbb",
            "outcomeIdB": "2",
            "earlyExitAmountContract": "0x0000000000000000000000000000000000000001",
            "decimalsA": "300",
            "decimalsB": "18",
            "timestamp": "1"
        }"#;

        assert!(serde_json::from_str::<PairAddedEvent>(json).is_err());
    }

    #[test]
    fn test_token_lookup_key_is_lowercase() {
        let upper: Address = "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".parse().unwrap();
        let key = token_lookup_key(&upper, &U256::from(42u64));
        assert_eq!(key, "0x4d97dcd97ec945f40cf65f87097ace5ea0476045-42");
    }

    #[test]
    fn test_pair_status_from_str() {
        assert_eq!("ALLOWED".parse::<PairStatus>(), Ok(PairStatus::Allowed));
        assert_eq!("paused".parse::<PairStatus>(), Ok(PairStatus::Paused));
        assert!("frozen".parse::<PairStatus>().is_err());
    }

    #[test]
    fn test_pair_status_serialization() {
        let json = serde_json::to_string(&PairStatus::Removed).unwrap();
        assert_eq!(json, "\"removed\"");
    }

    #[test]
    fn test_status_precedence_order() {
        assert!(PairStatus::Allowed.precedence() > PairStatus::Paused.precedence());
        assert!(PairStatus::Paused.precedence() > PairStatus::Removed.precedence());
    }
}
