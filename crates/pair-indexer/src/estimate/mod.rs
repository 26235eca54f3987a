//! Vault estimates
//!
//! # Components
//! - `VaultReader`: raw view-function reads against the vault (external collaborator)
//! - `EstimationService`: shapes reads into merge/split previews
//! - `RpcVaultReader`: JSON-RPC `eth_call` implementation
//!
//! All amounts are `U256` in the smallest unit. A null read (`None`) counts
//! as zero; a failed read is an error. Reads are side-effect free, so
//! callers may retry them freely.

mod rpc;

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{MergeEstimate, MergeRequest, SplitEstimate, SplitRequest, VaultLiquidity};

pub use rpc::RpcVaultReader;

/// View functions the estimates are built from
#[async_trait]
pub trait VaultReader: Send + Sync {
    /// Base asset received for merging `amount` of each leg
    async fn preview_merge(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
        amount: U256,
    ) -> Result<Option<U256>>;

    /// Tokens (per leg) received for splitting `base_amount`
    async fn preview_split(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
        base_amount: U256,
    ) -> Result<Option<U256>>;

    async fn total_assets(&self) -> Result<Option<U256>>;

    async fn total_reserved(&self) -> Result<Option<U256>>;

    /// Vault's own balance of an outcome token
    async fn token_balance(&self, token: Address, id: U256) -> Result<Option<U256>>;
}

/// Merge/split previews over a `VaultReader`
#[derive(Clone)]
pub struct EstimationService {
    reader: Arc<dyn VaultReader>,
}

impl EstimationService {
    pub fn new(reader: Arc<dyn VaultReader>) -> Self {
        Self { reader }
    }

    /// Total assets, reserved amount and what is left to pay out
    pub async fn vault_liquidity(&self) -> Result<VaultLiquidity> {
        let (total_assets, total_reserved) =
            tokio::try_join!(self.reader.total_assets(), self.reader.total_reserved())?;
        Ok(liquidity(total_assets.unwrap_or_default(), total_reserved.unwrap_or_default()))
    }

    pub async fn estimate_merge(&self, request: &MergeRequest) -> Result<MergeEstimate> {
        let (received, liquidity) = tokio::try_join!(
            self.reader.preview_merge(
                request.token_a,
                request.token_id_a,
                request.token_b,
                request.token_id_b,
                request.amount,
            ),
            self.vault_liquidity(),
        )?;
        let estimated_receive_amount = received.unwrap_or_default();

        debug!(
            "Merge estimate: amount={} receive={} available={}",
            request.amount, estimated_receive_amount, liquidity.available
        );

        Ok(MergeEstimate {
            estimated_receive_amount,
            vault_has_liquidity: liquidity.available >= estimated_receive_amount,
            available_vault_liquidity: liquidity.available,
            total_assets: liquidity.total_assets,
            total_reserved: liquidity.total_reserved,
        })
    }

    pub async fn estimate_split(&self, request: &SplitRequest) -> Result<SplitEstimate> {
        let (received, balance_a, balance_b) = tokio::try_join!(
            self.reader.preview_split(
                request.token_a,
                request.token_id_a,
                request.token_b,
                request.token_id_b,
                request.base_amount,
            ),
            self.reader.token_balance(request.token_a, request.token_id_a),
            self.reader.token_balance(request.token_b, request.token_id_b),
        )?;

        let estimated_tokens_received = received.unwrap_or_default();
        let vault_balance_token_a = balance_a.unwrap_or_default();
        let vault_balance_token_b = balance_b.unwrap_or_default();

        debug!(
            "Split estimate: base={} tokens={} balances=({}, {})",
            request.base_amount, estimated_tokens_received, vault_balance_token_a, vault_balance_token_b
        );

        Ok(SplitEstimate {
            estimated_tokens_received,
            vault_has_tokens: vault_balance_token_a >= estimated_tokens_received
                && vault_balance_token_b >= estimated_tokens_received,
            vault_balance_token_a,
            vault_balance_token_b,
        })
    }
}

/// `available = total_assets - total_reserved`, floored at zero if the vault
/// ever reports more reserved than held
pub fn liquidity(total_assets: U256, total_reserved: U256) -> VaultLiquidity {
    if total_reserved > total_assets {
        warn!(
            "Vault reports more reserved than held: total_assets={} total_reserved={}, available floored to 0",
            total_assets, total_reserved
        );
    }
    VaultLiquidity { total_assets, total_reserved, available: total_assets.saturating_sub(total_reserved) }
}
