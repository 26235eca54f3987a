//! JSON-RPC vault reader
//!
//! View calls go through an alloy HTTP provider with `sol!` contract
//! bindings. Every view used here returns a single `uint256`. An empty
//! return (`0x`) is a null read.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_sol_types::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::VaultReader;
use crate::DEFAULT_RPC_URL;

sol! {
    #[sol(rpc)]
    interface IPairVault {
        function previewMerge(address tokenA, uint256 idA, address tokenB, uint256 idB, uint256 amount) external view returns (uint256);
        function previewSplit(address tokenA, uint256 idA, address tokenB, uint256 idB, uint256 baseAmount) external view returns (uint256);
        function totalAssets() external view returns (uint256);
        function totalReserved() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IERC1155 {
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

/// `VaultReader` over a JSON-RPC endpoint
#[derive(Clone)]
pub struct RpcVaultReader {
    provider: DynProvider,
    vault: Address,
    timeout: Duration,
}

impl RpcVaultReader {
    pub fn new(vault: Address) -> Result<Self> {
        Self::with_rpc_url(DEFAULT_RPC_URL, vault, Duration::from_secs(30))
    }

    pub fn with_rpc_url(rpc_url: &str, vault: Address, timeout: Duration) -> Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL '{}'", rpc_url))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self { provider, vault, timeout })
    }

    /// Await one view call; `ZeroData` (empty return) is a null read
    async fn read<F>(&self, function: &str, call: F) -> Result<Option<U256>>
    where
        F: Future<Output = Result<U256, alloy_contract::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => anyhow::bail!("{} timed out after {:?}", function, self.timeout),
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(alloy_contract::Error::ZeroData(..))) => {
                debug!("{} returned no data, treating as zero", function);
                Ok(None)
            }
            Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{} failed", function))),
        }
    }
}

#[async_trait]
impl VaultReader for RpcVaultReader {
    async fn preview_merge(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
        amount: U256,
    ) -> Result<Option<U256>> {
        let vault = IPairVault::new(self.vault, &self.provider);
        self.read("previewMerge", async { vault.previewMerge(token_a, id_a, token_b, id_b, amount).call().await })
            .await
    }

    async fn preview_split(
        &self,
        token_a: Address,
        id_a: U256,
        token_b: Address,
        id_b: U256,
        base_amount: U256,
    ) -> Result<Option<U256>> {
        let vault = IPairVault::new(self.vault, &self.provider);
        self.read("previewSplit", async {
            vault.previewSplit(token_a, id_a, token_b, id_b, base_amount).call().await
        })
        .await
    }

    async fn total_assets(&self) -> Result<Option<U256>> {
        let vault = IPairVault::new(self.vault, &self.provider);
        self.read("totalAssets", async { vault.totalAssets().call().await }).await
    }

    async fn total_reserved(&self) -> Result<Option<U256>> {
        let vault = IPairVault::new(self.vault, &self.provider);
        self.read("totalReserved", async { vault.totalReserved().call().await }).await
    }

    async fn token_balance(&self, token: Address, id: U256) -> Result<Option<U256>> {
        let erc1155 = IERC1155::new(token, &self.provider);
        self.read("balanceOf", async { erc1155.balanceOf(self.vault, id).call().await }).await
    }
}
