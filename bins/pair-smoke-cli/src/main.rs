//! Outcome-Token Pair Indexer Smoke Test CLI
//!
//! Commands:
//! - `refresh`: Run one full refresh and print stats (optionally dump markets)
//! - `search`: Refresh, then search markets by url / provider / status / question
//! - `find-pair`: Refresh, then locate a pair by its two token legs
//! - `estimate-merge`: Preview a merge (early exit) against the vault
//! - `estimate-split`: Preview a split against the vault
//! - `liquidity`: Read vault liquidity
//!
//! Endpoints and contracts come from `PAIR_INDEXER_*` environment variables.
//!
//! # Usage
//! ```bash
//! # Full refresh, dump markets newest first
//! pair_smoke refresh --out data/markets.json
//!
//! # Search
//! pair_smoke search --provider polymarket --status allowed --question bitcoin
//! pair_smoke search --url polymarket.com/market/will-btc
//!
//! # Pair lookup (either leg order)
//! pair_smoke find-pair --token-a 0x4D97... --id-a 1234 --token-b 0xAbCd... --id-b 5678
//!
//! # Vault reads (requires PAIR_INDEXER_VAULT_ADDRESS)
//! pair_smoke liquidity
//! pair_smoke estimate-merge --token-a ... --id-a ... --token-b ... --id-b ... --amount 1000000
//! ```

use std::path::PathBuf;

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use pair_indexer::{
    IndexerConfig, MarketSearchParams, MergeRequest, PairIndexer, PairStatus, SplitRequest,
};

#[derive(Parser)]
#[command(name = "pair_smoke")]
#[command(about = "Outcome-token pair indexer smoke test CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

/// The two legs of a pair
#[derive(Args)]
struct PairLegs {
    /// Outcome-token contract of leg A
    #[arg(long)]
    token_a: String,

    /// Token id of leg A (decimal or 0x-hex)
    #[arg(long)]
    id_a: String,

    /// Outcome-token contract of leg B
    #[arg(long)]
    token_b: String,

    /// Token id of leg B (decimal or 0x-hex)
    #[arg(long)]
    id_b: String,
}

impl PairLegs {
    fn parse(&self) -> Result<(Address, U256, Address, U256)> {
        Ok((
            parse_address(&self.token_a)?,
            parse_u256(&self.id_a)?,
            parse_address(&self.token_b)?,
            parse_u256(&self.id_b)?,
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one refresh and print registry stats
    Refresh {
        /// Output file for all markets as JSON, newest first (optional)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Refresh, then search markets (filters are ANDed)
    Search {
        /// URL fragment, or a URL containing a market URL
        #[arg(long)]
        url: Option<String>,

        /// Provider id (polymarket, opinion)
        #[arg(long)]
        provider: Option<String>,

        /// Overall market status (allowed, paused, removed)
        #[arg(long)]
        status: Option<String>,

        /// Case-insensitive question substring
        #[arg(long)]
        question: Option<String>,

        /// Output file for results JSON (optional, defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Refresh, then locate a pair by its legs
    FindPair {
        #[command(flatten)]
        legs: PairLegs,
    },

    /// Preview a merge: deliver `amount` of each leg, receive base asset
    EstimateMerge {
        #[command(flatten)]
        legs: PairLegs,

        /// Outcome-token amount per leg, smallest unit
        #[arg(long)]
        amount: String,
    },

    /// Preview a split: deposit base asset, receive both legs
    EstimateSplit {
        #[command(flatten)]
        legs: PairLegs,

        /// Base-asset amount, smallest unit
        #[arg(long)]
        base_amount: String,
    },

    /// Read vault total assets, reserved amount and available liquidity
    Liquidity,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let config = IndexerConfig::from_env()?;
    let indexer = PairIndexer::from_config(&config)?;

    match cli.command {
        Commands::Refresh { out } => run_refresh(&indexer, &config, out).await,
        Commands::Search { url, provider, status, question, out } => {
            let status = status
                .map(|s| s.parse::<PairStatus>().map_err(anyhow::Error::msg))
                .transpose()?;
            let params = MarketSearchParams { url, provider, status, question };
            run_search(&indexer, params, out).await
        }
        Commands::FindPair { legs } => run_find_pair(&indexer, &legs).await,
        Commands::EstimateMerge { legs, amount } => {
            config.require_vault_address()?;
            let (token_a, token_id_a, token_b, token_id_b) = legs.parse()?;
            let request = MergeRequest { token_a, token_id_a, token_b, token_id_b, amount: parse_u256(&amount)? };
            let estimate = indexer.estimate_merge(&request).await?;
            info!(
                "Merge: receive {} (available liquidity {}, sufficient: {})",
                estimate.estimated_receive_amount, estimate.available_vault_liquidity, estimate.vault_has_liquidity
            );
            print_json(&estimate)
        }
        Commands::EstimateSplit { legs, base_amount } => {
            config.require_vault_address()?;
            let (token_a, token_id_a, token_b, token_id_b) = legs.parse()?;
            let request =
                SplitRequest { token_a, token_id_a, token_b, token_id_b, base_amount: parse_u256(&base_amount)? };
            let estimate = indexer.estimate_split(&request).await?;
            info!(
                "Split: receive {} per leg (vault balances {} / {}, sufficient: {})",
                estimate.estimated_tokens_received,
                estimate.vault_balance_token_a,
                estimate.vault_balance_token_b,
                estimate.vault_has_tokens
            );
            print_json(&estimate)
        }
        Commands::Liquidity => {
            let vault = config.require_vault_address()?;
            info!("Vault: {}", vault);
            let liquidity = indexer.get_vault_liquidity().await?;
            print_json(&liquidity)
        }
    }
}

async fn run_refresh(indexer: &PairIndexer, config: &IndexerConfig, out: Option<PathBuf>) -> Result<()> {
    info!("=== Pair Indexer Refresh ===");
    info!("Subgraph: {}", config.subgraph_url);
    info!("Gamma API: {}", config.gamma_api_base);
    match config.opinion_token_address {
        Some(token) => info!("Opinion API: {} (token contract {})", config.opinion_api_base, token),
        None => info!("Opinion API: disabled (PAIR_INDEXER_OPINION_TOKEN not set)"),
    }
    info!("Event limit: {}", config.event_fetch_limit);
    info!("");

    let stats = indexer.initialize().await?;

    if let Some(at) = indexer.last_refreshed_at() {
        info!("Refreshed at: {}", at.to_rfc3339());
    }
    info!("Markets: {} ({} pairs)", stats.markets, stats.pairs);
    info!("  allowed: {}", stats.allowed);
    info!("  paused:  {}", stats.paused);
    info!("  removed: {}", stats.removed);

    let markets = indexer.get_markets_by_recency()?;
    for market in markets.iter().take(10) {
        info!("  [{}] {} - {}", market.overall_status, market.market_key, market.question);
    }

    match out {
        Some(path) => write_json(&path, &markets).await,
        None => print_json(&stats),
    }
}

async fn run_search(indexer: &PairIndexer, params: MarketSearchParams, out: Option<PathBuf>) -> Result<()> {
    indexer.initialize().await?;

    info!("Search: {}", serde_json::to_string(&params)?);
    let markets = indexer.search_markets(&params)?;
    info!("{} market(s) matched", markets.len());

    match out {
        Some(path) => write_json(&path, &markets).await,
        None => print_json(&markets),
    }
}

async fn run_find_pair(indexer: &PairIndexer, legs: &PairLegs) -> Result<()> {
    let (token_a, id_a, token_b, id_b) = legs.parse()?;
    indexer.initialize().await?;

    match indexer.find_pair(token_a, id_a, token_b, id_b)? {
        Some(found) => {
            info!(
                "Found pair {} in market {} (status {})",
                found.pair.key, found.market.market_key, found.pair.status
            );
            print_json(&found)
        }
        None => {
            warn!("No indexed pair for {}:{} / {}:{}", token_a, id_a, token_b, id_b);
            Ok(())
        }
    }
}

fn parse_address(value: &str) -> Result<Address> {
    value.trim().parse::<Address>().with_context(|| format!("Invalid address '{}'", value))
}

fn parse_u256(value: &str) -> Result<U256> {
    value
        .trim()
        .parse::<U256>()
        .map_err(|e| anyhow::anyhow!("Invalid integer '{}': {}", value, e))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!();
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_json<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_string_pretty(value)?).await?;
    info!("Output written to: {}", path.display());
    Ok(())
}
