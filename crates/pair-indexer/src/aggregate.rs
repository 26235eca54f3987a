//! Market aggregation
//!
//! Groups reconciled pairs into logical markets. A market is identified by the
//! provider market ids of its two legs, sorted by provider id, so the same
//! question listed as (A=polymarket, B=opinion) or (A=opinion, B=polymarket)
//! lands in one market.
//!
//! A pair listed more than once (removed, then re-added) is indexed once,
//! from its latest PairAdded event. On equal timestamps the first in stream
//! order is kept.
//!
//! # Algorithm (per added pair, in stream order)
//! 1. Canonical pair key; skip events superseded by a later listing
//! 2. Reconciled status from the paused/removed maps
//! 3. Resolver info for both legs, else skip (warn)
//! 4. Provider market id for both legs, else skip (warn)
//! 5. Market key from the sorted `{provider}-{marketId}` parts
//! 6. Get-or-create the market (metadata populated on create)
//! 7. Append the pair with its yes/no flags
//! 8. Upgrade the overall status; never downgrade

use std::collections::HashMap;

use alloy_primitives::B256;
use tracing::{debug, warn};

use crate::pair_key::canonical_pair_key;
use crate::reconcile::status_for;
use crate::types::{
    token_lookup_key, Market, MarketInfo, OutcomeTokenPair, PairAddedEvent, PairStatus,
    ProviderTokenIds,
};

/// Build the market key from both legs' provider infos
pub fn build_market_key(leg_a: &MarketInfo, leg_b: &MarketInfo) -> String {
    let mut parts = [
        (leg_a.provider_id.as_str(), leg_a.market_id.as_str()),
        (leg_b.provider_id.as_str(), leg_b.market_id.as_str()),
    ];
    parts.sort_by(|x, y| x.0.cmp(y.0));

    parts
        .iter()
        .map(|(provider, market_id)| format!("{}-{}", provider, market_id))
        .collect::<Vec<_>>()
        .join("_")
}

/// Counters for one aggregation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub pairs_seen: usize,
    pub pairs_indexed: usize,
    /// Older listings of a pair that was added again later
    pub superseded: usize,
    pub skipped_missing_info: usize,
    pub skipped_missing_market_id: usize,
}

/// Aggregate added pairs into markets.
/// Output order follows first appearance in `added`, which callers must not rely on.
pub fn aggregate(
    added: &[PairAddedEvent],
    paused: &HashMap<B256, u64>,
    removed: &HashMap<B256, u64>,
    infos: &HashMap<String, MarketInfo>,
) -> (Vec<Market>, AggregationStats) {
    let mut markets: Vec<Market> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    let mut stats = AggregationStats::default();
    let listings = latest_listings(added);

    for (position, event) in added.iter().enumerate() {
        stats.pairs_seen += 1;

        let key = event_key(event);
        if listings.get(&key) != Some(&position) {
            debug!("Pair {} listed again later, dropping listing at {}", key, event.timestamp);
            stats.superseded += 1;
            continue;
        }
        let status = status_for(&key, event.timestamp, paused, removed);

        let lookup_a = token_lookup_key(&event.outcome_token_a, &event.outcome_id_a);
        let lookup_b = token_lookup_key(&event.outcome_token_b, &event.outcome_id_b);

        let (info_a, info_b) = match (infos.get(&lookup_a), infos.get(&lookup_b)) {
            (Some(a), Some(b)) => (a, b),
            (a, b) => {
                warn!(
                    "Skipping pair {}: missing market info (leg A {}: {}, leg B {}: {})",
                    key,
                    lookup_a,
                    if a.is_some() { "ok" } else { "missing" },
                    lookup_b,
                    if b.is_some() { "ok" } else { "missing" },
                );
                stats.skipped_missing_info += 1;
                continue;
            }
        };

        if info_a.market_id.is_empty() || info_b.market_id.is_empty() {
            warn!(
                "Skipping pair {}: empty provider market id ({}='{}', {}='{}')",
                key, info_a.provider_id, info_a.market_id, info_b.provider_id, info_b.market_id
            );
            stats.skipped_missing_market_id += 1;
            continue;
        }

        let market_key = build_market_key(info_a, info_b);

        let idx = match index_by_key.get(&market_key) {
            Some(&idx) => idx,
            None => {
                debug!("New market {}", market_key);
                markets.push(new_market(market_key.clone(), info_a, info_b));
                index_by_key.insert(market_key, markets.len() - 1);
                markets.len() - 1
            }
        };
        let market = &mut markets[idx];

        market.pairs.push(OutcomeTokenPair {
            key,
            outcome_token_a: event.outcome_token_a,
            outcome_id_a: event.outcome_id_a,
            outcome_token_b: event.outcome_token_b,
            outcome_id_b: event.outcome_id_b,
            outcome_id_a_is_yes_token_id: event.outcome_id_a.to_string() == info_a.yes_token_id,
            outcome_id_b_is_yes_token_id: event.outcome_id_b.to_string() == info_b.yes_token_id,
            early_exit_amount_contract: event.early_exit_amount_contract,
            decimals_a: event.decimals_a,
            decimals_b: event.decimals_b,
            status,
            timestamp: event.timestamp,
        });

        if status.precedence() > market.overall_status.precedence() {
            market.overall_status = status;
        }

        stats.pairs_indexed += 1;
    }

    (markets, stats)
}

fn event_key(event: &PairAddedEvent) -> B256 {
    canonical_pair_key(event.outcome_token_a, event.outcome_id_a, event.outcome_token_b, event.outcome_id_b)
}

/// Canonical key -> position of the listing to index: latest timestamp, first on ties
fn latest_listings(added: &[PairAddedEvent]) -> HashMap<B256, usize> {
    let mut latest: HashMap<B256, usize> = HashMap::new();
    for (position, event) in added.iter().enumerate() {
        latest
            .entry(event_key(event))
            .and_modify(|kept| {
                if event.timestamp > added[*kept].timestamp {
                    *kept = position;
                }
            })
            .or_insert(position);
    }
    latest
}

fn new_market(market_key: String, info_a: &MarketInfo, info_b: &MarketInfo) -> Market {
    let question = [info_a, info_b]
        .iter()
        .map(|info| info.question.as_str())
        .find(|q| !q.is_empty())
        .unwrap_or_default()
        .to_string();

    let mut market = Market {
        market_key,
        question,
        provider_questions: HashMap::new(),
        provider_images: HashMap::new(),
        provider_token_ids: HashMap::new(),
        provider_urls: HashMap::new(),
        pairs: Vec::new(),
        overall_status: PairStatus::Removed,
    };

    for info in [info_a, info_b] {
        let provider = info.provider_id.clone();
        market.provider_questions.insert(provider.clone(), info.question.clone());

        if let Some(image) = info.thumbnail_url.as_ref().filter(|s| !s.is_empty()) {
            market.provider_images.insert(provider.clone(), image.clone());
        }
        if !info.yes_token_id.is_empty() && !info.no_token_id.is_empty() {
            market.provider_token_ids.insert(
                provider.clone(),
                ProviderTokenIds {
                    yes_token_id: info.yes_token_id.clone(),
                    no_token_id: info.no_token_id.clone(),
                },
            );
        }
        if let Some(url) = info.url.as_ref().filter(|s| !s.is_empty()) {
            market.provider_urls.insert(provider, url.clone());
        }
    }

    market
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    const POLY_YES: u64 = 101;
    const POLY_NO: u64 = 102;
    const OPINION_YES: u64 = 201;
    const OPINION_NO: u64 = 202;

    fn poly_token() -> Address {
        Address::with_last_byte(0x0a)
    }

    fn opinion_token() -> Address {
        Address::with_last_byte(0x0b)
    }

    fn poly_info() -> MarketInfo {
        MarketInfo {
            provider_id: "polymarket".to_string(),
            question: "Will it rain in Lisbon tomorrow?".to_string(),
            thumbnail_url: Some("https://img.example/poly.png".to_string()),
            yes_token_id: POLY_YES.to_string(),
            no_token_id: POLY_NO.to_string(),
            market_id: "537486".to_string(),
            url: Some("https://polymarket.com/market/rain-in-lisbon".to_string()),
        }
    }

    fn opinion_info() -> MarketInfo {
        MarketInfo {
            provider_id: "opinion".to_string(),
            question: "Rain in Lisbon tomorrow?".to_string(),
            thumbnail_url: None,
            yes_token_id: OPINION_YES.to_string(),
            no_token_id: OPINION_NO.to_string(),
            market_id: "3019".to_string(),
            url: Some("https://app.opinion.trade/detail?topicId=3019".to_string()),
        }
    }

    fn added(token_a: Address, id_a: u64, token_b: Address, id_b: u64, ts: u64) -> PairAddedEvent {
        PairAddedEvent {
            outcome_token_a: token_a,
            outcome_id_a: U256::from(id_a),
            outcome_token_b: token_b,
            outcome_id_b: U256::from(id_b),
            early_exit_amount_contract: Address::with_last_byte(0xee),
            decimals_a: 6,
            decimals_b: 18,
            timestamp: ts,
        }
    }

    fn all_infos() -> HashMap<String, MarketInfo> {
        let mut infos = HashMap::new();
        for id in [POLY_YES, POLY_NO] {
            infos.insert(token_lookup_key(&poly_token(), &U256::from(id)), poly_info());
        }
        for id in [OPINION_YES, OPINION_NO] {
            infos.insert(token_lookup_key(&opinion_token(), &U256::from(id)), opinion_info());
        }
        infos
    }

    #[test]
    fn test_market_key_sorted_by_provider() {
        let key_ab = build_market_key(&poly_info(), &opinion_info());
        let key_ba = build_market_key(&opinion_info(), &poly_info());
        assert_eq!(key_ab, "opinion-3019_polymarket-537486");
        assert_eq!(key_ab, key_ba);
    }

    #[test]
    fn test_both_directions_group_into_one_market() {
        let events = vec![
            added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000),
            added(opinion_token(), OPINION_YES, poly_token(), POLY_NO, 1100),
        ];

        let (markets, stats) = aggregate(&events, &HashMap::new(), &HashMap::new(), &all_infos());

        assert_eq!(markets.len(), 1);
        assert_eq!(stats.pairs_indexed, 2);
        let market = &markets[0];
        assert_eq!(market.market_key, "opinion-3019_polymarket-537486");
        assert_eq!(market.pairs.len(), 2);
        assert_eq!(market.overall_status, PairStatus::Allowed);
        assert_eq!(market.latest_pair_timestamp(), 1100);
    }

    #[test]
    fn test_yes_flags_follow_resolved_token_ids() {
        let events = vec![added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000)];
        let (markets, _) = aggregate(&events, &HashMap::new(), &HashMap::new(), &all_infos());

        let pair = &markets[0].pairs[0];
        assert!(pair.outcome_id_a_is_yes_token_id);
        assert!(!pair.outcome_id_b_is_yes_token_id);
    }

    #[test]
    fn test_provider_metadata_populated() {
        let events = vec![added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000)];
        let (markets, _) = aggregate(&events, &HashMap::new(), &HashMap::new(), &all_infos());

        let market = &markets[0];
        assert_eq!(market.question, "Will it rain in Lisbon tomorrow?");
        assert_eq!(market.provider_questions.len(), 2);
        assert_eq!(market.provider_images.len(), 1);
        assert!(market.provider_images.contains_key("polymarket"));
        assert_eq!(market.provider_urls.len(), 2);
        assert_eq!(
            market.provider_token_ids.get("opinion").map(|ids| ids.yes_token_id.as_str()),
            Some("201")
        );
    }

    #[test]
    fn test_question_falls_back_to_second_provider() {
        let mut infos = all_infos();
        for info in infos.values_mut() {
            if info.provider_id == "polymarket" {
                info.question.clear();
            }
        }

        let events = vec![added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000)];
        let (markets, _) = aggregate(&events, &HashMap::new(), &HashMap::new(), &infos);
        assert_eq!(markets[0].question, "Rain in Lisbon tomorrow?");
    }

    #[test]
    fn test_allowed_is_sticky_regardless_of_order() {
        let allowed = added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000);
        let paused_pair = added(opinion_token(), OPINION_YES, poly_token(), POLY_NO, 1000);

        let paused_key = canonical_pair_key(
            paused_pair.outcome_token_a,
            paused_pair.outcome_id_a,
            paused_pair.outcome_token_b,
            paused_pair.outcome_id_b,
        );
        let mut paused = HashMap::new();
        paused.insert(paused_key, 2000);

        for events in [vec![allowed.clone(), paused_pair.clone()], vec![paused_pair.clone(), allowed.clone()]] {
            let (markets, _) = aggregate(&events, &paused, &HashMap::new(), &all_infos());
            assert_eq!(markets.len(), 1);
            assert_eq!(markets[0].overall_status, PairStatus::Allowed);
        }
    }

    #[test]
    fn test_paused_beats_removed() {
        let first = added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000);
        let second = added(opinion_token(), OPINION_YES, poly_token(), POLY_NO, 1000);
        let key = |e: &PairAddedEvent| {
            canonical_pair_key(e.outcome_token_a, e.outcome_id_a, e.outcome_token_b, e.outcome_id_b)
        };

        let mut removed = HashMap::new();
        removed.insert(key(&first), 3000);
        let mut paused = HashMap::new();
        paused.insert(key(&second), 2000);

        let (markets, _) = aggregate(&[first, second], &paused, &removed, &all_infos());
        assert_eq!(markets[0].overall_status, PairStatus::Paused);
        assert_eq!(markets[0].pairs[0].status, PairStatus::Removed);
        assert_eq!(markets[0].pairs[1].status, PairStatus::Paused);
    }

    #[test]
    fn test_all_removed_market_stays_removed() {
        let event = added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000);
        let mut removed = HashMap::new();
        removed.insert(
            canonical_pair_key(event.outcome_token_a, event.outcome_id_a, event.outcome_token_b, event.outcome_id_b),
            1200,
        );

        let (markets, _) = aggregate(&[event], &HashMap::new(), &removed, &all_infos());
        assert_eq!(markets[0].overall_status, PairStatus::Removed);
    }

    #[test]
    fn test_pair_with_missing_info_is_skipped() {
        let events = vec![
            added(poly_token(), POLY_YES, opinion_token(), 999, 1000),
            added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000),
        ];

        let (markets, stats) = aggregate(&events, &HashMap::new(), &HashMap::new(), &all_infos());
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].pairs.len(), 1);
        assert_eq!(stats.skipped_missing_info, 1);
    }

    #[test]
    fn test_pair_with_empty_market_id_is_skipped() {
        let mut infos = all_infos();
        for info in infos.values_mut() {
            if info.provider_id == "opinion" {
                info.market_id.clear();
            }
        }

        let events = vec![added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000)];
        let (markets, stats) = aggregate(&events, &HashMap::new(), &HashMap::new(), &infos);
        assert!(markets.is_empty());
        assert_eq!(stats.skipped_missing_market_id, 1);
    }

    #[test]
    fn test_relisted_pair_indexed_once_from_latest_listing() {
        let first_listing = added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000);
        let relisting = added(opinion_token(), OPINION_NO, poly_token(), POLY_YES, 2000);
        let mut removed = HashMap::new();
        removed.insert(event_key(&first_listing), 1500);

        let mut found = Vec::new();
        for events in [vec![first_listing.clone(), relisting.clone()], vec![relisting.clone(), first_listing.clone()]] {
            let (markets, stats) = aggregate(&events, &HashMap::new(), &removed, &all_infos());
            assert_eq!(stats.superseded, 1);
            assert_eq!(stats.pairs_indexed, 1);
            assert_eq!(markets.len(), 1);
            assert_eq!(markets[0].pairs.len(), 1);
            assert_eq!(markets[0].pairs[0].timestamp, 2000);
            assert_eq!(markets[0].pairs[0].status, PairStatus::Allowed);
            assert_eq!(markets[0].overall_status, PairStatus::Allowed);

            let registry = crate::registry::MarketRegistry::from_markets(markets);
            let hit = registry
                .find_pair_by_tokens(poly_token(), U256::from(POLY_YES), opinion_token(), U256::from(OPINION_NO))
                .map(|m| m.pair.clone());
            found.push(hit);
        }
        assert_eq!(found[0], found[1]);
        assert_eq!(found[0].as_ref().map(|p| p.status), Some(PairStatus::Allowed));
    }

    #[test]
    fn test_relisting_at_same_timestamp_keeps_first() {
        let mut first = added(poly_token(), POLY_YES, opinion_token(), OPINION_NO, 1000);
        first.decimals_a = 6;
        let mut second = first.clone();
        second.decimals_a = 8;

        let (markets, stats) = aggregate(&[first, second], &HashMap::new(), &HashMap::new(), &all_infos());
        assert_eq!(stats.superseded, 1);
        assert_eq!(markets[0].pairs.len(), 1);
        assert_eq!(markets[0].pairs[0].decimals_a, 6);
    }
}
