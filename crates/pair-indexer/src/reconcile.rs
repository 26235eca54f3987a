//! Event reconciliation
//!
//! Added, paused and removed events arrive as three independent streams.
//! Status is decided by whichever event is strictly latest; ties favour
//! keeping the pair listed. A timestamp of 0 means "never observed".

use std::collections::HashMap;

use alloy_primitives::B256;

use crate::pair_key::canonical_pair_key;
use crate::types::{PairStatus, PairStatusEvent};

/// Latest-event-wins status for one pair
pub fn reconcile_status(added_ts: u64, paused_ts: u64, removed_ts: u64) -> PairStatus {
    if removed_ts > added_ts && removed_ts > paused_ts {
        PairStatus::Removed
    } else if paused_ts > added_ts && paused_ts > removed_ts {
        PairStatus::Paused
    } else {
        PairStatus::Allowed
    }
}

/// Fold a paused or removed stream into canonical key -> latest timestamp
pub fn latest_timestamps(events: &[PairStatusEvent]) -> HashMap<B256, u64> {
    let mut latest: HashMap<B256, u64> = HashMap::with_capacity(events.len());

    for event in events {
        let key = canonical_pair_key(
            event.outcome_token_a,
            event.outcome_id_a,
            event.outcome_token_b,
            event.outcome_id_b,
        );
        let entry = latest.entry(key).or_insert(0);
        *entry = (*entry).max(event.timestamp);
    }

    latest
}

/// Status for a pair given its creation time and the folded paused/removed maps
pub fn status_for(
    key: &B256,
    added_ts: u64,
    paused: &HashMap<B256, u64>,
    removed: &HashMap<B256, u64>,
) -> PairStatus {
    let paused_ts = paused.get(key).copied().unwrap_or(0);
    let removed_ts = removed.get(key).copied().unwrap_or(0);
    reconcile_status(added_ts, paused_ts, removed_ts)
}
