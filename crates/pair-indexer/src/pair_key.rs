//! Canonical pair identity
//!
//! The vault stores pair records under
//! `keccak256(abi.encodePacked(address, uint256, address, uint256))` with the
//! legs in canonical order: lower address first, ties broken by lower token id.
//! Any other encoding breaks on-chain lookups, so this is the only key we use.

use alloy_primitives::{keccak256, Address, B256, U256};

/// Packed encoding length: address (20) + uint256 (32) + address (20) + uint256 (32)
const PACKED_LEN: usize = 104;

/// Order two legs canonically. Address bytes compare the same way as
/// lower-cased hex strings, so this is the case-insensitive ordering.
pub fn canonical_order(
    token_a: Address,
    id_a: U256,
    token_b: Address,
    id_b: U256,
) -> ((Address, U256), (Address, U256)) {
    let a_first = match token_a.cmp(&token_b) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => id_a <= id_b,
    };

    if a_first {
        ((token_a, id_a), (token_b, id_b))
    } else {
        ((token_b, id_b), (token_a, id_a))
    }
}

/// Direction-independent pair key, identical to the vault's on-chain key
pub fn canonical_pair_key(token_a: Address, id_a: U256, token_b: Address, id_b: U256) -> B256 {
    let ((first_token, first_id), (second_token, second_id)) =
        canonical_order(token_a, id_a, token_b, id_b);

    let mut packed = [0u8; PACKED_LEN];
    packed[..20].copy_from_slice(first_token.as_slice());
    packed[20..52].copy_from_slice(&first_id.to_be_bytes::<32>());
    packed[52..72].copy_from_slice(second_token.as_slice());
    packed[72..].copy_from_slice(&second_id.to_be_bytes::<32>());

    keccak256(packed)
}
