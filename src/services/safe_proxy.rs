//! Polymarket wallet derivation
//!
//! The relay executes transactions from a contract wallet owned by the signing
//! EOA: a Polymarket proxy wallet or a Gnosis Safe. Both addresses are
//! deterministic (CREATE2), which lets the invoker check that the configured
//! funder wallet is the one the relay will act for.

use crate::config::WalletKind;
use alloy::primitives::{address, b256, keccak256, Address, B256};

/// Safe Proxy Factory on Polygon
const SAFE_FACTORY: Address = address!("aacFeEa03eb1561C4e67d661e40682Bd20E3541b");
/// Init code hash for Safe proxy
const SAFE_INIT_CODE_HASH: B256 =
    b256!("2bce2127ff07fb632d16c8347c4ebf501f4841168bed00d9e6ef715ddb6fcecf");

/// Polymarket proxy wallet factory on Polygon
pub const PROXY_FACTORY: Address = address!("aB45c5A4B0c941a2F231C04C3f49182e1A254052");
/// Init code hash for Polymarket proxy wallets
const PROXY_INIT_CODE_HASH: B256 =
    b256!("d21df8dc65880a8606f09fe0ce3df9b8869287ab0b058be05aa9e8af6330a00b");

/// Derive the Safe wallet address for an EOA.
/// address = keccak256(0xff ++ factory ++ keccak256(pad32(eoa)) ++ init_code_hash)[12:]
pub fn derive_safe_wallet(eoa: Address) -> Address {
    let mut padded = [0u8; 32];
    padded[12..].copy_from_slice(eoa.as_slice());
    let salt = keccak256(padded);

    SAFE_FACTORY.create2(salt.0, SAFE_INIT_CODE_HASH.0)
}

/// Derive the proxy wallet address for an EOA. Same CREATE2 scheme, but the
/// salt hashes the packed 20-byte address.
pub fn derive_proxy_wallet(eoa: Address) -> Address {
    let salt = keccak256(eoa.as_slice());
    PROXY_FACTORY.create2(salt.0, PROXY_INIT_CODE_HASH.0)
}

pub fn derive_wallet(kind: WalletKind, eoa: Address) -> Address {
    match kind {
        WalletKind::Proxy => derive_proxy_wallet(eoa),
        WalletKind::Safe => derive_safe_wallet(eoa),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_create2(factory: Address, salt: B256, init_code_hash: B256) -> Address {
        let mut data = Vec::with_capacity(85);
        data.push(0xff);
        data.extend_from_slice(factory.as_slice());
        data.extend_from_slice(salt.as_slice());
        data.extend_from_slice(init_code_hash.as_slice());
        Address::from_slice(&keccak256(&data)[12..])
    }

    #[test]
    fn test_safe_matches_create2_formula() {
        let eoa = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let mut padded = [0u8; 32];
        padded[12..].copy_from_slice(eoa.as_slice());
        let expected = manual_create2(SAFE_FACTORY, keccak256(padded), SAFE_INIT_CODE_HASH);
        assert_eq!(derive_safe_wallet(eoa), expected);
    }

    #[test]
    fn test_proxy_matches_create2_formula() {
        let eoa = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let expected = manual_create2(PROXY_FACTORY, keccak256(eoa.as_slice()), PROXY_INIT_CODE_HASH);
        assert_eq!(derive_proxy_wallet(eoa), expected);
    }

    #[test]
    fn test_wallet_kinds_derive_different_addresses() {
        let eoa = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(derive_wallet(WalletKind::Proxy, eoa), derive_proxy_wallet(eoa));
        assert_eq!(derive_wallet(WalletKind::Safe, eoa), derive_safe_wallet(eoa));
        assert_ne!(derive_proxy_wallet(eoa), derive_safe_wallet(eoa));
    }

    #[test]
    fn test_distinct_owners_get_distinct_wallets() {
        let a = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let b = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        assert_ne!(derive_safe_wallet(a), derive_safe_wallet(b));
        assert_ne!(derive_proxy_wallet(a), derive_proxy_wallet(b));
        assert_ne!(derive_safe_wallet(a), a);
    }
}
