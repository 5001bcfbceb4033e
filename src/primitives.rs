//! EVM value types and the hex/quantity helpers used on the wire.
//!
//! Addresses, hashes and 256-bit integers come from `alloy-primitives`; this
//! module adds the strict parsing the gateway applies to caller input and the
//! JSON-RPC quantity encoding.

use crate::error::{BallotError, Result};
use alloy_primitives::utils::{parse_units, ParseUnits};

pub use alloy_primitives::{keccak256, Address, B256, U256};

/// 32-byte transaction hash.
pub type TxHash = B256;

/// Decimals used by the token contract (and by ether).
pub const TOKEN_DECIMALS: u8 = 18;

/// Parse a `0x`-prefixed, 40-digit hex address in any letter case.
pub fn parse_address(value: &str) -> Result<Address> {
    let trimmed = value.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| BallotError::InvalidAddress(format!("{value}: missing 0x prefix")))?;
    if raw.len() != 40 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BallotError::InvalidAddress(format!(
            "{value}: expected 40 hex digits"
        )));
    }
    raw.parse()
        .map_err(|err| BallotError::InvalidAddress(format!("{value}: {err}")))
}

/// Parse a `0x`-prefixed 32-byte hash.
pub fn parse_tx_hash(value: &str) -> Result<TxHash> {
    let bytes = decode_hex_prefixed(value)?;
    if bytes.len() != 32 {
        return Err(BallotError::Abi(format!("tx hash must be 32 bytes: {value}")));
    }
    Ok(B256::from_slice(&bytes))
}

/// Build an address from exactly 20 bytes.
pub fn address_from_slice(bytes: &[u8]) -> Result<Address> {
    if bytes.len() != 20 {
        return Err(BallotError::InvalidAddress(format!(
            "expected 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

/// Address owning an uncompressed SEC1 public key (`0x04 || x || y`).
pub fn address_from_uncompressed_pubkey(pubkey: &[u8]) -> Result<Address> {
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(BallotError::Signer(
            "unexpected public key encoding".to_string(),
        ));
    }
    Ok(Address::from_raw_public_key(&pubkey[1..]))
}

/// Scale a decimal token amount such as `"10"` or `"0.5"` into base units.
pub fn parse_token_amount(value: &str) -> Result<U256> {
    match parse_units(value.trim(), TOKEN_DECIMALS)? {
        ParseUnits::U256(units) => Ok(units),
        ParseUnits::I256(units) if units.is_negative() => Err(BallotError::InvalidAmount(
            format!("{value}: amount is negative"),
        )),
        ParseUnits::I256(units) => Ok(units.into_raw()),
    }
}

/// Decode a `0x`-prefixed hex string.
pub fn decode_hex_prefixed(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| BallotError::Abi("hex payload must start with 0x".to_string()))?;
    hex::decode(raw).map_err(|err| BallotError::Abi(format!("invalid hex payload: {err}")))
}

/// Encode bytes as `0x` hex.
pub fn encode_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// JSON-RPC quantity encoding (no leading zeros).
pub fn to_quantity(value: u128) -> String {
    format!("0x{value:x}")
}

/// Parse a JSON-RPC quantity such as `0x1a`.
pub fn parse_quantity(value: &str) -> Result<u128> {
    let raw = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| BallotError::Abi(format!("quantity must start with 0x: {value}")))?;
    if raw.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(raw, 16).map_err(|err| BallotError::Abi(format!("bad quantity {value}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn address_parse_ignores_case() {
        let upper = parse_address("0xAbCdEfabcdefABCDefAbcdefABcdefabCDefAb12").unwrap();
        let lower = parse_address("0xabcdefabcdefabcdefabcdefabcdefabcdefab12").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn address_parse_rejects_malformed() {
        assert!(parse_address("abcdefabcdefabcdefabcdefabcdefabcdefab12").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzzcdefabcdefabcdefabcdefabcdefabcdefab12").is_err());
        assert!(parse_address("not-an-address").unwrap_err().is_input_error());
    }

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn quantity_encoding() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(15), "0xf");
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert!(parse_quantity("26").is_err());
    }

    #[test]
    fn decode_hex_requires_prefix() {
        assert!(decode_hex_prefixed("abcd").is_err());
        assert_eq!(decode_hex_prefixed("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn token_amounts_scale_to_base_units() {
        assert_eq!(
            parse_token_amount("10").unwrap(),
            U256::from(10_000_000_000_000_000_000u128)
        );
        assert_eq!(
            parse_token_amount("0.5").unwrap(),
            U256::from(500_000_000_000_000_000u128)
        );
        assert!(parse_token_amount("ten").is_err());
        assert!(parse_token_amount("-1").is_err());
    }

    #[test]
    fn tx_hash_requires_32_bytes() {
        let hash = parse_tx_hash(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(hash, B256::repeat_byte(0xab));
        assert!(parse_tx_hash("0xabcd").is_err());
    }

    proptest! {
        #[test]
        fn address_display_parses_back(bytes in proptest::array::uniform20(any::<u8>())) {
            let addr = Address::from(bytes);
            prop_assert_eq!(parse_address(&addr.to_string()).unwrap(), addr);
        }

        #[test]
        fn quantity_parses_back(value in any::<u128>()) {
            prop_assert_eq!(parse_quantity(&to_quantity(value)).unwrap(), value);
        }
    }
}
