//! Environment-driven configuration for the gateway.
//!
//! Required values (key, endpoint, contract addresses) stay optional here and
//! only fail when a call needs them; optional knobs are parsed eagerly.

use crate::error::{BallotError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default listen address for the gateway.
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
/// Default proposal bound used to validate `cast_votes`.
pub const DEFAULT_PROPOSAL_COUNT: u64 = 3;

/// How the gateway's write endpoints reach the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Query-style `eth_call`; no transaction is sent and no state changes.
    #[default]
    Simulate,
    /// Sign and broadcast a transaction.
    Submit,
}

impl WriteMode {
    /// Label used in responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            WriteMode::Simulate => "simulated",
            WriteMode::Submit => "submitted",
        }
    }
}

impl FromStr for WriteMode {
    type Err = BallotError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "simulate" => Ok(WriteMode::Simulate),
            "submit" => Ok(WriteMode::Submit),
            other => Err(BallotError::InvalidInput(format!(
                "GATEWAY_WRITE_MODE must be simulate or submit, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Settings read once at gateway startup.
#[derive(Clone, Default)]
pub struct GatewayConfig {
    /// `PRIVATE_KEY`: signing key, hex with or without `0x`.
    pub private_key: Option<String>,
    /// `RPC_ENDPOINT_URL`.
    pub rpc_url: Option<String>,
    /// `TOKEN_BALLOUT_ADDRESS`: ballot contract, kept verbatim.
    pub ballot_address: Option<String>,
    /// `TOKEN_ADDRESS`: token contract, kept verbatim.
    pub token_address: Option<String>,
    /// `CHAIN_ID`: pins the signing chain id.
    pub chain_id: Option<u64>,
    /// `GATEWAY_BIND`.
    pub bind: String,
    /// `GATEWAY_WRITE_MODE`.
    pub write_mode: WriteMode,
    /// `GATEWAY_PROPOSAL_COUNT`.
    pub proposal_count: u64,
    /// `TOKEN_ABI_PATH`: replaces the bundled token fixture.
    pub token_abi_path: Option<PathBuf>,
    /// `BALLOT_ABI_PATH`: replaces the bundled ballot fixture.
    pub ballot_abi_path: Option<PathBuf>,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .field("ballot_address", &self.ballot_address)
            .field("token_address", &self.token_address)
            .field("chain_id", &self.chain_id)
            .field("bind", &self.bind)
            .field("write_mode", &self.write_mode)
            .field("proposal_count", &self.proposal_count)
            .finish()
    }
}

impl GatewayConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let chain_id = get("CHAIN_ID")
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|err| BallotError::InvalidInput(format!("CHAIN_ID {raw:?}: {err}")))
            })
            .transpose()?;
        let proposal_count = match get("GATEWAY_PROPOSAL_COUNT") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|err| {
                BallotError::InvalidInput(format!("GATEWAY_PROPOSAL_COUNT {raw:?}: {err}"))
            })?,
            None => DEFAULT_PROPOSAL_COUNT,
        };
        let write_mode = match get("GATEWAY_WRITE_MODE") {
            Some(raw) => raw.parse()?,
            None => WriteMode::default(),
        };
        Ok(Self {
            private_key: get("PRIVATE_KEY"),
            rpc_url: get("RPC_ENDPOINT_URL"),
            ballot_address: get("TOKEN_BALLOUT_ADDRESS"),
            token_address: get("TOKEN_ADDRESS"),
            chain_id,
            bind: get("GATEWAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            write_mode,
            proposal_count,
            token_abi_path: get("TOKEN_ABI_PATH").map(PathBuf::from),
            ballot_abi_path: get("BALLOT_ABI_PATH").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_still_loads() {
        let cfg = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert!(cfg.private_key.is_none());
        assert!(cfg.ballot_address.is_none());
        assert_eq!(cfg.bind, DEFAULT_BIND);
        assert_eq!(cfg.write_mode, WriteMode::Simulate);
        assert_eq!(cfg.proposal_count, DEFAULT_PROPOSAL_COUNT);
    }

    #[test]
    fn reads_all_variables() {
        let cfg = GatewayConfig::from_lookup(lookup(&[
            ("PRIVATE_KEY", "abcd"),
            ("RPC_ENDPOINT_URL", "http://127.0.0.1:8545"),
            ("TOKEN_BALLOUT_ADDRESS", "0xE7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
            ("TOKEN_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            ("CHAIN_ID", "31337"),
            ("GATEWAY_WRITE_MODE", "Submit"),
            ("GATEWAY_PROPOSAL_COUNT", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.chain_id, Some(31337));
        assert_eq!(cfg.write_mode, WriteMode::Submit);
        assert_eq!(cfg.proposal_count, 5);
        assert_eq!(
            cfg.ballot_address.as_deref(),
            Some("0xE7f1725E7734CE288F8367e1Bb143E90bb3F0512")
        );
    }

    #[test]
    fn blank_values_are_unset_and_bad_knobs_fail() {
        let cfg = GatewayConfig::from_lookup(lookup(&[("TOKEN_ADDRESS", "  ")])).unwrap();
        assert!(cfg.token_address.is_none());
        assert!(GatewayConfig::from_lookup(lookup(&[("CHAIN_ID", "sepolia")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("GATEWAY_WRITE_MODE", "yolo")])).is_err());
    }

    #[test]
    fn debug_redacts_private_key() {
        let cfg = GatewayConfig::from_lookup(lookup(&[("PRIVATE_KEY", "deadbeef")])).unwrap();
        assert!(!format!("{cfg:?}").contains("deadbeef"));
    }
}
