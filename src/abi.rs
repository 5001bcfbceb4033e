//! Contract ABI fixtures and call encoding.
//!
//! Artifacts follow the Hardhat layout (`contractName`, `abi`, `bytecode`); a
//! bare ABI array is accepted too. The interface is parsed into a
//! [`JsonAbi`] and values travel as [`DynSolValue`], so every Solidity type
//! the contracts declare (including full-width `uint256`) is handled by the
//! `alloy` codec.

use crate::error::{BallotError, Result};
use crate::primitives::{decode_hex_prefixed, encode_hex_prefixed, Address, B256, U256};
use alloy_dyn_abi::{FunctionExt, JsonAbiExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub use alloy_dyn_abi::DynSolValue;
pub use alloy_json_abi::{Function, JsonAbi};

const BUNDLED_TOKEN_ARTIFACT: &str = include_str!("../assets/MyToken.json");
const BUNDLED_BALLOT_ARTIFACT: &str = include_str!("../assets/TokenizedBallot.json");

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactRepr {
    Hardhat {
        #[serde(default, rename = "contractName")]
        contract_name: String,
        abi: serde_json::Value,
        #[serde(default)]
        bytecode: String,
    },
    Bare(serde_json::Value),
}

/// Contract interface plus optional creation bytecode.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Contract name as recorded by the compiler.
    pub contract_name: String,
    /// Parsed ABI.
    pub abi: JsonAbi,
    bytecode: String,
}

fn parse_abi(value: serde_json::Value) -> Result<JsonAbi> {
    serde_json::from_value(value).map_err(|err| BallotError::Artifact(format!("invalid abi: {err}")))
}

impl Artifact {
    /// Parse artifact JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let repr: ArtifactRepr = serde_json::from_str(text)
            .map_err(|err| BallotError::Artifact(format!("invalid artifact json: {err}")))?;
        match repr {
            ArtifactRepr::Hardhat {
                contract_name,
                abi,
                bytecode,
            } => Ok(Self {
                contract_name,
                abi: parse_abi(abi)?,
                bytecode,
            }),
            ArtifactRepr::Bare(abi) => Ok(Self {
                contract_name: String::new(),
                abi: parse_abi(abi)?,
                bytecode: String::new(),
            }),
        }
    }

    /// Load an artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            BallotError::Artifact(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// The token ABI fixture shipped with the crate.
    pub fn bundled_token() -> Result<Self> {
        Self::from_json_str(BUNDLED_TOKEN_ARTIFACT)
    }

    /// The ballot ABI fixture shipped with the crate.
    pub fn bundled_ballot() -> Result<Self> {
        Self::from_json_str(BUNDLED_BALLOT_ARTIFACT)
    }

    /// Build an artifact from parts.
    pub fn new(contract_name: impl Into<String>, abi: JsonAbi, bytecode: &[u8]) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode: encode_hex_prefixed(bytecode),
        }
    }

    /// Creation bytecode; errors when the artifact is ABI-only.
    pub fn bytecode(&self) -> Result<Vec<u8>> {
        let trimmed = self.bytecode.trim();
        if trimmed.is_empty() || trimmed == "0x" {
            return Err(BallotError::Artifact(format!(
                "artifact {} carries no bytecode; pass a compiled Hardhat artifact",
                if self.contract_name.is_empty() {
                    "<unnamed>"
                } else {
                    self.contract_name.as_str()
                }
            )));
        }
        decode_hex_prefixed(trimmed)
    }
}

/// Look up a function by name and argument count.
pub fn function<'a>(abi: &'a JsonAbi, name: &str, arity: usize) -> Result<&'a Function> {
    abi.function(name)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        .ok_or_else(|| BallotError::Abi(format!("no function {name} taking {arity} argument(s)")))
}

/// Selector followed by the encoded arguments.
pub fn encode_call(func: &Function, args: &[DynSolValue]) -> Result<Vec<u8>> {
    Ok(func.abi_encode_input(args)?)
}

/// Decode return data according to the declared outputs.
///
/// The data must be the canonical encoding of the decoded values: dirty
/// padding, non-boolean words and trailing bytes are rejected.
pub fn decode_output(func: &Function, data: &[u8]) -> Result<Vec<DynSolValue>> {
    let values = func.abi_decode_output(data, true)?;
    let canonical = DynSolValue::Tuple(values.clone()).abi_encode_params();
    if canonical != data {
        return Err(BallotError::Abi(format!(
            "{} returned non-canonical data ({} bytes)",
            func.signature(),
            data.len()
        )));
    }
    Ok(values)
}

/// Creation payload: init code followed by the encoded constructor arguments.
pub fn encode_deploy(abi: &JsonAbi, bytecode: &[u8], args: &[DynSolValue]) -> Result<Vec<u8>> {
    let mut out = bytecode.to_vec();
    match abi.constructor() {
        Some(ctor) => out.extend(ctor.abi_encode_input(args)?),
        None if !args.is_empty() => {
            return Err(BallotError::Abi(
                "abi declares no constructor but arguments were given".to_string(),
            ))
        }
        None => {}
    }
    Ok(out)
}

/// Hash map keyed by selector, used to route raw calldata back to functions.
pub fn selector_index(abi: &JsonAbi) -> HashMap<[u8; 4], Function> {
    abi.functions().map(|f| (f.selector().0, f.clone())).collect()
}

/// `uint256` value.
pub fn uint<T>(value: T) -> DynSolValue
where
    U256: alloy_primitives::ruint::UintTryFrom<T>,
{
    DynSolValue::Uint(U256::from(value), 256)
}

/// Unwrap an unsigned integer.
pub fn expect_uint(value: &DynSolValue) -> Result<U256> {
    value
        .as_uint()
        .map(|(v, _)| v)
        .ok_or_else(|| BallotError::Abi(format!("expected uint, got {value:?}")))
}

/// Unwrap an address.
pub fn expect_address(value: &DynSolValue) -> Result<Address> {
    value
        .as_address()
        .ok_or_else(|| BallotError::Abi(format!("expected address, got {value:?}")))
}

/// Unwrap fixed bytes.
pub fn expect_fixed_bytes(value: &DynSolValue) -> Result<Vec<u8>> {
    value
        .as_fixed_bytes()
        .map(|(bytes, _)| bytes.to_vec())
        .ok_or_else(|| BallotError::Abi(format!("expected bytesN, got {value:?}")))
}

/// Text right-padded with zeros into a `bytes32` value.
pub fn bytes32_from_str(text: &str) -> Result<DynSolValue> {
    let raw = text.as_bytes();
    if raw.len() > 32 {
        return Err(BallotError::Abi(format!("{text:?} does not fit in bytes32")));
    }
    Ok(DynSolValue::FixedBytes(B256::right_padding_from(raw), 32))
}
