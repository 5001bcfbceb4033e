//! Local secp256k1 signing key used to submit transactions.

use crate::error::{BallotError, Result};
use crate::primitives::{address_from_uncompressed_pubkey, Address};
use crate::tx::{Eip1559Request, TxSignature};
use k256::ecdsa::SigningKey;

/// Private key plus its derived account address.
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Parse a 32-byte hex key, with or without the `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let trimmed = secret.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(raw)
            .map_err(|err| BallotError::Signer(format!("private key is not hex: {err}")))?;
        if bytes.len() != 32 {
            return Err(BallotError::Signer(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes)
            .map_err(|err| BallotError::Signer(format!("invalid private key: {err}")))?;
        let address =
            address_from_uncompressed_pubkey(key.verifying_key().to_encoded_point(false).as_bytes())?;
        Ok(Self { key, address })
    }

    /// Account controlled by this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a prehashed message, returning `(y_parity, r, s)`.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<TxSignature> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(hash)
            .map_err(|err| BallotError::Signer(format!("signing failed: {err}")))?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(TxSignature {
            y_parity: recid.to_byte(),
            r,
            s,
        })
    }

    /// Sign a type-2 transaction and return the raw envelope.
    pub fn sign_transaction(&self, request: &Eip1559Request) -> Result<Vec<u8>> {
        let sig = self.sign_hash(&request.signing_hash())?;
        Ok(request.encode_signed(&sig))
    }
}
