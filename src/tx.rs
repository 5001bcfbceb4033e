//! EIP-1559 (type 0x02) transaction envelopes: signing payloads, raw encoding,
//! sender recovery, and CREATE address derivation.

use crate::error::{BallotError, Result};
use crate::primitives::{address_from_slice, address_from_uncompressed_pubkey, keccak256, Address, TxHash};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rlp::{Rlp, RlpStream};

const TX_TYPE_EIP1559: u8 = 0x02;
const EMPTY_ACCESS_LIST: [u8; 1] = [0xc0];

/// Unsigned type-2 transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Request {
    /// Chain the signature is bound to.
    pub chain_id: u64,
    /// Sender account nonce.
    pub nonce: u64,
    /// Tip per gas.
    pub max_priority_fee_per_gas: u128,
    /// Fee cap per gas.
    pub max_fee_per_gas: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Call target; `None` deploys a contract.
    pub to: Option<Address>,
    /// Attached value in wei.
    pub value: u128,
    /// Calldata or init code.
    pub input: Vec<u8>,
}

/// secp256k1 signature split into its wire components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    /// Recovery bit (0 or 1).
    pub y_parity: u8,
    /// Big-endian `r`.
    pub r: [u8; 32],
    /// Big-endian `s`.
    pub s: [u8; 32],
}

/// A raw transaction decoded back into its fields with the sender recovered.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    /// Transaction fields.
    pub request: Eip1559Request,
    /// Sender recovered from the signature.
    pub from: Address,
    /// Keccak hash of the raw envelope.
    pub hash: TxHash,
}

impl Eip1559Request {
    fn append_unsigned_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        match &self.to {
            Some(to) => {
                stream.append(&to.as_slice());
            }
            None => {
                stream.append_empty_data();
            }
        }
        stream.append(&self.value);
        stream.append(&self.input.as_slice());
        stream.append_raw(&EMPTY_ACCESS_LIST, 1);
    }

    /// Keccak hash of `0x02 || rlp(unsigned fields)`; this is what gets signed.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_unsigned_fields(&mut stream);
        let mut payload = vec![TX_TYPE_EIP1559];
        payload.extend_from_slice(&stream.out());
        keccak256(&payload).0
    }

    /// Raw envelope ready for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, sig: &TxSignature) -> Vec<u8> {
        let mut stream = RlpStream::new_list(12);
        self.append_unsigned_fields(&mut stream);
        stream.append(&sig.y_parity);
        stream.append(&trim_leading_zeros(&sig.r));
        stream.append(&trim_leading_zeros(&sig.s));
        let mut raw = vec![TX_TYPE_EIP1559];
        raw.extend_from_slice(&stream.out());
        raw
    }
}

/// Hash of a raw envelope.
pub fn raw_tx_hash(raw: &[u8]) -> TxHash {
    keccak256(raw)
}

/// Decode a signed type-2 envelope and recover its sender.
pub fn decode_signed(raw: &[u8]) -> Result<DecodedTx> {
    if raw.first() != Some(&TX_TYPE_EIP1559) {
        return Err(BallotError::Abi(
            "only EIP-1559 (type 0x02) transactions are supported".to_string(),
        ));
    }
    let rlp = Rlp::new(&raw[1..]);
    if !rlp.is_list() {
        return Err(BallotError::Abi(
            "typed transaction payload is not an RLP list".to_string(),
        ));
    }
    let items = rlp
        .item_count()
        .map_err(|err| BallotError::Abi(format!("invalid rlp item count: {err}")))?;
    if items != 12 {
        return Err(BallotError::Abi(format!(
            "expected 12 rlp fields for type-2 tx, found {items}"
        )));
    }

    let to_bytes = rlp_bytes(&rlp, 5)?;
    let to = match to_bytes.len() {
        0 => None,
        20 => Some(address_from_slice(to_bytes)?),
        other => {
            return Err(BallotError::Abi(format!("to field has {other} bytes")));
        }
    };
    let request = Eip1559Request {
        chain_id: rlp_u64(&rlp, 0)?,
        nonce: rlp_u64(&rlp, 1)?,
        max_priority_fee_per_gas: u128_from_be_bytes(rlp_bytes(&rlp, 2)?)?,
        max_fee_per_gas: u128_from_be_bytes(rlp_bytes(&rlp, 3)?)?,
        gas_limit: rlp_u64(&rlp, 4)?,
        to,
        value: u128_from_be_bytes(rlp_bytes(&rlp, 6)?)?,
        input: rlp_bytes(&rlp, 7)?.to_vec(),
    };
    let access_list = rlp
        .at(8)
        .map_err(|err| BallotError::Abi(format!("missing access list: {err}")))?;
    if !access_list.is_list() || access_list.item_count().unwrap_or(1) != 0 {
        return Err(BallotError::Abi("access lists are not supported".to_string()));
    }

    let y_parity = rlp_u64(&rlp, 9)?;
    if y_parity > 1 {
        return Err(BallotError::Abi("invalid y parity in signature".to_string()));
    }
    let r = left_pad_32(rlp_bytes(&rlp, 10)?)?;
    let s = left_pad_32(rlp_bytes(&rlp, 11)?)?;

    let sighash = request.signing_hash();
    let sig = Signature::from_scalars(r, s)
        .map_err(|err| BallotError::Signer(format!("invalid signature scalars: {err}")))?;
    let recid = RecoveryId::from_byte(y_parity as u8)
        .ok_or_else(|| BallotError::Signer("invalid signature recovery id".to_string()))?;
    let vk = VerifyingKey::recover_from_prehash(&sighash, &sig, recid)
        .map_err(|err| BallotError::Signer(format!("signature recovery failed: {err}")))?;
    let from = address_from_uncompressed_pubkey(vk.to_encoded_point(false).as_bytes())?;

    Ok(DecodedTx {
        request,
        from,
        hash: raw_tx_hash(raw),
    })
}

/// Address of a contract deployed by `sender` at `nonce`.
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    sender.create(nonce)
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn u128_from_be_bytes(bytes: &[u8]) -> Result<u128> {
    if bytes.len() > 16 {
        return Err(BallotError::Abi(format!("{} byte integer overflows u128", bytes.len())));
    }
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    Ok(u128::from_be_bytes(buf))
}

fn left_pad_32(bytes: &[u8]) -> Result<[u8; 32]> {
    if bytes.len() > 32 {
        return Err(BallotError::Abi(format!("{} bytes do not fit in a word", bytes.len())));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

fn rlp_bytes<'a>(rlp: &Rlp<'a>, index: usize) -> Result<&'a [u8]> {
    rlp.at(index)
        .map_err(|err| BallotError::Abi(format!("missing rlp field {index}: {err}")))?
        .data()
        .map_err(|err| BallotError::Abi(format!("invalid rlp field {index}: {err}")))
}

fn rlp_u64(rlp: &Rlp<'_>, index: usize) -> Result<u64> {
    let value = u128_from_be_bytes(rlp_bytes(rlp, index)?)?;
    u64::try_from(value).map_err(|_| BallotError::Abi(format!("rlp field {index} overflows u64")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::parse_address;
    use crate::wallet::LocalSigner;

    // First Hardhat development key.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn sample_request(to: Option<Address>) -> Eip1559Request {
        Eip1559Request {
            chain_id: 31337,
            nonce: 7,
            max_priority_fee_per_gas: 1_000_000_000,
            max_fee_per_gas: 3_000_000_000,
            gas_limit: 90_000,
            to,
            value: 0,
            input: vec![0xa9, 0x05, 0x9c, 0xbb, 0x00, 0x01],
        }
    }

    #[test]
    fn signed_envelope_recovers_sender() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        let to = parse_address("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap();
        let request = sample_request(Some(to));
        let raw = signer.sign_transaction(&request).unwrap();
        assert_eq!(raw[0], 0x02);

        let decoded = decode_signed(&raw).unwrap();
        assert_eq!(decoded.from, signer.address());
        assert_eq!(decoded.request, request);
        assert_eq!(decoded.hash, raw_tx_hash(&raw));
    }

    #[test]
    fn contract_creation_has_empty_to() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        let raw = signer.sign_transaction(&sample_request(None)).unwrap();
        let decoded = decode_signed(&raw).unwrap();
        assert!(decoded.request.to.is_none());
    }

    #[test]
    fn create_address_matches_known_deployment() {
        // Hardhat's first deployment from account #0 lands here.
        let deployer = parse_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        assert_eq!(
            create_address(&deployer, 0),
            parse_address("0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap()
        );
        assert_eq!(
            create_address(&deployer, 1),
            parse_address("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512").unwrap()
        );
    }

    #[test]
    fn rejects_legacy_and_truncated_payloads() {
        assert!(decode_signed(&[]).is_err());
        assert!(decode_signed(&[0xf8, 0x00]).is_err());
        assert!(decode_signed(&[0x02, 0xc0]).is_err());
    }

    #[test]
    fn integer_fields_reject_oversized_encodings() {
        assert_eq!(u128_from_be_bytes(&[]).unwrap(), 0);
        assert_eq!(u128_from_be_bytes(&[1, 0]).unwrap(), 256);
        assert!(u128_from_be_bytes(&[1; 17]).is_err());
        assert!(left_pad_32(&[1; 33]).is_err());
        assert_eq!(trim_leading_zeros(&[0, 0, 5]), &[5]);
    }
}
