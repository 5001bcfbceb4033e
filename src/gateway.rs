//! Request handling behind the HTTP gateway, independent of the web framework.
//!
//! One [`BallotGateway`] is built at startup from [`GatewayConfig`] and shared
//! by every handler. Each operation maps to one contract call.

use crate::abi::{expect_uint, uint, Artifact, DynSolValue, JsonAbi};
use crate::config::{GatewayConfig, WriteMode};
use crate::contract::Contract;
use crate::error::{BallotError, Result};
use crate::primitives::{parse_address, Address, TxHash, U256};
use crate::rpc::ChainClient;
use crate::wallet::LocalSigner;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fixed greeting served by `/get_hello`.
pub const HELLO: &str = "Hello World!";

/// Base-unit token amount. Deserializes from a JSON integer or a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount(pub U256);

impl Amount {
    /// Parse a decimal string of digits.
    pub fn parse_decimal(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BallotError::InvalidAmount(format!(
                "{raw:?} is not a non-negative integer"
            )));
        }
        U256::from_str_radix(trimmed, 10)
            .map(Amount)
            .map_err(|err| BallotError::InvalidAmount(format!("{raw:?}: {err}")))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
                Ok(Amount(U256::from(v)))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
                Ok(Amount(U256::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
                u64::try_from(v)
                    .map(|v| Amount(U256::from(v)))
                    .map_err(|_| E::custom(format!("amount {v} is negative")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Amount, E> {
                Err(E::custom(format!("amount {v} is not an integer")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
                Amount::parse_decimal(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Body of `POST /cast_votes`.
#[derive(Debug, Clone, Deserialize)]
pub struct CastVotesRequest {
    /// Proposal index.
    pub proposal: u64,
    /// Voting power to spend, in base units.
    pub amount: Amount,
}

impl CastVotesRequest {
    /// Check the proposal bound and a positive amount.
    pub fn validate(&self, proposal_count: u64) -> Result<()> {
        if self.proposal >= proposal_count {
            return Err(BallotError::InvalidInput(format!(
                "proposal {} out of range (0..{proposal_count})",
                self.proposal
            )));
        }
        if self.amount.0.is_zero() {
            return Err(BallotError::InvalidAmount("amount must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Body of `POST /mint-tokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct MintTokensRequest {
    /// Recipient.
    #[serde(deserialize_with = "strict_address")]
    pub address: Address,
    /// Base units to mint.
    pub amount: Amount,
}

fn strict_address<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Address, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_address(&raw).map_err(de::Error::custom)
}

/// Result of a write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Always `true` on success.
    pub result: bool,
    /// `simulated` or `submitted`.
    pub mode: &'static str,
    /// Present once a transaction was actually broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
}

/// Result of `get_votes`; the count is a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VotesOutcome {
    /// Remaining voting power.
    pub final_votes: String,
}

/// Shared, read-only client state for the gateway handlers.
pub struct BallotGateway {
    chain: ChainClient,
    signer: Option<LocalSigner>,
    ballot_address: Option<String>,
    token_address: Option<String>,
    ballot_abi: Arc<JsonAbi>,
    token_abi: Arc<JsonAbi>,
    write_mode: WriteMode,
    proposal_count: u64,
}

impl BallotGateway {
    /// Build the HTTP-backed gateway from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let chain = ChainClient::http(config.rpc_url.clone()).with_chain_id(config.chain_id);
        Self::with_chain(config, chain)
    }

    /// Build over an existing chain client.
    ///
    /// ABI fixtures are loaded here; a present but unparseable private key is
    /// rejected now rather than on the first write.
    pub fn with_chain(config: &GatewayConfig, chain: ChainClient) -> Result<Self> {
        let token = match &config.token_abi_path {
            Some(path) => Artifact::load(path)?,
            None => Artifact::bundled_token()?,
        };
        let ballot = match &config.ballot_abi_path {
            Some(path) => Artifact::load(path)?,
            None => Artifact::bundled_ballot()?,
        };
        let signer = config
            .private_key
            .as_deref()
            .map(LocalSigner::from_hex)
            .transpose()?;
        Ok(Self {
            chain,
            signer,
            ballot_address: config.ballot_address.clone(),
            token_address: config.token_address.clone(),
            ballot_abi: Arc::new(ballot.abi),
            token_abi: Arc::new(token.abi),
            write_mode: config.write_mode,
            proposal_count: config.proposal_count,
        })
    }

    /// Write mode in effect.
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Greeting.
    pub fn hello(&self) -> &'static str {
        HELLO
    }

    /// Configured ballot address, verbatim.
    pub fn contract_address(&self) -> Result<&str> {
        self.ballot_address
            .as_deref()
            .ok_or(BallotError::MissingConfig("TOKEN_BALLOUT_ADDRESS"))
    }

    /// Configured token address, verbatim.
    pub fn token_address(&self) -> Result<&str> {
        self.token_address
            .as_deref()
            .ok_or(BallotError::MissingConfig("TOKEN_ADDRESS"))
    }

    /// `ballot.vote(proposal, amount)` after validation.
    pub async fn cast_votes(&self, request: &CastVotesRequest) -> Result<WriteOutcome> {
        request.validate(self.proposal_count)?;
        let ballot = self.ballot()?;
        self.dispatch_write(
            &ballot,
            "vote",
            &[uint(request.proposal), uint(request.amount.0)],
        )
        .await
    }

    /// `ballot.getVotes(voter)`.
    pub async fn get_votes(&self, voter: Address) -> Result<VotesOutcome> {
        let ballot = self.ballot()?;
        debug!(%voter, "getVotes");
        let votes = ballot
            .read_single(&self.chain, "getVotes", &[DynSolValue::Address(voter)])
            .await?;
        let votes = expect_uint(&votes)?;
        Ok(VotesOutcome {
            final_votes: votes.to_string(),
        })
    }

    /// `ballot.delegate(to)`.
    pub async fn delegate_votes(&self, to: Address) -> Result<WriteOutcome> {
        let ballot = self.ballot()?;
        self.dispatch_write(&ballot, "delegate", &[DynSolValue::Address(to)]).await
    }

    /// `token.mint(address, amount)`.
    pub async fn mint_tokens(&self, request: &MintTokensRequest) -> Result<WriteOutcome> {
        let token = self.token()?;
        self.dispatch_write(
            &token,
            "mint",
            &[DynSolValue::Address(request.address), uint(request.amount.0)],
        )
        .await
    }

    fn ballot(&self) -> Result<Contract> {
        let address = parse_address(self.contract_address()?)?;
        Ok(Contract::new(address, Arc::clone(&self.ballot_abi)))
    }

    fn token(&self) -> Result<Contract> {
        let address = parse_address(self.token_address()?)?;
        Ok(Contract::new(address, Arc::clone(&self.token_abi)))
    }

    fn signer(&self) -> Result<&LocalSigner> {
        self.signer
            .as_ref()
            .ok_or(BallotError::MissingConfig("PRIVATE_KEY"))
    }

    async fn dispatch_write(&self, contract: &Contract, function: &str, args: &[DynSolValue]) -> Result<WriteOutcome> {
        match self.write_mode {
            WriteMode::Simulate => {
                let from = self.signer.as_ref().map(LocalSigner::address);
                contract.simulate(&self.chain, from, function, args).await?;
                warn!(
                    contract = %contract.address(),
                    function,
                    "write simulated with eth_call; no transaction sent"
                );
                Ok(WriteOutcome {
                    result: true,
                    mode: WriteMode::Simulate.label(),
                    tx_hash: None,
                })
            }
            WriteMode::Submit => {
                let signer = self.signer()?;
                let hash = contract.write(&self.chain, signer, function, args).await?;
                info!(contract = %contract.address(), function, tx_hash = %hash, "transaction submitted");
                Ok(WriteOutcome {
                    result: true,
                    mode: WriteMode::Submit.label(),
                    tx_hash: Some(hash),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::bytes32_from_str;
    use crate::contract::deploy;
    use crate::mock::MockChain;
    use alloy_primitives::utils::parse_ether;

    const DEPLOYER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    struct Fixture {
        mock: Arc<MockChain>,
        chain: ChainClient,
        token: Contract,
        ballot: Contract,
        signer: LocalSigner,
    }

    async fn deployed() -> Fixture {
        let mock = Arc::new(MockChain::new().unwrap());
        let chain = ChainClient::new(mock.clone()).with_max_polls(Some(10));
        let signer = LocalSigner::from_hex(DEPLOYER_KEY).unwrap();
        let (token, _) = deploy(&chain, &signer, &mock.token_artifact(), &[]).await.unwrap();
        let names = ["Proposal 1", "Proposal 2", "Proposal 3"]
            .iter()
            .map(|n| bytes32_from_str(n).unwrap())
            .collect();
        let (ballot, _) = deploy(
            &chain,
            &signer,
            &mock.ballot_artifact(),
            &[DynSolValue::Array(names), DynSolValue::Address(token.address())],
        )
        .await
        .unwrap();
        Fixture {
            mock,
            chain,
            token,
            ballot,
            signer,
        }
    }

    fn gateway(fx: &Fixture, mode: WriteMode) -> BallotGateway {
        let config = GatewayConfig {
            private_key: Some(DEPLOYER_KEY.to_string()),
            ballot_address: Some(fx.ballot.address().to_string()),
            token_address: Some(fx.token.address().to_string()),
            write_mode: mode,
            proposal_count: 3,
            ..GatewayConfig::default()
        };
        BallotGateway::with_chain(&config, fx.chain.clone()).unwrap()
    }

    #[test]
    fn amount_accepts_numbers_and_decimal_strings() {
        let n: Amount = serde_json::from_str("42").unwrap();
        let s: Amount = serde_json::from_str("\"10000000000000000000\"").unwrap();
        assert_eq!(n, Amount(U256::from(42u64)));
        assert_eq!(s, Amount(U256::from(10_000_000_000_000_000_000u128)));
        let wide: Amount = serde_json::from_str(&format!("\"{}\"", U256::MAX)).unwrap();
        assert_eq!(wide, Amount(U256::MAX));
        assert!(serde_json::from_str::<Amount>("\"ten\"").is_err());
        assert!(serde_json::from_str::<Amount>("-1").is_err());
        assert!(serde_json::from_str::<Amount>("1.5").is_err());
        assert!(serde_json::from_str::<Amount>("\"\"").is_err());
        let overflow = format!("\"{}0\"", U256::MAX);
        assert!(serde_json::from_str::<Amount>(&overflow).is_err());
    }

    #[test]
    fn cast_votes_validation() {
        let one = Amount(U256::from(1u64));
        let ok = CastVotesRequest { proposal: 2, amount: one };
        assert!(ok.validate(3).is_ok());
        let out_of_range = CastVotesRequest { proposal: 3, amount: one };
        assert!(out_of_range.validate(3).unwrap_err().is_input_error());
        let zero = CastVotesRequest { proposal: 0, amount: Amount(U256::ZERO) };
        assert!(zero.validate(3).unwrap_err().is_input_error());
    }

    #[test]
    fn address_lookups_return_configured_values() {
        let config = GatewayConfig {
            ballot_address: Some("0xE7f1725E7734CE288F8367e1Bb143E90bb3F0512".into()),
            ..GatewayConfig::default()
        };
        let gw = BallotGateway::with_chain(&config, ChainClient::http(None)).unwrap();
        for _ in 0..2 {
            assert_eq!(
                gw.contract_address().unwrap(),
                "0xE7f1725E7734CE288F8367e1Bb143E90bb3F0512"
            );
        }
        assert!(matches!(
            gw.token_address(),
            Err(BallotError::MissingConfig("TOKEN_ADDRESS"))
        ));
        assert_eq!(gw.hello(), HELLO);
    }

    #[test]
    fn bad_private_key_fails_at_construction() {
        let config = GatewayConfig {
            private_key: Some("not-a-key".into()),
            ..GatewayConfig::default()
        };
        assert!(BallotGateway::with_chain(&config, ChainClient::http(None)).is_err());
    }

    #[tokio::test]
    async fn untouched_voter_has_zero_votes() {
        let fx = deployed().await;
        let gw = gateway(&fx, WriteMode::Simulate);
        let voter = parse_address("0x00000000000000000000000000000000000000aa").unwrap();
        assert_eq!(gw.get_votes(voter).await.unwrap().final_votes, "0");
    }

    #[tokio::test]
    async fn simulated_writes_leave_state_alone() {
        let fx = deployed().await;
        let sent_before = fx.mock.raw_transactions_sent();
        let gw = gateway(&fx, WriteMode::Simulate);
        let me = fx.signer.address();
        let outcome = gw
            .mint_tokens(&MintTokensRequest {
                address: me,
                amount: Amount(parse_ether("5").unwrap()),
            })
            .await
            .unwrap();
        assert_eq!(outcome.mode, "simulated");
        assert!(outcome.tx_hash.is_none());
        gw.delegate_votes(me).await.unwrap();
        assert_eq!(fx.mock.raw_transactions_sent(), sent_before);
        assert_eq!(gw.get_votes(me).await.unwrap().final_votes, "0");
    }

    #[tokio::test]
    async fn submitted_writes_change_state() {
        let fx = deployed().await;
        let gw = gateway(&fx, WriteMode::Submit);
        let me = fx.signer.address();
        let minted = gw
            .mint_tokens(&MintTokensRequest {
                address: me,
                amount: Amount(parse_ether("10").unwrap()),
            })
            .await
            .unwrap();
        assert_eq!(minted.mode, "submitted");
        assert!(minted.tx_hash.is_some());
        fx.token
            .write_and_wait(&fx.chain, &fx.signer, "delegate", &[DynSolValue::Address(me)])
            .await
            .unwrap();
        assert_eq!(
            gw.get_votes(me).await.unwrap().final_votes,
            parse_ether("10").unwrap().to_string()
        );
        gw.cast_votes(&CastVotesRequest {
            proposal: 1,
            amount: Amount(parse_ether("4").unwrap()),
        })
        .await
        .unwrap();
        assert_eq!(
            gw.get_votes(me).await.unwrap().final_votes,
            parse_ether("6").unwrap().to_string()
        );
    }

    #[tokio::test]
    async fn invalid_vote_never_reaches_the_chain() {
        let fx = deployed().await;
        let gw = gateway(&fx, WriteMode::Submit);
        let seen = fx.mock.methods_seen().len();
        let err = gw
            .cast_votes(&CastVotesRequest {
                proposal: 7,
                amount: Amount(U256::from(1u64)),
            })
            .await
            .unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(fx.mock.methods_seen().len(), seen);
    }

    #[tokio::test]
    async fn submit_without_key_is_missing_config() {
        let fx = deployed().await;
        let config = GatewayConfig {
            ballot_address: Some(fx.ballot.address().to_string()),
            write_mode: WriteMode::Submit,
            proposal_count: 3,
            ..GatewayConfig::default()
        };
        let gw = BallotGateway::with_chain(&config, fx.chain.clone()).unwrap();
        let err = gw.delegate_votes(Address::ZERO).await.unwrap_err();
        assert!(matches!(err, BallotError::MissingConfig("PRIVATE_KEY")));
    }

    #[tokio::test]
    async fn votes_above_u128_are_reported_in_full() {
        let fx = deployed().await;
        let gw = gateway(&fx, WriteMode::Submit);
        let me = fx.signer.address();
        let huge = U256::from(1u64) << 200usize;
        let hash = gw
            .mint_tokens(&MintTokensRequest { address: me, amount: Amount(huge) })
            .await
            .unwrap()
            .tx_hash
            .unwrap();
        fx.chain.wait_for_receipt(&hash).await.unwrap();
        fx.token
            .write_and_wait(&fx.chain, &fx.signer, "delegate", &[DynSolValue::Address(me)])
            .await
            .unwrap();
        assert_eq!(gw.get_votes(me).await.unwrap().final_votes, huge.to_string());
    }

    #[test]
    fn mint_request_requires_prefixed_address() {
        let ok: MintTokensRequest = serde_json::from_str(
            r#"{"address":"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266","amount":1}"#,
        )
        .unwrap();
        assert_eq!(ok.amount, Amount(U256::from(1u64)));
        assert!(serde_json::from_str::<MintTokensRequest>(
            r#"{"address":"f39fd6e51aad88f6f4ce6ab8827279cfffb92266","amount":1}"#
        )
        .is_err());
    }
}
