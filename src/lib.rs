#![deny(missing_docs)]

//! # tokenized_ballot
//!
//! **tokenized_ballot** drives a token-weighted voting contract pair (an
//! ERC20Votes-style token and a ballot that spends the token's voting power)
//! over plain EVM JSON-RPC. All voting logic, accounting and checkpointing
//! stay inside the contracts; this crate encodes calls, signs transactions
//! and waits for receipts.
//!
//! ## Features
//!
//! * **Chain client**: the [`rpc`](rpc/index.html) module wraps a pluggable
//!   [`Transport`] with typed `eth_*` calls, EIP-1559 fee filling and receipt
//!   polling.
//! * **ABI codec**: [`abi`](abi/index.html) reads Hardhat artifacts into an
//!   `alloy` [`JsonAbi`] and encodes/decodes calls as [`DynSolValue`]s.
//! * **Signing**: [`wallet`](wallet/index.html) holds a secp256k1 key and
//!   produces type-2 raw transactions built by [`tx`](tx/index.html).
//! * **Exercise script**: [`scenario`](scenario/index.html) deploys both
//!   contracts, mints, self-delegates, transfers and reads voting power back.
//! * **Gateway core**: [`gateway`](gateway/index.html) is the framework-free
//!   half of the HTTP service in the `ballot_gateway` crate.
//!
//! ## Usage
//!
//! ```rust
//! use tokenized_ballot::primitives::{parse_address, parse_token_amount};
//! use tokenized_ballot::U256;
//!
//! let voter = parse_address("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").unwrap();
//! assert_eq!(voter.to_string(), "0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
//! assert_eq!(
//!     parse_token_amount("1.5").unwrap(),
//!     U256::from(1_500_000_000_000_000_000u128)
//! );
//! ```

pub mod abi;
pub mod config;
pub mod contract;
pub mod error;
pub mod gateway;
pub mod history;
pub mod logging;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod primitives;
pub mod rpc;
pub mod scenario;
pub mod tx;
pub mod wallet;

pub use abi::{Artifact, DynSolValue, JsonAbi};
pub use config::{GatewayConfig, WriteMode};
pub use contract::{deploy, Contract};
pub use error::{BallotError, Result};
pub use gateway::{BallotGateway, CastVotesRequest, MintTokensRequest, VotesOutcome, WriteOutcome};
pub use logging::init_logging;
pub use primitives::{Address, TxHash, U256};
pub use rpc::{ChainClient, HttpTransport, Receipt, Transport};
pub use scenario::{run_exercise, ExerciseOptions, ExerciseReport, ExerciseStep};
pub use wallet::LocalSigner;
