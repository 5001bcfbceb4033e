//! Deploy-and-exercise run: token, ballot, mint, self-delegate, transfer, read back.
//!
//! Every state-changing step waits for its receipt before the next one starts;
//! the first error aborts the run.

use crate::abi::{bytes32_from_str, expect_address, expect_uint, uint, Artifact, DynSolValue};
use crate::contract::{deploy, Contract};
use crate::error::Result;
use crate::primitives::{parse_token_amount, Address, TxHash, U256};
use crate::rpc::ChainClient;
use crate::wallet::LocalSigner;
use tracing::info;

/// Second Hardhat development account, the default transfer recipient.
pub const DEFAULT_RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
/// Proposal names deployed by default.
pub const DEFAULT_PROPOSALS: [&str; 3] = ["Proposal 1", "Proposal 2", "Proposal 3"];

/// Knobs for [`run_exercise`].
#[derive(Debug, Clone)]
pub struct ExerciseOptions {
    /// Proposal names; each must fit in `bytes32`.
    pub proposals: Vec<String>,
    /// Minted to the deployer (base units).
    pub mint_value: U256,
    /// Transferred from the deployer to `recipient` (base units).
    pub transfer_value: U256,
    /// Transfer recipient.
    pub recipient: Address,
}

impl ExerciseOptions {
    /// Ten tokens minted, one transferred, to the given recipient.
    pub fn new(recipient: Address) -> Result<Self> {
        Ok(Self {
            proposals: DEFAULT_PROPOSALS.iter().map(|p| p.to_string()).collect(),
            mint_value: parse_token_amount("10")?,
            transfer_value: parse_token_amount("1")?,
            recipient,
        })
    }
}

/// Milestones reported by [`run_exercise`] as soon as each one is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseStep {
    /// Token deployment receipt arrived.
    TokenDeployed {
        /// Contract address.
        address: Address,
        /// Including block.
        block: u64,
    },
    /// Ballot deployment receipt arrived.
    BallotDeployed {
        /// Contract address.
        address: Address,
        /// Including block.
        block: u64,
    },
    /// `ballot.tokenContract()` answered.
    TokenResolved(Address),
    /// Mint receipt arrived.
    Minted {
        /// Recipient.
        to: Address,
        /// Base units minted.
        amount: U256,
        /// Mint transaction.
        tx_hash: TxHash,
    },
    /// Self-delegation confirmed; carries the ballot's view of the votes.
    Delegated {
        /// `ballot.getVotes(deployer)`.
        votes: U256,
    },
    /// Transfer receipt arrived.
    Transferred {
        /// Recipient.
        to: Address,
        /// Base units moved.
        amount: U256,
    },
    /// Final reads after the transfer.
    Settled {
        /// Deployer account.
        account: Address,
        /// `ballot.getVotes(account)`.
        votes: U256,
        /// `token.balanceOf(account)`.
        balance: U256,
    },
}

/// What the run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseReport {
    /// Deployer / signer account.
    pub deployer: Address,
    /// Token address from the deployment receipt.
    pub token: Address,
    /// Ballot address from the deployment receipt.
    pub ballot: Address,
    /// `ballot.tokenContract()`.
    pub token_from_ballot: Address,
    /// Amount minted to the deployer.
    pub minted: U256,
    /// `ballot.getVotes(deployer)` right after self-delegation.
    pub votes_after_delegate: U256,
    /// `ballot.getVotes(deployer)` after the transfer.
    pub votes_after_transfer: U256,
    /// `token.balanceOf(deployer)` after the transfer.
    pub balance_after_transfer: U256,
}

/// Run the full scenario against `chain` as `signer`.
///
/// `progress` sees each [`ExerciseStep`] as it completes, so a caller can
/// print results before a later step fails.
pub async fn run_exercise(
    chain: &ChainClient,
    signer: &LocalSigner,
    token_artifact: &Artifact,
    ballot_artifact: &Artifact,
    options: &ExerciseOptions,
    mut progress: impl FnMut(&ExerciseStep),
) -> Result<ExerciseReport> {
    let deployer = signer.address();

    let (token, receipt) = deploy(chain, signer, token_artifact, &[]).await?;
    info!(step = "deploy_token", address = %token.address(), block = receipt.block_number, "token deployed");
    progress(&ExerciseStep::TokenDeployed {
        address: token.address(),
        block: receipt.block_number,
    });

    let names = options
        .proposals
        .iter()
        .map(|name| bytes32_from_str(name))
        .collect::<Result<Vec<_>>>()?;
    let (ballot, receipt) = deploy(
        chain,
        signer,
        ballot_artifact,
        &[DynSolValue::Array(names), DynSolValue::Address(token.address())],
    )
    .await?;
    info!(step = "deploy_ballot", address = %ballot.address(), block = receipt.block_number, "ballot deployed");
    progress(&ExerciseStep::BallotDeployed {
        address: ballot.address(),
        block: receipt.block_number,
    });

    let token_from_ballot = expect_address(&ballot.read_single(chain, "tokenContract", &[]).await?)?;
    progress(&ExerciseStep::TokenResolved(token_from_ballot));

    let receipt = token
        .write_and_wait(
            chain,
            signer,
            "mint",
            &[DynSolValue::Address(deployer), uint(options.mint_value)],
        )
        .await?;
    info!(step = "mint", tx_hash = %receipt.transaction_hash, block = receipt.block_number, amount = %options.mint_value, "minted");
    progress(&ExerciseStep::Minted {
        to: deployer,
        amount: options.mint_value,
        tx_hash: receipt.transaction_hash,
    });

    let receipt = token
        .write_and_wait(chain, signer, "delegate", &[DynSolValue::Address(deployer)])
        .await?;
    info!(step = "delegate", tx_hash = %receipt.transaction_hash, block = receipt.block_number, "self-delegated");
    let votes_after_delegate = votes_of(chain, &ballot, deployer).await?;
    progress(&ExerciseStep::Delegated {
        votes: votes_after_delegate,
    });

    let receipt = token
        .write_and_wait(
            chain,
            signer,
            "transfer",
            &[DynSolValue::Address(options.recipient), uint(options.transfer_value)],
        )
        .await?;
    info!(step = "transfer", tx_hash = %receipt.transaction_hash, block = receipt.block_number, to = %options.recipient, "transferred");
    progress(&ExerciseStep::Transferred {
        to: options.recipient,
        amount: options.transfer_value,
    });

    let votes_after_transfer = votes_of(chain, &ballot, deployer).await?;
    let balance_after_transfer = expect_uint(
        &token
            .read_single(chain, "balanceOf", &[DynSolValue::Address(deployer)])
            .await?,
    )?;
    progress(&ExerciseStep::Settled {
        account: deployer,
        votes: votes_after_transfer,
        balance: balance_after_transfer,
    });

    Ok(ExerciseReport {
        deployer,
        token: token.address(),
        ballot: ballot.address(),
        token_from_ballot,
        minted: options.mint_value,
        votes_after_delegate,
        votes_after_transfer,
        balance_after_transfer,
    })
}

/// `ballot.getVotes(account)`.
pub async fn votes_of(chain: &ChainClient, ballot: &Contract, account: Address) -> Result<U256> {
    expect_uint(
        &ballot
            .read_single(chain, "getVotes", &[DynSolValue::Address(account)])
            .await?,
    )
}
