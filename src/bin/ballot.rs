//! Command-line driver for the token and ballot contracts.
//!
//! `ballot run` deploys both contracts and exercises mint, delegate and
//! transfer; `ballot votes` and `ballot past-votes` read voting power back.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokenized_ballot::{
    history::past_votes,
    init_logging,
    primitives::{parse_address, parse_token_amount},
    run_exercise,
    scenario::{votes_of, ExerciseStep, DEFAULT_RECIPIENT},
    Address, Artifact, BallotError, ChainClient, Contract, ExerciseOptions, LocalSigner,
};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "ballot", version, about = "Deploy and exercise a tokenized ballot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deploy token and ballot, mint, self-delegate, transfer, report voting power.
    Run(RunArgs),
    /// Current voting power of an account on a ballot.
    Votes(VotesArgs),
    /// Voting-power history of an account, newest block first.
    PastVotes(PastVotesArgs),
}

#[derive(Debug, Args)]
struct Endpoint {
    /// JSON-RPC endpoint.
    #[arg(long, env = "RPC_ENDPOINT_URL")]
    rpc_url: Option<String>,
    /// Pin the chain id instead of asking the node.
    #[arg(long, env = "CHAIN_ID")]
    chain_id: Option<u64>,
}

impl Endpoint {
    fn client(&self) -> ChainClient {
        ChainClient::http(self.rpc_url.clone()).with_chain_id(self.chain_id)
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    endpoint: Endpoint,
    /// Deployer key, hex.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,
    /// Compiled MyToken artifact (Hardhat JSON with bytecode).
    #[arg(long)]
    token_artifact: PathBuf,
    /// Compiled TokenizedBallot artifact (Hardhat JSON with bytecode).
    #[arg(long)]
    ballot_artifact: PathBuf,
    /// Transfer recipient.
    #[arg(long, default_value = DEFAULT_RECIPIENT, value_parser = parse_address)]
    recipient: Address,
    /// Proposal name; repeat for several. Defaults to three numbered proposals.
    #[arg(long = "proposal")]
    proposals: Vec<String>,
    /// Tokens minted to the deployer, in whole units.
    #[arg(long, default_value = "10")]
    mint: String,
    /// Tokens transferred to the recipient, in whole units.
    #[arg(long, default_value = "1")]
    transfer: String,
}

#[derive(Debug, Args)]
struct VotesArgs {
    #[command(flatten)]
    endpoint: Endpoint,
    /// Ballot contract.
    #[arg(long, env = "TOKEN_BALLOUT_ADDRESS", value_parser = parse_address)]
    ballot: Address,
    /// Account to inspect.
    #[arg(long, value_parser = parse_address)]
    account: Address,
}

#[derive(Debug, Args)]
struct PastVotesArgs {
    #[command(flatten)]
    endpoint: Endpoint,
    /// Token contract.
    #[arg(long, env = "TOKEN_ADDRESS", value_parser = parse_address)]
    token: Address,
    /// Account to inspect.
    #[arg(long, value_parser = parse_address)]
    account: Address,
    /// Newest block to start from (default: latest - 1).
    #[arg(long)]
    from_block: Option<u64>,
}

fn fatal(err: BallotError) -> ! {
    error!(%err, "ballot failed");
    eprintln!("{err}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Votes(args) => votes(args).await,
        Command::PastVotes(args) => history(args).await,
    };
    if let Err(err) = outcome {
        fatal(err);
    }
}

async fn run(args: RunArgs) -> Result<(), BallotError> {
    let key = args
        .private_key
        .as_deref()
        .ok_or(BallotError::MissingConfig("PRIVATE_KEY"))?;
    let signer = LocalSigner::from_hex(key)?;
    let chain = args.endpoint.client();
    let token_artifact = Artifact::load(&args.token_artifact)?;
    let ballot_artifact = Artifact::load(&args.ballot_artifact)?;

    let mut options = ExerciseOptions::new(args.recipient)?;
    if !args.proposals.is_empty() {
        options.proposals = args.proposals;
    }
    options.mint_value = parse_token_amount(&args.mint)?;
    options.transfer_value = parse_token_amount(&args.transfer)?;

    run_exercise(&chain, &signer, &token_artifact, &ballot_artifact, &options, print_step).await?;
    Ok(())
}

fn print_step(step: &ExerciseStep) {
    match step {
        ExerciseStep::BallotDeployed { address, .. } => {
            println!("TokenizedBallot contract deployed at {address}")
        }
        ExerciseStep::TokenResolved(address) => println!("Token contract deployed at {address}"),
        ExerciseStep::Minted { to, amount, .. } => {
            println!("Minted {amount} decimal units to account {to}")
        }
        ExerciseStep::Settled {
            account,
            votes,
            balance,
        } => println!(
            "Account {account} has {votes} units of voting power after transferring and balance is {balance}"
        ),
        ExerciseStep::TokenDeployed { .. }
        | ExerciseStep::Delegated { .. }
        | ExerciseStep::Transferred { .. } => {}
    }
}

async fn votes(args: VotesArgs) -> Result<(), BallotError> {
    let chain = args.endpoint.client();
    let ballot = Contract::new(args.ballot, Arc::new(Artifact::bundled_ballot()?.abi));
    let votes = votes_of(&chain, &ballot, args.account).await?;
    println!(
        "Account {} has {} units of voting power",
        args.account, votes
    );
    Ok(())
}

async fn history(args: PastVotesArgs) -> Result<(), BallotError> {
    let chain = args.endpoint.client();
    let token = Contract::new(args.token, Arc::new(Artifact::bundled_token()?.abi));
    let account = args.account;
    past_votes(&chain, &token, account, args.from_block, |entry| {
        println!(
            "Account {account} had {} units of voting power at block {}",
            entry.votes, entry.block
        );
    })
    .await?;
    Ok(())
}
