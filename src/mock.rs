//! In-memory JSON-RPC chain hosting the token and ballot contracts.
//!
//! Implements [`Transport`] so the exercise script and the gateway can run end
//! to end in tests. Signed transactions are decoded and their senders
//! recovered; contract behavior follows an ERC20Votes token and a ballot that
//! spends the voter's current token votes.

use crate::abi::{self, expect_address, expect_fixed_bytes, expect_uint, uint, Artifact, DynSolValue, Function, JsonAbi};
use crate::error::{BallotError, Result};
use crate::primitives::{decode_hex_prefixed, encode_hex_prefixed, parse_tx_hash, to_quantity, Address, TxHash, B256, U256};
use crate::rpc::Transport;
use crate::tx::{create_address, decode_signed, DecodedTx};
use alloy_dyn_abi::JsonAbiExt;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Init code recognised as the token contract.
pub const TOKEN_INIT_CODE: &[u8] = b"\x60\x80mock-token";
/// Init code recognised as the ballot contract.
pub const BALLOT_INIT_CODE: &[u8] = b"\x60\x80mock-ballot";
/// Chain id reported by the mock (Hardhat's default).
pub const MOCK_CHAIN_ID: u64 = 31337;

const BASE_FEE: u128 = 1_000_000_000;
const GAS_USED: u128 = 21_000;
const GAS_ESTIMATE: u128 = 100_000;

#[derive(Debug, Clone, Default)]
struct TokenState {
    balances: HashMap<Address, U256>,
    delegates: HashMap<Address, Address>,
    votes: HashMap<Address, U256>,
    checkpoints: HashMap<Address, Vec<(u64, U256)>>,
    total_supply: U256,
}

#[derive(Debug, Clone)]
struct BallotState {
    token: Address,
    proposals: Vec<(B256, U256)>,
    spent: HashMap<Address, U256>,
}

#[derive(Debug, Clone)]
enum Deployed {
    Token(TokenState),
    Ballot(BallotState),
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    block: u64,
    contracts: HashMap<Address, Deployed>,
}

struct PendingTx {
    decoded: DecodedTx,
    polls_left: u32,
}

#[derive(Default)]
struct Inner {
    chain: ChainState,
    nonces: HashMap<Address, u64>,
    pending: VecDeque<TxHash>,
    txs: HashMap<TxHash, PendingTx>,
    receipts: HashMap<TxHash, Value>,
    receipt_delay: u32,
    methods: Vec<String>,
    raw_sent: usize,
}

#[derive(Debug, Deserialize)]
struct CallObject {
    #[serde(default)]
    from: Option<Address>,
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    input: Option<String>,
}

/// Test chain answering the JSON-RPC subset used by this crate.
pub struct MockChain {
    inner: Mutex<Inner>,
    token_abi: JsonAbi,
    ballot_abi: JsonAbi,
    token_fns: HashMap<[u8; 4], Function>,
    ballot_fns: HashMap<[u8; 4], Function>,
}

impl MockChain {
    /// Fresh chain at block 0 that mines each transaction as soon as it arrives.
    pub fn new() -> Result<Self> {
        let token_abi = Artifact::bundled_token()?.abi;
        let ballot_abi = Artifact::bundled_ballot()?.abi;
        Ok(Self {
            token_fns: abi::selector_index(&token_abi),
            ballot_fns: abi::selector_index(&ballot_abi),
            token_abi,
            ballot_abi,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Hold each transaction pending for `polls` receipt lookups before mining it.
    pub fn with_receipt_delay(self, polls: u32) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.receipt_delay = polls;
        }
        self
    }

    /// Token artifact whose bytecode the mock recognises.
    pub fn token_artifact(&self) -> Artifact {
        Artifact::new("MyToken", self.token_abi.clone(), TOKEN_INIT_CODE)
    }

    /// Ballot artifact whose bytecode the mock recognises.
    pub fn ballot_artifact(&self) -> Artifact {
        Artifact::new("TokenizedBallot", self.ballot_abi.clone(), BALLOT_INIT_CODE)
    }

    /// JSON-RPC methods received so far, in order.
    pub fn methods_seen(&self) -> Vec<String> {
        self.lock().map(|inner| inner.methods.clone()).unwrap_or_default()
    }

    /// Number of `eth_sendRawTransaction` calls accepted.
    pub fn raw_transactions_sent(&self) -> usize {
        self.lock().map(|inner| inner.raw_sent).unwrap_or_default()
    }

    /// Latest mined block.
    pub fn block_number(&self) -> u64 {
        self.lock().map(|inner| inner.chain.block).unwrap_or_default()
    }

    /// Mine every pending transaction now.
    pub fn mine_pending(&self) -> Result<()> {
        let mut inner = self.lock()?;
        while !inner.pending.is_empty() {
            self.mine_next(&mut inner);
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| BallotError::Transport("mock chain lock poisoned".to_string()))
    }

    fn mine_next(&self, inner: &mut Inner) {
        let Some(hash) = inner.pending.pop_front() else {
            return;
        };
        let Some(pending) = inner.txs.remove(&hash) else {
            return;
        };
        let tx = pending.decoded;
        let block = inner.chain.block + 1;
        let mut next = inner.chain.clone();
        next.block = block;
        let outcome = self.execute(&mut next, block, tx.from, tx.request.to, &tx.request.input, tx.request.nonce);
        let (status, created) = match outcome {
            Ok((_, created)) => {
                inner.chain = next;
                (1u8, created)
            }
            Err(_) => {
                inner.chain.block = block;
                (0u8, None)
            }
        };
        inner.receipts.insert(
            hash,
            json!({
                "transactionHash": hash.to_string(),
                "blockNumber": to_quantity(block as u128),
                "status": to_quantity(status as u128),
                "contractAddress": created.map(|a| a.to_string()),
                "gasUsed": to_quantity(GAS_USED),
                "from": tx.from.to_string(),
                "to": tx.request.to.map(|a| a.to_string()),
            }),
        );
    }

    fn execute(
        &self,
        chain: &mut ChainState,
        block: u64,
        from: Address,
        to: Option<Address>,
        input: &[u8],
        nonce: u64,
    ) -> Result<(Vec<u8>, Option<Address>)> {
        match to {
            None => {
                let address = create_address(&from, nonce);
                let deployed = self.construct(input)?;
                chain.contracts.insert(address, deployed);
                Ok((Vec::new(), Some(address)))
            }
            Some(target) => Ok((self.dispatch(chain, block, from, target, input)?, None)),
        }
    }

    fn construct(&self, init: &[u8]) -> Result<Deployed> {
        if init.starts_with(TOKEN_INIT_CODE) {
            return Ok(Deployed::Token(TokenState::default()));
        }
        if init.starts_with(BALLOT_INIT_CODE) {
            let ctor = self
                .ballot_abi
                .constructor()
                .ok_or_else(|| revert("ballot abi has no constructor"))?;
            let mut args = ctor
                .abi_decode_input(&init[BALLOT_INIT_CODE.len()..], true)?
                .into_iter();
            let names = match next_arg(&mut args)? {
                DynSolValue::Array(items) => items
                    .iter()
                    .map(|item| expect_fixed_bytes(item).map(|b| B256::right_padding_from(&b)))
                    .collect::<Result<Vec<_>>>()?,
                other => return Err(revert(&format!("bad proposals argument {other:?}"))),
            };
            let token = expect_address(&next_arg(&mut args)?)?;
            return Ok(Deployed::Ballot(BallotState {
                token,
                proposals: names.into_iter().map(|n| (n, U256::ZERO)).collect(),
                spent: HashMap::new(),
            }));
        }
        Err(revert("unknown init code"))
    }

    fn dispatch(
        &self,
        chain: &mut ChainState,
        block: u64,
        sender: Address,
        target: Address,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        if input.len() < 4 {
            return Err(revert("missing selector"));
        }
        let selector = [input[0], input[1], input[2], input[3]];
        let is_token = match chain.contracts.get(&target) {
            Some(Deployed::Token(_)) => true,
            Some(Deployed::Ballot(_)) => false,
            None => return Ok(Vec::new()),
        };
        let table = if is_token {
            &self.token_fns
        } else {
            &self.ballot_fns
        };
        let func = table
            .get(&selector)
            .ok_or_else(|| revert("function selector was not recognized"))?;
        let args = func.abi_decode_input(&input[4..], true)?;
        let outputs = if is_token {
            match chain.contracts.get_mut(&target) {
                Some(Deployed::Token(state)) => call_token(state, block, sender, &func.name, args)?,
                _ => return Err(revert("token vanished")),
            }
        } else {
            call_ballot(chain, target, sender, &func.name, args)?
        };
        Ok(DynSolValue::Tuple(outputs).abi_encode_params())
    }

    fn simulate(&self, chain: &ChainState, call: &CallObject) -> Result<Vec<u8>> {
        let data = match call.data.as_deref().or(call.input.as_deref()) {
            Some(raw) => decode_hex_prefixed(raw)?,
            None => Vec::new(),
        };
        let mut scratch = chain.clone();
        let block = chain.block + 1;
        let from = call.from.unwrap_or(Address::ZERO);
        match call.to {
            Some(target) => self.dispatch(&mut scratch, block, from, target, &data),
            None => self.construct(&data).map(|_| Vec::new()),
        }
    }

    fn send_raw(&self, inner: &mut Inner, raw_hex: &str) -> Result<Value> {
        let raw = decode_hex_prefixed(raw_hex)?;
        let decoded = decode_signed(&raw)?;
        if decoded.request.chain_id != MOCK_CHAIN_ID {
            return Err(BallotError::Rpc {
                code: -32000,
                message: format!("chainId mismatch: tx={}", decoded.request.chain_id),
            });
        }
        let expected = inner.nonces.get(&decoded.from).copied().unwrap_or(0);
        if decoded.request.nonce != expected {
            return Err(BallotError::Rpc {
                code: -32000,
                message: format!("nonce mismatch: expected {expected}, got {}", decoded.request.nonce),
            });
        }
        inner.nonces.insert(decoded.from, expected + 1);
        inner.raw_sent += 1;
        let hash = decoded.hash;
        inner.pending.push_back(hash);
        inner.txs.insert(
            hash,
            PendingTx {
                decoded,
                polls_left: inner.receipt_delay,
            },
        );
        if inner.receipt_delay == 0 {
            self.mine_next(inner);
        }
        Ok(Value::String(hash.to_string()))
    }

    fn receipt(&self, inner: &mut Inner, hash: TxHash) -> Value {
        if let Some(receipt) = inner.receipts.get(&hash) {
            return receipt.clone();
        }
        let ready = match inner.txs.get_mut(&hash) {
            Some(pending) if pending.polls_left > 0 => {
                pending.polls_left -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if !ready {
            return Value::Null;
        }
        while inner.txs.contains_key(&hash) {
            self.mine_next(inner);
        }
        inner.receipts.get(&hash).cloned().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl Transport for MockChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let mut inner = self.lock()?;
        inner.methods.push(method.to_string());
        let param = |index: usize| params.as_array().and_then(|a| a.get(index)).cloned();
        match method {
            "eth_chainId" => Ok(Value::String(to_quantity(MOCK_CHAIN_ID as u128))),
            "eth_blockNumber" => Ok(Value::String(to_quantity(inner.chain.block as u128))),
            "eth_gasPrice" | "eth_maxPriorityFeePerGas" => Ok(Value::String(to_quantity(BASE_FEE))),
            "eth_getBlockByNumber" => Ok(json!({
                "number": to_quantity(inner.chain.block as u128),
                "baseFeePerGas": to_quantity(BASE_FEE),
            })),
            "eth_getTransactionCount" => {
                let address: Address = serde_json::from_value(param(0).unwrap_or(Value::Null))
                    .map_err(|err| BallotError::Rpc { code: -32602, message: err.to_string() })?;
                let nonce = inner.nonces.get(&address).copied().unwrap_or(0);
                Ok(Value::String(to_quantity(nonce as u128)))
            }
            "eth_call" | "eth_estimateGas" => {
                let call: CallObject = serde_json::from_value(param(0).unwrap_or(Value::Null))
                    .map_err(|err| BallotError::Rpc { code: -32602, message: err.to_string() })?;
                let output = self.simulate(&inner.chain, &call)?;
                if method == "eth_call" {
                    Ok(Value::String(encode_hex_prefixed(&output)))
                } else {
                    Ok(Value::String(to_quantity(GAS_ESTIMATE)))
                }
            }
            "eth_sendRawTransaction" => {
                let raw = param(0)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| BallotError::Rpc { code: -32602, message: "missing raw tx".into() })?;
                self.send_raw(&mut inner, &raw)
            }
            "eth_getTransactionReceipt" => {
                let raw = param(0)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| BallotError::Rpc { code: -32602, message: "missing tx hash".into() })?;
                let hash = parse_tx_hash(&raw)?;
                Ok(self.receipt(&mut inner, hash))
            }
            other => Err(BallotError::Rpc {
                code: -32601,
                message: format!("method not found: {other}"),
            }),
        }
    }
}

fn revert(reason: &str) -> BallotError {
    BallotError::Rpc {
        code: 3,
        message: format!("execution reverted: {reason}"),
    }
}

fn next_arg(args: &mut impl Iterator<Item = DynSolValue>) -> Result<DynSolValue> {
    args.next().ok_or_else(|| revert("missing argument"))
}

fn move_votes(state: &mut TokenState, block: u64, from: Option<Address>, to: Option<Address>, amount: U256) {
    if from == to || amount.is_zero() {
        return;
    }
    if let Some(src) = from {
        let votes = state.votes.entry(src).or_default();
        *votes = votes.saturating_sub(amount);
        let value = *votes;
        push_checkpoint(state, src, block, value);
    }
    if let Some(dst) = to {
        let votes = state.votes.entry(dst).or_default();
        *votes = votes.saturating_add(amount);
        let value = *votes;
        push_checkpoint(state, dst, block, value);
    }
}

fn push_checkpoint(state: &mut TokenState, account: Address, block: u64, value: U256) {
    let history = state.checkpoints.entry(account).or_default();
    match history.last_mut() {
        Some(last) if last.0 == block => last.1 = value,
        _ => history.push((block, value)),
    }
}

fn call_token(
    state: &mut TokenState,
    block: u64,
    sender: Address,
    name: &str,
    args: Vec<DynSolValue>,
) -> Result<Vec<DynSolValue>> {
    let mut args = args.into_iter();
    match name {
        "mint" => {
            let to = expect_address(&next_arg(&mut args)?)?;
            let amount = expect_uint(&next_arg(&mut args)?)?;
            *state.balances.entry(to).or_default() += amount;
            state.total_supply += amount;
            let delegatee = state.delegates.get(&to).copied();
            move_votes(state, block, None, delegatee, amount);
            Ok(vec![])
        }
        "delegate" => {
            let delegatee = expect_address(&next_arg(&mut args)?)?;
            let previous = state.delegates.insert(sender, delegatee);
            let balance = state.balances.get(&sender).copied().unwrap_or_default();
            move_votes(state, block, previous, Some(delegatee), balance);
            Ok(vec![])
        }
        "transfer" => {
            let to = expect_address(&next_arg(&mut args)?)?;
            let amount = expect_uint(&next_arg(&mut args)?)?;
            let balance = state.balances.get(&sender).copied().unwrap_or_default();
            if balance < amount {
                return Err(revert("ERC20InsufficientBalance"));
            }
            state.balances.insert(sender, balance - amount);
            *state.balances.entry(to).or_default() += amount;
            let from_delegate = state.delegates.get(&sender).copied();
            let to_delegate = state.delegates.get(&to).copied();
            move_votes(state, block, from_delegate, to_delegate, amount);
            Ok(vec![DynSolValue::Bool(true)])
        }
        "balanceOf" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            Ok(vec![uint(state.balances.get(&who).copied().unwrap_or_default())])
        }
        "getVotes" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            Ok(vec![uint(state.votes.get(&who).copied().unwrap_or_default())])
        }
        "getPastVotes" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            let timepoint = expect_uint(&next_arg(&mut args)?)?;
            if timepoint >= U256::from(block) {
                return Err(revert("ERC5805FutureLookup"));
            }
            let value = state
                .checkpoints
                .get(&who)
                .and_then(|history| {
                    history
                        .iter()
                        .rev()
                        .find(|(at, _)| U256::from(*at) <= timepoint)
                        .map(|(_, v)| *v)
                })
                .unwrap_or_default();
            Ok(vec![uint(value)])
        }
        "delegates" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            Ok(vec![DynSolValue::Address(
                state.delegates.get(&who).copied().unwrap_or(Address::ZERO),
            )])
        }
        "totalSupply" => Ok(vec![uint(state.total_supply)]),
        "decimals" => Ok(vec![DynSolValue::Uint(U256::from(18u8), 8)]),
        "name" => Ok(vec![DynSolValue::String("MyToken".to_string())]),
        "symbol" => Ok(vec![DynSolValue::String("MTK".to_string())]),
        other => Err(revert(&format!("{other} is not modelled by the mock token"))),
    }
}

fn call_ballot(
    chain: &mut ChainState,
    ballot: Address,
    sender: Address,
    name: &str,
    args: Vec<DynSolValue>,
) -> Result<Vec<DynSolValue>> {
    let token = match chain.contracts.get(&ballot) {
        Some(Deployed::Ballot(state)) => state.token,
        _ => return Err(revert("ballot vanished")),
    };
    let token_votes = |chain: &ChainState, who: &Address| match chain.contracts.get(&token) {
        Some(Deployed::Token(t)) => t.votes.get(who).copied().unwrap_or_default(),
        _ => U256::ZERO,
    };
    let mut args = args.into_iter();
    match name {
        "tokenContract" => Ok(vec![DynSolValue::Address(token)]),
        "getVotes" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            let votes = token_votes(&*chain, &who);
            let spent = match chain.contracts.get(&ballot) {
                Some(Deployed::Ballot(state)) => state.spent.get(&who).copied().unwrap_or_default(),
                _ => U256::ZERO,
            };
            Ok(vec![uint(votes.saturating_sub(spent))])
        }
        "vote" => {
            let proposal = expect_uint(&next_arg(&mut args)?)?;
            let amount = expect_uint(&next_arg(&mut args)?)?;
            let votes = token_votes(&*chain, &sender);
            let Some(Deployed::Ballot(state)) = chain.contracts.get_mut(&ballot) else {
                return Err(revert("ballot vanished"));
            };
            let spent = state.spent.get(&sender).copied().unwrap_or_default();
            if votes.saturating_sub(spent) < amount {
                return Err(revert("TokenizedBallot: trying to vote more than allowed"));
            }
            let slot = usize::try_from(proposal)
                .ok()
                .and_then(|i| state.proposals.get_mut(i))
                .ok_or_else(|| revert("proposal index out of range"))?;
            slot.1 += amount;
            state.spent.insert(sender, spent + amount);
            Ok(vec![])
        }
        "delegate" => {
            expect_address(&next_arg(&mut args)?)?;
            Ok(vec![])
        }
        "proposals" => {
            let index = expect_uint(&next_arg(&mut args)?)?;
            let Some(Deployed::Ballot(state)) = chain.contracts.get(&ballot) else {
                return Err(revert("ballot vanished"));
            };
            let (name, count) = usize::try_from(index)
                .ok()
                .and_then(|i| state.proposals.get(i))
                .cloned()
                .ok_or_else(|| revert("proposal index out of range"))?;
            Ok(vec![DynSolValue::FixedBytes(name, 32), uint(count)])
        }
        "votePowerSpent" => {
            let who = expect_address(&next_arg(&mut args)?)?;
            let Some(Deployed::Ballot(state)) = chain.contracts.get(&ballot) else {
                return Err(revert("ballot vanished"));
            };
            Ok(vec![uint(state.spent.get(&who).copied().unwrap_or_default())])
        }
        "winningProposal" | "winnerName" => {
            let Some(Deployed::Ballot(state)) = chain.contracts.get(&ballot) else {
                return Err(revert("ballot vanished"));
            };
            let (index, (winner, _)) = state
                .proposals
                .iter()
                .enumerate()
                .fold(None::<(usize, &(B256, U256))>, |best, (i, p)| match best {
                    Some((_, b)) if b.1 >= p.1 => best,
                    _ => Some((i, p)),
                })
                .ok_or_else(|| revert("no proposals"))?;
            if name == "winnerName" {
                return Ok(vec![DynSolValue::FixedBytes(*winner, 32)]);
            }
            Ok(vec![uint(index as u64)])
        }
        other => Err(revert(&format!("{other} is not modelled by the mock ballot"))),
    }
}
