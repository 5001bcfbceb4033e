//! Voting-power history read from the token's `getPastVotes` checkpoints.

use crate::abi::{expect_uint, uint, DynSolValue};
use crate::contract::Contract;
use crate::error::Result;
use crate::primitives::{Address, U256};
use crate::rpc::ChainClient;
use tracing::debug;

/// Voting power held at the end of `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PastVotes {
    /// Block number queried.
    pub block: u64,
    /// `getPastVotes(account, block)`.
    pub votes: U256,
}

/// Scan `getPastVotes` from `from_block` (default: latest - 1) down to block 1,
/// handing each entry to `on_entry` as soon as it is read.
///
/// The latest block is skipped because the token only answers for blocks
/// strictly in the past. A `from_block` at or beyond that point is clamped.
/// Returns the number of blocks visited; the first failed read stops the scan.
pub async fn past_votes(
    chain: &ChainClient,
    token: &Contract,
    account: Address,
    from_block: Option<u64>,
    mut on_entry: impl FnMut(PastVotes),
) -> Result<u64> {
    let latest = chain.block_number().await?;
    let newest = latest.saturating_sub(1);
    let start = from_block.map_or(newest, |b| b.min(newest));
    debug!(%account, latest, start, "scanning past votes");
    let mut visited = 0;
    for block in (1..=start).rev() {
        let votes = token
            .read_single(chain, "getPastVotes", &[DynSolValue::Address(account), uint(block)])
            .await?;
        on_entry(PastVotes {
            block,
            votes: expect_uint(&votes)?,
        });
        visited += 1;
    }
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Artifact;
    use crate::contract::deploy;
    use crate::error::BallotError;
    use crate::mock::MockChain;
    use crate::primitives::to_quantity;
    use crate::rpc::Transport;
    use crate::wallet::LocalSigner;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Node at the top of the u64 block range whose `eth_call` always fails.
    #[derive(Default)]
    struct FarAheadNode {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FarAheadNode {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            match method {
                "eth_blockNumber" => Ok(Value::String(to_quantity(u64::MAX as u128))),
                "eth_call" => {
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    Err(BallotError::Rpc {
                        code: -32000,
                        message: "header not found".into(),
                    })
                }
                other => Err(BallotError::Rpc {
                    code: -32601,
                    message: format!("method not found: {other}"),
                }),
            }
        }
    }

    async fn read_all(chain: &ChainClient, token: &Contract, account: Address, from: Option<u64>) -> Vec<(u64, u64)> {
        let mut seen = Vec::new();
        past_votes(chain, token, account, from, |entry| {
            seen.push((entry.block, entry.votes.to::<u64>()))
        })
        .await
        .unwrap();
        seen
    }

    #[tokio::test]
    async fn history_tracks_each_checkpoint() {
        let mock = Arc::new(MockChain::new().unwrap());
        let chain = ChainClient::new(mock.clone()).with_max_polls(Some(5));
        let signer = LocalSigner::from_hex(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let me = signer.address();
        // block 1
        let (token, _) = deploy(&chain, &signer, &mock.token_artifact(), &[]).await.unwrap();
        // block 2
        token
            .write_and_wait(&chain, &signer, "mint", &[DynSolValue::Address(me), uint(100u64)])
            .await
            .unwrap();
        // block 3
        token
            .write_and_wait(&chain, &signer, "delegate", &[DynSolValue::Address(me)])
            .await
            .unwrap();
        // block 4
        token
            .write_and_wait(&chain, &signer, "mint", &[DynSolValue::Address(me), uint(50u64)])
            .await
            .unwrap();
        // block 5
        token
            .write_and_wait(
                &chain,
                &signer,
                "transfer",
                &[DynSolValue::Address(Address::ZERO), uint(30u64)],
            )
            .await
            .unwrap();
        assert_eq!(mock.block_number(), 5);

        assert_eq!(
            read_all(&chain, &token, me, None).await,
            vec![(4, 150), (3, 100), (2, 0), (1, 0)]
        );
        assert_eq!(read_all(&chain, &token, me, Some(99)).await.len(), 4);
        assert_eq!(read_all(&chain, &token, me, Some(2)).await, vec![(2, 0), (1, 0)]);
    }

    #[tokio::test]
    async fn huge_head_block_fails_on_first_read_without_allocating() {
        let node = Arc::new(FarAheadNode::default());
        let chain = ChainClient::new(node.clone());
        let token = Contract::new(Address::ZERO, Arc::new(Artifact::bundled_token().unwrap().abi));
        let mut entries = 0;
        let err = past_votes(&chain, &token, Address::ZERO, None, |_| entries += 1)
            .await
            .unwrap_err();
        assert!(matches!(err, BallotError::Rpc { code: -32000, .. }));
        assert_eq!(entries, 0);
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_visits_nothing() {
        let mock = Arc::new(MockChain::new().unwrap());
        let chain = ChainClient::new(mock.clone());
        let token = Contract::new(Address::ZERO, Arc::new(Artifact::bundled_token().unwrap().abi));
        let visited = past_votes(&chain, &token, Address::ZERO, None, |_| {}).await.unwrap();
        assert_eq!(visited, 0);
        assert_eq!(mock.methods_seen(), vec!["eth_blockNumber".to_string()]);
    }
}
