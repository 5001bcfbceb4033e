//! A deployed contract bound to its ABI, plus deployment.

use crate::abi::{self, Artifact, DynSolValue, JsonAbi};
use crate::error::{BallotError, Result};
use crate::primitives::{Address, TxHash};
use crate::rpc::{CallRequest, ChainClient, Receipt};
use crate::wallet::LocalSigner;
use std::sync::Arc;
use tracing::debug;

/// Address + interface of an on-chain contract.
#[derive(Debug, Clone)]
pub struct Contract {
    address: Address,
    abi: Arc<JsonAbi>,
}

impl Contract {
    /// Bind `abi` to `address`.
    pub fn new(address: Address, abi: Arc<JsonAbi>) -> Self {
        Self { address, abi }
    }

    /// Contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Interface.
    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Calldata for `function(args..)`.
    pub fn encode_call(&self, function: &str, args: &[DynSolValue]) -> Result<Vec<u8>> {
        abi::encode_call(abi::function(&self.abi, function, args.len())?, args)
    }

    /// Query-style call (`eth_call`) with an optional sender; nothing is committed.
    pub async fn simulate(
        &self,
        chain: &ChainClient,
        from: Option<Address>,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>> {
        let func = abi::function(&self.abi, function, args.len())?;
        let data = abi::encode_call(func, args)?;
        debug!(contract = %self.address, function, "eth_call");
        let output = chain
            .call(&CallRequest {
                from,
                to: Some(self.address),
                data,
                value: 0,
            })
            .await?;
        abi::decode_output(func, &output)
    }

    /// Read a view function.
    pub async fn read(&self, chain: &ChainClient, function: &str, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.simulate(chain, None, function, args).await
    }

    /// Read a function returning exactly one value.
    pub async fn read_single(&self, chain: &ChainClient, function: &str, args: &[DynSolValue]) -> Result<DynSolValue> {
        self.read(chain, function, args)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BallotError::Abi(format!("{function} returned no values")))
    }

    /// Submit a state-changing call. Returns once the node accepts the transaction.
    pub async fn write(
        &self,
        chain: &ChainClient,
        signer: &LocalSigner,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<TxHash> {
        let data = self.encode_call(function, args)?;
        chain.send_transaction(signer, Some(self.address), data).await
    }

    /// `write` followed by a receipt wait.
    pub async fn write_and_wait(
        &self,
        chain: &ChainClient,
        signer: &LocalSigner,
        function: &str,
        args: &[DynSolValue],
    ) -> Result<Receipt> {
        let hash = self.write(chain, signer, function, args).await?;
        chain.wait_for_receipt(&hash).await
    }
}

/// Deploy `artifact` with constructor `args`, wait for the receipt, and bind the result.
pub async fn deploy(
    chain: &ChainClient,
    signer: &LocalSigner,
    artifact: &Artifact,
    args: &[DynSolValue],
) -> Result<(Contract, Receipt)> {
    let init_code = abi::encode_deploy(&artifact.abi, &artifact.bytecode()?, args)?;
    let hash = chain.send_transaction(signer, None, init_code).await?;
    let receipt = chain.wait_for_receipt(&hash).await?;
    let address = receipt.contract_address.ok_or_else(|| {
        BallotError::Artifact(format!(
            "deployment {hash} of {} produced no contract address",
            artifact.contract_name
        ))
    })?;
    Ok((Contract::new(address, Arc::new(artifact.abi.clone())), receipt))
}
