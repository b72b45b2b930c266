//! The explicit context every contract handle carries.

use std::{
    sync::Arc,
    time::Duration,
};

use alloy_network::TransactionBuilder;
use alloy_primitives::{
    Address,
    Bytes,
    TxHash,
};
use alloy_rpc_types::TransactionRequest;
use tracing::debug;

use crate::{
    Result,
    WorkbenchError,
    chain::ChainClient,
    contract::{
        Artifact,
        CallOptions,
        ContractFactory,
    },
    mock::PROXY_CONTRACT_NAME,
    receipt::{
        KnownInterfaces,
        ReceiptWaiter,
        TransactionReceipt,
    },
};

/// Chain handle, default call options and the interfaces used to decode logs.
///
/// Cheap to clone. Independent harnesses share nothing, so several can run
/// against different sandboxes in the same process.
#[derive(Debug, Clone)]
pub struct Harness {
    chain: Arc<dyn ChainClient>,
    defaults: CallOptions,
    waiter: ReceiptWaiter,
    proxy: Option<Artifact>,
}

impl Harness {
    /// Registers `artifacts` in order. An artifact named `Proxy` backs mocks.
    pub fn new(chain: Arc<dyn ChainClient>, artifacts: &[Artifact]) -> Self {
        let interfaces = KnownInterfaces::new(
            artifacts
                .iter()
                .map(|artifact| artifact.interface.clone())
                .collect(),
        );
        let proxy = artifacts
            .iter()
            .find(|artifact| artifact.name == PROXY_CONTRACT_NAME)
            .cloned();

        Self {
            waiter: ReceiptWaiter::new(chain.clone(), interfaces),
            chain,
            defaults: CallOptions::default(),
            proxy,
        }
    }

    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_receipt_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.waiter = self
            .waiter
            .with_poll_interval(poll_interval)
            .with_timeout(timeout);
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn defaults(&self) -> &CallOptions {
        &self.defaults
    }

    pub fn interfaces(&self) -> &KnownInterfaces {
        self.waiter.interfaces()
    }

    pub fn waiter(&self) -> &ReceiptWaiter {
        &self.waiter
    }

    pub fn proxy_artifact(&self) -> Option<&Artifact> {
        self.proxy.as_ref()
    }

    pub fn factory(&self, artifact: Artifact) -> ContractFactory {
        ContractFactory::new(artifact, self.clone())
    }

    /// Submits `request` with the default options layered underneath.
    pub async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash> {
        let request = self.defaults.apply(request);
        Ok(self.chain.send_transaction(request).await?)
    }

    /// Reads with `request`, default options layered underneath.
    pub async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        let request = self.defaults.apply(request);
        Ok(self.chain.call(request).await?)
    }

    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        self.waiter.wait_for_receipt(tx_hash).await
    }

    pub async fn wait_for_sandbox_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        self.waiter.wait_for_sandbox_receipt(tx_hash).await
    }

    /// Submits and waits for the parsed receipt.
    pub async fn transact(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        let tx_hash = self.send_transaction(request).await?;
        self.wait_for_receipt(tx_hash).await
    }

    /// Deploys raw creation code and returns the new contract's address.
    ///
    /// A rejected, unmined or reverted deployment is `DeploymentFailed`; a
    /// successful receipt without an address is `NoAddressAssigned`.
    pub(crate) async fn deploy_code(&self, contract: &str, code: Bytes) -> Result<Address> {
        let deployment_failed = |reason: String| {
            WorkbenchError::DeploymentFailed {
                contract: contract.to_string(),
                reason,
            }
        };

        let request = TransactionRequest::default().with_deploy_code(code);
        let tx_hash = self
            .send_transaction(request)
            .await
            .map_err(|e| deployment_failed(e.to_string()))?;
        let receipt = self
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| deployment_failed(e.to_string()))?;

        if !receipt.status {
            return Err(deployment_failed(format!("transaction {tx_hash} reverted")));
        }

        let address = receipt
            .contract_address
            .ok_or(WorkbenchError::NoAddressAssigned {
                contract: contract.to_string(),
                tx_hash,
            })?;
        debug!(target: "workbench::harness", contract, %address, ?tx_hash, "Contract deployed");
        Ok(address)
    }
}
