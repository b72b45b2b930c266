use std::fmt::Debug;

use alloy_primitives::{
    Address,
    Bytes,
    TxHash,
};
use alloy_provider::{
    Provider,
    RootProvider,
};
use alloy_rpc_types::TransactionRequest;
use alloy_transport::TransportError;
use async_trait::async_trait;
use tracing::trace;

use crate::receipt::TransactionReceipt;

/// Error type for chain client operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Node rejected request: {0}")]
    Rejected(String),
}

/// The narrow slice of the node RPC surface the workbench relies on.
///
/// A missing receipt is `Ok(None)`; only transport or node failures are errors.
#[async_trait]
pub trait ChainClient: Send + Sync + Debug {
    /// Accounts the node can send transactions from.
    async fn accounts(&self) -> Result<Vec<Address>, ChainError>;

    /// `eth_call`: executes the request against the latest state without mining it.
    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError>;

    /// `eth_sendTransaction`: submits the request and returns its hash immediately.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError>;

    /// `eth_getTransactionReceipt`.
    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError>;
}

/// [`ChainClient`] backed by an alloy [`RootProvider`].
#[derive(Debug, Clone)]
pub struct ProviderChain {
    provider: RootProvider,
}

impl ProviderChain {
    pub fn new(provider: RootProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainClient for ProviderChain {
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        trace!(target: "workbench::chain", to = ?request.to, "eth_call");
        Ok(self.provider.call(request).await?)
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        let pending = self.provider.send_transaction(request).await?;
        let tx_hash = *pending.tx_hash();
        trace!(target: "workbench::chain", ?tx_hash, "eth_sendTransaction");
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(TransactionReceipt::from))
    }
}
