//! Receipt polling and log enrichment.

use std::{
    sync::Arc,
    time::Duration,
};

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{
    Address,
    Bytes,
    LogData,
    Selector,
    TxHash,
};
use tracing::{
    debug,
    trace,
};

use crate::{
    Result,
    WorkbenchError,
    abi::{
        ContractInterface,
        ParsedEvent,
    },
    chain::ChainClient,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the event the mock proxy emits for every intercepted call.
pub const TRACE_EVENT: &str = "Trace";

/// A mined transaction as seen by the workbench.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub status: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub logs: Vec<ReceiptLog>,
}

impl TransactionReceipt {
    /// Logs that were matched against a known event.
    pub fn parsed_logs(&self) -> impl Iterator<Item = &ParsedEvent> {
        self.logs.iter().filter_map(|log| log.parsed.as_ref())
    }
}

impl From<alloy_rpc_types::TransactionReceipt> for TransactionReceipt {
    fn from(receipt: alloy_rpc_types::TransactionReceipt) -> Self {
        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| ReceiptLog::new(log.inner.address, log.inner.data.clone()))
            .collect();

        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status: receipt.status(),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            logs,
        }
    }
}

/// A raw log, enriched with its decoded form once an interface recognises it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLog {
    pub address: Address,
    pub data: LogData,
    pub parsed: Option<ParsedEvent>,
}

impl ReceiptLog {
    pub fn new(address: Address, data: LogData) -> Self {
        Self {
            address,
            data,
            parsed: None,
        }
    }

    /// The intercepted call recorded by this log, if it is a proxy trace.
    pub fn trace(&self) -> Option<TraceRecord> {
        let parsed = self.parsed.as_ref()?;
        if parsed.event != TRACE_EVENT {
            return None;
        }
        let DynSolValue::Bytes(data) = parsed.arg("data")? else {
            return None;
        };
        Some(TraceRecord {
            proxy: self.address,
            data: Bytes::copy_from_slice(data),
        })
    }
}

/// A call observed by a mock proxy: the raw calldata it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub proxy: Address,
    pub data: Bytes,
}

impl TraceRecord {
    pub fn selector(&self) -> Option<Selector> {
        (self.data.len() >= 4).then(|| Selector::from_slice(&self.data[..4]))
    }
}

/// Interfaces used to decode receipt logs, in registration order.
#[derive(Debug, Clone, Default)]
pub struct KnownInterfaces(Arc<Vec<Arc<ContractInterface>>>);

impl KnownInterfaces {
    pub fn new(interfaces: Vec<Arc<ContractInterface>>) -> Self {
        Self(Arc::new(interfaces))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContractInterface>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes every log of `receipt` in place. For each log the first
    /// interface that decodes it wins; logs nothing recognises stay unparsed.
    pub fn decode_receipt_logs(&self, receipt: &mut TransactionReceipt) {
        for log in &mut receipt.logs {
            log.parsed = self
                .iter()
                .find_map(|interface| interface.decode_log(&log.data));
        }
    }
}

/// Polls the chain until a transaction is mined.
#[derive(Debug, Clone)]
pub struct ReceiptWaiter {
    chain: Arc<dyn ChainClient>,
    interfaces: KnownInterfaces,
    poll_interval: Duration,
    timeout: Duration,
}

impl ReceiptWaiter {
    pub fn new(chain: Arc<dyn ChainClient>, interfaces: KnownInterfaces) -> Self {
        Self {
            chain,
            interfaces,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interfaces(&self) -> &KnownInterfaces {
        &self.interfaces
    }

    /// Waits for the receipt and decodes its logs against the known interfaces.
    pub async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let mut receipt = self.wait_for_sandbox_receipt(tx_hash).await?;
        self.interfaces.decode_receipt_logs(&mut receipt);
        debug!(
            target: "workbench::receipt",
            ?tx_hash,
            logs = receipt.logs.len(),
            parsed = receipt.parsed_logs().count(),
            "Transaction mined"
        );
        Ok(receipt)
    }

    /// Waits for the receipt without touching its logs.
    ///
    /// Only the "not mined yet" condition is retried. RPC failures abort the wait.
    pub async fn wait_for_sandbox_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let poll = async {
            loop {
                if let Some(receipt) = self.chain.transaction_receipt(tx_hash).await? {
                    return Ok::<_, WorkbenchError>(receipt);
                }
                trace!(target: "workbench::receipt", ?tx_hash, "Receipt not available yet");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.timeout, poll)
            .await
            .map_err(|_| {
                WorkbenchError::Timeout {
                    tx_hash,
                    timeout: self.timeout,
                }
            })?
    }
}
