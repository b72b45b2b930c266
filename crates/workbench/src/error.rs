use std::time::Duration;

use alloy_primitives::TxHash;
use thiserror::Error;

use crate::{
    abi::AbiError,
    chain::ChainError,
    compiler::CompilationError,
    env::EnvironmentError,
    sandbox::SandboxError,
};

#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("RPC error: {0}")]
    RpcError(#[from] ChainError),
    #[error("Receipt for transaction {tx_hash} was not available after {timeout:?}")]
    Timeout { tx_hash: TxHash, timeout: Duration },
    #[error("Deployment of {contract} failed: {reason}")]
    DeploymentFailed { contract: String, reason: String },
    #[error("Deployment of {contract} was mined in {tx_hash} without a contract address")]
    NoAddressAssigned { contract: String, tx_hash: TxHash },
    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),
    #[error("Function {function} not found in {contract}")]
    UnknownFunction { contract: String, function: String },
    #[error("Contract {0} was not compiled by this workbench")]
    UnknownContract(String),
    #[error("Mock control call {function} reverted in {tx_hash}")]
    ControlReverted { function: String, tx_hash: TxHash },
    #[error("Workbench has not been started")]
    NotStarted,
    #[error("Proxy contract is not part of the compiled artifacts")]
    ProxyUnavailable,
    #[error("Test suite {suite} exceeded its timeout of {timeout:?}")]
    SuiteTimeout { suite: String, timeout: Duration },
    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

pub type Result<T, E = WorkbenchError> = std::result::Result<T, E>;
