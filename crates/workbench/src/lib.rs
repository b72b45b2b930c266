//! Contract test workbench: compile Solidity, boot a sandbox chain, call
//! deployed contracts through typed wrappers and stand in for dependencies
//! with programmable proxies.

mod error;
pub use error::{
    Result,
    WorkbenchError,
};

pub mod abi;

pub mod chain;
pub use chain::{
    ChainClient,
    ProviderChain,
};

pub mod compiler;

pub mod config;
pub use config::WorkbenchConfig;

pub mod contract;
pub use contract::{
    Artifact,
    CallOptions,
    Callable,
    ContractFactory,
    Deployed,
    DeployedContract,
    Instantiation,
    Invocation,
};

pub mod env;

mod harness;
pub use harness::Harness;

pub mod mock;
pub use mock::{
    CallRecord,
    ForwardCall,
    MockOptions,
    MockProxyInstance,
    MockedFunction,
};

pub mod receipt;
pub use receipt::{
    KnownInterfaces,
    ReceiptWaiter,
    TransactionReceipt,
};

pub mod sandbox;

mod workbench;
pub use workbench::{
    TestSuite,
    Workbench,
};

#[cfg(any(test, feature = "test"))]
pub mod test_utils;
