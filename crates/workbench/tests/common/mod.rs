#![allow(dead_code)]

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{
    Address,
    U256,
};
use workbench::{
    DeployedContract,
    Harness,
    MockOptions,
    MockProxyInstance,
    test_utils::token_artifact,
};

pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn addr_value(byte: u8) -> DynSolValue {
    DynSolValue::Address(address(byte))
}

pub fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

pub fn string(value: &str) -> DynSolValue {
    DynSolValue::String(value.to_string())
}

/// Deploys the sample token's bytecode.
pub async fn deploy_token(harness: &Harness) -> DeployedContract {
    harness
        .factory(token_artifact())
        .deploy(vec![])
        .await
        .unwrap()
}

/// A proxy standing in for the sample token.
pub async fn mock_token(harness: &Harness, options: MockOptions) -> MockProxyInstance {
    harness
        .factory(token_artifact())
        .new_mock(options)
        .await
        .unwrap()
}
