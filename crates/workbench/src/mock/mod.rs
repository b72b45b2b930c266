//! Programmable doubles backed by the bundled proxy contract.
//!
//! A mock is the proxy's address bound to the mocked contract's interface.
//! Calls to any of the interface's functions land in the proxy's fallback,
//! which answers according to the entries programmed through
//! [`MockedFunction`]. Programming is itself a mined transaction, so every
//! `mock_*` method resolves only once the new entry is visible on chain.

mod proxy;
pub use proxy::{
    CONTROL_GAS_LIMIT,
    IProxy,
    MockKey,
    MockMode,
    PROXY_ABI,
    PROXY_CONTRACT_NAME,
    PROXY_SOURCE_FILE,
    proxy_source_dir,
};

use std::sync::Arc;

use alloy_dyn_abi::{
    DynSolType,
    DynSolValue,
};
use alloy_network::TransactionBuilder;
use alloy_primitives::{
    Address,
    Bytes,
};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use tracing::{
    debug,
    info,
};

use crate::{
    Result,
    WorkbenchError,
    abi::{
        self,
        AbiError,
        ContractInterface,
    },
    contract::{
        Callable,
        DeployedContract,
        Invocation,
    },
    harness::Harness,
    receipt::{
        TraceRecord,
        TransactionReceipt,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockOptions {
    /// Emit a `Trace` event for every intercepted call from deployment on.
    /// When false, tracing stays off until armed with
    /// [`MockProxyInstance::set_tracing`].
    pub trace_function_calls: bool,
}

impl MockOptions {
    pub fn traced() -> Self {
        Self {
            trace_function_calls: true,
        }
    }
}

/// Call data a forwarding entry sends to its target.
#[derive(Debug, Clone)]
pub enum ForwardCall {
    /// Forward exactly these bytes.
    Raw(Bytes),
    /// Forward `function(args)` encoded against `interface`.
    Encoded {
        interface: Arc<ContractInterface>,
        function: String,
        args: Vec<DynSolValue>,
    },
    /// Forward the intercepted calldata unchanged.
    Passthrough,
}

impl ForwardCall {
    pub fn encoded(
        interface: Arc<ContractInterface>,
        function: impl Into<String>,
        args: Vec<DynSolValue>,
    ) -> Self {
        Self::Encoded {
            interface,
            function: function.into(),
            args,
        }
    }

    pub fn calldata(&self) -> Result<Bytes> {
        match self {
            Self::Raw(data) => Ok(data.clone()),
            Self::Passthrough => Ok(Bytes::new()),
            Self::Encoded {
                interface,
                function,
                args,
            } => {
                let descriptor = interface.function(function).ok_or_else(|| {
                    WorkbenchError::UnknownFunction {
                        contract: interface.name().to_string(),
                        function: function.clone(),
                    }
                })?;
                Ok(abi::encode_call(descriptor, args)?)
            }
        }
    }
}

/// Result of replaying a receipt's traces for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub called: bool,
    pub args: Option<Vec<DynSolValue>>,
}

impl CallRecord {
    pub fn not_called() -> Self {
        Self {
            called: false,
            args: None,
        }
    }
}

/// A proxy deployment exposing a mocked contract's interface.
#[derive(Debug, Clone)]
pub struct MockProxyInstance {
    contract: DeployedContract,
    harness: Harness,
}

impl MockProxyInstance {
    /// Deploys a fresh proxy and binds `interface` to it.
    pub async fn deploy(
        interface: Arc<ContractInterface>,
        harness: &Harness,
        options: MockOptions,
    ) -> Result<Self> {
        let proxy = harness
            .proxy_artifact()
            .ok_or(WorkbenchError::ProxyUnavailable)?;

        let constructor_args = abi::encode(
            &[DynSolType::Bool],
            &[DynSolValue::Bool(options.trace_function_calls)],
        )?;
        let mut creation_code = proxy.bytecode.to_vec();
        creation_code.extend_from_slice(&constructor_args);

        let address = harness
            .deploy_code(PROXY_CONTRACT_NAME, creation_code.into())
            .await?;
        info!(
            target: "workbench::mock",
            mocked = %interface.name(),
            %address,
            tracing = options.trace_function_calls,
            "Deployed mock proxy"
        );

        Ok(Self {
            contract: DeployedContract::new(interface, address, harness)?,
            harness: harness.clone(),
        })
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    pub fn contract(&self) -> &DeployedContract {
        &self.contract
    }

    pub fn into_contract(self) -> DeployedContract {
        self.contract
    }

    /// Control handle for one of the mocked interface's functions.
    pub fn function(&self, name_or_signature: &str) -> Result<MockedFunction> {
        Ok(MockedFunction {
            callable: self.contract.function(name_or_signature)?.clone(),
            proxy: self.address(),
            harness: self.harness.clone(),
        })
    }

    /// Arms or disarms `Trace` emission on the proxy.
    pub async fn set_tracing(&self, enabled: bool) -> Result<TransactionReceipt> {
        let calldata = IProxy::setTracingCall { enabled }.abi_encode();
        control(&self.harness, self.address(), "setTracing", calldata.into()).await
    }

    /// Reads the proxy's tracing flag.
    pub async fn tracing(&self) -> Result<bool> {
        let request = TransactionRequest::default()
            .with_to(self.address())
            .with_input(IProxy::tracingCall {}.abi_encode());
        let output = self.harness.call(request).await?;
        IProxy::tracingCall::abi_decode_returns(&output)
            .map_err(|e| AbiError::MalformedData(e.to_string()).into())
    }

    /// Calls this proxy intercepted in `receipt`, in log order.
    pub fn traces(&self, receipt: &TransactionReceipt) -> Vec<TraceRecord> {
        receipt
            .logs
            .iter()
            .filter_map(|log| log.trace())
            .filter(|trace| trace.proxy == self.address())
            .collect()
    }
}

/// Programming and observation handle for one mocked function.
#[derive(Debug, Clone)]
pub struct MockedFunction {
    callable: Callable,
    proxy: Address,
    harness: Harness,
}

impl MockedFunction {
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Makes the function return `value`, encoded as its first declared output.
    ///
    /// With `on_args` the entry only matches calls with exactly those
    /// arguments, and takes precedence over a bare entry for the same function.
    pub async fn mock_call_return_value(
        &self,
        value: DynSolValue,
        on_args: Option<&[DynSolValue]>,
    ) -> Result<TransactionReceipt> {
        let handle = self.callable.handle();
        let output = handle.output_types().first().ok_or(AbiError::ArityMismatch {
            expected: 0,
            actual: 1,
        })?;
        let data = abi::encode(std::slice::from_ref(output), &[value])?;
        let key = MockKey::new(handle, on_args)?;

        self.program(key, MockMode::Return, Address::ZERO, data)
            .await
    }

    /// Makes the function forward to `target` with the call data described by `call`.
    pub async fn mock_transaction_forward(
        &self,
        target: Address,
        call: ForwardCall,
        on_args: Option<&[DynSolValue]>,
    ) -> Result<TransactionReceipt> {
        let data = call.calldata()?;
        let key = MockKey::new(self.callable.handle(), on_args)?;

        self.program(key, MockMode::Forward, target, data).await
    }

    /// Looks for a trace of this function in `receipt`.
    ///
    /// When several calls were traced the last one is reported.
    pub fn was_called(&self, receipt: &TransactionReceipt) -> Result<CallRecord> {
        let handle = self.callable.handle();
        let selector = handle.selector();

        let Some(trace) = receipt
            .logs
            .iter()
            .rev()
            .filter_map(|log| log.trace())
            .find(|trace| trace.proxy == self.proxy && trace.selector() == Some(selector))
        else {
            return Ok(CallRecord::not_called());
        };

        let args = abi::decode(handle.input_types(), &trace.data[4..])?;
        Ok(CallRecord {
            called: true,
            args: Some(args),
        })
    }

    pub async fn invoke(&self, args: &[DynSolValue]) -> Result<Invocation> {
        self.callable.invoke(args).await
    }

    pub async fn call(&self, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.callable.call(args).await
    }

    async fn program(
        &self,
        key: MockKey,
        mode: MockMode,
        target: Address,
        data: Bytes,
    ) -> Result<TransactionReceipt> {
        debug!(
            target: "workbench::mock",
            function = %self.callable.signature(),
            proxy = %self.proxy,
            ?mode,
            conditional = matches!(key, MockKey::Calldata(_)),
            "Programming mock"
        );
        let control_function = match key {
            MockKey::Selector(_) => "setMock",
            MockKey::Calldata(_) => "setMockWithArgs",
        };
        control(
            &self.harness,
            self.proxy,
            control_function,
            key.program(mode, target, data),
        )
        .await
    }
}

async fn control(
    harness: &Harness,
    proxy: Address,
    function: &str,
    calldata: Bytes,
) -> Result<TransactionReceipt> {
    let request = TransactionRequest::default()
        .with_to(proxy)
        .with_input(calldata)
        .with_gas_limit(CONTROL_GAS_LIMIT);
    let receipt = harness.transact(request).await?;

    if !receipt.status {
        return Err(WorkbenchError::ControlReverted {
            function: function.to_string(),
            tx_hash: receipt.transaction_hash,
        });
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_token_interface;
    use alloy_primitives::{
        U256,
        address,
    };

    #[test]
    fn test_forward_call_encodes_named_function() {
        let token = Arc::new(sample_token_interface());
        let to = address!("00000000000000000000000000000000000000cc");
        let call = ForwardCall::encoded(
            token.clone(),
            "transfer",
            vec![DynSolValue::Address(to), DynSolValue::Uint(U256::from(100), 256)],
        );

        let expected =
            abi::encode_call(token.function("transfer").unwrap(), &[
                DynSolValue::Address(to),
                DynSolValue::Uint(U256::from(100), 256),
            ])
            .unwrap();
        assert_eq!(call.calldata().unwrap(), expected);
    }

    #[test]
    fn test_forward_call_unknown_function() {
        let call = ForwardCall::encoded(Arc::new(sample_token_interface()), "mint", vec![]);
        assert!(matches!(
            call.calldata(),
            Err(WorkbenchError::UnknownFunction { function, .. }) if function == "mint"
        ));
    }

    #[test]
    fn test_raw_and_passthrough_forward_data() {
        let raw = Bytes::from_static(&[1, 2, 3]);
        assert_eq!(ForwardCall::Raw(raw.clone()).calldata().unwrap(), raw);
        assert!(ForwardCall::Passthrough.calldata().unwrap().is_empty());
    }
}
