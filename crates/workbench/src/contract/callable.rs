//! Per-function call wrappers.
//!
//! The variant is chosen once, when the contract is bound: constant functions
//! become a [`ReadCallable`], everything else a [`TransactionCallable`]. Both
//! expose `call`, which always means "read now".

use alloy_dyn_abi::{
    DynSolType,
    DynSolValue,
};
use alloy_json_abi::Function;
use alloy_network::TransactionBuilder;
use alloy_primitives::{
    Address,
    Bytes,
    Selector,
    TxHash,
};
use alloy_rpc_types::TransactionRequest;
use tracing::{
    debug,
    warn,
};

use crate::{
    Result,
    abi::{
        self,
        AbiError,
        is_constant,
    },
    contract::CallOptions,
    harness::Harness,
    receipt::TransactionReceipt,
};

/// Everything needed to encode, send and decode calls to one function.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    function: Function,
    selector: Selector,
    input_types: Vec<DynSolType>,
    output_types: Vec<DynSolType>,
    address: Address,
    harness: Harness,
}

impl FunctionHandle {
    pub(crate) fn new(
        function: Function,
        address: Address,
        harness: Harness,
    ) -> Result<Self, AbiError> {
        Ok(Self {
            selector: abi::function_selector(&function),
            input_types: abi::param_types(&function.inputs)?,
            output_types: abi::param_types(&function.outputs)?,
            function,
            address,
            harness,
        })
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn input_types(&self) -> &[DynSolType] {
        &self.input_types
    }

    pub fn output_types(&self) -> &[DynSolType] {
        &self.output_types
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `selector ++ encode(inputs, args)`.
    pub fn calldata(&self, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
        let encoded = abi::encode(&self.input_types, args)?;
        let mut calldata = Vec::with_capacity(4 + encoded.len());
        calldata.extend_from_slice(self.selector.as_slice());
        calldata.extend_from_slice(&encoded);
        Ok(calldata.into())
    }

    fn request(&self, args: &[DynSolValue], options: &CallOptions) -> Result<TransactionRequest> {
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(self.calldata(args)?);
        Ok(self.harness.defaults().merge(options).apply(request))
    }

    async fn read(&self, args: &[DynSolValue], options: &CallOptions) -> Result<Vec<DynSolValue>> {
        let request = self.request(args, options)?;
        let output = self.harness.chain().call(request).await?;

        if output.is_empty() && !self.output_types.is_empty() {
            warn!(
                target: "workbench::callable",
                function = %self.function.signature(),
                address = %self.address,
                "Read returned no data"
            );
        }

        Ok(abi::decode(&self.output_types, &output)?)
    }

    async fn submit(&self, args: &[DynSolValue], options: &CallOptions) -> Result<TxHash> {
        let request = self.request(args, options)?;
        let tx_hash = self.harness.chain().send_transaction(request).await?;
        debug!(
            target: "workbench::callable",
            function = %self.function.signature(),
            address = %self.address,
            ?tx_hash,
            "Submitted transaction"
        );
        Ok(tx_hash)
    }
}

/// Wrapper for constant functions: invoking it performs a read.
#[derive(Debug, Clone)]
pub struct ReadCallable {
    handle: FunctionHandle,
}

impl ReadCallable {
    pub async fn invoke(&self, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.handle.read(args, &CallOptions::default()).await
    }

    pub async fn invoke_with(
        &self,
        args: &[DynSolValue],
        options: &CallOptions,
    ) -> Result<Vec<DynSolValue>> {
        self.handle.read(args, options).await
    }

    /// Same as [`Self::invoke`].
    pub async fn call(&self, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.invoke(args).await
    }

    pub fn handle(&self) -> &FunctionHandle {
        &self.handle
    }
}

/// Wrapper for state-changing functions: invoking it submits a transaction,
/// `call` dry-runs it.
#[derive(Debug, Clone)]
pub struct TransactionCallable {
    handle: FunctionHandle,
}

impl TransactionCallable {
    pub async fn invoke(&self, args: &[DynSolValue]) -> Result<TxHash> {
        self.handle.submit(args, &CallOptions::default()).await
    }

    pub async fn invoke_with(&self, args: &[DynSolValue], options: &CallOptions) -> Result<TxHash> {
        self.handle.submit(args, options).await
    }

    /// Submits the transaction and waits for its parsed receipt.
    pub async fn invoke_and_wait(&self, args: &[DynSolValue]) -> Result<TransactionReceipt> {
        let tx_hash = self.invoke(args).await?;
        self.handle.harness.wait_for_receipt(tx_hash).await
    }

    pub async fn call(&self, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.handle.read(args, &CallOptions::default()).await
    }

    pub fn handle(&self) -> &FunctionHandle {
        &self.handle
    }
}

/// Outcome of invoking a function in its natural mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Returned(Vec<DynSolValue>),
    Submitted(TxHash),
}

impl Invocation {
    pub fn returned(self) -> Option<Vec<DynSolValue>> {
        match self {
            Self::Returned(values) => Some(values),
            Self::Submitted(_) => None,
        }
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Submitted(tx_hash) => Some(*tx_hash),
            Self::Returned(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Callable {
    Read(ReadCallable),
    Transaction(TransactionCallable),
}

impl Callable {
    pub(crate) fn new(handle: FunctionHandle) -> Self {
        if is_constant(handle.function()) {
            Self::Read(ReadCallable { handle })
        } else {
            Self::Transaction(TransactionCallable { handle })
        }
    }

    pub fn handle(&self) -> &FunctionHandle {
        match self {
            Self::Read(callable) => callable.handle(),
            Self::Transaction(callable) => callable.handle(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Self::Read(_))
    }

    pub fn name(&self) -> &str {
        &self.handle().function().name
    }

    pub fn signature(&self) -> String {
        self.handle().function().signature()
    }

    pub fn selector(&self) -> Selector {
        self.handle().selector()
    }

    pub async fn invoke(&self, args: &[DynSolValue]) -> Result<Invocation> {
        self.invoke_with(args, &CallOptions::default()).await
    }

    pub async fn invoke_with(&self, args: &[DynSolValue], options: &CallOptions) -> Result<Invocation> {
        match self {
            Self::Read(callable) => {
                callable
                    .invoke_with(args, options)
                    .await
                    .map(Invocation::Returned)
            }
            Self::Transaction(callable) => {
                callable
                    .invoke_with(args, options)
                    .await
                    .map(Invocation::Submitted)
            }
        }
    }

    pub async fn call(&self, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        match self {
            Self::Read(callable) => callable.call(args).await,
            Self::Transaction(callable) => callable.call(args).await,
        }
    }
}
