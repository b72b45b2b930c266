//! Compiled artifacts, deployed contracts and the factory that links them.

mod callable;
pub use callable::{
    Callable,
    FunctionHandle,
    Invocation,
    ReadCallable,
    TransactionCallable,
};

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_network::TransactionBuilder;
use alloy_primitives::{
    Address,
    Bytes,
    U256,
    hex,
};
use alloy_rpc_types::TransactionRequest;
use tracing::info;

use crate::{
    Result,
    WorkbenchError,
    abi::{
        self,
        AbiError,
        ContractInterface,
    },
    harness::Harness,
    mock::{
        MockOptions,
        MockProxyInstance,
    },
};

/// Default transaction options merged under every call a contract makes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub from: Option<Address>,
    pub gas: Option<u64>,
    pub value: Option<U256>,
}

impl CallOptions {
    pub fn from(from: Address) -> Self {
        Self {
            from: Some(from),
            ..Default::default()
        }
    }

    /// Layers `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(&self, overrides: &Self) -> Self {
        Self {
            from: overrides.from.or(self.from),
            gas: overrides.gas.or(self.gas),
            value: overrides.value.or(self.value),
        }
    }

    /// Fills in the fields `request` leaves unset.
    pub fn apply(&self, mut request: TransactionRequest) -> TransactionRequest {
        if let (None, Some(from)) = (request.from, self.from) {
            request = request.with_from(from);
        }
        if let (None, Some(gas)) = (request.gas, self.gas) {
            request = request.with_gas_limit(gas);
        }
        if let (None, Some(value)) = (request.value, self.value) {
            request = request.with_value(value);
        }
        request
    }
}

/// A compiled contract: its interface and creation bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub interface: Arc<ContractInterface>,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Binds a compiled contract from its JSON ABI and hex creation code.
    pub fn bind(name: &str, abi_json: &str, unlinked_binary: &str) -> Result<Self> {
        let bytecode = hex::decode(unlinked_binary.trim_start_matches("0x"))
            .map_err(|e| AbiError::MalformedData(format!("bytecode of {name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            interface: Arc::new(ContractInterface::from_json(name, abi_json)?),
            bytecode: bytecode.into(),
        })
    }
}

/// A contract address bound to an interface, with one callable per function.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    address: Address,
    interface: Arc<ContractInterface>,
    members: Vec<Callable>,
}

impl DeployedContract {
    /// Builds the member table. No transactions are issued.
    pub fn new(
        interface: Arc<ContractInterface>,
        address: Address,
        harness: &Harness,
    ) -> Result<Self> {
        let members = interface
            .functions()
            .map(|function| {
                FunctionHandle::new(function.clone(), address, harness.clone()).map(Callable::new)
            })
            .collect::<Result<Vec<_>, AbiError>>()?;

        Ok(Self {
            address,
            interface,
            members,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        self.interface.name()
    }

    pub fn interface(&self) -> &Arc<ContractInterface> {
        &self.interface
    }

    pub fn members(&self) -> &[Callable] {
        &self.members
    }

    /// Looks a member up by bare name (first overload) or by full signature.
    pub fn function(&self, name_or_signature: &str) -> Result<&Callable> {
        let by_signature = name_or_signature.contains('(');
        self.members
            .iter()
            .find(|member| {
                if by_signature {
                    member.signature() == name_or_signature
                } else {
                    member.name() == name_or_signature
                }
            })
            .ok_or_else(|| {
                WorkbenchError::UnknownFunction {
                    contract: self.name().to_string(),
                    function: name_or_signature.to_string(),
                }
            })
    }

    pub async fn invoke(&self, function: &str, args: &[DynSolValue]) -> Result<Invocation> {
        self.function(function)?.invoke(args).await
    }

    pub async fn call(&self, function: &str, args: &[DynSolValue]) -> Result<Vec<DynSolValue>> {
        self.function(function)?.call(args).await
    }
}

/// How a factory should instantiate its contract.
#[derive(Debug, Clone)]
pub enum Instantiation {
    /// Deploy the contract's own bytecode with the given constructor arguments.
    Real { args: Vec<DynSolValue> },
    /// Deploy the generic proxy and bind this contract's interface to it.
    Mock(MockOptions),
}

#[derive(Debug, Clone)]
pub enum Deployed {
    Real(DeployedContract),
    Mock(MockProxyInstance),
}

/// Deploys or binds one compiled contract against a harness.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    artifact: Artifact,
    harness: Harness,
}

impl ContractFactory {
    pub fn new(artifact: Artifact, harness: Harness) -> Self {
        Self { artifact, harness }
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn interface(&self) -> &Arc<ContractInterface> {
        &self.artifact.interface
    }

    pub async fn instantiate(&self, instantiation: Instantiation) -> Result<Deployed> {
        match instantiation {
            Instantiation::Real { args } => {
                let creation_code = self.creation_code(&args)?;
                let address = self
                    .harness
                    .deploy_code(&self.artifact.name, creation_code)
                    .await?;
                info!(
                    target: "workbench::contract",
                    contract = %self.artifact.name,
                    %address,
                    "Deployed contract"
                );
                Ok(Deployed::Real(self.at(address)?))
            }
            Instantiation::Mock(options) => {
                let mock =
                    MockProxyInstance::deploy(self.artifact.interface.clone(), &self.harness, options)
                        .await?;
                Ok(Deployed::Mock(mock))
            }
        }
    }

    pub async fn deploy(&self, args: Vec<DynSolValue>) -> Result<DeployedContract> {
        match self.instantiate(Instantiation::Real { args }).await? {
            Deployed::Real(contract) => Ok(contract),
            Deployed::Mock(mock) => Ok(mock.into_contract()),
        }
    }

    pub async fn new_mock(&self, options: MockOptions) -> Result<MockProxyInstance> {
        match self.instantiate(Instantiation::Mock(options)).await? {
            Deployed::Mock(mock) => Ok(mock),
            Deployed::Real(contract) => {
                Err(WorkbenchError::DeploymentFailed {
                    contract: contract.name().to_string(),
                    reason: "expected a proxy deployment".to_string(),
                })
            }
        }
    }

    /// Binds the interface to an existing address without deploying anything.
    pub fn at(&self, address: Address) -> Result<DeployedContract> {
        DeployedContract::new(self.artifact.interface.clone(), address, &self.harness)
    }

    fn creation_code(&self, args: &[DynSolValue]) -> Result<Bytes> {
        let types = match self.artifact.interface.abi().constructor() {
            Some(constructor) => abi::param_types(&constructor.inputs)?,
            None => Vec::new(),
        };
        let encoded = abi::encode(&types, args)?;

        let mut code = self.artifact.bytecode.to_vec();
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }
}
