//! Control surface of the bundled `Proxy` contract.

use std::path::PathBuf;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{
    Address,
    Bytes,
};
use alloy_sol_types::{
    SolCall,
    sol,
};

use crate::{
    abi::AbiError,
    contract::FunctionHandle,
};

sol! {
    interface IProxy {
        event Trace(bytes4 indexed selector, bytes data);

        function setMock(bytes key, uint8 mode, address target, bytes data) external;
        function setMockWithArgs(bytes key, uint8 mode, address target, bytes data) external;
        function setTracing(bool enabled) external;
        function tracing() external view returns (bool);
        function touchWritable() external;
    }
}

pub const PROXY_CONTRACT_NAME: &str = "Proxy";
pub const PROXY_SOURCE_FILE: &str = "Proxy.sol";

/// JSON ABI of the bundled proxy, usable without a compiler.
pub const PROXY_ABI: &str = include_str!("../../contracts/Proxy.abi.json");

/// Gas limit attached to every control transaction.
pub const CONTROL_GAS_LIMIT: u64 = 500_000;

/// Directory holding `Proxy.sol`.
pub fn proxy_source_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("contracts")
}

/// What the proxy does with a matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MockMode {
    Forward = 1,
    Return = 2,
}

impl MockMode {
    pub fn from_u8(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(Self::Forward),
            2 => Some(Self::Return),
            _ => None,
        }
    }
}

/// Key a programmed behavior is stored under.
///
/// `Calldata` keys hold the selector followed by the canonical encoding of the
/// arguments. For a fixed function the argument encoding is canonical, so two
/// keys are equal exactly when the calls they describe are equal, dynamic
/// arguments included. The proxy matches them by hash of the whole calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockKey {
    Selector(alloy_primitives::Selector),
    Calldata(Bytes),
}

impl MockKey {
    pub fn new(handle: &FunctionHandle, on_args: Option<&[DynSolValue]>) -> Result<Self, AbiError> {
        match on_args {
            Some(args) => Ok(Self::Calldata(handle.calldata(args)?)),
            None => Ok(Self::Selector(handle.selector())),
        }
    }

    pub fn bytes(&self) -> Bytes {
        match self {
            Self::Selector(selector) => Bytes::copy_from_slice(selector.as_slice()),
            Self::Calldata(calldata) => calldata.clone(),
        }
    }

    /// Calldata of the control call that stores `mode/target/data` under this key.
    pub fn program(&self, mode: MockMode, target: Address, data: Bytes) -> Bytes {
        let key = self.bytes();
        let mode = mode as u8;
        match self {
            Self::Selector(_) => {
                IProxy::setMockCall {
                    key,
                    mode,
                    target,
                    data,
                }
                .abi_encode()
                .into()
            }
            Self::Calldata(_) => {
                IProxy::setMockWithArgsCall {
                    key,
                    mode,
                    target,
                    data,
                }
                .abi_encode()
                .into()
            }
        }
    }
}
