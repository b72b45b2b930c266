//! Positional ABI codec over dynamic Solidity types.
//!
//! Every helper here is pure. Selectors are always derived from the canonical
//! signature through [`selector`], so the bytes used to program a mock and the
//! bytes used to recognise a traced call come from the same place.

mod interface;
pub use interface::{
    ContractInterface,
    EventArg,
    ParsedEvent,
    is_constant,
};

use alloy_dyn_abi::{
    DynSolType,
    DynSolValue,
};
use alloy_json_abi::{
    Function,
    Param,
};
use alloy_primitives::{
    Bytes,
    Selector,
    keccak256,
};

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("Value #{index} does not match type {expected}: got {actual}")]
    TypeMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("Expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("Malformed ABI data: {0}")]
    MalformedData(String),
    #[error("Invalid type {ty}: {source}")]
    InvalidType {
        ty: String,
        #[source]
        source: alloy_dyn_abi::Error,
    },
    #[error("Invalid contract interface JSON: {0}")]
    InvalidInterface(#[from] serde_json::Error),
}

/// Computes the 4-byte selector of a canonical signature such as
/// `transfer(address,uint256)`.
pub fn selector(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    Selector::from_slice(&hash[..4])
}

/// Selector of a function descriptor, computed from its canonical signature.
pub fn function_selector(function: &Function) -> Selector {
    selector(&function.signature())
}

/// Parses a list of Solidity type names.
pub fn parse_types<S: AsRef<str>>(types: &[S]) -> Result<Vec<DynSolType>, AbiError> {
    types
        .iter()
        .map(|ty| {
            DynSolType::parse(ty.as_ref()).map_err(|source| {
                AbiError::InvalidType {
                    ty: ty.as_ref().to_string(),
                    source,
                }
            })
        })
        .collect()
}

/// Resolves the types of a parameter list, tuples included.
pub fn param_types(params: &[Param]) -> Result<Vec<DynSolType>, AbiError> {
    let names: Vec<String> = params
        .iter()
        .map(|param| param.selector_type().into_owned())
        .collect();
    parse_types(&names)
}

/// ABI-encodes `values` as a parameter list, `types[i]` governing `values[i]`.
pub fn encode(types: &[DynSolType], values: &[DynSolValue]) -> Result<Bytes, AbiError> {
    if types.len() != values.len() {
        return Err(AbiError::ArityMismatch {
            expected: types.len(),
            actual: values.len(),
        });
    }

    for (index, (ty, value)) in types.iter().zip(values).enumerate() {
        if !ty.matches(value) {
            return Err(AbiError::TypeMismatch {
                index,
                expected: ty.sol_type_name().into_owned(),
                actual: value
                    .as_type()
                    .map_or_else(|| "unknown".to_string(), |t| t.sol_type_name().into_owned()),
            });
        }
    }

    Ok(DynSolValue::Tuple(values.to_vec()).abi_encode_params().into())
}

/// Decodes a parameter list laid out as `types`.
pub fn decode(types: &[DynSolType], data: &[u8]) -> Result<Vec<DynSolValue>, AbiError> {
    let decoded = DynSolType::Tuple(types.to_vec())
        .abi_decode_params(data)
        .map_err(|e| AbiError::MalformedData(e.to_string()))?;

    match decoded {
        DynSolValue::Tuple(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

/// Builds `selector ++ encode(inputs, args)` for a function descriptor.
pub fn encode_call(function: &Function, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
    let types = param_types(&function.inputs)?;
    let encoded = encode(&types, args)?;

    let mut calldata = Vec::with_capacity(4 + encoded.len());
    calldata.extend_from_slice(function_selector(function).as_slice());
    calldata.extend_from_slice(&encoded);
    Ok(calldata.into())
}

/// Coerces human readable arguments into values of the given types.
pub fn coerce_values<I, S>(types: &[DynSolType], args: I) -> Result<Vec<DynSolValue>, AbiError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<S> = args.into_iter().collect();
    if args.len() != types.len() {
        return Err(AbiError::ArityMismatch {
            expected: types.len(),
            actual: args.len(),
        });
    }

    std::iter::zip(types, args)
        .map(|(ty, arg)| {
            ty.coerce_str(arg.as_ref()).map_err(|source| {
                AbiError::InvalidType {
                    ty: ty.sol_type_name().into_owned(),
                    source,
                }
            })
        })
        .collect()
}
