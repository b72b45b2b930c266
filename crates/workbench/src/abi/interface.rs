use alloy_dyn_abi::{
    DecodedEvent,
    DynSolValue,
    EventExt,
};
use alloy_json_abi::{
    Event,
    Function,
    JsonAbi,
    StateMutability,
};
use alloy_primitives::{
    LogData,
    Selector,
};

use super::{
    AbiError,
    function_selector,
};

/// Returns true for functions that can be answered by a read, without a transaction.
pub fn is_constant(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::Pure | StateMutability::View
    )
}

/// A compiled contract's ABI, tagged with the contract name it was compiled under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInterface {
    name: String,
    abi: JsonAbi,
}

impl ContractInterface {
    pub fn new(name: impl Into<String>, abi: JsonAbi) -> Self {
        Self {
            name: name.into(),
            abi,
        }
    }

    /// Parses a JSON ABI. Legacy `constant`/`payable` flags are accepted.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, AbiError> {
        Ok(Self::new(name, serde_json::from_str(json)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.abi.functions()
    }

    /// Looks a function up by bare name (first overload) or by full signature.
    pub fn function(&self, name_or_signature: &str) -> Option<&Function> {
        if name_or_signature.contains('(') {
            return self
                .functions()
                .find(|function| function.signature() == name_or_signature);
        }
        self.abi
            .function(name_or_signature)
            .and_then(|overloads| overloads.first())
    }

    pub fn function_by_selector(&self, selector: Selector) -> Option<&Function> {
        self.functions()
            .find(|function| function_selector(function) == selector)
    }

    /// Pairs of functions in this interface that hash to the same selector.
    pub fn selector_collisions(&self) -> Vec<(Selector, String, String)> {
        let functions: Vec<_> = self
            .functions()
            .map(|function| (function_selector(function), function.signature()))
            .collect();

        let mut collisions = Vec::new();
        for (i, (selector, signature)) in functions.iter().enumerate() {
            for (other_selector, other_signature) in &functions[i + 1..] {
                if selector == other_selector && signature != other_signature {
                    collisions.push((*selector, signature.clone(), other_signature.clone()));
                }
            }
        }
        collisions
    }

    /// Tries every event of this interface against a raw log.
    pub fn decode_log(&self, log: &LogData) -> Option<ParsedEvent> {
        let topic0 = log.topics().first();
        self.abi
            .events()
            .filter(|event| event.anonymous || topic0 == Some(&event.selector()))
            .find_map(|event| {
                event
                    .decode_log(log)
                    .ok()
                    .map(|decoded| ParsedEvent::from_decoded(event, decoded))
            })
    }
}

/// A named event argument.
#[derive(Debug, Clone, PartialEq)]
pub struct EventArg {
    pub name: String,
    pub value: DynSolValue,
}

/// An event decoded out of a receipt log.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub event: String,
    pub args: Vec<EventArg>,
}

impl ParsedEvent {
    fn from_decoded(event: &Event, decoded: DecodedEvent) -> Self {
        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();

        let args = event
            .inputs
            .iter()
            .filter_map(|input| {
                let value = if input.indexed {
                    indexed.next()
                } else {
                    body.next()
                }?;
                Some(EventArg {
                    name: input.name.clone(),
                    value,
                })
            })
            .collect();

        Self {
            event: event.name.clone(),
            args,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&DynSolValue> {
        self.args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }
}
