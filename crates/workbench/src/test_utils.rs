//! In-memory chain and fixtures for exercising the workbench without a node.

use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    path::Path,
    sync::{
        Arc,
        Once,
    },
    time::Duration,
};

use alloy_primitives::{
    Address,
    Bytes,
    FixedBytes,
    Selector,
    TxHash,
    TxKind,
    hex,
    keccak256,
};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{
    SolCall,
    SolEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    abi::ContractInterface,
    chain::{
        ChainClient,
        ChainError,
    },
    compiler::{
        CompilationError,
        Compiler,
        CompilerOutput,
    },
    contract::{
        Artifact,
        CallOptions,
    },
    env::DEFAULT_ACCOUNT,
    harness::Harness,
    mock::{
        IProxy,
        MockMode,
        PROXY_ABI,
        PROXY_CONTRACT_NAME,
    },
    receipt::{
        ReceiptLog,
        TransactionReceipt,
    },
    sandbox::{
        Sandbox,
        SandboxError,
    },
};

/// Creation code [`MockChain`] recognises as the proxy.
pub const PROXY_TEST_BYTECODE: &[u8] = b"workbench-test-proxy";

/// Creation code whose deployment [`MockChain`] reverts.
pub const REVERTING_BYTECODE: &[u8] = &[0xfe];

/// Creation code of the sample token artifact.
pub const TOKEN_TEST_BYTECODE: &[u8] = &[0x60, 0x80, 0x60, 0x40];

pub const TOKEN_ABI: &str = r#"[
    {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"constant":true,"payable":false},
    {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"value","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"constant":false,"payable":false},
    {"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"constant":true,"payable":false},
    {"type":"function","name":"lookup","inputs":[{"name":"label","type":"string"}],"outputs":[{"name":"","type":"uint256"}],"constant":true,"payable":false},
    {"type":"function","name":"burn","inputs":[{"name":"value","type":"uint256"}],"outputs":[],"constant":false,"payable":false},
    {"type":"event","name":"Transfer","anonymous":false,"inputs":[{"name":"from","type":"address","indexed":true},{"name":"to","type":"address","indexed":true},{"name":"value","type":"uint256","indexed":false}]}
]"#;

const MAX_CALL_DEPTH: usize = 8;

/// Opt-in test logging: `TEST_TRACE=debug cargo test`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        use tracing_subscriber::{
            filter::filter_fn,
            prelude::*,
        };
        if let Ok(v) = std::env::var("TEST_TRACE") {
            let level = match v.as_str() {
                "false" | "off" => return,
                "true" | "debug" | "on" => tracing::Level::DEBUG,
                "trace" => tracing::Level::TRACE,
                "info" => tracing::Level::INFO,
                "warn" => tracing::Level::WARN,
                "error" => tracing::Level::ERROR,
                _ => return,
            };

            let _ = tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_test_writer())
                .with(filter_fn(move |metadata| metadata.level() <= &level))
                .try_init();
        }
    });
}

/// A call a proxy forwarded while executing a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedCall {
    pub proxy: Address,
    pub target: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
struct MockEntry {
    mode: MockMode,
    target: Address,
    data: Bytes,
}

#[derive(Debug, Clone, Default)]
struct ProxyState {
    tracing: bool,
    selector_mocks: HashMap<Selector, MockEntry>,
    calldata_mocks: HashMap<Bytes, MockEntry>,
}

#[derive(Debug, Clone)]
enum Account {
    Proxy(ProxyState),
    Contract(HashMap<Selector, Bytes>),
}

#[derive(Debug, Default)]
struct ChainState {
    accounts: HashMap<Address, Account>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    transactions: Vec<TransactionRequest>,
    forwarded: Vec<ForwardedCall>,
    tx_count: u64,
    withhold_receipts: bool,
    omit_contract_address: bool,
    rpc_failure: Option<String>,
}

#[derive(Debug, Default)]
struct Execution {
    success: bool,
    output: Bytes,
    logs: Vec<ReceiptLog>,
}

impl Execution {
    fn success(output: Bytes) -> Self {
        Self {
            success: true,
            output,
            logs: Vec::new(),
        }
    }

    fn revert() -> Self {
        Self::default()
    }
}

/// In-memory [`ChainClient`].
///
/// Every transaction is mined instantly. Contracts deployed with
/// [`PROXY_TEST_BYTECODE`] behave like the bundled proxy: control calls
/// program it, other calls are answered from the programmed entries and
/// traced when tracing is armed. Any other contract answers from the canned
/// responses registered with [`MockChain::set_response`].
#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    /// Mined transactions stay pending forever.
    pub fn set_withhold_receipts(&self, withhold: bool) {
        self.state.lock().withhold_receipts = withhold;
    }

    /// Every RPC fails with `message` while set.
    pub fn set_rpc_failure(&self, message: Option<String>) {
        self.state.lock().rpc_failure = message;
    }

    /// Deployment receipts come back without a contract address.
    pub fn set_omit_contract_address(&self, omit: bool) {
        self.state.lock().omit_contract_address = omit;
    }

    /// Makes the plain contract at `address` answer `selector` with `output`.
    pub fn set_response(&self, address: Address, selector: Selector, output: Bytes) {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .entry(address)
            .or_insert_with(|| Account::Contract(HashMap::new()));
        if let Account::Contract(responses) = account {
            responses.insert(selector, output);
        }
    }

    /// Calls forwarded by proxies, in execution order.
    pub fn forwarded(&self) -> Vec<ForwardedCall> {
        self.state.lock().forwarded.clone()
    }

    /// Reads `to` the way a contract does through STATICCALL, e.g. a view
    /// function of the contract under test querying a dependency.
    pub fn static_call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        let frame = Frame {
            is_static: true,
            ..Frame::top(false)
        };
        let execution = execute(&mut state, to, &input, frame);
        if execution.success {
            Ok(execution.output)
        } else {
            Err(ChainError::Rejected("execution reverted".to_string()))
        }
    }

    /// Every transaction request received, in submission order.
    pub fn transactions(&self) -> Vec<TransactionRequest> {
        self.state.lock().transactions.clone()
    }

    fn check_failure(state: &ChainState) -> Result<(), ChainError> {
        match &state.rpc_failure {
            Some(message) => Err(ChainError::Rejected(message.clone())),
            None => Ok(()),
        }
    }
}

fn request_input(request: &TransactionRequest) -> Bytes {
    request.input.input().cloned().unwrap_or_default()
}

fn deploy(state: &mut ChainState, code: &[u8], address: Address) -> bool {
    if code.starts_with(REVERTING_BYTECODE) {
        return false;
    }
    let account = match code.strip_prefix(PROXY_TEST_BYTECODE) {
        Some(constructor_args) => {
            Account::Proxy(ProxyState {
                tracing: constructor_args.last().is_some_and(|flag| *flag != 0),
                ..Default::default()
            })
        }
        None => Account::Contract(HashMap::new()),
    };
    state.accounts.insert(address, account);
    true
}

/// Execution context of one call frame.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Part of a mined transaction; state changes persist.
    mined: bool,
    /// Entered through STATICCALL; writes and logs revert.
    is_static: bool,
    depth: usize,
}

impl Frame {
    fn top(mined: bool) -> Self {
        Self {
            mined,
            is_static: false,
            depth: 0,
        }
    }

    fn nested(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }
}

fn execute(state: &mut ChainState, to: Address, input: &Bytes, frame: Frame) -> Execution {
    if frame.depth > MAX_CALL_DEPTH {
        return Execution::revert();
    }
    let selector = (input.len() >= 4).then(|| Selector::from_slice(&input[..4]));

    match state.accounts.get(&to).cloned() {
        None => Execution::success(Bytes::new()),
        Some(Account::Contract(responses)) => {
            let output = selector
                .and_then(|selector| responses.get(&selector).cloned())
                .unwrap_or_default();
            Execution::success(output)
        }
        Some(Account::Proxy(proxy)) => execute_proxy(state, to, proxy, input, selector, frame),
    }
}

fn execute_proxy(
    state: &mut ChainState,
    address: Address,
    mut proxy: ProxyState,
    input: &Bytes,
    selector: Option<Selector>,
    frame: Frame,
) -> Execution {
    let selector_bytes = selector.map(|selector| selector.0);
    if selector_bytes == Some(IProxy::tracingCall::SELECTOR) {
        return Execution::success(IProxy::tracingCall::abi_encode_returns(&proxy.tracing).into());
    }

    let control = if selector_bytes == Some(IProxy::setMockCall::SELECTOR) {
        IProxy::setMockCall::abi_decode(input).ok().and_then(|call| {
            let mode = MockMode::from_u8(call.mode)?;
            (call.key.len() == 4).then(|| {
                proxy.selector_mocks.insert(
                    Selector::from_slice(&call.key),
                    MockEntry {
                        mode,
                        target: call.target,
                        data: call.data,
                    },
                );
            })
        })
    } else if selector_bytes == Some(IProxy::setMockWithArgsCall::SELECTOR) {
        IProxy::setMockWithArgsCall::abi_decode(input)
            .ok()
            .and_then(|call| {
                let mode = MockMode::from_u8(call.mode)?;
                (call.key.len() >= 4).then(|| {
                    proxy.calldata_mocks.insert(
                        call.key,
                        MockEntry {
                            mode,
                            target: call.target,
                            data: call.data,
                        },
                    );
                })
            })
    } else if selector_bytes == Some(IProxy::setTracingCall::SELECTOR) {
        IProxy::setTracingCall::abi_decode(input)
            .ok()
            .map(|call| proxy.tracing = call.enabled)
    } else if selector_bytes == Some(IProxy::touchWritableCall::SELECTOR) {
        Some(())
    } else {
        return execute_fallback(state, address, &proxy, input, selector, frame);
    };

    match control {
        // Every control function writes storage.
        Some(()) if !frame.is_static => {
            if frame.mined {
                state.accounts.insert(address, Account::Proxy(proxy));
            }
            Execution::success(Bytes::new())
        }
        _ => Execution::revert(),
    }
}

fn execute_fallback(
    state: &mut ChainState,
    address: Address,
    proxy: &ProxyState,
    input: &Bytes,
    selector: Option<Selector>,
    frame: Frame,
) -> Execution {
    let mut logs = Vec::new();
    if proxy.tracing && !frame.is_static {
        let trace = IProxy::Trace {
            selector: FixedBytes::from(selector.unwrap_or_default().0),
            data: input.clone(),
        };
        logs.push(ReceiptLog::new(address, trace.encode_log_data()));
    }

    let entry = proxy
        .calldata_mocks
        .get(input)
        .or_else(|| selector.and_then(|selector| proxy.selector_mocks.get(&selector)))
        .cloned();

    let mut execution = match entry {
        None => Execution::success(Bytes::new()),
        Some(MockEntry {
            mode: MockMode::Return,
            data,
            ..
        }) => Execution::success(data),
        Some(MockEntry {
            mode: MockMode::Forward,
            target,
            data,
        }) => {
            let payload = if data.is_empty() { input.clone() } else { data };
            if frame.mined {
                state.forwarded.push(ForwardedCall {
                    proxy: address,
                    target,
                    data: payload.clone(),
                });
            }
            execute(state, target, &payload, frame.nested())
        }
    };

    if execution.success {
        logs.append(&mut execution.logs);
        execution.logs = logs;
    }
    execution
}

#[async_trait]
impl ChainClient for MockChain {
    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Self::check_failure(&self.state.lock())?;
        Ok(vec![DEFAULT_ACCOUNT])
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes, ChainError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        let Some(TxKind::Call(to)) = request.to else {
            return Ok(Bytes::new());
        };
        let execution = execute(&mut state, to, &request_input(&request), Frame::top(false));
        if execution.success {
            Ok(execution.output)
        } else {
            Err(ChainError::Rejected("execution reverted".to_string()))
        }
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        state.tx_count += 1;
        let tx_count = state.tx_count;
        let tx_hash = keccak256(tx_count.to_be_bytes());
        let from = request.from.unwrap_or(DEFAULT_ACCOUNT);
        let input = request_input(&request);

        let (status, contract_address, logs) = match request.to {
            Some(TxKind::Call(to)) => {
                let execution = execute(&mut state, to, &input, Frame::top(true));
                (execution.success, None, execution.logs)
            }
            _ => {
                let address = from.create(tx_count);
                let deployed = deploy(&mut state, &input, address);
                let contract_address =
                    (deployed && !state.omit_contract_address).then_some(address);
                (deployed, contract_address, Vec::new())
            }
        };

        state.transactions.push(request);
        state.receipts.insert(
            tx_hash,
            TransactionReceipt {
                transaction_hash: tx_hash,
                block_number: Some(tx_count),
                status,
                contract_address,
                gas_used: 21_000,
                logs,
            },
        );
        Ok(tx_hash)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let state = self.state.lock();
        Self::check_failure(&state)?;
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(&tx_hash).cloned())
    }
}

/// [`Sandbox`] handing out a shared [`MockChain`].
#[derive(Debug, Default)]
pub struct MockSandbox {
    chain: MockChain,
    running: bool,
}

impl MockSandbox {
    pub fn new(chain: MockChain) -> Self {
        Self {
            chain,
            running: false,
        }
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn start(&mut self, _env_path: &Path) -> Result<Arc<dyn ChainClient>, SandboxError> {
        if self.running {
            return Err(SandboxError::AlreadyRunning);
        }
        self.running = true;
        Ok(Arc::new(self.chain.clone()))
    }

    async fn stop(&mut self) -> Result<(), SandboxError> {
        self.running = false;
        Ok(())
    }
}

/// [`Compiler`] answering from canned outputs keyed by file name.
#[derive(Debug, Default)]
pub struct FixtureCompiler {
    outputs: BTreeMap<String, CompilerOutput>,
}

impl FixtureCompiler {
    pub fn with_output(mut self, file: &str, output: CompilerOutput) -> Self {
        self.outputs.insert(file.to_string(), output);
        self
    }

    /// Knows `Token.sol` and the bundled proxy.
    pub fn sample() -> Self {
        let contract = |abi: &str, bytecode: &[u8]| {
            crate::compiler::CompiledContract {
                interface: abi.to_string(),
                bytecode: hex::encode(bytecode),
            }
        };
        let single = |name: &str, abi: &str, bytecode: &[u8]| {
            CompilerOutput {
                contracts: BTreeMap::from([(name.to_string(), contract(abi, bytecode))]),
                sources: BTreeMap::new(),
            }
        };

        Self::default()
            .with_output("Token.sol", single("Token", TOKEN_ABI, TOKEN_TEST_BYTECODE))
            .with_output(
                crate::mock::PROXY_SOURCE_FILE,
                single(PROXY_CONTRACT_NAME, PROXY_ABI, PROXY_TEST_BYTECODE),
            )
    }
}

#[async_trait]
impl Compiler for FixtureCompiler {
    async fn compile(&self, _dir: &Path, files: &[String]) -> Result<CompilerOutput, CompilationError> {
        let mut merged = CompilerOutput::default();
        for file in files {
            let output = self
                .outputs
                .get(file)
                .ok_or_else(|| CompilationError::CompilationFailed(format!("{file}: not found")))?;
            merged.merge(output.clone());
        }
        Ok(merged)
    }
}

pub fn sample_token_interface() -> ContractInterface {
    ContractInterface::from_json("Token", TOKEN_ABI).expect("valid token ABI")
}

pub fn token_artifact() -> Artifact {
    Artifact::bind("Token", TOKEN_ABI, &hex::encode(TOKEN_TEST_BYTECODE)).expect("valid token artifact")
}

pub fn proxy_artifact() -> Artifact {
    Artifact::bind(PROXY_CONTRACT_NAME, PROXY_ABI, &hex::encode(PROXY_TEST_BYTECODE))
        .expect("valid proxy artifact")
}

/// Harness over a fresh [`MockChain`] with the token and proxy registered.
pub fn mock_harness() -> (MockChain, Harness) {
    init_test_tracing();
    let chain = MockChain::default();
    let harness = Harness::new(Arc::new(chain.clone()), &[token_artifact(), proxy_artifact()])
        .with_defaults(CallOptions::from(DEFAULT_ACCOUNT))
        .with_receipt_timing(Duration::from_millis(1), Duration::from_secs(2));
    (chain, harness)
}
