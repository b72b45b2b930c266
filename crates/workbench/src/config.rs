use std::{
    path::PathBuf,
    time::Duration,
};

use alloy_primitives::Address;
use clap::Parser;

use crate::{
    contract::CallOptions,
    env::{
        ChainEnvironment,
        EnvironmentOptions,
    },
    receipt::{
        DEFAULT_POLL_INTERVAL,
        DEFAULT_RECEIPT_TIMEOUT,
    },
    sandbox::DEFAULT_SANDBOX_PORT,
};

pub const DEFAULT_CONTRACTS_DIR: &str = "./contract";
pub const DEFAULT_ENV_PATH: &str = "ethereum.json";
pub const DEFAULT_SUITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Contains the configuration of a workbench.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct WorkbenchConfig {
    /// Directory the contract sources are compiled from
    #[arg(long, env = "WORKBENCH_CONTRACTS_DIR", default_value = DEFAULT_CONTRACTS_DIR)]
    pub contracts_dir: PathBuf,
    /// Path of the environment snapshot the sandbox boots from
    #[arg(long, env = "WORKBENCH_ENV_PATH", default_value = DEFAULT_ENV_PATH)]
    pub env_path: PathBuf,
    /// Default sender of every call and transaction
    #[arg(long, env = "WORKBENCH_FROM")]
    pub from: Option<Address>,
    /// Interval between receipt polls, in milliseconds
    #[arg(long, env = "WORKBENCH_POLL_INTERVAL_MS", default_value = "100")]
    pub poll_interval_ms: u64,
    /// How long to wait for a receipt, in milliseconds
    #[arg(long, env = "WORKBENCH_RECEIPT_TIMEOUT_MS", default_value = "30000")]
    pub receipt_timeout_ms: u64,
    /// Timeout of a whole test suite, in milliseconds
    #[arg(long, env = "WORKBENCH_SUITE_TIMEOUT_MS", default_value = "60000")]
    pub suite_timeout_ms: u64,
    /// Port the sandbox node listens on
    #[arg(long, env = "WORKBENCH_PORT", default_value = "8554")]
    pub port: u16,
    /// Solidity compiler binary
    #[arg(long, env = "WORKBENCH_SOLC", default_value = "solc")]
    pub solc: PathBuf,
    /// Chain state that replaces the persisted snapshot
    #[arg(skip)]
    pub initial_state: Option<ChainEnvironment>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            contracts_dir: PathBuf::from(DEFAULT_CONTRACTS_DIR),
            env_path: PathBuf::from(DEFAULT_ENV_PATH),
            from: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            receipt_timeout_ms: DEFAULT_RECEIPT_TIMEOUT.as_millis() as u64,
            suite_timeout_ms: DEFAULT_SUITE_TIMEOUT.as_millis() as u64,
            port: DEFAULT_SANDBOX_PORT,
            solc: PathBuf::from("solc"),
            initial_state: None,
        }
    }
}

impl WorkbenchConfig {
    pub fn with_contracts_dir(mut self, contracts_dir: impl Into<PathBuf>) -> Self {
        self.contracts_dir = contracts_dir.into();
        self
    }

    pub fn with_env_path(mut self, env_path: impl Into<PathBuf>) -> Self {
        self.env_path = env_path.into();
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_receipt_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval_ms = poll_interval.as_millis() as u64;
        self.receipt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_suite_timeout(mut self, timeout: Duration) -> Self {
        self.suite_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_solc(mut self, solc: impl Into<PathBuf>) -> Self {
        self.solc = solc.into();
        self
    }

    pub fn with_initial_state(mut self, initial_state: ChainEnvironment) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn suite_timeout(&self) -> Duration {
        Duration::from_millis(self.suite_timeout_ms)
    }

    /// Options merged under every call made through the workbench.
    pub fn call_defaults(&self) -> CallOptions {
        CallOptions {
            from: self.from,
            ..Default::default()
        }
    }

    pub fn environment_options(&self) -> EnvironmentOptions {
        EnvironmentOptions {
            initial_state: self.initial_state.clone(),
            default_from: self.from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_defaults_match_default_impl() {
        let parsed = WorkbenchConfig::try_parse_from(["workbench"]).unwrap();
        assert_eq!(parsed, WorkbenchConfig::default());
        assert_eq!(parsed.poll_interval(), Duration::from_millis(100));
        assert_eq!(parsed.receipt_timeout(), Duration::from_secs(30));
        assert_eq!(parsed.suite_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_flag_becomes_call_default() {
        let parsed = WorkbenchConfig::try_parse_from([
            "workbench",
            "--from",
            "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826",
            "--port",
            "9545",
        ])
        .unwrap();

        assert_eq!(parsed.port, 9545);
        assert_eq!(parsed.call_defaults().from, parsed.from);
        assert_eq!(parsed.environment_options().default_from, parsed.from);
    }
}
