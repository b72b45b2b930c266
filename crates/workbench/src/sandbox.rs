//! Local chain process the workbench runs against.

use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use alloy_node_bindings::{
    Anvil,
    AnvilInstance,
    NodeError,
};
use alloy_provider::{
    RootProvider,
    ext::AnvilApi,
};
use alloy_transport::TransportError;
use async_trait::async_trait;
use tracing::{
    debug,
    info,
};

use crate::{
    chain::{
        ChainClient,
        ProviderChain,
    },
    env::{
        EnvironmentError,
        load_environment,
    },
};

pub const DEFAULT_SANDBOX_PORT: u16 = 8554;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to spawn sandbox node: {0}")]
    Spawn(#[from] NodeError),
    #[error("Failed to load environment: {0}")]
    Environment(#[from] EnvironmentError),
    #[error("Failed to apply environment to the sandbox: {0}")]
    Setup(#[from] TransportError),
    #[error("Sandbox is already running")]
    AlreadyRunning,
}

/// Lifecycle of the chain tests are run against.
#[async_trait]
pub trait Sandbox: Send + Sync + Debug {
    /// Boots a chain seeded from the snapshot at `env_path`.
    async fn start(&mut self, env_path: &Path) -> Result<Arc<dyn ChainClient>, SandboxError>;

    /// Stops the chain. Stopping a stopped sandbox is a no-op.
    async fn stop(&mut self) -> Result<(), SandboxError>;
}

/// Anvil child process, seeded from the environment snapshot.
///
/// Snapshot accounts are funded and impersonated, so `eth_sendTransaction`
/// from any of them succeeds without a key.
#[derive(Debug)]
pub struct AnvilSandbox {
    port: u16,
    instance: Option<AnvilInstance>,
}

impl AnvilSandbox {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            instance: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.instance.is_some()
    }
}

impl Default for AnvilSandbox {
    fn default() -> Self {
        Self::new(DEFAULT_SANDBOX_PORT)
    }
}

#[async_trait]
impl Sandbox for AnvilSandbox {
    async fn start(&mut self, env_path: &Path) -> Result<Arc<dyn ChainClient>, SandboxError> {
        if self.instance.is_some() {
            return Err(SandboxError::AlreadyRunning);
        }

        let snapshot = load_environment(env_path)?;
        let block = &snapshot.env.block;

        let anvil = Anvil::new()
            .port(self.port)
            .args([
                "--gas-limit".to_string(),
                block.gas_limit.to_string(),
                "--gas-price".to_string(),
                block.gas_price.to_string(),
            ])
            .try_spawn()?;
        let provider = RootProvider::new_http(anvil.endpoint_url());

        provider.anvil_set_coinbase(block.coinbase).await?;
        for (address, account) in &snapshot.env.accounts {
            provider.anvil_set_balance(*address, account.balance).await?;
            provider.anvil_set_nonce(*address, account.nonce).await?;
            debug!(
                target: "workbench::sandbox",
                %address,
                name = %account.name,
                "Seeded account"
            );
        }
        provider.anvil_auto_impersonate_account(true).await?;

        info!(
            target: "workbench::sandbox",
            endpoint = %anvil.endpoint(),
            accounts = snapshot.env.accounts.len(),
            "Sandbox started"
        );
        self.instance = Some(anvil);

        Ok(Arc::new(ProviderChain::new(provider)))
    }

    async fn stop(&mut self) -> Result<(), SandboxError> {
        // Dropping the instance kills the child process.
        if self.instance.take().is_some() {
            info!(target: "workbench::sandbox", port = self.port, "Sandbox stopped");
        }
        Ok(())
    }
}
