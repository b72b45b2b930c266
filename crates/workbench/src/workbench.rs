//! Compile, boot and tear down: the outer lifecycle around a [`Harness`].

use std::{
    future::Future,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};

use tracing::{
    debug,
    info,
};

use crate::{
    Result,
    WorkbenchError,
    compiler::{
        Compiler,
        CompilerOutput,
        SolcCompiler,
    },
    config::{
        DEFAULT_CONTRACTS_DIR,
        WorkbenchConfig,
    },
    contract::{
        Artifact,
        ContractFactory,
    },
    env::{
        ensure_environment,
        load_environment,
    },
    harness::Harness,
    mock::{
        PROXY_CONTRACT_NAME,
        PROXY_SOURCE_FILE,
        proxy_source_dir,
    },
    sandbox::{
        AnvilSandbox,
        Sandbox,
    },
};

#[derive(Debug)]
pub struct Workbench {
    config: WorkbenchConfig,
    compiler: Arc<dyn Compiler>,
    sandbox: Box<dyn Sandbox>,
    artifacts: Vec<Artifact>,
    harness: Option<Harness>,
}

impl Workbench {
    /// Workbench backed by `solc` and anvil. The environment file is ensured
    /// right away.
    pub fn new(config: WorkbenchConfig) -> Result<Self> {
        let compiler = Arc::new(SolcCompiler::new(config.solc.clone()));
        let sandbox = Box::new(AnvilSandbox::new(config.port));
        Self::with_backends(config, compiler, sandbox)
    }

    pub fn with_backends(
        config: WorkbenchConfig,
        compiler: Arc<dyn Compiler>,
        sandbox: Box<dyn Sandbox>,
    ) -> Result<Self> {
        ensure_environment(&config.environment_options(), &config.env_path)?;
        Ok(Self {
            config,
            compiler,
            sandbox,
            artifacts: Vec::new(),
            harness: None,
        })
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn harness(&self) -> Option<&Harness> {
        self.harness.as_ref()
    }

    /// Compiles `files` from `dir` together with the bundled proxy.
    ///
    /// User contracts come first in the registration order, the proxy last.
    pub async fn compile(&mut self, files: &[String], dir: &Path) -> Result<&[Artifact]> {
        let mut output = self.compiler.compile(dir, files).await?;
        let proxy_output = self
            .compiler
            .compile(&proxy_source_dir(), &[PROXY_SOURCE_FILE.to_string()])
            .await?;
        output.merge(proxy_output);

        self.artifacts = bind_artifacts(&output)?;
        info!(
            target: "workbench",
            contracts = self.artifacts.len(),
            dir = %dir.display(),
            "Compiled contracts"
        );
        Ok(&self.artifacts)
    }

    /// Boots the sandbox and binds the compiled artifacts to it.
    ///
    /// Without a configured sender, calls come from the environment's default
    /// account, else from the first account the node reports.
    pub async fn start(&mut self) -> Result<Harness> {
        let chain = self.sandbox.start(&self.config.env_path).await?;

        let mut defaults = self.config.call_defaults();
        if defaults.from.is_none() {
            let from = match load_environment(&self.config.env_path)?.env.default_account() {
                Some(account) => Some(account),
                None => chain.accounts().await?.first().copied(),
            };
            debug!(target: "workbench", from = ?from, "Resolved default sender");
            defaults.from = from;
        }

        let harness = Harness::new(chain, &self.artifacts)
            .with_defaults(defaults)
            .with_receipt_timing(self.config.poll_interval(), self.config.receipt_timeout());
        self.harness = Some(harness.clone());
        Ok(harness)
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.harness = None;
        self.sandbox.stop().await?;
        Ok(())
    }

    /// Factory for a compiled contract, bound to the running sandbox.
    pub fn factory(&self, name: &str) -> Result<ContractFactory> {
        let harness = self.harness.as_ref().ok_or(WorkbenchError::NotStarted)?;
        let artifact = self
            .artifacts
            .iter()
            .find(|artifact| artifact.name == name)
            .ok_or_else(|| WorkbenchError::UnknownContract(name.to_string()))?;
        Ok(harness.factory(artifact.clone()))
    }

    /// Compiles `<name>.sol` for every name, starts the sandbox and returns
    /// the running suite.
    pub async fn start_testing<S: AsRef<str>>(mut self, names: &[S]) -> Result<TestSuite> {
        let files: Vec<String> = names
            .iter()
            .map(|name| format!("{}.sol", name.as_ref()))
            .collect();
        let dir = if self.config.contracts_dir.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_CONTRACTS_DIR)
        } else {
            self.config.contracts_dir.clone()
        };

        self.compile(&files, &dir).await?;
        let harness = self.start().await?;

        let name = format!("[{}] Contracts Testing", files.join(", "));
        info!(target: "workbench", suite = %name, "Test suite started");
        Ok(TestSuite {
            name,
            timeout: self.config.suite_timeout(),
            harness,
            workbench: self,
        })
    }
}

fn bind_artifacts(output: &CompilerOutput) -> Result<Vec<Artifact>> {
    let (proxy, user): (Vec<_>, Vec<_>) = output
        .contracts
        .iter()
        .partition(|(name, _)| name.as_str() == PROXY_CONTRACT_NAME);

    user.into_iter()
        .chain(proxy)
        .map(|(name, contract)| {
            debug!(target: "workbench", contract = %name, "Binding artifact");
            Artifact::bind(name, &contract.interface, &contract.bytecode)
        })
        .collect()
}

/// A running workbench with its suite name and timeout.
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    timeout: Duration,
    harness: Harness,
    workbench: Workbench,
}

impl TestSuite {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn harness(&self) -> &Harness {
        &self.harness
    }

    pub fn workbench(&self) -> &Workbench {
        &self.workbench
    }

    pub fn contract(&self, name: &str) -> Result<ContractFactory> {
        self.workbench.factory(name)
    }

    /// Runs one test body under the suite timeout.
    pub async fn run<F, T>(&self, test: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, test)
            .await
            .map_err(|_| {
                WorkbenchError::SuiteTimeout {
                    suite: self.name.clone(),
                    timeout: self.timeout,
                }
            })?
    }

    /// Stops the sandbox.
    pub async fn finish(mut self) -> Result<()> {
        self.workbench.stop().await?;
        info!(target: "workbench", suite = %self.name, "Test suite finished");
        Ok(())
    }
}
