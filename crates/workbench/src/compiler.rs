//! Solidity compilation through a local `solc` binary.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    path::{
        Path,
        PathBuf,
    },
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{
    debug,
    error,
};

#[derive(Debug, thiserror::Error)]
pub enum CompilationError {
    #[error("Compilation failed: {0}")]
    CompilationFailed(String),

    #[error("Missing bytecode for contract {0}")]
    MissingBytecode(String),

    #[error("Missing ABI for contract {0}")]
    MissingAbi(String),

    #[error("Invalid JSON output: missing 'contracts' object")]
    InvalidJsonOutput,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One compiled contract, as the compiler reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContract {
    /// JSON ABI text.
    pub interface: String,
    /// Hex creation code, without `0x`.
    pub bytecode: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerOutput {
    /// Keyed by bare contract name.
    pub contracts: BTreeMap<String, CompiledContract>,
    pub sources: BTreeMap<String, Value>,
}

impl CompilerOutput {
    /// Adds `other`'s entries, replacing same-named ones.
    pub fn merge(&mut self, other: CompilerOutput) {
        self.contracts.extend(other.contracts);
        self.sources.extend(other.sources);
    }
}

/// Turns source files into ABIs and bytecode.
#[async_trait]
pub trait Compiler: Send + Sync + Debug {
    async fn compile(&self, dir: &Path, files: &[String]) -> Result<CompilerOutput, CompilationError>;
}

/// Runs a local `solc` from the source directory and reads its
/// `--combined-json abi,bin` output.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    solc: PathBuf,
}

impl SolcCompiler {
    pub fn new(solc: impl Into<PathBuf>) -> Self {
        Self { solc: solc.into() }
    }

    /// Metadata hashes are left out of the bytecode; file names come last.
    fn command_args(files: &[String]) -> Vec<String> {
        let mut args: Vec<String> = [
            "--combined-json",
            "abi,bin",
            "--metadata-hash",
            "none",
            "--base-path",
            ".",
        ]
        .map(String::from)
        .into();
        args.extend(files.iter().cloned());
        args
    }
}

impl Default for SolcCompiler {
    fn default() -> Self {
        Self::new("solc")
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile(&self, dir: &Path, files: &[String]) -> Result<CompilerOutput, CompilationError> {
        let cmd_args = Self::command_args(files);

        debug!(
            target: "workbench::compiler",
            dir = %dir.display(),
            ?cmd_args,
            "Running solc"
        );
        let output = Command::new(&self.solc)
            .args(&cmd_args)
            .current_dir(dir)
            .output()
            .await?;

        if !output.status.success() {
            let logs = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(target: "workbench::compiler", "Compilation failed: {}", logs);
            return Err(CompilationError::CompilationFailed(logs));
        }

        let compiled = parse_combined_json(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            target: "workbench::compiler",
            contracts = compiled.contracts.len(),
            "Finished Solidity compilation"
        );
        Ok(compiled)
    }
}

/// Parses `solc --combined-json abi,bin` output.
///
/// `path/File.sol:Name` keys are reduced to `Name`. The ABI may be embedded
/// either as JSON text (older compilers) or as a JSON array.
pub fn parse_combined_json(json_output: &str) -> Result<CompilerOutput, CompilationError> {
    let output: Value = serde_json::from_str(json_output)?;

    let contracts = output["contracts"]
        .as_object()
        .ok_or(CompilationError::InvalidJsonOutput)?;

    let mut compiled = CompilerOutput::default();
    for (key, contract) in contracts {
        let name = key.rsplit(':').next().unwrap_or(key).to_string();

        let interface = match &contract["abi"] {
            Value::String(text) => text.clone(),
            abi @ Value::Array(_) => serde_json::to_string(abi)?,
            _ => return Err(CompilationError::MissingAbi(name)),
        };
        let bytecode = contract["bin"]
            .as_str()
            .ok_or_else(|| CompilationError::MissingBytecode(name.clone()))?
            .to_string();

        compiled.contracts.insert(
            name,
            CompiledContract {
                interface,
                bytecode,
            },
        );
    }

    if let Some(sources) = output["sources"].as_object() {
        compiled.sources = sources
            .iter()
            .map(|(path, source)| (path.clone(), source.clone()))
            .collect();
    }

    Ok(compiled)
}
