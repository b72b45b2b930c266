use std::{
    fmt::Write as _,
    path::PathBuf,
};

use alloy_json_abi::Function;
use alloy_primitives::{
    Address,
    hex,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{
        bail,
        eyre,
    },
};
use serde_json::{
    Value,
    json,
};
use tracing::debug;
use workbench::{
    abi::{
        ContractInterface,
        coerce_values,
        encode_call,
        function_selector,
        is_constant,
        param_types,
    },
    compiler::{
        Compiler,
        SolcCompiler,
    },
    config::DEFAULT_ENV_PATH,
    env::{
        EnvironmentOptions,
        default_environment,
        ensure_environment,
        load_environment,
    },
};

/// What a command prints, in both output modes.
#[derive(Debug)]
pub struct CommandOutput {
    pub text: String,
    pub json: Value,
}

#[derive(Debug, Parser)]
pub struct EnvArgs {
    /// Environment file to create
    #[arg(long, env = "WORKBENCH_ENV_PATH", default_value = DEFAULT_ENV_PATH)]
    pub env_path: PathBuf,
    /// Account funded and marked as the default sender
    #[arg(long, env = "WORKBENCH_FROM")]
    pub from: Option<Address>,
    /// Overwrite an existing file with the default environment
    #[arg(long)]
    pub reset: bool,
}

impl EnvArgs {
    pub fn run(&self) -> Result<CommandOutput> {
        let options = EnvironmentOptions {
            initial_state: self.reset.then(|| default_environment(self.from)),
            default_from: self.from,
        };
        ensure_environment(&options, &self.env_path)?;

        let snapshot = load_environment(&self.env_path)?;
        let default_account = snapshot
            .env
            .default_account()
            .ok_or_else(|| eyre!("{} has no default account", self.env_path.display()))?;

        Ok(CommandOutput {
            text: format!(
                "Environment {} ready, default account {default_account}, {} account(s)",
                self.env_path.display(),
                snapshot.env.accounts.len()
            ),
            json: json!({
                "status": "success",
                "path": self.env_path,
                "default_account": default_account,
                "accounts": snapshot.env.accounts.len(),
            }),
        })
    }
}

#[derive(Debug, Parser)]
pub struct SelectorsArgs {
    /// JSON ABI file
    pub abi: PathBuf,
    /// Contract name used in messages; defaults to the file stem
    #[arg(long)]
    pub name: Option<String>,
}

impl SelectorsArgs {
    pub fn run(&self) -> Result<CommandOutput> {
        let json = std::fs::read_to_string(&self.abi)?;
        let name = self.name.clone().unwrap_or_else(|| {
            self.abi
                .file_stem()
                .map(|stem| stem.to_string_lossy().split('.').next().unwrap_or_default().to_string())
                .unwrap_or_default()
        });
        let interface = ContractInterface::from_json(name, &json)?;

        let collisions = interface.selector_collisions();
        if let Some((selector, first, second)) = collisions.first() {
            bail!(
                "{}: {first} and {second} share selector {selector}",
                interface.name()
            );
        }

        let mut text = String::new();
        let mut entries = Vec::new();
        for function in interface.functions() {
            let selector = function_selector(function);
            let signature = function.signature();
            let constant = is_constant(function);
            let kind = if constant { "constant" } else { "transaction" };
            writeln!(text, "{selector} {signature} {kind}")?;
            entries.push(json!({
                "selector": selector,
                "signature": signature,
                "constant": constant,
            }));
        }

        Ok(CommandOutput {
            text: text.trim_end().to_string(),
            json: json!({
                "status": "success",
                "contract": interface.name(),
                "functions": entries,
            }),
        })
    }
}

#[derive(Debug, Parser)]
pub struct CompileArgs {
    /// Source files, relative to --dir
    #[arg(required = true)]
    pub files: Vec<String>,
    /// Directory the sources live in
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
    /// Solidity compiler binary
    #[arg(long, env = "WORKBENCH_SOLC", default_value = "solc")]
    pub solc: PathBuf,
}

impl CompileArgs {
    pub async fn run(&self) -> Result<CommandOutput> {
        let compiler = SolcCompiler::new(self.solc.clone());
        let output = compiler.compile(&self.dir, &self.files).await?;
        debug!(target: "workbench_cli", sources = output.sources.len(), "Compilation finished");

        let mut text = String::new();
        let mut entries = Vec::new();
        for (name, contract) in &output.contracts {
            let size = contract.bytecode.trim_start_matches("0x").len() / 2;
            writeln!(text, "{name}: {size} bytes")?;
            entries.push(json!({ "name": name, "bytecode_size": size }));
        }

        Ok(CommandOutput {
            text: text.trim_end().to_string(),
            json: json!({
                "status": "success",
                "contracts": entries,
            }),
        })
    }
}

#[derive(Debug, Parser)]
pub struct EncodeArgs {
    /// Function signature, e.g. `transfer(address,uint256)`
    pub signature: String,
    /// Arguments in their human readable form
    pub args: Vec<String>,
}

impl EncodeArgs {
    pub fn run(&self) -> Result<CommandOutput> {
        let calldata = encode_signature(&self.signature, &self.args)?;
        let encoded = hex::encode_prefixed(&calldata);
        Ok(CommandOutput {
            json: json!({ "status": "success", "calldata": encoded }),
            text: encoded,
        })
    }
}

fn encode_signature(signature: &str, args: &[String]) -> Result<Vec<u8>> {
    let function =
        Function::parse(signature).map_err(|e| eyre!("invalid signature {signature}: {e}"))?;
    let types = param_types(&function.inputs)?;
    let values = coerce_values(&types, args)?;
    Ok(encode_call(&function, &values)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use workbench::env::DEFAULT_ACCOUNT;

    #[test]
    fn encode_builds_selector_prefixed_calldata() {
        let calldata = encode_signature(
            "transfer(address,uint256)",
            &["0x000000000000000000000000000000000000000e".to_string(), "100".to_string()],
        )
        .unwrap();

        assert_eq!(&calldata[..4], &hex::decode("a9059cbb").unwrap()[..]);
        assert_eq!(calldata.len(), 4 + 64);
        assert_eq!(calldata[4 + 31], 0x0e);
        assert_eq!(calldata[4 + 63], 100);
    }

    #[test]
    fn encode_rejects_wrong_argument_count() {
        assert!(encode_signature("transfer(address,uint256)", &["1".to_string()]).is_err());
        assert!(encode_signature("not a signature", &[]).is_err());
    }

    #[test]
    fn env_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let args = EnvArgs {
            env_path: dir.path().join("ethereum.json"),
            from: None,
            reset: false,
        };

        let output = args.run().unwrap();
        assert_eq!(output.json["default_account"], json!(DEFAULT_ACCOUNT));
        assert_eq!(output.json["accounts"], 1);
    }

    #[test]
    fn selectors_lists_every_function() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Token.abi.json");
        std::fs::write(
            &path,
            r#"[
                {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
                {"type":"function","name":"totalSupply","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}
            ]"#,
        )
        .unwrap();

        let output = SelectorsArgs { abi: path, name: None }.run().unwrap();
        assert_eq!(output.json["contract"], "Token");
        assert_eq!(output.json["functions"].as_array().unwrap().len(), 2);
        assert!(output.text.contains("0xa9059cbb transfer(address,uint256) transaction"));
        assert!(output.text.contains("totalSupply() constant"));
    }
}
