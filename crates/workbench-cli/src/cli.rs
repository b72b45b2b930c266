use clap::Parser;

use crate::commands::{
    CompileArgs,
    EncodeArgs,
    EnvArgs,
    SelectorsArgs,
};

#[derive(Debug, Parser, Clone, Default)]
pub struct CliArgs {
    /// Print results and errors as JSON
    #[clap(short, long)]
    pub json: bool,
}

impl CliArgs {
    pub fn json_output(&self) -> bool {
        self.json
    }
}

#[derive(Parser)]
#[command(
    name = "workbench",
    version,
    about = "Contract testing workbench: sandbox environments, proxy mocks and ABI tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub args: CliArgs,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    #[command(about = "Create or reset the sandbox environment file")]
    Env(EnvArgs),
    #[command(about = "List the function selectors of an ABI and check for collisions")]
    Selectors(SelectorsArgs),
    #[command(about = "Compile contracts together with the bundled mock proxy")]
    Compile(CompileArgs),
    #[command(about = "ABI-encode calldata for a function signature")]
    Encode(EncodeArgs),
}
