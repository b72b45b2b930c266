mod cli;
mod commands;

use crate::cli::{
    Cli,
    Commands,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::Report,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let Cli { command, args } = Cli::parse();

    let result = async {
        let output = match command {
            Commands::Env(env) => env.run()?,
            Commands::Selectors(selectors) => selectors.run()?,
            Commands::Compile(compile) => compile.run().await?,
            Commands::Encode(encode) => encode.run()?,
        };
        Ok::<_, Report>(output)
    }
    .await;

    match result {
        Ok(output) if args.json_output() => println!("{}", output.json),
        Ok(output) => println!("{}", output.text),
        Err(err) => {
            if args.json_output() {
                eprintln!(
                    "{}",
                    json!({
                        "status": "error",
                        "error": {
                            "message": err.to_string(),
                        }
                    })
                );
                std::process::exit(1);
            }
            return Err(err);
        }
    }

    Ok(())
}
