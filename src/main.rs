//! vram-planner command-line entry point.
//!
//! Plans a single deployment from a JSON record, inspects the quantization
//! catalog and architecture estimator, or runs the HTTP planning service.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use vram_planner::architecture;
use vram_planner::config::{Cli, Command, Config, QuantCommand};
use vram_planner::input;
use vram_planner::planner::Planner;
use vram_planner::quantization::{self, Priority, RecommendOptions};
use vram_planner::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "vram_planner=debug,tower_http=debug"
    } else {
        "vram_planner=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    // Logs go to stderr so that stdout carries only command output.
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("vram-planner v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Plan {
            input,
            format,
            json,
        } => {
            let record = read_input(&input)?;
            let plan_input = input::normalize(&record, &config.defaults)?;
            let plan = Planner::new(&config)?.plan_with_format(&plan_input, format.into())?;
            if json {
                print_json(&plan)?;
            } else {
                println!("{}", plan.configuration.command);
            }
        }
        Command::Memory { input } => {
            let record = read_input(&input)?;
            let plan_input = input::normalize(&record, &config.defaults)?;
            print_json(&Planner::new(&config)?.memory(&plan_input)?)?;
        }
        Command::Quant { action } => match action {
            QuantCommand::List => print_json(&quantization::catalog())?,
            QuantCommand::Compare { names } => print_json(&quantization::compare(&names)?)?,
            QuantCommand::Recommend {
                vram,
                params,
                batch_size,
                max_seq_len,
                priority,
            } => {
                let options = RecommendOptions {
                    batch_size,
                    max_seq_len,
                    priority: priority.parse::<Priority>()?,
                };
                print_json(&quantization::recommend(vram, params, options)?)?;
            }
        },
        Command::Arch { params } => print_json(&architecture::estimate_detailed(params)?)?,
        Command::Serve { listen } => {
            let listen_addr = listen.unwrap_or_else(|| config.server.listen.clone());
            info!(addr = listen_addr, "Starting server");
            server::run(config, &listen_addr).await?;
        }
    }

    Ok(())
}

/// Read a JSON record from `path`, or from stdin when `path` is `-`.
fn read_input(path: &Path) -> anyhow::Result<serde_json::Value> {
    let data = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input {}", path.display()))?
    };
    serde_json::from_str(&data).context("input is not valid JSON")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
