//! Command-line host for the bundled workflows.
//!
//! Runs one workflow from start to its outcome (or until the supplied events
//! run out), delivering each `--event` on the instance's event channel
//! followed by one resume pass.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::warn;

use workflow_driver::core::codec::JsonCodec;
use workflow_driver::core::payload::Payload;
use workflow_driver::demo::register_demos;
use workflow_driver::exit_codes;
use workflow_driver::instance::WorkflowInstance;
use workflow_driver::io::config::{DriverConfig, load_config};
use workflow_driver::logging;
use workflow_driver::registry::Registry;
use workflow_driver::runtime::context::Context;

#[derive(Parser)]
#[command(
    name = "workflow-driver",
    version,
    about = "Deterministic workflow execution driver"
)]
struct Cli {
    /// Driver configuration (TOML). Defaults apply when the file is missing.
    #[arg(long, global = true, default_value = "workflow-driver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a registered workflow.
    Run {
        /// Workflow name (see `list`).
        name: String,
        /// Positional workflow input as JSON. Repeatable.
        #[arg(long = "input")]
        inputs: Vec<String>,
        /// External event as JSON, delivered after the first pass. Repeatable.
        #[arg(long = "event")]
        events: Vec<String>,
    },
    /// Print the registered workflow names.
    List,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let mut registry = Registry::new();
    register_demos(&mut registry)?;
    match cli.command {
        Command::Run {
            name,
            inputs,
            events,
        } => cmd_run(&registry, &config, &name, &inputs, &events),
        Command::List => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_run(
    registry: &Registry,
    config: &DriverConfig,
    name: &str,
    inputs: &[String],
    events: &[String],
) -> Result<i32> {
    let inputs = inputs
        .iter()
        .map(|raw| parse_payload(raw))
        .collect::<Result<Vec<_>>>()?;
    let events = events
        .iter()
        .map(|raw| parse_payload(raw))
        .collect::<Result<Vec<_>>>()?;

    let codec = Rc::new(JsonCodec::from_config(config));
    let mut instance = registry.instantiate(name, codec, config)?;
    let ctx = Context::background();

    instance.execute(&ctx, inputs)?;
    let total = events.len();
    for (delivered, event) in events.into_iter().enumerate() {
        if instance.completed() {
            warn!(delivered, total, "workflow completed before all events were delivered");
            break;
        }
        instance.events().send(event).context("deliver event")?;
        instance.continue_execution(&ctx)?;
    }

    let code = report(&instance);
    instance.close(&ctx);
    Ok(code)
}

/// Parse a JSON command-line argument into a payload.
fn parse_payload(raw: &str) -> Result<Payload> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("parse json argument {raw:?}"))?;
    Ok(Payload::encode(&value)?)
}

fn report(instance: &WorkflowInstance) -> i32 {
    if !instance.completed() {
        eprintln!("workflow suspended: waiting for more events");
        return exit_codes::SUSPENDED;
    }
    if let Some(err) = instance.error() {
        eprintln!("workflow failed: {err:#}");
        return exit_codes::FAILED;
    }
    match instance.result() {
        Some(result) => {
            println!("{result}");
            exit_codes::OK
        }
        None => {
            eprintln!("workflow completed without an outcome");
            exit_codes::INVALID
        }
    }
}
