use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::gufunc::GufuncState;
use crate::logging;
use crate::runtime::jit::ElementwiseKey;
use gufunc_sig::parse_signature;

#[derive(Parser, Debug)]
#[command(name = "dyngufunc", version, about = "Inspect gufunc signatures and persisted gufunc state")]
pub struct GufuncCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parses a dimension signature and prints its operand core ranks.
    Signature { text: String },
    /// Prints the specializations recorded in a persisted state file.
    Inspect { path: PathBuf },
}

impl GufuncCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

pub fn run() -> Result<()> {
    logging::init();
    let cli = GufuncCli::parse();
    match cli.command() {
        Command::Signature { text } => handle_signature(text),
        Command::Inspect { path } => handle_inspect(path),
    }
}

fn handle_signature(text: &str) -> Result<()> {
    let sig = match parse_signature(text) {
        Ok(sig) => sig,
        Err(err) => {
            eprint!("{}", err.render());
            bail!("signature parsing failed");
        }
    };

    println!("{} {}", "signature".green().bold(), sig);
    for (index, core) in sig.inputs().iter().enumerate() {
        println!("  input {index}: ({}) rank {}", core.join(","), core.len());
    }
    println!("  output: ({}) rank {}", sig.output().join(","), sig.output_rank());
    let unbound = sig.unbound_output_dims();
    if !unbound.is_empty() {
        println!(
            "{} output dimensions not bound by any input: {}",
            "warning".yellow().bold(),
            unbound.join(", ")
        );
    }
    Ok(())
}

fn handle_inspect(path: &Path) -> Result<()> {
    let state = GufuncState::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    debug!(path = %path.display(), "loaded gufunc state");
    let sig = parse_signature(&state.signature)?;

    println!("{} {}", "kernel".green().bold(), state.kernel);
    println!("  signature: {}", state.signature);
    println!("  dynamic: {}  frozen: {}", state.is_dynamic, state.frozen);
    println!("  identity: {:?}", state.identity);
    println!("{} {}", "specializations".bold(), state.typesigs.len());
    for typesig in &state.typesigs {
        let key = ElementwiseKey::new(typesig.elementwise_types()?);
        println!("  {}  {}", key.loop_code(sig.nin()).cyan(), typesig);
    }
    Ok(())
}
