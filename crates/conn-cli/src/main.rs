//! # NestConn CLI
//!
//! Builds networks from JSON descriptions and inspects the synapse catalogue.

mod network;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use nestconn::{ConnectionFilter, KernelConfig, ParamScope, SimulationContext};
use nestconn_core::ParamValue;
use network::NetworkDesc;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nestconn")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "NEST-style connection construction for spiking networks", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a network description and report its connections
    Build {
        /// Network description (JSON)
        network: PathBuf,
        /// Kernel configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        threads: Option<usize>,
        #[arg(short, long)]
        seed: Option<u64>,
        /// Write every connection's status as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List synapse models, or show the defaults of one
    Models {
        name: Option<String>,
    },
}

fn log_level(config: &KernelConfig, verbose: u8, quiet: bool) -> log::LevelFilter {
    if quiet {
        return log::LevelFilter::Error;
    }
    match verbose {
        0 => config.verbosity.level_filter(),
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(path: Option<&PathBuf>, threads: Option<usize>, seed: Option<u64>) -> Result<KernelConfig> {
    let mut config = match path {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(threads) = threads {
        config.threads = threads;
    }
    if let Some(seed) = seed {
        config.rng_seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn build(network: PathBuf, config: KernelConfig, output: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(&network)
        .with_context(|| format!("cannot read {}", network.display()))?;
    let desc = NetworkDesc::from_json(&text)?;

    println!("{} {}", "Building network:".green().bold(), network.display());
    let mut ctx = SimulationContext::new(config)?;
    let built = desc.build(&mut ctx)?;

    for (name, nodes) in &built.populations {
        println!(
            "  {:<12} {:>6} nodes  [{}..{}]",
            name.cyan(),
            nodes.len(),
            nodes.first().unwrap_or(0),
            nodes.last().unwrap_or(0)
        );
    }

    let status = ctx.status();
    let all = ctx.get_connections(&ConnectionFilter::all());
    println!();
    println!("{}", "Connections:".green().bold());
    let mut per_model: Vec<(&str, usize)> = Vec::new();
    for model in all.synapse_models() {
        match per_model.iter_mut().find(|(m, _)| *m == model) {
            Some((_, count)) => *count += 1,
            None => per_model.push((model, 1)),
        }
    }
    for (model, count) in &per_model {
        println!("  {:<28} {:>8}", model.cyan(), count);
    }
    println!("  {:<28} {:>8}", "total".bold(), status.connection_count);
    if let (Some(lo), Some(hi)) = (status.min_delay, status.max_delay) {
        println!("  delays {lo} .. {hi} ms on {} threads", status.threads);
    }

    if let Some(path) = output {
        let records = serde_json::to_string_pretty(&all.get_status())?;
        std::fs::write(&path, records).with_context(|| format!("cannot write {}", path.display()))?;
        println!("{} {}", "Wrote".green(), path.display());
    }
    Ok(())
}

fn models(name: Option<String>) -> Result<()> {
    let ctx = SimulationContext::new(KernelConfig::default())?;
    let registry = ctx.registry();
    match name {
        None => {
            println!("{}", "Synapse models:".green().bold());
            for model in registry.names() {
                let schema = registry.lookup(model)?;
                let note = if schema.requires_aux() {
                    " (needs volume transmitter)".yellow().to_string()
                } else {
                    String::new()
                };
                println!("  {}{note}", model.cyan());
            }
        }
        Some(name) => {
            let schema = registry.lookup(&name)?;
            println!("{} {}", "Defaults of".green().bold(), name.cyan());
            for def in &schema.params {
                let scope = match def.scope {
                    ParamScope::PerConnection => "per connection",
                    ParamScope::Common => "common",
                };
                println!("  {:<24} {:>12}  {}", def.name, def.default, scope.dimmed());
            }
            if let Some(ParamValue::Scalar(vt)) = registry.defaults(&name)?.get("vt") {
                println!("  {:<24} {:>12}", "vt", vt);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            network,
            config,
            threads,
            seed,
            output,
        } => {
            let config = load_config(config.as_ref(), threads, seed)?;
            init_logging(log_level(&config, cli.verbose, cli.quiet));
            build(network, config, output)?;
        }

        Commands::Models { name } => {
            init_logging(log_level(&KernelConfig::default(), cli.verbose, cli.quiet));
            models(name)?;
        }
    }

    Ok(())
}
