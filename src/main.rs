//! AEGIS DNS Shield
//!
//! Command line front end for the inline DNS flood shield.
//!
//! ## Usage
//!
//! ```bash
//! # Drive a synthetic flood through the shield and report what it did
//! aegis-dns-shield simulate --attackers 2 --clients 20 --epochs 5
//!
//! # Same, with a custom configuration
//! aegis-dns-shield simulate --config shield.toml
//!
//! # Write the default configuration
//! aegis-dns-shield init-config --output shield.toml
//!
//! # Validate a configuration file
//! aegis-dns-shield check-config --config shield.toml
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aegis_dns_shield::simulate::{run_scenario, FloodScenario, SimulationOutcome};
use aegis_dns_shield::ShieldConfig;

#[derive(Parser)]
#[command(name = "aegis-dns-shield")]
#[command(author = "AEGIS Team")]
#[command(version = "0.1.0")]
#[command(about = "AEGIS inline DNS flood shield", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a synthetic query flood through an in-process shield
    Simulate {
        /// Path to configuration file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of flooding sources
        #[arg(long, default_value = "1")]
        attackers: u8,

        /// Queries per epoch from each flooding source
        #[arg(long, default_value = "200")]
        attack_rate: u32,

        /// Number of well-behaved sources
        #[arg(long, default_value = "10")]
        clients: u8,

        /// Queries per epoch from each well-behaved source
        #[arg(long, default_value = "1")]
        client_rate: u32,

        /// Number of epochs to run
        #[arg(short, long, default_value = "5")]
        epochs: u32,

        /// Resolver address the queries are sent to
        #[arg(long, default_value = "192.0.2.53")]
        resolver: Ipv4Addr,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Evaluate each epoch immediately instead of waiting for the worker
        #[arg(long)]
        fast: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "shield.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Path to configuration file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))?;

    match cli.command {
        Commands::Simulate {
            config,
            attackers,
            attack_rate,
            clients,
            client_rate,
            epochs,
            resolver,
            seed,
            fast,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let scenario = FloodScenario {
                attackers,
                attacker_queries_per_epoch: attack_rate,
                clients,
                client_queries_per_epoch: client_rate,
                epochs,
                resolver,
                seed,
                realtime: !fast,
            };
            simulate(config, scenario, json).await?;
        }
        Commands::InitConfig { output, force } => {
            init_config(&output, force)?;
        }
        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ShieldConfig> {
    let config = match path {
        Some(path) => ShieldConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ShieldConfig::default(),
    };
    config.validate().context("invalid shield configuration")?;
    Ok(config)
}

async fn simulate(config: ShieldConfig, scenario: FloodScenario, json: bool) -> Result<()> {
    if !json {
        print_banner(&config, &scenario);
    }

    let outcome = tokio::select! {
        outcome = run_scenario(config, &scenario) => outcome.context("simulation failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            // Dropping the scenario future drops the shield, which deregisters
            // its hook and stops the worker
            warn!("Simulation interrupted");
            println!("{}", "Simulation interrupted".yellow());
            return Ok(());
        }
    };

    if json {
        let rendered = serde_json::to_string_pretty(&outcome).context("failed to encode outcome")?;
        println!("{}", rendered);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

fn print_banner(config: &ShieldConfig, scenario: &FloodScenario) {
    println!(
        "{}",
        "╔════════════════════════════════════════════╗".bright_cyan()
    );
    println!(
        "{}",
        "║   AEGIS DNS Shield                        ║".bright_cyan()
    );
    println!(
        "{}",
        "║   UDP Query Flood Simulation              ║".bright_cyan()
    );
    println!(
        "{}",
        "╚════════════════════════════════════════════╝".bright_cyan()
    );
    println!();
    println!(
        "  Window: {} samples, threshold: {} per epoch, epoch: {}ms",
        config.window_size.to_string().bright_white(),
        config.threshold.to_string().bright_green(),
        config.epoch_ms.to_string().bright_white()
    );
    println!(
        "  Attackers: {} x {} queries/epoch",
        scenario.attackers.to_string().bright_red(),
        scenario.attacker_queries_per_epoch
    );
    println!(
        "  Clients: {} x {} queries/epoch",
        scenario.clients.to_string().bright_green(),
        scenario.client_queries_per_epoch
    );
    println!("  Epochs: {}", scenario.epochs.to_string().bright_white());
    println!();
    println!("{}", "Press Ctrl+C to abort...".dimmed());
    println!();
}

fn print_outcome(outcome: &SimulationOutcome) {
    let stats = &outcome.stats;

    println!(
        "{}",
        "═══════════════════════════════════════════════════".bright_cyan()
    );
    println!("{}", "        DNS Shield Statistics".bright_cyan().bold());
    println!(
        "{}",
        "═══════════════════════════════════════════════════".bright_cyan()
    );
    println!();
    println!(
        "  Packets inspected:   {}",
        stats.packets_inspected.to_string().bright_white()
    );
    println!(
        "  Queries accepted:    {}",
        stats.queries_accepted.to_string().bright_green()
    );
    println!(
        "  Queries truncated:   {}",
        stats.queries_truncated.to_string().bright_red()
    );
    println!(
        "  Replies sent:        {}",
        stats.replies_sent.to_string().bright_yellow()
    );
    println!(
        "  Reply failures:      {}",
        stats.reply_failures.to_string().yellow()
    );
    println!(
        "  Epochs run/failed:   {}/{}",
        stats.epochs_run, stats.epochs_failed
    );
    println!("  Drop rate:           {:.2}%", stats.drop_rate());
    println!();

    for (index, accepted) in outcome.accepted_per_epoch.iter().enumerate() {
        println!("  Epoch {}: {} accepted", index + 1, accepted);
    }
    println!();

    if outcome.report.is_empty() {
        println!("{}", "No sources blocked".bright_green());
    } else {
        println!(
            "{}",
            format!("Blocked sources ({}):", outcome.report.len()).bright_red()
        );
        print!("{}", outcome.report.render_text());
    }
}

fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            output.display()
        ));
    }

    ShieldConfig::default()
        .to_file(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!("Wrote default configuration to {}", output.display());
    println!(
        "{} {}",
        "✅ Default configuration written to".bright_green(),
        output.display()
    );
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;

    println!("{} {}", "✅ Configuration valid:".bright_green(), path.display());
    println!("  window_size:           {}", config.window_size);
    println!("  threshold:             {}", config.threshold);
    println!("  epoch_ms:              {}", config.epoch_ms);
    println!("  dns_port:              {}", config.dns_port);
    println!("  reply_ttl:             {}", config.reply_ttl);
    println!("  max_ledger_entries:    {}", config.max_ledger_entries);
    println!("  max_blocklist_entries: {}", config.max_blocklist_entries);
    println!("  reply_queue_depth:     {}", config.reply_queue_depth);
    println!("  clear_window_on_drain: {}", config.clear_window_on_drain);
    Ok(())
}
