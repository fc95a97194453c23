use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use trail_ledger::{Record, ValidationReport};
use trail_server::{NodeConfig, TrailNode};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Genesis => cmd_genesis(cli.format),
        Command::Verify(args) => cmd_verify(args, cli.format),
        Command::Inspect(args) => cmd_inspect(args, cli.format),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(&args)?;
    tracing::info!(
        http = %config.http_addr,
        p2p = %config.p2p_addr,
        seed = config.seed_peer.as_deref().unwrap_or("-"),
        "starting node"
    );
    let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
    runtime.block_on(TrailNode::new(config).run())?;
    Ok(())
}

/// Defaults, then the config file, then the environment, then flags.
fn serve_config(args: &ServeArgs) -> anyhow::Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env()?;
    if let Some(http) = args.http {
        config.http_addr = http;
    }
    if let Some(p2p) = args.p2p {
        config.p2p_addr = p2p;
    }
    if let Some(peer) = &args.peer {
        config.seed_peer = Some(peer.clone());
    }
    Ok(config)
}

fn cmd_genesis(format: OutputFormat) -> anyhow::Result<()> {
    let genesis = Record::genesis();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&genesis)?),
        OutputFormat::Text => print_record(&genesis),
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let records = load_records(&args.file)?;
    let report = ValidationReport::of(&records);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text if report.is_valid() => {
            println!("{} Chain is valid", "✓".green().bold());
            println!("  Records: {}", report.record_count.to_string().bold());
            if let Some(tail) = &report.tail {
                println!("  Tail:    {}", tail.to_hex().yellow());
            }
        }
        OutputFormat::Text => {
            println!("{} Chain is invalid", "✗".red().bold());
            println!("  Records: {}", report.record_count.to_string().bold());
            if let Some(index) = report.failed_index {
                println!("  First bad record: #{}", index.to_string().yellow());
            }
            if let Some(reason) = &report.reason {
                println!("  Reason: {}", reason.red());
            }
        }
    }

    if !report.is_valid() {
        bail!("{} is not a valid chain", args.file.display());
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let records = load_records(&args.file)?;
    let shown = args.limit.unwrap_or(records.len()).min(records.len());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records[..shown])?),
        OutputFormat::Text => {
            for record in &records[..shown] {
                print_record(record);
                println!();
            }
            if shown < records.len() {
                println!("{}", format!("... {} more", records.len() - shown).dimmed());
            }
        }
    }
    Ok(())
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a JSON array of records", path.display()))
}

fn print_record(record: &Record) {
    let intact = if record.is_intact() { "intact".green() } else { "digest mismatch".red() };
    println!("{} {}", format!("#{}", record.sequence()).yellow().bold(), record.digest().short_hex().dimmed());
    println!("  Created:  {}", record.created_at());
    println!("  Previous: {}", record.previous_digest());
    println!("  Digest:   {} ({})", record.digest(), intact);
    match record.payload().as_text() {
        Some(text) => println!("  Payload:  {text}"),
        None => println!("  Payload:  <{} bytes>", record.payload().len()),
    }
}
