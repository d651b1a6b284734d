//! `ulogtool` - CLI for ulog
//!
//! This binary dumps and summarizes ULog flight logs and shows the
//! configuration the reader runs with.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use ulog::cli::{dump, Cli, Command, ConfigCommand, DumpCommand, LogStats, StatsCommand};
use ulog::reader::StreamReader;
use ulog::{init_logging, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Dump(cmd) => handle_dump(&config, &cmd),
        Command::Stats(cmd) => handle_stats(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_reader(config: &Config, path: &Path) -> Result<StreamReader<File>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(StreamReader::from_reader(file, &config.reader))
}

fn handle_dump(config: &Config, cmd: &DumpCommand) -> Result<()> {
    let mut reader = open_reader(config, &cmd.file)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    dump(&mut reader, &mut out, cmd.json)
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    out.flush()?;
    Ok(())
}

fn handle_stats(config: &Config, cmd: &StatsCommand) -> Result<()> {
    let mut reader = open_reader(config, &cmd.file)?;
    let stats = LogStats::collect(&mut reader)
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        stats.write_text(&mut io::stdout().lock())?;
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Reader]");
                println!("  Initial buffer:     {}", config.reader.initial_buffer_size);
                println!("  Scratch threshold:  {}", config.reader.scratch_threshold);
                println!("  Read chunk size:    {}", config.reader.read_chunk_size);
                println!();
                println!("[Writer]");
                match config.writer.effective_sync_interval() {
                    Some(interval) => println!("  Sync interval:      {interval}"),
                    None => println!("  Sync interval:      off"),
                }
                println!("  Header version:     {}", config.writer.header_version);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
