mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settings::Settings;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use umd_core::logging::{LogConfig, LogLevel};
use umd_core::{byteswap, CartridgeError, CartridgeImage, ConsoleProfile};
use umd_serial::{
    DiscoveryReport, DiscoveryTask, Enumerator, Platform, SerialTransport, TransportConfig,
};

#[derive(Parser)]
#[command(name = "umd", version, about = "Cartridge header toolkit and dumper discovery")]
struct Args {
    /// Settings file (default: umd.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Core log level: off, error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write core logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// With no command, scans for dumpers if auto_connect_on_start is set
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a ROM's header fields
    ///
    /// Relative paths not found here are looked up in the console's last ROM directory
    Header {
        rom: PathBuf,
        /// genesis, sms, snes or tg16 (default: last used)
        #[arg(long, value_parser = parse_console)]
        console: Option<ConsoleProfile>,
    },
    /// MD5 digest of a ROM
    Md5 { rom: PathBuf },
    /// Verify a ROM's stored checksum
    Checksum {
        rom: PathBuf,
        #[arg(long, value_parser = parse_console)]
        console: Option<ConsoleProfile>,
    },
    /// List candidate serial ports without probing them
    Ports,
    /// Probe candidate ports for dumpers
    Scan {
        /// Per-port timeout (default: from settings)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Swap the byte order of every 16-bit word
    Swap { input: PathBuf, output: PathBuf },
}

fn parse_console(s: &str) -> Result<ConsoleProfile, CartridgeError> {
    s.parse()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Settings::config_path);
    let mut settings = Settings::load_from(&config_path);
    configure_logging(&args, &settings)?;

    let command = match args.command {
        Some(command) => command,
        None if settings.auto_connect_on_start => Command::Scan { timeout_ms: None },
        None => {
            println!("nothing to do; see `umd --help`");
            return Ok(());
        }
    };

    match command {
        Command::Header { rom, console } => {
            let console = console.unwrap_or(settings.last_console);
            let rom = settings.resolve_rom(console, &rom);
            let image = CartridgeImage::from_path(&rom, console);
            if args.json {
                let header = image.decode_header()?;
                println!("{}", serde_json::to_string_pretty(&header.to_json())?);
            } else {
                print_pairs(&image.format_header()?);
            }
            remember(&mut settings, &config_path, console, &rom);
        }
        Command::Md5 { rom } => {
            let rom = settings.resolve_rom(settings.last_console, &rom);
            let mut image = CartridgeImage::from_path(&rom, settings.last_console);
            let digest = image
                .digest_hex()
                .with_context(|| format!("hashing {}", rom.display()))?;
            if args.json {
                let out = serde_json::json!({ "file": rom.display().to_string(), "md5": digest });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}  {}", digest, rom.display());
            }
        }
        Command::Checksum { rom, console } => {
            let console = console.unwrap_or(settings.last_console);
            let rom = settings.resolve_rom(console, &rom);
            let image = CartridgeImage::from_path(&rom, console);
            let result = image.checksum()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "stored {:#06x}, computed {:#06x}: {}",
                    result.stored,
                    result.computed,
                    if result.matches { "OK" } else { "MISMATCH" }
                );
            }
            remember(&mut settings, &config_path, console, &rom);
            if !result.matches {
                std::process::exit(1);
            }
        }
        Command::Ports => {
            let ports = Platform::current().candidates()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&ports)?);
            } else {
                for port in ports {
                    println!("{}", port);
                }
            }
        }
        Command::Scan { timeout_ms } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.timeout());
            let (report, active) = scan(timeout)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &active);
            }
        }
        Command::Swap { input, output } => {
            let mut reader = BufReader::new(
                File::open(&input).with_context(|| format!("opening {}", input.display()))?,
            );
            let mut writer = BufWriter::new(
                File::create(&output).with_context(|| format!("creating {}", output.display()))?,
            );
            let written = byteswap::swap_words(&mut reader, &mut writer)?;
            writer.flush()?;
            log::info!("wrote {} bytes to {}", written, output.display());
        }
    }

    Ok(())
}

fn configure_logging(args: &Args, settings: &Settings) -> Result<()> {
    let config = LogConfig::global();
    if let Some(name) = args.log_level.as_ref().or(settings.log_level.as_ref()) {
        let Some(level) = LogLevel::from_str(name) else {
            anyhow::bail!("unknown log level: {}", name);
        };
        config.set_global_level(level);
    }
    if let Some(path) = &args.log_file {
        config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }
    Ok(())
}

/// Run one discovery pass on the worker thread and wait for it to settle.
fn scan(timeout: Duration) -> Result<(DiscoveryReport, Vec<String>)> {
    let transport = SerialTransport::system(TransportConfig { timeout });
    let shared = Arc::new(Mutex::new(transport));

    let task = DiscoveryTask::spawn(Arc::clone(&shared))?;
    let report = task.wait()?;

    let active = match shared.lock() {
        Ok(transport) => transport.active_ports(),
        Err(poisoned) => poisoned.into_inner().active_ports(),
    };
    Ok((report, active))
}

fn print_report(report: &DiscoveryReport, active: &[String]) {
    if report.confirmed.is_empty() {
        println!(
            "no dumper found on {} candidate port(s)",
            report.candidates.len()
        );
    }
    for port in &report.confirmed {
        let marker = if active.contains(port) { "*" } else { " " };
        println!("{} {}", marker, port);
    }
    for rejection in &report.rejected {
        log::debug!("{}: {}", rejection.port, rejection.reason);
    }
}

fn print_pairs(pairs: &[(String, String)]) {
    let width = pairs.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in pairs {
        println!("{:<width$}  {}", name, value, width = width);
    }
}

fn remember(settings: &mut Settings, path: &Path, console: ConsoleProfile, rom: &Path) {
    settings.remember_rom(console, rom);
    if let Err(e) = settings.save_to(path) {
        log::warn!("could not save settings to {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_flag_is_parsed() {
        let args = Args::try_parse_from(["umd", "header", "sonic.bin", "--console", "SNES"]).unwrap();
        match args.command {
            Some(Command::Header { console, .. }) => assert_eq!(console, Some(ConsoleProfile::Snes)),
            _ => panic!("expected header command"),
        }
    }

    #[test]
    fn test_unknown_console_is_rejected() {
        assert!(Args::try_parse_from(["umd", "checksum", "x.bin", "--console", "jaguar"]).is_err());
    }

    #[test]
    fn test_global_flags_follow_subcommand() {
        let args = Args::try_parse_from(["umd", "scan", "--json", "--timeout-ms", "250"]).unwrap();
        assert!(args.json);
        assert!(matches!(
            args.command,
            Some(Command::Scan {
                timeout_ms: Some(250)
            })
        ));
    }

    #[test]
    fn test_command_is_optional() {
        let args = Args::try_parse_from(["umd"]).unwrap();
        assert!(args.command.is_none());
    }
}
