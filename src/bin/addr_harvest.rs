use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use addr_harvest::config::load_config;
use addr_harvest::mail::imap_client::ImapClient;
use addr_harvest::mail::session::SessionManager;
use addr_harvest::scan::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_SIZE, ScanEngine, ScanOptions};
use addr_harvest::store::csv_store::CsvCheckpointStore;

#[derive(Parser)]
#[command(name = "addr_harvest")]
#[command(about = "Collect every address from a mailbox's From/To/Cc headers", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/addr_harvest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the mailbox, resuming from the latest checkpoint
    Scan {
        /// Where addresses_<n>.csv checkpoints live
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Messages fetched per request
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window_size: u32,

        /// Pause between failed fetch attempts
        #[arg(long, default_value_t = 1000)]
        retry_delay_ms: u64,

        /// Exit without waiting for Enter
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the latest checkpoint without connecting
    Status {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Status { output_dir } => match status(&output_dir) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },

        Command::Scan {
            output_dir,
            window_size,
            retry_delay_ms,
            no_wait,
        } => {
            let options = ScanOptions {
                window_size,
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_delay: Duration::from_millis(retry_delay_ms),
            };
            let code = match scan(cli.config.as_deref(), &output_dir, options) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::FAILURE
                }
            };
            if !no_wait {
                wait_for_enter();
            }
            code
        }
    }
}

fn scan(config: Option<&Path>, output_dir: &Path, options: ScanOptions) -> Result<()> {
    let cfg = load_config(config).map_err(|e| anyhow!("Configuration error: {e}"))?;
    let mut store = CsvCheckpointStore::open(output_dir)?;

    let imap = ImapClient::from_config(&cfg);
    println!("Scanning {} on {}:{}", cfg.mailbox, cfg.server, cfg.port);

    let mut engine = ScanEngine::new(SessionManager::new(imap), &mut store, options);
    let result = engine.run(|p| {
        println!(
            "Processed {} messages (+{}), {} unique addresses",
            p.consumed, p.window_messages, p.addresses
        );
    });

    match result {
        Ok(report) => {
            println!(
                "Done: {} messages scanned, {} unique addresses written to {}",
                report.consumed,
                report.addresses,
                report.path.display()
            );
            Ok(())
        }
        Err(e) if e.is_resumable() => Err(anyhow!(
            "{e}\nProgress up to message {} is saved in {}; run again to resume.",
            engine.checkpoint().consumed(),
            output_dir.display()
        )),
        Err(e) => Err(e.into()),
    }
}

fn status(output_dir: &Path) -> Result<()> {
    let store = CsvCheckpointStore::open(output_dir)?;
    match store.peek_latest()? {
        Some(cp) => println!(
            "{}: {} messages scanned, {} unique addresses",
            store.path_for(cp.consumed()).display(),
            cp.consumed(),
            cp.addresses().len()
        ),
        None => println!("No checkpoint in {}", store.dir().display()),
    }
    Ok(())
}

fn wait_for_enter() {
    println!("Press Enter to exit.");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
