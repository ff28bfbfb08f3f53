//! lispwire - evaluate expressions on a remote Lisp eval server

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lispwire::config::{self, Config};
use lispwire::protocol::encode_to_bytes;
use lispwire::{Wire, WireValue};

/// lispwire - talk to a Lisp eval server
#[derive(Parser)]
#[command(name = "lispwire")]
#[command(author = "lispwire Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Evaluate expressions on a remote Lisp eval server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Eval server host (overrides the configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Eval server port (overrides the configuration)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one expression and print the result
    Eval {
        /// Expression text, sent as given
        expression: String,
    },

    /// Evaluate expressions read line by line from stdin
    Repl,

    /// Print the wire encoding of a JSON value, in hex
    Encode {
        /// JSON value: non-negative integers, strings, arrays and null
        json: String,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    init_logging(cli.verbose || config.general.verbose, &config)?;

    let host = cli.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    match cli.command {
        Commands::Eval { expression } => run_eval(&config, &host, port, &expression).await,
        Commands::Repl => run_repl(&config, &host, port).await,
        Commands::Encode { json } => {
            let value: serde_json::Value = serde_json::from_str(&json)?;
            let value = WireValue::try_from(&value)?;
            println!("{}", to_hex(&encode_to_bytes(&value)));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { generate, output } => {
            let text = if generate {
                config::generate_sample_config()?
            } else {
                toml::to_string_pretty(&config)?
            };
            if let Some(path) = output {
                std::fs::write(&path, &text)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", text);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Log to stderr, and to the configured log file if any
fn init_logging(verbose: bool, config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let file_layer = match &config.general.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

/// Evaluate a single expression
async fn run_eval(
    config: &Config,
    host: &str,
    port: u16,
    expression: &str,
) -> anyhow::Result<ExitCode> {
    let mut wire = Wire::connect(host, port, config.wire_config()).await?;

    let reply = match wire.remote_eval(expression).await {
        Ok(reply) => reply,
        Err(e) => {
            wire.close().await;
            return Err(e.into());
        }
    };
    wire.close().await;

    if reply.is_error() {
        eprintln!("{}", reply.condition_text());
        return Ok(ExitCode::FAILURE);
    }

    println!("{}", reply.result_text());
    Ok(ExitCode::SUCCESS)
}

/// Evaluate stdin line by line over one session
async fn run_repl(config: &Config, host: &str, port: u16) -> anyhow::Result<ExitCode> {
    let mut wire = Wire::connect(host, port, config.wire_config()).await?;
    tracing::info!("Evaluating on {}:{}, one expression per line", host, port);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("* ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let expression = line.trim();
        if expression.is_empty() {
            continue;
        }

        match wire.remote_eval(expression).await {
            Ok(reply) if reply.is_error() => println!(";; {}", reply.condition_text()),
            Ok(reply) => println!("{}", reply.result_text()),
            Err(e) => {
                wire.close().await;
                return Err(e.into());
            }
        }
    }

    let stats = wire.stats().clone();
    tracing::debug!(
        "Session done: {} calls, {} bytes sent, {} bytes received, {} compactions",
        stats.calls,
        stats.bytes_sent,
        stats.bytes_received,
        stats.compactions
    );
    wire.close().await;
    println!();

    Ok(ExitCode::SUCCESS)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
