mod config;
mod logging;
mod runner;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;

/// `classify` status for a label with alerts; clap reserves 2 for usage errors.
const NOT_PERMITTED_EXIT: i32 = 3;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Cold drink supply chain ledger.
#[derive(Parser)]
#[command(name = "coldchain", version, about = "Cold drink supply chain ledger")]
struct Cli {
    /// Path to the config file (default: ./coldchain.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the ledger over HTTP
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Replay a JSON script of operations against a fresh ledger
    Run {
        /// Path to the script file
        script: PathBuf,
    },

    /// Classify an ingredient label with the configured rules
    Classify {
        /// Path to a text file holding the label
        label: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&format!("error: {e}"), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if cli.quiet {
        config.log.filter = "warn".to_string();
    }
    logging::init(&config.log);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(&config);
        }
        Commands::Run { script } => {
            cmd_run(&script, &config, cli.output, cli.quiet);
        }
        Commands::Classify { label } => {
            cmd_classify(&label, &config, cli.output, cli.quiet);
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        }
    }
}

fn cmd_serve(config: &Config) {
    let rt = runtime();
    if let Err(e) = rt.block_on(serve::start_server(config)) {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn cmd_run(script: &Path, config: &Config, output: OutputFormat, quiet: bool) {
    let owner = match config.owner_identity() {
        Ok(owner) => owner,
        Err(e) => {
            report_error(&format!("error: {e}"), output, quiet);
            process::exit(1);
        }
    };
    let chain = runner::fresh_chain(owner, config.policy);
    let classifier = config.classifier.build();

    let rt = runtime();
    match rt.block_on(runner::run_script(
        script,
        chain,
        classifier.as_ref(),
        output,
        quiet,
    )) {
        Ok(result) if result.failed > 0 => process::exit(1),
        Ok(_) => {}
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Exit status 0 when every ingredient is permitted, 3 when not, 1 on error.
/// Usage errors keep clap's status 2.
fn cmd_classify(label: &Path, config: &Config, output: OutputFormat, quiet: bool) {
    let text = match std::fs::read_to_string(label) {
        Ok(t) => t,
        Err(e) => {
            report_error(
                &format!("error reading label '{}': {}", label.display(), e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };

    let classification = match config.classifier.label_rules().evaluate(&text) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {e}"), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Text => {
            println!("{}", classification.status);
            if !quiet {
                for (name, amount) in &classification.ingredients {
                    match amount {
                        Some(amount) => println!("  {name} ({amount})"),
                        None => println!("  {name}"),
                    }
                }
                for alert in &classification.alerts {
                    println!("alert: {alert}");
                }
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&classification).unwrap_or_default()
            );
        }
    }

    if !classification.is_permitted() {
        process::exit(NOT_PERMITTED_EXIT);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
