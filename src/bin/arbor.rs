//! Binary entry point for the arbor CLI.
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use arbor::build::CsvOptions;
use arbor::cli::config::delimiter_byte;
use arbor::cli::{run_create, run_inspect, CliConfig, CliError, CreateConfig, InspectConfig};
use arbor::storage::CodecKind;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "arbor",
    version,
    about = "Build and inspect arbor node tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "ARBOR_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/arbor/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase log verbosity (-v info, -vv debug, -vvv trace)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a database from a CSV file, replacing whatever is at DB
    Create(CreateCmd),
    /// Print metadata and the first rows of a database
    Inspect(InspectCmd),
}

#[derive(Args, Debug)]
struct CreateCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(long, value_name = "FILE", help = "CSV input")]
    csv: PathBuf,

    #[arg(long, overrides_with = "no_header", help = "Treat the first row as column names")]
    header: bool,

    #[arg(long, overrides_with = "header", help = "Treat the first row as data")]
    no_header: bool,

    #[arg(
        long,
        overrides_with = "no_attributes",
        help = "Store column names in a name attribute"
    )]
    attributes: bool,

    #[arg(
        long,
        overrides_with = "attributes",
        help = "Use column names as element names"
    )]
    no_attributes: bool,

    #[arg(long, value_name = "C", help = "Field delimiter")]
    delimiter: Option<char>,

    #[arg(long, value_name = "N", help = "Database name (defaults to the DB directory name)")]
    name: Option<String>,

    #[arg(long, help = "Store heap values uncompressed")]
    no_compress: bool,

    #[arg(long, help = "Store integer values on the heap instead of inline")]
    no_inline: bool,
}

#[derive(Args, Debug)]
struct InspectCmd {
    #[arg(value_name = "DB")]
    db_path: PathBuf,

    #[arg(long, value_name = "N", default_value_t = 10, help = "Rows to dump")]
    nodes: u32,

    #[arg(long, help = "Check the table checksum and structure")]
    verify: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolves an `--x` / `--no-x` pair over the configured value.
fn switch(on: bool, off: bool, configured: bool) -> bool {
    match (on, off) {
        (true, _) => true,
        (_, true) => false,
        _ => configured,
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::load(cli.config)?;
    match cli.command {
        Command::Create(cmd) => {
            let mut build = config.build_options();
            if cmd.no_compress {
                build = build.codec(CodecKind::None);
            }
            if cmd.no_inline {
                build = build.inline_numbers(false);
            }
            let mut csv: CsvOptions = config.csv_options()?;
            csv.header = switch(cmd.header, cmd.no_header, csv.header);
            csv.attributes = switch(cmd.attributes, cmd.no_attributes, csv.attributes);
            if let Some(delimiter) = cmd.delimiter {
                csv.delimiter = delimiter_byte(delimiter)?;
            }
            let summary = run_create(&CreateConfig {
                db_path: cmd.db_path,
                csv_path: cmd.csv,
                name: cmd.name,
                build,
                csv,
            })?;
            println!("{summary}");
        }
        Command::Inspect(cmd) => {
            let report = run_inspect(&InspectConfig {
                db_path: cmd.db_path,
                nodes: cmd.nodes,
                verify: cmd.verify,
            })?;
            print!("{report}");
        }
    }
    Ok(())
}
