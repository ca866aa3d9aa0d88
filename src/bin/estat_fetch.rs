use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use estat_fetch::app::{App, FailurePolicy, FetchOptions, LogSink};
use estat_fetch::config::ConfigLoader;
use estat_fetch::error::FetchError;
use estat_fetch::eurostat::{ClientOptions, DEFAULT_BASE_URL, EurostatHttpClient};
use estat_fetch::output::{JsonOutput, OutputMode, print_text_summary};
use estat_fetch::store::Store;

#[derive(Parser)]
#[command(name = "estat-fetch")]
#[command(about = "Download Eurostat datasets and their structure metadata as JSON")]
#[command(version, author)]
struct Cli {
    /// JSON file mapping dataset codes to query options
    #[arg(long)]
    config_file: PathBuf,

    /// The folder in which to save the data
    #[arg(long, default_value = ".")]
    data_dir: Utf8PathBuf,

    /// Keep going after a dataset fails and report failures at the end
    #[arg(long)]
    keep_going: bool,

    #[arg(long, env = "ESTAT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::ConfigNotFound(_) | FetchError::ConfigParse(_) => 2,
        FetchError::Http(_) | FetchError::Status { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let requests = ConfigLoader::load(&cli.config_file)?;
    tracing::info!(datasets = requests.len(), config = %cli.config_file.display(), "loaded config");

    let client = EurostatHttpClient::new(&ClientOptions {
        base_url: cli.base_url,
        timeout: Duration::from_secs(cli.timeout_secs),
    })?;
    let app = App::new(Store::new(cli.data_dir), client);
    let options = FetchOptions {
        policy: if cli.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
    };
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let summary = app.fetch_all(&requests, &options, &LogSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => print_text_summary(&summary),
    }

    if !summary.is_success() {
        return Err(FetchError::Incomplete {
            failed: summary.failed.len(),
            total: summary.total(),
        }
        .into());
    }
    Ok(())
}
