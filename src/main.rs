use anyhow::{Context, Result};
use apimprov::azure::ApimClient;
use apimprov::config::Settings;
use apimprov::logging::{self, LogLevel};
use apimprov::provision::{
    load_rows, BatchOrchestrator, FailureRecorder, OperationLayout, ProvisionError, ProvisionMode,
    ProvisionOptions,
};
use apimprov::purge::PurgeTarget;
use apimprov::{keys, purge, sheet};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Provision Azure API Management from a sheet
#[derive(Parser, Debug)]
#[command(name = "apimprov", version, about, long_about = None)]
struct Args {
    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Directory for the append-only log files
    #[arg(long, default_value = "logs", global = true)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update APIs, gateway bindings, products, tags, operations and policies
    Provision {
        #[command(flatten)]
        input: InputArgs,

        /// Self-hosted gateway to bind APIs to (overrides SELF_HOSTED_GATEWAY)
        #[arg(long)]
        gateway: Option<String>,

        /// Where to write rows that failed
        #[arg(long, default_value = "failed_apis.csv")]
        failures: PathBuf,
    },

    /// Re-apply operations and policies only, with wildcard operation paths
    SyncOperations {
        #[command(flatten)]
        input: InputArgs,

        /// Where to write rows that failed
        #[arg(long, default_value = "failed_operations.csv")]
        failures: PathBuf,
    },

    /// Create keyed products and set subscription primary keys from a key sheet
    ImportKeys {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Delete every API or product of the service
    Purge {
        #[arg(value_enum)]
        target: PurgeTarget,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Sheet file (.csv) or directory of sheets
    #[arg(short, long)]
    input: PathBuf,

    /// Sheet index within the workbook (overrides SHEET_NUM)
    #[arg(long)]
    sheet: Option<usize>,
}

impl Command {
    fn log_name(&self) -> &'static str {
        match self {
            Command::Provision { .. } => "provision",
            Command::SyncOperations { .. } => "sync_operations",
            Command::ImportKeys { .. } => "import_keys",
            Command::Purge { .. } => "purge",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guards = match logging::init(args.log_level, &args.log_dir, args.command.log_name()) {
        Ok(guards) => guards,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("Script error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let settings = Settings::load().map_err(ProvisionError::from)?;
    let client = ApimClient::new(&settings).context("Failed to create management client")?;

    match args.command {
        Command::Provision {
            input,
            gateway,
            failures,
        } => {
            let mut options = ProvisionOptions::new(gateway.unwrap_or(settings.gateway_name.clone()));
            options.mode = ProvisionMode::Full;
            run_provisioning(&client, &settings, &input, options, failures).await
        }
        Command::SyncOperations { input, failures } => {
            let mut options = ProvisionOptions::new(settings.gateway_name.clone());
            options.mode = ProvisionMode::OperationsOnly;
            options.layout = OperationLayout::Wildcard;
            run_provisioning(&client, &settings, &input, options, failures).await
        }
        Command::ImportKeys { input } => {
            let sheet = sheet::read_sheet(&input.input, input.sheet.unwrap_or(settings.sheet_index))
                .map_err(|e| ProvisionError::BatchFatal(e.to_string()))?;
            let summary = keys::import_keys(&client, &sheet).await?;
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Purge { target, yes } => {
            if !yes {
                anyhow::bail!(
                    "Refusing to delete all {} of '{}' without --yes",
                    target.collection(),
                    settings.service_name
                );
            }
            let summary = purge::purge(&client, target).await?;
            tracing::info!(
                "Purge summary: found {}, deleted {}, failed {}",
                summary.found,
                summary.deleted,
                summary.failed
            );
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn run_provisioning(
    client: &ApimClient,
    settings: &Settings,
    input: &InputArgs,
    options: ProvisionOptions,
    failures: PathBuf,
) -> Result<ExitCode> {
    let sheet_index = input.sheet.unwrap_or(settings.sheet_index);
    let sheet = sheet::read_sheet(&input.input, sheet_index)
        .map_err(|e| ProvisionError::BatchFatal(e.to_string()))?;
    tracing::info!(
        "Loaded {} row(s) from '{}' (sheet {})",
        sheet.records.len(),
        sheet.path.display(),
        sheet_index
    );

    let recorder = FailureRecorder::new(failures).guarding(&sheet.path);
    let mut batch = BatchOrchestrator::new(client, options);
    batch.run(load_rows(&sheet)).await;
    let report = batch.finish(&recorder)?;

    Ok(if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
