use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use linelist_cleaner::app::ports::SheetPort;
use linelist_cleaner::app::provision_use_case::ProvisionUseCase;
use linelist_cleaner::config::Config;
use linelist_cleaner::infra::csv_output_adapter::CsvOutputAdapter;
use linelist_cleaner::infra::in_memory_sheet::InMemorySheet;
use linelist_cleaner::infra::sheets_http::SheetsHttpClient;
use linelist_cleaner::logging;
use linelist_cleaner::pipeline::processing::geocode::Gazetteer;
use linelist_cleaner::pipeline::Orchestrator;

#[derive(Parser)]
#[command(name = "linelist-cleaner")]
#[command(about = "Validates, repairs and publishes the case line list")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "cleaner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every configured table and publish the merged dataset
    Clean {
        /// Work on an in-memory copy of the tables; nothing is written back
        #[arg(long)]
        dry_run: bool,
    },
    /// Look up one location in the gazetteer
    Lookup {
        #[arg(long)]
        city: String,
        #[arg(long, default_value = "")]
        province: String,
        #[arg(long)]
        country: String,
    },
    /// Create a new regional table from the template
    Provision {
        /// Title of the new spreadsheet
        #[arg(long)]
        title: String,
        /// Title of its data worksheet
        #[arg(long, default_value = "Data")]
        worksheet: String,
    },
}

fn load_gazetteer(config: &Config) -> Result<Gazetteer> {
    let (gazetteer, stats) = Gazetteer::load(&config.gazetteer.path, config.gazetteer.layout.layout())
        .with_context(|| format!("loading gazetteer {}", config.gazetteer.path.display()))?;
    info!(
        entries = gazetteer.len(),
        skipped = stats.skipped,
        duplicates = stats.duplicates,
        "gazetteer loaded"
    );
    Ok(gazetteer)
}

async fn clean(config: Config, dry_run: bool) -> Result<()> {
    let gazetteer = load_gazetteer(&config)?;
    let remote: Arc<dyn SheetPort> =
        Arc::new(SheetsHttpClient::from_env(&config.remote).context("building Sheets client")?);

    let port: Arc<dyn SheetPort> = if dry_run {
        let sheets: Vec<(String, String)> = config
            .tables
            .iter()
            .map(|t| (t.sheet_id.clone(), t.name.clone()))
            .collect();
        info!(tables = sheets.len(), "dry run: mirroring tables locally");
        Arc::new(InMemorySheet::mirror(remote, &sheets).await?)
    } else {
        remote
    };

    let output = Arc::new(CsvOutputAdapter::new(&config.output));
    let mut orchestrator = Orchestrator::new(config.tables.clone(), port, gazetteer, output, config.pacing())
        .with_dry_run(dry_run);

    let report = orchestrator.run().await.context("cleanup run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report.failed_tables();
    if !failed.is_empty() {
        bail!("{} table(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn lookup(config: &Config, city: &str, province: &str, country: &str) -> Result<()> {
    let gazetteer = load_gazetteer(config)?;
    match gazetteer.lookup(city, province, country) {
        Some(geocode) => println!("{}", serde_json::to_string_pretty(geocode)?),
        None => {
            warn!(%city, %province, %country, "no gazetteer entry");
            println!("null");
        }
    }
    Ok(())
}

async fn provision(config: &Config, title: &str, worksheet: &str) -> Result<()> {
    let Some(provisioning) = config.provisioning.clone() else {
        bail!("[provisioning] section missing from config");
    };
    let client = Arc::new(SheetsHttpClient::from_env(&config.remote).context("building Sheets client")?);
    let use_case = ProvisionUseCase::new(client.clone(), client, provisioning);

    let created = use_case.provision(title, worksheet, &config.tables).await?;
    info!(url = %created.url, registry_row = created.registry_row, "table provisioned");
    println!("{}", created.config_stanza()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    logging::init_logging(&config.log_dir);

    match cli.command {
        Commands::Clean { dry_run } => clean(config, dry_run).await,
        Commands::Lookup {
            city,
            province,
            country,
        } => lookup(&config, &city, &province, &country),
        Commands::Provision { title, worksheet } => provision(&config, &title, &worksheet).await,
    }
}
