use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use sluice_bucket::{S3BucketStore, S3Config};
use sluice_core::config::{
    ConnectionRegistry, HeaderFallbacks, DEFAULT_SINK_CONN_ID, DEFAULT_SOURCE_CONN_ID,
};
use sluice_core::db;
use sluice_core::pipelines::{extract_sheet, extract_table, RunContext, DEFAULT_SCHEMA};
use sluice_core::relational::PostgresSource;
use sluice_core::sink::{MySqlSink, SecondarySink};
use sluice_sheets::{GoogleSheetsClient, SheetsClientConfig, DEFAULT_CREDENTIALS_PATH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Extraction tasks feeding the object-store landing zone", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy rows above the stored watermark of a Postgres table into Parquet
    ExtractTable(ExtractTableArgs),
    /// Snapshot a worksheet into Parquet and upsert it into the secondary table
    ExtractSheet(ExtractSheetArgs),
}

#[derive(Args, Debug)]
struct S3Args {
    /// Target bucket
    #[arg(long, env = "S3_BUCKET")]
    bucket: String,
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    region: String,
    /// Custom endpoint, e.g. a MinIO deployment
    #[arg(long, env = "S3_ENDPOINT_URL")]
    endpoint_url: Option<String>,
    #[arg(long, env = "S3_ACCESS_KEY_ID")]
    access_key: Option<String>,
    #[arg(long, env = "S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_key: Option<String>,
    /// Defaults to on whenever an endpoint is set
    #[arg(long, env = "S3_FORCE_PATH_STYLE", value_parser = BoolishValueParser::new())]
    force_path_style: Option<bool>,
}

impl S3Args {
    fn into_config(self) -> S3Config {
        let force_path_style = self
            .force_path_style
            .unwrap_or(self.endpoint_url.is_some());
        S3Config {
            bucket: self.bucket,
            region: self.region,
            endpoint: self.endpoint_url,
            access_key_id: self.access_key,
            secret_access_key: self.secret_key,
            force_path_style,
        }
    }

    async fn connect(self) -> Result<S3BucketStore> {
        S3BucketStore::new(self.into_config())
            .await
            .context("failed to configure object store")
    }
}

#[derive(Args, Debug)]
struct ExtractTableArgs {
    /// Source table; its key column must be `id_<table>`
    #[arg(long)]
    table: String,
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    schema: String,
    /// Connection id of the source database
    #[arg(long, default_value = DEFAULT_SOURCE_CONN_ID)]
    conn_id: String,
    #[command(flatten)]
    s3: S3Args,
}

#[derive(Args, Debug)]
struct ExtractSheetArgs {
    /// Spreadsheet document id
    #[arg(long)]
    sheet_id: String,
    /// Worksheet title; also names the object prefix and the secondary table
    #[arg(long)]
    sheet_name: String,
    /// Connection id of the secondary MySQL/MariaDB database
    #[arg(long, default_value = DEFAULT_SINK_CONN_ID)]
    conn_id: String,
    /// Service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: String,
    /// TOML file replacing the built-in duplicate-header fallbacks
    #[arg(long)]
    header_fallbacks: Option<PathBuf>,
    /// Upload the snapshot without touching the secondary table
    #[arg(long)]
    skip_sink: bool,
    #[command(flatten)]
    s3: S3Args,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::ExtractTable(args) => handle_extract_table(args).await,
        Command::ExtractSheet(args) => handle_extract_sheet(args).await,
    }
}

async fn handle_extract_table(args: ExtractTableArgs) -> Result<()> {
    let store = args.s3.connect().await?;
    let connection = ConnectionRegistry::from_env().resolve(&args.conn_id)?;
    info!(connection = %connection, "resolved source connection");

    let source = PostgresSource::new(db::connect_postgres(&connection).await?);
    let ctx = RunContext::new("extract-table", &args.table);
    let result = extract_table(&ctx, &source, &store, &args.schema, &args.table).await;
    source.pool().close().await;

    let report = result.with_context(|| format!("extraction of table '{}' failed", args.table))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn handle_extract_sheet(args: ExtractSheetArgs) -> Result<()> {
    let fallbacks = match &args.header_fallbacks {
        Some(path) => HeaderFallbacks::from_toml_file(path)
            .with_context(|| format!("failed to load header fallbacks from {}", path.display()))?,
        None => HeaderFallbacks::builtin(),
    };
    let store = args.s3.connect().await?;

    let client = GoogleSheetsClient::connect(&SheetsClientConfig {
        credentials_path: args.credentials.clone(),
        ..SheetsClientConfig::default()
    })
    .await
    .context("failed to authenticate with Google Sheets")?;
    let worksheet = client.worksheet(&args.sheet_id, &args.sheet_name);

    let sink = if args.skip_sink {
        info!("secondary table sync disabled");
        None
    } else {
        let connection = ConnectionRegistry::from_env().resolve(&args.conn_id)?;
        info!(connection = %connection, "resolved sink connection");
        Some(MySqlSink::new(db::connect_mysql(&connection)?))
    };

    let ctx = RunContext::new("extract-sheet", &args.sheet_name);
    let result = extract_sheet(
        &ctx,
        &worksheet,
        &fallbacks,
        &store,
        sink.as_ref().map(|sink| sink as &dyn SecondarySink),
    )
    .await;
    if let Some(sink) = &sink {
        sink.pool().close().await;
    }

    let report =
        result.with_context(|| format!("extraction of worksheet '{}' failed", args.sheet_name))?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.sync.is_failed() {
        error!(worksheet = %report.worksheet, "snapshot uploaded but secondary table is stale");
        bail!(
            "worksheet '{}' was uploaded but the secondary table sync failed",
            report.worksheet
        );
    }
    Ok(())
}
