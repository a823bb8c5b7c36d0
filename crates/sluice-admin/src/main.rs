use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use sluice_bucket::{BucketStore, S3BucketStore, S3Config};
use sluice_core::frame::read_parquet_bytes;
use sluice_core::object_store::watermark_key;
use sluice_core::watermark::WatermarkStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sluice administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or override a table's extraction watermark
    #[command(subcommand)]
    Watermark(WatermarkCommand),
    /// Browse extracted objects
    #[command(subcommand)]
    Objects(ObjectsCommand),
}

#[derive(Subcommand, Debug)]
enum WatermarkCommand {
    /// Print the stored watermark (0 when none exists)
    Get(TableArgs),
    /// Overwrite the stored watermark
    Set(WatermarkSetArgs),
    /// Delete the watermark so the next run starts from the first row
    Reset(TableArgs),
}

#[derive(Subcommand, Debug)]
enum ObjectsCommand {
    /// List object keys under a prefix
    List(ObjectsListArgs),
    /// Print the first rows of a Parquet object
    Head(ObjectsHeadArgs),
}

#[derive(Args, Debug)]
struct TableArgs {
    #[arg(long)]
    table: String,
}

#[derive(Args, Debug)]
struct WatermarkSetArgs {
    #[arg(long)]
    table: String,
    #[arg(long)]
    value: i64,
}

#[derive(Args, Debug, Default)]
struct ObjectsListArgs {
    /// Usually a table or worksheet name followed by `/`
    #[arg(long, default_value = "")]
    prefix: String,
}

#[derive(Args, Debug)]
struct ObjectsHeadArgs {
    #[arg(long)]
    key: String,
    #[arg(long, default_value_t = 10)]
    rows: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let store = S3BucketStore::new(S3Config::from_env()?)
        .await
        .context("failed to configure object store")?;

    match cli.command {
        Command::Watermark(command) => handle_watermark(&store, command).await,
        Command::Objects(command) => handle_objects(&store, command).await,
    }
}

async fn handle_watermark(store: &dyn BucketStore, command: WatermarkCommand) -> Result<()> {
    let watermarks = WatermarkStore::new(store);
    match command {
        WatermarkCommand::Get(args) => {
            let value = watermarks.get(&args.table).await?;
            println!("{value}");
        }
        WatermarkCommand::Set(args) => {
            let previous = watermarks.get(&args.table).await?;
            watermarks.set(&args.table, args.value).await?;
            info!(table = %args.table, previous, value = args.value, "watermark overwritten");
            println!("{}: {previous} -> {}", watermark_key(&args.table), args.value);
        }
        WatermarkCommand::Reset(args) => {
            watermarks.reset(&args.table).await?;
            warn!(table = %args.table, "watermark reset; next extraction starts from the first row");
            println!("Removed {}", watermark_key(&args.table));
        }
    }
    Ok(())
}

async fn handle_objects(store: &dyn BucketStore, command: ObjectsCommand) -> Result<()> {
    match command {
        ObjectsCommand::List(args) => {
            let keys = store.list_prefix(&args.prefix).await?;
            if keys.is_empty() {
                println!("No objects found under '{}'.", args.prefix);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec!["Key"]);
            for key in &keys {
                table.add_row(vec![key.as_str()]);
            }
            println!("{table}");
            println!("{} objects", keys.len());
        }
        ObjectsCommand::Head(args) => {
            let bytes = store
                .get_object(&args.key)
                .await
                .with_context(|| format!("failed to fetch {}", args.key))?;
            let frame = read_parquet_bytes(&bytes)
                .with_context(|| format!("{} is not a readable Parquet object", args.key))?;
            println!("{} rows x {} columns", frame.height(), frame.width());
            println!("{}", frame.head(Some(args.rows)));
        }
    }
    Ok(())
}
