use bytes::Bytes;
use polars::prelude::{ChunkAgg, DataType};
use serde::Serialize;
use tracing::{info, Instrument};

use super::RunContext;
use crate::error::{PipelineError, Result};
use crate::frame::write_parquet_bytes;
use crate::object_store::{table_data_key, BucketStore, PARQUET_CONTENT_TYPE};
use crate::relational::RelationalSource;
use crate::watermark::WatermarkStore;

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    NoNewRows,
    Uploaded {
        data_key: String,
        rows: usize,
        new_watermark: i64,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableExtraction {
    pub table: String,
    pub previous_watermark: i64,
    pub outcome: ExtractionOutcome,
}

/// Primary keys follow the `id_{table}` naming convention.
pub fn primary_key_column(table: &str) -> String {
    format!("id_{table}")
}

/// Extracts every row of `schema.table` above the stored watermark into
/// `{table}/data_{watermark + 1}.parquet`, then advances the watermark to the
/// batch's highest primary key. A run that finds no new rows writes nothing.
pub async fn extract_table(
    ctx: &RunContext,
    source: &dyn RelationalSource,
    store: &dyn BucketStore,
    schema: &str,
    table: &str,
) -> Result<TableExtraction> {
    run(source, store, schema, table)
        .instrument(ctx.span().clone())
        .await
}

async fn run(
    source: &dyn RelationalSource,
    store: &dyn BucketStore,
    schema: &str,
    table: &str,
) -> Result<TableExtraction> {
    let watermarks = WatermarkStore::new(store);
    let watermark = watermarks.get(table).await?;

    let columns = source.table_columns(schema, table).await?;
    if columns.is_empty() {
        return Err(PipelineError::TableNotFound {
            schema: schema.to_string(),
            table: table.to_string(),
        });
    }

    let primary_key = primary_key_column(table);
    let pk_spec = columns
        .iter()
        .find(|column| column.name == primary_key)
        .ok_or_else(|| PipelineError::MissingPrimaryKey {
            table: table.to_string(),
            column: primary_key.clone(),
        })?;
    if !pk_spec.kind.is_integer() {
        return Err(PipelineError::UnsupportedPrimaryKey {
            column: primary_key,
            data_type: pk_spec.data_type.clone(),
        });
    }

    let frame = source
        .fetch_above(schema, table, &columns, &primary_key, watermark)
        .await?;

    if frame.height() == 0 {
        info!(table, watermark, "no rows above watermark; nothing to upload");
        return Ok(TableExtraction {
            table: table.to_string(),
            previous_watermark: watermark,
            outcome: ExtractionOutcome::NoNewRows,
        });
    }

    let new_watermark = frame
        .column(&primary_key)?
        .cast(&DataType::Int64)?
        .i64()?
        .max()
        .ok_or_else(|| PipelineError::MissingPrimaryKey {
            table: table.to_string(),
            column: primary_key.clone(),
        })?;

    let parquet = write_parquet_bytes(&frame)?;
    let data_key = table_data_key(table, watermark + 1);
    store
        .put_object(&data_key, Bytes::from(parquet), PARQUET_CONTENT_TYPE)
        .await?;
    info!(table, key = %data_key, rows = frame.height(), "uploaded extracted batch");

    watermarks.set(table, new_watermark).await?;

    Ok(TableExtraction {
        table: table.to_string(),
        previous_watermark: watermark,
        outcome: ExtractionOutcome::Uploaded {
            data_key,
            rows: frame.height(),
            new_watermark,
        },
    })
}
