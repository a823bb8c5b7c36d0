use bytes::Bytes;
use serde::Serialize;
use sluice_sheets::{SheetRecords, WorksheetSource};
use tracing::{error, info, warn, Instrument};

use super::RunContext;
use crate::config::HeaderFallbacks;
use crate::error::{PipelineError, Result};
use crate::frame::{records_to_frame, write_parquet_bytes};
use crate::object_store::{sheet_data_key, BucketStore, PARQUET_CONTENT_TYPE};
use crate::sink::{SecondarySink, TextTable};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Synced { rows: usize },
    Failed { error: String },
    Skipped,
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SheetExtraction {
    pub worksheet: String,
    pub data_key: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub used_fallback_headers: bool,
    pub sync: SyncStatus,
}

/// Reads every record of `worksheet`, overwrites `{worksheet}/data.parquet`, then
/// upserts the rows into the secondary table of the same name.
///
/// Read and upload failures abort the run. A sink failure does not: the upload has
/// already happened, so it is reported through [`SyncStatus::Failed`].
pub async fn extract_sheet(
    ctx: &RunContext,
    worksheet: &dyn WorksheetSource,
    fallbacks: &HeaderFallbacks,
    store: &dyn BucketStore,
    sink: Option<&dyn SecondarySink>,
) -> Result<SheetExtraction> {
    run(worksheet, fallbacks, store, sink)
        .instrument(ctx.span().clone())
        .await
}

async fn run(
    worksheet: &dyn WorksheetSource,
    fallbacks: &HeaderFallbacks,
    store: &dyn BucketStore,
    sink: Option<&dyn SecondarySink>,
) -> Result<SheetExtraction> {
    let name = worksheet.title().to_string();
    let (records, used_fallback_headers) = fetch_records(worksheet, fallbacks).await?;

    if records.is_empty() {
        error!(worksheet = %name, "worksheet returned no records");
        return Err(PipelineError::EmptyWorksheet { worksheet: name });
    }

    let data_key = sheet_data_key(&name);
    if let Err(err) = upload(&records, store, &data_key).await {
        error!(worksheet = %name, error = %err, "failed to upload worksheet batch");
        return Err(err);
    }
    info!(worksheet = %name, key = %data_key, rows = records.len(), "uploaded worksheet batch");

    let sync = match sink {
        None => SyncStatus::Skipped,
        Some(sink) => match sink.sync_table(&name, &TextTable::from_records(&records)).await {
            Ok(rows) => SyncStatus::Synced { rows },
            Err(err) => {
                error!(worksheet = %name, error = %err, "secondary table sync failed");
                SyncStatus::Failed {
                    error: err.to_string(),
                }
            }
        },
    };

    Ok(SheetExtraction {
        worksheet: name,
        data_key,
        rows: records.len(),
        columns: records.headers.clone(),
        used_fallback_headers,
        sync,
    })
}

async fn fetch_records(
    worksheet: &dyn WorksheetSource,
    fallbacks: &HeaderFallbacks,
) -> Result<(SheetRecords, bool)> {
    let name = worksheet.title();
    match worksheet.get_all_records(None).await {
        Ok(records) => Ok((records, false)),
        Err(err) if err.is_duplicate_headers() => {
            let Some(expected) = fallbacks.get(name) else {
                error!(worksheet = name, error = %err, "duplicate headers and no fallback header list");
                return Err(err.into());
            };
            warn!(worksheet = name, error = %err, "duplicate headers; retrying with the configured header list");
            match worksheet.get_all_records(Some(expected)).await {
                Ok(records) => Ok((records, true)),
                Err(err) => {
                    error!(worksheet = name, error = %err, "failed to read worksheet with fallback headers");
                    Err(err.into())
                }
            }
        }
        Err(err) => {
            error!(worksheet = name, error = %err, "failed to read worksheet");
            Err(err.into())
        }
    }
}

async fn upload(records: &SheetRecords, store: &dyn BucketStore, key: &str) -> Result<()> {
    let frame = records_to_frame(records)?;
    let parquet = write_parquet_bytes(&frame)?;
    store
        .put_object(key, Bytes::from(parquet), PARQUET_CONTENT_TYPE)
        .await?;
    Ok(())
}
