use bytes::Bytes;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::object_store::{watermark_key, BucketStore, TEXT_CONTENT_TYPE};

/// Per-table max-id cursor kept as a text object next to the extracted data.
///
/// Writes are single-key overwrites; two runs against the same table at once can
/// race and nothing here prevents it.
pub struct WatermarkStore<'a> {
    store: &'a dyn BucketStore,
}

impl<'a> WatermarkStore<'a> {
    pub fn new(store: &'a dyn BucketStore) -> Self {
        Self { store }
    }

    /// Current watermark, or 0 when the table has never been extracted.
    pub async fn get(&self, table: &str) -> Result<i64> {
        let key = watermark_key(table);
        match self.store.get_object(&key).await {
            Ok(bytes) => {
                let watermark = parse_watermark(&key, &bytes)?;
                info!(table, watermark, "loaded watermark");
                Ok(watermark)
            }
            Err(err) if err.is_not_found() => {
                info!(table, "no watermark stored yet, starting from 0");
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn set(&self, table: &str, value: i64) -> Result<()> {
        let key = watermark_key(table);
        if value < 0 {
            return Err(PipelineError::InvalidWatermark {
                key,
                value: value.to_string(),
            });
        }
        self.store
            .put_object(&key, Bytes::from(value.to_string()), TEXT_CONTENT_TYPE)
            .await?;
        info!(table, watermark = value, "stored watermark");
        Ok(())
    }

    /// Removes the cursor so the next run re-extracts the whole table.
    pub async fn reset(&self, table: &str) -> Result<()> {
        self.store.delete_object(&watermark_key(table)).await?;
        info!(table, "watermark reset");
        Ok(())
    }
}

fn parse_watermark(key: &str, bytes: &[u8]) -> Result<i64> {
    let invalid = || PipelineError::InvalidWatermark {
        key: key.to_string(),
        value: String::from_utf8_lossy(bytes).into_owned(),
    };

    let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
    let value: i64 = text.trim().parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(invalid());
    }
    Ok(value)
}
