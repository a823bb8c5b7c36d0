pub use sluice_bucket::{BucketError, BucketStore, MemoryBucketStore, S3BucketStore, S3Config};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub fn watermark_key(table: &str) -> String {
    format!("{table}/max_id.txt")
}

/// Data file of one incremental run; `sequence` is the previous watermark plus one.
pub fn table_data_key(table: &str, sequence: i64) -> String {
    format!("{table}/data_{sequence}.parquet")
}

pub fn sheet_data_key(worksheet: &str) -> String {
    format!("{worksheet}/data.parquet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(watermark_key("orders"), "orders/max_id.txt");
        assert_eq!(table_data_key("orders", 4), "orders/data_4.parquet");
        assert_eq!(sheet_data_key("Clientes_Bike"), "Clientes_Bike/data.parquet");
    }
}
