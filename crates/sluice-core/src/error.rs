// crates/sluice-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Object store error: {0}")]
    Bucket(#[from] sluice_bucket::BucketError),

    #[error("Worksheet read failed: {0}")]
    Sheet(#[from] sluice_sheets::SheetError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watermark at {key} is not a non-negative integer: {value:?}")]
    InvalidWatermark { key: String, value: String },

    #[error("Table {schema}.{table} has no columns (does it exist?)")]
    TableNotFound { schema: String, table: String },

    #[error("Table {table} has no primary key column {column}")]
    MissingPrimaryKey { table: String, column: String },

    #[error("Primary key column {column} must be an integer column, found {data_type}")]
    UnsupportedPrimaryKey { column: String, data_type: String },

    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("No data was returned for worksheet {worksheet}")]
    EmptyWorksheet { worksheet: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
