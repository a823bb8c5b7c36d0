pub mod client;
pub mod errors;
pub mod model;
mod records;

pub use client::{
    GoogleSheetsClient, SheetsClientConfig, Worksheet, WorksheetSource, DEFAULT_CREDENTIALS_PATH,
    READONLY_SCOPE,
};
pub use errors::SheetError;
pub use model::{CellValue, SheetRecords};
pub use records::build_records;
