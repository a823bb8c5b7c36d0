use std::io::Cursor;

use polars::io::parquet::read::ParquetReader;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::{Column, DataFrame, NamedFrom, PolarsResult, SerReader, Series};
use sluice_sheets::{CellValue, SheetRecords};

/// Serializes a frame to an in-memory Parquet file.
pub fn write_parquet_bytes(df: &DataFrame) -> PolarsResult<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Snappy)
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}

pub fn read_parquet_bytes(bytes: &[u8]) -> PolarsResult<DataFrame> {
    ParquetReader::new(Cursor::new(bytes)).finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredKind {
    Int,
    Float,
    Text,
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a CellValue>) -> InferredKind {
    let mut kind = None;
    for cell in cells {
        kind = match (kind, cell) {
            (_, CellValue::Blank) => kind,
            (_, CellValue::Text(_)) => return InferredKind::Text,
            (None | Some(InferredKind::Int), CellValue::Int(_)) => Some(InferredKind::Int),
            (_, CellValue::Int(_) | CellValue::Float(_)) => Some(InferredKind::Float),
        };
    }
    kind.unwrap_or(InferredKind::Text)
}

/// Builds a frame from worksheet records.
///
/// A column whose non-blank cells are all integers becomes Int64, all numbers
/// becomes Float64, anything else is kept as text. Blank cells are nulls in numeric
/// columns and empty strings in text columns.
pub fn records_to_frame(records: &SheetRecords) -> PolarsResult<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(records.headers.len());

    for (index, header) in records.headers.iter().enumerate() {
        let series = match infer_kind(records.column(index)) {
            InferredKind::Int => {
                let values: Vec<Option<i64>> = records
                    .column(index)
                    .map(|cell| match cell {
                        CellValue::Int(value) => Some(*value),
                        _ => None,
                    })
                    .collect();
                Series::new(header.as_str().into(), values)
            }
            InferredKind::Float => {
                let values: Vec<Option<f64>> = records
                    .column(index)
                    .map(|cell| match cell {
                        CellValue::Int(value) => Some(*value as f64),
                        CellValue::Float(value) => Some(*value),
                        _ => None,
                    })
                    .collect();
                Series::new(header.as_str().into(), values)
            }
            InferredKind::Text => {
                let values: Vec<String> = records.column(index).map(CellValue::to_text).collect();
                Series::new(header.as_str().into(), values)
            }
        };
        columns.push(series.into());
    }

    DataFrame::new(columns)
}
