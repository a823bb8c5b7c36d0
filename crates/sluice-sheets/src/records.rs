use std::collections::{HashMap, HashSet};

use crate::errors::SheetError;
use crate::model::{CellValue, SheetRecords};

/// Turns the raw value grid of a worksheet into records keyed by the header row.
///
/// Without `expected_headers` every header must be unique. With them, only the listed
/// headers must be unique (and present); other repeated headers collapse onto their
/// right-most column.
pub fn build_records(
    values: &[Vec<String>],
    expected_headers: Option<&[String]>,
) -> Result<SheetRecords, SheetError> {
    let Some((keys, data)) = values.split_first() else {
        return Ok(SheetRecords::default());
    };
    if keys.is_empty() {
        return Ok(SheetRecords::default());
    }

    let counts = header_counts(keys);
    match expected_headers {
        None => {
            let duplicates = duplicated(keys, &counts);
            if !duplicates.is_empty() {
                return Err(SheetError::DuplicateHeaders { duplicates });
            }
        }
        Some(expected) => validate_expected(expected, &counts)?,
    }

    let mut headers: Vec<String> = Vec::with_capacity(counts.len());
    let mut source_index: Vec<usize> = Vec::with_capacity(counts.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(counts.len());
    for (column, key) in keys.iter().enumerate() {
        match positions.get(key.as_str()) {
            Some(&slot) => source_index[slot] = column,
            None => {
                positions.insert(key.as_str(), headers.len());
                headers.push(key.clone());
                source_index.push(column);
            }
        }
    }

    let rows = data
        .iter()
        .map(|row| {
            source_index
                .iter()
                .map(|&column| {
                    row.get(column)
                        .map(|raw| CellValue::numericise(raw))
                        .unwrap_or(CellValue::Blank)
                })
                .collect()
        })
        .collect();

    Ok(SheetRecords { headers, rows })
}

fn header_counts(keys: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::with_capacity(keys.len());
    for key in keys {
        *counts.entry(key.as_str()).or_insert(0) += 1;
    }
    counts
}

fn duplicated(keys: &[String], counts: &HashMap<&str, usize>) -> Vec<String> {
    let mut seen = Vec::new();
    for key in keys {
        if counts.get(key.as_str()).copied().unwrap_or(0) > 1 && !seen.contains(key) {
            seen.push(key.clone());
        }
    }
    seen
}

fn validate_expected(expected: &[String], counts: &HashMap<&str, usize>) -> Result<(), SheetError> {
    let mut listed = HashSet::with_capacity(expected.len());
    for header in expected {
        if !listed.insert(header.as_str()) {
            return Err(SheetError::ExpectedHeaders {
                reason: format!("'{header}' is listed more than once"),
            });
        }
    }

    let unknown: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|header| !counts.contains_key(header))
        .collect();
    if !unknown.is_empty() {
        return Err(SheetError::ExpectedHeaders {
            reason: format!("unknown headers {unknown:?}"),
        });
    }

    let repeated: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|header| counts.get(header).copied().unwrap_or(0) > 1)
        .collect();
    if !repeated.is_empty() {
        return Err(SheetError::ExpectedHeaders {
            reason: format!("headers {repeated:?} appear more than once in the header row"),
        });
    }

    Ok(())
}
