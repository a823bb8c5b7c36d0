use std::fmt;

/// A single worksheet cell after numericising.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Interprets the formatted cell text the way a spreadsheet reader would:
    /// integers first, then floats, otherwise the text is kept verbatim.
    /// Numbers written with `_` separators stay text.
    pub fn numericise(raw: &str) -> Self {
        if raw.is_empty() {
            return CellValue::Blank;
        }
        if raw.contains('_') {
            return CellValue::Text(raw.to_string());
        }

        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return CellValue::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return CellValue::Float(value);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// Text rendering used when every column is stored as a string.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Blank => Ok(()),
            CellValue::Int(value) => write!(f, "{value}"),
            // Debug keeps the fractional part of integral floats: 120.0, not 120.
            CellValue::Float(value) => write!(f, "{value:?}"),
            CellValue::Text(value) => f.write_str(value),
        }
    }
}

/// All records of a worksheet, column-aligned.
///
/// `headers` holds each distinct header once, in the order it first appears in the
/// header row. Every entry of `rows` has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRecords {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetRecords {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Column values for the header at `index`, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Iterates records as `(header, value)` pairs, mirroring a field mapping per row.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &CellValue)>> + '_ {
        self.rows.iter().map(|row| {
            self.headers
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }
}
