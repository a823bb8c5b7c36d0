//! Secondary MySQL/MariaDB table kept in step with a worksheet.

use async_trait::async_trait;
use sluice_sheets::SheetRecords;
use sqlx::MySqlPool;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::ident::Dialect;

/// Rows flattened to text, the only type the secondary table stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TextTable {
    /// Columns with a blank header are dropped: they have no name to create in the
    /// secondary table. They only survive header-fallback reads.
    pub fn from_records(records: &SheetRecords) -> Self {
        let named: Vec<usize> = records
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.trim().is_empty())
            .map(|(index, _)| index)
            .collect();

        Self {
            columns: named
                .iter()
                .map(|&index| records.headers[index].clone())
                .collect(),
            rows: records
                .rows
                .iter()
                .map(|row| named.iter().map(|&index| row[index].to_text()).collect())
                .collect(),
        }
    }

    /// The first column doubles as the natural key.
    pub fn key_column(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }
}

/// Destination for the update-or-insert synchronisation of a worksheet.
#[async_trait]
pub trait SecondarySink: Send + Sync {
    /// Creates `table` if needed and upserts every row keyed by the first column.
    /// Returns the number of rows processed.
    async fn sync_table(&self, table: &str, rows: &TextTable) -> Result<usize>;
}

/// Statements shared by every row of one sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatements {
    pub create_table: String,
    pub update: String,
    pub insert: String,
}

impl UpsertStatements {
    pub fn build(table: &str, columns: &[String]) -> Result<Self> {
        let my = Dialect::MySql;
        let table = my.quote(table)?;
        let quoted = my.quote_all(columns.iter().map(String::as_str))?;
        let Some(key) = quoted.first() else {
            return Err(PipelineError::Config(format!(
                "cannot sync {table}: the worksheet has no columns"
            )));
        };

        let definitions: Vec<String> = quoted
            .iter()
            .map(|column| format!("{column} VARCHAR(255)"))
            .collect();
        let assignments: Vec<String> = quoted
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect();
        let placeholders = vec!["?"; quoted.len()].join(", ");

        Ok(Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {table} ({}, PRIMARY KEY ({key}))",
                definitions.join(", ")
            ),
            update: format!(
                "UPDATE {table} SET {} WHERE {key} = ?",
                assignments.join(", ")
            ),
            insert: format!(
                "INSERT IGNORE INTO {table} ({}) VALUES ({placeholders})",
                quoted.join(", ")
            ),
        })
    }
}

pub struct MySqlSink {
    pool: MySqlPool,
}

impl MySqlSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl SecondarySink for MySqlSink {
    async fn sync_table(&self, table: &str, rows: &TextTable) -> Result<usize> {
        let statements = UpsertStatements::build(table, &rows.columns)?;

        // DDL commits implicitly in MySQL, so it runs ahead of the row transaction.
        sqlx::query(&statements.create_table)
            .execute(&self.pool)
            .await?;
        info!(table, "secondary table checked/created");

        let mut tx = self.pool.begin().await?;
        for row in &rows.rows {
            let mut update = sqlx::query(&statements.update);
            for value in row {
                update = update.bind(value.as_str());
            }
            let key = row.first().map(String::as_str).unwrap_or_default();
            update.bind(key).execute(&mut *tx).await?;

            let mut insert = sqlx::query(&statements.insert);
            for value in row {
                insert = insert.bind(value.as_str());
            }
            insert.execute(&mut *tx).await?;
            debug!(table, key, "row upserted");
        }
        tx.commit().await?;

        info!(table, rows = rows.rows.len(), "secondary table synchronised");
        Ok(rows.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_sheets::CellValue;

    #[test]
    fn builds_quoted_upsert_statements() {
        let columns = vec!["VendedorID".to_string(), "Vendedor".to_string()];
        let statements = UpsertStatements::build("Vendedores_Bike", &columns).unwrap();

        assert_eq!(
            statements.create_table,
            "CREATE TABLE IF NOT EXISTS `Vendedores_Bike` (`VendedorID` VARCHAR(255), \
             `Vendedor` VARCHAR(255), PRIMARY KEY (`VendedorID`))"
        );
        assert_eq!(
            statements.update,
            "UPDATE `Vendedores_Bike` SET `VendedorID` = ?, `Vendedor` = ? WHERE `VendedorID` = ?"
        );
        assert_eq!(
            statements.insert,
            "INSERT IGNORE INTO `Vendedores_Bike` (`VendedorID`, `Vendedor`) VALUES (?, ?)"
        );
    }

    #[test]
    fn refuses_tables_without_columns_or_with_bad_names() {
        assert!(UpsertStatements::build("empty", &[]).is_err());
        assert!(UpsertStatements::build("t", &["".to_string()]).is_err());
    }

    #[test]
    fn text_table_flattens_every_cell() {
        let records = SheetRecords {
            headers: vec!["ProdutoID".into(), "Preco".into()],
            rows: vec![vec![CellValue::Int(5), CellValue::Float(19.9)], vec![
                CellValue::Int(6),
                CellValue::Blank,
            ]],
        };

        let table = TextTable::from_records(&records);
        assert_eq!(table.key_column(), Some("ProdutoID"));
        assert_eq!(table.rows, vec![vec!["5", "19.9"], vec!["6", ""]]);
    }

    #[test]
    fn text_table_skips_columns_without_a_header() {
        let records = SheetRecords {
            headers: vec!["ClienteID".into(), "Status".into(), "".into()],
            rows: vec![vec![
                CellValue::Int(1),
                CellValue::Text("Gold".into()),
                CellValue::Text("stray".into()),
            ]],
        };

        let table = TextTable::from_records(&records);
        assert_eq!(table.columns, ["ClienteID", "Status"]);
        assert_eq!(table.rows, vec![vec!["1", "Gold"]]);
        assert!(UpsertStatements::build("Clientes_Bike", &table.columns).is_ok());
    }
}
