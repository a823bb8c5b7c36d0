use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use polars::prelude::{
    Column, DataFrame, DataType, NamedFrom, PlSmallStr, PolarsResult, Series, TimeUnit,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::ident::Dialect;

/// Source column type, as far as the extractor cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    /// Any other type; selected through `::text` so nothing is lost.
    Other,
}

impl ColumnKind {
    /// Maps an `information_schema.columns.data_type` value.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "smallint" => ColumnKind::Int16,
            "integer" => ColumnKind::Int32,
            "bigint" => ColumnKind::Int64,
            "real" => ColumnKind::Float32,
            "double precision" => ColumnKind::Float64,
            "boolean" => ColumnKind::Boolean,
            "text" | "character varying" | "character" => ColumnKind::Text,
            "date" => ColumnKind::Date,
            "timestamp without time zone" => ColumnKind::Timestamp,
            "timestamp with time zone" => ColumnKind::TimestampTz,
            _ => ColumnKind::Other,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ColumnKind::Int16 | ColumnKind::Int32 | ColumnKind::Int64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            kind: ColumnKind::from_data_type(&data_type),
            data_type,
        }
    }
}

/// A relational database the table extractor can read from.
#[async_trait]
pub trait RelationalSource: Send + Sync {
    /// Columns of `schema.table` in ordinal order; empty if the table does not exist.
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>>;

    /// Every row whose `primary_key` is strictly greater than `watermark`, ordered by it.
    async fn fetch_above(
        &self,
        schema: &str,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: &str,
        watermark: i64,
    ) -> Result<DataFrame>;
}

const COLUMNS_QUERY: &str = r#"
    SELECT column_name::text AS column_name, data_type::text AS data_type
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RelationalSource for PostgresSource {
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnSpec>> {
        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            columns.push(ColumnSpec::new(name, data_type));
        }
        Ok(columns)
    }

    async fn fetch_above(
        &self,
        schema: &str,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: &str,
        watermark: i64,
    ) -> Result<DataFrame> {
        let sql = select_above_sql(schema, table, columns, primary_key)?;
        debug!(%sql, watermark, "selecting rows above watermark");

        let mut buffers: Vec<ColumnBuffer> =
            columns.iter().map(|column| ColumnBuffer::new(column.kind)).collect();

        let mut rows = sqlx::query(&sql).bind(watermark).fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            for (index, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(&row, index)?;
            }
        }

        let mut frame_columns: Vec<Column> = Vec::with_capacity(columns.len());
        for (spec, buffer) in columns.iter().zip(buffers) {
            frame_columns.push(buffer.into_series(&spec.name)?.into());
        }
        Ok(DataFrame::new(frame_columns)?)
    }
}

/// `SELECT … FROM "schema"."table" WHERE "pk" > $1 ORDER BY "pk"`.
pub fn select_above_sql(
    schema: &str,
    table: &str,
    columns: &[ColumnSpec],
    primary_key: &str,
) -> Result<String> {
    let pg = Dialect::Postgres;
    let mut select_list = Vec::with_capacity(columns.len());
    for column in columns {
        let quoted = pg.quote(&column.name)?;
        if column.kind == ColumnKind::Other {
            select_list.push(format!("{quoted}::text AS {quoted}"));
        } else {
            select_list.push(quoted);
        }
    }
    if select_list.is_empty() {
        return Err(PipelineError::TableNotFound {
            schema: schema.to_string(),
            table: table.to_string(),
        });
    }

    let pk = pg.quote(primary_key)?;
    Ok(format!(
        "SELECT {} FROM {}.{} WHERE {pk} > $1 ORDER BY {pk}",
        select_list.join(", "),
        pg.quote(schema)?,
        pg.quote(table)?,
    ))
}

enum ColumnBuffer {
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<i32>>),
    Timestamp(Vec<Option<i64>>),
    TimestampTz(Vec<Option<i64>>),
}

impl ColumnBuffer {
    fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Int16 => ColumnBuffer::Int16(Vec::new()),
            ColumnKind::Int32 => ColumnBuffer::Int32(Vec::new()),
            ColumnKind::Int64 => ColumnBuffer::Int64(Vec::new()),
            ColumnKind::Float32 => ColumnBuffer::Float32(Vec::new()),
            ColumnKind::Float64 => ColumnBuffer::Float64(Vec::new()),
            ColumnKind::Boolean => ColumnBuffer::Boolean(Vec::new()),
            ColumnKind::Text | ColumnKind::Other => ColumnBuffer::Text(Vec::new()),
            ColumnKind::Date => ColumnBuffer::Date(Vec::new()),
            ColumnKind::Timestamp => ColumnBuffer::Timestamp(Vec::new()),
            ColumnKind::TimestampTz => ColumnBuffer::TimestampTz(Vec::new()),
        }
    }

    fn push(&mut self, row: &PgRow, index: usize) -> std::result::Result<(), sqlx::Error> {
        match self {
            ColumnBuffer::Int16(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Int32(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Int64(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Float32(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Float64(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Boolean(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Text(values) => values.push(row.try_get(index)?),
            ColumnBuffer::Date(values) => {
                let date: Option<NaiveDate> = row.try_get(index)?;
                values.push(date.map(days_since_epoch));
            }
            ColumnBuffer::Timestamp(values) => {
                let timestamp: Option<NaiveDateTime> = row.try_get(index)?;
                values.push(timestamp.map(|ts| ts.and_utc().timestamp_micros()));
            }
            ColumnBuffer::TimestampTz(values) => {
                let timestamp: Option<DateTime<Utc>> = row.try_get(index)?;
                values.push(timestamp.map(|ts| ts.timestamp_micros()));
            }
        }
        Ok(())
    }

    fn into_series(self, name: &str) -> PolarsResult<Series> {
        let name: PlSmallStr = name.into();
        Ok(match self {
            ColumnBuffer::Int16(values) => Series::new(name, values),
            ColumnBuffer::Int32(values) => Series::new(name, values),
            ColumnBuffer::Int64(values) => Series::new(name, values),
            ColumnBuffer::Float32(values) => Series::new(name, values),
            ColumnBuffer::Float64(values) => Series::new(name, values),
            ColumnBuffer::Boolean(values) => Series::new(name, values),
            ColumnBuffer::Text(values) => Series::new(name, values),
            ColumnBuffer::Date(values) => Series::new(name, values).cast(&DataType::Date)?,
            ColumnBuffer::Timestamp(values) => Series::new(name, values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
            ColumnBuffer::TimestampTz(values) => Series::new(name, values).cast(
                &DataType::Datetime(
                    TimeUnit::Microseconds,
                    Some(polars::prelude::TimeZone::UTC),
                ),
            )?,
        })
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(DateTime::UNIX_EPOCH.date_naive())
        .num_days() as i32
}
