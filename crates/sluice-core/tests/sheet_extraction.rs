use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use polars::prelude::*;
use sluice_core::{
    config::HeaderFallbacks,
    error::PipelineError,
    frame::read_parquet_bytes,
    object_store::MemoryBucketStore,
    pipelines::{extract_sheet, RunContext, SyncStatus},
    sink::{SecondarySink, TextTable},
};
use sluice_sheets::{build_records, SheetError, SheetRecords, WorksheetSource};

/// Serves a fixed value grid and records the expected headers of every read.
struct FakeWorksheet {
    title: String,
    values: Vec<Vec<String>>,
    calls: Mutex<Vec<Option<Vec<String>>>>,
}

impl FakeWorksheet {
    fn new(title: &str, rows: &[&[&str]]) -> Self {
        Self {
            title: title.to_string(),
            values: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Option<Vec<String>>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorksheetSource for FakeWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn get_all_records(
        &self,
        expected_headers: Option<&[String]>,
    ) -> Result<SheetRecords, SheetError> {
        self.calls
            .lock()
            .unwrap()
            .push(expected_headers.map(<[String]>::to_vec));
        build_records(&self.values, expected_headers)
    }
}

#[derive(Default)]
struct RecordingSink {
    fail: bool,
    synced: Mutex<Vec<(String, TextTable)>>,
}

#[async_trait]
impl SecondarySink for RecordingSink {
    async fn sync_table(&self, table: &str, rows: &TextTable) -> sluice_core::error::Result<usize> {
        if self.fail {
            return Err(PipelineError::Config("connection refused".into()));
        }
        self.synced
            .lock()
            .unwrap()
            .push((table.to_string(), rows.clone()));
        Ok(rows.rows.len())
    }
}

fn ctx(sheet: &str) -> RunContext {
    RunContext::new("extract-sheet", sheet)
}

fn clientes_with_duplicate_headers() -> FakeWorksheet {
    FakeWorksheet::new(
        "Clientes_Bike",
        &[
            &["ClienteID", "Cliente", "Estado", "Sexo", "Status", "Obs", "Obs"],
            &["1", "Ana", "SP", "F", "Silver", "", "vip"],
            &["2", "Bruno", "RJ", "M", "Gold", "", ""],
        ],
    )
}

#[tokio::test]
async fn duplicate_headers_recover_with_the_known_header_list() -> Result<()> {
    let store = MemoryBucketStore::new();
    let worksheet = clientes_with_duplicate_headers();
    let sink = RecordingSink::default();

    let report = extract_sheet(
        &ctx("Clientes_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await?;

    let expected: Vec<String> = ["ClienteID", "Cliente", "Estado", "Sexo", "Status"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    assert_eq!(worksheet.calls(), vec![None, Some(expected)]);
    assert!(report.used_fallback_headers);
    assert_eq!(report.rows, 2);
    assert_eq!(report.data_key, "Clientes_Bike/data.parquet");
    assert_eq!(report.sync, SyncStatus::Synced { rows: 2 });
    assert_eq!(
        report.columns,
        ["ClienteID", "Cliente", "Estado", "Sexo", "Status", "Obs"]
    );
    assert!(store.object("Clientes_Bike/data.parquet").await.is_some());

    let synced = sink.synced.lock().unwrap();
    assert_eq!(synced[0].1.rows[0][5], "vip");
    Ok(())
}

#[tokio::test]
async fn trailing_unnamed_columns_still_sync_after_recovery() -> Result<()> {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new(
        "Clientes_Bike",
        &[
            &["ClienteID", "Cliente", "Estado", "Sexo", "Status", "", ""],
            &["1", "Ana", "SP", "F", "Silver", "", ""],
            &["2", "Bruno", "RJ", "M", "Gold", "", "x"],
        ],
    );
    let sink = RecordingSink::default();

    let report = extract_sheet(
        &ctx("Clientes_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await?;

    assert!(report.used_fallback_headers);
    assert_eq!(report.sync, SyncStatus::Synced { rows: 2 });
    assert_eq!(
        report.columns,
        ["ClienteID", "Cliente", "Estado", "Sexo", "Status", ""]
    );
    assert!(store.object("Clientes_Bike/data.parquet").await.is_some());

    let synced = sink.synced.lock().unwrap();
    let (_, rows) = &synced[0];
    assert_eq!(rows.columns, ["ClienteID", "Cliente", "Estado", "Sexo", "Status"]);
    assert_eq!(rows.rows[1], ["2", "Bruno", "RJ", "M", "Gold"]);
    assert!(sluice_core::sink::UpsertStatements::build("Clientes_Bike", &rows.columns).is_ok());
    Ok(())
}

#[tokio::test]
async fn duplicate_headers_on_unknown_worksheet_raise() {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new("Planilha1", &[&["A", "A"], &["1", "2"]]);
    let sink = RecordingSink::default();

    let err = extract_sheet(
        &ctx("Planilha1"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Sheet(SheetError::DuplicateHeaders { .. })
    ));
    assert_eq!(worksheet.calls().len(), 1);
    assert!(store.keys().await.is_empty());
    assert!(sink.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn injected_fallbacks_replace_the_builtin_table() {
    let store = MemoryBucketStore::new();
    let worksheet = clientes_with_duplicate_headers();

    let err = extract_sheet(
        &ctx("Clientes_Bike"),
        &worksheet,
        &HeaderFallbacks::empty(),
        &store,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Sheet(_)));
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn empty_worksheet_is_a_domain_error_without_uploads() {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new("Vendas_Bike", &[&["VendasID", "Total"]]);
    let sink = RecordingSink::default();

    let err = extract_sheet(
        &ctx("Vendas_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::EmptyWorksheet { .. }));
    assert!(store.keys().await.is_empty());
    assert!(sink.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn uploaded_parquet_round_trips_the_records() -> Result<()> {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new(
        "Produtos_Bike",
        &[
            &["ProdutoID", "Produto", "Preco"],
            &["1", "Bicicleta Aro 29", "3500.5"],
            &["2", "Capacete", "120"],
            &["3", "Luva", "45.9"],
        ],
    );

    let report = extract_sheet(
        &ctx("Produtos_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        None,
    )
    .await?;
    assert_eq!(report.sync, SyncStatus::Skipped);
    assert!(!report.used_fallback_headers);

    let object = store
        .object("Produtos_Bike/data.parquet")
        .await
        .expect("worksheet uploaded");
    let frame = read_parquet_bytes(&object.bytes)?;

    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, report.columns);
    assert_eq!(frame.height(), 3);
    assert_eq!(frame.column("ProdutoID")?.dtype(), &DataType::Int64);
    assert_eq!(frame.column("Preco")?.dtype(), &DataType::Float64);
    assert_eq!(frame.column("Produto")?.str()?.get(1), Some("Capacete"));
    Ok(())
}

#[tokio::test]
async fn sink_receives_rows_flattened_to_text() -> Result<()> {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new(
        "Vendedores_Bike",
        &[&["VendedorID", "Vendedor"], &["10", "Carlos"], &["11", "Dora"]],
    );
    let sink = RecordingSink::default();

    extract_sheet(
        &ctx("Vendedores_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await?;

    let synced = sink.synced.lock().unwrap();
    assert_eq!(synced.len(), 1);
    let (table, rows) = &synced[0];
    assert_eq!(table, "Vendedores_Bike");
    assert_eq!(rows.columns, ["VendedorID", "Vendedor"]);
    assert_eq!(rows.rows, vec![vec!["10", "Carlos"], vec!["11", "Dora"]]);
    Ok(())
}

#[tokio::test]
async fn sink_failure_is_reported_after_the_upload() -> Result<()> {
    let store = MemoryBucketStore::new();
    let worksheet = FakeWorksheet::new(
        "Vendedores_Bike",
        &[&["VendedorID", "Vendedor"], &["10", "Carlos"]],
    );
    let sink = RecordingSink {
        fail: true,
        ..RecordingSink::default()
    };

    let report = extract_sheet(
        &ctx("Vendedores_Bike"),
        &worksheet,
        &HeaderFallbacks::builtin(),
        &store,
        Some(&sink),
    )
    .await?;

    assert!(report.sync.is_failed());
    assert!(store.object("Vendedores_Bike/data.parquet").await.is_some());
    Ok(())
}

#[tokio::test]
async fn reruns_overwrite_the_single_data_object() -> Result<()> {
    let store = MemoryBucketStore::new();
    let first = FakeWorksheet::new("Vendedores_Bike", &[&["VendedorID"], &["1"], &["2"]]);
    let second = FakeWorksheet::new("Vendedores_Bike", &[&["VendedorID"], &["1"]]);
    let fallbacks = HeaderFallbacks::builtin();

    extract_sheet(&ctx("Vendedores_Bike"), &first, &fallbacks, &store, None).await?;
    extract_sheet(&ctx("Vendedores_Bike"), &second, &fallbacks, &store, None).await?;

    assert_eq!(store.keys().await, vec!["Vendedores_Bike/data.parquet".to_string()]);
    let object = store
        .object("Vendedores_Bike/data.parquet")
        .await
        .expect("uploaded");
    assert_eq!(read_parquet_bytes(&object.bytes)?.height(), 1);
    Ok(())
}
