use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use linelist_cleaner::app::ports::InputMode;
use linelist_cleaner::config::{OutputConfig, TableConfig};
use linelist_cleaner::constants::OUTPUT_COLUMNS;
use linelist_cleaner::error::CleanerError;
use linelist_cleaner::infra::csv_output_adapter::CsvOutputAdapter;
use linelist_cleaner::infra::in_memory_sheet::InMemorySheet;
use linelist_cleaner::pipeline::processing::classify::classify;
use linelist_cleaner::pipeline::processing::geocode::{Gazetteer, GazetteerLayout};
use linelist_cleaner::pipeline::reconcile::ReconciliationWriter;
use linelist_cleaner::pipeline::remote_table::RemoteTable;
use linelist_cleaner::pipeline::report::TableOutcome;
use linelist_cleaner::pipeline::Orchestrator;
use linelist_cleaner::types::Violation;
use tempfile::tempdir;

const GAZETTEER: &str = "\
lyon;rhone;france\t45.75\t4.85\tpoint\tLyon\t\tLyon\tRhone\tFrance\t101
paris;ile-de-france;france\t48.85\t2.35\tadmin2\tParis\t\tParis\tIle-de-France\tFrance\t102
";

fn africa_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["ID", "age", "sex", "city", "province", "country", "aggr"],
        vec!["004-1", "30 - 39", "Male", "Lyon", "Rhone", "France", ""],
        vec!["", "45", "female", "Lyon 3", "", "France", ""],
        vec!["", "N/A ", "female", "Paris", "Ile-de-France", "France", "2"],
        vec!["004-7", "50", "", "Tokyo", "", "Japan", ""],
    ]
}

fn put(store: &InMemorySheet, spreadsheet_id: &str, sheet: &str, rows: &[Vec<&str>]) {
    let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    store.put_text(spreadsheet_id, sheet, &rows);
}

fn table(name: &str, sheet_id: &str, region_code: &str) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        sheet_id: sheet_id.to_string(),
        region_code: region_code.to_string(),
        legacy_bare_ids: false,
        id_column: "ID".to_string(),
        reference_column: "country".to_string(),
    }
}

fn output(dir: &Path) -> (OutputConfig, Arc<CsvOutputAdapter>) {
    let config = OutputConfig {
        dataset_path: dir.join("latestdata.csv"),
        report_dir: dir.join("reports"),
        misses_path: dir.join("misses.csv"),
        run_report_path: dir.join("run.json"),
    };
    let adapter = Arc::new(CsvOutputAdapter::new(&config));
    (config, adapter)
}

fn gazetteer() -> Gazetteer {
    Gazetteer::from_reader(GAZETTEER.as_bytes(), GazetteerLayout::COMPACT)
        .unwrap()
        .0
}

fn read_dataset(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

fn column(name: &str) -> usize {
    OUTPUT_COLUMNS.iter().position(|c| *c == name).unwrap()
}

#[tokio::test]
async fn test_full_run_repairs_allocates_and_publishes() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(&store, "sheet-a", "Africa", &africa_rows());
    let (config, adapter) = output(dir.path());

    let mut orchestrator = Orchestrator::new(
        vec![table("Africa", "sheet-a", "004")],
        store.clone(),
        gazetteer(),
        adapter,
        Duration::ZERO,
    );
    let report = orchestrator.run().await.unwrap();

    // remote table: precursor and grammar fixes written, ids filled in
    let remote = store.rows("sheet-a", "Africa");
    assert_eq!(remote[1][1], "30-39");
    assert_eq!(remote[1][2], "male");
    assert_eq!(remote[3][1], "NA");
    assert_eq!(remote[2][3], "Lyon 3");
    let ids: Vec<&str> = remote[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["004-1", "004-8", "004-9", "004-7"]);

    let id_write = store
        .writes()
        .into_iter()
        .find(|w| w.range == "Africa!A2:A5")
        .unwrap();
    assert_eq!(id_write.mode, InputMode::Raw);

    // review report lists the row that could not be repaired
    let review = fs::read_to_string(dir.path().join("reports/Africa_errors.csv")).unwrap();
    assert_eq!(review, "row,id,column,value\n3,,city,Lyon 3\n");

    // dataset: flagged row dropped, aggregate row expanded, geocoded
    let (header, rows) = read_dataset(&config.dataset_path);
    assert_eq!(header, OUTPUT_COLUMNS.to_vec());
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][column("id")], "004-1");
    assert_eq!(rows[0][column("age")], "30-39");
    assert_eq!(rows[0][column("latitude")], "45.75");
    assert_eq!(rows[0][column("admin_id")], "101");
    assert_eq!(rows[1][column("id")], "004-9");
    assert_eq!(rows[1][column("age")], "NA");
    assert_eq!(rows[1][column("geo_resolution")], "admin2");
    assert_eq!(rows[2][column("id")], "004-7");
    assert_eq!(rows[2][column("latitude")], "");
    assert_eq!(rows[3], rows[1]);
    assert_eq!(rows[4], rows[1]);

    let misses = fs::read_to_string(&config.misses_path).unwrap();
    assert_eq!(misses, "Tokyo,,Japan,1\n");

    assert_eq!(report.identifiers_assigned, 2);
    assert_eq!(report.geocode_hits, 2);
    assert_eq!(report.geocode_misses, 1);
    assert_eq!(report.dataset_rows, 5);
    assert_eq!(
        report.tables[0].outcome,
        TableOutcome::Processed {
            rows_read: 4,
            fixes_written: 3,
            unfixable: 1,
            rows_kept: 3,
        }
    );
    assert!(config.run_report_path.exists());
}

#[tokio::test]
async fn test_row_inserted_before_write_aborts_batch() {
    let store = Arc::new(InMemorySheet::new());
    put(
        &store,
        "sheet-a",
        "Africa",
        &[vec!["ID", "age"], vec!["004-1", "30 - 39"], vec!["004-2", "40"]],
    );
    let remote = RemoteTable::new(store.clone(), "sheet-a", "Africa");
    let snapshot = remote.fetch().await.unwrap();
    let fixes = classify(&snapshot, "ID").unwrap().fixable;
    assert_eq!(fixes.len(), 1);

    // someone inserts a row above the target between our read and write
    store.insert_row("sheet-a", "Africa", 2);

    let writer = ReconciliationWriter::new(&remote, &snapshot, "ID").unwrap();
    let err = writer.apply(&fixes).await.unwrap_err();

    match err {
        CleanerError::RemoteIdentityMismatch {
            row, expected, found, ..
        } => {
            assert_eq!(row, 2);
            assert_eq!(expected, "004-1");
            assert_eq!(found, "");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.writes().is_empty());
    assert_eq!(store.rows("sheet-a", "Africa")[2][1], "30 - 39");
}

fn gapped_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["ID", "age", "country"],
        vec!["004-1", "30", "France"],
        vec!["", "31", "France"],
        vec!["004-3", "32", "France"],
    ]
}

async fn run_expecting_mismatch(store: Arc<InMemorySheet>, dir: &Path) -> (usize, String, String) {
    let (config, adapter) = output(dir);
    let mut orchestrator = Orchestrator::new(
        vec![table("Africa", "sheet-a", "004")],
        store.clone(),
        gazetteer(),
        adapter,
        Duration::ZERO,
    );
    let err = orchestrator.run().await.unwrap_err();

    assert!(store.writes().iter().all(|w| !w.range.starts_with("Africa!A2:")));
    assert!(!config.dataset_path.exists());
    assert!(config.run_report_path.exists());
    match err {
        CleanerError::RemoteIdentityMismatch {
            table, row, expected, found,
        } => {
            assert_eq!(table, "Africa");
            (row, expected, found)
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_row_shift_after_snapshot_blocks_id_write_back() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(&store, "sheet-a", "Africa", &gapped_rows());
    // a blank row lands above the id-less row right after the snapshot;
    // the id column alone still reads 004-1, blank, blank, 004-3
    store.schedule_row_insert("sheet-a", "Africa", 3, 1);

    let (row, expected, found) = run_expecting_mismatch(store.clone(), dir.path()).await;

    assert_eq!((row, expected.as_str(), found.as_str()), (3, "", ""));
    assert!(store.writes().is_empty());
    let ids: Vec<String> = store.rows("sheet-a", "Africa")[1..]
        .iter()
        .map(|r| r.first().cloned().unwrap_or_default())
        .collect();
    assert_eq!(ids, vec!["004-1", "", "", "004-3"]);
}

#[tokio::test]
async fn test_row_shift_between_id_reads_blocks_id_write_back() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(&store, "sheet-a", "Africa", &gapped_rows());
    // reads: snapshot, re-check, id column; the shift lands before the
    // id column is read again ahead of the write
    store.schedule_row_insert("sheet-a", "Africa", 2, 3);

    let (row, expected, found) = run_expecting_mismatch(store.clone(), dir.path()).await;

    assert_eq!((row, expected.as_str(), found.as_str()), (2, "004-1", ""));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_failed_table_does_not_block_others() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(
        &store,
        "sheet-b",
        "Asia",
        &[vec!["ID", "age", "city"], vec!["005-1", "30 - 39", "Osaka"]],
    );
    put(&store, "sheet-a", "Africa", &africa_rows());
    // shift Asia's rows once the orchestrator has taken its snapshot
    store.schedule_row_insert("sheet-b", "Asia", 2, 1);
    let (config, adapter) = output(dir.path());

    let mut orchestrator = Orchestrator::new(
        vec![table("Asia", "sheet-b", "005"), table("Africa", "sheet-a", "004")],
        store.clone(),
        gazetteer(),
        adapter,
        Duration::ZERO,
    );
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.failed_tables(), vec!["Asia"]);
    match &report.tables[0].outcome {
        TableOutcome::Failed { error } => assert!(error.contains("Identity mismatch")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(store.writes().iter().all(|w| w.spreadsheet_id == "sheet-a"));

    let (_, rows) = read_dataset(&config.dataset_path);
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r[column("id")].starts_with("004-")));
}

#[tokio::test]
async fn test_missing_id_column_fails_only_that_table() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(&store, "sheet-c", "Europe", &[vec!["case", "age"], vec!["x", "30"]]);
    put(&store, "sheet-a", "Africa", &africa_rows());
    let (_, adapter) = output(dir.path());

    let mut orchestrator = Orchestrator::new(
        vec![table("Europe", "sheet-c", "006"), table("Africa", "sheet-a", "004")],
        store.clone(),
        gazetteer(),
        adapter,
        Duration::ZERO,
    );
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.failed_tables(), vec!["Europe"]);
    assert_eq!(report.dataset_rows, 5);
}

#[tokio::test]
async fn test_second_pass_over_clean_table_finds_nothing() {
    let dir = tempdir().unwrap();
    let store = Arc::new(InMemorySheet::new());
    put(&store, "sheet-a", "Africa", &africa_rows());
    let (_, adapter) = output(dir.path());
    let tables = vec![table("Africa", "sheet-a", "004")];

    Orchestrator::new(tables.clone(), store.clone(), gazetteer(), adapter.clone(), Duration::ZERO)
        .run()
        .await
        .unwrap();
    let writes_after_first = store.writes().len();

    let report = Orchestrator::new(tables, store.clone(), gazetteer(), adapter, Duration::ZERO)
        .run()
        .await
        .unwrap();

    assert_eq!(store.writes().len(), writes_after_first);
    assert_eq!(report.identifiers_assigned, 0);
    assert_eq!(
        report.tables[0].outcome,
        TableOutcome::Processed {
            rows_read: 4,
            fixes_written: 0,
            unfixable: 1,
            rows_kept: 3,
        }
    );
}

#[tokio::test]
async fn test_unfixable_violations_carry_row_and_id() {
    let store = Arc::new(InMemorySheet::new());
    put(
        &store,
        "sheet-a",
        "Africa",
        &[
            vec!["ID", "date_confirmation", "lives_in_Wuhan"],
            vec!["004-10", "2020-02-01", "1"],
            vec!["004-2", "early March", "maybe"],
        ],
    );
    let snapshot = RemoteTable::new(store.clone(), "sheet-a", "Africa")
        .fetch()
        .await
        .unwrap();

    let violations = classify(&snapshot, "ID").unwrap();

    assert_eq!(
        violations.fixable,
        vec![Violation {
            row: 2,
            id: "004-10".to_string(),
            column: "lives_in_Wuhan".to_string(),
            value: "1".to_string(),
            fix: Some("yes".to_string()),
        }]
    );
    let unfixable: Vec<(&str, &str)> = violations
        .unfixable
        .iter()
        .map(|v| (v.id.as_str(), v.column.as_str()))
        .collect();
    assert_eq!(unfixable, vec![("004-2", "lives_in_Wuhan"), ("004-10", "date_confirmation")]);
}
