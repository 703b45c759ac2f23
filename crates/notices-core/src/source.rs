use crate::config::Config;
use crate::error::Result;
use crate::graph::GraphClient;
use crate::sequencer::{slot_state, SlotState};
use crate::table::{Columns, Row, Table};
use crate::types::Slot;
use crate::xlsx::Workbook;
use std::path::PathBuf;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// TableSource
// ---------------------------------------------------------------------------

/// Somewhere resident rows can be loaded from.
pub trait TableSource {
    /// Human-readable location for logs.
    fn describe(&self) -> String;

    fn sheet_names(&self) -> Result<Vec<String>>;

    /// Read the configured sheet into a table. Read-only.
    fn load(&self) -> Result<Table>;
}

pub struct LocalWorkbook {
    path: PathBuf,
    sheet: String,
    header_row: u32,
    honor_sheet_filters: bool,
}

impl LocalWorkbook {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.workbook_path(),
            sheet: config.source.sheet.clone(),
            header_row: config.source.header_row,
            honor_sheet_filters: config.source.honor_sheet_filters,
        }
    }
}

impl TableSource for LocalWorkbook {
    fn describe(&self) -> String {
        format!("{} [{}]", self.path.display(), self.sheet)
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(Workbook::open(&self.path)?.sheet_names())
    }

    fn load(&self) -> Result<Table> {
        let mut book = Workbook::open(&self.path)?;
        let mut sheet = book.read_sheet(&self.sheet)?;
        if !self.honor_sheet_filters {
            sheet.auto_filter = None;
        }
        Table::from_sheet(&sheet, self.header_row)
    }
}

/// Worksheet of a remotely hosted workbook; the first row of its used range holds the headers.
pub struct RemoteWorkbook {
    client: Rc<GraphClient>,
    sheet: String,
}

impl RemoteWorkbook {
    pub fn new(client: Rc<GraphClient>, config: &Config) -> Self {
        Self {
            client,
            sheet: config.source.sheet.clone(),
        }
    }
}

impl TableSource for RemoteWorkbook {
    fn describe(&self) -> String {
        format!("remote workbook [{}]", self.sheet)
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(self
            .client
            .worksheets()?
            .into_iter()
            .map(|w| w.name)
            .collect())
    }

    fn load(&self) -> Result<Table> {
        let range = self.client.used_range(&self.sheet)?;
        let (_, first_row) = range.origin();
        Table::from_sheet(&range.to_sheet(), first_row)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Rows that pass every configured filter, the sheet's saved auto-filter,
/// and still have at least one letter open. Source order is kept.
pub fn select(table: &Table, columns: &Columns) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|row| {
            columns
                .filters
                .iter()
                .all(|(col, expected)| row.text(*col) == *expected)
        })
        .filter(|row| {
            table
                .sheet_filters
                .iter()
                .all(|(col, accepted)| accepted.iter().any(|v| row.text(*col).trim() == v.trim()))
        })
        .filter(|row| {
            Slot::all()
                .iter()
                .any(|slot| slot_state(row, columns.letter(*slot)) == SlotState::NotSent)
        })
        .cloned()
        .collect()
}

/// Load the configured sheet, bind columns and select the rows to process.
///
/// Every error here is fatal for the run: nothing has been generated yet.
pub fn load_rows(source: &dyn TableSource, config: &Config) -> Result<(Columns, Vec<Row>)> {
    let table = source.load()?;
    let columns = Columns::resolve(config, &table.headers)?;
    let rows = select(&table, &columns);
    tracing::info!(
        source = %source.describe(),
        total = table.rows.len(),
        selected = rows.len(),
        "rows loaded"
    );
    Ok((columns, rows))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoticeError;
    use crate::graph::tests::{mock_sheets, mock_token, remote_config};
    use crate::xlsx;
    use tempfile::TempDir;

    const HEADERS: [&str; 8] = [
        "ITEM LOCATION / ADDRESS",
        "Supplied Contact",
        "PO number / Action Number",
        "1ST ACCESS LETTER DATE/CALL",
        "2ND ACCESS LETTER DATE/CALL",
        "3RD ACCESS LETTER DATE/CALL",
        "Review 1",
        "ORDER STATUS",
    ];

    fn row(addr: &str, l1: &str, l2: &str, l3: &str, status: &str) -> Vec<String> {
        [addr, "Ann Smith", "1000", l1, l2, l3, "A NEW DOOR/S REQUIRED", status]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn workbook(dir: &TempDir, rows: Vec<Vec<String>>) -> Config {
        let mut data = vec![HEADERS.iter().map(|s| s.to_string()).collect()];
        data.extend(rows);
        xlsx::create_workbook(&dir.path().join("residents.xlsx"), &[("TRACKER", data)]).unwrap();
        let mut cfg = Config::sample();
        cfg.base_dir = dir.path().to_path_buf();
        cfg
    }

    #[test]
    fn filter_keeps_matching_rows_with_open_letters() {
        let dir = TempDir::new().unwrap();
        let sent = "sent letter 01 January 2024";
        let mut rows = Vec::new();
        for i in 0..10 {
            let status = if i % 3 == 0 { "ACTIVE" } else { "CLOSED" };
            rows.push(row(&format!("{i} Oak St"), "", "", "", status));
        }
        // 4 ACTIVE rows (0, 3, 6, 9); close every letter on one of them
        rows[9] = row("9 Oak St", sent, sent, sent, "ACTIVE");
        let cfg = workbook(&dir, rows);

        let (columns, selected) = load_rows(&LocalWorkbook::new(&cfg), &cfg).unwrap();
        let addrs: Vec<String> = selected.iter().map(|r| r.text(columns.address)).collect();
        assert_eq!(addrs, ["0 Oak St", "3 Oak St", "6 Oak St"]);
    }

    #[test]
    fn filter_match_is_exact() {
        let dir = TempDir::new().unwrap();
        let cfg = workbook(
            &dir,
            vec![row("1 Oak St", "", "", "", "active"), row("2 Oak St", "", "", "", "ACTIVE ")],
        );
        let (_, selected) = load_rows(&LocalWorkbook::new(&cfg), &cfg).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn missing_configured_column_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut cfg = workbook(&dir, vec![row("1 Oak St", "", "", "", "ACTIVE")]);
        cfg.placeholders
            .insert("FLAT".to_string(), "Flat Number".to_string());
        let err = load_rows(&LocalWorkbook::new(&cfg), &cfg).unwrap_err();
        assert!(matches!(err, NoticeError::MissingColumn(ref c) if c == "Flat Number"));
        assert!(err.is_fatal());
    }

    #[test]
    fn sheet_name_is_exact() {
        let dir = TempDir::new().unwrap();
        let mut cfg = workbook(&dir, vec![]);
        cfg.source.sheet = "TRACKER ".to_string();
        assert!(matches!(
            LocalWorkbook::new(&cfg).load(),
            Err(NoticeError::SheetNotFound(_))
        ));
    }

    #[test]
    fn missing_workbook_is_data_source_error() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::sample();
        cfg.base_dir = dir.path().to_path_buf();
        assert!(matches!(
            LocalWorkbook::new(&cfg).load(),
            Err(NoticeError::DataSource(_))
        ));
    }

    #[test]
    fn saved_auto_filter_is_applied() {
        let dir = TempDir::new().unwrap();
        let mut data: Vec<Vec<String>> = vec![HEADERS.iter().map(|s| s.to_string()).collect()];
        data.push(row("1 Oak St", "", "", "", "ACTIVE"));
        data.push(row("2 Oak St", "", "", "", "ACTIVE"));
        let mut sheet = xlsx::sheet_xml(&data);
        // show only "1 Oak St" in column A
        sheet = sheet.replace(
            "</sheetData>",
            r#"</sheetData><autoFilter ref="A1:H3"><filterColumn colId="0"><filters><filter val="1 Oak St"/></filters></filterColumn></autoFilter>"#,
        );
        let path = dir.path().join("residents.xlsx");
        std::fs::write(&path, xlsx::package(&[("TRACKER", sheet)]).unwrap()).unwrap();
        let mut cfg = Config::sample();
        cfg.base_dir = dir.path().to_path_buf();

        let (_, selected) = load_rows(&LocalWorkbook::new(&cfg), &cfg).unwrap();
        assert_eq!(selected.len(), 1);

        cfg.source.honor_sheet_filters = false;
        let (_, selected) = load_rows(&LocalWorkbook::new(&cfg), &cfg).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn remote_rows_use_first_used_row_as_headers() {
        let mut server = mockito::Server::new();
        mock_token(&mut server);
        mock_sheets(&mut server);
        let header: Vec<String> = HEADERS.iter().map(|s| format!("\"{s}\"")).collect();
        let body = format!(
            r#"{{"address":"TRACKER!A2:H4","values":[[{}],["1 Oak St","Ann","7","","","","x","ACTIVE"],["2 Oak St","Bob","8","","","","x","CLOSED"]]}}"#,
            header.join(",")
        );
        server
            .mock("GET", mockito::Matcher::Regex("usedRange$".into()))
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let cfg = Config::sample();
        let client = Rc::new(GraphClient::with_secret(&remote_config(&server.url()), "s").unwrap());
        let source = RemoteWorkbook::new(client, &cfg);
        let (columns, rows) = load_rows(&source, &cfg).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 3);
        assert_eq!(rows[0].text(columns.work_order), "7");
    }
}
