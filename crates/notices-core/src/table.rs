//! In-memory resident table: cell values, headers, rows and the typed
//! column handles every other component reads rows through.

use crate::config::{Config, DATE_COLUMN};
use crate::error::{NoticeError, Result};
use crate::types::Slot;
use serde::Serialize;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// CellValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s)
        }
    }

    /// Empty, or text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => false,
        }
    }

    /// Text as a spreadsheet user would read it; integral numbers drop the `.0`.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
        }
    }

    /// Convert one element of a remote `values` grid.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::text(n.to_string())),
            serde_json::Value::String(s) => CellValue::text(s.clone()),
            other => CellValue::text(other.to_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Sheet grid (as read from a workbook or a remote range)
// ---------------------------------------------------------------------------

/// One row of a worksheet: 1-based row number and `(0-based column, value)` cells.
#[derive(Debug, Clone, Default)]
pub struct SheetRow {
    pub number: u32,
    pub cells: Vec<(u32, CellValue)>,
}

impl SheetRow {
    pub fn cell(&self, col: u32) -> Option<&CellValue> {
        self.cells.iter().find(|(c, _)| *c == col).map(|(_, v)| v)
    }
}

/// Auto-filter criteria saved with a worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoFilter {
    /// 0-based column of the filter range's left edge.
    pub first_col: u32,
    /// `(offset from first_col, accepted values)`.
    pub columns: Vec<(u32, Vec<String>)>,
}

#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub rows: Vec<SheetRow>,
    pub auto_filter: Option<AutoFilter>,
}

impl SheetData {
    pub fn row(&self, number: u32) -> Option<&SheetRow> {
        self.rows.iter().find(|r| r.number == number)
    }

    /// Build from a dense grid whose top-left cell sits at (`first_row`, `first_col`).
    pub fn from_grid(grid: Vec<Vec<CellValue>>, first_row: u32, first_col: u32) -> Self {
        let rows = grid
            .into_iter()
            .enumerate()
            .map(|(i, values)| SheetRow {
                number: first_row + i as u32,
                cells: values
                    .into_iter()
                    .enumerate()
                    .filter(|(_, v)| *v != CellValue::Empty)
                    .map(|(j, v)| (first_col + j as u32, v))
                    .collect(),
            })
            .collect();
        Self {
            rows,
            auto_filter: None,
        }
    }

    /// Column of the header cell whose text equals `name` exactly.
    pub fn header_column(&self, header_row: u32, name: &str) -> Option<u32> {
        self.row(header_row)?
            .cells
            .iter()
            .find(|(_, v)| v.display() == name)
            .map(|(c, _)| *c)
    }
}

// ---------------------------------------------------------------------------
// Table / Row
// ---------------------------------------------------------------------------

/// Handle to a validated column of a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId(usize);

#[derive(Debug, Clone, Default)]
pub struct Headers {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Headers {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn lookup(&self, name: &str) -> Result<ColumnId> {
        self.index
            .get(name)
            .map(|&i| ColumnId(i))
            .ok_or_else(|| NoticeError::MissingColumn(name.to_string()))
    }

    pub fn name(&self, id: ColumnId) -> &str {
        &self.names[id.0]
    }
}

/// A resident record: sheet row number plus one value per header.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub line: u32,
    cells: Vec<CellValue>,
}

impl Row {
    pub fn new(line: u32, cells: Vec<CellValue>) -> Self {
        Self { line, cells }
    }

    pub fn get(&self, id: ColumnId) -> Option<&CellValue> {
        self.cells.get(id.0)
    }

    pub fn text(&self, id: ColumnId) -> String {
        self.get(id).map(CellValue::display).unwrap_or_default()
    }

    pub fn set(&mut self, id: ColumnId, value: CellValue) {
        if id.0 >= self.cells.len() {
            self.cells.resize(id.0 + 1, CellValue::Empty);
        }
        self.cells[id.0] = value;
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Headers,
    pub rows: Vec<Row>,
    /// Saved auto-filter criteria, mapped onto header positions.
    pub sheet_filters: Vec<(ColumnId, Vec<String>)>,
}

impl Table {
    /// Turn a worksheet into records keyed by the text of row `header_row`.
    ///
    /// Blank header cells are ignored; a repeated header keeps its first
    /// column. Rows above the header and rows with no content are dropped.
    pub fn from_sheet(sheet: &SheetData, header_row: u32) -> Result<Self> {
        let header = sheet.row(header_row).ok_or_else(|| {
            NoticeError::DataSource(format!("header row {header_row} is empty"))
        })?;

        let mut names = Vec::new();
        let mut index = HashMap::new();
        let mut position_of_col: HashMap<u32, usize> = HashMap::new();
        for (col, value) in &header.cells {
            let name = value.display();
            if name.trim().is_empty() {
                continue;
            }
            if index.contains_key(&name) {
                tracing::warn!(header = %name, column = col, "duplicate header ignored");
                continue;
            }
            position_of_col.insert(*col, names.len());
            index.insert(name.clone(), names.len());
            names.push(name);
        }
        if names.is_empty() {
            return Err(NoticeError::DataSource(format!(
                "header row {header_row} has no column names"
            )));
        }

        let mut rows = Vec::new();
        for sheet_row in sheet.rows.iter().filter(|r| r.number > header_row) {
            let mut cells = vec![CellValue::Empty; names.len()];
            for (col, value) in &sheet_row.cells {
                if let Some(&pos) = position_of_col.get(col) {
                    cells[pos] = value.clone();
                }
            }
            let row = Row::new(sheet_row.number, cells);
            if !row.is_blank() {
                rows.push(row);
            }
        }

        let sheet_filters = sheet
            .auto_filter
            .as_ref()
            .map(|af| {
                af.columns
                    .iter()
                    .filter_map(|(offset, values)| {
                        position_of_col
                            .get(&(af.first_col + offset))
                            .map(|&pos| (ColumnId(pos), values.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            headers: Headers { names, index },
            rows,
            sheet_filters,
        })
    }
}

// ---------------------------------------------------------------------------
// Columns (validated bindings)
// ---------------------------------------------------------------------------

/// Where a placeholder's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceholderSource {
    /// Cleaned display name from the contact column.
    Name(ColumnId),
    /// Multi-line address from the address column.
    Address(ColumnId),
    /// Today's date.
    Date,
    /// Raw cell text.
    Cell(ColumnId),
}

/// Configured column names resolved against a table's headers, once.
#[derive(Debug, Clone)]
pub struct Columns {
    pub address: ColumnId,
    pub name: ColumnId,
    pub work_order: ColumnId,
    pub letters: [ColumnId; 3],
    pub review: Option<ColumnId>,
    pub placeholders: Vec<(String, PlaceholderSource)>,
    pub filters: Vec<(ColumnId, String)>,
}

impl Columns {
    /// Resolve every configured column; the first absent header is a `MissingColumn` error.
    pub fn resolve(config: &Config, headers: &Headers) -> Result<Self> {
        let c = &config.columns;
        let address = headers.lookup(&c.address)?;
        let name = headers.lookup(&c.name)?;
        let work_order = headers.lookup(&c.work_order)?;
        let letters = [
            headers.lookup(&c.letters[0])?,
            headers.lookup(&c.letters[1])?,
            headers.lookup(&c.letters[2])?,
        ];
        let review = c.review.as_deref().map(|r| headers.lookup(r)).transpose()?;

        let mut placeholders = Vec::with_capacity(config.placeholders.len());
        for (placeholder, column) in &config.placeholders {
            let source = if column == DATE_COLUMN {
                PlaceholderSource::Date
            } else if *column == c.name {
                PlaceholderSource::Name(name)
            } else if *column == c.address {
                PlaceholderSource::Address(address)
            } else {
                PlaceholderSource::Cell(headers.lookup(column)?)
            };
            placeholders.push((placeholder.clone(), source));
        }

        let filters = config
            .filters
            .iter()
            .map(|f| Ok((headers.lookup(&f.column)?, f.value.clone())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            address,
            name,
            work_order,
            letters,
            review,
            placeholders,
            filters,
        })
    }

    pub fn letter(&self, slot: Slot) -> ColumnId {
        self.letters[slot.index()]
    }
}

// ---------------------------------------------------------------------------
// IdentityKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColumn {
    Address,
    Name,
}

/// Value used to find a resident's row again at writeback time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityKey {
    pub column: KeyColumn,
    pub value: String,
}

impl IdentityKey {
    /// The address, or the name when the address is blank.
    pub fn of(row: &Row, columns: &Columns) -> Option<Self> {
        let address = row.text(columns.address);
        if !address.trim().is_empty() {
            return Some(Self {
                column: KeyColumn::Address,
                value: address,
            });
        }
        let name = row.text(columns.name);
        if !name.trim().is_empty() {
            return Some(Self {
                column: KeyColumn::Name,
                value: name,
            });
        }
        None
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
