use crate::config::Config;
use crate::error::{NoticeError, Result};
use crate::graph::GraphClient;
use crate::table::{IdentityKey, KeyColumn, SheetData};
use crate::types::{sent_marker, Slot};
use crate::xlsx::{self, Workbook};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WritebackOutcome {
    Updated { row: u32 },
    /// Several rows carry the key; only the first was updated.
    Ambiguous { row: u32, matches: usize },
    /// No row carries the key any more; nothing was written.
    NotFound,
}

/// Records that a letter went out. Implementations re-read the backing
/// sheet on every call instead of trusting an earlier snapshot.
pub trait StatusStore {
    /// Confirm the backing sheet still has every column a writeback needs.
    fn check(&self) -> Result<()>;

    fn mark_sent(&self, key: &IdentityKey, slot: Slot, today: NaiveDate)
        -> Result<WritebackOutcome>;
}

/// Header names a store needs to find a row and a slot column.
#[derive(Debug, Clone)]
struct Headers {
    address: String,
    name: String,
    letters: [String; 3],
}

impl Headers {
    fn new(config: &Config) -> Self {
        Self {
            address: config.columns.address.clone(),
            name: config.columns.name.clone(),
            letters: config.columns.letters.clone(),
        }
    }

    fn key(&self, key: &IdentityKey) -> &str {
        match key.column {
            KeyColumn::Address => &self.address,
            KeyColumn::Name => &self.name,
        }
    }

    fn require_all(&self, sheet: &SheetData, header_row: u32) -> Result<()> {
        let wanted = [&self.address, &self.name]
            .into_iter()
            .chain(self.letters.iter());
        for header in wanted {
            if sheet.header_column(header_row, header).is_none() {
                return Err(NoticeError::MissingColumn(header.clone()));
            }
        }
        Ok(())
    }
}

struct Target {
    row: u32,
    col: u32,
    outcome: WritebackOutcome,
}

/// Find the row to update. `None` when no row matches.
fn locate(
    sheet: &SheetData,
    header_row: u32,
    headers: &Headers,
    key: &IdentityKey,
    slot: Slot,
) -> Result<Option<Target>> {
    let key_header = headers.key(key);
    let key_col = sheet
        .header_column(header_row, key_header)
        .ok_or_else(|| NoticeError::MissingColumn(key_header.to_string()))?;
    let letter_header = &headers.letters[slot.index()];
    let letter_col = sheet
        .header_column(header_row, letter_header)
        .ok_or_else(|| NoticeError::MissingColumn(letter_header.clone()))?;

    let wanted = key.value.trim();
    let matches: Vec<u32> = sheet
        .rows
        .iter()
        .filter(|r| r.number > header_row)
        .filter(|r| r.cell(key_col).is_some_and(|v| v.display().trim() == wanted))
        .map(|r| r.number)
        .collect();

    Ok(match matches.as_slice() {
        [] => {
            tracing::warn!(key = %key, "row not found at writeback, source changed since read");
            None
        }
        [row] => Some(Target {
            row: *row,
            col: letter_col,
            outcome: WritebackOutcome::Updated { row: *row },
        }),
        [row, ..] => {
            tracing::warn!(
                key = %key,
                rows = ?matches,
                "key matches several rows, updating the first"
            );
            Some(Target {
                row: *row,
                col: letter_col,
                outcome: WritebackOutcome::Ambiguous {
                    row: *row,
                    matches: matches.len(),
                },
            })
        }
    })
}

// ---------------------------------------------------------------------------
// Local workbook
// ---------------------------------------------------------------------------

pub struct WorkbookStatusStore {
    path: PathBuf,
    sheet: String,
    header_row: u32,
    headers: Headers,
}

impl WorkbookStatusStore {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.workbook_path(),
            sheet: config.source.sheet.clone(),
            header_row: config.source.header_row,
            headers: Headers::new(config),
        }
    }
}

impl StatusStore for WorkbookStatusStore {
    fn check(&self) -> Result<()> {
        let sheet = Workbook::open(&self.path)?.read_sheet(&self.sheet)?;
        self.headers.require_all(&sheet, self.header_row)
    }

    fn mark_sent(
        &self,
        key: &IdentityKey,
        slot: Slot,
        today: NaiveDate,
    ) -> Result<WritebackOutcome> {
        let sheet = Workbook::open(&self.path)?.read_sheet(&self.sheet)?;
        let Some(target) = locate(&sheet, self.header_row, &self.headers, key, slot)? else {
            return Ok(WritebackOutcome::NotFound);
        };
        xlsx::write_cell(&self.path, &self.sheet, target.row, target.col, &sent_marker(today))?;
        tracing::info!(key = %key, row = target.row, slot = %slot, "status written");
        Ok(target.outcome)
    }
}

// ---------------------------------------------------------------------------
// Remote workbook
// ---------------------------------------------------------------------------

pub struct RemoteStatusStore {
    client: Rc<GraphClient>,
    sheet: String,
    headers: Headers,
}

impl RemoteStatusStore {
    pub fn new(client: Rc<GraphClient>, config: &Config) -> Self {
        Self {
            client,
            sheet: config.source.sheet.clone(),
            headers: Headers::new(config),
        }
    }
}

impl StatusStore for RemoteStatusStore {
    fn check(&self) -> Result<()> {
        let range = self.client.used_range(&self.sheet)?;
        let (_, header_row) = range.origin();
        self.headers.require_all(&range.to_sheet(), header_row)
    }

    fn mark_sent(
        &self,
        key: &IdentityKey,
        slot: Slot,
        today: NaiveDate,
    ) -> Result<WritebackOutcome> {
        let range = self.client.used_range(&self.sheet)?;
        let (_, header_row) = range.origin();
        let Some(target) = locate(&range.to_sheet(), header_row, &self.headers, key, slot)? else {
            return Ok(WritebackOutcome::NotFound);
        };
        let address = xlsx::cell_ref(target.row, target.col);
        self.client
            .write_cell(&self.sheet, &address, &sent_marker(today))?;
        tracing::info!(key = %key, cell = %address, slot = %slot, "remote status written");
        Ok(target.outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
