//! Decides which letter, if any, a resident row is due next.
//!
//! Everything in here is pure: the same row, configuration and date
//! always give the same decision.

use crate::config::Config;
use crate::table::{CellValue, ColumnId, Columns, Row};
use crate::types::{Slot, TemplateGroupId, TemplateRef, SENT_PREFIX};
use chrono::{Days, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    NotSent,
    Sent,
}

/// A missing, empty or whitespace-only status cell is not sent; anything else is.
pub fn slot_state(row: &Row, column: ColumnId) -> SlotState {
    match row.get(column) {
        Some(value) if !value.is_blank() => SlotState::Sent,
        _ => SlotState::NotSent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterChoice {
    pub slot: Slot,
    pub group: TemplateGroupId,
    pub template: TemplateRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Send(LetterChoice),
    /// The next slot is open but the previous letter went out too recently.
    NotYetDue { slot: Slot, due: NaiveDate },
    /// All three letters are sent.
    Complete,
}

impl Decision {
    /// Template to render now, if any.
    pub fn template(&self) -> Option<&TemplateRef> {
        match self {
            Decision::Send(choice) => Some(&choice.template),
            _ => None,
        }
    }
}

pub fn template_group(row: &Row, columns: &Columns, config: &Config) -> TemplateGroupId {
    let sentinel = config.templates.review_value.as_deref();
    match (columns.review, sentinel) {
        (Some(col), Some(expected)) if row.text(col) == expected => TemplateGroupId::Primary,
        _ => TemplateGroupId::Alternate,
    }
}

pub fn next_letter(row: &Row, columns: &Columns, config: &Config, today: NaiveDate) -> Decision {
    let open = Slot::all()
        .iter()
        .copied()
        .find(|slot| slot_state(row, columns.letter(*slot)) == SlotState::NotSent);
    let Some(slot) = open else {
        return Decision::Complete;
    };

    let gap = config.thresholds.min_days_between_letters;
    if let (Some(prev), true) = (slot.previous(), gap > 0) {
        let sent = row.get(columns.letter(prev)).and_then(parse_sent_date);
        if let Some(due) = sent.and_then(|d| d.checked_add_days(Days::new(u64::from(gap)))) {
            if today < due {
                return Decision::NotYetDue { slot, due };
            }
        }
    }

    let group = template_group(row, columns, config);
    Decision::Send(LetterChoice {
        slot,
        group,
        template: config.templates.group(group).for_slot(slot).clone(),
    })
}

// ---------------------------------------------------------------------------
// Status dates
// ---------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &["%d %B %Y", "%d %b %Y", "%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Date recorded in a letter status cell, when one can be read.
///
/// Accepts `sent letter <date>` text, a bare date in a few common layouts,
/// or an Excel date serial.
pub fn parse_sent_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Number(serial) => excel_serial_date(*serial),
        CellValue::Text(text) => {
            let mut s = text.trim();
            if s.len() >= SENT_PREFIX.len()
                && s.is_char_boundary(SENT_PREFIX.len())
                && s[..SENT_PREFIX.len()].eq_ignore_ascii_case(SENT_PREFIX)
            {
                s = s[SENT_PREFIX.len()..].trim();
            }
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{SheetData, Table};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn fixture(cells: [&str; 5]) -> (Row, Columns, Config) {
        let cfg = Config::sample();
        let mut header: Vec<CellValue> = vec![
            CellValue::text(&cfg.columns.address),
            CellValue::text(&cfg.columns.name),
            CellValue::text(&cfg.columns.work_order),
        ];
        header.extend(cfg.columns.letters.iter().map(CellValue::text));
        header.push(CellValue::text("Review 1"));
        header.push(CellValue::text("ORDER STATUS"));
        let values = vec![
            CellValue::text(cells[0]),
            CellValue::text("Ann"),
            CellValue::text("1000"),
            CellValue::text(cells[1]),
            CellValue::text(cells[2]),
            CellValue::text(cells[3]),
            CellValue::text(cells[4]),
            CellValue::text("ACTIVE"),
        ];
        let sheet = SheetData::from_grid(vec![header, values], 1, 0);
        let table = Table::from_sheet(&sheet, 1).unwrap();
        let columns = Columns::resolve(&cfg, &table.headers).unwrap();
        (table.rows[0].clone(), columns, cfg)
    }

    fn slot_of(d: &Decision) -> Option<Slot> {
        match d {
            Decision::Send(c) => Some(c.slot),
            _ => None,
        }
    }

    #[test]
    fn fresh_row_gets_first_letter() {
        let (row, cols, cfg) = fixture(["12 Oak St", "", "", "", "A NEW DOOR/S REQUIRED"]);
        let d = next_letter(&row, &cols, &cfg, today());
        assert_eq!(slot_of(&d), Some(Slot::First));
        assert_eq!(d.template().unwrap().as_str(), "template1");
    }

    #[test]
    fn first_sent_gets_second_letter() {
        let (row, cols, cfg) =
            fixture(["12 Oak St", "sent letter 01 Jan 2024", "", "", "A NEW DOOR/S REQUIRED"]);
        let d = next_letter(&row, &cols, &cfg, today());
        assert_eq!(slot_of(&d), Some(Slot::Second));
        assert_eq!(d.template().unwrap().as_str(), "template2");
    }

    #[test]
    fn all_sent_is_complete() {
        let (row, cols, cfg) = fixture(["12 Oak St", "called", "x", "sent", ""]);
        let d = next_letter(&row, &cols, &cfg, today());
        assert_eq!(d, Decision::Complete);
        assert!(d.template().is_none());
    }

    #[test]
    fn never_skips_an_open_slot() {
        let (row, cols, cfg) = fixture(["12 Oak St", "  ", "sent", "", ""]);
        assert_eq!(slot_of(&next_letter(&row, &cols, &cfg, today())), Some(Slot::First));

        let (row, cols, cfg) = fixture(["12 Oak St", "sent", "", "sent", ""]);
        assert_eq!(slot_of(&next_letter(&row, &cols, &cfg, today())), Some(Slot::Second));
    }

    #[test]
    fn review_value_selects_group() {
        let (row, cols, cfg) = fixture(["12 Oak St", "sent", "", "", "PAINT ONLY"]);
        match next_letter(&row, &cols, &cfg, today()) {
            Decision::Send(c) => {
                assert_eq!(c.group, TemplateGroupId::Alternate);
                assert_eq!(c.template.as_str(), "template2a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn recent_letter_is_not_yet_due() {
        let (row, cols, cfg) = fixture(["12 Oak St", "sent letter 27 February 2024", "", "", ""]);
        let d = next_letter(&row, &cols, &cfg, today());
        assert_eq!(
            d,
            Decision::NotYetDue {
                slot: Slot::Second,
                due: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
            }
        );

        let mut cfg = cfg;
        cfg.thresholds.min_days_between_letters = 0;
        assert_eq!(slot_of(&next_letter(&row, &cols, &cfg, today())), Some(Slot::Second));
    }

    #[test]
    fn gap_boundary_is_inclusive() {
        let (row, cols, cfg) = fixture(["12 Oak St", "x", "sent letter 23 February 2024", "", ""]);
        assert_eq!(slot_of(&next_letter(&row, &cols, &cfg, today())), Some(Slot::Third));
    }

    #[test]
    fn unreadable_mark_never_blocks() {
        let (row, cols, cfg) = fixture(["12 Oak St", "phoned, no answer", "", "", ""]);
        assert_eq!(slot_of(&next_letter(&row, &cols, &cfg, today())), Some(Slot::Second));
    }

    #[test]
    fn parses_status_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(parse_sent_date(&CellValue::text("sent letter 01 January 2024")), Some(d));
        assert_eq!(parse_sent_date(&CellValue::text("Sent Letter 01 Jan 2024")), Some(d));
        assert_eq!(parse_sent_date(&CellValue::text("01/01/2024")), Some(d));
        assert_eq!(parse_sent_date(&CellValue::text("2024-01-01")), Some(d));
        assert_eq!(parse_sent_date(&CellValue::Number(45292.0)), Some(d));
        assert_eq!(parse_sent_date(&CellValue::text("soon")), None);
        assert_eq!(parse_sent_date(&CellValue::Number(-3.0)), None);
    }
}
