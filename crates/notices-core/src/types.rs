use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Long-form date used in letters and in status marks, e.g. `15 October 2026`.
pub const LETTER_DATE_FORMAT: &str = "%d %B %Y";

/// Prefix written into a letter column once that letter has gone out.
pub const SENT_PREFIX: &str = "sent letter";

pub fn letter_date(date: NaiveDate) -> String {
    date.format(LETTER_DATE_FORMAT).to_string()
}

/// The status text recorded for a letter sent on `date`.
pub fn sent_marker(date: NaiveDate) -> String {
    format!("{SENT_PREFIX} {}", letter_date(date))
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    First,
    Second,
    Third,
}

impl Slot {
    pub fn all() -> &'static [Slot] {
        &[Slot::First, Slot::Second, Slot::Third]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn previous(self) -> Option<Slot> {
        match self {
            Slot::First => None,
            Slot::Second => Some(Slot::First),
            Slot::Third => Some(Slot::Second),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::First => "first",
            Slot::Second => "second",
            Slot::Third => "third",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Slot {
    type Err = crate::error::NoticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "1" => Ok(Slot::First),
            "second" | "2" => Ok(Slot::Second),
            "third" | "3" => Ok(Slot::Third),
            _ => Err(crate::error::NoticeError::Config(format!(
                "unknown letter slot '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateGroupId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateGroupId {
    Primary,
    Alternate,
}

impl TemplateGroupId {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateGroupId::Primary => "primary",
            TemplateGroupId::Alternate => "alternate",
        }
    }
}

impl fmt::Display for TemplateGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TemplateRef
// ---------------------------------------------------------------------------

/// Identifier of a `.docx` template under the templates directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRef(String);

impl TemplateRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the template, tolerating ids that already carry the extension.
    pub fn file_name(&self) -> String {
        if self.0.to_ascii_lowercase().ends_with(".docx") {
            self.0.clone()
        } else {
            format!("{}.docx", self.0)
        }
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_order_and_previous() {
        assert!(Slot::First < Slot::Second && Slot::Second < Slot::Third);
        assert_eq!(Slot::First.previous(), None);
        assert_eq!(Slot::Third.previous(), Some(Slot::Second));
        assert_eq!(Slot::Second.number(), 2);
    }

    #[test]
    fn slot_from_str_accepts_numbers() {
        assert_eq!("2".parse::<Slot>().unwrap(), Slot::Second);
        assert_eq!("third".parse::<Slot>().unwrap(), Slot::Third);
        assert!("fourth".parse::<Slot>().is_err());
    }

    #[test]
    fn sent_marker_uses_long_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(sent_marker(date), "sent letter 01 January 2024");
    }

    #[test]
    fn template_file_name() {
        assert_eq!(TemplateRef::new("template1").file_name(), "template1.docx");
        assert_eq!(TemplateRef::new("final.DOCX").file_name(), "final.DOCX");
    }
}
