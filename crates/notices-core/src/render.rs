use crate::cleanup::{display_address, display_name, TextCleaner};
use crate::config::Config;
use crate::docx;
use crate::error::{NoticeError, Result};
use crate::paths;
use crate::table::{Columns, PlaceholderSource, Row};
use crate::types::{letter_date, TemplateRef};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// A rendered letter, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct Document {
    pub template: TemplateRef,
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Placeholder values that went into the document.
    pub values: BTreeMap<String, String>,
}

pub struct Renderer<'a> {
    config: &'a Config,
    cleaner: &'a dyn TextCleaner,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a Config, cleaner: &'a dyn TextCleaner) -> Self {
        Self { config, cleaner }
    }

    /// Substitution value for every configured placeholder.
    ///
    /// Name and address values are cleaned once per row even when several
    /// placeholders point at them.
    pub fn placeholder_values(
        &self,
        row: &Row,
        columns: &Columns,
        today: NaiveDate,
    ) -> Result<BTreeMap<String, String>> {
        let mut name = None;
        let mut address = None;
        let mut values = BTreeMap::new();
        for (placeholder, source) in &columns.placeholders {
            let value = match source {
                PlaceholderSource::Date => letter_date(today),
                PlaceholderSource::Name(col) => name
                    .get_or_insert_with(|| display_name(self.cleaner, &row.text(*col)))
                    .clone(),
                PlaceholderSource::Address(col) => address
                    .get_or_insert_with(|| display_address(self.cleaner, &row.text(*col)))
                    .clone(),
                PlaceholderSource::Cell(col) => {
                    let cell = row
                        .get(*col)
                        .ok_or_else(|| NoticeError::MissingColumn(placeholder.clone()))?;
                    if cell.is_blank() {
                        self.config.templates.missing_value.clone()
                    } else {
                        cell.display()
                    }
                }
            };
            values.insert(placeholder.clone(), value);
        }
        Ok(values)
    }

    pub fn render(
        &self,
        template: &TemplateRef,
        row: &Row,
        columns: &Columns,
        today: NaiveDate,
    ) -> Result<Document> {
        let path = paths::template_path(&self.config.templates_dir(), template);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                NoticeError::TemplateNotFound(path.display().to_string())
            }
            _ => NoticeError::Io(e),
        })?;

        let values = self.placeholder_values(row, columns, today)?;
        let rendered =
            docx::render_package(&bytes, &values).map_err(|e| NoticeError::Template {
                template: template.to_string(),
                reason: e.to_string(),
            })?;

        let file_name = output_file_name(&row.text(columns.work_order), &row.text(columns.address));
        tracing::debug!(template = %template, file = %file_name, "letter rendered");
        Ok(Document {
            template: template.clone(),
            file_name,
            bytes: rendered,
            values,
        })
    }
}

/// `<work order>_<first 20 address chars>.docx`, keeping only characters
/// that are safe in a file name.
pub fn output_file_name(work_order: &str, address: &str) -> String {
    let short: String = address.chars().take(20).collect();
    let stem: String = format!("{}_{short}", work_order.trim())
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .take(200)
        .collect();
    format!("{stem}.docx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::HeuristicCleaner;
    use crate::table::{CellValue, SheetData, Table};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Config, Columns, Row) {
        let mut cfg = Config::sample();
        cfg.base_dir = dir.path().to_path_buf();
        cfg.placeholders
            .insert("STATUS".to_string(), "ORDER STATUS".to_string());
        let headers = [
            cfg.columns.address.as_str(),
            cfg.columns.name.as_str(),
            cfg.columns.work_order.as_str(),
            cfg.columns.letters[0].as_str(),
            cfg.columns.letters[1].as_str(),
            cfg.columns.letters[2].as_str(),
            "Review 1",
            "ORDER STATUS",
        ];
        let values = [
            "12 Oak St, Leeds",
            "Mrs P Jones 07700 900123",
            "WO-881",
            "",
            "",
            "",
            "",
            "",
        ];
        let grid = vec![
            headers.iter().map(|s| CellValue::text(*s)).collect(),
            values.iter().map(|s| CellValue::text(*s)).collect(),
        ];
        let table = Table::from_sheet(&SheetData::from_grid(grid, 1, 0), 1).unwrap();
        let columns = Columns::resolve(&cfg, &table.headers).unwrap();
        (cfg, columns, table.rows[0].clone())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn placeholder_values_by_source() {
        let dir = TempDir::new().unwrap();
        let (cfg, columns, row) = setup(&dir);
        let renderer = Renderer::new(&cfg, &HeuristicCleaner);
        let values = renderer.placeholder_values(&row, &columns, today()).unwrap();
        assert_eq!(values["NAME"], "Mrs P Jones");
        assert_eq!(values["ADDRESS"], "12 Oak St\nLeeds");
        assert_eq!(values["WO"], "WO-881");
        assert_eq!(values["DATE"], "15 October 2026");
        assert_eq!(values["STATUS"], "");
    }

    #[test]
    fn empty_cell_renders_configured_missing_value() {
        let dir = TempDir::new().unwrap();
        let (mut cfg, columns, row) = setup(&dir);
        cfg.templates.missing_value = "N/A".to_string();
        let values = Renderer::new(&cfg, &HeuristicCleaner)
            .placeholder_values(&row, &columns, today())
            .unwrap();
        assert_eq!(values["STATUS"], "N/A");
        assert_eq!(values["WO"], "WO-881");
    }

    #[test]
    fn renders_template_without_leftover_tokens() {
        let dir = TempDir::new().unwrap();
        let (cfg, columns, row) = setup(&dir);
        docx::create_template(
            &cfg.templates_dir().join("template1.docx"),
            &["{{DATE}}", "Dear {{NAME}},", "{{ADDRESS}}", "Ref: {{WO}} {{STATUS}}"],
        )
        .unwrap();

        let renderer = Renderer::new(&cfg, &HeuristicCleaner);
        let doc = renderer
            .render(&TemplateRef::new("template1"), &row, &columns, today())
            .unwrap();
        assert!(docx::remaining_placeholders(&doc.bytes).unwrap().is_empty());
        let text = docx::document_text(&doc.bytes).unwrap();
        assert!(text.contains("Dear Mrs P Jones,"));
        assert!(text.contains("12 Oak StLeeds"), "{text}");
        assert_eq!(doc.file_name, "WO-881_12_Oak_St_Leeds.docx");
    }

    #[test]
    fn missing_template_is_template_not_found() {
        let dir = TempDir::new().unwrap();
        let (cfg, columns, row) = setup(&dir);
        let renderer = Renderer::new(&cfg, &HeuristicCleaner);
        let err = renderer
            .render(&TemplateRef::new("template9"), &row, &columns, today())
            .unwrap_err();
        assert!(matches!(err, NoticeError::TemplateNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn corrupt_template_is_template_error() {
        let dir = TempDir::new().unwrap();
        let (cfg, columns, row) = setup(&dir);
        crate::io::atomic_write(&cfg.templates_dir().join("template1.docx"), b"nope").unwrap();
        let err = Renderer::new(&cfg, &HeuristicCleaner)
            .render(&TemplateRef::new("template1"), &row, &columns, today())
            .unwrap_err();
        assert!(matches!(err, NoticeError::Template { .. }));
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(
            output_file_name("1234", "Flat 2/3, 10 High Street North"),
            "1234_Flat_23_10_High_St.docx"
        );
        assert_eq!(output_file_name("", ""), "_.docx");
    }
}
