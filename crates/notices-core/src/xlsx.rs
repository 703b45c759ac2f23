//! Minimal SpreadsheetML access: read worksheet cells and auto-filter
//! criteria, and rewrite a single cell in place.
//!
//! A cell write only re-serializes the worksheet part that holds the cell.
//! Every other zip entry is copied raw, so styles, formulas, other sheets
//! and unrelated cells come back byte-identical.

use crate::error::{NoticeError, Result};
use crate::table::{AutoFilter, CellValue, SheetData, SheetRow};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

// ---------------------------------------------------------------------------
// Workbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    part: String,
}

pub struct Workbook {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    sheets: Vec<SheetEntry>,
    shared: Vec<String>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            NoticeError::DataSource(format!("cannot open workbook {}: {e}", path.display()))
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| NoticeError::Workbook(format!("not an xlsx package: {e}")))?;

        let workbook_xml = read_part(&mut archive, WORKBOOK_PART)?
            .ok_or_else(|| NoticeError::Workbook(format!("missing {WORKBOOK_PART}")))?;
        let rels_xml = read_part(&mut archive, WORKBOOK_RELS)?
            .ok_or_else(|| NoticeError::Workbook(format!("missing {WORKBOOK_RELS}")))?;
        let targets = parse_relationships(&rels_xml)?;

        let mut sheets = Vec::new();
        for (name, rid) in parse_sheet_list(&workbook_xml)? {
            match targets.get(&rid) {
                Some(target) => sheets.push(SheetEntry {
                    name,
                    part: resolve_target(target),
                }),
                None => {
                    tracing::warn!(sheet = %name, rid = %rid, "sheet has no relationship target")
                }
            }
        }

        let shared = match read_part(&mut archive, SHARED_STRINGS)? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };

        Ok(Self {
            archive,
            sheets,
            shared,
        })
    }

    /// Worksheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn sheet_part(&self, name: &str) -> Result<&str> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.part.as_str())
            .ok_or_else(|| NoticeError::SheetNotFound(name.to_string()))
    }

    pub fn read_sheet(&mut self, name: &str) -> Result<SheetData> {
        let part = self.sheet_part(name)?.to_string();
        let xml = read_part(&mut self.archive, &part)?
            .ok_or_else(|| NoticeError::Workbook(format!("missing worksheet part {part}")))?;
        parse_sheet_xml(&xml, &self.shared)
    }
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Relationship targets are relative to `xl/` unless they start with `/`.
fn resolve_target(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = vec!["xl"];
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

// ---------------------------------------------------------------------------
// Cell writes
// ---------------------------------------------------------------------------

/// Set `row`/`col` (1-based row, 0-based column) of `sheet` to `text` and
/// atomically replace the file at `path`.
pub fn write_cell(path: &Path, sheet: &str, row: u32, col: u32, text: &str) -> Result<()> {
    let bytes = std::fs::read(path)?;
    let mut book = Workbook::from_bytes(bytes)?;
    let part = book.sheet_part(sheet)?.to_string();
    let xml = read_part(&mut book.archive, &part)?
        .ok_or_else(|| NoticeError::Workbook(format!("missing worksheet part {part}")))?;
    let patched = patch_cell_xml(&xml, row, col, text)?;

    let mut tmp = crate::io::temp_sibling(path)?;
    {
        let mut out = ZipWriter::new(tmp.as_file_mut());
        for i in 0..book.archive.len() {
            let entry = book.archive.by_index_raw(i)?;
            if entry.name() == part {
                drop(entry);
                let opts =
                    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
                out.start_file(part.as_str(), opts)?;
                out.write_all(patched.as_bytes())?;
            } else {
                out.raw_copy_file(entry)?;
            }
        }
        out.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::debug!(path = %path.display(), sheet, cell = %cell_ref(row, col), "cell written");
    Ok(())
}

/// Splice a new inline-string cell into worksheet XML, creating the row if needed.
/// An existing cell keeps its style index.
pub fn patch_cell_xml(xml: &str, row: u32, col: u32, text: &str) -> Result<String> {
    let (start, end, replacement) = locate_cell_edit(xml, row, col, text)?;
    let mut out = String::with_capacity(xml.len() + replacement.len());
    out.push_str(&xml[..start]);
    out.push_str(&replacement);
    out.push_str(&xml[end..]);
    Ok(out)
}

fn locate_cell_edit(xml: &str, row: u32, col: u32, text: &str) -> Result<(usize, usize, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut prefix = String::new();
    let mut in_data = false;
    let mut in_target = false;
    let mut last_row = 0u32;
    let mut last_col: Option<u32> = None;
    let mut pending: Option<(usize, Option<String>)> = None;
    let mut pos = 0usize;

    loop {
        let start = pos;
        let event = reader.read_event()?;
        pos = reader.buffer_position() as usize;
        let empty = matches!(event, Event::Empty(_));

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"sheetData" => {
                    prefix = prefix_of(e);
                    if empty {
                        let row_xml = new_row(&prefix, row, col, text);
                        let data = format!("<{prefix}sheetData>{row_xml}</{prefix}sheetData>");
                        return Ok((start, pos, data));
                    }
                    in_data = true;
                }
                b"row" if in_data => {
                    let number = attr(e, b"r")?
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(last_row + 1);
                    last_row = number;
                    if number == row {
                        if empty {
                            let open = xml[start..pos].trim_end_matches('>');
                            let open = open.trim_end_matches('/').trim_end();
                            let cell = new_cell(&prefix, row, col, None, text);
                            return Ok((start, pos, format!("{open}>{cell}</{prefix}row>")));
                        }
                        in_target = true;
                        last_col = None;
                    } else if number > row {
                        return Ok((start, start, new_row(&prefix, row, col, text)));
                    }
                }
                b"c" if in_target => {
                    let c = attr(e, b"r")?
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(c, _)| c)
                        .unwrap_or_else(|| last_col.map_or(0, |c| c + 1));
                    last_col = Some(c);
                    if c == col {
                        let style = attr(e, b"s")?;
                        if empty {
                            let cell = new_cell(&prefix, row, col, style.as_deref(), text);
                            return Ok((start, pos, cell));
                        }
                        pending = Some((start, style));
                    } else if c > col {
                        return Ok((start, start, new_cell(&prefix, row, col, None, text)));
                    }
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some((cell_start, style)) = pending.take() {
                        let cell = new_cell(&prefix, row, col, style.as_deref(), text);
                        return Ok((cell_start, pos, cell));
                    }
                }
                b"row" if in_target => {
                    return Ok((start, start, new_cell(&prefix, row, col, None, text)));
                }
                b"sheetData" => {
                    return Ok((start, start, new_row(&prefix, row, col, text)));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Err(NoticeError::Workbook("worksheet has no sheetData".into()))
}

fn prefix_of(e: &BytesStart<'_>) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

fn new_cell(prefix: &str, row: u32, col: u32, style: Option<&str>, text: &str) -> String {
    let style = style.map(|s| format!(" s=\"{s}\"")).unwrap_or_default();
    format!(
        "<{p}c r=\"{r}\"{style} t=\"inlineStr\"><{p}is><{p}t xml:space=\"preserve\">{text}</{p}t></{p}is></{p}c>",
        p = prefix,
        r = cell_ref(row, col),
        text = escape(text),
    )
}

fn new_row(prefix: &str, row: u32, col: u32, text: &str) -> String {
    format!(
        "<{prefix}row r=\"{row}\">{}</{prefix}row>",
        new_cell(prefix, row, col, None, text)
    )
}

// ---------------------------------------------------------------------------
// Part parsers
// ---------------------------------------------------------------------------

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        if a.key.local_name().as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rid)) = (attr(e, b"name")?, attr(e, b"id")?) {
                    out.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut out = HashMap::new();
    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id")?, attr(e, b"Target")?) {
                    out.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut phonetic = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                b"rPh" => phonetic += 1,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => out.push(String::new()),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => out.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                b"rPh" => phonetic = phonetic.saturating_sub(1),
                _ => {}
            },
            Event::Text(ref t) if in_t && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::CData(ref t) if in_t && phonetic == 0 => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

#[derive(Default)]
struct CellCtx {
    col: u32,
    kind: String,
    raw: String,
    in_value: bool,
    in_inline: bool,
    in_text: bool,
    phonetic: usize,
}

impl CellCtx {
    fn capturing(&self) -> bool {
        self.phonetic == 0 && (self.in_value || (self.in_inline && self.in_text))
    }
}

fn parse_sheet_xml(xml: &str, shared: &[String]) -> Result<SheetData> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut data = SheetData::default();
    let mut row: Option<SheetRow> = None;
    let mut cell: Option<CellCtx> = None;
    let mut last_row = 0u32;
    let mut last_col: Option<u32> = None;

    let mut filter: Option<AutoFilter> = None;
    let mut filter_col: Option<(u32, Vec<String>, bool)> = None;

    loop {
        let event = reader.read_event()?;
        let empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    let number = attr(e, b"r")?
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(last_row + 1);
                    last_row = number;
                    last_col = None;
                    if !empty {
                        row = Some(SheetRow {
                            number,
                            cells: Vec::new(),
                        });
                    }
                }
                b"c" if row.is_some() => {
                    let col = attr(e, b"r")?
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(c, _)| c)
                        .unwrap_or_else(|| last_col.map_or(0, |c| c + 1));
                    last_col = Some(col);
                    if !empty {
                        cell = Some(CellCtx {
                            col,
                            kind: attr(e, b"t")?.unwrap_or_default(),
                            ..CellCtx::default()
                        });
                    }
                }
                b"v" if !empty => {
                    if let Some(c) = cell.as_mut() {
                        c.in_value = true;
                    }
                }
                b"is" if !empty => {
                    if let Some(c) = cell.as_mut() {
                        c.in_inline = true;
                    }
                }
                b"t" if !empty => {
                    if let Some(c) = cell.as_mut() {
                        c.in_text = true;
                    }
                }
                b"rPh" if !empty => {
                    if let Some(c) = cell.as_mut() {
                        c.phonetic += 1;
                    }
                }
                b"autoFilter" => {
                    let first_col = attr(e, b"ref")?
                        .and_then(|r| r.split(':').next().and_then(parse_cell_ref))
                        .map(|(c, _)| c)
                        .unwrap_or(0);
                    filter = Some(AutoFilter {
                        first_col,
                        columns: Vec::new(),
                    });
                }
                b"filterColumn" if filter.is_some() => {
                    let id = attr(e, b"colId")?
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    filter_col = Some((id, Vec::new(), false));
                }
                b"filters" => {
                    if let Some((_, values, has_list)) = filter_col.as_mut() {
                        *has_list = true;
                        if attr(e, b"blank")?.is_some_and(|b| b == "1" || b == "true") {
                            values.push(String::new());
                        }
                    }
                }
                b"filter" => {
                    if let (Some((_, values, _)), Some(val)) =
                        (filter_col.as_mut(), attr(e, b"val")?)
                    {
                        values.push(val);
                    }
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(r) = row.take() {
                        data.rows.push(r);
                    }
                }
                b"c" => {
                    if let (Some(ctx), Some(r)) = (cell.take(), row.as_mut()) {
                        let value = cell_value(&ctx.kind, ctx.raw, shared)?;
                        if value != CellValue::Empty {
                            r.cells.push((ctx.col, value));
                        }
                    }
                }
                b"v" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_value = false;
                    }
                }
                b"is" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_inline = false;
                    }
                }
                b"t" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_text = false;
                    }
                }
                b"rPh" => {
                    if let Some(c) = cell.as_mut() {
                        c.phonetic = c.phonetic.saturating_sub(1);
                    }
                }
                b"filterColumn" => {
                    if let (Some((id, values, has_list)), Some(f)) =
                        (filter_col.take(), filter.as_mut())
                    {
                        if has_list {
                            f.columns.push((id, values));
                        } else {
                            tracing::debug!(column = id, "custom auto-filter criteria not applied");
                        }
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if let Some(c) = cell.as_mut().filter(|c| c.capturing()) {
                    c.raw.push_str(&t.unescape()?);
                }
            }
            Event::CData(ref t) => {
                if let Some(c) = cell.as_mut().filter(|c| c.capturing()) {
                    c.raw.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    data.auto_filter = filter.filter(|f| !f.columns.is_empty());
    Ok(data)
}

fn cell_value(kind: &str, raw: String, shared: &[String]) -> Result<CellValue> {
    Ok(match kind {
        "s" if raw.trim().is_empty() => CellValue::Empty,
        "s" => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| NoticeError::Workbook(format!("bad shared string index '{raw}'")))?;
            let s = shared.get(idx).ok_or_else(|| {
                NoticeError::Workbook(format!("shared string {idx} out of range"))
            })?;
            CellValue::text(s.clone())
        }
        "inlineStr" | "str" | "e" | "d" => CellValue::text(raw),
        "b" => match raw.trim() {
            "" => CellValue::Empty,
            v => CellValue::Bool(v == "1" || v.eq_ignore_ascii_case("true")),
        },
        _ => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                CellValue::Empty
            } else {
                trimmed
                    .parse::<f64>()
                    .map(CellValue::Number)
                    .unwrap_or_else(|_| CellValue::text(raw))
            }
        }
    })
}

// ---------------------------------------------------------------------------
// A1 references
// ---------------------------------------------------------------------------

/// `0 -> "A"`, `27 -> "AB"`.
pub fn column_name(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{row}", column_name(col))
}

/// Parse `"AB12"` (or `"$AB$12"`) into `(0-based column, 1-based row)`.
pub fn parse_cell_ref(s: &str) -> Option<(u32, u32)> {
    let s = s.replace('$', "");
    let split = s.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = s.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut col = 0u32;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    let row = digits.parse().ok()?;
    Some((col - 1, row))
}

// ---------------------------------------------------------------------------
// Package creation
// ---------------------------------------------------------------------------

/// Worksheet XML holding `rows` as inline strings starting at A1; empty strings are skipped.
pub fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
    );
    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        xml.push_str(&format!("<row r=\"{r}\">"));
        for (j, value) in row.iter().enumerate() {
            if !value.is_empty() {
                xml.push_str(&new_cell("", r, j as u32, None, value));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Build an xlsx package from `(sheet name, worksheet XML)` pairs.
pub fn package(sheets: &[(&str, String)]) -> Result<Vec<u8>> {
    let mut content_types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    let mut workbook = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
    );
    let mut rels = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"
        ));
        workbook.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{n}\" r:id=\"rId{n}\"/>",
            escape(*name)
        ));
        rels.push_str(&format!(
            "<Relationship Id=\"rId{n}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"
        ));
    }
    content_types.push_str("</Types>");
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    let root_rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
        <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
        <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
        </Relationships>";

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut parts: Vec<(String, String)> = vec![
        ("[Content_Types].xml".into(), content_types),
        ("_rels/.rels".into(), root_rels.to_string()),
        (WORKBOOK_PART.into(), workbook),
        (WORKBOOK_RELS.into(), rels),
    ];
    for (i, (_, xml)) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml.clone()));
    }
    for (name, body) in parts {
        out.start_file(name, opts)?;
        out.write_all(body.as_bytes())?;
    }
    Ok(out.finish()?.into_inner())
}

/// Write a workbook of inline-string sheets to `path`.
pub fn create_workbook(path: &Path, sheets: &[(&str, Vec<Vec<String>>)]) -> Result<()> {
    let parts: Vec<(&str, String)> = sheets
        .iter()
        .map(|(name, rows)| (*name, sheet_xml(rows)))
        .collect();
    crate::io::atomic_write(path, &package(&parts)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut f = archive.by_index(i).unwrap();
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                (f.name().to_string(), buf)
            })
            .collect()
    }

    #[test]
    fn column_names_and_refs() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(cell_ref(7, 4), "E7");
        assert_eq!(parse_cell_ref("AB12"), Some((27, 12)));
        assert_eq!(parse_cell_ref("$C$3"), Some((2, 3)));
        assert_eq!(parse_cell_ref("12"), None);
    }

    #[test]
    fn overlong_column_ref_is_rejected() {
        assert_eq!(parse_cell_ref("ZZZZZZZZZZ1"), None);
        assert_eq!(parse_cell_ref("XFD1048576"), Some((16383, 1_048_576)));
    }

    #[test]
    fn reads_created_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.xlsx");
        create_workbook(
            &path,
            &[
                ("Summary", rows(&[&["x"]])),
                ("TRACKER ", rows(&[&["ADDRESS", "NAME"], &["1 Oak St", "Ann"]])),
            ],
        )
        .unwrap();
        let mut book = Workbook::open(&path).unwrap();
        assert_eq!(book.sheet_names(), ["Summary", "TRACKER "]);
        let sheet = book.read_sheet("TRACKER ").unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].cell(1), Some(&CellValue::text("Ann")));
        assert!(matches!(
            book.read_sheet("TRACKER"),
            Err(NoticeError::SheetNotFound(_))
        ));
    }

    #[test]
    fn parses_shared_strings_numbers_and_bools() {
        let shared = parse_shared_strings(
            r#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><t xml:space="preserve">ch </t></r><rPh><t>skip</t></rPh></si><si/></sst>"#,
        )
        .unwrap();
        assert_eq!(shared, ["plain", "rich ", ""]);

        let sheet = parse_sheet_xml(
            r#"<worksheet><sheetData>
                <row r="2"><c r="A2" t="s"><v>1</v></c><c r="C2"><v>45000</v></c><c t="b"><v>1</v></c><c r="F2" s="3"/></row>
            </sheetData></worksheet>"#,
            &shared,
        )
        .unwrap();
        let row = &sheet.rows[0];
        assert_eq!(row.number, 2);
        assert_eq!(row.cell(0), Some(&CellValue::text("rich ")));
        assert_eq!(row.cell(2), Some(&CellValue::Number(45000.0)));
        assert_eq!(row.cell(3), Some(&CellValue::Bool(true)));
        assert_eq!(row.cell(5), None);
    }

    #[test]
    fn parses_auto_filter_values() {
        let sheet = parse_sheet_xml(
            r#"<worksheet><sheetData><row r="1"><c r="B1" t="inlineStr"><is><t>STATUS</t></is></c></row></sheetData>
            <autoFilter ref="B1:D9"><filterColumn colId="1"><filters blank="1"><filter val="ACTIVE"/></filters></filterColumn>
            <filterColumn colId="2"><customFilters><customFilter val="x"/></customFilters></filterColumn></autoFilter></worksheet>"#,
            &[],
        )
        .unwrap();
        let af = sheet.auto_filter.unwrap();
        assert_eq!(af.first_col, 1);
        assert_eq!(af.columns, vec![(1, vec![String::new(), "ACTIVE".to_string()])]);
    }

    #[test]
    fn patch_replaces_existing_cell_and_keeps_style() {
        let xml = r#"<worksheet><sheetData><row r="7"><c r="A7" t="s"><v>0</v></c><c r="E7" s="4"><v>1</v></c></row></sheetData></worksheet>"#;
        let out = patch_cell_xml(xml, 7, 4, "sent letter 01 January 2024").unwrap();
        assert!(out.contains(r#"<c r="A7" t="s"><v>0</v></c>"#));
        let patched = r#"<c r="E7" s="4" t="inlineStr"><is><t xml:space="preserve">sent letter"#;
        assert!(out.contains(patched));
        assert!(out.contains("01 January 2024</t></is></c>"));
        assert!(!out.contains("<v>1</v>"));
    }

    #[test]
    fn patch_inserts_cell_in_column_order() {
        let xml = r#"<worksheet><sheetData><row r="3"><c r="A3"><v>1</v></c><c r="F3"><v>2</v></c></row></sheetData></worksheet>"#;
        let out = patch_cell_xml(xml, 3, 2, "x & y").unwrap();
        let a = out.find(r#"r="A3""#).unwrap();
        let c = out.find(r#"r="C3""#).unwrap();
        let f = out.find(r#"r="F3""#).unwrap();
        assert!(a < c && c < f);
        assert!(out.contains("x &amp; y"));

        let out = patch_cell_xml(xml, 3, 9, "end").unwrap();
        let appended = r#"<c r="J3" t="inlineStr"><is><t xml:space="preserve">end</t></is></c></row>"#;
        assert!(out.contains(appended));
    }

    #[test]
    fn patch_creates_missing_rows() {
        let xml = r#"<x:worksheet xmlns:x="ns"><x:sheetData><x:row r="1"/><x:row r="5"><x:c r="A5"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#;
        let out = patch_cell_xml(xml, 3, 0, "mid").unwrap();
        assert!(out.contains(r#"<x:row r="1"/><x:row r="3"><x:c r="A3""#));

        let out = patch_cell_xml(xml, 1, 1, "empty row").unwrap();
        assert!(out.contains(r#"<x:row r="1"><x:c r="B1""#));

        let out = patch_cell_xml(xml, 9, 0, "tail").unwrap();
        assert!(out.contains(r#"<x:row r="9"><x:c r="A9""#));
        assert!(out.ends_with("</x:sheetData></x:worksheet>"));

        let out = patch_cell_xml("<worksheet><sheetData/></worksheet>", 2, 0, "only").unwrap();
        assert!(out.contains(r#"<sheetData><row r="2"><c r="A2""#));
    }

    #[test]
    fn write_cell_preserves_other_parts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.xlsx");
        create_workbook(
            &path,
            &[
                ("Other", rows(&[&["keep me"]])),
                ("TRACKER", rows(&[&["ADDRESS", "L1"], &["1 Oak St", ""]])),
            ],
        )
        .unwrap();
        let before = entries(&path);

        write_cell(&path, "TRACKER", 2, 1, "sent letter 01 January 2024").unwrap();

        let after = entries(&path);
        assert_eq!(before.len(), after.len());
        for ((name_a, a), (name_b, b)) in before.iter().zip(after.iter()) {
            assert_eq!(name_a, name_b);
            if name_a != "xl/worksheets/sheet2.xml" {
                assert_eq!(a, b, "{name_a} changed");
            }
        }
        let mut book = Workbook::open(&path).unwrap();
        let sheet = book.read_sheet("TRACKER").unwrap();
        assert_eq!(
            sheet.row(2).unwrap().cell(1),
            Some(&CellValue::text("sent letter 01 January 2024"))
        );
        assert_eq!(sheet.row(2).unwrap().cell(0), Some(&CellValue::text("1 Oak St")));
    }

    #[test]
    fn garbage_file_is_workbook_error() {
        let err = Workbook::from_bytes(b"not a zip".to_vec()).err().unwrap();
        assert!(matches!(err, NoticeError::Workbook(_)));
        assert!(err.is_fatal());
    }
}
