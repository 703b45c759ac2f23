//! `{{PLACEHOLDER}}` substitution inside WordprocessingML packages.
//!
//! Text is matched per paragraph, across `<w:t>` nodes, so a token that
//! Word split over several formatting runs is still found. The value goes
//! into the node holding the token's first character; the rest of the token
//! is cut from the nodes after it. Only the `<w:t>` elements a token touches
//! are rewritten. Paragraphs in table cells and text boxes are ordinary
//! (nested) paragraphs and get the same treatment.

use crate::error::Result;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DOCUMENT_PART: &str = "word/document.xml";

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"))
}

/// Parts whose paragraphs carry user-visible text.
fn is_text_part(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    if file.contains('/') || !file.ends_with(".xml") {
        return false;
    }
    file == "document.xml"
        || file == "footnotes.xml"
        || file == "endnotes.xml"
        || file.starts_with("header")
        || file.starts_with("footer")
}

// ---------------------------------------------------------------------------
// Paragraph walk
// ---------------------------------------------------------------------------

/// One `<w:t>` element: byte span in the part XML and its decoded text.
#[derive(Debug)]
struct TextNode {
    start: usize,
    end: usize,
    prefix: String,
    /// Attributes of the start tag, verbatim with leading whitespace.
    attrs: String,
    text: String,
}

/// Call `on_paragraph` with the text nodes of every paragraph, innermost first.
fn walk_paragraphs(xml: &str, mut on_paragraph: impl FnMut(Vec<TextNode>)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<(String, Vec<TextNode>)> = Vec::new();
    let mut open_text: Option<TextNode> = None;
    let mut pos = 0usize;

    loop {
        let start = pos;
        let event = reader.read_event()?;
        pos = reader.buffer_position() as usize;

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"p" => stack.push((prefix_of(e.name().prefix()), Vec::new())),
                b"t" => {
                    let prefix = prefix_of(e.name().prefix());
                    if stack.last().is_some_and(|(p, _)| *p == prefix) {
                        open_text = Some(TextNode {
                            start,
                            end: start,
                            prefix,
                            attrs: String::from_utf8_lossy(e.attributes_raw()).into_owned(),
                            text: String::new(),
                        });
                    }
                }
                _ => {}
            },
            Event::Text(ref t) => {
                if let Some(node) = open_text.as_mut() {
                    node.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(ref t) => {
                if let Some(node) = open_text.as_mut() {
                    node.text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"t" => {
                    if let (Some(mut node), Some((_, nodes))) = (open_text.take(), stack.last_mut())
                    {
                        node.end = pos;
                        nodes.push(node);
                    }
                }
                b"p" => {
                    if let Some((_, nodes)) = stack.pop() {
                        on_paragraph(nodes);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

fn prefix_of(prefix: Option<quick_xml::name::Prefix<'_>>) -> String {
    prefix
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

struct Replacement {
    start: usize,
    end: usize,
    value: String,
}

/// Replace known placeholders in one part's XML. Unknown tokens are left as they are.
pub fn substitute_xml(xml: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    walk_paragraphs(xml, |nodes| {
        let mut full = String::new();
        let mut spans = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let begin = full.len();
            full.push_str(&node.text);
            spans.push((begin, full.len()));
        }

        let found: Vec<Replacement> = token_re()
            .captures_iter(&full)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                let value = values.get(cap.get(1)?.as_str())?;
                Some(Replacement {
                    start: whole.start(),
                    end: whole.end(),
                    value: value.clone(),
                })
            })
            .collect();
        if found.is_empty() {
            return;
        }

        for (node, &(ns, ne)) in nodes.iter().zip(&spans) {
            let mut out = String::new();
            let mut cursor = ns;
            let mut touched = false;
            for r in &found {
                if r.end <= ns || r.start >= ne {
                    continue;
                }
                let cut_from = r.start.max(ns);
                out.push_str(&full[cursor..cut_from]);
                if r.start >= ns {
                    out.push_str(&r.value);
                }
                cursor = r.end.min(ne);
                touched = true;
            }
            if touched {
                out.push_str(&full[cursor..ne]);
                edits.push((node.start, node.end, text_elements(node, &out)));
            }
        }
    })?;

    if edits.is_empty() {
        return Ok(xml.to_string());
    }
    edits.sort_by_key(|(start, _, _)| *start);
    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        out.push_str(&xml[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&xml[cursor..]);
    Ok(out)
}

/// `<w:t>` elements for `text`, carrying the original node's attributes;
/// each newline becomes a `<w:br/>`.
fn text_elements(node: &TextNode, text: &str) -> String {
    let p = if node.prefix.is_empty() {
        String::new()
    } else {
        format!("{}:", node.prefix)
    };
    let mut attrs = node.attrs.trim_end().to_string();
    if !attrs.contains("xml:space") {
        attrs.push_str(" xml:space=\"preserve\"");
    }
    text.split('\n')
        .map(|line| format!("<{p}t{attrs}>{}</{p}t>", escape(line.trim_end_matches('\r'))))
        .collect::<Vec<_>>()
        .join(&format!("<{p}br/>"))
}

/// Substitute placeholders in every text part of a `.docx` package.
/// All other entries are copied unchanged.
pub fn render_package(template: &[u8], values: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        if is_text_part(&name) {
            let mut xml = String::new();
            archive.by_index(i)?.read_to_string(&mut xml)?;
            let patched = substitute_xml(&xml, values)?;
            out.start_file(name, opts)?;
            out.write_all(patched.as_bytes())?;
        } else {
            out.raw_copy_file(archive.by_index_raw(i)?)?;
        }
    }
    Ok(out.finish()?.into_inner())
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

fn text_parts(package: &[u8]) -> Result<Vec<(String, String)>> {
    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let mut parts = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if is_text_part(file.name()) {
            let name = file.name().to_string();
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            parts.push((name, xml));
        }
    }
    Ok(parts)
}

/// Plain text of every paragraph in the package's text parts, one per line.
pub fn document_text(package: &[u8]) -> Result<String> {
    let mut lines = Vec::new();
    for (_, xml) in text_parts(package)? {
        walk_paragraphs(&xml, |nodes| {
            lines.push(nodes.into_iter().map(|n| n.text).collect::<String>());
        })?;
    }
    Ok(lines.join("\n"))
}

/// Names of `{{…}}` tokens still present in the package, in order of appearance.
pub fn remaining_placeholders(package: &[u8]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for line in document_text(package)?.lines() {
        for cap in token_re().captures_iter(line) {
            if let Some(m) = cap.get(1) {
                names.push(m.as_str().to_string());
            }
        }
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Package creation
// ---------------------------------------------------------------------------

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// A `word/document.xml` body with one plain paragraph per entry.
pub fn document_xml(paragraphs: &[&str]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<w:document xmlns:w=\"{W_NS}\"><w:body>"
    );
    let node = TextNode {
        start: 0,
        end: 0,
        prefix: "w".to_string(),
        attrs: String::new(),
        text: String::new(),
    };
    for p in paragraphs {
        xml.push_str("<w:p><w:r>");
        xml.push_str(&text_elements(&node, p));
        xml.push_str("</w:r></w:p>");
    }
    xml.push_str("<w:sectPr/></w:body></w:document>");
    xml
}

/// Build a `.docx` from `(part name, XML)` pairs; `word/document.xml` must be one of them.
pub fn package(parts: &[(&str, String)]) -> Result<Vec<u8>> {
    let mut types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    );
    for (name, _) in parts {
        let kind = match name.trim_start_matches("word/") {
            "document.xml" => Some("document.main"),
            n if n.starts_with("header") => Some("header"),
            n if n.starts_with("footer") => Some("footer"),
            _ => None,
        };
        if let Some(kind) = kind {
            types.push_str(&format!(
                "<Override PartName=\"/{name}\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.{kind}+xml\"/>"
            ));
        }
    }
    types.push_str("</Types>");
    let rels = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
        <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
        <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"word/document.xml\"/>\
        </Relationships>";

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    out.start_file("[Content_Types].xml", opts)?;
    out.write_all(types.as_bytes())?;
    out.start_file("_rels/.rels", opts)?;
    out.write_all(rels.as_bytes())?;
    for (name, xml) in parts {
        out.start_file(*name, opts)?;
        out.write_all(xml.as_bytes())?;
    }
    Ok(out.finish()?.into_inner())
}

/// Write a one-part template whose paragraphs are `paragraphs`.
pub fn create_template(path: &Path, paragraphs: &[&str]) -> Result<()> {
    let bytes = package(&[(DOCUMENT_PART, document_xml(paragraphs))])?;
    crate::io::atomic_write(path, &bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn body(inner: &str) -> String {
        format!("<w:document xmlns:w=\"{W_NS}\"><w:body>{inner}</w:body></w:document>")
    }

    #[test]
    fn replaces_token_and_keeps_sibling_runs() {
        let bold = "<w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">Dear </w:t></w:r>";
        let xml = body(&format!("<w:p>{bold}<w:r><w:t>{{{{NAME}}}},</w:t></w:r></w:p>"));
        let out = substitute_xml(&xml, &values(&[("NAME", "Ann Smith")])).unwrap();
        assert!(out.contains(bold));
        assert!(out.contains("<w:t xml:space=\"preserve\">Ann Smith,</w:t>"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn token_split_across_runs() {
        let xml = body(
            "<w:p><w:r><w:t>Ref {{W</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>O}</w:t></w:r>\
             <w:r><w:rPr><w:u/></w:rPr><w:t>} due</w:t></w:r></w:p>",
        );
        let out = substitute_xml(&xml, &values(&[("WO", "12345")])).unwrap();
        assert!(out.contains("<w:t xml:space=\"preserve\">Ref 12345</w:t>"));
        assert!(out.contains("<w:rPr><w:i/></w:rPr><w:t xml:space=\"preserve\"></w:t>"));
        assert!(out.contains("<w:rPr><w:u/></w:rPr><w:t xml:space=\"preserve\"> due</w:t>"));
    }

    #[test]
    fn table_cells_and_text_boxes() {
        let xml = body(
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{ADDRESS}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             <w:p><w:r><w:t>Outer {{NAME}} </w:t></w:r><w:r><w:pict><v:shape xmlns:v=\"urn:v\"><v:textbox>\
             <w:txbxContent><w:p><w:r><w:t>Box {{NAME}}</w:t></w:r></w:p></w:txbxContent>\
             </v:textbox></v:shape></w:pict></w:r><w:r><w:t>end</w:t></w:r></w:p>",
        );
        let out =
            substitute_xml(&xml, &values(&[("NAME", "Ann"), ("ADDRESS", "1 Oak St")])).unwrap();
        assert!(out.contains(">1 Oak St</w:t>"));
        assert!(out.contains(">Outer Ann </w:t>"));
        assert!(out.contains(">Box Ann</w:t>"));
        assert!(out.contains("<w:t>end</w:t>"));
    }

    #[test]
    fn multi_line_values_become_breaks() {
        let xml = body("<w:p><w:r><w:t>{{ ADDRESS }}</w:t></w:r></w:p>");
        let address = values(&[("ADDRESS", "1 Oak St\nLeeds & District")]);
        let out = substitute_xml(&xml, &address).unwrap();
        assert!(out.contains(concat!(
            "<w:t xml:space=\"preserve\">1 Oak St</w:t><w:br/>",
            "<w:t xml:space=\"preserve\">Leeds &amp; District</w:t>",
        )));
    }

    #[test]
    fn rewritten_text_keeps_its_attributes() {
        let xml = body(
            "<w:p><w:r><w:t w14:paraId=\"0A1B\" xml:space=\"preserve\">Hi {{NAME}}</w:t></w:r></w:p>",
        );
        let out = substitute_xml(&xml, &values(&[("NAME", "Ann")])).unwrap();
        assert!(out.contains("<w:t w14:paraId=\"0A1B\" xml:space=\"preserve\">Hi Ann</w:t>"));
    }

    #[test]
    fn unknown_tokens_are_left_alone() {
        let xml = body("<w:p><w:r><w:t>{{NAME}} {{FLAT}}</w:t></w:r></w:p>");
        let out = substitute_xml(&xml, &values(&[("NAME", "Ann")])).unwrap();
        assert!(out.contains("Ann {{FLAT}}"));

        let untouched = substitute_xml(&xml, &values(&[])).unwrap();
        assert_eq!(untouched, xml);
    }

    #[test]
    fn package_render_covers_headers_and_keeps_other_parts() {
        let styles = "<w:styles xmlns:w=\"x\"><!-- {{NAME}} --></w:styles>".to_string();
        let header = body("<w:p><w:r><w:t>WO {{WO}}</w:t></w:r></w:p>");
        let template = package(&[
            (DOCUMENT_PART, document_xml(&["Dear {{NAME}}", "Date: {{DATE}}"])),
            ("word/header1.xml", header),
            ("word/styles.xml", styles.clone()),
        ])
        .unwrap();
        assert_eq!(
            remaining_placeholders(&template).unwrap(),
            ["NAME", "DATE", "WO"]
        );

        let vals = values(&[("NAME", "Ann"), ("DATE", "15 October 2026"), ("WO", "77")]);
        let rendered = render_package(&template, &vals).unwrap();
        assert!(remaining_placeholders(&rendered).unwrap().is_empty());
        let text = document_text(&rendered).unwrap();
        assert!(text.contains("Dear Ann"));
        assert!(text.contains("WO 77"));

        let mut archive = ZipArchive::new(Cursor::new(rendered.as_slice())).unwrap();
        let mut kept = String::new();
        archive
            .by_name("word/styles.xml")
            .unwrap()
            .read_to_string(&mut kept)
            .unwrap();
        assert_eq!(kept, styles);
    }

    #[test]
    fn non_docx_bytes_fail() {
        assert!(render_package(b"plain text", &values(&[])).is_err());
    }
}
