//! Per-format content extraction.
//!
//! Files are classified by extension and routed to an extractor that
//! returns one or more [`ExtractedDocument`]s of plain UTF-8 text. Tabular
//! formats (spreadsheets, CSV) are rendered as labeled row lines rather
//! than raw cell soup so the model can answer row-level questions.
//!
//! Images and unsupported extensions are not handled here: the ingestor
//! routes images to the vision collaborator and turns everything else into
//! placeholder documents.

use std::io::Read;

use crate::models::{DocMetadata, ExtractedDocument};

/// Maximum worksheets to process per workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum data rows rendered per table before truncation.
const MAX_TABLE_ROWS: usize = 1000;

/// Format class derived from the filename extension (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    Pdf,
    Word,
    Spreadsheet,
    Csv,
    Json,
    Xml,
    Yaml,
    PlainText,
    RichText,
    Image,
    Unsupported,
}

impl FormatClass {
    pub fn from_name(file_name: &str) -> Self {
        let ext = file_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => FormatClass::Pdf,
            "docx" | "doc" => FormatClass::Word,
            "xlsx" | "xlsm" | "xls" | "ods" => FormatClass::Spreadsheet,
            "csv" => FormatClass::Csv,
            "json" => FormatClass::Json,
            "xml" => FormatClass::Xml,
            "yaml" | "yml" => FormatClass::Yaml,
            "txt" | "md" => FormatClass::PlainText,
            "rtf" => FormatClass::RichText,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tiff" | "tif" => {
                FormatClass::Image
            }
            _ => FormatClass::Unsupported,
        }
    }

    /// Tabular formats get the wide chunk windows.
    pub fn is_tabular(&self) -> bool {
        matches!(self, FormatClass::Spreadsheet | FormatClass::Csv)
    }
}

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
    Ooxml(String),
    Tabular(String),
    Text(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(name) => {
                write!(f, "unsupported file format: {}", name)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
            ExtractError::Tabular(e) => write!(f, "table extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract text documents from file bytes. One file may yield several
/// documents (one per spreadsheet sheet).
pub fn extract(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    match FormatClass::from_name(file_name) {
        FormatClass::Pdf => extract_pdf(bytes, file_name),
        FormatClass::Word => extract_docx(bytes, file_name),
        FormatClass::Spreadsheet => extract_spreadsheet(bytes, file_name),
        FormatClass::Csv => extract_csv(bytes, file_name),
        FormatClass::Json => extract_json(bytes, file_name),
        FormatClass::Xml => extract_xml(bytes, file_name),
        FormatClass::Yaml | FormatClass::PlainText => extract_plain(bytes, file_name),
        FormatClass::RichText => extract_rtf(bytes, file_name),
        FormatClass::Image | FormatClass::Unsupported => {
            Err(ExtractError::UnsupportedFormat(file_name.to_string()))
        }
    }
}

fn single(text: String, file_name: &str) -> Vec<ExtractedDocument> {
    vec![ExtractedDocument::new(
        text,
        DocMetadata::for_source(file_name),
    )]
}

fn extract_pdf(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(single(text, file_name))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                // Paragraph break; chunking splits on these later.
                b"p" if !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(single(out.trim_end().to_string(), file_name))
}

/// Structured grid reader first, flat shared-strings scrape as fallback.
/// Only when both fail does the error surface to the ingestor.
fn extract_spreadsheet(
    bytes: &[u8],
    file_name: &str,
) -> Result<Vec<ExtractedDocument>, ExtractError> {
    match extract_xlsx_sheets(bytes, file_name) {
        Ok(docs) if !docs.is_empty() => return Ok(docs),
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(file = file_name, error = %e, "structured sheet read failed, trying flat scrape");
        }
    }
    let text = extract_xlsx_flat(bytes)?;
    Ok(single(text, file_name))
}

struct SheetCell {
    column: usize,
    value: String,
}

enum CellKind {
    Shared,
    Inline,
    Other,
}

fn extract_xlsx_sheets(
    bytes: &[u8],
    file_name: &str,
) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let shared_strings = read_shared_strings(&mut archive).unwrap_or_default();
    let sheet_titles = read_workbook_sheet_names(&mut archive).unwrap_or_default();
    let sheet_files = list_worksheet_entries(&mut archive);
    if sheet_files.is_empty() {
        return Err(ExtractError::Tabular("no worksheets found".to_string()));
    }

    let mut docs = Vec::new();
    for (idx, entry) in sheet_files.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let title = sheet_titles
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        let xml = read_zip_entry_bounded(&mut archive, &entry, MAX_XML_ENTRY_BYTES)?;
        let grid = read_sheet_grid(&xml, &shared_strings)?;
        if grid.is_empty() {
            continue;
        }

        let headers = grid[0].clone();
        let rows = &grid[1..];
        let text = render_table(Some(&title), &headers, rows);
        let metadata = DocMetadata {
            source: file_name.to_string(),
            sheet: Some(title),
            rows: Some(rows.len()),
            columns: Some(headers.len()),
            ..Default::default()
        };
        docs.push(ExtractedDocument::new(text, metadata));
    }
    Ok(docs)
}

fn read_workbook_sheet_names(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let mut names = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e))
            | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            names.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn list_worksheet_entries(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => in_si = true,
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                strings.push(te.unescape().unwrap_or_default().into_owned());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => in_si = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Parse one worksheet into a dense row grid, resolving shared and inline
/// strings. Missing cells become empty strings.
fn read_sheet_grid(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut grid: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut row_cells: Vec<SheetCell> = Vec::new();
    let mut cell_kind = CellKind::Other;
    let mut cell_column = 0usize;
    let mut in_value = false;
    let mut in_inline_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e))
            | Ok(quick_xml::events::Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => row_cells.clear(),
                b"c" => {
                    cell_kind = CellKind::Other;
                    cell_column = row_cells.len();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                cell_column = column_index(&String::from_utf8_lossy(&attr.value))
                            }
                            b"t" => {
                                cell_kind = match attr.value.as_ref() {
                                    b"s" => CellKind::Shared,
                                    b"inlineStr" => CellKind::Inline,
                                    _ => CellKind::Other,
                                }
                            }
                            _ => {}
                        }
                    }
                }
                b"v" => in_value = true,
                b"t" if matches!(cell_kind, CellKind::Inline) => in_inline_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value || in_inline_t => {
                let raw = te.unescape().unwrap_or_default();
                let value = if in_value && matches!(cell_kind, CellKind::Shared) {
                    raw.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned()
                        .unwrap_or_default()
                } else {
                    raw.into_owned()
                };
                row_cells.push(SheetCell {
                    column: cell_column,
                    value,
                });
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline_t = false,
                b"row" => {
                    let width = row_cells.iter().map(|c| c.column + 1).max().unwrap_or(0);
                    let mut dense = vec![String::new(); width];
                    for cell in row_cells.drain(..) {
                        dense[cell.column] = cell.value;
                    }
                    grid.push(dense);
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(grid)
}

/// `"B3"` → 1. Leading letters are the base-26 column reference.
fn column_index(cell_ref: &str) -> usize {
    cell_ref
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .fold(0usize, |acc, c| {
            acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1)
        })
        .saturating_sub(1)
}

/// Last-resort scrape: every shared string in the workbook, joined flat.
fn extract_xlsx_flat(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let strings = read_shared_strings(&mut archive)?;
    if strings.is_empty() {
        return Err(ExtractError::Tabular(
            "workbook contains no extractable text".to_string(),
        ));
    }
    Ok(strings.join(" "))
}

fn extract_csv(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ExtractError::Tabular(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Tabular(e.to_string()))?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    let text = render_table(None, &headers, &rows);
    let metadata = DocMetadata {
        source: file_name.to_string(),
        rows: Some(rows.len()),
        columns: Some(headers.len()),
        ..Default::default()
    };
    Ok(vec![ExtractedDocument::new(text, metadata)])
}

/// Labeled-row rendering shared by the CSV and spreadsheet paths:
/// column header line, total row count, then `Row N: col: val | ...`.
fn render_table(title: Option<&str>, headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(&format!("=== Sheet: {} ===\n", title));
    }
    out.push_str(&format!("Columns: {}\n", headers.join(", ")));
    out.push_str(&format!("Total rows: {}\n\n", rows.len()));

    for (i, row) in rows.iter().take(MAX_TABLE_ROWS).enumerate() {
        let fields: Vec<String> = row
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(col, value)| {
                let name = headers
                    .get(col)
                    .map(|h| h.as_str())
                    .unwrap_or("column");
                format!("{}: {}", name, value.trim())
            })
            .collect();
        if !fields.is_empty() {
            out.push_str(&format!("Row {}: {}\n", i + 1, fields.join(" | ")));
        }
    }
    if rows.len() > MAX_TABLE_ROWS {
        out.push_str(&format!(
            "... ({} more rows not shown)\n",
            rows.len() - MAX_TABLE_ROWS
        ));
    }
    out
}

fn extract_json(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Text(e.to_string()))?;
    let text =
        serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Text(e.to_string()))?;
    Ok(single(text, file_name))
}

fn extract_xml(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Text(te)) => {
                let text = te.unescape().unwrap_or_default();
                let text = text.trim();
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Text(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(single(out, file_name))
}

fn extract_plain(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    Ok(single(
        String::from_utf8_lossy(bytes).into_owned(),
        file_name,
    ))
}

/// Strip RTF control words and group braces, keeping plain text.
/// `\par` and `\line` become newlines; `\'hh` hex escapes are decoded as
/// Latin-1.
fn extract_rtf(bytes: &[u8], file_name: &str) -> Result<Vec<ExtractedDocument>, ExtractError> {
    let raw = String::from_utf8_lossy(bytes);
    let mut out = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {}
            '\\' => match chars.peek() {
                Some('\\') | Some('{') | Some('}') => {
                    if let Some(literal) = chars.next() {
                        out.push(literal);
                    }
                }
                Some('\'') => {
                    chars.next();
                    let hex: String = chars.by_ref().take(2).collect();
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        out.push(byte as char);
                    }
                }
                _ => {
                    let mut word = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphabetic() {
                            word.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    // Optional numeric parameter
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_digit() || next == '-' {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    // A single space after a control word is part of it
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    if word == "par" || word == "line" {
                        out.push('\n');
                    }
                }
            },
            '\r' | '\n' => {}
            _ => out.push(c),
        }
    }

    Ok(single(out.trim().to_string(), file_name))
}
