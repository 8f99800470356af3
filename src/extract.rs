//! Format-specific text extraction, dispatched by file extension.
//!
//! Each supported format has an [`Extractor`] implementation that turns raw
//! file bytes into UTF-8 text. The [`ExtractorRegistry`] maps lower-case
//! extensions to extractors; an extension with no entry is unsupported and the
//! loader skips the file.
//!
//! | Extensions | Extractor | Output |
//! |---|---|---|
//! | md, txt, py, js, html, css, json, yml, yaml, xml, csv, rst, tex | [`PlainTextExtractor`] | bytes decoded as UTF-8, invalid sequences replaced |
//! | pdf | [`PdfExtractor`] | page texts joined with blank lines |
//! | docx | [`DocxExtractor`] | paragraphs separated by blank lines |
//! | xlsx | [`XlsxExtractor`] | `Sheet: <name>` then one line per row, cells tab-separated |
//! | xls | [`XlsExtractor`] | same layout as xlsx |
//! | pptx | [`PptxExtractor`] | `Slide <n>` then paragraphs separated by blank lines |
//!
//! Extraction never panics: malformed input is reported as an [`ExtractError`].

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::sync::Arc;

use calamine::Reader as SpreadsheetReader;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Extensions read directly as text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "md", "txt", "py", "js", "html", "css", "json", "yml", "yaml", "xml", "csv", "rst", "tex",
];

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(e: zip::result::ZipError) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

impl From<quick_xml::Error> for ExtractError {
    fn from(e: quick_xml::Error) -> Self {
        ExtractError::Ooxml(e.to_string())
    }
}

/// Text pulled out of one file, plus any non-fatal problems met on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub warnings: Vec<String>,
}

impl Extraction {
    fn clean(text: String) -> Self {
        Self {
            text,
            warnings: Vec::new(),
        }
    }
}

/// Converts one file format's bytes into text.
pub trait Extractor: Send + Sync {
    /// Short format name used in log lines.
    fn name(&self) -> &'static str;

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError>;
}

/// Maps file extensions to the extractor that handles them.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry; every extension is unsupported.
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// The built-in format set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let text: Arc<dyn Extractor> = Arc::new(PlainTextExtractor);
        for ext in TEXT_EXTENSIONS {
            registry.register(ext, text.clone());
        }
        registry.register("pdf", Arc::new(PdfExtractor));
        registry.register("docx", Arc::new(DocxExtractor));
        registry.register("xlsx", Arc::new(XlsxExtractor));
        registry.register("xls", Arc::new(XlsExtractor));
        registry.register("pptx", Arc::new(PptxExtractor));
        registry
    }

    pub fn register(&mut self, extension: &str, extractor: Arc<dyn Extractor>) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), extractor);
    }

    pub fn get(&self, extension: &str) -> Option<Arc<dyn Extractor>> {
        self.by_extension
            .get(&extension.to_ascii_lowercase())
            .cloned()
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.by_extension
            .contains_key(&extension.to_ascii_lowercase())
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.by_extension.keys().cloned().collect();
        exts.sort();
        exts
    }

    pub fn extract(&self, extension: &str, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let extractor = self
            .get(extension)
            .ok_or_else(|| ExtractError::Unsupported(extension.to_string()))?;
        extractor.extract(bytes)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============ Plain text ============

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Extraction::clean(text.to_string())),
            Err(e) => Ok(Extraction {
                text: String::from_utf8_lossy(bytes).into_owned(),
                warnings: vec![format!(
                    "invalid UTF-8 at byte {}; undecodable bytes replaced",
                    e.valid_up_to()
                )],
            }),
        }
    }
}

// ============ PDF ============

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        // pdf-extract panics on some malformed inputs.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;

        let text = pages
            .iter()
            .map(|page| page.trim())
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Extraction::clean(text))
    }
}

// ============ OOXML shared helpers ============

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    Ok(zip::ZipArchive::new(Cursor::new(bytes))?)
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Numbered parts such as `ppt/slides/slide3.xml`, in numeric order.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .filter(|n| !n[prefix.len()..].contains('/'))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key || a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Collects the text of every `<t>` run, grouped by enclosing `<p>`.
///
/// Works for WordprocessingML (`w:p`/`w:t`) and DrawingML (`a:p`/`a:t`).
/// `tab` and `br` elements inside a paragraph become a tab and a newline.
/// Empty paragraphs are dropped.
fn xml_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"p" => current.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(te) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let para = current.trim_end();
                    if !para.trim().is_empty() {
                        paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ============ DOCX ============

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let mut archive = open_archive(bytes)?;
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
        Ok(Extraction::clean(xml_paragraphs(&xml)?.join("\n\n")))
    }
}

// ============ PPTX ============

pub struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn name(&self) -> &'static str {
        "pptx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let mut archive = open_archive(bytes)?;
        let slides = numbered_entries(&archive, "ppt/slides/slide");
        if slides.is_empty() {
            return Err(ExtractError::Ooxml("no slides found".to_string()));
        }

        let mut sections = Vec::new();
        let mut warnings = Vec::new();
        for (idx, name) in slides.iter().enumerate() {
            let parsed = read_zip_entry_bounded(&mut archive, name, MAX_XML_ENTRY_BYTES)
                .and_then(|xml| xml_paragraphs(&xml));
            match parsed {
                Ok(paras) if !paras.is_empty() => {
                    sections.push(format!("Slide {}\n{}", idx + 1, paras.join("\n\n")));
                }
                Ok(_) => {}
                Err(e) => warnings.push(format!("slide {}: {}", idx + 1, e)),
            }
        }
        Ok(Extraction {
            text: sections.join("\n\n"),
            warnings,
        })
    }
}

// ============ XLSX ============

pub struct XlsxExtractor;

impl Extractor for XlsxExtractor {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let mut archive = open_archive(bytes)?;
        let shared_strings = read_shared_strings(&mut archive)?;
        let sheets = list_sheets(&mut archive)?;
        if sheets.is_empty() {
            return Err(ExtractError::Ooxml("workbook has no sheets".to_string()));
        }

        let mut sections = Vec::new();
        let mut warnings = Vec::new();
        for (name, part) in sheets.into_iter().take(XLSX_MAX_SHEETS) {
            let parsed = read_zip_entry_bounded(&mut archive, &part, MAX_XML_ENTRY_BYTES)
                .and_then(|xml| sheet_rows(&xml, &shared_strings));
            match parsed {
                Ok(rows) if !rows.is_empty() => {
                    sections.push(format!("Sheet: {}\n{}", name, rows.join("\n")));
                }
                Ok(_) => {}
                Err(e) => warnings.push(format!("sheet '{}': {}", name, e)),
            }
        }
        Ok(Extraction {
            text: sections.join("\n\n"),
            warnings,
        })
    }
}

// ============ XLS (BIFF) ============

pub struct XlsExtractor;

impl Extractor for XlsExtractor {
    fn name(&self) -> &'static str {
        "xls"
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        // The BIFF parser indexes into record bodies and can panic on truncated input.
        std::panic::catch_unwind(|| legacy_workbook_text(bytes)).map_err(|_| {
            ExtractError::Spreadsheet("parser panicked on malformed input".to_string())
        })?
    }
}

fn legacy_workbook_text(bytes: &[u8]) -> Result<Extraction, ExtractError> {
    let mut workbook: calamine::Xls<_> = calamine::open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: calamine::XlsError| ExtractError::Spreadsheet(e.to_string()))?;
    let names = workbook.sheet_names();
    if names.is_empty() {
        return Err(ExtractError::Spreadsheet("workbook has no sheets".to_string()));
    }

    let mut sections = Vec::new();
    let mut warnings = Vec::new();
    for name in names.into_iter().take(XLSX_MAX_SHEETS) {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let rows: Vec<String> = range
                    .rows()
                    .take(XLSX_MAX_CELLS_PER_SHEET)
                    .filter_map(|row| {
                        let mut cells: Vec<String> =
                            row.iter().map(|cell| cell.to_string()).collect();
                        while cells.last().is_some_and(|c| c.is_empty()) {
                            cells.pop();
                        }
                        (!cells.is_empty()).then(|| cells.join("\t"))
                    })
                    .collect();
                if !rows.is_empty() {
                    sections.push(format!("Sheet: {}\n{}", name, rows.join("\n")));
                }
            }
            Err(e) => warnings.push(format!("sheet '{}': {}", name, e)),
        }
    }
    Ok(Extraction {
        text: sections.join("\n\n"),
        warnings,
    })
}

/// Shared string table; absent in workbooks without text cells.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// `(sheet name, part path)` pairs in workbook order.
///
/// Names come from `xl/workbook.xml`, resolved to parts through the workbook
/// relationships. Without a workbook part, numbered sheet parts are used with
/// generated names.
fn list_sheets(archive: &mut Archive<'_>) -> Result<Vec<(String, String)>, ExtractError> {
    if archive.index_for_name("xl/workbook.xml").is_none() {
        return Ok(numbered_entries(archive, "xl/worksheets/sheet")
            .into_iter()
            .enumerate()
            .map(|(i, part)| (format!("Sheet{}", i + 1), part))
            .collect());
    }

    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let targets = if archive.index_for_name("xl/_rels/workbook.xml.rels").is_some() {
        let rels =
            read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels", MAX_XML_ENTRY_BYTES)?;
        relationship_targets(&rels)?
    } else {
        HashMap::new()
    };

    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let position = sheets.len() + 1;
                let name = attr_value(&e, b"name").unwrap_or_else(|| format!("Sheet{}", position));
                let part = attr_value(&e, b"id")
                    .and_then(|id| targets.get(&id).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position));
                sheets.push((name, part));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// Relationship id to part path, resolved against `xl/`.
fn relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, ExtractError> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    let part = match target.strip_prefix('/') {
                        Some(abs) => abs.to_string(),
                        None => format!("xl/{}", target),
                    };
                    targets.insert(id, part);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Serialises one worksheet: one string per non-empty row, cells joined by tabs.
fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut rows: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut row_num = 0u32;
    let mut cell_type = String::new();
    let mut cell_value = String::new();
    let mut in_value = false;
    let mut cell_count = 0usize;

    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_num = attr_value(&e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(row_num + 1);
                }
                b"c" => {
                    cell_type = attr_value(&e, b"t").unwrap_or_default();
                    cell_value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Text(te) if in_value => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                cell_value.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(value) = cell_text(&cell_type, &cell_value, shared_strings) {
                        rows.entry(row_num).or_default().push(value);
                        cell_count += 1;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows.into_values().map(|cells| cells.join("\t")).collect())
}

fn cell_text(cell_type: &str, raw: &str, shared_strings: &[String]) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let value = match cell_type {
        "s" => shared_strings.get(raw.parse::<usize>().ok()?)?.clone(),
        "b" => if raw == "1" { "TRUE" } else { "FALSE" }.to_string(),
        _ => raw.to_string(),
    };
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let opts = SimpleFileOptions::default();
            for (name, body) in entries {
                zip.start_file(*name, opts).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.supports("md"));
        assert!(registry.supports("PDF"));
        assert!(!registry.supports("exe"));
        assert!(!registry.supports("doc"));
        assert_eq!(registry.get("xlsx").map(|e| e.name()), Some("xlsx"));
        assert_eq!(registry.get("XLS").map(|e| e.name()), Some("xls"));
        assert!(registry.extensions().contains(&"tex".to_string()));
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = ExtractorRegistry::with_defaults()
            .extract("bin", b"foo")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn plain_text_lossy_decoding_is_recorded() {
        let out = PlainTextExtractor.extract(b"caf\xe9 menu").unwrap();
        assert_eq!(out.text, "caf\u{FFFD} menu");
        assert_eq!(out.warnings.len(), 1);

        let clean = PlainTextExtractor.extract("\u{feff}héllo".as_bytes()).unwrap();
        assert_eq!(clean.text, "héllo");
        assert!(clean.warnings.is_empty());
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = PdfExtractor.extract(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = DocxExtractor.extract(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn invalid_xls_returns_spreadsheet_error() {
        let err = XlsExtractor.extract(b"not a compound file").unwrap_err();
        assert!(matches!(err, ExtractError::Spreadsheet(_)));
        let err = XlsExtractor.extract(&[0u8; 600]).unwrap_err();
        assert!(matches!(err, ExtractError::Spreadsheet(_)));
    }

    #[test]
    fn docx_paragraphs_separated_by_blank_lines() {
        let doc = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t xml:space="preserve">Travel </w:t></w:r><w:r><w:t>policy</w:t></w:r></w:p>
<w:p></w:p>
<w:p><w:r><w:t>Book flights &amp; hotels early.</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = zip_of(&[("word/document.xml", doc)]);
        let out = DocxExtractor.extract(&bytes).unwrap();
        assert_eq!(out.text, "Travel policy\n\nBook flights & hotels early.");
    }

    #[test]
    fn xlsx_sheets_rows_and_cell_kinds() {
        let workbook = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>
<sheet name="Budget" sheetId="1" r:id="rId1"/><sheet name="Notes" sheetId="2" r:id="rId2"/></sheets></workbook>"#;
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Target="worksheets/sheet2.xml"/></Relationships>"#;
        let shared = r#"<sst><si><t>Item</t></si><si><t>Cost</t></si><si><r><t>Lap</t></r><r><t>top</t></r></si></sst>"#;
        let sheet1 = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>1299.5</v></c></row>
</sheetData></worksheet>"#;
        let sheet2 = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>Approved</t></is></c><c r="B1" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let bytes = zip_of(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet1),
            ("xl/worksheets/sheet2.xml", sheet2),
        ]);
        let out = XlsxExtractor.extract(&bytes).unwrap();
        assert_eq!(
            out.text,
            "Sheet: Budget\nItem\tCost\nLaptop\t1299.5\n\nSheet: Notes\nApproved\tTRUE"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn xlsx_broken_sheet_is_skipped_with_warning() {
        let workbook = r#"<workbook><sheets><sheet name="Good" sheetId="1"/><sheet name="Missing" sheetId="2"/></sheets></workbook>"#;
        let sheet1 = r#"<worksheet><sheetData><row r="1"><c t="inlineStr"><is><t>ok</t></is></c></row></sheetData></worksheet>"#;
        let bytes = zip_of(&[
            ("xl/workbook.xml", workbook),
            ("xl/worksheets/sheet1.xml", sheet1),
        ]);
        let out = XlsxExtractor.extract(&bytes).unwrap();
        assert_eq!(out.text, "Sheet: Good\nok");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("Missing"));
    }

    #[test]
    fn pptx_paragraphs_within_a_slide_separated_by_blank_lines() {
        let slide = r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody>
<a:p><a:r><a:t>Agenda</a:t></a:r></a:p><a:p><a:r><a:t>Budget review</a:t></a:r></a:p>
</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#;
        let bytes = zip_of(&[("ppt/slides/slide1.xml", slide)]);
        let out = PptxExtractor.extract(&bytes).unwrap();
        assert_eq!(out.text, "Slide 1\nAgenda\n\nBudget review");
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
                text
            )
        };
        let s1 = slide("Kickoff");
        let s2 = slide("Roadmap");
        let s10 = slide("Questions");
        let bytes = zip_of(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
        ]);
        let out = PptxExtractor.extract(&bytes).unwrap();
        assert_eq!(
            out.text,
            "Slide 1\nKickoff\n\nSlide 2\nRoadmap\n\nSlide 3\nQuestions"
        );
    }
}
