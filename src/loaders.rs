//! Per-format document loaders.
//!
//! Each loader turns a file on disk into [`RawSegment`]s: one per PDF page,
//! per slide paragraph, per spreadsheet or CSV data row, or one for the whole
//! file. Segments carry the positional metadata (`page`, `sheet_name`) that
//! later ends up on every chunk split from them.
//!
//! OOXML containers (pptx, xlsx, docx) are read with `zip` + `quick-xml`;
//! every archive entry is read through a size cap.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::models::{FileType, RawSegment};

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Columns addressable in a worksheet (`A` through `XFD`).
const XLSX_MAX_COLUMNS: usize = 16_384;
const XLSX_MAX_COLUMN_LETTERS: usize = 3;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Load `path` with the loader for `file_type`.
pub fn load(file_type: FileType, path: &Path) -> Result<Vec<RawSegment>> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let segments = match file_type {
        FileType::Pdf => load_pdf(&bytes),
        FileType::Txt => load_txt(bytes),
        FileType::Pptx => load_pptx(&bytes),
        FileType::Xlsx => load_xlsx(&bytes),
        FileType::Csv => load_csv(bytes),
        FileType::Unstructured => load_unstructured(bytes),
    }
    .map_err(|message| Error::loader(path, message))?;

    tracing::debug!(
        path = %path.display(),
        file_type = %file_type,
        segments = segments.len(),
        "document loaded"
    );
    Ok(segments)
}

fn load_pdf(bytes: &[u8]) -> std::result::Result<Vec<RawSegment>, String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| format!("PDF extraction failed: {}", e))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, content)| RawSegment {
            content,
            page: Some(i as u32 + 1),
            sheet_name: None,
        })
        .collect())
}

fn load_txt(bytes: Vec<u8>) -> std::result::Result<Vec<RawSegment>, String> {
    let text = decode_utf8(bytes)?;
    Ok(vec![RawSegment::text(text)])
}

fn decode_utf8(bytes: Vec<u8>) -> std::result::Result<String, String> {
    let mut text = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;
    if text.starts_with('\u{feff}') {
        text.remove(0);
    }
    Ok(text)
}

// ---------- OOXML helpers ----------

fn open_archive(bytes: &[u8]) -> std::result::Result<Archive<'_>, String> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not an OOXML archive: {}", e))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
) -> std::result::Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| format!("{}: {}", name, e))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| format!("{}: {}", name, e))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        ));
    }
    Ok(out)
}

/// Entries named `{prefix}{n}.xml`, in numeric order.
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

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == key {
            Some(
                a.unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned()),
            )
        } else {
            None
        }
    })
}

/// Text of every `<t>` run, grouped by enclosing `<p>` paragraph. Works for
/// both DrawingML (`a:p`/`a:t`) and WordprocessingML (`w:p`/`w:t`).
fn collect_paragraphs(xml: &[u8]) -> std::result::Result<Vec<String>, String> {
    let mut paragraphs = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if matches!(e.local_name().as_ref(), b"br" | b"tab") {
                    current.push(' ');
                }
            }
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

// ---------- PPTX ----------

fn load_pptx(bytes: &[u8]) -> std::result::Result<Vec<RawSegment>, String> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_entries(&archive, "ppt/slides/slide");
    if slides.is_empty() {
        return Err("presentation has no slides".to_string());
    }

    let mut segments = Vec::new();
    for (idx, name) in slides.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        for paragraph in collect_paragraphs(&xml)? {
            segments.push(RawSegment {
                content: paragraph,
                page: Some(idx as u32 + 1),
                sheet_name: None,
            });
        }
    }
    Ok(segments)
}

// ---------- Unstructured fallback ----------

/// DOCX text if the bytes are a Word document, otherwise UTF-8 text.
fn load_unstructured(bytes: Vec<u8>) -> std::result::Result<Vec<RawSegment>, String> {
    if let Ok(mut archive) = open_archive(&bytes) {
        if archive.index_for_name("word/document.xml").is_some() {
            let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
            let text = collect_paragraphs(&xml)?.join("\n\n");
            return Ok(vec![RawSegment::text(text)]);
        }
        return Err("unsupported binary container".to_string());
    }
    let text = decode_utf8(bytes).map_err(|_| "no loader can read this file".to_string())?;
    Ok(vec![RawSegment::text(text)])
}

// ---------- XLSX ----------

fn load_xlsx(bytes: &[u8]) -> std::result::Result<Vec<RawSegment>, String> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        read_shared_strings(&read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };
    let sheets = list_sheets(&mut archive)?;
    if sheets.is_empty() {
        return Err("workbook has no worksheets".to_string());
    }

    let mut segments = Vec::new();
    for (sheet_name, entry) in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, &entry)?;
        let rows = read_sheet_rows(&xml, &shared_strings)?;
        for content in render_rows(&rows) {
            segments.push(RawSegment {
                content,
                page: None,
                sheet_name: Some(sheet_name.clone()),
            });
        }
    }
    Ok(segments)
}

fn read_shared_strings(xml: &[u8]) -> std::result::Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed shared strings: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// `(sheet name, archive entry)` in workbook order. Falls back to numbered
/// `sheetN.xml` entries when the workbook relationships cannot be resolved.
fn list_sheets(archive: &mut Archive<'_>) -> std::result::Result<Vec<(String, String)>, String> {
    let has_workbook = archive.index_for_name("xl/workbook.xml").is_some()
        && archive.index_for_name("xl/_rels/workbook.xml.rels").is_some();
    if has_workbook {
        let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
        let rels = read_zip_entry_bounded(archive, "xl/_rels/workbook.xml.rels")?;
        let targets = relationship_targets(&rels)?;

        let mut sheets = Vec::new();
        let mut reader = Reader::from_reader(workbook.as_slice());
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                    let name = attr(&e, b"name");
                    let target = attr(&e, b"id").and_then(|id| targets.get(&id).cloned());
                    if let (Some(name), Some(target)) = (name, target) {
                        let entry = resolve_target(&target);
                        if archive.index_for_name(&entry).is_some() {
                            sheets.push((name, entry));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(format!("malformed workbook: {}", e)),
                _ => {}
            }
            buf.clear();
        }
        if !sheets.is_empty() {
            return Ok(sheets);
        }
    }

    Ok(numbered_entries(archive, "xl/worksheets/sheet")
        .into_iter()
        .enumerate()
        .map(|(i, entry)| (format!("Sheet{}", i + 1), entry))
        .collect())
}

fn relationship_targets(xml: &[u8]) -> std::result::Result<HashMap<String, String>, String> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed relationships: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

/// Zero-based column index from a cell reference such as `AB12`. `None` past
/// `XFD`, the last column a workbook can address.
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters = cell_ref.as_bytes().iter().take_while(|b| b.is_ascii_alphabetic());
    let mut n = 0usize;
    for (i, b) in letters.enumerate() {
        if i == XLSX_MAX_COLUMN_LETTERS {
            return None;
        }
        n = n * 26 + usize::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    (1..=XLSX_MAX_COLUMNS).contains(&n).then(|| n - 1)
}

fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.iter().rev().collect()
}

type SheetRow = Vec<(usize, String)>;

fn read_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
) -> std::result::Result<Vec<SheetRow>, String> {
    let mut rows = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row: SheetRow = Vec::new();
    let mut col = 0usize;
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    col = match attr(&e, b"r") {
                        Some(r) => column_index(&r)
                            .ok_or_else(|| {
                            let shown: String = r.chars().take(16).collect();
                            format!("invalid cell reference '{}'", shown)
                        })?,
                        None => row.last().map(|(c, _)| c + 1).unwrap_or(0),
                    };
                    cell_type = attr(&e, b"t").unwrap_or_default();
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let resolved = match cell_type.as_str() {
                        "s" => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default(),
                        "b" => match value.trim() {
                            "1" => "TRUE".to_string(),
                            _ => "FALSE".to_string(),
                        },
                        _ => value.clone(),
                    };
                    let resolved = resolved.trim();
                    if !resolved.is_empty() {
                        row.push((col, resolved.to_string()));
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if !row.is_empty() {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("malformed worksheet: {}", e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// The first row is the header; every later row becomes `header: value`
/// lines. Cells under a blank header are labelled with their column letter.
fn render_rows(rows: &[SheetRow]) -> Vec<String> {
    let Some((header_row, data)) = rows.split_first() else {
        return Vec::new();
    };
    let headers: HashMap<usize, &str> = header_row
        .iter()
        .map(|(c, h)| (*c, h.as_str()))
        .collect();

    data.iter()
        .map(|row| {
            row.iter()
                .map(|(c, v)| match headers.get(c) {
                    Some(h) => format!("{}: {}", h, v),
                    None => format!("{}: {}", column_letters(*c), v),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------- CSV ----------

fn load_csv(bytes: Vec<u8>) -> std::result::Result<Vec<RawSegment>, String> {
    let text = decode_utf8(bytes)?;
    let mut records = parse_csv(&text)?.into_iter();
    let Some(headers) = records.next() else {
        return Ok(Vec::new());
    };

    let mut segments = Vec::new();
    for (line, record) in records.enumerate() {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() > headers.len() {
            tracing::warn!(
                row = line + 2,
                fields = record.len(),
                columns = headers.len(),
                "CSV row is wider than its header, extra fields keyed by column letter"
            );
        }
        let mut lines: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let v = record.get(i).map(|s| s.trim()).unwrap_or("");
                format!("{}: {}", h.trim(), v)
            })
            .collect();
        lines.extend(
            record
                .iter()
                .enumerate()
                .skip(headers.len())
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(i, v)| format!("{}: {}", column_letters(i), v.trim())),
        );
        segments.push(RawSegment::text(lines.join("\n")));
    }
    Ok(segments)
}

fn parse_csv(text: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
