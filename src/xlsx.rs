//! Minimal .xlsx workbook codec.
//!
//! Reads the first worksheet of an uploaded workbook as rows of typed cells,
//! and writes single-sheet workbooks with a bold, shaded header row. Only the
//! parts of the format the import/export screens need are implemented: shared
//! strings, inline strings, cached formula strings, numbers, and booleans on
//! the way in; inline strings and numbers on the way out.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::{Duration, NaiveDate};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A worksheet cell, typed the way the sheet stores it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
            Cell::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        }
    }

    /// Permissive integer coercion: numeric cells truncate, text cells parse.
    pub fn integer(&self) -> Option<i64> {
        match self {
            Cell::Number(n) => Some(*n as i64),
            Cell::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Permissive date coercion: numeric cells are Excel serial dates, text
    /// cells try the common day-first and ISO formats.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Number(n) => from_excel_serial(*n),
            Cell::Text(s) => {
                let s = s.trim();
                for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"] {
                    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                        return Some(d);
                    }
                }
                None
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// Excel's day zero is 1899-12-30 (the 1900 leap-year bug folded in).
fn from_excel_serial(n: f64) -> Option<NaiveDate> {
    if !(1.0..=200_000.0).contains(&n) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(n as i64))
}

/// Read the first worksheet of a workbook file as rows of typed cells.
pub fn read_workbook(path: &Path) -> anyhow::Result<Vec<Vec<Cell>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read workbook {}", path.to_string_lossy()))?;
    read_workbook_bytes(&bytes)
}

/// Same as [`read_workbook`], over an in-memory upload.
pub fn read_workbook_bytes(bytes: &[u8]) -> anyhow::Result<Vec<Vec<Cell>>> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).context("not a valid workbook archive")?;

    let shared = match read_entry(&mut zip, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut zip)?;
    let sheet_xml = read_entry(&mut zip, &sheet_path)?
        .ok_or_else(|| anyhow!("workbook has no worksheet at {}", sheet_path))?;

    parse_sheet(&sheet_xml, &shared)
}

fn read_entry(
    zip: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> anyhow::Result<Option<String>> {
    let mut file = match zip.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", name)),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(Some(xml))
}

// Resolve the workbook's first sheet through its relationship id so sheet
// order is honored even when part names don't follow the sheetN convention.
fn first_sheet_path(zip: &mut ZipArchive<Cursor<&[u8]>>) -> anyhow::Result<String> {
    let fallback = "xl/worksheets/sheet1.xml".to_string();

    let Some(workbook_xml) = read_entry(zip, "xl/workbook.xml")? else {
        return Ok(fallback);
    };
    let Some(rel_id) = first_sheet_rel_id(&workbook_xml)? else {
        return Ok(fallback);
    };
    let Some(rels_xml) = read_entry(zip, "xl/_rels/workbook.xml.rels")? else {
        return Ok(fallback);
    };
    let Some(target) = rel_target(&rels_xml, &rel_id)? else {
        return Ok(fallback);
    };

    Ok(if let Some(abs) = target.strip_prefix('/') {
        abs.to_string()
    } else {
        format!("xl/{}", target)
    })
}

fn first_sheet_rel_id(workbook_xml: &str) -> anyhow::Result<Option<String>> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"sheet" => {
                if let Some(attr) = e.try_get_attribute("r:id")? {
                    return Ok(Some(attr.unescape_value()?.into_owned()));
                }
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn rel_target(rels_xml: &str, rel_id: &str) -> anyhow::Result<Option<String>> {
    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.name().as_ref() == b"Relationship" =>
            {
                let id = e
                    .try_get_attribute("Id")?
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()?;
                if id.as_deref() == Some(rel_id) {
                    let target = e
                        .try_get_attribute("Target")?
                        .map(|a| a.unescape_value().map(|v| v.into_owned()))
                        .transpose()?;
                    return Ok(target);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_shared_strings(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Event::Text(ref t) if in_t => current.push_str(&t.unescape()?),
            Event::End(ref e) => match e.name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Event::Empty(ref e) if in_si && e.name().as_ref() == b"t" => {}
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_sheet(xml: &str, shared: &[String]) -> anyhow::Result<Vec<Vec<Cell>>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut row: Vec<Cell> = Vec::new();
    let mut in_row = false;

    let mut cell_col: usize = 0;
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut has_value = false;
    let mut in_v = false;
    let mut in_is_t = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"row" => {
                    in_row = true;
                    row = Vec::new();
                }
                b"c" if in_row => {
                    cell_col = cell_attrs(e, row.len())?;
                    cell_type = cell_type_attr(e)?;
                    value.clear();
                    has_value = false;
                }
                b"v" => in_v = true,
                b"t" => in_is_t = true,
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"row" => rows.push(Vec::new()),
                b"c" if in_row => {
                    let col = cell_attrs(e, row.len())?;
                    place(&mut row, col, Cell::Empty);
                }
                _ => {}
            },
            Event::Text(ref t) if in_v || in_is_t => {
                value.push_str(&t.unescape()?);
                has_value = true;
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_is_t = false,
                b"c" if in_row => {
                    let cell = finish_cell(&cell_type, &value, has_value, shared)?;
                    place(&mut row, cell_col, cell);
                }
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut row));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

fn cell_attrs(e: &quick_xml::events::BytesStart, default_col: usize) -> anyhow::Result<usize> {
    if let Some(attr) = e.try_get_attribute("r")? {
        let r = attr.unescape_value()?;
        return Ok(column_index(&r));
    }
    Ok(default_col)
}

fn cell_type_attr(e: &quick_xml::events::BytesStart) -> anyhow::Result<String> {
    Ok(e.try_get_attribute("t")?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()?
        .unwrap_or_default())
}

fn finish_cell(
    cell_type: &str,
    value: &str,
    has_value: bool,
    shared: &[String],
) -> anyhow::Result<Cell> {
    Ok(match cell_type {
        "s" => {
            let idx: usize = value.trim().parse().unwrap_or(usize::MAX);
            Cell::Text(shared.get(idx).cloned().unwrap_or_default())
        }
        "inlineStr" | "str" => Cell::Text(value.to_string()),
        "b" => Cell::Bool(value.trim() == "1"),
        _ => {
            if !has_value {
                Cell::Empty
            } else if let Ok(n) = value.trim().parse::<f64>() {
                Cell::Number(n)
            } else {
                Cell::Text(value.to_string())
            }
        }
    })
}

fn place(row: &mut Vec<Cell>, col: usize, cell: Cell) {
    while row.len() < col {
        row.push(Cell::Empty);
    }
    row.push(cell);
}

// "B7" -> 1; bare letters also accepted.
fn column_index(cell_ref: &str) -> usize {
    let mut acc: usize = 0;
    for c in cell_ref.chars() {
        if c.is_ascii_alphabetic() {
            acc = acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        } else {
            break;
        }
    }
    acc.saturating_sub(1)
}

fn column_letters(mut idx: usize) -> String {
    let mut out = String::new();
    idx += 1;
    while idx > 0 {
        let rem = (idx - 1) % 26;
        out.insert(0, (b'A' + rem as u8) as char);
        idx = (idx - 1) / 26;
    }
    out
}

/// Single-sheet workbook builder for exports and import templates.
pub struct Workbook {
    sheet_name: String,
    header: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Workbook {
    pub fn new(sheet_name: &str) -> Self {
        Workbook {
            sheet_name: sheet_name.to_string(),
            header: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Header cells get the bold, gray-shaded style.
    pub fn header(&mut self, cells: &[&str]) {
        self.header = cells.iter().map(|s| s.to_string()).collect();
    }

    pub fn push_row(&mut self, cells: Vec<Cell>) {
        self.rows.push(cells);
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path)
            .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
        file.write_all(&bytes)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
        Ok(())
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", opts)
            .context("failed to start content-types entry")?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())
            .context("failed to write content-types entry")?;

        zip.start_file("_rels/.rels", opts)
            .context("failed to start package rels entry")?;
        zip.write_all(ROOT_RELS_XML.as_bytes())
            .context("failed to write package rels entry")?;

        zip.start_file("xl/workbook.xml", opts)
            .context("failed to start workbook entry")?;
        zip.write_all(self.workbook_xml().as_bytes())
            .context("failed to write workbook entry")?;

        zip.start_file("xl/_rels/workbook.xml.rels", opts)
            .context("failed to start workbook rels entry")?;
        zip.write_all(WORKBOOK_RELS_XML.as_bytes())
            .context("failed to write workbook rels entry")?;

        zip.start_file("xl/styles.xml", opts)
            .context("failed to start styles entry")?;
        zip.write_all(STYLES_XML.as_bytes())
            .context("failed to write styles entry")?;

        zip.start_file("xl/worksheets/sheet1.xml", opts)
            .context("failed to start worksheet entry")?;
        zip.write_all(self.sheet_xml().as_bytes())
            .context("failed to write worksheet entry")?;

        let cursor = zip.finish().context("failed to finalize workbook")?;
        Ok(cursor.into_inner())
    }

    fn workbook_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
             xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">\
             <sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>",
            escape(&self.sheet_name)
        )
    }

    fn sheet_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
             <sheetData>",
        );

        let mut row_no = 1usize;
        if !self.header.is_empty() {
            xml.push_str(&format!("<row r=\"{}\">", row_no));
            for (col, text) in self.header.iter().enumerate() {
                xml.push_str(&format!(
                    "<c r=\"{}{}\" s=\"1\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                    column_letters(col),
                    row_no,
                    escape(text)
                ));
            }
            xml.push_str("</row>");
            row_no += 1;
        }

        for cells in &self.rows {
            xml.push_str(&format!("<row r=\"{}\">", row_no));
            for (col, cell) in cells.iter().enumerate() {
                let cell_ref = format!("{}{}", column_letters(col), row_no);
                match cell {
                    Cell::Empty => xml.push_str(&format!("<c r=\"{}\"/>", cell_ref)),
                    Cell::Number(n) => xml.push_str(&format!(
                        "<c r=\"{}\"><v>{}</v></c>",
                        cell_ref,
                        format_number(*n)
                    )),
                    Cell::Text(s) => xml.push_str(&format!(
                        "<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>",
                        cell_ref,
                        escape(s)
                    )),
                    Cell::Bool(b) => xml.push_str(&format!(
                        "<c r=\"{}\" t=\"b\"><v>{}</v></c>",
                        cell_ref,
                        if *b { 1 } else { 0 }
                    )),
                }
            }
            xml.push_str("</row>");
            row_no += 1;
        }

        xml.push_str("</sheetData></worksheet>");
        xml
    }
}

const CONTENT_TYPES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\
<Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>\
</Types>";

const ROOT_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
</Relationships>";

const WORKBOOK_RELS_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>\
<Relationship Id=\"rId2\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles\" Target=\"styles.xml\"/>\
</Relationships>";

// Style 1 = bold font on a light-gray solid fill, used for header rows.
const STYLES_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
<styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
<fonts count=\"2\"><font><sz val=\"11\"/><name val=\"Calibri\"/></font>\
<font><b/><sz val=\"11\"/><name val=\"Calibri\"/></font></fonts>\
<fills count=\"3\"><fill><patternFill patternType=\"none\"/></fill>\
<fill><patternFill patternType=\"gray125\"/></fill>\
<fill><patternFill patternType=\"solid\"><fgColor rgb=\"FFD3D3D3\"/></patternFill></fill></fills>\
<borders count=\"1\"><border><left/><right/><top/><bottom/><diagonal/></border></borders>\
<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>\
<cellXfs count=\"2\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\" xfId=\"0\"/>\
<xf numFmtId=\"0\" fontId=\"1\" fillId=\"2\" borderId=\"0\" xfId=\"0\" applyFont=\"1\" applyFill=\"1\"/></cellXfs>\
</styleSheet>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_refs_round_trip() {
        assert_eq!(column_index("A1"), 0);
        assert_eq!(column_index("B7"), 1);
        assert_eq!(column_index("Z3"), 25);
        assert_eq!(column_index("AA10"), 26);
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
    }

    #[test]
    fn excel_serial_dates_convert() {
        assert_eq!(
            from_excel_serial(45292.0),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(from_excel_serial(0.5), None);
    }

    #[test]
    fn workbook_round_trips_through_reader() {
        let mut wb = Workbook::new("Students");
        wb.header(&["Name", "AdmissionNo", "DOB"]);
        wb.push_row(vec![
            Cell::Text("Anjali Sharma".into()),
            Cell::Number(1042.0),
            Cell::Text("2011-06-14".into()),
        ]);
        wb.push_row(vec![Cell::Text("R & D <pilot>".into()), Cell::Empty]);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roundtrip.xlsx");
        wb.save(&path).expect("save workbook");

        let rows = read_workbook(&path).expect("read workbook");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Cell::Text("Name".into()));
        assert_eq!(rows[1][0].text(), "Anjali Sharma");
        assert_eq!(rows[1][1].integer(), Some(1042));
        assert_eq!(
            rows[1][2].date(),
            NaiveDate::from_ymd_opt(2011, 6, 14)
        );
        // Markup characters survive escaping.
        assert_eq!(rows[2][0].text(), "R & D <pilot>");
        assert_eq!(rows[2][1], Cell::Empty);
    }

    #[test]
    fn shared_strings_and_serial_dates_are_read() {
        // Hand-built workbook using a shared-string table, the layout
        // spreadsheet applications produce.
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("[Content_Types].xml", opts).unwrap();
        zip.write_all(CONTENT_TYPES_XML.as_bytes()).unwrap();
        zip.start_file("_rels/.rels", opts).unwrap();
        zip.write_all(ROOT_RELS_XML.as_bytes()).unwrap();
        zip.start_file("xl/workbook.xml", opts).unwrap();
        zip.write_all(
            "<workbook><sheets><sheet name=\"S\" sheetId=\"1\" r:id=\"rId1\"/></sheets></workbook>"
                .as_bytes(),
        )
        .unwrap();
        zip.start_file("xl/_rels/workbook.xml.rels", opts).unwrap();
        zip.write_all(WORKBOOK_RELS_XML.as_bytes()).unwrap();
        zip.start_file("xl/sharedStrings.xml", opts).unwrap();
        zip.write_all(
            "<sst><si><t>Name</t></si><si><r><t>Ravi </t></r><r><t>Kumar</t></r></si></sst>"
                .as_bytes(),
        )
        .unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", opts).unwrap();
        zip.write_all(
            "<worksheet><sheetData>\
             <row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c></row>\
             <row r=\"2\"><c r=\"A2\" t=\"s\"><v>1</v></c><c r=\"C2\"><v>45292</v></c></row>\
             </sheetData></worksheet>"
                .as_bytes(),
        )
        .unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let rows = read_workbook_bytes(&bytes).expect("read workbook");
        assert_eq!(rows[0][0].text(), "Name");
        // Rich-text runs concatenate.
        assert_eq!(rows[1][0].text(), "Ravi Kumar");
        // Column B was never written; the gap is materialized.
        assert_eq!(rows[1][1], Cell::Empty);
        assert_eq!(
            rows[1][2].date(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }
}
