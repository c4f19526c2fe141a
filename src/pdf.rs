//! Landscape table reports.
//!
//! Composes an A4-landscape document with a centered title, a generated-on
//! line, and a fixed-column table whose shaded header repeats on every page.
//! Text uses the built-in Helvetica fonts with WinAnsi encoding; characters
//! outside Latin-1 degrade to '?'.

use anyhow::Context;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;
const MARGIN: f32 = 36.0;
const HEADER_ROW_HEIGHT: f32 = 18.0;
const DATA_ROW_HEIGHT: f32 = 16.0;
const BOTTOM: f32 = 40.0;
const FIRST_PAGE_TABLE_TOP: f32 = 500.0;
const NEXT_PAGE_TABLE_TOP: f32 = 555.0;

pub struct TableReport {
    pub title: String,
    pub generated_on: String,
    pub headers: Vec<String>,
    /// Relative column widths, scaled to the content width.
    pub widths: Vec<f32>,
    pub rows: Vec<Vec<String>>,
}

/// Render the report to PDF bytes.
pub fn render(report: &TableReport) -> anyhow::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let col_edges = column_edges(&report.widths);

    let mut kids: Vec<Object> = Vec::new();
    let mut remaining: &[Vec<String>] = &report.rows;
    let mut first = true;
    loop {
        let table_top = if first {
            FIRST_PAGE_TABLE_TOP
        } else {
            NEXT_PAGE_TABLE_TOP
        };
        let capacity =
            (((table_top - BOTTOM - HEADER_ROW_HEIGHT) / DATA_ROW_HEIGHT).floor() as usize).max(1);
        let take = remaining.len().min(capacity);
        let (page_rows, rest) = remaining.split_at(take);

        let mut ops: Vec<Operation> = Vec::new();
        if first {
            centered_text(
                &mut ops,
                "F2",
                16.0,
                PAGE_HEIGHT - 50.0,
                &report.title,
            );
            centered_text(
                &mut ops,
                "F1",
                10.0,
                PAGE_HEIGHT - 72.0,
                &format!("Generated on: {}", report.generated_on),
            );
        }
        table(&mut ops, table_top, &col_edges, &report.headers, page_rows);

        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("failed to encode page content")?,
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());

        remaining = rest;
        first = false;
        if remaining.is_empty() {
            break;
        }
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .context("failed to serialize pdf document")?;
    Ok(bytes)
}

fn column_edges(widths: &[f32]) -> Vec<f32> {
    let content = PAGE_WIDTH - 2.0 * MARGIN;
    let total: f32 = widths.iter().sum::<f32>().max(1.0);
    let mut edges = Vec::with_capacity(widths.len() + 1);
    let mut x = MARGIN;
    edges.push(x);
    for w in widths {
        x += content * w / total;
        edges.push(x);
    }
    edges
}

fn table(
    ops: &mut Vec<Operation>,
    top: f32,
    col_edges: &[f32],
    headers: &[String],
    rows: &[Vec<String>],
) {
    ops.push(Operation::new("w", vec![0.5_f32.into()]));

    // Shaded header band.
    let header_y = top - HEADER_ROW_HEIGHT;
    ops.push(Operation::new(
        "rg",
        vec![0.78_f32.into(), 0.78_f32.into(), 0.78_f32.into()],
    ));
    ops.push(Operation::new(
        "re",
        vec![
            col_edges[0].into(),
            header_y.into(),
            (col_edges[col_edges.len() - 1] - col_edges[0]).into(),
            HEADER_ROW_HEIGHT.into(),
        ],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new(
        "rg",
        vec![0.0_f32.into(), 0.0_f32.into(), 0.0_f32.into()],
    ));

    for (i, header) in headers.iter().enumerate() {
        cell_border(ops, col_edges, i, header_y, HEADER_ROW_HEIGHT);
        cell_text(ops, col_edges, i, header_y, "F2", 10.0, header);
    }

    let mut y = header_y;
    for row in rows {
        y -= DATA_ROW_HEIGHT;
        for i in 0..headers.len() {
            let text = row.get(i).map(String::as_str).unwrap_or("");
            cell_border(ops, col_edges, i, y, DATA_ROW_HEIGHT);
            cell_text(ops, col_edges, i, y, "F1", 9.0, text);
        }
    }
}

fn cell_border(ops: &mut Vec<Operation>, col_edges: &[f32], col: usize, y: f32, height: f32) {
    ops.push(Operation::new(
        "RG",
        vec![0.6_f32.into(), 0.6_f32.into(), 0.6_f32.into()],
    ));
    ops.push(Operation::new(
        "re",
        vec![
            col_edges[col].into(),
            y.into(),
            (col_edges[col + 1] - col_edges[col]).into(),
            height.into(),
        ],
    ));
    ops.push(Operation::new("S", vec![]));
}

fn cell_text(
    ops: &mut Vec<Operation>,
    col_edges: &[f32],
    col: usize,
    y: f32,
    font: &str,
    size: f32,
    text: &str,
) {
    let width = col_edges[col + 1] - col_edges[col];
    let fitted = fit_to_width(text, width, size);
    text_at(ops, font, size, col_edges[col] + 3.0, y + 5.0, &fitted);
}

fn centered_text(ops: &mut Vec<Operation>, font: &str, size: f32, y: f32, text: &str) {
    let x = (PAGE_WIDTH - estimated_width(text, size)) / 2.0;
    text_at(ops, font, size, x.max(MARGIN), y, text);
}

fn text_at(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

// Helvetica averages roughly half the point size per glyph; close enough for
// truncation and centering in a tabular report.
fn estimated_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

fn fit_to_width(text: &str, width: f32, size: f32) -> String {
    let max_chars = (((width - 6.0) / (size * 0.5)).floor() as usize).max(1);
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    kept + "..."
}

fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let u = c as u32;
            if u < 256 {
                u as u8
            } else {
                b'?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rows: usize) -> TableReport {
        TableReport {
            title: "Student List Report".to_string(),
            generated_on: "01/02/2026 10:30:00".to_string(),
            headers: vec!["Sr No.".into(), "Name".into(), "Username".into()],
            widths: vec![5.0, 15.0, 12.0],
            rows: (0..rows)
                .map(|i| {
                    vec![
                        (i + 1).to_string(),
                        format!("Student {}", i + 1),
                        format!("stud{:04}", i + 1),
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn renders_a_loadable_document() {
        let bytes = render(&sample(3)).expect("render");
        assert!(bytes.starts_with(b"%PDF-"));
        let doc = Document::load_mem(&bytes).expect("parse rendered pdf");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_tables_flow_onto_more_pages() {
        let bytes = render(&sample(80)).expect("render");
        let doc = Document::load_mem(&bytes).expect("parse rendered pdf");
        assert!(doc.get_pages().len() >= 2);
    }

    #[test]
    fn empty_tables_still_produce_one_page() {
        let bytes = render(&sample(0)).expect("render");
        let doc = Document::load_mem(&bytes).expect("parse rendered pdf");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn fit_to_width_truncates_with_marker() {
        assert_eq!(fit_to_width("short", 200.0, 9.0), "short");
        let fitted = fit_to_width(
            "an extremely long student name that cannot fit",
            40.0,
            9.0,
        );
        assert!(fitted.ends_with("..."));
        assert!(fitted.chars().count() <= 8);
    }
}
