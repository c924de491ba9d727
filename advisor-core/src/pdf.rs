//! Fixed-layout A4 PDF export of a report table.
//!
//! Column widths are static per column schema. Rows that do not fit on the
//! current page continue on a new page with the header row repeated; the
//! summary footer follows the last row.

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, CustomPdfConformance, IndirectFontRef, Line, Mm, PdfConformance,
    PdfDocument, PdfDocumentReference, PdfLayerReference, Point, Polygon, Rgb,
};
use time::OffsetDateTime;
use tracing::debug;

use crate::RenderError;
use crate::summary::ReportSummary;
use crate::table::{Column, Table};

pub const REPORT_TITLE: &str = "Azure Advisor Report";
const FILE_STEM: &str = "azure_advisor_report";
const DOCUMENT_ID: &str = "azure-advisor-report";

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 18.0;
const PT_TO_MM: f32 = 0.352_778;

const TITLE_X: f32 = 28.0;
const TITLE_Y: f32 = 282.0;
const TITLE_SIZE: f32 = 16.0;
const LABEL_Y: f32 = 274.0;
const LABEL_SIZE: f32 = 12.0;

const FIRST_TABLE_TOP: f32 = 266.0;
const NEXT_TABLE_TOP: f32 = 282.0;
const TABLE_BOTTOM: f32 = 22.0;

const CELL_SIZE: f32 = 6.0;
const CELL_PAD: f32 = 1.2;
const LINE_H: f32 = 2.6;
/// Average Helvetica glyph advance, as a fraction of the font size.
const GLYPH_RATIO: f32 = 0.5;

const SUMMARY_SIZE: f32 = 12.0;
const SUMMARY_STEP: f32 = 7.0;
const PAGE_NO_SIZE: f32 = 8.0;

const HEADER_FILL: (f32, f32, f32) = (0.180, 0.525, 0.757);
const GRID: (f32, f32, f32) = (0.5, 0.5, 0.5);
const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const GRID_PT: f32 = 0.25;

/// Download name: `azure_advisor_report[_<label>].pdf`.
pub fn pdf_filename(label: Option<&str>) -> String {
    match label.map(sanitize_label).filter(|l| !l.is_empty()) {
        Some(label) => format!("{FILE_STEM}_{label}.pdf"),
        None => format!("{FILE_STEM}.pdf"),
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Static widths (mm) for the column schema; every variant spans the
/// printable width.
pub fn column_widths(columns: &[Column]) -> Vec<f32> {
    let with_subscription = columns.contains(&Column::Subscription);
    let with_resource = columns
        .iter()
        .any(|c| matches!(c, Column::ResourceGroup | Column::Resource));

    // subscription, category, problem/solution, impact, resource
    let (sub, cat, text, impact, res) = match (with_subscription, with_resource) {
        (false, false) => (0.0, 28.0, 62.0, 22.0, 0.0),
        (true, false) => (30.0, 24.0, 50.0, 20.0, 0.0),
        (false, true) => (0.0, 24.0, 52.0, 18.0, 28.0),
        (true, true) => (28.0, 22.0, 42.0, 16.0, 24.0),
    };

    columns
        .iter()
        .map(|column| match column {
            Column::Subscription => sub,
            Column::Category => cat,
            Column::Problem | Column::Solution => text,
            Column::Impact => impact,
            Column::ResourceGroup | Column::Resource => res,
        })
        .collect()
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

struct Cursor {
    layer: PdfLayerReference,
    y: f32,
    page: usize,
}

/// Renders `table` to PDF bytes. Identical input yields identical bytes.
pub fn build_pdf(table: &Table, label: Option<&str>) -> Result<Vec<u8>, RenderError> {
    let doc = PdfDocument::empty(REPORT_TITLE)
        .with_conformance(PdfConformance::Custom(CustomPdfConformance {
            requires_icc_profile: false,
            requires_xmp_metadata: false,
            ..Default::default()
        }))
        .with_document_id(DOCUMENT_ID.to_string())
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_metadata_date(OffsetDateTime::UNIX_EPOCH);

    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?,
    };

    let widths = column_widths(table.columns());
    let headers: Vec<Vec<String>> = table
        .headers()
        .iter()
        .zip(&widths)
        .map(|(header, width)| wrap_cell(header, *width))
        .collect();
    let header_h = row_height(&headers);
    let max_lines = max_lines_per_row(header_h);

    let rows: Vec<Vec<Vec<String>>> = table
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(value, width)| clip_lines(wrap_cell(value, *width), max_lines))
                .collect()
        })
        .collect();
    let heights: Vec<f32> = rows.iter().map(|cells| row_height(cells)).collect();

    let mut cursor = new_page(&doc, 1, &fonts);
    draw_heading(&cursor.layer, label, &fonts);
    for (index, page_rows) in plan_pages(&heights, header_h).into_iter().enumerate() {
        if index > 0 {
            cursor = new_page(&doc, cursor.page + 1, &fonts);
        }
        cursor.y = if index == 0 { FIRST_TABLE_TOP } else { NEXT_TABLE_TOP };
        draw_row(&cursor.layer, cursor.y, &widths, &headers, header_h, true, &fonts);
        cursor.y -= header_h;
        for row in page_rows {
            draw_row(&cursor.layer, cursor.y, &widths, &rows[row], heights[row], false, &fonts);
            cursor.y -= heights[row];
        }
    }

    let summary = ReportSummary::from_table(table);
    let lines = summary_lines(&summary);
    let block = SUMMARY_STEP * (lines.len() as f32 + 1.0);
    if cursor.y - block < TABLE_BOTTOM {
        cursor = new_page(&doc, cursor.page + 1, &fonts);
        cursor.y = NEXT_TABLE_TOP;
    }
    set_fill(&cursor.layer, BLACK);
    for line in lines {
        cursor.y -= SUMMARY_STEP;
        cursor
            .layer
            .use_text(line, SUMMARY_SIZE, Mm(MARGIN), Mm(cursor.y), &fonts.bold);
    }

    let pages = cursor.page;
    drop(cursor);
    debug!(rows = table.len(), pages, "rendered PDF report");
    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    Ok(pin_document_id(bytes))
}

/// printpdf writes a fresh random file identifier on every save, into the
/// cross-reference stream dictionary or the classic trailer. The last `/ID`
/// array is overwritten in place with filler of the same length, so object
/// offsets and `startxref` stay valid.
fn pin_document_id(mut bytes: Vec<u8>) -> Vec<u8> {
    let Some(mut at) = (0..bytes.len()).rev().find_map(|i| id_array_start(&bytes, i)) else {
        return bytes;
    };

    loop {
        while bytes.get(at).is_some_and(u8::is_ascii_whitespace) {
            at += 1;
        }
        let close = match bytes.get(at) {
            Some(b'(') => b')',
            Some(b'<') => b'>',
            _ => break,
        };
        let start = at + 1;
        let Some(len) = bytes[start..].iter().position(|b| *b == close) else {
            break;
        };
        bytes[start..start + len].fill(b'0');
        at = start + len + 1;
    }
    bytes
}

/// Index just past the `[` when `/ID [` starts at `at`.
fn id_array_start(bytes: &[u8], at: usize) -> Option<usize> {
    let mut next = at + 3;
    if bytes.get(at..next)? != b"/ID" {
        return None;
    }
    while bytes.get(next).is_some_and(u8::is_ascii_whitespace) {
        next += 1;
    }
    (bytes.get(next) == Some(&b'[')).then_some(next + 1)
}

/// Footer lines: total count, then the distinct resource count when present.
pub fn summary_lines(summary: &ReportSummary) -> Vec<String> {
    let mut lines = vec![format!("Total recommendations: {}", summary.total)];
    lines.extend(summary.distinct_label());
    lines
}

fn pdf_error(error: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(error.to_string())
}

fn new_page(doc: &PdfDocumentReference, number: usize, fonts: &Fonts) -> Cursor {
    let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {number}"));
    let layer = doc.get_page(page).get_layer(layer);

    set_fill(&layer, BLACK);
    layer.use_text(
        format!("Page {number}"),
        PAGE_NO_SIZE,
        Mm(PAGE_W - MARGIN - 12.0),
        Mm(12.0),
        &fonts.regular,
    );

    Cursor {
        layer,
        y: NEXT_TABLE_TOP,
        page: number,
    }
}

fn draw_heading(layer: &PdfLayerReference, label: Option<&str>, fonts: &Fonts) {
    set_fill(layer, BLACK);
    layer.use_text(REPORT_TITLE, TITLE_SIZE, Mm(TITLE_X), Mm(TITLE_Y), &fonts.bold);
    if let Some(label) = label {
        layer.use_text(
            format!("Subscription: {label}"),
            LABEL_SIZE,
            Mm(MARGIN),
            Mm(LABEL_Y),
            &fonts.regular,
        );
    }
}

fn draw_row(
    layer: &PdfLayerReference,
    top: f32,
    widths: &[f32],
    cells: &[Vec<String>],
    height: f32,
    header: bool,
    fonts: &Fonts,
) {
    let total_w: f32 = widths.iter().sum();
    if header {
        fill_rect(layer, MARGIN, top - height, total_w, height, HEADER_FILL);
    }

    let (font, color) = if header {
        (&fonts.bold, WHITE)
    } else {
        (&fonts.regular, BLACK)
    };

    let mut x = MARGIN;
    for (lines, width) in cells.iter().zip(widths) {
        stroke_rect(layer, x, top - height, *width, height, GRID);
        set_fill(layer, color);
        for (index, line) in lines.iter().enumerate() {
            let baseline = top - CELL_PAD - LINE_H * (index as f32 + 1.0) + 0.6;
            layer.use_text(line.as_str(), CELL_SIZE, Mm(x + CELL_PAD), Mm(baseline), font);
        }
        x += width;
    }
    set_fill(layer, BLACK);
}

/// Splits rows (by height) into pages. Every page repeats the header row, and
/// the first page starts lower to leave room for the title.
fn plan_pages(heights: &[f32], header_h: f32) -> Vec<Vec<usize>> {
    let mut pages = vec![Vec::new()];
    let mut y = FIRST_TABLE_TOP - header_h;
    for (index, height) in heights.iter().enumerate() {
        let current_empty = pages.last().is_none_or(Vec::is_empty);
        if y - height < TABLE_BOTTOM && !current_empty {
            pages.push(Vec::new());
            y = NEXT_TABLE_TOP - header_h;
        }
        if let Some(page) = pages.last_mut() {
            page.push(index);
        }
        y -= height;
    }
    pages
}

fn row_height(cells: &[Vec<String>]) -> f32 {
    let lines = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
    lines as f32 * LINE_H + CELL_PAD * 2.0
}

/// Sized for the first page, which has the least room under the title.
fn max_lines_per_row(header_h: f32) -> usize {
    let usable = FIRST_TABLE_TOP - header_h - TABLE_BOTTOM - CELL_PAD * 2.0;
    ((usable / LINE_H).floor() as usize).max(1)
}

/// Rows taller than the first page's table area keep their first lines and end with an ellipsis.
fn clip_lines(mut lines: Vec<String>, max: usize) -> Vec<String> {
    if lines.len() > max {
        lines.truncate(max);
        if let Some(last) = lines.last_mut() {
            last.push('…');
        }
    }
    lines
}

fn chars_per_line(width: f32) -> usize {
    let glyph = CELL_SIZE * GLYPH_RATIO * PT_TO_MM;
    (((width - CELL_PAD * 2.0) / glyph).floor() as usize).max(1)
}

/// Word-wraps `text` to the width of a column; overlong words are split.
pub fn wrap_cell(text: &str, width: f32) -> Vec<String> {
    let max = chars_per_line(width);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();

        while chars.len() > max {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = chars.split_off(max);
            lines.push(chars.into_iter().collect());
            chars = rest;
        }

        let word_len = chars.len();
        if word_len == 0 {
            continue;
        }
        if current_len > 0 && current_len + 1 + word_len > max {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars);
        current_len += word_len;
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn rgb((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb {
        r,
        g,
        b,
        icc_profile: None,
    })
}

fn set_fill(layer: &PdfLayerReference, color: (f32, f32, f32)) {
    layer.set_fill_color(rgb(color));
}

fn rect_ring(x: f32, y: f32, w: f32, h: f32) -> Vec<(Point, bool)> {
    vec![
        (Point::new(Mm(x), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y + h)), false),
        (Point::new(Mm(x), Mm(y + h)), false),
    ]
}

fn fill_rect(layer: &PdfLayerReference, x: f32, y: f32, w: f32, h: f32, color: (f32, f32, f32)) {
    set_fill(layer, color);
    layer.add_polygon(Polygon {
        rings: vec![rect_ring(x, y, w, h)],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
    set_fill(layer, BLACK);
}

fn stroke_rect(layer: &PdfLayerReference, x: f32, y: f32, w: f32, h: f32, color: (f32, f32, f32)) {
    layer.set_outline_color(rgb(color));
    layer.set_outline_thickness(GRID_PT);
    layer.add_line(Line {
        points: rect_ring(x, y, w, h),
        is_closed: true,
    });
    layer.set_outline_color(rgb(BLACK));
    layer.set_outline_thickness(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeMode;
    use crate::table::{ReportMode, ResourceDimension, format_table};
    use advisor_sdk::{Category, Impact, Recommendation};

    fn sample_table(rows: usize, resource: ResourceDimension) -> Table {
        let records: Vec<_> = (0..rows)
            .map(|i| {
                Recommendation::new(
                    Category::Cost,
                    format!("Right-size or shutdown underutilized virtual machine number {i}"),
                    "Resize the virtual machine to a smaller SKU or deallocate it",
                    Impact::High,
                )
                .with_resource(Some(&format!("rg-{}", i % 3)), None)
                .tagged("0b1f6471-1bf0-4dda-aec3-cb9272f09590")
            })
            .collect();
        format_table(&records, ReportMode::new(ScopeMode::ExplicitList, resource))
    }

    #[test]
    fn widths_fill_printable_area_for_every_variant() {
        let printable = PAGE_W - 2.0 * MARGIN;
        for scope in [ScopeMode::SingleSubscription, ScopeMode::AllAccessible] {
            for resource in [
                ResourceDimension::Omitted,
                ResourceDimension::ResourceGroup,
                ResourceDimension::Resource,
            ] {
                let columns = ReportMode::new(scope, resource).columns();
                let total: f32 = column_widths(&columns).iter().sum();
                assert!((total - printable).abs() < 0.01, "{scope:?}/{resource:?}: {total}");
            }
        }
    }

    #[test]
    fn wrap_keeps_words_and_splits_long_tokens() {
        let lines = wrap_cell("alpha beta gamma", 12.0);
        assert!(lines.iter().all(|l| l.chars().count() <= chars_per_line(12.0)));
        assert_eq!(lines.join(" "), "alpha beta gamma");

        let long = "x".repeat(40);
        let lines = wrap_cell(&long, 12.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), long);

        assert_eq!(wrap_cell("", 20.0), vec![String::new()]);
    }

    #[test]
    fn summary_reports_total_and_distinct_groups() {
        let table = sample_table(7, ResourceDimension::ResourceGroup);
        let lines = summary_lines(&ReportSummary::from_table(&table));
        assert_eq!(
            lines,
            vec![
                "Total recommendations: 7".to_string(),
                "Resource groups impacted: 3".to_string()
            ]
        );
    }

    #[test]
    fn summary_without_resource_column_has_one_line() {
        let table = sample_table(2, ResourceDimension::Omitted);
        let lines = summary_lines(&ReportSummary::from_table(&table));
        assert_eq!(lines, vec!["Total recommendations: 2".to_string()]);
    }

    #[test]
    fn output_is_a_pdf_and_deterministic() {
        let table = sample_table(5, ResourceDimension::ResourceGroup);
        let first = build_pdf(&table, Some("Production")).expect("pdf");
        let second = build_pdf(&table, Some("Production")).expect("pdf");
        assert!(first.starts_with(b"%PDF"));
        assert_eq!(first, second);
    }

    #[test]
    fn long_tables_paginate() {
        let short = build_pdf(&sample_table(3, ResourceDimension::Resource), None).expect("pdf");
        let long = build_pdf(&sample_table(200, ResourceDimension::Resource), None).expect("pdf");
        assert!(long.starts_with(b"%PDF"));
        assert!(long.len() > short.len());
    }

    #[test]
    fn page_plan_keeps_row_order_and_breaks_pages() {
        let heights = vec![10.0; 100];
        let pages = plan_pages(&heights, 6.0);
        assert!(pages.len() > 1);
        let flat: Vec<usize> = pages.iter().flatten().copied().collect();
        assert_eq!(flat, (0..100).collect::<Vec<_>>());
        // first page has less room than the following ones
        assert!(pages[0].len() < pages[1].len());
    }

    #[test]
    fn oversized_row_still_gets_a_page() {
        let pages = plan_pages(&[500.0, 5.0], 6.0);
        assert_eq!(pages, vec![vec![0], vec![1]]);
    }

    #[test]
    fn empty_table_has_a_single_page() {
        assert_eq!(plan_pages(&[], 6.0), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn file_identifier_is_overwritten_in_place() {
        let xref_stream = |first: &str, second: &str| {
            format!(
                "%PDF-1.3\n13 0 obj\n<</Type/Catalog>>\nendobj\n14 0 obj\n\
                 <</Root 13 0 R/Info 5 0 R/ID[({first})({second})]/Type/XRef/W[1 2 1]>>\n\
                 stream\nxx\nendstream\nendobj\nstartxref\n42\n%%EOF"
            )
            .into_bytes()
        };
        let a = xref_stream("HEIGIDGCBAAHFGBHAEFHCBHGAJHCJDHF", "HAGDGDAHBAFICDFFBJIDBAIBJGDADAGJ");
        let b = xref_stream("ABCDEFGHIJABCDEFGHIJABCDEFGHIJAB", "JIHGFEDCBAJIHGFEDCBAJIHGFEDCBAJI");
        let len = a.len();

        let pinned = pin_document_id(a);
        assert_eq!(pinned.len(), len);
        assert_eq!(pinned, pin_document_id(b));
        let text = String::from_utf8(pinned).expect("utf-8");
        assert!(!text.contains("HEIGIDGC"));
        assert!(text.contains(&format!("/ID[({zeros})({zeros})]", zeros = "0".repeat(32))));
        assert!(text.ends_with("startxref\n42\n%%EOF"));
    }

    #[test]
    fn classic_trailer_hex_identifier_is_overwritten() {
        let raw = b"xref\ntrailer\n<</ID [<ab12> <cd34ef>]/Size 3>>\nstartxref\n9\n%%EOF".to_vec();
        let pinned = String::from_utf8(pin_document_id(raw)).expect("utf-8");
        assert!(pinned.contains("/ID [<0000> <000000>]/Size 3"));

        let untouched = b"%PDF-1.3 /IDTree no identifier".to_vec();
        assert_eq!(pin_document_id(untouched.clone()), untouched);
    }

    #[test]
    fn clipped_first_row_stays_above_page_marker() {
        let records = vec![
            Recommendation::new(
                Category::Security,
                "unpatched ".repeat(3000),
                "Apply the pending security updates",
                Impact::High,
            )
            .tagged("0b1f6471-1bf0-4dda-aec3-cb9272f09590"),
        ];
        let table = format_table(
            &records,
            ReportMode::new(ScopeMode::SingleSubscription, ResourceDimension::Omitted),
        );

        let widths = column_widths(table.columns());
        let headers: Vec<Vec<String>> = table
            .headers()
            .iter()
            .zip(&widths)
            .map(|(header, width)| wrap_cell(header, *width))
            .collect();
        let header_h = row_height(&headers);
        let max_lines = max_lines_per_row(header_h);
        let cells: Vec<Vec<String>> = table.rows()[0]
            .iter()
            .zip(&widths)
            .map(|(value, width)| clip_lines(wrap_cell(value, *width), max_lines))
            .collect();
        assert!(cells.iter().any(|cell| cell.len() == max_lines));

        let height = row_height(&cells);
        assert!(FIRST_TABLE_TOP - header_h - height >= TABLE_BOTTOM);
        assert_eq!(plan_pages(&[height], header_h), vec![vec![0]]);
        assert!(build_pdf(&table, None).is_ok());
    }

    #[test]
    fn clip_marks_truncated_rows() {
        let lines = clip_lines(vec!["a".into(), "b".into(), "c".into()], 2);
        assert_eq!(lines, vec!["a".to_string(), "b…".to_string()]);
    }

    #[test]
    fn filenames_follow_pattern() {
        assert_eq!(pdf_filename(None), "azure_advisor_report.pdf");
        assert_eq!(
            pdf_filename(Some("Prod / EU")),
            "azure_advisor_report_Prod___EU.pdf"
        );
        assert_eq!(pdf_filename(Some("  ")), "azure_advisor_report.pdf");
    }
}
