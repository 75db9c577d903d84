//! PDF rendering of the piece report.
//!
//! Rendering runs in two passes: [`layout`] measures and paginates, then each
//! page is emitted knowing the final page total for its footer.

mod fonts;
mod layout;
mod pdf;

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::db::ReportCriteria;
use crate::error::Result;
use crate::models::ReportEntry;

use fonts::Font;
use layout::{
    line_height, DocumentLayout, PageLayout, CELL_PADDING_X, CELL_PADDING_Y, COLUMN_TITLES,
    FILTER_SIZE, FOOTER_SIZE, GENERATED_SIZE, MARGIN, PAGE_HEIGHT, PAGE_WIDTH, TABLE_SIZE,
    TITLE_SIZE,
};
use pdf::{ContentStream, DocumentInfo};

/// Label used for an unset user or status filter.
const ALL: &str = "All";
const DATE_FORMAT: &str = "%Y-%m-%d";
const ROW_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

const HEADER_GRAY: f32 = 0.4;
const RULE_GRAY: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub title: String,
    /// Human-readable summary of the applied filters.
    pub filters: Option<String>,
    pub generated_at: NaiveDateTime,
}

/// One table row, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub code: String,
    pub description: String,
    pub user: String,
    pub status: String,
    pub date: String,
}

impl ReportRow {
    fn cells(&self) -> [&str; 5] {
        [
            self.code.as_str(),
            self.description.as_str(),
            self.user.as_str(),
            self.status.as_str(),
            self.date.as_str(),
        ]
    }
}

impl From<&ReportEntry> for ReportRow {
    fn from(entry: &ReportEntry) -> Self {
        Self {
            code: entry.piece.code.clone(),
            description: entry.piece.description.clone(),
            user: entry.user_name.clone(),
            status: entry.status_name.clone(),
            date: entry.piece.registered_at.format(ROW_DATE_FORMAT).to_string(),
        }
    }
}

/// Render the report to PDF bytes.
pub fn render(rows: &[ReportRow], header: &ReportHeader) -> Vec<u8> {
    let document = layout::layout(rows, header);
    let total = document.pages.len();
    let pages = document
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| draw_page(&document, page, index + 1, total))
        .collect();

    pdf::write_document(
        PAGE_WIDTH,
        PAGE_HEIGHT,
        pages,
        &DocumentInfo {
            title: &header.title,
            creation_date: header.generated_at.format("D:%Y%m%d%H%M%S").to_string(),
        },
    )
}

fn draw_page(
    document: &DocumentLayout,
    page: &PageLayout,
    number: usize,
    total: usize,
) -> ContentStream {
    let mut content = ContentStream::default();
    let right = PAGE_WIDTH - MARGIN;

    let mut cursor = PAGE_HEIGHT - MARGIN;
    for line in &document.header.title {
        content.text(Font::Bold, TITLE_SIZE, 0.0, MARGIN, cursor - TITLE_SIZE, line);
        cursor -= line_height(TITLE_SIZE);
    }
    for line in &document.header.filters {
        content.text(
            Font::Regular,
            FILTER_SIZE,
            HEADER_GRAY,
            MARGIN,
            cursor - FILTER_SIZE,
            line,
        );
        cursor -= line_height(FILTER_SIZE);
    }
    content.text(
        Font::Regular,
        GENERATED_SIZE,
        HEADER_GRAY,
        MARGIN,
        cursor - GENERATED_SIZE,
        &document.header.generated,
    );

    let table_top = document.table_top();
    for (column, title) in document.columns.iter().zip(COLUMN_TITLES) {
        content.text(
            Font::Bold,
            TABLE_SIZE,
            0.0,
            column.x + CELL_PADDING_X,
            table_top - CELL_PADDING_Y - TABLE_SIZE,
            title,
        );
    }

    let mut y = document.body_top();
    content.rule(MARGIN, right, y, 1.0, 0.0);
    for row in &page.rows {
        for (column, cell) in document.columns.iter().zip(&row.cells) {
            let mut baseline = y - CELL_PADDING_Y - TABLE_SIZE;
            for line in cell {
                if !line.is_empty() {
                    content.text(
                        Font::Regular,
                        TABLE_SIZE,
                        0.0,
                        column.x + CELL_PADDING_X,
                        baseline,
                        line,
                    );
                }
                baseline -= line_height(TABLE_SIZE);
            }
        }
        y -= row.height();
        content.rule(MARGIN, right, y, 0.5, RULE_GRAY);
    }

    let footer = format!("Page {number} of {total}");
    let width = Font::Regular.text_width(&footer, FOOTER_SIZE);
    content.text(Font::Regular, FOOTER_SIZE, 0.0, right - width, MARGIN, &footer);
    content
}

/// Render and write the report to `path`. The bytes go to a temporary file
/// next to the target which is then renamed over it, so a failed export
/// leaves nothing at `path`.
#[instrument(skip_all, fields(path = %path.display(), rows = rows.len()))]
pub fn export(path: &Path, rows: &[ReportRow], header: &ReportHeader) -> Result<()> {
    let bytes = render(rows, header);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;

    info!(bytes = bytes.len(), "report exported");
    Ok(())
}

/// One-line summary of the applied filters, shown under the report title.
/// `user_label` and `status_label` are the display names of the selected
/// filters; `None` means no filter.
pub fn describe_filters(
    criteria: &ReportCriteria,
    user_label: Option<&str>,
    status_label: Option<&str>,
) -> String {
    let text = |value: Option<&str>| match value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "-".to_string(),
    };
    let date = |value: Option<NaiveDateTime>| {
        value.map_or_else(|| "-".to_string(), |value| value.format(DATE_FORMAT).to_string())
    };

    format!(
        "User: {} | Status: {} | Code: {} | Description: {} | From: {} | To: {} | Order: {} {}",
        label_or_all(user_label),
        label_or_all(status_label),
        text(criteria.code_contains.as_deref()),
        text(criteria.description_contains.as_deref()),
        date(criteria.registered_from),
        date(criteria.registered_to),
        criteria.order.key.label(),
        criteria.order.direction.label(),
    )
}

/// `report_{user}_{status}_{yyyyMMdd_HHmm}.pdf`, lowercased.
pub fn suggested_file_name(
    user_label: Option<&str>,
    status_label: Option<&str>,
    now: NaiveDateTime,
) -> String {
    format!(
        "report_{}_{}_{}.pdf",
        sanitize(user_label).to_lowercase(),
        sanitize(status_label).to_lowercase(),
        now.format("%Y%m%d_%H%M")
    )
}

/// `root/User/Status/yyyy-MM-dd`. The directory is not created.
pub fn report_folder(
    root: &Path,
    user_label: Option<&str>,
    status_label: Option<&str>,
    date: NaiveDate,
) -> PathBuf {
    root.join(sanitize(user_label))
        .join(sanitize(status_label))
        .join(date.format(DATE_FORMAT).to_string())
}

fn label_or_all(label: Option<&str>) -> &str {
    match label.map(str::trim) {
        Some(label) if !label.is_empty() => label,
        _ => ALL,
    }
}

/// Make a label safe as a single path segment.
fn sanitize(label: Option<&str>) -> String {
    let label = label_or_all(label);
    let cleaned: String = label
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => ALL.to_string(),
        cleaned => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SortDirection, SortKey};
    use crate::error::Error;
    use crate::models::Piece;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn header() -> ReportHeader {
        ReportHeader {
            title: "Piece report".into(),
            filters: Some("User: All | Status: All".into()),
            generated_at: at(2024, 5, 1, 9, 30),
        }
    }

    fn rows(count: usize) -> Vec<ReportRow> {
        (0..count)
            .map(|i| ReportRow {
                code: format!("P-{i:04}"),
                description: format!("Piece number {i}"),
                user: "Alice".into(),
                status: "Done".into(),
                date: "2024-05-01 09:30".into(),
            })
            .collect()
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .filter(|window| *window == needle)
            .count()
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        count(haystack, needle.as_bytes()) > 0
    }

    /// `/Type /Page ` objects, excluding the `/Type /Pages` tree node.
    fn page_objects(bytes: &[u8]) -> usize {
        count(bytes, b"/Type /Page ")
    }

    #[test]
    fn empty_report_is_a_single_valid_page() {
        let bytes = render(&[], &header());
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
        assert!(contains(&bytes, "/Count 1 "));
        assert_eq!(page_objects(&bytes), 1);
        assert!(contains(&bytes, "(Page 1 of 1)"));
        assert!(contains(&bytes, "(Piece report)"));
        assert!(contains(&bytes, "(Generated: 2024-05-01 09:30)"));
        for title in COLUMN_TITLES {
            assert!(contains(&bytes, &format!("({title})")));
        }
    }

    #[test]
    fn long_reports_paginate_with_consistent_footers() {
        let bytes = render(&rows(300), &header());
        let pages = page_objects(&bytes);
        assert!(pages > 1);
        assert!(contains(&bytes, &format!("/Count {pages} ")));
        for page in 1..=pages {
            assert!(contains(&bytes, &format!("(Page {page} of {pages})")));
        }
        assert!(!contains(&bytes, &format!("(Page {} of", pages + 1)));

        // Title repeats on every page plus once in the info dictionary.
        assert_eq!(count(&bytes, b"(Piece report)"), pages + 1);
        assert_eq!(count(&bytes, b"(Code)"), pages);
        assert_eq!(count(&bytes, b"(P-0000)"), 1);
        assert_eq!(count(&bytes, b"(P-0299)"), 1);
    }

    #[test]
    fn startxref_points_at_the_xref_table() {
        let bytes = render(&rows(5), &header());
        let marker = b"startxref\n";
        let position = bytes
            .windows(marker.len())
            .rposition(|window| window == marker)
            .unwrap();
        let tail = std::str::from_utf8(&bytes[position + marker.len()..]).unwrap();
        let offset: usize = tail.lines().next().unwrap().parse().unwrap();
        assert!(bytes[offset..].starts_with(b"xref"));
    }

    #[test]
    fn non_latin_text_is_replaced() {
        let mut rows = rows(1);
        rows[0].description = "Árbol → 木".into();
        let bytes = render(&rows, &header());
        assert!(contains(&bytes, "(\\301rbol ? ?)"));
    }

    #[test]
    fn rows_come_from_report_entries() {
        let entry = ReportEntry {
            piece: Piece {
                code: "P-1".into(),
                description: "Hull".into(),
                user_id: None,
                status_id: None,
                photo_path: None,
                registered_at: at(2024, 2, 3, 14, 5),
            },
            user_name: String::new(),
            status_name: "Done".into(),
        };
        let row = ReportRow::from(&entry);
        assert_eq!(row.date, "2024-02-03 14:05");
        assert_eq!(row.user, "");
        assert_eq!(row.cells(), ["P-1", "Hull", "", "Done", "2024-02-03 14:05"]);
    }

    #[test]
    fn export_replaces_the_target_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"stale").unwrap();

        export(&path, &rows(3), &header()).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(b"%PDF-1.4"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("report.pdf")]);
    }

    #[test]
    fn export_to_a_missing_directory_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.pdf");
        let err = export(&path, &rows(1), &header()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!path.exists());
    }

    #[test]
    fn filter_summary_defaults() {
        let summary = describe_filters(&ReportCriteria::default(), None, Some("  "));
        assert_eq!(
            summary,
            "User: All | Status: All | Code: - | Description: - | From: - | To: - | Order: Date Desc"
        );
    }

    #[test]
    fn filter_summary_lists_applied_filters() {
        let criteria = ReportCriteria::default()
            .code_contains(" P-1 ")
            .description_contains("hull")
            .registered_between(Some(at(2024, 1, 1, 0, 0)), Some(at(2024, 1, 31, 23, 59)))
            .order_by(SortKey::Code, SortDirection::Ascending);
        let summary = describe_filters(&criteria, Some("Alice (alice)"), Some("Done"));
        assert_eq!(
            summary,
            "User: Alice (alice) | Status: Done | Code: P-1 | Description: hull | From: 2024-01-01 | To: 2024-01-31 | Order: Code Asc"
        );
    }

    #[test]
    fn file_names_and_folders_are_sanitized() {
        let now = at(2024, 3, 9, 7, 5);
        assert_eq!(
            suggested_file_name(None, None, now),
            "report_all_all_20240309_0705.pdf"
        );
        assert_eq!(
            suggested_file_name(Some("Alice (a/b)"), Some("In: Review"), now),
            "report_alice (a_b)_in_ review_20240309_0705.pdf"
        );

        let root = Path::new("reports");
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            report_folder(root, Some("Bob"), None, date),
            root.join("Bob").join("All").join("2024-03-09")
        );
        assert_eq!(
            report_folder(root, Some(".."), Some("a\\b"), date),
            root.join("All").join("a_b").join("2024-03-09")
        );
    }
}
