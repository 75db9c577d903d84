//! First pass of rendering: measure and paginate. Nothing here touches bytes;
//! the result is a list of pages whose length is the final page total.

use super::fonts::{wrap, Font};
use super::{ReportHeader, ReportRow};

pub(crate) const PAGE_WIDTH: f32 = 595.28;
pub(crate) const PAGE_HEIGHT: f32 = 841.89;
pub(crate) const MARGIN: f32 = 30.0;
pub(crate) const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

pub(crate) const TITLE_SIZE: f32 = 18.0;
pub(crate) const FILTER_SIZE: f32 = 10.0;
pub(crate) const GENERATED_SIZE: f32 = 9.0;
pub(crate) const TABLE_SIZE: f32 = 10.0;
pub(crate) const FOOTER_SIZE: f32 = 9.0;

/// Line height as a multiple of the font size.
pub(crate) const LEADING: f32 = 1.25;
pub(crate) const CELL_PADDING_X: f32 = 4.0;
pub(crate) const CELL_PADDING_Y: f32 = 5.0;
/// Space between the header block and the table.
pub(crate) const HEADER_GAP: f32 = 10.0;
/// Reserved band at the bottom of every page for the footer.
pub(crate) const FOOTER_BAND: f32 = 20.0;

pub(crate) const COLUMN_TITLES: [&str; 5] = ["Code", "Description", "User", "Status", "Date"];
const COLUMN_WEIGHTS: [f32; 5] = [2.0, 4.0, 3.0, 3.0, 3.0];

const ELLIPSIS: &str = "...";

/// Largest vertical share of the page the header block may take. The rest
/// always holds the table header row and at least one body row.
const HEADER_MAX_SHARE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Column {
    pub(crate) x: f32,
    pub(crate) width: f32,
}

impl Column {
    /// Width available to text once padding is removed.
    pub(crate) fn text_width(&self) -> f32 {
        (self.width - 2.0 * CELL_PADDING_X).max(1.0)
    }
}

pub(crate) fn columns() -> [Column; 5] {
    let total: f32 = COLUMN_WEIGHTS.iter().sum();
    let mut x = MARGIN;
    COLUMN_WEIGHTS.map(|weight| {
        let width = CONTENT_WIDTH * weight / total;
        let column = Column { x, width };
        x += width;
        column
    })
}

/// Pre-wrapped header text, identical on every page.
#[derive(Debug, Clone)]
pub(crate) struct HeaderBlock {
    pub(crate) title: Vec<String>,
    pub(crate) filters: Vec<String>,
    pub(crate) generated: String,
}

impl HeaderBlock {
    fn new(header: &ReportHeader) -> Self {
        let title = wrap(Font::Bold, TITLE_SIZE, &header.title, CONTENT_WIDTH);
        let filters = match header.filters.as_deref().map(str::trim) {
            Some(filters) if !filters.is_empty() => {
                wrap(Font::Regular, FILTER_SIZE, filters, CONTENT_WIDTH)
            }
            _ => Vec::new(),
        };
        let generated = format!(
            "Generated: {}",
            header.generated_at.format("%Y-%m-%d %H:%M")
        );
        let mut block = Self {
            title,
            filters,
            generated,
        };
        block.fit(header_budget());
        block
    }

    /// Cut the title, then the filter summary, until the block fits in
    /// `budget` points. The title keeps at least one line.
    fn fit(&mut self, budget: f32) {
        let mut remaining = budget - line_height(GENERATED_SIZE);

        let title_lines = ((remaining / line_height(TITLE_SIZE)).floor().max(1.0)) as usize;
        truncate_lines(&mut self.title, title_lines);
        remaining -= self.title.len() as f32 * line_height(TITLE_SIZE);

        let filter_lines = (remaining / line_height(FILTER_SIZE)).floor().max(0.0) as usize;
        truncate_lines(&mut self.filters, filter_lines);
    }

    pub(crate) fn height(&self) -> f32 {
        self.title.len() as f32 * line_height(TITLE_SIZE)
            + self.filters.len() as f32 * line_height(FILTER_SIZE)
            + line_height(GENERATED_SIZE)
    }
}

/// One body row with every cell wrapped to its column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RowLayout {
    pub(crate) cells: [Vec<String>; 5],
}

impl RowLayout {
    fn new(row: &ReportRow, columns: &[Column; 5]) -> Self {
        let values = row.cells();
        let mut index = 0;
        let cells = values.map(|value| {
            let lines = wrap(Font::Regular, TABLE_SIZE, value, columns[index].text_width());
            index += 1;
            lines
        });
        Self { cells }
    }

    pub(crate) fn line_count(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(1).max(1)
    }

    pub(crate) fn height(&self) -> f32 {
        row_height(self.line_count())
    }

    /// Cut every cell to `max_lines`, marking cut cells with an ellipsis line.
    fn truncate(&mut self, max_lines: usize) {
        let max_lines = max_lines.max(1);
        for cell in &mut self.cells {
            truncate_lines(cell, max_lines);
        }
    }
}

/// Keep at most `max_lines`; when lines are dropped the last kept one becomes
/// an ellipsis.
fn truncate_lines(lines: &mut Vec<String>, max_lines: usize) {
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            *last = ELLIPSIS.to_string();
        }
    }
}

/// Height the header block may use on every page.
fn header_budget() -> f32 {
    (PAGE_HEIGHT - 2.0 * MARGIN) * HEADER_MAX_SHARE
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PageLayout {
    pub(crate) rows: Vec<RowLayout>,
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentLayout {
    pub(crate) header: HeaderBlock,
    pub(crate) columns: [Column; 5],
    /// Never empty.
    pub(crate) pages: Vec<PageLayout>,
}

impl DocumentLayout {
    /// Top edge of the table header row.
    pub(crate) fn table_top(&self) -> f32 {
        PAGE_HEIGHT - MARGIN - self.header.height() - HEADER_GAP
    }

    /// Top edge of the first body row.
    pub(crate) fn body_top(&self) -> f32 {
        self.table_top() - table_header_height()
    }
}

pub(crate) fn line_height(size: f32) -> f32 {
    size * LEADING
}

pub(crate) fn row_height(lines: usize) -> f32 {
    lines as f32 * line_height(TABLE_SIZE) + 2.0 * CELL_PADDING_Y
}

pub(crate) fn table_header_height() -> f32 {
    row_height(1)
}

const BODY_BOTTOM: f32 = MARGIN + FOOTER_BAND;

/// Measure every row and split the table into pages.
pub(crate) fn layout(rows: &[ReportRow], header: &ReportHeader) -> DocumentLayout {
    let header = HeaderBlock::new(header);
    let columns = columns();
    let mut document = DocumentLayout {
        header,
        columns,
        pages: Vec::new(),
    };

    let available = document.body_top() - BODY_BOTTOM;
    let max_lines =
        (((available - 2.0 * CELL_PADDING_Y) / line_height(TABLE_SIZE)).floor() as usize).max(1);

    let mut current = PageLayout::default();
    let mut used = 0.0;
    for row in rows {
        let mut laid_out = RowLayout::new(row, &columns);
        if laid_out.line_count() > max_lines {
            laid_out.truncate(max_lines);
        }
        let height = laid_out.height();
        if used + height > available && !current.rows.is_empty() {
            document.pages.push(std::mem::take(&mut current));
            used = 0.0;
        }
        used += height;
        current.rows.push(laid_out);
    }
    document.pages.push(current);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn header() -> ReportHeader {
        ReportHeader {
            title: "Piece report".into(),
            filters: Some("User: All | Status: All".into()),
            generated_at: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    fn row(code: &str, description: &str) -> ReportRow {
        ReportRow {
            code: code.into(),
            description: description.into(),
            user: "Alice".into(),
            status: "Done".into(),
            date: "2024-05-01 09:30".into(),
        }
    }

    #[test]
    fn columns_follow_weights_and_fill_the_content_width() {
        let columns = columns();
        let unit = CONTENT_WIDTH / 15.0;
        let widths: Vec<f32> = columns.iter().map(|column| column.width / unit).collect();
        for (width, expected) in widths.iter().zip([2.0, 4.0, 3.0, 3.0, 3.0]) {
            assert!((width - expected).abs() < 1e-3);
        }
        assert!((columns[0].x - MARGIN).abs() < 1e-3);
        let right = columns[4].x + columns[4].width;
        assert!((right - (PAGE_WIDTH - MARGIN)).abs() < 1e-2);
    }

    #[test]
    fn empty_input_still_has_one_page() {
        let document = layout(&[], &header());
        assert_eq!(document.pages.len(), 1);
        assert!(document.pages[0].rows.is_empty());
        assert_eq!(document.header.generated, "Generated: 2024-05-01 09:30");
        assert_eq!(document.header.filters, vec!["User: All | Status: All".to_string()]);
    }

    #[test]
    fn blank_filter_summary_is_omitted() {
        let mut header = header();
        header.filters = Some("   ".into());
        let document = layout(&[], &header);
        assert!(document.header.filters.is_empty());
    }

    #[test]
    fn oversized_header_leaves_room_for_the_table() {
        let mut header = header();
        header.title = "Quarterly piece report ".repeat(200);
        header.filters = Some("wing strut ".repeat(1200));
        let rows: Vec<_> = (0..5).map(|i| row(&format!("P-{i}"), "desc")).collect();
        let document = layout(&rows, &header);

        assert!(document.header.height() <= header_budget() + 1e-3);
        assert_eq!(document.header.title.last().map(String::as_str), Some(ELLIPSIS));
        assert_eq!(document.header.filters.last().map(String::as_str), Some(ELLIPSIS));
        assert!(document.body_top() - BODY_BOTTOM >= row_height(1));

        // Short rows still share the first page below the header.
        assert_eq!(document.pages.len(), 1);
        assert_eq!(document.pages[0].rows.len(), 5);
    }

    #[test]
    fn short_header_is_left_alone() {
        let document = layout(&[], &header());
        assert_eq!(document.header.title, vec!["Piece report".to_string()]);
        assert!(!document.header.filters.iter().any(|line| line == ELLIPSIS));
    }

    #[test]
    fn rows_split_across_pages_in_order() {
        let rows: Vec<_> = (0..200).map(|i| row(&format!("P-{i:03}"), "desc")).collect();
        let document = layout(&rows, &header());
        assert!(document.pages.len() > 1);

        let codes: Vec<String> = document
            .pages
            .iter()
            .flat_map(|page| page.rows.iter().map(|row| row.cells[0][0].clone()))
            .collect();
        let expected: Vec<String> = (0..200).map(|i| format!("P-{i:03}")).collect();
        assert_eq!(codes, expected);

        let available = document.body_top() - BODY_BOTTOM;
        for page in &document.pages {
            let used: f32 = page.rows.iter().map(RowLayout::height).sum();
            assert!(used <= available + 1e-3);
        }
    }

    #[test]
    fn oversized_row_is_truncated_with_an_ellipsis() {
        let description = (0..2000).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let rows = vec![row("P-1", "short"), row("P-2", &description), row("P-3", "short")];
        let document = layout(&rows, &header());

        let available = document.body_top() - BODY_BOTTOM;
        let giant = document
            .pages
            .iter()
            .flat_map(|page| &page.rows)
            .find(|row| row.cells[0][0] == "P-2")
            .unwrap();
        assert!(giant.height() <= available);
        assert_eq!(giant.cells[1].last().map(String::as_str), Some(ELLIPSIS));

        let total: usize = document.pages.iter().map(|page| page.rows.len()).sum();
        assert_eq!(total, 3);
    }
}
