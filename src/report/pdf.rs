//! Minimal PDF 1.4 serializer: numbered objects, uncompressed content streams,
//! a cross-reference table and the trailer. Only what a text-and-rules table
//! needs.

use std::fmt::Write as _;

use super::fonts::{encode, Font};

/// Accumulates drawing operators for one page.
#[derive(Debug, Default)]
pub(crate) struct ContentStream {
    ops: Vec<u8>,
}

impl ContentStream {
    /// Show `text` with its baseline starting at (`x`, `y`), filled with the
    /// given gray level (0 = black).
    pub(crate) fn text(&mut self, font: Font, size: f32, gray: f32, x: f32, y: f32, text: &str) {
        let mut op = format!(
            "BT /{} {} Tf {} g {} {} Td ",
            font.resource(),
            number(size),
            number(gray),
            number(x),
            number(y)
        );
        op.push('(');
        self.ops.extend_from_slice(op.as_bytes());
        self.ops.extend(escape(&encode(text)));
        self.ops.extend_from_slice(b") Tj ET\n");
    }

    /// Stroke a horizontal rule from `x1` to `x2` at height `y`.
    pub(crate) fn rule(&mut self, x1: f32, x2: f32, y: f32, width: f32, gray: f32) {
        let op = format!(
            "q {} G {} w {} {} m {} {} l S Q\n",
            number(gray),
            number(width),
            number(x1),
            number(y),
            number(x2),
            number(y)
        );
        self.ops.extend_from_slice(op.as_bytes());
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.ops
    }
}

/// Document-level metadata written to the info dictionary.
pub(crate) struct DocumentInfo<'a> {
    pub(crate) title: &'a str,
    /// `D:YYYYMMDDHHmmSS`
    pub(crate) creation_date: String,
}

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const REGULAR_FONT_ID: usize = 3;
const BOLD_FONT_ID: usize = 4;
const INFO_ID: usize = 5;
const FIRST_PAGE_ID: usize = 6;

/// Serialize a document whose pages are `width` x `height` points, one content
/// stream per page, in order.
pub(crate) fn write_document(
    width: f32,
    height: f32,
    pages: Vec<ContentStream>,
    info: &DocumentInfo<'_>,
) -> Vec<u8> {
    let mut writer = ObjectWriter::new();
    let page_ids: Vec<usize> = (0..pages.len())
        .map(|index| FIRST_PAGE_ID + index * 2)
        .collect();

    writer.object(
        CATALOG_ID,
        format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
    );

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    writer.object(
        PAGES_ID,
        format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} /MediaBox [0 0 {} {}] >>",
            page_ids.len(),
            number(width),
            number(height)
        )
        .as_bytes(),
    );

    for (id, font) in [(REGULAR_FONT_ID, Font::Regular), (BOLD_FONT_ID, Font::Bold)] {
        writer.object(
            id,
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            )
            .as_bytes(),
        );
    }

    let mut info_dict = b"<< /Title (".to_vec();
    info_dict.extend(escape(&encode(info.title)));
    info_dict.extend_from_slice(
        format!(
            ") /Producer (piece-assignment) /CreationDate ({}) >>",
            info.creation_date
        )
        .as_bytes(),
    );
    writer.object(INFO_ID, &info_dict);

    for (page_id, content) in page_ids.iter().zip(pages) {
        let content_id = page_id + 1;
        writer.object(
            *page_id,
            format!(
                "<< /Type /Page /Parent {PAGES_ID} 0 R /Resources << /Font << /{} {REGULAR_FONT_ID} 0 R /{} {BOLD_FONT_ID} 0 R >> >> /Contents {content_id} 0 R >>",
                Font::Regular.resource(),
                Font::Bold.resource()
            )
            .as_bytes(),
        );
        writer.stream(content_id, &content.into_bytes());
    }

    writer.finish()
}

struct ObjectWriter {
    buffer: Vec<u8>,
    /// Byte offset of each object, indexed by object number.
    offsets: Vec<Option<usize>>,
}

impl ObjectWriter {
    fn new() -> Self {
        let mut buffer = b"%PDF-1.4\n".to_vec();
        // Binary marker so transfer tools treat the file as binary.
        buffer.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            buffer,
            offsets: vec![None],
        }
    }

    fn begin(&mut self, id: usize) {
        if self.offsets.len() <= id {
            self.offsets.resize(id + 1, None);
        }
        self.offsets[id] = Some(self.buffer.len());
        self.buffer
            .extend_from_slice(format!("{id} 0 obj\n").as_bytes());
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        self.begin(id);
        self.buffer.extend_from_slice(body);
        self.buffer.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, data: &[u8]) {
        self.begin(id);
        self.buffer
            .extend_from_slice(format!("<< /Length {} >>\nstream\n", data.len()).as_bytes());
        self.buffer.extend_from_slice(data);
        self.buffer.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_offset = self.buffer.len();
        let size = self.offsets.len();

        let mut xref = format!("xref\n0 {size}\n");
        for offset in &self.offsets {
            match offset {
                Some(offset) => {
                    let _ = write!(xref, "{offset:010} 00000 n \n");
                }
                None => xref.push_str("0000000000 65535 f \n"),
            }
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {CATALOG_ID} 0 R /Info {INFO_ID} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        );
        self.buffer.extend_from_slice(xref.as_bytes());
        self.buffer
    }
}

/// Escape encoded bytes for a PDF literal string.
fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                escaped.push(b'\\');
                escaped.push(byte);
            }
            0x80..=0xFF => escaped.extend_from_slice(format!("\\{byte:03o}").as_bytes()),
            _ => escaped.push(byte),
        }
    }
    escaped
}

/// Format a coordinate with at most two decimals and no trailing zeros.
fn number(value: f32) -> String {
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
