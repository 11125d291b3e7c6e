//! Page layout and PDF assembly

use crate::fonts::{encode_win_ansi, Font};
use crate::layout::wrap_text;
use crate::{ReportError, ReportRecord};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

pub const TITLE: &str = "DermAI — Skin Disease Report";
pub const NO_REFERENCES: &str = "No references available.";
pub const DISCLAIMER: &str = "Disclaimer: This is an AI-generated report and should not be \
                              considered medical advice. Always consult a healthcare professional.";

// A4 in points
const PAGE_WIDTH: f32 = 595.276;
const PAGE_HEIGHT: f32 = 841.89;
// 0.8 inch
const MARGIN: f32 = 57.6;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const TOP: f32 = PAGE_HEIGHT - MARGIN;

const INCH: f32 = 72.0;

const COLUMN_WIDTHS: [f32; 2] = [150.0, 300.0];
const CELL_PAD_X: f32 = 6.0;
const CELL_PAD_Y: f32 = 3.0;
const BULLET_INDENT: f32 = 18.0;

type Rgb = [f32; 3];

const BLACK: Rgb = [0.0, 0.0, 0.0];
const GREY: Rgb = [0.5, 0.5, 0.5];
const RED: Rgb = [1.0, 0.0, 0.0];
// #0d47a1
const HEADING_BLUE: Rgb = [13.0 / 255.0, 71.0 / 255.0, 161.0 / 255.0];
// #e3f2fd
const HEADER_ROW_BLUE: Rgb = [227.0 / 255.0, 242.0 / 255.0, 253.0 / 255.0];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    font: Font,
    size: f32,
    leading: f32,
    space_after: f32,
    color: Rgb,
    align: Align,
}

const TITLE_STYLE: TextStyle = TextStyle {
    font: Font::Bold,
    size: 18.0,
    leading: 22.0,
    space_after: 6.0,
    color: BLACK,
    align: Align::Center,
};

const HEADING_STYLE: TextStyle = TextStyle {
    font: Font::Bold,
    size: 13.0,
    leading: 18.0,
    space_after: 8.0,
    color: HEADING_BLUE,
    align: Align::Left,
};

const BODY_STYLE: TextStyle = TextStyle {
    font: Font::Regular,
    size: 11.0,
    leading: 16.0,
    space_after: 6.0,
    color: BLACK,
    align: Align::Left,
};

const LABEL_STYLE: TextStyle = TextStyle {
    font: Font::Bold,
    size: 11.0,
    leading: 14.0,
    space_after: 0.0,
    color: BLACK,
    align: Align::Left,
};

const DISCLAIMER_STYLE: TextStyle = TextStyle {
    font: Font::Oblique,
    size: 9.0,
    leading: 12.0,
    space_after: 0.0,
    color: RED,
    align: Align::Left,
};

#[derive(Debug, Clone)]
struct Link {
    rect: [f32; 4],
    uri: String,
}

#[derive(Debug, Default)]
struct Page {
    operations: Vec<Operation>,
    links: Vec<Link>,
}

/// Top-down flow layout across pages
struct Layout {
    finished: Vec<Page>,
    current: Page,
    cursor: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            finished: Vec::new(),
            current: Page::default(),
            cursor: TOP,
        }
    }

    fn break_page(&mut self) {
        let page = std::mem::take(&mut self.current);
        self.finished.push(page);
        self.cursor = TOP;
    }

    /// Start a new page unless `height` fits or the page is still empty
    fn ensure(&mut self, height: f32) {
        if self.cursor - height < MARGIN && self.cursor < TOP {
            self.break_page();
        }
    }

    fn space(&mut self, height: f32) {
        self.cursor = (self.cursor - height).max(MARGIN);
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.current
            .operations
            .push(Operation::new(operator, operands));
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.push("q", vec![]);
        self.push("rg", reals(&color));
        self.push("re", reals(&[x, y, width, height]));
        self.push("f", vec![]);
        self.push("Q", vec![]);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgb) {
        self.push("q", vec![]);
        self.push("w", reals(&[width]));
        self.push("RG", reals(&color));
        self.push("m", reals(&[from.0, from.1]));
        self.push("l", reals(&[to.0, to.1]));
        self.push("S", vec![]);
        self.push("Q", vec![]);
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, line: f32, color: Rgb) {
        self.push("q", vec![]);
        self.push("w", reals(&[line]));
        self.push("RG", reals(&color));
        self.push("re", reals(&[x, y, width, height]));
        self.push("S", vec![]);
        self.push("Q", vec![]);
    }

    fn text(&mut self, x: f32, baseline: f32, style: &TextStyle, encoded: Vec<u8>) {
        self.push("BT", vec![]);
        self.push(
            "Tf",
            vec![
                Object::Name(style.font.resource_name().as_bytes().to_vec()),
                Object::Real(style.size),
            ],
        );
        self.push("rg", reals(&style.color));
        self.push("Td", reals(&[x, baseline]));
        self.push("Tj", vec![Object::String(encoded, StringFormat::Literal)]);
        self.push("ET", vec![]);
    }

    /// Flow a wrapped paragraph, breaking pages between lines
    fn paragraph(&mut self, text: &str, style: &TextStyle, x: f32, width: f32) {
        for line in wrap_text(text, style.font, style.size, width) {
            self.ensure(style.leading);
            let encoded = encode_win_ansi(&line);
            let line_x = match style.align {
                Align::Left => x,
                Align::Center => x + (width - style.font.text_width(&encoded, style.size)) / 2.0,
            };
            let baseline = self.cursor - style.size;
            self.text(line_x, baseline, style, encoded);
            self.cursor -= style.leading;
        }
        self.space(style.space_after);
    }

    /// Bulleted list of clickable links
    fn link_list(&mut self, uris: &[String], style: &TextStyle, x: f32, width: f32) {
        let text_x = x + BULLET_INDENT;
        let text_width = width - BULLET_INDENT;

        for uri in uris {
            let lines = wrap_text(uri, style.font, style.size, text_width);
            for (i, line) in lines.into_iter().enumerate() {
                self.ensure(style.leading);
                let baseline = self.cursor - style.size;
                if i == 0 {
                    self.text(x + 4.0, baseline, style, encode_win_ansi("•"));
                }
                let encoded = encode_win_ansi(&line);
                let line_width = style.font.text_width(&encoded, style.size);
                self.text(text_x, baseline, style, encoded);
                self.current.links.push(Link {
                    rect: [
                        text_x,
                        baseline - style.size * 0.25,
                        text_x + line_width,
                        baseline + style.size,
                    ],
                    uri: uri.clone(),
                });
                self.cursor -= style.leading;
            }
            self.space(style.space_after);
        }
    }

    /// Two-column fact table
    ///
    /// A row that does not fit moves to the next page. A row taller than a
    /// page has its lines split across pages.
    fn table(&mut self, rows: &[(&str, String)]) {
        let table_width: f32 = COLUMN_WIDTHS.iter().sum();
        let x0 = MARGIN + (CONTENT_WIDTH - table_width) / 2.0;
        let divider_x = x0 + COLUMN_WIDTHS[0];
        let mut segment_top: Option<f32> = None;

        for (i, (label, value)) in rows.iter().enumerate() {
            let label_lines = wrap_text(
                label,
                LABEL_STYLE.font,
                LABEL_STYLE.size,
                COLUMN_WIDTHS[0] - 2.0 * CELL_PAD_X,
            );
            let value_lines = wrap_text(
                value,
                BODY_STYLE.font,
                BODY_STYLE.size,
                COLUMN_WIDTHS[1] - 2.0 * CELL_PAD_X,
            );
            let mut label_rest = &label_lines[..];
            let mut value_rest = &value_lines[..];

            // Move the whole row to a fresh page when it fits there;
            // taller rows are split across pages below
            let row_height = chunk_height(label_rest.len(), value_rest.len());
            let fits_fresh_page = row_height <= TOP - MARGIN;
            if self.cursor - row_height < MARGIN && self.cursor < TOP && fits_fresh_page {
                self.close_segment(&mut segment_top, x0, table_width);
                self.break_page();
            }

            loop {
                let available = self.cursor - MARGIN - 2.0 * CELL_PAD_Y;
                let label_take = lines_fitting(label_rest.len(), LABEL_STYLE.leading, available);
                let value_take = lines_fitting(value_rest.len(), BODY_STYLE.leading, available);
                if label_take == 0 && value_take == 0 && self.cursor < TOP {
                    self.close_segment(&mut segment_top, x0, table_width);
                    self.break_page();
                    continue;
                }

                let row_top = self.cursor;
                segment_top.get_or_insert(row_top);
                let row_bottom = row_top - chunk_height(label_take, value_take);

                if i == 0 {
                    let height = row_top - row_bottom;
                    self.fill_rect(x0, row_bottom, table_width, height, HEADER_ROW_BLUE);
                }

                self.cell(
                    &label_rest[..label_take],
                    &LABEL_STYLE,
                    x0 + CELL_PAD_X,
                    row_top - CELL_PAD_Y,
                );
                self.cell(
                    &value_rest[..value_take],
                    &BODY_STYLE,
                    divider_x + CELL_PAD_X,
                    row_top - CELL_PAD_Y,
                );
                self.stroke_line((divider_x, row_top), (divider_x, row_bottom), 0.25, GREY);
                self.cursor = row_bottom;

                label_rest = &label_rest[label_take..];
                value_rest = &value_rest[value_take..];
                if label_rest.is_empty() && value_rest.is_empty() {
                    break;
                }
                self.close_segment(&mut segment_top, x0, table_width);
                self.break_page();
            }

            if i + 1 < rows.len() {
                let y = self.cursor;
                self.stroke_line((x0, y), (x0 + table_width, y), 0.25, GREY);
            }
        }

        self.close_segment(&mut segment_top, x0, table_width);
    }

    /// Stroke the outer box of the table part drawn on the current page
    fn close_segment(&mut self, segment_top: &mut Option<f32>, x0: f32, width: f32) {
        if let Some(top) = segment_top.take() {
            self.stroke_rect(x0, self.cursor, width, top - self.cursor, 0.75, BLACK);
        }
    }

    fn cell(&mut self, lines: &[String], style: &TextStyle, x: f32, top: f32) {
        let mut y = top;
        for line in lines {
            self.text(x, y - style.size, style, encode_win_ansi(line));
            y -= style.leading;
        }
    }

    fn finish(mut self) -> Vec<Page> {
        self.break_page();
        self.finished
    }
}

fn reals(values: &[f32]) -> Vec<Object> {
    values.iter().map(|&v| Object::Real(v)).collect()
}

/// Height of a table row holding the given number of label and value lines
fn chunk_height(label_lines: usize, value_lines: usize) -> f32 {
    (label_lines as f32 * LABEL_STYLE.leading).max(value_lines as f32 * BODY_STYLE.leading)
        + 2.0 * CELL_PAD_Y
}

fn lines_fitting(remaining: usize, leading: f32, available: f32) -> usize {
    if available <= 0.0 {
        return 0;
    }
    ((available / leading).floor() as usize).min(remaining)
}

fn lay_out(record: &ReportRecord) -> Vec<Page> {
    let mut layout = Layout::new();

    layout.paragraph(TITLE, &TITLE_STYLE, MARGIN, CONTENT_WIDTH);
    layout.space(0.3 * INCH);

    layout.table(&[
        ("Image", record.image_name.clone()),
        ("Disease Prediction", record.predicted_class.clone()),
        ("Confidence", format!("{}%", record.confidence)),
    ]);
    layout.space(0.3 * INCH);

    layout.paragraph("Description", &HEADING_STYLE, MARGIN, CONTENT_WIDTH);
    layout.paragraph(&record.description, &BODY_STYLE, MARGIN, CONTENT_WIDTH);
    layout.space(0.2 * INCH);

    layout.paragraph("Recommended Treatment", &HEADING_STYLE, MARGIN, CONTENT_WIDTH);
    layout.paragraph(&record.treatment, &BODY_STYLE, MARGIN, CONTENT_WIDTH);
    layout.space(0.2 * INCH);

    layout.paragraph("References", &HEADING_STYLE, MARGIN, CONTENT_WIDTH);
    if record.references.is_empty() {
        layout.paragraph(NO_REFERENCES, &BODY_STYLE, MARGIN, CONTENT_WIDTH);
    } else {
        layout.link_list(&record.references, &BODY_STYLE, MARGIN, CONTENT_WIDTH);
    }
    layout.space(0.3 * INCH);

    layout.paragraph(DISCLAIMER, &DISCLAIMER_STYLE, MARGIN, CONTENT_WIDTH);

    layout.finish()
}

fn link_annotation(link: &Link) -> Dictionary {
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => reals(&link.rect),
        "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
        "A" => dictionary! {
            "S" => "URI",
            "URI" => Object::String(link.uri.as_bytes().to_vec(), StringFormat::Literal),
        },
    }
}

/// Render a report as PDF bytes
///
/// # Errors
/// Returns error if a content stream cannot be encoded or the document cannot be written
pub fn render(record: &ReportRecord) -> Result<Vec<u8>, ReportError> {
    let pages = lay_out(record);
    let page_count = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let mut fonts = Dictionary::new();
    for font in Font::ALL {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(font.resource_name(), font_id);
    }
    let resources_id = doc.add_object(dictionary! { "Font" => fonts });

    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for page in pages {
        let content = Content {
            operations: page.operations,
        };
        let encoded = content
            .encode()
            .map_err(|e| ReportError::Content(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let annots: Vec<Object> = page
            .links
            .iter()
            .map(|link| Object::Reference(doc.add_object(link_annotation(link))))
            .collect();

        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => reals(&[0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT]),
            "Contents" => content_id,
            "Resources" => resources_id,
        };
        if !annots.is_empty() {
            page_dict.set("Annots", annots);
        }
        kids.push(Object::Reference(doc.add_object(page_dict)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_count as i64),
        }),
    );

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(encode_win_ansi(TITLE), StringFormat::Literal),
        "Producer" => Object::string_literal("dermai-report"),
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ReportError::Write(e.to_string()))?;

    debug!("Rendered report: {} page(s), {} bytes", page_count, buffer.len());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Confidence;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn sample_record() -> ReportRecord {
        ReportRecord {
            image_name: "forearm.jpg".to_string(),
            predicted_class: "Eczema".to_string(),
            confidence: Confidence::Number(serde_json::Number::from(87)),
            description: "A condition that makes skin red and itchy.".to_string(),
            treatment: "Moisturize regularly; topical corticosteroids for flares.".to_string(),
            references: vec![
                "https://www.aad.org/public/diseases/eczema".to_string(),
                "https://www.nhs.uk/conditions/atopic-eczema/".to_string(),
            ],
        }
    }

    #[test]
    fn test_renders_loadable_pdf() {
        let bytes = render(&sample_record()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_contains_sections_and_fields() {
        let bytes = render(&sample_record()).unwrap();
        for text in [
            "(Description)",
            "(Recommended Treatment)",
            "(References)",
            "(Disease Prediction)",
            "(Eczema)",
            "(87%)",
            "(forearm.jpg)",
        ] {
            assert!(contains(&bytes, text.as_bytes()), "missing {text}");
        }
        assert!(contains(&bytes, &encode_win_ansi(TITLE)));
        assert!(!contains(&bytes, NO_REFERENCES.as_bytes()));
    }

    #[test]
    fn test_empty_references_placeholder() {
        let record = ReportRecord {
            references: Vec::new(),
            ..sample_record()
        };
        let bytes = render(&record).unwrap();
        assert!(contains(&bytes, b"(No references available.)"));
        assert!(!contains(&bytes, b"/URI"));
    }

    #[test]
    fn test_references_become_links() {
        let bytes = render(&sample_record()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let uris: Vec<Vec<u8>> = doc
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .filter(|dict| dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Link".as_slice()))
            .filter_map(|dict| dict.get(b"A").and_then(Object::as_dict).ok())
            .filter_map(|action| action.get(b"URI").and_then(Object::as_str).ok())
            .map(<[u8]>::to_vec)
            .collect();

        assert_eq!(uris.len(), 2);
        assert!(uris.contains(&b"https://www.aad.org/public/diseases/eczema".to_vec()));
    }

    #[test]
    fn test_default_record() {
        let bytes = render(&ReportRecord::default()).unwrap();
        assert!(contains(&bytes, b"(uploaded_image)"));
        assert!(contains(&bytes, b"(Unknown)"));
        assert!(contains(&bytes, b"(N/A%)"));
        assert!(contains(&bytes, b"(No description available.)"));
        assert!(contains(&bytes, b"(No treatment available.)"));
    }

    #[test]
    fn test_long_description_flows_to_more_pages() {
        let record = ReportRecord {
            description: "Chronic skin inflammation with recurring flares. ".repeat(400),
            ..sample_record()
        };
        let bytes = render(&record).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_layout_stays_within_margins() {
        let record = ReportRecord {
            description: "word ".repeat(2000),
            ..sample_record()
        };
        for page in lay_out(&record) {
            for op in page.operations.iter().filter(|op| op.operator == "Td") {
                let y = op.operands[1].as_float().unwrap();
                assert!(y >= MARGIN - 3.0, "baseline {y} below bottom margin");
                assert!(y <= TOP, "baseline {y} above top margin");
            }
        }
    }

    #[test]
    fn test_tall_table_row_is_split_across_pages() {
        let record = ReportRecord {
            image_name: "lesion ".repeat(3000),
            ..sample_record()
        };
        let pages = lay_out(&record);
        assert!(pages.len() > 1);
        for page in &pages {
            for op in page.operations.iter().filter(|op| op.operator == "Td") {
                let y = op.operands[1].as_float().unwrap();
                assert!(y >= MARGIN - 3.0, "baseline {y} below bottom margin");
                assert!(y <= TOP, "baseline {y} above top margin");
            }
        }

        let bytes = render(&record).unwrap();
        assert!(contains(&bytes, b"(Disease Prediction)"));
        assert!(contains(&bytes, b"(Eczema)"));
    }
}
