use crate::model::{Element, TableRegion, TextBlock};

/// Layout fusion configuration — the knobs exposed as conversion config.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub table_detection_enabled: bool,
    pub preserve_formatting: bool,
    pub table_min_columns: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            table_detection_enabled: true,
            preserve_formatting: true,
            table_min_columns: 2,
        }
    }
}

const TABLE_OVERLAP_THRESHOLD: f32 = 0.7;
const BOLD_FONT_SIZE_THRESHOLD: f32 = 14.0;
const PARAGRAPH_HEIGHT_THRESHOLD: f32 = 20.0;

/// Fuses one page's discovered elements into reading-order Markdown,
/// following the source conversion tool's placeholder-then-substitute
/// design: text blocks that sit inside a table's bbox are dropped in favor
/// of a single table placeholder (one per table, never duplicated); images
/// get a placeholder at the position they were discovered; everything is
/// ordered by ascending vertical anchor, then placeholders are swapped for
/// rendered content in a second pass.
pub fn fuse_page(page_number: usize, elements: &[Element], config: &FusionConfig) -> String {
    // Step A: table position index, sorted by y0, each slot claimed at most once.
    let table_indices: Vec<usize> = {
        let mut idx: Vec<usize> = elements
            .iter()
            .enumerate()
            .filter_map(|(i, e)| matches!(e, Element::Table(_)).then_some(i))
            .collect();
        idx.sort_by(|&a, &b| {
            element_y(&elements[a])
                .partial_cmp(&element_y(&elements[b]))
                .unwrap()
        });
        idx
    };

    let mut processed_tables: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut stream: Vec<(f32, String)> = Vec::new();

    for (i, element) in elements.iter().enumerate() {
        match element {
            Element::Table(_) => {
                // tables are only emitted via the placeholder mechanism
                // below, triggered by an overlapping text block or, absent
                // one, appended in table-index order at the end of the pass.
                continue;
            }
            Element::Image(_) => {
                // array index doubles as the image's placeholder id, so
                // `substitute_placeholders` (which also walks `elements` by
                // index) can find the same marker regardless of how many
                // text blocks or tables precede this image on the page.
                stream.push((
                    element_y(element),
                    format!("<!-- IMAGE_PLACEHOLDER_{i} -->"),
                ));
            }
            Element::Text(block) => {
                if config.table_detection_enabled {
                    if let Some(&table_idx) = table_indices.iter().max_by(|&&a, &&b| {
                        overlaps_table(block, &elements[a])
                            .partial_cmp(&overlaps_table(block, &elements[b]))
                            .unwrap()
                    }) {
                        if overlaps_table(block, &elements[table_idx]) > TABLE_OVERLAP_THRESHOLD {
                            if processed_tables.insert(table_idx) {
                                stream.push((
                                    element_y(&elements[table_idx]),
                                    format!("<!-- TABLE_PLACEHOLDER_{table_idx} -->"),
                                ));
                            }
                            continue;
                        }
                    }
                }
                let text = format_text_block(block, config.preserve_formatting);
                if !text.trim().is_empty() {
                    stream.push((element_y(element), text));
                }
            }
        }
    }

    // any table never claimed by an overlapping block still gets rendered,
    // in its own table-index order.
    for &t in &table_indices {
        if !processed_tables.contains(&t) {
            stream.push((
                element_y(&elements[t]),
                format!("<!-- TABLE_PLACEHOLDER_{t} -->"),
            ));
        }
    }

    // Step E: final ascending y-anchor sort.
    stream.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut body = stream
        .into_iter()
        .map(|(_, s)| s)
        .collect::<Vec<_>>()
        .join("\n\n");

    // Step F (first pass done above via placeholders); second pass below.
    substitute_placeholders(&mut body, page_number, elements, config);

    format!("## 第 {page_number} 页\n\n{body}\n")
}

fn element_y(e: &Element) -> f32 {
    e.y_anchor()
}

fn overlaps_table(block: &TextBlock, table: &Element) -> f32 {
    let Element::Table(t) = table else { return 0.0 };
    block.bbox.overlap_ratio(&t.bbox)
}

fn substitute_placeholders(
    body: &mut String,
    page_number: usize,
    elements: &[Element],
    config: &FusionConfig,
) {
    for (i, element) in elements.iter().enumerate() {
        match element {
            Element::Table(table) => {
                let marker = format!("<!-- TABLE_PLACEHOLDER_{i} -->");
                if body.contains(&marker) {
                    let rendered = render_table(table, config.table_min_columns)
                        .map(|md| format!("**表格:**\n\n{md}"))
                        .unwrap_or_default();
                    *body = body.replace(&marker, &rendered);
                }
            }
            Element::Image(img) => {
                let marker = format!("<!-- IMAGE_PLACEHOLDER_{i} -->");
                if body.contains(&marker) {
                    let rendered = render_image_block(
                        page_number,
                        img.index,
                        img.ocr_text.as_deref(),
                        img.ocr_error.as_deref(),
                    );
                    *body = body.replace(&marker, &rendered);
                }
            }
            Element::Text(_) => {}
        }
    }
}

fn render_image_block(
    page_number: usize,
    index: usize,
    ocr_text: Option<&str>,
    ocr_error: Option<&str>,
) -> String {
    let heading = format!("**[Page {page_number}, Image {}]**", index + 1);
    match ocr_error {
        Some(reason) => format!("{heading}\n\n图片 {index} 处理失败: {reason}"),
        None => format!(
            "{heading}\n\nOCR 内容 [Page {page_number}, Image {}]:\n```\n{}\n```",
            index + 1,
            ocr_text.unwrap_or_default()
        ),
    }
}

/// Step D: each span is bolded individually when its font size exceeds the
/// threshold or it's flagged bold, so a line mixing bold and plain runs
/// keeps only the qualifying spans wrapped; lines grouped by the reader
/// into visual rows are joined with a newline; blocks taller than the
/// paragraph-height threshold get a blank line before them when
/// `preserve_formatting` is set.
fn format_text_block(block: &TextBlock, preserve_formatting: bool) -> String {
    let lines: Vec<String> = block
        .lines
        .iter()
        .map(|line| {
            line.spans
                .iter()
                .map(|span| {
                    let is_bold = span.bold || span.font_size > BOLD_FONT_SIZE_THRESHOLD;
                    if preserve_formatting && is_bold && !span.text.trim().is_empty() {
                        format!("**{}**", span.text)
                    } else {
                        span.text.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    let joined = lines.join("\n");
    if preserve_formatting && block.bbox.height() > PARAGRAPH_HEIGHT_THRESHOLD {
        format!("{joined}\n")
    } else {
        joined
    }
}

/// Step G/H: renders a table as a Markdown grid, rejecting tables that
/// don't look real (too few rows, too few columns, or entirely blank).
/// Body rows are padded or truncated to the header's column count so every
/// row in the emitted table has the same width.
pub fn render_table(table: &TableRegion, min_columns: usize) -> Option<String> {
    if !is_valid_table(table, min_columns) {
        return None;
    }

    let cleaned: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| clean_cell(cell)).collect())
        .collect();

    let header = &cleaned[0];
    let col_count = header.len();

    let mut out = String::new();
    out.push('|');
    for cell in header {
        out.push_str(&format!(" {cell} |"));
    }
    out.push('\n');
    out.push('|');
    for _ in 0..col_count {
        out.push_str(" --- |");
    }
    out.push('\n');

    for row in &cleaned[1..] {
        out.push('|');
        for i in 0..col_count {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            out.push_str(&format!(" {cell} |"));
        }
        out.push('\n');
    }

    Some(out)
}

fn is_valid_table(table: &TableRegion, min_columns: usize) -> bool {
    if table.rows.len() < 2 {
        return false;
    }
    if table.max_columns() < min_columns {
        return false;
    }
    table
        .rows
        .iter()
        .any(|row| row.iter().any(|c| !c.trim().is_empty()))
}

fn clean_cell(cell: &str) -> String {
    let replaced = cell.replace('\n', "<br>");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use crate::model::{ImageRegion, TextLine, TextSpan};

    fn span(text: &str, size: f32, bbox: BBox) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            font_size: size,
            bold: false,
            bbox,
        }
    }

    #[test]
    fn test_table_rejected_single_row() {
        let table = TableRegion {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            rows: vec![vec!["a".into(), "b".into()]],
        };
        assert!(render_table(&table, 2).is_none());
    }

    #[test]
    fn test_table_rejected_too_few_columns() {
        let table = TableRegion {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            rows: vec![vec!["a".into()], vec!["b".into()]],
        };
        assert!(render_table(&table, 2).is_none());
    }

    #[test]
    fn test_table_rejected_blank() {
        let table = TableRegion {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            rows: vec![vec![" ".into(), "  ".into()], vec!["".into(), "".into()]],
        };
        assert!(render_table(&table, 2).is_none());
    }

    #[test]
    fn test_table_renders_padded_rows() {
        let table = TableRegion {
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            rows: vec![
                vec!["Name".into(), "Age".into()],
                vec!["Alice".into()],
                vec!["Bob".into(), "30".into(), "extra".into()],
            ],
        };
        let md = render_table(&table, 2).unwrap();
        assert!(md.contains("| Name | Age |"));
        assert!(md.contains("| Alice |  |"));
        assert!(md.contains("| Bob | 30 |"));
    }

    #[test]
    fn test_cell_normalizes_newlines_and_whitespace() {
        assert_eq!(clean_cell("a\nb   c"), "a<br>b c");
    }

    #[test]
    fn test_fuse_page_orders_by_y_anchor() {
        let block_a = TextBlock {
            bbox: BBox::new(0.0, 50.0, 100.0, 60.0),
            lines: vec![TextLine {
                bbox: BBox::new(0.0, 50.0, 100.0, 60.0),
                spans: vec![span("second", 10.0, BBox::new(0.0, 50.0, 100.0, 60.0))],
            }],
        };
        let block_b = TextBlock {
            bbox: BBox::new(0.0, 10.0, 100.0, 20.0),
            lines: vec![TextLine {
                bbox: BBox::new(0.0, 10.0, 100.0, 20.0),
                spans: vec![span("first", 10.0, BBox::new(0.0, 10.0, 100.0, 20.0))],
            }],
        };
        let elements = vec![Element::Text(block_a), Element::Text(block_b)];
        let md = fuse_page(1, &elements, &FusionConfig::default());
        let first_pos = md.find("first").unwrap();
        let second_pos = md.find("second").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_fuse_page_single_table_placeholder_per_table() {
        let table = TableRegion {
            bbox: BBox::new(0.0, 0.0, 100.0, 100.0),
            rows: vec![vec!["a".into(), "b".into()], vec!["c".into(), "d".into()]],
        };
        let overlapping_block = TextBlock {
            bbox: BBox::new(10.0, 10.0, 90.0, 90.0),
            lines: vec![TextLine {
                bbox: BBox::new(10.0, 10.0, 90.0, 20.0),
                spans: vec![span(
                    "inside the table",
                    10.0,
                    BBox::new(10.0, 10.0, 90.0, 20.0),
                )],
            }],
        };
        let elements = vec![
            Element::Table(table),
            Element::Text(overlapping_block.clone()),
            Element::Text(overlapping_block),
        ];
        let md = fuse_page(1, &elements, &FusionConfig::default());
        assert_eq!(md.matches("**表格:**").count(), 1);
        assert!(!md.contains("inside the table"));
    }

    #[test]
    fn test_image_placeholder_failure_message() {
        let img = ImageRegion {
            bbox: None,
            index: 0,
            ocr_text: None,
            ocr_error: Some("decode error".into()),
        };
        let elements = vec![Element::Image(img)];
        let md = fuse_page(1, &elements, &FusionConfig::default());
        assert!(md.contains("**[Page 1, Image 1]**"));
        assert!(md.contains("图片 0 处理失败: decode error"));
    }

    #[test]
    fn test_image_placeholder_ocr_success() {
        let img = ImageRegion {
            bbox: Some(BBox::new(0.0, 0.0, 50.0, 50.0)),
            index: 0,
            ocr_text: Some("recognized text".into()),
            ocr_error: None,
        };
        let elements = vec![Element::Image(img)];
        let md = fuse_page(2, &elements, &FusionConfig::default());
        assert!(md.contains("**[Page 2, Image 1]**"));
        assert!(md.contains("OCR 内容 [Page 2, Image 1]:"));
        assert!(md.contains("recognized text"));
    }

    #[test]
    fn test_image_placeholder_survives_preceding_text_and_table() {
        let text_block = TextBlock {
            bbox: BBox::new(0.0, 0.0, 100.0, 10.0),
            lines: vec![TextLine {
                bbox: BBox::new(0.0, 0.0, 100.0, 10.0),
                spans: vec![span("heading", 10.0, BBox::new(0.0, 0.0, 100.0, 10.0))],
            }],
        };
        let table = TableRegion {
            bbox: BBox::new(0.0, 20.0, 100.0, 40.0),
            rows: vec![vec!["a".into(), "b".into()], vec!["c".into(), "d".into()]],
        };
        let img = ImageRegion {
            bbox: Some(BBox::new(0.0, 50.0, 50.0, 90.0)),
            index: 0,
            ocr_text: Some("recognized text".into()),
            ocr_error: None,
        };
        let elements = vec![
            Element::Text(text_block),
            Element::Table(table),
            Element::Image(img),
        ];
        let md = fuse_page(3, &elements, &FusionConfig::default());
        assert!(md.contains("heading"));
        assert!(md.contains("**表格:**"));
        assert!(md.contains("**[Page 3, Image 1]**"));
        assert!(md.contains("recognized text"));
    }

    #[test]
    fn test_bold_wrapping_is_per_span() {
        let block = TextBlock {
            bbox: BBox::new(0.0, 0.0, 100.0, 10.0),
            lines: vec![TextLine {
                bbox: BBox::new(0.0, 0.0, 100.0, 10.0),
                spans: vec![
                    span("plain", 10.0, BBox::new(0.0, 0.0, 40.0, 10.0)),
                    TextSpan {
                        text: "bold".to_string(),
                        font_size: 10.0,
                        bold: true,
                        bbox: BBox::new(40.0, 0.0, 100.0, 10.0),
                    },
                ],
            }],
        };
        let elements = vec![Element::Text(block)];
        let md = fuse_page(1, &elements, &FusionConfig::default());
        assert!(md.contains("plain **bold**"));
        assert!(!md.contains("**plain"));
    }
}
