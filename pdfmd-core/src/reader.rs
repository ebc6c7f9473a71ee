use std::path::Path;

use image::DynamicImage;
use pdfium_render::prelude::*;

use crate::error::{ConvertError, Result};
use crate::geometry::BBox;
use crate::model::{TableRegion, TextBlock, TextLine, TextSpan};

/// Two chars are grouped into the same visual line when their vertical
/// centers fall within this many points of each other.
const LINE_Y_TOLERANCE: f32 = 2.0;

/// One image embedded on a page, extracted as decoded pixels ready for OCR.
pub struct ExtractedImage {
    pub index: usize,
    pub bbox: Option<BBox>,
    pub data: DynamicImage,
}

/// Everything the reader could pull off a single page, still unordered
/// relative to each other — fusion is what establishes reading order.
pub struct PageContent {
    pub text_blocks: Vec<TextBlock>,
    pub tables: Vec<TableRegion>,
    pub images: Vec<ExtractedImage>,
}

/// Contract for extracting page content from a PDF document. Table
/// detection is delegated to whatever geometric strategy an implementation
/// chooses, but every implementation must report an axis-aligned bbox and a
/// rectangular cell matrix per table.
pub trait PdfReader {
    fn page_count(&self) -> usize;
    fn page_content(&self, page_index: usize) -> Result<PageContent>;
}

pub struct PdfiumReader {
    pdfium: Pdfium,
    document_bytes: Vec<u8>,
}

impl PdfiumReader {
    /// Opens a PDF from disk. Binds to a system-installed `libpdfium` first,
    /// falling back to whatever directory `PDFIUM_DYNAMIC_LIB_PATH` names —
    /// this repo ships no vendored static library, unlike the build this
    /// was learned from.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConvertError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let bindings = if let Ok(dir) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        } else {
            Pdfium::bind_to_system_library()
        }
        .map_err(|e| ConvertError::Corrupt(format!("failed to bind pdfium library: {e}")))?;

        let pdfium = Pdfium::new(bindings);
        // validate the document opens and is not password-protected before
        // handing back a reader that would fail lazily on first page access.
        pdfium
            .load_pdf_from_byte_vec(bytes.clone(), None)
            .map_err(|e| ConvertError::Corrupt(format!("failed to open PDF: {e}")))?;

        Ok(Self {
            pdfium,
            document_bytes: bytes,
        })
    }

    fn document(&self) -> Result<PdfDocument<'_>> {
        self.pdfium
            .load_pdf_from_byte_slice(&self.document_bytes, None)
            .map_err(|e| ConvertError::Corrupt(format!("failed to open PDF: {e}")))
    }
}

impl PdfReader for PdfiumReader {
    fn page_count(&self) -> usize {
        self.document()
            .map(|doc| doc.pages().len() as usize)
            .unwrap_or(0)
    }

    fn page_content(&self, page_index: usize) -> Result<PageContent> {
        let document = self.document()?;
        let pages = document.pages();
        let page = pages.get(page_index as u16).map_err(|_| {
            ConvertError::InvalidArgument(format!("page index {page_index} out of range"))
        })?;

        let page_height = page.height().value;
        let chars = collect_chars(&page, page_height, page_index)?;
        let lines = group_lines(chars);
        let tables = detect_tables(&page, page_height);

        // drop lines whose bbox sits mostly inside a detected table; the
        // table rendering owns that text instead.
        let (table_lines, prose_lines): (Vec<_>, Vec<_>) = lines.into_iter().partition(|l| {
            tables
                .iter()
                .any(|t| l.bbox.overlap_ratio(&t.bbox) > 0.7)
        });
        drop(table_lines);

        let text_blocks = group_blocks(prose_lines);
        let images = collect_images(&page, page_height)?;

        Ok(PageContent {
            text_blocks,
            tables,
            images,
        })
    }
}

fn collect_chars(page: &PdfPage, page_height: f32, page_index: usize) -> Result<Vec<TextSpan>> {
    let text = page
        .text()
        .map_err(|e| ConvertError::PageProcessingError {
            page: page_index,
            reason: format!("no text layer: {e}"),
        })?;

    let mut spans = Vec::new();
    let mut current: Option<(String, f32, bool, BBox)> = None;

    for ch in text.chars().iter() {
        let Ok(c) = ch.unicode_char() else { continue };
        let Ok(bounds) = ch.loose_bounds() else {
            continue;
        };
        let bbox = BBox::from_pdf_rect(
            bounds.left().value,
            bounds.bottom().value,
            bounds.right().value,
            bounds.top().value,
            page_height,
        );
        let font_size = ch.unscaled_font_size().value;
        let bold = ch
            .font_name()
            .map(|n| n.to_lowercase().contains("bold"))
            .unwrap_or(false);

        match current.as_mut() {
            Some((text, size, is_bold, bbox_acc))
                if (*size - font_size).abs() < 0.5 && *is_bold == bold =>
            {
                text.push(c);
                *bbox_acc = bbox_acc.merge(&bbox);
            }
            _ => {
                if let Some((text, size, is_bold, bbox_acc)) = current.take() {
                    spans.push(TextSpan {
                        text,
                        font_size: size,
                        bold: is_bold,
                        bbox: bbox_acc,
                    });
                }
                current = Some((c.to_string(), font_size, bold, bbox));
            }
        }
    }
    if let Some((text, size, is_bold, bbox_acc)) = current {
        spans.push(TextSpan {
            text,
            font_size: size,
            bold: is_bold,
            bbox: bbox_acc,
        });
    }
    Ok(spans)
}

fn group_lines(spans: Vec<TextSpan>) -> Vec<TextLine> {
    let mut sorted = spans;
    sorted.sort_by(|a, b| {
        a.bbox
            .y0
            .partial_cmp(&b.bbox.y0)
            .unwrap()
            .then(a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap())
    });

    let mut lines: Vec<TextLine> = Vec::new();
    for span in sorted {
        if let Some(last) = lines.last_mut() {
            if (last.bbox.y0 - span.bbox.y0).abs() < LINE_Y_TOLERANCE {
                last.bbox = last.bbox.merge(&span.bbox);
                last.spans.push(span);
                continue;
            }
        }
        lines.push(TextLine {
            bbox: span.bbox,
            spans: vec![span],
        });
    }
    for line in &mut lines {
        line.spans
            .sort_by(|a, b| a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap());
    }
    lines
}

/// Groups consecutive lines into paragraph blocks, starting a new block on
/// a vertical gap wider than one line height — the same blank-line
/// heuristic layout fusion later uses to separate paragraphs.
fn group_blocks(mut lines: Vec<TextLine>) -> Vec<TextBlock> {
    lines.sort_by(|a, b| a.bbox.y0.partial_cmp(&b.bbox.y0).unwrap());

    let mut blocks: Vec<TextBlock> = Vec::new();
    let mut current: Vec<TextLine> = Vec::new();
    let mut prev_bottom: Option<f32> = None;

    for line in lines {
        let gap = prev_bottom.map(|b| line.bbox.y0 - b).unwrap_or(0.0);
        if gap > line.bbox.height().max(1.0) * 1.5 && !current.is_empty() {
            blocks.push(finish_block(std::mem::take(&mut current)));
        }
        prev_bottom = Some(line.bbox.y1);
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(finish_block(current));
    }
    blocks
}

fn finish_block(lines: Vec<TextLine>) -> TextBlock {
    let bbox = lines
        .iter()
        .map(|l| l.bbox)
        .reduce(|a, b| a.merge(&b))
        .unwrap_or_default();
    TextBlock { lines, bbox }
}

/// Detects tables from ruled-line path objects: horizontal and vertical
/// straight strokes are clustered, and any region bounded by at least two
/// horizontal and two vertical clusters is treated as a table grid, with
/// text chars bucketed into the resulting cells. This mirrors the
/// line-grid strategy a ruled-line table finder uses, generalized to a
/// pure geometric pass since pdfium itself reports no table structure.
fn detect_tables(page: &PdfPage, page_height: f32) -> Vec<TableRegion> {
    let mut horizontals: Vec<BBox> = Vec::new();
    let mut verticals: Vec<BBox> = Vec::new();

    for object in page.objects().iter() {
        if let Some(path) = object.as_path_object() {
            let Ok(bounds) = path.bounds() else { continue };
            let bbox = BBox::from_pdf_rect(
                bounds.left().value,
                bounds.bottom().value,
                bounds.right().value,
                bounds.top().value,
                page_height,
            );
            if bbox.height() < 1.5 && bbox.width() > 5.0 {
                horizontals.push(bbox);
            } else if bbox.width() < 1.5 && bbox.height() > 5.0 {
                verticals.push(bbox);
            }
        }
    }

    if horizontals.len() < 2 || verticals.len() < 2 {
        return Vec::new();
    }

    let mut h_ys: Vec<f32> = horizontals.iter().map(|b| b.y0).collect();
    let mut v_xs: Vec<f32> = verticals.iter().map(|b| b.x0).collect();
    h_ys.sort_by(|a, b| a.partial_cmp(b).unwrap());
    v_xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    h_ys.dedup_by(|a, b| (*a - *b).abs() < 2.0);
    v_xs.dedup_by(|a, b| (*a - *b).abs() < 2.0);

    if h_ys.len() < 2 || v_xs.len() < 2 {
        return Vec::new();
    }

    let bbox = BBox::new(
        v_xs[0] - 2.0,
        h_ys[0] - 2.0,
        *v_xs.last().unwrap() + 2.0,
        *h_ys.last().unwrap() + 2.0,
    );

    let mut chars_by_cell: Vec<Vec<String>> = vec![vec![String::new(); v_xs.len() - 1]; h_ys.len() - 1];

    if let Ok(text) = page.text() {
        for ch in text.chars().iter() {
            let (Ok(c), Ok(bounds)) = (ch.unicode_char(), ch.loose_bounds()) else {
                continue;
            };
            let cb = BBox::from_pdf_rect(
                bounds.left().value,
                bounds.bottom().value,
                bounds.right().value,
                bounds.top().value,
                page_height,
            );
            if !bbox.contains(&cb) {
                continue;
            }
            let row = h_ys.partition_point(|&y| y <= cb.y0).saturating_sub(1);
            let col = v_xs.partition_point(|&x| x <= cb.x0).saturating_sub(1);
            if row < chars_by_cell.len() && col < chars_by_cell[row].len() {
                chars_by_cell[row][col].push(c);
            }
        }
    }

    vec![TableRegion {
        bbox,
        rows: chars_by_cell,
    }]
}

fn collect_images(page: &PdfPage, page_height: f32) -> Result<Vec<ExtractedImage>> {
    let mut images = Vec::new();
    for (index, object) in page.objects().iter().enumerate() {
        let Some(image_object) = object.as_image_object() else {
            continue;
        };
        let Ok(data) = image_object.get_raw_image() else {
            continue;
        };
        let bbox = image_object.bounds().ok().map(|bounds| {
            BBox::from_pdf_rect(
                bounds.left().value,
                bounds.bottom().value,
                bounds.right().value,
                bounds.top().value,
                page_height,
            )
        });
        images.push(ExtractedImage { index, bbox, data });
    }
    Ok(images)
}
