use tracing::instrument;

use crate::error::{ConvertError, Result};
use crate::fusion::{fuse_page, FusionConfig};
use crate::model::{Element, ImageRegion};
use crate::ocr::OcrEngine;
use crate::reader::PdfReader;

/// Page-batched conversion configuration.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub chunk_size: usize,
    pub progress_update_interval: usize,
    pub table_detection_enabled: bool,
    pub extract_images: bool,
    pub preserve_formatting: bool,
    pub table_min_columns: usize,
    /// 1-indexed, inclusive.
    pub start_page: usize,
    /// 1-indexed, inclusive; `None` means "through the last page".
    pub end_page: Option<usize>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            progress_update_interval: 10,
            table_detection_enabled: true,
            extract_images: true,
            preserve_formatting: true,
            table_min_columns: 2,
            start_page: 1,
            end_page: None,
        }
    }
}

impl ConversionConfig {
    fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            table_detection_enabled: self.table_detection_enabled,
            preserve_formatting: self.preserve_formatting,
            table_min_columns: self.table_min_columns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub markdown: String,
    pub pages_processed: usize,
    pub tables_found: usize,
}

/// `NotFound` if the file is missing, `InvalidArgument` if its extension
/// isn't `.pdf`. Checked once by the caller before a reader is opened, so
/// both the API job worker and the CLI reject a non-PDF path the same way
/// instead of failing deeper inside `pdfium-render`.
pub fn validate_pdf_path(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        return Err(ConvertError::NotFound(path.to_path_buf()));
    }
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return Err(ConvertError::InvalidArgument(format!(
            "not a PDF file: {}",
            path.display()
        )));
    }
    Ok(())
}

fn validate(config: &ConversionConfig, page_count: usize) -> Result<(usize, usize)> {
    if config.start_page < 1 {
        return Err(ConvertError::InvalidArgument(
            "start_page must be >= 1".into(),
        ));
    }
    if let Some(end) = config.end_page {
        if end < config.start_page {
            return Err(ConvertError::InvalidArgument(
                "end_page must be >= start_page".into(),
            ));
        }
    }
    if config.start_page > page_count {
        return Err(ConvertError::InvalidArgument(format!(
            "page range start ({}) exceeds document length ({})",
            config.start_page, page_count
        )));
    }
    let end = config
        .end_page
        .unwrap_or(page_count)
        .min(page_count);
    Ok((config.start_page, end))
}

/// Converts the selected page range into a single Markdown document,
/// processing pages in fixed-size batches purely for progress pacing:
/// chunk size never changes output, only how often `progress_callback`
/// fires (chunk_size=1 and chunk_size=10 produce identical Markdown).
/// `should_cancel` is polled once per batch boundary; returning `true`
/// aborts the conversion with `Canceled` without touching any page already
/// appended to `markdown`.
#[instrument(skip(reader, ocr, progress_callback, should_cancel))]
pub fn convert_pdf(
    reader: &dyn PdfReader,
    ocr: &dyn OcrEngine,
    config: &ConversionConfig,
    mut progress_callback: impl FnMut(u8),
    mut should_cancel: impl FnMut() -> bool,
) -> Result<ConversionOutcome> {
    let page_count = reader.page_count();
    let (start, end) = validate(config, page_count)?;
    let range_size = end - start + 1;

    let mut markdown = String::new();
    let mut tables_found = 0usize;
    let mut pages_processed = 0usize;
    let fusion_config = config.fusion_config();

    for batch_start in (start..=end).step_by(config.chunk_size.max(1)) {
        if should_cancel() {
            return Err(ConvertError::Canceled);
        }
        let batch_end = (batch_start + config.chunk_size.max(1) - 1).min(end);
        for page_number in batch_start..=batch_end {
            let page_index = page_number - 1;
            match process_page(reader, ocr, page_index, page_number, &fusion_config, config) {
                Ok((page_md, table_count)) => {
                    markdown.push_str(&page_md);
                    markdown.push('\n');
                    tables_found += table_count;
                }
                Err(e) => {
                    tracing::warn!(page = page_number, error = %e, "page conversion failed");
                    markdown.push_str(&format!(
                        "\n<!-- page {page_number} error: {e} -->\n"
                    ));
                }
            }
            pages_processed += 1;

            if pages_processed % config.progress_update_interval.max(1) == 0
                || pages_processed == range_size
            {
                let pct = ((100 * pages_processed) / range_size.max(1)).min(99) as u8;
                progress_callback(pct);
            }
        }
    }

    progress_callback(100);

    Ok(ConversionOutcome {
        markdown,
        pages_processed,
        tables_found,
    })
}

fn process_page(
    reader: &dyn PdfReader,
    ocr: &dyn OcrEngine,
    page_index: usize,
    page_number: usize,
    fusion_config: &FusionConfig,
    config: &ConversionConfig,
) -> Result<(String, usize)> {
    let content = reader
        .page_content(page_index)
        .map_err(|e| ConvertError::PageProcessingError {
            page: page_number,
            reason: e.to_string(),
        })?;

    let mut elements: Vec<Element> = Vec::new();

    for block in content.text_blocks {
        elements.push(Element::Text(block));
    }

    if config.table_detection_enabled {
        for table in content.tables {
            elements.push(Element::Table(table));
        }
    }

    let tables_found = elements
        .iter()
        .filter(|e| matches!(e, Element::Table(_)))
        .count();

    if config.extract_images {
        for img in content.images {
            let (ocr_text, ocr_error) = match ocr.recognize(&img.data) {
                Ok(text) => (Some(text), None),
                Err(e) => (None, Some(e.to_string())),
            };
            elements.push(Element::Image(ImageRegion {
                bbox: img.bbox,
                index: img.index,
                ocr_text,
                ocr_error,
            }));
        }
    }

    let markdown = fuse_page(page_number, &elements, fusion_config);
    Ok((markdown, tables_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use crate::model::{TableRegion, TextBlock};
    use crate::ocr::NullOcrEngine;
    use crate::reader::{ExtractedImage, PageContent};

    struct FakeReader {
        pages: Vec<PageContentFixture>,
    }

    struct PageContentFixture {
        text_blocks: Vec<TextBlock>,
        tables: Vec<TableRegion>,
    }

    impl PdfReader for FakeReader {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_content(&self, page_index: usize) -> Result<PageContent> {
            let fixture = &self.pages[page_index];
            Ok(PageContent {
                text_blocks: fixture.text_blocks.clone(),
                tables: fixture.tables.clone(),
                images: Vec::<ExtractedImage>::new(),
            })
        }
    }

    fn simple_page() -> PageContentFixture {
        PageContentFixture {
            text_blocks: vec![TextBlock {
                bbox: BBox::new(0.0, 0.0, 100.0, 20.0),
                lines: vec![],
            }],
            tables: vec![],
        }
    }

    #[test]
    fn test_validate_pdf_path_rejects_missing_file() {
        let path = std::path::Path::new("/no/such/file.pdf");
        assert!(matches!(
            validate_pdf_path(path),
            Err(ConvertError::NotFound(_))
        ));
    }

    #[test]
    fn test_validate_pdf_path_rejects_wrong_extension() {
        let dir = std::env::temp_dir();
        let path = dir.join("pdfmd_test_not_a_pdf.txt");
        std::fs::write(&path, b"hello").unwrap();
        let result = validate_pdf_path(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConvertError::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_pdf_path_accepts_pdf_extension_case_insensitive() {
        let dir = std::env::temp_dir();
        let path = dir.join("pdfmd_test_doc.PDF");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let result = validate_pdf_path(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_start_page_beyond_document() {
        let reader = FakeReader { pages: vec![] };
        let ocr = NullOcrEngine;
        let config = ConversionConfig {
            start_page: 1,
            ..Default::default()
        };
        let mut last = 0u8;
        let result = convert_pdf(&reader, &ocr, &config, |p| last = p, || false);
        assert!(matches!(result, Err(ConvertError::InvalidArgument(_))));
    }

    #[test]
    fn test_chunk_size_does_not_change_output() {
        let reader = FakeReader {
            pages: (0..5).map(|_| simple_page()).collect(),
        };
        let ocr = NullOcrEngine;

        let small_chunks = ConversionConfig {
            chunk_size: 1,
            ..Default::default()
        };
        let big_chunks = ConversionConfig {
            chunk_size: 10,
            ..Default::default()
        };

        let out_small = convert_pdf(&reader, &ocr, &small_chunks, |_| {}, || false).unwrap();
        let out_big = convert_pdf(&reader, &ocr, &big_chunks, |_| {}, || false).unwrap();
        assert_eq!(out_small.markdown, out_big.markdown);
        assert_eq!(out_small.pages_processed, out_big.pages_processed);
    }

    #[test]
    fn test_final_progress_is_100() {
        let reader = FakeReader {
            pages: (0..3).map(|_| simple_page()).collect(),
        };
        let ocr = NullOcrEngine;
        let mut last_progress = 0u8;
        let config = ConversionConfig::default();
        convert_pdf(&reader, &ocr, &config, |p| last_progress = p, || false).unwrap();
        assert_eq!(last_progress, 100);
    }

    #[test]
    fn test_page_error_is_non_fatal() {
        struct FailingReader;
        impl PdfReader for FailingReader {
            fn page_count(&self) -> usize {
                1
            }
            fn page_content(&self, _page_index: usize) -> Result<PageContent> {
                Err(ConvertError::PageProcessingError {
                    page: 1,
                    reason: "broken stream".into(),
                })
            }
        }
        let ocr = NullOcrEngine;
        let config = ConversionConfig::default();
        let outcome = convert_pdf(&FailingReader, &ocr, &config, |_| {}, || false).unwrap();
        assert!(outcome.markdown.contains("page 1 error"));
        assert_eq!(outcome.pages_processed, 1);
    }

    #[test]
    fn test_cancellation_aborts_before_next_batch() {
        let reader = FakeReader {
            pages: (0..5).map(|_| simple_page()).collect(),
        };
        let ocr = NullOcrEngine;
        let config = ConversionConfig {
            chunk_size: 1,
            ..Default::default()
        };
        let result = convert_pdf(&reader, &ocr, &config, |_| {}, || true);
        assert!(matches!(result, Err(ConvertError::Canceled)));
    }
}
