use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// A single run of text sharing one font size / weight, as pdfium reports
/// it character-by-character and the reader adapter groups into spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub font_size: f32,
    pub bold: bool,
    pub bbox: BBox,
}

/// Spans on one visual line (grouped by the reader into a shared y-bucket).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
    pub bbox: BBox,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_bold(&self) -> bool {
        !self.spans.is_empty() && self.spans.iter().all(|s| s.bold || s.font_size > 14.0)
    }
}

/// A run of consecutive lines with no intervening table/image, the unit
/// layout fusion treats as a single paragraph-or-heading candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
    pub bbox: BBox,
}

/// A detected table: an axis-aligned bbox plus a rectangular cell matrix.
/// Missing cells are empty strings; every row has the same column count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegion {
    pub bbox: BBox,
    pub rows: Vec<Vec<String>>,
}

impl TableRegion {
    pub fn max_columns(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

/// An embedded raster image, plus whatever OCR managed to read off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRegion {
    pub bbox: Option<BBox>,
    pub index: usize,
    pub ocr_text: Option<String>,
    pub ocr_error: Option<String>,
}

/// One piece of page content, tagged with the vertical anchor layout fusion
/// orders by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Element {
    Text(TextBlock),
    Table(TableRegion),
    Image(ImageRegion),
}

impl Element {
    /// The y-coordinate fusion sorts elements by. Images without a known
    /// bbox sort last (`f32::INFINITY`), matching how the source document
    /// handles images it could not locate a placement rect for.
    pub fn y_anchor(&self) -> f32 {
        match self {
            Element::Text(b) => b.bbox.y0,
            Element::Table(t) => t.bbox.y0,
            Element::Image(i) => i.bbox.map(|b| b.y0).unwrap_or(f32::INFINITY),
        }
    }
}

/// All elements discovered on one page, already in document order within
/// each kind but not yet fused into a single reading-order stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRender {
    pub page_number: usize,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The asynchronous conversion job record tracked by the job manager.
/// `progress` is monotonically non-decreasing and reaches 100 iff `state`
/// is terminal (`Completed` or `Failed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: uuid::Uuid,
    pub file_id: String,
    pub state: JobState,
    pub progress: u8,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<ConversionResult>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(file_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            file_id,
            state: JobState::Pending,
            progress: 0,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub file_id: String,
    pub markdown_content: String,
    pub output_path: String,
    pub processing_time_secs: f64,
    pub pages_processed: usize,
    pub tables_found: usize,
}
