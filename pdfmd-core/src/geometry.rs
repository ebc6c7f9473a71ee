use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in top-left, y-grows-down page space.
///
/// `pdfium-render` reports rectangles in PDF's native bottom-left origin;
/// the reader adapter flips them once at extraction time via
/// [`BBox::from_pdf_rect`] so every downstream consumer (fusion, tests)
/// works in a single consistent frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Converts a PDF-space rect (origin bottom-left, `bottom`/`top` given in
    /// points from the page bottom) into top-left, y-down page space.
    pub fn from_pdf_rect(left: f32, bottom: f32, right: f32, top: f32, page_height: f32) -> Self {
        Self {
            x0: left,
            y0: page_height - top,
            x1: right,
            y1: page_height - bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    fn overlap_x(&self, other: &BBox) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    fn overlap_y(&self, other: &BBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    pub fn intersection(&self, other: &BBox) -> f32 {
        self.overlap_x(other) * self.overlap_y(other)
    }

    pub fn union(&self, other: &BBox) -> f32 {
        self.area() + other.area() - self.intersection(other)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let union = self.union(other);
        if union <= 0.0 {
            0.0
        } else {
            self.intersection(other) / union
        }
    }

    /// Ratio of intersection area to *this* box's own area: how much of
    /// `self` is covered by `other`. Asymmetric by design — used by layout
    /// fusion to decide whether a text block sits inside a table region,
    /// where the table region is typically much larger than any one block.
    pub fn overlap_ratio(&self, other: &BBox) -> f32 {
        let area = self.area();
        if area <= 0.0 {
            0.0
        } else {
            self.intersection(other) / area
        }
    }

    pub fn merge(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}
