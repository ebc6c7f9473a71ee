pub mod convert;
pub mod error;
pub mod fusion;
pub mod geometry;
pub mod model;
pub mod ocr;
pub mod reader;

pub use convert::{convert_pdf, validate_pdf_path, ConversionConfig, ConversionOutcome};
pub use error::ConvertError;
pub use model::*;
pub use ocr::{ExecutionProvider, NullOcrEngine, OcrEngine, OrtOcrEngine};
pub use reader::{PdfReader, PdfiumReader};
