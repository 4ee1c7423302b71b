//! pdf-translate - translate the text of a PDF with a local MarianMT model
//!
//! The pipeline has three synchronous steps:
//! - `extract`: read the text layer of every page
//! - `translate`: split into fixed-size segments and translate each one
//! - `writer`: lay the translated text out in a new PDF

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod segment;
pub mod translate;
pub mod writer;

pub use config::{BuiltinFontChoice, Config, DevicePreference, ModelSettings, OutputSettings};
pub use error::{Error, Result};
pub use extract::{extract_text, ExtractedText};
pub use pipeline::{ProgressTracker, TranslatePipeline, TranslationReport};
pub use segment::split_segments;
pub use translate::{
    translate_text, LanguagePair, LoadOptions, MarianTranslator, ModelId, SegmentTranslator,
    TranslatedText,
};
pub use writer::{PdfWriter, WriteStats};
