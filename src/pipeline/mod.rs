//! Translation pipeline
//!
//! Runs the three steps strictly in order: extract the source text,
//! translate it segment by segment, write the result to a new PDF. Any error
//! ends the run; nothing is retried and no partial output is written.

pub mod progress;

pub use progress::ProgressTracker;

use crate::config::OutputSettings;
use crate::error::Result;
use crate::extract::extract_text;
use crate::translate::{translate_text, SegmentTranslator};
use crate::writer::PdfWriter;
use std::num::NonZeroUsize;
use std::path::Path;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationReport {
    pub model_id: String,
    /// Pages in the source document
    pub pages_read: usize,
    pub chars_extracted: usize,
    /// Segments sent to the model
    pub segments: usize,
    pub chars_written: usize,
    /// Pages in the output document
    pub pages_written: usize,
}

/// Extract → translate → write
pub struct TranslatePipeline {
    max_length: NonZeroUsize,
    writer: PdfWriter,
}

impl TranslatePipeline {
    pub fn new(max_length: NonZeroUsize, output: OutputSettings) -> Self {
        Self {
            max_length,
            writer: PdfWriter::new(output),
        }
    }

    /// Translate the PDF at `input` into a new PDF at `output`.
    ///
    /// `load_translator` is only called once the input has been read, so an
    /// unreadable input never triggers a model download.
    pub fn run<T, F>(
        &self,
        input: &Path,
        output: &Path,
        load_translator: F,
        progress: &mut ProgressTracker,
    ) -> Result<TranslationReport>
    where
        T: SegmentTranslator,
        F: FnOnce() -> Result<T>,
    {
        progress.start_phase("Extracting text");
        let extracted = extract_text(input)?;
        progress.finish_phase();

        progress.start_phase("Loading model");
        let mut translator = load_translator()?;
        progress.finish_phase();

        let translated = translate_text(&mut translator, &extracted.text, self.max_length, progress)?;

        progress.start_phase("Writing PDF");
        let stats = self.writer.write(&translated.text, output)?;
        progress.finish_phase();

        Ok(TranslationReport {
            model_id: translator.model_id().to_string(),
            pages_read: extracted.page_count,
            chars_extracted: extracted.char_count(),
            segments: translated.segments,
            chars_written: translated.text.chars().count(),
            pages_written: stats.pages,
        })
    }
}
