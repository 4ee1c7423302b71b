//! Segment translation
//!
//! Cuts the document text into fixed-size segments, translates each one
//! independently and joins the results with a single space.

pub mod model;
pub mod sentencepiece;

pub use model::{select_device, LoadOptions, MarianTranslator, ModelId};

use crate::error::{Error, Result};
use crate::pipeline::ProgressTracker;
use crate::segment::split_segments;
use std::fmt;
use std::num::NonZeroUsize;

/// Source and target language codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Anything that can translate one segment at a time.
///
/// Implementations keep no context between calls; every segment is
/// translated as if it were a whole document.
pub trait SegmentTranslator {
    /// Identifier of the model doing the work
    fn model_id(&self) -> &str;

    /// Translate a single segment
    fn translate_segment(&mut self, segment: &str) -> anyhow::Result<String>;
}

/// Translate `text` segment by segment, in order.
///
/// The first failing segment aborts the whole translation.
pub fn translate_text<T: SegmentTranslator + ?Sized>(
    translator: &mut T,
    text: &str,
    max_chars: NonZeroUsize,
    progress: &mut ProgressTracker,
) -> Result<TranslatedText> {
    let segments = split_segments(text, max_chars);
    tracing::info!(
        model = translator.model_id(),
        segments = segments.len(),
        max_chars = max_chars.get(),
        "translating"
    );

    progress.start_segments(segments.len());
    let mut translated = Vec::with_capacity(segments.len());

    for (index, segment) in segments.iter().enumerate() {
        match translator.translate_segment(segment) {
            Ok(out) => {
                tracing::debug!(
                    index,
                    input_chars = segment.chars().count(),
                    output_chars = out.chars().count(),
                    "segment translated"
                );
                translated.push(out);
                progress.segment_done();
            }
            Err(e) => {
                progress.abandon_segments();
                return Err(Error::Translation {
                    index,
                    message: format!("{e:#}"),
                });
            }
        }
    }
    progress.finish_segments();

    Ok(TranslatedText {
        text: translated.join(" "),
        segments: segments.len(),
    })
}

/// Output of [`translate_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedText {
    pub text: String,
    /// Number of segments sent to the model
    pub segments: usize,
}
