//! PDF Writer for translated text
//!
//! Lays the text out as word-wrapped, left-aligned lines in a single built-in
//! font and writes an A4 document, adding pages as needed.

use crate::config::{BuiltinFontChoice, OutputSettings};
use crate::error::{Error, Result};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const LAYER_NAME: &str = "Layer 1";

/// Statistics from a write operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Number of pages in the output document
    pub pages: usize,
    /// Number of laid-out lines, blank ones included
    pub lines: usize,
}

/// Writes text into a new PDF document
pub struct PdfWriter {
    settings: OutputSettings,
}

impl PdfWriter {
    pub fn new(settings: OutputSettings) -> Self {
        Self { settings }
    }

    /// Write `text` to `path`, replacing any existing file.
    ///
    /// The character check runs before the file is touched, so an encoding
    /// failure leaves no output behind.
    pub fn write(&self, text: &str, path: &Path) -> Result<WriteStats> {
        check_encodable(text)?;

        let lines = layout_lines(text, self.settings.wrap_width);
        let pages = paginate(&lines, self.lines_per_page());

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "translation".to_string());

        let write_error = |message: String| Error::Write {
            path: path.to_path_buf(),
            message,
        };

        let (doc, first_page, first_layer) =
            PdfDocument::new(&title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
        let font = doc
            .add_builtin_font(builtin_font(self.settings.font))
            .map_err(|e| write_error(format!("font error: {e}")))?;

        let top = Mm(PAGE_HEIGHT_MM - self.settings.margin_mm);
        let left = Mm(self.settings.margin_mm);
        let line_height = Mm(self.settings.line_height_mm);

        for (page_idx, page_lines) in pages.iter().enumerate() {
            let (page, layer) = if page_idx == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME)
            };
            let layer = doc.get_page(page).get_layer(layer);

            // First baseline sits one line below the top margin
            let mut y = top - line_height;
            for line in page_lines.iter() {
                if !line.is_empty() {
                    layer.use_text(line.as_str(), self.settings.font_size, left, y, &font);
                }
                y -= line_height;
            }
        }

        let file = File::create(path).map_err(|e| Error::file_access(path, e))?;
        let mut buf = BufWriter::new(file);
        doc.save(&mut buf)
            .map_err(|e| write_error(format!("save error: {e}")))?;

        let stats = WriteStats {
            pages: pages.len(),
            lines: lines.len(),
        };
        tracing::info!(path = %path.display(), pages = stats.pages, lines = stats.lines, "wrote PDF");

        Ok(stats)
    }

    fn lines_per_page(&self) -> usize {
        let usable = PAGE_HEIGHT_MM - 2.0 * self.settings.margin_mm;
        let per_page = (usable / self.settings.line_height_mm).floor();
        if per_page.is_finite() && per_page >= 1.0 {
            per_page as usize
        } else {
            1
        }
    }
}

fn builtin_font(choice: BuiltinFontChoice) -> BuiltinFont {
    match choice {
        BuiltinFontChoice::Helvetica => BuiltinFont::Helvetica,
        BuiltinFontChoice::TimesRoman => BuiltinFont::TimesRoman,
        BuiltinFontChoice::Courier => BuiltinFont::Courier,
    }
}

/// Whether the built-in fonts (WinAnsi encoding) can render `ch`.
pub fn is_font_encodable(ch: char) -> bool {
    matches!(ch,
        ' '..='~'
        | '\u{A0}'..='\u{FF}'
        | '€' | '‚' | 'ƒ' | '„' | '…' | '†' | '‡' | 'ˆ' | '‰' | 'Š' | '‹' | 'Œ' | 'Ž'
        | '‘' | '’' | '“' | '”' | '•' | '–' | '—' | '˜' | '™' | 'š' | '›' | 'œ' | 'ž' | 'Ÿ'
    )
}

/// Reject the first character the output font cannot encode.
///
/// Layout whitespace is exempt since it never reaches the page as a glyph.
pub fn check_encodable(text: &str) -> Result<()> {
    for (position, ch) in text.chars().enumerate() {
        if matches!(ch, '\n' | '\r' | '\t') {
            continue;
        }
        if !is_font_encodable(ch) {
            return Err(Error::Encoding { ch, position });
        }
    }
    Ok(())
}

/// Break text into lines of at most `width` characters.
///
/// Newlines end a line; words are wrapped at whitespace and words longer
/// than a full line are split. Empty text still yields a single blank line.
pub fn layout_lines(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word = word;
            let mut word_len = word.chars().count();

            if current_len > 0 && current_len + 1 + word_len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }

            while word_len > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let split = word
                    .char_indices()
                    .nth(width)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                lines.push(word[..split].to_string());
                word = &word[split..];
                word_len -= width;
            }

            if word_len == 0 {
                continue;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }

        lines.push(current);
    }

    lines
}

/// Group lines into pages. Always yields at least one (possibly empty) page.
pub fn paginate(lines: &[String], lines_per_page: usize) -> Vec<&[String]> {
    if lines.is_empty() {
        return vec![lines];
    }
    lines.chunks(lines_per_page.max(1)).collect()
}
