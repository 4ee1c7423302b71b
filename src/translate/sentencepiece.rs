//! Marian tokenizers built from SentencePiece model files.
//!
//! Helsinki-NLP repos ship `source.spm` / `target.spm` plus a `vocab.json`
//! mapping pieces to model ids. Only the piece table of the `.spm` protobuf
//! is read; the pieces keep their SentencePiece scores and take their ids
//! from the vocabulary.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::unigram::Unigram;
use tokenizers::normalizers::{Nmt, Sequence, NFKC};
use tokenizers::pre_tokenizers::metaspace::{Metaspace, PrependScheme};
use tokenizers::{AddedToken, Tokenizer};

/// Marian special tokens, always present in `vocab.json`
const EOS_TOKEN: &str = "</s>";
const UNK_TOKEN: &str = "<unk>";
const PAD_TOKEN: &str = "<pad>";

/// Score for vocabulary entries the SentencePiece model does not know, so
/// the segmenter never picks them
const ABSENT_SCORE: f64 = -1e9;

/// Entry of the SentencePiece piece table
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub text: String,
    pub score: f32,
    /// Normal or user-defined piece, as opposed to control/unknown/unused
    pub normal: bool,
}

/// Read the piece table of a serialized SentencePiece `ModelProto`.
pub fn read_pieces(bytes: &[u8]) -> Result<Vec<Piece>> {
    let mut reader = ProtoReader::new(bytes);
    let mut pieces = Vec::new();

    while let Some((field, wire_type)) = reader.key()? {
        match (field, wire_type) {
            (1, WIRE_LEN) => pieces.push(read_piece(reader.bytes()?)?),
            _ => reader.skip(wire_type)?,
        }
    }

    if pieces.is_empty() {
        bail!("SentencePiece model has no pieces");
    }
    Ok(pieces)
}

fn read_piece(bytes: &[u8]) -> Result<Piece> {
    let mut reader = ProtoReader::new(bytes);
    let mut piece = Piece {
        text: String::new(),
        score: 0.0,
        normal: true,
    };

    while let Some((field, wire_type)) = reader.key()? {
        match (field, wire_type) {
            (1, WIRE_LEN) => {
                piece.text = String::from_utf8(reader.bytes()?.to_vec())
                    .context("piece is not valid UTF-8")?;
            }
            (2, WIRE_FIXED32) => piece.score = f32::from_le_bytes(reader.fixed32()?),
            // NORMAL = 1, USER_DEFINED = 4
            (3, WIRE_VARINT) => piece.normal = matches!(reader.varint()?, 1 | 4),
            _ => reader.skip(wire_type)?,
        }
    }
    Ok(piece)
}

/// Load a `vocab.json` piece → id map.
pub fn read_vocab(path: &Path) -> Result<HashMap<String, u32>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a vocabulary", path.display()))
}

/// Build a Marian tokenizer from one side's pieces and the model vocabulary.
///
/// The tokenizer has exactly one entry per vocabulary id, so its ids are the
/// model's ids. Pieces outside the vocabulary cannot be produced by the model
/// and are dropped; vocabulary entries the SentencePiece model lacks are kept
/// but never chosen by the segmenter.
pub fn marian_tokenizer(pieces: &[Piece], vocab: &HashMap<String, u32>) -> Result<Tokenizer> {
    let unk_id = *vocab
        .get(UNK_TOKEN)
        .with_context(|| format!("vocabulary has no {UNK_TOKEN} token"))?;

    let scores: HashMap<&str, f64> = pieces
        .iter()
        .filter(|p| p.normal)
        .map(|p| (p.text.as_str(), f64::from(p.score)))
        .collect();

    let size = vocab.values().max().map_or(0, |max| *max as usize + 1);
    let mut entries: Vec<Option<(String, f64)>> = vec![None; size];
    for (token, &id) in vocab {
        let score = scores.get(token.as_str()).copied().unwrap_or(ABSENT_SCORE);
        entries[id as usize] = Some((token.clone(), score));
    }
    let entries: Vec<(String, f64)> = entries
        .into_iter()
        .enumerate()
        .map(|(id, entry)| entry.unwrap_or_else(|| (format!("<unused{id}>"), ABSENT_SCORE)))
        .collect();

    let model = Unigram::from(entries, Some(unk_id as usize), false).map_err(anyhow::Error::msg)?;

    let mut tokenizer = Tokenizer::new(model);
    tokenizer
        .with_normalizer(Some(Sequence::new(vec![Nmt.into(), NFKC.into()])))
        .with_pre_tokenizer(Some(Metaspace::new('▁', PrependScheme::Always, true)))
        .with_decoder(Some(Metaspace::new('▁', PrependScheme::Always, true)));

    let specials: Vec<AddedToken> = [EOS_TOKEN, UNK_TOKEN, PAD_TOKEN]
        .into_iter()
        .filter(|token| vocab.contains_key(*token))
        .map(|token| AddedToken::from(token, true))
        .collect();
    tokenizer.add_special_tokens(&specials);

    Ok(tokenizer)
}

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Cursor over protobuf wire-format bytes
struct ProtoReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ProtoReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Next field number and wire type, `None` at the end of the message
    fn key(&mut self) -> Result<Option<(u64, u8)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.varint()?;
        Ok(Some((key >> 3, (key & 0x7) as u8)))
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos).context("truncated varint")?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint longer than 10 bytes")
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .context("field runs past the end of the message")?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = usize::try_from(self.varint()?).context("field length overflows")?;
        self.take(len)
    }

    fn fixed32(&mut self) -> Result<[u8; 4]> {
        let slice = self.take(4)?;
        Ok([slice[0], slice[1], slice[2], slice[3]])
    }

    fn skip(&mut self, wire_type: u8) -> Result<()> {
        match wire_type {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.take(8)?;
            }
            WIRE_LEN => {
                self.bytes()?;
            }
            WIRE_FIXED32 => {
                self.take(4)?;
            }
            other => bail!("unsupported protobuf wire type {other}"),
        }
        Ok(())
    }
}
