//! Candle-based MarianMT translator.
//!
//! Resolves a bilingual model for a language pair on the Hugging Face hub
//! and runs it locally with `candle`. No external API calls.

use super::sentencepiece::{marian_tokenizer, read_pieces, read_vocab};
use super::{LanguagePair, SegmentTranslator};
use crate::config::{DevicePreference, ModelSettings};
use crate::error::{Error, Result};
use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::marian::{Config as MarianConfig, MTModel};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::Path;
use tokenizers::Tokenizer;

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const PTH_WEIGHTS_FILE: &str = "pytorch_model.bin";
const TOKENIZER_FILE: &str = "tokenizer.json";
const VOCAB_FILE: &str = "vocab.json";
const TARGET_VOCAB_FILE: &str = "target_vocab.json";
const SOURCE_SPM_FILE: &str = "source.spm";
const TARGET_SPM_FILE: &str = "target.spm";

// Greedy decoding never samples, the seed only satisfies the API
const SEED: u64 = 299792458;

/// Hub identifier of a bilingual model, `<vendor>/<family>-<src>-<tgt>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId(String);

impl ModelId {
    /// Build the identifier for a language pair.
    ///
    /// Codes that cannot appear in a hub repo name are rejected up front,
    /// since no model can exist for them.
    pub fn for_pair(settings: &ModelSettings, pair: &LanguagePair) -> Result<Self> {
        let id = format!(
            "{}/{}-{}-{}",
            settings.vendor, settings.family, pair.source, pair.target
        );

        for code in [&pair.source, &pair.target] {
            if !is_valid_code(code) {
                return Err(Error::ModelNotFound {
                    model_id: id,
                    message: format!("'{}' is not a valid language code", code),
                });
            }
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repo name without the vendor
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Pick the compute device for a preference
pub fn select_device(preference: DevicePreference) -> anyhow::Result<Device> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::new_cuda(0).context("CUDA device unavailable")?,
        DevicePreference::Metal => Device::new_metal(0).context("Metal device unavailable")?,
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0)?
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0)?
            } else {
                Device::Cpu
            }
        }
    };
    Ok(device)
}

/// How a model is loaded
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub device: DevicePreference,
    /// Token limit per segment, end-of-sentence token included
    pub max_tokens: NonZeroUsize,
    /// Show hub download progress
    pub show_progress: bool,
}

/// Local MarianMT model with its source and target tokenizers
pub struct MarianTranslator {
    model_id: ModelId,
    model: MTModel,
    config: MarianConfig,
    source_tokenizer: Tokenizer,
    target_tokenizer: Tokenizer,
    device: Device,
    max_tokens: usize,
}

impl MarianTranslator {
    /// Resolve and load the model for `pair`.
    ///
    /// A model id whose `config.json` cannot be fetched has no model behind
    /// it and yields [`Error::ModelNotFound`]. Anything failing after that is
    /// an [`Error::ModelLoad`].
    pub fn load(pair: &LanguagePair, settings: &ModelSettings, options: &LoadOptions) -> Result<Self> {
        let model_id = ModelId::for_pair(settings, pair)?;
        let load_error = |message: String| Error::ModelLoad {
            model_id: model_id.to_string(),
            message,
        };

        let device = select_device(options.device).map_err(|e| load_error(format!("{e:#}")))?;
        tracing::info!(model = %model_id, device = ?device, "resolving model");

        let mut builder = ApiBuilder::new().with_progress(options.show_progress);
        if let Some(dir) = &settings.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| load_error(format!("failed to create Hugging Face API: {e}")))?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            settings.revision.clone(),
        ));

        let config_path = repo.get(CONFIG_FILE).map_err(|e| Error::ModelNotFound {
            model_id: model_id.to_string(),
            message: e.to_string(),
        })?;
        let config = read_marian_config(&config_path).map_err(|e| load_error(format!("{e:#}")))?;

        let (source_tokenizer, target_tokenizer) =
            load_tokenizers(&api, &repo, settings, &model_id, &config)
                .map_err(|e| load_error(format!("{e:#}")))?;
        let vb = load_weights(&repo, &device).map_err(|e| load_error(format!("{e:#}")))?;

        let translator = Self::from_parts(
            model_id.clone(),
            config,
            vb,
            source_tokenizer,
            target_tokenizer,
            device,
            options.max_tokens,
        )
        .map_err(|e| load_error(format!("failed to build model: {e}")))?;

        tracing::info!(model = %model_id, max_tokens = translator.max_tokens, "model loaded");
        Ok(translator)
    }

    /// Assemble a translator from already-resolved parts.
    fn from_parts(
        model_id: ModelId,
        config: MarianConfig,
        vb: VarBuilder,
        source_tokenizer: Tokenizer,
        target_tokenizer: Tokenizer,
        device: Device,
        max_tokens: NonZeroUsize,
    ) -> candle_core::Result<Self> {
        let model = MTModel::new(&config, vb)?;

        // Position embeddings cap how many tokens the encoder accepts
        let max_tokens = max_tokens.get().min(config.max_position_embeddings).max(1);

        Ok(Self {
            model_id,
            model,
            config,
            source_tokenizer,
            target_tokenizer,
            device,
            max_tokens,
        })
    }

    /// Tokenize a segment, truncated to the token limit and EOS-terminated.
    fn encode(&self, segment: &str) -> anyhow::Result<Vec<u32>> {
        let encoding = self
            .source_tokenizer
            .encode(segment, true)
            .map_err(anyhow::Error::msg)?;

        let eos = self.config.eos_token_id;
        let mut ids = encoding.get_ids().to_vec();
        if ids.last() == Some(&eos) {
            ids.pop();
        }
        // Anything past the limit is silently dropped
        ids.truncate(self.max_tokens - 1);
        ids.push(eos);
        Ok(ids)
    }

    /// Greedy decoding with the KV cache; returns generated ids without
    /// the decoder start and EOS tokens.
    fn generate(&mut self, input_ids: &[u32]) -> candle_core::Result<Vec<u32>> {
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_xs = self.model.encoder().forward(&input, 0)?;

        let mut logits_processor = LogitsProcessor::new(SEED, None, None);
        let mut token_ids = vec![self.config.decoder_start_token_id];
        let mut generated = Vec::new();

        for index in 0..self.config.max_position_embeddings {
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let decoder_input = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self.model.decode(&decoder_input, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;

            let token = logits_processor.sample(&logits)?;
            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
            generated.push(token);
        }

        Ok(generated)
    }
}

impl SegmentTranslator for MarianTranslator {
    fn model_id(&self) -> &str {
        self.model_id.as_str()
    }

    fn translate_segment(&mut self, segment: &str) -> anyhow::Result<String> {
        let input_ids = self.encode(segment)?;
        let generated = self.generate(&input_ids);
        // Segments never share decoder state
        self.model.reset_kv_cache();
        let generated = generated.context("generation failed")?;

        self.target_tokenizer
            .decode(&generated, true)
            .map_err(anyhow::Error::msg)
    }
}

/// Parse a transformers-style Marian `config.json`.
///
/// Older exports omit a few keys candle requires; they get the values
/// transformers assumes.
fn read_marian_config(path: &Path) -> anyhow::Result<MarianConfig> {
    let raw = std::fs::read_to_string(path).context("Failed to read config.json")?;
    parse_marian_config(&raw)
}

fn parse_marian_config(raw: &str) -> anyhow::Result<MarianConfig> {
    let mut value: serde_json::Value =
        serde_json::from_str(raw).context("config.json is not valid JSON")?;

    if let Some(obj) = value.as_object_mut() {
        let eos = obj.get("eos_token_id").cloned();
        obj.entry("share_encoder_decoder_embeddings")
            .or_insert(serde_json::Value::Bool(true));
        obj.entry("use_cache").or_insert(serde_json::Value::Bool(true));
        obj.entry("is_encoder_decoder")
            .or_insert(serde_json::Value::Bool(true));
        if let Some(eos) = eos {
            obj.entry("forced_eos_token_id").or_insert(eos);
        }
    }

    serde_json::from_value(value).context("config.json is not a Marian config")
}

/// Weights from `model.safetensors`, or `pytorch_model.bin` for repos that
/// only carry the PyTorch export.
fn load_weights(repo: &ApiRepo, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    match repo.get(WEIGHTS_FILE) {
        Ok(path) => {
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
                .context("Failed to map safetensors weights")?;
            Ok(vb)
        }
        Err(e) => {
            tracing::debug!(error = %e, "no {WEIGHTS_FILE}, trying {PTH_WEIGHTS_FILE}");
            let path = repo.get(PTH_WEIGHTS_FILE).with_context(|| {
                format!("Failed to get {WEIGHTS_FILE} ({e}) or {PTH_WEIGHTS_FILE}")
            })?;
            VarBuilder::from_pth(&path, DType::F32, device)
                .context("Failed to load PyTorch weights")
        }
    }
}

/// Tokenizers for the source and target side.
///
/// Tried in order:
/// 1. `tokenizer.json` in the model repo, serving both sides
/// 2. `{model}-{side}` files from the configured tokenizer repo
/// 3. tokenizers built from the model repo's `.spm` files and vocabulary
///
/// Whatever is found must cover exactly the model's vocabulary.
fn load_tokenizers(
    api: &Api,
    repo: &ApiRepo,
    settings: &ModelSettings,
    model_id: &ModelId,
    config: &MarianConfig,
) -> anyhow::Result<(Tokenizer, Tokenizer)> {
    let (source, target) = if let Ok(path) = repo.get(TOKENIZER_FILE) {
        let tokenizer = Tokenizer::from_file(&path).map_err(anyhow::Error::msg)?;
        (tokenizer.clone(), tokenizer)
    } else if let Some(tokenizer_repo) = &settings.tokenizer_repo {
        converted_tokenizers(api, tokenizer_repo, settings, model_id)?
    } else {
        tracing::debug!(model = %model_id, "building tokenizers from SentencePiece files");
        sentencepiece_tokenizers(repo)?
    };

    check_vocab_size(&source, config.vocab_size, "source")?;
    check_vocab_size(
        &target,
        config.decoder_vocab_size.unwrap_or(config.vocab_size),
        "target",
    )?;
    Ok((source, target))
}

fn converted_tokenizers(
    api: &Api,
    tokenizer_repo: &str,
    settings: &ModelSettings,
    model_id: &ModelId,
) -> anyhow::Result<(Tokenizer, Tokenizer)> {
    let repo = api.repo(Repo::with_revision(
        tokenizer_repo.to_string(),
        RepoType::Model,
        "main".to_string(),
    ));

    let fetch = |side: &str| -> anyhow::Result<Tokenizer> {
        let file = settings.tokenizer_file(model_id.name(), side);
        let path = repo
            .get(&file)
            .with_context(|| format!("Failed to get {} from {}", file, tokenizer_repo))?;
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {}", file, e))
    };

    Ok((fetch("source")?, fetch("target")?))
}

fn sentencepiece_tokenizers(repo: &ApiRepo) -> anyhow::Result<(Tokenizer, Tokenizer)> {
    let fetch = |file: &str| {
        repo.get(file)
            .with_context(|| format!("Failed to get {file}"))
    };

    let vocab = read_vocab(&fetch(VOCAB_FILE)?)?;
    // Only models with separate vocabularies ship a target vocabulary
    let target_vocab = match repo.get(TARGET_VOCAB_FILE) {
        Ok(path) => read_vocab(&path)?,
        Err(_) => vocab.clone(),
    };

    let side = |file: &str, vocab: &HashMap<String, u32>| -> anyhow::Result<Tokenizer> {
        let path = fetch(file)?;
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {file}"))?;
        let pieces = read_pieces(&bytes)
            .with_context(|| format!("{file} is not a SentencePiece model"))?;
        marian_tokenizer(&pieces, vocab)
    };

    Ok((side(SOURCE_SPM_FILE, &vocab)?, side(TARGET_SPM_FILE, &target_vocab)?))
}

/// Reject tokenizers whose ids do not line up with the model's embeddings.
fn check_vocab_size(tokenizer: &Tokenizer, expected: usize, side: &str) -> anyhow::Result<()> {
    let actual = tokenizer.get_vocab_size(true);
    if actual != expected {
        anyhow::bail!(
            "{side} tokenizer has {actual} entries but the model vocabulary has {expected}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Shape of Helsinki-NLP/opus-mt-de-en's config.json, trimmed to the
    // fields that matter and without the keys older exports lack.
    const OPUS_CONFIG: &str = r#"{
        "activation_function": "swish",
        "architectures": ["MarianMTModel"],
        "d_model": 512,
        "decoder_attention_heads": 8,
        "decoder_ffn_dim": 2048,
        "decoder_layers": 6,
        "decoder_start_token_id": 58100,
        "encoder_attention_heads": 8,
        "encoder_ffn_dim": 2048,
        "encoder_layers": 6,
        "eos_token_id": 0,
        "max_position_embeddings": 512,
        "model_type": "marian",
        "pad_token_id": 58100,
        "scale_embedding": true,
        "vocab_size": 58101
    }"#;

    fn pair(src: &str, tgt: &str) -> LanguagePair {
        LanguagePair::new(src, tgt)
    }

    // Just enough of a Marian model to run on the CPU in milliseconds
    const TINY_CONFIG: &str = r#"{
        "activation_function": "swish",
        "d_model": 4,
        "decoder_attention_heads": 2,
        "decoder_ffn_dim": 8,
        "decoder_layers": 1,
        "decoder_start_token_id": 2,
        "encoder_attention_heads": 2,
        "encoder_ffn_dim": 8,
        "encoder_layers": 1,
        "eos_token_id": 0,
        "max_position_embeddings": 8,
        "pad_token_id": 2,
        "scale_embedding": true,
        "vocab_size": 7
    }"#;

    const TINY_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"</s>": 0, "<unk>": 1, "<pad>": 2, "hallo": 3, "welt": 4, "hello": 5, "world": 6},
            "unk_token": "<unk>"
        }
    }"#;

    fn tiny_tokenizer() -> Tokenizer {
        Tokenizer::from_bytes(TINY_TOKENIZER).unwrap()
    }

    /// Randomly initialised tiny model whose output bias makes `favored`
    /// the greedy pick at every step
    fn tiny_translator(max_tokens: usize, favored: u32) -> MarianTranslator {
        let config = parse_marian_config(TINY_CONFIG).unwrap();
        let mut varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model_id = ModelId::for_pair(&ModelSettings::default(), &pair("de", "en")).unwrap();

        let translator = MarianTranslator::from_parts(
            model_id,
            config.clone(),
            vb,
            tiny_tokenizer(),
            tiny_tokenizer(),
            Device::Cpu,
            NonZeroUsize::new(max_tokens).unwrap(),
        )
        .unwrap();

        let mut bias = vec![0f32; config.vocab_size];
        bias[favored as usize] = 1000.0;
        let bias = Tensor::from_vec(bias, (1, config.vocab_size), &Device::Cpu).unwrap();
        varmap.set_one("final_logits_bias", bias).unwrap();

        translator
    }

    #[test]
    fn test_encode_appends_eos() {
        let translator = tiny_translator(8, 5);
        assert_eq!(translator.encode("hallo welt").unwrap(), vec![3, 4, 0]);
    }

    #[test]
    fn test_encode_truncates_to_token_limit() {
        let translator = tiny_translator(4, 5);
        let ids = translator.encode("hallo welt hallo welt hallo welt").unwrap();
        assert_eq!(ids, vec![3, 4, 3, 0]);
    }

    #[test]
    fn test_token_limit_capped_by_positions() {
        let translator = tiny_translator(512, 5);
        assert_eq!(translator.max_tokens, 8);

        let long = "hallo ".repeat(50);
        let ids = translator.encode(&long).unwrap();
        assert_eq!(ids.len(), 8);
        assert_eq!(ids.last(), Some(&0));
    }

    #[test]
    fn test_generation_stops_at_eos() {
        let mut translator = tiny_translator(8, 0);
        assert_eq!(translator.translate_segment("hallo welt").unwrap(), "");
    }

    #[test]
    fn test_generation_capped_at_positions() {
        let mut translator = tiny_translator(8, 5);
        let out = translator.translate_segment("hallo welt").unwrap();
        assert_eq!(out, vec!["hello"; 8].join(" "));
    }

    #[test]
    fn test_special_tokens_dropped_from_output() {
        // <pad> is not EOS, so generation runs to the cap
        let mut translator = tiny_translator(8, 2);
        assert_eq!(translator.translate_segment("hallo welt").unwrap(), "");
    }

    #[test]
    fn test_consecutive_segments_are_independent() {
        let mut translator = tiny_translator(8, 6);
        let first = translator.translate_segment("hallo welt").unwrap();
        let middle = translator.translate_segment("welt hallo welt hallo").unwrap();
        let again = translator.translate_segment("hallo welt").unwrap();

        assert_eq!(first, vec!["world"; 8].join(" "));
        assert_eq!(middle, first);
        assert_eq!(again, first);
    }

    #[test]
    fn test_vocab_size_must_match_model() {
        let tokenizer = tiny_tokenizer();
        assert!(check_vocab_size(&tokenizer, 7, "source").is_ok());

        let err = check_vocab_size(&tokenizer, 58101, "target").unwrap_err();
        assert!(err.to_string().contains("target tokenizer has 7 entries"));
    }

    #[test]
    fn test_model_name_strips_vendor() {
        let id = ModelId::for_pair(&ModelSettings::default(), &pair("de", "en")).unwrap();
        assert_eq!(id.name(), "opus-mt-de-en");
        assert_eq!(
            ModelSettings::default().tokenizer_file(id.name(), "source"),
            "opus-mt-de-en-source.json"
        );
    }

    #[test]
    fn test_model_id_default_pattern() {
        let id = ModelId::for_pair(&ModelSettings::default(), &pair("de", "en")).unwrap();
        assert_eq!(id.as_str(), "Helsinki-NLP/opus-mt-de-en");
    }

    #[test]
    fn test_model_id_custom_vendor() {
        let settings = ModelSettings {
            vendor: "acme".to_string(),
            family: "mt".to_string(),
            ..ModelSettings::default()
        };
        let id = ModelId::for_pair(&settings, &pair("en", "ROMANCE")).unwrap();
        assert_eq!(id.to_string(), "acme/mt-en-ROMANCE");
    }

    #[test]
    fn test_invalid_codes_have_no_model() {
        for (src, tgt) in [("", "en"), ("de", "e n"), ("de/x", "en"), ("de", "en-US")] {
            let err = ModelId::for_pair(&ModelSettings::default(), &pair(src, tgt)).unwrap_err();
            assert!(matches!(err, Error::ModelNotFound { .. }), "{src}-{tgt}");
        }
    }

    #[test]
    fn test_parse_config_fills_missing_keys() {
        let config = parse_marian_config(OPUS_CONFIG).unwrap();
        assert_eq!(config.eos_token_id, 0);
        assert_eq!(config.forced_eos_token_id, 0);
        assert_eq!(config.decoder_start_token_id, 58100);
        assert_eq!(config.max_position_embeddings, 512);
        assert!(config.share_encoder_decoder_embeddings);
    }

    #[test]
    fn test_parse_config_rejects_non_marian() {
        assert!(parse_marian_config(r#"{"model_type": "bert"}"#).is_err());
        assert!(parse_marian_config("not json").is_err());
    }

    #[test]
    fn test_cpu_device() {
        assert!(select_device(DevicePreference::Cpu).unwrap().is_cpu());
    }

    #[test]
    #[ignore = "downloads from the Hugging Face hub"]
    fn test_unsupported_pair_is_model_not_found() {
        let options = LoadOptions {
            device: DevicePreference::Cpu,
            max_tokens: NonZeroUsize::new(512).unwrap(),
            show_progress: false,
        };
        let err = MarianTranslator::load(&pair("xx", "yy"), &ModelSettings::default(), &options)
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModelNotFound { .. }));
    }
}
