//! Configuration management for pdf-translate
//!
//! Handles model resolution settings, output layout and persistence of user
//! preferences in `~/.pdf-translate/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Default segment length in characters (also the token limit per segment)
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Device preference for compute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically detect best available device (GPU if available, else CPU)
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// Force Metal GPU (macOS Apple Silicon)
    Metal,
    /// Force CUDA GPU (NVIDIA)
    Cuda,
}

impl DevicePreference {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Metal => "metal",
            Self::Cuda => "cuda",
        }
    }

    /// Get all available options
    pub fn all() -> Vec<Self> {
        vec![Self::Auto, Self::Cpu, Self::Metal, Self::Cuda]
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::all().iter().map(|d| d.name()).collect();
                format!("unknown device '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Built-in PDF fonts usable for the output document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BuiltinFontChoice {
    #[default]
    Helvetica,
    TimesRoman,
    Courier,
}

impl BuiltinFontChoice {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::TimesRoman => "Times-Roman",
            Self::Courier => "Courier",
        }
    }
}

/// Where and how the translation model is resolved on the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// Organisation publishing the bilingual models
    pub vendor: String,
    /// Model family prefix, joined with the language pair
    pub family: String,
    /// Hub revision (branch, tag or commit)
    pub revision: String,
    /// Repo holding converted tokenizer.json files for models that ship only
    /// SentencePiece files. Unset means tokenizers are built from the model
    /// repo's own vocabulary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_repo: Option<String>,
    /// File name of a converted tokenizer in `tokenizer_repo`; `{model}` is
    /// replaced by the model name and `{side}` by `source` or `target`
    pub tokenizer_template: String,
    /// Override for the hub cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            vendor: "Helsinki-NLP".to_string(),
            family: "opus-mt".to_string(),
            revision: "main".to_string(),
            tokenizer_repo: None,
            tokenizer_template: "{model}-{side}.json".to_string(),
            cache_dir: None,
        }
    }
}

impl ModelSettings {
    /// Converted tokenizer file name for one side of a model.
    ///
    /// `model_name` is the repo name without the vendor, so every model gets
    /// its own files.
    pub fn tokenizer_file(&self, model_name: &str, side: &str) -> String {
        self.tokenizer_template
            .replace("{model}", model_name)
            .replace("{side}", side)
    }
}

/// Output document layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSettings {
    pub font: BuiltinFontChoice,
    /// Font size in points
    pub font_size: f32,
    /// Distance between baselines
    pub line_height_mm: f32,
    /// Margin on every side of the page
    pub margin_mm: f32,
    /// Maximum characters per line before wrapping
    pub wrap_width: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            font: BuiltinFontChoice::default(),
            font_size: 12.0,
            line_height_mm: 5.0,
            margin_mm: 10.0,
            wrap_width: 90,
        }
    }
}

/// pdf-translate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device preference (auto, cpu, metal, cuda)
    #[serde(default)]
    pub device: DevicePreference,
    /// Segment length in characters and token limit per segment
    #[serde(default = "default_max_length")]
    pub max_length: NonZeroUsize,
    /// Version of config schema (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

fn default_version() -> u32 {
    1
}

fn default_max_length() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_LENGTH).unwrap_or(NonZeroUsize::MIN)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            max_length: default_max_length(),
            version: 1,
            model: ModelSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.pdf-translate/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(app_dir()?.join("config.toml"))
    }

    /// Load config from the default path, falling back to defaults.
    ///
    /// Without a home directory there is no default path; defaults are used.
    pub fn load() -> Result<Self> {
        Self::load_or_default(Self::path())
    }

    fn load_or_default(path: Result<PathBuf>) -> Result<Self> {
        match path {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "no config path, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load config from `path`, or return defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the base directory path (~/.pdf-translate)
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".pdf-translate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_length.get(), 512);
        assert_eq!(config.device, DevicePreference::Auto);
        assert_eq!(config.model.vendor, "Helsinki-NLP");
        assert_eq!(config.model.family, "opus-mt");
        assert_eq!(config.output.font, BuiltinFontChoice::Helvetica);
    }

    #[test]
    fn test_tokenizer_file_template() {
        let settings = ModelSettings::default();
        assert_eq!(
            settings.tokenizer_file("opus-mt-de-en", "source"),
            "opus-mt-de-en-source.json"
        );
        assert_eq!(
            settings.tokenizer_file("opus-mt-fr-en", "target"),
            "opus-mt-fr-en-target.json"
        );
        assert!(settings.tokenizer_repo.is_none());
    }

    #[test]
    fn test_partial_model_table_fills_defaults() {
        let parsed: Config =
            toml::from_str("[model]\ntokenizer_repo = \"someone/marian-tokenizers\"\n").unwrap();
        assert_eq!(parsed.model.tokenizer_repo.as_deref(), Some("someone/marian-tokenizers"));
        assert_eq!(parsed.model.vendor, "Helsinki-NLP");
        assert_eq!(parsed.model.tokenizer_template, "{model}-{side}.json");
    }

    #[test]
    fn test_device_from_str() {
        assert_eq!("CUDA".parse::<DevicePreference>(), Ok(DevicePreference::Cuda));
        assert_eq!("cpu".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.device = DevicePreference::Cpu;
        config.output.wrap_width = 70;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device, DevicePreference::Cpu);
        assert_eq!(parsed.output, config.output);
        assert_eq!(parsed.model, config.model);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("max_length = 256\n").unwrap();
        assert_eq!(parsed.max_length.get(), 256);
        assert_eq!(parsed.model, ModelSettings::default());
        assert_eq!(parsed.version, 1);
    }

    #[test]
    fn test_zero_max_length_rejected() {
        assert!(toml::from_str::<Config>("max_length = 0\n").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.model.revision = "refs/pr/4".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.model.revision, "refs/pr/4");
    }

    #[test]
    fn test_no_home_dir_gives_defaults() {
        let loaded =
            Config::load_or_default(Err(anyhow::anyhow!("Could not determine home directory")))
                .unwrap();
        assert_eq!(loaded.max_length.get(), DEFAULT_MAX_LENGTH);
        assert_eq!(loaded.model, ModelSettings::default());
    }

    #[test]
    fn test_load_or_default_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_length = 128\n").unwrap();

        let loaded = Config::load_or_default(Ok(path)).unwrap();
        assert_eq!(loaded.max_length.get(), 128);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.max_length.get(), DEFAULT_MAX_LENGTH);
    }
}
