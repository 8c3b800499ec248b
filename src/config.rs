//! Extractor selection and construction parameters.
//!
//! An [`ExtractorConfig`] names a registry key together with that
//! extractor's parameters. In JSON the key goes in a `"type"` field:
//!
//! ```json
//! { "type": "EnsembleHubert", "downsample": 2 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// HuBERT base checkpoint shared by the soft and plain extractors
pub const CHINESE_HUBERT_BASE: &str = "TencentGameMate/chinese-hubert-base";
pub const CHINESE_HUBERT_LARGE: &str = "TencentGameMate/chinese-hubert-large";
pub const HUBERT_LARGE_LL60K: &str = "facebook/hubert-large-ll60k";

/// Released soft-unit checkpoint (HuBERT base + 256-channel projection)
pub const SOFT_CHECKPOINT_URL: &str =
    "https://github.com/fishaudio/chinese-hubert-soft/releases/download/v1/chinese-hubert-soft-v1.ckpt";

/// Parameters of the gated soft-unit extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChineseHubertSoftOptions {
    /// Download the released soft checkpoint
    pub pretrained: bool,
    /// Local checkpoint; takes precedence over `pretrained`
    pub checkpoint_path: Option<PathBuf>,
    /// Channels kept per frame by the top-k gate
    pub gate_size: usize,
}

impl Default for ChineseHubertSoftOptions {
    fn default() -> Self {
        Self {
            pretrained: true,
            checkpoint_path: None,
            gate_size: 10,
        }
    }
}

/// Parameters of the single-model extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChineseHubertOptions {
    /// Hub model id or local model directory
    pub model: String,
    pub downsample: Option<usize>,
}

impl Default for ChineseHubertOptions {
    fn default() -> Self {
        Self {
            model: CHINESE_HUBERT_BASE.to_string(),
            downsample: None,
        }
    }
}

/// Parameters of the multi-model extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleHubertOptions {
    /// Hub model ids or local directories; order fixes the channel layout
    pub models: Vec<String>,
    pub downsample: Option<usize>,
}

impl Default for EnsembleHubertOptions {
    fn default() -> Self {
        Self {
            models: vec![
                CHINESE_HUBERT_LARGE.to_string(),
                HUBERT_LARGE_LL60K.to_string(),
            ],
            downsample: None,
        }
    }
}

/// Which extractor to build, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtractorConfig {
    ChineseHubertSoft(ChineseHubertSoftOptions),
    ChineseHubert(ChineseHubertOptions),
    EnsembleHubert(EnsembleHubertOptions),
}

impl ExtractorConfig {
    /// Registry key this config selects
    pub fn key(&self) -> &'static str {
        match self {
            ExtractorConfig::ChineseHubertSoft(_) => "ChineseHubertSoft",
            ExtractorConfig::ChineseHubert(_) => "ChineseHubert",
            ExtractorConfig::EnsembleHubert(_) => "EnsembleHubert",
        }
    }

    /// Default parameters for a registry key, `None` if the key is unknown.
    pub fn default_for(key: &str) -> Option<Self> {
        match key {
            "ChineseHubertSoft" => Some(Self::ChineseHubertSoft(Default::default())),
            "ChineseHubert" => Some(Self::ChineseHubert(Default::default())),
            "EnsembleHubert" => Some(Self::EnsembleHubert(Default::default())),
            _ => None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid extractor config: {e}")))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Replace the downsample factor, where the extractor has one.
    pub fn with_downsample(mut self, factor: Option<usize>) -> Result<Self> {
        match &mut self {
            ExtractorConfig::ChineseHubert(opts) => opts.downsample = factor,
            ExtractorConfig::EnsembleHubert(opts) => opts.downsample = factor,
            ExtractorConfig::ChineseHubertSoft(_) if factor.is_some() => {
                return Err(Error::Config(
                    "ChineseHubertSoft does not take a downsample factor".into(),
                ))
            }
            ExtractorConfig::ChineseHubertSoft(_) => {}
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let soft = ChineseHubertSoftOptions::default();
        assert!(soft.pretrained);
        assert_eq!(soft.gate_size, 10);

        let plain = ChineseHubertOptions::default();
        assert_eq!(plain.model, CHINESE_HUBERT_BASE);
        assert!(plain.downsample.is_none());

        let ensemble = EnsembleHubertOptions::default();
        assert_eq!(ensemble.models, vec![CHINESE_HUBERT_LARGE, HUBERT_LARGE_LL60K]);
    }

    #[test]
    fn test_parse_tagged() {
        let cfg = ExtractorConfig::from_json(r#"{"type": "EnsembleHubert", "downsample": 2}"#).unwrap();
        match &cfg {
            ExtractorConfig::EnsembleHubert(opts) => {
                assert_eq!(opts.downsample, Some(2));
                assert_eq!(opts.models.len(), 2);
            }
            other => panic!("unexpected config {other:?}"),
        }
        assert_eq!(cfg.key(), "EnsembleHubert");
    }

    #[test]
    fn test_parse_soft_with_checkpoint() {
        let cfg = ExtractorConfig::from_json(
            r#"{"type": "ChineseHubertSoft", "pretrained": false, "checkpoint_path": "soft.ckpt", "gate_size": 4}"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            ExtractorConfig::ChineseHubertSoft(ChineseHubertSoftOptions {
                pretrained: false,
                checkpoint_path: Some(PathBuf::from("soft.ckpt")),
                gate_size: 4,
            })
        );
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        assert!(matches!(
            ExtractorConfig::from_json(r#"{"type": "ContentVec"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_for_keys() {
        for key in ["ChineseHubertSoft", "ChineseHubert", "EnsembleHubert"] {
            assert_eq!(ExtractorConfig::default_for(key).unwrap().key(), key);
        }
        assert!(ExtractorConfig::default_for("Whisper").is_none());
    }

    #[test]
    fn test_with_downsample() {
        let cfg = ExtractorConfig::default_for("ChineseHubert")
            .unwrap()
            .with_downsample(Some(3))
            .unwrap();
        assert_eq!(
            cfg,
            ExtractorConfig::ChineseHubert(ChineseHubertOptions {
                downsample: Some(3),
                ..Default::default()
            })
        );
        assert!(ExtractorConfig::default_for("ChineseHubertSoft")
            .unwrap()
            .with_downsample(Some(2))
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extractor.json");
        std::fs::write(&path, r#"{"type": "ChineseHubert", "model": "local/dir"}"#).unwrap();
        let cfg = ExtractorConfig::from_file(&path).unwrap();
        assert_eq!(
            cfg,
            ExtractorConfig::ChineseHubert(ChineseHubertOptions {
                model: "local/dir".into(),
                downsample: None,
            })
        );
    }
}
