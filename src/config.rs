//! Model architecture configs and the built-in checkpoint table.
//!
//! Architecture configs travel as JSON dictionaries (the form the custom
//! model field and the persisted record use):
//!
//! ```json
//! {"dim": 1024, "depth": 22, "heads": 16, "ff_mult": 2, "text_dim": 512, "conv_layers": 4}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::StudioError;

// ─────────────────────────────────────────────────────────────────────────────
// Architecture config
// ─────────────────────────────────────────────────────────────────────────────

/// Transformer backbone a checkpoint was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backbone {
    /// Diffusion transformer (F5-TTS and custom checkpoints).
    DiT,
    /// Flat U-Net transformer (E2-TTS).
    UNetT,
}

/// Deserialised architecture config.  Unknown keys are rejected so a typo
/// surfaces as a config error instead of a silently ignored field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Hidden size.
    pub dim: u32,

    /// Number of transformer blocks.
    pub depth: u32,

    /// Attention heads per block.
    pub heads: u32,

    /// Feed-forward expansion factor.
    pub ff_mult: f32,

    /// Text embedding width (DiT only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_dim: Option<u32>,

    /// ConvNeXt layers in the text encoder (DiT only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_layers: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_mask_padding: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe_attn_head: Option<u32>,
}

impl ModelConfig {
    /// Parse and validate a JSON config dictionary.
    pub fn from_json(json: &str) -> Result<Self, StudioError> {
        let cfg: ModelConfig = serde_json::from_str(json.trim())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), StudioError> {
        for (field, value) in [("dim", self.dim), ("depth", self.depth), ("heads", self.heads)] {
            if value == 0 {
                return Err(StudioError::ZeroField { field });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        // Only plain numbers and bools: serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// F5-TTS v1 base.
    pub fn f5_v1_base() -> Self {
        Self {
            dim: 1024,
            depth: 22,
            heads: 16,
            ff_mult: 2.0,
            text_dim: Some(512),
            conv_layers: Some(4),
            text_mask_padding: None,
            pe_attn_head: None,
        }
    }

    /// F5-TTS base as first released (no text mask padding, one PE head).
    pub fn f5_base() -> Self {
        Self {
            text_mask_padding: Some(false),
            pe_attn_head: Some(1),
            ..Self::f5_v1_base()
        }
    }

    /// Smaller F5 variant used by several community fine-tunes.
    pub fn f5_small() -> Self {
        Self {
            dim: 768,
            depth: 18,
            heads: 12,
            ..Self::f5_base()
        }
    }

    /// E2-TTS base.
    pub fn e2_base() -> Self {
        Self {
            dim: 1024,
            depth: 24,
            heads: 16,
            ff_mult: 4.0,
            text_dim: None,
            conv_layers: None,
            text_mask_padding: Some(false),
            pe_attn_head: Some(1),
        }
    }

    /// Config presets offered for the custom model field, default first.
    pub fn custom_presets() -> Vec<Self> {
        vec![Self::f5_v1_base(), Self::f5_base(), Self::f5_small()]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkpoint table
// ─────────────────────────────────────────────────────────────────────────────

pub const F5_TTS_NAME: &str = "F5-TTS_v1";
pub const E2_TTS_NAME: &str = "E2-TTS";
pub const CUSTOM_NAME: &str = "Custom";

pub const F5_TTS_CKPT: &str = "hf://SWivid/F5-TTS/F5TTS_v1_Base/model_1250000.safetensors";
pub const F5_TTS_VOCAB: &str = "hf://SWivid/F5-TTS/F5TTS_v1_Base/vocab.txt";
pub const E2_TTS_CKPT: &str = "hf://SWivid/E2-TTS/E2TTS_Base/model_1200000.safetensors";

/// Everything needed to load one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSpec {
    pub backbone: Backbone,
    /// Local path or `hf://` locator.
    pub checkpoint: String,
    /// Local path or `hf://` locator; empty selects the engine's default vocab.
    pub vocab: String,
    pub config: ModelConfig,
}

impl LoadSpec {
    pub fn f5_tts() -> Self {
        Self {
            backbone: Backbone::DiT,
            checkpoint: F5_TTS_CKPT.into(),
            vocab: F5_TTS_VOCAB.into(),
            config: ModelConfig::f5_v1_base(),
        }
    }

    pub fn e2_tts() -> Self {
        Self {
            backbone: Backbone::UNetT,
            checkpoint: E2_TTS_CKPT.into(),
            vocab: String::new(),
            config: ModelConfig::e2_base(),
        }
    }
}

/// The three user-editable custom model fields, kept as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomModelSpec {
    pub checkpoint: String,
    pub vocab: String,
    /// Architecture config as a JSON dictionary.
    pub config: String,
}

impl Default for CustomModelSpec {
    fn default() -> Self {
        Self {
            checkpoint: F5_TTS_CKPT.into(),
            vocab: F5_TTS_VOCAB.into(),
            config: ModelConfig::f5_v1_base().to_json(),
        }
    }
}

impl CustomModelSpec {
    pub fn new(checkpoint: &str, vocab: &str, config: &str) -> Self {
        Self { checkpoint: checkpoint.into(), vocab: vocab.into(), config: config.into() }
    }

    /// Validate the fields and turn them into a [`LoadSpec`].
    pub fn to_load_spec(&self) -> Result<LoadSpec, StudioError> {
        let checkpoint = self.checkpoint.trim();
        if checkpoint.is_empty() {
            return Err(StudioError::EmptyCheckpoint);
        }
        Ok(LoadSpec {
            backbone: Backbone::DiT,
            checkpoint: checkpoint.to_string(),
            vocab: self.vocab.trim().to_string(),
            config: ModelConfig::from_json(&self.config)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_config() {
        let cfg = ModelConfig::from_json(
            r#"{"dim": 1024, "depth": 22, "heads": 16, "ff_mult": 2, "text_dim": 512, "conv_layers": 4}"#,
        )
        .unwrap();
        assert_eq!(cfg, ModelConfig::f5_v1_base());
    }

    #[test]
    fn test_parse_optional_flags() {
        let cfg = ModelConfig::from_json(
            r#"{"dim":768,"depth":18,"heads":12,"ff_mult":2,"text_dim":512,"text_mask_padding":false,"conv_layers":4,"pe_attn_head":1}"#,
        )
        .unwrap();
        assert_eq!(cfg, ModelConfig::f5_small());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(matches!(
            ModelConfig::from_json("{dim: 1024"),
            Err(StudioError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_unknown_key_is_error() {
        assert!(ModelConfig::from_json(r#"{"dim":1,"depth":1,"heads":1,"ff_mult":2,"colour":"red"}"#).is_err());
    }

    #[test]
    fn test_zero_heads_is_error() {
        assert!(matches!(
            ModelConfig::from_json(r#"{"dim":1024,"depth":22,"heads":0,"ff_mult":2}"#),
            Err(StudioError::ZeroField { field: "heads" })
        ));
    }

    #[test]
    fn test_json_round_trip_skips_absent_fields() {
        let json = ModelConfig::e2_base().to_json();
        assert!(!json.contains("text_dim"));
        assert_eq!(ModelConfig::from_json(&json).unwrap(), ModelConfig::e2_base());
    }

    #[test]
    fn test_custom_spec_requires_checkpoint() {
        let spec = CustomModelSpec::new("  ", "", &ModelConfig::f5_v1_base().to_json());
        assert!(matches!(spec.to_load_spec(), Err(StudioError::EmptyCheckpoint)));
    }

    #[test]
    fn test_custom_spec_trims_locators() {
        let spec = CustomModelSpec::new(" /ckpt/model.pt ", " vocab.txt\n", &ModelConfig::f5_v1_base().to_json());
        let load = spec.to_load_spec().unwrap();
        assert_eq!(load.checkpoint, "/ckpt/model.pt");
        assert_eq!(load.vocab, "vocab.txt");
        assert_eq!(load.backbone, Backbone::DiT);
    }
}
