//! Model configuration

use serde::{Deserialize, Serialize};

use crate::error::{InpaintError, Result};
use crate::mask::MaskConfig;
use crate::ops::Activation;

/// Convolution padding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Zero-pad so stride-1 convolutions preserve spatial size.
    Same,
    /// No padding; output shrinks by the kernel extent.
    Valid,
}

/// Which stage output feeds the composited prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStage {
    /// Stage-1 output (coarse-network pretraining schedules).
    Coarse,
    /// Stage-2 refined output (full training and inference).
    Refined,
}

/// Adversarial objective variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GanKind {
    /// Spectral-normalized patch discriminator with hinge loss.
    SnPatchGan,
}

/// Configuration for the inpainting model.
///
/// The string-valued `gan` field and the `pretrain_coarse_network` flag are
/// the external configuration surface; both are resolved once into
/// [`GanKind`] / [`PrimaryStage`] tags at model construction and never
/// re-checked per pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InpaintConfig {
    /// Generator channel multiplier.
    pub cnum: usize,
    /// Discriminator channel multiplier.
    pub dis_cnum: usize,
    /// Convolution padding mode for the generator.
    pub padding: Padding,
    /// Supervise and composite from the coarse stage only.
    pub pretrain_coarse_network: bool,
    /// Weight on the stage-1 L1 reconstruction term.
    pub coarse_l1_alpha: f32,
    /// Adversarial objective selector; `"sn_patch_gan"` is recognized.
    pub gan: String,
    /// Maximum images emitted per visualization grid.
    pub viz_max_out: usize,
    /// Mask sampling policy.
    pub mask: MaskConfig,
    /// Activation on the last gated conv feeding contextual attention.
    pub attention_entry_activation: Activation,
    /// Detach the refinement stage from coarse-stage gradients. Recorded for
    /// the training driver; forward numerics are unaffected.
    pub stop_gradient_after_coarse: bool,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            cnum: 24,
            dis_cnum: 64,
            padding: Padding::Same,
            pretrain_coarse_network: false,
            coarse_l1_alpha: 1.2,
            gan: "sn_patch_gan".to_string(),
            viz_max_out: 10,
            mask: MaskConfig::default(),
            attention_entry_activation: Activation::Relu,
            stop_gradient_after_coarse: false,
        }
    }
}

impl InpaintConfig {
    /// Resolve the `gan` selector into its enum tag.
    pub fn gan_kind(&self) -> Result<GanKind> {
        match self.gan.as_str() {
            "sn_patch_gan" => Ok(GanKind::SnPatchGan),
            other => Err(InpaintError::UnsupportedConfiguration(format!(
                "gan variant `{other}`"
            ))),
        }
    }

    /// Resolve the pretraining flag into its enum tag.
    #[must_use]
    pub fn primary_stage(&self) -> PrimaryStage {
        if self.pretrain_coarse_network {
            PrimaryStage::Coarse
        } else {
            PrimaryStage::Refined
        }
    }

    /// Reject configurations the architecture cannot realize.
    pub fn validate(&self) -> Result<()> {
        if self.cnum < 2 || self.cnum % 2 != 0 {
            return Err(InpaintError::UnsupportedConfiguration(format!(
                "cnum must be even and >= 2, got {}",
                self.cnum
            )));
        }
        if self.dis_cnum == 0 {
            return Err(InpaintError::UnsupportedConfiguration(
                "dis_cnum must be nonzero".to_string(),
            ));
        }
        if self.coarse_l1_alpha < 0.0 {
            return Err(InpaintError::UnsupportedConfiguration(format!(
                "coarse_l1_alpha must be non-negative, got {}",
                self.coarse_l1_alpha
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InpaintConfig::default();
        assert_eq!(config.cnum, 24);
        assert_eq!(config.dis_cnum, 64);
        assert_eq!(config.gan_kind().expect("recognized"), GanKind::SnPatchGan);
        assert_eq!(config.primary_stage(), PrimaryStage::Refined);
        config.validate().expect("default config is valid");
    }

    #[test]
    fn test_pretrain_selects_coarse() {
        let config = InpaintConfig {
            pretrain_coarse_network: true,
            ..Default::default()
        };
        assert_eq!(config.primary_stage(), PrimaryStage::Coarse);
    }

    #[test]
    fn test_unknown_gan_rejected() {
        let config = InpaintConfig {
            gan: "wgan_gp".to_string(),
            ..Default::default()
        };
        let err = config.gan_kind().unwrap_err();
        assert!(matches!(err, InpaintError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn test_odd_cnum_rejected() {
        let config = InpaintConfig {
            cnum: 7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = InpaintConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: InpaintConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.cnum, config.cnum);
        assert_eq!(back.gan, config.gan);
    }
}
