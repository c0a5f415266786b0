//! Graph builders: training objective, validation, and serving
//!
//! Translates a raw `[0, 255]` image batch into the losses and parameter
//! partitions the external training driver consumes, and builds the
//! reuse-only forward passes for validation and serving.

use ndarray::s;

use crate::config::{GanKind, InpaintConfig, PrimaryStage};
use crate::discriminator::build_sn_patch_gan_discriminator;
use crate::error::{shape_mismatch, Result};
use crate::generator::{build_inpaint_net, GeneratorOutput, NetOptions};
use crate::loss::{gan_hinge_loss, l1_loss, Losses};
use crate::mask::MaskSampler;
use crate::ops::{composite, erase};
use crate::params::{BindMode, Parameter, ParameterStore};
use crate::summary::{flow_to_color, side_by_side, upsample_flow, SummarySink};
use crate::Tensor;

/// Name scope holding every generator parameter.
pub const GENERATOR_SCOPE: &str = "inpaint_net";
/// Name scope holding every discriminator parameter.
pub const DISCRIMINATOR_SCOPE: &str = "discriminator";

/// Inpainting model: resolved configuration tags plus the mask source.
///
/// Parameters live in a [`ParameterStore`] owned by the caller, so one model
/// can build training, validation, and serving passes over the same weights.
pub struct InpaintModel {
    config: InpaintConfig,
    gan: GanKind,
    primary: PrimaryStage,
    sampler: MaskSampler,
}

impl InpaintModel {
    /// Model with an OS-seeded mask sampler.
    pub fn new(config: InpaintConfig) -> Result<Self> {
        config.validate()?;
        let gan = config.gan_kind()?;
        let primary = config.primary_stage();
        let sampler = MaskSampler::new(config.mask.clone());
        Ok(Self {
            config,
            gan,
            primary,
            sampler,
        })
    }

    /// Model with a fixed mask-sampler seed for reproducible runs.
    pub fn with_seed(config: InpaintConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let gan = config.gan_kind()?;
        let primary = config.primary_stage();
        let sampler = MaskSampler::with_seed(config.mask.clone(), seed);
        Ok(Self {
            config,
            gan,
            primary,
            sampler,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &InpaintConfig {
        &self.config
    }

    fn net_options(&self) -> NetOptions {
        NetOptions {
            padding: self.config.padding,
            attention_entry_activation: self.config.attention_entry_activation,
        }
    }

    /// Stage output feeding the composited prediction, per the resolved
    /// [`PrimaryStage`] tag.
    #[must_use]
    pub fn primary_prediction<'a>(&self, out: &'a GeneratorOutput) -> &'a Tensor {
        match self.primary {
            PrimaryStage::Coarse => &out.x_stage1,
            PrimaryStage::Refined => &out.x_stage2,
        }
    }

    /// Build the training objective over a raw `[0, 255]` batch.
    ///
    /// Samples a mask, erases, inpaints, and composes the L1 and hinge
    /// adversarial losses. Returns the generator parameter set, the
    /// discriminator parameter set (disjoint by name scope), and the loss
    /// mapping (`l1_loss`, `g_loss`, `d_loss`); the external optimizer
    /// consumes the pairs.
    pub fn build_graph_with_losses(
        &mut self,
        store: &mut ParameterStore,
        batch: &Tensor,
        mode: BindMode,
        summary: &mut dyn SummarySink,
    ) -> Result<(Vec<Parameter>, Vec<Parameter>, Losses)> {
        let batch_pos = batch.mapv(|v| v / 127.5 - 1.0);
        let mask = self.sampler.generate();
        let batch_incomplete = erase(&batch_pos, &mask)?;

        let out = {
            let mut scope = store.scope(GENERATOR_SCOPE, mode);
            build_inpaint_net(
                &mut scope,
                &batch_incomplete,
                &mask,
                self.config.cnum,
                self.net_options(),
            )?
        };

        let batch_predicted = self.primary_prediction(&out);
        let batch_complete = composite(batch_predicted, &batch_incomplete, &mask)?;
        let coarse_complete = composite(&out.x_stage1, &batch_incomplete, &mask)?;

        let mut losses = Losses::new();
        let mut l1 = self.config.coarse_l1_alpha * l1_loss(&batch_pos, &out.x_stage1)?;
        l1 += l1_loss(&batch_pos, &out.x_stage2)?;
        losses.insert("l1_loss".to_string(), l1);
        summary.scalar("losses/l1_loss", l1);

        let (_, h, w, _) = batch_pos.dim();
        let flow = upsample_flow(&flow_to_color(&out.offsets), h, w);
        let grid = side_by_side(&[
            &batch_pos,
            &batch_incomplete,
            &coarse_complete,
            &batch_complete,
            &flow,
        ])?;
        summary.images(
            "raw_incomplete_predicted_complete",
            &grid,
            self.config.viz_max_out,
        );

        match self.gan {
            GanKind::SnPatchGan => {
                let d_fake = {
                    let mut scope = store.scope(DISCRIMINATOR_SCOPE, mode);
                    build_sn_patch_gan_discriminator(
                        &mut scope,
                        &batch_complete,
                        self.config.dis_cnum,
                    )?
                };
                let d_real = {
                    let mut scope = store.scope(DISCRIMINATOR_SCOPE, BindMode::Reuse);
                    build_sn_patch_gan_discriminator(
                        &mut scope,
                        &batch_pos,
                        self.config.dis_cnum,
                    )?
                };
                let (g_adv, d_loss) = gan_hinge_loss(&d_real, &d_fake);
                let g_loss = g_adv + l1;
                losses.insert("g_loss".to_string(), g_loss);
                losses.insert("d_loss".to_string(), d_loss);
                summary.scalar("losses/g_loss", g_loss);
            }
        }

        let g_vars = store.scope_parameters(GENERATOR_SCOPE);
        let d_vars = store.scope_parameters(DISCRIMINATOR_SCOPE);
        Ok((g_vars, d_vars, losses))
    }

    /// Reuse-only validation pass: sample a fresh mask, inpaint, emit the
    /// visualization grid, and return the completed batch.
    pub fn build_infer_graph(
        &mut self,
        store: &mut ParameterStore,
        batch: &Tensor,
        name: &str,
        summary: &mut dyn SummarySink,
    ) -> Result<Tensor> {
        let batch_pos = batch.mapv(|v| v / 127.5 - 1.0);
        let mask = self.sampler.generate();
        let batch_incomplete = erase(&batch_pos, &mask)?;

        let out = {
            let mut scope = store.scope(GENERATOR_SCOPE, BindMode::Reuse);
            build_inpaint_net(
                &mut scope,
                &batch_incomplete,
                &mask,
                self.config.cnum,
                self.net_options(),
            )?
        };

        let batch_predicted = self.primary_prediction(&out);
        let batch_complete = composite(batch_predicted, &batch_incomplete, &mask)?;
        let coarse_complete = composite(&out.x_stage1, &batch_incomplete, &mask)?;

        let (_, h, w, _) = batch_pos.dim();
        let flow = upsample_flow(&flow_to_color(&out.offsets), h, w);
        let grid = side_by_side(&[
            &batch_pos,
            &batch_incomplete,
            &coarse_complete,
            &batch_complete,
            &flow,
        ])?;
        summary.images(
            &format!("{name}_raw_incomplete_complete"),
            &grid,
            self.config.viz_max_out,
        );

        Ok(batch_complete)
    }

    /// Validation pass under a fixed graph name.
    pub fn build_static_infer_graph(
        &mut self,
        store: &mut ParameterStore,
        batch: &Tensor,
        name: &str,
        summary: &mut dyn SummarySink,
    ) -> Result<Tensor> {
        self.build_infer_graph(store, batch, name, summary)
    }

    /// Serving pass over a packed `[b, h, 2w, c]` input: left half is the
    /// raw `[0, 255]` image, right half encodes the mask as intensity
    /// (threshold 127.5). Always composites from the refined stage and
    /// returns `[b, h, w, c]` in `[-1, 1]`.
    pub fn build_server_graph(
        &self,
        store: &mut ParameterStore,
        packed: &Tensor,
        mode: BindMode,
    ) -> Result<Tensor> {
        let (_, _, packed_w, _) = packed.dim();
        if packed_w % 2 != 0 {
            return Err(shape_mismatch(
                "packed server input width",
                packed.shape(),
                &[packed_w / 2 * 2],
            ));
        }
        let w = packed_w / 2;
        let raw = packed.slice(s![.., .., 0..w, ..]).to_owned();
        // mask from the first batch item's first channel
        let mask = packed
            .slice(s![0..1, .., w..packed_w, 0..1])
            .to_owned()
            .mapv(|v| if v > 127.5 { 1.0 } else { 0.0 });

        let batch_pos = raw.mapv(|v| v / 127.5 - 1.0);
        let batch_incomplete = erase(&batch_pos, &mask)?;

        let out = {
            let mut scope = store.scope(GENERATOR_SCOPE, mode);
            build_inpaint_net(
                &mut scope,
                &batch_incomplete,
                &mask,
                self.config.cnum,
                self.net_options(),
            )?
        };

        composite(&out.x_stage2, &batch_incomplete, &mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Padding;
    use crate::mask::{MaskConfig, MaskShape};
    use crate::ops::Activation;
    use crate::summary::{InMemorySummary, NullSummary};
    use ndarray::Array4;

    fn toy_config() -> InpaintConfig {
        InpaintConfig {
            cnum: 4,
            dis_cnum: 4,
            padding: Padding::Same,
            pretrain_coarse_network: false,
            coarse_l1_alpha: 1.2,
            gan: "sn_patch_gan".to_string(),
            viz_max_out: 2,
            mask: MaskConfig {
                height: 32,
                width: 32,
                shape: MaskShape::Rectangle,
                margin: 2,
                ..Default::default()
            },
            attention_entry_activation: Activation::Relu,
            stop_gradient_after_coarse: false,
        }
    }

    fn toy_batch(n: usize) -> Tensor {
        Array4::from_shape_fn((n, 32, 32, 3), |(b, i, j, c)| {
            (((b * 13 + i * 7 + j * 3 + c) % 256) as f32)
        })
    }

    #[test]
    fn test_losses_present_and_finite() {
        let mut model = InpaintModel::with_seed(toy_config(), 1).expect("model");
        let mut store = ParameterStore::with_seed(1);
        let mut summary = InMemorySummary::new();
        let (g_vars, d_vars, losses) = model
            .build_graph_with_losses(&mut store, &toy_batch(2), BindMode::Create, &mut summary)
            .expect("graph");

        for key in ["l1_loss", "g_loss", "d_loss"] {
            let v = losses.get(key).unwrap_or_else(|| panic!("missing {key}"));
            assert!(v.is_finite(), "{key} not finite");
        }
        assert!(losses["d_loss"] >= 0.0);
        assert!(!g_vars.is_empty());
        assert!(!d_vars.is_empty());
        assert!(summary.last_scalar("losses/l1_loss").is_some());
        assert!(summary.last_scalar("losses/g_loss").is_some());
        // one grid image batch recorded, truncated to viz_max_out
        assert_eq!(summary.images.len(), 1);
        assert_eq!(summary.images[0].1.dim().0, 2);
    }

    #[test]
    fn test_parameter_scopes_disjoint() {
        let mut model = InpaintModel::with_seed(toy_config(), 1).expect("model");
        let mut store = ParameterStore::with_seed(1);
        let (g_vars, d_vars, _) = model
            .build_graph_with_losses(
                &mut store,
                &toy_batch(1),
                BindMode::Create,
                &mut NullSummary,
            )
            .expect("graph");
        for g in &g_vars {
            assert!(g.name().starts_with("inpaint_net/"));
            assert!(d_vars.iter().all(|d| d.name() != g.name()));
        }
        for d in &d_vars {
            assert!(d.name().starts_with("discriminator/"));
        }
    }

    #[test]
    fn test_primary_prediction_selection() {
        let out = GeneratorOutput {
            x_stage1: Array4::from_elem((1, 4, 4, 3), 0.1),
            x_stage2: Array4::from_elem((1, 4, 4, 3), 0.9),
            offsets: Array4::zeros((1, 1, 1, 2)),
        };

        let refined = InpaintModel::with_seed(toy_config(), 1).expect("model");
        assert_eq!(refined.primary_prediction(&out), &out.x_stage2);

        let coarse_config = InpaintConfig {
            pretrain_coarse_network: true,
            ..toy_config()
        };
        let coarse = InpaintModel::with_seed(coarse_config, 1).expect("model");
        assert_eq!(coarse.primary_prediction(&out), &out.x_stage1);
    }

    #[test]
    fn test_infer_graph_requires_trained_parameters() {
        let mut model = InpaintModel::with_seed(toy_config(), 1).expect("model");
        let mut store = ParameterStore::with_seed(1);
        // no training pass has registered parameters yet
        let err = model
            .build_infer_graph(&mut store, &toy_batch(1), "val", &mut NullSummary)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::InpaintError::ParameterMissing { .. }
        ));
    }

    #[test]
    fn test_infer_after_training_in_range() {
        let mut model = InpaintModel::with_seed(toy_config(), 1).expect("model");
        let mut store = ParameterStore::with_seed(1);
        model
            .build_graph_with_losses(
                &mut store,
                &toy_batch(1),
                BindMode::Create,
                &mut NullSummary,
            )
            .expect("training graph");

        let mut summary = InMemorySummary::new();
        let complete = model
            .build_infer_graph(&mut store, &toy_batch(1), "val", &mut summary)
            .expect("infer");
        assert_eq!(complete.dim(), (1, 32, 32, 3));
        assert!(complete.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(summary.images.len(), 1);
        assert!(summary.images[0].0.starts_with("val_"));
    }

    #[test]
    fn test_unsupported_gan_rejected_at_construction() {
        let config = InpaintConfig {
            gan: "lsgan".to_string(),
            ..toy_config()
        };
        assert!(InpaintModel::new(config).is_err());
    }

    #[test]
    fn test_batch_mask_size_mismatch_rejected() {
        let mut model = InpaintModel::with_seed(toy_config(), 1).expect("model");
        let mut store = ParameterStore::with_seed(1);
        // 16x16 batch against the 32x32 mask policy
        let batch = Array4::<f32>::zeros((1, 16, 16, 3));
        let err = model
            .build_graph_with_losses(&mut store, &batch, BindMode::Create, &mut NullSummary)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::InpaintError::ShapeMismatch { .. }
        ));
    }
}
