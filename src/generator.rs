//! Two-stage inpainting generator
//!
//! Stage 1 produces a coarse prediction from the masked image; its output is
//! pasted into the hole and refined by stage 2, which fuses a hallucination
//! branch with a contextual-attention branch. Both stage outputs are
//! returned so the loss can supervise each.

use ndarray::{concatenate, Axis};

use crate::attention::contextual_attention;
use crate::config::Padding;
use crate::error::{shape_mismatch, Result};
use crate::layers::{gated_conv, gated_deconv};
use crate::ops::{clip, composite, concat_image_ones_mask, resize_like, Activation};
use crate::params::Scope;
use crate::Tensor;

/// Options threaded through the generator build.
#[derive(Debug, Clone, Copy)]
pub struct NetOptions {
    pub padding: Padding,
    /// Activation on the last gated conv before contextual attention.
    pub attention_entry_activation: Activation,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            padding: Padding::Same,
            attention_entry_activation: Activation::Relu,
        }
    }
}

/// Generator forward result.
#[derive(Debug)]
pub struct GeneratorOutput {
    /// Coarse prediction, clipped to `[-1, 1]`.
    pub x_stage1: Tensor,
    /// Refined prediction, clipped to `[-1, 1]`.
    pub x_stage2: Tensor,
    /// Attention match offsets, visualization only.
    pub offsets: Tensor,
}

/// Build the two-stage inpaint network forward pass.
///
/// `x` is the incomplete image in `[-1, 1]`; `mask` marks the hole with 1.
/// Parameters register under the given scope (`conv1`..`conv17` for stage 1,
/// `xconv*`/`pmconv*`/`allconv*` for stage 2).
pub fn build_inpaint_net(
    scope: &mut Scope<'_>,
    x: &Tensor,
    mask: &Tensor,
    cnum: usize,
    opts: NetOptions,
) -> Result<GeneratorOutput> {
    let xin = x;
    let pad = opts.padding;
    let act = Activation::LeakyRelu;

    // stage 1
    let mut h = concat_image_ones_mask(x, mask)?;
    h = gated_conv(scope, &h, cnum, 5, 1, 1, act, pad, "conv1")?;
    h = gated_conv(scope, &h, 2 * cnum, 3, 2, 1, act, pad, "conv2_downsample")?;
    h = gated_conv(scope, &h, 2 * cnum, 3, 1, 1, act, pad, "conv3")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 2, 1, act, pad, "conv4_downsample")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "conv5")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "conv6")?;
    let mask_s = resize_like(mask, &h);
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 2, act, pad, "conv7_atrous")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 4, act, pad, "conv8_atrous")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 8, act, pad, "conv9_atrous")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 16, act, pad, "conv10_atrous")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "conv11")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "conv12")?;
    h = gated_deconv(scope, &h, 2 * cnum, pad, "conv13_upsample")?;
    h = gated_conv(scope, &h, 2 * cnum, 3, 1, 1, act, pad, "conv14")?;
    h = gated_deconv(scope, &h, cnum, pad, "conv15_upsample")?;
    h = gated_conv(scope, &h, cnum / 2, 3, 1, 1, act, pad, "conv16")?;
    h = gated_conv(scope, &h, 3, 3, 1, 1, Activation::Linear, pad, "conv17")?;
    clip(&mut h, -1.0, 1.0);
    let x_stage1 = h;

    // stage 2: paste the coarse result into the hole so the refinement
    // always sees ground truth outside the mask
    let pasted = composite(&x_stage1, xin, mask)?;
    let xnow = concat_image_ones_mask(&pasted, mask)?;

    // hallucination branch
    let mut hx = gated_conv(scope, &xnow, cnum, 5, 1, 1, act, pad, "xconv1")?;
    hx = gated_conv(scope, &hx, cnum, 3, 2, 1, act, pad, "xconv2_downsample")?;
    hx = gated_conv(scope, &hx, 2 * cnum, 3, 1, 1, act, pad, "xconv3")?;
    hx = gated_conv(scope, &hx, 2 * cnum, 3, 2, 1, act, pad, "xconv4_downsample")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 1, act, pad, "xconv5")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 1, act, pad, "xconv6")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 2, act, pad, "xconv7_atrous")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 4, act, pad, "xconv8_atrous")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 8, act, pad, "xconv9_atrous")?;
    hx = gated_conv(scope, &hx, 4 * cnum, 3, 1, 16, act, pad, "xconv10_atrous")?;
    let x_hallu = hx;

    // attention branch
    let mut ax = gated_conv(scope, &xnow, cnum, 5, 1, 1, act, pad, "pmconv1")?;
    ax = gated_conv(scope, &ax, cnum, 3, 2, 1, act, pad, "pmconv2_downsample")?;
    ax = gated_conv(scope, &ax, 2 * cnum, 3, 1, 1, act, pad, "pmconv3")?;
    ax = gated_conv(scope, &ax, 4 * cnum, 3, 2, 1, act, pad, "pmconv4_downsample")?;
    ax = gated_conv(scope, &ax, 4 * cnum, 3, 1, 1, act, pad, "pmconv5")?;
    ax = gated_conv(
        scope,
        &ax,
        4 * cnum,
        3,
        1,
        1,
        opts.attention_entry_activation,
        pad,
        "pmconv6",
    )?;
    let attn = contextual_attention(&ax, &ax, &mask_s, 3, 1, 2)?;
    ax = gated_conv(scope, &attn.features, 4 * cnum, 3, 1, 1, act, pad, "pmconv9")?;
    ax = gated_conv(scope, &ax, 4 * cnum, 3, 1, 1, act, pad, "pmconv10")?;
    let pm = ax;

    // joint decoder
    let mut h = concatenate(Axis(3), &[x_hallu.view(), pm.view()])
        .map_err(|_| shape_mismatch("stage2 branch concat", x_hallu.shape(), pm.shape()))?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "allconv11")?;
    h = gated_conv(scope, &h, 4 * cnum, 3, 1, 1, act, pad, "allconv12")?;
    h = gated_deconv(scope, &h, 2 * cnum, pad, "allconv13_upsample")?;
    h = gated_conv(scope, &h, 2 * cnum, 3, 1, 1, act, pad, "allconv14")?;
    h = gated_deconv(scope, &h, cnum, pad, "allconv15_upsample")?;
    h = gated_conv(scope, &h, cnum / 2, 3, 1, 1, act, pad, "allconv16")?;
    h = gated_conv(scope, &h, 3, 3, 1, 1, Activation::Linear, pad, "allconv17")?;
    clip(&mut h, -1.0, 1.0);
    let x_stage2 = h;

    Ok(GeneratorOutput {
        x_stage1,
        x_stage2,
        offsets: attn.offsets,
    })
}
