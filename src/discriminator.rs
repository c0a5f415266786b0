//! Spectral-normalized patch discriminator
//!
//! Six stride-2 spectral-normalized convolutions mapping an image to a
//! spatial grid of unnormalized realism scores. There is no pooling to a
//! single scalar: each output cell judges the local patch, and spectral
//! normalization bounds every layer's Lipschitz constant for hinge-loss
//! stability.

use crate::error::Result;
use crate::layers::conv2d_sn;
use crate::params::Scope;
use crate::Tensor;

/// Build the SN-PatchGAN discriminator forward pass.
///
/// Binding the same scope with `BindMode::Reuse` shares parameters
/// bit-exactly between the real and generated passes of one training step.
pub fn build_sn_patch_gan_discriminator(
    scope: &mut Scope<'_>,
    x: &Tensor,
    cnum: usize,
) -> Result<Tensor> {
    let mut h = conv2d_sn(scope, x, cnum, 5, 2, "sn_conv1")?;
    h = conv2d_sn(scope, &h, 2 * cnum, 5, 2, "sn_conv2")?;
    h = conv2d_sn(scope, &h, 4 * cnum, 5, 2, "sn_conv3")?;
    h = conv2d_sn(scope, &h, 4 * cnum, 5, 2, "sn_conv4")?;
    h = conv2d_sn(scope, &h, 4 * cnum, 5, 2, "sn_conv5")?;
    h = conv2d_sn(scope, &h, 4 * cnum, 5, 2, "sn_conv6")?;
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{BindMode, ParameterStore};
    use ndarray::Array4;

    fn toy_batch() -> Tensor {
        Array4::from_shape_fn((2, 128, 128, 3), |(b, i, j, c)| {
            ((b + i * 3 + j * 5 + c) as f32 * 0.01).sin()
        })
    }

    #[test]
    fn test_score_grid_shape() {
        let x = toy_batch();
        let mut store = ParameterStore::with_seed(8);
        let mut scope = store.scope("discriminator", BindMode::Create);
        let scores = build_sn_patch_gan_discriminator(&mut scope, &x, 4).expect("discriminator");
        // 128 halved six times leaves a 2x2 patch grid
        assert_eq!(scores.dim(), (2, 2, 2, 16));
        assert!(scores.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reuse_bit_identical_scores() {
        let x = toy_batch();
        let mut store = ParameterStore::with_seed(8);
        let s1 = {
            let mut scope = store.scope("discriminator", BindMode::Create);
            build_sn_patch_gan_discriminator(&mut scope, &x, 4).expect("first")
        };
        let s2 = {
            let mut scope = store.scope("discriminator", BindMode::Reuse);
            build_sn_patch_gan_discriminator(&mut scope, &x, 4).expect("reuse")
        };
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_reuse_with_different_input_channels_fails() {
        let x = toy_batch();
        let mut store = ParameterStore::with_seed(8);
        {
            let mut scope = store.scope("discriminator", BindMode::Create);
            build_sn_patch_gan_discriminator(&mut scope, &x, 4).expect("first");
        }
        let wide = Array4::<f32>::zeros((1, 128, 128, 4));
        let mut scope = store.scope("discriminator", BindMode::Reuse);
        assert!(build_sn_patch_gan_discriminator(&mut scope, &wide, 4).is_err());
    }
}
