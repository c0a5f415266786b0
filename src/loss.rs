//! Reconstruction and adversarial losses

use std::collections::BTreeMap;

use crate::error::{shape_mismatch, Result};
use crate::Tensor;

/// Loss scalars by name, recomputed every step.
pub type Losses = BTreeMap<String, f32>;

fn mean(x: &Tensor) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    x.sum() / x.len() as f32
}

/// Mean absolute error between two same-shaped tensors.
pub fn l1_loss(a: &Tensor, b: &Tensor) -> Result<f32> {
    if a.dim() != b.dim() {
        return Err(shape_mismatch("l1 operands", a.shape(), b.shape()));
    }
    let mut total = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        total += (x - y).abs();
    }
    Ok(total / a.len().max(1) as f32)
}

/// Hinge GAN losses over patch score grids.
///
/// Returns `(g_loss, d_loss)`:
/// `d_loss = mean(relu(1 - d_real)) + mean(relu(1 + d_fake))`,
/// `g_loss = -mean(d_fake)`. The discriminator loss is non-negative by
/// construction.
#[must_use]
pub fn gan_hinge_loss(d_real: &Tensor, d_fake: &Tensor) -> (f32, f32) {
    let hinge_real = mean(&d_real.mapv(|v| (1.0 - v).max(0.0)));
    let hinge_fake = mean(&d_fake.mapv(|v| (1.0 + v).max(0.0)));
    let g_loss = -mean(d_fake);
    (g_loss, hinge_real + hinge_fake)
}
