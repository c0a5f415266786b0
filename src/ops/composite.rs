//! Mask application and compositing
//!
//! The mask is `[1, h, w, 1]` (or one per batch item) with 1 marking a pixel
//! to inpaint. It broadcasts over batch and channels; spatial dims must
//! agree exactly with the image.

use ndarray::{concatenate, Axis};

use crate::error::{shape_mismatch, Result};
use crate::Tensor;

fn check_mask(context: &str, x: &Tensor, mask: &Tensor) -> Result<()> {
    let (xb, xh, xw, _) = x.dim();
    let (mb, mh, mw, mc) = mask.dim();
    if mh != xh || mw != xw || mc != 1 || (mb != 1 && mb != xb) {
        return Err(shape_mismatch(context, &[xb, xh, xw], &[mb, mh, mw, mc]));
    }
    Ok(())
}

#[inline]
fn mask_at(mask: &Tensor, b: usize, i: usize, j: usize) -> f32 {
    let mb = mask.dim().0;
    mask[[b.min(mb - 1), i, j, 0]]
}

/// `predicted*mask + original*(1-mask)`: keep the prediction only inside the
/// hole, pass ground truth through everywhere else.
pub fn composite(predicted: &Tensor, original: &Tensor, mask: &Tensor) -> Result<Tensor> {
    if predicted.dim() != original.dim() {
        return Err(shape_mismatch(
            "composite operands",
            predicted.shape(),
            original.shape(),
        ));
    }
    check_mask("composite mask", predicted, mask)?;
    let mut out = predicted.clone();
    for ((b, i, j, c), v) in out.indexed_iter_mut() {
        let m = mask_at(mask, b, i, j);
        *v = *v * m + original[[b, i, j, c]] * (1.0 - m);
    }
    Ok(out)
}

/// Zero out the masked region: `x * (1 - mask)`.
pub fn erase(x: &Tensor, mask: &Tensor) -> Result<Tensor> {
    check_mask("erase mask", x, mask)?;
    let mut out = x.clone();
    for ((b, i, j, _), v) in out.indexed_iter_mut() {
        *v *= 1.0 - mask_at(mask, b, i, j);
    }
    Ok(out)
}

/// Generator input: the image concatenated with an all-ones channel and the
/// ones-masked channel, so the network sees which pixels were removed.
pub fn concat_image_ones_mask(x: &Tensor, mask: &Tensor) -> Result<Tensor> {
    check_mask("generator input mask", x, mask)?;
    let (batch, h, w, _) = x.dim();
    let ones = Tensor::ones((batch, h, w, 1));
    let mask_channel =
        Tensor::from_shape_fn((batch, h, w, 1), |(b, i, j, _)| mask_at(mask, b, i, j));
    concatenate(Axis(3), &[x.view(), ones.view(), mask_channel.view()])
        .map_err(|_| shape_mismatch("generator input concat", x.shape(), mask.shape()))
}
