//! Nearest-neighbor spatial resizing

use crate::Tensor;

/// Nearest-neighbor resize to an explicit spatial size.
#[must_use]
pub fn resize_nearest(x: &Tensor, out_h: usize, out_w: usize) -> Tensor {
    let (batch, h, w, c) = x.dim();
    Tensor::from_shape_fn((batch, out_h, out_w, c), |(b, i, j, ch)| {
        let sy = (i * h / out_h).min(h - 1);
        let sx = (j * w / out_w).min(w - 1);
        x[[b, sy, sx, ch]]
    })
}

/// Double the spatial resolution (deconv upsampling step).
#[must_use]
pub fn upsample_2x(x: &Tensor) -> Tensor {
    let (_, h, w, _) = x.dim();
    resize_nearest(x, h * 2, w * 2)
}

/// Resize `x` to the spatial dims of `reference` (mask-to-feature matching).
#[must_use]
pub fn resize_like(x: &Tensor, reference: &Tensor) -> Tensor {
    let (_, h, w, _) = reference.dim();
    if x.dim().1 == h && x.dim().2 == w {
        return x.clone();
    }
    resize_nearest(x, h, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_upsample_replicates() {
        let x = Array4::from_shape_fn((1, 2, 2, 1), |(_, i, j, _)| (i * 2 + j) as f32);
        let y = upsample_2x(&x);
        assert_eq!(y.dim(), (1, 4, 4, 1));
        assert_eq!(y[[0, 0, 0, 0]], 0.0);
        assert_eq!(y[[0, 0, 1, 0]], 0.0);
        assert_eq!(y[[0, 1, 1, 0]], 0.0);
        assert_eq!(y[[0, 2, 2, 0]], 3.0);
        assert_eq!(y[[0, 3, 3, 0]], 3.0);
    }

    #[test]
    fn test_downscale_picks_nearest() {
        let x = Array4::from_shape_fn((1, 4, 4, 1), |(_, i, j, _)| (i * 4 + j) as f32);
        let y = resize_nearest(&x, 2, 2);
        assert_eq!(y[[0, 0, 0, 0]], 0.0);
        assert_eq!(y[[0, 1, 1, 0]], 10.0);
    }

    #[test]
    fn test_resize_like_noop_on_match() {
        let x = Array4::<f32>::zeros((1, 8, 8, 1));
        let r = Array4::<f32>::zeros((2, 8, 8, 3));
        let y = resize_like(&x, &r);
        assert_eq!(y.dim(), (1, 8, 8, 1));
    }

    #[test]
    fn test_binary_mask_survives_resize() {
        let mut x = Array4::<f32>::zeros((1, 8, 8, 1));
        for i in 2..6 {
            for j in 2..6 {
                x[[0, i, j, 0]] = 1.0;
            }
        }
        let y = resize_nearest(&x, 4, 4);
        assert!(y.iter().all(|v| *v == 0.0 || *v == 1.0));
    }
}
