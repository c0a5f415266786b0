//! NHWC convolution via im2col and one matrix product per call
//!
//! Kernels are `[kh, kw, in_channels, out_channels]`. Dilation ("atrous")
//! convolution spreads the kernel taps by `rate` without touching the
//! parameter count.

use ndarray::{Array1, Array2, Array4};

use crate::config::Padding;
use crate::error::{shape_mismatch, Result};
use crate::Tensor;

/// Output geometry of a convolution: spatial dims plus the top/left padding
/// that centers the kernel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConvGeometry {
    pub out_h: usize,
    pub out_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

pub(crate) fn conv_geometry(
    h: usize,
    w: usize,
    kh: usize,
    kw: usize,
    stride: usize,
    rate: usize,
    padding: Padding,
) -> Result<ConvGeometry> {
    let ekh = (kh - 1) * rate + 1;
    let ekw = (kw - 1) * rate + 1;
    match padding {
        Padding::Same => {
            let out_h = h.div_ceil(stride);
            let out_w = w.div_ceil(stride);
            let pad_h = ((out_h - 1) * stride + ekh).saturating_sub(h);
            let pad_w = ((out_w - 1) * stride + ekw).saturating_sub(w);
            Ok(ConvGeometry {
                out_h,
                out_w,
                pad_top: pad_h / 2,
                pad_left: pad_w / 2,
            })
        }
        Padding::Valid => {
            if h < ekh || w < ekw {
                return Err(shape_mismatch("valid convolution input", &[h, w], &[ekh, ekw]));
            }
            Ok(ConvGeometry {
                out_h: (h - ekh) / stride + 1,
                out_w: (w - ekw) / stride + 1,
                pad_top: 0,
                pad_left: 0,
            })
        }
    }
}

/// Gather overlapping `kh x kw` windows into a `[batch*out_h*out_w, kh*kw*c]`
/// matrix. Out-of-bounds taps read as zero.
pub(crate) fn im2col(
    x: &Tensor,
    kh: usize,
    kw: usize,
    stride: usize,
    rate: usize,
    geom: ConvGeometry,
) -> Array2<f32> {
    let (batch, h, w, c) = x.dim();
    let patch_len = kh * kw * c;
    let mut cols = Array2::<f32>::zeros((batch * geom.out_h * geom.out_w, patch_len));
    for b in 0..batch {
        for oy in 0..geom.out_h {
            let y0 = (oy * stride) as isize - geom.pad_top as isize;
            for ox in 0..geom.out_w {
                let x0 = (ox * stride) as isize - geom.pad_left as isize;
                let row = (b * geom.out_h + oy) * geom.out_w + ox;
                let mut col = 0;
                for ky in 0..kh {
                    let sy = y0 + (ky * rate) as isize;
                    let in_y = sy >= 0 && (sy as usize) < h;
                    for kx in 0..kw {
                        let sx = x0 + (kx * rate) as isize;
                        if in_y && sx >= 0 && (sx as usize) < w {
                            for ch in 0..c {
                                cols[[row, col + ch]] = x[[b, sy as usize, sx as usize, ch]];
                            }
                        }
                        col += c;
                    }
                }
            }
        }
    }
    cols
}

/// 2-D convolution over an NHWC tensor.
pub fn conv2d(
    x: &Tensor,
    kernel: &Array4<f32>,
    bias: Option<&Array1<f32>>,
    stride: usize,
    rate: usize,
    padding: Padding,
) -> Result<Tensor> {
    let (batch, h, w, cin) = x.dim();
    let (kh, kw, kcin, cout) = kernel.dim();
    if kcin != cin {
        return Err(shape_mismatch(
            "conv2d input channels",
            &[batch, h, w, cin],
            &[kh, kw, kcin, cout],
        ));
    }
    if let Some(b) = bias {
        if b.len() != cout {
            return Err(shape_mismatch("conv2d bias", &[b.len()], &[cout]));
        }
    }

    let geom = conv_geometry(h, w, kh, kw, stride, rate, padding)?;
    let cols = im2col(x, kh, kw, stride, rate, geom);

    // [kh*kw*cin, cout], rows ordered to match the im2col gather order
    let patch_len = kh * kw * cin;
    let mut wm = Array2::<f32>::zeros((patch_len, cout));
    for ky in 0..kh {
        for kx in 0..kw {
            for c in 0..cin {
                let r = (ky * kw + kx) * cin + c;
                for o in 0..cout {
                    wm[[r, o]] = kernel[[ky, kx, c, o]];
                }
            }
        }
    }

    let mut out = cols.dot(&wm);
    if let Some(b) = bias {
        for ((_, o), v) in out.indexed_iter_mut() {
            *v += b[o];
        }
    }

    let (values, _) = out.into_raw_vec_and_offset();
    Ok(
        Tensor::from_shape_vec((batch, geom.out_h, geom.out_w, cout), values)
            .expect("rows match output geometry"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array4;

    fn unit_kernel(k: usize, cin: usize) -> Array4<f32> {
        // single output channel, 1.0 at every tap
        Array4::from_elem((k, k, cin, 1), 1.0)
    }

    #[test]
    fn test_identity_1x1() {
        let x = Array4::from_shape_fn((1, 3, 3, 1), |(_, i, j, _)| (i * 3 + j) as f32);
        let k = Array4::from_elem((1, 1, 1, 1), 1.0);
        let y = conv2d(&x, &k, None, 1, 1, Padding::Same).expect("conv");
        assert_eq!(y, x);
    }

    #[test]
    fn test_same_padding_shape() {
        let x = Array4::<f32>::zeros((2, 7, 7, 3));
        let k = unit_kernel(3, 3);
        let y = conv2d(&x, &k, None, 2, 1, Padding::Same).expect("conv");
        assert_eq!(y.dim(), (2, 4, 4, 1));
    }

    #[test]
    fn test_valid_padding_shape() {
        let x = Array4::<f32>::zeros((1, 7, 7, 1));
        let k = unit_kernel(3, 1);
        let y = conv2d(&x, &k, None, 1, 1, Padding::Valid).expect("conv");
        assert_eq!(y.dim(), (1, 5, 5, 1));
    }

    #[test]
    fn test_box_sum_interior() {
        let x = Array4::from_elem((1, 5, 5, 1), 1.0);
        let k = unit_kernel(3, 1);
        let y = conv2d(&x, &k, None, 1, 1, Padding::Same).expect("conv");
        // interior window sums 9 ones, corners only 4
        assert_abs_diff_eq!(y[[0, 2, 2, 0]], 9.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[[0, 0, 0, 0]], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dilated_receptive_field() {
        // rate 2 over a 5x5 input reads the 4 corner + center taps
        let mut x = Array4::<f32>::zeros((1, 5, 5, 1));
        x[[0, 0, 0, 0]] = 1.0;
        x[[0, 4, 4, 0]] = 1.0;
        x[[0, 2, 2, 0]] = 1.0;
        let k = unit_kernel(3, 1);
        let y = conv2d(&x, &k, None, 1, 2, Padding::Same).expect("conv");
        assert_abs_diff_eq!(y[[0, 2, 2, 0]], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bias_added() {
        let x = Array4::<f32>::zeros((1, 2, 2, 1));
        let k = unit_kernel(1, 1);
        let b = Array1::from_vec(vec![0.5]);
        let y = conv2d(&x, &k, Some(&b), 1, 1, Padding::Same).expect("conv");
        assert!(y.iter().all(|v| (*v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_channel_mismatch_fails() {
        let x = Array4::<f32>::zeros((1, 4, 4, 2));
        let k = unit_kernel(3, 3);
        assert!(conv2d(&x, &k, None, 1, 1, Padding::Same).is_err());
    }

    #[test]
    fn test_valid_too_small_fails() {
        let x = Array4::<f32>::zeros((1, 2, 2, 1));
        let k = unit_kernel(3, 1);
        assert!(conv2d(&x, &k, None, 1, 1, Padding::Valid).is_err());
    }
}
