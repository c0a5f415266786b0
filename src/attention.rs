//! Contextual attention
//!
//! Lets the refinement stage copy texture from distant unmasked regions:
//! every foreground location attends over background patches by cosine
//! similarity, and the output feature is the attention-weighted sum of the
//! matched patches, scattered back at the extraction stride. Patch
//! extraction and matching run as strided im2col matrices and one matrix
//! product per image, not per-pixel loops.

use ndarray::{Array2, Array3, Axis};

use crate::config::Padding;
use crate::error::{shape_mismatch, Result};
use crate::ops::conv::{conv_geometry, im2col, ConvGeometry};
use crate::ops::resize_nearest;
use crate::Tensor;

/// Fixed softmax temperature over similarity scores.
pub const SOFTMAX_SCALE: f32 = 10.0;

/// Stability epsilon added to the softmax denominator, so degenerate masks
/// (no valid background patch) degrade to a uniform, finite distribution.
pub const SOFTMAX_EPS: f32 = 1e-8;

/// Floor on background-patch norms in the cosine similarity.
const PATCH_NORM_EPS: f32 = 1e-4;

/// Pre-softmax bias pushing invalid candidates to ~zero weight.
const MASKED_SCORE_BIAS: f32 = -1e4;

/// Attention result: output features plus the visualization-only offset
/// field (`[batch, h, w, 2]`, per-location `[dy, dx]` to the argmax-matched
/// background patch, in full-resolution pixels).
#[derive(Debug)]
pub struct AttentionOutput {
    pub features: Tensor,
    pub offsets: Tensor,
}

/// Contextual attention over foreground queries `f` and background
/// keys/values `b` (usually the same tensor).
///
/// `mask` marks background regions that may not be matched (1 = hole); it
/// must share `f`'s spatial dims. `rate` controls background patch
/// granularity: matching runs at `1/rate` resolution while reconstruction
/// scatters `2*rate` patches at full resolution.
pub fn contextual_attention(
    f: &Tensor,
    b: &Tensor,
    mask: &Tensor,
    ksize: usize,
    stride: usize,
    rate: usize,
) -> Result<AttentionOutput> {
    if f.dim() != b.dim() {
        return Err(shape_mismatch("attention foreground/background", f.shape(), b.shape()));
    }
    let (batch, h, w, c) = f.dim();
    let (mb, mh, mw, mc) = mask.dim();
    if mh != h || mw != w || mc != 1 || (mb != 1 && mb != batch) {
        return Err(shape_mismatch("attention mask", f.shape(), mask.shape()));
    }

    let hl = (h / rate).max(1);
    let wl = (w / rate).max(1);
    let fl = resize_nearest(f, hl, wl);
    let bl = resize_nearest(b, hl, wl);
    let ml = resize_nearest(mask, hl, wl);

    // query windows: stride 1 over the downscaled foreground
    let q_geom = conv_geometry(hl, wl, ksize, ksize, 1, 1, Padding::Same)?;
    let queries = im2col(&fl, ksize, ksize, 1, 1, q_geom);
    let locations = q_geom.out_h * q_geom.out_w;

    // candidate background patches at the extraction stride
    let p_geom = conv_geometry(hl, wl, ksize, ksize, stride, 1, Padding::Same)?;
    let patches = im2col(&bl, ksize, ksize, stride, 1, p_geom);
    let candidates = p_geom.out_h * p_geom.out_w;

    // candidate validity: a patch containing any masked pixel is excluded
    let mask_patches = im2col(&ml, ksize, ksize, stride, 1, p_geom);
    let valid: Vec<Vec<bool>> = (0..mb)
        .map(|mi| {
            (0..candidates)
                .map(|p| {
                    mask_patches
                        .row(mi * candidates + p)
                        .iter()
                        .all(|v| *v <= 0.5)
                })
                .collect()
        })
        .collect();

    // full-resolution reconstruction patches, one per candidate
    let k2 = 2 * rate;
    let raw_geom = ConvGeometry {
        out_h: p_geom.out_h,
        out_w: p_geom.out_w,
        pad_top: rate / 2,
        pad_left: rate / 2,
    };
    let raw = im2col(b, k2, k2, rate * stride, 1, raw_geom);

    let mut features = Tensor::zeros((batch, h, w, c));
    let mut offsets_low = Tensor::zeros((batch, q_geom.out_h, q_geom.out_w, 2));
    let counts = scatter_counts(h, w, q_geom.out_h, q_geom.out_w, rate, k2);

    for bi in 0..batch {
        let mi = bi.min(mb - 1);
        let q = slice_rows(&queries, bi, locations);
        let p = slice_rows(&patches, bi, candidates);
        let attn = attention_weights(&q, &p, &valid[mi]);

        record_offsets(&attn, &p_geom, &q_geom, stride, &mut offsets_low, bi);

        // weighted sum of raw patches, scattered at the query anchors
        let raw_b = slice_rows(&raw, bi, candidates);
        let contrib = attn.dot(&raw_b);
        scatter_add(&mut features, &counts, &contrib, bi, q_geom.out_w, rate, k2, c);
    }

    let mut offsets = resize_nearest(&offsets_low, h, w);
    offsets.mapv_inplace(|v| v * rate as f32);

    Ok(AttentionOutput { features, offsets })
}

fn slice_rows(m: &Array2<f32>, index: usize, rows: usize) -> Array2<f32> {
    m.slice(ndarray::s![index * rows..(index + 1) * rows, ..])
        .to_owned()
}

/// Cosine-similarity softmax over valid candidates.
fn attention_weights(
    queries: &Array2<f32>,
    patches: &Array2<f32>,
    valid: &[bool],
) -> Array2<f32> {
    // normalize candidate patches so the matmul yields cosine similarity
    let mut normed = patches.clone();
    for mut row in normed.axis_iter_mut(Axis(0)) {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt().max(PATCH_NORM_EPS);
        row.mapv_inplace(|v| v / norm);
    }

    let mut scores = queries.dot(&normed.t());
    for ((_, p), v) in scores.indexed_iter_mut() {
        *v *= SOFTMAX_SCALE;
        if !valid[p] {
            *v += MASKED_SCORE_BIAS;
        }
    }

    // row softmax with a stability epsilon in the denominator
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum() + SOFTMAX_EPS;
        row.mapv_inplace(|v| v / sum);
    }
    scores
}

fn record_offsets(
    attn: &Array2<f32>,
    p_geom: &ConvGeometry,
    q_geom: &ConvGeometry,
    stride: usize,
    offsets: &mut Tensor,
    bi: usize,
) {
    for (l, row) in attn.axis_iter(Axis(0)).enumerate() {
        let best = argmax(&row);
        let (pi, pj) = (best / p_geom.out_w, best % p_geom.out_w);
        let (qi, qj) = (l / q_geom.out_w, l % q_geom.out_w);
        offsets[[bi, qi, qj, 0]] = (pi * stride) as f32 - qi as f32;
        offsets[[bi, qi, qj, 1]] = (pj * stride) as f32 - qj as f32;
    }
}

fn argmax(row: &ndarray::ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_v = f32::NEG_INFINITY;
    for (i, v) in row.iter().enumerate() {
        if *v > best_v {
            best_v = *v;
            best = i;
        }
    }
    best
}

/// Per-pixel overlap counts of the scatter windows (independent of batch and
/// channel), used to normalize the transposed-convolution accumulation.
fn scatter_counts(
    h: usize,
    w: usize,
    qh: usize,
    qw: usize,
    rate: usize,
    k2: usize,
) -> Array3<f32> {
    let mut counts = Array3::<f32>::zeros((h, w, 1));
    let pad = (rate / 2) as isize;
    for i in 0..qh {
        let y0 = (i * rate) as isize - pad;
        for j in 0..qw {
            let x0 = (j * rate) as isize - pad;
            for ky in 0..k2 {
                let sy = y0 + ky as isize;
                if sy < 0 || sy >= h as isize {
                    continue;
                }
                for kx in 0..k2 {
                    let sx = x0 + kx as isize;
                    if sx < 0 || sx >= w as isize {
                        continue;
                    }
                    counts[[sy as usize, sx as usize, 0]] += 1.0;
                }
            }
        }
    }
    counts.mapv_inplace(|v| v.max(1.0));
    counts
}

#[allow(clippy::too_many_arguments)]
fn scatter_add(
    out: &mut Tensor,
    counts: &Array3<f32>,
    contrib: &Array2<f32>,
    bi: usize,
    qw: usize,
    rate: usize,
    k2: usize,
    c: usize,
) {
    let (_, h, w, _) = out.dim();
    let pad = (rate / 2) as isize;
    for (l, row) in contrib.axis_iter(Axis(0)).enumerate() {
        let (qi, qj) = (l / qw, l % qw);
        let y0 = (qi * rate) as isize - pad;
        let x0 = (qj * rate) as isize - pad;
        for ky in 0..k2 {
            let sy = y0 + ky as isize;
            if sy < 0 || sy >= h as isize {
                continue;
            }
            for kx in 0..k2 {
                let sx = x0 + kx as isize;
                if sx < 0 || sx >= w as isize {
                    continue;
                }
                let base = (ky * k2 + kx) * c;
                for ch in 0..c {
                    out[[bi, sy as usize, sx as usize, ch]] +=
                        row[base + ch] / counts[[sy as usize, sx as usize, 0]];
                }
            }
        }
    }
}
