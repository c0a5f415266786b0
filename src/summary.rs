//! Visualization/summary sinks
//!
//! Pluggable backend for scalar losses and side-by-side image grids. The
//! model only produces summaries; persistence and display belong to the
//! backend.

use ndarray::{concatenate, s, Axis};

use crate::error::{shape_mismatch, Result};
use crate::ops::resize_nearest;
use crate::Tensor;

/// Receiver for training summaries.
pub trait SummarySink {
    /// Record a scalar value under a hierarchical name (`losses/l1_loss`).
    fn scalar(&mut self, name: &str, value: f32);

    /// Record an image batch, truncated to `max_out` items.
    fn images(&mut self, name: &str, batch: &Tensor, max_out: usize);
}

/// Discards everything.
pub struct NullSummary;

impl SummarySink for NullSummary {
    fn scalar(&mut self, _name: &str, _value: f32) {}
    fn images(&mut self, _name: &str, _batch: &Tensor, _max_out: usize) {}
}

/// Records summaries in memory for inspection (tests, dashboards).
#[derive(Default)]
pub struct InMemorySummary {
    pub scalars: Vec<(String, f32)>,
    pub images: Vec<(String, Tensor)>,
}

impl InMemorySummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent scalar recorded under `name`.
    #[must_use]
    pub fn last_scalar(&self, name: &str) -> Option<f32> {
        self.scalars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

impl SummarySink for InMemorySummary {
    fn scalar(&mut self, name: &str, value: f32) {
        self.scalars.push((name.to_string(), value));
    }

    fn images(&mut self, name: &str, batch: &Tensor, max_out: usize) {
        let keep = batch.dim().0.min(max_out.max(1));
        let truncated = batch.slice(s![0..keep, .., .., ..]).to_owned();
        self.images.push((name.to_string(), truncated));
    }
}

/// Concatenate same-shaped panels along the width axis into one grid image.
pub fn side_by_side(panels: &[&Tensor]) -> Result<Tensor> {
    let first = panels
        .first()
        .ok_or_else(|| shape_mismatch("empty image grid", &[], &[]))?;
    for panel in panels {
        if panel.dim() != first.dim() {
            return Err(shape_mismatch(
                "image grid panels",
                first.shape(),
                panel.shape(),
            ));
        }
    }
    let views: Vec<_> = panels.iter().map(|p| p.view()).collect();
    concatenate(Axis(2), &views)
        .map_err(|_| shape_mismatch("image grid concat", first.shape(), &[]))
}

/// Map an offset-flow field `[b, h, w, 2]` to a 3-channel color image in
/// `[-1, 1]`: hue encodes match direction, saturation encodes normalized
/// match distance.
#[must_use]
pub fn flow_to_color(offsets: &Tensor) -> Tensor {
    let (batch, h, w, _) = offsets.dim();
    let mut out = Tensor::zeros((batch, h, w, 3));
    for b in 0..batch {
        let mut max_mag = 0.0f32;
        for i in 0..h {
            for j in 0..w {
                let dy = offsets[[b, i, j, 0]];
                let dx = offsets[[b, i, j, 1]];
                max_mag = max_mag.max((dy * dy + dx * dx).sqrt());
            }
        }
        let scale = max_mag.max(1e-6);
        for i in 0..h {
            for j in 0..w {
                let dy = offsets[[b, i, j, 0]];
                let dx = offsets[[b, i, j, 1]];
                let mag = (dy * dy + dx * dx).sqrt() / scale;
                let hue = (dy.atan2(dx) + std::f32::consts::PI)
                    / (2.0 * std::f32::consts::PI);
                let (r, g, bl) = hsv_to_rgb(hue, mag, 1.0);
                out[[b, i, j, 0]] = r * 2.0 - 1.0;
                out[[b, i, j, 1]] = g * 2.0 - 1.0;
                out[[b, i, j, 2]] = bl * 2.0 - 1.0;
            }
        }
    }
    out
}

/// Upsample a flow color image to the visualization resolution.
#[must_use]
pub fn upsample_flow(flow: &Tensor, h: usize, w: usize) -> Tensor {
    resize_nearest(flow, h, w)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = (h.clamp(0.0, 1.0) * 6.0) % 6.0;
    let i = h6.floor() as i32;
    let f = h6 - i as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}
