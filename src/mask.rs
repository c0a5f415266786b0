//! Random hole-mask sampling
//!
//! Produces `[1, h, w, 1]` binary masks, 1 marking a pixel to inpaint.
//! Rectangles are sized as a fraction of the image side; free-form masks are
//! joined thick brush strokes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::Tensor;

/// Hole shape family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskShape {
    Rectangle,
    FreeForm,
}

/// Mask sampling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    /// Image height the masks are sampled for.
    pub height: usize,
    /// Image width the masks are sampled for.
    pub width: usize,
    pub shape: MaskShape,
    /// Minimum rectangle side as a fraction of the image side.
    pub min_frac: f32,
    /// Maximum rectangle side as a fraction of the image side.
    pub max_frac: f32,
    /// Border kept hole-free.
    pub margin: usize,
    /// Free-form: maximum number of strokes.
    pub max_strokes: usize,
    /// Free-form: maximum vertices per stroke.
    pub max_vertices: usize,
    /// Free-form: brush radius range in pixels.
    pub min_brush: usize,
    pub max_brush: usize,
    /// Free-form: maximum segment length in pixels.
    pub max_segment: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            height: 256,
            width: 256,
            shape: MaskShape::Rectangle,
            min_frac: 0.25,
            max_frac: 0.5,
            margin: 8,
            max_strokes: 4,
            max_vertices: 12,
            min_brush: 6,
            max_brush: 20,
            max_segment: 64,
        }
    }
}

/// Seedable mask source. One mask is drawn per forward pass and shared
/// read-only by every downstream component of that pass.
pub struct MaskSampler {
    config: MaskConfig,
    rng: StdRng,
}

impl MaskSampler {
    /// Sampler seeded from OS entropy.
    #[must_use]
    pub fn new(config: MaskConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Sampler with a fixed seed for reproducible mask sequences.
    #[must_use]
    pub fn with_seed(config: MaskConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sampling policy in use.
    #[must_use]
    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Draw one `[1, h, w, 1]` binary mask.
    pub fn generate(&mut self) -> Tensor {
        match self.config.shape {
            MaskShape::Rectangle => self.rectangle(),
            MaskShape::FreeForm => self.free_form(),
        }
    }

    fn side(&mut self, extent: usize) -> usize {
        let lo = ((extent as f32 * self.config.min_frac) as usize).clamp(1, extent - 1);
        let hi = ((extent as f32 * self.config.max_frac) as usize).clamp(lo + 1, extent);
        self.rng.random_range(lo..hi)
    }

    fn rectangle(&mut self) -> Tensor {
        let (h, w) = (self.config.height, self.config.width);
        let mh = self.side(h);
        let mw = self.side(w);
        let margin = self.config.margin;
        let top_max = h.saturating_sub(mh + margin).max(margin + 1);
        let left_max = w.saturating_sub(mw + margin).max(margin + 1);
        let top = self.rng.random_range(margin..top_max);
        let left = self.rng.random_range(margin..left_max);

        let mut mask = Tensor::zeros((1, h, w, 1));
        for i in top..(top + mh).min(h) {
            for j in left..(left + mw).min(w) {
                mask[[0, i, j, 0]] = 1.0;
            }
        }
        mask
    }

    fn free_form(&mut self) -> Tensor {
        let (h, w) = (self.config.height, self.config.width);
        let mut mask = Tensor::zeros((1, h, w, 1));
        let strokes = self.rng.random_range(1..=self.config.max_strokes.max(1));
        for _ in 0..strokes {
            let mut y = self.rng.random_range(0..h) as f32;
            let mut x = self.rng.random_range(0..w) as f32;
            let vertices = self.rng.random_range(1..=self.config.max_vertices.max(1));
            for _ in 0..vertices {
                let angle = self.rng.random::<f32>() * 2.0 * std::f32::consts::PI;
                let length = self.rng.random_range(4..=self.config.max_segment.max(4)) as f32;
                let brush = self
                    .rng
                    .random_range(self.config.min_brush..=self.config.max_brush.max(self.config.min_brush))
                    as f32;
                let (dy, dx) = (angle.sin(), angle.cos());
                let steps = length as usize;
                for s in 0..=steps {
                    let cy = y + dy * s as f32;
                    let cx = x + dx * s as f32;
                    stamp_disc(&mut mask, cy, cx, brush / 2.0);
                }
                y = (y + dy * length).clamp(0.0, (h - 1) as f32);
                x = (x + dx * length).clamp(0.0, (w - 1) as f32);
            }
        }
        mask
    }
}

fn stamp_disc(mask: &mut Tensor, cy: f32, cx: f32, radius: f32) {
    let (_, h, w, _) = mask.dim();
    let r = radius.max(1.0);
    let y0 = ((cy - r).floor().max(0.0)) as usize;
    let y1 = ((cy + r).ceil().min((h - 1) as f32)) as usize;
    let x0 = ((cx - r).floor().max(0.0)) as usize;
    let x1 = ((cx + r).ceil().min((w - 1) as f32)) as usize;
    if cy + r < 0.0 || cx + r < 0.0 || cy - r > (h - 1) as f32 || cx - r > (w - 1) as f32 {
        return;
    }
    for i in y0..=y1 {
        for j in x0..=x1 {
            let dy = i as f32 - cy;
            let dx = j as f32 - cx;
            if dy * dy + dx * dx <= r * r {
                mask[[0, i, j, 0]] = 1.0;
            }
        }
    }
}
