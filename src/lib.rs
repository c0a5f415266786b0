//! Generative image inpainting with contextual attention
//!
//! Reconstructs masked regions of an image so the result is plausible and
//! consistent with the surrounding context:
//! - Two-stage generator: a coarse network followed by a refinement network
//!   whose attention branch copies texture from unmasked background patches
//! - Spectral-normalized patch discriminator scoring local realism
//! - Hinge adversarial loss plus weighted L1 reconstruction
//!
//! # Architecture
//!
//! ```text
//! masked image ─► Stage 1 (coarse) ─► paste into hole ─┬─► hallucination branch ─┐
//!                                                      │                         ├─► decoder ─► x_stage2
//!                                                      └─► attention branch ─────┘
//!
//! x_stage2*mask + original*(1-mask) ─► SN-Patch discriminator ─► hinge loss
//! ```
//!
//! Parameters live in an explicit [`params::ParameterStore`] keyed by
//! hierarchical name; "reuse" is an explicit bind-existing lookup, so the
//! training, validation, and serving graphs share weights without global
//! state. Gradients and parameter updates belong to the external training
//! driver: every builder here is a forward pass producing tensors, loss
//! scalars, and parameter handles.
//!
//! # Example
//!
//! ```
//! use ndarray::Array4;
//! use rellenar::mask::MaskConfig;
//! use rellenar::params::{BindMode, ParameterStore};
//! use rellenar::summary::NullSummary;
//! use rellenar::{InpaintConfig, InpaintModel};
//!
//! # fn main() -> rellenar::Result<()> {
//! let config = InpaintConfig {
//!     cnum: 4,
//!     dis_cnum: 4,
//!     mask: MaskConfig { height: 32, width: 32, ..Default::default() },
//!     ..Default::default()
//! };
//! let mut model = InpaintModel::with_seed(config, 42)?;
//! let mut store = ParameterStore::with_seed(42);
//!
//! let batch = Array4::<f32>::from_elem((1, 32, 32, 3), 128.0);
//! let (g_vars, d_vars, losses) =
//!     model.build_graph_with_losses(&mut store, &batch, BindMode::Create, &mut NullSummary)?;
//! assert!(losses.contains_key("g_loss"));
//! assert!(!g_vars.is_empty() && !d_vars.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod attention;
pub mod config;
pub mod discriminator;
pub mod error;
pub mod generator;
pub mod layers;
pub mod loss;
pub mod mask;
pub mod model;
pub mod ops;
pub mod params;
pub mod summary;

pub use config::{GanKind, InpaintConfig, Padding, PrimaryStage};
pub use error::{InpaintError, Result};
pub use model::InpaintModel;

/// Rank-4 image/feature tensor in `[batch, height, width, channels]` layout.
pub type Tensor = ndarray::Array4<f32>;
