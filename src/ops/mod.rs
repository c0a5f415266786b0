//! Forward tensor kernels for the inpainting graphs
//!
//! Everything here is a pure function over NHWC tensors; gradients are the
//! concern of the external training driver.

pub mod activation;
pub mod composite;
pub mod conv;
pub mod resize;
pub mod spectral;

pub use activation::{clip, leaky_relu, sigmoid, Activation};
pub use composite::{composite, concat_image_ones_mask, erase};
pub use conv::conv2d;
pub use resize::{resize_like, resize_nearest, upsample_2x};
pub use spectral::{spectral_normalize, update_spectral_estimates};
