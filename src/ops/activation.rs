//! Elementwise activations and value clipping

use serde::{Deserialize, Serialize};

use crate::Tensor;

/// Slope of the leaky rectifier's negative half.
pub const LEAKY_SLOPE: f32 = 0.2;

/// Activation applied to the content half of a gated convolution.
///
/// `Linear` marks an ungated projection layer: no nonlinearity and no gate,
/// used for the 3-channel stage outputs that are clipped to `[-1, 1]` by the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
    LeakyRelu,
    Sigmoid,
}

impl Activation {
    /// Apply the activation elementwise, in place.
    pub fn apply(self, x: &mut Tensor) {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::LeakyRelu => leaky_relu(x),
            Activation::Sigmoid => x.mapv_inplace(sigmoid),
        }
    }
}

/// Leaky ReLU with slope [`LEAKY_SLOPE`], in place.
pub fn leaky_relu(x: &mut Tensor) {
    x.mapv_inplace(|v| if v > 0.0 { v } else { LEAKY_SLOPE * v });
}

/// Logistic sigmoid.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Clip every element into `[lo, hi]`, in place.
pub fn clip(x: &mut Tensor, lo: f32, hi: f32) {
    x.mapv_inplace(|v| v.clamp(lo, hi));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use proptest::prelude::*;

    #[test]
    fn test_sigmoid_range() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(20.0) > 0.99);
        assert!(sigmoid(-20.0) < 0.01);
    }

    #[test]
    fn test_leaky_relu_negative_slope() {
        let mut x = Array4::from_elem((1, 1, 1, 2), -1.0);
        leaky_relu(&mut x);
        assert!((x[[0, 0, 0, 0]] + LEAKY_SLOPE).abs() < 1e-6);
    }

    #[test]
    fn test_linear_is_identity() {
        let mut x = Array4::from_elem((1, 2, 2, 1), -3.5);
        Activation::Linear.apply(&mut x);
        assert_eq!(x[[0, 0, 0, 0]], -3.5);
    }

    proptest! {
        #[test]
        fn prop_clip_bounds(vals in prop::collection::vec(-10.0f32..10.0, 16)) {
            let mut x = Array4::from_shape_vec((1, 4, 4, 1), vals).expect("shape");
            clip(&mut x, -1.0, 1.0);
            prop_assert!(x.iter().all(|v| (-1.0..=1.0).contains(v)));
        }

        #[test]
        fn prop_sigmoid_bounds(v in -50.0f32..50.0) {
            let s = sigmoid(v);
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
