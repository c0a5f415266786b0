//! Gated convolution building blocks
//!
//! A gated convolution runs a single convolution with doubled output
//! channels and splits the result into a content half and a gate half:
//! `output = activation(content) * sigmoid(gate)`. The gate learns to
//! suppress features flowing out of invalid/masked regions. Projection
//! layers (`Activation::Linear`) are plain ungated convolutions.

use ndarray::s;

use crate::config::Padding;
use crate::error::Result;
use crate::ops::activation::sigmoid;
use crate::ops::{conv2d, leaky_relu, spectral_normalize, upsample_2x, Activation};
use crate::params::{Init, Scope};
use crate::Tensor;

/// Gated convolution layer.
///
/// `cnum` is the output channel count; `rate > 1` selects the atrous
/// variant, `stride > 1` the downsample variant.
pub fn gated_conv(
    scope: &mut Scope<'_>,
    x: &Tensor,
    cnum: usize,
    ksize: usize,
    stride: usize,
    rate: usize,
    activation: Activation,
    padding: Padding,
    name: &str,
) -> Result<Tensor> {
    let cin = x.dim().3;
    let mut sc = scope.sub(name);

    if activation == Activation::Linear {
        // ungated projection layer
        let kernel = sc.var("kernel", &[ksize, ksize, cin, cnum], Init::Glorot)?;
        let bias = sc.var("bias", &[cnum], Init::Zeros)?;
        return conv2d(
            x,
            &kernel.to_array4()?,
            Some(&bias.to_array1()?),
            stride,
            rate,
            padding,
        );
    }

    let kernel = sc.var("kernel", &[ksize, ksize, cin, 2 * cnum], Init::Glorot)?;
    let bias = sc.var("bias", &[2 * cnum], Init::Zeros)?;
    let y = conv2d(
        x,
        &kernel.to_array4()?,
        Some(&bias.to_array1()?),
        stride,
        rate,
        padding,
    )?;

    let mut content = y.slice(s![.., .., .., 0..cnum]).to_owned();
    let gate = y.slice(s![.., .., .., cnum..2 * cnum]).to_owned();
    activation.apply(&mut content);
    let gate = gate.mapv(sigmoid);
    Ok(content * gate)
}

/// Gated upsampling layer: nearest-neighbor x2 followed by a stride-1 3x3
/// gated convolution.
pub fn gated_deconv(
    scope: &mut Scope<'_>,
    x: &Tensor,
    cnum: usize,
    padding: Padding,
    name: &str,
) -> Result<Tensor> {
    let up = upsample_2x(x);
    gated_conv(
        scope,
        &up,
        cnum,
        3,
        1,
        1,
        Activation::LeakyRelu,
        padding,
        name,
    )
}

/// Spectral-normalized convolution + leaky ReLU (discriminator layer).
///
/// Registers a non-trainable singular-vector estimate `u` next to the
/// kernel; the forward pass reads it without mutation (see
/// [`crate::ops::spectral`]).
pub fn conv2d_sn(
    scope: &mut Scope<'_>,
    x: &Tensor,
    cnum: usize,
    ksize: usize,
    stride: usize,
    name: &str,
) -> Result<Tensor> {
    let cin = x.dim().3;
    let mut sc = scope.sub(name);
    let kernel = sc.var("kernel", &[ksize, ksize, cin, cnum], Init::Glorot)?;
    let bias = sc.var("bias", &[cnum], Init::Zeros)?;
    let u = sc.state("u", &[cnum], Init::RandomUnit)?;

    let (kernel_sn, _) = spectral_normalize(&kernel.to_array4()?, &u.to_array1()?);
    let mut y = conv2d(
        x,
        &kernel_sn,
        Some(&bias.to_array1()?),
        stride,
        1,
        Padding::Same,
    )?;
    leaky_relu(&mut y);
    Ok(y)
}
