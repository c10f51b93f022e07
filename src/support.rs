#[allow(clippy::excessive_precision)]
pub(crate) const SH_C0: f32 = 0.282_094_791_773_878_14;

/// Logit assigned to opacities that saturate at 0 or 1.
pub(crate) const MAX_LOGIT: f32 = 400.0;

/// DC spherical harmonic coefficient to (roughly) linear color.
pub(crate) fn sh0_to_linear(v: f32) -> f32 {
    0.5 + SH_C0 * v
}

pub(crate) fn linear_to_sh0(v: f32) -> f32 {
    (v - 0.5) / SH_C0
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + f32::exp(-x))
}

pub(crate) fn inv_sigmoid(x: f32) -> f32 {
    if x <= 0.0 {
        -MAX_LOGIT
    } else if x >= 1.0 {
        MAX_LOGIT
    } else {
        -f32::ln(1.0 / x - 1.0)
    }
}

/// Quantize a value in [0, 1] to an unsigned integer of `bits` bits.
pub(crate) fn pack_unorm(value: f32, bits: u32) -> u32 {
    let t = ((1u32 << bits) - 1) as f32;
    (value * t + 0.5).floor().clamp(0.0, t) as u32
}

/// Map a float to a byte, rounding to nearest and saturating.
pub(crate) fn to_u8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}
