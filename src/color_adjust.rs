use serde::{Deserialize, Serialize};
use vek::Vec3;

use crate::error::{ExportError, Result};
use crate::support::{inv_sigmoid, linear_to_sh0, sh0_to_linear, sigmoid};

/// Per-source color grading applied to every splat on export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustment {
    pub black_point: f32,
    pub white_point: f32,
    /// Neutral at 1.
    pub brightness: f32,
    pub tint: [f32; 3],
    pub transparency: f32,
}

impl Default for ColorAdjustment {
    fn default() -> Self {
        Self {
            black_point: 0.0,
            white_point: 1.0,
            brightness: 1.0,
            tint: [1.0, 1.0, 1.0],
            transparency: 1.0,
        }
    }
}

impl ColorAdjustment {
    /// Whether the tint/levels path changes colors at all.
    pub fn adjusts_color(&self) -> bool {
        self.tint != [1.0, 1.0, 1.0]
            || self.black_point != 0.0
            || self.white_point != 1.0
            || self.brightness != 1.0
    }

    pub fn adjusts_opacity(&self) -> bool {
        self.transparency != 1.0
    }

    pub fn is_neutral(&self) -> bool {
        !self.adjusts_color() && !self.adjusts_opacity()
    }

    pub fn validate(&self) -> Result<()> {
        if self.adjusts_color() && self.white_point == self.black_point {
            return Err(ExportError::InvalidColorAdjustment(self.white_point));
        }
        Ok(())
    }

    fn offset(&self) -> f32 {
        (self.brightness - 1.0) - self.black_point
    }

    fn level_scale(&self) -> f32 {
        1.0 / (self.white_point - self.black_point)
    }

    /// Per-channel multiplier for the direction-dependent SH terms. Offsets only shift the
    /// DC term, so only the multiplicative part carries over.
    pub fn sh_scale(&self) -> Vec3<f32> {
        if !self.adjusts_color() {
            return Vec3::one();
        }
        Vec3::from(self.tint) * self.level_scale()
    }

    /// Adjust DC color coefficients in place. Neutral parameters leave them untouched bit
    /// for bit.
    pub fn apply_color(&self, color: &mut Vec3<f32>) {
        if self.adjusts_color() {
            let offset = self.offset();
            let scale = self.level_scale();
            let mut channels = color.into_array();
            for (c, tint) in channels.iter_mut().zip(self.tint) {
                *c = linear_to_sh0(offset + sh0_to_linear(*c) * scale * tint);
            }
            *color = Vec3::from(channels);
        }
    }

    pub fn apply_opacity(&self, opacity: &mut f32) {
        if self.adjusts_opacity() {
            *opacity = inv_sigmoid(sigmoid(*opacity) * self.transparency);
        }
    }

    pub fn apply(&self, color: &mut Vec3<f32>, opacity: &mut f32) {
        self.apply_color(color);
        self.apply_opacity(opacity);
    }
}
