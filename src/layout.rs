use vek::{Quaternion, Vec3};

use crate::color_adjust::ColorAdjustment;
use crate::spherical_harmonics::ShBand;
use crate::splat_source::SplatSource;
use crate::transform::TransformEntry;

pub const MAX_SH_REST: usize = 45;

const POSITION: [&str; 3] = ["x", "y", "z"];
const SCALE: [&str; 3] = ["scale_0", "scale_1", "scale_2"];
const ROTATION: [&str; 4] = ["rot_0", "rot_1", "rot_2", "rot_3"];
const COLOR: [&str; 3] = ["f_dc_0", "f_dc_1", "f_dc_2"];
const OPACITY: &str = "opacity";

/// Where a named property lives once a splat has been read into a [`SplatRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Position(usize),
    LogScale(usize),
    /// 0 is w, then x, y, z.
    Rotation(usize),
    Color(usize),
    Opacity,
    ShRest(usize),
    /// Index into the source's property list.
    Extra(usize),
}

/// The splat attributes every writer understands, read out of a source's named arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatRecord {
    pub position: Vec3<f32>,
    pub log_scale: Vec3<f32>,
    pub rotation: Quaternion<f32>,
    pub color: Vec3<f32>,
    /// Opacity as a logit.
    pub opacity: f32,
    /// `f_rest_*` values as stored: all red coefficients, then green, then blue.
    pub sh_rest: [f32; MAX_SH_REST],
    pub sh_rest_len: usize,
}

impl Default for SplatRecord {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            log_scale: Vec3::zero(),
            rotation: Quaternion::identity(),
            color: Vec3::zero(),
            opacity: 0.0,
            sh_rest: [0.0; MAX_SH_REST],
            sh_rest_len: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParts {
    pub position: bool,
    pub rotation: bool,
    pub scale: bool,
    pub sh: bool,
}

impl TransformParts {
    pub const GEOMETRY: Self = Self {
        position: true,
        rotation: true,
        scale: true,
        sh: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorParts {
    pub color: bool,
    pub opacity: bool,
    pub sh: bool,
}

impl ColorParts {
    pub const DC_AND_OPACITY: Self = Self {
        color: true,
        opacity: true,
        sh: false,
    };
}

impl SplatRecord {
    pub fn sh_coeffs_per_channel(&self) -> usize {
        self.sh_rest_len / 3
    }

    /// Copy the first `out.len()` coefficients of one channel, zero-filling past what the
    /// record carries.
    pub fn sh_channel(&self, channel: usize, out: &mut [f32]) {
        let stride = self.sh_coeffs_per_channel();
        for (j, v) in out.iter_mut().enumerate() {
            *v = if j < stride {
                self.sh_rest[channel * stride + j]
            } else {
                0.0
            };
        }
    }

    fn set_sh_channel(&mut self, channel: usize, coeffs: &[f32]) {
        let stride = self.sh_coeffs_per_channel();
        for (j, &v) in coeffs.iter().enumerate().take(stride) {
            self.sh_rest[channel * stride + j] = v;
        }
    }

    pub fn transform(&mut self, entry: &TransformEntry, parts: TransformParts) {
        if parts.position {
            self.position = entry.transform_point(self.position);
        }
        if parts.rotation {
            self.rotation = entry.rotation * self.rotation;
        }
        if parts.scale {
            let s = entry.scale;
            self.log_scale = Vec3::new(
                self.log_scale.x + s.x.abs().ln(),
                self.log_scale.y + s.y.abs().ln(),
                self.log_scale.z + s.z.abs().ln(),
            );
        }
        if parts.sh && self.sh_rest_len > 0 {
            let stride = self.sh_coeffs_per_channel();
            let mut coeffs = [0.0f32; MAX_SH_REST / 3];
            for channel in 0..3 {
                self.sh_channel(channel, &mut coeffs[..stride]);
                entry.sh_rotation.apply(&mut coeffs[..stride]);
                self.set_sh_channel(channel, &coeffs[..stride]);
            }
        }
    }

    /// Directional SH terms take the same per-channel multiplier as the DC color.
    pub fn adjust_color(&mut self, adjustment: &ColorAdjustment, parts: ColorParts) {
        if parts.color {
            adjustment.apply_color(&mut self.color);
        }
        if parts.opacity {
            adjustment.apply_opacity(&mut self.opacity);
        }
        if parts.sh && adjustment.adjusts_color() && self.sh_rest_len > 0 {
            let scale = adjustment.sh_scale();
            let stride = self.sh_coeffs_per_channel();
            for channel in 0..3 {
                for v in &mut self.sh_rest[channel * stride..(channel + 1) * stride] {
                    *v *= scale[channel];
                }
            }
        }
    }

    pub fn value(&self, slot: Slot, source: &SplatSource, index: usize) -> f32 {
        match slot {
            Slot::Position(axis) => self.position[axis],
            Slot::LogScale(axis) => self.log_scale[axis],
            Slot::Rotation(0) => self.rotation.w,
            Slot::Rotation(1) => self.rotation.x,
            Slot::Rotation(2) => self.rotation.y,
            Slot::Rotation(_) => self.rotation.z,
            Slot::Color(channel) => self.color[channel],
            Slot::Opacity => self.opacity,
            Slot::ShRest(i) => self.sh_rest[i],
            Slot::Extra(p) => source.properties[p].1[index],
        }
    }
}

/// Property array indices for the fields of [`SplatRecord`], resolved once per source so
/// the per-splat loop never looks properties up by name.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    position: Option<[usize; 3]>,
    scale: Option<[usize; 3]>,
    rotation: Option<[usize; 4]>,
    color: Option<[usize; 3]>,
    opacity: Option<usize>,
    sh_rest: Vec<usize>,
    extras: Vec<usize>,
}

fn find_all<const N: usize>(source: &SplatSource, names: [&str; N]) -> Option<[usize; N]> {
    let found = names.map(|n| source.property_index(n));
    if found.iter().all(Option::is_some) {
        Some(found.map(|i| i.unwrap_or_default()))
    } else {
        None
    }
}

impl SourceLayout {
    pub fn new(source: &SplatSource) -> Self {
        let sh_rest = (0..source.sh_band().rest_count())
            .filter_map(|i| source.property_index(&format!("f_rest_{}", i)))
            .collect();

        let mut layout = Self {
            position: find_all(source, POSITION),
            scale: find_all(source, SCALE),
            rotation: find_all(source, ROTATION),
            color: find_all(source, COLOR),
            opacity: source.property_index(OPACITY),
            sh_rest,
            extras: Vec::new(),
        };
        layout.extras = source
            .property_names()
            .filter_map(|name| match layout.slot(source, name) {
                Some(Slot::Extra(i)) => Some(i),
                _ => None,
            })
            .collect();
        layout
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation.is_some()
    }

    pub fn has_scale(&self) -> bool {
        self.scale.is_some()
    }

    pub fn has_color(&self) -> bool {
        self.color.is_some()
    }

    pub fn has_opacity(&self) -> bool {
        self.opacity.is_some()
    }

    pub fn sh_band(&self) -> ShBand {
        ShBand::from_rest_count(self.sh_rest.len())
    }

    pub fn extras(&self) -> &[usize] {
        &self.extras
    }

    /// Slot a named property is read from, or `None` if the source lacks it.
    pub fn slot(&self, source: &SplatSource, name: &str) -> Option<Slot> {
        let index = source.property_index(name)?;
        match slot_for_name(name) {
            Some(Slot::ShRest(i)) if i < self.sh_rest.len() => Some(Slot::ShRest(i)),
            Some(Slot::Position(_)) if self.position.is_none() => Some(Slot::Extra(index)),
            Some(Slot::LogScale(_)) if self.scale.is_none() => Some(Slot::Extra(index)),
            Some(Slot::Rotation(_)) if self.rotation.is_none() => Some(Slot::Extra(index)),
            Some(Slot::Color(_)) if self.color.is_none() => Some(Slot::Extra(index)),
            Some(Slot::ShRest(_)) | None | Some(Slot::Extra(_)) => Some(Slot::Extra(index)),
            Some(slot) => Some(slot),
        }
    }

    pub fn read(&self, source: &SplatSource, index: usize) -> SplatRecord {
        let value = |p: usize| source.properties[p].1[index];
        let mut record = SplatRecord::default();
        if let Some([x, y, z]) = self.position {
            record.position = Vec3::new(value(x), value(y), value(z));
        }
        if let Some([x, y, z]) = self.scale {
            record.log_scale = Vec3::new(value(x), value(y), value(z));
        }
        if let Some([w, x, y, z]) = self.rotation {
            record.rotation = Quaternion::from_xyzw(value(x), value(y), value(z), value(w));
        }
        if let Some([r, g, b]) = self.color {
            record.color = Vec3::new(value(r), value(g), value(b));
        }
        if let Some(o) = self.opacity {
            record.opacity = value(o);
        }
        for (dst, &p) in record.sh_rest.iter_mut().zip(&self.sh_rest) {
            *dst = value(p);
        }
        record.sh_rest_len = self.sh_rest.len();
        record
    }
}

fn slot_for_name(name: &str) -> Option<Slot> {
    let position = |list: &[&str]| list.iter().position(|n| *n == name);
    if let Some(i) = position(&POSITION) {
        return Some(Slot::Position(i));
    }
    if let Some(i) = position(&SCALE) {
        return Some(Slot::LogScale(i));
    }
    if let Some(i) = position(&ROTATION) {
        return Some(Slot::Rotation(i));
    }
    if let Some(i) = position(&COLOR) {
        return Some(Slot::Color(i));
    }
    if name == OPACITY {
        return Some(Slot::Opacity);
    }
    name.strip_prefix("f_rest_")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|&i| i < MAX_SH_REST)
        .map(Slot::ShRest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::axis_correction;
    use approx::assert_relative_eq;
    use vek::Mat4;

    fn source() -> SplatSource {
        let mut source = SplatSource::new(2);
        for (name, values) in [
            ("x", vec![1.0, 4.0]),
            ("y", vec![2.0, 5.0]),
            ("z", vec![3.0, 6.0]),
            ("nx", vec![0.5, 0.5]),
            ("rot_0", vec![1.0, 0.0]),
            ("rot_1", vec![0.0, 1.0]),
            ("rot_2", vec![0.0, 0.0]),
            ("rot_3", vec![0.0, 0.0]),
            ("opacity", vec![0.25, -0.25]),
        ] {
            source = source.with_property(name, values).unwrap();
        }
        for i in 0..9 {
            source = source
                .with_property(&format!("f_rest_{}", i), vec![i as f32, -(i as f32)])
                .unwrap();
        }
        source
    }

    #[test]
    fn test_layout_resolution() {
        let source = source();
        let layout = SourceLayout::new(&source);
        assert!(layout.has_position());
        assert!(layout.has_rotation());
        assert!(!layout.has_scale());
        assert!(!layout.has_color());
        assert_eq!(layout.sh_band(), ShBand::Band1);
        assert_eq!(layout.extras(), &[3]);
        assert_eq!(layout.slot(&source, "nx"), Some(Slot::Extra(3)));
        assert_eq!(layout.slot(&source, "rot_2"), Some(Slot::Rotation(2)));
        assert_eq!(layout.slot(&source, "f_rest_8"), Some(Slot::ShRest(8)));
        assert_eq!(layout.slot(&source, "scale_0"), None);
    }

    #[test]
    fn test_read_record() {
        let source = source();
        let layout = SourceLayout::new(&source);
        let record = layout.read(&source, 1);
        assert_eq!(record.position, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(record.rotation, Quaternion::from_xyzw(1.0, 0.0, 0.0, 0.0));
        assert_eq!(record.log_scale, Vec3::zero());
        assert_eq!(record.opacity, -0.25);
        assert_eq!(record.sh_rest_len, 9);
        assert_eq!(record.sh_rest[4], -4.0);
        assert_eq!(record.value(Slot::Rotation(1), &source, 1), 1.0);
        assert_eq!(record.value(Slot::Extra(3), &source, 1), 0.5);
    }

    #[test]
    fn test_sh_channel_zero_fills() {
        let source = source();
        let layout = SourceLayout::new(&source);
        let record = layout.read(&source, 0);
        let mut out = [9.0f32; 8];
        record.sh_channel(1, &mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_transform_record() {
        let source = source();
        let layout = SourceLayout::new(&source);
        let mut record = layout.read(&source, 0);
        let scale2 = Mat4::new(
            2.0, 0.0, 0.0, 0.0, //
            0.0, 2.0, 0.0, 0.0, //
            0.0, 0.0, 2.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        let entry = TransformEntry::new(axis_correction() * scale2);
        record.transform(
            &entry,
            TransformParts {
                sh: true,
                ..TransformParts::GEOMETRY
            },
        );
        assert_eq!(record.position, Vec3::new(-2.0, -4.0, 6.0));
        assert_relative_eq!(record.log_scale.x, 2f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(record.rotation.z.abs(), 1.0, epsilon = 1e-6);
        // Band 1 under a half turn about z: (-y, z, -x) terms flip the first and last.
        assert_relative_eq!(record.sh_rest[0], 0.0, epsilon = 1e-4);
        assert_relative_eq!(record.sh_rest[1], 1.0, epsilon = 1e-4);
        assert_relative_eq!(record.sh_rest[2], -2.0, epsilon = 1e-4);
        assert_relative_eq!(record.sh_rest[3], -3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_adjust_color_scales_sh() {
        let source = source();
        let layout = SourceLayout::new(&source);
        let mut record = layout.read(&source, 0);
        let adjustment = ColorAdjustment {
            tint: [0.5, 1.0, 2.0],
            ..Default::default()
        };
        record.adjust_color(
            &adjustment,
            ColorParts {
                sh: true,
                ..ColorParts::DC_AND_OPACITY
            },
        );
        assert_eq!(&record.sh_rest[..9], &[0.0, 0.5, 1.0, 3.0, 4.0, 5.0, 12.0, 14.0, 16.0]);
    }

    #[test]
    fn test_opacity_adjusts_without_color() {
        let source = source();
        let layout = SourceLayout::new(&source);
        let mut record = layout.read(&source, 0);
        let adjustment = ColorAdjustment {
            tint: [0.5, 1.0, 2.0],
            transparency: 0.0,
            ..Default::default()
        };
        record.adjust_color(
            &adjustment,
            ColorParts {
                color: layout.has_color(),
                opacity: layout.has_opacity(),
                sh: false,
            },
        );
        assert_eq!(record.color, Vec3::zero());
        assert_eq!(record.opacity, -400.0);
        assert_eq!(record.sh_rest[1], 1.0);
    }

    #[test]
    fn test_unrecognised_sh_count_is_ignored() {
        let mut source = SplatSource::new(1);
        for i in 0..12 {
            source = source.with_property(&format!("f_rest_{}", i), vec![2.0]).unwrap();
        }
        let layout = SourceLayout::new(&source);
        assert_eq!(layout.sh_band(), ShBand::Band0);
        let record = layout.read(&source, 0);
        assert_eq!(record.sh_rest_len, 0);
        assert_eq!(layout.slot(&source, "f_rest_0"), Some(Slot::Extra(0)));

        let mut out = [1.0f32; 3];
        record.sh_channel(0, &mut out);
        assert_eq!(out, [0.0; 3]);
    }
}
