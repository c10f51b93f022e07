use vek::{Mat4, Vec3};

use crate::color_adjust::ColorAdjustment;
use crate::error::{ExportError, Result};
use crate::spherical_harmonics::ShBand;

/// Bit in the per-splat state byte marking a deleted splat.
pub const STATE_DELETED: u8 = 1;

/// Per-splat indirection into a table of transforms. Index 0 means "no palette transform".
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPalette {
    pub transforms: Vec<Mat4<f32>>,
    pub indices: Vec<u32>,
}

/// One ingested scene: parallel per-splat property arrays plus the transforms and color
/// settings that apply to all of them.
#[derive(Debug, Clone)]
pub struct SplatSource {
    pub num_splats: usize,
    pub properties: Vec<(String, Vec<f32>)>,
    pub state: Option<Vec<u8>>,
    pub transform: Mat4<f32>,
    pub palette: Option<TransformPalette>,
    /// World-space render centers, used as spatial sort keys.
    pub centers: Option<Vec<Vec3<f32>>>,
    pub color_adjustment: ColorAdjustment,
}

fn check_len(source_index: usize, property: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ExportError::PropertyLength {
            source_index,
            property: property.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

impl SplatSource {
    pub fn new(num_splats: usize) -> Self {
        Self {
            num_splats,
            properties: Vec::new(),
            state: None,
            transform: Mat4::identity(),
            palette: None,
            centers: None,
            color_adjustment: ColorAdjustment::default(),
        }
    }

    pub fn with_property(mut self, name: &str, values: Vec<f32>) -> Result<Self> {
        check_len(0, name, self.num_splats, values.len())?;
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.properties.push((name.to_string(), values)),
        }
        Ok(self)
    }

    pub fn with_state(mut self, state: Vec<u8>) -> Result<Self> {
        check_len(0, "state", self.num_splats, state.len())?;
        self.state = Some(state);
        Ok(self)
    }

    pub fn with_transform(mut self, transform: Mat4<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_palette(mut self, transforms: Vec<Mat4<f32>>, indices: Vec<u32>) -> Result<Self> {
        check_len(0, "transform", self.num_splats, indices.len())?;
        let palette = TransformPalette {
            transforms,
            indices,
        };
        validate_palette(0, &palette)?;
        self.palette = Some(palette);
        Ok(self)
    }

    pub fn with_centers(mut self, centers: Vec<Vec3<f32>>) -> Result<Self> {
        check_len(0, "centers", self.num_splats, centers.len())?;
        self.centers = Some(centers);
        Ok(self)
    }

    pub fn with_color_adjustment(mut self, color_adjustment: ColorAdjustment) -> Self {
        self.color_adjustment = color_adjustment;
        self
    }

    /// Check every per-splat array against `num_splats` and every palette index against the
    /// palette. `source_index` is only used for error reporting.
    pub fn validate(&self, source_index: usize) -> Result<()> {
        for (name, values) in &self.properties {
            check_len(source_index, name, self.num_splats, values.len())?;
        }
        if let Some(state) = &self.state {
            check_len(source_index, "state", self.num_splats, state.len())?;
        }
        if let Some(centers) = &self.centers {
            check_len(source_index, "centers", self.num_splats, centers.len())?;
        }
        if let Some(palette) = &self.palette {
            check_len(source_index, "transform", self.num_splats, palette.indices.len())?;
            validate_palette(source_index, palette)?;
        }
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<&[f32]> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|(n, _)| n == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property_index(name).is_some()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_deleted(&self, index: usize) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.get(index))
            .is_some_and(|s| s & STATE_DELETED != 0)
    }

    pub fn num_deleted(&self) -> usize {
        (0..self.num_splats).filter(|&i| self.is_deleted(i)).count()
    }

    pub fn num_surviving(&self) -> usize {
        self.num_splats - self.num_deleted()
    }

    pub fn surviving_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_splats).filter(move |&i| !self.is_deleted(i))
    }

    /// Palette index of splat `index`, 0 when the source carries no palette.
    pub fn palette_index(&self, index: usize) -> u32 {
        self.palette
            .as_ref()
            .and_then(|p| p.indices.get(index).copied())
            .unwrap_or(0)
    }

    /// Number of contiguous `f_rest_N` properties starting at `f_rest_0`.
    pub fn sh_rest_count(&self) -> usize {
        (0..).take_while(|i| self.has_property(&format!("f_rest_{}", i))).count()
    }

    pub fn sh_band(&self) -> ShBand {
        ShBand::from_rest_count(self.sh_rest_count())
    }
}

fn validate_palette(source_index: usize, palette: &TransformPalette) -> Result<()> {
    let palette_len = palette.transforms.len();
    for (splat, &index) in palette.indices.iter().enumerate() {
        if index != 0 && index as usize >= palette_len {
            return Err(ExportError::PaletteIndex {
                source_index,
                splat,
                index,
                palette_len,
            });
        }
    }
    Ok(())
}

pub fn count_surviving(sources: &[SplatSource]) -> usize {
    sources.iter().map(|s| s.num_surviving()).sum()
}

pub fn validate_sources(sources: &[SplatSource]) -> Result<()> {
    sources
        .iter()
        .enumerate()
        .try_for_each(|(i, s)| s.validate(i))
}
