use serde::{Deserialize, Serialize};

/// Spherical harmonic band carried by a scene, not counting the DC term.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShBand {
    #[default]
    Band0, // 0 floats / 0 coefficients per channel
    Band1, // 9 floats / 3 coefficients per channel
    Band2, // 24 floats / 8 coefficients per channel
    Band3, // 45 floats / 15 coefficients per channel
}

impl ShBand {
    pub fn index(&self) -> usize {
        match self {
            ShBand::Band0 => 0,
            ShBand::Band1 => 1,
            ShBand::Band2 => 2,
            ShBand::Band3 => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ShBand::Band0),
            1 => Some(ShBand::Band1),
            2 => Some(ShBand::Band2),
            3 => Some(ShBand::Band3),
            _ => None,
        }
    }

    /// Band implied by the number of contiguous `f_rest_*` properties.
    pub fn from_rest_count(count: usize) -> Self {
        match count {
            9 => ShBand::Band1,
            24 => ShBand::Band2,
            45 => ShBand::Band3,
            _ => ShBand::Band0,
        }
    }

    pub fn coeff_count(&self) -> usize {
        match self {
            ShBand::Band0 => 0,
            ShBand::Band1 => 3,
            ShBand::Band2 => 8,
            ShBand::Band3 => 15,
        }
    }

    pub fn rest_count(&self) -> usize {
        self.coeff_count() * 3
    }
}

#[allow(clippy::excessive_precision)]
const SH_C1: f64 = 0.488_602_511_902_919_9;

#[allow(clippy::excessive_precision)]
const SH_C2: [f64; 5] = [
    1.092_548_430_592_079_2,
    -1.092_548_430_592_079_2,
    0.315_391_565_252_520_05,
    -1.092_548_430_592_079_2,
    0.546_274_215_296_039_6,
];

#[allow(clippy::excessive_precision)]
const SH_C3: [f64; 7] = [
    -0.590_043_589_926_643_5,
    2.890_611_442_640_554,
    -0.457_045_799_464_465_8,
    0.373_176_332_590_115_4,
    -0.457_045_799_464_465_8,
    1.445_305_721_320_277,
    -0.590_043_589_926_643_5,
];

/// Basis functions of band `l` evaluated at unit direction `d`, in the order and sign
/// convention the point format stores its `f_rest_*` coefficients.
fn eval_band(l: usize, d: [f64; 3], out: &mut [f64]) {
    let [x, y, z] = d;
    match l {
        1 => {
            out[0] = -SH_C1 * y;
            out[1] = SH_C1 * z;
            out[2] = -SH_C1 * x;
        }
        2 => {
            let (xx, yy, zz) = (x * x, y * y, z * z);
            out[0] = SH_C2[0] * x * y;
            out[1] = SH_C2[1] * y * z;
            out[2] = SH_C2[2] * (2.0 * zz - xx - yy);
            out[3] = SH_C2[3] * x * z;
            out[4] = SH_C2[4] * (xx - yy);
        }
        3 => {
            let (xx, yy, zz) = (x * x, y * y, z * z);
            out[0] = SH_C3[0] * y * (3.0 * xx - yy);
            out[1] = SH_C3[1] * x * y * z;
            out[2] = SH_C3[2] * y * (4.0 * zz - xx - yy);
            out[3] = SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy);
            out[4] = SH_C3[4] * x * (4.0 * zz - xx - yy);
            out[5] = SH_C3[5] * z * (xx - yy);
            out[6] = SH_C3[6] * x * (xx - 3.0 * yy);
        }
        _ => {}
    }
}

const SAMPLE_COUNT: usize = 32;

fn sample_directions() -> [[f64; 3]; SAMPLE_COUNT] {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    std::array::from_fn(|i| {
        let y = 1.0 - 2.0 * (i as f64 + 0.5) / SAMPLE_COUNT as f64;
        let r = (1.0 - y * y).sqrt();
        let theta = golden * i as f64;
        [r * theta.cos(), y, r * theta.sin()]
    })
}

/// Solve `g * m = h` for `m` with Gauss-Jordan elimination. `g` is symmetric positive definite.
fn solve<const N: usize>(mut g: [[f64; N]; N], mut h: [[f64; N]; N]) -> [[f64; N]; N] {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&a, &b| g[a][col].abs().total_cmp(&g[b][col].abs()))
            .unwrap_or(col);
        g.swap(col, pivot);
        h.swap(col, pivot);

        let p = g[col][col];
        if p.abs() < f64::EPSILON {
            continue;
        }
        for k in 0..N {
            g[col][k] /= p;
            h[col][k] /= p;
        }
        for row in 0..N {
            if row == col {
                continue;
            }
            let f = g[row][col];
            if f == 0.0 {
                continue;
            }
            for k in 0..N {
                g[row][k] -= f * g[col][k];
                h[row][k] -= f * h[col][k];
            }
        }
    }
    h
}

/// Least-squares fit of the matrix mapping band `l` coefficients of `f` to those of
/// `f(rotation^T * d)`. Exact because each band is closed under rotation.
fn band_matrix<const N: usize>(l: usize, rotation: &[[f64; 3]; 3]) -> [[f32; N]; N] {
    let mut gram = [[0.0f64; N]; N];
    let mut cross = [[0.0f64; N]; N];
    let mut a = [0.0f64; N];
    let mut t = [0.0f64; N];

    for d in sample_directions() {
        let rd: [f64; 3] =
            std::array::from_fn(|j| (0..3).map(|i| rotation[i][j] * d[i]).sum::<f64>());
        eval_band(l, d, &mut a);
        eval_band(l, rd, &mut t);
        for r in 0..N {
            for c in 0..N {
                gram[r][c] += a[r] * a[c];
                cross[r][c] += a[r] * t[c];
            }
        }
    }

    // Normal equations: gram * m = cross, giving c' = m * c.
    let m = solve(gram, cross);
    std::array::from_fn(|r| std::array::from_fn(|c| m[r][c] as f32))
}

fn apply_band<const N: usize>(m: &[[f32; N]; N], coeffs: &mut [f32]) {
    let src: [f32; N] = std::array::from_fn(|i| coeffs[i]);
    for (r, row) in m.iter().enumerate() {
        coeffs[r] = row.iter().zip(src.iter()).map(|(a, b)| a * b).sum();
    }
}

/// Rotation operator for spherical harmonic coefficients of bands 1 to 3.
#[derive(Debug, Clone, PartialEq)]
pub struct ShRotation {
    band1: [[f32; 3]; 3],
    band2: [[f32; 5]; 5],
    band3: [[f32; 7]; 7],
}

impl ShRotation {
    /// `rotation` is a row-major 3x3 rotation matrix.
    pub fn new(rotation: [[f32; 3]; 3]) -> Self {
        let r: [[f64; 3]; 3] = std::array::from_fn(|i| std::array::from_fn(|j| rotation[i][j] as f64));
        Self {
            band1: band_matrix(1, &r),
            band2: band_matrix(2, &r),
            band3: band_matrix(3, &r),
        }
    }

    pub fn identity() -> Self {
        Self::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Rotate one channel's coefficients in place. Accepts 3, 8 or 15 coefficients; any
    /// other length only rotates the complete bands it contains.
    pub fn apply(&self, coeffs: &mut [f32]) {
        if coeffs.len() >= 3 {
            apply_band(&self.band1, &mut coeffs[0..3]);
        }
        if coeffs.len() >= 8 {
            apply_band(&self.band2, &mut coeffs[3..8]);
        }
        if coeffs.len() >= 15 {
            apply_band(&self.band3, &mut coeffs[8..15]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn eval(coeffs: &[f32], d: [f64; 3]) -> f64 {
        let mut basis = [0.0f64; 7];
        let mut total = 0.0;
        let mut offset = 0;
        for l in 1..=3 {
            let n = 2 * l + 1;
            if offset + n > coeffs.len() {
                break;
            }
            eval_band(l, d, &mut basis);
            for k in 0..n {
                total += basis[k] * coeffs[offset + k] as f64;
            }
            offset += n;
        }
        total
    }

    fn rotation_from_axis_angle(axis: [f64; 3], angle: f64) -> [[f32; 3]; 3] {
        let len = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let [x, y, z] = [axis[0] / len, axis[1] / len, axis[2] / len];
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        [
            [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
            [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
            [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
        ]
        .map(|row| row.map(|v| v as f32))
    }

    #[test]
    fn test_band_from_rest_count() {
        assert_eq!(ShBand::from_rest_count(0), ShBand::Band0);
        assert_eq!(ShBand::from_rest_count(9), ShBand::Band1);
        assert_eq!(ShBand::from_rest_count(24), ShBand::Band2);
        assert_eq!(ShBand::from_rest_count(45), ShBand::Band3);
        assert_eq!(ShBand::from_rest_count(10), ShBand::Band0);
        assert_eq!(ShBand::Band2.rest_count(), 24);
        assert!(ShBand::Band1 < ShBand::Band3);
    }

    #[test]
    fn test_identity_rotation_is_noop() {
        let rotation = ShRotation::identity();
        let original: Vec<f32> = (0..15).map(|i| i as f32 * 0.1 - 0.7).collect();
        let mut coeffs = original.clone();
        rotation.apply(&mut coeffs);
        for (a, b) in coeffs.iter().zip(original.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_rotation_follows_direction() {
        let r = rotation_from_axis_angle([0.3, -1.0, 0.5], 1.1);
        let rotation = ShRotation::new(r);
        let original: Vec<f32> = (0..15).map(|i| ((i * 7) % 5) as f32 * 0.2 - 0.4).collect();
        let mut rotated = original.clone();
        rotation.apply(&mut rotated);

        for d in [[0.0, 0.0, 1.0], [0.6, 0.0, 0.8], [-0.48, 0.6, 0.64]] {
            let rd: [f64; 3] = std::array::from_fn(|i| (0..3).map(|j| r[i][j] as f64 * d[j]).sum());
            assert_abs_diff_eq!(eval(&rotated, rd), eval(&original, d), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_half_turn_about_z_band1() {
        // 180 degrees about z negates x and y: band 1 stores (-y, z, -x) terms.
        let rotation = ShRotation::new([[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]]);
        let mut coeffs = [0.25f32, 0.5, 0.75];
        rotation.apply(&mut coeffs);
        assert_abs_diff_eq!(coeffs[0], -0.25, epsilon = 1e-4);
        assert_abs_diff_eq!(coeffs[1], 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(coeffs[2], -0.75, epsilon = 1e-4);
    }
}
