// THEORY:
// The `colour_space` module is the constants table of the engine. Every colour
// transform in the system is a fixed linear map, so all of them live here as
// named 3x3 matrices next to the scalar constants of the LUV formula. Keeping
// them in one place means the pixel model reads as a sequence of named steps
// (RGB -> XYZ -> collapse -> RGB) instead of a wall of literals.
//
// Matrix families:
// - RGB <-> XYZ:  sRGB primaries with a D65 white, and the published inverse.
// - XYZ collapse: per-deficiency maps that fold the missing axis onto the two
//                 remaining ones. Z always passes through.
// - RGB <-> LMS:  cone-response space used by the daltonization route.
// - LMS collapse: per-deficiency maps that rebuild the missing cone from the
//                 other two.
// - Correction:   per-deficiency redistribution of the simulation error into
//                 the channels the viewer can still tell apart.

pub type Triple = [f32; 3];

/// A row-major 3x3 matrix applied to column triples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3(pub [[f32; 3]; 3]);

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    #[inline]
    pub fn apply(&self, v: Triple) -> Triple {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    pub fn multiply(&self, other: &Matrix3) -> Matrix3 {
        let mut out = [[0.0f32; 3]; 3];
        for (row, out_row) in out.iter_mut().enumerate() {
            for (col, cell) in out_row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[row][k] * other.0[k][col]).sum();
            }
        }
        Matrix3(out)
    }
}

// --- RGB <-> XYZ ---

pub const RGB_TO_XYZ: Matrix3 = Matrix3([
    [0.412_456_4, 0.357_576_1, 0.180_437_5],
    [0.212_672_9, 0.715_152_2, 0.072_175_0],
    [0.019_333_9, 0.119_192_0, 0.950_304_1],
]);

pub const XYZ_TO_RGB: Matrix3 = Matrix3([
    [3.240_454_2, -1.537_138_5, -0.498_531_4],
    [-0.969_266_0, 1.876_010_8, 0.041_556_0],
    [0.055_643_4, -0.204_025_9, 1.057_225_2],
]);

// --- XYZ deficiency collapse (Z passthrough) ---

pub const XYZ_PROTANOPIA: Matrix3 = Matrix3([
    [0.0, 1.051_182_9, -0.051_160_99],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
]);

pub const XYZ_DEUTERANOPIA: Matrix3 = Matrix3([
    [1.0, 0.0, 0.0],
    [0.951_309_2, 0.0, 0.048_669_92],
    [0.0, 0.0, 1.0],
]);

// --- RGB <-> LMS ---

pub const RGB_TO_LMS: Matrix3 = Matrix3([
    [17.882_4, 43.516_1, 4.119_35],
    [3.455_65, 27.155_4, 3.867_14],
    [0.029_956_6, 0.184_309, 1.467_09],
]);

pub const LMS_TO_RGB: Matrix3 = Matrix3([
    [0.080_944_45, -0.130_504_41, 0.116_721_07],
    [-0.010_248_534, 0.054_019_327, -0.113_614_71],
    [-0.000_365_296_94, -0.004_121_614_7, 0.693_511_4],
]);

// --- LMS deficiency recombination ---

pub const LMS_PROTANOPIA: Matrix3 = Matrix3([
    [0.0, 2.023_44, -2.525_81],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
]);

pub const LMS_DEUTERANOPIA: Matrix3 = Matrix3([
    [1.0, 0.0, 0.0],
    [0.494_207, 0.0, 1.248_27],
    [0.0, 0.0, 1.0],
]);

pub const LMS_TRITANOPIA: Matrix3 = Matrix3([
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [-0.395_913, 0.801_109, 0.0],
]);

// --- Daltonization error redistribution ---

/// Red error is pushed into green and blue.
pub const CORRECTION_PROTANOPIA: Matrix3 =
    Matrix3([[0.0, 0.0, 0.0], [0.7, 1.0, 0.0], [0.7, 0.0, 1.0]]);

/// Green error is pushed into red and blue.
pub const CORRECTION_DEUTERANOPIA: Matrix3 =
    Matrix3([[1.0, 0.7, 0.0], [0.0, 0.0, 0.0], [0.0, 0.7, 1.0]]);

/// Blue error is pushed into red and green.
pub const CORRECTION_TRITANOPIA: Matrix3 =
    Matrix3([[1.0, 0.0, 0.7], [0.0, 1.0, 0.7], [0.0, 0.0, 0.0]]);

// --- LUV ---

/// Reference white used for the LUV conversion (equal-energy, scaled).
pub const REFERENCE_WHITE: Triple = [0.33, 0.33, 0.33];
/// CIE threshold between the linear and cube-root lightness segments.
pub const LUV_EPSILON: f32 = 216.0 / 24389.0;
/// CIE slope of the linear lightness segment.
pub const LUV_KAPPA: f32 = 24389.0 / 27.0;

/// Fixed push toward full intensity used by the heuristic daltonization.
pub const HEURISTIC_PUSH: f32 = 0.28;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near_identity(m: &Matrix3, tolerance: f32) {
        for row in 0..3 {
            for col in 0..3 {
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!(
                    (m.0[row][col] - expected).abs() < tolerance,
                    "cell ({row},{col}) = {}",
                    m.0[row][col]
                );
            }
        }
    }

    #[test]
    fn xyz_matrices_are_inverse_pairs() {
        assert_near_identity(&XYZ_TO_RGB.multiply(&RGB_TO_XYZ), 1e-5);
    }

    #[test]
    fn lms_matrices_are_inverse_pairs() {
        assert_near_identity(&LMS_TO_RGB.multiply(&RGB_TO_LMS), 1e-5);
    }

    #[test]
    fn identity_apply_is_noop() {
        let v = [0.25, -0.5, 3.0];
        assert_eq!(Matrix3::IDENTITY.apply(v), v);
    }

    #[test]
    fn collapse_matrices_pass_z_through() {
        for m in [XYZ_PROTANOPIA, XYZ_DEUTERANOPIA] {
            assert_eq!(m.0[2], [0.0, 0.0, 1.0]);
        }
    }
}
