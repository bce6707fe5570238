// THEORY (Pixel Colour Model):
// The `Pixel` module is the most fundamental unit of the engine. A pixel holds two
// co-derived views of one sample: the RGB triple, which is the ground truth, and
// the LUV triple, a perceptual view in which Euclidean distance approximates how
// different two colours look.
//
// Key principles:
// 1) RGB is authoritative. LUV is only valid right after `convert_rgb_to_luv()`;
//    mutating RGB does not invalidate it, callers re-derive when they need it.
// 2) Single-pixel scope. Everything here reads one pixel. Comparisons live in
//    `SmartPixel`, neighbourhoods live in `Image`.
// 3) Channels are not clamped during intermediate math. Only the daltonization
//    routes, whose output is meant to be displayed, clamp to [0, 1].
//
// Simulation routes:
// - matrix: RGB -> XYZ -> deficiency collapse -> RGB (protanopia, deuteranopia)
// - LMS:    RGB -> LMS -> cone rebuild -> RGB, then the simulation error is
//           redistributed into the visible channels and the result clamped
// - heuristic: parameter-free push of every channel toward full intensity

pub mod pixel {
    use crate::core_modules::colour_space::*;
    use serde::{Deserialize, Serialize};

    pub type Channel = f32;

    /// The three colour-vision deficiencies the engine can simulate or correct.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Deficiency {
        Protanopia,
        Deuteranopia,
        Tritanopia,
    }

    /// Linear RGB, nominally in [0, 1].
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Rgb {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    impl Rgb {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Builds a channel triple from 8-bit values, scaling by 1/255.
        pub fn from_bytes(red: u8, green: u8, blue: u8) -> Self {
            Self {
                red: red as Channel / 255.0,
                green: green as Channel / 255.0,
                blue: blue as Channel / 255.0,
            }
        }

        pub fn to_array(self) -> Triple {
            [self.red, self.green, self.blue]
        }

        pub fn from_array(values: Triple) -> Self {
            Self::new(values[0], values[1], values[2])
        }

        pub fn clamped(self) -> Self {
            Self::new(
                self.red.clamp(0.0, 1.0),
                self.green.clamp(0.0, 1.0),
                self.blue.clamp(0.0, 1.0),
            )
        }

        /// Quantizes each clamped channel back to a byte.
        pub fn to_bytes(self) -> [u8; 3] {
            let c = self.clamped();
            [
                (c.red * 255.0).round() as u8,
                (c.green * 255.0).round() as u8,
                (c.blue * 255.0).round() as u8,
            ]
        }

        pub fn is_black(&self) -> bool {
            self.red == 0.0 && self.green == 0.0 && self.blue == 0.0
        }
    }

    /// CIE L*u*v* lightness and chroma axes.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Luv {
        pub l: f32,
        pub u: f32,
        pub v: f32,
    }

    impl Luv {
        pub fn to_array(self) -> Triple {
            [self.l, self.u, self.v]
        }
    }

    /// A single sample with its RGB ground truth and the last derived LUV view.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        pub rgb: Rgb,
        pub luv: Luv,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self {
                rgb: Rgb::new(red, green, blue),
                luv: Luv::default(),
            }
        }

        pub fn from_rgb(rgb: Rgb) -> Self {
            Self {
                rgb,
                luv: Luv::default(),
            }
        }

        pub fn rgb_to_xyz(&self) -> Triple {
            RGB_TO_XYZ.apply(self.rgb.to_array())
        }

        /// Derives the LUV triple from the current RGB channels.
        pub fn convert_rgb_to_luv(&mut self) {
            // Pure black has a zero chromaticity denominator.
            if self.rgb.is_black() {
                self.luv = Luv::default();
                return;
            }

            let [x, y, z] = self.rgb_to_xyz();
            let [xr, yr, zr] = REFERENCE_WHITE;

            let y_ratio = y / yr;
            let l = if y_ratio > LUV_EPSILON {
                116.0 * y_ratio.cbrt() - 16.0
            } else {
                LUV_KAPPA * y_ratio
            };

            let denominator = x + 15.0 * y + 3.0 * z;
            let reference_denominator = xr + 15.0 * yr + 3.0 * zr;
            // Out-of-gamut channels can cancel the denominator; chroma is undefined there.
            if denominator.abs() <= f32::EPSILON || !denominator.is_finite() {
                self.luv = Luv { l, u: 0.0, v: 0.0 };
                return;
            }

            let u_prime = 4.0 * x / denominator;
            let v_prime = 9.0 * y / denominator;
            let ur_prime = 4.0 * xr / reference_denominator;
            let vr_prime = 9.0 * yr / reference_denominator;

            self.luv = Luv {
                l,
                u: 13.0 * l * (u_prime - ur_prime),
                v: 13.0 * l * (v_prime - vr_prime),
            };
        }

        // --- matrix route ---

        fn simulate_in_xyz(&mut self, collapse: &Matrix3) {
            let xyz = self.rgb_to_xyz();
            let collapsed = collapse.apply(xyz);
            self.rgb = Rgb::from_array(XYZ_TO_RGB.apply(collapsed));
        }

        pub fn simulate_protanopia(&mut self) {
            self.simulate_in_xyz(&XYZ_PROTANOPIA);
        }

        pub fn simulate_deuteranopia(&mut self) {
            self.simulate_in_xyz(&XYZ_DEUTERANOPIA);
        }

        // --- LMS route ---

        fn simulated_in_lms(&self, rebuild: &Matrix3) -> Triple {
            LMS_TO_RGB.apply(rebuild.apply(RGB_TO_LMS.apply(self.rgb.to_array())))
        }

        /// Cone-space simulation for the deficiency the XYZ route does not cover.
        pub fn simulate_tritanopia(&mut self) {
            self.rgb = Rgb::from_array(self.simulated_in_lms(&LMS_TRITANOPIA));
        }

        fn daltonize_in_lms(&mut self, rebuild: &Matrix3, correction: &Matrix3) {
            let original = self.rgb.to_array();
            let simulated = self.simulated_in_lms(rebuild);
            let error = [
                original[0] - simulated[0],
                original[1] - simulated[1],
                original[2] - simulated[2],
            ];
            let shift = correction.apply(error);
            self.rgb = Rgb::new(
                original[0] + shift[0],
                original[1] + shift[1],
                original[2] + shift[2],
            )
            .clamped();
        }

        pub fn lms_protanopia(&mut self) {
            self.daltonize_in_lms(&LMS_PROTANOPIA, &CORRECTION_PROTANOPIA);
        }

        pub fn lms_deuteranopia(&mut self) {
            self.daltonize_in_lms(&LMS_DEUTERANOPIA, &CORRECTION_DEUTERANOPIA);
        }

        pub fn lms_tritanopia(&mut self) {
            self.daltonize_in_lms(&LMS_TRITANOPIA, &CORRECTION_TRITANOPIA);
        }

        pub fn lms_daltonize(&mut self, deficiency: Deficiency) {
            match deficiency {
                Deficiency::Protanopia => self.lms_protanopia(),
                Deficiency::Deuteranopia => self.lms_deuteranopia(),
                Deficiency::Tritanopia => self.lms_tritanopia(),
            }
        }

        // --- heuristic route ---

        /// Pushes red and green toward 1; blue follows whichever of the two ended stronger.
        pub fn heuristic_daltonize(&mut self) {
            let red = self.rgb.red + (1.0 - self.rgb.red) * HEURISTIC_PUSH;
            let green = self.rgb.green + (1.0 - self.rgb.green) * HEURISTIC_PUSH;
            let blue = if red.abs() > green.abs() {
                self.rgb.blue + (1.0 - self.rgb.blue) * HEURISTIC_PUSH
            } else {
                self.rgb.blue - self.rgb.blue * HEURISTIC_PUSH
            };
            self.rgb = Rgb::new(red, green, blue).clamped();
        }
    }

    impl From<Rgb> for Pixel {
        fn from(rgb: Rgb) -> Self {
            Pixel::from_rgb(rgb)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use approx::assert_abs_diff_eq;

        #[test]
        fn black_shortcut_yields_zero_luv() {
            let mut p = Pixel::new(0.0, 0.0, 0.0);
            p.luv = Luv { l: 9.0, u: 9.0, v: 9.0 };
            p.convert_rgb_to_luv();
            assert_eq!(p.luv, Luv::default());
        }

        #[test]
        fn gray_has_positive_lightness_and_finite_chroma() {
            let mut p = Pixel::new(0.5, 0.5, 0.5);
            p.convert_rgb_to_luv();
            assert!(p.luv.l > 0.0);
            assert!(p.luv.u.is_finite() && p.luv.v.is_finite());
        }

        #[test]
        fn dark_pixel_uses_linear_lightness_segment() {
            let mut p = Pixel::new(0.001, 0.001, 0.001);
            p.convert_rgb_to_luv();
            let y = p.rgb_to_xyz()[1];
            assert_abs_diff_eq!(p.luv.l, LUV_KAPPA * y / REFERENCE_WHITE[1], epsilon = 1e-4);
        }

        #[test]
        fn cancelling_denominator_keeps_luv_finite() {
            // Chosen so that X + 15Y + 3Z is numerically zero.
            let mut p = Pixel::new(1.0, -0.3, 0.0);
            let [x, y, z] = p.rgb_to_xyz();
            let scale = -(x + 15.0 * y + 3.0 * z);
            p.rgb.red += scale / (RGB_TO_XYZ.0[0][0] + 15.0 * RGB_TO_XYZ.0[1][0] + 3.0 * RGB_TO_XYZ.0[2][0]);
            p.convert_rgb_to_luv();
            assert!(p.luv.l.is_finite());
            assert!(p.luv.u.is_finite());
            assert!(p.luv.v.is_finite());
        }

        #[test]
        fn luv_is_not_refreshed_on_rgb_mutation() {
            let mut p = Pixel::new(0.2, 0.4, 0.6);
            p.convert_rgb_to_luv();
            let before = p.luv;
            p.rgb.red = 0.9;
            assert_eq!(p.luv, before);
        }

        #[test]
        fn lms_routes_clamp_into_unit_range() {
            for deficiency in [Deficiency::Protanopia, Deficiency::Deuteranopia, Deficiency::Tritanopia] {
                let mut p = Pixel::new(1.0, 0.0, 1.0);
                p.lms_daltonize(deficiency);
                for c in p.rgb.to_array() {
                    assert!((0.0..=1.0).contains(&c), "{deficiency:?} produced {c}");
                }
            }
        }

        #[test]
        fn lms_routes_leave_gray_nearly_untouched() {
            let mut p = Pixel::new(0.5, 0.5, 0.5);
            p.lms_deuteranopia();
            for c in p.rgb.to_array() {
                assert_abs_diff_eq!(c, 0.5, epsilon = 0.02);
            }
        }

        #[test]
        fn matrix_route_keeps_neutral_axis_close() {
            let mut p = Pixel::new(0.0, 0.0, 0.0);
            p.simulate_protanopia();
            assert_eq!(p.rgb, Rgb::default());
        }

        #[test]
        fn tritanopia_simulation_preserves_neutral_axis() {
            let mut p = Pixel::new(0.5, 0.5, 0.5);
            p.simulate_tritanopia();
            for c in p.rgb.to_array() {
                assert_abs_diff_eq!(c, 0.5, epsilon = 1e-3);
            }
        }

        #[test]
        fn heuristic_blue_follows_stronger_channel() {
            let mut reddish = Pixel::new(0.8, 0.2, 0.5);
            reddish.heuristic_daltonize();
            assert!(reddish.rgb.blue > 0.5);

            let mut greenish = Pixel::new(0.2, 0.8, 0.5);
            greenish.heuristic_daltonize();
            assert!(greenish.rgb.blue < 0.5);
            assert_abs_diff_eq!(greenish.rgb.blue, 0.5 * (1.0 - HEURISTIC_PUSH), epsilon = 1e-6);
        }

        #[test]
        fn byte_round_trip() {
            let rgb = Rgb::from_bytes(12, 128, 255);
            assert_eq!(rgb.to_bytes(), [12, 128, 255]);
        }
    }
}
