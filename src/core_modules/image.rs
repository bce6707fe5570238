// THEORY:
// The `Image` module is the spatial layer of the engine. It owns a fixed-size,
// row-major grid of `Pixel`s and implements every whole-image operation the
// trainers need: neighbourhood filters (box blur, perceptual Sobel), per-pixel
// deficiency simulation, and the flattening of the grid into the channel vectors
// a network consumes and produces.
//
// Key architectural principles:
// 1.  **Fixed Size**: pixel count is always width x height. There is no resize;
//     a differently-sized image is a new `Image`.
// 2.  **Explicit 2-D Indexing**: neighbourhoods are expressed as clipped
//     coordinate ranges over the owned buffer. A corner sees 4 samples, a border
//     pixel 6, an interior pixel 9, and every mean divides by what it summed.
// 3.  **Pure Filters**: `blur`, `sobel_colour` and `simulate` read `self` and
//     return a new `Image`. Scratch buffers (the Sobel magnitude field) are
//     local to the call.
// 4.  **Codec Boundary**: decode/encode goes through the `image` crate and only
//     ever sees 8-bit RGB. Everything inside works on float channels.

use crate::core_modules::colour_space::Triple;
use crate::core_modules::pixel::pixel::{Deficiency, Pixel, Rgb};
use crate::core_modules::smart_pixel::smart_pixel::luv_distance;
use crate::error::{DaltonError, Result};
use ::image::ImageEncoder;
use serde::de::IntoDeserializer;
use serde::de::value::StrDeserializer;
use serde::{Deserialize, Serialize};
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

pub const CHANNELS: usize = 3;

/// Which simulation or daltonization route to run over every pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    /// XYZ axis-collapse simulation.
    Protanopia,
    /// XYZ axis-collapse simulation.
    Deuteranopia,
    /// Cone-space simulation without correction.
    Tritanopia,
    LmsProtanopia,
    LmsDeuteranopia,
    LmsTritanopia,
    Heuristic,
}

impl SimulationKind {
    /// How a viewer with `deficiency` sees a colour.
    pub fn simulation_for(deficiency: Deficiency) -> Self {
        match deficiency {
            Deficiency::Protanopia => SimulationKind::Protanopia,
            Deficiency::Deuteranopia => SimulationKind::Deuteranopia,
            Deficiency::Tritanopia => SimulationKind::Tritanopia,
        }
    }

    /// The LMS daltonization that compensates for `deficiency`.
    pub fn daltonization_for(deficiency: Deficiency) -> Self {
        match deficiency {
            Deficiency::Protanopia => SimulationKind::LmsProtanopia,
            Deficiency::Deuteranopia => SimulationKind::LmsDeuteranopia,
            Deficiency::Tritanopia => SimulationKind::LmsTritanopia,
        }
    }

    pub fn apply(self, pixel: &mut Pixel) {
        match self {
            SimulationKind::Protanopia => pixel.simulate_protanopia(),
            SimulationKind::Deuteranopia => pixel.simulate_deuteranopia(),
            SimulationKind::Tritanopia => pixel.simulate_tritanopia(),
            SimulationKind::LmsProtanopia => pixel.lms_protanopia(),
            SimulationKind::LmsDeuteranopia => pixel.lms_deuteranopia(),
            SimulationKind::LmsTritanopia => pixel.lms_tritanopia(),
            SimulationKind::Heuristic => pixel.heuristic_daltonize(),
        }
    }
}

/// Parses the same snake_case names the config file uses.
impl FromStr for SimulationKind {
    type Err = DaltonError;

    fn from_str(name: &str) -> Result<Self> {
        let deserializer: StrDeserializer<'_, serde::de::value::Error> = name.into_deserializer();
        SimulationKind::deserialize(deserializer)
            .map_err(|err| DaltonError::invalid_config("simulation", err.to_string()))
    }
}

/// The colour space a network reads its input channels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSpace {
    #[default]
    Rgb,
    Luv,
}

/// A fixed-size, row-major grid of pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u16,
    height: u16,
    pixels: Vec<Pixel>,
}

impl Image {
    /// Creates an all-black image. Zero width or height is rejected.
    pub fn new(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DaltonError::EmptyImage {
                width: width as u32,
                height: height as u32,
            });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![Pixel::default(); width as usize * height as usize],
        })
    }

    pub fn from_pixels(width: u16, height: u16, pixels: Vec<Pixel>) -> Result<Self> {
        let mut image = Self::new(width, height)?;
        if pixels.len() != image.pixels.len() {
            return Err(DaltonError::dimension_mismatch(
                image.pixels.len(),
                pixels.len(),
                "image pixel buffer",
            ));
        }
        image.pixels = pixels;
        Ok(image)
    }

    pub fn filled(width: u16, height: u16, rgb: Rgb) -> Result<Self> {
        let mut image = Self::new(width, height)?;
        image.fill(rgb);
        Ok(image)
    }

    /// Builds an image from interleaved 8-bit RGB, as handed over by a decoder.
    pub fn from_rgb8(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let width = checked_dimension(width, "image width")?;
        let height = checked_dimension(height, "image height")?;
        let mut image = Self::new(width, height)?;
        let expected = image.pixels.len() * CHANNELS;
        if bytes.len() != expected {
            return Err(DaltonError::dimension_mismatch(expected, bytes.len(), "rgb8 buffer"));
        }
        for (pixel, rgb) in image.pixels.iter_mut().zip(bytes.chunks_exact(CHANNELS)) {
            pixel.rgb = Rgb::from_bytes(rgb[0], rgb[1], rgb[2]);
        }
        Ok(image)
    }

    /// Builds an image from a network output vector, limiting each channel to [0, 1].
    pub fn from_channels(width: u16, height: u16, values: &[f32]) -> Result<Self> {
        let mut image = Self::new(width, height)?;
        let expected = image.pixels.len() * CHANNELS;
        if values.len() != expected {
            return Err(DaltonError::dimension_mismatch(expected, values.len(), "channel buffer"));
        }
        for (pixel, triple) in image.pixels.iter_mut().zip(values.chunks_exact(CHANNELS)) {
            pixel.rgb = Rgb::new(triple[0], triple[1], triple[2]).clamped();
        }
        Ok(image)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width as usize + x
    }

    pub fn get_pixel(&self, x: u16, y: u16) -> Option<&Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(&self.pixels[self.index(x as usize, y as usize)])
    }

    pub fn set_pixel(&mut self, x: u16, y: u16, pixel: Pixel) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(DaltonError::dimension_mismatch(
                self.pixels.len(),
                y as usize * self.width as usize + x as usize,
                "pixel coordinate",
            ));
        }
        let index = self.index(x as usize, y as usize);
        self.pixels[index] = pixel;
        Ok(())
    }

    /// Overwrites the RGB channels of every pixel.
    pub fn fill(&mut self, rgb: Rgb) {
        for pixel in &mut self.pixels {
            pixel.rgb = rgb;
        }
    }

    pub fn convert_to_luv(&mut self) {
        for pixel in &mut self.pixels {
            pixel.convert_rgb_to_luv();
        }
    }

    pub fn ensure_same_dimensions(&self, other: &Image) -> Result<()> {
        if self.width != other.width || self.height != other.height {
            return Err(DaltonError::dimension_mismatch(
                self.pixels.len(),
                other.pixels.len(),
                format!(
                    "image pair {}x{} vs {}x{}",
                    self.width, self.height, other.width, other.height
                ),
            ));
        }
        Ok(())
    }

    /// Mean of every in-bounds sample in the 3x3 window around each pixel.
    pub fn blur(&self) -> Image {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut output = self.clone();

        for y in 0..height {
            let rows = y.saturating_sub(1)..=(y + 1).min(height - 1);
            for x in 0..width {
                let cols = x.saturating_sub(1)..=(x + 1).min(width - 1);
                // f64 accumulation keeps the mean of identical samples exact.
                let mut sum = [0.0f64; 3];
                let mut count = 0u32;
                for ny in rows.clone() {
                    for nx in cols.clone() {
                        let rgb = self.pixels[ny * width + nx].rgb;
                        sum[0] += rgb.red as f64;
                        sum[1] += rgb.green as f64;
                        sum[2] += rgb.blue as f64;
                        count += 1;
                    }
                }
                let divisor = count as f64;
                output.pixels[y * width + x].rgb = Rgb::new(
                    (sum[0] / divisor) as f32,
                    (sum[1] / divisor) as f32,
                    (sum[2] / divisor) as f32,
                );
            }
        }

        output
    }

    /// Perceptual Sobel: gradients are weighted sums of LUV colour distances between
    /// the pixel pairs that straddle each interior sample. The magnitude field is
    /// rescaled by its observed (min, max) and written back as a grayscale map.
    pub fn sobel_colour(&self) -> Image {
        let width = self.width as usize;
        let height = self.height as usize;

        let mut perceptual = self.clone();
        perceptual.convert_to_luv();
        let luv = |x: usize, y: usize| perceptual.pixels[y * width + x].luv;
        let distance = |a: (usize, usize), b: (usize, usize)| luv_distance(&luv(a.0, a.1), &luv(b.0, b.1));

        let mut magnitudes = vec![0.0f32; width * height];
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;

        if width >= 3 && height >= 3 {
            for y in 1..height - 1 {
                for x in 1..width - 1 {
                    let gx = distance((x - 1, y - 1), (x + 1, y - 1))
                        + 2.0 * distance((x - 1, y), (x + 1, y))
                        + distance((x - 1, y + 1), (x + 1, y + 1));
                    let gy = distance((x - 1, y - 1), (x - 1, y + 1))
                        + 2.0 * distance((x, y - 1), (x, y + 1))
                        + distance((x + 1, y - 1), (x + 1, y + 1));
                    let magnitude = (gx * gx + gy * gy).sqrt();
                    magnitudes[y * width + x] = magnitude;
                    min = min.min(magnitude);
                    max = max.max(magnitude);
                }
            }

            if max - min > f32::EPSILON {
                for y in 1..height - 1 {
                    for x in 1..width - 1 {
                        let value = &mut magnitudes[y * width + x];
                        // Literal rescale: divide by max, then subtract min.
                        *value = (*value - min) / max - min;
                    }
                }
            } else {
                tracing::debug!(min, max, "flat sobel field, writing zero edge map");
                magnitudes.iter_mut().for_each(|value| *value = 0.0);
            }
        }

        let mut output = self.clone();
        for (pixel, value) in output.pixels.iter_mut().zip(magnitudes) {
            pixel.rgb = Rgb::new(value, value, value);
        }
        output
    }

    pub fn simulate(&self, kind: SimulationKind) -> Image {
        let mut output = self.clone();
        for pixel in &mut output.pixels {
            kind.apply(pixel);
        }
        output
    }

    /// Flattens the grid into interleaved channel triples, one per pixel.
    pub fn channels(&self, space: InputSpace) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.pixels.len() * CHANNELS);
        for pixel in &self.pixels {
            let triple: Triple = match space {
                InputSpace::Rgb => pixel.rgb.to_array(),
                InputSpace::Luv => {
                    let mut derived = *pixel;
                    derived.convert_rgb_to_luv();
                    derived.luv.to_array()
                }
            };
            values.extend_from_slice(&triple);
        }
        values
    }

    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.rgb.to_bytes()).collect()
    }

    /// Decodes any format the `image` crate understands into a float grid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let decoded = ::image::open(path.as_ref())?.to_rgb8();
        let (width, height) = decoded.dimensions();
        Self::from_rgb8(width, height, decoded.as_raw())
    }

    /// Encodes the grid as an 8-bit PNG.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let output = std::fs::File::create(path.as_ref())?;
        let encoder = ::image::codecs::png::PngEncoder::new(BufWriter::new(output));
        encoder.write_image(
            &self.to_rgb8(),
            self.width as u32,
            self.height as u32,
            ::image::ExtendedColorType::Rgb8,
        )?;
        Ok(())
    }

    /// Saves the image, then re-reads its own quantized channels so the in-memory
    /// grid matches what was written, with LUV re-derived.
    pub fn export(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save(path)?;
        for pixel in &mut self.pixels {
            let [r, g, b] = pixel.rgb.to_bytes();
            pixel.rgb = Rgb::from_bytes(r, g, b);
            pixel.convert_rgb_to_luv();
        }
        Ok(())
    }
}

fn checked_dimension(value: u32, context: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| DaltonError::dimension_mismatch(u16::MAX as usize, value as usize, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn simulation_names_match_the_config_spelling() {
        assert_eq!("tritanopia".parse::<SimulationKind>().unwrap(), SimulationKind::Tritanopia);
        assert_eq!(
            "lms_deuteranopia".parse::<SimulationKind>().unwrap(),
            SimulationKind::LmsDeuteranopia
        );
        assert_eq!("heuristic".parse::<SimulationKind>().unwrap(), SimulationKind::Heuristic);
        let err = "sepia".parse::<SimulationKind>().unwrap_err();
        assert!(matches!(err, DaltonError::InvalidConfiguration { .. }));
    }

    fn ramp(width: u16, height: u16) -> Image {
        let mut image = Image::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let v = (y as f32 * width as f32 + x as f32) / (width as f32 * height as f32);
                image.set_pixel(x, y, Pixel::new(v, 1.0 - v, 0.5)).unwrap();
            }
        }
        image
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        assert!(matches!(Image::new(0, 5), Err(DaltonError::EmptyImage { .. })));
        assert!(matches!(Image::new(5, 0), Err(DaltonError::EmptyImage { .. })));
    }

    #[test]
    fn oversized_decode_is_rejected_before_allocation() {
        let err = Image::from_rgb8(70_000, 1, &[]).unwrap_err();
        assert!(matches!(err, DaltonError::DimensionMismatch { .. }));
    }

    #[test]
    fn blur_uses_in_bounds_neighbour_counts() {
        // A single bright pixel in the top-left corner of a 3x3 image.
        let mut image = Image::new(3, 3).unwrap();
        image.set_pixel(0, 0, Pixel::new(1.0, 1.0, 1.0)).unwrap();
        let blurred = image.blur();
        assert_abs_diff_eq!(blurred.get_pixel(0, 0).unwrap().rgb.red, 1.0 / 4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(blurred.get_pixel(1, 0).unwrap().rgb.red, 1.0 / 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(blurred.get_pixel(1, 1).unwrap().rgb.red, 1.0 / 9.0, epsilon = 1e-6);
        assert_eq!(blurred.get_pixel(2, 2).unwrap().rgb.red, 0.0);
    }

    #[test]
    fn blur_does_not_feed_back_into_itself() {
        let image = ramp(4, 4);
        let blurred = image.blur();
        // Interior pixel (1,1) is the mean of the original 3x3 block.
        let mut expected = 0.0f32;
        for y in 0..3 {
            for x in 0..3 {
                expected += image.get_pixel(x, y).unwrap().rgb.red;
            }
        }
        assert_abs_diff_eq!(blurred.get_pixel(1, 1).unwrap().rgb.red, expected / 9.0, epsilon = 1e-6);
    }

    #[test]
    fn sobel_marks_a_vertical_edge() {
        let mut image = Image::new(5, 5).unwrap();
        for y in 0..5 {
            for x in 3..5 {
                image.set_pixel(x, y, Pixel::new(1.0, 1.0, 1.0)).unwrap();
            }
        }
        let edges = image.sobel_colour();
        // Border rows are never evaluated.
        for x in 0..5 {
            assert_eq!(edges.get_pixel(x, 0).unwrap().rgb.red, 0.0);
            assert_eq!(edges.get_pixel(x, 4).unwrap().rgb.red, 0.0);
        }
        let flat = edges.get_pixel(1, 2).unwrap().rgb.red;
        let edge = edges.get_pixel(2, 2).unwrap().rgb.red;
        assert!(edge > flat);
        let p = edges.get_pixel(2, 2).unwrap().rgb;
        assert_eq!(p.red, p.green);
        assert_eq!(p.green, p.blue);
    }

    #[test]
    fn sobel_on_tiny_image_is_all_zero() {
        let image = ramp(2, 2);
        let edges = image.sobel_colour();
        assert!(edges.pixels().iter().all(|p| p.rgb.is_black()));
    }

    #[test]
    fn simulate_leaves_source_untouched() {
        let image = ramp(3, 2);
        let simulated = image.simulate(SimulationKind::LmsProtanopia);
        assert_eq!(image, ramp(3, 2));
        assert_eq!(simulated.pixel_count(), image.pixel_count());
    }

    #[test]
    fn channels_are_interleaved_per_pixel() {
        let image = Image::filled(2, 1, Rgb::new(0.1, 0.2, 0.3)).unwrap();
        assert_eq!(image.channels(InputSpace::Rgb), vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3]);
        assert_eq!(image.channels(InputSpace::Luv).len(), 6);
    }

    #[test]
    fn from_channels_limits_to_unit_range() {
        let image = Image::from_channels(1, 1, &[-0.5, 0.5, 2.0]).unwrap();
        assert_eq!(image.pixels()[0].rgb, Rgb::new(0.0, 0.5, 1.0));
        assert!(Image::from_channels(1, 1, &[0.0; 4]).is_err());
    }

    #[test]
    fn mismatched_pair_is_reported() {
        let a = Image::new(2, 3).unwrap();
        let b = Image::new(3, 2).unwrap();
        assert!(a.ensure_same_dimensions(&b).is_err());
        assert!(a.ensure_same_dimensions(&a.clone()).is_ok());
    }

    #[test]
    fn set_pixel_out_of_bounds_fails() {
        let mut image = Image::new(2, 2).unwrap();
        assert!(image.set_pixel(2, 0, Pixel::default()).is_err());
        assert!(image.get_pixel(0, 2).is_none());
    }
}
