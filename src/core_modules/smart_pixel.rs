// THEORY:
// The `SmartPixel` module provides the comparative lens of the engine. Where
// `Pixel` only knows about itself, a `SmartPixel` answers "how different do these
// two samples look?". The single metric it exposes is the CIE-76 colour
// difference: Euclidean distance in LUV. It is both the edge signal of the
// perceptual Sobel operator and the fitness signal of the genetic trainer.
//
// `SmartPixel` derives and caches the LUV view at construction, so a pixel compared
// against many neighbours is converted once.

pub mod smart_pixel {
    use crate::core_modules::colour_space::Triple;
    use crate::core_modules::pixel::pixel::{Luv, Pixel, Rgb};

    pub type ColourDifference = f32;

    /// A pixel wrapped with its freshly derived LUV triple.
    #[derive(Debug, Clone, Copy)]
    pub struct SmartPixel {
        pub pixel: Pixel,
    }

    impl SmartPixel {
        pub fn new(mut pixel: Pixel) -> Self {
            pixel.convert_rgb_to_luv();
            Self { pixel }
        }

        pub fn from_triple(values: Triple) -> Self {
            Self::new(Pixel::from_rgb(Rgb::from_array(values)))
        }

        pub fn luv(&self) -> Luv {
            self.pixel.luv
        }

        pub fn colour_difference(&self, other: &SmartPixel) -> ColourDifference {
            luv_distance(&self.pixel.luv, &other.pixel.luv)
        }
    }

    /// Euclidean distance between two already-derived LUV triples.
    #[inline]
    pub fn luv_distance(first: &Luv, second: &Luv) -> ColourDifference {
        ((second.l - first.l).powi(2) + (second.u - first.u).powi(2) + (second.v - first.v).powi(2))
            .sqrt()
    }

    /// Derives LUV for both pixels in place, then measures their distance.
    pub fn colour_difference(first: &mut Pixel, second: &mut Pixel) -> ColourDifference {
        first.convert_rgb_to_luv();
        second.convert_rgb_to_luv();
        luv_distance(&first.luv, &second.luv)
    }

}
