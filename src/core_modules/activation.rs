// THEORY:
// Layer-wide activation functions. One selector applies to every neuron of a
// layer. The leaky variant uses a fixed 0.01 slope for non-positive inputs.

use serde::{Deserialize, Serialize};

const LEAKY_SLOPE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Sigmoid,
    Tanh,
    #[default]
    Relu,
    LeakyRelu,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            // 1 / (1 + e^-x) stays finite for large |x|, unlike e^x / (1 + e^x).
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => {
                if x <= 0.0 {
                    0.0
                } else {
                    x
                }
            }
            Activation::LeakyRelu => {
                if x <= 0.0 {
                    LEAKY_SLOPE * x
                } else {
                    x
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_is_relu() {
        assert_eq!(Activation::default(), Activation::Relu);
    }

    #[test]
    fn relu_zeroes_non_positive() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.apply(0.0), 0.0);
        assert_eq!(Activation::Relu.apply(1.5), 1.5);
    }

    #[test]
    fn leaky_relu_keeps_small_slope() {
        assert_abs_diff_eq!(Activation::LeakyRelu.apply(-2.0), -0.02, epsilon = 1e-7);
        assert_eq!(Activation::LeakyRelu.apply(3.0), 3.0);
    }

    #[test]
    fn sigmoid_is_centered_and_saturates_finitely() {
        assert_abs_diff_eq!(Activation::Sigmoid.apply(0.0), 0.5, epsilon = 1e-7);
        assert!(Activation::Sigmoid.apply(1000.0).is_finite());
        assert!(Activation::Sigmoid.apply(-1000.0).is_finite());
    }

    #[test]
    fn tanh_and_identity() {
        assert_abs_diff_eq!(Activation::Tanh.apply(0.5), 0.5f32.tanh(), epsilon = 1e-7);
        assert_eq!(Activation::Identity.apply(-7.25), -7.25);
    }
}
