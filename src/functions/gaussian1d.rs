//! One-dimensional Gaussian profile.

use super::{require_positive, SetupError};
use crate::functions::helpers::mag_to_intensity;

/// Gaussian profile varying only along the x axis:
/// `I(x) = I_0 exp(-(x - x0)^2 / (2 sigma^2))`.
///
/// Unlike the 2D kinds, the central brightness parameter `mu_0` is a
/// surface brightness in mag/arcsec^2; setup converts it to linear
/// intensity through the photometric zero point.
#[derive(Debug, Clone, Default)]
pub struct Gaussian1d {
    x0: f64,
    i0: f64,
    inv_sigma: f64,
}

impl Gaussian1d {
    pub(super) const PARAM_LABELS: &'static [&'static str] = &["mu_0", "sigma"];
    pub(super) const SHORT_NAME: &'static str = "Gaussian-1D";

    pub(super) fn setup(
        &mut self,
        params: &[f64],
        offset: usize,
        x0: f64,
        zero_point: f64,
    ) -> Result<(), SetupError> {
        let mu_0 = params[offset];
        let sigma = params[offset + 1];
        require_positive(Self::SHORT_NAME, "sigma", sigma)?;

        self.x0 = x0;
        self.i0 = mag_to_intensity(zero_point, mu_0);
        self.inv_sigma = 1.0 / sigma;
        Ok(())
    }

    #[inline]
    pub(super) fn value(&self, x: f64, _y: f64) -> f64 {
        let scaled = (x - self.x0).abs() * self.inv_sigma;
        self.i0 * (-0.5 * scaled * scaled).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn peak_from_zero_point() {
        let mut g = Gaussian1d::default();
        g.setup(&[20.0, 3.0], 0, 16.0, 25.0).unwrap();
        // 10^(0.4 * (25 - 20)) = 100
        assert_relative_eq!(g.value(16.0, 7.0), 100.0, epsilon = 1e-10);
        // One sigma off the ridge
        assert_relative_eq!(g.value(19.0, 0.0), 100.0 * (-0.5f64).exp(), epsilon = 1e-10);
    }

    #[test]
    fn independent_of_y() {
        let mut g = Gaussian1d::default();
        g.setup(&[22.0, 2.0], 0, 10.0, 25.0).unwrap();
        assert_eq!(g.value(12.0, -5.0), g.value(12.0, 300.0));
    }

    #[test]
    fn rejects_non_positive_sigma() {
        let mut g = Gaussian1d::default();
        let err = g.setup(&[20.0, 0.0], 0, 16.0, 25.0).unwrap_err();
        assert!(matches!(err, SetupError::OutOfDomain { label: "sigma", .. }));
    }
}
