//! Elliptical 2D Gaussian.

use super::{require_positive, require_range, steep_cutoff, SetupError};
use crate::functions::helpers::ProjectedAxes;

/// Elliptical Gaussian: `I(r) = I_0 exp(-r^2 / (2 sigma^2))` with `r` the
/// deprojected elliptical radius.
#[derive(Debug, Clone)]
pub struct Gaussian {
    x0: f64,
    y0: f64,
    axes: ProjectedAxes,
    i0: f64,
    inv_two_sigma2: f64,
    steep_radius: f64,
}

impl Default for Gaussian {
    fn default() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            axes: ProjectedAxes::new(0.0, 0.0),
            i0: 0.0,
            inv_two_sigma2: 0.0,
            steep_radius: 0.0,
        }
    }
}

impl Gaussian {
    pub(super) const PARAM_LABELS: &'static [&'static str] = &["PA", "ell", "I_0", "sigma"];
    pub(super) const SHORT_NAME: &'static str = "Gaussian";

    pub(super) fn setup(
        &mut self,
        params: &[f64],
        offset: usize,
        x0: f64,
        y0: f64,
    ) -> Result<(), SetupError> {
        let pa = params[offset];
        let ell = params[offset + 1];
        let i0 = params[offset + 2];
        let sigma = params[offset + 3];
        require_range(Self::SHORT_NAME, "ell", ell, 0.0, 1.0)?;
        require_positive(Self::SHORT_NAME, "sigma", sigma)?;

        self.x0 = x0;
        self.y0 = y0;
        self.axes = ProjectedAxes::new(pa, ell);
        self.i0 = i0;
        self.inv_two_sigma2 = 1.0 / (2.0 * sigma * sigma);
        self.steep_radius = steep_cutoff(sigma);
        Ok(())
    }

    #[inline]
    pub(super) fn value(&self, x: f64, y: f64) -> f64 {
        let r = self.axes.radius(x - self.x0, y - self.y0);
        self.i0 * (-r * r * self.inv_two_sigma2).exp()
    }

    pub(super) fn steep_radius(&self) -> f64 {
        self.steep_radius
    }
}
