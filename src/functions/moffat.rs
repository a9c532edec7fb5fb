//! Elliptical Moffat profile.

use super::{require_positive, require_range, steep_cutoff, SetupError};
use crate::functions::helpers::ProjectedAxes;

/// Moffat profile: `I(r) = I_0 / (1 + (r/alpha)^2)^beta`, with `alpha`
/// derived from the FWHM. The broad power-law wings make it the usual
/// analytic stand-in for ground-based seeing PSFs.
#[derive(Debug, Clone)]
pub struct Moffat {
    x0: f64,
    y0: f64,
    axes: ProjectedAxes,
    i0: f64,
    inv_alpha2: f64,
    beta: f64,
    steep_radius: f64,
}

impl Default for Moffat {
    fn default() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            axes: ProjectedAxes::new(0.0, 0.0),
            i0: 0.0,
            inv_alpha2: 0.0,
            beta: 0.0,
            steep_radius: 0.0,
        }
    }
}

impl Moffat {
    pub(super) const PARAM_LABELS: &'static [&'static str] = &["PA", "ell", "I_0", "fwhm", "beta"];
    pub(super) const SHORT_NAME: &'static str = "Moffat";

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
        let fwhm = params[offset + 3];
        let beta = params[offset + 4];
        require_range(Self::SHORT_NAME, "ell", ell, 0.0, 1.0)?;
        require_positive(Self::SHORT_NAME, "fwhm", fwhm)?;
        require_positive(Self::SHORT_NAME, "beta", beta)?;

        let alpha = 0.5 * fwhm / (2f64.powf(1.0 / beta) - 1.0).sqrt();

        self.x0 = x0;
        self.y0 = y0;
        self.axes = ProjectedAxes::new(pa, ell);
        self.i0 = i0;
        self.inv_alpha2 = 1.0 / (alpha * alpha);
        self.beta = beta;
        self.steep_radius = steep_cutoff(fwhm);
        Ok(())
    }

    #[inline]
    pub(super) fn value(&self, x: f64, y: f64) -> f64 {
        let r = self.axes.radius(x - self.x0, y - self.y0);
        self.i0 * (1.0 + r * r * self.inv_alpha2).powf(-self.beta)
    }

    pub(super) fn steep_radius(&self) -> f64 {
        self.steep_radius
    }
}
