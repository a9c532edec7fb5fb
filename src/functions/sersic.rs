//! Sersic profile.

use super::{require_positive, require_range, steep_cutoff, SetupError};
use crate::functions::helpers::{sersic_bn, ProjectedAxes};

/// Sersic profile:
/// `I(r) = I_e exp(-b_n ((r/r_e)^(1/n) - 1))`
/// where `I_e` is the intensity at the effective (half-light) radius `r_e`
/// and `b_n` is fixed by `n` so that `r_e` encloses half the total flux.
/// `n = 1` is an exponential, `n = 4` the de Vaucouleurs profile.
#[derive(Debug, Clone)]
pub struct Sersic {
    x0: f64,
    y0: f64,
    axes: ProjectedAxes,
    i_e: f64,
    bn: f64,
    inv_n: f64,
    inv_re: f64,
    steep_radius: f64,
}

impl Default for Sersic {
    fn default() -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            axes: ProjectedAxes::new(0.0, 0.0),
            i_e: 0.0,
            bn: 0.0,
            inv_n: 0.0,
            inv_re: 0.0,
            steep_radius: 0.0,
        }
    }
}

impl Sersic {
    pub(super) const PARAM_LABELS: &'static [&'static str] = &["PA", "ell", "n", "I_e", "r_e"];
    pub(super) const SHORT_NAME: &'static str = "Sersic";

    pub(super) fn setup(
        &mut self,
        params: &[f64],
        offset: usize,
        x0: f64,
        y0: f64,
    ) -> Result<(), SetupError> {
        let pa = params[offset];
        let ell = params[offset + 1];
        let n = params[offset + 2];
        let i_e = params[offset + 3];
        let r_e = params[offset + 4];
        require_range(Self::SHORT_NAME, "ell", ell, 0.0, 1.0)?;
        require_positive(Self::SHORT_NAME, "n", n)?;
        require_positive(Self::SHORT_NAME, "r_e", r_e)?;

        self.x0 = x0;
        self.y0 = y0;
        self.axes = ProjectedAxes::new(pa, ell);
        self.i_e = i_e;
        self.bn = sersic_bn(n);
        self.inv_n = 1.0 / n;
        self.inv_re = 1.0 / r_e;
        self.steep_radius = steep_cutoff(r_e);
        Ok(())
    }

    #[inline]
    pub(super) fn value(&self, x: f64, y: f64) -> f64 {
        let r = self.axes.radius(x - self.x0, y - self.y0);
        self.i_e * (-self.bn * ((r * self.inv_re).powf(self.inv_n) - 1.0)).exp()
    }

    pub(super) fn steep_radius(&self) -> f64 {
        self.steep_radius
    }
}
