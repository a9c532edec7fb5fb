//! Shared math for surface-brightness components: position-angle
//! deprojection, magnitude conversion, and the Sersic shape coefficient.

/// Convert a surface brightness in mag/arcsec^2 to linear intensity using
/// the photometric zero point: `I = 10^(0.4 (ZP - mu))`.
#[inline]
pub(crate) fn mag_to_intensity(zero_point: f64, mu: f64) -> f64 {
    10f64.powf(0.4 * (zero_point - mu))
}

/// Pre-computed rotation and flattening for an elliptical component.
///
/// The position angle is measured counter-clockwise from the +x axis, in
/// degrees. Sky offsets are rotated into the component frame (xp along the
/// major axis) and the minor-axis coordinate is stretched by `1/(1 - ell)`
/// so that equal values of [`ProjectedAxes::radius`] trace the elliptical
/// isophote.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProjectedAxes {
    cos_pa: f64,
    sin_pa: f64,
    inv_q: f64,
}

impl ProjectedAxes {
    pub fn new(pa_deg: f64, ell: f64) -> Self {
        let pa_rad = pa_deg.to_radians();
        Self {
            cos_pa: pa_rad.cos(),
            sin_pa: pa_rad.sin(),
            inv_q: 1.0 / (1.0 - ell),
        }
    }

    /// Rotate a sky offset into (major, minor) axis coordinates.
    #[inline]
    pub fn rotate(&self, dx: f64, dy: f64) -> (f64, f64) {
        let xp = dx * self.cos_pa + dy * self.sin_pa;
        let yp = -dx * self.sin_pa + dy * self.cos_pa;
        (xp, yp)
    }

    /// Deprojected elliptical radius of a sky offset.
    #[inline]
    pub fn radius(&self, dx: f64, dy: f64) -> f64 {
        let (xp, yp) = self.rotate(dx, dy);
        let yq = yp * self.inv_q;
        (xp * xp + yq * yq).sqrt()
    }
}

/// Sersic shape coefficient `b_n`, defined by `Gamma(2n) = 2 gamma(2n, b_n)`.
///
/// For `n >= 0.36` the Ciotti & Bertin (1999) asymptotic expansion is
/// accurate to better than 1e-6; below that the polynomial fit of
/// MacArthur, Courteau & Holtzman (2003) takes over.
pub(crate) fn sersic_bn(n: f64) -> f64 {
    if n >= 0.36 {
        2.0 * n - 1.0 / 3.0 + 4.0 / (405.0 * n) + 46.0 / (25515.0 * n * n)
            + 131.0 / (1_148_175.0 * n * n * n)
            - 2_194_697.0 / (30_690_717_750.0 * n * n * n * n)
    } else {
        0.01945 - 0.8902 * n + 10.95 * n * n - 19.67 * n * n * n + 13.43 * n * n * n * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mag_conversion() {
        assert_relative_eq!(mag_to_intensity(25.0, 20.0), 100.0, epsilon = 1e-10);
        assert_relative_eq!(mag_to_intensity(25.0, 25.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_pa_round_disk_radius_is_euclidean() {
        let axes = ProjectedAxes::new(0.0, 0.0);
        assert_relative_eq!(axes.radius(3.0, 4.0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_moves_major_axis() {
        // PA = 90: the major axis lies along +y, so a +y offset maps to +xp.
        let axes = ProjectedAxes::new(90.0, 0.0);
        let (xp, yp) = axes.rotate(0.0, 2.0);
        assert_relative_eq!(xp, 2.0, epsilon = 1e-12);
        assert_relative_eq!(yp, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ellipticity_stretches_minor_axis() {
        let axes = ProjectedAxes::new(0.0, 0.5);
        // On the minor axis a physical offset of 1 is 2 scale radii
        assert_relative_eq!(axes.radius(0.0, 1.0), 2.0, epsilon = 1e-12);
        // The major axis is unaffected
        assert_relative_eq!(axes.radius(1.0, 0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn sersic_bn_reference_values() {
        // b_1 = 1.6783469900... (exact solution of Gamma(2) = 2 gamma(2, b));
        // the asymptotic expansion is good to ~5e-5 at n = 1
        assert_relative_eq!(sersic_bn(1.0), 1.67834699, epsilon = 1e-4);
        // de Vaucouleurs value b_4 = 7.669
        assert_relative_eq!(sersic_bn(4.0), 7.669, epsilon = 1e-3);
    }

    #[test]
    fn sersic_bn_is_continuous_at_branch_point() {
        let below = sersic_bn(0.359);
        let above = sersic_bn(0.361);
        assert!((below - above).abs() < 0.01);
    }
}
