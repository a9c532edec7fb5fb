//! Uniform sky background.

use super::SetupError;

/// Constant intensity added to every pixel. The single parameter `I_sky`
/// may be negative (over-subtracted backgrounds are common in real data).
#[derive(Debug, Clone, Default)]
pub struct FlatSky {
    i_sky: f64,
}

impl FlatSky {
    pub(super) const PARAM_LABELS: &'static [&'static str] = &["I_sky"];
    pub(super) const SHORT_NAME: &'static str = "FlatSky";

    pub(super) fn setup(&mut self, params: &[f64], offset: usize) -> Result<(), SetupError> {
        self.i_sky = params[offset];
        Ok(())
    }

    #[inline]
    pub(super) fn value(&self, _x: f64, _y: f64) -> f64 {
        self.i_sky
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_everywhere() {
        let mut sky = FlatSky::default();
        sky.setup(&[0.0, -3.5], 1).unwrap();
        assert_eq!(sky.value(1.0, 1.0), -3.5);
        assert_eq!(sky.value(500.0, -20.0), -3.5);
    }
}
