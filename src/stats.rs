//! Scanning statistics over pixel buffers.

use num_traits::Float;

/// Single-pass min/max/finiteness scan.
///
/// NaN and infinite samples are counted instead of poisoning the result,
/// so a caller can report them and still read the extrema of the finite
/// part of the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelScan<T: Float> {
    min: Option<T>,
    max: Option<T>,
    non_finite: usize,
}

impl<T: Float> PixelScan<T> {
    pub fn over<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut min = None;
        let mut max = None;
        let mut non_finite = 0;
        for v in values {
            if !v.is_finite() {
                non_finite += 1;
                continue;
            }
            min = Some(match min {
                Some(m) if m < v => m,
                _ => v,
            });
            max = Some(match max {
                Some(m) if m > v => m,
                _ => v,
            });
        }
        Self {
            min,
            max,
            non_finite,
        }
    }

    /// Minimum finite value, if any finite value was seen.
    pub fn min(&self) -> Option<T> {
        self.min
    }

    /// Maximum finite value, if any finite value was seen.
    pub fn max(&self) -> Option<T> {
        self.max
    }

    /// Number of NaN or infinite samples.
    pub fn non_finite(&self) -> usize {
        self.non_finite
    }

    pub fn all_finite(&self) -> bool {
        self.non_finite == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extrema_of_plain_data() {
        let scan = PixelScan::over([1.0f64, 5.0, -3.0, 2.0]);
        assert_eq!(scan.min(), Some(-3.0));
        assert_eq!(scan.max(), Some(5.0));
        assert!(scan.all_finite());
    }

    #[test]
    fn counts_non_finite_without_poisoning_extrema() {
        let scan = PixelScan::over([1.0f64, f64::NAN, 7.0, f64::INFINITY]);
        assert_eq!(scan.non_finite(), 2);
        assert!(!scan.all_finite());
        assert_eq!(scan.min(), Some(1.0));
        assert_eq!(scan.max(), Some(7.0));
    }

    #[test]
    fn empty_input() {
        let scan = PixelScan::<f64>::over([]);
        assert_eq!(scan.min(), None);
        assert_eq!(scan.max(), None);
        assert!(scan.all_finite());
    }

    #[test]
    fn works_for_f32() {
        let scan = PixelScan::over([0.5f32, 0.25]);
        assert_eq!(scan.max(), Some(0.5f32));
    }
}
