//! Point-spread-function kernels.
//!
//! A [`PsfKernel`] is a 2D array of real weights, validated finite and
//! area-normalized to 1 on construction so that convolution preserves total
//! flux. Generators are provided for the two analytic profiles most commonly
//! used as stand-in PSFs (circular Gaussian and Moffat).

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors raised when constructing a PSF kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PsfError {
    #[error("PSF kernel is empty")]
    Empty,
    #[error("PSF kernel contains a non-finite value at ({row}, {col})")]
    NonFinite { row: usize, col: usize },
    #[error("PSF kernel sums to {sum}, cannot normalize")]
    NonPositiveSum { sum: f64 },
    #[error("PSF kernel size must be odd (got {size})")]
    EvenSize { size: usize },
}

/// An area-normalized convolution kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfKernel {
    weights: Array2<f64>,
}

impl PsfKernel {
    /// Validate and normalize a raw weight array.
    ///
    /// The input may carry any positive total (e.g. a PSF image in counts);
    /// it is rescaled so the weights sum to exactly 1.
    pub fn new(mut weights: Array2<f64>) -> Result<Self, PsfError> {
        if weights.is_empty() {
            return Err(PsfError::Empty);
        }
        for ((row, col), &v) in weights.indexed_iter() {
            if !v.is_finite() {
                return Err(PsfError::NonFinite { row, col });
            }
        }
        let sum: f64 = weights.sum();
        if !(sum > 0.0) {
            return Err(PsfError::NonPositiveSum { sum });
        }
        weights.mapv_inplace(|v| v / sum);
        Ok(Self { weights })
    }

    /// Circular Gaussian kernel of odd `size`, standard deviation `sigma`.
    pub fn gaussian(size: usize, sigma: f64) -> Result<Self, PsfError> {
        Self::radial(size, |r2| (-r2 / (2.0 * sigma * sigma)).exp())
    }

    /// Circular Moffat kernel of odd `size`, given FWHM and shape `beta`.
    pub fn moffat(size: usize, fwhm: f64, beta: f64) -> Result<Self, PsfError> {
        let alpha = 0.5 * fwhm / (2f64.powf(1.0 / beta) - 1.0).sqrt();
        Self::radial(size, |r2| (1.0 + r2 / (alpha * alpha)).powf(-beta))
    }

    fn radial(size: usize, profile: impl Fn(f64) -> f64) -> Result<Self, PsfError> {
        if size % 2 == 0 {
            return Err(PsfError::EvenSize { size });
        }
        let center = (size / 2) as f64;
        let mut weights = Array2::zeros((size, size));
        for ((row, col), w) in weights.indexed_iter_mut() {
            let dx = col as f64 - center;
            let dy = row as f64 - center;
            *w = profile(dx * dx + dy * dy);
        }
        Self::new(weights)
    }

    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// Kernel width in columns.
    pub fn n_cols(&self) -> usize {
        self.weights.dim().1
    }

    /// Kernel height in rows.
    pub fn n_rows(&self) -> usize {
        self.weights.dim().0
    }
}
