//! PSF convolution via zero-padded FFTs.
//!
//! The convolver is planned once for a fixed image geometry and PSF. The
//! padded size is `(n_cols + p_cols - 1, n_rows + p_rows - 1)` rounded up
//! to numbers with prime factors no larger than 7, where mixed-radix FFTs
//! are fast. The PSF is embedded wrap-shifted about its center so that the
//! convolved image stays aligned with the input, and its forward transform
//! is cached across calls.
//!
//! Padding makes the circular convolution equal to the linear one over the
//! cropped output, so there are no wrap-around artifacts at image edges,
//! and an area-normalized PSF preserves total flux to FFT round-off.

use std::sync::Arc;

use ndarray::Array2;
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use thiserror::Error;

use crate::psf::PsfKernel;

/// Errors from convolver planning or evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvolveError {
    #[error(
        "PSF kernel ({kernel_cols}x{kernel_rows}) exceeds the image ({image_cols}x{image_rows})"
    )]
    KernelLargerThanImage {
        kernel_cols: usize,
        kernel_rows: usize,
        image_cols: usize,
        image_rows: usize,
    },
    #[error("buffer is {got_rows}x{got_cols} but the convolver was planned for {rows}x{cols}")]
    GeometryMismatch {
        got_cols: usize,
        got_rows: usize,
        cols: usize,
        rows: usize,
    },
    #[error("FFT planning failed for padded size {cols}x{rows}")]
    PlanFailed { cols: usize, rows: usize },
}

/// Smallest 7-smooth integer >= `n`.
fn next_fast_len(n: usize) -> usize {
    let mut candidate = n.max(1);
    loop {
        let mut m = candidate;
        for p in [2, 3, 5, 7] {
            while m % p == 0 {
                m /= p;
            }
        }
        if m == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

fn transpose(src: &[Complex64], rows: usize, cols: usize, dst: &mut [Complex64]) {
    for r in 0..rows {
        for c in 0..cols {
            dst[c * rows + r] = src[r * cols + c];
        }
    }
}

/// A convolver with cached FFT plans and a cached PSF transform, tied to
/// one image geometry. Rebuild it when the PSF or geometry changes.
pub struct FftConvolver {
    n_cols: usize,
    n_rows: usize,
    pad_cols: usize,
    pad_rows: usize,
    row_fwd: Arc<dyn Fft<f64>>,
    row_inv: Arc<dyn Fft<f64>>,
    col_fwd: Arc<dyn Fft<f64>>,
    col_inv: Arc<dyn Fft<f64>>,
    /// PSF spectrum, stored in the column-major intermediate layout
    /// produced by [`FftConvolver::forward`].
    psf_freq: Vec<Complex64>,
}

impl std::fmt::Debug for FftConvolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftConvolver")
            .field("n_cols", &self.n_cols)
            .field("n_rows", &self.n_rows)
            .field("pad_cols", &self.pad_cols)
            .field("pad_rows", &self.pad_rows)
            .finish()
    }
}

impl FftConvolver {
    /// Plan a convolver for an `n_cols x n_rows` image and the given PSF.
    pub fn new(n_cols: usize, n_rows: usize, psf: &PsfKernel) -> Result<Self, ConvolveError> {
        if psf.n_cols() > n_cols || psf.n_rows() > n_rows {
            return Err(ConvolveError::KernelLargerThanImage {
                kernel_cols: psf.n_cols(),
                kernel_rows: psf.n_rows(),
                image_cols: n_cols,
                image_rows: n_rows,
            });
        }
        let pad_cols = next_fast_len(n_cols + psf.n_cols() - 1);
        let pad_rows = next_fast_len(n_rows + psf.n_rows() - 1);
        pad_cols
            .checked_mul(pad_rows)
            .filter(|&len| len <= isize::MAX as usize)
            .ok_or(ConvolveError::PlanFailed {
                cols: pad_cols,
                rows: pad_rows,
            })?;

        let mut planner = FftPlanner::new();
        let row_fwd = planner.plan_fft_forward(pad_cols);
        let row_inv = planner.plan_fft_inverse(pad_cols);
        let col_fwd = planner.plan_fft_forward(pad_rows);
        let col_inv = planner.plan_fft_inverse(pad_rows);

        let mut convolver = Self {
            n_cols,
            n_rows,
            pad_cols,
            pad_rows,
            row_fwd,
            row_inv,
            col_fwd,
            col_inv,
            psf_freq: Vec::new(),
        };

        // Embed the PSF with its center wrap-shifted to (0, 0) so the
        // convolution output lines up with the input pixel grid.
        let center_row = psf.n_rows() / 2;
        let center_col = psf.n_cols() / 2;
        let mut buf = vec![Complex64::new(0.0, 0.0); pad_rows * pad_cols];
        for ((u, v), &w) in psf.weights().indexed_iter() {
            let row = (u + pad_rows - center_row) % pad_rows;
            let col = (v + pad_cols - center_col) % pad_cols;
            buf[row * pad_cols + col] = Complex64::new(w, 0.0);
        }
        convolver.psf_freq = convolver.forward(buf);
        Ok(convolver)
    }

    /// Padded transform shape as `(pad_cols, pad_rows)`.
    pub fn padded_shape(&self) -> (usize, usize) {
        (self.pad_cols, self.pad_rows)
    }

    /// Forward 2D FFT: row transforms, then a transpose and column
    /// transforms. The result is returned in the transposed (column-major)
    /// layout, which the inverse pass undoes.
    fn forward(&self, mut buf: Vec<Complex64>) -> Vec<Complex64> {
        self.row_fwd.process(&mut buf);
        let mut transposed = vec![Complex64::new(0.0, 0.0); buf.len()];
        transpose(&buf, self.pad_rows, self.pad_cols, &mut transposed);
        self.col_fwd.process(&mut transposed);
        transposed
    }

    /// Inverse of [`FftConvolver::forward`], including the `1/(P Q)`
    /// normalization that rustfft leaves to the caller.
    fn inverse(&self, mut spectrum: Vec<Complex64>) -> Vec<Complex64> {
        self.col_inv.process(&mut spectrum);
        let mut buf = vec![Complex64::new(0.0, 0.0); spectrum.len()];
        transpose(&spectrum, self.pad_cols, self.pad_rows, &mut buf);
        self.row_inv.process(&mut buf);
        let scale = 1.0 / (self.pad_cols * self.pad_rows) as f64;
        for v in &mut buf {
            *v *= scale;
        }
        buf
    }

    /// Convolve `input` with the cached PSF into `output`. Both buffers
    /// must match the planned geometry.
    pub fn convolve(
        &self,
        input: &Array2<f64>,
        output: &mut Array2<f64>,
    ) -> Result<(), ConvolveError> {
        for dim in [input.dim(), output.dim()] {
            if dim != (self.n_rows, self.n_cols) {
                return Err(ConvolveError::GeometryMismatch {
                    got_cols: dim.1,
                    got_rows: dim.0,
                    cols: self.n_cols,
                    rows: self.n_rows,
                });
            }
        }

        let mut buf = vec![Complex64::new(0.0, 0.0); self.pad_rows * self.pad_cols];
        for ((row, col), &v) in input.indexed_iter() {
            buf[row * self.pad_cols + col] = Complex64::new(v, 0.0);
        }

        let mut spectrum = self.forward(buf);
        for (s, p) in spectrum.iter_mut().zip(&self.psf_freq) {
            *s *= p;
        }
        let result = self.inverse(spectrum);

        for ((row, col), out) in output.indexed_iter_mut() {
            *out = result[row * self.pad_cols + col].re;
        }
        Ok(())
    }
}
