//! Parametric 2D surface-brightness model-image synthesis.
//!
//! This crate builds the model half of astronomical image fitting: given a
//! list of additive function components (Gaussian, Sersic, exponential
//! disk, inclined 3D disk, ...), a parameter vector, and an optional
//! point-spread function, it synthesizes the pixel image those components
//! would produce through the instrument. An external optimizer owns the
//! parameter search and the fit statistic; this crate owns everything
//! between a parameter vector and a finished model image:
//!
//! - per-pixel evaluation of the component sum, with sub-pixel averaging
//!   where profiles are steep ([`functions`], [`integrate`], [`model`])
//! - adaptive line-of-sight quadrature for 3D components ([`integrate`])
//! - zero-padded FFT convolution with a cached PSF transform ([`convolve`])
//! - oversampled sub-regions stitched back at base resolution
//!   ([`oversample`])
//! - the `FUNCTION` block configuration format ([`config`])

pub mod config;
pub mod convolve;
pub mod functions;
pub mod geometry;
pub mod integrate;
pub mod model;
pub mod oversample;
pub mod psf;
pub mod stats;

// Re-exports for easier access
pub use convolve::FftConvolver;
pub use functions::{Component, ComponentDescriptor, ComponentKind};
pub use geometry::{PixelGrid, PixelRect};
pub use model::{CancelToken, ModelBuilder, ModelError, ModelSettings, SynthesisReport};
pub use oversample::OversampledRegion;
pub use psf::PsfKernel;
