//! Model-image assembly.
//!
//! The [`ModelBuilder`] owns the component list, the scratch and output
//! buffers, the convolver, and any oversampled regions. One evaluation
//! cycle is `set_parameters` followed by `compute_model_image`; the
//! optimizer driving a fit repeats that cycle millions of times, so the
//! per-pixel loop stays allocation-free and all per-parameter-set work is
//! hoisted into component setup.
//!
//! The per-pixel loop is data-parallel over contiguous row stripes. Each
//! stripe is written by exactly one thread and the summation order within
//! a pixel is fixed, so the output image is bitwise identical for any
//! thread count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use thiserror::Error;

use crate::convolve::{ConvolveError, FftConvolver};
use crate::functions::{Component, ComponentDescriptor, SetupError};
use crate::geometry::PixelGrid;
use crate::integrate::{subpixel_average, QuadratureSpec};
use crate::oversample::OversampledRegion;
use crate::psf::PsfKernel;
use crate::stats::PixelScan;

/// Rows per parallel work unit.
const ROW_STRIPE: usize = 32;

/// Errors surfaced by model configuration and evaluation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("image dimensions must be positive (got {n_cols}x{n_rows})")]
    BadGeometry { n_cols: usize, n_rows: usize },
    #[error("invalid PSF: {0}")]
    BadPsf(ConvolveError),
    #[error("invalid oversampled region: {0}")]
    BadRegion(String),
    #[error("parameter vector has {actual} entries, model needs {expected}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    ParameterOutOfDomain(#[from] SetupError),
    #[error("convolution failed: {0}")]
    ConvolutionFailed(ConvolveError),
    #[error("model evaluation was cancelled")]
    Cancelled,
    #[error("set_parameters must succeed before computing the model image")]
    ParametersNotSet,
}

/// Cooperative cancellation handle, checked between row stripes and
/// between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Geometry and evaluation settings fixed at model construction.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub n_cols: usize,
    pub n_rows: usize,
    /// Photometric zero point for components with magnitude parameters.
    pub zero_point: f64,
    /// Dedicated worker count; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    /// Sub-pixel grid edge for steep-peak sampling.
    pub subpixel_k: usize,
    /// Tolerances for line-of-sight quadrature.
    pub quadrature: QuadratureSpec,
}

impl ModelSettings {
    pub fn new(n_cols: usize, n_rows: usize) -> Self {
        Self {
            n_cols,
            n_rows,
            zero_point: 25.0,
            threads: None,
            subpixel_k: 5,
            quadrature: QuadratureSpec::default(),
        }
    }
}

/// Diagnostics from one image evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisReport {
    /// False when any output pixel is NaN or infinite. The caller is
    /// expected to treat a non-finite model as a bad-fit penalty.
    pub finite: bool,
    /// Count of line-of-sight integrations that hit their subdivision
    /// budget. The affected pixels carry the best available estimate.
    pub non_converged: usize,
}

/// Assembles model images from a fixed component list.
#[derive(Debug)]
pub struct ModelBuilder {
    grid: PixelGrid,
    settings: ModelSettings,
    descriptors: Vec<ComponentDescriptor>,
    components: Vec<Component>,
    /// Parameter-vector offset of each component block.
    offsets: Vec<usize>,
    total_params: usize,
    /// Per-component: sub-pixel sampling enabled (descriptor flag and
    /// steep-kind hint combined).
    subsample: Vec<bool>,
    /// Block centers from the current parameter vector.
    centers: Vec<(f64, f64)>,
    convolver: Option<FftConvolver>,
    regions: Vec<OversampledRegion>,
    pool: Option<Arc<rayon::ThreadPool>>,
    scratch: Array2<f64>,
    output: Array2<f64>,
    params_set: bool,
    image_valid: bool,
}

impl ModelBuilder {
    /// Configure a model: geometry, components, optional global PSF, and
    /// optional oversampled regions.
    pub fn new(
        settings: ModelSettings,
        descriptors: Vec<ComponentDescriptor>,
        psf: Option<PsfKernel>,
        mut regions: Vec<OversampledRegion>,
    ) -> Result<Self, ModelError> {
        if settings.n_cols == 0 || settings.n_rows == 0 {
            return Err(ModelError::BadGeometry {
                n_cols: settings.n_cols,
                n_rows: settings.n_rows,
            });
        }
        let grid = PixelGrid::new(settings.n_cols, settings.n_rows);

        let convolver = match psf {
            Some(psf) => Some(
                FftConvolver::new(grid.n_cols, grid.n_rows, &psf).map_err(ModelError::BadPsf)?,
            ),
            None => None,
        };

        for (idx, region) in regions.iter().enumerate() {
            if region.scale() == 0 {
                return Err(ModelError::BadRegion(format!(
                    "region {idx}: oversample factor must be at least 1"
                )));
            }
            if !region.rect().fits_within(&grid) {
                return Err(ModelError::BadRegion(format!(
                    "region {idx}: {:?} does not fit a {}x{} image",
                    region.rect(),
                    grid.n_cols,
                    grid.n_rows
                )));
            }
            if let Some(other) = regions[..idx].iter().position(|r| r.rect().overlaps(&region.rect())) {
                return Err(ModelError::BadRegion(format!(
                    "regions {other} and {idx} overlap"
                )));
            }
        }
        for region in &mut regions {
            region.prepare().map_err(ModelError::BadPsf)?;
        }

        let components: Vec<Component> = descriptors
            .iter()
            .map(|d| d.kind.instantiate(settings.quadrature))
            .collect();
        let subsample: Vec<bool> = descriptors
            .iter()
            .map(|d| d.subsample && d.kind.steep_near_peak())
            .collect();
        let mut offsets = Vec::with_capacity(descriptors.len());
        let mut total_params = 0;
        for d in &descriptors {
            offsets.push(total_params);
            total_params += 2 + d.n_params();
        }

        let pool = match settings.threads {
            Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!("could not build a {n}-thread pool ({e}); using the global pool");
                    None
                }
            },
            None => None,
        };

        let scratch = grid.zeros();
        let output = grid.zeros();
        let centers = vec![(0.0, 0.0); descriptors.len()];

        Ok(Self {
            grid,
            settings,
            descriptors,
            components,
            offsets,
            total_params,
            subsample,
            centers,
            convolver,
            regions,
            pool,
            scratch,
            output,
            params_set: false,
            image_valid: false,
        })
    }

    pub fn grid(&self) -> PixelGrid {
        self.grid
    }

    /// Total length of the parameter vector: per block, the center pair
    /// followed by the kind's parameters.
    pub fn param_count(&self) -> usize {
        self.total_params
    }

    /// Flattened parameter labels in vector order, for reporting.
    pub fn param_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.total_params);
        for d in &self.descriptors {
            labels.push("X0".to_string());
            labels.push("Y0".to_string());
            for p in &d.params {
                labels.push(p.label.clone());
            }
        }
        labels
    }

    /// The parameter vector assembled from the descriptors' initial values.
    pub fn initial_parameters(&self) -> Vec<f64> {
        let mut params = Vec::with_capacity(self.total_params);
        for d in &self.descriptors {
            params.push(d.x0);
            params.push(d.y0);
            for p in &d.params {
                params.push(p.value);
            }
        }
        params
    }

    /// Distribute parameter slices to the components' setup.
    ///
    /// On a domain error the model keeps the error state: the previous
    /// image stays readable but a new one cannot be computed until a valid
    /// vector arrives.
    pub fn set_parameters(&mut self, params: &[f64]) -> Result<(), ModelError> {
        if params.len() != self.total_params {
            return Err(ModelError::ParameterCountMismatch {
                expected: self.total_params,
                actual: params.len(),
            });
        }
        self.params_set = false;
        for (idx, component) in self.components.iter_mut().enumerate() {
            let offset = self.offsets[idx];
            let x0 = params[offset];
            let y0 = params[offset + 1];
            component.setup(params, offset + 2, x0, y0, self.settings.zero_point)?;
            self.centers[idx] = (x0, y0);
        }
        self.params_set = true;
        Ok(())
    }

    /// Synthesize the model image for the current parameters.
    pub fn compute_model_image(&mut self) -> Result<SynthesisReport, ModelError> {
        self.compute_with_cancel(&CancelToken::new())
    }

    /// Synthesize with cooperative cancellation. On cancellation the
    /// partial buffer is marked invalid and [`ModelBuilder::image`]
    /// returns `None`.
    pub fn compute_with_cancel(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<SynthesisReport, ModelError> {
        if !self.params_set {
            return Err(ModelError::ParametersNotSet);
        }
        self.image_valid = false;
        match self.pool.clone() {
            Some(pool) => pool.install(|| self.compute_inner(cancel)),
            None => self.compute_inner(cancel),
        }
    }

    fn compute_inner(&mut self, cancel: &CancelToken) -> Result<SynthesisReport, ModelError> {
        let started = std::time::Instant::now();

        let Self {
            scratch,
            components,
            subsample,
            centers,
            settings,
            ..
        } = self;
        let components: &[Component] = components;
        let subsample: &[bool] = subsample;
        let centers: &[(f64, f64)] = centers;
        let k = settings.subpixel_k;

        scratch.fill(0.0);
        scratch
            .axis_chunks_iter_mut(Axis(0), ROW_STRIPE)
            .into_par_iter()
            .enumerate()
            .for_each(|(stripe_idx, mut stripe)| {
                if cancel.is_cancelled() {
                    return;
                }
                let row0 = stripe_idx * ROW_STRIPE;
                for (local_j, mut row) in stripe.axis_iter_mut(Axis(0)).enumerate() {
                    let y = PixelGrid::sky_y(row0 + local_j);
                    for (i, px) in row.iter_mut().enumerate() {
                        let x = PixelGrid::sky_x(i);
                        let mut sum = 0.0;
                        for (ci, component) in components.iter().enumerate() {
                            sum += evaluate_pixel(component, centers[ci], subsample[ci], k, x, y);
                        }
                        *px = sum;
                    }
                }
            });

        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        // Oversampled patches replace their pixels in the scratch before
        // the global PSF is applied, so a patch is convolved by its own
        // oversampled PSF and then by the instrument PSF along with the
        // rest of the image.
        for region in &self.regions {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            region
                .compute_into(&self.components, &mut self.scratch)
                .map_err(ModelError::ConvolutionFailed)?;
        }

        match &self.convolver {
            Some(convolver) => convolver
                .convolve(&self.scratch, &mut self.output)
                .map_err(ModelError::ConvolutionFailed)?,
            None => self.output.assign(&self.scratch),
        }

        let non_converged: usize = self.components.iter().map(|c| c.take_non_converged()).sum();
        if non_converged > 0 {
            warn!("{non_converged} line-of-sight integrations did not converge");
        }

        let scan = PixelScan::over(self.output.iter().copied());
        let finite = scan.all_finite();
        if !finite {
            warn!("model image has {} non-finite pixels", scan.non_finite());
        }

        self.image_valid = true;
        debug!(
            "synthesized {}x{} model image ({} components, peak {:?}) in {:?}",
            self.grid.n_cols,
            self.grid.n_rows,
            self.components.len(),
            scan.max(),
            started.elapsed()
        );
        Ok(SynthesisReport {
            finite,
            non_converged,
        })
    }

    /// Read-only view of the last computed image, if one is valid.
    pub fn image(&self) -> Option<ArrayView2<'_, f64>> {
        self.image_valid.then(|| self.output.view())
    }
}

#[inline]
fn evaluate_pixel(
    component: &Component,
    center: (f64, f64),
    allow_subsample: bool,
    k: usize,
    x: f64,
    y: f64,
) -> f64 {
    if allow_subsample && k > 1 {
        if let Some(radius) = component.steep_radius() {
            let dx = x - center.0;
            let dy = y - center.1;
            if dx * dx + dy * dy <= radius * radius {
                return subpixel_average(|xx, yy| component.value(xx, yy), x, y, k);
            }
        }
    }
    component.value(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::ComponentKind;
    use crate::geometry::PixelRect;
    use approx::assert_relative_eq;

    fn gaussian_descriptor(x0: f64, y0: f64, i0: f64, sigma: f64) -> ComponentDescriptor {
        ComponentDescriptor::new(ComponentKind::Gaussian, x0, y0, &[0.0, 0.0, i0, sigma])
    }

    fn simple_model(n: usize) -> ModelBuilder {
        let settings = ModelSettings::new(n, n);
        let descriptors = vec![gaussian_descriptor(n as f64 / 2.0, n as f64 / 2.0, 10.0, 2.0)];
        ModelBuilder::new(settings, descriptors, None, Vec::new()).unwrap()
    }

    #[test]
    fn rejects_bad_geometry() {
        let err = ModelBuilder::new(ModelSettings::new(0, 32), Vec::new(), None, Vec::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::BadGeometry { .. }));
    }

    #[test]
    fn rejects_oversized_psf() {
        let psf = PsfKernel::gaussian(33, 4.0).unwrap();
        let err = ModelBuilder::new(ModelSettings::new(16, 16), Vec::new(), Some(psf), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ModelError::BadPsf(_)));
    }

    #[test]
    fn rejects_overlapping_regions() {
        let regions = vec![
            OversampledRegion::new(PixelRect::new(1, 8, 1, 8), 2, None),
            OversampledRegion::new(PixelRect::new(8, 12, 4, 12), 2, None),
        ];
        let err = ModelBuilder::new(ModelSettings::new(16, 16), Vec::new(), None, regions)
            .unwrap_err();
        assert!(matches!(err, ModelError::BadRegion(_)));
    }

    #[test]
    fn rejects_out_of_bounds_region() {
        let regions = vec![OversampledRegion::new(PixelRect::new(10, 20, 1, 4), 2, None)];
        let err = ModelBuilder::new(ModelSettings::new(16, 16), Vec::new(), None, regions)
            .unwrap_err();
        assert!(matches!(err, ModelError::BadRegion(_)));
    }

    #[test]
    fn parameter_count_is_enforced() {
        let mut model = simple_model(16);
        assert_eq!(model.param_count(), 6);
        let err = model.set_parameters(&[1.0; 5]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ParameterCountMismatch {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn compute_requires_parameters() {
        let mut model = simple_model(16);
        assert!(matches!(
            model.compute_model_image(),
            Err(ModelError::ParametersNotSet)
        ));
        assert!(model.image().is_none());
    }

    #[test]
    fn domain_error_propagates_from_setup() {
        let mut model = simple_model(16);
        // sigma = -1
        let err = model
            .set_parameters(&[8.0, 8.0, 0.0, 0.0, 10.0, -1.0])
            .unwrap_err();
        assert!(matches!(err, ModelError::ParameterOutOfDomain(_)));
        // A failed setup leaves the model unable to compute
        assert!(matches!(
            model.compute_model_image(),
            Err(ModelError::ParametersNotSet)
        ));
    }

    #[test]
    fn labels_follow_block_layout() {
        let model = simple_model(16);
        assert_eq!(model.param_labels(), ["X0", "Y0", "PA", "ell", "I_0", "sigma"]);
    }

    #[test]
    fn peak_lands_on_the_right_pixel() {
        let mut model = simple_model(32);
        let params = model.initial_parameters();
        model.set_parameters(&params).unwrap();
        let report = model.compute_model_image().unwrap();
        assert!(report.finite);
        assert_eq!(report.non_converged, 0);

        let image = model.image().unwrap();
        // Center (16, 16) in sky coordinates is pixel (15, 15)
        let peak = image[[15, 15]];
        for (_, &v) in image.indexed_iter() {
            assert!(v <= peak);
        }
    }

    #[test]
    fn cancellation_returns_invalid_image() {
        let mut model = simple_model(64);
        let params = model.initial_parameters();
        model.set_parameters(&params).unwrap();

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            model.compute_with_cancel(&token),
            Err(ModelError::Cancelled)
        ));
        assert!(model.image().is_none());

        // A fresh token lets the same model recover
        assert!(model.compute_model_image().is_ok());
        assert!(model.image().is_some());
    }

    #[test]
    fn deterministic_across_thread_counts() {
        let build = |threads: Option<usize>| {
            let mut settings = ModelSettings::new(48, 48);
            settings.threads = threads;
            let descriptors = vec![
                gaussian_descriptor(20.0, 25.0, 10.0, 2.0),
                ComponentDescriptor::new(
                    ComponentKind::Sersic,
                    30.0,
                    18.0,
                    &[35.0, 0.3, 2.0, 5.0, 6.0],
                ),
            ];
            let mut model = ModelBuilder::new(settings, descriptors, None, Vec::new()).unwrap();
            let params = model.initial_parameters();
            model.set_parameters(&params).unwrap();
            model.compute_model_image().unwrap();
            model
        };

        let single = build(Some(1));
        let multi = build(Some(4));
        for (a, b) in single.image().unwrap().iter().zip(multi.image().unwrap().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn subpixel_sampling_softens_a_cusp() {
        let descriptors = vec![ComponentDescriptor::new(
            ComponentKind::Exponential,
            8.0,
            8.0,
            &[0.0, 0.0, 1.0, 1.5],
        )];
        let mut sampled = ModelBuilder::new(
            ModelSettings::new(16, 16),
            descriptors.clone(),
            None,
            Vec::new(),
        )
        .unwrap();
        let mut unsampled = ModelBuilder::new(
            ModelSettings::new(16, 16),
            descriptors.into_iter().map(|d| d.without_subsampling()).collect(),
            None,
            Vec::new(),
        )
        .unwrap();

        let params = sampled.initial_parameters();
        sampled.set_parameters(&params).unwrap();
        sampled.compute_model_image().unwrap();
        unsampled.set_parameters(&params).unwrap();
        unsampled.compute_model_image().unwrap();

        let center_sampled = sampled.image().unwrap()[[7, 7]];
        let center_unsampled = unsampled.image().unwrap()[[7, 7]];
        // The center sample sits on the peak; averaging over the pixel
        // must come out lower.
        assert_eq!(center_unsampled, 1.0);
        assert!(center_sampled < center_unsampled);
        // Far from the peak the two agree
        assert_relative_eq!(
            sampled.image().unwrap()[[2, 2]],
            unsampled.image().unwrap()[[2, 2]],
            epsilon = 1e-14
        );
    }
}
