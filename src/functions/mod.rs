//! Surface-brightness function components.
//!
//! Every kind follows the same two-phase contract: `setup` loads the
//! component's slice of the parameter vector together with the block center
//! and the photometric zero point, validates parameter domains, and
//! pre-computes all per-call-invariant scratch (rotation trig, intensity
//! conversions, reciprocal scale lengths). After a successful `setup`,
//! `value` is a pure function of sky position, which is what allows the
//! same component to be evaluated at base and oversampled resolution.
//!
//! Dispatch is by enum variant rather than trait object; the
//! [`ComponentKind`] registry maps config-file names to kinds and carries
//! the per-kind metadata (parameter labels, integration and sub-sampling
//! hints).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::integrate::QuadratureSpec;

mod helpers;

mod expdisk3d;
mod exponential;
mod flat_sky;
mod gaussian;
mod gaussian1d;
mod moffat;
mod sersic;

pub use expdisk3d::ExpDisk3d;
pub use exponential::Exponential;
pub use flat_sky::FlatSky;
pub use gaussian::Gaussian;
pub use gaussian1d::Gaussian1d;
pub use moffat::Moffat;
pub use sersic::Sersic;

/// A component rejected its parameter slice during setup.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SetupError {
    #[error("{function}: parameter `{label}` = {value} is outside its physical domain")]
    OutOfDomain {
        function: &'static str,
        label: &'static str,
        value: f64,
    },
}

pub(crate) fn require_positive(
    function: &'static str,
    label: &'static str,
    value: f64,
) -> Result<(), SetupError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SetupError::OutOfDomain {
            function,
            label,
            value,
        })
    }
}

/// Require `value` in the half-open interval `[lo, hi)`.
pub(crate) fn require_range(
    function: &'static str,
    label: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
) -> Result<(), SetupError> {
    if value.is_finite() && value >= lo && value < hi {
        Ok(())
    } else {
        Err(SetupError::OutOfDomain {
            function,
            label,
            value,
        })
    }
}

/// Require an inclination in `[0, 90]` degrees.
pub(crate) fn require_inclination(
    function: &'static str,
    value: f64,
) -> Result<(), SetupError> {
    if value.is_finite() && (0.0..=90.0).contains(&value) {
        Ok(())
    } else {
        Err(SetupError::OutOfDomain {
            function,
            label: "inc",
            value,
        })
    }
}

/// Cutoff radius for sub-pixel sampling near a component peak: two scale
/// lengths, clamped to [2, 10] pixels.
pub(crate) fn steep_cutoff(scale: f64) -> f64 {
    (2.0 * scale).clamp(2.0, 10.0)
}

/// The set of available function kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    FlatSky,
    Gaussian1d,
    Gaussian,
    Moffat,
    Exponential,
    Sersic,
    ExpDisk3d,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::FlatSky,
        ComponentKind::Gaussian1d,
        ComponentKind::Gaussian,
        ComponentKind::Moffat,
        ComponentKind::Exponential,
        ComponentKind::Sersic,
        ComponentKind::ExpDisk3d,
    ];

    /// The identifier used in config files and reporting.
    pub fn short_name(self) -> &'static str {
        match self {
            ComponentKind::FlatSky => FlatSky::SHORT_NAME,
            ComponentKind::Gaussian1d => Gaussian1d::SHORT_NAME,
            ComponentKind::Gaussian => Gaussian::SHORT_NAME,
            ComponentKind::Moffat => Moffat::SHORT_NAME,
            ComponentKind::Exponential => Exponential::SHORT_NAME,
            ComponentKind::Sersic => Sersic::SHORT_NAME,
            ComponentKind::ExpDisk3d => ExpDisk3d::SHORT_NAME,
        }
    }

    /// Look up a kind by its config-file name.
    pub fn from_name(name: &str) -> Option<Self> {
        static INDEX: Lazy<HashMap<&'static str, ComponentKind>> = Lazy::new(|| {
            ComponentKind::ALL
                .into_iter()
                .map(|k| (k.short_name(), k))
                .collect()
        });
        INDEX.get(name).copied()
    }

    /// Ordered parameter labels, matching the config-file block layout.
    pub fn param_labels(self) -> &'static [&'static str] {
        match self {
            ComponentKind::FlatSky => FlatSky::PARAM_LABELS,
            ComponentKind::Gaussian1d => Gaussian1d::PARAM_LABELS,
            ComponentKind::Gaussian => Gaussian::PARAM_LABELS,
            ComponentKind::Moffat => Moffat::PARAM_LABELS,
            ComponentKind::Exponential => Exponential::PARAM_LABELS,
            ComponentKind::Sersic => Sersic::PARAM_LABELS,
            ComponentKind::ExpDisk3d => ExpDisk3d::PARAM_LABELS,
        }
    }

    pub fn n_params(self) -> usize {
        self.param_labels().len()
    }

    /// True for kinds whose value is a line-of-sight integral.
    pub fn line_of_sight_integrated(self) -> bool {
        matches!(self, ComponentKind::ExpDisk3d)
    }

    /// True for kinds that benefit from sub-pixel sampling near their peak.
    pub fn steep_near_peak(self) -> bool {
        matches!(
            self,
            ComponentKind::Gaussian
                | ComponentKind::Moffat
                | ComponentKind::Exponential
                | ComponentKind::Sersic
        )
    }

    /// Build an unconfigured component of this kind. Kinds that integrate
    /// numerically receive the quadrature settings here.
    pub fn instantiate(self, quadrature: QuadratureSpec) -> Component {
        match self {
            ComponentKind::FlatSky => Component::FlatSky(FlatSky::default()),
            ComponentKind::Gaussian1d => Component::Gaussian1d(Gaussian1d::default()),
            ComponentKind::Gaussian => Component::Gaussian(Gaussian::default()),
            ComponentKind::Moffat => Component::Moffat(Moffat::default()),
            ComponentKind::Exponential => Component::Exponential(Exponential::default()),
            ComponentKind::Sersic => Component::Sersic(Sersic::default()),
            ComponentKind::ExpDisk3d => Component::ExpDisk3d(ExpDisk3d::new(quadrature)),
        }
    }
}

/// A concrete component instance. See the module docs for the
/// setup/value contract.
#[derive(Debug)]
pub enum Component {
    FlatSky(FlatSky),
    Gaussian1d(Gaussian1d),
    Gaussian(Gaussian),
    Moffat(Moffat),
    Exponential(Exponential),
    Sersic(Sersic),
    ExpDisk3d(ExpDisk3d),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::FlatSky(_) => ComponentKind::FlatSky,
            Component::Gaussian1d(_) => ComponentKind::Gaussian1d,
            Component::Gaussian(_) => ComponentKind::Gaussian,
            Component::Moffat(_) => ComponentKind::Moffat,
            Component::Exponential(_) => ComponentKind::Exponential,
            Component::Sersic(_) => ComponentKind::Sersic,
            Component::ExpDisk3d(_) => ComponentKind::ExpDisk3d,
        }
    }

    /// Load the parameter slice starting at `params[offset]` and the block
    /// center, and pre-compute the per-evaluation scratch.
    pub fn setup(
        &mut self,
        params: &[f64],
        offset: usize,
        x0: f64,
        y0: f64,
        zero_point: f64,
    ) -> Result<(), SetupError> {
        match self {
            Component::FlatSky(c) => c.setup(params, offset),
            Component::Gaussian1d(c) => c.setup(params, offset, x0, zero_point),
            Component::Gaussian(c) => c.setup(params, offset, x0, y0),
            Component::Moffat(c) => c.setup(params, offset, x0, y0),
            Component::Exponential(c) => c.setup(params, offset, x0, y0),
            Component::Sersic(c) => c.setup(params, offset, x0, y0),
            Component::ExpDisk3d(c) => c.setup(params, offset, x0, y0),
        }
    }

    /// Intensity at a sky coordinate, in detector units per pixel area.
    #[inline]
    pub fn value(&self, x: f64, y: f64) -> f64 {
        match self {
            Component::FlatSky(c) => c.value(x, y),
            Component::Gaussian1d(c) => c.value(x, y),
            Component::Gaussian(c) => c.value(x, y),
            Component::Moffat(c) => c.value(x, y),
            Component::Exponential(c) => c.value(x, y),
            Component::Sersic(c) => c.value(x, y),
            Component::ExpDisk3d(c) => c.value(x, y),
        }
    }

    /// Distance from the component center (in pixels) inside which the
    /// model builder should sub-sample pixels, for steep kinds.
    pub fn steep_radius(&self) -> Option<f64> {
        match self {
            Component::Gaussian(c) => Some(c.steep_radius()),
            Component::Moffat(c) => Some(c.steep_radius()),
            Component::Exponential(c) => Some(c.steep_radius()),
            Component::Sersic(c) => Some(c.steep_radius()),
            Component::FlatSky(_) | Component::Gaussian1d(_) | Component::ExpDisk3d(_) => None,
        }
    }

    /// Drain the count of non-converged numerical integrations since the
    /// last call. Zero for kinds that do not integrate.
    pub fn take_non_converged(&self) -> usize {
        match self {
            Component::ExpDisk3d(c) => c.take_non_converged(),
            _ => 0,
        }
    }
}

/// One parameter of a component block: label, starting value, and the
/// optional fit bounds carried through for the external optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub label: String,
    pub value: f64,
    pub bounds: Option<(f64, f64)>,
}

/// Parsed description of one component block: the kind, its center, and
/// its parameters in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDescriptor {
    pub kind: ComponentKind,
    pub x0: f64,
    pub y0: f64,
    pub params: Vec<ParamSpec>,
    /// Allow sub-pixel sampling for this block (on by default; only
    /// consulted for kinds that report a steep peak).
    pub subsample: bool,
}

impl ComponentDescriptor {
    /// Build a descriptor from plain parameter values in label order.
    ///
    /// # Panics
    /// If `values` does not match the kind's parameter count.
    pub fn new(kind: ComponentKind, x0: f64, y0: f64, values: &[f64]) -> Self {
        assert_eq!(
            values.len(),
            kind.n_params(),
            "{} takes {} parameters",
            kind.short_name(),
            kind.n_params()
        );
        let params = kind
            .param_labels()
            .iter()
            .zip(values)
            .map(|(label, &value)| ParamSpec {
                label: (*label).to_string(),
                value,
                bounds: None,
            })
            .collect();
        Self {
            kind,
            x0,
            y0,
            params,
            subsample: true,
        }
    }

    pub fn without_subsampling(mut self) -> Self {
        self.subsample = false;
        self
    }

    pub fn n_params(&self) -> usize {
        self.params.len()
    }
}

/// Names of all available functions, in registry order.
pub fn function_names() -> Vec<&'static str> {
    ComponentKind::ALL.iter().map(|k| k.short_name()).collect()
}

/// A config-file-shaped listing of every function and its parameters,
/// suitable for copying into a new configuration.
pub fn describe_functions() -> String {
    let mut out = String::new();
    for kind in ComponentKind::ALL {
        out.push_str("FUNCTION ");
        out.push_str(kind.short_name());
        out.push('\n');
        for label in kind.param_labels() {
            out.push_str(label);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}
