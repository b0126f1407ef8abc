//! # Quantities of interest
//!
//! A QoI goes through the following states:
//!  - [`QoiState::Uninitialized`] after construction,
//!  - [`QoiState::Initialized`] after [`Qoi::init`] or [`Qoi::reinit`],
//!  - [`QoiState::Evaluating`] inside an element call, returning to
//!    [`QoiState::Initialized`] once the element contribution is computed.
//!
//! Evaluating a QoI before `init` is an error.
//! `reinit` takes `&mut self`, so it can never run while the same instance
//! is being evaluated; parallel drivers evaluate clones obtained with
//! [`Qoi::box_clone`].

use super::{AssemblyContext, FieldFunction, QoiError, QoiResult, QuadraturePoint, SystemSnapshot};
use std::fmt;

mod boundary;
mod composite;
mod integrated;
mod interior;
pub use boundary::BoundaryIntegral;
pub use composite::CompositeQoi;
pub use integrated::IntegratedLineFunctional;
pub use interior::InteriorIntegral;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoiState {
    Uninitialized,
    Initialized,
    Evaluating,
}
impl QoiState {
    pub fn is_initialized(&self) -> bool {
        !matches!(self, QoiState::Uninitialized)
    }
    /// Enters an element call
    fn begin(&mut self, name: &str) -> QoiResult<()> {
        if !self.is_initialized() {
            return Err(QoiError::Uninitialized(name.to_string()));
        }
        *self = QoiState::Evaluating;
        Ok(())
    }
    /// Leaves an element call
    fn end(&mut self) {
        *self = QoiState::Initialized;
    }
}
impl Default for QoiState {
    fn default() -> Self {
        QoiState::Uninitialized
    }
}
impl fmt::Display for QoiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QoiState::Uninitialized => write!(f, "uninitialized"),
            QoiState::Initialized => write!(f, "initialized"),
            QoiState::Evaluating => write!(f, "evaluating"),
        }
    }
}

/// Element contribution of a QoI: value and derivative with respect to the
/// element degrees of freedom
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QoiAccumulator {
    value: f64,
    derivative: Vec<f64>,
}
impl QoiAccumulator {
    /// Zeroes the value and resizes the derivative to `n_dofs`
    pub fn reset(&mut self, n_dofs: usize) {
        self.value = 0f64;
        self.derivative.clear();
        self.derivative.resize(n_dofs, 0f64);
    }
    pub fn value(&self) -> f64 {
        self.value
    }
    pub fn derivative(&self) -> &[f64] {
        &self.derivative
    }
    /// Integrates `function` over the quadrature `points` of the context element
    ///
    /// The derivative is only computed if `with_derivative` is set.
    pub fn integrate(
        &mut self,
        context: &AssemblyContext,
        function: &dyn FieldFunction,
        points: &[QuadraturePoint],
        with_derivative: bool,
    ) -> QoiResult<()> {
        let mut df = vec![0f64; context.n_dofs()];
        for qp in points {
            let fp = context.field_point(qp)?;
            self.value += function.value(&fp) * qp.weight;
            if with_derivative {
                function.derivative(&fp, &mut df)?;
                self.derivative
                    .iter_mut()
                    .zip(df.iter())
                    .for_each(|(d, df)| *d += df * qp.weight);
            }
        }
        Ok(())
    }
}

pub trait Qoi: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> QoiState;
    /// Binds the QoI to a mesh and a solution layout
    fn init(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()>;
    /// Rebuilds everything that depends on the mesh
    fn reinit(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()>;
    /// Contribution of the context element to the QoI value
    fn element_qoi(&mut self, context: &AssemblyContext) -> QoiResult<f64>;
    /// Contribution of the context element to the QoI derivative, one entry
    /// per element degree of freedom
    fn element_qoi_derivative(&mut self, context: &AssemblyContext) -> QoiResult<Vec<f64>>;
    /// Last element contribution
    fn accumulator(&self) -> &QoiAccumulator;
    fn box_clone(&self) -> Box<dyn Qoi>;
}
impl Clone for Box<dyn Qoi> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Runs an element call of a single field function QoI
///
/// `points` yields the quadrature points of the context element; errors are
/// attributed to `name` and the context element.
fn evaluate<F>(
    name: &str,
    state: &mut QoiState,
    accumulator: &mut QoiAccumulator,
    context: &AssemblyContext,
    function: &dyn FieldFunction,
    with_derivative: bool,
    points: F,
) -> QoiResult<()>
where
    F: FnOnce() -> QoiResult<Vec<QuadraturePoint>>,
{
    state.begin(name)?;
    if with_derivative && !function.has_derivative() {
        state.end();
        return Err(
            QoiError::unsupported("element QoI derivative", function.name())
                .in_qoi(name, Some(context.element())),
        );
    }
    accumulator.reset(context.n_dofs());
    let result = points()
        .and_then(|points| accumulator.integrate(context, function, &points, with_derivative));
    state.end();
    result.map_err(|err| err.in_qoi(name, Some(context.element())))
}
