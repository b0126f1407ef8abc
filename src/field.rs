//! # Field functions
//!
//! The integrands of the QoIs. A field function is evaluated at a
//! [`FieldPoint`], i.e. a quadrature point together with the element shape
//! functions and the discrete solution there.
//! Some functions also provide their derivative with respect to the element
//! degrees of freedom; the others fail with an unsupported operation error
//! when a derivative is requested.

use super::{ElementId, Point, QoiError, QoiResult};
use std::fmt;

/// A point inside an element where a field function is evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPoint {
    /// Physical coordinates
    pub xyz: Point,
    /// Reference coordinates
    pub local: Point,
    pub element: ElementId,
    /// Shape function values $\phi_j$
    pub phi: Vec<f64>,
    /// Shape function physical gradients $\nabla\phi_j$
    pub dphi: Vec<Point>,
    /// Solution $u=\sum_j U_j\phi_j$
    pub u: f64,
    /// Solution gradient $\nabla u=\sum_j U_j\nabla\phi_j$
    pub grad_u: Point,
}

pub trait FieldFunction: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> String {
        "field function".to_string()
    }
    fn value(&self, point: &FieldPoint) -> f64;
    /// Capability flag: true if [`derivative`](FieldFunction::derivative) is implemented
    fn has_derivative(&self) -> bool {
        false
    }
    /// Writes $\partial f/\partial U_j$ in `dvalue[j]` for each local degree of freedom $j$
    fn derivative(&self, _point: &FieldPoint, _dvalue: &mut [f64]) -> QoiResult<()> {
        Err(QoiError::unsupported("derivative", self.name()))
    }
}

/// Constant function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);
impl FieldFunction for Constant {
    fn name(&self) -> String {
        format!("constant {}", self.0)
    }
    fn value(&self, _point: &FieldPoint) -> f64 {
        self.0
    }
    fn has_derivative(&self) -> bool {
        true
    }
    fn derivative(&self, _point: &FieldPoint, dvalue: &mut [f64]) -> QoiResult<()> {
        dvalue.iter_mut().for_each(|d| *d = 0f64);
        Ok(())
    }
}

/// Function of the physical coordinates only
///
/// It does not provide a derivative.
pub struct SpatialField<F> {
    name: String,
    f: F,
}
impl<F> SpatialField<F>
where
    F: Fn(Point) -> f64 + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}
impl<F> FieldFunction for SpatialField<F>
where
    F: Fn(Point) -> f64 + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }
    fn value(&self, point: &FieldPoint) -> f64 {
        (self.f)(point.xyz)
    }
}
impl<F> fmt::Debug for SpatialField<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialField")
            .field("name", &self.name)
            .finish()
    }
}

/// Polynomial of the solution: $f(u)=\sum_k c_k u^k$
///
/// The derivative with respect to the degree of freedom $U_j$ is $f^\prime(u)\phi_j$.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionPolynomial {
    coefficients: Vec<f64>,
}
impl SolutionPolynomial {
    /// Creates the polynomial from its coefficients $c_0, c_1, \dots$
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
    fn eval(&self, u: f64) -> f64 {
        self.coefficients.iter().rev().fold(0f64, |p, c| p * u + c)
    }
    fn eval_derivative(&self, u: f64) -> f64 {
        self.coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0f64, |p, (k, c)| p * u + k as f64 * c)
    }
}
impl FieldFunction for SolutionPolynomial {
    fn name(&self) -> String {
        format!("solution polynomial {:?}", self.coefficients)
    }
    fn value(&self, point: &FieldPoint) -> f64 {
        self.eval(point.u)
    }
    fn has_derivative(&self) -> bool {
        true
    }
    fn derivative(&self, point: &FieldPoint, dvalue: &mut [f64]) -> QoiResult<()> {
        if dvalue.len() != point.phi.len() {
            return Err(QoiError::numerical(
                point.element,
                format!(
                    "{} degrees of freedom for {} shape functions",
                    dvalue.len(),
                    point.phi.len()
                ),
            ));
        }
        let df = self.eval_derivative(point.u);
        dvalue
            .iter_mut()
            .zip(point.phi.iter())
            .for_each(|(d, phi)| *d = df * phi);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn point(u: f64) -> FieldPoint {
        FieldPoint {
            xyz: [0.5, 2.],
            local: [0.25, 0.25],
            element: 0,
            phi: vec![0.5, 0.25, 0.25],
            dphi: vec![[-1., -1.], [1., 0.], [0., 1.]],
            u,
            grad_u: [0., 0.],
        }
    }

    #[test]
    fn polynomial() {
        // 1 + 2u + 3u^2
        let f = SolutionPolynomial::new(vec![1., 2., 3.]);
        assert_abs_diff_eq!(f.value(&point(2.)), 17., epsilon = 1e-14);
        let mut d = vec![0f64; 3];
        f.derivative(&point(2.), &mut d).unwrap();
        // f'(2) = 14
        assert_abs_diff_eq!(d[0], 7., epsilon = 1e-14);
        assert_abs_diff_eq!(d[1], 3.5, epsilon = 1e-14);
        assert!(f.derivative(&point(2.), &mut [0f64; 4]).is_err());
    }

    #[test]
    fn spatial_field_has_no_derivative() {
        let f = SpatialField::new("x*y", |p: Point| p[0] * p[1]);
        assert_abs_diff_eq!(f.value(&point(0.)), 1., epsilon = 1e-14);
        assert!(!f.has_derivative());
        let err = f.derivative(&point(0.), &mut [0f64; 3]).unwrap_err();
        assert!(err.is_unsupported());
    }
}
