//!
//! # Rayfire Quantities of Interest
//!
//! Line integrals of field functions along rays crossing 2D unstructured meshes,
//! together with the derivatives of these integrals with respect to the
//! degrees of freedom of the discretized solution.
//!

pub mod assembly;
pub mod config;
pub mod element;
pub mod error;
pub mod field;
pub mod mesh;
pub mod qoi;
pub mod quadrature;
pub mod ray;
pub mod rayfire;
pub use assembly::{
    assemble_qoi, assemble_qoi_derivative, assemble_qoi_derivative_par, assemble_qoi_par,
    AssemblyContext, QoiValues, SystemSnapshot,
};
pub use config::RayfireConfig;
pub use element::{ElementGeometry, ElementKind, RayClip};
pub use error::{QoiError, QoiResult};
pub use field::{Constant, FieldFunction, FieldPoint, SolutionPolynomial, SpatialField};
pub use mesh::{LocateTolerance, Mesh, UnstructuredMesh};
pub use qoi::{
    BoundaryIntegral, CompositeQoi, IntegratedLineFunctional, InteriorIntegral, Qoi,
    QoiAccumulator, QoiState,
};
pub use quadrature::{GaussRule, QuadraturePoint, RayQuadrature};
pub use ray::{new_ray, Ray, RaySpec};
pub use rayfire::{RaySegment, RayfireGeometry};

/// Mesh element index
pub type ElementId = usize;
/// Boundary side identifier
pub type BoundaryId = u16;
/// Physical coordinates $[x,y]$
pub type Point = [f64; 2];

pub trait Arithmetic {
    fn dot(&self, other: &[f64]) -> f64;
    fn norm_square(&self) -> f64;
    fn norm(&self) -> f64;
    fn normalize(&mut self) -> Self;
    fn add(&self, other: Self) -> Self;
    fn sub(&self, other: Self) -> Self;
    fn scale(&self, s: f64) -> Self;
    /// 2D cross product $u_x v_y - u_y v_x$
    fn cross(&self, other: Self) -> f64;
}
impl Arithmetic for Point {
    fn dot(&self, other: &[f64]) -> f64 {
        self[0] * other[0] + self[1] * other[1]
    }
    fn norm_square(&self) -> f64 {
        self.dot(self)
    }
    fn norm(&self) -> f64 {
        self.norm_square().sqrt()
    }
    fn normalize(&mut self) -> Self {
        let n = self.norm();
        self[0] /= n;
        self[1] /= n;
        *self
    }
    fn add(&self, other: Self) -> Self {
        [self[0] + other[0], self[1] + other[1]]
    }
    fn sub(&self, other: Self) -> Self {
        [self[0] - other[0], self[1] - other[1]]
    }
    fn scale(&self, s: f64) -> Self {
        [self[0] * s, self[1] * s]
    }
    fn cross(&self, other: Self) -> f64 {
        self[0] * other[1] - self[1] * other[0]
    }
}

/// Ray intersection with a convex mesh entity
pub trait RayTracing {
    /// Clips the supporting line of `ray` against the entity
    fn clip(&self, ray: &Ray, tol: f64) -> RayClip;
}
