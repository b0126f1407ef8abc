//! # QoI assembly
//!
//! The drivers loop over the mesh elements, build an [`AssemblyContext`] for
//! each of them and sum the QoI element contributions.
//! The first error aborts the pass and is reported with the QoI name and the
//! element where it happened.
//!
//! [`assemble_qoi_par`] splits the elements in chunks processed by [`rayon`]
//! workers, each worker owning its own clone of the QoI.

use super::{
    Arithmetic, BoundaryId, CompositeQoi, ElementGeometry, ElementId, FieldPoint, Mesh, Point,
    Qoi, QoiError, QoiResult, QuadraturePoint, UnstructuredMesh,
};
use nalgebra as na;
use rayon::prelude::*;
use std::{fmt, sync::Arc};

/// Mesh and discrete solution the QoIs are evaluated against
///
/// The solution holds one P1/Q1 coefficient per mesh vertex.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    mesh: Arc<UnstructuredMesh>,
    solution: Arc<na::DVector<f64>>,
}
impl SystemSnapshot {
    pub fn new(mesh: Arc<UnstructuredMesh>, solution: na::DVector<f64>) -> QoiResult<Self> {
        if solution.len() != mesh.n_vertices() {
            return Err(QoiError::configuration(format!(
                "solution of size {} for a mesh with {} vertices",
                solution.len(),
                mesh.n_vertices()
            )));
        }
        Ok(Self {
            mesh,
            solution: Arc::new(solution),
        })
    }
    /// Snapshot with a zero solution
    pub fn zeros(mesh: Arc<UnstructuredMesh>) -> Self {
        let n = mesh.n_vertices();
        Self {
            mesh,
            solution: Arc::new(na::DVector::zeros(n)),
        }
    }
    /// Snapshot with the solution interpolated from `f` at the mesh vertices
    pub fn interpolate<F>(mesh: Arc<UnstructuredMesh>, f: F) -> Self
    where
        F: Fn(Point) -> f64,
    {
        let solution = na::DVector::from_iterator(
            mesh.n_vertices(),
            mesh.vertices().iter().map(|&v| f(v)),
        );
        Self {
            mesh,
            solution: Arc::new(solution),
        }
    }
    /// Same mesh, new solution
    pub fn with_solution(&self, solution: na::DVector<f64>) -> QoiResult<Self> {
        Self::new(self.mesh.clone(), solution)
    }
    pub fn mesh(&self) -> &UnstructuredMesh {
        &self.mesh
    }
    pub fn shared_mesh(&self) -> Arc<UnstructuredMesh> {
        self.mesh.clone()
    }
    pub fn solution(&self) -> &na::DVector<f64> {
        &self.solution
    }
    /// Total number of degrees of freedom
    pub fn n_dofs(&self) -> usize {
        self.solution.len()
    }
    /// Assembly context of element `id`
    pub fn context(&self, id: ElementId) -> QoiResult<AssemblyContext> {
        let geometry = self.mesh.element(id)?;
        let dofs = self.mesh.element_vertices(id).to_vec();
        let coefficients = dofs.iter().map(|&i| self.solution[i]).collect();
        let boundary_ids = (0..geometry.n_sides())
            .map(|side| self.mesh.boundary_id(id, side))
            .collect();
        Ok(AssemblyContext::new(
            geometry,
            dofs,
            coefficients,
            boundary_ids,
        ))
    }
}

/// Per-element data handed to the QoIs
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyContext {
    geometry: ElementGeometry,
    dofs: Vec<usize>,
    coefficients: Vec<f64>,
    boundary_ids: Vec<Option<BoundaryId>>,
}
impl AssemblyContext {
    pub fn new(
        geometry: ElementGeometry,
        dofs: Vec<usize>,
        coefficients: Vec<f64>,
        boundary_ids: Vec<Option<BoundaryId>>,
    ) -> Self {
        Self {
            geometry,
            dofs,
            coefficients,
            boundary_ids,
        }
    }
    pub fn element(&self) -> ElementId {
        self.geometry.id
    }
    pub fn geometry(&self) -> &ElementGeometry {
        &self.geometry
    }
    pub fn n_dofs(&self) -> usize {
        self.dofs.len()
    }
    /// Global indices of the element degrees of freedom
    pub fn dof_indices(&self) -> &[usize] {
        &self.dofs
    }
    /// Solution coefficients of the element degrees of freedom
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
    /// Boundary identifier of side `side`, `None` for interior sides
    pub fn boundary_id(&self, side: usize) -> Option<BoundaryId> {
        self.boundary_ids.get(side).cloned().flatten()
    }
    /// Discrete solution at reference coordinates `xi`
    pub fn solution_at(&self, xi: Point) -> f64 {
        self.geometry
            .kind
            .shape_values(xi)
            .iter()
            .zip(self.coefficients.iter())
            .map(|(phi, u)| phi * u)
            .sum()
    }
    /// Field point at quadrature point `qp`
    pub fn field_point(&self, qp: &QuadraturePoint) -> QoiResult<FieldPoint> {
        let phi = self.geometry.kind.shape_values(qp.local);
        let dphi = self.geometry.shape_gradients(qp.local)?;
        let u = phi
            .iter()
            .zip(self.coefficients.iter())
            .map(|(phi, u)| phi * u)
            .sum();
        let grad_u = dphi
            .iter()
            .zip(self.coefficients.iter())
            .fold([0f64; 2], |g, (dphi, u)| g.add(dphi.scale(*u)));
        Ok(FieldPoint {
            xyz: qp.xyz,
            local: qp.local,
            element: qp.element,
            phi,
            dphi,
            u,
            grad_u,
        })
    }
}

/// Sums the element contributions of `qoi` over the mesh
pub fn assemble_qoi(qoi: &mut dyn Qoi, snapshot: &SystemSnapshot) -> QoiResult<f64> {
    let mut total = 0f64;
    for id in 0..snapshot.mesh().n_elements() {
        let context = snapshot.context(id)?;
        total += qoi
            .element_qoi(&context)
            .map_err(|err| err.in_qoi(qoi.name(), Some(id)))?;
    }
    log::debug!("QoI \"{}\": {:.6e}", qoi.name(), total);
    Ok(total)
}

/// Scatters the element derivatives of `qoi` into the global derivative vector
pub fn assemble_qoi_derivative(
    qoi: &mut dyn Qoi,
    snapshot: &SystemSnapshot,
) -> QoiResult<na::DVector<f64>> {
    let mut derivative = na::DVector::zeros(snapshot.n_dofs());
    for id in 0..snapshot.mesh().n_elements() {
        let context = snapshot.context(id)?;
        let local = qoi
            .element_qoi_derivative(&context)
            .map_err(|err| err.in_qoi(qoi.name(), Some(id)))?;
        context
            .dof_indices()
            .iter()
            .zip(local.iter())
            .for_each(|(&i, d)| derivative[i] += d);
    }
    Ok(derivative)
}

fn chunk_size(n_elements: usize) -> usize {
    (n_elements / rayon::current_num_threads()).max(1)
}

/// Parallel version of [`assemble_qoi`]
///
/// Every worker evaluates a clone of `qoi`, the original is left untouched.
/// The chunk sums are added in element order.
pub fn assemble_qoi_par(qoi: &dyn Qoi, snapshot: &SystemSnapshot) -> QoiResult<f64> {
    let ids: Vec<ElementId> = (0..snapshot.mesh().n_elements()).collect();
    let partial_sums = ids
        .par_chunks(chunk_size(ids.len()))
        .map(|chunk| {
            let mut worker = qoi.box_clone();
            chunk.iter().try_fold(0f64, |sum, &id| {
                let context = snapshot.context(id)?;
                worker
                    .element_qoi(&context)
                    .map(|value| sum + value)
                    .map_err(|err| err.in_qoi(qoi.name(), Some(id)))
            })
        })
        .collect::<QoiResult<Vec<f64>>>()?;
    let total = partial_sums.into_iter().sum();
    log::debug!(
        "QoI \"{}\" ({} workers): {:.6e}",
        qoi.name(),
        rayon::current_num_threads(),
        total
    );
    Ok(total)
}

/// Parallel version of [`assemble_qoi_derivative`]
pub fn assemble_qoi_derivative_par(
    qoi: &dyn Qoi,
    snapshot: &SystemSnapshot,
) -> QoiResult<na::DVector<f64>> {
    let n_dofs = snapshot.n_dofs();
    let ids: Vec<ElementId> = (0..snapshot.mesh().n_elements()).collect();
    let partial_derivatives = ids
        .par_chunks(chunk_size(ids.len()))
        .map(|chunk| {
            let mut worker = qoi.box_clone();
            chunk
                .iter()
                .try_fold(na::DVector::zeros(n_dofs), |mut derivative, &id| {
                    let context = snapshot.context(id)?;
                    let local = worker
                        .element_qoi_derivative(&context)
                        .map_err(|err| err.in_qoi(qoi.name(), Some(id)))?;
                    context
                        .dof_indices()
                        .iter()
                        .zip(local.iter())
                        .for_each(|(&i, d)| derivative[i] += d);
                    Ok(derivative)
                })
        })
        .collect::<QoiResult<Vec<na::DVector<f64>>>>()?;
    Ok(partial_derivatives
        .into_iter()
        .fold(na::DVector::zeros(n_dofs), |a, b| a + b))
}

/// Values of the members of a [`CompositeQoi`]
#[derive(Debug, Clone, PartialEq)]
pub struct QoiValues {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}
impl QoiValues {
    /// Evaluates every member of `composite` in a single pass over the mesh
    pub fn assemble(composite: &mut CompositeQoi, snapshot: &SystemSnapshot) -> QoiResult<Self> {
        let mut values = vec![0f64; composite.len()];
        for id in 0..snapshot.mesh().n_elements() {
            let context = snapshot.context(id)?;
            composite
                .element_qoi_each(&context)?
                .into_iter()
                .zip(values.iter_mut())
                .for_each(|(e, v)| *v += e);
        }
        Ok(Self {
            names: composite.names(),
            values,
        })
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    /// Value of the QoI named `name`
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}
impl fmt::Display for QoiValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.names.iter().zip(self.values.iter()) {
            writeln!(f, "QoI {:>24}: {:+.9e}", name, value)?;
        }
        write!(f, "QoI {:>24}: {:+.9e}", "total", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn snapshot() -> SystemSnapshot {
        let mesh = UnstructuredMesh::rectangle_quads(2, 2, [0., 2., 0., 2.]).unwrap();
        SystemSnapshot::interpolate(Arc::new(mesh), |p| 1. + p[0] + 2. * p[1])
    }

    #[test]
    fn solution_size_mismatch() {
        let s = snapshot();
        let err = s.with_solution(na::DVector::zeros(3)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn context_reproduces_linear_solution() {
        let s = snapshot();
        let context = s.context(3).unwrap();
        assert_eq!(context.n_dofs(), 4);
        let xi = [0.3, -0.2];
        let xyz = context.geometry().map(xi);
        let qp = QuadraturePoint {
            xyz,
            weight: 1.,
            local: xi,
            element: 3,
        };
        let fp = context.field_point(&qp).unwrap();
        assert_abs_diff_eq!(fp.u, 1. + xyz[0] + 2. * xyz[1], epsilon = 1e-12);
        assert_abs_diff_eq!(fp.grad_u[0], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(fp.grad_u[1], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(context.solution_at(xi), fp.u, epsilon = 1e-12);
    }

    #[test]
    fn boundary_sides_in_context() {
        let s = snapshot();
        // lower left element: bottom and left sides on the boundary
        let context = s.context(0).unwrap();
        assert_eq!(context.boundary_id(0), Some(0));
        assert_eq!(context.boundary_id(1), None);
        assert_eq!(context.boundary_id(2), None);
        assert_eq!(context.boundary_id(3), Some(3));
    }
}
