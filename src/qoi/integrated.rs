use super::{evaluate, Qoi, QoiAccumulator, QoiState};
use crate::{
    AssemblyContext, FieldFunction, QoiError, QoiResult, QuadraturePoint, RayQuadrature, RaySpec,
    RayfireGeometry, SystemSnapshot,
};
use std::{fmt, sync::Arc};

/// # Rayfire QoI
///
/// Line integral of a field function $f$ along a ray:
/// $$Q = \int_0^L f(\vec p + s\vec u)\,ds = \sum_e \sum_{\sigma\in e}\sum_i f(x_i) w_i,$$
/// where $\sigma$ are the ray segments inside element $e$ and $(x_i,w_i)$ the
/// Gauss-Legendre points of order `p_level` mapped onto $\sigma$.
///
/// Clones share the rayfire geometry and the field function but own their
/// accumulator.
#[derive(Clone)]
pub struct IntegratedLineFunctional {
    name: String,
    p_level: usize,
    function: Arc<dyn FieldFunction>,
    spec: RaySpec,
    rayfire: Option<Arc<RayfireGeometry>>,
    quadrature: Option<RayQuadrature>,
    accumulator: QoiAccumulator,
    state: QoiState,
}
impl IntegratedLineFunctional {
    /// Creates an uninitialized rayfire QoI
    ///
    /// The order and the ray are checked by [`init`](Qoi::init).
    pub fn new(p_level: usize, function: Arc<dyn FieldFunction>, spec: RaySpec, name: &str) -> Self {
        Self {
            name: name.to_string(),
            p_level,
            function,
            spec,
            rayfire: None,
            quadrature: None,
            accumulator: QoiAccumulator::default(),
            state: QoiState::Uninitialized,
        }
    }
    /// Binds a new ray, then initializes the QoI against `snapshot`
    ///
    /// On failure, the former ray is restored and the QoI is left uninitialized.
    pub fn init_ray(&mut self, snapshot: &SystemSnapshot, spec: RaySpec) -> QoiResult<()> {
        let previous = std::mem::replace(&mut self.spec, spec);
        let result = self.init(snapshot);
        if result.is_err() {
            self.spec = previous;
        }
        result
    }
    /// Ray/mesh intersection, `None` before `init`
    pub fn rayfire(&self) -> Option<&RayfireGeometry> {
        self.rayfire.as_deref()
    }
    pub fn function(&self) -> &Arc<dyn FieldFunction> {
        &self.function
    }
    pub fn p_level(&self) -> usize {
        self.p_level
    }
    pub fn spec(&self) -> &RaySpec {
        &self.spec
    }
    /// Quadrature points of the ray segments inside the context element
    fn points(
        rayfire: Option<&RayfireGeometry>,
        quadrature: Option<&RayQuadrature>,
        name: &str,
        context: &AssemblyContext,
    ) -> QoiResult<Vec<QuadraturePoint>> {
        let (rayfire, quadrature) = match (rayfire, quadrature) {
            (Some(rayfire), Some(quadrature)) => (rayfire, quadrature),
            _ => return Err(QoiError::Uninitialized(name.to_string())),
        };
        let mut points = Vec::new();
        for segment in rayfire.segments_in(context.element()) {
            points.extend(quadrature.points(segment, context.geometry())?);
        }
        Ok(points)
    }
    /// Builds the quadrature and the rayfire; any failure leaves the QoI
    /// uninitialized without geometry
    fn build(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        self.rayfire = None;
        self.quadrature = None;
        self.state = QoiState::Uninitialized;
        let quadrature = RayQuadrature::new(self.p_level)?;
        let rayfire = RayfireGeometry::build(&self.spec, snapshot.mesh())?;
        log::info!(
            "QoI \"{}\": ray {} crossing {} elements over {:.6}",
            self.name,
            rayfire.ray(),
            rayfire.len(),
            rayfire.total_length()
        );
        self.quadrature = Some(quadrature);
        self.rayfire = Some(Arc::new(rayfire));
        self.state = QoiState::Initialized;
        Ok(())
    }
}
impl Qoi for IntegratedLineFunctional {
    fn name(&self) -> &str {
        &self.name
    }
    fn state(&self) -> QoiState {
        self.state
    }
    fn init(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        self.build(snapshot)
            .map_err(|err| err.in_qoi(&self.name, None))
    }
    /// Rebuilds the rayfire against the new mesh
    ///
    /// Clones made before `reinit` keep the former geometry.
    fn reinit(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        if !self.state.is_initialized() {
            return Err(QoiError::Uninitialized(self.name.clone()));
        }
        log::debug!("QoI \"{}\": rebuilding the rayfire", self.name);
        self.build(snapshot)
            .map_err(|err| err.in_qoi(&self.name, None))
    }
    fn element_qoi(&mut self, context: &AssemblyContext) -> QoiResult<f64> {
        evaluate(
            &self.name,
            &mut self.state,
            &mut self.accumulator,
            context,
            self.function.as_ref(),
            false,
            || {
                Self::points(
                    self.rayfire.as_deref(),
                    self.quadrature.as_ref(),
                    &self.name,
                    context,
                )
            },
        )?;
        Ok(self.accumulator.value())
    }
    fn element_qoi_derivative(&mut self, context: &AssemblyContext) -> QoiResult<Vec<f64>> {
        evaluate(
            &self.name,
            &mut self.state,
            &mut self.accumulator,
            context,
            self.function.as_ref(),
            true,
            || {
                Self::points(
                    self.rayfire.as_deref(),
                    self.quadrature.as_ref(),
                    &self.name,
                    context,
                )
            },
        )?;
        Ok(self.accumulator.derivative().to_vec())
    }
    fn accumulator(&self) -> &QoiAccumulator {
        &self.accumulator
    }
    fn box_clone(&self) -> Box<dyn Qoi> {
        Box::new(self.clone())
    }
}
impl fmt::Display for IntegratedLineFunctional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QoI \"{}\" ({}): ray {}, p={}",
            self.name, self.state, self.spec, self.p_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Constant, ElementGeometry, ElementId, Mesh, SolutionPolynomial, SpatialField,
        UnstructuredMesh,
    };
    use approx::assert_abs_diff_eq;

    fn snapshot() -> SystemSnapshot {
        let mesh = UnstructuredMesh::rectangle_triangles(4, 4, [0., 1., 0., 1.]).unwrap();
        SystemSnapshot::interpolate(Arc::new(mesh), |p| p[0] + p[1])
    }
    fn spec() -> RaySpec {
        RaySpec::Segment {
            origin: [0.05, 0.1],
            terminus: [0.9, 0.75],
        }
    }
    /// Context of `element` with its vertices collapsed on a line
    fn collinear_context(s: &SystemSnapshot, element: ElementId) -> AssemblyContext {
        let context = s.context(element).unwrap();
        AssemblyContext::new(
            ElementGeometry::new(element, vec![[0., 0.], [1., 0.], [2., 0.]]).unwrap(),
            context.dof_indices().to_vec(),
            context.coefficients().to_vec(),
            vec![None; 3],
        )
    }
    fn integrate(qoi: &mut IntegratedLineFunctional, snapshot: &SystemSnapshot) -> f64 {
        (0..snapshot.mesh().n_elements())
            .map(|e| qoi.element_qoi(&snapshot.context(e).unwrap()).unwrap())
            .sum()
    }

    #[test]
    fn length_of_the_ray() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(2, Arc::new(Constant(1.)), spec(), "length");
        qoi.init(&s).unwrap();
        assert_eq!(qoi.state(), QoiState::Initialized);
        let length = 0.85f64.hypot(0.65);
        assert_abs_diff_eq!(integrate(&mut qoi, &s), length, epsilon = 1e-12);
        assert_eq!(qoi.state(), QoiState::Initialized);
    }

    #[test]
    fn linear_solution() {
        // u = x + y along the ray, integrated exactly with p=1
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(
            1,
            Arc::new(SolutionPolynomial::new(vec![0., 1.])),
            spec(),
            "u",
        );
        qoi.init(&s).unwrap();
        let length = 0.85f64.hypot(0.65);
        let mean = 0.5 * (0.15 + 1.65);
        assert_abs_diff_eq!(integrate(&mut qoi, &s), mean * length, epsilon = 1e-12);
    }

    #[test]
    fn evaluation_before_init() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(2, Arc::new(Constant(1.)), spec(), "early");
        let err = qoi.element_qoi(&s.context(0).unwrap()).unwrap_err();
        assert!(matches!(err, QoiError::Uninitialized(_)));
        assert!(qoi.reinit(&s).is_err());
    }

    #[test]
    fn invalid_order() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(0, Arc::new(Constant(1.)), spec(), "p0");
        let err = qoi.init(&s).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(qoi.state(), QoiState::Uninitialized);
    }

    #[test]
    fn derivative_not_supported() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(
            2,
            Arc::new(SpatialField::new("x", |p: crate::Point| p[0])),
            spec(),
            "x",
        );
        qoi.init(&s).unwrap();
        // element 31 is not crossed by the ray, the capability is checked first
        let err = qoi
            .element_qoi_derivative(&s.context(31).unwrap())
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(qoi.state(), QoiState::Initialized);
    }

    #[test]
    fn init_ray_rebinds() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(2, Arc::new(Constant(1.)), spec(), "rebind");
        qoi.init(&s).unwrap();
        qoi.init_ray(
            &s,
            RaySpec::Segment {
                origin: [0.1, 0.5],
                terminus: [0.6, 0.5],
            },
        )
        .unwrap();
        assert_abs_diff_eq!(integrate(&mut qoi, &s), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn failed_init_ray_restores_the_ray() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(2, Arc::new(Constant(1.)), spec(), "restore");
        qoi.init(&s).unwrap();
        let err = qoi
            .init_ray(
                &s,
                RaySpec::Segment {
                    origin: [0.1, 0.5],
                    terminus: [1.6, 0.5],
                },
            )
            .unwrap_err();
        assert!(err.is_geometry());
        assert_eq!(qoi.spec(), &spec());
        assert!(qoi.rayfire().is_none());
        assert_eq!(qoi.state(), QoiState::Uninitialized);
        let err = qoi.element_qoi(&s.context(0).unwrap()).unwrap_err();
        assert!(matches!(err, QoiError::Uninitialized(_)));
        qoi.init(&s).unwrap();
        assert_abs_diff_eq!(integrate(&mut qoi, &s), 0.85f64.hypot(0.65), epsilon = 1e-12);
    }

    #[test]
    fn inverse_map_failure_is_reported() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(
            2,
            Arc::new(SolutionPolynomial::new(vec![0., 1.])),
            spec(),
            "u",
        );
        qoi.init(&s).unwrap();
        let crossed = qoi.rayfire().unwrap().elements()[0];
        let context = collinear_context(&s, crossed);
        for err in [
            qoi.element_qoi(&context).unwrap_err(),
            qoi.element_qoi_derivative(&context).unwrap_err(),
        ] {
            assert!(err.is_numerical(), "{}", err);
            match err {
                QoiError::Assembly { qoi, element, .. } => {
                    assert_eq!(qoi, "u");
                    assert_eq!(element, Some(crossed));
                }
                err => panic!("unexpected error: {}", err),
            }
        }
        assert_eq!(qoi.state(), QoiState::Initialized);
    }

    #[test]
    fn capability_is_checked_before_the_geometry() {
        let s = snapshot();
        let mut qoi = IntegratedLineFunctional::new(
            2,
            Arc::new(SpatialField::new("x", |p: crate::Point| p[0])),
            spec(),
            "x",
        );
        qoi.init(&s).unwrap();
        let crossed = qoi.rayfire().unwrap().elements()[0];
        let context = collinear_context(&s, crossed);
        assert!(qoi.element_qoi(&context).unwrap_err().is_numerical());
        assert!(qoi
            .element_qoi_derivative(&context)
            .unwrap_err()
            .is_unsupported());
    }
}
