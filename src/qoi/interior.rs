use super::{evaluate, Qoi, QoiAccumulator, QoiState};
use crate::{
    AssemblyContext, ElementKind, FieldFunction, GaussRule, Point, QoiError, QoiResult,
    QuadraturePoint, SystemSnapshot,
};
use std::sync::Arc;

/// Integral of a field function over the whole domain
///
/// Each element is integrated with the 2D Gauss rule of order `order`.
#[derive(Clone)]
pub struct InteriorIntegral {
    name: String,
    order: usize,
    function: Arc<dyn FieldFunction>,
    triangle_rule: Arc<Vec<(Point, f64)>>,
    quad_rule: Arc<Vec<(Point, f64)>>,
    accumulator: QoiAccumulator,
    state: QoiState,
}
impl InteriorIntegral {
    pub fn new(order: usize, function: Arc<dyn FieldFunction>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            order,
            function,
            triangle_rule: Arc::new(Vec::new()),
            quad_rule: Arc::new(Vec::new()),
            accumulator: QoiAccumulator::default(),
            state: QoiState::Uninitialized,
        }
    }
    pub fn order(&self) -> usize {
        self.order
    }
    fn points(
        triangle_rule: &[(Point, f64)],
        quad_rule: &[(Point, f64)],
        context: &AssemblyContext,
    ) -> Vec<QuadraturePoint> {
        let geometry = context.geometry();
        let rule = match geometry.kind {
            ElementKind::Tri3 => triangle_rule,
            ElementKind::Quad4 => quad_rule,
        };
        rule.iter()
            .map(|&(xi, w)| QuadraturePoint {
                xyz: geometry.map(xi),
                weight: w * geometry.jacobian_determinant(xi),
                local: xi,
                element: geometry.id,
            })
            .collect()
    }
}
impl Qoi for InteriorIntegral {
    fn name(&self) -> &str {
        &self.name
    }
    fn state(&self) -> QoiState {
        self.state
    }
    fn init(&mut self, _snapshot: &SystemSnapshot) -> QoiResult<()> {
        self.state = QoiState::Uninitialized;
        let rules = GaussRule::element_rule(ElementKind::Tri3, self.order).and_then(|tri| {
            GaussRule::element_rule(ElementKind::Quad4, self.order).map(|quad| (tri, quad))
        });
        let (tri, quad) = rules.map_err(|err| err.in_qoi(&self.name, None))?;
        log::debug!(
            "QoI \"{}\": {} points per triangle, {} per quadrilateral",
            self.name,
            tri.len(),
            quad.len()
        );
        self.triangle_rule = Arc::new(tri);
        self.quad_rule = Arc::new(quad);
        self.state = QoiState::Initialized;
        Ok(())
    }
    /// Nothing depends on the mesh but the element rules are rebuilt anyway
    fn reinit(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        if !self.state.is_initialized() {
            return Err(QoiError::Uninitialized(self.name.clone()));
        }
        self.init(snapshot)
    }
    fn element_qoi(&mut self, context: &AssemblyContext) -> QoiResult<f64> {
        evaluate(
            &self.name,
            &mut self.state,
            &mut self.accumulator,
            context,
            self.function.as_ref(),
            false,
            || Ok(Self::points(&self.triangle_rule, &self.quad_rule, context)),
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
            || Ok(Self::points(&self.triangle_rule, &self.quad_rule, context)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assemble_qoi, Constant, SpatialField, UnstructuredMesh};
    use approx::assert_abs_diff_eq;

    #[test]
    fn domain_area() {
        for mesh in vec![
            UnstructuredMesh::rectangle_quads(3, 2, [0., 3., -1., 1.]).unwrap(),
            UnstructuredMesh::rectangle_triangles(3, 2, [0., 3., -1., 1.]).unwrap(),
        ] {
            let s = SystemSnapshot::zeros(Arc::new(mesh));
            let mut qoi = InteriorIntegral::new(1, Arc::new(Constant(1.)), "area");
            qoi.init(&s).unwrap();
            assert_abs_diff_eq!(assemble_qoi(&mut qoi, &s).unwrap(), 6., epsilon = 1e-12);
        }
    }

    #[test]
    fn second_moment() {
        // x^2 y^2 over [0,1]^2: 1/9
        let mesh = UnstructuredMesh::rectangle_triangles(2, 2, [0., 1., 0., 1.]).unwrap();
        let s = SystemSnapshot::zeros(Arc::new(mesh));
        let f = SpatialField::new("x^2y^2", |p: Point| p[0] * p[0] * p[1] * p[1]);
        let mut qoi = InteriorIntegral::new(4, Arc::new(f), "moment");
        qoi.init(&s).unwrap();
        assert_abs_diff_eq!(assemble_qoi(&mut qoi, &s).unwrap(), 1. / 9., epsilon = 1e-12);
    }

    #[test]
    fn invalid_order_leaves_it_uninitialized() {
        let mesh = UnstructuredMesh::rectangle_quads(2, 2, [0., 1., 0., 1.]).unwrap();
        let s = SystemSnapshot::zeros(Arc::new(mesh));
        let mut qoi = InteriorIntegral::new(0, Arc::new(Constant(1.)), "p0");
        assert!(qoi.init(&s).unwrap_err().is_configuration());
        assert_eq!(qoi.state(), QoiState::Uninitialized);
        assert!(matches!(qoi.reinit(&s), Err(QoiError::Uninitialized(_))));
        assert!(assemble_qoi(&mut qoi, &s).is_err());
    }
}
