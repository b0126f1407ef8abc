use super::{Qoi, QoiAccumulator, QoiState};
use crate::{AssemblyContext, QoiError, QoiResult, SystemSnapshot};

/// Ordered collection of QoIs evaluated together
///
/// The composite value is the sum of the member values and its derivative the
/// sum of the member derivatives. A member failure fails the whole composite,
/// the error naming the member.
#[derive(Clone)]
pub struct CompositeQoi {
    name: String,
    members: Vec<Box<dyn Qoi>>,
    accumulator: QoiAccumulator,
    state: QoiState,
}
impl CompositeQoi {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            accumulator: QoiAccumulator::default(),
            state: QoiState::Uninitialized,
        }
    }
    /// Appends a member
    pub fn push<Q: Qoi + 'static>(&mut self, qoi: Q) -> &mut Self {
        self.members.push(Box::new(qoi));
        self.state = QoiState::Uninitialized;
        self
    }
    /// Appends a boxed member
    pub fn push_boxed(&mut self, qoi: Box<dyn Qoi>) -> &mut Self {
        self.members.push(qoi);
        self.state = QoiState::Uninitialized;
        self
    }
    pub fn len(&self) -> usize {
        self.members.len()
    }
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|q| q.name().to_string()).collect()
    }
    pub fn members(&self) -> &[Box<dyn Qoi>] {
        &self.members
    }
    pub fn get(&self, name: &str) -> Option<&dyn Qoi> {
        self.members
            .iter()
            .find(|q| q.name() == name)
            .map(|q| q.as_ref())
    }
    /// Element contribution of every member, in member order
    pub fn element_qoi_each(&mut self, context: &AssemblyContext) -> QoiResult<Vec<f64>> {
        if !self.state.is_initialized() {
            return Err(QoiError::Uninitialized(self.name.clone()));
        }
        self.members
            .iter_mut()
            .map(|q| {
                q.element_qoi(context)
                    .map_err(|err| err.in_qoi(q.name(), Some(context.element())))
            })
            .collect()
    }
}
impl Qoi for CompositeQoi {
    fn name(&self) -> &str {
        &self.name
    }
    fn state(&self) -> QoiState {
        self.state
    }
    /// Initializes every member; the composite is initialized only once all
    /// of them are
    fn init(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        self.state = QoiState::Uninitialized;
        for q in self.members.iter_mut() {
            q.init(snapshot).map_err(|err| err.in_qoi(q.name(), None))?;
        }
        log::info!(
            "QoI \"{}\": {} members initialized",
            self.name,
            self.members.len()
        );
        self.state = QoiState::Initialized;
        Ok(())
    }
    /// Members left uninitialized by a former failure are initialized anew
    fn reinit(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        if !self.state.is_initialized() {
            return Err(QoiError::Uninitialized(self.name.clone()));
        }
        self.state = QoiState::Uninitialized;
        for q in self.members.iter_mut() {
            let result = if q.state().is_initialized() {
                q.reinit(snapshot)
            } else {
                q.init(snapshot)
            };
            result.map_err(|err| err.in_qoi(q.name(), None))?;
        }
        self.state = QoiState::Initialized;
        Ok(())
    }
    fn element_qoi(&mut self, context: &AssemblyContext) -> QoiResult<f64> {
        self.state.begin(&self.name)?;
        self.accumulator.reset(context.n_dofs());
        let values = self.element_qoi_each(context);
        self.state.end();
        self.accumulator.value = values?.into_iter().sum();
        Ok(self.accumulator.value)
    }
    fn element_qoi_derivative(&mut self, context: &AssemblyContext) -> QoiResult<Vec<f64>> {
        self.state.begin(&self.name)?;
        self.accumulator.reset(context.n_dofs());
        let mut result = Ok(());
        for q in self.members.iter_mut() {
            match q.element_qoi_derivative(context) {
                Ok(derivative) => {
                    self.accumulator
                        .derivative
                        .iter_mut()
                        .zip(derivative.iter())
                        .for_each(|(a, d)| *a += d);
                    self.accumulator.value += q.accumulator().value();
                }
                Err(err) => {
                    result = Err(err.in_qoi(q.name(), Some(context.element())));
                    break;
                }
            }
        }
        self.state.end();
        result.map(|_| self.accumulator.derivative.clone())
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
    use crate::{
        assemble_qoi, Constant, IntegratedLineFunctional, InteriorIntegral, QoiValues, RaySpec,
        SpatialField, UnstructuredMesh,
    };
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn snapshot() -> SystemSnapshot {
        let mesh = UnstructuredMesh::rectangle_quads(4, 4, [0., 2., 0., 2.]).unwrap();
        SystemSnapshot::zeros(Arc::new(mesh))
    }
    fn composite() -> CompositeQoi {
        let mut composite = CompositeQoi::new("all");
        composite
            .push(IntegratedLineFunctional::new(
                2,
                Arc::new(Constant(1.)),
                RaySpec::Segment {
                    origin: [0.1, 0.3],
                    terminus: [1.9, 0.3],
                },
                "ray",
            ))
            .push(InteriorIntegral::new(1, Arc::new(Constant(1.)), "area"));
        composite
    }

    #[test]
    fn sum_of_members() {
        let s = snapshot();
        let mut q = composite();
        assert_eq!(q.len(), 2);
        q.init(&s).unwrap();
        assert_abs_diff_eq!(assemble_qoi(&mut q, &s).unwrap(), 1.8 + 4., epsilon = 1e-12);
        assert_eq!(q.names(), vec!["ray".to_string(), "area".to_string()]);
    }

    #[test]
    fn member_failure_is_named() {
        let s = snapshot();
        let mut q = composite();
        q.push(IntegratedLineFunctional::new(
            2,
            Arc::new(Constant(1.)),
            RaySpec::Segment {
                origin: [0.1, 0.3],
                terminus: [2.5, 0.3],
            },
            "outside",
        ));
        match q.init(&s).unwrap_err() {
            QoiError::Assembly { qoi, .. } => assert_eq!(qoi, "outside"),
            err => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn derivative_of_unsupported_member() {
        let s = snapshot();
        let mut q = composite();
        q.push(InteriorIntegral::new(
            1,
            Arc::new(SpatialField::new("x", |p: crate::Point| p[0])),
            "x",
        ));
        q.init(&s).unwrap();
        let err = q.element_qoi_derivative(&s.context(0).unwrap()).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(q.state(), QoiState::Initialized);
    }

    #[test]
    fn clones_are_independent() {
        let s = snapshot();
        let mut q = composite();
        q.init(&s).unwrap();
        let mut c = q.clone();
        let context = s.context(1).unwrap();
        let v = c.element_qoi(&context).unwrap();
        assert_abs_diff_eq!(v, 0.5 + 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(q.accumulator().value(), 0., epsilon = 1e-14);
    }

    #[test]
    fn failed_reinit_leaves_it_uninitialized() {
        let s = snapshot();
        let mut q = composite();
        q.init(&s).unwrap();
        // the ray terminus falls outside of the smaller domain
        let small = UnstructuredMesh::rectangle_quads(2, 2, [0., 1., 0., 1.]).unwrap();
        let small = SystemSnapshot::zeros(Arc::new(small));
        match q.reinit(&small).unwrap_err() {
            QoiError::Assembly { qoi, .. } => assert_eq!(qoi, "ray"),
            err => panic!("unexpected error: {}", err),
        }
        assert_eq!(q.state(), QoiState::Uninitialized);
        assert_eq!(q.get("ray").unwrap().state(), QoiState::Uninitialized);
        assert!(q.element_qoi_each(&small.context(0).unwrap()).is_err());
        assert!(assemble_qoi(&mut q, &small).is_err());
        assert!(QoiValues::assemble(&mut q, &small).is_err());
        assert!(q.reinit(&s).is_err());
        q.init(&s).unwrap();
        assert_abs_diff_eq!(assemble_qoi(&mut q, &s).unwrap(), 1.8 + 4., epsilon = 1e-12);
    }
}
