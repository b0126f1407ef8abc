use super::{evaluate, Qoi, QoiAccumulator, QoiState};
use crate::{
    AssemblyContext, BoundaryId, FieldFunction, QoiError, QoiResult, QuadraturePoint,
    RayQuadrature, SystemSnapshot,
};
use std::{collections::BTreeSet, sync::Arc};

/// Integral of a field function over the boundary sides tagged with one of
/// the given boundary ids
#[derive(Clone)]
pub struct BoundaryIntegral {
    name: String,
    order: usize,
    function: Arc<dyn FieldFunction>,
    boundary_ids: BTreeSet<BoundaryId>,
    quadrature: Option<RayQuadrature>,
    accumulator: QoiAccumulator,
    state: QoiState,
}
impl BoundaryIntegral {
    pub fn new<I>(order: usize, function: Arc<dyn FieldFunction>, boundary_ids: I, name: &str) -> Self
    where
        I: IntoIterator<Item = BoundaryId>,
    {
        Self {
            name: name.to_string(),
            order,
            function,
            boundary_ids: boundary_ids.into_iter().collect(),
            quadrature: None,
            accumulator: QoiAccumulator::default(),
            state: QoiState::Uninitialized,
        }
    }
    pub fn boundary_ids(&self) -> &BTreeSet<BoundaryId> {
        &self.boundary_ids
    }
    fn points(
        quadrature: Option<&RayQuadrature>,
        boundary_ids: &BTreeSet<BoundaryId>,
        name: &str,
        context: &AssemblyContext,
    ) -> QoiResult<Vec<QuadraturePoint>> {
        let quadrature = quadrature.ok_or_else(|| QoiError::Uninitialized(name.to_string()))?;
        let geometry = context.geometry();
        let mut points = Vec::new();
        for side in 0..geometry.n_sides() {
            if context
                .boundary_id(side)
                .map_or(false, |id| boundary_ids.contains(&id))
            {
                points.extend(quadrature.side_points(geometry, side)?);
            }
        }
        Ok(points)
    }
}
impl Qoi for BoundaryIntegral {
    fn name(&self) -> &str {
        &self.name
    }
    fn state(&self) -> QoiState {
        self.state
    }
    fn init(&mut self, snapshot: &SystemSnapshot) -> QoiResult<()> {
        self.quadrature = None;
        self.state = QoiState::Uninitialized;
        if self.boundary_ids.is_empty() {
            return Err(QoiError::configuration("no boundary id").in_qoi(&self.name, None));
        }
        let quadrature =
            RayQuadrature::new(self.order).map_err(|err| err.in_qoi(&self.name, None))?;
        let n_sides = snapshot
            .mesh()
            .boundary_sides()
            .filter(|(_, _, id)| self.boundary_ids.contains(id))
            .count();
        if n_sides == 0 {
            log::warn!(
                "QoI \"{}\": no boundary side with id in {:?}",
                self.name,
                self.boundary_ids
            );
        }
        log::debug!("QoI \"{}\": {} boundary sides", self.name, n_sides);
        self.quadrature = Some(quadrature);
        self.state = QoiState::Initialized;
        Ok(())
    }
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
            || {
                Self::points(
                    self.quadrature.as_ref(),
                    &self.boundary_ids,
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
                    self.quadrature.as_ref(),
                    &self.boundary_ids,
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
