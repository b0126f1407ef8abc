//! # Rayfire QoI configuration
//!
//! Serializable description of a rayfire QoI, e.g. in JSON:
//! ```json
//! {"name": "line-of-sight", "origin": [0.1, 0.2], "angle_deg": 30.0, "p_level": 4}
//! ```
//! Exactly one of `terminus` and `angle_deg` must be given.

use super::{new_ray, FieldFunction, IntegratedLineFunctional, QoiError, QoiResult, RaySpec};
use serde::{Deserialize, Serialize};
use skyangle::SkyAngle;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayfireConfig {
    pub name: String,
    pub origin: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminus: Option<[f64; 2]>,
    /// Ray direction, counter-clockwise from the $x$ axis in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle_deg: Option<f64>,
    /// Gauss quadrature order
    pub p_level: usize,
}
impl RayfireConfig {
    /// Checks the configuration and returns the ray specification
    pub fn validate(&self) -> QoiResult<RaySpec> {
        if self.name.trim().is_empty() {
            return Err(QoiError::configuration("a rayfire QoI needs a name"));
        }
        if self.p_level == 0 {
            return Err(QoiError::configuration(format!(
                "QoI \"{}\": p_level must be at least 1",
                self.name
            )));
        }
        let ray = new_ray().point_of_origin(self.origin);
        match (self.terminus, self.angle_deg) {
            (Some(terminus), None) => ray.terminus(terminus).build(),
            (None, Some(angle)) => ray
                .direction_angle(SkyAngle::Degree(angle).to_radians())
                .build(),
            (Some(_), Some(_)) => Err(QoiError::configuration(format!(
                "QoI \"{}\": terminus and angle_deg are mutually exclusive",
                self.name
            ))),
            (None, None) => Err(QoiError::configuration(format!(
                "QoI \"{}\": either terminus or angle_deg is required",
                self.name
            ))),
        }
    }
    /// Builds the uninitialized rayfire QoI integrating `function`
    pub fn build(&self, function: Arc<dyn FieldFunction>) -> QoiResult<IntegratedLineFunctional> {
        let spec = self.validate()?;
        Ok(IntegratedLineFunctional::new(
            self.p_level,
            function,
            spec,
            &self.name,
        ))
    }
}
