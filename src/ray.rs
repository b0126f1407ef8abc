use super::{Arithmetic, Point, QoiError, QoiResult};
use std::fmt;

/// # Ray definition
///
/// A ray is defined with:
///  - a point of origin: $\vec p = [x,y]$,
///  - a terminus: $\vec t = [x,y]$ such as $\vec t \neq \vec p$.
///
/// A point on the ray is given by: $$\vec{p^\prime} = \vec p + s \vec u,$$
/// where $\vec u = (\vec t - \vec p)/\|\vec t - \vec p\|$ and $s\in[0,L]$ is the arc length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    origin: Point,
    terminus: Point,
    u: Point,
    length: f64,
}
impl Ray {
    /// Creates a new `Ray` from `origin` to `terminus`
    pub fn new(origin: Point, terminus: Point) -> QoiResult<Self> {
        if origin.iter().chain(terminus.iter()).any(|x| !x.is_finite()) {
            return Err(QoiError::configuration(format!(
                "ray end points must be finite: {:?} -> {:?}",
                origin, terminus
            )));
        }
        let mut u = terminus.sub(origin);
        let length = u.norm();
        if length <= f64::EPSILON * (1f64 + origin.norm()) {
            return Err(QoiError::configuration(format!(
                "zero-length ray at {:?}",
                origin
            )));
        }
        Ok(Self {
            origin,
            terminus,
            u: u.normalize(),
            length,
        })
    }
    /// Ray point of origin
    pub fn origin(&self) -> Point {
        self.origin
    }
    /// Ray terminus
    pub fn terminus(&self) -> Point {
        self.terminus
    }
    /// Ray unit direction vector
    pub fn direction(&self) -> Point {
        self.u
    }
    /// Ray Euclidean length $L$
    pub fn length(&self) -> f64 {
        self.length
    }
    /// Point at arc length $s$: $\vec p + s \vec u$
    pub fn point_at(&self, s: f64) -> Point {
        if s >= self.length {
            self.terminus
        } else {
            self.origin.add(self.u.scale(s))
        }
    }
    /// Arc length of the projection of `p` onto the ray
    pub fn arc_length_of(&self, p: Point) -> f64 {
        p.sub(self.origin).dot(&self.u)
    }
    /// Signed distance from `p` to the ray supporting line, positive on the left
    pub fn signed_distance(&self, p: Point) -> f64 {
        self.u.cross(p.sub(self.origin))
    }
    /// Returns a copy of the ray ending at arc length `s`
    pub fn truncated(&self, s: f64) -> QoiResult<Self> {
        Self::new(self.origin, self.point_at(s))
    }
}
impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P: [{:+15.9},{:+15.9}] ; T: [{:+15.9},{:+15.9}] ; L: {:.9}",
            self.origin[0], self.origin[1], self.terminus[0], self.terminus[1], self.length
        )
    }
}

/// # Ray specification
///
/// How a ray is given before it is resolved against a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RaySpec {
    /// Straight segment from `origin` to `terminus`
    Segment { origin: Point, terminus: Point },
    /// Ray leaving `origin` with angle `theta` (radians, counter-clockwise from the $x$ axis),
    /// ending where it leaves the mesh
    Angle { origin: Point, theta: f64 },
}
impl RaySpec {
    pub fn origin(&self) -> Point {
        match *self {
            RaySpec::Segment { origin, .. } => origin,
            RaySpec::Angle { origin, .. } => origin,
        }
    }
    /// Checks the specification without a mesh
    pub fn validate(&self) -> QoiResult<()> {
        match *self {
            RaySpec::Segment { origin, terminus } => Ray::new(origin, terminus).map(|_| ()),
            RaySpec::Angle { origin, theta } => {
                if origin.iter().all(|x| x.is_finite()) && theta.is_finite() {
                    Ok(())
                } else {
                    Err(QoiError::configuration(format!(
                        "invalid angle ray: origin {:?}, theta {}",
                        origin, theta
                    )))
                }
            }
        }
    }
}
impl fmt::Display for RaySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaySpec::Segment { origin, terminus } => write!(
                f,
                "[{:+.6},{:+.6}] -> [{:+.6},{:+.6}]",
                origin[0], origin[1], terminus[0], terminus[1]
            ),
            RaySpec::Angle { origin, theta } => write!(
                f,
                "[{:+.6},{:+.6}] @ {:.6}rd",
                origin[0], origin[1], theta
            ),
        }
    }
}

/// # Ray builder
///
/// Build a new [`RaySpec`](crate::RaySpec)
pub struct NewRay {
    /// Ray point of origin
    pub origin: Point,
    /// Ray terminus
    pub terminus: Option<Point>,
    /// Ray direction angle in radians
    pub theta: Option<f64>,
}
impl Default for NewRay {
    fn default() -> Self {
        Self {
            origin: [0f64; 2],
            terminus: None,
            theta: None,
        }
    }
}
impl NewRay {
    /// Set the ray point of origin
    pub fn point_of_origin(self, origin: Point) -> Self {
        Self { origin, ..self }
    }
    /// Set the ray terminus
    pub fn terminus(self, terminus: Point) -> Self {
        Self {
            terminus: Some(terminus),
            theta: None,
            ..self
        }
    }
    /// Set the ray direction from its angle (radians) to the $x$ axis
    pub fn direction_angle(self, theta: f64) -> Self {
        Self {
            theta: Some(theta),
            terminus: None,
            ..self
        }
    }
    /// Build the [`RaySpec`](crate::RaySpec)
    pub fn build(self) -> QoiResult<RaySpec> {
        let spec = match (self.terminus, self.theta) {
            (Some(terminus), _) => RaySpec::Segment {
                origin: self.origin,
                terminus,
            },
            (None, Some(theta)) => RaySpec::Angle {
                origin: self.origin,
                theta,
            },
            (None, None) => {
                return Err(QoiError::configuration(
                    "a ray needs either a terminus or a direction angle",
                ))
            }
        };
        spec.validate()?;
        Ok(spec)
    }
}
/// Create a [`NewRay`](crate::ray::NewRay) at the origin
pub fn new_ray() -> NewRay {
    NewRay::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use skyangle::SkyAngle;

    #[test]
    fn ray_geometry() {
        let ray = Ray::new([1., 1.], [4., 5.]).unwrap();
        assert_abs_diff_eq!(ray.length(), 5., epsilon = 1e-12);
        assert_abs_diff_eq!(ray.direction()[0], 0.6, epsilon = 1e-12);
        let p = ray.point_at(2.5);
        assert_abs_diff_eq!(p[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 3., epsilon = 1e-12);
        assert_abs_diff_eq!(ray.arc_length_of(p), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(ray.signed_distance(p), 0., epsilon = 1e-12);
    }

    #[test]
    fn zero_length_ray() {
        let err = Ray::new([0.5, 0.5], [0.5, 0.5]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn builder() {
        let spec = new_ray()
            .point_of_origin([0., 0.5])
            .direction_angle(SkyAngle::Degree(90f64).to_radians())
            .build()
            .unwrap();
        match spec {
            RaySpec::Angle { theta, .. } => {
                assert_abs_diff_eq!(theta, std::f64::consts::FRAC_PI_2, epsilon = 1e-12)
            }
            _ => panic!("expected an angle ray"),
        }
        assert!(new_ray().point_of_origin([0., 0.5]).build().is_err());
    }
}
