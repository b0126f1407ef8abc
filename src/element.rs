//! # Mesh elements
//!
//! Linear triangles and bilinear quadrilaterals, their reference maps and
//! their intersection with a ray.
//!
//! Reference elements:
//!  - `Tri3`: the triangle $(0,0),(1,0),(0,1)$,
//!  - `Quad4`: the square $[-1,1]^2$.

use super::{Arithmetic, ElementId, Point, QoiError, QoiResult, Ray, RayTracing};
use nalgebra as na;

const NEWTON_MAX_ITER: usize = 25;
const NEWTON_TOL: f64 = 1e-13;
/// Slack on the reference element bounds when checking an inverse map result
const REFERENCE_TOL: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Tri3,
    Quad4,
}
impl ElementKind {
    pub fn from_n_vertices(n: usize) -> Option<Self> {
        match n {
            3 => Some(ElementKind::Tri3),
            4 => Some(ElementKind::Quad4),
            _ => None,
        }
    }
    pub fn n_vertices(&self) -> usize {
        match self {
            ElementKind::Tri3 => 3,
            ElementKind::Quad4 => 4,
        }
    }
    /// Reference element centroid
    pub fn reference_centroid(&self) -> Point {
        match self {
            ElementKind::Tri3 => [1f64 / 3f64; 2],
            ElementKind::Quad4 => [0f64; 2],
        }
    }
    /// Checks that `xi` lies in the reference element up to `tol`
    pub fn contains_reference(&self, xi: Point, tol: f64) -> bool {
        match self {
            ElementKind::Tri3 => xi[0] >= -tol && xi[1] >= -tol && xi[0] + xi[1] <= 1f64 + tol,
            ElementKind::Quad4 => xi[0].abs() <= 1f64 + tol && xi[1].abs() <= 1f64 + tol,
        }
    }
    /// Shape function values at reference coordinates `xi`
    pub fn shape_values(&self, xi: Point) -> Vec<f64> {
        let (x, y) = (xi[0], xi[1]);
        match self {
            ElementKind::Tri3 => vec![1f64 - x - y, x, y],
            ElementKind::Quad4 => QUAD_NODES
                .iter()
                .map(|n| 0.25 * (1f64 + x * n[0]) * (1f64 + y * n[1]))
                .collect(),
        }
    }
    /// Shape function gradients with respect to the reference coordinates
    pub fn shape_reference_gradients(&self, xi: Point) -> Vec<Point> {
        let (x, y) = (xi[0], xi[1]);
        match self {
            ElementKind::Tri3 => vec![[-1f64, -1f64], [1f64, 0f64], [0f64, 1f64]],
            ElementKind::Quad4 => QUAD_NODES
                .iter()
                .map(|n| {
                    [
                        0.25 * n[0] * (1f64 + y * n[1]),
                        0.25 * n[1] * (1f64 + x * n[0]),
                    ]
                })
                .collect(),
        }
    }
}
const QUAD_NODES: [Point; 4] = [[-1f64, -1f64], [1f64, -1f64], [1f64, 1f64], [-1f64, 1f64]];

/// Result of clipping a ray supporting line against a convex element
///
/// The line enters the element at arc length `s_in` and leaves it at `s_out`.
#[derive(Debug, Clone, PartialEq)]
pub struct RayClip {
    pub s_in: f64,
    pub s_out: f64,
    /// Sides crossed at `s_out`, two when the line leaves through a vertex
    pub exit_sides: Vec<usize>,
    /// Side the line runs along, if any
    pub along_side: Option<usize>,
}
impl RayClip {
    fn empty() -> Self {
        Self {
            s_in: f64::INFINITY,
            s_out: f64::NEG_INFINITY,
            exit_sides: Vec::new(),
            along_side: None,
        }
    }
    pub fn is_empty(&self) -> bool {
        !(self.s_out > self.s_in)
    }
    pub fn length(&self) -> f64 {
        if self.is_empty() {
            0f64
        } else {
            self.s_out - self.s_in
        }
    }
}

/// Geometry of one mesh element
///
/// The vertices are stored counter-clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry {
    pub id: ElementId,
    pub kind: ElementKind,
    pub vertices: Vec<Point>,
}
impl ElementGeometry {
    pub fn new(id: ElementId, vertices: Vec<Point>) -> QoiResult<Self> {
        let kind = ElementKind::from_n_vertices(vertices.len()).ok_or_else(|| {
            QoiError::geometry_at(
                id,
                format!("unsupported element with {} vertices", vertices.len()),
            )
        })?;
        Ok(Self { id, kind, vertices })
    }
    pub fn n_sides(&self) -> usize {
        self.vertices.len()
    }
    /// End points of side `k`, from vertex `k` to vertex `k+1`
    pub fn side(&self, k: usize) -> (Point, Point) {
        let n = self.vertices.len();
        (self.vertices[k % n], self.vertices[(k + 1) % n])
    }
    pub fn side_length(&self, k: usize) -> f64 {
        let (a, b) = self.side(k);
        b.sub(a).norm()
    }
    /// Unit outward normal of side `k`
    pub fn side_normal(&self, k: usize) -> Point {
        let (a, b) = self.side(k);
        let e = b.sub(a);
        let mut n = [e[1], -e[0]];
        n.normalize()
    }
    /// Signed area, positive for counter-clockwise vertices
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        0.5 * (0..n)
            .map(|i| self.vertices[i].cross(self.vertices[(i + 1) % n]))
            .sum::<f64>()
    }
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }
    /// Vertex average
    pub fn centroid(&self) -> Point {
        let n = self.vertices.len() as f64;
        self.vertices
            .iter()
            .fold([0f64; 2], |c, v| c.add(*v))
            .scale(1f64 / n)
    }
    /// Largest distance between two vertices
    pub fn diameter(&self) -> f64 {
        self.vertices
            .iter()
            .flat_map(|a| self.vertices.iter().map(move |b| b.sub(*a).norm()))
            .fold(0f64, f64::max)
    }
    /// Bounding box `[x_min, x_max, y_min, y_max]`
    pub fn bounding_box(&self) -> [f64; 4] {
        self.vertices.iter().fold(
            [
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
            ],
            |b, v| [b[0].min(v[0]), b[1].max(v[0]), b[2].min(v[1]), b[3].max(v[1])],
        )
    }
    /// Checks if `p` is inside the element, or within `tol` of its boundary
    pub fn contains(&self, p: Point, tol: f64) -> bool {
        (0..self.n_sides()).all(|k| {
            let (a, _) = self.side(k);
            self.side_normal(k).dot(&p.sub(a)) <= tol
        })
    }
    /// Geometric map $\vec x(\vec\xi) = \sum_j \vec x_j \phi_j(\vec\xi)$
    pub fn map(&self, xi: Point) -> Point {
        self.kind
            .shape_values(xi)
            .iter()
            .zip(self.vertices.iter())
            .fold([0f64; 2], |x, (phi, v)| x.add(v.scale(*phi)))
    }
    /// Jacobian matrix $J_{ik} = \partial x_i / \partial \xi_k$ of the geometric map
    pub fn jacobian(&self, xi: Point) -> na::Matrix2<f64> {
        let dphi = self.kind.shape_reference_gradients(xi);
        let mut j = na::Matrix2::zeros();
        dphi.iter().zip(self.vertices.iter()).for_each(|(g, v)| {
            j[(0, 0)] += v[0] * g[0];
            j[(0, 1)] += v[0] * g[1];
            j[(1, 0)] += v[1] * g[0];
            j[(1, 1)] += v[1] * g[1];
        });
        j
    }
    fn inverse_jacobian(&self, xi: Point) -> QoiResult<na::Matrix2<f64>> {
        let j = self.jacobian(xi);
        let h = self.diameter();
        if j.determinant().abs() <= 1e-12 * h * h {
            return Err(QoiError::numerical(
                self.id,
                format!(
                    "singular Jacobian (det={:.3e}) at [{:.6},{:.6}]",
                    j.determinant(),
                    xi[0],
                    xi[1]
                ),
            ));
        }
        j.try_inverse()
            .ok_or_else(|| QoiError::numerical(self.id, "Jacobian inversion failed"))
    }
    /// Inverse geometric map: reference coordinates of the physical point `p`
    ///
    /// Newton iterations $\vec\xi \leftarrow \vec\xi - J^{-1}(\vec x(\vec\xi)-\vec p)$ starting
    /// from the reference centroid; affine elements converge in one step.
    /// A singular Jacobian, a lack of convergence or a point mapped outside
    /// the reference element are numerical errors.
    pub fn inverse_map(&self, p: Point) -> QoiResult<Point> {
        let h = self.diameter();
        let mut xi = self.kind.reference_centroid();
        for _ in 0..NEWTON_MAX_ITER {
            let r = self.map(xi).sub(p);
            if r.norm() <= NEWTON_TOL * h.max(1f64) {
                return self.check_reference(xi, p);
            }
            let delta = self.inverse_jacobian(xi)? * na::Vector2::new(r[0], r[1]);
            xi = [xi[0] - delta[0], xi[1] - delta[1]];
            if !(xi[0].is_finite() && xi[1].is_finite()) {
                break;
            }
        }
        let r = self.map(xi).sub(p);
        if r.norm() <= 1e3 * NEWTON_TOL * h.max(1f64) {
            return self.check_reference(xi, p);
        }
        Err(QoiError::numerical(
            self.id,
            format!(
                "inverse map of [{:.9},{:.9}] did not converge in {} iterations (residual {:.3e})",
                p[0],
                p[1],
                NEWTON_MAX_ITER,
                r.norm()
            ),
        ))
    }
    fn check_reference(&self, xi: Point, p: Point) -> QoiResult<Point> {
        if self.kind.contains_reference(xi, REFERENCE_TOL) {
            Ok(xi)
        } else {
            Err(QoiError::numerical(
                self.id,
                format!(
                    "[{:.9},{:.9}] maps outside the reference element to [{:.6},{:.6}]",
                    p[0], p[1], xi[0], xi[1]
                ),
            ))
        }
    }
    /// Shape function gradients with respect to the physical coordinates:
    /// $\nabla\phi_j = J^{-T}\nabla_\xi\phi_j$
    pub fn shape_gradients(&self, xi: Point) -> QoiResult<Vec<Point>> {
        let jit = self.inverse_jacobian(xi)?.transpose();
        Ok(self
            .kind
            .shape_reference_gradients(xi)
            .into_iter()
            .map(|g| {
                let v = jit * na::Vector2::new(g[0], g[1]);
                [v[0], v[1]]
            })
            .collect())
    }
    /// $|\det J|$ at `xi`
    pub fn jacobian_determinant(&self, xi: Point) -> f64 {
        self.jacobian(xi).determinant().abs()
    }
}
impl RayTracing for ElementGeometry {
    /// Cyrus-Beck clipping of the ray supporting line against the convex element
    ///
    /// With $\vec n_k$ the unit outward normal of side $k$ starting at $\vec v_k$,
    /// the line $\vec p + s\vec u$ is inside where $\vec n_k\cdot(\vec p-\vec v_k) + s\,\vec n_k\cdot\vec u \le 0$ for all $k$.
    fn clip(&self, ray: &Ray, tol: f64) -> RayClip {
        let p = ray.origin();
        let u = ray.direction();
        let mut clip = RayClip {
            s_in: f64::NEG_INFINITY,
            s_out: f64::INFINITY,
            exit_sides: Vec::new(),
            along_side: None,
        };
        let mut exits: Vec<(usize, f64)> = Vec::with_capacity(2);
        for k in 0..self.n_sides() {
            let (a, _) = self.side(k);
            let n = self.side_normal(k);
            let num = n.dot(&p.sub(a));
            let den = n.dot(&u);
            if den.abs() <= 1e-12 {
                if num > tol {
                    return RayClip::empty();
                }
                if num.abs() <= tol {
                    clip.along_side = Some(k);
                }
                continue;
            }
            let s = -num / den;
            if den < 0f64 {
                clip.s_in = clip.s_in.max(s);
            } else {
                clip.s_out = clip.s_out.min(s);
                exits.push((k, s));
            }
        }
        clip.exit_sides = exits
            .into_iter()
            .filter(|(_, s)| (s - clip.s_out).abs() <= tol)
            .map(|(k, _)| k)
            .collect();
        clip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn triangle() -> ElementGeometry {
        ElementGeometry::new(0, vec![[1., 1.], [3., 1.], [1., 2.]]).unwrap()
    }
    fn quad() -> ElementGeometry {
        ElementGeometry::new(1, vec![[0., 0.], [2., 0.], [2.5, 1.5], [0., 1.]]).unwrap()
    }

    #[test]
    fn partition_of_unity() {
        for kind in [ElementKind::Tri3, ElementKind::Quad4] {
            let s: f64 = kind.shape_values([0.2, 0.3]).iter().sum();
            assert_abs_diff_eq!(s, 1., epsilon = 1e-14);
            let g = kind
                .shape_reference_gradients([0.2, 0.3])
                .iter()
                .fold([0f64; 2], |a, g| a.add(*g));
            assert_abs_diff_eq!(g[0], 0., epsilon = 1e-14);
            assert_abs_diff_eq!(g[1], 0., epsilon = 1e-14);
        }
    }

    #[test]
    fn inverse_map_round_trip() {
        for el in [triangle(), quad()] {
            let xi = match el.kind {
                ElementKind::Tri3 => [0.25, 0.4],
                ElementKind::Quad4 => [0.3, -0.6],
            };
            let p = el.map(xi);
            let xi_back = el.inverse_map(p).unwrap();
            assert_abs_diff_eq!(xi_back[0], xi[0], epsilon = 1e-10);
            assert_abs_diff_eq!(xi_back[1], xi[1], epsilon = 1e-10);
        }
    }

    #[test]
    fn inverse_map_outside() {
        let err = triangle().inverse_map([0., 0.]).unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn degenerate_element() {
        let el = ElementGeometry::new(4, vec![[0., 0.], [1., 1.], [2., 2.]]).unwrap();
        let err = el.inverse_map([0.5, 0.5]).unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn unsupported_vertex_count() {
        let err = ElementGeometry::new(2, vec![[0., 0.], [1., 0.]]).unwrap_err();
        assert!(err.is_geometry());
        assert!(!err.is_numerical());
    }

    #[test]
    fn physical_gradients() {
        let el = triangle();
        let g = el.shape_gradients([0.2, 0.2]).unwrap();
        // u = x has nodal values [1,3,1]
        let du = g
            .iter()
            .zip([1., 3., 1.].iter())
            .fold([0f64; 2], |a, (g, u)| a.add(g.scale(*u)));
        assert_abs_diff_eq!(du[0], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(du[1], 0., epsilon = 1e-12);
    }

    #[test]
    fn clip_square() {
        let el = ElementGeometry::new(0, vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.]]).unwrap();
        let ray = Ray::new([-1., 0.5], [3., 0.5]).unwrap();
        let clip = el.clip(&ray, 1e-10);
        assert_abs_diff_eq!(clip.s_in, 1., epsilon = 1e-12);
        assert_abs_diff_eq!(clip.s_out, 2., epsilon = 1e-12);
        assert_eq!(clip.exit_sides, vec![1]);
        assert!(clip.along_side.is_none());

        let diagonal = Ray::new([0., 0.], [2., 2.]).unwrap();
        let clip = el.clip(&diagonal, 1e-10);
        assert_eq!(clip.exit_sides, vec![1, 2]);

        let edge = Ray::new([-1., 0.], [2., 0.]).unwrap();
        assert_eq!(el.clip(&edge, 1e-10).along_side, Some(0));

        let miss = Ray::new([-1., 2.], [2., 2.]).unwrap();
        assert!(el.clip(&miss, 1e-10).is_empty());
    }
}
