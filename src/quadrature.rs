//! # Gauss-Legendre quadratures
//!
//! A [`GaussRule`] of order $p$ has $\lceil (p+1)/2 \rceil$ points on $[-1,1]$ and
//! integrates exactly polynomials of degree $p$ or less.
//!
//! [`RayQuadrature`] maps a rule onto each segment of a rayfire and re-maps
//! every quadrature point into the reference frame of its enclosing element.

use super::{
    Arithmetic, ElementGeometry, ElementId, ElementKind, Point, QoiError, QoiResult, RaySegment,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GaussRule {
    order: usize,
    nodes: Vec<f64>,
    weights: Vec<f64>,
}
impl GaussRule {
    /// Creates a Gauss-Legendre rule exact up to polynomial degree `order`
    ///
    /// The nodes are the roots of the Legendre polynomial $P_n$ found by Newton
    /// iterations from Tricomi's initial guesses; the weights are
    /// $w_i = 2/\left((1-x_i^2)P_n^\prime(x_i)^2\right)$.
    pub fn new(order: usize) -> QoiResult<Self> {
        if order == 0 {
            return Err(QoiError::configuration(
                "quadrature order must be at least 1",
            ));
        }
        let n = order / 2 + 1;
        let mut nodes = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for i in 0..n {
            let mut x =
                (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
            for _ in 0..100 {
                let (p, dp) = legendre(n, x);
                let dx = p / dp;
                x -= dx;
                if dx.abs() <= 1e-15 {
                    break;
                }
            }
            let dp = legendre(n, x).1;
            nodes.push(x);
            weights.push(2f64 / ((1f64 - x * x) * dp * dp));
        }
        // ascending abscissae
        nodes.reverse();
        weights.reverse();
        Ok(Self {
            order,
            nodes,
            weights,
        })
    }
    pub fn order(&self) -> usize {
        self.order
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
    /// Iterator over `(abscissa, weight)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.nodes.iter().cloned().zip(self.weights.iter().cloned())
    }
    /// Reference points and weights of a 2D rule exact up to degree `order` on
    /// the reference element of `kind`
    ///
    /// Quadrilaterals use the tensor product rule. Triangles use the collapsed
    /// (Duffy) product $\xi=a$, $\eta=b(1-a)$ with $a,b\in[0,1]$ and the extra
    /// $1-a$ factor in the weights.
    pub fn element_rule(kind: ElementKind, order: usize) -> QoiResult<Vec<(Point, f64)>> {
        let rule = GaussRule::new(order)?;
        Ok(match kind {
            ElementKind::Quad4 => rule
                .iter()
                .flat_map(|(y, wy)| rule.iter().map(move |(x, wx)| ([x, y], wx * wy)))
                .collect(),
            ElementKind::Tri3 => {
                let rule_a = GaussRule::new(order + 1)?;
                rule_a
                    .iter()
                    .flat_map(|(x, wx)| {
                        let a = 0.5 * (1f64 + x);
                        rule.iter().map(move |(y, wy)| {
                            let b = 0.5 * (1f64 + y);
                            ([a, b * (1f64 - a)], 0.25 * wx * wy * (1f64 - a))
                        })
                    })
                    .collect()
            }
        })
    }
}
/// Legendre polynomial $P_n(x)$ and its derivative
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p0 = 1f64;
    let mut p1 = x;
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2f64 * k - 1f64) * x * p1 - (k - 1f64) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    if n == 0 {
        return (1f64, 0f64);
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1f64);
    (p1, dp)
}

/// A quadrature point inside a mesh element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint {
    /// Physical coordinates
    pub xyz: Point,
    /// Integration weight, in the measure of the integration entity
    pub weight: f64,
    /// Coordinates in the element reference frame
    pub local: Point,
    /// Enclosing element
    pub element: ElementId,
}

/// Maps a Gauss rule onto mesh entities
#[derive(Debug, Clone, PartialEq)]
pub struct RayQuadrature {
    rule: GaussRule,
}
impl RayQuadrature {
    pub fn new(p_level: usize) -> QoiResult<Self> {
        Ok(Self {
            rule: GaussRule::new(p_level)?,
        })
    }
    pub fn rule(&self) -> &GaussRule {
        &self.rule
    }
    /// Quadrature points along a straight line from `a` to `b` inside `element`
    ///
    /// The weights are $w_i\,\|b-a\|/2$.
    pub fn line_points(
        &self,
        a: Point,
        b: Point,
        element: &ElementGeometry,
    ) -> QoiResult<Vec<QuadraturePoint>> {
        let half = b.sub(a).scale(0.5);
        let middle = a.add(half);
        let jxw = half.norm();
        self.rule
            .iter()
            .map(|(x, w)| {
                let xyz = middle.add(half.scale(x));
                Ok(QuadraturePoint {
                    xyz,
                    weight: w * jxw,
                    local: element.inverse_map(xyz)?,
                    element: element.id,
                })
            })
            .collect()
    }
    /// Quadrature points of a rayfire segment
    ///
    /// `element` must be the segment enclosing element.
    pub fn points(
        &self,
        segment: &RaySegment,
        element: &ElementGeometry,
    ) -> QoiResult<Vec<QuadraturePoint>> {
        if segment.element() != element.id {
            return Err(QoiError::geometry_at(
                element.id,
                format!(
                    "segment [{:.6},{:.6}] belongs to element {}",
                    segment.s_start(),
                    segment.s_end(),
                    segment.element()
                ),
            ));
        }
        self.line_points(segment.start(), segment.end(), element)
    }
    /// Quadrature points of side `side` of `element`
    pub fn side_points(
        &self,
        element: &ElementGeometry,
        side: usize,
    ) -> QoiResult<Vec<QuadraturePoint>> {
        let (a, b) = element.side(side);
        self.line_points(a, b, element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gauss_points() {
        let rule = GaussRule::new(5).unwrap();
        assert_eq!(rule.len(), 3);
        assert_abs_diff_eq!(rule.nodes()[0], -0.7745966692414834, epsilon = 1e-14);
        assert_abs_diff_eq!(rule.nodes()[1], 0., epsilon = 1e-14);
        assert_abs_diff_eq!(rule.weights()[1], 0.8888888888888888, epsilon = 1e-14);
        assert!(GaussRule::new(0).unwrap_err().is_configuration());
    }

    #[test]
    fn exactness() {
        for order in 1..12 {
            let rule = GaussRule::new(order).unwrap();
            for degree in 0..=order {
                let integral: f64 = rule.iter().map(|(x, w)| w * x.powi(degree as i32)).sum();
                let exact = if degree % 2 == 1 {
                    0.
                } else {
                    2. / (degree as f64 + 1.)
                };
                assert_abs_diff_eq!(integral, exact, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn element_rules() {
        // x^2 y over the reference triangle: 1/60
        let tri = GaussRule::element_rule(ElementKind::Tri3, 3).unwrap();
        let integral: f64 = tri.iter().map(|(p, w)| w * p[0] * p[0] * p[1]).sum();
        assert_abs_diff_eq!(integral, 1. / 60., epsilon = 1e-14);
        let area: f64 = tri.iter().map(|(_, w)| w).sum();
        assert_abs_diff_eq!(area, 0.5, epsilon = 1e-14);
        // x^2 y^2 over [-1,1]^2: 4/9
        let quad = GaussRule::element_rule(ElementKind::Quad4, 2).unwrap();
        let integral: f64 = quad.iter().map(|(p, w)| w * p[0] * p[0] * p[1] * p[1]).sum();
        assert_abs_diff_eq!(integral, 4. / 9., epsilon = 1e-14);
    }

    #[test]
    fn line_points() {
        let el = ElementGeometry::new(0, vec![[0., 0.], [2., 0.], [2., 2.], [0., 2.]]).unwrap();
        let q = RayQuadrature::new(3).unwrap();
        let points = q.line_points([0., 1.], [2., 1.], &el).unwrap();
        assert_eq!(points.len(), 2);
        let length: f64 = points.iter().map(|p| p.weight).sum();
        assert_abs_diff_eq!(length, 2., epsilon = 1e-14);
        points.iter().for_each(|p| {
            assert_abs_diff_eq!(p.local[0], p.xyz[0] - 1., epsilon = 1e-12);
            assert_abs_diff_eq!(p.local[1], 0., epsilon = 1e-12);
        });
    }
}
