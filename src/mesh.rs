//! # 2D unstructured meshes
//!
//! The [`Mesh`] trait is what the rayfire and the QoIs need from a mesh:
//! point location, adjacency across sides and element geometry.
//! [`UnstructuredMesh`] implements it for triangles and convex quadrilaterals.

use super::{Arithmetic, BoundaryId, ElementGeometry, ElementId, ElementKind, Point};
use super::{QoiError, QoiResult};
use std::collections::HashMap;
use triangle_rs::Delaunay;

/// Geometric tolerances
///
/// All values are relative to the mesh length scale (bounding box diagonal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateTolerance {
    /// Distance under which a point is on an element boundary
    pub boundary_tol: f64,
    /// Slack on reference coordinates when testing containment
    pub inside_tol: f64,
    /// Length or area under which an entity is degenerate
    pub degenerate_tol: f64,
}
impl Default for LocateTolerance {
    fn default() -> Self {
        Self::STANDARD
    }
}
impl LocateTolerance {
    pub const HIGH_PRECISION: Self = Self {
        boundary_tol: 1e-12,
        inside_tol: 1e-14,
        degenerate_tol: 1e-15,
    };
    pub const STANDARD: Self = Self {
        boundary_tol: 1e-10,
        inside_tol: 1e-10,
        degenerate_tol: 1e-12,
    };
    pub const RELAXED: Self = Self {
        boundary_tol: 1e-6,
        inside_tol: 1e-8,
        degenerate_tol: 1e-10,
    };
}

pub trait Mesh {
    fn n_elements(&self) -> usize;
    fn n_vertices(&self) -> usize;
    /// Global vertex indices of element `id`, counter-clockwise
    fn element_vertices(&self, id: ElementId) -> &[usize];
    fn element(&self, id: ElementId) -> QoiResult<ElementGeometry>;
    /// Element sharing side `side` of element `id`, `None` on the domain boundary
    fn neighbor(&self, id: ElementId, side: usize) -> Option<ElementId>;
    /// Boundary identifier of side `side` of element `id`, `None` for interior sides
    fn boundary_id(&self, id: ElementId, side: usize) -> Option<BoundaryId>;
    /// All the elements containing `p` (more than one when `p` is on a side or a vertex),
    /// sorted by index
    fn elements_at(&self, p: Point) -> Vec<ElementId>;
    /// Elements sharing vertex `v`, sorted by index
    fn elements_at_vertex(&self, v: usize) -> Vec<ElementId> {
        (0..self.n_elements())
            .filter(|&id| self.element_vertices(id).contains(&v))
            .collect()
    }
    /// Point location
    fn locate(&self, p: Point) -> Option<ElementId> {
        self.elements_at(p).into_iter().next()
    }
    /// Absolute distance tolerance
    fn geometric_tolerance(&self) -> f64;
    /// Diagonal of the mesh bounding box
    fn length_scale(&self) -> f64;
}

/// Unstructured mesh of linear triangles and bilinear quadrilaterals
///
/// Mixed meshes are allowed; elements are stored counter-clockwise and the
/// side `k` of an element goes from its vertex `k` to its vertex `k+1`.
#[derive(Debug, Clone)]
pub struct UnstructuredMesh {
    vertices: Vec<Point>,
    elements: Vec<Vec<usize>>,
    neighbors: Vec<Vec<Option<ElementId>>>,
    boundary_ids: HashMap<(ElementId, usize), BoundaryId>,
    bounding_box: [f64; 4],
    tolerance: LocateTolerance,
}
impl UnstructuredMesh {
    /// Creates a new mesh from its vertices and the vertex indices of its elements
    ///
    /// Clockwise elements are re-ordered; every boundary side gets the boundary id 0.
    pub fn new(vertices: Vec<Point>, elements: Vec<Vec<usize>>) -> QoiResult<Self> {
        if elements.is_empty() {
            return Err(QoiError::geometry("mesh without elements"));
        }
        let mut elements = elements;
        for (id, element) in elements.iter_mut().enumerate() {
            if ElementKind::from_n_vertices(element.len()).is_none() {
                return Err(QoiError::geometry_at(
                    id,
                    format!("element with {} vertices", element.len()),
                ));
            }
            if let Some(v) = element.iter().find(|&&v| v >= vertices.len()) {
                return Err(QoiError::geometry_at(
                    id,
                    format!("vertex {} out of range ({} vertices)", v, vertices.len()),
                ));
            }
            let coordinates: Vec<Point> = element.iter().map(|&v| vertices[v]).collect();
            let area = ElementGeometry::new(id, coordinates)?.signed_area();
            if area < 0f64 {
                element.reverse();
            } else if area == 0f64 {
                log::warn!("element {} has a zero area", id);
            }
        }
        let bounding_box = vertices.iter().fold(
            [
                f64::INFINITY,
                f64::NEG_INFINITY,
                f64::INFINITY,
                f64::NEG_INFINITY,
            ],
            |b, v| [b[0].min(v[0]), b[1].max(v[0]), b[2].min(v[1]), b[3].max(v[1])],
        );
        let mut edges: HashMap<(usize, usize), Vec<(ElementId, usize)>> = HashMap::new();
        for (id, element) in elements.iter().enumerate() {
            let n = element.len();
            for k in 0..n {
                let (a, b) = (element[k], element[(k + 1) % n]);
                edges.entry((a.min(b), a.max(b))).or_default().push((id, k));
            }
        }
        let mut neighbors: Vec<Vec<Option<ElementId>>> =
            elements.iter().map(|e| vec![None; e.len()]).collect();
        let mut boundary_ids = HashMap::new();
        for (edge, sides) in edges.iter() {
            match sides.as_slice() {
                [(e, k)] => {
                    boundary_ids.insert((*e, *k), 0);
                }
                [(e1, k1), (e2, k2)] => {
                    neighbors[*e1][*k1] = Some(*e2);
                    neighbors[*e2][*k2] = Some(*e1);
                }
                _ => {
                    return Err(QoiError::geometry(format!(
                        "edge ({},{}) is shared by {} elements",
                        edge.0,
                        edge.1,
                        sides.len()
                    )))
                }
            }
        }
        log::debug!(
            "mesh with {} vertices, {} elements and {} boundary sides",
            vertices.len(),
            elements.len(),
            boundary_ids.len()
        );
        Ok(Self {
            vertices,
            elements,
            neighbors,
            boundary_ids,
            bounding_box,
            tolerance: LocateTolerance::default(),
        })
    }
    pub fn with_tolerance(self, tolerance: LocateTolerance) -> Self {
        Self { tolerance, ..self }
    }
    pub fn tolerance(&self) -> &LocateTolerance {
        &self.tolerance
    }
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }
    pub fn vertex(&self, v: usize) -> Point {
        self.vertices[v]
    }
    /// Bounding box `[x_min, x_max, y_min, y_max]`
    pub fn bounding_box(&self) -> [f64; 4] {
        self.bounding_box
    }
    /// Total mesh area
    pub fn area(&self) -> f64 {
        (0..self.n_elements())
            .filter_map(|id| self.element(id).ok())
            .map(|e| e.area())
            .sum()
    }
    /// Sets the boundary identifier of a boundary side
    pub fn set_boundary_id(&mut self, id: ElementId, side: usize, tag: BoundaryId) -> QoiResult<()> {
        match self.boundary_ids.get_mut(&(id, side)) {
            Some(b) => {
                *b = tag;
                Ok(())
            }
            None => Err(QoiError::geometry_at(
                id,
                format!("side {} is not on the domain boundary", side),
            )),
        }
    }
    /// Iterator over the boundary sides `(element, side, boundary id)`
    pub fn boundary_sides(&self) -> impl Iterator<Item = (ElementId, usize, BoundaryId)> + '_ {
        self.boundary_ids.iter().map(|(&(e, k), &b)| (e, k, b))
    }
    /// Tags the sides of an axis aligned rectangular domain:
    /// 0 bottom, 1 right, 2 top and 3 left
    fn tag_rectangle_sides(&mut self) -> QoiResult<()> {
        let [x0, x1, y0, y1] = self.bounding_box;
        let tol = self.geometric_tolerance();
        let sides: Vec<(ElementId, usize)> = self.boundary_ids.keys().cloned().collect();
        for (e, k) in sides {
            let (a, b) = self.element(e)?.side(k);
            let m = a.add(b).scale(0.5);
            let tag = if (m[1] - y0).abs() <= tol {
                0
            } else if (m[0] - x1).abs() <= tol {
                1
            } else if (m[1] - y1).abs() <= tol {
                2
            } else if (m[0] - x0).abs() <= tol {
                3
            } else {
                continue;
            };
            self.set_boundary_id(e, k, tag)?;
        }
        Ok(())
    }
    fn grid_vertices(nx: usize, ny: usize, bounds: [f64; 4]) -> QoiResult<Vec<Point>> {
        let [x0, x1, y0, y1] = bounds;
        if nx == 0 || ny == 0 || !(x1 > x0) || !(y1 > y0) {
            return Err(QoiError::configuration(format!(
                "invalid rectangle {}x{} over {:?}",
                nx, ny, bounds
            )));
        }
        let dx = (x1 - x0) / nx as f64;
        let dy = (y1 - y0) / ny as f64;
        Ok((0..=ny)
            .flat_map(|j| (0..=nx).map(move |i| [x0 + i as f64 * dx, y0 + j as f64 * dy]))
            .collect())
    }
    /// Structured `nx` by `ny` quadrilateral mesh of the rectangle `[x_min, x_max, y_min, y_max]`
    ///
    /// Boundary ids: 0 bottom, 1 right, 2 top and 3 left.
    pub fn rectangle_quads(nx: usize, ny: usize, bounds: [f64; 4]) -> QoiResult<Self> {
        let vertices = Self::grid_vertices(nx, ny, bounds)?;
        let v = |i: usize, j: usize| j * (nx + 1) + i;
        let elements = (0..ny)
            .flat_map(|j| {
                (0..nx).map(move |i| vec![v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)])
            })
            .collect();
        let mut mesh = Self::new(vertices, elements)?;
        mesh.tag_rectangle_sides()?;
        Ok(mesh)
    }
    /// Structured `nx` by `ny` mesh of the rectangle `[x_min, x_max, y_min, y_max]`,
    /// each cell split in two triangles along its lower-left to upper-right diagonal
    ///
    /// Boundary ids: 0 bottom, 1 right, 2 top and 3 left.
    pub fn rectangle_triangles(nx: usize, ny: usize, bounds: [f64; 4]) -> QoiResult<Self> {
        let vertices = Self::grid_vertices(nx, ny, bounds)?;
        let v = |i: usize, j: usize| j * (nx + 1) + i;
        let elements = (0..ny)
            .flat_map(|j| {
                (0..nx).flat_map(move |i| {
                    vec![
                        vec![v(i, j), v(i + 1, j), v(i + 1, j + 1)],
                        vec![v(i, j), v(i + 1, j + 1), v(i, j + 1)],
                    ]
                })
            })
            .collect();
        let mut mesh = Self::new(vertices, elements)?;
        mesh.tag_rectangle_sides()?;
        Ok(mesh)
    }
    /// Splits every element in 4
    ///
    /// Triangles are split at their side mid-points, quadrilaterals at their
    /// side mid-points and centroid; boundary ids are inherited.
    pub fn uniformly_refined(&self) -> QoiResult<Self> {
        let mut vertices = self.vertices.clone();
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point>| -> usize {
            *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                vertices.push(vertices[a].add(vertices[b]).scale(0.5));
                vertices.len() - 1
            })
        };
        let mut elements = Vec::with_capacity(4 * self.elements.len());
        // (child, child side, parent side, parent)
        let mut inherited: Vec<(ElementId, usize, usize, ElementId)> = Vec::new();
        for (parent, element) in self.elements.iter().enumerate() {
            let first = elements.len();
            match element.as_slice() {
                &[v0, v1, v2] => {
                    let m01 = midpoint(v0, v1, &mut vertices);
                    let m12 = midpoint(v1, v2, &mut vertices);
                    let m20 = midpoint(v2, v0, &mut vertices);
                    elements.push(vec![v0, m01, m20]);
                    elements.push(vec![m01, v1, m12]);
                    elements.push(vec![m20, m12, v2]);
                    elements.push(vec![m01, m12, m20]);
                    for &(child, cs, ps) in &[(0, 0, 0), (0, 2, 2), (1, 0, 0), (1, 1, 1), (2, 1, 1), (2, 2, 2)] {
                        inherited.push((first + child, cs, ps, parent));
                    }
                }
                &[v0, v1, v2, v3] => {
                    let m01 = midpoint(v0, v1, &mut vertices);
                    let m12 = midpoint(v1, v2, &mut vertices);
                    let m23 = midpoint(v2, v3, &mut vertices);
                    let m30 = midpoint(v3, v0, &mut vertices);
                    let c = vertices.len();
                    vertices.push(
                        [v0, v1, v2, v3]
                            .iter()
                            .fold([0f64; 2], |acc, &v| acc.add(self.vertices[v]))
                            .scale(0.25),
                    );
                    elements.push(vec![v0, m01, c, m30]);
                    elements.push(vec![m01, v1, m12, c]);
                    elements.push(vec![c, m12, v2, m23]);
                    elements.push(vec![m30, c, m23, v3]);
                    for &(child, cs, ps) in &[
                        (0, 0, 0),
                        (0, 3, 3),
                        (1, 0, 0),
                        (1, 1, 1),
                        (2, 1, 1),
                        (2, 2, 2),
                        (3, 2, 2),
                        (3, 3, 3),
                    ] {
                        inherited.push((first + child, cs, ps, parent));
                    }
                }
                _ => {
                    return Err(QoiError::geometry_at(
                        parent,
                        format!("element with {} vertices", element.len()),
                    ))
                }
            }
        }
        let mut refined = Self::new(vertices, elements)?.with_tolerance(self.tolerance);
        for (child, child_side, parent_side, parent) in inherited {
            if let Some(tag) = self.boundary_id(parent, parent_side) {
                refined.set_boundary_id(child, child_side, tag)?;
            }
        }
        log::debug!(
            "uniform refinement: {} -> {} elements",
            self.n_elements(),
            refined.n_elements()
        );
        Ok(refined)
    }
}
impl Mesh for UnstructuredMesh {
    fn n_elements(&self) -> usize {
        self.elements.len()
    }
    fn n_vertices(&self) -> usize {
        self.vertices.len()
    }
    fn element_vertices(&self, id: ElementId) -> &[usize] {
        &self.elements[id]
    }
    fn element(&self, id: ElementId) -> QoiResult<ElementGeometry> {
        let element = self.elements.get(id).ok_or_else(|| {
            QoiError::geometry(format!(
                "element {} out of range ({} elements)",
                id,
                self.elements.len()
            ))
        })?;
        ElementGeometry::new(id, element.iter().map(|&v| self.vertices[v]).collect())
    }
    fn neighbor(&self, id: ElementId, side: usize) -> Option<ElementId> {
        self.neighbors
            .get(id)
            .and_then(|n| n.get(side))
            .cloned()
            .flatten()
    }
    fn boundary_id(&self, id: ElementId, side: usize) -> Option<BoundaryId> {
        self.boundary_ids.get(&(id, side)).cloned()
    }
    fn elements_at(&self, p: Point) -> Vec<ElementId> {
        let tol = self.geometric_tolerance();
        (0..self.elements.len())
            .filter_map(|id| self.element(id).ok())
            .filter(|e| {
                let [x0, x1, y0, y1] = e.bounding_box();
                p[0] >= x0 - tol
                    && p[0] <= x1 + tol
                    && p[1] >= y0 - tol
                    && p[1] <= y1 + tol
                    && e.contains(p, tol)
            })
            .map(|e| e.id)
            .collect()
    }
    fn geometric_tolerance(&self) -> f64 {
        self.tolerance.boundary_tol * self.length_scale().max(f64::MIN_POSITIVE)
    }
    fn length_scale(&self) -> f64 {
        let [x0, x1, y0, y1] = self.bounding_box;
        (x1 - x0).hypot(y1 - y0)
    }
}
impl TryFrom<&Delaunay> for UnstructuredMesh {
    type Error = QoiError;
    /// Converts a [`triangle_rs`] Delaunay triangulation; every boundary side gets the id 0
    fn try_from(tri: &Delaunay) -> QoiResult<Self> {
        let vertices: Vec<Point> = tri.vertex_iter().map(|p| [p[0], p[1]]).collect();
        let elements: Vec<Vec<usize>> = tri
            .triangle_iter()
            .map(|t| vec![t[0], t[1], t[2]])
            .collect();
        Self::new(vertices, elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use triangle_rs::Builder;

    #[test]
    fn rectangle_topology() {
        let mesh = UnstructuredMesh::rectangle_quads(4, 2, [0., 2., 0., 1.]).unwrap();
        assert_eq!(mesh.n_elements(), 8);
        assert_eq!(mesh.n_vertices(), 15);
        assert_eq!(mesh.neighbor(0, 1), Some(1));
        assert_eq!(mesh.neighbor(0, 2), Some(4));
        assert_eq!(mesh.neighbor(0, 0), None);
        assert_eq!(mesh.boundary_id(0, 0), Some(0));
        assert_eq!(mesh.boundary_id(0, 3), Some(3));
        assert_eq!(mesh.boundary_id(3, 1), Some(1));
        assert_eq!(mesh.boundary_id(7, 2), Some(2));
        assert_eq!(mesh.boundary_id(0, 1), None);
        assert_eq!(mesh.boundary_sides().count(), 12);
        assert_abs_diff_eq!(mesh.area(), 2., epsilon = 1e-12);
    }

    #[test]
    fn clockwise_elements_are_reordered() {
        let mesh = UnstructuredMesh::new(
            vec![[0., 0.], [1., 0.], [0., 1.]],
            vec![vec![0, 2, 1]],
        )
        .unwrap();
        assert!(mesh.element(0).unwrap().signed_area() > 0.);
    }

    #[test]
    fn point_location() {
        let mesh = UnstructuredMesh::rectangle_triangles(2, 2, [0., 1., 0., 1.]).unwrap();
        let id = mesh.locate([0.4, 0.1]).unwrap();
        assert!(mesh.element(id).unwrap().contains([0.4, 0.1], 0.));
        // shared vertex at the domain center
        assert_eq!(mesh.elements_at([0.5, 0.5]).len(), 6);
        assert_eq!(mesh.elements_at_vertex(4), mesh.elements_at([0.5, 0.5]));
        assert!(mesh.locate([1.5, 0.5]).is_none());
    }

    #[test]
    fn refinement() {
        let mesh = UnstructuredMesh::rectangle_triangles(2, 1, [0., 2., 0., 1.]).unwrap();
        let fine = mesh.uniformly_refined().unwrap();
        assert_eq!(fine.n_elements(), 4 * mesh.n_elements());
        assert_abs_diff_eq!(fine.area(), 2., epsilon = 1e-12);
        assert_eq!(fine.boundary_sides().count(), 2 * mesh.boundary_sides().count());
        let left: usize = fine.boundary_sides().filter(|&(_, _, b)| b == 3).count();
        assert_eq!(left, 2);

        let quads = UnstructuredMesh::rectangle_quads(1, 1, [0., 1., 0., 1.])
            .unwrap()
            .uniformly_refined()
            .unwrap();
        assert_eq!(quads.n_vertices(), 9);
        assert_eq!(quads.boundary_sides().filter(|&(_, _, b)| b == 2).count(), 2);
    }

    #[test]
    fn delaunay() {
        let nodes = vec![0., 0., 1., 0., 1., 1., 0., 1.];
        let mut builder = Builder::new();
        builder.add_polygon(&nodes).set_switches("Qqa0.05");
        let tri = builder.build();
        let mesh = UnstructuredMesh::try_from(&tri).unwrap();
        assert!(mesh.n_elements() > 2);
        assert_abs_diff_eq!(mesh.area(), 1., epsilon = 1e-9);
    }
}
