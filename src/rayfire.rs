//! # Rayfire
//!
//! The chain of 1D segments obtained by intersecting a straight ray with a
//! 2D mesh. Each segment lies inside exactly one element, and the segments
//! are ordered by arc length along the ray.

use super::{
    Arithmetic, ElementId, Mesh, Point, QoiError, QoiResult, Ray, RayClip, RaySpec, RayTracing,
};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One element of the rayfire chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySegment {
    element: ElementId,
    s_start: f64,
    s_end: f64,
    start: Point,
    end: Point,
}
impl RaySegment {
    /// Enclosing element
    pub fn element(&self) -> ElementId {
        self.element
    }
    /// Arc length at the segment start
    pub fn s_start(&self) -> f64 {
        self.s_start
    }
    /// Arc length at the segment end
    pub fn s_end(&self) -> f64 {
        self.s_end
    }
    pub fn start(&self) -> Point {
        self.start
    }
    pub fn end(&self) -> Point {
        self.end
    }
    pub fn length(&self) -> f64 {
        self.s_end - self.s_start
    }
}
impl fmt::Display for RaySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<6} s: [{:.9},{:.9}] ; [{:+.9},{:+.9}] -> [{:+.9},{:+.9}]",
            self.element,
            self.s_start,
            self.s_end,
            self.start[0],
            self.start[1],
            self.end[0],
            self.end[1]
        )
    }
}

/// Ray/mesh intersection
///
/// Built once per mesh snapshot and read-only afterwards; any change of the
/// mesh requires a full [`rebuild`](RayfireGeometry::rebuild).
#[derive(Debug, Clone, PartialEq)]
pub struct RayfireGeometry {
    spec: RaySpec,
    ray: Ray,
    segments: Vec<RaySegment>,
    lookup: HashMap<ElementId, Vec<usize>>,
    exited_early: bool,
}
impl RayfireGeometry {
    /// Intersects the ray given by `spec` with `mesh`
    ///
    /// Starting from the element containing the ray origin, the ray is clipped
    /// against the current element and continues into the element across the
    /// exit side until it reaches its terminus or leaves the domain.
    /// At a vertex, the next element is the one incident to the vertex that the
    /// ray enters, the element whose centroid lies furthest ahead along the ray
    /// breaking ties.
    ///
    /// A ray with an end point outside the domain or running along a mesh side
    /// is a geometry error.
    pub fn build<M: Mesh + ?Sized>(spec: &RaySpec, mesh: &M) -> QoiResult<Self> {
        spec.validate()?;
        let origin = spec.origin();
        if mesh.locate(origin).is_none() {
            return Err(QoiError::geometry(format!(
                "ray origin [{:.9},{:.9}] is outside the mesh",
                origin[0], origin[1]
            )));
        }
        let (ray, segments, exited_early) = match *spec {
            RaySpec::Segment { origin, terminus } => {
                let ray = Ray::new(origin, terminus)?;
                if mesh.locate(terminus).is_none() {
                    return Err(QoiError::geometry(format!(
                        "ray terminus [{:.9},{:.9}] is outside the mesh",
                        terminus[0], terminus[1]
                    )));
                }
                let (segments, exited_early) = march(&ray, mesh)?;
                if exited_early {
                    log::warn!(
                        "ray {} leaves the domain at s={:.6} before its terminus",
                        ray,
                        segments.last().map(|s| s.s_end).unwrap_or(0f64)
                    );
                }
                (ray, segments, exited_early)
            }
            RaySpec::Angle { origin, theta } => {
                // far enough to be outside the mesh bounding box
                let reach = 2f64 * mesh.length_scale();
                let far = Ray::new(origin, origin.add([theta.cos(), theta.sin()].scale(reach)))?;
                let (segments, _) = march(&far, mesh)?;
                let s_end = segments.last().map(|s| s.s_end).unwrap_or(0f64);
                (far.truncated(s_end)?, segments, false)
            }
        };
        let mut lookup: HashMap<ElementId, Vec<usize>> = HashMap::new();
        segments
            .iter()
            .enumerate()
            .for_each(|(i, s)| lookup.entry(s.element).or_default().push(i));
        log::debug!(
            "rayfire {} : {} segments over {} elements",
            ray,
            segments.len(),
            lookup.len()
        );
        Ok(Self {
            spec: *spec,
            ray,
            segments,
            lookup,
            exited_early,
        })
    }
    /// Rebuilds the rayfire from scratch
    pub fn rebuild<M: Mesh + ?Sized>(&mut self, spec: &RaySpec, mesh: &M) -> QoiResult<()> {
        *self = Self::build(spec, mesh)?;
        Ok(())
    }
    /// Ray specification the rayfire was built from
    pub fn spec(&self) -> &RaySpec {
        &self.spec
    }
    /// Resolved ray
    pub fn ray(&self) -> &Ray {
        &self.ray
    }
    pub fn segments(&self) -> &[RaySegment] {
        &self.segments
    }
    pub fn len(&self) -> usize {
        self.segments.len()
    }
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
    /// Segments enclosed in `element`
    pub fn segments_in(&self, element: ElementId) -> impl Iterator<Item = &RaySegment> + '_ {
        self.lookup
            .get(&element)
            .into_iter()
            .flat_map(move |ids| ids.iter().map(move |&i| &self.segments[i]))
    }
    /// Checks if the ray crosses `element`
    pub fn crosses(&self, element: ElementId) -> bool {
        self.lookup.contains_key(&element)
    }
    /// Elements crossed by the ray, in ray order
    pub fn elements(&self) -> Vec<ElementId> {
        self.segments.iter().map(|s| s.element).collect()
    }
    /// Sum of the segment lengths
    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(|s| s.length()).sum()
    }
    /// True when the ray left the domain before its terminus
    pub fn exited_early(&self) -> bool {
        self.exited_early
    }
}
impl fmt::Display for RayfireGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rayfire {} ({} segments)", self.ray, self.segments.len())?;
        for segment in &self.segments {
            writeln!(f, " {}", segment)?;
        }
        Ok(())
    }
}

/// Walks the ray through the mesh, returns the segments and whether the ray
/// left the domain before its terminus
fn march<M: Mesh + ?Sized>(ray: &Ray, mesh: &M) -> QoiResult<(Vec<RaySegment>, bool)> {
    let tol = mesh.geometric_tolerance();
    let length = ray.length();
    let mut visited: HashSet<ElementId> = HashSet::new();
    let mut segments: Vec<RaySegment> = Vec::new();
    let mut s = 0f64;
    let mut current = select_forward(mesh.elements_at(ray.origin()), ray, s, mesh, &visited, tol)?
        .ok_or_else(|| {
            QoiError::geometry(format!(
                "ray {} leaves the domain at its origin",
                ray
            ))
        })?;
    loop {
        let (element, clip) = current;
        visited.insert(element);
        if let Some(side) = clip.along_side {
            return Err(QoiError::geometry_at(
                element,
                format!(
                    "ray {} runs along side {} over [{:.9},{:.9}]",
                    ray,
                    side,
                    s,
                    clip.s_out.min(length)
                ),
            ));
        }
        let reached = clip.s_out >= length - tol;
        let s_end = if reached { length } else { clip.s_out };
        segments.push(RaySegment {
            element,
            s_start: s,
            s_end,
            start: ray.point_at(s),
            end: ray.point_at(s_end),
        });
        if reached {
            return Ok((segments, false));
        }
        s = s_end;
        let across: Vec<ElementId> = clip
            .exit_sides
            .iter()
            .filter_map(|&side| mesh.neighbor(element, side))
            .collect();
        let next = match select_forward(across, ray, s, mesh, &visited, tol)? {
            Some(next) => Some(next),
            None => select_forward(mesh.elements_at(ray.point_at(s)), ray, s, mesh, &visited, tol)?,
        };
        match next {
            Some(next) => current = next,
            None => {
                let here = mesh.elements_at(ray.point_at(s));
                if let Some((id, _)) = select_forward(here, ray, s, mesh, &HashSet::new(), tol)? {
                    return Err(QoiError::geometry_at(
                        id,
                        format!("ray {} re-enters element {} at s={:.9}", ray, id, s),
                    ));
                }
                return Ok((segments, true));
            }
        }
    }
}

/// Picks, among `candidates`, the element the ray enters at arc length `s`
///
/// A candidate qualifies if the ray enters it at or before `s` and leaves it
/// after `s`. Ties are broken by preferring the element whose centroid is
/// furthest ahead along the ray direction, then the lowest index.
fn select_forward<M: Mesh + ?Sized>(
    mut candidates: Vec<ElementId>,
    ray: &Ray,
    s: f64,
    mesh: &M,
    visited: &HashSet<ElementId>,
    tol: f64,
) -> QoiResult<Option<(ElementId, RayClip)>> {
    candidates.sort_unstable();
    candidates.dedup();
    let p = ray.point_at(s);
    let mut best: Option<(ElementId, RayClip, f64)> = None;
    for id in candidates.into_iter().filter(|id| !visited.contains(id)) {
        let element = mesh.element(id)?;
        let clip = element.clip(ray, tol);
        if clip.is_empty() || clip.s_in > s + tol || clip.s_out <= s + tol {
            continue;
        }
        let ahead = element.centroid().sub(p).dot(&ray.direction());
        let further = best
            .as_ref()
            .map_or(true, |(_, _, best_ahead)| ahead > best_ahead + tol);
        if further {
            best = Some((id, clip, ahead));
        }
    }
    Ok(best.map(|(id, clip, _)| (id, clip)))
}
