//! Geometric primitives shared by every stage of the bake.
//!
//! Provides the triangle, bounding box, plane and line segment types along
//! with the plane/ray math used by frame construction, legality classification
//! and the BVH.

use nalgebra::Vector3;

use crate::config::{CAMERA_UP_PARALLEL, DEGENERATE_EPSILON, RAYCAST_MINIMUM_DISTANCE, VERTEX_EPSILON};
use crate::error::{BakeError, Result};

pub type Vector3f = Vector3<f32>;

#[cfg(test)]
mod tests {

    use super::*;

    fn unit_triangle() -> Triangle {
        Triangle::new(
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap()
    }

    #[test]
    fn normal_is_cached_and_unit() {
        let tri = unit_triangle();
        assert!(tri.normal.approx_eq(&Vector3f::z()));
        assert!((tri.normal.norm() - 1.0).abs() < 1e-6);
        assert!(tri.bounds.min.approx_eq(&Vector3f::zeros()));
        assert!(tri.bounds.max.approx_eq(&Vector3f::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn degenerate_triangle_is_rejected() {
        let result = Triangle::new(
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(1.0, 1.0, 1.0),
            Vector3f::new(2.0, 2.0, 2.0),
        );
        assert!(matches!(result, Err(BakeError::DegenerateGeometry(_))));
    }

    #[test]
    fn equality_ignores_winding() {
        let a = unit_triangle();
        let b = Triangle::new(a.vertices[2], a.vertices[1], a.vertices[0]).unwrap();
        assert_eq!(a, b);
        let c = Triangle::new(
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 2.0, 0.0),
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn shared_vertices_and_coplanarity() {
        let a = unit_triangle();
        let b = Triangle::new(
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(1.0, 1.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert_eq!(a.shared_vertices(&b), 2);
        assert!(a.is_coplanar(&b, 0.999, 1e-3));

        let lifted = Triangle::new(
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(1.0, 1.0, 0.5),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert!(!a.is_coplanar(&lifted, 0.999, 1e-3));
    }

    #[test]
    fn bounding_box_overlap_with_tolerance() {
        let a = BoundingBox::new(Vector3f::zeros(), Vector3f::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Vector3f::new(1.5, 0.0, 0.0), Vector3f::new(2.0, 1.0, 1.0));
        assert!(!a.intersects(&b, 0.0));
        assert!(a.intersects(&b, 0.5));
    }

    #[test]
    fn slab_ray_test() {
        let bbox = BoundingBox::new(Vector3f::new(-1.0, -1.0, -1.0), Vector3f::new(1.0, 1.0, 1.0));
        let origin = Vector3f::new(0.0, 0.0, -5.0);
        assert!(bbox.ray_intersects(&origin, &Vector3f::z()).is_some());
        assert!(bbox.ray_intersects(&origin, &-Vector3f::z()).is_none());
        assert!(bbox.ray_intersects(&origin, &Vector3f::x()).is_none());
    }

    #[test]
    fn ray_hits_triangle_interior() {
        let tri = unit_triangle();
        let origin = Vector3f::new(0.25, 0.25, 1.0);
        let (t, bary) = tri.intersect_ray(&origin, &-Vector3f::z()).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!((bary.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(tri.intersect_ray(&Vector3f::new(2.0, 2.0, 1.0), &-Vector3f::z()).is_none());
    }

    #[test]
    fn plane_cuts_triangle_into_segment() {
        let wall = Triangle::new(
            Vector3f::new(0.0, 0.0, -1.0),
            Vector3f::new(2.0, 0.0, -1.0),
            Vector3f::new(1.0, 0.0, 1.0),
        )
        .unwrap();
        let floor = Plane::from_point_normal(&Vector3f::zeros(), &Vector3f::z());
        let segment = wall.intersect_plane(&floor).unwrap();
        assert!(segment.start.z.abs() < 1e-6 && segment.end.z.abs() < 1e-6);
        assert!((segment.length() - 1.0).abs() < 1e-5);

        let far = Plane::from_point_normal(&Vector3f::new(0.0, 0.0, 5.0), &Vector3f::z());
        assert!(wall.intersect_plane(&far).is_none());
    }

    #[test]
    fn segment_distance() {
        let segment = LineSegment::new(Vector3f::zeros(), Vector3f::new(2.0, 0.0, 0.0));
        assert!((segment.distance_to(&Vector3f::new(1.0, 1.0, 0.0)) - 1.0).abs() < 1e-6);
        assert!((segment.distance_to(&Vector3f::new(3.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn camera_up_is_orthogonal() {
        for direction in [Vector3f::x(), Vector3f::y(), -Vector3f::y(), Vector3f::new(1.0, 1.0, 0.3).normalize()] {
            let up = camera_up(&direction);
            assert!(up.dot(&direction).abs() < 1e-5, "direction {:?}", direction);
            assert!((up.norm() - 1.0).abs() < 1e-5);
        }
    }
}

/// Approximate equality for values derived from floating-point transforms.
pub trait ApproxEq {
    fn approx_eq(&self, other: &Self) -> bool;
}

impl ApproxEq for Vector3f {
    fn approx_eq(&self, other: &Self) -> bool {
        (self - other).iter().all(|d| d.abs() <= VERTEX_EPSILON)
    }
}

/// Represents a plane, defined by a normal and an offset value.
/// Each component of the normal corresponds to a, b, c, respectively.
/// The offset value corresponds to d.
/// The plane is then defined by `ax + by + cz + d = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub normal: Vector3f,
    pub offset: f32,
}

impl Plane {
    pub fn from_point_normal(point: &Vector3f, normal: &Vector3f) -> Self {
        Self {
            normal: *normal,
            offset: -normal.dot(point),
        }
    }

    /// Signed distance of a point from the plane, positive on the normal side.
    pub fn signed_distance(&self, point: &Vector3f) -> f32 {
        self.normal.dot(point) + self.offset
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3f,
    pub max: Vector3f,
}

impl BoundingBox {
    pub fn new(min: Vector3f, max: Vector3f) -> Self {
        Self { min, max }
    }

    /// An inverted box that any point or box will grow.
    pub fn empty() -> Self {
        Self {
            min: Vector3f::repeat(f32::INFINITY),
            max: Vector3f::repeat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vector3f>) -> Self {
        points.into_iter().fold(Self::empty(), |acc, p| acc.grow(p))
    }

    pub fn from_triangles<'a>(triangles: impl IntoIterator<Item = &'a Triangle>) -> Self {
        triangles
            .into_iter()
            .fold(Self::empty(), |acc, t| acc.union(&t.bounds))
    }

    pub fn grow(&self, point: &Vector3f) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn centroid(&self) -> Vector3f {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vector3f {
        self.max - self.min
    }

    /// Returns true if the boxes overlap once each is grown by `tolerance`.
    pub fn intersects(&self, other: &BoundingBox, tolerance: f32) -> bool {
        (0..3).all(|i| {
            self.min[i] - tolerance <= other.max[i] && self.max[i] + tolerance >= other.min[i]
        })
    }

    /// Slab test. Returns the parametric entry and exit distances along the ray
    /// if it hits the box in front of the origin.
    pub fn ray_intersects(&self, origin: &Vector3f, direction: &Vector3f) -> Option<(f32, f32)> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for i in 0..3 {
            if direction[i].abs() < f32::EPSILON {
                // parallel to the slab, must already be inside it
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction[i];
            let mut t0 = (self.min[i] - origin[i]) * inv;
            let mut t1 = (self.max[i] - origin[i]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }

        if t_max < 0.0 {
            None
        } else {
            Some((t_min.max(0.0), t_max))
        }
    }
}

/// A line segment, usually the trace of one triangle on another's plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Vector3f,
    pub end: Vector3f,
}

impl LineSegment {
    pub fn new(start: Vector3f, end: Vector3f) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f32 {
        (self.end - self.start).norm()
    }

    pub fn closest_point(&self, point: &Vector3f) -> Vector3f {
        let dir = self.end - self.start;
        let len_sq = dir.norm_squared();
        if len_sq <= f32::EPSILON {
            return self.start;
        }
        let t = ((point - self.start).dot(&dir) / len_sq).clamp(0.0, 1.0);
        self.start + dir * t
    }

    pub fn distance_to(&self, point: &Vector3f) -> f32 {
        (point - self.closest_point(point)).norm()
    }
}

/// A triangle with its cached normal and bounding box.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub vertices: [Vector3f; 3],
    pub normal: Vector3f,
    pub bounds: BoundingBox,
}

impl PartialEq for Triangle {
    /// Vertex-set equality, independent of winding.
    fn eq(&self, other: &Self) -> bool {
        let contains = |tri: &Triangle, v: &Vector3f| tri.vertices.iter().any(|w| w.approx_eq(v));
        self.vertices.iter().all(|v| contains(other, v))
            && other.vertices.iter().all(|v| contains(self, v))
    }
}

impl Triangle {
    pub fn new(v0: Vector3f, v1: Vector3f, v2: Vector3f) -> Result<Self> {
        let cross = (v1 - v0).cross(&(v2 - v0));
        let magnitude = cross.norm();
        if !magnitude.is_finite() || magnitude <= DEGENERATE_EPSILON {
            return Err(BakeError::DegenerateGeometry(format!(
                "triangle [{:?}, {:?}, {:?}] has zero area",
                v0.as_slice(),
                v1.as_slice(),
                v2.as_slice()
            )));
        }
        let vertices = [v0, v1, v2];
        Ok(Self {
            vertices,
            normal: cross / magnitude,
            bounds: BoundingBox::from_points(&vertices),
        })
    }

    pub fn from_array(vertices: [[f32; 3]; 3]) -> Result<Self> {
        let [a, b, c] = vertices.map(Vector3f::from);
        Self::new(a, b, c)
    }

    pub fn plane(&self) -> Plane {
        Plane::from_point_normal(&self.vertices[0], &self.normal)
    }

    pub fn centroid(&self) -> Vector3f {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]) / 3.0
    }

    pub fn area(&self) -> f32 {
        0.5 * (self.vertices[1] - self.vertices[0])
            .cross(&(self.vertices[2] - self.vertices[0]))
            .norm()
    }

    /// Number of vertices shared with another triangle.
    pub fn shared_vertices(&self, other: &Triangle) -> usize {
        self.vertices
            .iter()
            .filter(|v| other.vertices.iter().any(|w| w.approx_eq(v)))
            .count()
    }

    /// Returns true if both triangles face the same way (`min_dot`) and every vertex
    /// of `other` lies within `max_distance` of this triangle's plane.
    pub fn is_coplanar(&self, other: &Triangle, min_dot: f32, max_distance: f32) -> bool {
        if self.normal.dot(&other.normal) < min_dot {
            return false;
        }
        let plane = self.plane();
        other
            .vertices
            .iter()
            .all(|v| plane.signed_distance(v).abs() <= max_distance)
    }

    /// Barycentric weights of a point after projecting it onto the triangle's plane.
    pub fn barycentric(&self, point: &Vector3f) -> [f32; 3] {
        let [a, b, c] = &self.vertices;
        let v0 = b - a;
        let v1 = c - a;
        let v2 = point - a;
        let d00 = v0.dot(&v0);
        let d01 = v0.dot(&v1);
        let d11 = v1.dot(&v1);
        let d20 = v2.dot(&v0);
        let d21 = v2.dot(&v1);
        let denom = d00 * d11 - d01 * d01;
        let v = (d11 * d20 - d01 * d21) / denom;
        let w = (d00 * d21 - d01 * d20) / denom;
        [1.0 - v - w, v, w]
    }

    /// Returns true if the projection of `point` lies strictly inside the triangle.
    pub fn contains_projected(&self, point: &Vector3f) -> bool {
        self.barycentric(point).iter().all(|&w| w > 0.0)
    }

    /// Möller–Trumbore ray intersection. Returns the ray parameter and the
    /// barycentric weights of the hit. Both faces are hit.
    pub fn intersect_ray(&self, origin: &Vector3f, direction: &Vector3f) -> Option<(f32, [f32; 3])> {
        let edge1 = self.vertices[1] - self.vertices[0];
        let edge2 = self.vertices[2] - self.vertices[0];
        let p = direction.cross(&edge2);
        let det = edge1.dot(&p);
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = origin - self.vertices[0];
        let u = s.dot(&p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&edge1);
        let v = direction.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(&q) * inv_det;
        if t <= RAYCAST_MINIMUM_DISTANCE {
            return None;
        }
        Some((t, [1.0 - u - v, u, v]))
    }

    /// Computes the segment along which this triangle crosses a plane.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<LineSegment> {
        let distances = self.vertices.map(|v| plane.signed_distance(&v));
        let mut points: Vec<Vector3f> = Vec::with_capacity(3);

        for i in 0..3 {
            let j = (i + 1) % 3;
            let (a, b) = (self.vertices[i], self.vertices[j]);
            let (da, db) = (distances[i], distances[j]);

            if da.abs() <= VERTEX_EPSILON {
                points.push(a);
            }
            if (da > VERTEX_EPSILON && db < -VERTEX_EPSILON)
                || (da < -VERTEX_EPSILON && db > VERTEX_EPSILON)
            {
                let t = da / (da - db);
                points.push(a + (b - a) * t);
            }
        }

        points.dedup_by(|a, b| a.approx_eq(b));
        let start = *points.first()?;
        let end = *points.iter().find(|p| !p.approx_eq(&start))?;
        Some(LineSegment::new(start, end))
    }
}

/// Camera up vector for a view direction. Uses the global Y axis unless the
/// direction is (nearly) parallel to it, in which case X is used.
pub fn camera_up(direction: &Vector3f) -> Vector3f {
    let global_up = Vector3f::y();
    if direction.dot(&global_up).abs() > CAMERA_UP_PARALLEL {
        Vector3f::x()
    } else {
        direction.cross(&global_up.cross(direction)).normalize()
    }
}
