//! # Frame construction
//!
//! **Context**: A lightmap texel is only meaningful on a flat region of the
//! surface. Scene triangles are therefore grouped into *frames*: one triangle,
//! or two coplanar triangles sharing an edge. Each frame gets its own
//! rectangle of the lightmap atlas.
//!
//! **How it Works**: [`build_frames`] scans the triangle list greedily and pairs
//! each unused triangle with the first *subsequent* unused triangle that shares
//! exactly two vertices and is coplanar within the configured tolerances.
//! [`ProjectedFrame::new`] then projects the frame onto an orthonormal basis of
//! its plane, rotates it so that its longer side is the height, and pads its
//! 2D box by one patch on every side.

use geo::Rect;
use geo_types::Coord;
use nalgebra::{Matrix4, Vector4};

use crate::error::{BakeError, Result};
use crate::geom::{BoundingBox, Triangle, Vector3f};
use crate::settings::Tolerances;

#[cfg(test)]
mod tests {

    use super::*;

    fn quad(size: f32) -> Vec<Triangle> {
        let a = Vector3f::new(0.0, 0.0, 0.0);
        let b = Vector3f::new(size, 0.0, 0.0);
        let c = Vector3f::new(size, 0.0, size);
        let d = Vector3f::new(0.0, 0.0, size);
        vec![Triangle::new(a, d, c).unwrap(), Triangle::new(a, c, b).unwrap()]
    }

    #[test]
    fn quad_forms_single_frame() {
        let triangles = quad(1.0);
        let frames = build_frames(&triangles, &Tolerances::default());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].indices(), &[0, 1]);
    }

    #[test]
    fn unit_square_padding() {
        let res = 4.0;
        let triangles = quad(1.0);
        let frames = build_frames(&triangles, &Tolerances::default());
        let projected = ProjectedFrame::new(frames[0].clone(), 1.0 / res).unwrap();
        let expected = 1.0 + 2.0 / res;
        assert!((projected.padded_width() - expected).abs() < 1e-5);
        assert!((projected.padded_height() - expected).abs() < 1e-5);
        assert!((projected.bounds().width() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn projected_coordinates_are_padded_local() {
        let patch = 0.25;
        let triangles = quad(2.0);
        let frames = build_frames(&triangles, &Tolerances::default());
        let projected = ProjectedFrame::new(frames[0].clone(), patch).unwrap();
        for tri in projected.projected() {
            for c in [tri.v1(), tri.v2(), tri.v3()] {
                assert!(c.x >= patch - 1e-5 && c.x <= projected.padded_width() - patch + 1e-5);
                assert!(c.y >= patch - 1e-5 && c.y <= projected.padded_height() - patch + 1e-5);
            }
        }
        // mapping a vertex through the frame matches its projected coordinate
        let local = projected.to_local(&triangles[0].vertices[1]);
        let first = projected.projected()[0].v2();
        assert!((local.x - first.x).abs() < 1e-5 && (local.y - first.y).abs() < 1e-5);
    }

    #[test]
    fn wide_frame_is_rotated() {
        let tri = Triangle::new(
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(4.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        let projected = ProjectedFrame::new(RawFrame::new(vec![tri], vec![0]), 0.1).unwrap();
        assert!(projected.is_rotated());
        assert!(projected.padded_height() >= projected.padded_width());
        assert!((projected.bounds().height() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn empty_frame_has_identity_projection() {
        let projected = ProjectedFrame::new(RawFrame::new(vec![], vec![]), 0.5).unwrap();
        assert_eq!(projected.projection(), &Matrix4::identity());
        assert!(projected.projected().is_empty());
    }

    #[test]
    fn non_coplanar_neighbours_stay_separate() {
        let a = Triangle::new(
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        let b = Triangle::new(
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 1.0),
            Vector3f::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        let frames = build_frames(&[a, b], &Tolerances::default());
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn first_match_wins() {
        // triangle 0 can pair with both 1 and 2; 1 is taken and 2 is left alone
        let a = Vector3f::new(0.0, 0.0, 0.0);
        let b = Vector3f::new(1.0, 0.0, 0.0);
        let c = Vector3f::new(0.0, 1.0, 0.0);
        let t0 = Triangle::new(a, b, c).unwrap();
        let t1 = Triangle::new(b, Vector3f::new(1.0, 1.0, 0.0), c).unwrap();
        let t2 = Triangle::new(a, c, Vector3f::new(-1.0, 0.5, 0.0)).unwrap();
        let frames = build_frames(&[t0, t1, t2], &Tolerances::default());
        let indices: Vec<Vec<usize>> = frames.iter().map(|f| f.indices().to_vec()).collect();
        assert_eq!(indices, vec![vec![0, 1], vec![2]]);
    }
}

/// One or two coplanar, edge-adjacent triangles with their scene indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    triangles: Vec<Triangle>,
    indices: Vec<usize>,
}

impl RawFrame {
    pub fn new(triangles: Vec<Triangle>, indices: Vec<usize>) -> Self {
        Self { triangles, indices }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// Greedily group triangles into frames.
///
/// Every triangle ends up in exactly one frame, and no frame holds more than
/// two triangles. Pairing is O(n²) in the number of triangles.
pub fn build_frames(triangles: &[Triangle], tolerances: &Tolerances) -> Vec<RawFrame> {
    let min_dot = tolerances.coplanar_min_dot();
    let mut used = vec![false; triangles.len()];
    let mut frames = Vec::new();

    for (i, triangle) in triangles.iter().enumerate() {
        if used[i] {
            continue;
        }
        used[i] = true;

        let partner = (i + 1..triangles.len()).find(|&j| {
            !used[j]
                && triangle.shared_vertices(&triangles[j]) == 2
                && triangle.is_coplanar(&triangles[j], min_dot, tolerances.plane_distance)
        });

        let frame = match partner {
            Some(j) => {
                used[j] = true;
                RawFrame::new(vec![triangle.clone(), triangles[j].clone()], vec![i, j])
            }
            None => RawFrame::new(vec![triangle.clone()], vec![i]),
        };
        frames.push(frame);
    }

    frames
}

/// A frame flattened onto its plane.
///
/// `projected` holds one 2D triangle per frame triangle, in padded local
/// coordinates: `(0, 0)` is the corner of the padded box and the geometry
/// starts one patch in from each edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedFrame {
    raw: RawFrame,
    projection: Matrix4<f32>,
    rotated: bool,
    projected: Vec<geo::Triangle<f32>>,
    bounds: Rect<f32>,
    padding: f32,
    bounds_3d: BoundingBox,
    normal: Vector3f,
}

impl ProjectedFrame {
    pub fn new(raw: RawFrame, patch_size: f32) -> Result<Self> {
        let Some(first) = raw.triangles.first() else {
            return Ok(Self {
                raw,
                projection: Matrix4::identity(),
                rotated: false,
                projected: Vec::new(),
                bounds: Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }),
                padding: patch_size,
                bounds_3d: BoundingBox::new(Vector3f::zeros(), Vector3f::zeros()),
                normal: Vector3f::zeros(),
            });
        };

        let origin = first.vertices[0];
        let normal = first.normal;
        let u = (first.vertices[1] - origin).normalize();
        let v = normal.cross(&u).normalize();

        let basis = Matrix4::from_columns(&[
            u.push(0.0),
            v.push(0.0),
            normal.push(0.0),
            origin.push(1.0),
        ]);
        let mut projection = basis.try_inverse().ok_or_else(|| {
            BakeError::DegenerateGeometry(format!(
                "frame {:?} has a singular projection basis",
                raw.indices
            ))
        })?;

        let flat = |projection: &Matrix4<f32>, p: &Vector3f| {
            let q = projection * Vector4::new(p.x, p.y, p.z, 1.0);
            Coord { x: q.x, y: q.y }
        };

        let unpadded = plane_bounds(&raw.triangles, |p| flat(&projection, p));
        let rotated = unpadded.width() > unpadded.height();
        if rotated {
            projection.swap_rows(0, 1);
        }
        let bounds = plane_bounds(&raw.triangles, |p| flat(&projection, p));

        let offset = Coord {
            x: patch_size - bounds.min().x,
            y: patch_size - bounds.min().y,
        };
        let projected = raw
            .triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.vertices.map(|p| flat(&projection, &p) + offset);
                geo::Triangle::new(a, b, c)
            })
            .collect();

        let bounds_3d = BoundingBox::from_triangles(&raw.triangles);

        Ok(Self {
            raw,
            projection,
            rotated,
            projected,
            bounds,
            padding: patch_size,
            bounds_3d,
            normal,
        })
    }

    pub fn raw(&self) -> &RawFrame {
        &self.raw
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.raw.triangles
    }

    pub fn indices(&self) -> &[usize] {
        &self.raw.indices
    }

    /// World to plane transform, the inverse of the frame's basis matrix.
    pub fn projection(&self) -> &Matrix4<f32> {
        &self.projection
    }

    pub fn is_rotated(&self) -> bool {
        self.rotated
    }

    pub fn projected(&self) -> &[geo::Triangle<f32>] {
        &self.projected
    }

    /// Unpadded 2D box in plane coordinates.
    pub fn bounds(&self) -> &Rect<f32> {
        &self.bounds
    }

    pub fn padding(&self) -> f32 {
        self.padding
    }

    pub fn padded_width(&self) -> f32 {
        self.bounds.width() + 2.0 * self.padding
    }

    pub fn padded_height(&self) -> f32 {
        self.bounds.height() + 2.0 * self.padding
    }

    pub fn bounds_3d(&self) -> &BoundingBox {
        &self.bounds_3d
    }

    pub fn normal(&self) -> &Vector3f {
        &self.normal
    }

    /// Maps a world position into padded local coordinates.
    pub fn to_local(&self, point: &Vector3f) -> Coord<f32> {
        let q = self.projection * Vector4::new(point.x, point.y, point.z, 1.0);
        Coord {
            x: q.x - self.bounds.min().x + self.padding,
            y: q.y - self.bounds.min().y + self.padding,
        }
    }
}

fn plane_bounds(triangles: &[Triangle], flat: impl Fn(&Vector3f) -> Coord<f32>) -> Rect<f32> {
    let mut min = Coord {
        x: f32::INFINITY,
        y: f32::INFINITY,
    };
    let mut max = Coord {
        x: f32::NEG_INFINITY,
        y: f32::NEG_INFINITY,
    };
    for c in triangles.iter().flat_map(|t| t.vertices.iter().map(&flat)) {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    Rect::new(min, max)
}

/// Project every raw frame onto its plane.
pub fn project_frames(frames: Vec<RawFrame>, patch_size: f32) -> Result<Vec<ProjectedFrame>> {
    frames
        .into_iter()
        .map(|raw| ProjectedFrame::new(raw, patch_size))
        .collect()
}
