//! # Patch legality
//!
//! **Context**: Not every texel of a frame's rectangle is a good place to
//! gather light from. Texels outside the frame's triangles, texels hidden
//! under another coplanar surface, and texels right next to geometry piercing
//! the frame would all leak light into the lightmap.
//!
//! **How it Works**: For each frame the nearby triangles are fetched once from
//! the BVH. Nearby triangles whose vertices lie on both sides of the frame
//! plane (beyond a noise band) contribute a crossing segment. Each texel centre
//! is then tested against the frame's projected triangles, the coplanar
//! neighbours and the crossing segments. Frames are classified in parallel.

use geo::Contains;
use geo_types::Coord;
use log::info;
use nalgebra::Vector2;
use rayon::prelude::*;

use crate::atlas::{Atlas, PlacedFrame};
use crate::bvh::Bvh;
use crate::config::DEGENERATE_DISTANCE;
use crate::geom::{LineSegment, Triangle, Vector3f};
use crate::progress::progress_bar;
use crate::settings::Tolerances;


/// The trace of a nearby triangle that cuts through a frame's plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub segment: LineSegment,
    /// Normal of the crossing triangle.
    pub normal: Vector3f,
}

/// A placed frame with every texel marked legal or illegal.
///
/// Pixel coordinates are `[x, y]` relative to the frame's placement.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFrame {
    placed: PlacedFrame,
    nearby: Vec<usize>,
    crossings: Vec<Crossing>,
    legal_pixels: Vec<[usize; 2]>,
    illegal_pixels: Vec<[usize; 2]>,
    legal_positions: Vec<Vector3f>,
    legal_normals: Vec<Vector3f>,
}

impl ClassifiedFrame {
    pub fn placed(&self) -> &PlacedFrame {
        &self.placed
    }

    /// Scene indices of the triangles near this frame, excluding its own.
    pub fn nearby(&self) -> &[usize] {
        &self.nearby
    }

    pub fn crossings(&self) -> &[Crossing] {
        &self.crossings
    }

    pub fn legal_pixels(&self) -> &[[usize; 2]] {
        &self.legal_pixels
    }

    pub fn illegal_pixels(&self) -> &[[usize; 2]] {
        &self.illegal_pixels
    }

    pub fn legal_positions(&self) -> &[Vector3f] {
        &self.legal_positions
    }

    pub fn legal_normals(&self) -> &[Vector3f] {
        &self.legal_normals
    }
}

/// Classify the texels of every frame in the atlas.
pub fn classify_frames(atlas: &Atlas, bvh: &Bvh, tolerances: &Tolerances) -> Vec<ClassifiedFrame> {
    let patch_size = 1.0 / atlas.resolution();
    let pb = progress_bar(atlas.frames().len(), "frame");

    let classified: Vec<ClassifiedFrame> = atlas
        .frames()
        .par_iter()
        .map(|placed| {
            let frame = classify(placed.clone(), bvh, tolerances, patch_size);
            pb.inc(1);
            frame
        })
        .collect();
    pb.finish_and_clear();

    let legal: usize = classified.iter().map(|f| f.legal_pixels.len()).sum();
    let illegal: usize = classified.iter().map(|f| f.illegal_pixels.len()).sum();
    info!(
        "classified {} frames: {} legal and {} illegal texels",
        classified.len(),
        legal,
        illegal
    );

    classified
}

/// Classify the texels of a single frame.
pub fn classify(placed: PlacedFrame, bvh: &Bvh, tolerances: &Tolerances, patch_size: f32) -> ClassifiedFrame {
    let frame = placed.frame();
    let own = frame.indices();
    let scene = bvh.triangles();

    let nearby: Vec<usize> = bvh
        .query(frame.bounds_3d(), patch_size)
        .into_iter()
        .filter(|i| !own.contains(i))
        .collect();

    let crossings = match frame.triangles().first() {
        Some(first) => crossings(first, &nearby, scene, tolerances.crossing_noise),
        None => Vec::new(),
    };

    let (width, height) = (placed.width_px(), placed.height_px());
    let reject_distance = tolerances.crossing_distance_factor * patch_size;

    let mut legal_pixels = Vec::new();
    let mut illegal_pixels = Vec::new();
    let mut legal_positions = Vec::new();
    let mut legal_normals = Vec::new();

    for y in 0..height {
        for x in 0..width {
            // texel centre in bbox space, scaled to padded local coordinates
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            let centre = Coord {
                x: u * width as f32 * patch_size,
                y: v * height as f32 * patch_size,
            };

            let surface = frame
                .projected()
                .iter()
                .zip(frame.triangles())
                .find(|(projected, _)| projected.contains(&centre))
                .map(|(projected, triangle)| {
                    let weights = barycentric_2d(projected, centre);
                    let position = triangle
                        .vertices
                        .iter()
                        .zip(weights)
                        .fold(Vector3f::zeros(), |acc, (v, w)| acc + v * w);
                    (position, triangle.normal)
                });

            let legal = surface.filter(|(position, normal)| {
                !covered_by_coplanar(position, normal, &nearby, scene, tolerances)
                    && !near_crossing(position, &crossings, reject_distance, tolerances)
            });

            match legal {
                Some((position, normal)) => {
                    legal_pixels.push([x, y]);
                    legal_positions.push(position);
                    legal_normals.push(normal);
                }
                None => illegal_pixels.push([x, y]),
            }
        }
    }

    ClassifiedFrame {
        placed,
        nearby,
        crossings,
        legal_pixels,
        illegal_pixels,
        legal_positions,
        legal_normals,
    }
}

/// Barycentric weights of a point in a 2D triangle.
fn barycentric_2d(triangle: &geo::Triangle<f32>, point: Coord<f32>) -> [f32; 3] {
    let a = Vector2::new(triangle.v1().x, triangle.v1().y);
    let v0 = Vector2::new(triangle.v2().x, triangle.v2().y) - a;
    let v1 = Vector2::new(triangle.v3().x, triangle.v3().y) - a;
    let v2 = Vector2::new(point.x, point.y) - a;
    let denom = v0.perp(&v1);
    let v = v2.perp(&v1) / denom;
    let w = v0.perp(&v2) / denom;
    [1.0 - v - w, v, w]
}

/// Segments where nearby triangles pass through the frame plane.
fn crossings(first: &Triangle, nearby: &[usize], scene: &[Triangle], noise: f32) -> Vec<Crossing> {
    let plane = first.plane();
    nearby
        .iter()
        .map(|&i| &scene[i])
        .filter(|t| {
            let distances = t.vertices.map(|v| plane.signed_distance(&v));
            distances.iter().any(|&d| d > noise) && distances.iter().any(|&d| d < -noise)
        })
        .filter_map(|t| {
            t.intersect_plane(&plane).map(|segment| Crossing {
                segment,
                normal: t.normal,
            })
        })
        .collect()
}

fn covered_by_coplanar(
    position: &Vector3f,
    normal: &Vector3f,
    nearby: &[usize],
    scene: &[Triangle],
    tolerances: &Tolerances,
) -> bool {
    nearby.iter().map(|&i| &scene[i]).any(|t| {
        normal.dot(&t.normal) >= tolerances.coverage_dot
            && t.plane().signed_distance(position).abs() < tolerances.coverage_distance
            && t.contains_projected(position)
    })
}

fn near_crossing(
    position: &Vector3f,
    crossings: &[Crossing],
    reject_distance: f32,
    tolerances: &Tolerances,
) -> bool {
    crossings.iter().any(|crossing| {
        let closest = crossing.segment.closest_point(position);
        let offset = position - closest;
        let distance = offset.norm();
        distance < reject_distance
            && (distance < DEGENERATE_DISTANCE
                || crossing.normal.dot(&(offset / distance)) > tolerances.crossing_facing_dot)
    })
}
