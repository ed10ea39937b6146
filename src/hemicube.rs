//! # Hemicube gathering
//!
//! **Context**: The irradiance arriving at a patch is estimated by rendering
//! the scene from the patch across the five faces of a hemicube (front, up,
//! down, left, right) and weighting every rendered pixel by how much it
//! contributes to the patch.
//!
//! **How it Works**: Each face is rendered as a full square 90° view and then
//! cropped to the half lying in front of the surface (its frustum). The crops
//! are merged into a plus-shaped `2N × 2N` canvas with the front face in the
//! centre. A correction map built the same way from the Lambert cosine and the
//! solid-angle distortion of every pixel, normalized to sum to one, turns the
//! canvas into a weighted average.
//!
//! Image convention: row 0 is the top of the view (NDC `y = +1`), column 0 is
//! the left edge (NDC `x = -1`), and the view's right vector is
//! `direction × up`.

use ndarray::{s, Array2, Array3};

use crate::error::{BakeError, Result};
use crate::geom::{camera_up, Vector3f};


/// The five faces of a hemicube, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Front,
    Up,
    Down,
    Left,
    Right,
}

pub const FACES: [Face; 5] = [Face::Front, Face::Up, Face::Down, Face::Left, Face::Right];

impl Face {
    /// Visible region of the face in NDC, `[x_min, x_max, y_min, y_max]`.
    pub fn frustum(&self) -> [f32; 4] {
        match self {
            Face::Front => [-1.0, 1.0, -1.0, 1.0],
            Face::Up => [-1.0, 1.0, -1.0, 0.0],
            Face::Down => [-1.0, 1.0, 0.0, 1.0],
            Face::Left => [0.0, 1.0, -1.0, 1.0],
            Face::Right => [-1.0, 0.0, -1.0, 1.0],
        }
    }

    /// Row and column ranges of a `size × size` render covered by the frustum.
    pub fn crop(&self, size: usize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let [x_min, x_max, y_min, y_max] = self.frustum();
        let n = size as f32;
        let to_px = |t: f32| (t * n).round() as usize;
        (
            to_px((1.0 - y_max) / 2.0)..to_px((1.0 - y_min) / 2.0),
            to_px((x_min + 1.0) / 2.0)..to_px((x_max + 1.0) / 2.0),
        )
    }

    /// Top-left corner of the cropped face in the merged `2N × 2N` canvas.
    pub fn canvas_origin(&self, size: usize) -> (usize, usize) {
        let half = size / 2;
        match self {
            Face::Front => (half, half),
            Face::Up => (0, half),
            Face::Down => (size + half, half),
            Face::Left => (half, 0),
            Face::Right => (half, size + half),
        }
    }
}

/// Camera orientation for one hemicube face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemicubeView {
    pub face: Face,
    pub direction: Vector3f,
    pub up: Vector3f,
}

impl HemicubeView {
    pub fn right(&self) -> Vector3f {
        self.direction.cross(&self.up)
    }

    /// Unnormalized direction through the centre of a pixel. The image plane
    /// sits at distance one, so the length is the distance to the plane.
    pub fn ray_direction(&self, row: usize, col: usize, size: usize) -> Vector3f {
        let (x, y) = pixel_ndc(row, col, size);
        self.direction + self.right() * x + self.up * y
    }
}

/// NDC coordinates of a pixel centre.
pub fn pixel_ndc(row: usize, col: usize, size: usize) -> (f32, f32) {
    let n = size as f32;
    (
        (col as f32 + 0.5) / n * 2.0 - 1.0,
        1.0 - (row as f32 + 0.5) / n * 2.0,
    )
}

/// The five views of a patch with the given normal.
pub fn views(normal: &Vector3f) -> [HemicubeView; 5] {
    views_with_up(normal, &camera_up(normal))
}

/// Each side face is the front view rotated by 90° about the front's right or up axis.
fn views_with_up(direction: &Vector3f, up: &Vector3f) -> [HemicubeView; 5] {
    let d = *direction;
    let u = *up;
    let r = d.cross(&u);
    FACES.map(|face| {
        let (direction, up) = match face {
            Face::Front => (d, u),
            Face::Up => (u, -d),
            Face::Down => (-u, d),
            Face::Left => (-r, u),
            Face::Right => (r, u),
        };
        HemicubeView {
            face,
            direction,
            up,
        }
    })
}

/// Hemicube of a fixed viewport size with its precomputed correction map.
#[derive(Debug, Clone, PartialEq)]
pub struct Hemicube {
    size: usize,
    correction: Array2<f32>,
}

impl Hemicube {
    pub fn new(size: usize) -> Self {
        let normal = Vector3f::z();
        let mut correction = Array2::<f32>::zeros((2 * size, 2 * size));

        for view in views_with_up(&normal, &Vector3f::y()) {
            let face = Array2::from_shape_fn((size, size), |(row, col)| {
                let dir = view.ray_direction(row, col, size);
                let distance = dir.norm();
                let lambert = (dir.dot(&normal) / distance).max(0.0);
                let distortion = 1.0 / distance.powi(3);
                lambert * distortion
            });
            let (rows, cols) = view.face.crop(size);
            let (r0, c0) = view.face.canvas_origin(size);
            let (h, w) = (rows.len(), cols.len());
            correction
                .slice_mut(s![r0..r0 + h, c0..c0 + w])
                .assign(&face.slice(s![rows, cols]));
        }

        let total = correction.sum();
        if total > 0.0 {
            correction /= total;
        }

        Self { size, correction }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn correction(&self) -> &Array2<f32> {
        &self.correction
    }

    /// Crop the five renders and merge them into the plus-shaped canvas.
    pub fn merge(&self, renders: &[Array3<f32>]) -> Result<Array3<f32>> {
        if renders.len() != FACES.len() {
            return Err(BakeError::Render(format!(
                "expected {} hemicube renders, got {}",
                FACES.len(),
                renders.len()
            )));
        }

        let size = self.size;
        let mut canvas = Array3::<f32>::zeros((2 * size, 2 * size, 3));
        for (face, image) in FACES.iter().zip(renders) {
            if image.dim() != (size, size, 3) {
                return Err(BakeError::Render(format!(
                    "expected a {}x{} RGB render, got {:?}",
                    size,
                    size,
                    image.dim()
                )));
            }
            let (rows, cols) = face.crop(size);
            let (r0, c0) = face.canvas_origin(size);
            let (h, w) = (rows.len(), cols.len());
            canvas
                .slice_mut(s![r0..r0 + h, c0..c0 + w, ..])
                .assign(&image.slice(s![rows, cols, ..]));
        }
        Ok(canvas)
    }

    /// Weighted sum of the merged renders, per channel.
    pub fn integrate(&self, renders: &[Array3<f32>]) -> Result<[f32; 3]> {
        let canvas = self.merge(renders)?;
        let mut gathered = [0.0f32; 3];
        for (channel, value) in gathered.iter_mut().enumerate() {
            *value = (&canvas.slice(s![.., .., channel]) * &self.correction).sum();
        }
        Ok(gathered)
    }
}
