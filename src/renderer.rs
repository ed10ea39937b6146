use ndarray::Array3;

use crate::error::Result;
use crate::geom::Vector3f;
use crate::lightmap::LightMap;

/// A rendered view: `[rows, cols, 3]` linear RGB, row 0 at the top.
pub type Image = Array3<f32>;

/// One camera placement to render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRequest {
    pub position: Vector3f,
    pub direction: Vector3f,
    pub up: Vector3f,
}

/// Anything that can render square 90° views of the scene lit by the current lightmap.
///
/// All calls come from the bake thread, one after another.
pub trait Renderer {
    /// Side length of every rendered image in pixels.
    fn viewport_size(&self) -> usize;

    fn render_view(&mut self, position: &Vector3f, direction: &Vector3f, up: &Vector3f) -> Result<Image>;

    /// Render several views. The default renders them one by one.
    fn render_batch(&mut self, requests: &[ViewRequest]) -> Result<Vec<Image>> {
        requests
            .iter()
            .map(|r| self.render_view(&r.position, &r.direction, &r.up))
            .collect()
    }

    /// Replace the lightmap used to shade surfaces in later renders.
    fn update_light_map(&mut self, light_map: &LightMap) -> Result<()>;
}
