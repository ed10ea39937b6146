//! CPU reference renderer.
//!
//! Casts one ray per pixel through the BVH. Front faces are shaded with their
//! emission plus albedo times the current lightmap, back faces are black and
//! misses return the atmosphere colour. Geometry closer than the near plane is
//! clipped, like a GL projection would.

use ndarray::Array3;
use rayon::prelude::*;

use crate::atlas::Atlas;
use crate::bvh::Bvh;
use crate::config::{FAR_PLANE, NEAR_PLANE};
use crate::error::{BakeError, Result};
use crate::geom::Vector3f;
use crate::hemicube::pixel_ndc;
use crate::lightmap::LightMap;
use crate::renderer::{Image, Renderer};
use crate::scene::Scene;


/// Shading inputs of one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub albedo: [f32; 3],
    pub emission: f32,
    pub lightmap_uvs: [[f32; 2]; 3],
}

impl Surface {
    /// Shading inputs for every scene triangle, with lightmap UVs taken from the atlas.
    pub fn from_scene(scene: &Scene, atlas: &Atlas, default_albedo: [f32; 3]) -> Vec<Surface> {
        atlas
            .triangle_uvs(scene.len())
            .into_iter()
            .enumerate()
            .map(|(i, uvs)| Surface {
                albedo: scene.albedo(i, default_albedo),
                emission: scene.emission(i),
                lightmap_uvs: uvs.unwrap_or_else(|| scene.lightmap_uvs(i)),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RaycastRenderer {
    bvh: Bvh,
    surfaces: Vec<Surface>,
    viewport_size: usize,
    atmosphere: [f32; 3],
    light_map: LightMap,
}

impl RaycastRenderer {
    pub fn new(bvh: Bvh, surfaces: Vec<Surface>, viewport_size: usize, atmosphere: [f32; 3]) -> Result<Self> {
        if surfaces.len() != bvh.triangles().len() {
            return Err(BakeError::Render(format!(
                "{} surfaces given for {} triangles",
                surfaces.len(),
                bvh.triangles().len()
            )));
        }
        Ok(Self {
            bvh,
            surfaces,
            viewport_size,
            atmosphere,
            light_map: LightMap::new(1),
        })
    }

    fn shade(&self, origin: &Vector3f, ray: &Vector3f) -> [f32; 3] {
        let Some(hit) = self.bvh.closest_hit(origin, ray, FAR_PLANE - NEAR_PLANE) else {
            return self.atmosphere;
        };
        let triangle = &self.bvh.triangles()[hit.triangle];
        if triangle.normal.dot(ray) >= 0.0 {
            return [0.0; 3];
        }

        let surface = &self.surfaces[hit.triangle];
        let mut uv = [0.0f32; 2];
        for (w, tri_uv) in hit.barycentric.iter().zip(&surface.lightmap_uvs) {
            uv[0] += w * tri_uv[0];
            uv[1] += w * tri_uv[1];
        }
        let incoming = self.light_map.sample(uv);
        [0, 1, 2].map(|c| surface.emission + surface.albedo[c] * incoming[c])
    }
}

impl Renderer for RaycastRenderer {
    fn viewport_size(&self) -> usize {
        self.viewport_size
    }

    fn render_view(&mut self, position: &Vector3f, direction: &Vector3f, up: &Vector3f) -> Result<Image> {
        let size = self.viewport_size;
        let right = direction.cross(up);
        let this = &*self;

        let pixels: Vec<f32> = (0..size * size)
            .into_par_iter()
            .flat_map_iter(|i| {
                let (x, y) = pixel_ndc(i / size, i % size, size);
                let ray = direction + right * x + up * y;
                // rays start on the near plane
                let origin = position + ray * NEAR_PLANE;
                this.shade(&origin, &ray)
            })
            .collect();

        Array3::from_shape_vec((size, size, 3), pixels).map_err(|err| BakeError::Render(err.to_string()))
    }

    fn update_light_map(&mut self, light_map: &LightMap) -> Result<()> {
        self.light_map = light_map.clone();
        Ok(())
    }
}
