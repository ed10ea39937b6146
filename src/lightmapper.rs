//! # Radiosity bounces
//!
//! **Context**: Each bounce estimates the irradiance arriving at every legal
//! patch from the scene as lit by the previous bounce. Feeding the result
//! back to the renderer lets indirect light accumulate over bounces.
//!
//! **How it Works**: Two lightmap buffers are kept. During a bounce the
//! renderer shades with the front buffer while gathered values are written to
//! the back buffer. For every frame, the hemicube views of its legal patches
//! are rendered in batches from the bake thread, then integrated in parallel.
//! Illegal texels take the value of their nearest legal texel. At the end of
//! the bounce the direct term is added, the buffers are swapped and the new
//! front buffer is handed to the renderer.

use std::time::Instant;

use log::{debug, info};
use ndarray::Array3;
use rayon::prelude::*;

use crate::config::RENDER_BATCH_PATCHES;
use crate::error::{BakeError, Result};
use crate::hemicube::{views, Hemicube};
use crate::texel_tree::TexelTree;
use crate::legality::ClassifiedFrame;
use crate::lightmap::LightMap;
use crate::progress::progress_bar;
use crate::renderer::{Renderer, ViewRequest};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::atlas::pack;
    use crate::bvh::Bvh;
    use crate::frame::{build_frames, project_frames};
    use crate::geom::{Triangle, Vector3f};
    use crate::legality::classify_frames;
    use crate::renderer::Image;
    use crate::settings::Tolerances;

    /// Renders every view as a uniform colour and counts calls.
    struct ConstantRenderer {
        size: usize,
        color: [f32; 3],
        renders: usize,
        updates: usize,
    }

    impl Renderer for ConstantRenderer {
        fn viewport_size(&self) -> usize {
            self.size
        }

        fn render_view(&mut self, _: &Vector3f, _: &Vector3f, _: &Vector3f) -> Result<Image> {
            self.renders += 1;
            let mut image = Array3::zeros((self.size, self.size, 3));
            for c in 0..3 {
                image.slice_mut(ndarray::s![.., .., c]).fill(self.color[c]);
            }
            Ok(image)
        }

        fn update_light_map(&mut self, _: &LightMap) -> Result<()> {
            self.updates += 1;
            Ok(())
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn viewport_size(&self) -> usize {
            4
        }

        fn render_view(&mut self, _: &Vector3f, _: &Vector3f, _: &Vector3f) -> Result<Image> {
            Err(BakeError::Render("device lost".to_string()))
        }

        fn update_light_map(&mut self, _: &LightMap) -> Result<()> {
            Ok(())
        }
    }

    fn floor_frames() -> (Vec<ClassifiedFrame>, usize) {
        let a = Vector3f::new(0.0, 0.0, 0.0);
        let b = Vector3f::new(1.0, 0.0, 0.0);
        let c = Vector3f::new(1.0, 0.0, 1.0);
        let d = Vector3f::new(0.0, 0.0, 1.0);
        let triangles = vec![Triangle::new(a, d, c).unwrap(), Triangle::new(a, c, b).unwrap()];
        let tolerances = Tolerances::default();
        let frames = project_frames(build_frames(&triangles, &tolerances), 0.25).unwrap();
        let atlas = pack(frames, 4.0).unwrap();
        let classified = classify_frames(&atlas, &Bvh::new(&triangles), &tolerances);
        (classified, atlas.size_px())
    }

    #[test]
    fn uniform_scene_fills_whole_frame() {
        let (frames, size) = floor_frames();
        let lightmapper = Lightmapper::new(&frames, size, 8, 2);
        let mut renderer = ConstantRenderer {
            size: 8,
            color: [0.5, 0.25, 0.0],
            renders: 0,
            updates: 0,
        };
        let lightmap = lightmapper.run(&mut renderer, None).unwrap();

        let legal = frames[0].legal_pixels().len();
        assert_eq!(renderer.renders, 2 * 5 * legal);
        // initial upload plus one per bounce
        assert_eq!(renderer.updates, 3);
        for u in 0..size {
            for v in 0..size {
                let texel = lightmap.get(u, v);
                assert!((texel[0] - 0.5).abs() < 1e-4 && (texel[1] - 0.25).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn direct_term_is_added_every_bounce() {
        let (frames, size) = floor_frames();
        let mut direct = LightMap::new(size);
        direct.set(0, 0, [1.0, 1.0, 1.0]);
        let lightmapper = Lightmapper::new(&frames, size, 4, 1);
        let mut renderer = ConstantRenderer {
            size: 4,
            color: [0.0; 3],
            renders: 0,
            updates: 0,
        };
        let lightmap = lightmapper.run(&mut renderer, Some(&direct)).unwrap();
        assert_eq!(lightmap.get(0, 0), [1.0, 1.0, 1.0]);
        assert_eq!(lightmap.get(1, 1), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn renderer_failure_aborts_the_bake() {
        let (frames, size) = floor_frames();
        let lightmapper = Lightmapper::new(&frames, size, 4, 1);
        let result = lightmapper.run(&mut FailingRenderer, None);
        assert!(matches!(result, Err(BakeError::Render(_))));
    }

    #[test]
    fn fill_uses_nearest_legal_texel() {
        let (frames, _) = floor_frames();
        let frame = &frames[0];
        let values: Vec<[f32; 3]> = frame
            .legal_pixels()
            .iter()
            .map(|&[x, y]| [x as f32, y as f32, 0.0])
            .collect();
        let region = fill_frame(frame, &values);
        for &[x, y] in frame.illegal_pixels() {
            let (nx, ny) = (region[[y, x, 0]] as usize, region[[y, x, 1]] as usize);
            assert!(frame.legal_pixels().contains(&[nx, ny]));
        }
    }
}

/// A classified frame with the gathered value of every legal patch.
#[derive(Debug, Clone, PartialEq)]
pub struct LitFrame<'a> {
    frame: &'a ClassifiedFrame,
    radiance: Vec<[f32; 3]>,
}

impl<'a> LitFrame<'a> {
    pub fn frame(&self) -> &'a ClassifiedFrame {
        self.frame
    }

    /// Gathered values in the order of the frame's legal pixels.
    pub fn radiance(&self) -> &[[f32; 3]] {
        &self.radiance
    }

    /// The frame's lightmap block with illegal texels filled.
    pub fn region(&self) -> Array3<f32> {
        fill_frame(self.frame, &self.radiance)
    }
}

/// Build a frame's `[rows, cols, 3]` lightmap block from its legal values,
/// filling every illegal texel from its nearest legal texel.
pub fn fill_frame(frame: &ClassifiedFrame, values: &[[f32; 3]]) -> Array3<f32> {
    let placed = frame.placed();
    let mut region = Array3::zeros((placed.height_px(), placed.width_px(), 3));

    for (&[x, y], value) in frame.legal_pixels().iter().zip(values) {
        for (c, &v) in value.iter().enumerate() {
            region[[y, x, c]] = v;
        }
    }

    if frame.legal_pixels().is_empty() {
        return region;
    }

    let tree = TexelTree::new(frame.legal_pixels());
    for &[x, y] in frame.illegal_pixels() {
        if let Some(nearest) = tree.nearest([x, y]).and_then(|i| values.get(i)) {
            for (c, &v) in nearest.iter().enumerate() {
                region[[y, x, c]] = v;
            }
        }
    }
    region
}

/// Runs radiosity bounces over a set of classified frames.
pub struct Lightmapper<'a> {
    frames: &'a [ClassifiedFrame],
    hemicube: Hemicube,
    lightmap_size: usize,
    iterations: usize,
}

impl<'a> Lightmapper<'a> {
    pub fn new(
        frames: &'a [ClassifiedFrame],
        lightmap_size: usize,
        viewport_size: usize,
        iterations: usize,
    ) -> Self {
        Self {
            frames,
            hemicube: Hemicube::new(viewport_size),
            lightmap_size,
            iterations,
        }
    }

    /// Run every bounce and return the final lightmap.
    ///
    /// `direct` seeds the first bounce and is added to the result of every
    /// bounce, so the returned map holds direct plus gathered light.
    pub fn run<R: Renderer>(&self, renderer: &mut R, direct: Option<&LightMap>) -> Result<LightMap> {
        if renderer.viewport_size() != self.hemicube.size() {
            return Err(BakeError::Render(format!(
                "renderer viewport is {} pixels, hemicube expects {}",
                renderer.viewport_size(),
                self.hemicube.size()
            )));
        }

        let mut front = match direct {
            Some(direct) => direct.clone(),
            None => LightMap::new(self.lightmap_size),
        };
        let mut back = LightMap::new(self.lightmap_size);
        renderer.update_light_map(&front)?;

        let start = Instant::now();
        for bounce in 0..self.iterations {
            let bounce_start = Instant::now();
            self.bounce(renderer, &mut back, bounce)?;
            if let Some(direct) = direct {
                back.add(direct)?;
            }
            std::mem::swap(&mut front, &mut back);
            renderer.update_light_map(&front)?;
            info!(
                "bounce {}/{} done in {:.2?}",
                bounce + 1,
                self.iterations,
                bounce_start.elapsed()
            );
        }
        info!("Time taken: {:.2?}", start.elapsed());

        Ok(front)
    }

    /// Gather one bounce for every frame into `target`.
    fn bounce<R: Renderer>(&self, renderer: &mut R, target: &mut LightMap, bounce: usize) -> Result<()> {
        target.clear();
        let pb = progress_bar(self.frames.len(), &format!("bounce {}", bounce + 1));
        for frame in self.frames {
            let lit = self.gather(renderer, frame)?;
            target.blit(frame.placed().placement(), lit.region().view())?;
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(())
    }

    /// Render and integrate the hemicubes of one frame's legal patches.
    pub fn gather<'f, R: Renderer>(&self, renderer: &mut R, frame: &'f ClassifiedFrame) -> Result<LitFrame<'f>> {
        let patches: Vec<_> = frame
            .legal_positions()
            .iter()
            .zip(frame.legal_normals())
            .collect();

        let mut radiance = Vec::with_capacity(patches.len());
        for batch in patches.chunks(RENDER_BATCH_PATCHES) {
            let requests: Vec<ViewRequest> = batch
                .iter()
                .flat_map(|(position, normal)| {
                    views(normal).map(|view| ViewRequest {
                        position: **position,
                        direction: view.direction,
                        up: view.up,
                    })
                })
                .collect();

            let images = renderer.render_batch(&requests)?;
            if images.len() != requests.len() {
                return Err(BakeError::Render(format!(
                    "renderer returned {} images for {} views",
                    images.len(),
                    requests.len()
                )));
            }

            let gathered = images
                .par_chunks(5)
                .map(|renders| self.hemicube.integrate(renders))
                .collect::<Result<Vec<_>>>()?;
            radiance.extend(gathered);
        }

        debug!(
            "gathered {} patches for frame {:?}",
            radiance.len(),
            frame.placed().frame().indices()
        );

        Ok(LitFrame { frame, radiance })
    }
}
