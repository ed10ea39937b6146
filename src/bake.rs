use std::time::{Duration, Instant};

use log::info;

use crate::atlas::{pack, Atlas};
use crate::bvh::Bvh;
use crate::error::{BakeError, Result};
use crate::frame::{build_frames, project_frames};
use crate::legality::{classify_frames, ClassifiedFrame};
use crate::light::{seed_direct, PointLight};
use crate::lightmap::LightMap;
use crate::lightmapper::Lightmapper;
use crate::raycast::{RaycastRenderer, Surface};
use crate::renderer::Renderer;
use crate::scene::Scene;
use crate::settings::Settings;


/// Everything needed to bake one scene: the layout is built up front, the
/// lightmap by [`Bake::run`].
pub struct Bake {
    scene: Scene,
    settings: Settings,
    bvh: Bvh,
    atlas: Atlas,
    frames: Vec<ClassifiedFrame>,
    lightmap: Option<LightMap>,
    elapsed: Option<Duration>,
}

impl Bake {
    /// Build frames, pack the atlas and classify every texel.
    pub fn new(mut scene: Scene, settings: Settings) -> Result<Self> {
        let start = Instant::now();
        let tolerances = &settings.tolerances;

        let raw = build_frames(scene.triangles(), tolerances);
        info!("built {} frames from {} triangles", raw.len(), scene.len());

        let projected = project_frames(raw, settings.patch_size())?;
        let atlas = pack(projected, settings.patch_resolution)?;
        info!(
            "lightmap is {}x{} texels",
            atlas.size_px(),
            atlas.size_px()
        );
        scene.set_lightmap_uvs(&atlas.triangle_uvs(scene.len()));

        let bvh = Bvh::new(scene.triangles());
        let frames = classify_frames(&atlas, &bvh, tolerances);
        info!("layout prepared in {:.2?}", start.elapsed());

        Ok(Self {
            scene,
            settings,
            bvh,
            atlas,
            frames,
            lightmap: None,
            elapsed: None,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }

    pub fn frames(&self) -> &[ClassifiedFrame] {
        &self.frames
    }

    pub fn lightmap(&self) -> Option<&LightMap> {
        self.lightmap.as_ref()
    }

    /// Duration of the last call to [`Bake::run`].
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Lights from the scene file followed by lights from the settings.
    pub fn lights(&self) -> Vec<PointLight> {
        self.scene
            .lights()
            .iter()
            .chain(&self.settings.lights)
            .cloned()
            .collect()
    }

    /// A CPU renderer over this bake's scene and atlas.
    pub fn raycast_renderer(&self) -> Result<RaycastRenderer> {
        let surfaces = Surface::from_scene(&self.scene, &self.atlas, self.settings.default_albedo);
        RaycastRenderer::new(
            self.bvh.clone(),
            surfaces,
            self.settings.viewport_size,
            self.settings.atmosphere_color,
        )
    }

    /// Direct light seed, if enabled and there are lights to seed from.
    pub fn direct(&self) -> Result<Option<LightMap>> {
        let lights = self.lights();
        if !self.settings.seed_direct || lights.is_empty() {
            return Ok(None);
        }
        let bvh = self.settings.direct_shadows.then_some(&self.bvh);
        seed_direct(&self.frames, &lights, bvh, self.atlas.size_px()).map(Some)
    }

    /// Run every bounce through `renderer` and keep the resulting lightmap.
    pub fn run<R: Renderer>(&mut self, renderer: &mut R) -> Result<&LightMap> {
        let start = Instant::now();
        let direct = self.direct()?;
        let lightmapper = Lightmapper::new(
            &self.frames,
            self.atlas.size_px(),
            self.settings.viewport_size,
            self.settings.iterations,
        );
        let lightmap = lightmapper.run(renderer, direct.as_ref())?;
        self.elapsed = Some(start.elapsed());
        self.lightmap = Some(lightmap);
        self.lightmap
            .as_ref()
            .ok_or_else(|| BakeError::Render("lightmap missing after bake".to_string()))
    }
}
