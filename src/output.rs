use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use serde::Serialize;

use crate::bake::Bake;
use crate::compiled;
use crate::settings::Settings;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::scene::Scene;
    use crate::settings::load_default_config;

    const QUAD: &str = r#"[
        {"vertices": [{"pos": [0, 0, 0], "uv": [0, 0]}, {"pos": [0, 0, 1], "uv": [0, 1]}, {"pos": [1, 0, 1], "uv": [1, 1]}], "textureName": "floor", "emission": 1.0},
        {"vertices": [{"pos": [0, 0, 0], "uv": [0, 0]}, {"pos": [1, 0, 1], "uv": [1, 1]}, {"pos": [1, 0, 0], "uv": [1, 0]}], "textureName": "floor", "emission": 1.0}
    ]"#;

    #[test]
    fn report_counts_texels() {
        let mut settings = load_default_config().unwrap();
        settings.lights.clear();
        let scene = Scene::from_json_str(QUAD, Path::new("/nonexistent")).unwrap();
        let bake = Bake::new(scene, settings).unwrap();
        let report = BakeReport::new(&bake);
        assert_eq!(report.triangles, 2);
        assert_eq!(report.frames, 1);
        let frame = &bake.frames()[0];
        assert_eq!(report.legal_texels, frame.legal_pixels().len());
        assert_eq!(report.illegal_texels, frame.illegal_pixels().len());
        assert!(report.duration_secs.is_none());
    }

    #[test]
    fn writeup_creates_every_file() {
        let mut settings = load_default_config().unwrap();
        settings.lights.clear();
        settings.iterations = 1;
        settings.viewport_size = 4;
        let dir = std::env::temp_dir().join(format!("hemibake-writeup-{}", std::process::id()));
        settings.output_dir = dir.to_string_lossy().into_owned();
        settings.name = "quad".to_string();

        let scene = Scene::from_json_str(QUAD, Path::new("/nonexistent")).unwrap();
        let mut bake = Bake::new(scene, settings).unwrap();
        let mut renderer = bake.raycast_renderer().unwrap();
        bake.run(&mut renderer).unwrap();
        writeup(&bake).unwrap();

        for ext in ["hdr", "png", "bin", "json", "toml"] {
            let path = dir.join(format!("quad.{}", ext));
            assert!(path.exists(), "missing {}", path.display());
        }
        assert!(dir.join("quad_report.json").exists());

        let hdr = crate::lightmap::LightMap::read_hdr(&dir.join("quad.hdr")).unwrap();
        assert_eq!(hdr.size(), bake.atlas().size_px());
        let triangles = compiled::read(&dir.join("quad.bin")).unwrap();
        assert_eq!(triangles.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}

/// Summary of a bake written next to its outputs.
#[derive(Debug, Clone, Serialize)]
pub struct BakeReport {
    pub name: String,
    pub timestamp: String,
    pub triangles: usize,
    pub frames: usize,
    pub legal_texels: usize,
    pub illegal_texels: usize,
    pub lightmap_size: usize,
    pub atlas_width: usize,
    pub atlas_height: usize,
    pub bounces: usize,
    pub viewport_size: usize,
    pub patch_resolution: f32,
    pub lights: usize,
    pub duration_secs: Option<f64>,
}

impl BakeReport {
    pub fn new(bake: &Bake) -> Self {
        let settings = bake.settings();
        Self {
            name: settings.name.clone(),
            timestamp: Local::now().to_rfc3339(),
            triangles: bake.scene().len(),
            frames: bake.frames().len(),
            legal_texels: bake.frames().iter().map(|f| f.legal_pixels().len()).sum(),
            illegal_texels: bake.frames().iter().map(|f| f.illegal_pixels().len()).sum(),
            lightmap_size: bake.atlas().size_px(),
            atlas_width: bake.atlas().width_px(),
            atlas_height: bake.atlas().height_px(),
            bounces: settings.iterations,
            viewport_size: settings.viewport_size,
            patch_resolution: settings.patch_resolution,
            lights: bake.lights().len(),
            duration_secs: bake.elapsed().map(|d| d.as_secs_f64()),
        }
    }
}

fn output_path(settings: &Settings, suffix: &str) -> PathBuf {
    Path::new(&settings.output_dir).join(format!("{}{}", settings.name, suffix))
}

/// Write the lightmap, its preview, the exported scene, the settings and a report.
pub fn writeup(bake: &Bake) -> Result<()> {
    let settings = bake.settings();
    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("failed to create output directory {}", settings.output_dir))?;

    if let Some(lightmap) = bake.lightmap() {
        let hdr = output_path(settings, ".hdr");
        lightmap
            .write_hdr(&hdr)
            .with_context(|| format!("failed to write {}", hdr.display()))?;
        let png = output_path(settings, ".png");
        lightmap
            .write_png(&png, settings.exposure)
            .with_context(|| format!("failed to write {}", png.display()))?;
        info!("wrote lightmap to {}", hdr.display());
    } else {
        info!("no lightmap baked, skipping image output");
    }

    let json = output_path(settings, ".json");
    bake.scene()
        .save_to_json(&json)
        .with_context(|| format!("failed to write {}", json.display()))?;

    let binary = output_path(settings, ".bin");
    compiled::write(&binary, &compiled::compile(bake.scene()))
        .with_context(|| format!("failed to write {}", binary.display()))?;

    write_settings(settings, &output_path(settings, ".toml"))?;
    write_report(&BakeReport::new(bake), &output_path(settings, "_report.json"))?;

    Ok(())
}

/// Write the effective settings as TOML.
pub fn write_settings(settings: &Settings, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(settings).context("failed to serialize settings")?;
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn write_report(report: &BakeReport, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}
