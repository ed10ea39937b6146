//! Scene ingestion and export.
//!
//! Scenes arrive as the souper's JSON triangle soup, either a bare array of
//! triangles or an object that also carries point lights, or as a Wavefront
//! OBJ for quick test scenes. Textures are only checked for existence: a
//! missing texture falls back to the `default` texture.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_TEXTURE;
use crate::error::{BakeError, Result};
use crate::geom::Triangle;
use crate::light::PointLight;

#[cfg(test)]
mod tests {

    use super::*;

    const QUAD: &str = r#"[
        {"vertices": [{"pos": [0, 0, 0], "uv": [0, 0]}, {"pos": [0, 0, 1], "uv": [0, 1]}, {"pos": [1, 0, 1], "uv": [1, 1]}],
         "textureName": "floor"},
        {"vertices": [{"pos": [0, 0, 0], "uv": [0, 0]}, {"pos": [1, 0, 1], "uv": [1, 1]}, {"pos": [1, 0, 0], "uv": [1, 0]}],
         "textureName": "floor", "emission": 2.5}
    ]"#;

    #[test]
    fn bare_array_with_missing_textures() {
        let scene = Scene::from_json_str(QUAD, Path::new("/nonexistent")).unwrap();
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.texture_name(0), DEFAULT_TEXTURE);
        assert_eq!(scene.textures().get(DEFAULT_TEXTURE), Some(&vec![0, 1]));
        assert_eq!(scene.emission(0), 0.0);
        assert_eq!(scene.emission(1), 2.5);
        assert!(scene.lights().is_empty());
        assert!((scene.triangles()[0].normal.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn object_form_carries_lights() {
        let json = format!(
            r#"{{"triangles": {}, "lights": [{{"origin": [0, 2, 0], "intensity": 4, "range": 10}}]}}"#,
            QUAD
        );
        let scene = Scene::from_json_str(&json, Path::new("/nonexistent")).unwrap();
        assert_eq!(scene.lights().len(), 1);
        assert_eq!(scene.lights()[0].color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn degenerate_triangle_is_fatal() {
        let json = r#"[{"vertices": [{"pos": [0, 0, 0], "uv": [0, 0]}, {"pos": [1, 1, 1], "uv": [0, 1]}, {"pos": [2, 2, 2], "uv": [1, 1]}],
                        "textureName": "x"}]"#;
        let result = Scene::from_json_str(json, Path::new("."));
        assert!(matches!(result, Err(BakeError::DegenerateGeometry(_))));
    }

    #[test]
    fn lightmap_uvs_are_exported() {
        let mut scene = Scene::from_json_str(QUAD, Path::new("/nonexistent")).unwrap();
        scene.set_lightmap_uvs(&[Some([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]), None]);
        let json = scene.to_json_string().unwrap();
        let reloaded = Scene::from_json_str(&json, Path::new("/nonexistent")).unwrap();
        assert_eq!(reloaded.lightmap_uvs(0), [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]);
        assert_eq!(reloaded.lightmap_uvs(1), [[0.0, 0.0]; 3]);
    }

    #[test]
    fn obj_quad_is_triangulated() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let scene = Scene::load(&root.join("scenes/quad.obj"), &root.join("scenes")).unwrap();
        assert_eq!(scene.len(), 2);
        assert!(scene.lights().is_empty());
        assert_eq!(scene.textures().get(DEFAULT_TEXTURE), Some(&vec![0, 1]));
        for (i, triangle) in scene.triangles().iter().enumerate() {
            assert!((triangle.normal.y - 1.0).abs() < 1e-6);
            // texture coordinates follow the xz position on this quad
            for (vertex, uv) in triangle.vertices.iter().zip(scene.texture_uvs(i)) {
                assert!((vertex.x - uv[0]).abs() < 1e-6 && (vertex.z - uv[1]).abs() < 1e-6);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VertexRecord {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
    #[serde(default)]
    pub uv_lightmap: [f32; 2],
}

/// One triangle of the souper output.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TriangleRecord {
    pub vertices: [VertexRecord; 3],
    #[serde(rename = "textureName")]
    pub texture_name: String,
    #[serde(default)]
    pub emission: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albedo: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SceneFile {
    Triangles(Vec<TriangleRecord>),
    Object {
        triangles: Vec<TriangleRecord>,
        #[serde(default)]
        lights: Vec<PointLight>,
    },
}

/// Triangles, materials and lights of a level.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    records: Vec<TriangleRecord>,
    triangles: Vec<Triangle>,
    textures: BTreeMap<String, Vec<usize>>,
    lights: Vec<PointLight>,
}

impl Scene {
    /// Load a scene, choosing the format from the file extension.
    pub fn load(path: &Path, assets: &Path) -> Result<Self> {
        info!("loading scene {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("obj") => Self::from_obj(path, assets),
            _ => {
                let contents = fs::read_to_string(path)?;
                Self::from_json_str(&contents, assets)
            }
        }
    }

    pub fn from_json_str(contents: &str, assets: &Path) -> Result<Self> {
        let (records, lights) = match serde_json::from_str::<SceneFile>(contents)? {
            SceneFile::Triangles(records) => (records, Vec::new()),
            SceneFile::Object { triangles, lights } => (triangles, lights),
        };
        Self::from_records(records, lights, assets)
    }

    /// Load every mesh of an OBJ file. Material names become texture names.
    pub fn from_obj(path: &Path, assets: &Path) -> Result<Self> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let (models, materials) = tobj::load_obj(path, &options)?;
        let materials = materials.unwrap_or_default();

        let mut records = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            let texture_name = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map_or_else(|| DEFAULT_TEXTURE.to_string(), |m| m.name.clone());

            for face in mesh.indices.chunks_exact(3) {
                let vertices = [face[0], face[1], face[2]].map(|i| {
                    let i = i as usize;
                    let uv = if mesh.texcoords.len() >= 2 * (i + 1) {
                        [mesh.texcoords[2 * i], mesh.texcoords[2 * i + 1]]
                    } else {
                        [0.0, 0.0]
                    };
                    VertexRecord {
                        pos: [
                            mesh.positions[3 * i],
                            mesh.positions[3 * i + 1],
                            mesh.positions[3 * i + 2],
                        ],
                        uv,
                        uv_lightmap: [0.0, 0.0],
                    }
                });
                records.push(TriangleRecord {
                    vertices,
                    texture_name: texture_name.clone(),
                    emission: 0.0,
                    albedo: None,
                });
            }
        }
        debug!("loaded {} triangles from {} OBJ models", records.len(), models.len());
        Self::from_records(records, Vec::new(), assets)
    }

    pub fn from_records(
        mut records: Vec<TriangleRecord>,
        lights: Vec<PointLight>,
        assets: &Path,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(BakeError::InvalidScene("scene contains no triangles".to_string()));
        }

        let mut triangles = Vec::with_capacity(records.len());
        let mut textures: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut missing: BTreeSet<String> = BTreeSet::new();

        for (i, record) in records.iter_mut().enumerate() {
            triangles.push(Triangle::from_array(record.vertices.clone().map(|v| v.pos))?);

            if !texture_path(assets, &record.texture_name).exists() {
                if missing.insert(record.texture_name.clone()) {
                    warn!(
                        "cannot load texture {}, using {}",
                        texture_path(assets, &record.texture_name).display(),
                        DEFAULT_TEXTURE
                    );
                }
                record.texture_name = DEFAULT_TEXTURE.to_string();
            }
            textures.entry(record.texture_name.clone()).or_default().push(i);
        }

        info!(
            "scene has {} triangles, {} textures and {} lights",
            triangles.len(),
            textures.len(),
            lights.len()
        );

        Ok(Self {
            records,
            triangles,
            textures,
            lights,
        })
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Texture name to the indices of the triangles using it.
    pub fn textures(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.textures
    }

    pub fn lights(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn texture_name(&self, index: usize) -> &str {
        &self.records[index].texture_name
    }

    pub fn texture_uvs(&self, index: usize) -> [[f32; 2]; 3] {
        self.records[index].vertices.clone().map(|v| v.uv)
    }

    pub fn lightmap_uvs(&self, index: usize) -> [[f32; 2]; 3] {
        self.records[index].vertices.clone().map(|v| v.uv_lightmap)
    }

    pub fn emission(&self, index: usize) -> f32 {
        self.records[index].emission
    }

    pub fn albedo(&self, index: usize, default: [f32; 3]) -> [f32; 3] {
        self.records[index].albedo.unwrap_or(default)
    }

    /// Store lightmap UVs per triangle. Triangles given `None` keep their current UVs.
    pub fn set_lightmap_uvs(&mut self, uvs: &[Option<[[f32; 2]; 3]>]) {
        for (record, uvs) in self.records.iter_mut().zip(uvs) {
            if let Some(uvs) = uvs {
                for (vertex, uv) in record.vertices.iter_mut().zip(uvs) {
                    vertex.uv_lightmap = *uv;
                }
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Write the triangles, with their lightmap UVs, back out as souper JSON.
    pub fn save_to_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.records)?;
        Ok(())
    }
}

fn texture_path(assets: &Path, name: &str) -> PathBuf {
    assets.join("textures").join(format!("{}.tga", name))
}
