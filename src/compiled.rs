//! Compiled triangle format read by the runtime renderer.
//!
//! The file is a flat array of [`CompiledTriangle`] records in native byte
//! order. Each record holds three vertices (position, normal, texture UV,
//! lightmap UV), a NUL-padded 256 byte texture name and two flag words.

use std::fs;
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::config::TEXTURE_NAME_LEN;
use crate::error::{BakeError, Result};
use crate::scene::Scene;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<CompiledVertex>(), 40);
        assert_eq!(std::mem::size_of::<CompiledTriangle>(), 392);
    }

    #[test]
    fn round_trip_through_disk() {
        let json = r#"[
            {"vertices": [{"pos": [0.1, 0.2, 0.3], "uv": [0.5, 0.25]}, {"pos": [1.7, 0.2, 0.3], "uv": [1, 0]}, {"pos": [0.1, 3.3, 0.3], "uv": [0, 1]}],
             "textureName": "stone"}
        ]"#;
        let mut scene = Scene::from_json_str(json, Path::new("/nonexistent")).unwrap();
        scene.set_lightmap_uvs(&[Some([[0.125, 0.5], [0.375, 0.5], [0.125, 0.875]])]);

        let compiled = compile(&scene);
        let path = std::env::temp_dir().join(format!("hemibake-compiled-{}.bin", std::process::id()));
        write(&path, &compiled).unwrap();
        let loaded = read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.len(), 1);
        let tri = &loaded[0];
        for (v, expected) in tri.vertices.iter().zip(scene.triangles()[0].vertices.iter()) {
            assert_eq!(v.pos, [expected.x, expected.y, expected.z]);
            assert!((v.normal[2] - 1.0).abs() < 1e-6);
        }
        assert!((tri.vertices[1].uv_lightmap[0] - 0.375).abs() < 1e-5);
        assert!((tri.vertices[0].uv_texture[1] - 0.25).abs() < 1e-5);
        assert_eq!(tri.texture_name(), "default");
        assert_eq!(tri.surface_flags, 1);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = vec![0u8; 100];
        assert!(matches!(from_bytes(&bytes), Err(BakeError::InvalidScene(_))));
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompiledVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv_texture: [f32; 2],
    pub uv_lightmap: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CompiledTriangle {
    pub vertices: [CompiledVertex; 3],
    pub texture_name: [u8; TEXTURE_NAME_LEN],
    pub surface_flags: u64,
    pub content_flags: u64,
}

impl CompiledTriangle {
    /// Texture name up to the first NUL byte.
    pub fn texture_name(&self) -> String {
        let end = self
            .texture_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TEXTURE_NAME_LEN);
        String::from_utf8_lossy(&self.texture_name[..end]).into_owned()
    }
}

fn encode_name(name: &str) -> [u8; TEXTURE_NAME_LEN] {
    let mut bytes = [0u8; TEXTURE_NAME_LEN];
    // keep at least one terminating NUL
    let len = name.len().min(TEXTURE_NAME_LEN - 1);
    bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
    bytes
}

/// Build the compiled records of every scene triangle. Flags are placeholders
/// until the souper provides real surface and content flags.
pub fn compile(scene: &Scene) -> Vec<CompiledTriangle> {
    scene
        .triangles()
        .iter()
        .enumerate()
        .map(|(i, triangle)| {
            let normal = [triangle.normal.x, triangle.normal.y, triangle.normal.z];
            let texture_uvs = scene.texture_uvs(i);
            let lightmap_uvs = scene.lightmap_uvs(i);
            let vertices = [0, 1, 2].map(|j| {
                let p = triangle.vertices[j];
                CompiledVertex {
                    pos: [p.x, p.y, p.z],
                    normal,
                    uv_texture: texture_uvs[j],
                    uv_lightmap: lightmap_uvs[j],
                }
            });
            CompiledTriangle {
                vertices,
                texture_name: encode_name(scene.texture_name(i)),
                surface_flags: 1,
                content_flags: 1,
            }
        })
        .collect()
}

pub fn write(path: &Path, triangles: &[CompiledTriangle]) -> Result<()> {
    fs::write(path, bytemuck::cast_slice::<CompiledTriangle, u8>(triangles))?;
    Ok(())
}

pub fn read(path: &Path) -> Result<Vec<CompiledTriangle>> {
    from_bytes(&fs::read(path)?)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Vec<CompiledTriangle>> {
    let record = std::mem::size_of::<CompiledTriangle>();
    if bytes.len() % record != 0 {
        return Err(BakeError::InvalidScene(format!(
            "compiled triangle file of {} bytes is not a multiple of {} bytes",
            bytes.len(),
            record
        )));
    }
    // input buffer may be unaligned
    Ok(bytes
        .chunks_exact(record)
        .map(bytemuck::pod_read_unaligned::<CompiledTriangle>)
        .collect())
}
