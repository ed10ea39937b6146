use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bvh::Bvh;
use crate::config::SURFACE_OFFSET;
use crate::error::Result;
use crate::geom::Vector3f;
use crate::legality::ClassifiedFrame;
use crate::lightmap::LightMap;
use crate::lightmapper::fill_frame;


/// A static point light with inverse-square falloff and a hard range.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PointLight {
    pub origin: Vector3f,
    /// Falloff numerator: irradiance at distance `d` is `intensity / d²`.
    pub intensity: f32,
    #[serde(default = "white")]
    pub color: [f32; 3],
    pub range: f32,
}

fn white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl PointLight {
    /// Inverse-square attenuation, zero beyond the light's range.
    pub fn attenuation(&self, distance: f32) -> f32 {
        if distance <= 0.0 || distance > self.range {
            0.0
        } else {
            self.intensity / (distance * distance)
        }
    }

    /// Unoccluded irradiance at a surface point.
    pub fn irradiance(&self, position: &Vector3f, normal: &Vector3f) -> [f32; 3] {
        let to_light = self.origin - position;
        let distance = to_light.norm();
        let attenuation = self.attenuation(distance);
        if attenuation == 0.0 {
            return [0.0; 3];
        }
        let cosine = normal.dot(&(to_light / distance)).max(0.0);
        self.color.map(|c| (c * attenuation * cosine).max(0.0))
    }
}

/// Summed direct irradiance from every light, optionally shadowed through the BVH.
pub fn direct_irradiance(
    lights: &[PointLight],
    position: &Vector3f,
    normal: &Vector3f,
    bvh: Option<&Bvh>,
) -> [f32; 3] {
    let origin = position + normal * SURFACE_OFFSET;
    lights.iter().fold([0.0; 3], |mut acc, light| {
        let contribution = light.irradiance(position, normal);
        if contribution.iter().all(|&c| c == 0.0) {
            return acc;
        }
        if let Some(bvh) = bvh {
            let to_light = light.origin - origin;
            let distance = to_light.norm();
            if bvh.occluded(&origin, &(to_light / distance), distance) {
                return acc;
            }
        }
        for (a, c) in acc.iter_mut().zip(contribution) {
            *a += c;
        }
        acc
    })
}

/// Lightmap of direct point-light irradiance at every legal patch, with
/// illegal texels filled from their nearest legal neighbour.
pub fn seed_direct(
    frames: &[ClassifiedFrame],
    lights: &[PointLight],
    bvh: Option<&Bvh>,
    size: usize,
) -> Result<LightMap> {
    info!(
        "seeding direct light from {} lights (shadows: {})",
        lights.len(),
        bvh.is_some()
    );

    let regions: Vec<_> = frames
        .par_iter()
        .map(|frame| {
            let values: Vec<[f32; 3]> = frame
                .legal_positions()
                .iter()
                .zip(frame.legal_normals())
                .map(|(p, n)| direct_irradiance(lights, p, n, bvh))
                .collect();
            fill_frame(frame, &values)
        })
        .collect();

    let mut lightmap = LightMap::new(size);
    for (frame, region) in frames.iter().zip(regions) {
        lightmap.blit(frame.placed().placement(), region.view())?;
    }
    Ok(lightmap)
}
