//! # UV atlas packing
//!
//! **Context**: Every frame needs its own non-overlapping rectangle of the
//! square lightmap texture.
//!
//! **How it Works**: Padded frame boxes are snapped to whole texels and packed
//! with a shelf heuristic. Frames are sorted by height (tallest first) and
//! appended left to right to the current row until the row would grow past
//! `sqrt(total area)`, at which point a new row is opened on top of the
//! tallest item of the previous one. The packing is not optimal, but frames
//! never overlap and always lie inside the lightmap.

use geo_types::Coord;
use itertools::Itertools;
use log::debug;

use crate::error::{BakeError, Result};
use crate::frame::ProjectedFrame;


/// Pixel rectangle of a frame inside the lightmap. End bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub u_start: usize,
    pub v_start: usize,
    pub u_end: usize,
    pub v_end: usize,
}

/// A projected frame with its atlas placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedFrame {
    frame: ProjectedFrame,
    placement: Placement,
    lightmap_uvs: Vec<[[f32; 2]; 3]>,
    bbox_uvs: Vec<[[f32; 2]; 3]>,
}

impl PlacedFrame {
    fn new(frame: ProjectedFrame, placement: Placement, resolution: f32, size_px: usize) -> Self {
        let width = (placement.u_end - placement.u_start) as f32;
        let height = (placement.v_end - placement.v_start) as f32;
        let size = size_px as f32;

        let to_lightmap = |c: Coord<f32>| {
            [
                (placement.u_start as f32 + c.x * resolution) / size,
                (placement.v_start as f32 + c.y * resolution) / size,
            ]
        };
        let to_bbox = |c: Coord<f32>| [c.x * resolution / width, c.y * resolution / height];

        let lightmap_uvs = frame
            .projected()
            .iter()
            .map(|t| [to_lightmap(t.v1()), to_lightmap(t.v2()), to_lightmap(t.v3())])
            .collect();
        let bbox_uvs = frame
            .projected()
            .iter()
            .map(|t| [to_bbox(t.v1()), to_bbox(t.v2()), to_bbox(t.v3())])
            .collect();

        Self {
            frame,
            placement,
            lightmap_uvs,
            bbox_uvs,
        }
    }

    pub fn frame(&self) -> &ProjectedFrame {
        &self.frame
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn width_px(&self) -> usize {
        self.placement.u_end - self.placement.u_start
    }

    pub fn height_px(&self) -> usize {
        self.placement.v_end - self.placement.v_start
    }

    /// Per-triangle vertex UVs in the whole lightmap.
    pub fn lightmap_uvs(&self) -> &[[[f32; 2]; 3]] {
        &self.lightmap_uvs
    }

    /// Per-triangle vertex UVs in the frame's own `[0, 1]²` texel box.
    pub fn bbox_uvs(&self) -> &[[[f32; 2]; 3]] {
        &self.bbox_uvs
    }
}

/// The packed lightmap layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    frames: Vec<PlacedFrame>,
    width_px: usize,
    height_px: usize,
    resolution: f32,
}

impl Atlas {
    pub fn frames(&self) -> &[PlacedFrame] {
        &self.frames
    }

    /// Side length of the square lightmap in texels.
    pub fn size_px(&self) -> usize {
        self.width_px.max(self.height_px).max(1)
    }

    pub fn width_px(&self) -> usize {
        self.width_px
    }

    pub fn height_px(&self) -> usize {
        self.height_px
    }

    /// Texels per world unit.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Lightmap UVs of every scene triangle, indexed by scene triangle index.
    pub fn triangle_uvs(&self, triangle_count: usize) -> Vec<Option<[[f32; 2]; 3]>> {
        let mut uvs = vec![None; triangle_count];
        for placed in &self.frames {
            for (&index, tri_uvs) in placed.frame.indices().iter().zip(&placed.lightmap_uvs) {
                if let Some(slot) = uvs.get_mut(index) {
                    *slot = Some(*tri_uvs);
                }
            }
        }
        uvs
    }
}

/// Number of whole texels needed to hold `extent` world units.
fn texels(extent: f32, resolution: f32) -> usize {
    ((extent * resolution - 1e-4).ceil() as usize).max(1)
}

/// Shelf-pack the frames into a square atlas.
pub fn pack(frames: Vec<ProjectedFrame>, resolution: f32) -> Result<Atlas> {
    let sizes: Vec<(usize, usize)> = frames
        .iter()
        .map(|f| (texels(f.padded_width(), resolution), texels(f.padded_height(), resolution)))
        .collect();

    let total_area: usize = sizes.iter().map(|(w, h)| w * h).sum();
    let target_width = (total_area as f64).sqrt().ceil() as usize;

    let order = (0..frames.len()).sorted_by(|&a, &b| sizes[b].1.cmp(&sizes[a].1));

    let mut placements: Vec<Option<Placement>> = vec![None; frames.len()];
    let (mut x, mut y, mut row_height) = (0usize, 0usize, 0usize);
    let mut width_px = 0usize;

    for i in order {
        let (w, h) = sizes[i];
        if x > 0 && x + w > target_width {
            y += row_height;
            x = 0;
            row_height = 0;
        }
        placements[i] = Some(Placement {
            u_start: x,
            v_start: y,
            u_end: x + w,
            v_end: y + h,
        });
        x += w;
        row_height = row_height.max(h);
        width_px = width_px.max(x);
    }
    let height_px = y + row_height;
    let size_px = width_px.max(height_px).max(1);

    debug!(
        "packed {} frames into {}x{} texels (lightmap {}x{})",
        frames.len(),
        width_px,
        height_px,
        size_px,
        size_px
    );

    let frames = frames
        .into_iter()
        .zip(placements)
        .enumerate()
        .map(|(i, (frame, placement))| {
            let placement = placement.ok_or(BakeError::UnplacedFrame(i))?;
            Ok(PlacedFrame::new(frame, placement, resolution, size_px))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Atlas {
        frames,
        width_px,
        height_px,
        resolution,
    })
}
