use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, ImageFormat, Rgb32FImage};
use ndarray::{s, Array3, ArrayView3, Zip};

use crate::atlas::Placement;
use crate::config::PREVIEW_GAMMA;
use crate::error::{BakeError, Result};

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn tone_map_is_bounded() {
        assert_eq!(tone_map(0.0, 1000.0), 0.0);
        assert!(tone_map(1.0, 1000.0) <= 1.0);
        assert!(tone_map(1e-4, 1000.0) > tone_map(1e-5, 1000.0));
        assert_eq!(tone_map(-5.0, 1000.0), 0.0);
    }

    #[test]
    fn blit_and_sample() {
        let mut lightmap = LightMap::new(8);
        let placement = Placement {
            u_start: 2,
            v_start: 4,
            u_end: 5,
            v_end: 6,
        };
        let mut region = Array3::zeros((2, 3, 3));
        region.slice_mut(s![.., .., 1]).fill(0.5);
        lightmap.blit(&placement, region.view()).unwrap();

        assert_eq!(lightmap.get(3, 4), [0.0, 0.5, 0.0]);
        assert_eq!(lightmap.get(1, 4), [0.0, 0.0, 0.0]);
        // uv (3.5 / 8, 4.5 / 8) is the centre of texel (3, 4)
        assert_eq!(lightmap.sample([3.5 / 8.0, 4.5 / 8.0]), [0.0, 0.5, 0.0]);
        // out of range uvs clamp to the border
        assert_eq!(lightmap.sample([2.0, -1.0]), [0.0, 0.0, 0.0]);

        let wrong = Array3::zeros((3, 3, 3));
        assert!(lightmap.blit(&placement, wrong.view()).is_err());
    }

    #[test]
    fn sum_of_maps() {
        let mut a = LightMap::new(2);
        let mut b = LightMap::new(2);
        a.set(0, 0, [1.0, 2.0, 3.0]);
        b.set(0, 0, [1.0, 1.0, 1.0]);
        b.set(1, 1, [4.0, 4.0, 4.0]);
        a.add(&b).unwrap();
        assert_eq!(a.get(0, 0), [2.0, 3.0, 4.0]);
        assert_eq!(a.get(1, 1), [4.0, 4.0, 4.0]);
        assert!(a.add(&LightMap::new(3)).is_err());
    }
}

/// Square RGB irradiance texture indexed `[v, u, channel]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LightMap {
    data: Array3<f32>,
}

/// Tone map an HDR value: `1 - exp(-x * exposure)` followed by gamma correction.
pub fn tone_map(value: f32, exposure: f32) -> f32 {
    let mapped = 1.0 - (-value.max(0.0) * exposure).exp();
    mapped.clamp(0.0, 1.0).powf(1.0 / PREVIEW_GAMMA)
}

impl LightMap {
    pub fn new(size: usize) -> Self {
        Self {
            data: Array3::zeros((size, size, 3)),
        }
    }

    pub fn size(&self) -> usize {
        self.data.dim().0
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn get(&self, u: usize, v: usize) -> [f32; 3] {
        [self.data[[v, u, 0]], self.data[[v, u, 1]], self.data[[v, u, 2]]]
    }

    pub fn set(&mut self, u: usize, v: usize, color: [f32; 3]) {
        for (c, value) in color.into_iter().enumerate() {
            self.data[[v, u, c]] = value;
        }
    }

    /// Nearest texel lookup, clamped to the map.
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 3] {
        let size = self.size();
        if size == 0 {
            return [0.0; 3];
        }
        let texel = |t: f32| ((t * size as f32).floor().max(0.0) as usize).min(size - 1);
        self.get(texel(uv[0]), texel(uv[1]))
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy a frame-sized `[rows, cols, 3]` block into the frame's placement.
    pub fn blit(&mut self, placement: &Placement, region: ArrayView3<f32>) -> Result<()> {
        let rows = placement.v_end - placement.v_start;
        let cols = placement.u_end - placement.u_start;
        if region.dim() != (rows, cols, 3) || placement.v_end > self.size() || placement.u_end > self.size() {
            return Err(BakeError::Render(format!(
                "region {:?} does not fit placement {:?} in a {} texel lightmap",
                region.dim(),
                placement,
                self.size()
            )));
        }
        self.data
            .slice_mut(s![placement.v_start..placement.v_end, placement.u_start..placement.u_end, ..])
            .assign(&region);
        Ok(())
    }

    /// Texel-wise sum with another map of the same size.
    pub fn add(&mut self, other: &LightMap) -> Result<()> {
        if self.data.dim() != other.data.dim() {
            return Err(BakeError::Render(format!(
                "cannot add a {} texel lightmap to a {} texel lightmap",
                other.size(),
                self.size()
            )));
        }
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a += b);
        Ok(())
    }

    /// Write the map as a Radiance HDR image.
    pub fn write_hdr(&self, path: &Path) -> Result<()> {
        let size = self.size() as u32;
        let raw: Vec<f32> = self.data.iter().copied().collect();
        let image = Rgb32FImage::from_raw(size, size, raw)
            .ok_or_else(|| BakeError::Render("lightmap buffer has the wrong length".to_string()))?;
        image.save_with_format(path, ImageFormat::Hdr)?;
        Ok(())
    }

    /// Read a map previously written with [`LightMap::write_hdr`].
    pub fn read_hdr(path: &Path) -> Result<Self> {
        let image = image::open(path)?.into_rgb32f();
        let (width, height) = image.dimensions();
        if width != height {
            return Err(BakeError::InvalidScene(format!(
                "lightmap {} is {}x{}, expected a square image",
                path.display(),
                width,
                height
            )));
        }
        let size = width as usize;
        let data = Array3::from_shape_vec((size, size, 3), image.into_raw())
            .map_err(|err| BakeError::InvalidScene(err.to_string()))?;
        Ok(Self { data })
    }

    /// Tone-mapped 8-bit RGB copy of the map.
    pub fn preview(&self, exposure: f32) -> Vec<u8> {
        self.data
            .iter()
            .map(|&x| (tone_map(x, exposure) * 255.0).round() as u8)
            .collect()
    }

    /// Write the tone-mapped preview as a PNG.
    pub fn write_png(&self, path: &Path, exposure: f32) -> Result<()> {
        let size = self.size() as u32;
        let file = File::create(path)?;
        let encoder = PngEncoder::new_with_quality(
            BufWriter::new(file),
            CompressionType::Default,
            FilterType::Adaptive,
        );
        encoder.write_image(&self.preview(exposure), size, size, ColorType::Rgb8.into())?;
        Ok(())
    }
}
