use crate::utils::error::Result;
use image::{Rgb, RgbImage};

/// 傳播服務產生的覆蓋網格；建立後不可變
#[derive(Debug, Clone)]
pub struct CoverageRaster {
    image: RgbImage,
}

impl CoverageRaster {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// 解碼 PNG（或其他 image 支援的格式），透明度直接捨棄
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::new(decoded.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x < self.width() && y < self.height() {
            let Rgb(rgb) = *self.image.get_pixel(x, y);
            Some(rgb)
        } else {
            None
        }
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }
}
