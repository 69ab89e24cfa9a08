use crate::domain::model::{GeoBoundingBox, PixelCoord};
use crate::utils::error::{CoverageError, Result};

/// 未夾限的像素座標（浮點），可能落在網格外
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPosition {
    pub x: f64,
    pub y: f64,
}

/// 地理座標與網格像素之間的等距圓柱（線性）轉換，不做曲率修正。
#[derive(Debug, Clone, Copy)]
pub struct Georeferencer {
    bounds: GeoBoundingBox,
    width: u32,
    height: u32,
}

impl Georeferencer {
    /// `north == south`、`east == west` 或邊界反轉時無法定義轉換
    pub fn new(bounds: GeoBoundingBox, width: u32, height: u32) -> Result<Self> {
        let edges = [bounds.north, bounds.south, bounds.east, bounds.west];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(CoverageError::georeference(format!(
                "bounding box has non-finite edges: {:?}",
                bounds
            )));
        }
        if bounds.north <= bounds.south {
            return Err(CoverageError::georeference(format!(
                "north ({}) must be greater than south ({})",
                bounds.north, bounds.south
            )));
        }
        if bounds.east <= bounds.west {
            return Err(CoverageError::georeference(format!(
                "east ({}) must be greater than west ({})",
                bounds.east, bounds.west
            )));
        }
        if width == 0 || height == 0 {
            return Err(CoverageError::georeference(format!(
                "raster has no pixels ({}x{})",
                width, height
            )));
        }

        Ok(Self {
            bounds,
            width,
            height,
        })
    }

    pub fn to_pixel(&self, latitude: f64, longitude: f64) -> PixelPosition {
        let b = &self.bounds;
        PixelPosition {
            x: (longitude - b.west) / b.width_deg() * self.width as f64,
            y: (b.north - latitude) / b.height_deg() * self.height as f64,
        }
    }

    /// 落在 `[0, width) × [0, height)` 內才回傳像素，否則 `None`
    pub fn pixel_in_bounds(&self, latitude: f64, longitude: f64) -> Option<PixelCoord> {
        let p = self.to_pixel(latitude, longitude);
        let inside = p.x >= 0.0
            && p.x < self.width as f64
            && p.y >= 0.0
            && p.y < self.height as f64;
        inside.then(|| PixelCoord {
            x: p.x.floor() as u32,
            y: p.y.floor() as u32,
        })
    }

    /// 疊圖用：夾限到 `[0, width-1] × [0, height-1]`
    pub fn pixel_clamped(&self, latitude: f64, longitude: f64) -> PixelCoord {
        let p = self.to_pixel(latitude, longitude);
        PixelCoord {
            x: p.x.floor().clamp(0.0, (self.width - 1) as f64) as u32,
            y: p.y.floor().clamp(0.0, (self.height - 1) as f64) as u32,
        }
    }

    /// 反向轉換：像素 → (latitude, longitude)
    pub fn to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let b = &self.bounds;
        let longitude = b.west + x / self.width as f64 * b.width_deg();
        let latitude = b.north - y / self.height as f64 * b.height_deg();
        (latitude, longitude)
    }

    /// 單一像素對應的地理尺寸 (度)：(緯度方向, 經度方向)
    pub fn pixel_size_deg(&self) -> (f64, f64) {
        (
            self.bounds.height_deg() / self.height as f64,
            self.bounds.width_deg() / self.width as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm_bounds() -> GeoBoundingBox {
        GeoBoundingBox::new(-14.9, -15.2, -47.4, -47.7)
    }

    #[test]
    fn test_device_maps_to_expected_pixel() {
        let geo = Georeferencer::new(farm_bounds(), 100, 100).unwrap();
        let p = geo.to_pixel(-15.1, -47.6);

        // x = 0.1 / 0.3 * 100, y = 0.2 / 0.3 * 100
        assert!((p.x - 100.0 / 3.0).abs() < 1e-6);
        assert!((p.y - 200.0 / 3.0).abs() < 1e-6);
        assert_eq!(
            geo.pixel_in_bounds(-15.1, -47.6),
            Some(PixelCoord { x: 33, y: 66 })
        );
    }

    #[test]
    fn test_corners_map_to_raster_corners() {
        let b = farm_bounds();
        let geo = Georeferencer::new(b, 100, 80).unwrap();

        assert_eq!(geo.pixel_clamped(b.north, b.west), PixelCoord { x: 0, y: 0 });
        assert_eq!(geo.pixel_clamped(b.north, b.east), PixelCoord { x: 99, y: 0 });
        assert_eq!(geo.pixel_clamped(b.south, b.west), PixelCoord { x: 0, y: 79 });
        assert_eq!(geo.pixel_clamped(b.south, b.east), PixelCoord { x: 99, y: 79 });

        let far = geo.to_pixel(b.south, b.east);
        assert!((far.x - 100.0).abs() < 1e-6);
        assert!((far.y - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_within_one_pixel() {
        let geo = Georeferencer::new(farm_bounds(), 640, 480).unwrap();
        let (lat_step, lon_step) = geo.pixel_size_deg();

        for &(lat, lon) in &[(-15.0, -47.5), (-15.19, -47.69), (-14.91, -47.41)] {
            let p = geo.to_pixel(lat, lon);
            let (back_lat, back_lon) = geo.to_geo(p.x, p.y);
            assert!((back_lat - lat).abs() <= lat_step);
            assert!((back_lon - lon).abs() <= lon_step);

            let px = geo.pixel_in_bounds(lat, lon).unwrap();
            let (cell_lat, cell_lon) = geo.to_geo(px.x as f64, px.y as f64);
            assert!((cell_lat - lat).abs() <= lat_step);
            assert!((cell_lon - lon).abs() <= lon_step);
        }
    }

    #[test]
    fn test_out_of_bounds_is_distinguishable() {
        let geo = Georeferencer::new(farm_bounds(), 100, 100).unwrap();
        assert_eq!(geo.pixel_in_bounds(-15.3, -47.6), None);
        assert_eq!(geo.pixel_in_bounds(-15.0, -47.8), None);
        // 東緣本身已在網格外
        assert_eq!(geo.pixel_in_bounds(-15.0, -47.4), None);
        assert_eq!(geo.pixel_clamped(-15.3, -47.8), PixelCoord { x: 0, y: 99 });
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        let flat = GeoBoundingBox::new(-15.0, -15.0, -47.4, -47.7);
        let thin = GeoBoundingBox::new(-14.9, -15.2, -47.5, -47.5);
        let inverted = GeoBoundingBox::new(-15.2, -14.9, -47.4, -47.7);

        for b in [flat, thin, inverted] {
            let err = Georeferencer::new(b, 100, 100).unwrap_err();
            assert!(matches!(err, CoverageError::GeoreferenceError { .. }));
        }
        assert!(Georeferencer::new(farm_bounds(), 0, 10).is_err());
    }
}
