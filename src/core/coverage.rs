use crate::core::georef::Georeferencer;
use crate::core::raster::CoverageRaster;
use crate::domain::model::{CoverageVerdict, Device, PixelCoord, VerdictReason};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NEIGHBORHOOD_RADIUS: u32 = 3;

/// 像素顏色判定策略；兩者不等價，每個部署只能選一種
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// 淺色像素（R > 200 且 G > 200）= 無訊號，只看設備所在的單一像素
    #[default]
    WeakSignal,
    /// 綠色主導像素（G > R、G > B 且 G > 100）= 有訊號；鄰域內全無才算覆蓋外
    StrongSignal,
}

impl CoveragePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeakSignal => "weak_signal",
            Self::StrongSignal => "strong_signal",
        }
    }
}

impl std::str::FromStr for CoveragePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "weak_signal" | "weak" => Ok(Self::WeakSignal),
            "strong_signal" | "strong" => Ok(Self::StrongSignal),
            other => Err(format!(
                "unknown coverage policy '{}', expected weak_signal or strong_signal",
                other
            )),
        }
    }
}

pub fn is_weak_signal_pixel([r, g, _]: [u8; 3]) -> bool {
    r > 200 && g > 200
}

pub fn is_strong_signal_pixel([r, g, b]: [u8; 3]) -> bool {
    g > r && g > b && g > 100
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageClassifier {
    policy: CoveragePolicy,
    radius: u32,
}

impl CoverageClassifier {
    pub fn new(policy: CoveragePolicy, radius: u32) -> Self {
        Self { policy, radius }
    }

    pub fn policy(&self) -> CoveragePolicy {
        self.policy
    }

    pub fn classify(
        &self,
        device: &Device,
        raster: &CoverageRaster,
        georef: &Georeferencer,
    ) -> CoverageVerdict {
        let Some(pixel) = georef.pixel_in_bounds(device.latitude, device.longitude) else {
            return CoverageVerdict {
                device: device.clone(),
                outside_coverage: true,
                pixel: None,
                reason: VerdictReason::OutOfBounds,
            };
        };

        let has_signal = match self.policy {
            CoveragePolicy::WeakSignal => raster
                .pixel(pixel.x, pixel.y)
                .map(|rgb| !is_weak_signal_pixel(rgb))
                .unwrap_or(false),
            CoveragePolicy::StrongSignal => self
                .neighborhood(pixel, raster)
                .any(|(x, y)| raster.pixel(x, y).is_some_and(is_strong_signal_pixel)),
        };

        CoverageVerdict {
            device: device.clone(),
            outside_coverage: !has_signal,
            pixel: Some(pixel),
            reason: if has_signal {
                VerdictReason::SignalPresent
            } else {
                VerdictReason::NoSignal
            },
        }
    }

    pub fn classify_all(
        &self,
        devices: &[Device],
        raster: &CoverageRaster,
        georef: &Georeferencer,
    ) -> Vec<CoverageVerdict> {
        devices
            .iter()
            .map(|device| {
                let verdict = self.classify(device, raster, georef);
                tracing::debug!(
                    "Device '{}' -> {:?} at {:?}",
                    device.name,
                    verdict.reason,
                    verdict.pixel
                );
                verdict
            })
            .collect()
    }

    /// 以 `center` 為中心、半徑 `radius` 的正方形，裁切到網格範圍內
    fn neighborhood(
        &self,
        center: PixelCoord,
        raster: &CoverageRaster,
    ) -> impl Iterator<Item = (u32, u32)> {
        let x0 = center.x.saturating_sub(self.radius);
        let y0 = center.y.saturating_sub(self.radius);
        let x1 = center
            .x
            .saturating_add(self.radius)
            .min(raster.width().saturating_sub(1));
        let y1 = center
            .y
            .saturating_add(self.radius)
            .min(raster.height().saturating_sub(1));
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (x, y)))
    }
}

impl Default for CoverageClassifier {
    fn default() -> Self {
        Self::new(CoveragePolicy::default(), DEFAULT_NEIGHBORHOOD_RADIUS)
    }
}
