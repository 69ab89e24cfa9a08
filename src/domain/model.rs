use serde::{Deserialize, Serialize};

/// 發射端（天線、中繼台、塔、倉庫、筒倉…）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmitter {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 離地高度 (m)，恆為正值
    pub height_m: f64,
}

/// 田間設備（中心樞軸灌溉機）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// 僅供顯示用的量測圓環，不參與覆蓋判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryRing {
    pub name: String,
    /// (latitude, longitude)
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl GeoBoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    pub fn width_deg(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude <= self.north
            && latitude >= self.south
            && longitude <= self.east
            && longitude >= self.west
    }
}

/// 向量文件解析結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub transmitter: Transmitter,
    pub devices: Vec<Device>,
    pub boundary_rings: Vec<BoundaryRing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    /// 位置落在網格範圍外
    OutOfBounds,
    /// 取樣像素判定為無訊號
    NoSignal,
    SignalPresent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageVerdict {
    pub device: Device,
    pub outside_coverage: bool,
    pub pixel: Option<PixelCoord>,
    pub reason: VerdictReason,
}
