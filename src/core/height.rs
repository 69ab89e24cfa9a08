use regex::Regex;
use std::sync::LazyLock;

/// 未標示高度時使用的預設桅杆高度 (m)
pub const DEFAULT_MAST_HEIGHT_M: f64 = 10.0;

// 數字 + 可選空白 + m 開頭的單位，例如 "Torre 20m"、"Silo 12,5 m"、"Torre 20 metros"
static HEIGHT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s?m").expect("height pattern is a valid regex")
});

/// 從發射端名稱推算桅杆高度
#[derive(Debug, Clone, Copy)]
pub struct HeightInference {
    default_height_m: f64,
}

impl HeightInference {
    pub fn new(default_height_m: f64) -> Self {
        Self { default_height_m }
    }

    /// 名稱中找不到正值高度時回傳預設值
    pub fn infer(&self, name: &str) -> f64 {
        self.from_name(name).unwrap_or(self.default_height_m)
    }

    pub fn from_name(&self, name: &str) -> Option<f64> {
        HEIGHT_PATTERN
            .captures_iter(name)
            .filter_map(|caps| caps[1].replace(',', ".").parse::<f64>().ok())
            .find(|h| *h > 0.0 && h.is_finite())
    }
}

impl Default for HeightInference {
    fn default() -> Self {
        Self::new(DEFAULT_MAST_HEIGHT_M)
    }
}
