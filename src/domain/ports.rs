use crate::core::raster::CoverageRaster;
use crate::domain::model::{GeoBoundingBox, Transmitter};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 覆蓋分析在執行期需要的設定
pub trait ConfigProvider: Send + Sync {
    fn output_path(&self) -> &str;
    fn public_url_prefix(&self) -> &str;
    fn workspace_root(&self) -> Option<&Path>;
    fn output_formats(&self) -> &[String];
    fn render_overlay(&self) -> bool;
    fn bundle_artifacts(&self) -> bool;
}

/// 傳播模擬服務回傳的網格與其地理範圍
#[derive(Debug, Clone)]
pub struct PropagationResult {
    pub raster: CoverageRaster,
    pub bounds: GeoBoundingBox,
    /// 供應商原始影像位元組，原封不動發佈
    pub image_bytes: Vec<u8>,
}

/// 外部無線電傳播服務：天線參數進，覆蓋網格加邊界出
#[async_trait]
pub trait PropagationService: Send + Sync {
    async fn simulate(&self, transmitter: &Transmitter, workdir: &Path)
        -> Result<PropagationResult>;
}
