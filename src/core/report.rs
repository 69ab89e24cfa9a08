use crate::core::coverage::CoveragePolicy;
use crate::domain::model::{BoundaryRing, CoverageVerdict, Device, GeoBoundingBox, Transmitter};
use crate::utils::error::{CoverageError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 單次分析的完整結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub policy: CoveragePolicy,
    pub transmitter: Transmitter,
    pub devices: Vec<Device>,
    pub outside_coverage: Vec<Device>,
    pub verdicts: Vec<CoverageVerdict>,
    /// 未修改的覆蓋網格
    pub raster: String,
    pub overlay: Option<String>,
    pub bounds: GeoBoundingBox,
    pub boundary_rings: Vec<BoundaryRing>,
}

impl AnalysisReport {
    pub fn devices_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "name",
            "latitude",
            "longitude",
            "outside_coverage",
            "reason",
            "pixel_x",
            "pixel_y",
        ])?;

        for verdict in &self.verdicts {
            let (px, py) = verdict
                .pixel
                .map(|p| (p.x.to_string(), p.y.to_string()))
                .unwrap_or_default();
            let reason = serde_json::to_value(verdict.reason)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            writer.write_record([
                verdict.device.name.clone(),
                verdict.device.latitude.to_string(),
                verdict.device.longitude.to_string(),
                verdict.outside_coverage.to_string(),
                reason,
                px,
                py,
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| CoverageError::IoError(e.into_error()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

impl From<&CoverageError> for ErrorBody {
    fn from(e: &CoverageError) -> Self {
        Self {
            error: e.kind().to_string(),
            detail: e.to_string(),
        }
    }
}

/// 請求邊界的回應：完整結果或單一錯誤物件，沒有部分成功
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Success(Box<AnalysisReport>),
    Failure { status: u16, body: ErrorBody },
}

impl AnalysisResponse {
    pub fn failure(error: &CoverageError) -> Self {
        Self::Failure {
            status: error.status_code(),
            body: ErrorBody::from(error),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// 回應本體（失敗時不含狀態碼）
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Success(report) => serde_json::to_string_pretty(report)?,
            Self::Failure { body, .. } => serde_json::to_string_pretty(body)?,
        };
        Ok(json)
    }
}
