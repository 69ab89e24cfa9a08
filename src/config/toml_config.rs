use crate::core::coverage::{CoveragePolicy, DEFAULT_NEIGHBORHOOD_RADIUS};
use crate::core::height::DEFAULT_MAST_HEIGHT_M;
use crate::core::kml::PlacemarkVocabulary;
use crate::core::ConfigProvider;
use crate::utils::error::{CoverageError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const OUTPUT_FORMATS: &[&str] = &["json", "csv"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub service: ServiceConfig,
    pub radio: RadioConfig,
    pub classification: ClassificationConfig,
    pub vocabulary: PlacemarkVocabulary,
    pub output: OutputConfig,
}

/// 傳播服務連線設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cloudrf.com/area".to_string(),
            api_key: String::new(),
            timeout_seconds: 60,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

/// 本部署固定的無線電參數，不由輸入推導
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub version: String,
    pub site: String,
    pub network: String,
    pub engine: u8,
    pub frequency_mhz: f64,
    pub tx_power_w: f64,
    pub rx_height_m: f64,
    pub feeder_loss_db: f64,
    pub antenna_gain_dbi: f64,
    pub beamwidth_deg: f64,
    pub azimuth_deg: f64,
    pub tilt_deg: f64,
    pub propagation_model: u8,
    pub path_loss_mode: u8,
    pub climate: u8,
    pub humidity: f64,
    pub units: String,
    pub colour_key: String,
    pub output_mode: u8,
    pub radius_km: f64,
    pub resolution_m: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            version: "CloudRF-API-v3.23".to_string(),
            site: "Repetidora".to_string(),
            network: "PRIVATE".to_string(),
            engine: 1,
            frequency_mhz: 915.0,
            tx_power_w: 20.0,
            rx_height_m: 1.5,
            feeder_loss_db: 0.0,
            antenna_gain_dbi: 2.0,
            beamwidth_deg: 360.0,
            azimuth_deg: 0.0,
            tilt_deg: 0.0,
            propagation_model: 2,
            path_loss_mode: 1,
            climate: 1,
            humidity: 50.0,
            units: "m".to_string(),
            colour_key: "IRRICONTRO.dBm".to_string(),
            output_mode: 1,
            radius_km: 5.0,
            resolution_m: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub policy: CoveragePolicy,
    pub neighborhood_radius: u32,
    pub default_mast_height_m: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            policy: CoveragePolicy::default(),
            neighborhood_radius: DEFAULT_NEIGHBORHOOD_RADIUS,
            default_mast_height_m: DEFAULT_MAST_HEIGHT_M,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_path: String,
    pub public_url_prefix: String,
    pub workspace_root: Option<PathBuf>,
    pub formats: Vec<String>,
    pub render_overlay: bool,
    pub bundle: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            public_url_prefix: "/images".to_string(),
            workspace_root: None,
            formats: OUTPUT_FORMATS.iter().map(|f| f.to_string()).collect(),
            render_overlay: true,
            bundle: false,
        }
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CoverageError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| CoverageError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CLOUDRF_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| CoverageError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        use crate::utils::validation::*;

        validate_url("service.endpoint", &self.service.endpoint)?;
        validate_range("service.timeout_seconds", self.service.timeout_seconds, 1, 600)?;
        validate_range("service.retry_attempts", self.service.retry_attempts, 0, 10)?;

        validate_positive_f64("radio.frequency_mhz", self.radio.frequency_mhz)?;
        validate_positive_f64("radio.tx_power_w", self.radio.tx_power_w)?;
        validate_positive_f64("radio.radius_km", self.radio.radius_km)?;
        validate_range("radio.humidity", self.radio.humidity, 0.0, 100.0)?;

        validate_positive_f64(
            "classification.default_mast_height_m",
            self.classification.default_mast_height_m,
        )?;
        validate_range(
            "classification.neighborhood_radius",
            self.classification.neighborhood_radius,
            0,
            64,
        )?;

        if self.vocabulary.transmitter.iter().all(|w| w.trim().is_empty()) {
            return Err(CoverageError::MissingConfigError {
                field: "vocabulary.transmitter".to_string(),
            });
        }

        validate_path("output.output_path", &self.output.output_path)?;
        for format in &self.output.formats {
            if !OUTPUT_FORMATS.contains(&format.as_str()) {
                return Err(CoverageError::InvalidConfigValueError {
                    field: "output.formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        OUTPUT_FORMATS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        let key = self.service.api_key.trim();
        !key.is_empty() && !key.starts_with("${")
    }
}

impl ConfigProvider for TomlConfig {
    fn output_path(&self) -> &str {
        &self.output.output_path
    }

    fn public_url_prefix(&self) -> &str {
        &self.output.public_url_prefix
    }

    fn workspace_root(&self) -> Option<&Path> {
        self.output.workspace_root.as_deref()
    }

    fn output_formats(&self) -> &[String] {
        &self.output.formats
    }

    fn render_overlay(&self) -> bool {
        self.output.render_overlay
    }

    fn bundle_artifacts(&self) -> bool {
        self.output.bundle
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
