use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Vector document parse error: {message}")]
    ParseError { message: String },

    #[error("Georeference error: {message}")]
    GeoreferenceError { message: String },

    #[error("Propagation service returned status {status}: {body}")]
    PropagationStatusError { status: u16, body: String },

    #[error("Propagation service timed out after {seconds}s")]
    PropagationTimeoutError { seconds: u64 },

    #[error("Malformed propagation service payload: {message}")]
    PropagationPayloadError { message: String },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Raster image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Georeference,
    Upstream,
    Storage,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CoverageError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn georeference(message: impl Into<String>) -> Self {
        Self::GeoreferenceError {
            message: message.into(),
        }
    }

    pub fn payload(message: impl Into<String>) -> Self {
        Self::PropagationPayloadError {
            message: message.into(),
        }
    }

    /// 機器可讀的錯誤種類，用於結構化失敗回應
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::GeoreferenceError { .. } => "georeference_error",
            Self::PropagationStatusError { .. }
            | Self::PropagationTimeoutError { .. }
            | Self::PropagationPayloadError { .. }
            | Self::ApiError(_) => "propagation_service_error",
            Self::ZipError(_) | Self::IoError(_) => "io_error",
            Self::ImageError(_) => "raster_error",
            Self::CsvError(_) | Self::SerializationError(_) => "serialization_error",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "config_error",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ParseError { .. } => ErrorCategory::Input,
            Self::GeoreferenceError { .. } => ErrorCategory::Georeference,
            Self::PropagationStatusError { .. }
            | Self::PropagationTimeoutError { .. }
            | Self::PropagationPayloadError { .. }
            | Self::ApiError(_) => ErrorCategory::Upstream,
            Self::ZipError(_) | Self::IoError(_) => ErrorCategory::Storage,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::ImageError(_) | Self::CsvError(_) | Self::SerializationError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Georeference => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    /// 對應的 HTTP 狀態碼：輸入錯誤 4xx，上游錯誤 502，其餘 500
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Input => 400,
            ErrorCategory::Upstream | ErrorCategory::Georeference => 502,
            _ => 500,
        }
    }

    /// 暫時性錯誤才值得重試；供應商回報的 4xx 驗證錯誤不重試
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PropagationStatusError { status, .. } => *status == 429 || *status >= 500,
            Self::PropagationTimeoutError { .. } => true,
            Self::ApiError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => {
                "Check that the KMZ contains a .kml document with a transmitter placemark (antenna, tower, silo, ...)"
            }
            Self::GeoreferenceError { .. } => {
                "The provider returned a degenerate bounding box; retry the simulation or check the transmitter position"
            }
            Self::PropagationStatusError { status, .. } if *status < 500 => {
                "Verify the API key and radio parameters in the [service] / [radio] configuration"
            }
            Self::PropagationStatusError { .. }
            | Self::PropagationTimeoutError { .. }
            | Self::ApiError(_) => "The propagation service is unavailable; try again later or raise service.timeout_seconds",
            Self::PropagationPayloadError { .. } => {
                "The provider response shape changed; check the service version setting"
            }
            Self::ZipError(_) => "Make sure the uploaded file is a valid KMZ (zip) archive",
            Self::IoError(_) => "Check file permissions and free disk space for the output path",
            Self::ImageError(_) => "The coverage raster could not be decoded as PNG",
            Self::CsvError(_) | Self::SerializationError(_) => {
                "Report generation failed; re-run with --verbose for details"
            }
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "Fix the configuration file and try again",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("Invalid input: {}", self),
            ErrorCategory::Upstream => format!("Coverage simulation failed: {}", self),
            ErrorCategory::Georeference => format!("Coverage raster unusable: {}", self),
            ErrorCategory::Storage => format!("File handling failed: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Internal => format!("Internal error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_split_input_and_upstream() {
        assert_eq!(CoverageError::parse("no transmitter").status_code(), 400);
        assert_eq!(
            CoverageError::PropagationStatusError {
                status: 401,
                body: "bad key".to_string()
            }
            .status_code(),
            502
        );
        assert_eq!(
            CoverageError::IoError(std::io::Error::other("disk")).status_code(),
            500
        );
    }

    #[test]
    fn test_retry_only_transient_upstream_failures() {
        let validation = CoverageError::PropagationStatusError {
            status: 422,
            body: "invalid lat".to_string(),
        };
        let outage = CoverageError::PropagationStatusError {
            status: 503,
            body: String::new(),
        };
        assert!(!validation.is_retryable());
        assert!(outage.is_retryable());
        assert!(CoverageError::PropagationTimeoutError { seconds: 5 }.is_retryable());
        assert!(!CoverageError::parse("x").is_retryable());
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(CoverageError::parse("x").kind(), "parse_error");
        assert_eq!(CoverageError::georeference("x").kind(), "georeference_error");
        assert_eq!(
            CoverageError::PropagationTimeoutError { seconds: 1 }.kind(),
            "propagation_service_error"
        );
    }
}
