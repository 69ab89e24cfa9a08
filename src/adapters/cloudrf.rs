use crate::config::toml_config::{RadioConfig, ServiceConfig};
use crate::core::archive;
use crate::core::kml::parse_lat_lon_box;
use crate::core::raster::CoverageRaster;
use crate::core::{PropagationResult, PropagationService};
use crate::domain::model::{GeoBoundingBox, Transmitter};
use crate::utils::error::{CoverageError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct AreaRequest {
    pub version: String,
    pub site: String,
    pub network: String,
    pub engine: u8,
    pub transmitter: TransmitterParams,
    pub receiver: ReceiverParams,
    pub feeder: FeederParams,
    pub antenna: AntennaParams,
    pub model: ModelParams,
    pub environment: EnvironmentParams,
    pub output: OutputParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransmitterParams {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub frq: f64,
    pub txw: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverParams {
    pub rxh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeederParams {
    pub loss: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AntennaParams {
    pub txg: f64,
    pub bwi: f64,
    pub azm: f64,
    pub tilt: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelParams {
    pub pm: u8,
    pub pe: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentParams {
    pub clm: u8,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputParams {
    pub units: String,
    pub col: String,
    pub out: u8,
    pub rad: f64,
    pub res: f64,
}

/// 供應商回應：影像與邊界可能內嵌，也可能以 URL 提供
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaResponse {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "PNG_WGS84", alias = "png_wgs84", alias = "image_url")]
    pub png_url: Option<String>,
    #[serde(default, alias = "latLonBox", alias = "LatLonBox")]
    pub latlonbox: Option<GeoBoundingBox>,
    /// `[north, east, south, west]`
    #[serde(default)]
    pub bounds: Option<Vec<f64>>,
    #[serde(default, alias = "KMZ")]
    pub kmz: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// CloudRF `/area` API 客戶端
pub struct CloudRfClient {
    client: Client,
    endpoint: Url,
    service: ServiceConfig,
    radio: RadioConfig,
}

impl CloudRfClient {
    pub fn new(service: ServiceConfig, radio: RadioConfig) -> Result<Self> {
        let endpoint =
            Url::parse(&service.endpoint).map_err(|e| CoverageError::InvalidConfigValueError {
                field: "service.endpoint".to_string(),
                value: service.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(service.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            service,
            radio,
        })
    }

    pub fn build_request(&self, transmitter: &Transmitter) -> AreaRequest {
        let radio = &self.radio;
        AreaRequest {
            version: radio.version.clone(),
            site: radio.site.clone(),
            network: radio.network.clone(),
            engine: radio.engine,
            transmitter: TransmitterParams {
                lat: transmitter.latitude,
                lon: transmitter.longitude,
                alt: transmitter.height_m,
                frq: radio.frequency_mhz,
                txw: radio.tx_power_w,
            },
            receiver: ReceiverParams {
                rxh: radio.rx_height_m,
            },
            feeder: FeederParams {
                loss: radio.feeder_loss_db,
            },
            antenna: AntennaParams {
                txg: radio.antenna_gain_dbi,
                bwi: radio.beamwidth_deg,
                azm: radio.azimuth_deg,
                tilt: radio.tilt_deg,
            },
            model: ModelParams {
                pm: radio.propagation_model,
                pe: radio.path_loss_mode,
            },
            environment: EnvironmentParams {
                clm: radio.climate,
                humidity: radio.humidity,
            },
            output: OutputParams {
                units: radio.units.clone(),
                col: radio.colour_key.clone(),
                out: radio.output_mode,
                rad: radio.radius_km,
                res: radio.resolution_m,
            },
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> CoverageError {
        if error.is_timeout() {
            CoverageError::PropagationTimeoutError {
                seconds: self.service.timeout_seconds,
            }
        } else {
            CoverageError::ApiError(error)
        }
    }

    async fn post_area(&self, body: &AreaRequest) -> Result<AreaResponse> {
        let mut request = self.client.post(self.endpoint.clone()).json(body);
        if !self.service.api_key.trim().is_empty() {
            request = request.header("key", self.service.api_key.trim());
        }

        tracing::debug!("Making propagation request to: {}", self.endpoint);
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        tracing::debug!("Propagation response status: {}", status);

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(CoverageError::PropagationStatusError {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: AreaResponse = serde_json::from_str(&text)
            .map_err(|e| CoverageError::payload(format!("response is not valid JSON: {}", e)))?;
        if let Some(error) = parsed.error.as_deref().filter(|e| !e.trim().is_empty()) {
            return Err(CoverageError::payload(format!("provider reported: {}", error)));
        }
        Ok(parsed)
    }

    /// 暫時性錯誤以指數退避重試；4xx 驗證錯誤立即失敗
    async fn post_with_retry(&self, body: &AreaRequest) -> Result<AreaResponse> {
        let mut attempt = 0u32;
        loop {
            match self.post_area(body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.service.retry_attempts => {
                    let delay = self
                        .service
                        .retry_delay_ms
                        .saturating_mul(1u64 << attempt.min(16));
                    attempt += 1;
                    tracing::warn!(
                        "🔁 Propagation attempt {} failed ({}), retrying in {}ms",
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>> {
        let url = self.endpoint.join(reference).map_err(|e| {
            CoverageError::payload(format!("invalid resource URL '{}': {}", reference, e))
        })?;

        tracing::debug!("Fetching provider resource: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoverageError::PropagationStatusError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }

    async fn resolve_image(&self, response: &AreaResponse) -> Result<Vec<u8>> {
        if let Some(encoded) = response.image.as_deref().filter(|s| !s.trim().is_empty()) {
            return decode_inline_image(encoded);
        }
        if let Some(url) = response.png_url.as_deref() {
            return self.fetch_bytes(url).await;
        }
        Err(CoverageError::payload(
            "response carries neither an inline image nor an image URL",
        ))
    }

    async fn resolve_bounds(&self, response: &AreaResponse, workdir: &Path) -> Result<GeoBoundingBox> {
        if let Some(bounds) = response.latlonbox {
            return Ok(bounds);
        }
        if let Some(values) = &response.bounds {
            return bounds_from_array(values);
        }
        if let Some(url) = response.kmz.as_deref() {
            let bytes = self.fetch_bytes(url).await?;
            return bounds_from_archive(&bytes, workdir).await;
        }
        Err(CoverageError::payload(
            "response carries no bounding box (latlonbox, bounds or kmz)",
        ))
    }
}

#[async_trait]
impl PropagationService for CloudRfClient {
    async fn simulate(&self, transmitter: &Transmitter, workdir: &Path) -> Result<PropagationResult> {
        tracing::info!(
            "📡 Requesting coverage for '{}' at ({}, {}), {}m",
            transmitter.name,
            transmitter.latitude,
            transmitter.longitude,
            transmitter.height_m
        );

        let body = self.build_request(transmitter);
        let response = self.post_with_retry(&body).await?;

        let image_bytes = self.resolve_image(&response).await?;
        tokio::fs::write(workdir.join("signal.png"), &image_bytes).await?;
        let bounds = self.resolve_bounds(&response, workdir).await?;
        let raster = CoverageRaster::from_bytes(&image_bytes)
            .map_err(|e| CoverageError::payload(format!("raster is not a decodable image: {}", e)))?;

        tracing::info!(
            "🗺️ Received {}x{} raster covering N{} S{} E{} W{}",
            raster.width(),
            raster.height(),
            bounds.north,
            bounds.south,
            bounds.east,
            bounds.west
        );
        if !bounds.contains(transmitter.latitude, transmitter.longitude) {
            tracing::warn!(
                "⚠️ Transmitter '{}' lies outside the returned raster bounds",
                transmitter.name
            );
        }

        Ok(PropagationResult {
            raster,
            bounds,
            image_bytes,
        })
    }
}

/// 接受純 base64 或 `data:image/png;base64,...`
pub fn decode_inline_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.find("base64,") {
        Some(idx) if encoded.starts_with("data:") => &encoded[idx + "base64,".len()..],
        _ => encoded,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| CoverageError::payload(format!("inline image is not valid base64: {}", e)))
}

pub fn bounds_from_array(values: &[f64]) -> Result<GeoBoundingBox> {
    match values {
        [north, east, south, west] => Ok(GeoBoundingBox::new(*north, *south, *east, *west)),
        _ => Err(CoverageError::payload(format!(
            "bounds must have 4 values [north, east, south, west], got {}",
            values.len()
        ))),
    }
}

/// 供應商的 KMZ 內含一份描述 LatLonBox 的 KML
pub async fn bounds_from_archive(bytes: &[u8], workdir: &Path) -> Result<GeoBoundingBox> {
    tokio::fs::write(workdir.join("bounds.kmz"), bytes).await?;
    let kml_path = archive::extract_first(bytes, &workdir.join("bounds"), "kml")
        .map_err(|e| CoverageError::payload(format!("boundary archive unusable: {}", e)))?;
    let content = tokio::fs::read_to_string(kml_path).await?;
    parse_lat_lon_box(&content)
        .map_err(|e| CoverageError::payload(format!("boundary descriptor unusable: {}", e)))
}
