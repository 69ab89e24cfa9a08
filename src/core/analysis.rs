use crate::config::toml_config::TomlConfig;
use crate::core::archive;
use crate::core::coverage::CoverageClassifier;
use crate::core::georef::Georeferencer;
use crate::core::height::HeightInference;
use crate::core::kml::KmlParser;
use crate::core::overlay::{encode_png, render_overlay};
use crate::core::report::{AnalysisReport, AnalysisResponse};
use crate::core::workspace::AnalysisWorkspace;
use crate::core::{ConfigProvider, ParsedDocument, PropagationService, Storage};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::io::Write;
use std::path::Path;
use tracing::Instrument;
use uuid::Uuid;
use zip::write::{FileOptions, ZipWriter};

/// 覆蓋分析引擎：KMZ → 解析 → 傳播模擬 → 地理對位 → 分類 → 發佈
pub struct CoverageAnalyzer<P: PropagationService, S: Storage, C: ConfigProvider> {
    service: P,
    storage: S,
    config: C,
    parser: KmlParser,
    classifier: CoverageClassifier,
    monitor: SystemMonitor,
}

/// 依設定的詞彙與預設高度建立解析器
pub fn parser_from_config(config: &TomlConfig) -> KmlParser {
    KmlParser::new(
        config.vocabulary.clone(),
        HeightInference::new(config.classification.default_mast_height_m),
    )
}

/// 只解析，不呼叫傳播服務（乾跑用）
pub fn inspect(
    parser: &KmlParser,
    workspace_root: Option<&Path>,
    archive_bytes: &[u8],
) -> Result<ParsedDocument> {
    let workspace = AnalysisWorkspace::create(workspace_root)?;
    let content = archive::read_vector_document(archive_bytes, workspace.path())?;
    parser.parse(&content)
}

impl<P: PropagationService, S: Storage> CoverageAnalyzer<P, S, TomlConfig> {
    pub fn from_config(service: P, storage: S, config: TomlConfig) -> Self {
        let parser = parser_from_config(&config);
        let classifier = CoverageClassifier::new(
            config.classification.policy,
            config.classification.neighborhood_radius,
        );
        Self::new(service, storage, config, parser, classifier)
    }
}

impl<P: PropagationService, S: Storage, C: ConfigProvider> CoverageAnalyzer<P, S, C> {
    pub fn new(
        service: P,
        storage: S,
        config: C,
        parser: KmlParser,
        classifier: CoverageClassifier,
    ) -> Self {
        Self {
            service,
            storage,
            config,
            parser,
            classifier,
            monitor: SystemMonitor::new(false),
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = SystemMonitor::new(enabled);
        self
    }

    /// 請求邊界：任何錯誤都轉成結構化失敗回應
    pub async fn respond(&self, archive_bytes: &[u8], source: &str) -> AnalysisResponse {
        match self.analyze(archive_bytes, source).await {
            Ok(report) => AnalysisResponse::Success(Box::new(report)),
            Err(e) => {
                tracing::error!(
                    "❌ Analysis of '{}' failed: {} (Category: {:?}, Severity: {:?})",
                    source,
                    e,
                    e.category(),
                    e.severity()
                );
                AnalysisResponse::failure(&e)
            }
        }
    }

    pub async fn analyze(&self, archive_bytes: &[u8], source: &str) -> Result<AnalysisReport> {
        // 工作目錄在回應產生後隨 drop 釋放
        let workspace = AnalysisWorkspace::create(self.config.workspace_root())?;
        let span = tracing::info_span!("analysis", id = %workspace.id());

        self.run(&workspace, archive_bytes, source)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        workspace: &AnalysisWorkspace,
        archive_bytes: &[u8],
        source: &str,
    ) -> Result<AnalysisReport> {
        tracing::info!("🚀 Starting coverage analysis of {}", source);

        // Extract
        let content = archive::read_vector_document(archive_bytes, workspace.path())?;
        let parsed = self.parser.parse(&content)?;
        tracing::info!(
            "📋 Transmitter '{}' ({}m), {} devices, {} rings",
            parsed.transmitter.name,
            parsed.transmitter.height_m,
            parsed.devices.len(),
            parsed.boundary_rings.len()
        );
        self.monitor.log_stats("Extract");

        // Propagation
        let propagation = self
            .service
            .simulate(&parsed.transmitter, workspace.path())
            .await?;
        self.monitor.log_stats("Propagation");

        // Classification
        let raster = &propagation.raster;
        let georef = Georeferencer::new(propagation.bounds, raster.width(), raster.height())?;
        let verdicts = self.classifier.classify_all(&parsed.devices, raster, &georef);
        let outside_coverage: Vec<_> = verdicts
            .iter()
            .filter(|v| v.outside_coverage)
            .map(|v| v.device.clone())
            .collect();
        tracing::info!(
            "📊 {} of {} devices outside coverage ({} policy)",
            outside_coverage.len(),
            verdicts.len(),
            self.classifier.policy().as_str()
        );
        self.monitor.log_stats("Classification");

        // Publish
        let id = workspace.id();
        let mut artifacts: Vec<(&'static str, Vec<u8>)> =
            vec![("coverage.png", propagation.image_bytes)];

        let overlay = if self.config.render_overlay() {
            let image = render_overlay(
                raster,
                &georef,
                &parsed.transmitter,
                &verdicts,
                &parsed.boundary_rings,
            );
            artifacts.push(("overlay.png", encode_png(&image)?));
            Some(self.public_url(id, "overlay.png"))
        } else {
            None
        };

        let report = AnalysisReport {
            analysis_id: id,
            generated_at: chrono::Utc::now(),
            source: source.to_string(),
            policy: self.classifier.policy(),
            transmitter: parsed.transmitter,
            devices: parsed.devices,
            outside_coverage,
            verdicts,
            raster: self.public_url(id, "coverage.png"),
            overlay,
            bounds: propagation.bounds,
            boundary_rings: parsed.boundary_rings,
        };

        self.publish(&report, artifacts).await?;
        self.monitor.log_stats("Publish");
        self.monitor.log_final_stats();

        tracing::info!("✅ Coverage analysis completed");
        Ok(report)
    }

    fn public_url(&self, id: Uuid, file: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_url_prefix().trim_end_matches('/'),
            id,
            file
        )
    }

    async fn publish(
        &self,
        report: &AnalysisReport,
        mut artifacts: Vec<(&'static str, Vec<u8>)>,
    ) -> Result<()> {
        let formats = self.config.output_formats();
        if formats.iter().any(|f| f == "json") {
            artifacts.push(("report.json", serde_json::to_vec_pretty(report)?));
        }
        if formats.iter().any(|f| f == "csv") {
            artifacts.push(("devices.csv", report.devices_csv()?));
        }

        if self.config.bundle_artifacts() {
            let bundle = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &artifacts {
                    zip.start_file::<_, ()>(*name, FileOptions::default())?;
                    zip.write_all(data)?;
                }
                zip.finish()?.into_inner()
            };
            artifacts.push(("analysis.zip", bundle));
        }

        tracing::debug!(
            "Writing {} artifacts to storage under {}",
            artifacts.len(),
            report.analysis_id
        );
        for (name, data) in &artifacts {
            let path = format!("{}/{}", report.analysis_id, name);
            self.storage.write_file(&path, data).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coverage::CoveragePolicy;
    use crate::core::raster::CoverageRaster;
    use crate::core::PropagationResult;
    use crate::domain::model::{GeoBoundingBox, Transmitter, VerdictReason};
    use crate::utils::error::CoverageError;
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn file_names(&self) -> Vec<String> {
            let files = self.files.lock().await;
            let mut names: Vec<String> = files.keys().cloned().collect();
            names.sort();
            names
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                CoverageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// 回傳固定網格的假傳播服務
    struct FixedPropagation {
        bounds: GeoBoundingBox,
        fill: Rgb<u8>,
        calls: Arc<Mutex<Vec<Transmitter>>>,
    }

    #[async_trait::async_trait]
    impl PropagationService for FixedPropagation {
        async fn simulate(
            &self,
            transmitter: &Transmitter,
            workdir: &Path,
        ) -> Result<PropagationResult> {
            assert!(workdir.exists());
            self.calls.lock().await.push(transmitter.clone());
            let image = RgbImage::from_pixel(100, 100, self.fill);
            let image_bytes = encode_png(&image)?;
            Ok(PropagationResult {
                raster: CoverageRaster::new(image),
                bounds: self.bounds,
                image_bytes,
            })
        }
    }

    struct FailingPropagation;

    #[async_trait::async_trait]
    impl PropagationService for FailingPropagation {
        async fn simulate(&self, _: &Transmitter, _: &Path) -> Result<PropagationResult> {
            Err(CoverageError::PropagationStatusError {
                status: 503,
                body: "maintenance".to_string(),
            })
        }
    }

    fn farm_kml() -> String {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
  <Placemark><name>Tower 20m</name><Point><coordinates>-47.5,-15.0,0</coordinates></Point></Placemark>
  <Placemark><name>Pivot 1</name><Point><coordinates>-47.6,-15.1,0</coordinates></Point></Placemark>
  <Placemark><name>Pivot 2</name><Point><coordinates>-48.5,-15.1,0</coordinates></Point></Placemark>
</Document></kml>"#
            .to_string()
    }

    fn config(workspace: &Path) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.output.workspace_root = Some(workspace.to_path_buf());
        config.output.bundle = true;
        config
    }

    fn fixed(fill: Rgb<u8>) -> FixedPropagation {
        FixedPropagation {
            bounds: GeoBoundingBox::new(-14.9, -15.2, -47.4, -47.7),
            fill,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[tokio::test]
    async fn test_analyze_classifies_and_publishes() {
        let root = tempfile::TempDir::new().unwrap();
        let storage = MockStorage::new();
        let service = fixed(Rgb([255, 255, 255]));
        let calls = service.calls.clone();
        let analyzer = CoverageAnalyzer::from_config(service, storage.clone(), config(root.path()));

        let report = analyzer
            .analyze(farm_kml().as_bytes(), "farm.kml")
            .await
            .unwrap();

        assert_eq!(calls.lock().await[0].height_m, 20.0);
        assert_eq!(report.devices.len(), 2);
        assert_eq!(report.outside_coverage.len(), 2);
        assert_eq!(report.verdicts[0].reason, VerdictReason::NoSignal);
        assert_eq!(report.verdicts[1].reason, VerdictReason::OutOfBounds);
        assert_eq!(
            report.raster,
            format!("/images/{}/coverage.png", report.analysis_id)
        );

        let id = report.analysis_id;
        assert_eq!(
            storage.file_names().await,
            vec![
                format!("{}/analysis.zip", id),
                format!("{}/coverage.png", id),
                format!("{}/devices.csv", id),
                format!("{}/overlay.png", id),
                format!("{}/report.json", id),
            ]
        );

        // 工作目錄已釋放
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_strong_signal_policy_from_config() {
        let root = tempfile::TempDir::new().unwrap();
        let mut cfg = config(root.path());
        cfg.classification.policy = CoveragePolicy::StrongSignal;
        let analyzer =
            CoverageAnalyzer::from_config(fixed(Rgb([10, 200, 10])), MockStorage::new(), cfg);

        let report = analyzer
            .analyze(farm_kml().as_bytes(), "farm.kml")
            .await
            .unwrap();

        assert_eq!(report.policy, CoveragePolicy::StrongSignal);
        assert_eq!(report.outside_coverage.len(), 1);
        assert_eq!(report.outside_coverage[0].name, "Pivot 2");
    }

    #[tokio::test]
    async fn test_respond_maps_errors() {
        let root = tempfile::TempDir::new().unwrap();

        let analyzer = CoverageAnalyzer::from_config(
            fixed(Rgb([0, 0, 0])),
            MockStorage::new(),
            config(root.path()),
        );
        let no_tx = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark><name>Pivot 1</name>
            <Point><coordinates>-47.6,-15.1</coordinates></Point></Placemark></kml>"#;
        let response = analyzer.respond(no_tx.as_bytes(), "bad.kml").await;
        assert_eq!(response.status_code(), 400);

        let analyzer =
            CoverageAnalyzer::from_config(FailingPropagation, MockStorage::new(), config(root.path()));
        let response = analyzer.respond(farm_kml().as_bytes(), "farm.kml").await;
        assert_eq!(response.status_code(), 502);
        let json: serde_json::Value = serde_json::from_str(&response.to_json().unwrap()).unwrap();
        assert_eq!(json["error"], "propagation_service_error");
    }

    #[tokio::test]
    async fn test_degenerate_bounds_fail_analysis() {
        let root = tempfile::TempDir::new().unwrap();
        let mut service = fixed(Rgb([0, 0, 0]));
        service.bounds = GeoBoundingBox::new(-15.0, -15.0, -47.4, -47.7);
        let analyzer =
            CoverageAnalyzer::from_config(service, MockStorage::new(), config(root.path()));

        let err = analyzer
            .analyze(farm_kml().as_bytes(), "farm.kml")
            .await
            .unwrap_err();
        assert!(matches!(err, CoverageError::GeoreferenceError { .. }));
    }

    #[test]
    fn test_inspect_parses_with_configured_vocabulary() {
        let root = tempfile::TempDir::new().unwrap();
        let mut cfg = config(root.path());
        cfg.classification.default_mast_height_m = 12.0;
        cfg.vocabulary.transmitter = vec!["pivot 2".to_string()];

        let parser = parser_from_config(&cfg);
        let parsed = inspect(&parser, cfg.workspace_root(), farm_kml().as_bytes()).unwrap();

        assert_eq!(parsed.transmitter.name, "Pivot 2");
        assert_eq!(parsed.transmitter.height_m, 12.0);
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
